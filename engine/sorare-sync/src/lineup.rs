//! Best SO5 lineup by projected score
//!
//! One goalkeeper, two defenders, two midfielders, one forward and the best
//! remaining outfield player. The expected XP is the summed projection divided
//! by five.

use crate::jobs::cell;
use crate::models::{number, parse_number, PLAYER_NAME_COLUMN, POSITION_COLUMN, PROJECTED_SCORE_COLUMN};
use crate::sheet::{Record, Table};
use thiserror::Error;
use tracing::info;

pub const GOALKEEPER: &str = "Goalkeeper";
pub const DEFENDER: &str = "Defender";
pub const MIDFIELDER: &str = "Midfielder";
pub const FORWARD: &str = "Forward";

/// Lineup selection failures
#[derive(Error, Debug, PartialEq, Eq)]
pub enum LineupError {
    #[error("no goalkeeper available")]
    NoGoalkeeper,

    #[error("no forward available")]
    NoForward,

    #[error("no extra outfield player available")]
    NoExtraPlayer,
}

/// A selected player
#[derive(Debug, Clone, PartialEq)]
pub struct LineupPlayer {
    pub name: String,
    pub position: String,
    pub projected_score: f64,
    /// Cell as written in the main sheet
    pub projected_cell: String,
}

impl LineupPlayer {
    fn from_record(record: &Record) -> Self {
        let projected_cell = cell(record, PROJECTED_SCORE_COLUMN).unwrap_or_default().to_string();
        Self {
            name: cell(record, PLAYER_NAME_COLUMN).unwrap_or_default().to_string(),
            position: cell(record, POSITION_COLUMN).unwrap_or_default().to_string(),
            projected_score: parse_number(&projected_cell).unwrap_or(0.0),
            projected_cell,
        }
    }
}

/// The chosen seven players and their expected XP
#[derive(Debug, Clone, PartialEq)]
pub struct Lineup {
    pub players: Vec<LineupPlayer>,
    pub total_xp: f64,
}

impl Lineup {
    pub const HEADERS: [&'static str; 3] = ["Player Name", "Position", "Projected Score"];

    /// Sheet body: one row per player and a closing total row
    pub fn to_rows(&self) -> Vec<Vec<String>> {
        let mut rows: Vec<Vec<String>> = self
            .players
            .iter()
            .map(|p| vec![p.name.clone(), p.position.clone(), p.projected_cell.clone()])
            .collect();
        rows.push(vec![String::new(), "Total XP".to_string(), number(self.total_xp)]);
        rows
    }
}

/// Pick the best lineup from main-sheet records
pub fn best_lineup(records: &[Record]) -> Result<Lineup, LineupError> {
    let by_position = |position: &str| {
        let mut players: Vec<LineupPlayer> = records
            .iter()
            .map(LineupPlayer::from_record)
            .filter(|p| p.position == position)
            .collect();
        sort_by_projection(&mut players);
        players
    };

    let mut goalkeepers = by_position(GOALKEEPER);
    let mut defenders = by_position(DEFENDER);
    let mut midfielders = by_position(MIDFIELDER);
    let mut forwards = by_position(FORWARD);

    if goalkeepers.is_empty() {
        return Err(LineupError::NoGoalkeeper);
    }
    let mut players = vec![goalkeepers.remove(0)];

    players.extend(defenders.drain(..defenders.len().min(2)));
    players.extend(midfielders.drain(..midfielders.len().min(2)));

    if forwards.is_empty() {
        return Err(LineupError::NoForward);
    }
    players.push(forwards.remove(0));

    let mut extras: Vec<LineupPlayer> =
        defenders.into_iter().chain(midfielders).chain(forwards).collect();
    sort_by_projection(&mut extras);
    if extras.is_empty() {
        return Err(LineupError::NoExtraPlayer);
    }
    players.push(extras.remove(0));

    let total: f64 = players.iter().map(|p| p.projected_score).sum();
    let total_xp = (total / 5.0 * 100.0).round() / 100.0;

    Ok(Lineup { players, total_xp })
}

fn sort_by_projection(players: &mut [LineupPlayer]) {
    players.sort_by(|a, b| b.projected_score.total_cmp(&a.projected_score));
}

/// Compute the lineup from `main` and overwrite `output` with it
pub fn write_best_lineup(main: &dyn Table, output: &mut dyn Table) -> anyhow::Result<Lineup> {
    let lineup = best_lineup(&main.records())?;

    let headers = Lineup::HEADERS.iter().map(|h| h.to_string()).collect();
    output.replace_all(headers, lineup.to_rows())?;

    info!(
        "Best lineup written to {}: {} players, {} XP",
        output.name(),
        lineup.players.len(),
        number(lineup.total_xp)
    );
    Ok(lineup)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sheet::CsvTable;
    use tempfile::TempDir;

    fn player(name: &str, position: &str, score: &str) -> Record {
        [
            (PLAYER_NAME_COLUMN, name),
            (POSITION_COLUMN, position),
            (PROJECTED_SCORE_COLUMN, score),
        ]
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
    }

    fn squad() -> Vec<Record> {
        vec![
            player("Keeper A", GOALKEEPER, "40"),
            player("Keeper B", GOALKEEPER, "55"),
            player("Def A", DEFENDER, "30"),
            player("Def B", DEFENDER, "50"),
            player("Def C", DEFENDER, "45"),
            player("Mid A", MIDFIELDER, "60"),
            player("Mid B", MIDFIELDER, ""),
            player("Fwd A", FORWARD, "70"),
            player("Fwd B", FORWARD, "44.5"),
            player("Coach", "Coach", "99"),
        ]
    }

    #[test]
    fn test_best_lineup_selection() {
        let lineup = best_lineup(&squad()).unwrap();
        let names: Vec<&str> = lineup.players.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["Keeper B", "Def B", "Def C", "Mid A", "Mid B", "Fwd A", "Fwd B"]);

        // 55 + 50 + 45 + 60 + 0 + 70 + 44.5
        assert_eq!(lineup.total_xp, 64.9);
    }

    #[test]
    fn test_missing_positions() {
        let no_keeper: Vec<Record> =
            squad().into_iter().filter(|r| r[POSITION_COLUMN] != GOALKEEPER).collect();
        assert_eq!(best_lineup(&no_keeper), Err(LineupError::NoGoalkeeper));

        let no_forward: Vec<Record> =
            squad().into_iter().filter(|r| r[POSITION_COLUMN] != FORWARD).collect();
        assert_eq!(best_lineup(&no_forward), Err(LineupError::NoForward));

        let minimal = vec![
            player("Keeper", GOALKEEPER, "10"),
            player("Def", DEFENDER, "10"),
            player("Fwd", FORWARD, "10"),
        ];
        assert_eq!(best_lineup(&minimal), Err(LineupError::NoExtraPlayer));
    }

    #[test]
    fn test_lineup_written_to_sheet() {
        let temp_dir = TempDir::new().unwrap();
        let mut main = CsvTable::open("cards", temp_dir.path().join("cards.csv")).unwrap();
        let headers: Vec<String> = [PLAYER_NAME_COLUMN, POSITION_COLUMN, PROJECTED_SCORE_COLUMN]
            .iter()
            .map(|h| h.to_string())
            .collect();
        main.ensure_headers(&headers).unwrap();
        main.append_rows(
            squad()
                .iter()
                .map(|r| headers.iter().map(|h| r[h].clone()).collect())
                .collect(),
        )
        .unwrap();

        let path = temp_dir.path().join("best_so5_lineup.csv");
        let mut output = CsvTable::open("best_so5_lineup", &path).unwrap();
        write_best_lineup(&main, &mut output).unwrap();

        let written = CsvTable::open("best_so5_lineup", &path).unwrap();
        assert_eq!(written.headers(), Lineup::HEADERS.map(String::from).as_slice());
        assert_eq!(written.row_count(), 8);
        assert_eq!(written.row(7).unwrap(), ["", "Total XP", "64.9"].map(String::from).as_slice());
    }
}
