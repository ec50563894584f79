//! Typed records of the main card sheet
//!
//! API payloads are decoded into these structs and only turned into sheet
//! cells by [`CardRecord::to_row`].

use crate::client::at;
use crate::queries::FLOOR_LOOKUPS;
use crate::rates::CurrencyRates;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Timestamp layout used in every sheet
pub const SHEET_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Column names of the floor-price block, in [`FLOOR_LOOKUPS`] order
pub const FLOOR_COLUMNS: [&str; 6] = [
    "FLOOR CLASSIC LIMITED",
    "FLOOR IN SEASON LIMITED",
    "FLOOR CLASSIC RARE",
    "FLOOR IN SEASON RARE",
    "FLOOR CLASSIC SR",
    "FLOOR IN SEASON SR",
];

pub const SLUG_COLUMN: &str = "Slug";
pub const RARITY_COLUMN: &str = "Rarity";
pub const PLAYER_NAME_COLUMN: &str = "Player Name";
pub const PLAYER_SLUG_COLUMN: &str = "Player API Slug";
pub const POSITION_COLUMN: &str = "Position";
pub const PROJECTED_SCORE_COLUMN: &str = "Projected Score";

/// Header row of the main card sheet
pub const MAIN_SHEET_HEADERS: [&str; 37] = [
    SLUG_COLUMN,
    RARITY_COLUMN,
    PLAYER_NAME_COLUMN,
    PLAYER_SLUG_COLUMN,
    POSITION_COLUMN,
    "U23 Eligible?",
    "Level",
    "In Season?",
    "Current XP",
    "Next Level XP",
    "XP Missing",
    "Sale Price (EUR)",
    "Fee Enabled?",
    "Picture URL",
    "Owner Since",
    "Last 15 SO5 Scores",
    "L5 So5 (%)",
    "L15 So5 (%)",
    "Avg So5 Score (3)",
    "Avg So5 Score (5)",
    "Avg So5 Score (15)",
    "Projection Grade",
    PROJECTED_SCORE_COLUMN,
    "Projection Reliability (%)",
    "Starter Odds (%)",
    "Next Game Date",
    "Next Game API ID",
    "Game",
    "Injury",
    "Suspension",
    FLOOR_COLUMNS[0],
    FLOOR_COLUMNS[1],
    FLOOR_COLUMNS[2],
    FLOOR_COLUMNS[3],
    FLOOR_COLUMNS[4],
    FLOOR_COLUMNS[5],
    "Last Updated",
];

/// Owned copy of the main sheet header row
pub fn main_sheet_headers() -> Vec<String> {
    MAIN_SHEET_HEADERS.iter().map(|h| h.to_string()).collect()
}

/// Player summary embedded in a gallery card
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GalleryPlayer {
    #[serde(rename = "displayName", default)]
    pub display_name: String,

    #[serde(default)]
    pub slug: String,

    #[serde(default)]
    pub position: String,

    #[serde(rename = "u23Eligible", default)]
    pub u23_eligible: bool,
}

/// One card of the user's gallery, as listed by the paginated cards query.
/// This is the work item of the card refresh.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CardItem {
    pub slug: String,

    #[serde(default)]
    pub rarity: String,

    #[serde(rename = "ownerSince", default)]
    pub owner_since: Option<String>,

    #[serde(default)]
    pub player: Option<GalleryPlayer>,
}

/// Six floor prices of one player in EUR
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct FloorPrices {
    pub classic_limited: Option<f64>,
    pub in_season_limited: Option<f64>,
    pub classic_rare: Option<f64>,
    pub in_season_rare: Option<f64>,
    pub classic_super_rare: Option<f64>,
    pub in_season_super_rare: Option<f64>,
}

impl FloorPrices {
    /// Read the aliased lowest-price lookups of a player node
    pub fn from_player(player: &Value, rates: &CurrencyRates) -> Self {
        let price = |i: usize| {
            let (alias, _, _) = FLOOR_LOOKUPS[i];
            at(player, &[alias]).and_then(|node| rates.eur_price(node))
        };

        Self {
            classic_limited: price(0),
            in_season_limited: price(1),
            classic_rare: price(2),
            in_season_rare: price(3),
            classic_super_rare: price(4),
            in_season_super_rare: price(5),
        }
    }

    /// Prices in [`FLOOR_COLUMNS`] order
    pub fn values(&self) -> [Option<f64>; 6] {
        [
            self.classic_limited,
            self.in_season_limited,
            self.classic_rare,
            self.in_season_rare,
            self.classic_super_rare,
            self.in_season_super_rare,
        ]
    }

    /// Pairs of column name and formatted cell
    pub fn cells(&self) -> impl Iterator<Item = (&'static str, String)> {
        FLOOR_COLUMNS.into_iter().zip(self.values().map(optional_number))
    }
}

/// Projection of a player for the next game
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Projection {
    pub grade: Option<String>,
    pub score: Option<f64>,
    pub reliability_pct: Option<f64>,
    pub starter_odds_pct: Option<f64>,
}

impl Projection {
    /// Decode the `playerGameScore` node of the projection query
    pub fn from_game_score(node: &Value) -> Self {
        let projection = at(node, &["projection"]);

        Self {
            grade: projection.and_then(|p| at(p, &["grade"])).map(scalar_text),
            score: projection.and_then(|p| at(p, &["score"])).and_then(Value::as_f64),
            reliability_pct: projection
                .and_then(|p| at(p, &["reliabilityBasisPoints"]))
                .and_then(Value::as_f64)
                .map(|bp| bp / 100.0),
            starter_odds_pct: at(
                node,
                &["anyPlayerGameStats", "footballPlayingStatusOdds", "starterOddsBasisPoints"],
            )
            .and_then(Value::as_f64)
            .map(|bp| bp / 100.0),
        }
    }
}

/// Next scheduled game of a player's club
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NextGame {
    pub id: String,
    pub date: Option<String>,
    pub label: String,
}

impl NextGame {
    /// First upcoming game of the player's active club
    pub fn from_player(player: &Value) -> Option<Self> {
        let game = at(player, &["activeClub", "upcomingGames"])?.as_array()?.first()?;
        let id = at(game, &["id"]).map(scalar_text)?;

        let home = at(game, &["homeTeam", "name"]).and_then(Value::as_str).unwrap_or("?");
        let away = at(game, &["awayTeam", "name"]).and_then(Value::as_str).unwrap_or("?");
        let label = match at(game, &["competition", "displayName"]).and_then(Value::as_str) {
            Some(competition) => format!("{home} vs {away} ({competition})"),
            None => format!("{home} vs {away}"),
        };

        Some(Self { id, date: at(game, &["date"]).map(scalar_text), label })
    }

    /// Game id without the `Game:` type prefix, as the projection query expects
    pub fn api_id(&self) -> &str {
        self.id.strip_prefix("Game:").unwrap_or(&self.id)
    }
}

/// One row of the main card sheet
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CardRecord {
    pub slug: String,
    pub rarity: String,
    pub player_name: String,
    pub player_slug: String,
    pub position: String,
    pub u23_eligible: bool,
    pub level: Option<i64>,
    pub in_season: Option<bool>,
    pub current_xp: Option<i64>,
    pub next_level_xp: Option<i64>,
    pub sale_price_eur: Option<f64>,
    pub fee_enabled: Option<bool>,
    pub picture_url: String,
    pub owner_since: String,
    pub last_scores: Vec<f64>,
    pub l5_appearances_pct: Option<f64>,
    pub l15_appearances_pct: Option<f64>,
    pub projection: Projection,
    pub next_game: Option<NextGame>,
    pub injury: String,
    pub suspension: String,
    pub floors: FloorPrices,
    pub last_updated: DateTime<Utc>,
}

impl CardRecord {
    /// Build a record from the card-details node, the optional projection node
    /// and the gallery item it was requested for
    pub fn from_details(
        item: &CardItem,
        card: &Value,
        projection: Option<&Value>,
        rates: &CurrencyRates,
        now: DateTime<Utc>,
    ) -> Self {
        let gallery_player = item.player.clone().unwrap_or_default();
        let empty = Value::Null;
        let player = at(card, &["player"]).unwrap_or(&empty);

        let text = |node: &Value, field: &str, fallback: &str| {
            at(node, &[field]).and_then(Value::as_str).unwrap_or(fallback).to_string()
        };

        let last_scores = at(player, &["playerGameScores"])
            .and_then(Value::as_array)
            .map(|scores| scores.iter().filter_map(|s| at(s, &["score"])?.as_f64()).collect())
            .unwrap_or_default();

        Self {
            slug: item.slug.clone(),
            rarity: text(card, "rarity", &item.rarity),
            player_name: text(player, "displayName", &gallery_player.display_name),
            player_slug: text(player, "slug", &gallery_player.slug),
            position: text(player, "position", &gallery_player.position),
            u23_eligible: at(player, &["u23Eligible"])
                .and_then(Value::as_bool)
                .unwrap_or(gallery_player.u23_eligible),
            level: at(card, &["grade"]).and_then(Value::as_i64),
            in_season: at(card, &["inSeasonEligible"]).and_then(Value::as_bool),
            current_xp: at(card, &["xp"]).and_then(Value::as_i64),
            next_level_xp: at(card, &["xpNeededForNextGrade"]).and_then(Value::as_i64),
            sale_price_eur: rates.eur_price(card),
            fee_enabled: at(card, &["secondaryMarketFeeEnabled"]).and_then(Value::as_bool),
            picture_url: text(card, "pictureUrl", ""),
            owner_since: item.owner_since.clone().unwrap_or_default(),
            last_scores,
            l5_appearances_pct: appearance_pct(player, "lastFiveSo5Appearances", 5.0),
            l15_appearances_pct: appearance_pct(player, "lastFifteenSo5Appearances", 15.0),
            projection: projection.map(Projection::from_game_score).unwrap_or_default(),
            next_game: NextGame::from_player(player),
            injury: first_status(player, "activeInjuries", "status", "expectedEndDate"),
            suspension: first_status(player, "activeSuspensions", "reason", "endDate"),
            floors: FloorPrices::from_player(player, rates),
            last_updated: now,
        }
    }

    /// XP still needed for the next level
    pub fn xp_missing(&self) -> Option<i64> {
        Some((self.next_level_xp? - self.current_xp?).max(0))
    }

    /// Average of the `n` most recent scores
    pub fn average_score(&self, n: usize) -> Option<f64> {
        let recent = &self.last_scores[..n.min(self.last_scores.len())];
        if recent.is_empty() {
            return None;
        }
        Some(recent.iter().sum::<f64>() / recent.len() as f64)
    }

    /// Cells in [`MAIN_SHEET_HEADERS`] order
    pub fn to_row(&self) -> Vec<String> {
        let scores =
            self.last_scores.iter().map(|s| number(*s)).collect::<Vec<_>>().join(", ");
        let game = self.next_game.as_ref();

        let mut row = vec![
            self.slug.clone(),
            self.rarity.clone(),
            self.player_name.clone(),
            self.player_slug.clone(),
            self.position.clone(),
            flag(self.u23_eligible),
            optional_int(self.level),
            self.in_season.map(flag).unwrap_or_default(),
            optional_int(self.current_xp),
            optional_int(self.next_level_xp),
            optional_int(self.xp_missing()),
            optional_number(self.sale_price_eur),
            self.fee_enabled.map(flag).unwrap_or_default(),
            self.picture_url.clone(),
            self.owner_since.clone(),
            scores,
            optional_number(self.l5_appearances_pct),
            optional_number(self.l15_appearances_pct),
            optional_number(self.average_score(3)),
            optional_number(self.average_score(5)),
            optional_number(self.average_score(15)),
            self.projection.grade.clone().unwrap_or_default(),
            optional_number(self.projection.score),
            optional_number(self.projection.reliability_pct),
            optional_number(self.projection.starter_odds_pct),
            game.and_then(|g| g.date.clone()).unwrap_or_default(),
            game.map(|g| g.id.clone()).unwrap_or_default(),
            game.map(|g| g.label.clone()).unwrap_or_default(),
            self.injury.clone(),
            self.suspension.clone(),
        ];
        row.extend(self.floors.values().map(optional_number));
        row.push(self.last_updated.format(SHEET_TIME_FORMAT).to_string());
        row
    }
}

fn appearance_pct(player: &Value, field: &str, games: f64) -> Option<f64> {
    at(player, &[field]).and_then(Value::as_f64).map(|n| n * 100.0 / games)
}

fn first_status(player: &Value, list: &str, label: &str, until: &str) -> String {
    let Some(entry) = at(player, &[list]).and_then(Value::as_array).and_then(|l| l.first()) else {
        return String::new();
    };

    let label = at(entry, &[label]).map(scalar_text).unwrap_or_default();
    match at(entry, &[until]).and_then(Value::as_str) {
        Some(until) => format!("{label} (until {until})"),
        None => label,
    }
}

fn scalar_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn flag(value: bool) -> String {
    if value { "TRUE" } else { "FALSE" }.to_string()
}

fn optional_int(value: Option<i64>) -> String {
    value.map(|v| v.to_string()).unwrap_or_default()
}

/// Render a number rounded to two decimals, without trailing zeros
pub fn number(value: f64) -> String {
    format!("{}", (value * 100.0).round() / 100.0)
}

/// [`number`], or an empty cell
pub fn optional_number(value: Option<f64>) -> String {
    value.map(number).unwrap_or_default()
}

/// Lenient numeric cell parser accepting `12.5`, `12,5`, `€ 12.50` and `1,234.50`
///
/// A lone comma is a decimal separator unless every group after it has exactly
/// three digits, so `1,234` reads as 1234 and `1,5` as 1.5.
pub fn parse_number(cell: &str) -> Option<f64> {
    let cleaned: String =
        cell.trim().chars().filter(|c| c.is_ascii_digit() || matches!(c, '.' | ',' | '-')).collect();
    if cleaned.is_empty() {
        return None;
    }

    let normalized = match (cleaned.rfind('.'), cleaned.rfind(',')) {
        (Some(dot), Some(comma)) if comma > dot => cleaned.replace('.', "").replace(',', "."),
        (Some(_), Some(_)) => cleaned.replace(',', ""),
        (None, Some(_)) if is_digit_grouped(&cleaned) => cleaned.replace(',', ""),
        (None, Some(_)) => cleaned.replace(',', "."),
        _ => cleaned,
    };
    normalized.parse().ok()
}

fn is_digit_grouped(cleaned: &str) -> bool {
    let mut groups = cleaned.trim_start_matches('-').split(',');
    let lead = groups.next().unwrap_or_default();
    (1..=3).contains(&lead.len()) && groups.all(|g| g.len() == 3)
}
