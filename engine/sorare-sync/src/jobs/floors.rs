//! Floor-price refresh of every player in the main sheet

use super::{cell, JobContext, UPDATE_FLOORS_SESSION};
use crate::client::at;
use crate::models::{FloorPrices, FLOOR_COLUMNS, PLAYER_SLUG_COLUMN};
use crate::notify::completion_message;
use crate::queries::{floor_alias, floor_batch_query};
use crate::sheet::{CellUpdate, Table};
use anyhow::{anyhow, Context};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use sync_core::{BatchJob, RunReport};
use tracing::{debug, info, warn};

/// Players priced and cells written across all segments of a session
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FloorsProgress {
    pub players_priced: usize,
    pub cells_written: usize,
}

/// Writes the six floor-price columns of the main sheet
pub struct FloorsJob {
    ctx: JobContext,
    sheet: Box<dyn Table>,
    batch_size: usize,
    prices: HashMap<String, FloorPrices>,
}

impl FloorsJob {
    pub fn new(ctx: JobContext, sheet: Box<dyn Table>, batch_size: usize) -> Self {
        Self { ctx, sheet, batch_size: batch_size.max(1), prices: HashMap::new() }
    }
}

/// Sorted unique non-empty player slugs of the main sheet, in batches
pub fn slug_batches(sheet: &dyn Table, batch_size: usize) -> Vec<Vec<String>> {
    let slugs: BTreeSet<String> = sheet
        .records()
        .iter()
        .filter_map(|r| cell(r, PLAYER_SLUG_COLUMN).map(str::to_string))
        .collect();

    let slugs: Vec<String> = slugs.into_iter().collect();
    slugs.chunks(batch_size.max(1)).map(<[String]>::to_vec).collect()
}

#[async_trait::async_trait]
impl BatchJob for FloorsJob {
    type Item = Vec<String>;
    type State = FloorsProgress;

    fn session_key(&self) -> &str {
        UPDATE_FLOORS_SESSION
    }

    async fn plan(&mut self) -> anyhow::Result<(Vec<Vec<String>>, FloorsProgress)> {
        let batches = slug_batches(&*self.sheet, self.batch_size);
        info!(
            "Found {} players in {} batches of up to {}",
            batches.iter().map(Vec::len).sum::<usize>(),
            batches.len(),
            self.batch_size
        );
        Ok((batches, FloorsProgress::default()))
    }

    async fn process(&mut self, batch: &Vec<String>, _state: &mut FloorsProgress) -> anyhow::Result<()> {
        let (query, variables) = floor_batch_query(batch);
        let data = self
            .ctx
            .client
            .fetch(&query, variables)
            .await
            .with_context(|| format!("Failed to fetch floor prices of {} players", batch.len()))?;

        let football =
            at(&data, &["football"]).ok_or_else(|| anyhow!("floor response has no football node"))?;

        for (i, slug) in batch.iter().enumerate() {
            match at(football, &[floor_alias(i).as_str()]) {
                Some(player) => {
                    self.prices.insert(slug.clone(), FloorPrices::from_player(player, &self.ctx.rates));
                }
                None => warn!("No floor prices returned for {}", slug),
            }
        }

        debug!("Priced {} players so far in this segment", self.prices.len());
        Ok(())
    }

    async fn flush(&mut self, state: &mut FloorsProgress) -> anyhow::Result<()> {
        let prices = std::mem::take(&mut self.prices);
        if prices.is_empty() {
            return Ok(());
        }

        let columns = FLOOR_COLUMNS
            .iter()
            .map(|name| self.sheet.column_index(name))
            .collect::<Result<Vec<_>, _>>()
            .context("Main sheet is missing floor-price columns")?;

        let mut updates = Vec::new();
        for (row, record) in self.sheet.records().iter().enumerate() {
            let Some(floors) = cell(record, PLAYER_SLUG_COLUMN).and_then(|s| prices.get(s)) else {
                continue;
            };

            for (&column, (_, value)) in columns.iter().zip(floors.cells()) {
                updates.push(CellUpdate { row, column, value });
            }
        }

        self.sheet.batch_update(&updates)?;
        state.players_priced += prices.len();
        state.cells_written += updates.len();

        info!("Wrote {} floor-price cells for {} players", updates.len(), prices.len());
        Ok(())
    }

    async fn on_complete(&mut self, report: &RunReport, state: &FloorsProgress) {
        let message = format!(
            "{}\n💰 Players priced: {}, batches failed: {}",
            completion_message("Floor Prices Updated", report.elapsed),
            state.players_priced,
            report.failed
        );
        self.ctx.notifier.notify(&message).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::{FetchError, GraphQlResponse};
    use crate::jobs::testing::{RecordingNotifier, ScriptedClient};
    use crate::models::main_sheet_headers;
    use crate::rates::CurrencyRates;
    use crate::sheet::CsvTable;
    use serde_json::{json, Value};
    use std::sync::Arc;
    use std::time::Duration;
    use sync_core::{BatchConfig, BatchRunner, InMemoryCheckpointStore};
    use tempfile::TempDir;

    fn eur(cents: u64) -> Value {
        json!({ "liveSingleSaleOffer": { "receiverSide": { "amounts": { "referenceCurrency": "eur", "eurCents": cents } } } })
    }

    fn seed(path: &std::path::Path, player_slugs: &[&str]) {
        let headers = main_sheet_headers();
        let slug_column = headers.iter().position(|h| h == "Player API Slug").unwrap();
        let rows = player_slugs
            .iter()
            .map(|slug| {
                let mut row = vec![String::new(); headers.len()];
                row[slug_column] = slug.to_string();
                row
            })
            .collect();

        let mut sheet = CsvTable::open("cards", path).unwrap();
        sheet.ensure_headers(&headers).unwrap();
        sheet.append_rows(rows).unwrap();
    }

    #[test]
    fn test_slug_batches_sorted_and_unique() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("cards.csv");
        seed(&path, &["c", "a", "", "b", "a", "d"]);

        let sheet = CsvTable::open("cards", &path).unwrap();
        let batches = slug_batches(&sheet, 3);
        assert_eq!(batches, vec![vec!["a", "b", "c"], vec!["d"]]);
    }

    #[tokio::test]
    async fn test_floor_columns_updated_per_row() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("cards.csv");
        seed(&path, &["alpha", "beta", "alpha", "gamma"]);

        // Second alias of the first batch fails on its own; the batch still counts
        let client = Arc::new(ScriptedClient::new(|_: &str, variables: &Value| {
            if variables["s0"] == "gamma" {
                return Err(FetchError::Network("timeout".to_string()));
            }
            Ok(GraphQlResponse {
                data: json!({ "football": {
                    "p0": { "slug": "alpha", "L_ANY": eur(150), "SR_IN": eur(99_900) },
                    "p1": null
                } }),
                errors: vec!["player beta not found".to_string()],
            })
        }));
        let notifier = Arc::new(RecordingNotifier::default());
        let ctx = JobContext::new(client.clone(), notifier.clone(), CurrencyRates::default());
        let mut job = FloorsJob::new(ctx, Box::new(CsvTable::open("cards", &path).unwrap()), 2);

        let runner = BatchRunner::new(
            Arc::new(InMemoryCheckpointStore::new()),
            BatchConfig { item_delay: Duration::ZERO, ..Default::default() },
        );
        let report = runner.run(&mut job).await.unwrap();

        assert!(report.is_complete());
        assert_eq!(report.total_items, 2);
        assert_eq!(report.failed, 1);

        let records = CsvTable::open("cards", &path).unwrap().records();
        assert_eq!(records[0]["FLOOR CLASSIC LIMITED"], "1.5");
        assert_eq!(records[0]["FLOOR IN SEASON SR"], "999");
        assert_eq!(records[0]["FLOOR CLASSIC RARE"], "");
        assert_eq!(records[2]["FLOOR CLASSIC LIMITED"], "1.5");
        assert_eq!(records[1]["FLOOR CLASSIC LIMITED"], "");

        assert!(notifier.messages.lock()[0].contains("Players priced: 1, batches failed: 1"));
    }
}
