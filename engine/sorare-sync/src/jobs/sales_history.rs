//! Sales-history refresh: one row per (player, rarity) held in the main sheet

use super::{cell, player_rarity_key, JobContext, UPDATE_SALES_SESSION};
use crate::client::at;
use crate::config::JobsConfig;
use crate::models::{PLAYER_NAME_COLUMN, PLAYER_SLUG_COLUMN, RARITY_COLUMN};
use crate::notify::completion_message;
use crate::queries::TOKEN_PRICES_QUERY;
use crate::sales::{
    sales_from_record, sales_sheet_headers, SaleRecord, SalesHistoryRow, RARITY_SEARCHED_COLUMN,
};
use crate::sheet::{Record, Table};
use anyhow::Context;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::{HashMap, HashSet};
use sync_core::{merge_by_key, BatchJob, RunReport};
use tracing::{debug, info};

/// How many sales are fetched and kept per row
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SalesLimits {
    /// Sales retained in a row after merging
    pub retained: usize,

    /// Sales requested when the row already exists
    pub refresh_fetch: usize,

    /// Sales requested for a new row
    pub initial_fetch: usize,
}

impl From<&JobsConfig> for SalesLimits {
    fn from(config: &JobsConfig) -> Self {
        Self {
            retained: config.max_sales_retained,
            refresh_fetch: config.max_sales_from_api,
            initial_fetch: config.initial_sales_fetch,
        }
    }
}

/// Work item: a player at one rarity
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SalesPair {
    pub slug: String,
    pub rarity: String,
    pub name: String,
}

impl SalesPair {
    pub fn key(&self) -> String {
        player_rarity_key(&self.slug, &self.rarity)
    }
}

/// Rows written across all segments of a session
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SalesProgress {
    pub updated: usize,
    pub appended: usize,
}

struct ExistingRow {
    row: usize,
    record: Record,
}

/// Merges recent sales into the sales-history sheet
pub struct SalesHistoryJob {
    ctx: JobContext,
    main_sheet: Box<dyn Table>,
    sales_sheet: Box<dyn Table>,
    limits: SalesLimits,
    headers: Vec<String>,
    existing: HashMap<String, ExistingRow>,
    pending_updates: Vec<(usize, Vec<String>)>,
    pending_appends: Vec<Vec<String>>,
}

impl SalesHistoryJob {
    pub fn new(
        ctx: JobContext,
        main_sheet: Box<dyn Table>,
        sales_sheet: Box<dyn Table>,
        limits: SalesLimits,
    ) -> Self {
        Self {
            ctx,
            main_sheet,
            sales_sheet,
            limits,
            headers: sales_sheet_headers(limits.retained),
            existing: HashMap::new(),
            pending_updates: Vec::new(),
            pending_appends: Vec::new(),
        }
    }

    async fn fetch_sales(&self, pair: &SalesPair, limit: usize) -> anyhow::Result<Vec<SaleRecord>> {
        let variables = json!({ "playerSlug": pair.slug, "rarity": pair.rarity, "limit": limit });
        let data = self
            .ctx
            .client
            .fetch_strict(TOKEN_PRICES_QUERY, variables)
            .await
            .with_context(|| format!("Failed to fetch sales of {}", pair.key()))?;

        let prices = at(&data, &["tokens", "tokenPrices"]).and_then(Value::as_array);
        let sales: Vec<SaleRecord> =
            prices.into_iter().flatten().filter_map(SaleRecord::from_token_price).collect();

        debug!("Fetched {} sales for {}", sales.len(), pair.key());
        Ok(sales)
    }
}

/// Distinct player/rarity pairs of the main sheet, first row winning the name
pub fn distinct_pairs(records: &[Record]) -> Vec<SalesPair> {
    let mut seen = HashSet::new();
    records
        .iter()
        .filter_map(|record| {
            let slug = cell(record, PLAYER_SLUG_COLUMN)?;
            let rarity = cell(record, RARITY_COLUMN)?.to_lowercase();
            let pair = SalesPair {
                slug: slug.to_string(),
                rarity,
                name: cell(record, PLAYER_NAME_COLUMN).unwrap_or_default().to_string(),
            };
            seen.insert(pair.key()).then_some(pair)
        })
        .collect()
}

#[async_trait::async_trait]
impl BatchJob for SalesHistoryJob {
    type Item = SalesPair;
    type State = SalesProgress;

    fn session_key(&self) -> &str {
        UPDATE_SALES_SESSION
    }

    async fn plan(&mut self) -> anyhow::Result<(Vec<SalesPair>, SalesProgress)> {
        let pairs = distinct_pairs(&self.main_sheet.records());
        info!("Found {} player/rarity pairs in sheet {}", pairs.len(), self.main_sheet.name());
        Ok((pairs, SalesProgress::default()))
    }

    async fn prepare(&mut self, _state: &SalesProgress) -> anyhow::Result<()> {
        if self.sales_sheet.ensure_headers(&self.headers)? {
            info!("Sales sheet header rewritten with {} columns", self.headers.len());
        }

        self.existing = self
            .sales_sheet
            .records()
            .into_iter()
            .enumerate()
            .filter_map(|(row, record)| {
                let slug = cell(&record, PLAYER_SLUG_COLUMN)?;
                let rarity = cell(&record, RARITY_SEARCHED_COLUMN)?;
                let key = player_rarity_key(slug, rarity);
                Some((key, ExistingRow { row, record }))
            })
            .collect();

        debug!("Sales sheet holds {} rows", self.existing.len());
        Ok(())
    }

    async fn process(&mut self, pair: &SalesPair, _state: &mut SalesProgress) -> anyhow::Result<()> {
        let key = pair.key();
        let limit = if self.existing.contains_key(&key) {
            self.limits.refresh_fetch
        } else {
            self.limits.initial_fetch
        };

        let fresh = self.fetch_sales(pair, limit).await?;

        let existing = self.existing.get(&key);
        let stored = existing
            .map(|e| sales_from_record(&e.record, self.limits.retained))
            .unwrap_or_default();

        let row = SalesHistoryRow {
            player_name: pair.name.clone(),
            player_slug: pair.slug.clone(),
            rarity: pair.rarity.clone(),
            sales: merge_by_key(stored, fresh, self.limits.retained),
            last_updated: Utc::now(),
        };
        let values = row.to_row(self.limits.retained);

        match existing.map(|e| e.row) {
            Some(row_index) => self.pending_updates.push((row_index, values)),
            None => self.pending_appends.push(values),
        }
        Ok(())
    }

    async fn flush(&mut self, state: &mut SalesProgress) -> anyhow::Result<()> {
        let updates = std::mem::take(&mut self.pending_updates);
        let appends = std::mem::take(&mut self.pending_appends);

        if updates.is_empty() && appends.is_empty() {
            return Ok(());
        }

        let update_count = updates.len();
        self.sales_sheet.write_rows(updates).context("Failed to rewrite sales rows")?;
        state.updated += update_count;

        let append_count = appends.len();
        self.sales_sheet.append_rows(appends).context("Failed to append sales rows")?;
        state.appended += append_count;

        info!(
            "Sales sheet flushed: {} rows updated, {} rows added",
            update_count, append_count
        );
        Ok(())
    }

    async fn on_complete(&mut self, report: &RunReport, state: &SalesProgress) {
        let message = format!(
            "{}\n📄 Rows: {} updated, {} added, {} failed",
            completion_message("Sales History Updated", report.elapsed),
            state.updated,
            state.appended,
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
    use std::path::Path;
    use std::sync::Arc;
    use std::time::Duration;
    use sync_core::{BatchConfig, BatchRunner, Deadline, FileCheckpointStore};
    use tempfile::TempDir;

    fn record(pairs: &[(&str, &str)]) -> Record {
        pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    fn main_row(slug: &str, rarity: &str, player_slug: &str, name: &str) -> Vec<String> {
        main_sheet_headers()
            .iter()
            .map(|h| match h.as_str() {
                "Slug" => slug.to_string(),
                "Rarity" => rarity.to_string(),
                "Player API Slug" => player_slug.to_string(),
                "Player Name" => name.to_string(),
                _ => String::new(),
            })
            .collect()
    }

    fn seed_main_sheet(path: &Path) {
        let mut sheet = CsvTable::open("cards", path).unwrap();
        sheet.ensure_headers(&main_sheet_headers()).unwrap();
        sheet
            .append_rows(vec![
                main_row("c1", "Limited", "pedri", "Pedri"),
                main_row("c2", "limited", "pedri", "Pedri Dup"),
                main_row("c3", "rare", "gavi", "Gavi"),
                main_row("c4", "rare", "", "Nobody"),
            ])
            .unwrap();
    }

    fn limits() -> SalesLimits {
        SalesLimits { retained: 3, refresh_fetch: 7, initial_fetch: 20 }
    }

    fn token_prices(variables: &Value) -> Result<Value, FetchError> {
        match variables["playerSlug"].as_str() {
            Some("pedri") => Ok(json!({ "tokens": { "tokenPrices": [
                { "amounts": { "eurCents": 900 }, "date": "2024-02-03T10:00:00Z", "card": { "inSeasonEligible": true } },
                { "amounts": { "eurCents": 400 }, "date": "2024-02-04T10:00:00Z", "card": { "inSeasonEligible": false } }
            ] } })),
            _ => Err(FetchError::Unprocessable("unknown player".to_string())),
        }
    }

    struct ExpiredAfter(std::sync::atomic::AtomicUsize);

    impl Deadline for ExpiredAfter {
        fn expired(&self) -> bool {
            self.0.fetch_sub(1, std::sync::atomic::Ordering::SeqCst) == 0
        }
    }

    #[test]
    fn test_distinct_pairs() {
        let records = vec![
            record(&[("Player API Slug", "pedri"), ("Rarity", "Limited"), ("Player Name", "Pedri")]),
            record(&[("Player API Slug", "pedri"), ("Rarity", "limited"), ("Player Name", "Other")]),
            record(&[("Player API Slug", "pedri"), ("Rarity", "rare"), ("Player Name", "Pedri")]),
            record(&[("Player API Slug", ""), ("Rarity", "rare")]),
            record(&[("Player API Slug", "gavi")]),
        ];

        let pairs = distinct_pairs(&records);
        assert_eq!(pairs.len(), 2);
        assert_eq!(pairs[0], SalesPair {
            slug: "pedri".to_string(),
            rarity: "limited".to_string(),
            name: "Pedri".to_string(),
        });
        assert_eq!(pairs[1].rarity, "rare");
    }

    #[tokio::test]
    async fn test_sales_rows_merged_and_appended() {
        let temp_dir = TempDir::new().unwrap();
        let main_path = temp_dir.path().join("cards.csv");
        let sales_path = temp_dir.path().join("sales_history.csv");
        seed_main_sheet(&main_path);

        // Existing row with one older sale and one sale the API reports again
        let headers = sales_sheet_headers(3);
        let mut sales_sheet = CsvTable::open("sales_history", &sales_path).unwrap();
        sales_sheet.ensure_headers(&headers).unwrap();
        let existing: Vec<String> = headers
            .iter()
            .map(|h| match h.as_str() {
                "Player Name" => "Pedri".to_string(),
                "Player API Slug" => "pedri".to_string(),
                "Rarity Searched" => "limited".to_string(),
                "Sale 1 Date" => "2024-02-03 10:00:00".to_string(),
                "Sale 1 Price (EUR)" => "5".to_string(),
                "Sale 1 Eligibility" => "CLASSIC".to_string(),
                "Sale 2 Date" => "2024-02-01 10:00:00".to_string(),
                "Sale 2 Price (EUR)" => "3".to_string(),
                "Sale 2 Eligibility" => "CLASSIC".to_string(),
                _ => String::new(),
            })
            .collect();
        sales_sheet.append_rows(vec![existing]).unwrap();

        let client = Arc::new(ScriptedClient::new(|_: &str, v: &Value| token_prices(v)));
        let notifier = Arc::new(RecordingNotifier::default());
        let ctx = JobContext::new(client.clone(), notifier.clone(), CurrencyRates::default());
        let mut job = SalesHistoryJob::new(
            ctx,
            Box::new(CsvTable::open("cards", &main_path).unwrap()),
            Box::new(CsvTable::open("sales_history", &sales_path).unwrap()),
            limits(),
        );

        let store = Arc::new(FileCheckpointStore::new(temp_dir.path().join("state.json")));
        let runner = BatchRunner::new(
            store.clone(),
            BatchConfig { item_delay: Duration::ZERO, ..Default::default() },
        );
        let report = runner.run(&mut job).await.unwrap();

        assert!(report.is_complete());
        assert_eq!(report.total_items, 2);
        assert_eq!(report.failed, 1);
        assert!(store.session_keys().is_empty());

        let calls = client.calls.lock();
        assert_eq!(calls[0].1["limit"], 7);
        assert_eq!(calls[1].1["limit"], 20);
        drop(calls);

        let sheet = CsvTable::open("sales_history", &sales_path).unwrap();
        assert_eq!(sheet.row_count(), 1);
        let row = &sheet.records()[0];
        assert_eq!(row["Sale 1 Date"], "2024-02-04 10:00:00");
        assert_eq!(row["Sale 1 Price (EUR)"], "4");
        assert_eq!(row["Sale 2 Date"], "2024-02-03 10:00:00");
        assert_eq!(row["Sale 2 Price (EUR)"], "9");
        assert_eq!(row["Sale 2 Eligibility"], "IN_SEASON");
        assert_eq!(row["Sale 3 Price (EUR)"], "3");

        assert!(notifier.messages.lock()[0].contains("1 updated, 0 added, 1 failed"));
    }

    #[tokio::test]
    async fn test_pair_with_graphql_errors_skipped() {
        let temp_dir = TempDir::new().unwrap();
        let main_path = temp_dir.path().join("cards.csv");
        let sales_path = temp_dir.path().join("sales_history.csv");
        seed_main_sheet(&main_path);

        let client = Arc::new(ScriptedClient::new(|_: &str, v: &Value| {
            let response = token_prices(&json!({ "playerSlug": "pedri" }))?;
            let errors = match v["playerSlug"].as_str() {
                Some("gavi") => vec!["tokenPrices unavailable".to_string()],
                _ => Vec::new(),
            };
            Ok(GraphQlResponse { data: response, errors })
        }));
        let ctx = JobContext::new(
            client,
            Arc::new(RecordingNotifier::default()),
            CurrencyRates::default(),
        );
        let mut job = SalesHistoryJob::new(
            ctx,
            Box::new(CsvTable::open("cards", &main_path).unwrap()),
            Box::new(CsvTable::open("sales_history", &sales_path).unwrap()),
            limits(),
        );

        let store = Arc::new(FileCheckpointStore::new(temp_dir.path().join("state.json")));
        let runner = BatchRunner::new(
            store,
            BatchConfig { item_delay: Duration::ZERO, ..Default::default() },
        );
        let report = runner.run(&mut job).await.unwrap();

        assert_eq!(report.total_items, 2);
        assert_eq!(report.failed, 1);

        let records = CsvTable::open("sales_history", &sales_path).unwrap().records();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0]["Player API Slug"], "pedri");
    }

    #[tokio::test]
    async fn test_suspended_session_resumes_from_checkpoint() {
        let temp_dir = TempDir::new().unwrap();
        let main_path = temp_dir.path().join("cards.csv");
        let sales_path = temp_dir.path().join("sales_history.csv");
        seed_main_sheet(&main_path);

        let client = Arc::new(ScriptedClient::new(|_: &str, v: &Value| token_prices(v)));
        let store = Arc::new(FileCheckpointStore::new(temp_dir.path().join("state.json")));
        let runner = BatchRunner::new(
            store.clone(),
            BatchConfig { item_delay: Duration::ZERO, ..Default::default() },
        );

        let new_job = || {
            let ctx = JobContext::new(
                client.clone(),
                Arc::new(RecordingNotifier::default()),
                CurrencyRates::default(),
            );
            SalesHistoryJob::new(
                ctx,
                Box::new(CsvTable::open("cards", &main_path).unwrap()),
                Box::new(CsvTable::open("sales_history", &sales_path).unwrap()),
                limits(),
            )
        };

        let first = runner
            .run_until(&mut new_job(), &ExpiredAfter(std::sync::atomic::AtomicUsize::new(1)))
            .await
            .unwrap();
        assert!(!first.is_complete());
        assert_eq!(store.session_keys(), vec![UPDATE_SALES_SESSION.to_string()]);

        // The first pair was flushed before suspending
        let sheet = CsvTable::open("sales_history", &sales_path).unwrap();
        assert_eq!(sheet.row_count(), 1);

        // Rows added to the main sheet after planning do not change the session
        let mut main = CsvTable::open("cards", &main_path).unwrap();
        main.append_rows(vec![main_row("c9", "unique", "yamal", "Yamal")]).unwrap();

        let second = runner.run(&mut new_job()).await.unwrap();
        assert!(second.is_complete());
        assert_eq!(second.start_index, 1);
        assert_eq!(second.total_items, 2);
        assert!(store.session_keys().is_empty());
        assert_eq!(client.call_count(), 2);
    }
}
