//! Resumable synchronization jobs
//!
//! Each job is a [`sync_core::BatchJob`]: it plans its work list from the API
//! or the main sheet, processes one item per step and writes buffered rows on
//! flush. Progress counters live in the checkpoint state so the completion
//! message covers every segment of a session.

pub mod cards;
pub mod floors;
pub mod sales_history;

pub use cards::{CardsJob, CardsProgress};
pub use floors::{FloorsJob, FloorsProgress};
pub use sales_history::{SalesHistoryJob, SalesLimits, SalesPair, SalesProgress};

use crate::client::GraphQlClient;
use crate::notify::Notifier;
use crate::rates::CurrencyRates;
use crate::sheet::Record;
use std::collections::HashMap;
use std::sync::Arc;

pub const UPDATE_CARDS_SESSION: &str = "update_cards_continuation";
pub const UPDATE_SALES_SESSION: &str = "update_sales_continuation";
pub const UPDATE_FLOORS_SESSION: &str = "update_floors_continuation";

/// Collaborators shared by every job
#[derive(Clone)]
pub struct JobContext {
    pub client: Arc<dyn GraphQlClient>,
    pub notifier: Arc<dyn Notifier>,
    pub rates: CurrencyRates,
}

impl JobContext {
    pub fn new(
        client: Arc<dyn GraphQlClient>,
        notifier: Arc<dyn Notifier>,
        rates: CurrencyRates,
    ) -> Self {
        Self { client, notifier, rates }
    }
}

/// Composite key of a player at one rarity
pub fn player_rarity_key(slug: &str, rarity: &str) -> String {
    format!("{}::{}", slug, rarity.to_lowercase())
}

/// Map each non-empty key to the first data row holding it
pub fn index_rows<F>(records: &[Record], key: F) -> HashMap<String, usize>
where
    F: Fn(&Record) -> Option<String>,
{
    let mut index = HashMap::new();
    for (row, record) in records.iter().enumerate() {
        if let Some(k) = key(record).filter(|k| !k.is_empty()) {
            index.entry(k).or_insert(row);
        }
    }
    index
}

/// Trimmed value of a column, if present and non-empty
pub fn cell<'a>(record: &'a Record, column: &str) -> Option<&'a str> {
    record.get(column).map(|v| v.trim()).filter(|v| !v.is_empty())
}

#[cfg(test)]
pub(crate) mod testing {
    //! Scripted GraphQL client and recording notifier for job tests

    use crate::client::{FetchError, GraphQlClient, GraphQlResponse};
    use crate::notify::Notifier;
    use parking_lot::Mutex;
    use serde_json::Value;

    type Responder = Box<dyn Fn(&str, &Value) -> Result<GraphQlResponse, FetchError> + Send + Sync>;

    pub struct ScriptedClient {
        responder: Responder,
        pub calls: Mutex<Vec<(String, Value)>>,
    }

    impl ScriptedClient {
        /// `responder` returns either bare data or a full response with errors
        pub fn new<F, R>(responder: F) -> Self
        where
            F: Fn(&str, &Value) -> Result<R, FetchError> + Send + Sync + 'static,
            R: Into<GraphQlResponse>,
        {
            Self {
                responder: Box::new(move |query: &str, variables: &Value| {
                    responder(query, variables).map(Into::into)
                }),
                calls: Mutex::new(Vec::new()),
            }
        }

        pub fn call_count(&self) -> usize {
            self.calls.lock().len()
        }
    }

    #[async_trait::async_trait]
    impl GraphQlClient for ScriptedClient {
        async fn execute(
            &self,
            query: &str,
            variables: Value,
        ) -> Result<GraphQlResponse, FetchError> {
            self.calls.lock().push((query.to_string(), variables.clone()));
            (self.responder)(query, &variables)
        }
    }

    #[derive(Default)]
    pub struct RecordingNotifier {
        pub messages: Mutex<Vec<String>>,
    }

    #[async_trait::async_trait]
    impl Notifier for RecordingNotifier {
        async fn notify(&self, text: &str) {
            self.messages.lock().push(text.to_string());
        }
    }
}
