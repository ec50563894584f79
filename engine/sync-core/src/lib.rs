//! # Sync Core
//!
//! Building blocks for long-running synchronization jobs that are killed by an
//! external time limit and must resume on the next invocation.
//!
//! ## Architecture
//!
//! - **CheckpointStore**: keyed, durable progress records (`state.json`)
//! - **BatchRunner**: walks a job's work list under a time budget and
//!   checkpoints before the budget runs out
//! - **merge**: pure merge-by-key reconciliation of old and new records
//!
//! ## Usage
//!
//! ```rust
//! use std::sync::Arc;
//! use sync_core::{BatchConfig, BatchJob, BatchRunner, InMemoryCheckpointStore};
//!
//! struct Doubler;
//!
//! #[async_trait::async_trait]
//! impl BatchJob for Doubler {
//!     type Item = u32;
//!     type State = Vec<u32>;
//!
//!     fn session_key(&self) -> &str {
//!         "doubler_continuation"
//!     }
//!
//!     async fn plan(&mut self) -> anyhow::Result<(Vec<u32>, Vec<u32>)> {
//!         Ok((vec![1, 2, 3], Vec::new()))
//!     }
//!
//!     async fn process(&mut self, item: &u32, state: &mut Vec<u32>) -> anyhow::Result<()> {
//!         state.push(item * 2);
//!         Ok(())
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let store = Arc::new(InMemoryCheckpointStore::new());
//!     let config = BatchConfig { item_delay: std::time::Duration::ZERO, ..Default::default() };
//!     let runner = BatchRunner::new(store, config);
//!
//!     let report = runner.run(&mut Doubler).await?;
//!     assert!(report.is_complete());
//!     Ok(())
//! }
//! ```

pub mod batch;
pub mod checkpoint;
pub mod config;
pub mod error;
pub mod merge;

pub use batch::{BatchJob, BatchRunner, Deadline, RunOutcome, RunReport, TimeBudget};
pub use checkpoint::{
    Checkpoint, CheckpointStore, CheckpointStoreExt, FileCheckpointStore, InMemoryCheckpointStore,
};
pub use config::BatchConfig;
pub use error::{Result, SyncError};
pub use merge::{merge_by, merge_by_key, Keyed};
