//! # Sorare Sync
//!
//! Keeps tabular sheets of a Sorare manager's gallery up to date.
//!
//! ## Jobs
//!
//! - **update-cards**: one main-sheet row per gallery card with details,
//!   statistics, projection and floor prices
//! - **update-sales**: per player and rarity, the most recent sales merged
//!   with the ones already stored
//! - **update-floors**: the six floor-price columns of every main-sheet row
//! - **best-lineup**: the best SO5 lineup by projected score
//!
//! The batch jobs run on [`sync_core::BatchRunner`] and checkpoint their
//! progress into a shared `state.json` before their time budget runs out.

pub mod cli;
pub mod client;
pub mod config;
pub mod jobs;
pub mod lineup;
pub mod logging;
pub mod models;
pub mod notify;
pub mod queries;
pub mod rates;
pub mod sales;
pub mod sheet;

pub use cli::{Cli, CliHandler, Commands};
pub use client::{FetchError, GraphQlClient, GraphQlResponse, SorareClient};
pub use config::{load_config, ConfigOverrides, SyncConfig};
pub use logging::initialize_logging;
pub use sheet::{CsvTable, SheetError, Table};
