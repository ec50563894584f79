//! # Command Line Interface
//!
//! One subcommand per job. Every batch job runs until it finishes or its time
//! budget runs out; a suspended job resumes on the next invocation.

use crate::client::SorareClient;
use crate::config::{ConfigOverrides, JobSettings, SyncConfig};
use crate::jobs::{CardsJob, FloorsJob, JobContext, SalesHistoryJob, SalesLimits};
use crate::lineup::write_best_lineup;
use crate::notify::notifier_from_config;
use crate::rates::CurrencyRates;
use crate::sheet::{CsvTable, Table};
use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use sync_core::{BatchJob, BatchRunner, FileCheckpointStore, RunOutcome};
use tracing::info;

/// Sorare gallery, sales and floor-price synchronization
#[derive(Parser, Debug)]
#[command(name = "sorare-sync")]
#[command(about = "Resumable Sorare card, sales and floor-price synchronization")]
pub struct Cli {
    /// Configuration file (defaults to ./sorare-sync.toml when present)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Checkpoint document
    #[arg(long, global = true)]
    pub state_file: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, global = true)]
    pub log_level: Option<String>,

    /// Log format (json, pretty, compact)
    #[arg(long, global = true)]
    pub log_format: Option<String>,

    /// Command to execute
    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    /// Settings that override file and environment configuration
    pub fn overrides(&self) -> ConfigOverrides {
        ConfigOverrides {
            config_file: self.config.clone(),
            state_file: self.state_file.clone(),
            log_level: self.log_level.clone(),
            log_format: self.log_format.clone(),
        }
    }
}

#[derive(Subcommand, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Commands {
    /// Refresh every gallery card in the main sheet
    UpdateCards,
    /// Merge recent sales into the sales-history sheet
    UpdateSales,
    /// Refresh the floor-price columns of the main sheet
    UpdateFloors,
    /// Write the best SO5 lineup by projected score
    BestLineup,
}

/// CLI handler
pub struct CliHandler {
    config: SyncConfig,
    store: Arc<FileCheckpointStore>,
}

impl CliHandler {
    /// Create new CLI handler
    pub fn new(config: SyncConfig) -> Self {
        let store = Arc::new(FileCheckpointStore::new(config.state_file.clone()));
        Self { config, store }
    }

    /// Handle CLI commands
    pub async fn handle_command(&self, command: Commands) -> Result<()> {
        match command {
            Commands::UpdateCards => {
                let mut job = CardsJob::new(
                    self.job_context().await?,
                    self.config.sorare.user_slug.clone(),
                    self.open_sheet(&self.config.sheets.main_sheet)?,
                );
                self.run_job(&mut job, &self.config.jobs.cards).await
            }
            Commands::UpdateSales => {
                let mut job = SalesHistoryJob::new(
                    self.job_context().await?,
                    self.open_sheet(&self.config.sheets.main_sheet)?,
                    self.open_sheet(&self.config.sheets.sales_sheet)?,
                    SalesLimits::from(&self.config.jobs),
                );
                self.run_job(&mut job, &self.config.jobs.sales).await
            }
            Commands::UpdateFloors => {
                let mut job = FloorsJob::new(
                    self.job_context().await?,
                    self.open_sheet(&self.config.sheets.main_sheet)?,
                    self.config.jobs.floor_batch_size,
                );
                self.run_job(&mut job, &self.config.jobs.floors).await
            }
            Commands::BestLineup => {
                let main = self.open_sheet(&self.config.sheets.main_sheet)?;
                let mut output = self.open_sheet(&self.config.sheets.lineup_sheet)?;
                let lineup = write_best_lineup(&*main, &mut *output)?;
                info!("Expected XP of the best lineup: {:.2}", lineup.total_xp);
                Ok(())
            }
        }
    }

    async fn job_context(&self) -> Result<JobContext> {
        let client = SorareClient::new(&self.config.sorare)?;
        let notifier = notifier_from_config(&self.config.telegram);
        let rates = CurrencyRates::fetch().await;
        Ok(JobContext::new(Arc::new(client), Arc::from(notifier), rates))
    }

    fn open_sheet(&self, name: &str) -> Result<Box<dyn Table>> {
        let path = self.config.sheets.sheet_path(name);
        let table = CsvTable::open(name, &path)
            .with_context(|| format!("Failed to open sheet {name} at {path:?}"))?;
        Ok(Box::new(table))
    }

    async fn run_job<J: BatchJob>(&self, job: &mut J, settings: &JobSettings) -> Result<()> {
        let runner = BatchRunner::new(self.store.clone(), settings.batch_config());
        let report = runner
            .run(job)
            .await
            .with_context(|| format!("Job {} aborted", job.session_key()))?;

        match report.outcome {
            RunOutcome::Completed => info!(
                "Job {} completed: {} processed, {} failed in {:.2}s",
                report.session_key,
                report.processed,
                report.failed,
                report.elapsed.as_secs_f64()
            ),
            RunOutcome::Suspended { next_index } => info!(
                "Job {} suspended at item {}/{}; run again to resume",
                report.session_key, next_index, report.total_items
            ),
        }
        Ok(())
    }
}
