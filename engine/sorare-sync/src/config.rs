//! Service configuration management
//!
//! Configuration is assembled once at process start (defaults, then an
//! optional TOML file, then environment variables) and passed by reference to
//! every component. Nothing below `main` reads the environment.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use sync_core::BatchConfig;

/// Config file picked up from the working directory when none is given
pub const DEFAULT_CONFIG_FILE: &str = "sorare-sync.toml";

/// Main configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Sorare API access
    pub sorare: SorareConfig,

    /// Where sheets are stored
    pub sheets: SheetsConfig,

    /// Telegram notifications
    pub telegram: TelegramConfig,

    /// Per-job budgets and limits
    pub jobs: JobsConfig,

    /// Checkpoint document path
    pub state_file: PathBuf,

    /// Logging configuration
    pub logging: LoggingConfig,
}

/// Sorare GraphQL API settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SorareConfig {
    /// GraphQL endpoint
    pub api_url: String,

    /// API key sent in the `APIKEY` header
    pub api_key: String,

    /// Slug of the user whose gallery is synchronized
    pub user_slug: String,

    /// Value of the `X-Sorare-ApiVersion` header
    pub api_version: String,

    /// Per-request timeout in seconds
    pub timeout_secs: u64,
}

/// Sheet storage settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SheetsConfig {
    /// Directory holding one CSV file per sheet
    pub data_dir: PathBuf,

    /// Main card sheet
    pub main_sheet: String,

    /// Sales history sheet
    pub sales_sheet: String,

    /// Best lineup report sheet
    pub lineup_sheet: String,
}

/// Telegram bot settings; notifications are disabled unless both are set
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TelegramConfig {
    /// Bot token
    pub bot_token: Option<String>,

    /// Destination chat
    pub chat_id: Option<String>,
}

/// Budget and pacing of one job
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobSettings {
    /// Wall-clock budget per invocation in seconds
    pub time_budget_secs: u64,

    /// Pause after every item in milliseconds
    pub item_delay_ms: u64,
}

/// Settings of all jobs
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct JobsConfig {
    /// Card refresh
    pub cards: JobSettings,

    /// Sales history refresh
    pub sales: JobSettings,

    /// Floor price refresh
    pub floors: JobSettings,

    /// Sales kept per player and rarity
    pub max_sales_retained: usize,

    /// Sales requested when a history row already exists
    pub max_sales_from_api: usize,

    /// Sales requested for a player seen for the first time
    pub initial_sales_fetch: usize,

    /// Players priced per floor-price request
    pub floor_batch_size: usize,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,

    /// Log format (json, pretty, compact)
    pub format: String,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            sorare: SorareConfig::default(),
            sheets: SheetsConfig::default(),
            telegram: TelegramConfig::default(),
            jobs: JobsConfig::default(),
            state_file: PathBuf::from(sync_core::checkpoint::DEFAULT_STATE_FILE),
            logging: LoggingConfig::default(),
        }
    }
}

impl Default for SorareConfig {
    fn default() -> Self {
        Self {
            api_url: "https://api.sorare.com/graphql".to_string(),
            api_key: String::new(),
            user_slug: String::new(),
            api_version: "v1".to_string(),
            timeout_secs: 30,
        }
    }
}

impl Default for SheetsConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./data"),
            main_sheet: "cards".to_string(),
            sales_sheet: "sales_history".to_string(),
            lineup_sheet: "best_so5_lineup".to_string(),
        }
    }
}

impl Default for JobsConfig {
    fn default() -> Self {
        Self {
            cards: JobSettings { time_budget_secs: 300, item_delay_ms: 1500 },
            sales: JobSettings { time_budget_secs: 480, item_delay_ms: 1000 },
            floors: JobSettings { time_budget_secs: 300, item_delay_ms: 1000 },
            max_sales_retained: 100,
            max_sales_from_api: 7,
            initial_sales_fetch: 20,
            floor_batch_size: 15,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self { level: "info".to_string(), format: "compact".to_string() }
    }
}

impl JobSettings {
    /// Batch runner configuration for this job
    pub fn batch_config(&self) -> BatchConfig {
        BatchConfig {
            time_budget: Duration::from_secs(self.time_budget_secs),
            item_delay: Duration::from_millis(self.item_delay_ms),
        }
    }
}

impl SorareConfig {
    /// Request timeout as a duration
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl TelegramConfig {
    /// Token and chat id, when both are configured
    pub fn credentials(&self) -> Option<(&str, &str)> {
        match (self.bot_token.as_deref(), self.chat_id.as_deref()) {
            (Some(token), Some(chat)) if !token.is_empty() && !chat.is_empty() => {
                Some((token, chat))
            }
            _ => None,
        }
    }
}

impl SheetsConfig {
    /// File backing a sheet
    pub fn sheet_path(&self, sheet: &str) -> PathBuf {
        self.data_dir.join(format!("{sheet}.csv"))
    }
}

/// Settings given on the command line; they win over file and environment
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    /// Explicit config file
    pub config_file: Option<PathBuf>,

    /// Explicit checkpoint document
    pub state_file: Option<PathBuf>,

    pub log_level: Option<String>,

    pub log_format: Option<String>,
}

/// Load configuration from files and the process environment
pub fn load_config(overrides: &ConfigOverrides) -> Result<SyncConfig> {
    let mut config = match &overrides.config_file {
        Some(path) => load_from_file(path)?,
        None => {
            let default_path = Path::new(DEFAULT_CONFIG_FILE);
            if default_path.exists() {
                load_from_file(default_path)?
            } else {
                SyncConfig::default()
            }
        }
    };

    apply_env(&mut config, |name| std::env::var(name).ok());
    apply_overrides(&mut config, overrides);

    validate_config(&config)?;

    Ok(config)
}

/// Apply command-line settings
pub fn apply_overrides(config: &mut SyncConfig, overrides: &ConfigOverrides) {
    if let Some(state_file) = &overrides.state_file {
        config.state_file = state_file.clone();
    }

    if let Some(level) = &overrides.log_level {
        config.logging.level = level.clone();
    }

    if let Some(format) = &overrides.log_format {
        config.logging.format = format.clone();
    }
}

/// Load configuration from a TOML file
pub fn load_from_file(path: &Path) -> Result<SyncConfig> {
    tracing::debug!("Loading configuration from file: {:?}", path);

    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file {path:?}"))?;

    toml::from_str(&contents).with_context(|| format!("Failed to parse config file {path:?}"))
}

/// Override configuration with environment variables
pub fn apply_env<F>(config: &mut SyncConfig, var: F)
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(api_key) = var("SORARE_API_KEY") {
        config.sorare.api_key = api_key;
    }

    if let Some(user_slug) = var("USER_SLUG") {
        config.sorare.user_slug = user_slug;
    }

    if let Some(api_url) = var("SORARE_API_URL") {
        config.sorare.api_url = api_url;
    }

    if let Some(token) = var("TELEGRAM_BOT_TOKEN") {
        config.telegram.bot_token = Some(token);
    }

    if let Some(chat_id) = var("TELEGRAM_CHAT_ID") {
        config.telegram.chat_id = Some(chat_id);
    }

    if let Some(data_dir) = var("SORARE_SYNC_DATA_DIR") {
        config.sheets.data_dir = PathBuf::from(data_dir);
    }

    if let Some(state_file) = var("SORARE_SYNC_STATE_FILE") {
        config.state_file = PathBuf::from(state_file);
    }

    if let Some(level) = var("SORARE_SYNC_LOG_LEVEL") {
        config.logging.level = level;
    }

    if let Some(format) = var("SORARE_SYNC_LOG_FORMAT") {
        config.logging.format = format;
    }
}

/// Validate configuration
pub fn validate_config(config: &SyncConfig) -> Result<()> {
    if config.sorare.api_key.trim().is_empty() {
        return Err(anyhow::anyhow!("SORARE_API_KEY is not set"));
    }

    if config.sorare.user_slug.trim().is_empty() {
        return Err(anyhow::anyhow!("USER_SLUG is not set"));
    }

    match config.logging.level.as_str() {
        "trace" | "debug" | "info" | "warn" | "error" => {}
        _ => return Err(anyhow::anyhow!("Invalid log level: {}", config.logging.level)),
    }

    match config.logging.format.as_str() {
        "json" | "pretty" | "compact" => {}
        _ => return Err(anyhow::anyhow!("Invalid log format: {}", config.logging.format)),
    }

    if config.jobs.floor_batch_size == 0 {
        return Err(anyhow::anyhow!("floor_batch_size must be greater than 0"));
    }

    for (name, job) in
        [("cards", &config.jobs.cards), ("sales", &config.jobs.sales), ("floors", &config.jobs.floors)]
    {
        job.batch_config()
            .validate()
            .map_err(|e| anyhow::anyhow!("Invalid {} job settings: {}", name, e))?;
    }

    Ok(())
}
