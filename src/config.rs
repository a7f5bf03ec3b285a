//! Dashboard configuration.
//!
//! Values come from `config.toml` (flag path, or the one inside the data
//! directory), then environment variables override individual keys. A `.env`
//! file in the working directory is loaded first so it can supply those
//! variables.

use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::AppError;

pub const HOME_ENV: &str = "PERFDASH_HOME";
pub const DATABASE_URL_ENV: &str = "DATABASE_URL";
pub const PERFORMANCE_CSV_ENV: &str = "PERFDASH_PERFORMANCE_CSV";
pub const TASKS_CSV_ENV: &str = "PERFDASH_TASKS_CSV";
pub const CHAT_API_KEY_ENV: &str = "PERFDASH_CHAT_API_KEY";
pub const CHAT_BASE_URL_ENV: &str = "PERFDASH_CHAT_BASE_URL";
pub const CHAT_MODEL_ENV: &str = "PERFDASH_CHAT_MODEL";

const DEFAULT_HOME: &str = ".perfdash";
const CONFIG_FILE: &str = "config.toml";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DashboardConfig {
    /// Data directory; relative paths below resolve against it.
    #[serde(skip)]
    pub home: PathBuf,
    pub performance_csv: Option<PathBuf>,
    pub tasks_csv: Option<PathBuf>,
    pub database_url: Option<String>,
    pub unit_delimiter: Option<String>,
    pub categories: CategorySettings,
    pub forecast: ForecastSettings,
    pub chat: ChatSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CategorySettings {
    /// Fund-disbursement categories reported separately from sales.
    pub disbursement: Vec<String>,
}

impl Default for CategorySettings {
    fn default() -> Self {
        Self {
            disbursement: vec![
                "17. PENYALURAN DANA NASIONAL".to_string(),
                "18. PENYALURAN DANA DAERAH".to_string(),
                "19. PENYALURAN DANA KORPORASI".to_string(),
            ],
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ForecastSettings {
    /// Manual projection for disbursement categories over the open months.
    pub disbursement_forecast: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChatSettings {
    pub base_url: String,
    pub model: String,
    pub api_key: Option<String>,
    pub timeout_secs: u64,
    pub system_prompt: String,
}

fn default_system_prompt() -> String {
    "You are a sales performance analyst. Answer questions using only the \
     performance data provided below. Monthly figures are in millions; \
     achievement is actual divided by target."
        .to_string()
}

impl Default for ChatSettings {
    fn default() -> Self {
        Self {
            base_url: "https://api.openai.com/v1".to_string(),
            model: "gpt-4o-mini".to_string(),
            api_key: None,
            timeout_secs: 60,
            system_prompt: default_system_prompt(),
        }
    }
}

impl ChatSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs.max(1))
    }
}

impl DashboardConfig {
    /// Loads `.env`, the TOML file and environment overrides.
    pub fn load(config_path: Option<&Path>, home: Option<PathBuf>) -> Result<Self, AppError> {
        if let Ok(path) = dotenvy::dotenv() {
            debug!("loaded environment from {}", path.display());
        }

        let home = home
            .or_else(|| env::var_os(HOME_ENV).map(PathBuf::from))
            .unwrap_or_else(|| PathBuf::from(DEFAULT_HOME));

        let file = match config_path {
            Some(path) => Some(path.to_path_buf()),
            None => {
                let candidate = home.join(CONFIG_FILE);
                candidate.is_file().then_some(candidate)
            }
        };

        let mut config = match file {
            Some(path) => {
                debug!("reading config from {}", path.display());
                Self::from_toml(&fs::read_to_string(&path)?)?
            }
            None => Self::default(),
        };
        config.home = home;
        config.apply_env(|key| env::var(key).ok());
        Ok(config)
    }

    pub fn from_toml(content: &str) -> Result<Self, AppError> {
        Ok(toml::from_str(content)?)
    }

    fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let lookup = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());
        if let Some(value) = lookup(DATABASE_URL_ENV) {
            self.database_url = Some(value);
        }
        if let Some(value) = lookup(PERFORMANCE_CSV_ENV) {
            self.performance_csv = Some(PathBuf::from(value));
        }
        if let Some(value) = lookup(TASKS_CSV_ENV) {
            self.tasks_csv = Some(PathBuf::from(value));
        }
        if let Some(value) = lookup(CHAT_API_KEY_ENV) {
            self.chat.api_key = Some(value);
        }
        if let Some(value) = lookup(CHAT_BASE_URL_ENV) {
            self.chat.base_url = value;
        }
        if let Some(value) = lookup(CHAT_MODEL_ENV) {
            self.chat.model = value;
        }
    }

    fn resolve(&self, path: Option<&PathBuf>, default_name: &str) -> PathBuf {
        match path {
            Some(path) if path.is_absolute() => path.clone(),
            Some(path) => self.home.join(path),
            None => self.home.join(default_name),
        }
    }

    pub fn performance_path(&self) -> PathBuf {
        self.resolve(self.performance_csv.as_ref(), "performance.csv")
    }

    pub fn tasks_csv_path(&self) -> PathBuf {
        self.resolve(self.tasks_csv.as_ref(), "tasks.csv")
    }

    /// Explicit URL if configured, otherwise a SQLite file in the data dir.
    pub fn database_url(&self) -> Option<&str> {
        self.database_url.as_deref()
    }

    pub fn database_path(&self) -> PathBuf {
        self.home.join("perfdash.db")
    }

    pub fn unit_delimiter(&self) -> &str {
        self.unit_delimiter.as_deref().unwrap_or(" & ")
    }
}
