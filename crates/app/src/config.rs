use std::path::PathBuf;

use anyhow::Context as _;
use directories::ProjectDirs;
use folio_engine::GeminiConfig;

pub const DB_FILE: &str = "folio.db";
pub const LOG_FILE: &str = "folio.log";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppConfig {
    pub data_dir: PathBuf,
    pub gemini: GeminiConfig,
    /// Session-only key; never written to the store.
    pub gemini_api_key: Option<String>,
    pub log_filter: String,
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let var = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let data_dir = match var("FOLIO_DATA_DIR") {
            Some(dir) => PathBuf::from(dir),
            None => ProjectDirs::from("dev", "folio", "folio")
                .context("resolve project dirs")?
                .config_dir()
                .to_path_buf(),
        };

        let defaults = GeminiConfig::default();
        let timeout_secs = match var("FOLIO_GEMINI_TIMEOUT_SECS") {
            Some(raw) => raw
                .parse::<u64>()
                .with_context(|| format!("FOLIO_GEMINI_TIMEOUT_SECS is not a number: {raw}"))?,
            None => defaults.timeout_secs,
        };
        let gemini = GeminiConfig {
            base_url: var("FOLIO_GEMINI_BASE_URL").unwrap_or(defaults.base_url),
            model: var("FOLIO_GEMINI_MODEL").unwrap_or(defaults.model),
            timeout_secs,
        };

        Ok(Self {
            data_dir,
            gemini,
            gemini_api_key: var("FOLIO_GEMINI_API_KEY"),
            log_filter: var("FOLIO_LOG").unwrap_or_else(|| "info".to_string()),
        })
    }

    pub fn db_path(&self) -> PathBuf {
        self.data_dir.join(DB_FILE)
    }

    pub fn log_path(&self) -> PathBuf {
        self.data_dir.join(LOG_FILE)
    }
}
