use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

const APP_DIR_NAME: &str = "searchview";
const CONFIG_FILE_NAME: &str = "config.toml";
const HISTORY_DB_FILE_NAME: &str = "history.sqlite3";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to access config at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config at {path}: {message}")]
    Parse { path: PathBuf, message: String },
    #[error("failed to encode config: {0}")]
    Encode(#[from] toml::ser::Error),
    #[error("invalid config: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub history_enabled: bool,
    pub voice_enabled: bool,
    pub max_suggestions_shown: u16,
    pub max_history_entries: u32,
    pub debounce_ms: u64,
    pub log_level: String,
    pub history_db_path: PathBuf,
    #[serde(skip)]
    pub config_path: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        let base = stable_app_data_dir();
        Self {
            history_enabled: true,
            voice_enabled: true,
            max_suggestions_shown: 5,
            max_history_entries: 1000,
            debounce_ms: 300,
            log_level: "info".to_string(),
            history_db_path: base.join(HISTORY_DB_FILE_NAME),
            config_path: base.join(CONFIG_FILE_NAME),
        }
    }
}

impl Config {
    pub fn debounce(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.debounce_ms)
    }
}

pub fn stable_app_data_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join(APP_DIR_NAME)
}

pub fn default_config_path() -> PathBuf {
    stable_app_data_dir().join(CONFIG_FILE_NAME)
}

pub fn validate(cfg: &Config) -> Result<(), ConfigError> {
    if !(1..=50).contains(&cfg.max_suggestions_shown) {
        return Err(ConfigError::Invalid(
            "max_suggestions_shown must be between 1 and 50".into(),
        ));
    }

    if cfg.max_history_entries < u32::from(cfg.max_suggestions_shown)
        || cfg.max_history_entries > 100_000
    {
        return Err(ConfigError::Invalid(
            "max_history_entries must be between max_suggestions_shown and 100000".into(),
        ));
    }

    if cfg.debounce_ms > 5_000 {
        return Err(ConfigError::Invalid(
            "debounce_ms must not exceed 5000".into(),
        ));
    }

    if cfg.history_db_path.as_os_str().is_empty() {
        return Err(ConfigError::Invalid("history_db_path is required".into()));
    }

    Ok(())
}

/// Loads the config at `path` (or the default location). A missing file
/// yields defaults bound to that path.
pub fn load(path: Option<&Path>) -> Result<Config, ConfigError> {
    let path = path.map(Path::to_path_buf).unwrap_or_else(default_config_path);
    if !path.exists() {
        tracing::info!("no config file at {}, using defaults", path.display());
        return Ok(Config {
            config_path: path,
            ..Config::default()
        });
    }

    let raw = std::fs::read_to_string(&path).map_err(|source| ConfigError::Io {
        path: path.clone(),
        source,
    })?;
    let mut cfg = parse(&path, &raw)?;
    cfg.config_path = path;
    validate(&cfg)?;
    Ok(cfg)
}

pub fn save(cfg: &Config) -> Result<(), ConfigError> {
    validate(cfg)?;
    if let Some(parent) = cfg.config_path.parent() {
        std::fs::create_dir_all(parent).map_err(|source| ConfigError::Io {
            path: parent.to_path_buf(),
            source,
        })?;
    }

    let encoded = toml::to_string_pretty(cfg)?;
    std::fs::write(&cfg.config_path, encoded).map_err(|source| ConfigError::Io {
        path: cfg.config_path.clone(),
        source,
    })
}

fn parse(path: &Path, raw: &str) -> Result<Config, ConfigError> {
    let is_json = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.eq_ignore_ascii_case("json") || ext.eq_ignore_ascii_case("json5"))
        .unwrap_or(false);

    let parsed = if is_json {
        json5::from_str::<Config>(raw).map_err(|e| e.to_string())
    } else {
        toml::from_str::<Config>(raw).map_err(|e| e.to_string())
    };

    parsed.map_err(|message| ConfigError::Parse {
        path: path.to_path_buf(),
        message,
    })
}
