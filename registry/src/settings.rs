use crate::info;
use crate::logger::Level;
use config::{Config, ConfigError, Environment, File};
use dotenv::dotenv;
use serde::Deserialize;
use std::path::PathBuf;
use std::sync::Once;
use std::time::Duration;

static DOTENV_ONCE: Once = Once::new();

fn ensure_dotenv_loaded() {
    DOTENV_ONCE.call_once(|| {
        match dotenv() {
            Ok(_) => info!("Config loaded including .env file."),
            Err(_) => info!("Config loaded without .env file."),
        }
    });
}

fn duration_from_millis<'de, D>(deserializer: D) -> Result<Duration, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let millis = u64::deserialize(deserializer)?;
    Ok(Duration::from_millis(millis))
}

#[derive(Debug, Deserialize, Clone)]
pub struct RegistryConfig {
    pub store: StoreSettings,
    pub log: LogSettings,
}

#[derive(Debug, Deserialize, Clone)]
pub struct StoreSettings {
    pub db_path: PathBuf,
    pub db_cache_size_mb: usize,
    /// Upper bound for a single store transaction, expiry surfaces as a retryable failure.
    #[serde(rename = "op_timeout_ms", deserialize_with = "duration_from_millis")]
    pub op_timeout: Duration,
}

#[derive(Debug, Deserialize, Clone)]
pub struct LogSettings {
    pub level: Level,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        RegistryConfig {
            store: StoreSettings {
                db_path: std::env::temp_dir().join("registry").join("registry.redb"),
                db_cache_size_mb: 64,
                op_timeout: Duration::from_secs(5),
            },
            log: LogSettings { level: Level::Info },
        }
    }
}

impl RegistryConfig {
    /// Reads the TOML file at `path`, overridden by `REGISTRY__SECTION__KEY` variables.
    pub fn new(path: &str) -> Result<Self, ConfigError> {
        ensure_dotenv_loaded();
        let builder = Config::builder()
            .add_source(File::with_name(path).required(true))
            .add_source(Environment::with_prefix("REGISTRY").try_parsing(true).separator("__"));
        let config = builder.build()?.try_deserialize::<RegistryConfig>()?;
        crate::logger::set_level(config.log.level);
        info!("{:#?}", config);
        Ok(config)
    }
}
