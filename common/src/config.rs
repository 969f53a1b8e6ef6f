use config::{Config, ConfigError};
use serde::Deserialize;
use std::collections::HashMap;
use tracing::debug;

#[derive(Debug, Deserialize, Clone)]
pub struct Settings {
    pub storage: StorageSettings,
    #[serde(default)]
    pub collection: CollectionSettings,
    #[serde(default)]
    pub analysis: AnalysisSettings,
    #[serde(default)]
    pub logging: LoggingSettings,
}

/// Where the metadata side-car files live and how to reach them.
#[derive(Debug, Deserialize, Clone)]
pub struct StorageSettings {
    pub bucket: String,
    #[serde(default = "default_region")]
    pub region: String,
    /// Custom endpoint for MinIO / LocalStack. Path-style addressing is
    /// forced whenever this is set.
    #[serde(default)]
    pub endpoint: Option<String>,
    #[serde(default)]
    pub access_key: Option<String>,
    #[serde(default)]
    pub secret_key: Option<String>,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct CollectionSettings {
    pub prefix: String,
    pub lookback_hours: i64,
    pub concurrency: usize,
    pub max_results: Option<usize>,
    pub metadata_suffix: String,
    pub max_object_bytes: u64,
    pub fetch_timeout_secs: Option<u64>,
    pub deadline_secs: Option<u64>,
    pub max_retries: u32,
    pub retry_base_delay_ms: u64,
    pub retry_max_delay_ms: u64,
    pub filters: HashMap<String, Vec<String>>,
}

impl Default for CollectionSettings {
    fn default() -> Self {
        Self {
            prefix: String::new(),
            lookback_hours: 24,
            concurrency: 20,
            max_results: None,
            metadata_suffix: ".metadata.json".to_string(),
            max_object_bytes: 1024 * 1024,
            fetch_timeout_secs: None,
            deadline_secs: None,
            max_retries: 0,
            retry_base_delay_ms: 200,
            retry_max_delay_ms: 5_000,
            filters: HashMap::new(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct AnalysisSettings {
    pub sample_size: usize,
    pub categorical_threshold: usize,
    pub top_values: Option<usize>,
}

impl Default for AnalysisSettings {
    fn default() -> Self {
        Self {
            sample_size: 3,
            categorical_threshold: 50,
            top_values: Some(10),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct LoggingSettings {
    pub level: String,
    pub json: bool,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

fn default_region() -> String {
    "us-east-1".to_string()
}

impl Settings {
    /// Loads settings from `path` (optional) layered under `APP__`-prefixed
    /// environment variables, e.g. `APP__STORAGE__BUCKET`.
    pub fn new(path: &str) -> Result<Self, ConfigError> {
        let builder = Config::builder()
            .add_source(config::File::with_name(path).required(false))
            .add_source(
                config::Environment::with_prefix("APP")
                    .separator("__")
                    .try_parsing(true),
            );

        // Build the configuration
        let config = builder.build()?;

        let settings: Settings = config.try_deserialize()?;

        debug!(
            bucket = %settings.storage.bucket,
            prefix = %settings.collection.prefix,
            concurrency = settings.collection.concurrency,
            filters = ?settings.collection.filters,
            "Loaded collector settings"
        );

        Ok(settings)
    }
}
