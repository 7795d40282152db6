//! Loading and validation of settings.
//!
//! Values defined in the configuration file can be overridden by environment variables. An
//! example configuration file can be found in the `configs/` directory located in the
//! repository root.

mod client_config;

use std::{fmt, path::Path};

use config::{Config, ConfigError, Environment};
use serde::{
    de::{self, Deserializer, Visitor},
    Deserialize,
};
use thiserror::Error;
use tracing_subscriber::filter::EnvFilter;
use validator::{Validate, ValidationErrors};

pub use self::client_config::ClientConfig;
use crate::identity::{ScopeId, SessionRequest, WorkerId};

#[derive(Error, Debug)]
/// An error related to loading and validation of settings.
pub enum SettingsError {
    #[error("configuration loading failed: {0}")]
    Loading(#[from] ConfigError),
    #[error("validation failed: {0}")]
    Validation(#[from] ValidationErrors),
}

#[derive(Debug, Validate, Deserialize)]
/// The combined settings.
///
/// Each section in the configuration file corresponds to the identically named settings field.
pub struct Settings {
    #[validate]
    pub worker: WorkerSettings,
    #[validate]
    pub job: JobSettings,
    #[validate]
    pub local: LocalSettings,
    pub log: LoggingSettings,
}

impl Settings {
    /// Loads and validates the settings via a configuration file.
    ///
    /// # Errors
    /// Fails when the loading of the configuration file or its validation failed.
    pub fn new(path: impl AsRef<Path>) -> Result<Self, SettingsError> {
        let settings: Settings = Self::load(path)?;
        settings.validate()?;
        Ok(settings)
    }

    fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let mut config = Config::new();
        config.merge(config::File::from(path.as_ref()))?;
        config.merge(Environment::with_prefix("xaynet").separator("__"))?;
        config.try_into()
    }
}

#[derive(Debug, Clone, Validate, Deserialize)]
/// The worker settings.
pub struct WorkerSettings {
    /// The worker ID to present to the coordinator. If unset, the coordinator assigns
    /// one, and it is published once the worker is identified so that it can be
    /// reused to rejoin the scope later.
    ///
    /// # Examples
    ///
    /// **TOML**
    /// ```text
    /// [worker]
    /// worker_id = "3f1c..."
    /// ```
    ///
    /// **Environment variable**
    /// ```text
    /// XAYNET_WORKER__WORKER_ID=3f1c...
    /// ```
    #[serde(default)]
    pub worker_id: Option<String>,

    /// The scope to join. If unset, the worker asks the coordinator to create a new
    /// scope and becomes its creator.
    ///
    /// # Examples
    ///
    /// **TOML**
    /// ```text
    /// [worker]
    /// scope_id = "9a0b..."
    /// ```
    ///
    /// **Environment variable**
    /// ```text
    /// XAYNET_WORKER__SCOPE_ID=9a0b...
    /// ```
    #[serde(default)]
    pub scope_id: Option<String>,

    /// The name of the plan invoked for every training batch.
    #[serde(default = "default_training_plan")]
    pub training_plan: String,

    /// Number of round progress events that may be pending in the event channel
    /// before the round waits for the embedding application.
    #[serde(default = "default_event_buffer")]
    #[validate(range(min = 1))]
    pub event_buffer: usize,

    /// Interval in milliseconds at which the agent polls the state machine when it
    /// can't make progress.
    #[serde(default = "default_tick_ms")]
    #[validate(range(min = 1))]
    pub tick_ms: u64,
}

fn default_training_plan() -> String {
    "training_plan".to_string()
}

fn default_event_buffer() -> usize {
    64
}

fn default_tick_ms() -> u64 {
    100
}

impl Default for WorkerSettings {
    fn default() -> Self {
        Self {
            worker_id: None,
            scope_id: None,
            training_plan: default_training_plan(),
            event_buffer: default_event_buffer(),
            tick_ms: default_tick_ms(),
        }
    }
}

impl WorkerSettings {
    /// The identity to present during the handshake.
    pub fn session_request(&self) -> SessionRequest {
        SessionRequest {
            worker_id: self.worker_id.clone().map(WorkerId::from),
            scope_id: self.scope_id.clone().map(ScopeId::from),
        }
    }
}

#[derive(Debug, Clone, Validate, Deserialize)]
/// The job served by the local coordinator.
pub struct JobSettings {
    pub name: String,
    pub version: String,
    pub protocol: String,
    #[validate]
    pub client_config: ClientConfig,
}

#[derive(Debug, Clone, Validate, Deserialize)]
/// Settings of the in-process simulation run by the `worker` binary.
pub struct LocalSettings {
    /// Number of workers to run. The first one creates the scope and the others join it.
    #[validate(range(min = 1))]
    pub workers: usize,
    /// Number of samples in each worker's synthetic dataset.
    #[validate(range(min = 1))]
    pub samples: usize,
    /// Number of input features.
    #[validate(range(min = 1))]
    pub features: usize,
    /// Number of classes.
    #[validate(range(min = 2))]
    pub classes: usize,
    /// Seed of the synthetic data generator.
    #[serde(default)]
    pub seed: u64,
}

#[derive(Debug, Deserialize)]
/// The logging settings.
pub struct LoggingSettings {
    /// A comma-separated list of logging directives. More information about logging directives
    /// can be found [here].
    ///
    /// # Examples
    ///
    /// **TOML**
    /// ```text
    /// [log]
    /// filter = "info"
    /// ```
    ///
    /// **Environment variable**
    /// ```text
    /// XAYNET_LOG__FILTER=info
    /// ```
    ///
    /// [here]: https://docs.rs/tracing-subscriber/0.2.15/tracing_subscriber/filter/struct.EnvFilter.html#directives
    #[serde(deserialize_with = "deserialize_env_filter")]
    pub filter: EnvFilter,
}

fn deserialize_env_filter<'de, D>(deserializer: D) -> Result<EnvFilter, D::Error>
where
    D: Deserializer<'de>,
{
    struct EnvFilterVisitor;

    impl<'de> Visitor<'de> for EnvFilterVisitor {
        type Value = EnvFilter;

        fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
            write!(formatter, "a valid tracing filter directive: https://docs.rs/tracing-subscriber/0.2.15/tracing_subscriber/filter/struct.EnvFilter.html#directives")
        }

        fn visit_str<E>(self, value: &str) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            EnvFilter::try_new(value)
                .map_err(|_| de::Error::invalid_value(serde::de::Unexpected::Str(value), &self))
        }
    }

    deserializer.deserialize_str(EnvFilterVisitor)
}
