pub mod activities;
pub mod app_config;
pub mod config;
pub mod providers;
pub mod runs;

use thiserror::Error;

pub use activities::{NormalizedActivity, RegistrationStatus, WeekdaySet};
pub use app_config::{AppConfig, Environment};
pub use config::{load_app_config, load_app_config_from_env};
pub use providers::{
    load_providers, parse_providers, DetailFields, DetailSchema, FieldSelector, LevelSchema,
    ListingFields, ListingSchema, ProviderConfig, ProvidersFile, StepAction, TraversalSchema,
    SUPPORTED_SCHEMA_VERSION,
};
pub use runs::{RunCounts, RunStatus, TriggerSource, ZeroResultPolicy};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("invalid value for {var}: {reason}")]
    InvalidEnvVar { var: String, reason: String },

    #[error("failed to read providers file {path}: {source}")]
    ProvidersFileIo {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse providers file: {0}")]
    ProvidersFileParse(#[from] serde_yaml::Error),

    #[error("provider config validation failed: {0}")]
    Validation(String),
}
