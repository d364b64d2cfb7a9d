//! Centralized engine configuration.
//!
//! Strongly-typed configuration loaded via the `config` crate from
//! environment variables (`DATABASE_URL`, `NATS__URL`, ...).

use amber_relay_workflow::NatsConfig;
use serde::Deserialize;

/// Engine configuration.
#[derive(Debug, Deserialize)]
pub struct EngineConfig {
    /// PostgreSQL database connection URL.
    pub database_url: String,

    /// NATS connection and subject configuration.
    #[serde(default)]
    pub nats: NatsConfig,

    /// Maximum database connections.
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

fn default_max_connections() -> u32 {
    5
}

impl EngineConfig {
    /// Loads configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if required configuration is missing or invalid.
    pub fn from_env() -> Result<Self, config::ConfigError> {
        config::Config::builder()
            .add_source(
                config::Environment::default()
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()
    }
}
