use config::builder::DefaultState;
use config::{Config, ConfigBuilder, ConfigError, Environment, File};
use serde::Deserialize;
use std::collections::HashMap;

#[derive(Debug, Clone, Deserialize)]
pub struct Kafka {
    pub brokers: String,
    pub client_id: String,
    pub session_timeout_ms: u64,
    pub connect_timeout_ms: u64,
    /// passed to librdkafka as is
    #[serde(default)]
    pub properties: HashMap<String, String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Log {
    pub level: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub kafka: Kafka,
    pub log: Log,
}

impl Settings {
    pub fn new() -> Result<Self, ConfigError> {
        let s = Self::defaults()?
            .add_source(File::with_name("config").required(false))
            .add_source(Self::environment())
            .build()?;

        Self::from_config(s)
    }

    pub fn from_config(c: Config) -> Result<Self, ConfigError> {
        c.try_deserialize()
    }

    /// `APP_KAFKA__BROKERS` overrides `kafka.brokers`.
    fn environment() -> Environment {
        Environment::with_prefix("app")
            .prefix_separator("_")
            .separator("__")
    }

    pub fn defaults() -> Result<ConfigBuilder<DefaultState>, ConfigError> {
        Config::builder()
            .set_default("kafka.brokers", "localhost:9092")?
            .set_default("kafka.client_id", "rider-consumer")?
            .set_default("kafka.session_timeout_ms", 6000)?
            .set_default("kafka.connect_timeout_ms", 10000)?
            .set_default("log.level", "info")
    }
}
