use common::{Environment, LogLevel};
use serde::Deserialize;

#[derive(Deserialize)]
pub struct SyncConfig {
    pub log_level: LogLevel,
    pub environment: Environment,
    pub ws_url: String,
    pub api_base_url: String,
    pub reconnect_delay_ms: u64,
    pub notification_ttl_ms: u64,
}

pub fn get_configuration() -> Result<SyncConfig, config::ConfigError> {
    let config = config::Config::builder()
        .set_default("log_level", "info")?
        .set_default("environment", "development")?
        .set_default("ws_url", "ws://localhost:8000/ws")?
        .set_default("api_base_url", "http://localhost:8000")?
        .set_default("reconnect_delay_ms", 3000_i64)?
        .set_default("notification_ttl_ms", 5000_i64)?
        .add_source(
            config::Environment::with_prefix("DASHBOARD")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        )
        .build()?;

    let config: SyncConfig = config.try_deserialize::<SyncConfig>()?;

    Ok(config)
}
