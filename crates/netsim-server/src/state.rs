use crate::relay::RelayHub;
use crate::ws::connections::ConnectionManager;
use anyhow::Context;
use std::sync::Arc;
use std::time::Duration;

/// Fits the largest media file a client may send once base64-encoded, plus
/// the JSON envelope
const DEFAULT_MAX_MESSAGE_BYTES: usize = netsim_protocol::limits::MAX_MESSAGE_BYTES;

#[derive(Clone, Debug)]
pub struct Config {
    pub bind_address: String,
    pub room_idle_timeout: Duration,
    pub sweep_interval: Duration,
    pub max_message_bytes: usize,
    pub cors_allow_any: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:3001".to_string(),
            room_idle_timeout: Duration::from_secs(600),
            sweep_interval: Duration::from_secs(60),
            max_message_bytes: DEFAULT_MAX_MESSAGE_BYTES,
            cors_allow_any: true,
        }
    }
}

impl Config {
    pub fn load() -> anyhow::Result<Self> {
        // A missing .env file is fine
        if let Ok(path) = dotenvy::dotenv() {
            tracing::debug!("Loaded environment from {}", path.display());
        }

        let defaults = Config::default();

        let bind_address = match (std::env::var("BIND_ADDRESS"), std::env::var("PORT")) {
            (Ok(addr), _) => addr,
            (Err(_), Ok(port)) => format!("0.0.0.0:{}", port),
            _ => defaults.bind_address,
        };

        let room_idle_timeout = env_parse("ROOM_IDLE_TIMEOUT_SECS")?
            .map(Duration::from_secs)
            .unwrap_or(defaults.room_idle_timeout);

        let sweep_interval = env_parse("SWEEP_INTERVAL_SECS")?
            .map(Duration::from_secs)
            .unwrap_or(defaults.sweep_interval);
        if sweep_interval.is_zero() {
            anyhow::bail!("SWEEP_INTERVAL_SECS must be greater than zero");
        }

        let max_message_bytes =
            env_parse("MAX_MESSAGE_BYTES")?.unwrap_or(defaults.max_message_bytes);

        let cors_allow_any = env_parse("CORS_ALLOW_ANY")?.unwrap_or(defaults.cors_allow_any);

        Ok(Config {
            bind_address,
            room_idle_timeout,
            sweep_interval,
            max_message_bytes,
            cors_allow_any,
        })
    }
}

fn env_parse<T>(key: &str) -> anyhow::Result<Option<T>>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match std::env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .with_context(|| format!("Invalid value for {}: {:?}", key, raw)),
        Err(_) => Ok(None),
    }
}

#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    pub connections: Arc<ConnectionManager>,
    pub relay: Arc<RelayHub>,
}

impl AppState {
    pub fn new(config: Config) -> Self {
        let connections = Arc::new(ConnectionManager::new());
        let relay = Arc::new(RelayHub::new(connections.clone()));

        Self {
            config,
            connections,
            relay,
        }
    }
}
