use serde::Deserialize;

/// Top-level configuration settings for the application.
///
/// Includes settings for the realtime connection, the consumer adapters and logging.
#[derive(Debug, Deserialize, Clone, Default)]
pub struct Settings {
    pub connection: ConnectionSettings,
    pub adapters: AdapterSettings,
    pub logging: LoggingSettings,
}

/// Configuration settings for the realtime connection.
///
/// `url` is the websocket endpoint; the auth token is appended to it as the
/// `token_param` query parameter on every (re)connect.
#[derive(Debug, Deserialize, Clone)]
pub struct ConnectionSettings {
    pub url: String,
    pub token_param: String,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
}

/// Retention bounds for the consumer adapters.
#[derive(Debug, Deserialize, Clone)]
pub struct AdapterSettings {
    pub chat_history_limit: usize,
    pub notification_limit: usize,
    pub alert_limit: usize,
}

#[derive(Debug, Deserialize, Clone)]
pub struct LoggingSettings {
    pub level: String,
}

/// Partial configuration settings loaded from files or environment.
///
/// Every field is optional; missing values are filled from `Settings::default()`.
#[derive(Debug, Deserialize)]
pub struct PartialSettings {
    pub connection: Option<PartialConnectionSettings>,
    pub adapters: Option<PartialAdapterSettings>,
    pub logging: Option<PartialLoggingSettings>,
}

#[derive(Debug, Deserialize)]
pub struct PartialConnectionSettings {
    pub url: Option<String>,
    pub token_param: Option<String>,
    pub base_delay_ms: Option<u64>,
    pub max_delay_ms: Option<u64>,
}

#[derive(Debug, Deserialize)]
pub struct PartialAdapterSettings {
    pub chat_history_limit: Option<usize>,
    pub notification_limit: Option<usize>,
    pub alert_limit: Option<usize>,
}

#[derive(Debug, Deserialize)]
pub struct PartialLoggingSettings {
    pub level: Option<String>,
}

impl Default for ConnectionSettings {
    fn default() -> Self {
        Self {
            url: "ws://127.0.0.1:8080/realtime".to_string(),
            token_param: "token".to_string(),
            base_delay_ms: 1_000,
            max_delay_ms: 30_000,
        }
    }
}

impl Default for AdapterSettings {
    fn default() -> Self {
        Self {
            chat_history_limit: 200,
            notification_limit: 50,
            alert_limit: 10,
        }
    }
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}
