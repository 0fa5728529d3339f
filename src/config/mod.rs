mod settings;

use crate::config::settings::PartialSettings;
use config::{Config, ConfigError, Environment, File};

pub use settings::{AdapterSettings, ConnectionSettings, LoggingSettings, Settings};

/// Loads the configuration from `config/default` and `REALTIME__*` environment
/// variables, then merges it over `Settings::default()`.
///
/// Environment keys use `__` between sections so field names may contain `_`,
/// e.g. `REALTIME__CONNECTION__BASE_DELAY_MS=250`.
pub fn load_config() -> Result<Settings, ConfigError> {
    let builder = Config::builder()
        .add_source(File::with_name("config/default").required(false))
        .add_source(
            Environment::with_prefix("REALTIME")
                .separator("__")
                .try_parsing(true),
        );

    let config = builder.build()?;

    // Try to deserialize what is available
    let partial: PartialSettings = config.try_deserialize()?;

    Ok(merge(partial, Settings::default()))
}

fn merge(partial: PartialSettings, default: Settings) -> Settings {
    let connection = partial.connection.as_ref();
    let adapters = partial.adapters.as_ref();
    let logging = partial.logging.as_ref();

    Settings {
        connection: ConnectionSettings {
            url: connection
                .and_then(|c| c.url.clone())
                .unwrap_or(default.connection.url),
            token_param: connection
                .and_then(|c| c.token_param.clone())
                .unwrap_or(default.connection.token_param),
            base_delay_ms: connection
                .and_then(|c| c.base_delay_ms)
                .unwrap_or(default.connection.base_delay_ms),
            max_delay_ms: connection
                .and_then(|c| c.max_delay_ms)
                .unwrap_or(default.connection.max_delay_ms),
        },
        adapters: AdapterSettings {
            chat_history_limit: adapters
                .and_then(|a| a.chat_history_limit)
                .unwrap_or(default.adapters.chat_history_limit),
            notification_limit: adapters
                .and_then(|a| a.notification_limit)
                .unwrap_or(default.adapters.notification_limit),
            alert_limit: adapters
                .and_then(|a| a.alert_limit)
                .unwrap_or(default.adapters.alert_limit),
        },
        logging: LoggingSettings {
            level: logging
                .and_then(|l| l.level.clone())
                .unwrap_or(default.logging.level),
        },
    }
}

#[cfg(test)]
mod tests;
