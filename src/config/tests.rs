use super::load_config;
use super::settings::Settings;
use serial_test::serial;
use std::env;
use std::fs;
use tempfile::TempDir;

#[test]
fn test_default_settings() {
    let settings = Settings::default();
    assert_eq!(settings.connection.url, "ws://127.0.0.1:8080/realtime");
    assert_eq!(settings.connection.token_param, "token");
    assert_eq!(settings.connection.base_delay_ms, 1_000);
    assert_eq!(settings.connection.max_delay_ms, 30_000);
    assert_eq!(settings.adapters.chat_history_limit, 200);
    assert_eq!(settings.adapters.notification_limit, 50);
    assert_eq!(settings.adapters.alert_limit, 10);
    assert_eq!(settings.logging.level, "info");
}

#[test]
#[serial]
fn test_load_config_from_file_overrides_defaults() {
    // load_config reads config/default.toml relative to the working directory
    let tmp = TempDir::new().expect("create tempdir");
    let orig = env::current_dir().expect("current_dir");
    env::set_current_dir(tmp.path()).expect("set current dir");

    fs::create_dir_all("config").expect("create config dir");
    let toml = r#"
        [connection]
        url = "wss://realtime.example.test/ws"
        base_delay_ms = 250

        [adapters]
        chat_history_limit = 20
    "#;
    fs::write("config/default.toml", toml).expect("write config file");

    let cfg = load_config();
    env::set_current_dir(orig).expect("restore cwd");
    let cfg = cfg.expect("load_config failed");

    assert_eq!(cfg.connection.url, "wss://realtime.example.test/ws");
    assert_eq!(cfg.connection.base_delay_ms, 250);
    // untouched keys keep their defaults
    assert_eq!(cfg.connection.max_delay_ms, 30_000);
    assert_eq!(cfg.connection.token_param, "token");
    assert_eq!(cfg.adapters.chat_history_limit, 20);
    assert_eq!(cfg.adapters.notification_limit, 50);
}

#[test]
#[serial]
fn test_load_config_from_env_overrides_defaults() {
    temp_env::with_vars(
        [
            ("REALTIME__CONNECTION__MAX_DELAY_MS", Some("5000")),
            ("REALTIME__CONNECTION__TOKEN_PARAM", Some("access_token")),
            ("REALTIME__LOGGING__LEVEL", Some("debug")),
        ],
        || {
            let cfg = load_config().expect("load_config failed");
            assert_eq!(cfg.connection.max_delay_ms, 5_000);
            assert_eq!(cfg.connection.token_param, "access_token");
            assert_eq!(cfg.logging.level, "debug");
            assert_eq!(cfg.connection.base_delay_ms, 1_000);
        },
    );
}
