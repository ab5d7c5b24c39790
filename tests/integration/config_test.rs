//! Integration tests for configuration loading

use mindful_ws::config::Config;
use mindful_ws::ws::ManagerConfig;
use std::time::Duration;

#[test]
fn test_config_example_loads() {
    let config: Config = toml::from_str(include_str!("../../config.toml.example")).unwrap();
    assert_eq!(config.connection.manager_config(), ManagerConfig::default());
    assert!(config.ping.enabled);
    assert_eq!(config.ping.connect_options().ping_interval, Duration::from_secs(30));
    assert!(config.telemetry.metrics_port.is_none());
}

#[test]
fn test_config_file_round_trip_through_disk() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.toml");
    std::fs::write(
        &path,
        r#"
            [connection]
            url = "ws://localhost:8000/ws"
            allow_insecure_localhost = true
        "#,
    )
    .unwrap();

    let config = Config::load(&path).unwrap();
    assert_eq!(config.connection.url.as_deref(), Some("ws://localhost:8000/ws"));
    assert!(config.connection.manager_config().allow_insecure_localhost);
}
