//! Config module tests

use std::time::Duration;

use super::*;

#[test]
fn test_default_config() {
    let config = Config::default();
    assert_eq!(config.owfs.address, "localhost:4304");
    assert_eq!(config.mqtt.host, "localhost");
    assert_eq!(config.mqtt.port, 1883);
    assert_eq!(config.mqtt.keepalive, 10);
    assert_eq!(config.mqtt.qos, 0);
    assert!(config.mqtt.retain);
    assert_eq!(config.mqtt.topic_prefix, "/1wire");
    assert_eq!(config.scan.interval, 10);
    assert_eq!(config.scan.root, "/");
    assert_eq!(config.scan.ignore.len(), 8);
    assert!(config.scan.ignore.contains(&"/system/".to_string()));
    assert!(config.mqtt.client_id.starts_with("owmqtt-"));
    config.validate().unwrap();
}

#[test]
fn test_parse_overrides() {
    let config = Config::parse(
        r#"
[owfs]
address = "owhost:4304"
timeout = 2

[mqtt]
host = "broker.local"
port = 8883
qos = 1
retain = false
topic_prefix = "/sensors"

[scan]
interval = 30
ignore = ["/settings/"]
"#,
    )
    .unwrap();

    assert_eq!(config.owfs.address, "owhost:4304");
    assert_eq!(config.owfs.timeout_duration(), Duration::from_secs(2));
    assert_eq!(config.mqtt.host, "broker.local");
    assert_eq!(config.mqtt.port, 8883);
    assert_eq!(config.mqtt.qos, 1);
    assert!(!config.mqtt.retain);
    assert_eq!(config.mqtt.topic_prefix, "/sensors");
    assert_eq!(config.scan.interval_duration(), Duration::from_secs(30));
    assert_eq!(config.scan.ignore, vec!["/settings/".to_string()]);
}

#[test]
fn test_validate_rejects_bad_qos() {
    let result = Config::parse("[mqtt]\nqos = 3\n");
    assert!(matches!(result, Err(ConfigError::Validation(_))));
}

#[test]
fn test_validate_rejects_zero_interval() {
    let result = Config::parse("[scan]\ninterval = 0\n");
    assert!(matches!(result, Err(ConfigError::Validation(_))));
}

#[test]
fn test_validate_rejects_non_container_root() {
    let result = Config::parse("[scan]\nroot = \"/28.AA\"\n");
    assert!(matches!(result, Err(ConfigError::Validation(_))));
}

#[test]
fn test_validate_rejects_empty_owfs_address() {
    let result = Config::parse("[owfs]\naddress = \"\"\n");
    assert!(matches!(result, Err(ConfigError::Validation(_))));
}

#[test]
fn test_substitute_env_vars_simple() {
    std::env::set_var("OWMQTT_TEST_VAR_SIMPLE", "hello");
    let result = substitute_env_vars("value = \"${OWMQTT_TEST_VAR_SIMPLE}\"");
    assert_eq!(result, "value = \"hello\"");
    std::env::remove_var("OWMQTT_TEST_VAR_SIMPLE");
}

#[test]
fn test_substitute_env_vars_with_default() {
    std::env::remove_var("OWMQTT_TEST_VAR_UNSET");
    let result = substitute_env_vars("value = \"${OWMQTT_TEST_VAR_UNSET:-fallback}\"");
    assert_eq!(result, "value = \"fallback\"");
}

#[test]
fn test_load_config_with_env_substitution() {
    let temp_dir = std::env::temp_dir();
    let config_path = temp_dir.join("owmqtt_test_config.toml");

    std::env::set_var("OWMQTT_TEST_BROKER_HOST", "10.0.0.7");

    let config_content = r#"
[mqtt]
host = "${OWMQTT_TEST_BROKER_HOST}"
port = ${OWMQTT_TEST_BROKER_PORT:-1884}
"#;

    std::fs::write(&config_path, config_content).unwrap();

    let config = Config::load(&config_path).unwrap();
    assert_eq!(config.mqtt.host, "10.0.0.7");
    assert_eq!(config.mqtt.port, 1884); // Uses default

    std::fs::remove_file(&config_path).ok();
    std::env::remove_var("OWMQTT_TEST_BROKER_HOST");
}

#[test]
fn test_missing_file_falls_back_to_defaults() {
    let config = Config::load("/nonexistent/owmqtt.toml").unwrap();
    assert_eq!(config.mqtt.port, 1883);
    assert_eq!(config.scan.ignore.len(), 8);
}
