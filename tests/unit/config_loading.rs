//! Configuration file loading.

use std::path::PathBuf;
use std::time::Duration;

use jwt_auth_helper::config::{Config, ConfigError};
use jwt_auth_helper::mode::Mode;

use crate::common::temp_dir;

const VALIDATOR_CONFIG: &str = r#"
socket_path = "unix:///run/spire/sockets/agent.sock"
host = "127.0.0.1"
port = 9010
jwt_mode = "jwt_svid_validator"
audience = "spiffe://example.org/backend"
"#;

fn write_config(contents: &str) -> PathBuf {
    let path = temp_dir().join("envoy-jwt-auth-helper.conf");
    std::fs::write(&path, contents).unwrap();
    path
}

#[test]
fn test_load_minimal_file_applies_defaults() {
    let config = Config::load_file(write_config(VALIDATOR_CONFIG)).unwrap();

    assert_eq!(config.socket_path, "unix:///run/spire/sockets/agent.sock");
    assert_eq!(config.port, 9010);
    assert_eq!(config.mode, Mode::Validation);
    assert_eq!(config.audience, "spiffe://example.org/backend");
    assert_eq!(config.fetch_timeout, Duration::from_secs(5));
    assert_eq!(config.startup_timeout, Duration::from_secs(30));
    assert_eq!(config.max_concurrent_streams, 10);
    assert_eq!(config.shutdown_timeout, Duration::from_secs(30));
    assert_eq!(config.log_level, "info");
    assert!(config.json_logs);
    assert_eq!(config.listen_addr(), "127.0.0.1:9010");
}

#[test]
fn test_host_defaults_to_all_interfaces() {
    let contents = VALIDATOR_CONFIG.replace("host = \"127.0.0.1\"\n", "");
    let config = Config::load_file(write_config(&contents)).unwrap();
    assert_eq!(config.host, "0.0.0.0");
}

#[test]
fn test_mode_name_is_case_insensitive() {
    let contents = VALIDATOR_CONFIG.replace("jwt_svid_validator", "JWT_Injection");
    let config = Config::load_file(write_config(&contents)).unwrap();
    assert_eq!(config.mode, Mode::Injection);
}

#[test]
fn test_ambient_keys_are_read() {
    let contents = format!(
        "{VALIDATOR_CONFIG}fetch_timeout_secs = 2\nmax_concurrent_streams = 64\nlog_level = \"debug\"\njson_logs = false\n"
    );
    let config = Config::load_file(write_config(&contents)).unwrap();
    assert_eq!(config.fetch_timeout, Duration::from_secs(2));
    assert_eq!(config.max_concurrent_streams, 64);
    assert_eq!(config.log_level, "debug");
    assert!(!config.json_logs);
}

#[test]
fn test_missing_file_names_path_and_flag() {
    let path = temp_dir().join("absent.conf");
    let err = Config::load_file(&path).unwrap_err();

    assert!(matches!(err, ConfigError::NotFound { .. }));
    let message = err.to_string();
    assert!(message.contains("absent.conf"), "{message}");
    assert!(message.contains("--config"), "{message}");
}

#[test]
fn test_unknown_mode_is_rejected() {
    let contents = VALIDATOR_CONFIG.replace("jwt_svid_validator", "jwt_passthrough");
    let err = Config::load_file(write_config(&contents)).unwrap_err();

    assert!(matches!(err.root(), ConfigError::UnknownMode(_)));
    assert!(err.to_string().contains("jwt_passthrough"));
}

#[test]
fn test_rejected_settings_name_the_resolved_file() {
    let contents = VALIDATOR_CONFIG.replace("jwt_svid_validator", "jwt_bogus");
    let path = write_config(&contents);
    let err = Config::load_file(&path).unwrap_err();

    let message = err.to_string();
    assert!(message.contains(&path.display().to_string()), "{message}");
    assert!(message.contains("jwt_bogus"), "{message}");

    let without_audience = VALIDATOR_CONFIG.replace("audience = \"spiffe://example.org/backend\"\n", "");
    let path = write_config(&without_audience);
    let message = Config::load_file(&path).unwrap_err().to_string();
    assert!(message.contains(&path.display().to_string()), "{message}");
}

#[test]
fn test_missing_mode_is_rejected() {
    let contents = VALIDATOR_CONFIG.replace("jwt_mode = \"jwt_svid_validator\"\n", "");
    let err = Config::load_file(write_config(&contents)).unwrap_err();
    assert!(matches!(err.root(), ConfigError::MissingRequired(field) if field == "jwt_mode"));
}

#[test]
fn test_missing_audience_is_rejected() {
    let contents = VALIDATOR_CONFIG.replace("audience = \"spiffe://example.org/backend\"\n", "");
    let err = Config::load_file(write_config(&contents)).unwrap_err();
    assert!(matches!(err.root(), ConfigError::MissingRequired(field) if field == "audience"));
}

#[test]
fn test_port_out_of_range_is_rejected() {
    let zero = VALIDATOR_CONFIG.replace("port = 9010", "port = 0");
    assert!(matches!(
        Config::load_file(write_config(&zero)).unwrap_err().root(),
        ConfigError::InvalidPort
    ));

    let too_large = VALIDATOR_CONFIG.replace("port = 9010", "port = 70000");
    assert!(matches!(
        Config::load_file(write_config(&too_large)).unwrap_err(),
        ConfigError::Decode { .. }
    ));
}

#[test]
fn test_unparsable_file_is_rejected() {
    let err = Config::load_file(write_config("socket_path = \n")).unwrap_err();
    assert!(matches!(err, ConfigError::Decode { .. }));
}

#[test]
fn test_environment_overrides_file() {
    let path = write_config(VALIDATOR_CONFIG);

    // SAFETY: no other test in this binary reads JWT_AUTH_HELPER_* variables
    unsafe { std::env::set_var("JWT_AUTH_HELPER_PORT", "9443") };
    let result = Config::load(&path);
    unsafe { std::env::remove_var("JWT_AUTH_HELPER_PORT") };

    let config = result.unwrap();
    assert_eq!(config.port, 9443);
    assert_eq!(config.mode, Mode::Validation);
}
