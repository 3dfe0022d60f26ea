use core_logic::{ConfigError, SpamConfig};
use std::time::Duration;

#[test]
fn test_spam_config_defaults() {
    let config = SpamConfig::default();

    assert_eq!(config.increment_delay_ms, 1000);
    assert_eq!(config.increment_delay(), Duration::from_secs(1));
    assert_eq!(config.max_consecutive_restarts, 10);
    assert!(config.validate().is_ok());
}

#[test]
fn test_spam_config_partial_json_uses_defaults() {
    let config: SpamConfig = serde_json::from_str(r#"{ "increment_delay_ms": 250 }"#).unwrap();

    assert_eq!(config.increment_delay_ms, 250);
    assert_eq!(config.max_consecutive_restarts, 10);
    assert_eq!(config.restart_backoff_ms, 500);
}

#[test]
fn test_zero_restarts_is_rejected() {
    let config = SpamConfig {
        max_consecutive_restarts: 0,
        ..SpamConfig::default()
    };

    match config.validate() {
        Err(ConfigError::InvalidValue { field, .. }) => {
            assert_eq!(field, "max_consecutive_restarts");
        }
        other => panic!("Expected InvalidValue, got {:?}", other),
    }
}

#[test]
fn test_oversized_backoff_is_rejected() {
    let config = SpamConfig {
        restart_backoff_ms: 120_000,
        ..SpamConfig::default()
    };

    let err = config.validate().unwrap_err();
    assert!(err.to_string().contains("restart_backoff_ms"));
}

#[test]
fn test_zero_delay_is_allowed() {
    let config = SpamConfig {
        increment_delay_ms: 0,
        ..SpamConfig::default()
    };

    assert!(config.validate().is_ok());
    assert_eq!(config.increment_delay(), Duration::ZERO);
}
