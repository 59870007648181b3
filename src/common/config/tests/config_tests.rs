//! Unit tests for common-config crate

use common_config::{EvaluationConfig, EvaluationMode, TesseraConfig};

#[test]
fn test_tessera_config_default() {
    let config = TesseraConfig::default();

    assert_eq!(config.evaluation.mode, EvaluationMode::Hybrid);
    assert_eq!(config.evaluation.max_rewrite_steps, 1024);
    assert_eq!(config.evaluation.parallelism, None);
    assert_eq!(config.evaluation.cancellation_check_interval, 1);
    assert!(config.evaluation.is_hybrid());
}

#[test]
fn test_evaluation_mode_default() {
    assert_eq!(EvaluationMode::default(), EvaluationMode::Hybrid);
    assert_ne!(EvaluationMode::Hybrid, EvaluationMode::Generic);
}

#[test]
fn test_builder_methods() {
    let config = EvaluationConfig::default()
        .with_mode(EvaluationMode::Generic)
        .with_max_rewrite_steps(8)
        .with_parallelism(4)
        .with_cancellation_check_interval(0);

    assert!(!config.is_hybrid());
    assert_eq!(config.max_rewrite_steps, 8);
    assert_eq!(config.parallelism, Some(4));
    // Clamped so cancellation is still observed.
    assert_eq!(config.cancellation_check_interval, 1);
}

#[test]
fn test_tessera_config_serialization() {
    let mut config = TesseraConfig::default();
    config.evaluation.mode = EvaluationMode::Generic;
    config.evaluation.parallelism = Some(2);
    config.evaluation.cancellation_check_interval = 16;

    let json = serde_json::to_string(&config).unwrap();
    let deserialized: TesseraConfig = serde_json::from_str(&json).unwrap();

    assert_eq!(deserialized, config);
    assert!(json.contains("\"generic\""));
}

#[test]
fn test_partial_json_uses_defaults() {
    let config =
        TesseraConfig::from_json_str(r#"{ "evaluation": { "parallelism": 3 } }"#).unwrap();

    assert_eq!(config.evaluation.parallelism, Some(3));
    assert_eq!(config.evaluation.mode, EvaluationMode::Hybrid);
    assert_eq!(config.evaluation.max_rewrite_steps, 1024);
}

#[test]
fn test_empty_json_is_default() {
    let config = TesseraConfig::from_json_str("{}").unwrap();
    assert_eq!(config, TesseraConfig::default());
}

#[test]
fn test_invalid_json_is_an_error() {
    let err = TesseraConfig::from_json_str("{ not json").unwrap_err();
    assert!(err.to_string().starts_with("SerdeJsonError"));
}

#[test]
fn test_json_round_trip_helpers() {
    let config = TesseraConfig {
        evaluation: EvaluationConfig::default().with_max_rewrite_steps(12),
    };
    let json = config.to_json_string().unwrap();
    assert_eq!(TesseraConfig::from_json_str(&json).unwrap(), config);
}
