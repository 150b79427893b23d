//! Tests for configuration loading

use chrono::{Duration, NaiveTime};
use kitchen_slots::config::KitchenConfig;

#[test]
fn test_defaults_match_documented_values() {
    let cfg = KitchenConfig::default();
    assert!(cfg.validate().is_ok());
    assert_eq!(cfg.slot_duration(), Duration::minutes(15));
    assert_eq!(cfg.prep_buffer(), Duration::minutes(8));
    assert_eq!(cfg.visibility_lead(), Duration::minutes(30));
    assert_eq!(cfg.state_ttl(), Duration::hours(2));
    assert_eq!(cfg.max_attempts, 100);
    assert_eq!(cfg.hours.opens_at, NaiveTime::from_hms_opt(10, 0, 0).unwrap());
    assert_eq!(cfg.hours.closes_at, NaiveTime::from_hms_opt(22, 0, 0).unwrap());
}

#[test]
fn test_full_json_config() {
    let json = r#"{
        "slot_duration_mins": 20,
        "prep_buffer_mins": 10,
        "visibility_lead_mins": 40,
        "opens_at": "08:30",
        "closes_at": "23:00",
        "default_max_capacity": 5000,
        "max_attempts": 50
    }"#;
    let cfg = KitchenConfig::from_json_str(json).unwrap();
    assert_eq!(cfg.slot_duration_mins, 20);
    assert_eq!(cfg.default_max_capacity, 5000);
    assert_eq!(cfg.hours.opens_at, NaiveTime::from_hms_opt(8, 30, 0).unwrap());
    assert_eq!(cfg.store_retry_attempts, 3);
}

#[test]
fn test_invalid_capacity_is_fatal() {
    let result = KitchenConfig::from_json_str(r#"{"default_max_capacity": -1}"#);
    assert!(result.is_err());
}

#[test]
fn test_zero_slot_duration_rejected() {
    let cfg = KitchenConfig {
        slot_duration_mins: 0,
        ..KitchenConfig::default()
    };
    assert!(cfg.validate().is_err());
}

#[test]
fn test_invalid_json_rejected() {
    assert!(KitchenConfig::from_json_str("not json").is_err());
}

#[test]
fn test_config_round_trips_through_json() {
    let cfg = KitchenConfig::default();
    let json = serde_json::to_string(&cfg).unwrap();
    assert!(json.contains("\"opens_at\":\"10:00\""));
    let back = KitchenConfig::from_json_str(&json).unwrap();
    assert_eq!(back, cfg);
}

#[test]
fn test_prep_buffer_longer_than_a_day_rejected() {
    let cfg = KitchenConfig {
        prep_buffer_mins: 24 * 60 + 1,
        ..KitchenConfig::default()
    };
    let err = cfg.validate().unwrap_err();
    assert!(err.contains("prep_buffer_mins"));

    let day = KitchenConfig {
        prep_buffer_mins: 24 * 60,
        ..KitchenConfig::default()
    };
    assert!(day.validate().is_ok());
}
