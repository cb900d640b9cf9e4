//! Unit tests for GcConfig validation through the public API

use generational_gc::{Collector, GcConfig, GcError, GenerationalHeap};
use proptest::prelude::*;

proptest! {
    #[test]
    fn promotion_threshold_accepted_iff_in_range(threshold in any::<u8>()) {
        let config = GcConfig::default().with_promotion_threshold(threshold);
        prop_assert_eq!(config.validate().is_ok(), (2..=15).contains(&threshold));
    }

    #[test]
    fn card_size_accepted_iff_power_of_two(card_size in 0usize..1 << 16) {
        let config = GcConfig::default().with_card_size(card_size);
        prop_assert_eq!(config.validate().is_ok(), card_size.is_power_of_two());
    }
}

#[test]
fn test_invalid_config_never_builds_a_heap() {
    let config = GcConfig::default().with_promotion_threshold(16);
    assert!(matches!(
        GenerationalHeap::new(config.clone()),
        Err(GcError::Configuration(_))
    ));
    assert!(matches!(Collector::new(config), Err(GcError::Configuration(_))));
}

#[test]
fn test_json_with_partial_keys() {
    let config = GcConfig::from_json(r#"{ "card_size": 256, "eden_size": 4096 }"#).unwrap();
    assert_eq!(config.card_size, 256);
    assert_eq!(config.eden_size, 4096);
    assert_eq!(config.promotion_threshold, 6);
    assert_eq!(config.survivor_size(), 512);
}

#[test]
fn test_json_rejects_out_of_range_values() {
    let err = GcConfig::from_json(r#"{ "promotion_threshold": 1 }"#).unwrap_err();
    assert!(err.to_string().contains("promotion_threshold"));

    let err = GcConfig::from_json(r#"{ "survivor_occupancy_limit": 1.5 }"#).unwrap_err();
    assert!(err.to_string().contains("survivor_occupancy_limit"));

    assert!(GcConfig::from_json("not json").is_err());
}

#[test]
fn test_json_round_trip_preserves_tuning() {
    let config = GcConfig::default()
        .with_promotion_threshold(9)
        .with_major_cycle_interval(4)
        .with_verify_after_trace(false);
    assert_eq!(GcConfig::from_json(&config.to_json()).unwrap(), config);
}
