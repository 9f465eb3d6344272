//! Tests for the centralized configuration constants.

use super::*;

/// Ensures default constants are sane and positive.
#[test]
fn default_constants_are_valid() {
    let cfg = GlobalConfig::default();
    assert!(cfg.tolerance > 0.0);
    assert!(cfg.target_grain_nodes >= 4);
    assert!(cfg.repair_cycles >= 1);
}

/// Validates the builder rejects invalid values.
#[test]
fn new_validates_inputs() {
    assert_eq!(
        GlobalConfig::new(0.0, 3500, 4).unwrap_err(),
        ConfigError::InvalidTolerance(0.0)
    );
    assert_eq!(
        GlobalConfig::new(1.0e-9, 3, 4).unwrap_err(),
        ConfigError::InvalidNodeTarget(3)
    );
    assert_eq!(
        GlobalConfig::new(1.0e-9, 3500, 0).unwrap_err(),
        ConfigError::InvalidCycles(0)
    );
}

#[test]
fn nan_tolerance_is_rejected() {
    assert!(GlobalConfig::new(f64::NAN, 3500, 4).is_err());
}

#[test]
fn error_messages_name_the_field() {
    let message = ConfigError::InvalidDihedralRange(170.0, 10.0).to_string();
    assert!(message.contains("dihedral"));
    assert!(ConfigError::InvalidResolution(0).to_string().contains("resolution"));
    assert!(ConfigError::InvalidJitter(-0.5).to_string().contains("node_jitter"));
}
