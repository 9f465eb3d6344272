//! Tests covering meshing configuration behavior.

use super::*;

#[test]
fn default_matches_constants() {
    let cfg = MeshGenConfig::default();
    assert_eq!(cfg.tolerance, EPSILON_TOLERANCE);
    assert_eq!(cfg.target_grain_nodes, TARGET_GRAIN_NODES);
    assert_eq!(cfg.repair_cycles, REPAIR_CYCLES);
    assert!(!cfg.smooth_nodes);
    assert!(cfg.validate().is_ok());
}

#[test]
fn validate_rejects_bad_tolerance() {
    let cfg = MeshGenConfig {
        tolerance: -1.0,
        ..MeshGenConfig::default()
    };
    assert_eq!(
        cfg.validate().unwrap_err(),
        MeshGenConfigError(ConfigError::InvalidTolerance(-1.0))
    );
}

#[test]
fn validate_rejects_inverted_dihedral_range() {
    let cfg = MeshGenConfig {
        min_dihedral_deg: 170.0,
        max_dihedral_deg: 10.0,
        ..MeshGenConfig::default()
    };
    assert_eq!(
        cfg.validate().unwrap_err(),
        MeshGenConfigError(ConfigError::InvalidDihedralRange(170.0, 10.0))
    );
}

#[test]
fn validate_rejects_negative_jitter() {
    let cfg = MeshGenConfig {
        node_jitter: -0.5,
        ..MeshGenConfig::default()
    };
    let err = cfg.validate().unwrap_err();
    assert_eq!(err, MeshGenConfigError(ConfigError::InvalidJitter(-0.5)));
    assert!(err.to_string().contains("node_jitter"));
}

#[test]
fn validate_rejects_small_node_target() {
    let cfg = MeshGenConfig {
        target_grain_nodes: 2,
        ..MeshGenConfig::default()
    };
    assert!(cfg.validate().is_err());
}

#[test]
fn voxel_centers_are_offset_by_half_a_cell() {
    let grid = VoxelGridSpec {
        dims: [2, 2, 2],
        spacing: DVec3::splat(0.5),
        origin: DVec3::ZERO,
    };
    assert_eq!(grid.len(), 8);
    assert_eq!(grid.center(1, 0, 0), DVec3::new(0.75, 0.25, 0.25));
}
