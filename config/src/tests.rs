//! # Config Crate Tests
//!
//! Sanity checks on the relationships between calibrated constants.

use crate::constants::*;

// =============================================================================
// SURFACE CLEANUP TESTS
// =============================================================================

#[test]
fn test_crease_threshold_below_collapse_threshold() {
    assert!(CREASE_KEEP_DEG < MISORIENTATION_COLLAPSE_DEG);
    assert!(MISORIENTATION_COLLAPSE_DEG < 180.0);
}

#[test]
fn test_sharp_angle_leaves_room_for_equilateral() {
    assert!(SHARP_ANGLE_DEG < 60.0);
}

#[test]
fn test_small_area_fraction_is_a_fraction() {
    assert!(SMALL_AREA_FRACTION > 0.0 && SMALL_AREA_FRACTION < 1.0);
}

// =============================================================================
// VOLUME MESHING TESTS
// =============================================================================

#[test]
fn test_dihedral_range_is_ordered() {
    assert!(MIN_DIHEDRAL_DEG >= 0.0);
    assert!(MIN_DIHEDRAL_DEG < MAX_DIHEDRAL_DEG);
    assert!(MAX_DIHEDRAL_DEG <= 180.0);
}

#[test]
fn test_repair_cycles_leave_a_final_cycle() {
    assert!(REPAIR_CYCLES >= 1);
}

// =============================================================================
// STATISTICS TESTS
// =============================================================================

#[test]
fn test_volume_ratio_edges_increase() {
    for pair in VOLUME_RATIO_EDGES.windows(2) {
        assert!(pair[0] < pair[1]);
    }
}

#[test]
fn test_dihedral_bins_cover_half_turn() {
    assert_eq!(DIHEDRAL_BINS, 180);
}

// =============================================================================
// APPROX_ZERO TESTS
// =============================================================================

#[test]
fn test_approx_zero_exact_zero() {
    assert!(approx_zero(0.0));
}

#[test]
fn test_approx_zero_within_epsilon() {
    let small = EPSILON_TOLERANCE / 2.0;
    assert!(approx_zero(small));
    assert!(approx_zero(-small));
}

#[test]
fn test_approx_zero_outside_epsilon() {
    let large = EPSILON_TOLERANCE * 2.0;
    assert!(!approx_zero(large));
    assert!(!approx_zero(-large));
}
