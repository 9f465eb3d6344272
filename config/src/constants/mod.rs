//! # Configuration Constants
//!
//! Centralized constants for the solid meshing pipeline. Each public item
//! documents its purpose and provides a minimal usage example so that the
//! meshing crate can remain declarative and avoid scattering literals.
//!
//! ## Categories
//!
//! - **Precision**: Floating-point comparison tolerances
//! - **Surface cleanup**: Triangle collapse and relaxation thresholds
//! - **Interior sampling**: Z-buffer layout and node targets
//! - **Volume meshing**: Repair cycles and dihedral acceptance range
//! - **Statistics**: Histogram layouts
//! - **Limits**: Iteration budgets for loops without a natural bound

use std::fmt;

// =============================================================================
// PRECISION CONSTANTS
// =============================================================================

/// Numerical tolerance used by the geometry kernel.
///
/// Denominators, cross-product lengths and projected extents below this
/// value are treated as degenerate.
///
/// # Examples
/// ```
/// use config::constants::EPSILON_TOLERANCE;
/// assert!(EPSILON_TOLERANCE < 1.0e-6);
/// ```
pub const EPSILON_TOLERANCE: f64 = 1.0e-9;

// =============================================================================
// SURFACE CLEANUP CONSTANTS
// =============================================================================

/// Average fold angle (degrees) above which a triangle is considered flush
/// with its same-boundary neighbours.
///
/// Fold angles follow the `180 - angle(n1, n2)` convention, so a perfectly
/// flat neighbourhood reports 180.
///
/// # Examples
/// ```
/// use config::constants::MISORIENTATION_COLLAPSE_DEG;
/// let flat_neighbourhood = 179.0;
/// assert!(flat_neighbourhood > MISORIENTATION_COLLAPSE_DEG);
/// ```
pub const MISORIENTATION_COLLAPSE_DEG: f64 = 172.5;

/// Fold angle (degrees) below which a single neighbour marks a crease that
/// must be preserved.
///
/// # Examples
/// ```
/// use config::constants::{CREASE_KEEP_DEG, MISORIENTATION_COLLAPSE_DEG};
/// assert!(CREASE_KEEP_DEG < MISORIENTATION_COLLAPSE_DEG);
/// ```
pub const CREASE_KEEP_DEG: f64 = 165.0;

/// Fraction of the mean triangle area below which a flush triangle is
/// collapsed.
///
/// # Examples
/// ```
/// use config::constants::SMALL_AREA_FRACTION;
/// let mean_area = 2.0;
/// assert_eq!(SMALL_AREA_FRACTION * mean_area, 0.5);
/// ```
pub const SMALL_AREA_FRACTION: f64 = 0.25;

/// Smallest included triangle angle (degrees) tolerated by the relaxation
/// pass.
///
/// # Examples
/// ```
/// use config::constants::SHARP_ANGLE_DEG;
/// assert_eq!(SHARP_ANGLE_DEG, 20.0);
/// ```
pub const SHARP_ANGLE_DEG: f64 = 20.0;

// =============================================================================
// INTERIOR SAMPLING CONSTANTS
// =============================================================================

/// Cells per side of each per-grain z-buffer plane.
///
/// Every grain uses six planes of `ZBUFFER_RESOLUTION²` depth cells.
///
/// # Examples
/// ```
/// use config::constants::ZBUFFER_RESOLUTION;
/// let cells_per_plane = ZBUFFER_RESOLUTION * ZBUFFER_RESOLUTION;
/// assert_eq!(cells_per_plane, 250_000);
/// ```
pub const ZBUFFER_RESOLUTION: usize = 500;

/// Number of boundary plus interior nodes each grain must hold before
/// rejection sampling stops.
///
/// # Examples
/// ```
/// use config::constants::TARGET_GRAIN_NODES;
/// let boundary_nodes = 1200;
/// assert_eq!(TARGET_GRAIN_NODES - boundary_nodes, 2300);
/// ```
pub const TARGET_GRAIN_NODES: usize = 3500;

/// Amplitude of the random perturbation applied to interior coordinates of
/// compacted surface nodes before tetrahedralization.
///
/// # Examples
/// ```
/// use config::constants::NODE_JITTER;
/// assert!(NODE_JITTER > 0.0 && NODE_JITTER < 0.1);
/// ```
pub const NODE_JITTER: f64 = 0.01;

/// Seed used for the pipeline random number generator when none is given.
///
/// # Examples
/// ```
/// use config::constants::DEFAULT_SEED;
/// let seed: u64 = DEFAULT_SEED;
/// assert_ne!(seed, 0);
/// ```
pub const DEFAULT_SEED: u64 = 0x5EED_D3D3;

// =============================================================================
// VOLUME MESHING CONSTANTS
// =============================================================================

/// Number of write-points / tetrahedralize / repair cycles.
///
/// All cycles but the last repair grain-crossing edges; the last one keeps
/// its tetrahedra as the volume mesh.
///
/// # Examples
/// ```
/// use config::constants::REPAIR_CYCLES;
/// assert_eq!(REPAIR_CYCLES, 4);
/// ```
pub const REPAIR_CYCLES: usize = 4;

/// Smallest acceptable tetrahedron dihedral angle (degrees).
///
/// # Examples
/// ```
/// use config::constants::MIN_DIHEDRAL_DEG;
/// assert_eq!(MIN_DIHEDRAL_DEG, 10.0);
/// ```
pub const MIN_DIHEDRAL_DEG: f64 = 10.0;

/// Largest acceptable tetrahedron dihedral angle (degrees).
///
/// # Examples
/// ```
/// use config::constants::MAX_DIHEDRAL_DEG;
/// assert_eq!(MAX_DIHEDRAL_DEG, 170.0);
/// ```
pub const MAX_DIHEDRAL_DEG: f64 = 170.0;

// =============================================================================
// STATISTICS CONSTANTS
// =============================================================================

/// Number of one-degree dihedral angle bins covering `[0, 180)`.
///
/// # Examples
/// ```
/// use config::constants::DIHEDRAL_BINS;
/// let angle: f64 = 179.6;
/// let bin = (angle.floor() as usize).min(DIHEDRAL_BINS - 1);
/// assert_eq!(bin, 179);
/// ```
pub const DIHEDRAL_BINS: usize = 180;

/// Number of volume-to-mean-volume ratio bins.
///
/// # Examples
/// ```
/// use config::constants::{VOLUME_RATIO_BINS, VOLUME_RATIO_EDGES};
/// assert_eq!(VOLUME_RATIO_EDGES.len() + 1, VOLUME_RATIO_BINS);
/// ```
pub const VOLUME_RATIO_BINS: usize = 25;

/// Lower edges of volume ratio bins 1..25 (bin 0 is everything below
/// `1/10`, bin 24 everything from `15` upwards).
///
/// # Examples
/// ```
/// use config::constants::VOLUME_RATIO_EDGES;
/// assert_eq!(VOLUME_RATIO_EDGES[0], 0.1);
/// assert_eq!(VOLUME_RATIO_EDGES[23], 15.0);
/// ```
pub const VOLUME_RATIO_EDGES: [f64; 24] = [
    1.0 / 10.0,
    1.0 / 9.0,
    1.0 / 8.0,
    1.0 / 7.0,
    1.0 / 6.0,
    1.0 / 5.0,
    1.0 / 4.0,
    1.0 / 3.0,
    1.0 / 2.0,
    1.0,
    2.0,
    3.0,
    4.0,
    5.0,
    6.0,
    7.0,
    8.0,
    9.0,
    10.0,
    11.0,
    12.0,
    13.0,
    14.0,
    15.0,
];

// =============================================================================
// LIMIT CONSTANTS
// =============================================================================

/// Maximum rejection-sampling draws per grain before the sampler gives up
/// and reports a convergence timeout.
///
/// # Examples
/// ```
/// use config::constants::{MAX_SAMPLING_ATTEMPTS, TARGET_GRAIN_NODES};
/// assert!(MAX_SAMPLING_ATTEMPTS > TARGET_GRAIN_NODES);
/// ```
pub const MAX_SAMPLING_ATTEMPTS: usize = 20_000_000;

/// Maximum full passes of the sharp-angle relaxation loop.
pub const MAX_RELAX_PASSES: usize = 64;

/// Maximum full passes of the tetrahedral edge-collapse improvement loop.
pub const MAX_IMPROVE_PASSES: usize = 100;

/// Immutable snapshot of the calibrated settings that can be shared between
/// crates.
///
/// # Examples
/// ```
/// use config::constants::GlobalConfig;
/// let config = GlobalConfig::default();
/// assert!(config.tolerance > 0.0);
/// assert_eq!(config.repair_cycles, 4);
/// ```
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GlobalConfig {
    /// Numeric tolerance propagated into geometry kernels.
    pub tolerance: f64,
    /// Boundary plus interior node target per grain.
    pub target_grain_nodes: usize,
    /// Number of tetrahedralization cycles.
    pub repair_cycles: usize,
}

impl GlobalConfig {
    /// Builds a configuration enforcing strict validation of the supplied
    /// values.
    ///
    /// # Examples
    /// ```
    /// use config::constants::GlobalConfig;
    /// let cfg = GlobalConfig::new(1.0e-6, 800, 2).expect("valid config");
    /// assert_eq!(cfg.target_grain_nodes, 800);
    /// ```
    pub fn new(
        tolerance: f64,
        target_grain_nodes: usize,
        repair_cycles: usize,
    ) -> Result<Self, ConfigError> {
        if !(tolerance > 0.0) {
            return Err(ConfigError::InvalidTolerance(tolerance));
        }
        if target_grain_nodes < 4 {
            return Err(ConfigError::InvalidNodeTarget(target_grain_nodes));
        }
        if repair_cycles == 0 {
            return Err(ConfigError::InvalidCycles(repair_cycles));
        }
        Ok(Self {
            tolerance,
            target_grain_nodes,
            repair_cycles,
        })
    }
}

impl Default for GlobalConfig {
    fn default() -> Self {
        Self {
            tolerance: EPSILON_TOLERANCE,
            target_grain_nodes: TARGET_GRAIN_NODES,
            repair_cycles: REPAIR_CYCLES,
        }
    }
}

/// Error returned when invalid configuration values are provided.
#[derive(Debug, PartialEq)]
pub enum ConfigError {
    /// Raised when tolerance is zero, negative or NaN.
    InvalidTolerance(f64),
    /// Raised when the per-grain node target cannot form a tetrahedron.
    InvalidNodeTarget(usize),
    /// Raised when no tetrahedralization cycle would run.
    InvalidCycles(usize),
    /// Raised when the acceptable dihedral range is empty or outside `[0, 180]`.
    InvalidDihedralRange(f64, f64),
    /// Raised when the z-buffer would have no cells.
    InvalidResolution(usize),
    /// Raised when the node jitter amplitude is negative or NaN.
    InvalidJitter(f64),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::InvalidTolerance(value) => {
                write!(f, "tolerance must be positive: {value}")
            }
            ConfigError::InvalidNodeTarget(value) => {
                write!(f, "target_grain_nodes must be >= 4: {value}")
            }
            ConfigError::InvalidCycles(value) => {
                write!(f, "repair_cycles must be >= 1: {value}")
            }
            ConfigError::InvalidDihedralRange(min, max) => {
                write!(f, "dihedral range must satisfy 0 <= min < max <= 180: [{min}, {max}]")
            }
            ConfigError::InvalidResolution(value) => {
                write!(f, "z-buffer resolution must be >= 1: {value}")
            }
            ConfigError::InvalidJitter(value) => {
                write!(f, "node_jitter must be >= 0: {value}")
            }
        }
    }
}

impl std::error::Error for ConfigError {}

/// Checks if a f64 value is approximately zero within [`EPSILON_TOLERANCE`].
///
/// # Example
///
/// ```rust
/// use config::constants::approx_zero;
///
/// assert!(approx_zero(1e-11));
/// assert!(!approx_zero(0.1));
/// ```
#[inline]
pub fn approx_zero(value: f64) -> bool {
    value.abs() < EPSILON_TOLERANCE
}

#[cfg(test)]
mod tests;
