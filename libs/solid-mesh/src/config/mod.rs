//! Meshing configuration built on the shared `config` crate.
//!
//! [`MeshGenConfig`] gathers every calibrated threshold and iteration budget
//! of the pipeline. Defaults come from [`config::constants`]; callers only
//! override what they need and call [`MeshGenConfig::validate`].

use config::constants::{
    ConfigError, GlobalConfig, CREASE_KEEP_DEG, DEFAULT_SEED, EPSILON_TOLERANCE,
    MAX_DIHEDRAL_DEG, MAX_IMPROVE_PASSES, MAX_RELAX_PASSES, MAX_SAMPLING_ATTEMPTS,
    MIN_DIHEDRAL_DEG, MISORIENTATION_COLLAPSE_DEG, NODE_JITTER, REPAIR_CYCLES, SHARP_ANGLE_DEG,
    SMALL_AREA_FRACTION, TARGET_GRAIN_NODES, ZBUFFER_RESOLUTION,
};
use glam::DVec3;
use serde::{Deserialize, Serialize};

/// Layout of the domain voxel grid painted with grain ids.
///
/// Voxel `(i, j, k)` is centred at `origin + (i + 0.5, j + 0.5, k + 0.5) * spacing`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct VoxelGridSpec {
    /// Voxel counts along x, y and z.
    pub dims: [usize; 3],
    /// Edge length of a voxel along each axis.
    pub spacing: DVec3,
    /// Corner of voxel `(0, 0, 0)`.
    pub origin: DVec3,
}

impl VoxelGridSpec {
    /// Total number of voxels.
    pub fn len(&self) -> usize {
        self.dims[0] * self.dims[1] * self.dims[2]
    }

    /// Returns true when any dimension is zero.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Centre of voxel `(i, j, k)`.
    pub fn center(&self, i: usize, j: usize, k: usize) -> DVec3 {
        self.origin + DVec3::new(i as f64 + 0.5, j as f64 + 0.5, k as f64 + 0.5) * self.spacing
    }
}

/// Configuration of a meshing run.
///
/// # Examples
/// ```
/// use solid_mesh::config::MeshGenConfig;
/// let cfg = MeshGenConfig {
///     target_grain_nodes: 200,
///     ..MeshGenConfig::default()
/// };
/// assert!(cfg.validate().is_ok());
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MeshGenConfig {
    /// Tolerance below which denominators count as zero.
    pub tolerance: f64,
    /// Cells per side of each z-buffer plane.
    pub zbuffer_resolution: usize,
    /// Boundary plus interior nodes each grain should reach.
    pub target_grain_nodes: usize,
    /// Rejection-sampling draws allowed per grain.
    pub max_sampling_attempts: usize,
    /// Number of tetrahedralization cycles, the last one kept.
    pub repair_cycles: usize,
    /// Average fold angle above which a small triangle is collapsed.
    pub misorientation_collapse_deg: f64,
    /// Single fold angle below which a triangle is always kept.
    pub crease_keep_deg: f64,
    /// Fraction of the mean area under which a flush triangle is collapsed.
    pub small_area_fraction: f64,
    /// Smallest tolerated included triangle angle.
    pub sharp_angle_deg: f64,
    /// Smallest acceptable tetrahedron dihedral angle.
    pub min_dihedral_deg: f64,
    /// Largest acceptable tetrahedron dihedral angle.
    pub max_dihedral_deg: f64,
    /// Pass budget of the edge-collapse improvement loop.
    pub max_improve_passes: usize,
    /// Pass budget of the sharp-angle relaxation loop.
    pub max_relax_passes: usize,
    /// Perturbation amplitude applied to compacted surface nodes.
    pub node_jitter: f64,
    /// Seed of the run's random number generator.
    pub seed: u64,
    /// Domain voxel grid to paint with grain ids, if any.
    pub voxel_grid: Option<VoxelGridSpec>,
    /// Run the small/misoriented triangle collapse pass.
    pub collapse_triangles: bool,
    /// Run the sharp-angle relaxation pass.
    pub relax_triangles: bool,
    /// Run Laplacian smoothing before relaxation.
    pub smooth_nodes: bool,
    /// Run the tetrahedral edge-collapse improvement pass.
    pub improve_mesh: bool,
}

impl Default for MeshGenConfig {
    fn default() -> Self {
        Self {
            tolerance: EPSILON_TOLERANCE,
            zbuffer_resolution: ZBUFFER_RESOLUTION,
            target_grain_nodes: TARGET_GRAIN_NODES,
            max_sampling_attempts: MAX_SAMPLING_ATTEMPTS,
            repair_cycles: REPAIR_CYCLES,
            misorientation_collapse_deg: MISORIENTATION_COLLAPSE_DEG,
            crease_keep_deg: CREASE_KEEP_DEG,
            small_area_fraction: SMALL_AREA_FRACTION,
            sharp_angle_deg: SHARP_ANGLE_DEG,
            min_dihedral_deg: MIN_DIHEDRAL_DEG,
            max_dihedral_deg: MAX_DIHEDRAL_DEG,
            max_improve_passes: MAX_IMPROVE_PASSES,
            max_relax_passes: MAX_RELAX_PASSES,
            node_jitter: NODE_JITTER,
            seed: DEFAULT_SEED,
            voxel_grid: None,
            collapse_triangles: true,
            relax_triangles: true,
            smooth_nodes: false,
            improve_mesh: true,
        }
    }
}

impl MeshGenConfig {
    /// Checks every field for a usable value.
    ///
    /// # Examples
    /// ```
    /// use solid_mesh::config::MeshGenConfig;
    /// let cfg = MeshGenConfig { repair_cycles: 0, ..MeshGenConfig::default() };
    /// assert!(cfg.validate().is_err());
    /// ```
    pub fn validate(&self) -> Result<(), MeshGenConfigError> {
        GlobalConfig::new(self.tolerance, self.target_grain_nodes, self.repair_cycles)
            .map_err(MeshGenConfigError)?;
        if !(0.0..=180.0).contains(&self.min_dihedral_deg)
            || !(0.0..=180.0).contains(&self.max_dihedral_deg)
            || self.min_dihedral_deg >= self.max_dihedral_deg
        {
            return Err(MeshGenConfigError(ConfigError::InvalidDihedralRange(
                self.min_dihedral_deg,
                self.max_dihedral_deg,
            )));
        }
        if self.zbuffer_resolution == 0 {
            return Err(MeshGenConfigError(ConfigError::InvalidResolution(
                self.zbuffer_resolution,
            )));
        }
        if !(self.node_jitter >= 0.0) {
            return Err(MeshGenConfigError(ConfigError::InvalidJitter(
                self.node_jitter,
            )));
        }
        Ok(())
    }
}

/// Error wrapper for invalid meshing configuration.
#[derive(Debug, PartialEq)]
pub struct MeshGenConfigError(pub ConfigError);

impl std::fmt::Display for MeshGenConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

impl std::error::Error for MeshGenConfigError {}

#[cfg(test)]
mod tests;
