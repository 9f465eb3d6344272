//! # Interior Sampler
//!
//! Approximate point-in-grain classification with per-axis depth buffers,
//! used to paint a voxel grid with grain ids and to seed interior nodes.
//!
//! ## Z-buffer layout
//!
//! Each grain is normalized into its own bounding box, then every boundary
//! triangle is rasterized along the three axes:
//!
//! ```text
//! plane 0 / 1 : min / max z over (x, y)
//! plane 2 / 3 : min / max y over (x, z)
//! plane 4 / 5 : min / max x over (y, z)
//! ```
//!
//! A point is inside when its depth lies between the min and max entry of
//! its cell on all three axes. Buffers are allocated once per sampler and
//! cleared between grains.

mod zbuffer;

pub use zbuffer::ZBuffer;

use crate::config::{MeshGenConfig, VoxelGridSpec};
use crate::error::{MeshGenError, MeshGenResult};
use crate::grain::Grain;
use crate::ids::GrainId;
use crate::surface::SurfaceMesh;
use glam::DVec3;
use rand::Rng;
use serde::{Deserialize, Serialize};

/// Voxel grid painted with grain ids, `0` where no grain claimed a voxel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VoxelGrid {
    /// Grid layout.
    pub spec: VoxelGridSpec,
    /// Grain id per voxel, x fastest, then y, then z.
    pub grain_ids: Vec<u32>,
}

impl VoxelGrid {
    /// Creates an unpainted grid.
    pub fn new(spec: VoxelGridSpec) -> Self {
        Self {
            grain_ids: vec![0; spec.len()],
            spec,
        }
    }

    /// Grain id of voxel `(i, j, k)`.
    pub fn get(&self, i: usize, j: usize, k: usize) -> u32 {
        self.grain_ids[self.offset(i, j, k)]
    }

    fn offset(&self, i: usize, j: usize, k: usize) -> usize {
        let [nx, ny, _] = self.spec.dims;
        (k * ny + j) * nx + i
    }

    /// Number of voxels assigned to `grain`.
    pub fn count(&self, grain: GrainId) -> usize {
        self.grain_ids.iter().filter(|&&g| g == grain.0).count()
    }
}

/// Interior nodes produced for one grain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GrainSamples {
    /// Grain the points belong to.
    pub grain: GrainId,
    /// Accepted interior points in world coordinates.
    pub points: Vec<DVec3>,
    /// Random draws spent.
    pub attempts: usize,
    /// The node target was reached within the attempt budget.
    pub converged: bool,
}

/// Maps world coordinates into a grain's unit bounding box.
#[derive(Debug, Clone, Copy, PartialEq)]
struct GrainFrame {
    origin: DVec3,
    extent: DVec3,
}

impl GrainFrame {
    fn normalize(&self, p: DVec3) -> DVec3 {
        (p - self.origin) / self.extent
    }

    fn denormalize(&self, p: DVec3) -> DVec3 {
        self.origin + p * self.extent
    }
}

/// Rasterizes grains into reusable z-buffers and draws interior points.
#[derive(Debug, Clone)]
pub struct InteriorSampler {
    zbuffer: ZBuffer,
    target_nodes: usize,
    max_attempts: usize,
    tolerance: f64,
}

impl InteriorSampler {
    /// Creates a sampler sized from the configuration.
    pub fn new(config: &MeshGenConfig) -> Self {
        Self {
            zbuffer: ZBuffer::new(config.zbuffer_resolution, config.tolerance),
            target_nodes: config.target_grain_nodes,
            max_attempts: config.max_sampling_attempts,
            tolerance: config.tolerance,
        }
    }

    /// Rasterizes `grain`, paints `voxels` if given, then draws interior
    /// points until boundary plus interior nodes reach the node target or
    /// the attempt budget is spent.
    ///
    /// A draw is kept when it lies strictly inside all three depth ranges
    /// and a uniform number does not exceed `(2 (0.5 - d))²`, where `d` is
    /// its smallest normalized distance to a depth bound.
    ///
    /// # Errors
    ///
    /// [`MeshGenError::DegenerateGeometry`] when the grain's bounding box
    /// has no volume; [`MeshGenError::StaleAdjacency`] when the mesh
    /// adjacency is out of date.
    pub fn sample_grain<R: Rng + ?Sized>(
        &mut self,
        mesh: &SurfaceMesh,
        grain: &Grain,
        voxels: Option<&mut VoxelGrid>,
        rng: &mut R,
    ) -> MeshGenResult<GrainSamples> {
        let frame = self.rasterize_grain(mesh, grain)?;
        if let Some(grid) = voxels {
            self.paint(grain, frame, grid);
        }

        let needed = self.target_nodes.saturating_sub(grain.node_count);
        let mut samples = GrainSamples {
            grain: grain.id,
            points: Vec::with_capacity(needed),
            attempts: 0,
            converged: needed == 0,
        };

        while samples.points.len() < needed {
            if samples.attempts >= self.max_attempts {
                log::warn!(
                    "grain {}: sampling budget of {} draws spent with {}/{} interior nodes",
                    grain.id,
                    self.max_attempts,
                    samples.points.len(),
                    needed
                );
                return Ok(samples);
            }
            samples.attempts += 1;

            let p = DVec3::new(rng.random::<f64>(), rng.random::<f64>(), rng.random::<f64>());
            let Some(distance) = self.zbuffer.depth_margin(p, true) else {
                continue;
            };
            let acceptance = (2.0 * (0.5 - distance)).powi(2);
            if rng.random::<f64>() <= acceptance {
                samples.points.push(frame.denormalize(p));
            }
        }

        samples.converged = true;
        log::debug!(
            "grain {}: {} interior nodes after {} draws",
            grain.id,
            samples.points.len(),
            samples.attempts
        );
        Ok(samples)
    }

    /// Rasterizes `grain` and paints every voxel whose centre it contains.
    ///
    /// # Errors
    ///
    /// Same as [`sample_grain`](Self::sample_grain).
    pub fn paint_grain(&mut self, mesh: &SurfaceMesh, grain: &Grain, voxels: &mut VoxelGrid) -> MeshGenResult<()> {
        let frame = self.rasterize_grain(mesh, grain)?;
        self.paint(grain, frame, voxels);
        Ok(())
    }

    /// Returns true when world point `p` is classified inside the most
    /// recently rasterized grain.
    pub fn contains(&self, grain: &Grain, p: DVec3) -> bool {
        let extent = grain.extent();
        if extent.min_element() <= self.tolerance {
            return false;
        }
        let frame = GrainFrame {
            origin: grain.bounds_min,
            extent,
        };
        self.zbuffer.depth_margin(frame.normalize(p), false).is_some()
    }

    fn rasterize_grain(&mut self, mesh: &SurfaceMesh, grain: &Grain) -> MeshGenResult<GrainFrame> {
        let extent = grain.extent();
        if extent.min_element() <= self.tolerance {
            return Err(MeshGenError::degenerate(format!(
                "grain {} has a flat bounding box {extent}",
                grain.id
            )));
        }
        let frame = GrainFrame {
            origin: grain.bounds_min,
            extent,
        };

        self.zbuffer.clear();
        let triangles = mesh.adjacency()?.grain_triangles.get(grain.id.index());
        for &id in triangles.map(Vec::as_slice).unwrap_or(&[]) {
            let corners = mesh.triangle_positions(id).map(|p| frame.normalize(p));
            self.zbuffer.rasterize(corners);
        }
        Ok(frame)
    }

    fn paint(&self, grain: &Grain, frame: GrainFrame, grid: &mut VoxelGrid) {
        let spec = grid.spec;
        let [nx, ny, nz] = spec.dims;
        let mut painted = 0;
        for k in 0..nz {
            for j in 0..ny {
                for i in 0..nx {
                    let center = spec.center(i, j, k);
                    if center.cmplt(grain.bounds_min).any() || center.cmpgt(grain.bounds_max).any() {
                        continue;
                    }
                    if self.zbuffer.depth_margin(frame.normalize(center), false).is_some() {
                        let offset = grid.offset(i, j, k);
                        grid.grain_ids[offset] = grain.id.0;
                        painted += 1;
                    }
                }
            }
        }
        log::debug!("grain {}: painted {painted} voxels", grain.id);
    }
}

#[cfg(test)]
mod tests;
