//! Six-plane depth buffer over the unit cube.

use crate::geometry::barycentric_2d;
use glam::{DVec2, DVec3};

/// `(u axis, v axis, depth axis)` of each projection; projection `k` owns
/// planes `2k` (min) and `2k + 1` (max).
const PROJECTIONS: [(usize, usize, usize); 3] = [(0, 1, 2), (0, 2, 1), (1, 2, 0)];

/// Slack on barycentric coordinates so cells centred on a shared edge are
/// claimed by both triangles.
const EDGE_SLACK: f64 = 1e-9;

/// Min/max depth grids for the three axis projections of one grain.
#[derive(Debug, Clone)]
pub struct ZBuffer {
    resolution: usize,
    tolerance: f64,
    planes: [Vec<f64>; 6],
}

impl ZBuffer {
    /// Allocates six `resolution²` planes, cleared.
    pub fn new(resolution: usize, tolerance: f64) -> Self {
        let cells = resolution * resolution;
        let mut buffer = Self {
            resolution,
            tolerance,
            planes: std::array::from_fn(|_| vec![0.0; cells]),
        };
        buffer.clear();
        buffer
    }

    /// Cells per side.
    pub fn resolution(&self) -> usize {
        self.resolution
    }

    /// Resets every min plane to `+∞` and every max plane to `-∞`.
    pub fn clear(&mut self) {
        for (index, plane) in self.planes.iter_mut().enumerate() {
            let value = if index % 2 == 0 { f64::INFINITY } else { f64::NEG_INFINITY };
            plane.fill(value);
        }
    }

    /// Records the depth of a normalized triangle in every cell whose centre
    /// it covers, on all three projections.
    pub fn rasterize(&mut self, corners: [DVec3; 3]) {
        let res = self.resolution as f64;
        let last = self.resolution.saturating_sub(1) as i64;

        for (projection, &(u, v, w)) in PROJECTIONS.iter().enumerate() {
            let flat = corners.map(|p| DVec2::new(p[u], p[v]));
            let depth = corners.map(|p| p[w]);
            let lo = flat[0].min(flat[1]).min(flat[2]);
            let hi = flat[0].max(flat[1]).max(flat[2]);

            let start_i = ((lo.x * res).floor() as i64 - 1).clamp(0, last) as usize;
            let stop_i = ((hi.x * res).floor() as i64 + 1).clamp(0, last) as usize;
            let start_j = ((lo.y * res).floor() as i64 - 1).clamp(0, last) as usize;
            let stop_j = ((hi.y * res).floor() as i64 + 1).clamp(0, last) as usize;

            for j in start_j..=stop_j {
                for i in start_i..=stop_i {
                    let cell = DVec2::new((i as f64 + 0.5) / res, (j as f64 + 0.5) / res);
                    let Some((s, t)) = barycentric_2d(cell, flat[0], flat[1], flat[2], self.tolerance)
                    else {
                        continue;
                    };
                    if s < -EDGE_SLACK || t < -EDGE_SLACK || s + t > 1.0 + EDGE_SLACK {
                        continue;
                    }
                    let z = depth[0] + s * (depth[1] - depth[0]) + t * (depth[2] - depth[0]);
                    let index = j * self.resolution + i;
                    let min = &mut self.planes[2 * projection][index];
                    *min = min.min(z);
                    let max = &mut self.planes[2 * projection + 1][index];
                    *max = max.max(z);
                }
            }
        }
    }

    /// Smallest distance from normalized point `p` to any depth bound of its
    /// cells, or `None` when `p` falls outside a depth range. `strict`
    /// excludes points lying exactly on a bound.
    pub fn depth_margin(&self, p: DVec3, strict: bool) -> Option<f64> {
        if p.cmplt(DVec3::ZERO).any() || p.cmpgt(DVec3::ONE).any() {
            return None;
        }
        let res = self.resolution as f64;
        let last = self.resolution.saturating_sub(1);
        let mut margin = f64::INFINITY;

        for (projection, &(u, v, w)) in PROJECTIONS.iter().enumerate() {
            let i = ((p[u] * res) as usize).min(last);
            let j = ((p[v] * res) as usize).min(last);
            let index = j * self.resolution + i;
            let min = self.planes[2 * projection][index];
            let max = self.planes[2 * projection + 1][index];
            let depth = p[w];
            let inside = if strict {
                min < depth && depth < max
            } else {
                min <= depth && depth <= max
            };
            if !inside {
                return None;
            }
            margin = margin.min(depth - min).min(max - depth);
        }
        Some(margin)
    }
}
