//! # Grain Registry
//!
//! Per-grain aggregates derived from a surface mesh with fresh adjacency:
//! centroid and bounding box of the boundary nodes, enclosed volume, on-edge
//! flag and longest boundary edge. Recomputed wholesale, never patched.

use crate::error::MeshGenResult;
use crate::geometry::signed_tet_volume;
use crate::ids::GrainId;
use crate::surface::SurfaceMesh;
use glam::DVec3;
use serde::{Deserialize, Serialize};

/// Aggregate record of one grain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Grain {
    /// Grain id.
    pub id: GrainId,
    /// Unweighted mean of the boundary node positions.
    pub centroid: DVec3,
    /// Lower corner of the boundary node bounding box.
    pub bounds_min: DVec3,
    /// Upper corner of the boundary node bounding box.
    pub bounds_max: DVec3,
    /// Sum of signed centroid tetrahedra over the outward boundary.
    pub volume: f64,
    /// Some boundary triangle faces the domain exterior.
    pub on_edge: bool,
    /// Longest edge of any boundary triangle.
    pub max_edge_length: f64,
    /// Number of boundary nodes.
    pub node_count: usize,
    /// Number of boundary triangles.
    pub triangle_count: usize,
}

impl Grain {
    fn empty(id: GrainId) -> Self {
        Self {
            id,
            centroid: DVec3::ZERO,
            bounds_min: DVec3::ZERO,
            bounds_max: DVec3::ZERO,
            volume: 0.0,
            on_edge: false,
            max_edge_length: 0.0,
            node_count: 0,
            triangle_count: 0,
        }
    }

    /// Extent of the bounding box.
    pub fn extent(&self) -> DVec3 {
        self.bounds_max - self.bounds_min
    }

    /// Returns true when the grain has no boundary triangles.
    pub fn is_empty(&self) -> bool {
        self.triangle_count == 0
    }
}

/// Grain aggregates indexed by grain id.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GrainRegistry {
    grains: Vec<Grain>,
}

impl GrainRegistry {
    /// Builds the registry from the mesh's adjacency.
    ///
    /// Grains without boundary triangles keep zeroed aggregates.
    ///
    /// # Errors
    ///
    /// [`MeshGenError::StaleAdjacency`](crate::MeshGenError::StaleAdjacency)
    /// if the mesh changed since its last rebuild.
    pub fn compute(mesh: &SurfaceMesh) -> MeshGenResult<Self> {
        let adjacency = mesh.adjacency()?;
        let mut grains = Vec::with_capacity(adjacency.grain_nodes.len());

        for (index, nodes) in adjacency.grain_nodes.iter().enumerate() {
            let id = GrainId(index as u32);
            let mut grain = Grain::empty(id);
            let triangles = &adjacency.grain_triangles[index];
            if id.is_exterior() || nodes.is_empty() || triangles.is_empty() {
                grains.push(grain);
                continue;
            }

            let first = mesh.node(nodes[0]).position;
            let (mut lo, mut hi, mut sum) = (first, first, DVec3::ZERO);
            for &node in nodes {
                let p = mesh.node(node).position;
                lo = lo.min(p);
                hi = hi.max(p);
                sum += p;
            }
            grain.centroid = sum / nodes.len() as f64;
            grain.bounds_min = lo;
            grain.bounds_max = hi;
            grain.node_count = nodes.len();
            grain.triangle_count = triangles.len();

            for &triangle_id in triangles {
                let triangle = mesh.triangle(triangle_id);
                grain.on_edge |= triangle.on_edge;
                grain.max_edge_length = grain.max_edge_length.max(triangle.max_edge_length);
                if let Some(outward) = triangle.nodes_facing(id) {
                    let [p0, p1, p2] = mesh.positions(outward);
                    grain.volume += signed_tet_volume(grain.centroid, p0, p1, p2);
                }
            }
            log::debug!(
                "grain {id}: {} nodes, {} triangles, volume {:.6}",
                grain.node_count,
                grain.triangle_count,
                grain.volume
            );
            grains.push(grain);
        }

        Ok(Self { grains })
    }

    /// The record of `id`, if the id is known.
    pub fn get(&self, id: GrainId) -> Option<&Grain> {
        self.grains.get(id.index())
    }

    /// Returns true when `id` is a known grain touching the domain boundary.
    pub fn is_on_edge(&self, id: GrainId) -> bool {
        self.get(id).is_some_and(|g| g.on_edge)
    }

    /// Non-empty interior grains in id order.
    pub fn iter(&self) -> impl Iterator<Item = &Grain> {
        self.grains
            .iter()
            .filter(|g| !g.id.is_exterior() && !g.is_empty())
    }

    /// Number of id slots, exterior included.
    pub fn len(&self) -> usize {
        self.grains.len()
    }

    /// Returns true when no grain has a boundary.
    pub fn is_empty(&self) -> bool {
        self.iter().next().is_none()
    }

    /// Sum of all grain volumes.
    pub fn total_volume(&self) -> f64 {
        self.iter().map(|g| g.volume).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids::NodeId;
    use crate::test_support::unit_cube;
    use approx::assert_relative_eq;

    #[test]
    fn test_cube_aggregates() {
        let registry = GrainRegistry::compute(&unit_cube()).unwrap();
        let grain = registry.get(GrainId(1)).unwrap();
        assert_relative_eq!(grain.volume, 1.0, epsilon = 1e-12);
        assert_eq!(grain.centroid, DVec3::splat(0.5));
        assert_eq!(grain.bounds_min, DVec3::ZERO);
        assert_eq!(grain.bounds_max, DVec3::ONE);
        assert!(grain.on_edge);
        assert_relative_eq!(grain.max_edge_length, 2f64.sqrt());
        assert_eq!(grain.node_count, 8);
        assert_eq!(grain.triangle_count, 12);
        assert_eq!(registry.iter().count(), 1);
    }

    #[test]
    fn test_requires_fresh_adjacency() {
        let mut mesh = unit_cube();
        mesh.kill_node(NodeId(0));
        assert!(GrainRegistry::compute(&mesh).is_err());
    }

    #[test]
    fn test_unknown_grain() {
        let registry = GrainRegistry::compute(&unit_cube()).unwrap();
        assert!(registry.get(GrainId(5)).is_none());
        assert!(!registry.is_on_edge(GrainId(5)));
    }
}
