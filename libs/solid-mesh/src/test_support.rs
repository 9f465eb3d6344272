//! Mesh fixtures shared by unit tests.

use crate::ids::{GrainId, NodeId};
use crate::surface::SurfaceMesh;
use glam::DVec3;

/// Outward counter-clockwise quads of the unit cube over corner ids
/// `x + 2y + 4z`.
pub(crate) const CUBE_FACES: [[u32; 4]; 6] = [
    [0, 2, 3, 1],
    [4, 5, 7, 6],
    [0, 1, 5, 4],
    [2, 6, 7, 3],
    [0, 4, 6, 2],
    [1, 3, 7, 5],
];

/// Box `[origin, origin + size]` bounding `grain` against the exterior,
/// with fresh adjacency.
pub(crate) fn cube(origin: DVec3, size: f64, grain: GrainId) -> SurfaceMesh {
    let mut mesh = SurfaceMesh::default();
    for i in 0..8u32 {
        let corner = DVec3::new((i & 1) as f64, ((i >> 1) & 1) as f64, ((i >> 2) & 1) as f64);
        mesh.add_node(origin + corner * size, 1);
    }
    for [a, b, c, d] in CUBE_FACES {
        mesh.add_triangle([NodeId(a), NodeId(b), NodeId(c)], [grain, GrainId::EXTERIOR])
            .expect("valid cube triangle");
        mesh.add_triangle([NodeId(a), NodeId(c), NodeId(d)], [grain, GrainId::EXTERIOR])
            .expect("valid cube triangle");
    }
    mesh.rebuild_adjacency();
    mesh
}

/// Unit cube holding grain 1.
pub(crate) fn unit_cube() -> SurfaceMesh {
    cube(DVec3::ZERO, 1.0, GrainId(1))
}
