//! Tests for z-buffer classification and interior sampling.

use super::*;
use crate::grain::GrainRegistry;
use crate::ids::NodeId;
use crate::test_support::{unit_cube, CUBE_FACES};
use rand::rngs::StdRng;
use rand::SeedableRng;

fn config(target: usize, attempts: usize) -> MeshGenConfig {
    MeshGenConfig {
        zbuffer_resolution: 32,
        target_grain_nodes: target,
        max_sampling_attempts: attempts,
        ..MeshGenConfig::default()
    }
}

fn cube_grain(mesh: &SurfaceMesh) -> Grain {
    GrainRegistry::compute(mesh)
        .unwrap()
        .get(GrainId(1))
        .cloned()
        .unwrap()
}

// =============================================================================
// Z-BUFFER TESTS
// =============================================================================

#[test]
fn test_zbuffer_starts_empty() {
    let buffer = ZBuffer::new(8, 1e-9);
    assert_eq!(buffer.resolution(), 8);
    assert!(buffer.depth_margin(DVec3::splat(0.5), false).is_none());
}

#[test]
fn test_zbuffer_classifies_cube() {
    let mesh = unit_cube();
    let grain = cube_grain(&mesh);
    let mut sampler = InteriorSampler::new(&config(8, 10));
    let mut grid = VoxelGrid::new(VoxelGridSpec {
        dims: [1, 1, 1],
        spacing: DVec3::ONE,
        origin: DVec3::ZERO,
    });
    sampler.paint_grain(&mesh, &grain, &mut grid).unwrap();
    assert!(sampler.contains(&grain, DVec3::new(0.5, 0.4, 0.3)));
    assert!(sampler.contains(&grain, DVec3::new(0.01, 0.99, 0.5)));
    assert!(!sampler.contains(&grain, DVec3::new(1.5, 0.5, 0.5)));
}

#[test]
fn test_depth_margin_is_distance_to_nearest_face() {
    let mesh = unit_cube();
    let grain = cube_grain(&mesh);
    let mut sampler = InteriorSampler::new(&config(8, 10));
    let mut grid = VoxelGrid::new(VoxelGridSpec {
        dims: [1, 1, 1],
        spacing: DVec3::ONE,
        origin: DVec3::ZERO,
    });
    sampler.paint_grain(&mesh, &grain, &mut grid).unwrap();
    let margin = sampler.zbuffer.depth_margin(DVec3::new(0.5, 0.5, 0.1), true).unwrap();
    assert!((margin - 0.1).abs() < 1e-9);
    assert!(sampler.zbuffer.depth_margin(DVec3::new(0.5, 0.5, 0.0), true).is_none());
    assert!(sampler.zbuffer.depth_margin(DVec3::new(0.5, 0.5, 0.0), false).is_some());
}

// =============================================================================
// VOXEL TESTS
// =============================================================================

#[test]
fn test_voxels_inside_cube_are_painted() {
    let mesh = unit_cube();
    let grain = cube_grain(&mesh);
    let mut sampler = InteriorSampler::new(&config(8, 10));
    let mut grid = VoxelGrid::new(VoxelGridSpec {
        dims: [6, 6, 6],
        spacing: DVec3::splat(0.25),
        origin: DVec3::splat(-0.25),
    });
    sampler.paint_grain(&mesh, &grain, &mut grid).unwrap();
    assert_eq!(grid.count(GrainId(1)), 64);
    assert_eq!(grid.get(0, 0, 0), 0);
    assert_eq!(grid.get(1, 1, 1), 1);
    assert_eq!(grid.get(4, 4, 4), 1);
    assert_eq!(grid.get(5, 4, 4), 0);
}

// =============================================================================
// SAMPLING TESTS
// =============================================================================

#[test]
fn test_sampling_reaches_target() {
    let mesh = unit_cube();
    let grain = cube_grain(&mesh);
    let mut sampler = InteriorSampler::new(&config(60, 100_000));
    let mut rng = StdRng::seed_from_u64(11);
    let samples = sampler.sample_grain(&mesh, &grain, None, &mut rng).unwrap();
    assert!(samples.converged);
    assert_eq!(samples.points.len(), 52);
    assert!(samples.attempts >= 52);
    for p in &samples.points {
        assert!(p.cmpgt(DVec3::ZERO).all() && p.cmplt(DVec3::ONE).all());
    }
}

#[test]
fn test_sampling_is_reproducible() {
    let mesh = unit_cube();
    let grain = cube_grain(&mesh);
    let mut sampler = InteriorSampler::new(&config(30, 100_000));
    let a = sampler
        .sample_grain(&mesh, &grain, None, &mut StdRng::seed_from_u64(3))
        .unwrap();
    let b = sampler
        .sample_grain(&mesh, &grain, None, &mut StdRng::seed_from_u64(3))
        .unwrap();
    assert_eq!(a, b);
}

#[test]
fn test_target_already_met_draws_nothing() {
    let mesh = unit_cube();
    let grain = cube_grain(&mesh);
    let mut sampler = InteriorSampler::new(&config(8, 100));
    let samples = sampler
        .sample_grain(&mesh, &grain, None, &mut StdRng::seed_from_u64(1))
        .unwrap();
    assert!(samples.converged);
    assert_eq!(samples.attempts, 0);
    assert!(samples.points.is_empty());
}

#[test]
fn test_flat_grain_is_rejected() {
    let mut mesh = SurfaceMesh::default();
    let a = mesh.add_node(DVec3::ZERO, 1);
    let b = mesh.add_node(DVec3::X, 1);
    let c = mesh.add_node(DVec3::Y, 1);
    mesh.add_triangle([a, b, c], [GrainId(1), GrainId::EXTERIOR]).unwrap();
    mesh.rebuild_adjacency();
    let grain = cube_grain(&mesh);

    let mut sampler = InteriorSampler::new(&config(100, 1_000_000_000));
    let err = sampler
        .sample_grain(&mesh, &grain, None, &mut StdRng::seed_from_u64(1))
        .unwrap_err();
    assert!(matches!(err, MeshGenError::DegenerateGeometry { .. }));
}

#[test]
fn test_open_grain_spends_budget() {
    let mut mesh = SurfaceMesh::default();
    for i in 0..8u32 {
        let p = DVec3::new((i & 1) as f64, ((i >> 1) & 1) as f64, ((i >> 2) & 1) as f64);
        mesh.add_node(p, 1);
    }
    for [a, b, c, d] in &CUBE_FACES[..2] {
        let n = |i: &u32| NodeId(*i);
        mesh.add_triangle([n(a), n(b), n(c)], [GrainId(1), GrainId::EXTERIOR]).unwrap();
        mesh.add_triangle([n(a), n(c), n(d)], [GrainId(1), GrainId::EXTERIOR]).unwrap();
    }
    mesh.rebuild_adjacency();
    let grain = cube_grain(&mesh);

    let mut sampler = InteriorSampler::new(&config(100, 500));
    let samples = sampler
        .sample_grain(&mesh, &grain, None, &mut StdRng::seed_from_u64(5))
        .unwrap();
    assert!(!samples.converged);
    assert_eq!(samples.attempts, 500);
    assert!(samples.points.is_empty());
}
