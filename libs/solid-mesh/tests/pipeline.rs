use approx::assert_relative_eq;
use glam::DVec3;
use solid_mesh::quality::bad_angles;
use solid_mesh::{
    GrainId, MeshGenConfig, MeshGenError, MeshGenerator, NodeId, Severity, SurfaceMesh, VoxelGridSpec,
};

/// Outward counter-clockwise quads over corner ids `x + 2y + 4z`.
const CUBE_FACES: [[u32; 4]; 6] = [
    [0, 2, 3, 1],
    [4, 5, 7, 6],
    [0, 1, 5, 4],
    [2, 6, 7, 3],
    [0, 4, 6, 2],
    [1, 3, 7, 5],
];

/// Adds an axis-aligned box separating `inside` from `outside`.
fn add_box(mesh: &mut SurfaceMesh, origin: DVec3, size: f64, inside: GrainId, outside: GrainId, num_grains: u32) {
    let base = mesh.nodes().len() as u32;
    for i in 0..8u32 {
        let corner = DVec3::new((i & 1) as f64, ((i >> 1) & 1) as f64, ((i >> 2) & 1) as f64);
        mesh.add_node(origin + corner * size, num_grains);
    }
    for [a, b, c, d] in CUBE_FACES {
        let n = |i: u32| NodeId(base + i);
        mesh.add_triangle([n(a), n(b), n(c)], [inside, outside]).unwrap();
        mesh.add_triangle([n(a), n(c), n(d)], [inside, outside]).unwrap();
    }
}

fn unit_cube() -> SurfaceMesh {
    let mut mesh = SurfaceMesh::default();
    add_box(&mut mesh, DVec3::ZERO, 1.0, GrainId(1), GrainId::EXTERIOR, 1);
    mesh
}

fn small_config(target: usize) -> MeshGenConfig {
    MeshGenConfig {
        target_grain_nodes: target,
        zbuffer_resolution: 48,
        ..MeshGenConfig::default()
    }
}

#[test]
fn cube_volume_is_preserved_end_to_end() {
    let output = MeshGenerator::new(small_config(150)).run(unit_cube()).unwrap();

    assert_relative_eq!(output.report.surface_volume, 1.0, epsilon = 1e-12);
    assert!((output.quality.total_volume - 1.0).abs() < 0.05);
    assert!(output.renumbering.is_identity());
    assert_eq!(output.report.jittered_nodes, 0);
    assert_eq!(output.report.build.unresolved_elements, 0);
    assert_eq!(output.report.sampling_attempts.len(), 1);
    assert!(output.volume.nodes().len() > 8);
    assert!(output.diagnostics.iter().all(|d| d.stage != "sampler"));
    for (_, element) in output.volume.live_elements() {
        assert_eq!(element.grain, Some(GrainId(1)));
        assert!(element.on_edge);
    }
}

#[test]
fn default_settings_keep_cube_volume_through_improvement() {
    let config = MeshGenConfig::default();
    let improved = MeshGenerator::new(MeshGenConfig::default()).run(unit_cube()).unwrap();
    let plain = MeshGenerator::new(MeshGenConfig {
        improve_mesh: false,
        ..MeshGenConfig::default()
    })
    .run(unit_cube())
    .unwrap();

    let surface_volume = improved.report.surface_volume;
    assert_relative_eq!(surface_volume, 1.0, epsilon = 1e-12);
    assert!(improved.volume.nodes().len() > 3000);
    assert!((plain.quality.total_volume - surface_volume).abs() < 0.05 * surface_volume);
    assert!((improved.quality.total_volume - surface_volume).abs() < 0.05 * surface_volume);

    // Every collapse removes at least one dihedral angle outside [10°, 170°].
    let bad = |output: &solid_mesh::MeshGenOutput| -> usize {
        output
            .volume
            .live_elements()
            .map(|(_, e)| bad_angles(e.geometry, &config))
            .sum()
    };
    let report = improved.report.improve.clone().unwrap();
    assert!(report.collapses > 0);
    assert!(bad(&improved) + report.collapses <= bad(&plain));
    assert_eq!(
        improved.volume.live_element_count() + report.killed_elements,
        plain.volume.live_element_count()
    );
}

#[test]
fn compacted_triangles_reference_distinct_live_nodes() {
    let output = MeshGenerator::new(small_config(40)).run(unit_cube()).unwrap();
    let node_count = output.surface.nodes().len();
    for (_, triangle) in output.surface.live_triangles() {
        let [a, b, c] = triangle.nodes;
        assert!(a != b && a != c && b != c);
        assert!(triangle.nodes.iter().all(|n| n.index() < node_count));
    }
    assert_eq!(output.surface.live_triangle_count(), 12);
}

#[test]
fn runs_are_reproducible() {
    let generator = MeshGenerator::new(small_config(60));
    let first = generator.run(unit_cube()).unwrap();
    let second = generator.run(unit_cube()).unwrap();
    assert_eq!(first.volume.nodes(), second.volume.nodes());
    let elements = |output: &solid_mesh::MeshGenOutput| {
        output
            .volume
            .live_elements()
            .map(|(_, e)| (e.nodes, e.grain))
            .collect::<Vec<_>>()
    };
    assert_eq!(elements(&first), elements(&second));
    assert_eq!(first.quality.dihedral_bulk, second.quality.dihedral_bulk);
    assert_eq!(first.quality.volume_surface, second.quality.volume_surface);
    assert_eq!(first.report.sampling_attempts, second.report.sampling_attempts);
}

#[test]
fn nested_grain_statistics_count_each_element_once() {
    let mut mesh = SurfaceMesh::default();
    add_box(&mut mesh, DVec3::ZERO, 2.0, GrainId(1), GrainId::EXTERIOR, 1);
    add_box(&mut mesh, DVec3::splat(0.5), 1.0, GrainId(2), GrainId(1), 2);

    let config = MeshGenConfig {
        node_jitter: 0.0,
        ..small_config(60)
    };
    let output = MeshGenerator::new(config).run(mesh).unwrap();
    assert_relative_eq!(output.grains.get(GrainId(1)).unwrap().volume, 7.0, epsilon = 1e-9);
    assert_relative_eq!(output.grains.get(GrainId(2)).unwrap().volume, 1.0, epsilon = 1e-9);
    assert!(!output.grains.is_on_edge(GrainId(2)));

    let counted = output
        .volume
        .live_elements()
        .filter(|(_, e)| !e.on_edge && e.geometry.is_some())
        .count() as u32;
    let dihedral: u32 = output.quality.dihedral_surface.iter().sum::<u32>()
        + output.quality.dihedral_bulk.iter().sum::<u32>();
    let volume: u32 =
        output.quality.volume_surface.iter().sum::<u32>() + output.quality.volume_bulk.iter().sum::<u32>();
    assert_eq!(dihedral, 6 * counted);
    assert_eq!(volume, counted);

    for (_, element) in output.volume.live_elements() {
        if let Some(geometry) = element.geometry {
            assert!(geometry.volume >= 0.0);
            assert!(geometry.dihedral.iter().all(|a| (0.0..=180.0).contains(a)));
        }
    }
}

#[test]
fn voxel_grid_is_painted() {
    let config = MeshGenConfig {
        voxel_grid: Some(VoxelGridSpec {
            dims: [4, 4, 4],
            spacing: DVec3::splat(0.25),
            origin: DVec3::ZERO,
        }),
        ..small_config(30)
    };
    let output = MeshGenerator::new(config).run(unit_cube()).unwrap();
    let voxels = output.voxels.unwrap();
    assert_eq!(voxels.count(GrainId(1)), 64);
}

#[test]
fn flat_grain_is_reported_not_fatal() {
    let mut mesh = unit_cube();
    let a = mesh.add_node(DVec3::new(2.0, 0.0, 0.0), 1);
    let b = mesh.add_node(DVec3::new(3.0, 0.0, 0.0), 1);
    let c = mesh.add_node(DVec3::new(2.0, 1.0, 0.0), 1);
    mesh.add_triangle([a, b, c], [GrainId(2), GrainId::EXTERIOR]).unwrap();

    let output = MeshGenerator::new(small_config(40)).run(mesh).unwrap();
    assert!(output
        .diagnostics
        .iter()
        .any(|d| d.stage == "sampler" && d.message.contains("Degenerate")));
    assert!(!output.report.sampling_attempts.contains_key(&GrainId(2)));
}

#[test]
fn sampling_budget_is_reported() {
    let config = MeshGenConfig {
        max_sampling_attempts: 10,
        ..small_config(500)
    };
    let output = MeshGenerator::new(config).run(unit_cube()).unwrap();
    assert_eq!(output.report.sampling_attempts[&GrainId(1)], 10);
    assert!(output
        .diagnostics
        .iter()
        .any(|d| d.stage == "sampler" && d.severity == Severity::Warning && d.message.contains("10")));
}

#[test]
fn invalid_config_is_rejected() {
    let config = MeshGenConfig {
        tolerance: -1.0,
        ..MeshGenConfig::default()
    };
    let err = MeshGenerator::new(config).run(unit_cube()).unwrap_err();
    assert!(matches!(err, MeshGenError::Config(_)));
}

#[test]
fn empty_surface_is_invalid() {
    let err = MeshGenerator::new(small_config(10))
        .run(SurfaceMesh::default())
        .unwrap_err();
    assert!(matches!(err, MeshGenError::InvalidMesh { .. }));
}

#[test]
fn surface_files_are_meshed() {
    let dir = std::env::temp_dir().join(format!("solid-mesh-{}", std::process::id()));
    std::fs::create_dir_all(&dir).unwrap();

    let mut nodes = String::from("8\n");
    for i in 0..8 {
        nodes.push_str(&format!("{i} 1 {} {} {}\n", i & 1, (i >> 1) & 1, (i >> 2) & 1));
    }
    let mut triangles = String::from("12\n");
    for (f, [a, b, c, d]) in CUBE_FACES.iter().enumerate() {
        triangles.push_str(&format!("{} {a} {b} {c} -1 -1 -1 1 -1\n", 2 * f));
        triangles.push_str(&format!("{} {a} {c} {d} -1 -1 -1 1 -1\n", 2 * f + 1));
    }
    std::fs::write(dir.join("nodes.txt"), nodes).unwrap();
    std::fs::write(dir.join("triangles.txt"), triangles).unwrap();

    let output = MeshGenerator::new(small_config(40))
        .run_files(dir.join("nodes.txt"), dir.join("triangles.txt"))
        .unwrap();
    assert_relative_eq!(output.report.surface_volume, 1.0, epsilon = 1e-12);
    assert!((output.quality.total_volume - 1.0).abs() < 0.05);

    std::fs::remove_dir_all(&dir).unwrap();
}
