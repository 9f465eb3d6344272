//! # Surface Cleanup
//!
//! In-place passes over a [`SurfaceMesh`] that remove small flush triangles,
//! relax sharp triangles and optionally smooth nodes. Every pass starts from
//! fresh adjacency and leaves fresh adjacency behind; killed entries stay in
//! the arena until [`SurfaceMesh::compact`].

use super::SurfaceMesh;
use crate::config::MeshGenConfig;
use crate::error::MeshGenResult;
use crate::geometry::{dihedral_angle, triangle_angles, TRIANGLE_EDGES};
use crate::ids::{NodeId, TriangleId};
use glam::DVec3;
use serde::{Deserialize, Serialize};

/// Counters of the small/misoriented triangle pass.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CollapseReport {
    /// Triangles whose neighbourhood was inspected.
    pub examined: usize,
    /// Edge collapses performed.
    pub collapsed: usize,
    /// Triangles killed as a side effect of the collapses.
    pub killed_triangles: usize,
}

/// Counters of the sharp-angle relaxation pass.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RelaxReport {
    /// Full passes run.
    pub passes: usize,
    /// Edge collapses performed.
    pub collapsed: usize,
    /// A pass finished without changes before the budget ran out.
    pub converged: bool,
}

/// Collapses triangles that are both flush with their same-boundary
/// neighbours and small.
///
/// For every live, non-edge triangle the fold angle against each live
/// neighbour sharing its grain pair and at least one node is measured, with
/// the neighbour normal flipped when the two triangles list the grains in
/// opposite order. The triangle is kept when any single fold is below
/// `crease_keep_deg`, when the average fold is at most
/// `misorientation_collapse_deg`, when its area is at least
/// `small_area_fraction` of the mean, or when it has no such neighbour.
/// Otherwise its shortest edge is collapsed. Zero-area triangles are always
/// collapsed.
///
/// # Errors
///
/// [`MeshGenError::StaleAdjacency`](crate::MeshGenError::StaleAdjacency) if
/// adjacency was not rebuilt beforehand.
pub fn collapse_small_or_misoriented_triangles(
    mesh: &mut SurfaceMesh,
    config: &MeshGenConfig,
) -> MeshGenResult<CollapseReport> {
    mesh.adjacency()?;
    let mut report = CollapseReport::default();

    let (area_sum, area_count) = mesh
        .live_triangles()
        .filter(|(_, t)| !t.degenerate)
        .fold((0.0, 0usize), |(sum, count), (_, t)| (sum + t.area, count + 1));
    let mean_area = if area_count > 0 { area_sum / area_count as f64 } else { 0.0 };
    let small_area = config.small_area_fraction * mean_area;

    for index in 0..mesh.triangles().len() {
        let id = TriangleId::new(index);
        let triangle = mesh.triangle(id);
        if triangle.killed || triangle.on_edge {
            continue;
        }
        report.examined += 1;

        if !triangle.degenerate {
            let neighbours = same_boundary_neighbours(mesh, id);
            if neighbours.is_empty() {
                continue;
            }
            let mut folds = Vec::with_capacity(neighbours.len());
            for neighbour in &neighbours {
                let other = mesh.triangle(*neighbour);
                let normal_fix = if triangle.grains[0] == other.grains[0] { 1.0 } else { -1.0 };
                folds.push(dihedral_angle(triangle.normal, other.normal * normal_fix));
            }
            let average = folds.iter().sum::<f64>() / folds.len() as f64;
            mesh.triangles[index].avg_misorientation = Some(average);

            let crease = folds.iter().any(|&fold| fold < config.crease_keep_deg);
            if crease
                || average <= config.misorientation_collapse_deg
                || mesh.triangles[index].area >= small_area
            {
                continue;
            }
        }

        let edge = mesh.triangle(id).shortest_edge();
        let (a, b) = mesh.triangle(id).edge(edge);
        let (keep, remove, target) = mesh.collapse_plan(a, b);
        let collapse = mesh.collapse_edge(keep, remove, target);
        report.collapsed += 1;
        report.killed_triangles += collapse.killed_triangles.len();
    }

    mesh.rebuild_adjacency();
    log::info!(
        "collapse pass: examined {} triangles, {} collapses, {} triangles killed",
        report.examined,
        report.collapsed,
        report.killed_triangles
    );
    Ok(report)
}

fn same_boundary_neighbours(mesh: &SurfaceMesh, id: TriangleId) -> Vec<TriangleId> {
    let triangle = mesh.triangle(id);
    let mut neighbours: Vec<TriangleId> = triangle
        .nodes
        .iter()
        .flat_map(|&node| mesh.working_node_triangles(node).iter().copied())
        .filter(|&other| {
            let t = mesh.triangle(other);
            other != id && !t.killed && !t.degenerate && t.same_boundary(triangle)
        })
        .collect();
    neighbours.sort_unstable();
    neighbours.dedup();
    neighbours
}

/// Collapses triangles that have an included angle below
/// `sharp_angle_deg`, repeating until a full pass changes nothing.
///
/// The edge opposite the smallest offending angle is merged. Triangles with
/// all angles at or above the threshold are never touched directly. The
/// loop stops after `max_relax_passes`, leaving `converged` false.
///
/// # Errors
///
/// [`MeshGenError::StaleAdjacency`](crate::MeshGenError::StaleAdjacency) if
/// adjacency was not rebuilt beforehand.
pub fn relax_sharp_angle_triangles(
    mesh: &mut SurfaceMesh,
    config: &MeshGenConfig,
) -> MeshGenResult<RelaxReport> {
    mesh.adjacency()?;
    let mut report = RelaxReport::default();
    let tolerance = mesh.tolerance();

    while report.passes < config.max_relax_passes {
        report.passes += 1;
        let mut changed = false;

        for index in 0..mesh.triangles().len() {
            let id = TriangleId::new(index);
            let triangle = mesh.triangle(id);
            if triangle.killed || triangle.on_edge {
                continue;
            }
            let edge = if triangle.degenerate {
                triangle.shortest_edge()
            } else {
                let angles = triangle_angles(mesh.positions(triangle.nodes), tolerance);
                let (corner, smallest) = angles
                    .iter()
                    .copied()
                    .enumerate()
                    .fold((0, f64::INFINITY), |best, (i, a)| if a < best.1 { (i, a) } else { best });
                if smallest >= config.sharp_angle_deg {
                    continue;
                }
                opposite_edge(corner)
            };
            let (a, b) = triangle.edge(edge);
            let (keep, remove, target) = mesh.collapse_plan(a, b);
            mesh.collapse_edge(keep, remove, target);
            report.collapsed += 1;
            changed = true;
        }

        if !changed {
            report.converged = true;
            break;
        }
    }

    mesh.rebuild_adjacency();
    if report.converged {
        log::info!(
            "relax pass: {} collapses in {} passes",
            report.collapsed,
            report.passes
        );
    } else {
        log::warn!(
            "relax pass stopped after {} passes with {} collapses",
            report.passes,
            report.collapsed
        );
    }
    Ok(report)
}

/// Index into [`TRIANGLE_EDGES`] of the edge facing `corner`.
fn opposite_edge(corner: usize) -> usize {
    TRIANGLE_EDGES
        .iter()
        .position(|&(a, b)| a != corner && b != corner)
        .unwrap_or(0)
}

/// Moves every live node that is neither on edge nor a triple junction to
/// the mean of its neighbours (one Jacobi sweep). Returns the number of
/// nodes moved.
///
/// # Errors
///
/// [`MeshGenError::StaleAdjacency`](crate::MeshGenError::StaleAdjacency) if
/// adjacency was not rebuilt beforehand.
pub fn smooth_nodes(mesh: &mut SurfaceMesh) -> MeshGenResult<usize> {
    let adjacency = mesh.adjacency()?;
    let mut updates: Vec<(NodeId, DVec3)> = Vec::new();
    for (index, node) in mesh.nodes().iter().enumerate() {
        if node.killed || node.on_edge || node.triple_junction {
            continue;
        }
        let neighbours = &adjacency.node_neighbors[index];
        if neighbours.is_empty() {
            continue;
        }
        let sum = neighbours
            .iter()
            .fold(DVec3::ZERO, |acc, n| acc + mesh.node(*n).position);
        updates.push((NodeId::new(index), sum / neighbours.len() as f64));
    }

    let moved = updates.len();
    for (node, position) in updates {
        mesh.move_node(node, position)?;
    }
    log::debug!("smoothed {moved} nodes");
    Ok(moved)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids::GrainId;

    fn grains(a: u32, b: u32) -> [GrainId; 2] {
        [GrainId(a), GrainId(b)]
    }

    /// A flat 3x3 node patch split into 8 triangles between grains 1 and 2,
    /// with the centre node optionally displaced.
    fn flat_patch(center: DVec3) -> SurfaceMesh {
        let mut mesh = SurfaceMesh::default();
        let mut ids = Vec::new();
        for j in 0..3 {
            for i in 0..3 {
                let position = if i == 1 && j == 1 {
                    center
                } else {
                    DVec3::new(i as f64, j as f64, 0.0)
                };
                ids.push(mesh.add_node(position, 2));
            }
        }
        for j in 0..2 {
            for i in 0..2 {
                let a = ids[j * 3 + i];
                let b = ids[j * 3 + i + 1];
                let c = ids[(j + 1) * 3 + i];
                let d = ids[(j + 1) * 3 + i + 1];
                mesh.add_triangle([a, b, d], grains(1, 2)).unwrap();
                mesh.add_triangle([a, d, c], grains(1, 2)).unwrap();
            }
        }
        mesh.rebuild_adjacency();
        mesh
    }

    #[test]
    fn test_passes_require_fresh_adjacency() {
        let mut mesh = flat_patch(DVec3::new(1.0, 1.0, 0.0));
        mesh.kill_triangle(TriangleId(0));
        let config = MeshGenConfig::default();
        assert!(collapse_small_or_misoriented_triangles(&mut mesh, &config).is_err());
        assert!(relax_sharp_angle_triangles(&mut mesh, &config).is_err());
        assert!(smooth_nodes(&mut mesh).is_err());
    }

    #[test]
    fn test_uniform_flat_patch_is_kept() {
        let mut mesh = flat_patch(DVec3::new(1.0, 1.0, 0.0));
        let report =
            collapse_small_or_misoriented_triangles(&mut mesh, &MeshGenConfig::default()).unwrap();
        assert_eq!(report.collapsed, 0);
        assert_eq!(mesh.live_triangle_count(), 8);
        let folds: Vec<f64> = mesh.triangles().iter().filter_map(|t| t.avg_misorientation).collect();
        assert_eq!(folds.len(), 8);
        assert!(folds.iter().all(|&f| (f - 180.0).abs() < 1e-9));
    }

    #[test]
    fn test_crease_blocks_collapse() {
        let mut mesh = flat_patch(DVec3::new(1.0, 1.0, 0.0));
        let config = MeshGenConfig {
            small_area_fraction: 10.0,
            ..MeshGenConfig::default()
        };
        let mut creased = mesh.clone();
        creased.move_node(NodeId(4), DVec3::new(1.0, 1.0, 0.8)).unwrap();
        let report = collapse_small_or_misoriented_triangles(&mut creased, &config).unwrap();
        assert_eq!(report.collapsed, 0);

        let report = collapse_small_or_misoriented_triangles(&mut mesh, &config).unwrap();
        assert!(report.collapsed > 0);
        assert!(mesh.live_triangle_count() < 8);
    }

    #[test]
    fn test_relax_collapses_sliver() {
        let mut mesh = flat_patch(DVec3::new(1.95, 1.0, 0.0));
        let report = relax_sharp_angle_triangles(&mut mesh, &MeshGenConfig::default()).unwrap();
        assert!(report.converged);
        assert!(report.collapsed >= 1);
        let tolerance = mesh.tolerance();
        for (_, triangle) in mesh.live_triangles() {
            let angles = triangle_angles(mesh.positions(triangle.nodes), tolerance);
            assert!(angles.iter().all(|&a| a >= 20.0));
        }
    }

    #[test]
    fn test_relax_is_bounded() {
        let mut mesh = flat_patch(DVec3::new(1.95, 1.0, 0.0));
        let config = MeshGenConfig {
            max_relax_passes: 1,
            ..MeshGenConfig::default()
        };
        let report = relax_sharp_angle_triangles(&mut mesh, &config).unwrap();
        assert_eq!(report.passes, 1);
        assert!(!report.converged);
    }

    #[test]
    fn test_smoothing_recentres_free_node() {
        let mut mesh = flat_patch(DVec3::new(1.3, 0.8, 0.0));
        assert_eq!(smooth_nodes(&mut mesh).unwrap(), 9);
        let centre = mesh.node(NodeId(4)).position;
        assert!(centre.distance(DVec3::new(1.0, 1.0, 0.0)) < 1e-12);
    }

    #[test]
    fn test_opposite_edge() {
        assert_eq!(opposite_edge(0), 2);
        assert_eq!(opposite_edge(1), 1);
        assert_eq!(opposite_edge(2), 0);
    }
}
