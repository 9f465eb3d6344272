//! # Mesh Quality
//!
//! Per-element measurement of the volume mesh and the edge-collapse
//! improvement loop that removes slivers.
//!
//! ## Statistics
//!
//! - Dihedral angles: 1° bins over `[0, 180)`, surface and bulk elements
//!   counted separately.
//! - Volume ratio to the mean element volume: 25 bins with edges
//!   [`VOLUME_RATIO_EDGES`].
//!
//! Elements of grains touching the domain boundary, unmeasurable elements
//! and killed elements stay out of both histograms.

use crate::config::MeshGenConfig;
use crate::geometry::{needs_flip, signed_tet_volume, TetGeometry, TET_EDGES};
use crate::ids::{ElementId, GrainId, NodeId};
use crate::volume::{Element, VolumeMesh, VolumeNode};
use config::constants::{DIHEDRAL_BINS, VOLUME_RATIO_BINS, VOLUME_RATIO_EDGES};
use glam::DVec3;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

// =============================================================================
// MEASUREMENT
// =============================================================================

/// Histograms and totals of one measurement of the volume mesh.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QualityReport {
    /// Dihedral angle counts of surface elements, one per degree.
    pub dihedral_surface: Vec<u32>,
    /// Dihedral angle counts of bulk elements, one per degree.
    pub dihedral_bulk: Vec<u32>,
    /// Volume ratio counts of surface elements.
    pub volume_surface: Vec<u32>,
    /// Volume ratio counts of bulk elements.
    pub volume_bulk: Vec<u32>,
    /// Live elements with a valid geometry.
    pub measured_elements: usize,
    /// Live elements too flat to measure.
    pub degenerate_elements: usize,
    /// Mean volume of the measured elements.
    pub average_volume: f64,
    /// Sum of the measured element volumes.
    pub total_volume: f64,
    /// Measured volume per resolved grain.
    pub grain_volumes: BTreeMap<GrainId, f64>,
    /// Smallest dihedral angle of any measured element.
    pub min_dihedral: f64,
    /// Largest dihedral angle of any measured element.
    pub max_dihedral: f64,
}

/// Index of the volume-ratio bin holding `ratio`.
///
/// # Example
///
/// ```rust
/// use solid_mesh::quality::volume_ratio_bin;
///
/// assert_eq!(volume_ratio_bin(0.05), 0);
/// assert_eq!(volume_ratio_bin(1.0), 10);
/// assert_eq!(volume_ratio_bin(1.5), 10);
/// assert_eq!(volume_ratio_bin(100.0), 24);
/// ```
pub fn volume_ratio_bin(ratio: f64) -> usize {
    VOLUME_RATIO_EDGES.partition_point(|&edge| edge <= ratio)
}

/// Histogram accumulator reduced across worker threads.
#[derive(Debug, Clone)]
struct Histograms {
    dihedral: [Vec<u32>; 2],
    volume: [Vec<u32>; 2],
}

impl Histograms {
    fn new() -> Self {
        Self {
            dihedral: [vec![0; DIHEDRAL_BINS], vec![0; DIHEDRAL_BINS]],
            volume: [vec![0; VOLUME_RATIO_BINS], vec![0; VOLUME_RATIO_BINS]],
        }
    }

    fn add(mut self, element: &Element, average_volume: f64) -> Self {
        let Some(geometry) = element.geometry else {
            return self;
        };
        let side = usize::from(!element.surface);
        for angle in geometry.dihedral {
            let bin = (angle.max(0.0) as usize).min(DIHEDRAL_BINS - 1);
            self.dihedral[side][bin] += 1;
        }
        self.volume[side][volume_ratio_bin(geometry.volume / average_volume)] += 1;
        self
    }

    fn merge(mut self, other: Self) -> Self {
        for (mine, theirs) in self.dihedral.iter_mut().zip(&other.dihedral) {
            mine.iter_mut().zip(theirs).for_each(|(a, b)| *a += b);
        }
        for (mine, theirs) in self.volume.iter_mut().zip(&other.volume) {
            mine.iter_mut().zip(theirs).for_each(|(a, b)| *a += b);
        }
        self
    }
}

/// Orients every live element positively, measures its geometry and
/// histograms the result.
///
/// Orientation swaps the last two nodes of an element whose fourth node lies
/// behind its first face. Elements that cannot be measured keep
/// `geometry = None` and are only counted.
pub fn measure(mesh: &mut VolumeMesh, tolerance: f64) -> QualityReport {
    let (nodes, elements) = mesh.split_mut();
    let nodes: &[VolumeNode] = nodes;
    elements
        .par_iter_mut()
        .filter(|e| !e.killed)
        .for_each(|element| orient_and_measure(nodes, element, tolerance));

    let (measured, total_volume) = elements
        .par_iter()
        .filter(|e| !e.killed)
        .filter_map(|e| e.geometry.map(|g| g.volume))
        .fold(|| (0usize, 0.0f64), |(n, sum), v| (n + 1, sum + v))
        .reduce(|| (0, 0.0), |a, b| (a.0 + b.0, a.1 + b.1));
    let live = elements.iter().filter(|e| !e.killed).count();
    let average_volume = if measured > 0 { total_volume / measured as f64 } else { 0.0 };

    let histograms = elements
        .par_iter()
        .filter(|e| !e.killed && !e.on_edge)
        .fold(Histograms::new, |h, e| h.add(e, average_volume))
        .reduce(Histograms::new, Histograms::merge);

    let (min_dihedral, max_dihedral) = elements
        .iter()
        .filter(|e| !e.killed)
        .filter_map(|e| e.geometry)
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), g| {
            (lo.min(g.min_dihedral()), hi.max(g.max_dihedral()))
        });

    let [dihedral_surface, dihedral_bulk] = histograms.dihedral;
    let [volume_surface, volume_bulk] = histograms.volume;
    let report = QualityReport {
        dihedral_surface,
        dihedral_bulk,
        volume_surface,
        volume_bulk,
        measured_elements: measured,
        degenerate_elements: live - measured,
        average_volume,
        total_volume,
        grain_volumes: mesh.grain_volumes(),
        min_dihedral,
        max_dihedral,
    };
    log::info!(
        "measured {} elements ({} degenerate), volume {:.6}, dihedral range [{:.2}, {:.2}]",
        report.measured_elements,
        report.degenerate_elements,
        report.total_volume,
        report.min_dihedral,
        report.max_dihedral
    );
    report
}

fn orient_and_measure(nodes: &[VolumeNode], element: &mut Element, tolerance: f64) {
    let mut p = element.nodes.map(|n| nodes[n.index()].position);
    if needs_flip(p) {
        element.nodes.swap(2, 3);
        p.swap(2, 3);
    }
    element.geometry = TetGeometry::compute(p, tolerance).ok();
}

// =============================================================================
// IMPROVEMENT
// =============================================================================

/// Outcome of [`improve`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ImproveReport {
    /// Passes run.
    pub passes: usize,
    /// Edges collapsed.
    pub collapses: usize,
    /// Candidate collapses turned down by the acceptance checks.
    pub rejected: usize,
    /// Elements removed by the collapses.
    pub killed_elements: usize,
    /// A full pass made no change before the budget ran out.
    pub converged: bool,
}

/// Collapses one edge of every element whose dihedral angles leave
/// `[min_dihedral_deg, max_dihedral_deg]`, pass after pass, until a pass
/// changes nothing or `max_improve_passes` is reached. Edges are tried
/// shortest first.
///
/// An edge is collapsible when one endpoint is an interior node. A surface
/// endpoint always survives in place; two interior endpoints meet at the
/// midpoint. A collapse is only applied when
///
/// - the edge satisfies the link condition, so the mesh stays a manifold
///   tiling;
/// - no surviving element around it flattens or inverts;
/// - the signed volume of the elements around both endpoints is unchanged;
/// - the number of out-of-range dihedral angles around it goes down.
///
/// Every applied collapse therefore lowers the mesh-wide count of bad angles
/// and keeps the tiled volume.
///
/// Requires a prior [`measure`].
pub fn improve(mesh: &mut VolumeMesh, config: &MeshGenConfig) -> ImproveReport {
    let mut report = ImproveReport::default();

    while report.passes < config.max_improve_passes {
        report.passes += 1;
        let mut node_elements = mesh.node_elements();
        let mut changed = 0;

        for index in 0..mesh.elements().len() {
            let element = mesh.element(ElementId::new(index));
            if element.killed {
                continue;
            }
            let Some(geometry) = element.geometry else {
                continue;
            };
            if bad_angles(Some(geometry), config) == 0 {
                continue;
            }

            let mut order = [0usize, 1, 2, 3, 4, 5];
            order.sort_by(|&a, &b| geometry.edge_lengths[a].total_cmp(&geometry.edge_lengths[b]));
            let nodes = element.nodes;
            for edge in order {
                let (i, j) = TET_EDGES[edge];
                let Some(plan) = plan_collapse(mesh, nodes[i], nodes[j]) else {
                    continue;
                };
                if !collapse_is_acceptable(mesh, &node_elements, &plan, config) {
                    report.rejected += 1;
                    continue;
                }
                report.killed_elements += apply_collapse(mesh, &mut node_elements, &plan, config.tolerance);
                report.collapses += 1;
                changed += 1;
                break;
            }
        }

        log::debug!("improve pass {}: {changed} collapses", report.passes);
        if changed == 0 {
            report.converged = true;
            break;
        }
    }

    if !report.converged {
        log::warn!(
            "mesh improvement stopped after {} passes with {} collapses",
            report.passes,
            report.collapses
        );
    }
    report
}

/// Dihedral angles outside the configured range. An unmeasurable element
/// counts all six.
pub fn bad_angles(geometry: Option<TetGeometry>, config: &MeshGenConfig) -> usize {
    geometry.map_or(6, |g| {
        g.dihedral
            .iter()
            .filter(|&&a| a < config.min_dihedral_deg || a > config.max_dihedral_deg)
            .count()
    })
}

/// Survivor, removed node and survivor target of one volume edge collapse.
#[derive(Debug, Clone, Copy)]
struct CollapsePlan {
    keep: NodeId,
    remove: NodeId,
    target: DVec3,
}

fn plan_collapse(mesh: &VolumeMesh, a: NodeId, b: NodeId) -> Option<CollapsePlan> {
    let (na, nb) = (mesh.node(a), mesh.node(b));
    if na.killed || nb.killed || (na.surface && nb.surface) {
        return None;
    }
    let plan = if na.surface {
        CollapsePlan { keep: a, remove: b, target: na.position }
    } else if nb.surface {
        CollapsePlan { keep: b, remove: a, target: nb.position }
    } else {
        let (keep, remove) = if nb.grains.len() > na.grains.len() { (b, a) } else { (a, b) };
        CollapsePlan {
            keep,
            remove,
            target: (na.position + nb.position) * 0.5,
        }
    };
    Some(plan)
}

/// Corner positions of `element` after the collapse.
fn collapsed_positions(mesh: &VolumeMesh, element: &Element, plan: &CollapsePlan) -> [DVec3; 4] {
    element.nodes.map(|n| {
        if n == plan.keep || n == plan.remove {
            plan.target
        } else {
            mesh.node(n).position
        }
    })
}

/// Live elements containing `node`.
fn star<'m>(
    mesh: &'m VolumeMesh,
    node_elements: &'m [Vec<ElementId>],
    node: NodeId,
) -> impl Iterator<Item = (ElementId, &'m Element)> + 'm {
    node_elements[node.index()]
        .iter()
        .map(move |&id| (id, mesh.element(id)))
        .filter(move |(_, element)| !element.killed && element.nodes.contains(&node))
}

/// Link of a vertex or an edge: the faces of its elements that avoid it.
#[derive(Debug, Default)]
struct Link {
    vertices: BTreeSet<NodeId>,
    edges: BTreeSet<[NodeId; 2]>,
    triangles: BTreeSet<[NodeId; 3]>,
}

impl Link {
    fn of<'e>(elements: impl Iterator<Item = &'e Element>, apex: &[NodeId]) -> Self {
        let mut link = Link::default();
        for element in elements {
            if !apex.iter().all(|n| element.nodes.contains(n)) {
                continue;
            }
            let mut rest: Vec<NodeId> = element.nodes.into_iter().filter(|n| !apex.contains(n)).collect();
            rest.sort_unstable();
            link.vertices.extend(rest.iter().copied());
            for i in 0..rest.len() {
                for j in i + 1..rest.len() {
                    link.edges.insert([rest[i], rest[j]]);
                }
            }
            if let [a, b, c] = rest[..] {
                link.triangles.insert([a, b, c]);
            }
        }
        link
    }
}

/// `Lk(keep) ∩ Lk(remove) = Lk(keep, remove)`.
fn satisfies_link_condition(mesh: &VolumeMesh, node_elements: &[Vec<ElementId>], plan: &CollapsePlan) -> bool {
    let around = |node| star(mesh, node_elements, node).map(|(_, element)| element);
    let keep = Link::of(around(plan.keep), &[plan.keep]);
    let remove = Link::of(around(plan.remove), &[plan.remove]);
    let edge = Link::of(around(plan.keep), &[plan.keep, plan.remove]);
    keep.vertices.intersection(&remove.vertices).eq(edge.vertices.iter())
        && keep.edges.intersection(&remove.edges).eq(edge.edges.iter())
        && keep.triangles.is_disjoint(&remove.triangles)
}

fn collapse_is_acceptable(
    mesh: &VolumeMesh,
    node_elements: &[Vec<ElementId>],
    plan: &CollapsePlan,
    config: &MeshGenConfig,
) -> bool {
    let mut affected: Vec<ElementId> = star(mesh, node_elements, plan.keep)
        .chain(star(mesh, node_elements, plan.remove))
        .map(|(id, _)| id)
        .collect();
    affected.sort_unstable();
    affected.dedup();

    let (mut before_sum, mut after_sum, mut scale) = (0.0, 0.0, 0.0);
    let (mut before_bad, mut after_bad) = (0, 0);
    for id in affected {
        let element = mesh.element(id);
        let [p0, p1, p2, p3] = mesh.element_positions(id);
        let before = signed_tet_volume(p0, p1, p2, p3);
        before_sum += before;
        scale += before.abs();
        before_bad += bad_angles(element.geometry, config);
        if element.nodes.contains(&plan.keep) && element.nodes.contains(&plan.remove) {
            continue;
        }

        let q = collapsed_positions(mesh, element, plan);
        let after = signed_tet_volume(q[0], q[1], q[2], q[3]);
        if after <= config.tolerance && after < before {
            return false;
        }
        after_sum += after;
        after_bad += bad_angles(TetGeometry::compute(q, config.tolerance).ok(), config);
    }

    after_bad < before_bad
        && (after_sum - before_sum).abs() <= config.tolerance * scale
        && satisfies_link_condition(mesh, node_elements, plan)
}

/// Merges `plan.remove` into `plan.keep`. Returns the number of elements
/// killed.
fn apply_collapse(
    mesh: &mut VolumeMesh,
    node_elements: &mut [Vec<ElementId>],
    plan: &CollapsePlan,
    tolerance: f64,
) -> usize {
    let removed = std::mem::take(&mut node_elements[plan.remove.index()]);
    let (nodes, elements) = mesh.split_mut();
    nodes[plan.keep.index()].position = plan.target;
    nodes[plan.remove.index()].killed = true;

    let mut killed = 0;
    for &id in &removed {
        let element = &mut elements[id.index()];
        if element.killed {
            continue;
        }
        if element.nodes.contains(&plan.keep) {
            element.killed = true;
            killed += 1;
            continue;
        }
        for node in element.nodes.iter_mut() {
            if *node == plan.remove {
                *node = plan.keep;
            }
        }
        node_elements[plan.keep.index()].push(id);
    }

    let nodes: &[VolumeNode] = nodes;
    for &id in &node_elements[plan.keep.index()] {
        let element = &mut elements[id.index()];
        if !element.killed {
            let p = element.nodes.map(|n| nodes[n.index()].position);
            element.geometry = TetGeometry::compute(p, tolerance).ok();
        }
    }
    killed
}
