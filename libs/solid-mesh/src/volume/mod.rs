//! # Volume Mesh
//!
//! Tetrahedral mesh conforming to the grain boundaries, built from the
//! compacted surface nodes plus the sampled interior nodes.
//!
//! ## Build cycle
//!
//! ```text
//! points → tetrahedralize → repair grain-crossing edges → points → ...
//!                         ↘ (last cycle, or nothing repaired) → vote grains
//! ```
//!
//! Every node carries the sorted list of grains it belongs to: a boundary
//! node belongs to every grain around it, an interior node to the grain it
//! was sampled in. An edge whose two endpoints each belong to one different
//! grain crosses a grain boundary; one endpoint is moved onto that boundary
//! and joins both grains. After the last cycle each element takes the grain
//! shared by all four of its nodes, or stays unresolved.

mod tetrahedralizer;

pub use tetrahedralizer::{BowyerWatson, ExternalTetrahedralizer, Tetrahedralizer};

use crate::config::MeshGenConfig;
use crate::error::{MeshGenError, MeshGenResult};
use crate::geometry::{segment_triangle_intersection, signed_tet_volume, TetGeometry, TET_EDGES};
use crate::grain::GrainRegistry;
use crate::ids::{ElementId, GrainId, NodeId};
use crate::sampler::GrainSamples;
use crate::surface::SurfaceMesh;
use glam::DVec3;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

// =============================================================================
// NODES AND ELEMENTS
// =============================================================================

/// A volume mesh node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VolumeNode {
    /// Position.
    pub position: DVec3,
    /// Sorted grains the node belongs to, exterior excluded.
    pub grains: Vec<GrainId>,
    /// Copied from the surface mesh rather than sampled.
    pub surface: bool,
    /// Lies on the outer domain boundary.
    pub on_edge: bool,
    /// Moved onto a grain boundary by edge repair.
    pub moved: bool,
    /// Merged away by the improvement pass.
    pub killed: bool,
}

impl VolumeNode {
    fn interior(position: DVec3, grain: GrainId) -> Self {
        Self {
            position,
            grains: vec![grain],
            surface: false,
            on_edge: false,
            moved: false,
            killed: false,
        }
    }
}

/// A tetrahedral element.
#[derive(Debug, Clone, PartialEq)]
pub struct Element {
    /// Node ids, positively oriented once measured.
    pub nodes: [NodeId; 4],
    /// Grain shared by all four nodes, `None` when the vote failed.
    pub grain: Option<GrainId>,
    /// Dihedral angles, edge lengths and volume, `None` until measured or
    /// when degenerate.
    pub geometry: Option<TetGeometry>,
    /// Logically deleted.
    pub killed: bool,
    /// The element's grain touches the domain boundary.
    pub on_edge: bool,
    /// At least one node is an original boundary node.
    pub surface: bool,
}

/// Grain shared by all four membership lists, the smallest one on ties.
pub fn vote_grain(lists: [&[GrainId]; 4]) -> Option<GrainId> {
    lists[0]
        .iter()
        .copied()
        .find(|g| lists[1..].iter().all(|list| list.binary_search(g).is_ok()))
}

// =============================================================================
// VOLUME MESH
// =============================================================================

/// Owner of the volume nodes and elements.
#[derive(Debug, Clone, Default)]
pub struct VolumeMesh {
    nodes: Vec<VolumeNode>,
    elements: Vec<Element>,
}

impl VolumeMesh {
    /// Creates an empty mesh.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a node.
    pub fn add_node(&mut self, node: VolumeNode) -> NodeId {
        self.nodes.push(node);
        NodeId::new(self.nodes.len() - 1)
    }

    /// Appends an unmeasured element with its grain voted from the nodes.
    ///
    /// # Errors
    ///
    /// [`MeshGenError::InvalidMesh`] for out-of-range or repeated node ids.
    pub fn add_element(&mut self, nodes: [NodeId; 4]) -> MeshGenResult<ElementId> {
        let id = ElementId::new(self.elements.len());
        if let Some(bad) = nodes.iter().find(|n| n.index() >= self.nodes.len()) {
            return Err(MeshGenError::invalid_mesh(format!(
                "element {id} references node {bad} of {}",
                self.nodes.len()
            )));
        }
        for (i, j) in TET_EDGES {
            if nodes[i] == nodes[j] {
                return Err(MeshGenError::invalid_mesh(format!(
                    "element {id} repeats node {}",
                    nodes[i]
                )));
            }
        }
        let grain = vote_grain(nodes.map(|n| self.nodes[n.index()].grains.as_slice()));
        let surface = nodes.iter().any(|n| self.nodes[n.index()].surface);
        self.elements.push(Element {
            nodes,
            grain,
            geometry: None,
            killed: false,
            on_edge: false,
            surface,
        });
        Ok(id)
    }

    /// All nodes, killed ones included.
    pub fn nodes(&self) -> &[VolumeNode] {
        &self.nodes
    }

    /// All elements, killed ones included.
    pub fn elements(&self) -> &[Element] {
        &self.elements
    }

    /// Node by id.
    pub fn node(&self, id: NodeId) -> &VolumeNode {
        &self.nodes[id.index()]
    }

    /// Element by id.
    pub fn element(&self, id: ElementId) -> &Element {
        &self.elements[id.index()]
    }

    /// Live elements with their ids.
    pub fn live_elements(&self) -> impl Iterator<Item = (ElementId, &Element)> {
        self.elements
            .iter()
            .enumerate()
            .filter(|(_, e)| !e.killed)
            .map(|(i, e)| (ElementId::new(i), e))
    }

    /// Number of live elements.
    pub fn live_element_count(&self) -> usize {
        self.elements.iter().filter(|e| !e.killed).count()
    }

    /// Corner positions of an element.
    pub fn element_positions(&self, id: ElementId) -> [DVec3; 4] {
        self.positions(self.elements[id.index()].nodes)
    }

    /// Positions of four nodes.
    pub fn positions(&self, nodes: [NodeId; 4]) -> [DVec3; 4] {
        nodes.map(|n| self.nodes[n.index()].position)
    }

    /// Live elements around each node.
    pub fn node_elements(&self) -> Vec<Vec<ElementId>> {
        let mut lists = vec![Vec::new(); self.nodes.len()];
        for (id, element) in self.live_elements() {
            for node in element.nodes {
                lists[node.index()].push(id);
            }
        }
        lists
    }

    /// Sum of measured element volumes.
    pub fn total_volume(&self) -> f64 {
        self.live_elements()
            .filter_map(|(_, e)| e.geometry.map(|g| g.volume))
            .sum()
    }

    /// Sum of measured element volumes per resolved grain.
    pub fn grain_volumes(&self) -> BTreeMap<GrainId, f64> {
        let mut volumes = BTreeMap::new();
        for (_, element) in self.live_elements() {
            if let (Some(grain), Some(geometry)) = (element.grain, element.geometry) {
                *volumes.entry(grain).or_insert(0.0) += geometry.volume;
            }
        }
        volumes
    }

    /// Flags elements whose grain touches the domain boundary.
    pub fn mark_on_edge(&mut self, registry: &GrainRegistry) {
        for element in &mut self.elements {
            element.on_edge = element.grain.is_some_and(|g| registry.is_on_edge(g));
        }
    }

    pub(crate) fn split_mut(&mut self) -> (&mut [VolumeNode], &mut [Element]) {
        (&mut self.nodes, &mut self.elements)
    }
}

// =============================================================================
// BUILDER
// =============================================================================

/// Outcome of [`VolumeMeshBuilder::build`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BuildReport {
    /// Tetrahedralizations run.
    pub cycles: usize,
    /// Grain-crossing edges repaired after each non-final tetrahedralization.
    pub repaired_edges_per_cycle: Vec<usize>,
    /// Interior nodes inserted, per grain.
    pub interior_nodes: BTreeMap<GrainId, usize>,
    /// Elements whose nodes share no grain.
    pub unresolved_elements: usize,
    /// Total volume of the unresolved elements.
    pub unresolved_volume: f64,
}

/// Runs the tetrahedralize / repair cycles and assembles the volume mesh.
pub struct VolumeMeshBuilder<'t, T: Tetrahedralizer + ?Sized> {
    tetrahedralizer: &'t T,
    cycles: usize,
    tolerance: f64,
}

impl<'t, T: Tetrahedralizer + ?Sized> VolumeMeshBuilder<'t, T> {
    /// Creates a builder running `config.repair_cycles` tetrahedralizations
    /// at most.
    pub fn new(tetrahedralizer: &'t T, config: &MeshGenConfig) -> Self {
        Self {
            tetrahedralizer,
            cycles: config.repair_cycles.max(1),
            tolerance: config.tolerance,
        }
    }

    /// Builds the volume mesh from a compacted surface with fresh adjacency
    /// and the interior samples of each grain.
    ///
    /// # Errors
    ///
    /// [`MeshGenError::ExternalToolFailure`] when the tetrahedralizer fails
    /// or returns out-of-range ids, [`MeshGenError::StaleAdjacency`] when the
    /// surface adjacency is out of date.
    pub fn build(
        &self,
        surface: &SurfaceMesh,
        registry: &GrainRegistry,
        samples: &[GrainSamples],
    ) -> MeshGenResult<(VolumeMesh, BuildReport)> {
        let adjacency = surface.adjacency()?;
        let mut report = BuildReport::default();

        let mut nodes: Vec<VolumeNode> = surface
            .nodes()
            .iter()
            .zip(&adjacency.node_grains)
            .filter(|(node, _)| !node.killed)
            .map(|(node, grains)| VolumeNode {
                position: node.position,
                grains: grains.clone(),
                surface: true,
                on_edge: node.on_edge,
                moved: false,
                killed: false,
            })
            .collect();
        for grain_samples in samples {
            report
                .interior_nodes
                .insert(grain_samples.grain, grain_samples.points.len());
            nodes.extend(
                grain_samples
                    .points
                    .iter()
                    .map(|&p| VolumeNode::interior(p, grain_samples.grain)),
            );
        }

        let tets = loop {
            report.cycles += 1;
            let tets = self.tetrahedralize(&nodes)?;
            if report.cycles >= self.cycles {
                break tets;
            }
            let repaired = repair_edges(&mut nodes, &tets, surface, self.tolerance)?;
            log::debug!("cycle {}: repaired {repaired} grain-crossing edges", report.cycles);
            report.repaired_edges_per_cycle.push(repaired);
            if repaired == 0 {
                break tets;
            }
        };

        let mut mesh = VolumeMesh::new();
        for node in nodes {
            mesh.add_node(node);
        }
        for tet in tets {
            let id = mesh.add_element(tet.map(NodeId::new))?;
            if mesh.element(id).grain.is_none() {
                let [p0, p1, p2, p3] = mesh.element_positions(id);
                report.unresolved_elements += 1;
                report.unresolved_volume += signed_tet_volume(p0, p1, p2, p3).abs();
            }
        }
        mesh.mark_on_edge(registry);

        log::info!(
            "volume mesh: {} nodes, {} elements after {} cycles, {} unresolved",
            mesh.nodes.len(),
            mesh.elements.len(),
            report.cycles,
            report.unresolved_elements
        );
        Ok((mesh, report))
    }

    fn tetrahedralize(&self, nodes: &[VolumeNode]) -> MeshGenResult<Vec<[usize; 4]>> {
        let points: Vec<DVec3> = nodes.iter().map(|n| n.position).collect();
        let tets = self.tetrahedralizer.tetrahedralize(&points)?;
        for (index, tet) in tets.iter().enumerate() {
            if tet.iter().any(|&n| n >= points.len()) {
                return Err(MeshGenError::external(format!(
                    "tetrahedron {index} references a node beyond {}",
                    points.len()
                )));
            }
            if TET_EDGES.iter().any(|&(i, j)| tet[i] == tet[j]) {
                return Err(MeshGenError::external(format!(
                    "tetrahedron {index} repeats a node"
                )));
            }
        }
        Ok(tets)
    }
}

// =============================================================================
// EDGE REPAIR
// =============================================================================

/// Repairs every grain-crossing edge of `tets`. Returns the repair count.
fn repair_edges(
    nodes: &mut [VolumeNode],
    tets: &[[usize; 4]],
    surface: &SurfaceMesh,
    tolerance: f64,
) -> MeshGenResult<usize> {
    let mut repaired = 0;
    for tet in tets {
        for (i, j) in TET_EDGES {
            if repair_edge(nodes, tet[i], tet[j], surface, tolerance)? {
                repaired += 1;
            }
        }
    }
    Ok(repaired)
}

/// Moves one endpoint of edge `(a, b)` onto the grain boundary it crosses.
///
/// Only edges whose endpoints each belong to exactly one grain, and to
/// different ones, are repaired. The crossing is the first boundary triangle
/// of `a`'s grain, then of `b`'s grain, the segment passes through. The
/// endpoint nearer the crossing moves unless it is a surface node, in which
/// case the other one does. The moved node joins both grains.
fn repair_edge(
    nodes: &mut [VolumeNode],
    a: usize,
    b: usize,
    surface: &SurfaceMesh,
    tolerance: f64,
) -> MeshGenResult<bool> {
    let (ga, gb) = match (nodes[a].grains.as_slice(), nodes[b].grains.as_slice()) {
        (&[ga], &[gb]) if ga != gb => (ga, gb),
        _ => return Ok(false),
    };
    if nodes[a].surface && nodes[b].surface {
        return Ok(false);
    }

    let adjacency = surface.adjacency()?;
    let (pa, pb) = (nodes[a].position, nodes[b].position);
    let hit = [ga, gb]
        .into_iter()
        .filter_map(|g| adjacency.grain_triangles.get(g.index()))
        .flatten()
        .find_map(|&id| {
            let normal = surface.triangle(id).normal;
            segment_triangle_intersection(pa, pb, surface.triangle_positions(id), normal, tolerance)
        });
    let Some(hit) = hit else {
        return Ok(false);
    };

    let (nearer, farther) = if hit.r <= 0.5 { (a, b) } else { (b, a) };
    let mover = if nodes[nearer].surface { farther } else { nearer };
    let node = &mut nodes[mover];
    node.position = hit.point;
    node.grains = if ga < gb { vec![ga, gb] } else { vec![gb, ga] };
    node.moved = true;
    Ok(true)
}
