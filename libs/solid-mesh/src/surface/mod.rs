//! # Surface Mesh Store
//!
//! Arena of grain-boundary nodes and triangles with the derived adjacency
//! lists (grain → triangles, grain → nodes, node → triangles, node → grains,
//! node → neighbours).
//!
//! ## Lifecycle
//!
//! ```text
//! add_node / add_triangle → rebuild_adjacency → cleanup passes (kill, collapse)
//!     → rebuild_adjacency → compact → jitter
//! ```
//!
//! Killing a node or triangle only sets its `killed` flag and marks the
//! adjacency stale. [`SurfaceMesh::adjacency`] refuses to answer until
//! [`SurfaceMesh::rebuild_adjacency`] runs again. [`SurfaceMesh::compact`]
//! physically drops killed entries and renumbers the survivors densely.
//!
//! ## Winding
//!
//! `Triangle::nodes` winds counter-clockwise seen from outside
//! `grains[0]`; the normal therefore points from `grains[0]` into
//! `grains[1]`. `grains[1]` sees the reversed order `(n1, n3, n2)`.

pub mod cleanup;

use crate::error::{MeshGenError, MeshGenResult};
use crate::geometry::{triangle_edge_lengths, triangle_frame, TRIANGLE_EDGES};
use crate::ids::{GrainId, NodeId, TriangleId};
use glam::DVec3;
use rand::Rng;

// =============================================================================
// NODES AND TRIANGLES
// =============================================================================

/// A grain-boundary node.
#[derive(Debug, Clone, PartialEq)]
pub struct SurfaceNode {
    /// Position.
    pub position: DVec3,
    /// Number of grains meeting at the node, exterior included.
    pub num_grains: u32,
    /// Three or more grains meet here.
    pub triple_junction: bool,
    /// Lies on the outer domain boundary.
    pub on_edge: bool,
    /// Logically deleted.
    pub killed: bool,
}

/// A grain-boundary triangle.
#[derive(Debug, Clone, PartialEq)]
pub struct Triangle {
    /// Node ids, wound outward for `grains[0]`.
    pub nodes: [NodeId; 3],
    /// The two grains separated by this triangle.
    pub grains: [GrainId; 2],
    /// Unit normal of the `nodes` winding, zero when degenerate.
    pub normal: DVec3,
    /// Plane offset, `normal · p1`.
    pub plane_d: f64,
    /// Area.
    pub area: f64,
    /// Centroid.
    pub center: DVec3,
    /// Lengths of edges `(n1,n2)`, `(n1,n3)`, `(n2,n3)`.
    pub edge_lengths: [f64; 3],
    /// Mean edge length.
    pub avg_edge_length: f64,
    /// Longest edge length.
    pub max_edge_length: f64,
    /// Logically deleted.
    pub killed: bool,
    /// At least two of its nodes are triple junctions.
    pub triple_junction: bool,
    /// One side is the domain exterior.
    pub on_edge: bool,
    /// Zero area; normal is meaningless.
    pub degenerate: bool,
    /// Average fold angle against same-boundary neighbours, once measured.
    pub avg_misorientation: Option<f64>,
}

impl Triangle {
    /// Node order seen from outside `grains[1]`.
    pub fn right_nodes(&self) -> [NodeId; 3] {
        [self.nodes[0], self.nodes[2], self.nodes[1]]
    }

    /// Node order wound outward for `grain`, if the triangle bounds it.
    pub fn nodes_facing(&self, grain: GrainId) -> Option<[NodeId; 3]> {
        if self.grains[0] == grain {
            Some(self.nodes)
        } else if self.grains[1] == grain {
            Some(self.right_nodes())
        } else {
            None
        }
    }

    /// Returns true when both triangles separate the same unordered grain pair.
    pub fn same_boundary(&self, other: &Triangle) -> bool {
        (self.grains[0] == other.grains[0] && self.grains[1] == other.grains[1])
            || (self.grains[0] == other.grains[1] && self.grains[1] == other.grains[0])
    }

    /// Returns true when `node` is one of the corners.
    pub fn contains(&self, node: NodeId) -> bool {
        self.nodes.contains(&node)
    }

    /// Node pair of edge `index` (0-based, see [`TRIANGLE_EDGES`]).
    pub fn edge(&self, index: usize) -> (NodeId, NodeId) {
        let (a, b) = TRIANGLE_EDGES[index];
        (self.nodes[a], self.nodes[b])
    }

    /// Index of the shortest edge, ties resolved in edge order.
    pub fn shortest_edge(&self) -> usize {
        let mut best = 0;
        for i in 1..3 {
            if self.edge_lengths[i] < self.edge_lengths[best] {
                best = i;
            }
        }
        best
    }

    fn has_repeated_node(&self) -> bool {
        self.nodes[0] == self.nodes[1] || self.nodes[0] == self.nodes[2] || self.nodes[1] == self.nodes[2]
    }

    fn sorted_nodes(&self) -> [NodeId; 3] {
        let mut sorted = self.nodes;
        sorted.sort_unstable();
        sorted
    }
}

// =============================================================================
// ADJACENCY
// =============================================================================

/// Adjacency lists derived from the live triangles.
///
/// Every list is sorted and free of duplicates. Grain-indexed lists have one
/// entry per grain id up to the largest id; the exterior entry stays empty
/// and the exterior never appears in `node_grains`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SurfaceAdjacency {
    /// Live triangles bounding each grain.
    pub grain_triangles: Vec<Vec<TriangleId>>,
    /// Nodes on the boundary of each grain.
    pub grain_nodes: Vec<Vec<NodeId>>,
    /// Live triangles using each node.
    pub node_triangles: Vec<Vec<TriangleId>>,
    /// Interior grains touching each node.
    pub node_grains: Vec<Vec<GrainId>>,
    /// Nodes sharing a live triangle edge with each node.
    pub node_neighbors: Vec<Vec<NodeId>>,
}

/// Old-to-new id maps produced by [`SurfaceMesh::compact`].
#[derive(Debug, Clone, PartialEq)]
pub struct Renumbering {
    /// New id of each old node, `None` if it was killed.
    pub nodes: Vec<Option<NodeId>>,
    /// New id of each old triangle, `None` if it was killed.
    pub triangles: Vec<Option<TriangleId>>,
}

impl Renumbering {
    /// Returns true when every entry maps onto itself.
    pub fn is_identity(&self) -> bool {
        self.nodes
            .iter()
            .enumerate()
            .all(|(i, id)| *id == Some(NodeId::new(i)))
            && self
                .triangles
                .iter()
                .enumerate()
                .all(|(i, id)| *id == Some(TriangleId::new(i)))
    }
}

/// Outcome of merging one edge.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct EdgeCollapse {
    pub kept: NodeId,
    pub removed: NodeId,
    pub killed_triangles: Vec<TriangleId>,
}

// =============================================================================
// SURFACE MESH
// =============================================================================

/// Owner of all surface nodes, triangles and their adjacency.
#[derive(Debug, Clone)]
pub struct SurfaceMesh {
    nodes: Vec<SurfaceNode>,
    triangles: Vec<Triangle>,
    max_grain: u32,
    adjacency: SurfaceAdjacency,
    stale: bool,
    tolerance: f64,
}

impl Default for SurfaceMesh {
    fn default() -> Self {
        Self::new(config::constants::EPSILON_TOLERANCE)
    }
}

impl SurfaceMesh {
    /// Creates an empty mesh using `tolerance` for degeneracy checks.
    pub fn new(tolerance: f64) -> Self {
        Self {
            nodes: Vec::new(),
            triangles: Vec::new(),
            max_grain: 0,
            adjacency: SurfaceAdjacency::default(),
            stale: true,
            tolerance,
        }
    }

    /// Degeneracy tolerance.
    pub fn tolerance(&self) -> f64 {
        self.tolerance
    }

    /// Appends a node.
    pub fn add_node(&mut self, position: DVec3, num_grains: u32) -> NodeId {
        let id = NodeId::new(self.nodes.len());
        self.nodes.push(SurfaceNode {
            position,
            num_grains,
            triple_junction: num_grains > 2,
            on_edge: false,
            killed: false,
        });
        self.stale = true;
        id
    }

    /// Appends a triangle separating `grains[0]` (outside of the winding)
    /// from `grains[1]`.
    ///
    /// # Errors
    ///
    /// [`MeshGenError::InvalidMesh`] for out-of-range or repeated node ids,
    /// two exterior sides, or the same interior grain on both sides. A
    /// zero-area triangle is accepted and flagged `degenerate`.
    pub fn add_triangle(&mut self, nodes: [NodeId; 3], grains: [GrainId; 2]) -> MeshGenResult<TriangleId> {
        let id = TriangleId::new(self.triangles.len());
        if let Some(bad) = nodes.iter().find(|n| n.index() >= self.nodes.len()) {
            return Err(MeshGenError::invalid_mesh(format!(
                "triangle {id} references node {bad} of {}",
                self.nodes.len()
            )));
        }
        if nodes[0] == nodes[1] || nodes[0] == nodes[2] || nodes[1] == nodes[2] {
            return Err(MeshGenError::invalid_mesh(format!(
                "triangle {id} repeats a node: {} {} {}",
                nodes[0], nodes[1], nodes[2]
            )));
        }
        if grains[0] == grains[1] {
            return Err(MeshGenError::invalid_mesh(format!(
                "triangle {id} has grain {} on both sides",
                grains[0]
            )));
        }

        let on_edge = grains[0].is_exterior() || grains[1].is_exterior();
        if on_edge {
            for node in nodes {
                self.nodes[node.index()].on_edge = true;
            }
        }
        let triple_count = nodes
            .iter()
            .filter(|n| self.nodes[n.index()].triple_junction)
            .count();
        self.max_grain = self.max_grain.max(grains[0].0).max(grains[1].0);

        let mut triangle = Triangle {
            nodes,
            grains,
            normal: DVec3::ZERO,
            plane_d: 0.0,
            area: 0.0,
            center: DVec3::ZERO,
            edge_lengths: [0.0; 3],
            avg_edge_length: 0.0,
            max_edge_length: 0.0,
            killed: false,
            triple_junction: triple_count >= 2,
            on_edge,
            degenerate: false,
            avg_misorientation: None,
        };
        self.measure_triangle(&mut triangle);
        self.triangles.push(triangle);
        self.stale = true;
        Ok(id)
    }

    /// All nodes, killed ones included.
    pub fn nodes(&self) -> &[SurfaceNode] {
        &self.nodes
    }

    /// All triangles, killed ones included.
    pub fn triangles(&self) -> &[Triangle] {
        &self.triangles
    }

    /// A node by id.
    pub fn node(&self, id: NodeId) -> &SurfaceNode {
        &self.nodes[id.index()]
    }

    /// A triangle by id.
    pub fn triangle(&self, id: TriangleId) -> &Triangle {
        &self.triangles[id.index()]
    }

    /// Live triangles with their ids.
    pub fn live_triangles(&self) -> impl Iterator<Item = (TriangleId, &Triangle)> {
        self.triangles
            .iter()
            .enumerate()
            .filter(|(_, t)| !t.killed)
            .map(|(i, t)| (TriangleId::new(i), t))
    }

    /// Number of live nodes.
    pub fn live_node_count(&self) -> usize {
        self.nodes.iter().filter(|n| !n.killed).count()
    }

    /// Number of live triangles.
    pub fn live_triangle_count(&self) -> usize {
        self.triangles.iter().filter(|t| !t.killed).count()
    }

    /// Largest grain id referenced by any triangle.
    pub fn max_grain(&self) -> u32 {
        self.max_grain
    }

    /// Corner positions of a triangle in its stored winding.
    pub fn triangle_positions(&self, id: TriangleId) -> [DVec3; 3] {
        self.triangles[id.index()].nodes.map(|n| self.nodes[n.index()].position)
    }

    /// Positions of `nodes`.
    pub fn positions(&self, nodes: [NodeId; 3]) -> [DVec3; 3] {
        nodes.map(|n| self.nodes[n.index()].position)
    }

    // -------------------------------------------------------------------------
    // Logical deletion
    // -------------------------------------------------------------------------

    /// Marks a node deleted. Adjacency becomes stale.
    pub fn kill_node(&mut self, id: NodeId) {
        self.nodes[id.index()].killed = true;
        self.stale = true;
    }

    /// Marks a triangle deleted. Adjacency becomes stale.
    pub fn kill_triangle(&mut self, id: TriangleId) {
        self.triangles[id.index()].killed = true;
        self.stale = true;
    }

    /// Returns true when a kill or insertion happened since the last rebuild.
    pub fn is_stale(&self) -> bool {
        self.stale
    }

    /// Current adjacency lists.
    ///
    /// # Errors
    ///
    /// [`MeshGenError::StaleAdjacency`] when the mesh changed since the last
    /// [`rebuild_adjacency`](Self::rebuild_adjacency).
    pub fn adjacency(&self) -> MeshGenResult<&SurfaceAdjacency> {
        if self.stale {
            return Err(MeshGenError::StaleAdjacency);
        }
        Ok(&self.adjacency)
    }

    /// Rebuilds every adjacency list from the live triangles.
    pub fn rebuild_adjacency(&mut self) {
        let grain_slots = self.max_grain as usize + 1;
        let mut adjacency = SurfaceAdjacency {
            grain_triangles: vec![Vec::new(); grain_slots],
            grain_nodes: vec![Vec::new(); grain_slots],
            node_triangles: vec![Vec::new(); self.nodes.len()],
            node_grains: vec![Vec::new(); self.nodes.len()],
            node_neighbors: vec![Vec::new(); self.nodes.len()],
        };

        for (id, triangle) in self.live_triangles() {
            for grain in triangle.grains {
                if grain.is_exterior() {
                    continue;
                }
                adjacency.grain_triangles[grain.index()].push(id);
                adjacency.grain_nodes[grain.index()].extend_from_slice(&triangle.nodes);
                for node in triangle.nodes {
                    adjacency.node_grains[node.index()].push(grain);
                }
            }
            for node in triangle.nodes {
                adjacency.node_triangles[node.index()].push(id);
            }
            for edge in 0..3 {
                let (a, b) = triangle.edge(edge);
                adjacency.node_neighbors[a.index()].push(b);
                adjacency.node_neighbors[b.index()].push(a);
            }
        }

        sort_dedup_all(&mut adjacency.grain_triangles);
        sort_dedup_all(&mut adjacency.grain_nodes);
        sort_dedup_all(&mut adjacency.node_triangles);
        sort_dedup_all(&mut adjacency.node_grains);
        sort_dedup_all(&mut adjacency.node_neighbors);

        self.adjacency = adjacency;
        self.stale = false;
    }

    // -------------------------------------------------------------------------
    // Compaction
    // -------------------------------------------------------------------------

    /// Drops killed nodes and triangles, renumbering survivors in original
    /// order, and rebuilds adjacency against the new ids.
    ///
    /// A live triangle that references a killed node or repeats a node is
    /// dropped as well.
    pub fn compact(&mut self) -> Renumbering {
        let mut node_map = vec![None; self.nodes.len()];
        let mut nodes = Vec::with_capacity(self.nodes.len());
        for (old, node) in self.nodes.iter().enumerate() {
            if !node.killed {
                node_map[old] = Some(NodeId::new(nodes.len()));
                nodes.push(node.clone());
            }
        }

        let mut triangle_map = vec![None; self.triangles.len()];
        let mut triangles = Vec::with_capacity(self.triangles.len());
        for (old, triangle) in self.triangles.iter().enumerate() {
            if triangle.killed || triangle.has_repeated_node() {
                continue;
            }
            let [a, b, c] = triangle.nodes.map(|n| node_map[n.index()]);
            let (Some(a), Some(b), Some(c)) = (a, b, c) else {
                continue;
            };
            let mut copy = triangle.clone();
            copy.nodes = [a, b, c];
            triangle_map[old] = Some(TriangleId::new(triangles.len()));
            triangles.push(copy);
        }

        log::debug!(
            "compacted surface: {} -> {} nodes, {} -> {} triangles",
            self.nodes.len(),
            nodes.len(),
            self.triangles.len(),
            triangles.len()
        );

        self.nodes = nodes;
        self.triangles = triangles;
        self.rebuild_adjacency();
        Renumbering {
            nodes: node_map,
            triangles: triangle_map,
        }
    }

    // -------------------------------------------------------------------------
    // Geometry maintenance
    // -------------------------------------------------------------------------

    /// Perturbs every node coordinate that does not lie on the domain
    /// bounding box by one random draw in `[0, amplitude)`, added to x,
    /// subtracted from y and added to z. Returns the number of moved nodes.
    pub fn jitter<R: Rng + ?Sized>(&mut self, rng: &mut R, amplitude: f64) -> usize {
        let Some((min, max)) = self.bounds() else {
            return 0;
        };
        let tolerance = self.tolerance;
        let on_box = |value: f64, axis: usize| {
            (value - min[axis]).abs() <= tolerance || (value - max[axis]).abs() <= tolerance
        };

        let mut moved = 0;
        for node in self.nodes.iter_mut().filter(|n| !n.killed) {
            let delta = rng.random::<f64>() * amplitude;
            let p = node.position;
            let mut shifted = p;
            if !on_box(p.x, 0) {
                shifted.x += delta;
            }
            if !on_box(p.y, 1) {
                shifted.y -= delta;
            }
            if !on_box(p.z, 2) {
                shifted.z += delta;
            }
            if shifted != p {
                node.position = shifted;
                moved += 1;
            }
        }
        self.refresh_all_triangles();
        moved
    }

    /// Axis-aligned bounds of the live nodes.
    pub fn bounds(&self) -> Option<(DVec3, DVec3)> {
        let mut live = self.nodes.iter().filter(|n| !n.killed).map(|n| n.position);
        let first = live.next()?;
        Some(live.fold((first, first), |(lo, hi), p| (lo.min(p), hi.max(p))))
    }

    /// Moves a node and re-derives the geometry of its live triangles.
    ///
    /// Requires fresh adjacency to find the affected triangles.
    pub fn move_node(&mut self, id: NodeId, position: DVec3) -> MeshGenResult<()> {
        let affected = self.adjacency()?.node_triangles[id.index()].clone();
        self.nodes[id.index()].position = position;
        for triangle in affected {
            self.refresh_triangle(triangle);
        }
        Ok(())
    }

    /// Re-derives normal, area, centre and edge lengths of one triangle.
    pub fn refresh_triangle(&mut self, id: TriangleId) {
        let mut triangle = self.triangles[id.index()].clone();
        self.measure_triangle(&mut triangle);
        self.triangles[id.index()] = triangle;
    }

    /// Re-derives the geometry of every live triangle.
    pub fn refresh_all_triangles(&mut self) {
        for i in 0..self.triangles.len() {
            if !self.triangles[i].killed {
                self.refresh_triangle(TriangleId::new(i));
            }
        }
    }

    fn measure_triangle(&self, triangle: &mut Triangle) {
        let p = self.positions(triangle.nodes);
        triangle.center = (p[0] + p[1] + p[2]) / 3.0;
        triangle.edge_lengths = triangle_edge_lengths(p);
        triangle.avg_edge_length = triangle.edge_lengths.iter().sum::<f64>() / 3.0;
        triangle.max_edge_length = triangle.edge_lengths.iter().copied().fold(0.0, f64::max);
        match triangle_frame(p[0], p[1], p[2], self.tolerance) {
            Ok(frame) => {
                triangle.normal = frame.normal;
                triangle.plane_d = frame.plane_d;
                triangle.area = frame.area;
                triangle.degenerate = false;
            }
            Err(_) => {
                triangle.normal = DVec3::ZERO;
                triangle.plane_d = 0.0;
                triangle.area = 0.0;
                triangle.degenerate = true;
            }
        }
    }

    // -------------------------------------------------------------------------
    // Edge collapse
    // -------------------------------------------------------------------------

    /// Picks which endpoint of `(a, b)` survives a collapse and where it goes.
    ///
    /// The endpoint touching more grains survives, ties keep `a`. An on-edge
    /// endpoint never leaves the domain boundary: the survivor stays put if
    /// it is on edge, moves onto the removed endpoint if only that one is,
    /// and goes to the midpoint otherwise.
    pub(crate) fn collapse_plan(&self, a: NodeId, b: NodeId) -> (NodeId, NodeId, DVec3) {
        let (na, nb) = (&self.nodes[a.index()], &self.nodes[b.index()]);
        let (keep, remove) = if nb.num_grains > na.num_grains { (b, a) } else { (a, b) };
        let (k, r) = (&self.nodes[keep.index()], &self.nodes[remove.index()]);
        let target = if k.on_edge {
            k.position
        } else if r.on_edge {
            r.position
        } else {
            (k.position + r.position) * 0.5
        };
        (keep, remove, target)
    }

    /// Merges `remove` into `keep`, moving `keep` to `target`.
    ///
    /// Triangles of `remove` are re-pointed at `keep`; any that end up with a
    /// repeated node or duplicate another live triangle are killed. The
    /// working node lists are maintained incrementally, but the public
    /// adjacency is marked stale.
    pub(crate) fn collapse_edge(&mut self, keep: NodeId, remove: NodeId, target: DVec3) -> EdgeCollapse {
        let mut killed_triangles = Vec::new();
        {
            let removed = &self.nodes[remove.index()];
            let (on_edge, num_grains) = (removed.on_edge, removed.num_grains);
            let kept = &mut self.nodes[keep.index()];
            kept.position = target;
            kept.on_edge |= on_edge;
            kept.num_grains = kept.num_grains.max(num_grains);
            kept.triple_junction = kept.num_grains > 2;
        }
        self.nodes[remove.index()].killed = true;

        let moved = std::mem::take(&mut self.adjacency.node_triangles[remove.index()]);
        for id in moved {
            let triangle = &mut self.triangles[id.index()];
            if triangle.killed {
                continue;
            }
            for node in triangle.nodes.iter_mut() {
                if *node == remove {
                    *node = keep;
                }
            }
            if triangle.has_repeated_node() {
                triangle.killed = true;
                killed_triangles.push(id);
            } else {
                self.adjacency.node_triangles[keep.index()].push(id);
            }
        }

        let neighbors = std::mem::take(&mut self.adjacency.node_neighbors[remove.index()]);
        for neighbor in neighbors {
            if neighbor == keep {
                continue;
            }
            let list = &mut self.adjacency.node_neighbors[neighbor.index()];
            for entry in list.iter_mut() {
                if *entry == remove {
                    *entry = keep;
                }
            }
            list.sort_unstable();
            list.dedup();
            self.adjacency.node_neighbors[keep.index()].push(neighbor);
        }
        let kept_neighbors = &mut self.adjacency.node_neighbors[keep.index()];
        kept_neighbors.retain(|&n| n != remove && n != keep);
        kept_neighbors.sort_unstable();
        kept_neighbors.dedup();

        let mut around: Vec<TriangleId> = self.adjacency.node_triangles[keep.index()]
            .iter()
            .copied()
            .filter(|t| !self.triangles[t.index()].killed)
            .collect();
        around.sort_unstable();
        around.dedup();
        let mut duplicates: Vec<TriangleId> = Vec::new();
        for (i, &first) in around.iter().enumerate() {
            if duplicates.contains(&first) {
                continue;
            }
            let a = &self.triangles[first.index()];
            let key = a.sorted_nodes();
            for &second in &around[i + 1..] {
                let b = &self.triangles[second.index()];
                if b.sorted_nodes() == key && a.same_boundary(b) && !duplicates.contains(&second) {
                    duplicates.push(second);
                }
            }
        }
        for id in duplicates {
            self.triangles[id.index()].killed = true;
            killed_triangles.push(id);
        }
        around.retain(|t| !self.triangles[t.index()].killed);
        for &id in &around {
            self.refresh_triangle(id);
        }
        self.adjacency.node_triangles[keep.index()] = around;

        self.stale = true;
        EdgeCollapse {
            kept: keep,
            removed: remove,
            killed_triangles,
        }
    }

    /// Live triangles around `node` according to the working lists.
    pub(crate) fn working_node_triangles(&self, node: NodeId) -> &[TriangleId] {
        self.adjacency
            .node_triangles
            .get(node.index())
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }
}

fn sort_dedup_all<T: Ord>(lists: &mut [Vec<T>]) {
    for list in lists {
        list.sort_unstable();
        list.dedup();
    }
}
