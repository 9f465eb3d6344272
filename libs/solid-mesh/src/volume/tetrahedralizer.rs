//! # Tetrahedralizers
//!
//! The volume builder only needs `points → tetrahedra`. [`BowyerWatson`] does
//! it in process with exact orientation and insphere predicates;
//! [`ExternalTetrahedralizer`] drives a command-line Delaunay tool through the
//! point-file / tet-file text formats of [`crate::io`].

use crate::error::{MeshGenError, MeshGenResult};
use crate::io;
use glam::DVec3;
use robust::{insphere, orient3d, Coord3D};
use std::collections::{HashMap, HashSet};
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::PathBuf;
use std::process::{Command, Stdio};

/// Anything that can tetrahedralize a point cloud.
pub trait Tetrahedralizer {
    /// Returns tetrahedra as indices into `points`.
    ///
    /// # Errors
    ///
    /// [`MeshGenError::ExternalToolFailure`] when no tetrahedralization can
    /// be produced.
    fn tetrahedralize(&self, points: &[DVec3]) -> MeshGenResult<Vec<[usize; 4]>>;
}

// =============================================================================
// BOWYER-WATSON
// =============================================================================

/// Incremental Delaunay tetrahedralization.
///
/// Points are inserted along a Morton curve. Each one is located by walking
/// from the last created tetrahedron, and its cavity is flood-filled through
/// face neighbours, so the cost per point stays local. Exact duplicates are
/// skipped. When a cavity face would produce a flat or inverted tetrahedron
/// the cavity grows across that face, so degenerate (cospherical, coplanar)
/// inputs still yield a valid tiling. The output order depends only on the
/// input.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BowyerWatson {
    /// Super-tetrahedron size as a multiple of the input bounding-box
    /// half-diagonal.
    pub super_scale: f64,
}

impl Default for BowyerWatson {
    fn default() -> Self {
        Self { super_scale: 100.0 }
    }
}

/// Local vertex indices of the face opposite each vertex, wound so the
/// opposite vertex lies on the positive side.
const FACES: [[usize; 3]; 4] = [[2, 1, 3], [0, 2, 3], [1, 0, 3], [0, 1, 2]];

/// A tetrahedron with its face neighbours; `adj[k]` lies across the face
/// opposite `v[k]`.
#[derive(Debug, Clone, Copy)]
struct Cell {
    v: [usize; 4],
    adj: [Option<usize>; 4],
    alive: bool,
    /// Last point whose cavity included this cell.
    stamp: usize,
}

impl Cell {
    fn new(v: [usize; 4]) -> Self {
        Self {
            v,
            adj: [None; 4],
            alive: true,
            stamp: usize::MAX,
        }
    }

    fn face(&self, k: usize) -> [usize; 3] {
        FACES[k].map(|local| self.v[local])
    }
}

/// A cavity face: the cell it belonged to, its local index there, and the
/// neighbour outside the cavity.
struct CavityFace {
    face: [usize; 3],
    inner: usize,
    outer: Option<usize>,
}

fn coord(p: DVec3) -> Coord3D<f64> {
    Coord3D { x: p.x, y: p.y, z: p.z }
}

fn bounds(points: &[DVec3]) -> (DVec3, DVec3) {
    points
        .iter()
        .fold((points[0], points[0]), |(lo, hi), &p| (lo.min(p), hi.max(p)))
}

/// Spreads the low 10 bits of `x` to every third bit.
fn spread(x: u64) -> u64 {
    (0..10).fold(0, |acc, bit| acc | (((x >> bit) & 1) << (3 * bit)))
}

/// Point indices sorted by Morton code on a 1024³ grid; ties keep input order.
fn spatial_order(points: &[DVec3]) -> Vec<usize> {
    let (lo, hi) = bounds(points);
    let extent = (hi - lo).max_element().max(f64::MIN_POSITIVE);
    let mut keyed: Vec<(u64, usize)> = points
        .iter()
        .enumerate()
        .map(|(i, &p)| {
            let q = ((p - lo) / extent * 1023.0).clamp(DVec3::ZERO, DVec3::splat(1023.0));
            let key = spread(q.x as u64) | (spread(q.y as u64) << 1) | (spread(q.z as u64) << 2);
            (key, i)
        })
        .collect();
    keyed.sort_unstable();
    keyed.into_iter().map(|(_, i)| i).collect()
}

impl BowyerWatson {
    fn super_tetrahedron(&self, points: &[DVec3]) -> [DVec3; 4] {
        let (lo, hi) = bounds(points);
        let center = (lo + hi) * 0.5;
        let half_diagonal = ((hi - lo).length() * 0.5).max(1e-6);
        let scale = self.super_scale * half_diagonal;
        [
            center + DVec3::new(1.0, 0.0, -0.707) * scale,
            center + DVec3::new(-1.0, 0.0, -0.707) * scale,
            center + DVec3::new(0.0, 1.0, 0.707) * scale,
            center + DVec3::new(0.0, -1.0, 0.707) * scale,
        ]
    }
}

/// Incremental state over the points plus the four super vertices.
struct Delaunay<'a> {
    all: &'a [DVec3],
    cells: Vec<Cell>,
}

impl Delaunay<'_> {
    fn orient(&self, face: [usize; 3], p: DVec3) -> f64 {
        let [a, b, c] = face.map(|v| coord(self.all[v]));
        orient3d(a, b, c, coord(p))
    }

    fn conflicts(&self, cell: usize, p: DVec3) -> bool {
        let [a, b, c, d] = self.cells[cell].v.map(|v| coord(self.all[v]));
        insphere(a, b, c, d, coord(p)) > 0.0
    }

    /// Visibility walk towards `p`. Falls back to a scan if the walk does not
    /// settle within one step per cell.
    fn locate(&self, start: usize, p: DVec3) -> Option<usize> {
        let contains = |cell: &Cell| (0..4).all(|k| self.orient(cell.face(k), p) >= 0.0);
        let mut current = start;
        for _ in 0..self.cells.len() {
            let cell = &self.cells[current];
            match (0..4).find(|&k| self.orient(cell.face(k), p) < 0.0) {
                None => return Some(current),
                Some(k) => current = cell.adj[k]?,
            }
        }
        self.cells.iter().position(|cell| cell.alive && contains(cell))
    }

    /// Conflict region of point `i` grown until every boundary face sees it.
    fn cavity(&mut self, start: usize, i: usize) -> MeshGenResult<Vec<usize>> {
        let p = self.all[i];
        if !self.conflicts(start, p) {
            return Err(MeshGenError::external(format!(
                "point {i} is not inside the circumsphere of its enclosing tetrahedron"
            )));
        }
        self.cells[start].stamp = i;
        let mut cavity = vec![start];
        let mut next = 0;
        while next < cavity.len() {
            let cell = cavity[next];
            next += 1;
            for neighbour in self.cells[cell].adj.into_iter().flatten() {
                if self.cells[neighbour].stamp != i && self.conflicts(neighbour, p) {
                    self.cells[neighbour].stamp = i;
                    cavity.push(neighbour);
                }
            }
        }

        loop {
            let mut grew = false;
            for index in 0..cavity.len() {
                let cell = self.cells[cavity[index]];
                for k in 0..4 {
                    let outer = cell.adj[k];
                    if outer.is_some_and(|o| self.cells[o].stamp == i) || self.orient(cell.face(k), p) > 0.0 {
                        continue;
                    }
                    let Some(outer) = outer else {
                        return Err(MeshGenError::external(format!(
                            "cavity of point {i} cannot be made star-shaped"
                        )));
                    };
                    self.cells[outer].stamp = i;
                    cavity.push(outer);
                    grew = true;
                }
            }
            if !grew {
                return Ok(cavity);
            }
        }
    }

    /// Replaces the cavity by the cone from point `i` to its boundary and
    /// returns the last new cell.
    fn fill(&mut self, cavity: &[usize], i: usize) -> usize {
        let mut faces = Vec::new();
        for &cell in cavity {
            let current = self.cells[cell];
            for k in 0..4 {
                let outer = current.adj[k];
                if outer.is_some_and(|o| self.cells[o].stamp == i) {
                    continue;
                }
                faces.push(CavityFace {
                    face: current.face(k),
                    inner: cell,
                    outer,
                });
            }
        }
        for &cell in cavity {
            self.cells[cell].alive = false;
        }

        let mut open: HashMap<(usize, usize), (usize, usize)> = HashMap::with_capacity(faces.len() * 2);
        for CavityFace { face, inner, outer } in faces {
            let id = self.cells.len();
            let mut cell = Cell::new([face[0], face[1], face[2], i]);
            cell.adj[3] = outer;
            if let Some(outer) = outer {
                for slot in &mut self.cells[outer].adj {
                    if *slot == Some(inner) {
                        *slot = Some(id);
                    }
                }
            }
            for k in 0..3 {
                let [a, b] = [face[(k + 1) % 3], face[(k + 2) % 3]];
                let edge = (a.min(b), a.max(b));
                if let Some((other, slot)) = open.remove(&edge) {
                    cell.adj[k] = Some(other);
                    self.cells[other].adj[slot] = Some(id);
                } else {
                    open.insert(edge, (id, k));
                }
            }
            self.cells.push(cell);
        }
        self.cells.len() - 1
    }
}

impl Tetrahedralizer for BowyerWatson {
    fn tetrahedralize(&self, points: &[DVec3]) -> MeshGenResult<Vec<[usize; 4]>> {
        let n = points.len();
        if n < 4 {
            return Err(MeshGenError::external(format!(
                "at least 4 points are needed, got {n}"
            )));
        }

        let mut all: Vec<DVec3> = points.to_vec();
        all.extend_from_slice(&self.super_tetrahedron(points));
        let mut mesh = Delaunay {
            all: &all,
            cells: Vec::with_capacity(7 * n),
        };
        let mut first = [n, n + 1, n + 2, n + 3];
        if mesh.orient([first[0], first[1], first[2]], all[first[3]]) < 0.0 {
            first.swap(0, 1);
        }
        mesh.cells.push(Cell::new(first));

        let mut last = 0;
        let mut seen: HashSet<[u64; 3]> = HashSet::with_capacity(n);
        for i in spatial_order(points) {
            let p = all[i];
            if !seen.insert([p.x.to_bits(), p.y.to_bits(), p.z.to_bits()]) {
                continue;
            }
            let start = mesh.locate(last, p).ok_or_else(|| {
                MeshGenError::external(format!("point {i} lies outside the super tetrahedron"))
            })?;
            let cavity = mesh.cavity(start, i)?;
            last = mesh.fill(&cavity, i);
        }

        let result: Vec<[usize; 4]> = mesh
            .cells
            .iter()
            .filter(|cell| cell.alive && cell.v.iter().all(|&v| v < n))
            .map(|cell| cell.v)
            .filter(|v| mesh.orient([v[0], v[1], v[2]], all[v[3]]) > 0.0)
            .collect();
        if result.is_empty() {
            return Err(MeshGenError::external("input points are coplanar"));
        }
        log::debug!("bowyer-watson: {} points -> {} tetrahedra", n, result.len());
        Ok(result)
    }
}

// =============================================================================
// EXTERNAL TOOL
// =============================================================================

/// Runs an external Delaunay program through point and tet files.
///
/// `args` may contain the placeholders `{points}` and `{tets}`, replaced by
/// the paths of the point file written before the call and the tet file read
/// after it. With `stdin_points` the point file is also piped to stdin.
#[derive(Debug, Clone, PartialEq)]
pub struct ExternalTetrahedralizer {
    /// Program to run.
    pub program: PathBuf,
    /// Arguments with optional placeholders.
    pub args: Vec<String>,
    /// Directory holding the exchanged files.
    pub work_dir: PathBuf,
    /// Feed the point file on stdin.
    pub stdin_points: bool,
}

impl ExternalTetrahedralizer {
    /// Creates an adapter exchanging files in `work_dir`.
    pub fn new(program: impl Into<PathBuf>, args: Vec<String>, work_dir: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args,
            work_dir: work_dir.into(),
            stdin_points: false,
        }
    }

    /// Pipes the point file to the program's stdin.
    pub fn with_stdin_points(mut self) -> Self {
        self.stdin_points = true;
        self
    }

    fn points_path(&self) -> PathBuf {
        self.work_dir.join("points.txt")
    }

    fn tets_path(&self) -> PathBuf {
        self.work_dir.join("tets.txt")
    }
}

impl Tetrahedralizer for ExternalTetrahedralizer {
    fn tetrahedralize(&self, points: &[DVec3]) -> MeshGenResult<Vec<[usize; 4]>> {
        let points_path = self.points_path();
        let tets_path = self.tets_path();
        let written = File::create(&points_path)
            .map_err(MeshGenError::from)
            .and_then(|file| io::write_point_file(&mut BufWriter::new(file), points));
        if let Err(err) = written {
            return Err(MeshGenError::external(format!(
                "cannot write point file {}: {err}",
                points_path.display()
            )));
        }
        if tets_path.exists() {
            std::fs::remove_file(&tets_path).map_err(|err| {
                MeshGenError::external(format!("cannot remove stale {}: {err}", tets_path.display()))
            })?;
        }

        let args: Vec<String> = self
            .args
            .iter()
            .map(|arg| {
                arg.replace("{points}", &points_path.to_string_lossy())
                    .replace("{tets}", &tets_path.to_string_lossy())
            })
            .collect();
        let mut command = Command::new(&self.program);
        command.args(&args).current_dir(&self.work_dir).stdout(Stdio::null());
        if self.stdin_points {
            let stdin = File::open(&points_path).map_err(|err| {
                MeshGenError::external(format!("cannot reopen {}: {err}", points_path.display()))
            })?;
            command.stdin(stdin);
        }

        log::debug!("running {} {:?}", self.program.display(), args);
        let status = command.status().map_err(|err| {
            MeshGenError::external(format!("cannot start {}: {err}", self.program.display()))
        })?;
        if !status.success() {
            return Err(MeshGenError::external(format!(
                "{} exited with {status}",
                self.program.display()
            )));
        }

        let file = File::open(&tets_path).map_err(|err| {
            MeshGenError::external(format!("missing tet file {}: {err}", tets_path.display()))
        })?;
        io::read_tet_file(BufReader::new(file))
            .map_err(|err| MeshGenError::external(format!("malformed tet file: {err}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use crate::geometry::signed_tet_volume;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn total_volume(points: &[DVec3], tets: &[[usize; 4]]) -> f64 {
        tets.iter()
            .map(|t| signed_tet_volume(points[t[0]], points[t[1]], points[t[2]], points[t[3]]).abs())
            .sum()
    }

    fn cube_corners() -> Vec<DVec3> {
        (0..8)
            .map(|i| DVec3::new((i & 1) as f64, ((i >> 1) & 1) as f64, ((i >> 2) & 1) as f64))
            .collect()
    }

    #[test]
    fn test_single_tetrahedron() {
        let points = vec![DVec3::ZERO, DVec3::X, DVec3::Y, DVec3::Z];
        let tets = BowyerWatson::default().tetrahedralize(&points).unwrap();
        assert_eq!(tets.len(), 1);
        assert_relative_eq!(total_volume(&points, &tets), 1.0 / 6.0, epsilon = 1e-12);
    }

    #[test]
    fn test_cospherical_cube_corners_tile_the_cube() {
        let points = cube_corners();
        let tets = BowyerWatson::default().tetrahedralize(&points).unwrap();
        assert_relative_eq!(total_volume(&points, &tets), 1.0, epsilon = 1e-9);
    }

    fn cloud_in_cube(count: usize, seed: u64) -> Vec<DVec3> {
        let mut points = cube_corners();
        let mut rng = StdRng::seed_from_u64(seed);
        for _ in 0..count {
            points.push(DVec3::new(
                0.05 + 0.9 * rng.random::<f64>(),
                0.05 + 0.9 * rng.random::<f64>(),
                0.05 + 0.9 * rng.random::<f64>(),
            ));
        }
        points
    }

    #[test]
    fn test_random_cloud_in_cube() {
        let points = cloud_in_cube(200, 42);
        let tets = BowyerWatson::default().tetrahedralize(&points).unwrap();
        assert_relative_eq!(total_volume(&points, &tets), 1.0, epsilon = 1e-6);
        for t in &tets {
            let [a, b, c, d] = t.map(|i| points[i]);
            assert!(signed_tet_volume(a, b, c, d).abs() > 0.0);
        }
    }

    #[test]
    fn test_circumspheres_are_empty() {
        let points = cloud_in_cube(150, 7);
        let tets = BowyerWatson::default().tetrahedralize(&points).unwrap();
        for t in &tets {
            let [a, b, c, d] = t.map(|i| coord(points[i]));
            for (i, p) in points.iter().enumerate() {
                if !t.contains(&i) {
                    assert!(insphere(a, b, c, d, coord(*p)) <= 0.0, "point {i} inside {t:?}");
                }
            }
        }
    }

    #[test]
    fn test_same_points_give_same_tetrahedra() {
        let points = cloud_in_cube(300, 11);
        let first = BowyerWatson::default().tetrahedralize(&points).unwrap();
        let second = BowyerWatson::default().tetrahedralize(&points).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_large_cloud_tiles_the_cube() {
        let points = cloud_in_cube(5000, 3);
        let tets = BowyerWatson::default().tetrahedralize(&points).unwrap();
        assert_relative_eq!(total_volume(&points, &tets), 1.0, epsilon = 1e-6);
        let mut used = vec![false; points.len()];
        for t in &tets {
            for &v in t {
                used[v] = true;
            }
        }
        assert!(used.iter().all(|&u| u));
    }

    #[test]
    fn test_morton_order_is_a_permutation() {
        let points = cloud_in_cube(64, 5);
        let mut order = spatial_order(&points);
        order.sort_unstable();
        assert_eq!(order, (0..points.len()).collect::<Vec<_>>());
        assert_eq!(spread(0b11), 0b1001);
    }

    #[test]
    fn test_duplicates_are_ignored() {
        let mut points = vec![DVec3::ZERO, DVec3::X, DVec3::Y, DVec3::Z];
        points.push(DVec3::X);
        let tets = BowyerWatson::default().tetrahedralize(&points).unwrap();
        assert_eq!(tets.len(), 1);
        assert!(tets[0].iter().all(|&v| v < 4));
    }

    #[test]
    fn test_too_few_points() {
        let err = BowyerWatson::default()
            .tetrahedralize(&[DVec3::ZERO, DVec3::X])
            .unwrap_err();
        assert!(matches!(err, MeshGenError::ExternalToolFailure { .. }));
    }

    #[test]
    fn test_coplanar_points_fail() {
        let points = vec![DVec3::ZERO, DVec3::X, DVec3::Y, DVec3::new(1.0, 1.0, 0.0)];
        assert!(BowyerWatson::default().tetrahedralize(&points).is_err());
    }

    #[test]
    fn test_missing_program_is_external_failure() {
        let dir = std::env::temp_dir();
        let tool = ExternalTetrahedralizer::new(
            "/nonexistent/solid-mesh-delaunay",
            vec!["{points}".to_string(), "{tets}".to_string()],
            dir,
        );
        let err = tool
            .tetrahedralize(&[DVec3::ZERO, DVec3::X, DVec3::Y, DVec3::Z])
            .unwrap_err();
        assert!(matches!(err, MeshGenError::ExternalToolFailure { .. }));
    }

    #[test]
    fn test_unwritable_work_dir_is_external_failure() {
        let tool = ExternalTetrahedralizer::new(
            "tetgen",
            vec!["{points}".to_string()],
            "/nonexistent/solid-mesh-work",
        );
        let err = tool
            .tetrahedralize(&[DVec3::ZERO, DVec3::X, DVec3::Y, DVec3::Z])
            .unwrap_err();
        match err {
            MeshGenError::ExternalToolFailure { message } => assert!(message.contains("points.txt")),
            other => panic!("expected external tool failure, got {other:?}"),
        }
    }
}
