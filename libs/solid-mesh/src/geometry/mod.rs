//! # Geometry Kernel
//!
//! Pure vector, triangle and tetrahedron primitives shared by every stage of
//! the pipeline. Nothing here allocates or mutates; degenerate inputs are
//! reported as [`MeshGenError::DegenerateGeometry`] or as "no intersection".
//!
//! ## Conventions
//!
//! - Angles are returned in degrees.
//! - Cosines are clamped to `[-1, 1]` before `acos`.
//! - [`dihedral_angle`] subtracts from 180: two coplanar faces whose normals
//!   agree report 180°, not 0°.

use crate::error::{MeshGenError, MeshGenResult};
use glam::{DVec2, DVec3};

// =============================================================================
// TRIANGLES
// =============================================================================

/// Plane and area of a triangle.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TriangleFrame {
    /// Unit normal of `(p1 - p0) × (p2 - p0)`.
    pub normal: DVec3,
    /// Triangle area.
    pub area: f64,
    /// Plane offset, `normal · p0`.
    pub plane_d: f64,
}

/// Computes the unit normal, area and plane offset of a triangle.
///
/// # Errors
///
/// Returns [`MeshGenError::DegenerateGeometry`] when the cross product is
/// shorter than `tolerance` (collinear or coincident vertices).
///
/// # Example
///
/// ```rust
/// use glam::DVec3;
/// use solid_mesh::geometry::triangle_frame;
///
/// let frame = triangle_frame(DVec3::ZERO, DVec3::X, DVec3::Y, 1e-9).unwrap();
/// assert_eq!(frame.normal, DVec3::Z);
/// assert_eq!(frame.area, 0.5);
/// ```
pub fn triangle_frame(p0: DVec3, p1: DVec3, p2: DVec3, tolerance: f64) -> MeshGenResult<TriangleFrame> {
    let cross = (p1 - p0).cross(p2 - p0);
    let length = cross.length();
    if !(length > tolerance) {
        return Err(MeshGenError::degenerate(format!(
            "triangle ({p0}, {p1}, {p2}) has zero area"
        )));
    }
    let normal = cross / length;
    Ok(TriangleFrame {
        normal,
        area: 0.5 * length,
        plane_d: normal.dot(p0),
    })
}

/// Included angles (degrees) at the three corners of a triangle.
///
/// A corner adjacent to a zero-length edge reports 0°.
pub fn triangle_angles(p: [DVec3; 3], tolerance: f64) -> [f64; 3] {
    let mut angles = [0.0; 3];
    for (i, angle) in angles.iter_mut().enumerate() {
        let a = p[(i + 1) % 3] - p[i];
        let b = p[(i + 2) % 3] - p[i];
        let (la, lb) = (a.length(), b.length());
        if la > tolerance && lb > tolerance {
            *angle = clamped_acos_deg(a.dot(b) / (la * lb));
        }
    }
    angles
}

/// Lengths of triangle edges `(n1,n2)`, `(n1,n3)`, `(n2,n3)`.
pub fn triangle_edge_lengths(p: [DVec3; 3]) -> [f64; 3] {
    [
        p[0].distance(p[1]),
        p[0].distance(p[2]),
        p[1].distance(p[2]),
    ]
}

/// Node slots of triangle edges 1, 2 and 3.
pub const TRIANGLE_EDGES: [(usize, usize); 3] = [(0, 1), (0, 2), (1, 2)];

/// Fold angle between two faces given their unit normals.
///
/// # Example
///
/// ```rust
/// use glam::DVec3;
/// use solid_mesh::geometry::dihedral_angle;
///
/// assert_eq!(dihedral_angle(DVec3::Z, DVec3::Z), 180.0);
/// assert_eq!(dihedral_angle(DVec3::Z, DVec3::NEG_Z), 0.0);
/// ```
pub fn dihedral_angle(n1: DVec3, n2: DVec3) -> f64 {
    180.0 - clamped_acos_deg(n1.dot(n2))
}

#[inline]
fn clamped_acos_deg(cosine: f64) -> f64 {
    cosine.clamp(-1.0, 1.0).acos().to_degrees()
}

// =============================================================================
// INTERSECTIONS
// =============================================================================

/// Crossing of a segment with a triangle.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SegmentHit {
    /// Intersection point.
    pub point: DVec3,
    /// Segment parameter, `point = a + r (b - a)`, in `[0, 1]`.
    pub r: f64,
}

/// Intersects segment `a → b` with triangle `tri` of unit normal `normal`.
///
/// Uses the plane parameter `r = n·(v0 - a) / n·(b - a)` and the parametric
/// barycentric test `s, t ≥ 0, s + t ≤ 1`. Parallel segments and triangles
/// whose barycentric denominator vanishes report no intersection.
pub fn segment_triangle_intersection(
    a: DVec3,
    b: DVec3,
    tri: [DVec3; 3],
    normal: DVec3,
    tolerance: f64,
) -> Option<SegmentHit> {
    let direction = b - a;
    let denom = normal.dot(direction);
    if denom.abs() < tolerance {
        return None;
    }
    let r = normal.dot(tri[0] - a) / denom;
    if !(0.0..=1.0).contains(&r) {
        return None;
    }
    let point = a + direction * r;

    let u = tri[1] - tri[0];
    let v = tri[2] - tri[0];
    let w = point - tri[0];
    let uv = u.dot(v);
    let uu = u.dot(u);
    let vv = v.dot(v);
    let wu = w.dot(u);
    let wv = w.dot(v);
    let d = uv * uv - uu * vv;
    if d.abs() < tolerance {
        return None;
    }
    let s = (uv * wv - vv * wu) / d;
    if !(0.0..=1.0).contains(&s) {
        return None;
    }
    let t = (uv * wu - uu * wv) / d;
    if t < 0.0 || s + t > 1.0 {
        return None;
    }
    Some(SegmentHit { point, r })
}

/// Barycentric coordinates `(u, v)` of `p` with `p = a + u (b - a) + v (c - a)`.
///
/// Returns `None` when the 2-D triangle is degenerate, which happens for
/// triangles seen edge-on along the projection axis.
pub fn barycentric_2d(p: DVec2, a: DVec2, b: DVec2, c: DVec2, tolerance: f64) -> Option<(f64, f64)> {
    let e1 = b - a;
    let e2 = c - a;
    let det = e1.perp_dot(e2);
    if det.abs() < tolerance {
        return None;
    }
    let w = p - a;
    let u = w.perp_dot(e2) / det;
    let v = e1.perp_dot(w) / det;
    Some((u, v))
}

// =============================================================================
// TETRAHEDRA
// =============================================================================

/// Node slots of tetrahedron edges `(1,2),(1,3),(1,4),(2,3),(2,4),(3,4)`.
pub const TET_EDGES: [(usize, usize); 6] = [(0, 1), (0, 2), (0, 3), (1, 2), (1, 3), (2, 3)];

/// For each edge of [`TET_EDGES`], the two nodes not on it. The faces
/// opposite these nodes meet along the edge.
const TET_EDGE_OPPOSITES: [(usize, usize); 6] = [(2, 3), (1, 3), (1, 2), (0, 3), (0, 2), (0, 1)];

/// Node slots of the face opposite each node.
const TET_FACES: [[usize; 3]; 4] = [[1, 2, 3], [0, 2, 3], [0, 1, 3], [0, 1, 2]];

/// Signed volume of tetrahedron `(p0, p1, p2, p3)`.
///
/// Positive when `p3` lies on the side `(p1 - p0) × (p2 - p0)` points to,
/// i.e. `(p0, p1, p2)` winds counter-clockwise seen from `p3`.
pub fn signed_tet_volume(p0: DVec3, p1: DVec3, p2: DVec3, p3: DVec3) -> f64 {
    (p1 - p0).dot((p2 - p0).cross(p3 - p0)) / 6.0
}

/// Returns true when the element must have nodes 2 and 3 swapped to have a
/// non-negative signed volume.
pub fn needs_flip(p: [DVec3; 4]) -> bool {
    signed_tet_volume(p[0], p[1], p[2], p[3]) < 0.0
}

/// Edge lengths in [`TET_EDGES`] order.
pub fn tet_edge_lengths(p: [DVec3; 4]) -> [f64; 6] {
    TET_EDGES.map(|(i, j)| p[i].distance(p[j]))
}

/// Dihedral angles, edge lengths and volume of a tetrahedron.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TetGeometry {
    /// Interior dihedral angle along each edge, in [`TET_EDGES`] order.
    pub dihedral: [f64; 6],
    /// Edge lengths in [`TET_EDGES`] order.
    pub edge_lengths: [f64; 6],
    /// Unsigned volume.
    pub volume: f64,
}

impl TetGeometry {
    /// Measures a tetrahedron.
    ///
    /// The dihedral angle along edge `(i, j)` is the fold angle between the
    /// outward normals of the two faces opposite the remaining nodes `k, l`.
    ///
    /// # Errors
    ///
    /// [`MeshGenError::DegenerateGeometry`] when a face has zero area or the
    /// volume is not above `tolerance`.
    ///
    /// # Example
    ///
    /// ```rust
    /// use glam::DVec3;
    /// use solid_mesh::geometry::TetGeometry;
    ///
    /// let tet = [DVec3::ZERO, DVec3::X, DVec3::Y, DVec3::Z];
    /// let geometry = TetGeometry::compute(tet, 1e-12).unwrap();
    /// assert!((geometry.volume - 1.0 / 6.0).abs() < 1e-12);
    /// assert!((geometry.dihedral[0] - 90.0).abs() < 1e-9);
    /// ```
    pub fn compute(p: [DVec3; 4], tolerance: f64) -> MeshGenResult<Self> {
        let volume = signed_tet_volume(p[0], p[1], p[2], p[3]).abs();
        if !(volume > tolerance) {
            return Err(MeshGenError::degenerate(format!(
                "tetrahedron volume {volume:e} is below tolerance"
            )));
        }

        let mut outward = [DVec3::ZERO; 4];
        for (opposite, normal) in outward.iter_mut().enumerate() {
            let [a, b, c] = TET_FACES[opposite].map(|i| p[i]);
            let frame = triangle_frame(a, b, c, tolerance)?;
            *normal = if frame.normal.dot(p[opposite] - a) > 0.0 {
                -frame.normal
            } else {
                frame.normal
            };
        }

        let dihedral = TET_EDGE_OPPOSITES.map(|(k, l)| dihedral_angle(outward[k], outward[l]));

        Ok(Self {
            dihedral,
            edge_lengths: tet_edge_lengths(p),
            volume,
        })
    }

    /// Smallest dihedral angle.
    pub fn min_dihedral(&self) -> f64 {
        self.dihedral.iter().copied().fold(f64::INFINITY, f64::min)
    }

    /// Largest dihedral angle.
    pub fn max_dihedral(&self) -> f64 {
        self.dihedral.iter().copied().fold(f64::NEG_INFINITY, f64::max)
    }
}
