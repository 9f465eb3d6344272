//! # Text Formats
//!
//! Whitespace-separated record files exchanged with the surface mesher and
//! the Delaunay tool:
//!
//! ```text
//! node file      count            then  id numgrains x y z
//! triangle file  count            then  id n1 n2 n3 e1 e2 e3 g1 g2
//! point file     3  count         then  x y z
//! tet file       count            then  n1 n2 n3 n4
//! ```
//!
//! Blank lines are ignored. Errors carry the 1-based line number.

use crate::error::{MeshGenError, MeshGenResult};
use crate::ids::{GrainId, NodeId};
use crate::surface::SurfaceMesh;
use glam::DVec3;
use std::io::{BufRead, Write};
use std::str::FromStr;

/// Line-numbered record reader.
struct Records<R> {
    lines: std::io::Lines<R>,
    line: usize,
}

impl<R: BufRead> Records<R> {
    fn new(reader: R) -> Self {
        Self {
            lines: reader.lines(),
            line: 0,
        }
    }

    /// Next non-blank line split into tokens.
    fn next(&mut self) -> MeshGenResult<Option<Vec<String>>> {
        for line in self.lines.by_ref() {
            let line = line?;
            self.line += 1;
            let tokens: Vec<String> = line.split_whitespace().map(str::to_owned).collect();
            if !tokens.is_empty() {
                return Ok(Some(tokens));
            }
        }
        Ok(None)
    }

    /// Next record with exactly `width` fields.
    fn record(&mut self, width: usize, what: &str) -> MeshGenResult<Vec<String>> {
        let Some(tokens) = self.next()? else {
            return Err(MeshGenError::parse(self.line, format!("missing {what} record")));
        };
        if tokens.len() != width {
            return Err(MeshGenError::parse(
                self.line,
                format!("{what} record has {} fields, expected {width}", tokens.len()),
            ));
        }
        Ok(tokens)
    }

    fn count(&mut self, what: &str) -> MeshGenResult<usize> {
        let tokens = self.record(1, what)?;
        self.field(&tokens[0], what)
    }

    fn field<T: FromStr>(&self, token: &str, what: &str) -> MeshGenResult<T> {
        token
            .parse()
            .map_err(|_| MeshGenError::parse(self.line, format!("invalid {what} field `{token}`")))
    }
}

// =============================================================================
// SURFACE INPUT
// =============================================================================

/// Reads a node file and a triangle file into a validated surface mesh with
/// fresh adjacency.
///
/// Record ids must be dense and in order. Negative grain ids denote the
/// domain exterior and map to grain 0. The edge-neighbour fields of the
/// triangle file are read and ignored.
///
/// # Errors
///
/// [`MeshGenError::Parse`] for malformed records,
/// [`MeshGenError::InvalidMesh`] for out-of-order ids, grain ids beyond
/// `u32`, or triangles that [`SurfaceMesh::add_triangle`] rejects.
pub fn read_surface(nodes: impl BufRead, triangles: impl BufRead, tolerance: f64) -> MeshGenResult<SurfaceMesh> {
    let mut mesh = SurfaceMesh::new(tolerance);

    let mut records = Records::new(nodes);
    let count = records.count("node count")?;
    for expected in 0..count {
        let tokens = records.record(5, "node")?;
        let id: usize = records.field(&tokens[0], "node id")?;
        if id != expected {
            return Err(MeshGenError::invalid_mesh(format!(
                "node id {id} on line {}, expected {expected}",
                records.line
            )));
        }
        let num_grains: u32 = records.field(&tokens[1], "numgrains")?;
        let x = records.field(&tokens[2], "x")?;
        let y = records.field(&tokens[3], "y")?;
        let z = records.field(&tokens[4], "z")?;
        mesh.add_node(DVec3::new(x, y, z), num_grains);
    }

    let mut records = Records::new(triangles);
    let count = records.count("triangle count")?;
    for expected in 0..count {
        let tokens = records.record(9, "triangle")?;
        let id: usize = records.field(&tokens[0], "triangle id")?;
        if id != expected {
            return Err(MeshGenError::invalid_mesh(format!(
                "triangle id {id} on line {}, expected {expected}",
                records.line
            )));
        }
        let mut nodes = [NodeId(0); 3];
        for (slot, token) in nodes.iter_mut().zip(&tokens[1..4]) {
            *slot = NodeId(records.field(token, "node")?);
        }
        let mut grains = [GrainId::EXTERIOR; 2];
        for (slot, token) in grains.iter_mut().zip(&tokens[7..9]) {
            let raw: i64 = records.field(token, "grain")?;
            *slot = if raw < 0 {
                GrainId::EXTERIOR
            } else {
                u32::try_from(raw).map(GrainId).map_err(|_| {
                    MeshGenError::invalid_mesh(format!("grain id {raw} on line {} is out of range", records.line))
                })?
            };
        }
        mesh.add_triangle(nodes, grains)?;
    }

    mesh.rebuild_adjacency();
    log::info!(
        "loaded surface: {} nodes, {} triangles, {} grains",
        mesh.nodes().len(),
        mesh.triangles().len(),
        mesh.max_grain()
    );
    Ok(mesh)
}

// =============================================================================
// TETRAHEDRALIZER EXCHANGE
// =============================================================================

/// Writes points as `3`, the count, then one `x y z` line each.
///
/// # Errors
///
/// [`MeshGenError::Io`] from the writer.
pub fn write_point_file<W: Write + ?Sized>(writer: &mut W, points: &[DVec3]) -> MeshGenResult<()> {
    writeln!(writer, "3")?;
    writeln!(writer, "{}", points.len())?;
    for p in points {
        writeln!(writer, "{} {} {}", p.x, p.y, p.z)?;
    }
    writer.flush()?;
    Ok(())
}

/// Reads a count then `n1 n2 n3 n4` lines.
///
/// # Errors
///
/// [`MeshGenError::Parse`] for malformed or missing records.
pub fn read_tet_file(reader: impl BufRead) -> MeshGenResult<Vec<[usize; 4]>> {
    let mut records = Records::new(reader);
    let count = records.count("tetrahedron count")?;
    // The count comes from another program, so it only bounds the loop.
    let mut tets = Vec::with_capacity(count.min(4096));
    for _ in 0..count {
        let tokens = records.record(4, "tetrahedron")?;
        let mut tet = [0usize; 4];
        for (slot, token) in tet.iter_mut().zip(&tokens) {
            *slot = records.field(token, "tetrahedron node")?;
        }
        tets.push(tet);
    }
    Ok(tets)
}
