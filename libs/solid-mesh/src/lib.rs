//! # Solid Mesh
//!
//! Grain-conforming tetrahedral mesh generation for polycrystalline
//! microstructures. Takes a triangulated grain-boundary surface mesh and
//! produces a cleaned surface mesh, a tetrahedral volume mesh whose elements
//! carry grain ids, and dihedral-angle / volume-ratio statistics.
//!
//! ## Architecture
//!
//! ```text
//! io (node + triangle files) → surface (store, cleanup) → grain (registry)
//!     → sampler (z-buffers, voxels) → volume (tetrahedralizer, repair)
//!     → quality (measure, improve)
//! ```
//!
//! [`MeshGenerator`] drives every stage; each module can also be used on its
//! own.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use solid_mesh::{MeshGenConfig, MeshGenerator};
//!
//! let output = MeshGenerator::new(MeshGenConfig::default())
//!     .run_files("nodes.txt", "triangles.txt")?;
//! for diagnostic in &output.diagnostics {
//!     eprintln!("{}: {}", diagnostic.stage, diagnostic.message);
//! }
//! ```

pub mod config;
pub mod diagnostic;
pub mod error;
pub mod geometry;
pub mod grain;
pub mod ids;
pub mod io;
pub mod pipeline;
pub mod quality;
pub mod sampler;
pub mod surface;
pub mod volume;

#[cfg(test)]
pub(crate) mod test_support;

pub use crate::config::{MeshGenConfig, VoxelGridSpec};
pub use diagnostic::{Diagnostic, Severity};
pub use error::{MeshGenError, MeshGenResult};
pub use grain::{Grain, GrainRegistry};
pub use ids::{ElementId, GrainId, NodeId, TriangleId};
pub use pipeline::{MeshGenOutput, MeshGenerator, RunReport};
pub use quality::QualityReport;
pub use sampler::VoxelGrid;
pub use surface::SurfaceMesh;
pub use volume::{BowyerWatson, ExternalTetrahedralizer, Tetrahedralizer, VolumeMesh};
