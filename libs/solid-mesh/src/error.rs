//! # Error Types
//!
//! Error types for solid meshing. Fatal conditions abort the run and are
//! returned to the caller; recoverable ones are downgraded to
//! [`Diagnostic`](crate::diagnostic::Diagnostic)s by the pipeline.
//!
//! ## Error Policy
//!
//! - Malformed input, external tool failures, parse and I/O errors are fatal
//! - Degenerate triangles/elements are skipped and reported
//! - Exhausted iteration budgets return the best mesh obtained so far

use thiserror::Error;

// =============================================================================
// ERROR TYPES
// =============================================================================

/// Errors that can occur while generating a solid mesh.
///
/// ## Example
///
/// ```rust
/// use solid_mesh::MeshGenError;
///
/// let err = MeshGenError::invalid_mesh("triangle 4 references node 99");
/// assert!(err.to_string().contains("node 99"));
/// assert!(err.is_fatal());
/// ```
#[derive(Error, Debug)]
pub enum MeshGenError {
    /// Input mesh references out-of-range ids or violates a topology rule.
    #[error("Invalid mesh: {message}")]
    InvalidMesh {
        /// What was wrong with the input
        message: String,
    },

    /// A zero-length edge, zero-area triangle or zero-volume box was met.
    #[error("Degenerate geometry: {message}")]
    DegenerateGeometry {
        /// Which entity degenerated
        message: String,
    },

    /// An iterative loop hit its budget before stabilising.
    #[error("'{stage}' did not converge within {budget} iterations")]
    ConvergenceTimeout {
        /// Name of the loop that gave up
        stage: String,
        /// The exhausted budget
        budget: usize,
    },

    /// Adjacency was queried after a kill without an intervening rebuild.
    #[error("Adjacency queried while stale; call rebuild_adjacency() first")]
    StaleAdjacency,

    /// The tetrahedralizer could not run or produced unusable output.
    #[error("External tool failure: {message}")]
    ExternalToolFailure {
        /// Cause reported by the adapter
        message: String,
    },

    /// A text record could not be parsed.
    #[error("Parse error at line {line}: {message}")]
    Parse {
        /// 1-based line number
        line: usize,
        /// Description of the malformed record
        message: String,
    },

    /// Underlying file or process I/O failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The configuration failed validation.
    #[error("Configuration error: {0}")]
    Config(#[from] crate::config::MeshGenConfigError),
}

impl MeshGenError {
    /// Creates an invalid mesh error.
    pub fn invalid_mesh(message: impl Into<String>) -> Self {
        Self::InvalidMesh {
            message: message.into(),
        }
    }

    /// Creates a degenerate geometry error.
    pub fn degenerate(message: impl Into<String>) -> Self {
        Self::DegenerateGeometry {
            message: message.into(),
        }
    }

    /// Creates a convergence timeout error.
    pub fn timeout(stage: impl Into<String>, budget: usize) -> Self {
        Self::ConvergenceTimeout {
            stage: stage.into(),
            budget,
        }
    }

    /// Creates an external tool failure.
    pub fn external(message: impl Into<String>) -> Self {
        Self::ExternalToolFailure {
            message: message.into(),
        }
    }

    /// Creates a parse error for a 1-based line.
    pub fn parse(line: usize, message: impl Into<String>) -> Self {
        Self::Parse {
            line,
            message: message.into(),
        }
    }

    /// Returns true when the whole run must abort.
    pub fn is_fatal(&self) -> bool {
        !matches!(
            self,
            Self::DegenerateGeometry { .. } | Self::ConvergenceTimeout { .. }
        )
    }
}

// =============================================================================
// RESULT TYPE ALIAS
// =============================================================================

/// Result type alias for meshing operations.
pub type MeshGenResult<T> = Result<T, MeshGenError>;

// =============================================================================
// TESTS
// =============================================================================
