//! # Config Crate
//!
//! Centralized configuration constants for the solid mesh generator.
//! Every calibrated threshold of the meshing pipeline (collapse angles,
//! sampling targets, histogram layouts, iteration budgets) is defined here
//! so the algorithms stay free of scattered literals.
//!
//! ## Usage
//!
//! ```rust
//! use config::constants::{TARGET_GRAIN_NODES, MIN_DIHEDRAL_DEG, MAX_DIHEDRAL_DEG};
//!
//! // Interior sampling stops once a grain holds this many nodes.
//! assert_eq!(TARGET_GRAIN_NODES, 3500);
//!
//! // Elements outside this dihedral range are candidates for edge collapse.
//! let worst = 8.5;
//! assert!(worst < MIN_DIHEDRAL_DEG || worst > MAX_DIHEDRAL_DEG);
//! ```
//!
//! ## Design Principles
//!
//! - **Single Source of Truth**: All constants defined once, used everywhere
//! - **Calibrated**: Threshold values are modeling choices, not tuning knobs
//! - **Bounded**: Every open-ended loop has a budget constant

pub mod constants;

#[cfg(test)]
mod tests;
