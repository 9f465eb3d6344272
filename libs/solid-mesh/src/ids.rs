//! # Typed Indices
//!
//! Strongly-typed arena indices. Surface nodes, triangles, volume elements
//! and grains each get their own wrapper so an index from one stage cannot
//! be used where another is expected.

use serde::{Deserialize, Serialize};
use std::fmt;

macro_rules! arena_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        pub struct $name(pub u32);

        impl $name {
            /// Creates an id from an arena position.
            #[inline]
            pub fn new(index: usize) -> Self {
                Self(index as u32)
            }

            /// Returns the arena position.
            #[inline]
            pub fn index(self) -> usize {
                self.0 as usize
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

arena_id!(
    /// Index of a node in a [`SurfaceMesh`](crate::surface::SurfaceMesh) or
    /// [`VolumeMesh`](crate::volume::VolumeMesh) node arena.
    NodeId
);

arena_id!(
    /// Index of a triangle in a [`SurfaceMesh`](crate::surface::SurfaceMesh).
    TriangleId
);

arena_id!(
    /// Index of a tetrahedron in a [`VolumeMesh`](crate::volume::VolumeMesh).
    ElementId
);

/// Grain identifier. Grain `0` is the domain exterior.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct GrainId(pub u32);

impl GrainId {
    /// The region outside the simulated domain.
    pub const EXTERIOR: GrainId = GrainId(0);

    /// Returns true for the domain exterior.
    #[inline]
    pub fn is_exterior(self) -> bool {
        self.0 == 0
    }

    /// Returns the grain number as an index into per-grain tables.
    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for GrainId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_round_trip_index() {
        assert_eq!(NodeId::new(7).index(), 7);
        assert_eq!(ElementId::new(0).index(), 0);
        assert_eq!(TriangleId(3).to_string(), "3");
    }

    #[test]
    fn exterior_grain_is_zero() {
        assert!(GrainId::EXTERIOR.is_exterior());
        assert!(!GrainId(2).is_exterior());
    }
}
