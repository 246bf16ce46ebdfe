//! Arena handles for graph entities.
//!
//! The graph is cyclic (vertices know their regions, regions know their
//! vertices, transitions know both ends), so every cross reference is an
//! index into the owning [`StateMachine`](super::StateMachine) arena.

use std::fmt;

macro_rules! arena_id {
    ($(#[$meta:meta])* $name:ident, $prefix:literal) => {
        $(#[$meta])*
        #[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name(pub(crate) u32);

        impl $name {
            pub(crate) fn new(index: usize) -> Self {
                Self(index as u32)
            }

            /// Position of the entity in its arena.
            pub fn index(self) -> usize {
                self.0 as usize
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!($prefix, "#{}"), self.0)
            }
        }
    };
}

arena_id!(
    /// Handle of a vertex (state, final state or pseudostate).
    VertexId,
    "v"
);
arena_id!(
    /// Handle of a region.
    RegionId,
    "r"
);
arena_id!(
    /// Handle of a transition.
    TransitionId,
    "t"
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_round_trip_their_index() {
        assert_eq!(VertexId::new(7).index(), 7);
        assert_eq!(RegionId::new(0).index(), 0);
        assert_eq!(format!("{:?}", TransitionId::new(3)), "t#3");
    }
}
