//! Opaque, process-unique identifiers for IR nodes and the scoped allocator
//! that mints them.
//!
//! Per the design notes: the allocator is a per-pipeline instance, never
//! global state, so that two pipelines can run over disjoint inputs without
//! colliding on ids and so that tests don't depend on run order.

use std::cell::Cell;
use std::fmt;

macro_rules! opaque_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug, serde::Serialize, serde::Deserialize)]
        pub struct $name(u64);

        impl $name {
            pub fn index(self) -> u64 {
                self.0
            }

            /// Only for use by an `IdAllocator` or by deserializers that
            /// reconstruct a previously-allocated id.
            pub(crate) fn from_raw(raw: u64) -> Self {
                $name(raw)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!(stringify!($name), "({})"), self.0)
            }
        }
    };
}

opaque_id!(
    /// Identifies a single IR node (expression, statement, pattern, or phi).
    NodeId
);
opaque_id!(
    /// Identifies a lexical scope introduced by a function or block.
    ScopeId
);
opaque_id!(
    /// Identifies the runtime "shape" an object/decoder value was observed
    /// with during sandbox correlation (see `crate::sandbox`).
    ShapeId
);

/// A variable's SSA version number. Versions are per-name, monotonic, and
/// allocated by the SSA engine during renaming -- not by `IdAllocator`.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug, serde::Serialize, serde::Deserialize)]
pub struct SsaVersion(pub u32);

impl fmt::Display for SsaVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Monotonic id source for one pipeline run. Intentionally `!Sync`-friendly
/// (single-threaded cooperative scheduling, see the design's concurrency
/// model) -- a `Cell` is enough, no atomics required.
#[derive(Debug, Default)]
pub struct IdAllocator {
    next_node: Cell<u64>,
    next_scope: Cell<u64>,
    next_shape: Cell<u64>,
}

impl IdAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fresh_node(&self) -> NodeId {
        let id = self.next_node.get();
        self.next_node.set(id + 1);
        NodeId(id)
    }

    pub fn fresh_scope(&self) -> ScopeId {
        let id = self.next_scope.get();
        self.next_scope.set(id + 1);
        ScopeId(id)
    }

    pub fn fresh_shape(&self) -> ShapeId {
        let id = self.next_shape.get();
        self.next_shape.set(id + 1);
        ShapeId(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_ids_are_unique_and_increasing() {
        let alloc = IdAllocator::new();
        let a = alloc.fresh_node();
        let b = alloc.fresh_node();
        assert_ne!(a, b);
        assert!(a.index() < b.index());
    }

    #[test]
    fn independent_allocators_can_collide_by_index_but_not_within_one_run() {
        let a1 = IdAllocator::new();
        let a2 = IdAllocator::new();
        assert_eq!(a1.fresh_node().index(), a2.fresh_node().index());
    }
}
