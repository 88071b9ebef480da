//! The intermediate representation: an arena of expression, statement,
//! pattern and phi nodes addressed by opaque ids (see `ids`), plus the
//! string interner (`interner`) used for identifier and literal payloads.

pub mod ids;
pub mod interner;
pub mod node;

pub use ids::{IdAllocator, NodeId, ScopeId, ShapeId, SsaVersion};
pub use interner::{Interner, Name};
pub use node::*;
