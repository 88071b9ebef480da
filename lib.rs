//! `arachne-core`: the IR, CFG/SSA construction and dataflow rewrite passes
//! that sit at the center of the deobfuscation pipeline (see `SPEC_FULL.md`).
//!
//! This crate owns the hard-core analyses -- dominance, SSA, sparse constant
//! propagation, copy propagation, dead-code elimination, and control-flow
//! structuring -- and treats everything upstream (the JS parser) and
//! downstream (the printer, the LLM-assisted renamer, the SMT solver, the
//! sandboxed corroboration executor) as external collaborators reachable
//! only through the plain-data interfaces in `sandbox` and `pipeline`.

pub mod cfg;
pub mod commons;
pub mod ir;
pub mod passes;
pub mod pipeline;
pub mod sandbox;
pub mod ssa;

pub use commons::{Error, Result};
