//! Error taxonomy shared across the crate's components.
//!
//! Most pass-level failures are not `Err`s: a pass that can't make progress
//! records that on its `PassResult` (see `passes`) and the pipeline keeps
//! going. `Error` is reserved for failures a component cannot route around
//! -- malformed input IR, a construction-time configuration mistake, or a
//! validator catching a genuine invariant violation.

use thiserror::Error;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum Error {
    /// The IR handed to a builder doesn't satisfy the shape that builder
    /// requires (e.g. `break` outside any loop, a dangling `NodeId`).
    #[error("structural error: {0}")]
    Structural(String),

    /// A fixpoint computation (dataflow analysis, SSA renaming) did not
    /// converge within its configured iteration budget.
    #[error("analysis failed to converge after {iterations} iterations")]
    NonConvergence { iterations: u32 },

    /// A pass or pipeline run exceeded its configured wall-clock budget.
    #[error("pass {pass} exceeded its {budget_ms}ms time budget")]
    Timeout { pass: String, budget_ms: u64 },

    /// The SSA validator found a use with no matching definition, or a phi
    /// with a missing/duplicate operand for one of its block's predecessors.
    #[error("SSA validation failed: {0}")]
    SsaValidation(String),

    /// A rewrite a pass proposed would change program behavior in a way the
    /// pass's own safety check rejects (e.g. eliding a write with an
    /// observable side effect).
    #[error("unsafe transformation rejected: {0}")]
    TransformationSafety(String),

    /// `PipelineConfig` was constructed with contradictory or out-of-range
    /// values (e.g. `max_iterations = 0`).
    #[error("invalid configuration: {0}")]
    Configuration(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_messages_are_human_readable() {
        let e = Error::Timeout { pass: "constant-prop".into(), budget_ms: 500 };
        assert_eq!(e.to_string(), "pass constant-prop exceeded its 500ms time budget");
    }
}
