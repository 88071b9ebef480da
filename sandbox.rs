//! Plain data types for the sandbox-correlation inbound interface (§6).
//!
//! The sandboxed JS executor that produces a `SandboxTrace` lives outside
//! this crate entirely (§1's explicit scope cut); this module only defines
//! the shape a decoder-lifting pass (also external) would consume to
//! corroborate a suspected decoder function against its observed runtime
//! behavior. Nothing here constructs a `SandboxTrace` -- it is always
//! produced upstream and handed in.

use serde::{Deserialize, Serialize};

use crate::ir::{NodeId, ScopeId, ShapeId};

#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum TraceEntryKind {
    FunctionCall,
    VariableAccess,
    ConstantDecode,
    ControlFlow,
    StringOperation,
    ArrayOperation,
    ObjectOperation,
}

/// Ties a trace entry back to the IR construct that produced it, when the
/// sandbox was run with correlation tracking enabled.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct IrCorrelation {
    pub node_id: NodeId,
    pub scope_id: ScopeId,
    pub shape_id: ShapeId,
}

/// A JSON-ish scalar, the shape sandbox inputs/outputs are recorded in.
/// Deliberately untyped beyond this: the sandbox executor's value domain is
/// out of this crate's scope, and a decoder-lifting pass only ever compares
/// these for equality or prints them into a diagnostic.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TraceValue {
    Null,
    Bool(bool),
    Number(f64),
    Str(String),
    Array(Vec<TraceValue>),
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TraceEntry {
    pub kind: TraceEntryKind,
    pub inputs: Vec<TraceValue>,
    pub outputs: Vec<TraceValue>,
    /// Milliseconds since the start of the sandbox run.
    pub timestamp_ms: u64,
    /// Call-stack depth at which this entry was recorded.
    pub depth: u32,
    pub correlation: Option<IrCorrelation>,
}

/// A full sandbox run: its ordered trace, consumed by the (external)
/// decoder-lifting pass to corroborate a suspected decoder function.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct SandboxTrace {
    pub entries: Vec<TraceEntry>,
}

impl SandboxTrace {
    /// Entries whose `correlation.node_id` matches `node`, in trace order.
    /// The primitive a decoder-lifting pass would build its corroboration
    /// check on top of.
    pub fn entries_for_node(&self, node: NodeId) -> impl Iterator<Item = &TraceEntry> {
        self.entries.iter().filter(move |e| e.correlation.map(|c| c.node_id) == Some(node))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entries_for_node_filters_by_correlation() {
        let target = NodeId::from_raw(7);
        let trace = SandboxTrace {
            entries: vec![
                TraceEntry {
                    kind: TraceEntryKind::ConstantDecode,
                    inputs: vec![TraceValue::Str("_0x1a2b".into())],
                    outputs: vec![TraceValue::Str("hello".into())],
                    timestamp_ms: 12,
                    depth: 1,
                    correlation: Some(IrCorrelation {
                        node_id: target,
                        scope_id: ScopeId::from_raw(0),
                        shape_id: ShapeId::from_raw(0),
                    }),
                },
                TraceEntry {
                    kind: TraceEntryKind::FunctionCall,
                    inputs: vec![],
                    outputs: vec![],
                    timestamp_ms: 13,
                    depth: 1,
                    correlation: None,
                },
            ],
        };
        assert_eq!(trace.entries_for_node(target).count(), 1);
    }
}
