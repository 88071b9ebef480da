//! Built-in sample programs for the demo binaries (`dump-cfg`, `dump-ssa`,
//! `run-pass`, `run-pipeline`).
//!
//! This crate's scope explicitly excludes the JavaScript parser (§1), so
//! these binaries have no source file to read; they exercise the IR/CFG/SSA
//! engines and the rewrite passes against a handful of named built-in
//! programs instead, the same small shapes the pipeline's own end-to-end
//! tests build by hand.

use arachne_core::ir::{BinOp, Declarator, NodeId, NodeTable, VarKind};

/// A scenario's IR plus the top-level statement order the CFG builder wants.
pub struct Scenario {
    pub table: NodeTable,
    pub body: Vec<NodeId>,
}

pub fn available() -> &'static [&'static str] {
    &["arithmetic", "ternary", "loop"]
}

pub fn build(name: &str) -> Option<Scenario> {
    match name {
        "arithmetic" => Some(arithmetic()),
        "ternary" => Some(ternary()),
        "loop" => Some(loop_with_break()),
        _ => None,
    }
}

/// `var x = 2 + 3 * 4; return x;` -- constant propagation folds this down to
/// the literal `14` (§8, scenario 1).
fn arithmetic() -> Scenario {
    use arachne_core::ir::Literal;

    let mut table = NodeTable::new();
    let x = table.intern("x");
    let two = table.make_literal(Literal::Number(2.0), None);
    let three = table.make_literal(Literal::Number(3.0), None);
    let four = table.make_literal(Literal::Number(4.0), None);
    let mul = table.make_binary(BinOp::Mul, three, four, None);
    let sum = table.make_binary(BinOp::Add, two, mul, None);
    let x_pat = table.make_identifier_pattern(x.clone(), None);
    let decl = table.make_var_decl(VarKind::Var, vec![Declarator { id: x_pat, init: Some(sum) }], None);
    let x_use = table.make_identifier(x, None);
    let ret = table.make_return(Some(x_use), None);

    Scenario { table, body: vec![decl, ret] }
}

/// `if (cond) { x = 1; } else { x = 2; }` -- structuring raises this to
/// `x = cond ? 1 : 2;` (§8, scenario 3).
fn ternary() -> Scenario {
    use arachne_core::ir::{AssignOp, Literal};

    let mut table = NodeTable::new();
    let cond = table.make_identifier(table.intern("cond"), None);
    let x = table.intern("x");

    let one = table.make_literal(Literal::Number(1.0), None);
    let x_pat1 = table.make_identifier_pattern(x.clone(), None);
    let assign1 = table.make_assignment(AssignOp::Assign, x_pat1, one, None);
    let then_stmt = table.make_expression_stmt(assign1, None);

    let two = table.make_literal(Literal::Number(2.0), None);
    let x_pat2 = table.make_identifier_pattern(x.clone(), None);
    let assign2 = table.make_assignment(AssignOp::Assign, x_pat2, two, None);
    let else_stmt = table.make_expression_stmt(assign2, None);

    let if_stmt = table.make_if(cond, then_stmt, Some(else_stmt), None);
    Scenario { table, body: vec![if_stmt] }
}

/// `while (true) { if (done) break; step(); }` -- structuring recovers the
/// guard into `while (!done) { step(); }` (§8, scenario 5).
fn loop_with_break() -> Scenario {
    use arachne_core::ir::Literal;

    let mut table = NodeTable::new();
    let done = table.make_identifier(table.intern("done"), None);
    let brk = table.make_break(None, None);
    let guard = table.make_if(done, brk, None, None);

    let step = table.make_identifier(table.intern("step"), None);
    let call = table.make_call(step, vec![], false, None);
    let call_stmt = table.make_expression_stmt(call, None);

    let body = table.make_block(vec![guard, call_stmt], None);
    let always_true = table.make_literal(Literal::Bool(true), None);
    let loop_stmt = table.make_while(always_true, body, None);

    Scenario { table, body: vec![loop_stmt] }
}
