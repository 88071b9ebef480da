//! Control-flow structuring (§4.8): three independent structural rewrites
//! that raise low-level control flow left over from the obfuscator back
//! into the constructs a human author would have written. Unlike the
//! dataflow passes this one does not require SSA -- it pattern-matches
//! directly on the `If`/`While` shape of the raw (or SSA-destroyed)
//! `Identifier` namespace, the same namespace `copy_prop` runs against.
//!
//! The CFG's dominance information is available to a caller that wants to
//! validate a candidate rewrite, but the recognizer itself is purely
//! structural, per §4.8's closing paragraph -- it never consults `state.cfg`.

use crate::ir::{AssignOp, BinOp, Name, Node, NodeId, NodeTable, Stmt, StmtKind, SwitchCase};

use super::{Pass, PassMetrics, PassOptions, PassOutcome, ProgramState};

pub struct Structuring {
    pub options: PassOptions,
}

impl Default for Structuring {
    fn default() -> Self {
        Self { options: PassOptions::default() }
    }
}

impl Pass for Structuring {
    fn name(&self) -> &'static str {
        "control-flow-structuring"
    }

    fn description(&self) -> &'static str {
        "Raises if-else chains to ternaries/switches and while(true)+break to structured loops"
    }

    fn dependencies(&self) -> &'static [&'static str] {
        &[]
    }

    fn options(&self) -> &PassOptions {
        &self.options
    }

    fn run(&self, state: &ProgramState) -> PassOutcome {
        let mut metrics = PassMetrics::default();
        let mut table = state.table.clone();
        let mut changed = 0usize;

        for &id in &state.body {
            structure_stmt(&mut table, id, &mut changed, &mut metrics);
        }

        metrics.memory_nodes = table.len();
        metrics.nodes_changed = changed;

        PassOutcome {
            table,
            body: state.body.clone(),
            changed: changed > 0,
            invalidates_cfg: changed > 0,
            metrics,
            warnings: Vec::new(),
            errors: Vec::new(),
        }
    }
}

/// Walks one statement, attempting the three recoveries where they apply
/// and recursing into every nested statement position afterward -- the
/// rewritten form (or, if nothing matched, the original) is descended into
/// so a chain nested inside a loop body or a switch case still gets a
/// chance at its own recovery.
fn structure_stmt(table: &mut NodeTable, stmt_id: NodeId, changed: &mut usize, metrics: &mut PassMetrics) {
    metrics.nodes_visited += 1;

    if matches!(table.try_get(stmt_id).and_then(|n| n.as_stmt()), Some(Stmt { kind: StmtKind::If { .. }, .. })) {
        if try_ternary_recovery(table, stmt_id) || try_switch_recovery(table, stmt_id) {
            *changed += 1;
            return;
        }
    }

    if matches!(table.try_get(stmt_id).and_then(|n| n.as_stmt()), Some(Stmt { kind: StmtKind::While { .. }, .. })) {
        if try_loop_recovery(table, stmt_id) {
            *changed += 1;
        }
    }

    let Some(stmt) = table.try_get(stmt_id).and_then(|n| n.as_stmt()).cloned() else { return };
    match stmt.kind {
        StmtKind::Block { body, .. } => {
            for id in body {
                structure_stmt(table, id, changed, metrics);
            }
        }
        StmtKind::If { cons, alt, .. } => {
            structure_stmt(table, cons, changed, metrics);
            if let Some(alt) = alt {
                structure_stmt(table, alt, changed, metrics);
            }
        }
        StmtKind::While { body, .. } | StmtKind::For { body, .. } => {
            structure_stmt(table, body, changed, metrics);
        }
        StmtKind::Try { block, handler, finalizer } => {
            structure_stmt(table, block, changed, metrics);
            if let Some(h) = handler {
                structure_stmt(table, h.body, changed, metrics);
            }
            if let Some(f) = finalizer {
                structure_stmt(table, f, changed, metrics);
            }
        }
        StmtKind::Switch { cases, .. } => {
            for case in cases {
                for id in case.consequent {
                    structure_stmt(table, id, changed, metrics);
                }
            }
        }
        StmtKind::Labeled { body, .. } => structure_stmt(table, body, changed, metrics),
        StmtKind::FunctionDeclaration { body, .. } => structure_stmt(table, body, changed, metrics),
        _ => {}
    }
}

// SECTION: ternary recovery

/// `target <- value`, looking through a single-statement `Block` wrapper so
/// `{ x = 1; }` and a bare `x = 1;` are recognized identically.
fn single_assignment(table: &NodeTable, stmt_id: NodeId) -> Option<(Name, NodeId)> {
    let stmt = table.try_get(stmt_id)?.as_stmt()?;
    match &stmt.kind {
        StmtKind::Block { body, .. } if body.len() == 1 => single_assignment(table, body[0]),
        StmtKind::Expression(expr_id) => {
            let expr = table.try_get(*expr_id)?.as_expr()?;
            let crate::ir::ExprKind::Assignment { op, target, value } = &expr.kind else { return None };
            if !op.is_plain() {
                return None;
            }
            let name = table.try_get(*target)?.identifier_name()?.clone();
            Some((name, *value))
        }
        _ => None,
    }
}

/// Looks through a single-statement `Block` wrapper to find a nested `If`
/// (the shape `else { if (...) ... }` and the bare `else if (...) ...`
/// parse to, depending on the front end).
fn as_if_stmt(table: &NodeTable, stmt_id: NodeId) -> Option<NodeId> {
    let stmt = table.try_get(stmt_id)?.as_stmt()?;
    match &stmt.kind {
        StmtKind::If { .. } => Some(stmt_id),
        StmtKind::Block { body, .. } if body.len() == 1 => as_if_stmt(table, body[0]),
        _ => None,
    }
}

/// Recognizes an if-else chain where every arm, including the final else,
/// is a single assignment to the same target (§4.8): returns the shared
/// target name, the `(test, value)` pair for every `if`/`else if` arm in
/// source order, and the final else's value.
fn extract_ternary_chain(table: &NodeTable, if_id: NodeId) -> Option<(Name, Vec<(NodeId, NodeId)>, NodeId)> {
    let stmt = table.try_get(if_id)?.as_stmt()?;
    let StmtKind::If { test, cons, alt } = &stmt.kind else { return None };
    let (target, cons_value) = single_assignment(table, *cons)?;
    let alt_id = (*alt)?;

    if let Some(inner_if) = as_if_stmt(table, alt_id) {
        let (inner_target, mut rest, default) = extract_ternary_chain(table, inner_if)?;
        if inner_target != target {
            return None;
        }
        let mut arms = vec![(*test, cons_value)];
        arms.append(&mut rest);
        return Some((target, arms, default));
    }

    let (default_target, default_value) = single_assignment(table, alt_id)?;
    if default_target != target {
        return None;
    }
    Some((target, vec![(*test, cons_value)], default_value))
}

fn try_ternary_recovery(table: &mut NodeTable, if_id: NodeId) -> bool {
    let Some((target, arms, default)) = extract_ternary_chain(table, if_id) else { return false };

    let loc = table.get(if_id).loc();
    let mut acc = default;
    for (test, value) in arms.into_iter().rev() {
        acc = table.make_conditional(test, value, acc, loc);
    }
    let target_pat = table.make_identifier_pattern(target, loc);
    let assign = table.make_assignment(AssignOp::Assign, target_pat, acc, loc);
    table.insert(if_id, Node::Stmt(Stmt { node_id: if_id, loc, kind: StmtKind::Expression(assign) }));
    true
}

// SECTION: switch recovery

struct EqualityCase {
    value: NodeId,
    body: Vec<NodeId>,
}

struct EqualityChain {
    discriminant: NodeId,
    op: BinOp,
    cases: Vec<EqualityCase>,
    default: Option<Vec<NodeId>>,
}

fn stmt_body(table: &NodeTable, stmt_id: NodeId) -> Vec<NodeId> {
    match table.try_get(stmt_id).and_then(|n| n.as_stmt()) {
        Some(Stmt { kind: StmtKind::Block { body, .. }, .. }) => body.clone(),
        Some(_) => vec![stmt_id],
        None => Vec::new(),
    }
}

/// Recognizes an if-else chain of equality tests sharing one discriminant
/// and comparison operator (§4.8): a mixed operator or a differing left
/// operand disqualifies the whole chain, not just the offending arm.
fn extract_equality_chain(
    table: &NodeTable,
    if_id: NodeId,
    discriminant: Option<NodeId>,
    op: Option<BinOp>,
) -> Option<EqualityChain> {
    let stmt = table.try_get(if_id)?.as_stmt()?;
    let StmtKind::If { test, cons, alt } = &stmt.kind else { return None };
    let test_expr = table.try_get(*test)?.as_expr()?;
    let crate::ir::ExprKind::Binary { op: test_op, left, right } = &test_expr.kind else { return None };
    if !test_op.is_equality() {
        return None;
    }
    if let Some(d) = discriminant {
        if !table.structural_eq(d, *left) {
            return None;
        }
    }
    if let Some(o) = op {
        if o != *test_op {
            return None;
        }
    }
    let case = EqualityCase { value: *right, body: stmt_body(table, *cons) };
    let d = discriminant.unwrap_or(*left);

    let Some(alt_id) = alt else {
        return Some(EqualityChain { discriminant: d, op: *test_op, cases: vec![case], default: None });
    };

    if let Some(inner_if) = as_if_stmt(table, *alt_id) {
        if let Some(mut chain) = extract_equality_chain(table, inner_if, Some(d), Some(*test_op)) {
            chain.cases.insert(0, case);
            return Some(chain);
        }
    }
    Some(EqualityChain {
        discriminant: d,
        op: *test_op,
        cases: vec![case],
        default: Some(stmt_body(table, *alt_id)),
    })
}

fn try_switch_recovery(table: &mut NodeTable, if_id: NodeId) -> bool {
    let Some(chain) = extract_equality_chain(table, if_id, None, None) else { return false };
    if chain.cases.len() < 3 {
        return false;
    }

    let loc = table.get(if_id).loc();
    let mut cases: Vec<SwitchCase> =
        chain.cases.into_iter().map(|c| SwitchCase { test: Some(c.value), consequent: c.body }).collect();
    if let Some(default_body) = chain.default {
        cases.push(SwitchCase { test: None, consequent: default_body });
    }

    table.insert(
        if_id,
        Node::Stmt(Stmt { node_id: if_id, loc, kind: StmtKind::Switch { discriminant: chain.discriminant, cases } }),
    );
    true
}

// SECTION: loop recovery

/// `while(true){ if(C) break; body... }` -> `while(!C){ body... }` (§4.8):
/// only the single-guard, unlabeled `break` shape is recognized; anything
/// else about the loop is left alone (already-natural loops untouched).
fn try_loop_recovery(table: &mut NodeTable, while_id: NodeId) -> bool {
    let Some(stmt) = table.try_get(while_id).and_then(|n| n.as_stmt()).cloned() else { return false };
    let StmtKind::While { test, body } = stmt.kind else { return false };
    if !is_literal_true(table, test) {
        return false;
    }

    let body_stmts = stmt_body(table, body);
    let Some((&guard_id, rest)) = body_stmts.split_first() else { return false };
    let Some(guard) = table.try_get(guard_id).and_then(|n| n.as_stmt()) else { return false };
    let StmtKind::If { test: guard_test, cons, alt: None } = &guard.kind else { return false };
    let guard_test = *guard_test;
    let Some(brk) = table.try_get(*cons).and_then(|n| n.as_stmt()) else { return false };
    let is_bare_break = matches!(brk.kind, StmtKind::Break(None));
    let is_block_break = matches!(
        &brk.kind,
        StmtKind::Block { body, .. } if body.len() == 1
            && matches!(table.try_get(body[0]).and_then(|n| n.as_stmt()), Some(Stmt { kind: StmtKind::Break(None), .. }))
    );
    if !is_bare_break && !is_block_break {
        return false;
    }

    let guard_test_loc = table.get(guard_test).loc();
    let negated_test = table.make_unary(crate::ir::UnOp::Not, guard_test, true, guard_test_loc);
    let rest = rest.to_vec();
    let new_body_loc = table.get(body).loc();
    table.insert(body, Node::Stmt(Stmt { node_id: body, loc: new_body_loc, kind: StmtKind::Block { body: rest, phis: Vec::new() } }));
    table.insert(
        while_id,
        Node::Stmt(Stmt { node_id: while_id, loc: stmt.loc, kind: StmtKind::While { test: negated_test, body } }),
    );
    true
}

fn is_literal_true(table: &NodeTable, expr_id: NodeId) -> bool {
    matches!(
        table.try_get(expr_id).and_then(|n| n.as_expr()),
        Some(crate::ir::Expr { kind: crate::ir::ExprKind::Literal(crate::ir::Literal::Bool(true)), .. })
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{BinOp, ExprKind, Literal, NodeTable, VarKind};
    use crate::passes::PassManager;

    fn run_structuring(table: NodeTable, body: Vec<NodeId>) -> ProgramState {
        let state = ProgramState::build(table, body).unwrap();
        let manager = PassManager::build(vec![Box::new(Structuring::default())]).unwrap();
        manager.run(state).unwrap().final_state
    }

    #[test]
    fn if_else_with_matching_targets_becomes_a_ternary() {
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

        let final_state = run_structuring(table, vec![if_stmt]);
        let rewritten = final_state.table.get(if_stmt).as_stmt().unwrap();
        let StmtKind::Expression(expr_id) = rewritten.kind else { panic!("expected an expression statement") };
        let expr = final_state.table.get(expr_id).as_expr().unwrap();
        let ExprKind::Assignment { value, .. } = expr.kind else { panic!("expected an assignment") };
        assert!(matches!(
            final_state.table.get(value).as_expr().unwrap().kind,
            ExprKind::Conditional { .. }
        ));
    }

    #[test]
    fn if_chain_with_differing_targets_is_left_alone() {
        let mut table = NodeTable::new();
        let cond = table.make_identifier(table.intern("cond"), None);

        let one = table.make_literal(Literal::Number(1.0), None);
        let x_pat = table.make_identifier_pattern(table.intern("x"), None);
        let assign1 = table.make_assignment(AssignOp::Assign, x_pat, one, None);
        let then_stmt = table.make_expression_stmt(assign1, None);

        let two = table.make_literal(Literal::Number(2.0), None);
        let y_pat = table.make_identifier_pattern(table.intern("y"), None);
        let assign2 = table.make_assignment(AssignOp::Assign, y_pat, two, None);
        let else_stmt = table.make_expression_stmt(assign2, None);

        let if_stmt = table.make_if(cond, then_stmt, Some(else_stmt), None);

        let final_state = run_structuring(table, vec![if_stmt]);
        let rewritten = final_state.table.get(if_stmt).as_stmt().unwrap();
        assert!(matches!(rewritten.kind, StmtKind::If { .. }));
    }

    fn call_stmt(table: &mut NodeTable, name: &str) -> NodeId {
        let callee = table.make_identifier(table.intern(name), None);
        let call = table.make_call(callee, vec![], false, None);
        table.make_expression_stmt(call, None)
    }

    #[test]
    fn three_way_equality_chain_becomes_a_switch_without_break() {
        let mut table = NodeTable::new();
        let k = table.make_identifier(table.intern("k"), None);

        let one = table.make_literal(Literal::Number(1.0), None);
        let test1 = table.make_binary(BinOp::StrictEq, k, one, None);
        let f_call = call_stmt(&mut table, "f");

        let k2 = table.make_identifier(table.intern("k"), None);
        let two = table.make_literal(Literal::Number(2.0), None);
        let test2 = table.make_binary(BinOp::StrictEq, k2, two, None);
        let g_call = call_stmt(&mut table, "g");

        let k3 = table.make_identifier(table.intern("k"), None);
        let three = table.make_literal(Literal::Number(3.0), None);
        let test3 = table.make_binary(BinOp::StrictEq, k3, three, None);
        let h_call = call_stmt(&mut table, "h");

        let if3 = table.make_if(test3, h_call, None, None);
        let if2 = table.make_if(test2, g_call, Some(if3), None);
        let if1 = table.make_if(test1, f_call, Some(if2), None);

        let final_state = run_structuring(table, vec![if1]);
        let rewritten = final_state.table.get(if1).as_stmt().unwrap();
        let StmtKind::Switch { cases, .. } = &rewritten.kind else { panic!("expected a switch") };
        assert_eq!(cases.len(), 3);
        assert!(cases.iter().all(|c| c.test.is_some()));
    }

    #[test]
    fn two_arm_equality_chain_is_too_short_for_a_switch() {
        let mut table = NodeTable::new();
        let k = table.make_identifier(table.intern("k"), None);
        let one = table.make_literal(Literal::Number(1.0), None);
        let test1 = table.make_binary(BinOp::StrictEq, k, one, None);
        let f_call = call_stmt(&mut table, "f");

        let k2 = table.make_identifier(table.intern("k"), None);
        let two = table.make_literal(Literal::Number(2.0), None);
        let test2 = table.make_binary(BinOp::StrictEq, k2, two, None);
        let g_call = call_stmt(&mut table, "g");

        let if2 = table.make_if(test2, g_call, None, None);
        let if1 = table.make_if(test1, f_call, Some(if2), None);

        let final_state = run_structuring(table, vec![if1]);
        let rewritten = final_state.table.get(if1).as_stmt().unwrap();
        assert!(matches!(rewritten.kind, StmtKind::If { .. }));
    }

    #[test]
    fn while_true_with_leading_break_guard_recovers_the_condition() {
        let mut table = NodeTable::new();
        let lit_true = table.make_literal(Literal::Bool(true), None);
        let done = table.make_identifier(table.intern("done"), None);
        let brk = table.make_break(None, None);
        let guard = table.make_if(done, brk, None, None);
        let step = call_stmt(&mut table, "step");
        let body = table.make_block(vec![guard, step], None);
        let while_stmt = table.make_while(lit_true, body, None);

        let final_state = run_structuring(table, vec![while_stmt]);
        let rewritten = final_state.table.get(while_stmt).as_stmt().unwrap();
        let StmtKind::While { test, body } = rewritten.kind else { panic!("expected a while loop") };
        assert!(matches!(final_state.table.get(test).as_expr().unwrap().kind, ExprKind::Unary { op: crate::ir::UnOp::Not, .. }));
        let StmtKind::Block { body: stmts, .. } = &final_state.table.get(body).as_stmt().unwrap().kind else {
            panic!("expected a block")
        };
        assert_eq!(stmts.len(), 1);
        assert_eq!(stmts[0], step);
    }

    #[test]
    fn while_true_without_a_break_guard_is_left_alone() {
        let mut table = NodeTable::new();
        let lit_true = table.make_literal(Literal::Bool(true), None);
        let step = call_stmt(&mut table, "step");
        let body = table.make_block(vec![step], None);
        let while_stmt = table.make_while(lit_true, body, None);

        let final_state = run_structuring(table, vec![while_stmt]);
        let rewritten = final_state.table.get(while_stmt).as_stmt().unwrap();
        assert!(matches!(rewritten.kind, StmtKind::While { .. }));
        let StmtKind::While { test, .. } = rewritten.kind else { unreachable!() };
        assert!(is_literal_true(&final_state.table, test));
    }
}
