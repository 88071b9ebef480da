//! Copy propagation (§4.6): a classical must-analysis over plain variable
//! names (not SSA versions -- once a name is split into SSA versions each
//! version has exactly one definition and the "kill" half of this analysis
//! becomes vacuous, so this pass runs against the raw `Identifier` namespace
//! either before SSA construction or after destruction).
//!
//! Available copies are computed per block by intersection over
//! predecessors -- a must-analysis, the dual of a union-join may-analysis
//! like liveness -- seeded at the universal set rather than the empty set,
//! so it runs its own small fixpoint loop rather than a generic union-join
//! driver.

use std::collections::{BTreeMap as Map, BTreeSet as Set};

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::cfg::{BlockId, Cfg};
use crate::ir::{AssignOp, Expr, ExprKind, ForInit, Name, Node, NodeId, NodeTable, StmtKind};

use super::{Pass, PassMetrics, PassOptions, PassOutcome, ProgramState};

/// A tracked `target <- source` fact: `target`'s current value is known to
/// equal `source`'s.
type CopyFact = (Name, Name);

/// Confidence assigned to a direct identifier copy (`x = y`), per §4.6. Any
/// other initializer form (`x = f()`, `x = 1`) is not a copy at all --
/// there's no source variable to propagate -- and would score 0.5 if scored,
/// below the default 0.8 availability threshold, so this pass never
/// constructs a candidate for one.
const DIRECT_COPY_CONFIDENCE: f64 = 0.9;

pub struct CopyPropagation {
    pub options: PassOptions,
    /// Minimum confidence (§4.6) a copy must carry to become available.
    pub threshold: f64,
}

impl Default for CopyPropagation {
    fn default() -> Self {
        Self { options: PassOptions::default(), threshold: 0.8 }
    }
}

impl Pass for CopyPropagation {
    fn name(&self) -> &'static str {
        "copy-propagation"
    }

    fn description(&self) -> &'static str {
        "Dataflow that replaces variables with known copy sources"
    }

    fn dependencies(&self) -> &'static [&'static str] {
        &[]
    }

    fn options(&self) -> &PassOptions {
        &self.options
    }

    fn run(&self, state: &ProgramState) -> PassOutcome {
        let mut metrics = PassMetrics::default();
        let cfg = &state.cfg;

        let gens: Map<BlockId, Vec<(NodeId, CopyFact)>> = cfg
            .block_ids()
            .map(|bb| (bb, collect_candidates(&state.table, cfg, bb, self.threshold)))
            .collect();
        let universe: Set<CopyFact> = gens.values().flat_map(|v| v.iter().map(|(_, c)| c.clone())).collect();

        let order = cfg.reverse_postorder();
        let mut out: Map<BlockId, Set<CopyFact>> =
            cfg.block_ids().map(|bb| (bb, if bb == cfg.entry { Set::new() } else { universe.clone() })).collect();

        let budget = self.options.max_iterations.max(1);
        let mut sweeps = 0u32;
        let mut converged = false;
        while sweeps < budget {
            sweeps += 1;
            let mut changed = false;
            for &bb in &order {
                metrics.nodes_visited += 1;
                let in_set = if bb == cfg.entry {
                    Set::new()
                } else {
                    let mut preds = cfg.pred(bb);
                    match preds.next() {
                        None => universe.clone(),
                        Some(first) => {
                            let mut acc = out[&first].clone();
                            for p in preds {
                                acc = acc.intersection(&out[&p]).cloned().collect();
                            }
                            acc
                        }
                    }
                };
                let new_out = block_transfer(&state.table, cfg, bb, &in_set, &gens[&bb]);
                if out[&bb] != new_out {
                    out.insert(bb, new_out);
                    changed = true;
                }
            }
            if !changed {
                converged = true;
                break;
            }
        }

        let mut warnings = Vec::new();
        if !converged {
            warn!(pass = self.name(), iterations = sweeps, "non-convergence, using partial result");
            warnings.push(format!(
                "copy propagation did not converge within {} iterations; using partial result",
                budget
            ));
        }

        let mut next_table = state.table.clone();
        let mut nodes_changed = 0usize;
        for bb in cfg.block_ids() {
            let entry_copies = if bb == cfg.entry {
                Set::new()
            } else {
                let mut preds = cfg.pred(bb);
                match preds.next() {
                    None => universe.clone(),
                    Some(first) => {
                        let mut acc = out[&first].clone();
                        for p in preds {
                            acc = acc.intersection(&out[&p]).cloned().collect();
                        }
                        acc
                    }
                }
            };
            nodes_changed += rewrite_block(&mut next_table, cfg, bb, entry_copies);
        }

        metrics.nodes_changed = nodes_changed;
        metrics.memory_nodes = next_table.len();

        PassOutcome {
            table: next_table,
            body: state.body.clone(),
            changed: nodes_changed > 0,
            invalidates_cfg: false,
            metrics,
            warnings,
            errors: Vec::new(),
        }
    }
}

/// Detects a direct identifier copy `target = source` on `stmt_id`, if any.
fn direct_copy(table: &NodeTable, target: NodeId, value: NodeId) -> Option<CopyFact> {
    let target_name = table.try_get(target).and_then(|n| n.identifier_name())?.clone();
    let source = table.try_get(value).and_then(|n| n.as_expr())?;
    let ExprKind::Identifier(source_name) = &source.kind else { return None };
    if *source_name == target_name {
        return None;
    }
    Some((target_name, source_name.clone()))
}

/// Names written anywhere in `stmt_id`: the kill set a definition of either
/// side of a tracked copy, or a call (conservatively, §4.6), invalidates.
fn defined_and_called(table: &NodeTable, stmt_id: NodeId, defined: &mut Set<Name>, has_call: &mut bool) {
    let Some(stmt) = table.try_get(stmt_id).and_then(|n| n.as_stmt()) else { return };
    match &stmt.kind {
        StmtKind::VariableDeclaration { declarators, .. } => {
            for d in declarators {
                add_def(table, d.id, defined);
                if let Some(init) = d.init {
                    scan_expr(table, init, defined, has_call);
                }
            }
        }
        StmtKind::Expression(expr_id) => scan_expr(table, *expr_id, defined, has_call),
        StmtKind::For { init: Some(ForInit::VarDecl { declarators, .. }), .. } => {
            for d in declarators {
                add_def(table, d.id, defined);
            }
        }
        StmtKind::For { init: Some(ForInit::Expr(e)), .. } => scan_expr(table, *e, defined, has_call),
        StmtKind::Return(Some(e)) | StmtKind::Throw(e) => scan_expr(table, *e, defined, has_call),
        _ => {}
    }
}

fn add_def(table: &NodeTable, pattern_id: NodeId, defined: &mut Set<Name>) {
    if let Some(name) = table.try_get(pattern_id).and_then(|n| n.identifier_name()) {
        defined.insert(name.clone());
    }
}

fn scan_expr(table: &NodeTable, expr_id: NodeId, defined: &mut Set<Name>, has_call: &mut bool) {
    let Some(expr) = table.try_get(expr_id).and_then(|n| n.as_expr()) else { return };
    match &expr.kind {
        ExprKind::Assignment { target, value, .. } => {
            add_def(table, *target, defined);
            scan_expr(table, *value, defined, has_call);
        }
        ExprKind::Update { arg, .. } => add_def(table, *arg, defined),
        ExprKind::Call { callee, args, .. } => {
            *has_call = true;
            scan_expr(table, *callee, defined, has_call);
            for a in args {
                scan_expr(table, *a, defined, has_call);
            }
        }
        ExprKind::New { callee, args } => {
            *has_call = true;
            scan_expr(table, *callee, defined, has_call);
            for a in args {
                scan_expr(table, *a, defined, has_call);
            }
        }
        ExprKind::Binary { left, right, .. } | ExprKind::Logical { left, right, .. } => {
            scan_expr(table, *left, defined, has_call);
            scan_expr(table, *right, defined, has_call);
        }
        ExprKind::Unary { arg, .. } => scan_expr(table, *arg, defined, has_call),
        ExprKind::Conditional { test, cons, alt } => {
            scan_expr(table, *test, defined, has_call);
            scan_expr(table, *cons, defined, has_call);
            scan_expr(table, *alt, defined, has_call);
        }
        ExprKind::Member { object, property, computed, .. } => {
            scan_expr(table, *object, defined, has_call);
            if *computed {
                scan_expr(table, *property, defined, has_call);
            }
        }
        ExprKind::Sequence(exprs) => {
            for e in exprs {
                scan_expr(table, *e, defined, has_call);
            }
        }
        ExprKind::Array { elements } => {
            for e in elements.iter().flatten() {
                scan_expr(table, *e, defined, has_call);
            }
        }
        ExprKind::Object { properties } => {
            for p in properties {
                scan_expr(table, *p, defined, has_call);
            }
        }
        ExprKind::Property { value, computed, key, .. } => {
            if *computed {
                scan_expr(table, *key, defined, has_call);
            }
            scan_expr(table, *value, defined, has_call);
        }
        _ => {}
    }
}

/// Gen set: direct copies introduced by `bb`, in program order, paired with
/// the statement id they're generated at (used to replay gen/kill in order
/// during the final rewrite sweep).
fn collect_candidates(table: &NodeTable, cfg: &Cfg, bb: BlockId, threshold: f64) -> Vec<(NodeId, CopyFact)> {
    if threshold > DIRECT_COPY_CONFIDENCE {
        return Vec::new();
    }
    let mut out = Vec::new();
    for &stmt_id in &cfg.block(bb).stmts {
        let Some(stmt) = table.try_get(stmt_id).and_then(|n| n.as_stmt()) else { continue };
        match &stmt.kind {
            StmtKind::VariableDeclaration { declarators, .. } => {
                for d in declarators {
                    if let Some(init) = d.init {
                        if let Some(copy) = direct_copy(table, d.id, init) {
                            out.push((stmt_id, copy));
                        }
                    }
                }
            }
            StmtKind::Expression(expr_id) => {
                if let Some(expr) = table.try_get(*expr_id).and_then(|n| n.as_expr()) {
                    if let ExprKind::Assignment { op, target, value } = &expr.kind {
                        if op.is_plain() {
                            if let Some(copy) = direct_copy(table, *target, *value) {
                                out.push((stmt_id, copy));
                            }
                        }
                    }
                }
            }
            _ => {}
        }
    }
    out
}

/// Block-granularity transfer function for the fixpoint: applies the
/// block's statements' kills to `in_set`, then unions in the block's gen.
fn block_transfer(table: &NodeTable, cfg: &Cfg, bb: BlockId, in_set: &Set<CopyFact>, gens: &[(NodeId, CopyFact)]) -> Set<CopyFact> {
    let mut live = in_set.clone();
    for &stmt_id in &cfg.block(bb).stmts {
        let mut defined = Set::new();
        let mut has_call = false;
        defined_and_called(table, stmt_id, &mut defined, &mut has_call);
        if has_call {
            live.clear();
        }
        live.retain(|(t, s)| !defined.contains(t) && !defined.contains(s));
        if let Some((_, copy)) = gens.iter().find(|(id, _)| *id == stmt_id) {
            live.insert(copy.clone());
        }
    }
    live
}

/// Walks `bb`'s statements rewriting identifier uses of a copy's target to
/// its source, replaying gen/kill statement-by-statement from `entry_copies`
/// so a copy generated mid-block is available to later statements in the
/// same block but not to earlier ones.
fn rewrite_block(table: &mut NodeTable, cfg: &Cfg, bb: BlockId, entry_copies: Set<CopyFact>) -> usize {
    let mut live = entry_copies;
    let mut changed = 0;
    for &stmt_id in &cfg.block(bb).stmts {
        changed += rewrite_stmt_uses(table, stmt_id, &live);

        let mut defined = Set::new();
        let mut has_call = false;
        defined_and_called(table, stmt_id, &mut defined, &mut has_call);
        if has_call {
            live.clear();
        }
        live.retain(|(t, s)| !defined.contains(t) && !defined.contains(s));

        let Some(stmt) = table.try_get(stmt_id).and_then(|n| n.as_stmt()) else { continue };
        match &stmt.kind {
            StmtKind::VariableDeclaration { declarators, .. } => {
                for d in declarators {
                    if let Some(init) = d.init {
                        if let Some(copy) = direct_copy(table, d.id, init) {
                            live.insert(copy);
                        }
                    }
                }
            }
            StmtKind::Expression(expr_id) => {
                if let Some(expr) = table.try_get(*expr_id).and_then(|n| n.as_expr()) {
                    if let ExprKind::Assignment { op, target, value } = &expr.kind {
                        if op.is_plain() {
                            if let Some(copy) = direct_copy(table, *target, *value) {
                                live.insert(copy);
                            }
                        }
                    }
                }
            }
            _ => {}
        }
    }
    changed
}

/// Rewrites every identifier *use* within `stmt_id` (not its definition
/// targets) to its copy source when available, skipping the RHS of a
/// statement's own direct-copy assignment so `x = y;` never self-rewrites.
fn rewrite_stmt_uses(table: &mut NodeTable, stmt_id: NodeId, live: &Set<CopyFact>) -> usize {
    let Some(stmt) = table.try_get(stmt_id).and_then(|n| n.as_stmt()).cloned() else { return 0 };
    match &stmt.kind {
        StmtKind::VariableDeclaration { declarators, .. } => {
            let mut n = 0;
            for d in declarators {
                if let Some(init) = d.init {
                    if direct_copy(table, d.id, init).is_none() {
                        n += rewrite_expr_uses(table, init, live);
                    }
                }
            }
            n
        }
        StmtKind::Expression(expr_id) => rewrite_expr_uses(table, *expr_id, live),
        StmtKind::Return(Some(e)) | StmtKind::Throw(e) => rewrite_expr_uses(table, *e, live),
        _ => 0,
    }
}

fn rewrite_expr_uses(table: &mut NodeTable, expr_id: NodeId, live: &Set<CopyFact>) -> usize {
    let Some(expr) = table.try_get(expr_id).and_then(|n| n.as_expr()).cloned() else { return 0 };
    match expr.kind {
        ExprKind::Identifier(ref name) => {
            if let Some((_, source)) = live.iter().find(|(t, _)| t == name) {
                let rewritten = Node::Expr(Expr { node_id: expr_id, loc: expr.loc, kind: ExprKind::Identifier(source.clone()) });
                table.insert(expr_id, rewritten);
                1
            } else {
                0
            }
        }
        ExprKind::Assignment { target, value, op } => {
            // The top-level RHS of a direct copy is the one use this pass
            // must leave alone (propagating into it would rewrite `x = y;`
            // into `x = x;` once `y` itself became a tracked copy source).
            let is_self_copy = op == AssignOp::Assign && direct_copy(table, target, value).is_some();
            if is_self_copy {
                0
            } else {
                rewrite_expr_uses(table, value, live)
            }
        }
        ExprKind::Binary { left, right, .. } | ExprKind::Logical { left, right, .. } => {
            rewrite_expr_uses(table, left, live) + rewrite_expr_uses(table, right, live)
        }
        ExprKind::Unary { arg, .. } | ExprKind::Spread(arg) => rewrite_expr_uses(table, arg, live),
        // `arg` is the lvalue being incremented/decremented, not a use --
        // rewriting it to a copy source would redirect the side effect onto
        // the wrong variable.
        ExprKind::Update { .. } => 0,
        ExprKind::Conditional { test, cons, alt } => {
            rewrite_expr_uses(table, test, live) + rewrite_expr_uses(table, cons, live) + rewrite_expr_uses(table, alt, live)
        }
        ExprKind::Call { callee, args, .. } => {
            let mut n = rewrite_expr_uses(table, callee, live);
            for a in args {
                n += rewrite_expr_uses(table, a, live);
            }
            n
        }
        ExprKind::New { callee, args } => {
            let mut n = rewrite_expr_uses(table, callee, live);
            for a in args {
                n += rewrite_expr_uses(table, a, live);
            }
            n
        }
        ExprKind::Member { object, property, computed, .. } => {
            let mut n = rewrite_expr_uses(table, object, live);
            if computed {
                n += rewrite_expr_uses(table, property, live);
            }
            n
        }
        ExprKind::Sequence(exprs) => exprs.into_iter().map(|e| rewrite_expr_uses(table, e, live)).sum(),
        ExprKind::Array { elements } => elements.into_iter().flatten().map(|e| rewrite_expr_uses(table, e, live)).sum(),
        ExprKind::Object { properties } => properties.into_iter().map(|p| rewrite_expr_uses(table, p, live)).sum(),
        ExprKind::Property { value, computed, key, .. } => {
            let mut n = if computed { rewrite_expr_uses(table, key, live) } else { 0 };
            n += rewrite_expr_uses(table, value, live);
            n
        }
        _ => 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{Declarator, Literal, NodeTable, VarKind};
    use crate::passes::PassManager;

    fn run_copy_prop(table: NodeTable, body: Vec<NodeId>) -> ProgramState {
        let state = ProgramState::build(table, body).unwrap();
        let manager = PassManager::build(vec![Box::new(CopyPropagation::default())]).unwrap();
        manager.run(state).unwrap().final_state
    }

    #[test]
    fn chained_copies_propagate_to_the_final_use() {
        let mut table = NodeTable::new();
        let a = table.intern("a");
        let b = table.intern("b");
        let c = table.intern("c");

        let one = table.make_literal(Literal::Number(1.0), None);
        let a_pat = table.make_identifier_pattern(a.clone(), None);
        let decl_a = table.make_var_decl(VarKind::Var, vec![Declarator { id: a_pat, init: Some(one) }], None);

        let a_use = table.make_identifier(a.clone(), None);
        let b_pat = table.make_identifier_pattern(b.clone(), None);
        let decl_b = table.make_var_decl(VarKind::Var, vec![Declarator { id: b_pat, init: Some(a_use) }], None);

        let b_use = table.make_identifier(b.clone(), None);
        let c_pat = table.make_identifier_pattern(c.clone(), None);
        let decl_c = table.make_var_decl(VarKind::Var, vec![Declarator { id: c_pat, init: Some(b_use) }], None);

        let c_use = table.make_identifier(c.clone(), None);
        let ret = table.make_return(Some(c_use), None);

        let final_state = run_copy_prop(table, vec![decl_a, decl_b, decl_c, ret]);
        let ret_stmt = final_state.table.get(ret).as_stmt().unwrap();
        let StmtKind::Return(Some(value)) = ret_stmt.kind else { panic!() };
        let Node::Expr(Expr { kind: ExprKind::Identifier(name), .. }) = final_state.table.get(value) else {
            panic!("expected an identifier")
        };
        assert_eq!(name.as_str(), "a");
    }

    #[test]
    fn a_call_between_the_copy_and_its_use_kills_it() {
        let mut table = NodeTable::new();
        let a = table.intern("a");
        let b = table.intern("b");
        let f = table.intern("f");

        let one = table.make_literal(Literal::Number(1.0), None);
        let a_pat = table.make_identifier_pattern(a.clone(), None);
        let decl_a = table.make_var_decl(VarKind::Var, vec![Declarator { id: a_pat, init: Some(one) }], None);

        let a_use = table.make_identifier(a.clone(), None);
        let b_pat = table.make_identifier_pattern(b.clone(), None);
        let decl_b = table.make_var_decl(VarKind::Var, vec![Declarator { id: b_pat, init: Some(a_use) }], None);

        let f_id = table.make_identifier(f.clone(), None);
        let call = table.make_call(f_id, vec![], false, None);
        let call_stmt = table.make_expression_stmt(call, None);

        let b_use = table.make_identifier(b.clone(), None);
        let ret = table.make_return(Some(b_use), None);

        let final_state = run_copy_prop(table, vec![decl_a, decl_b, call_stmt, ret]);
        let ret_stmt = final_state.table.get(ret).as_stmt().unwrap();
        let StmtKind::Return(Some(value)) = ret_stmt.kind else { panic!() };
        let Node::Expr(Expr { kind: ExprKind::Identifier(name), .. }) = final_state.table.get(value) else {
            panic!("expected an identifier")
        };
        // `b` itself was never redefined by the call, so the use of `b`
        // survives -- but propagation through to `a` is blocked by the
        // conservative call-kill (§4.6), so the use still reads `b`.
        assert_eq!(name.as_str(), "b");
    }
}
