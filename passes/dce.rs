//! Dead code elimination (§4.7): requires CFG and SSA. A "variable" here
//! means one SSA version -- per §8's boundary behavior, a single assignment
//! is dead iff unused and side-effect-free, independent of any other
//! version of the same source name. Phases: def-use collection (reusing the
//! use-def chains SSA construction already built), reachability, escape
//! analysis, dead-code identification, and rewrite.

use std::collections::{BTreeMap as Map, BTreeSet as Set};

use serde::{Deserialize, Serialize};

use crate::cfg::{BlockId, Cfg};
use crate::ir::{ForInit, Name, Node, NodeId, NodeTable, SsaOperand, Stmt, StmtKind};

use super::{Pass, PassMetrics, PassOptions, PassOutcome, ProgramState};

/// Configuration toggles for each removal class (§4.7).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DceOptions {
    pub unused_variables: bool,
    pub unreachable_code: bool,
    pub empty_statements: bool,
    pub unused_functions: bool,
    /// Reserved for a future, more aggressive removal policy (e.g. dropping
    /// declarators whose side-effecting initializer is provably pure); the
    /// baseline rewrite rules in this pass don't yet consult it.
    pub aggressive: bool,
}

impl Default for DceOptions {
    fn default() -> Self {
        Self {
            unused_variables: true,
            unreachable_code: true,
            empty_statements: true,
            unused_functions: true,
            aggressive: false,
        }
    }
}

pub struct DeadCodeElimination {
    pub options: PassOptions,
    pub dce: DceOptions,
}

impl Default for DeadCodeElimination {
    fn default() -> Self {
        Self { options: PassOptions::default(), dce: DceOptions::default() }
    }
}

impl Pass for DeadCodeElimination {
    fn name(&self) -> &'static str {
        "dead-code-elimination"
    }

    fn description(&self) -> &'static str {
        "Removes unreachable blocks and unused SSA-versioned definitions"
    }

    fn dependencies(&self) -> &'static [&'static str] {
        &[]
    }

    fn requires_ssa(&self) -> bool {
        true
    }

    fn options(&self) -> &PassOptions {
        &self.options
    }

    fn run(&self, state: &ProgramState) -> PassOutcome {
        let mut metrics = PassMetrics::default();
        let Some(ssa) = &state.ssa else {
            return PassOutcome::unchanged(state, metrics);
        };
        let cfg = &state.cfg;

        let mut next_table = state.table.clone();
        let mut nodes_changed = 0usize;
        let mut invalidates_cfg = false;

        if self.dce.unreachable_code {
            let reachable = reachable_blocks(cfg);
            let removed = blank_unreachable(&mut next_table, cfg, &reachable);
            if removed > 0 {
                nodes_changed += removed;
                invalidates_cfg = true;
            }
        }

        if self.dce.unused_variables {
            let owners = build_def_owners(&next_table, cfg);
            let phi_uses = phi_operand_uses(&next_table, &ssa.phi_blocks);
            let captured = names_captured_by_closures(&next_table, &state.body);
            for (key, site_id) in &ssa.chains.defs {
                metrics.nodes_visited += 1;
                let used = ssa.chains.uses.get(key).is_some_and(|s| !s.is_empty())
                    || phi_uses.contains(key)
                    || captured.contains(&key.0);
                if used {
                    continue;
                }
                nodes_changed += remove_dead_def(&mut next_table, &owners, *site_id);
            }
        }

        if self.dce.unused_functions {
            let captured = names_captured_by_closures(&next_table, &state.body);
            nodes_changed += remove_unused_functions(&mut next_table, cfg, &state.body, &captured);
        }

        let mut next_body = state.body.clone();
        if self.dce.empty_statements {
            let before = next_body.len();
            next_table = strip_empty_statements(next_table, &mut next_body);
            nodes_changed += before.saturating_sub(next_body.len());
        }

        metrics.nodes_changed = nodes_changed;
        metrics.memory_nodes = next_table.len();

        PassOutcome {
            table: next_table,
            body: next_body,
            changed: nodes_changed > 0,
            invalidates_cfg,
            metrics,
            warnings: Vec::new(),
            errors: Vec::new(),
        }
    }
}

// SECTION: reachability (§4.7 phase 3)

fn reachable_blocks(cfg: &Cfg) -> Set<BlockId> {
    let mut seen = Set::new();
    let mut stack = vec![cfg.entry];
    seen.insert(cfg.entry);
    while let Some(bb) = stack.pop() {
        for succ in cfg.succ_ids(bb) {
            if seen.insert(succ) {
                stack.push(succ);
            }
        }
    }
    seen
}

fn blank_unreachable(table: &mut NodeTable, cfg: &Cfg, reachable: &Set<BlockId>) -> usize {
    let mut n = 0;
    for bb in cfg.block_ids() {
        if reachable.contains(&bb) {
            continue;
        }
        for &stmt_id in &cfg.block(bb).stmts {
            blank_stmt(table, stmt_id);
            n += 1;
        }
    }
    n
}

fn blank_stmt(table: &mut NodeTable, stmt_id: NodeId) {
    if let Some(stmt) = table.try_get(stmt_id).and_then(|n| n.as_stmt()).cloned() {
        if matches!(stmt.kind, StmtKind::Empty) {
            return;
        }
        table.insert(stmt_id, Node::Stmt(Stmt { node_id: stmt_id, loc: stmt.loc, kind: StmtKind::Empty }));
    }
}

// SECTION: dead-variable identification and removal (§4.7 phases 1, 5, 6)

/// Where a tracked SSA definition's site id (a declarator pattern, an
/// assignment target pattern, or an `Update` expression) actually lives in
/// the statement tree, and what shape of rewrite removing it requires.
enum DefShape {
    Declarator(usize),
    Assignment,
    Update,
}

struct DefSite {
    stmt_id: NodeId,
    shape: DefShape,
}

fn build_def_owners(table: &NodeTable, cfg: &Cfg) -> Map<NodeId, DefSite> {
    let mut owners = Map::new();
    for bb in cfg.block_ids() {
        for &stmt_id in &cfg.block(bb).stmts {
            record_def_owner(table, stmt_id, &mut owners);
        }
    }
    owners
}

fn record_def_owner(table: &NodeTable, stmt_id: NodeId, owners: &mut Map<NodeId, DefSite>) {
    let Some(stmt) = table.try_get(stmt_id).and_then(|n| n.as_stmt()) else { return };
    match &stmt.kind {
        StmtKind::VariableDeclaration { declarators, .. } => {
            for (i, d) in declarators.iter().enumerate() {
                owners.insert(d.id, DefSite { stmt_id, shape: DefShape::Declarator(i) });
            }
        }
        StmtKind::Expression(expr_id) => {
            if let Some(expr) = table.try_get(*expr_id).and_then(|n| n.as_expr()) {
                match &expr.kind {
                    crate::ir::ExprKind::Assignment { target, .. } => {
                        owners.insert(*target, DefSite { stmt_id, shape: DefShape::Assignment });
                    }
                    crate::ir::ExprKind::Update { .. } => {
                        owners.insert(*expr_id, DefSite { stmt_id, shape: DefShape::Update });
                    }
                    _ => {}
                }
            }
        }
        StmtKind::For { init: Some(ForInit::VarDecl { declarators, .. }), .. } => {
            for (i, d) in declarators.iter().enumerate() {
                owners.insert(d.id, DefSite { stmt_id, shape: DefShape::Declarator(i) });
            }
        }
        _ => {}
    }
}

/// Rewrites the def's owning statement in place to drop it, respecting
/// side effects (§4.7 phases 5-6): a side-effect-free dead def disappears
/// entirely (or, for one declarator among several, just that declarator);
/// a side-effecting one is preserved as a bare expression statement.
fn remove_dead_def(table: &mut NodeTable, owners: &Map<NodeId, DefSite>, site_id: NodeId) -> usize {
    let Some(site) = owners.get(&site_id) else { return 0 };
    match site.shape {
        DefShape::Update => {
            // A dead increment/decrement has no effect beyond producing a
            // value nothing reads; removing it changes no observable trace.
            blank_stmt(table, site.stmt_id);
            1
        }
        DefShape::Assignment => {
            let Some(stmt) = table.try_get(site.stmt_id).and_then(|n| n.as_stmt()).cloned() else { return 0 };
            let StmtKind::Expression(expr_id) = stmt.kind else { return 0 };
            let Some(expr) = table.try_get(expr_id).and_then(|n| n.as_expr()).cloned() else { return 0 };
            let crate::ir::ExprKind::Assignment { value, .. } = expr.kind else { return 0 };
            if has_side_effects(table, value) {
                let rewritten =
                    Node::Stmt(Stmt { node_id: site.stmt_id, loc: stmt.loc, kind: StmtKind::Expression(value) });
                table.insert(site.stmt_id, rewritten);
            } else {
                blank_stmt(table, site.stmt_id);
            }
            1
        }
        DefShape::Declarator(index) => {
            let Some(stmt) = table.try_get(site.stmt_id).and_then(|n| n.as_stmt()).cloned() else { return 0 };
            let StmtKind::VariableDeclaration { kind, mut declarators } = stmt.kind else { return 0 };
            if index >= declarators.len() {
                return 0;
            }
            let side_effectful =
                declarators[index].init.is_some_and(|init| has_side_effects(table, init));
            if side_effectful {
                if declarators.len() == 1 {
                    let init = declarators[0].init.expect("side-effect check only true when init is Some");
                    let rewritten =
                        Node::Stmt(Stmt { node_id: site.stmt_id, loc: stmt.loc, kind: StmtKind::Expression(init) });
                    table.insert(site.stmt_id, rewritten);
                    1
                } else {
                    // Scope limitation: dropping one declarator from a
                    // multi-declarator statement while preserving another
                    // declarator's side-effecting initializer would require
                    // splitting one statement into two, which needs access
                    // to the statement's parent list; left untouched.
                    0
                }
            } else {
                declarators.remove(index);
                let rewritten_kind = if declarators.is_empty() {
                    StmtKind::Empty
                } else {
                    StmtKind::VariableDeclaration { kind, declarators }
                };
                table.insert(site.stmt_id, Node::Stmt(Stmt { node_id: site.stmt_id, loc: stmt.loc, kind: rewritten_kind }));
                1
            }
        }
    }
}

fn has_side_effects(table: &NodeTable, expr_id: NodeId) -> bool {
    use crate::ir::ExprKind;
    let Some(expr) = table.try_get(expr_id).and_then(|n| n.as_expr()) else { return false };
    match &expr.kind {
        ExprKind::Call { .. } | ExprKind::New { .. } | ExprKind::Update { .. } => true,
        ExprKind::Assignment { value, .. } => has_side_effects(table, *value),
        ExprKind::Binary { left, right, .. } | ExprKind::Logical { left, right, .. } => {
            has_side_effects(table, *left) || has_side_effects(table, *right)
        }
        ExprKind::Unary { arg, .. } | ExprKind::Spread(arg) => has_side_effects(table, *arg),
        ExprKind::Conditional { test, cons, alt } => {
            has_side_effects(table, *test) || has_side_effects(table, *cons) || has_side_effects(table, *alt)
        }
        ExprKind::Member { object, property, computed, .. } => {
            has_side_effects(table, *object) || (*computed && has_side_effects(table, *property))
        }
        ExprKind::Sequence(exprs) => exprs.iter().any(|e| has_side_effects(table, *e)),
        ExprKind::Array { elements } => elements.iter().flatten().any(|e| has_side_effects(table, *e)),
        ExprKind::Object { properties } => properties.iter().any(|p| has_side_effects(table, *p)),
        ExprKind::Property { key, value, computed, .. } => {
            (*computed && has_side_effects(table, *key)) || has_side_effects(table, *value)
        }
        _ => false,
    }
}

/// A phi operand referencing `(var, version)` is a use that SSA renaming
/// (deliberately) doesn't record in `UseDefChains::uses` -- see `ssa::rename_block`'s
/// phi-operand wiring loop -- so a definition only the phi reads would
/// otherwise look dead and be removed out from under a live phi.
fn phi_operand_uses(table: &NodeTable, phi_blocks: &Map<BlockId, Vec<NodeId>>) -> Set<(Name, crate::ir::SsaVersion)> {
    let mut used = Set::new();
    for phis in phi_blocks.values() {
        for &phi_id in phis {
            if let Some(phi) = table.try_get(phi_id).and_then(|n| n.as_phi()) {
                for operand in phi.operands.values() {
                    if let SsaOperand::Version(v) = operand {
                        used.insert((phi.var.clone(), *v));
                    }
                }
            }
        }
    }
    used
}

// SECTION: escape analysis and unused-function removal (§4.7 phases 4-5)

/// Names referenced anywhere inside a nested `FunctionDeclaration` body,
/// treated as escaping (§4.7's "captured by a closure"). This is a coarse
/// over-approximation -- it doesn't distinguish a genuinely free variable
/// from the closure's own locals that happen to share a name, and it
/// doesn't propagate through a closure that is itself unused (§9's open
/// item) -- but it never under-approximates, so a live capture is never
/// mistaken for dead.
fn names_captured_by_closures(table: &NodeTable, top_body: &[NodeId]) -> Set<Name> {
    let mut captured = Set::new();
    collect_function_body_identifiers(table, top_body, &mut captured);
    captured
}

fn collect_function_body_identifiers(table: &NodeTable, stmts: &[NodeId], out: &mut Set<Name>) {
    for &id in stmts {
        let Some(stmt) = table.try_get(id).and_then(|n| n.as_stmt()) else { continue };
        if let StmtKind::FunctionDeclaration { body, .. } = &stmt.kind {
            collect_all_identifiers(table, *body, None, out);
        }
        descend_for_nested_functions(table, id, out);
    }
}

fn descend_for_nested_functions(table: &NodeTable, stmt_id: NodeId, out: &mut Set<Name>) {
    let Some(stmt) = table.try_get(stmt_id).and_then(|n| n.as_stmt()) else { return };
    match &stmt.kind {
        StmtKind::Block { body, .. } => collect_function_body_identifiers(table, body, out),
        StmtKind::If { cons, alt, .. } => {
            collect_function_body_identifiers(table, &[*cons], out);
            if let Some(a) = alt {
                collect_function_body_identifiers(table, &[*a], out);
            }
        }
        StmtKind::While { body, .. } | StmtKind::For { body, .. } => {
            collect_function_body_identifiers(table, &[*body], out)
        }
        StmtKind::Try { block, handler, finalizer } => {
            collect_function_body_identifiers(table, &[*block], out);
            if let Some(h) = handler {
                collect_function_body_identifiers(table, &[h.body], out);
            }
            if let Some(f) = finalizer {
                collect_function_body_identifiers(table, &[*f], out);
            }
        }
        StmtKind::Switch { cases, .. } => {
            for case in cases {
                collect_function_body_identifiers(table, &case.consequent, out);
            }
        }
        StmtKind::Labeled { body, .. } => collect_function_body_identifiers(table, &[*body], out),
        StmtKind::FunctionDeclaration { body, .. } => collect_function_body_identifiers(table, &[*body], out),
        _ => {}
    }
}

fn remove_unused_functions(
    table: &mut NodeTable,
    cfg: &Cfg,
    top_body: &[NodeId],
    captured: &Set<Name>,
) -> usize {
    let mut decls: Vec<(NodeId, Name, NodeId)> = Vec::new();
    for bb in cfg.block_ids() {
        for &stmt_id in &cfg.block(bb).stmts {
            if let Some(stmt) = table.try_get(stmt_id).and_then(|n| n.as_stmt()) {
                if let StmtKind::FunctionDeclaration { id: Some(name), body, .. } = &stmt.kind {
                    decls.push((stmt_id, name.clone(), *body));
                }
            }
        }
    }

    let mut removed = 0;
    for (stmt_id, name, body) in decls {
        if captured.contains(&name) {
            continue;
        }
        let mut refs = Set::new();
        for &id in top_body {
            collect_all_identifiers(table, id, Some(body), &mut refs);
        }
        if !refs.contains(&name) {
            blank_stmt(table, stmt_id);
            removed += 1;
        }
    }
    removed
}

/// Collects every identifier name referenced within `stmt_id`'s subtree,
/// skipping the subtree rooted at `exclude` entirely -- used to ask "is
/// `name` referenced other than self-referentially from within its own
/// body" (§4.7 phase 5).
fn collect_all_identifiers(table: &NodeTable, stmt_id: NodeId, exclude: Option<NodeId>, out: &mut Set<Name>) {
    if Some(stmt_id) == exclude {
        return;
    }
    let Some(stmt) = table.try_get(stmt_id).and_then(|n| n.as_stmt()) else { return };
    match &stmt.kind {
        StmtKind::Expression(e) => collect_identifiers_in_expr(table, *e, out),
        StmtKind::VariableDeclaration { declarators, .. } => {
            for d in declarators {
                if let Some(init) = d.init {
                    collect_identifiers_in_expr(table, init, out);
                }
            }
        }
        StmtKind::FunctionDeclaration { body, .. } => collect_all_identifiers(table, *body, exclude, out),
        StmtKind::Return(Some(e)) | StmtKind::Throw(e) => collect_identifiers_in_expr(table, *e, out),
        StmtKind::If { test, cons, alt } => {
            collect_identifiers_in_expr(table, *test, out);
            collect_all_identifiers(table, *cons, exclude, out);
            if let Some(a) = alt {
                collect_all_identifiers(table, *a, exclude, out);
            }
        }
        StmtKind::While { test, body } => {
            collect_identifiers_in_expr(table, *test, out);
            collect_all_identifiers(table, *body, exclude, out);
        }
        StmtKind::For { init, test, update, body } => {
            match init {
                Some(ForInit::Expr(e)) => collect_identifiers_in_expr(table, *e, out),
                Some(ForInit::VarDecl { declarators, .. }) => {
                    for d in declarators {
                        if let Some(init) = d.init {
                            collect_identifiers_in_expr(table, init, out);
                        }
                    }
                }
                None => {}
            }
            if let Some(t) = test {
                collect_identifiers_in_expr(table, *t, out);
            }
            if let Some(u) = update {
                collect_identifiers_in_expr(table, *u, out);
            }
            collect_all_identifiers(table, *body, exclude, out);
        }
        StmtKind::Block { body, .. } => {
            for &s in body {
                collect_all_identifiers(table, s, exclude, out);
            }
        }
        StmtKind::Try { block, handler, finalizer } => {
            collect_all_identifiers(table, *block, exclude, out);
            if let Some(h) = handler {
                collect_all_identifiers(table, h.body, exclude, out);
            }
            if let Some(f) = finalizer {
                collect_all_identifiers(table, *f, exclude, out);
            }
        }
        StmtKind::Switch { discriminant, cases } => {
            collect_identifiers_in_expr(table, *discriminant, out);
            for case in cases {
                if let Some(t) = case.test {
                    collect_identifiers_in_expr(table, t, out);
                }
                for &s in &case.consequent {
                    collect_all_identifiers(table, s, exclude, out);
                }
            }
        }
        StmtKind::Labeled { body, .. } => collect_all_identifiers(table, *body, exclude, out),
        _ => {}
    }
}

fn collect_identifiers_in_expr(table: &NodeTable, expr_id: NodeId, out: &mut Set<Name>) {
    use crate::ir::ExprKind;
    let Some(expr) = table.try_get(expr_id).and_then(|n| n.as_expr()) else { return };
    match &expr.kind {
        ExprKind::Identifier(name) => {
            out.insert(name.clone());
        }
        ExprKind::SsaIdentifier { original_name, .. } => {
            out.insert(original_name.clone());
        }
        ExprKind::Binary { left, right, .. } | ExprKind::Logical { left, right, .. } => {
            collect_identifiers_in_expr(table, *left, out);
            collect_identifiers_in_expr(table, *right, out);
        }
        ExprKind::Unary { arg, .. } | ExprKind::Spread(arg) => collect_identifiers_in_expr(table, *arg, out),
        ExprKind::Update { arg, .. } => collect_identifiers_in_expr(table, *arg, out),
        ExprKind::Assignment { target, value, .. } => {
            collect_identifiers_in_expr(table, *target, out);
            collect_identifiers_in_expr(table, *value, out);
        }
        ExprKind::Conditional { test, cons, alt } => {
            collect_identifiers_in_expr(table, *test, out);
            collect_identifiers_in_expr(table, *cons, out);
            collect_identifiers_in_expr(table, *alt, out);
        }
        ExprKind::Call { callee, args, .. } => {
            collect_identifiers_in_expr(table, *callee, out);
            for a in args {
                collect_identifiers_in_expr(table, *a, out);
            }
        }
        ExprKind::New { callee, args } => {
            collect_identifiers_in_expr(table, *callee, out);
            for a in args {
                collect_identifiers_in_expr(table, *a, out);
            }
        }
        ExprKind::Member { object, property, computed, .. } => {
            collect_identifiers_in_expr(table, *object, out);
            if *computed {
                collect_identifiers_in_expr(table, *property, out);
            }
        }
        ExprKind::Sequence(exprs) => {
            for e in exprs {
                collect_identifiers_in_expr(table, *e, out);
            }
        }
        ExprKind::Array { elements } => {
            for e in elements.iter().flatten() {
                collect_identifiers_in_expr(table, *e, out);
            }
        }
        ExprKind::Object { properties } => {
            for p in properties {
                collect_identifiers_in_expr(table, *p, out);
            }
        }
        ExprKind::Property { key, value, computed, .. } => {
            if *computed {
                collect_identifiers_in_expr(table, *key, out);
            }
            collect_identifiers_in_expr(table, *value, out);
        }
        _ => {}
    }
}

// SECTION: empty-statement sweep (§4.7 phase 6 / the `emptyStatements` class)

fn strip_empty_statements(mut table: NodeTable, body: &mut Vec<NodeId>) -> NodeTable {
    body.retain(|&id| !is_empty_stmt(&table, id));
    for &id in body.iter() {
        strip_stmt_subtree(&mut table, id);
    }
    table
}

fn is_empty_stmt(table: &NodeTable, id: NodeId) -> bool {
    matches!(table.try_get(id).and_then(|n| n.as_stmt()), Some(Stmt { kind: StmtKind::Empty, .. }))
}

fn strip_stmt_subtree(table: &mut NodeTable, stmt_id: NodeId) {
    let Some(stmt) = table.try_get(stmt_id).and_then(|n| n.as_stmt()).cloned() else { return };
    match stmt.kind {
        StmtKind::Block { mut body, phis } => {
            body.retain(|&id| !is_empty_stmt(table, id));
            for &id in &body {
                strip_stmt_subtree(table, id);
            }
            table.insert(stmt_id, Node::Stmt(Stmt { node_id: stmt_id, loc: stmt.loc, kind: StmtKind::Block { body, phis } }));
        }
        StmtKind::If { cons, alt, .. } => {
            strip_stmt_subtree(table, cons);
            if let Some(a) = alt {
                strip_stmt_subtree(table, a);
            }
        }
        StmtKind::While { body, .. } | StmtKind::For { body, .. } => strip_stmt_subtree(table, body),
        StmtKind::FunctionDeclaration { body, .. } => strip_stmt_subtree(table, body),
        StmtKind::Try { block, handler, finalizer } => {
            strip_stmt_subtree(table, block);
            if let Some(h) = handler {
                strip_stmt_subtree(table, h.body);
            }
            if let Some(f) = finalizer {
                strip_stmt_subtree(table, f);
            }
        }
        StmtKind::Switch { discriminant, mut cases } => {
            for case in cases.iter_mut() {
                case.consequent.retain(|&id| !is_empty_stmt(table, id));
            }
            for case in &cases {
                for &id in &case.consequent {
                    strip_stmt_subtree(table, id);
                }
            }
            table.insert(
                stmt_id,
                Node::Stmt(Stmt { node_id: stmt_id, loc: stmt.loc, kind: StmtKind::Switch { discriminant, cases } }),
            );
        }
        StmtKind::Labeled { body, .. } => strip_stmt_subtree(table, body),
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{AssignOp, Declarator, Expr, ExprKind, Literal, NodeTable, VarKind};
    use crate::passes::PassManager;

    fn run_dce(table: NodeTable, body: Vec<NodeId>) -> ProgramState {
        let mut state = ProgramState::build(table, body).unwrap();
        state.construct_ssa().unwrap();
        let manager = PassManager::build(vec![Box::new(DeadCodeElimination::default())]).unwrap();
        manager.run(state).unwrap().final_state
    }

    #[test]
    fn side_effect_free_dead_variable_is_removed_entirely() {
        let mut table = NodeTable::new();
        let unused = table.intern("unused");
        let one = table.make_literal(Literal::Number(1.0), None);
        let pat = table.make_identifier_pattern(unused, None);
        let decl = table.make_var_decl(VarKind::Var, vec![Declarator { id: pat, init: Some(one) }], None);
        let ret = table.make_return(None, None);

        let final_state = run_dce(table, vec![decl, ret]);
        assert!(!final_state.body.contains(&decl));
    }

    #[test]
    fn dead_variable_with_a_side_effecting_initializer_keeps_the_call() {
        let mut table = NodeTable::new();
        let d = table.intern("d");
        let expensive = table.intern("expensive");
        let callee = table.make_identifier(expensive, None);
        let call = table.make_call(callee, vec![], false, None);
        let pat = table.make_identifier_pattern(d, None);
        let decl = table.make_var_decl(VarKind::Var, vec![Declarator { id: pat, init: Some(call) }], None);

        let final_state = run_dce(table, vec![decl]);
        let rewritten = final_state.table.get(decl).as_stmt().unwrap();
        assert!(matches!(rewritten.kind, StmtKind::Expression(e) if e == call));
    }

    #[test]
    fn unreachable_code_after_a_return_is_blanked() {
        let mut table = NodeTable::new();
        let one = table.make_literal(Literal::Number(1.0), None);
        let ret = table.make_return(Some(one), None);
        let two = table.make_literal(Literal::Number(2.0), None);
        let dead_ret = table.make_return(Some(two), None);

        let final_state = run_dce(table, vec![ret, dead_ret]);
        let rewritten = final_state.table.get(dead_ret).as_stmt().unwrap();
        assert!(matches!(rewritten.kind, StmtKind::Empty));
    }

    #[test]
    fn a_variable_captured_by_a_nested_closure_is_not_removed() {
        let mut table = NodeTable::new();
        let x = table.intern("x");
        let one = table.make_literal(Literal::Number(1.0), None);
        let x_pat = table.make_identifier_pattern(x.clone(), None);
        let decl = table.make_var_decl(VarKind::Var, vec![Declarator { id: x_pat, init: Some(one) }], None);

        let x_use = table.make_identifier(x.clone(), None);
        let inner_ret = table.make_return(Some(x_use), None);
        let inner_body = table.make_block(vec![inner_ret], None);
        let inner_fn = table.make_function_decl(Some(table.intern("reader")), vec![], inner_body, false, false, None);
        let reader_call_callee = table.make_identifier(table.intern("reader"), None);
        let reader_call = table.make_call(reader_call_callee, vec![], false, None);
        let reader_call_stmt = table.make_expression_stmt(reader_call, None);

        let final_state = run_dce(table, vec![decl, inner_fn, reader_call_stmt]);
        assert!(final_state.body.contains(&decl));
        let stmt = final_state.table.get(decl).as_stmt().unwrap();
        assert!(!matches!(stmt.kind, StmtKind::Empty));
    }

    #[test]
    fn unused_function_declaration_is_removed() {
        let mut table = NodeTable::new();
        let ret = table.make_return(None, None);
        let body = table.make_block(vec![ret], None);
        let unused_fn = table.make_function_decl(Some(table.intern("helper")), vec![], body, false, false, None);
        let keep = table.make_return(None, None);

        let final_state = run_dce(table, vec![unused_fn, keep]);
        assert!(!final_state.body.contains(&unused_fn));
    }

    #[test]
    fn assignment_to_a_dead_variable_is_removed() {
        let mut table = NodeTable::new();
        let x = table.intern("x");
        let one = table.make_literal(Literal::Number(1.0), None);
        let x_pat = table.make_identifier_pattern(x.clone(), None);
        let decl = table.make_var_decl(VarKind::Var, vec![Declarator { id: x_pat, init: Some(one) }], None);

        let x_pat2 = table.make_identifier_pattern(x.clone(), None);
        let two = table.make_literal(Literal::Number(2.0), None);
        let assign = table.make_assignment(AssignOp::Assign, x_pat2, two, None);
        let assign_stmt = table.make_expression_stmt(assign, None);
        let ret = table.make_return(None, None);

        let final_state = run_dce(table, vec![decl, assign_stmt, ret]);
        let rewritten = final_state.table.get(assign_stmt).as_stmt().unwrap();
        assert!(matches!(rewritten.kind, StmtKind::Empty));
        let _ = Expr { node_id: x_pat2, loc: None, kind: ExprKind::Identifier(x) };
    }
}
