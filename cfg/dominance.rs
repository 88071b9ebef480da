//! Dominance, post-dominance and natural-loop discovery.
//!
//! The dominator computation is the textbook naive iterative fixpoint
//! (`Dom(n) = {n} ∪ ⋂ Dom(p)` over n's predecessors, starting from
//! `Dom(entry) = {entry}` and everything else at "all blocks") run to a
//! fixpoint over reverse postorder. A real compiler would reach for
//! Lengauer-Tarjan; the IR sizes this crate expects (single functions from
//! deobfuscated JS) make the naive algorithm's O(n^2) worst case a
//! non-issue, and it is far easier to read and to validate by inspection.

use std::collections::{BTreeMap as Map, BTreeSet as Set};

use super::{BlockId, Cfg};

#[derive(Clone, Debug)]
pub struct Dominance {
    pub dominators: Map<BlockId, Set<BlockId>>,
    pub idom: Map<BlockId, BlockId>,
    pub frontier: Map<BlockId, Set<BlockId>>,
    pub children: Map<BlockId, Vec<BlockId>>,
}

impl Dominance {
    pub fn dominates(&self, a: BlockId, b: BlockId) -> bool {
        self.dominators.get(&b).map(|d| d.contains(&a)).unwrap_or(false)
    }

    pub fn strictly_dominates(&self, a: BlockId, b: BlockId) -> bool {
        a != b && self.dominates(a, b)
    }
}

/// Computes forward dominance from `cfg.entry`.
pub fn dominators(cfg: &Cfg) -> Dominance {
    compute(cfg, cfg.entry, |bb| cfg.pred(bb).collect(), |bb| cfg.succ_ids(bb).collect())
}

/// Computes post-dominance: dominance over the CFG with every edge
/// reversed, rooted at `cfg.exit`.
pub fn post_dominators(cfg: &Cfg) -> Dominance {
    compute(cfg, cfg.exit, |bb| cfg.succ_ids(bb).collect(), |bb| cfg.pred(bb).collect())
}

fn compute(
    cfg: &Cfg,
    root: BlockId,
    preds_of: impl Fn(BlockId) -> Vec<BlockId>,
    succs_of: impl Fn(BlockId) -> Vec<BlockId>,
) -> Dominance {
    let all_blocks: Set<BlockId> = cfg.block_ids().collect();

    let mut dom: Map<BlockId, Set<BlockId>> = Map::new();
    for &bb in &all_blocks {
        if bb == root {
            dom.insert(bb, Set::from([bb]));
        } else {
            dom.insert(bb, all_blocks.clone());
        }
    }

    // Reverse postorder of the traversal implied by `succs_of`, for fast
    // convergence; order doesn't affect correctness, only iteration count.
    let order = postorder_from(root, &succs_of);

    let mut changed = true;
    while changed {
        changed = false;
        for &bb in order.iter().rev() {
            if bb == root {
                continue;
            }
            let preds = preds_of(bb);
            let mut new_dom: Option<Set<BlockId>> = None;
            for p in preds {
                let pdom = dom.get(&p).cloned().unwrap_or_default();
                new_dom = Some(match new_dom {
                    None => pdom,
                    Some(acc) => acc.intersection(&pdom).copied().collect(),
                });
            }
            let mut new_dom = new_dom.unwrap_or_default();
            new_dom.insert(bb);
            if dom.get(&bb) != Some(&new_dom) {
                dom.insert(bb, new_dom);
                changed = true;
            }
        }
    }

    let idom = immediate_dominators(&dom, root);
    let children = dominator_tree_children(&idom);
    let frontier = dominance_frontier(&all_blocks, &idom, &preds_of);

    Dominance { dominators: dom, idom, frontier, children }
}

fn postorder_from(root: BlockId, succs_of: &impl Fn(BlockId) -> Vec<BlockId>) -> Vec<BlockId> {
    let mut visited = Set::new();
    let mut order = Vec::new();
    let mut stack = vec![(root, false)];
    while let Some((bb, expanded)) = stack.pop() {
        if expanded {
            order.push(bb);
            continue;
        }
        if !visited.insert(bb) {
            continue;
        }
        stack.push((bb, true));
        for succ in succs_of(bb) {
            if !visited.contains(&succ) {
                stack.push((succ, false));
            }
        }
    }
    order
}

fn immediate_dominators(dom: &Map<BlockId, Set<BlockId>>, root: BlockId) -> Map<BlockId, BlockId> {
    let mut idom = Map::new();
    for (&bb, doms) in dom {
        if bb == root {
            continue;
        }
        // idom(bb) is the strict dominator closest to bb: the one that is
        // itself dominated by every other strict dominator.
        let strict: Vec<BlockId> = doms.iter().copied().filter(|&d| d != bb).collect();
        let candidate = strict
            .iter()
            .copied()
            .find(|&cand| strict.iter().all(|&other| other == cand || dom[&cand].contains(&other)));
        if let Some(cand) = candidate {
            idom.insert(bb, cand);
        }
    }
    idom
}

fn dominator_tree_children(idom: &Map<BlockId, BlockId>) -> Map<BlockId, Vec<BlockId>> {
    let mut children: Map<BlockId, Vec<BlockId>> = Map::new();
    for (&bb, &parent) in idom {
        children.entry(parent).or_default().push(bb);
    }
    children
}

fn dominance_frontier(
    all_blocks: &Set<BlockId>,
    idom: &Map<BlockId, BlockId>,
    preds_of: &impl Fn(BlockId) -> Vec<BlockId>,
) -> Map<BlockId, Set<BlockId>> {
    let mut frontier: Map<BlockId, Set<BlockId>> = all_blocks.iter().map(|&b| (b, Set::new())).collect();
    for &bb in all_blocks {
        let preds = preds_of(bb);
        if preds.len() < 2 {
            continue;
        }
        for p in preds {
            let mut runner = p;
            while Some(&runner) != idom.get(&bb) && runner != bb {
                frontier.entry(runner).or_default().insert(bb);
                match idom.get(&runner) {
                    Some(&next) if next != runner => runner = next,
                    _ => break,
                }
            }
        }
    }
    frontier
}

/// A natural loop discovered from a back-edge `tail -> header` where
/// `header` dominates `tail`: the header plus every block that can reach
/// `tail` without going through `header`.
#[derive(Clone, Debug)]
pub struct NaturalLoop {
    pub header: BlockId,
    pub body: Set<BlockId>,
}

pub fn natural_loops(cfg: &Cfg, dom: &Dominance) -> Vec<NaturalLoop> {
    let mut loops = Vec::new();
    for &header in &cfg.loop_headers {
        for tail in cfg.pred(header).collect::<Vec<_>>() {
            if !dom.dominates(header, tail) {
                continue;
            }
            let mut body = Set::from([header]);
            let mut stack = vec![tail];
            while let Some(bb) = stack.pop() {
                if body.insert(bb) {
                    for p in cfg.pred(bb) {
                        stack.push(p);
                    }
                }
            }
            loops.push(NaturalLoop { header, body });
        }
    }
    loops
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cfg::CfgBuilder;
    use crate::ir::{Literal, NodeTable};

    #[test]
    fn entry_dominates_everything() {
        let mut t = NodeTable::new();
        let c = t.make_identifier(t.intern("c"), None);
        let r1 = t.make_return(Some(t.make_literal(Literal::Number(1.0), None)), None);
        let b1 = t.make_block(vec![r1], None);
        let r2 = t.make_return(Some(t.make_literal(Literal::Number(2.0), None)), None);
        let b2 = t.make_block(vec![r2], None);
        let iff = t.make_if(c, b1, Some(b2), None);
        let cfg = CfgBuilder::new(&t).build(&[iff]).unwrap();

        let dom = dominators(&cfg);
        for bb in cfg.block_ids() {
            assert!(dom.dominates(cfg.entry, bb));
        }
    }

    #[test]
    fn loop_header_dominates_its_body() {
        let mut t = NodeTable::new();
        let cond = t.make_identifier(t.intern("cond"), None);
        let body = t.make_block(vec![t.make_empty(None)], None);
        let while_stmt = t.make_while(cond, body, None);
        let cfg = CfgBuilder::new(&t).build(&[while_stmt]).unwrap();

        let dom = dominators(&cfg);
        let header = *cfg.loop_headers.iter().next().unwrap();
        let loops = natural_loops(&cfg, &dom);
        assert!(loops.iter().any(|l| l.header == header && l.body.len() >= 1));
    }
}
