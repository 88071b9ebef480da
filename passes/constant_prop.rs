//! Sparse conditional constant propagation over the SSA use-def graph
//! (§4.5): every SSA version is seeded at `Top` and repeatedly re-evaluated
//! from its defining expression until the environment stops changing (or
//! the iteration budget runs out), after which any use whose resolved
//! value clears the confidence threshold is rewritten to a `Literal`.

use std::collections::BTreeMap as Map;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::cfg::Cfg;
use crate::ir::{
    BinOp, Expr, ExprKind, ForInit, Literal, LogicalOp, Name, Node, NodeId, NodeTable, SsaOperand,
    SsaVersion, StmtKind, UnOp, UpdateOp,
};

use super::{Pass, PassMetrics, PassOptions, PassOutcome, ProgramState};

/// Per-family toggles (§4.5): disabling a family forces `Top` for every
/// operator in it, regardless of what the operands evaluate to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConstFamilies {
    pub arithmetic: bool,
    pub string_concat: bool,
    pub boolean: bool,
    pub comparison: bool,
    pub bitwise: bool,
}

impl Default for ConstFamilies {
    fn default() -> Self {
        Self { arithmetic: true, string_concat: true, boolean: true, comparison: true, bitwise: true }
    }
}

#[derive(Clone, Debug, PartialEq)]
enum ConstValue {
    Top,
    Constant(Literal, f64),
    Bottom,
}

impl ConstValue {
    fn meet(&self, other: &ConstValue) -> ConstValue {
        match (self, other) {
            (ConstValue::Top, x) => x.clone(),
            (x, ConstValue::Top) => x.clone(),
            (ConstValue::Bottom, _) | (_, ConstValue::Bottom) => ConstValue::Bottom,
            (ConstValue::Constant(a, ca), ConstValue::Constant(b, cb)) => {
                if a == b {
                    ConstValue::Constant(a.clone(), ca.min(*cb))
                } else {
                    ConstValue::Bottom
                }
            }
        }
    }
}

pub struct ConstantPropagation {
    pub options: PassOptions,
    pub families: ConstFamilies,
    /// Minimum confidence a resolved `Constant` must carry to be rewritten
    /// into the IR (§4.5's `threshold`, default 0.9).
    pub threshold: f64,
}

impl Default for ConstantPropagation {
    fn default() -> Self {
        Self { options: PassOptions::default(), families: ConstFamilies::default(), threshold: 0.9 }
    }
}

impl Pass for ConstantPropagation {
    fn name(&self) -> &'static str {
        "constant-propagation"
    }

    fn description(&self) -> &'static str {
        "Sparse lattice-based evaluator that folds constant expressions"
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

        let def_rhs = build_def_rhs_map(&state.table, &state.cfg);
        let keys: Vec<(Name, SsaVersion)> = ssa.chains.defs.keys().cloned().collect();
        let mut env: Map<(Name, SsaVersion), ConstValue> =
            keys.iter().cloned().map(|k| (k, ConstValue::Top)).collect();

        let budget = self.options.max_iterations.max(1);
        let mut sweeps = 0u32;
        let mut converged = false;
        while sweeps < budget {
            sweeps += 1;
            let mut changed_this_sweep = false;
            for key in &keys {
                metrics.nodes_visited += 1;
                let site_id = ssa.chains.defs[key];
                let new_value = eval_def(&state.table, &def_rhs, site_id, key, &env, &self.families);
                if env.get(key) != Some(&new_value) {
                    env.insert(key.clone(), new_value);
                    changed_this_sweep = true;
                }
            }
            if !changed_this_sweep {
                converged = true;
                break;
            }
        }

        let mut warnings = Vec::new();
        if !converged {
            warn!(pass = self.name(), iterations = sweeps, "non-convergence, using partial result");
            warnings.push(format!(
                "constant propagation did not converge within {} iterations; using partial result",
                budget
            ));
        }

        let mut next_table = state.table.clone();
        let mut nodes_changed = 0usize;
        let ids: Vec<NodeId> = state.table.iter().map(|(id, _)| *id).collect();
        for id in ids {
            if let Node::Expr(e) = state.table.get(id) {
                if matches!(e.kind, ExprKind::Literal(_)) {
                    continue;
                }
                if let ConstValue::Constant(lit, confidence) = eval_expr(&state.table, id, &env, &self.families) {
                    if confidence >= self.threshold {
                        let rewritten =
                            Node::Expr(Expr { node_id: id, loc: e.loc, kind: ExprKind::Literal(lit) });
                        next_table.insert(id, rewritten);
                        nodes_changed += 1;
                    }
                }
            }
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

/// Maps a definition's recorded site id (a declarator pattern, or an
/// assignment's identifier target) to the expression it's initialized from.
/// `Update` and `Phi` def sites carry their value-producing information on
/// the site node itself and don't need an entry here.
fn build_def_rhs_map(table: &NodeTable, cfg: &Cfg) -> Map<NodeId, NodeId> {
    let mut map = Map::new();
    for bb in cfg.block_ids() {
        for &stmt_id in &cfg.block(bb).stmts {
            collect_def_rhs_stmt(table, stmt_id, &mut map);
        }
    }
    map
}

fn collect_def_rhs_stmt(table: &NodeTable, stmt_id: NodeId, map: &mut Map<NodeId, NodeId>) {
    let Some(stmt) = table.try_get(stmt_id).and_then(|n| n.as_stmt()) else { return };
    match &stmt.kind {
        StmtKind::VariableDeclaration { declarators, .. } => {
            for d in declarators {
                if let Some(init) = d.init {
                    map.insert(d.id, init);
                }
            }
        }
        StmtKind::Expression(expr_id) => collect_def_rhs_expr(table, *expr_id, map),
        StmtKind::For { init: Some(ForInit::VarDecl { declarators, .. }), .. } => {
            for d in declarators {
                if let Some(init) = d.init {
                    map.insert(d.id, init);
                }
            }
        }
        _ => {}
    }
}

fn collect_def_rhs_expr(table: &NodeTable, expr_id: NodeId, map: &mut Map<NodeId, NodeId>) {
    let Some(expr) = table.try_get(expr_id).and_then(|n| n.as_expr()) else { return };
    match &expr.kind {
        ExprKind::Assignment { target, value, .. } => {
            map.insert(*target, *value);
        }
        ExprKind::Sequence(exprs) => {
            for e in exprs {
                collect_def_rhs_expr(table, *e, map);
            }
        }
        _ => {}
    }
}

fn eval_def(
    table: &NodeTable,
    def_rhs: &Map<NodeId, NodeId>,
    site_id: NodeId,
    key: &(Name, SsaVersion),
    env: &Map<(Name, SsaVersion), ConstValue>,
    families: &ConstFamilies,
) -> ConstValue {
    match table.get(site_id) {
        Node::Phi(phi) => {
            let mut acc = ConstValue::Top;
            for operand in phi.operands.values() {
                let v = match operand {
                    SsaOperand::Version(version) => {
                        env.get(&(phi.var.clone(), *version)).cloned().unwrap_or(ConstValue::Top)
                    }
                    SsaOperand::Undefined => ConstValue::Bottom,
                };
                acc = acc.meet(&v);
            }
            acc
        }
        Node::Expr(e) if matches!(e.kind, ExprKind::Update { .. }) => {
            let ExprKind::Update { op, .. } = &e.kind else { unreachable!() };
            // The update reads the *previous* SSA version of the same name
            // (the use) and produces this one (the def): §4.3.
            let prev = SsaVersion(key.1 .0.saturating_sub(1));
            match env.get(&(key.0.clone(), prev)).cloned().unwrap_or(ConstValue::Top) {
                ConstValue::Constant(lit, conf) if families.arithmetic => match to_number(&lit) {
                    Some(n) => {
                        let delta = if matches!(op, UpdateOp::Increment) { 1.0 } else { -1.0 };
                        ConstValue::Constant(Literal::Number(n + delta), conf)
                    }
                    None => ConstValue::Top,
                },
                ConstValue::Constant(..) => ConstValue::Top,
                other => other,
            }
        }
        _ => match def_rhs.get(&site_id) {
            Some(&rhs) => eval_expr(table, rhs, env, families),
            None => ConstValue::Top,
        },
    }
}

fn eval_expr(
    table: &NodeTable,
    expr_id: NodeId,
    env: &Map<(Name, SsaVersion), ConstValue>,
    families: &ConstFamilies,
) -> ConstValue {
    let Some(expr) = table.try_get(expr_id).and_then(|n| n.as_expr()) else { return ConstValue::Bottom };
    match &expr.kind {
        ExprKind::Literal(Literal::Regex { .. }) => ConstValue::Top,
        ExprKind::Literal(l) => ConstValue::Constant(l.clone(), 1.0),
        ExprKind::SsaIdentifier { original_name, version, .. } => {
            env.get(&(original_name.clone(), *version)).cloned().unwrap_or(ConstValue::Top)
        }
        ExprKind::Identifier(_) => ConstValue::Bottom,
        ExprKind::Binary { op, left, right } => {
            let l = eval_expr(table, *left, env, families);
            let r = eval_expr(table, *right, env, families);
            combine_binary(table, *op, l, r, families)
        }
        ExprKind::Unary { op, arg, .. } => match eval_expr(table, *arg, env, families) {
            ConstValue::Constant(lit, conf) => match eval_unary(table, *op, &lit, families) {
                Some(result) => ConstValue::Constant(result, conf),
                None => ConstValue::Top,
            },
            other => other,
        },
        ExprKind::Logical { op, left, right } => {
            if !families.boolean {
                return ConstValue::Top;
            }
            let l = eval_expr(table, *left, env, families);
            match l {
                ConstValue::Constant(lit, conf) => match (to_bool(&lit), op) {
                    (Some(true), LogicalOp::And) => eval_expr(table, *right, env, families),
                    (Some(false), LogicalOp::And) => ConstValue::Constant(lit, conf),
                    (Some(true), LogicalOp::Or) => ConstValue::Constant(lit, conf),
                    (Some(false), LogicalOp::Or) => eval_expr(table, *right, env, families),
                    (_, LogicalOp::Nullish) if matches!(lit, Literal::Null) => {
                        eval_expr(table, *right, env, families)
                    }
                    (_, LogicalOp::Nullish) => ConstValue::Constant(lit, conf),
                    _ => ConstValue::Top,
                },
                other => other,
            }
        }
        ExprKind::Conditional { test, cons, alt } => match eval_expr(table, *test, env, families) {
            ConstValue::Constant(lit, _) => match to_bool(&lit) {
                Some(true) => eval_expr(table, *cons, env, families),
                Some(false) => eval_expr(table, *alt, env, families),
                None => ConstValue::Top,
            },
            ConstValue::Top => ConstValue::Top,
            ConstValue::Bottom => ConstValue::Bottom,
        },
        _ => ConstValue::Bottom,
    }
}

fn combine_binary(table: &NodeTable, op: BinOp, l: ConstValue, r: ConstValue, families: &ConstFamilies) -> ConstValue {
    match (l, r) {
        (ConstValue::Bottom, _) | (_, ConstValue::Bottom) => ConstValue::Bottom,
        (ConstValue::Top, _) | (_, ConstValue::Top) => ConstValue::Top,
        (ConstValue::Constant(a, ca), ConstValue::Constant(b, cb)) => match eval_binary(table, op, &a, &b, families) {
            Some(result) => ConstValue::Constant(result, ca.min(cb)),
            None => ConstValue::Top,
        },
    }
}

fn eval_binary(table: &NodeTable, op: BinOp, l: &Literal, r: &Literal, families: &ConstFamilies) -> Option<Literal> {
    use BinOp::*;
    match op {
        Add => {
            if matches!(l, Literal::Str(_)) || matches!(r, Literal::Str(_)) {
                if !families.string_concat {
                    return None;
                }
                let a = to_display_string(l)?;
                let b = to_display_string(r)?;
                Some(Literal::Str(table.intern(format!("{a}{b}"))))
            } else {
                if !families.arithmetic {
                    return None;
                }
                Some(Literal::Number(to_number(l)? + to_number(r)?))
            }
        }
        Sub | Mul | Mod | Pow => {
            if !families.arithmetic {
                return None;
            }
            let a = to_number(l)?;
            let b = to_number(r)?;
            Some(Literal::Number(match op {
                Sub => a - b,
                Mul => a * b,
                Mod => a % b,
                Pow => a.powf(b),
                _ => unreachable!(),
            }))
        }
        Div => {
            if !families.arithmetic {
                return None;
            }
            let a = to_number(l)?;
            let b = to_number(r)?;
            if b == 0.0 {
                // Division by zero never crashes the pass: fold as unknown.
                return None;
            }
            Some(Literal::Number(a / b))
        }
        Eq | NotEq | StrictEq | StrictNotEq | Lt | LtEq | Gt | GtEq => {
            if !families.comparison {
                return None;
            }
            eval_comparison(op, l, r).map(Literal::Bool)
        }
        BitAnd | BitOr | BitXor | Shl | Shr | UShr => {
            if !families.bitwise {
                return None;
            }
            eval_bitwise(op, l, r)
        }
        In | InstanceOf => None,
    }
}

fn eval_comparison(op: BinOp, l: &Literal, r: &Literal) -> Option<bool> {
    use BinOp::*;
    match op {
        StrictEq => Some(l == r),
        StrictNotEq => Some(l != r),
        Eq => loose_eq(l, r),
        NotEq => loose_eq(l, r).map(|b| !b),
        Lt | LtEq | Gt | GtEq => relational(op, l, r),
        _ => None,
    }
}

fn loose_eq(l: &Literal, r: &Literal) -> Option<bool> {
    use Literal::*;
    match (l, r) {
        (Number(_), Number(_)) | (Str(_), Str(_)) | (Bool(_), Bool(_)) | (Null, Null) => Some(l == r),
        (Number(_), Str(_))
        | (Str(_), Number(_))
        | (Number(_), Bool(_))
        | (Bool(_), Number(_))
        | (Str(_), Bool(_))
        | (Bool(_), Str(_)) => Some(to_number(l)? == to_number(r)?),
        _ => None,
    }
}

fn relational(op: BinOp, l: &Literal, r: &Literal) -> Option<bool> {
    if let (Literal::Str(a), Literal::Str(b)) = (l, r) {
        let (a, b) = (a.to_string(), b.to_string());
        return Some(match op {
            BinOp::Lt => a < b,
            BinOp::LtEq => a <= b,
            BinOp::Gt => a > b,
            BinOp::GtEq => a >= b,
            _ => unreachable!(),
        });
    }
    let a = to_number(l)?;
    let b = to_number(r)?;
    if a.is_nan() || b.is_nan() {
        return Some(false);
    }
    Some(match op {
        BinOp::Lt => a < b,
        BinOp::LtEq => a <= b,
        BinOp::Gt => a > b,
        BinOp::GtEq => a >= b,
        _ => unreachable!(),
    })
}

fn to_int32(n: f64) -> i32 {
    if !n.is_finite() {
        return 0;
    }
    let n = n.trunc();
    let m = n.rem_euclid(4294967296.0);
    if m >= 2147483648.0 {
        (m - 4294967296.0) as i32
    } else {
        m as i32
    }
}

fn eval_bitwise(op: BinOp, l: &Literal, r: &Literal) -> Option<Literal> {
    let a = to_int32(to_number(l)?);
    let b = to_int32(to_number(r)?);
    let result = match op {
        BinOp::BitAnd => a & b,
        BinOp::BitOr => a | b,
        BinOp::BitXor => a ^ b,
        BinOp::Shl => a.wrapping_shl((b as u32) & 31),
        BinOp::Shr => a.wrapping_shr((b as u32) & 31),
        BinOp::UShr => ((a as u32) >> ((b as u32) & 31)) as i32,
        _ => unreachable!(),
    };
    Some(Literal::Number(result as f64))
}

fn eval_unary(table: &NodeTable, op: UnOp, v: &Literal, families: &ConstFamilies) -> Option<Literal> {
    match op {
        UnOp::Plus => {
            if !families.arithmetic {
                return None;
            }
            Some(Literal::Number(to_number(v)?))
        }
        UnOp::Minus => {
            if !families.arithmetic {
                return None;
            }
            Some(Literal::Number(-to_number(v)?))
        }
        UnOp::Not => {
            if !families.boolean {
                return None;
            }
            Some(Literal::Bool(!to_bool(v)?))
        }
        UnOp::BitNot => {
            if !families.bitwise {
                return None;
            }
            Some(Literal::Number((!to_int32(to_number(v)?)) as f64))
        }
        UnOp::Typeof => {
            if !families.boolean {
                return None;
            }
            let ty = match v {
                Literal::Number(_) => "number",
                Literal::Str(_) => "string",
                Literal::Bool(_) => "boolean",
                Literal::Null => "object",
                Literal::BigInt(_) => "bigint",
                Literal::Regex { .. } => "object",
            };
            Some(Literal::Str(table.intern(ty)))
        }
        // `void` always yields `undefined`, which this IR has no literal
        // for; `delete` is never foldable. Both stay Top.
        UnOp::Void | UnOp::Delete => None,
    }
}

fn to_number(lit: &Literal) -> Option<f64> {
    match lit {
        Literal::Number(n) => Some(*n),
        Literal::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
        Literal::Null => Some(0.0),
        Literal::Str(s) => {
            let s = s.to_string();
            let trimmed = s.trim();
            if trimmed.is_empty() {
                Some(0.0)
            } else {
                Some(trimmed.parse::<f64>().unwrap_or(f64::NAN))
            }
        }
        Literal::BigInt(_) | Literal::Regex { .. } => None,
    }
}

fn to_bool(lit: &Literal) -> Option<bool> {
    match lit {
        Literal::Number(n) => Some(*n != 0.0 && !n.is_nan()),
        Literal::Bool(b) => Some(*b),
        Literal::Null => Some(false),
        Literal::Str(s) => Some(!s.to_string().is_empty()),
        Literal::BigInt(s) => Some(s.to_string() != "0"),
        Literal::Regex { .. } => Some(true),
    }
}

fn to_display_string(lit: &Literal) -> Option<String> {
    match lit {
        Literal::Number(n) => Some(format_js_number(*n)),
        Literal::Str(s) => Some(s.to_string()),
        Literal::Bool(b) => Some(b.to_string()),
        Literal::Null => Some("null".to_string()),
        Literal::BigInt(s) => Some(s.to_string()),
        Literal::Regex { .. } => None,
    }
}

fn format_js_number(n: f64) -> String {
    if n.is_nan() {
        return "NaN".into();
    }
    if n.is_infinite() {
        return if n > 0.0 { "Infinity".into() } else { "-Infinity".into() };
    }
    if n == 0.0 {
        return "0".into();
    }
    if n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        format!("{n}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{AssignOp, Declarator, NodeTable, VarKind};
    use crate::passes::PassManager;

    fn run_const_prop(table: NodeTable, body: Vec<NodeId>) -> ProgramState {
        let mut state = ProgramState::build(table, body).unwrap();
        state.construct_ssa().unwrap();
        let manager = PassManager::build(vec![Box::new(ConstantPropagation::default())]).unwrap();
        manager.run(state).unwrap().final_state
    }

    #[test]
    fn folds_a_straight_line_arithmetic_chain() {
        let mut table = NodeTable::new();
        let x = table.intern("x");
        let one = table.make_literal(Literal::Number(1.0), None);
        let x_pat = table.make_identifier_pattern(x.clone(), None);
        let decl = table.make_var_decl(VarKind::Let, vec![Declarator { id: x_pat, init: Some(one) }], None);

        let x_use = table.make_identifier(x.clone(), None);
        let two = table.make_literal(Literal::Number(2.0), None);
        let sum = table.make_binary(BinOp::Add, x_use, two, None);
        let ret = table.make_return(Some(sum), None);

        let final_state = run_const_prop(table, vec![decl, ret]);
        let ret_stmt = final_state.table.get(ret).as_stmt().unwrap();
        let StmtKind::Return(Some(value)) = ret_stmt.kind else { panic!() };
        let value_node = final_state.table.get(value);
        assert!(matches!(
            value_node,
            Node::Expr(Expr { kind: ExprKind::Literal(Literal::Number(n)), .. }) if *n == 3.0
        ));
    }

    #[test]
    fn division_by_zero_is_left_unfolded() {
        let mut table = NodeTable::new();
        let one = table.make_literal(Literal::Number(1.0), None);
        let zero = table.make_literal(Literal::Number(0.0), None);
        let div = table.make_binary(BinOp::Div, one, zero, None);
        let ret = table.make_return(Some(div), None);

        let final_state = run_const_prop(table, vec![ret]);
        let ret_stmt = final_state.table.get(ret).as_stmt().unwrap();
        let StmtKind::Return(Some(value)) = ret_stmt.kind else { panic!() };
        assert!(matches!(
            final_state.table.get(value),
            Node::Expr(Expr { kind: ExprKind::Binary { .. }, .. })
        ));
    }

    #[test]
    fn merge_point_with_conflicting_values_stays_unfolded() {
        let mut table = NodeTable::new();
        let x = table.intern("x");
        let cond = table.make_identifier(table.intern("cond"), None);

        let one = table.make_literal(Literal::Number(1.0), None);
        let x_pat1 = table.make_identifier_pattern(x.clone(), None);
        let assign1 = table.make_assignment(AssignOp::Assign, x_pat1, one, None);
        let then_stmt = table.make_expression_stmt(assign1, None);
        let then_block = table.make_block(vec![then_stmt], None);

        let two = table.make_literal(Literal::Number(2.0), None);
        let x_pat2 = table.make_identifier_pattern(x.clone(), None);
        let assign2 = table.make_assignment(AssignOp::Assign, x_pat2, two, None);
        let else_stmt = table.make_expression_stmt(assign2, None);
        let else_block = table.make_block(vec![else_stmt], None);

        let if_stmt = table.make_if(cond, then_block, Some(else_block), None);
        let x_decl_pat = table.make_identifier_pattern(x.clone(), None);
        let decl = table.make_var_decl(VarKind::Let, vec![Declarator { id: x_decl_pat, init: None }], None);

        let x_use = table.make_identifier(x.clone(), None);
        let ret = table.make_return(Some(x_use), None);

        let final_state = run_const_prop(table, vec![decl, if_stmt, ret]);
        let ret_stmt = final_state.table.get(ret).as_stmt().unwrap();
        let StmtKind::Return(Some(value)) = ret_stmt.kind else { panic!() };
        assert!(matches!(final_state.table.get(value), Node::Expr(Expr { kind: ExprKind::SsaIdentifier { .. }, .. })));
    }
}
