//! The typed pass-configuration surface (§4.11, §6): a serializable shape
//! the external CLI/config loader can populate from whatever file format it
//! chooses. This crate only defines the shape and its defaults -- reading it
//! from disk or argv is explicitly the CLI's job, not this crate's.

use std::collections::BTreeMap as Map;

use serde::{Deserialize, Serialize};

use crate::commons::{Error, Result};
use crate::ir::{NodeId, NodeTable};
use crate::passes::constant_prop::{ConstFamilies, ConstantPropagation};
use crate::passes::copy_prop::CopyPropagation;
use crate::passes::dce::{DceOptions, DeadCodeElimination};
use crate::passes::structuring::Structuring;
use crate::passes::{Pass, PassManager, PassOptions, PipelineResult, ProgramState};

/// Global defaults every pass's `PassOptions` starts from unless overridden
/// per-pass in `PipelineConfig::passes`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GlobalDefaults {
    pub max_iterations: u32,
    pub timeout_ms: u64,
    /// Confidence a resolved constant-propagation or copy-propagation fact
    /// must clear before it is written back into the IR (§4.5, §4.6).
    pub confidence_threshold: f64,
}

impl Default for GlobalDefaults {
    fn default() -> Self {
        Self { max_iterations: 100, timeout_ms: 5_000, confidence_threshold: 0.9 }
    }
}

/// One `PipelineConfig` per pipeline run: the global defaults plus a
/// per-pass override map and the pass-specific option blocks (§4.5's
/// `ConstFamilies`, §4.7's `DceOptions`) that don't fit the generic
/// `PassOptions` shape.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PipelineConfig {
    pub defaults: GlobalDefaults,
    pub passes: Map<String, PassOptions>,
    pub const_prop_families: ConstFamilies,
    pub dce: DceOptions,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            defaults: GlobalDefaults::default(),
            passes: Map::new(),
            const_prop_families: ConstFamilies::default(),
            dce: DceOptions::default(),
        }
    }
}

impl PipelineConfig {
    /// Options for `pass_name`, falling back to the global defaults (with
    /// `enabled = true`) when no per-pass override was configured.
    pub fn options_for(&self, pass_name: &str) -> PassOptions {
        self.passes.get(pass_name).cloned().unwrap_or_else(|| PassOptions {
            enabled: true,
            max_iterations: self.defaults.max_iterations,
            timeout_ms: self.defaults.timeout_ms,
            debug: false,
            metrics_collection: true,
        })
    }

    /// Configuration errors (§7) surface at pipeline-construction time, not
    /// mid-run: negative/zero limits here, or on any per-pass override.
    pub fn validate(&self) -> Result<()> {
        if self.defaults.max_iterations == 0 {
            return Err(Error::Configuration("defaults.max_iterations must be >= 1".into()));
        }
        if self.defaults.timeout_ms == 0 {
            return Err(Error::Configuration("defaults.timeout_ms must be >= 1".into()));
        }
        if !(0.0..=1.0).contains(&self.defaults.confidence_threshold) {
            return Err(Error::Configuration("defaults.confidence_threshold must be in [0,1]".into()));
        }
        for opts in self.passes.values() {
            opts.validate()?;
        }
        Ok(())
    }
}

/// The canonical rewrite pipeline (§4, §8): constant propagation, copy
/// propagation, dead-code elimination, control-flow structuring. `cfg`
/// supplies each pass's `PassOptions` via [`PipelineConfig::options_for`]
/// plus the two option blocks (`ConstFamilies`, `DceOptions`) that don't fit
/// the generic shape.
///
/// These four passes declare no dependency on one another, so
/// [`PassManager::build`] orders them by its lexicographic tie-break:
/// constant-propagation, control-flow-structuring, copy-propagation,
/// dead-code-elimination. That still runs copy propagation before dead-code
/// elimination, which is the one ordering the end-to-end scenarios in §8
/// actually require (a dead copy has to be propagated before it can be
/// swept) -- structuring's pattern match over `If`/`While` shapes doesn't
/// read or write any dataflow fact the other three produce, so its exact
/// position among them doesn't affect the outcome.
pub fn default_passes(cfg: &PipelineConfig) -> Vec<Box<dyn Pass>> {
    vec![
        Box::new(ConstantPropagation {
            options: cfg.options_for("constant-propagation"),
            families: cfg.const_prop_families.clone(),
            threshold: cfg.defaults.confidence_threshold,
        }),
        Box::new(CopyPropagation {
            options: cfg.options_for("copy-propagation"),
            threshold: CopyPropagation::default().threshold,
        }),
        Box::new(DeadCodeElimination {
            options: cfg.options_for("dead-code-elimination"),
            dce: cfg.dce.clone(),
        }),
        Box::new(Structuring { options: cfg.options_for("control-flow-structuring") }),
    ]
}

/// Builds a [`ProgramState`] from `table`/`body`, validates `cfg`, and runs
/// the canonical pipeline (`default_passes`) to a [`PipelineResult`].
pub fn run_default_pipeline(table: NodeTable, body: Vec<NodeId>, cfg: &PipelineConfig) -> Result<PipelineResult> {
    cfg.validate()?;
    let state = ProgramState::build(table, body)?;
    let manager = PassManager::build(default_passes(cfg))?;
    manager.run(state)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        PipelineConfig::default().validate().unwrap();
    }

    #[test]
    fn zero_max_iterations_is_a_configuration_error() {
        let mut cfg = PipelineConfig::default();
        cfg.defaults.max_iterations = 0;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn options_for_unregistered_pass_falls_back_to_defaults() {
        let cfg = PipelineConfig::default();
        let opts = cfg.options_for("constant-propagation");
        assert_eq!(opts.max_iterations, cfg.defaults.max_iterations);
        assert!(opts.enabled);
    }

    #[test]
    fn default_passes_register_all_four_rewrites() {
        let cfg = PipelineConfig::default();
        let mut names: Vec<&'static str> = default_passes(&cfg).iter().map(|p| p.name()).collect();
        names.sort_unstable();
        assert_eq!(
            names,
            ["constant-propagation", "control-flow-structuring", "copy-propagation", "dead-code-elimination"]
        );
    }

    #[test]
    fn default_pipeline_folds_an_arithmetic_chain_into_the_declarator() {
        use crate::ir::{BinOp, Declarator, Expr, ExprKind, Literal, Node, StmtKind, VarKind};

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

        let cfg = PipelineConfig::default();
        let result = run_default_pipeline(table, vec![decl, ret], &cfg).unwrap();

        let decl_stmt = result.final_state.table.get(decl).as_stmt().unwrap();
        let StmtKind::VariableDeclaration { declarators, .. } = decl_stmt.kind else { panic!() };
        let init = declarators[0].init.unwrap();
        assert!(matches!(
            result.final_state.table.get(init),
            Node::Expr(Expr { kind: ExprKind::Literal(Literal::Number(n)), .. }) if n == 14.0
        ));
    }

    #[test]
    fn default_pipeline_raises_an_if_else_assignment_to_a_ternary() {
        use crate::ir::{AssignOp, Expr, ExprKind, Literal, Node, StmtKind};

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

        let cfg = PipelineConfig::default();
        let result = run_default_pipeline(table, vec![if_stmt], &cfg).unwrap();

        let rewritten = result.final_state.table.get(if_stmt).as_stmt().unwrap();
        let StmtKind::Expression(expr_id) = rewritten.kind else { panic!("expected an expression statement") };
        let expr = result.final_state.table.get(expr_id).as_expr().unwrap();
        let ExprKind::Assignment { value, .. } = expr.kind else { panic!("expected an assignment") };
        assert!(matches!(
            result.final_state.table.get(value),
            Node::Expr(Expr { kind: ExprKind::Conditional { .. }, .. })
        ));
    }
}
