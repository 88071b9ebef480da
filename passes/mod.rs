//! The pass manager (§4.4): registers passes, orders them by declared
//! dependency, and runs them over a [`ProgramState`], collecting metrics and
//! tolerating individual pass failures per §7's error-propagation policy.
//!
//! Passes are *readonly by convention* (§9): a pass receives an immutable
//! view of the current state and returns a whole new one (the `NodeTable`
//! clone is the copy-on-write mechanism documented on `NodeTable` itself) --
//! never a `&mut` into the committed state. The manager is the only thing
//! that commits a pass's output, and only after checking its timeout and
//! errors.

pub mod constant_prop;
pub mod copy_prop;
pub mod dce;
pub mod structuring;

use std::time::Instant;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::cfg::{Cfg, CfgBuilder};
use crate::commons::{Error, Result};
use crate::ir::{NodeId, NodeTable};
use crate::ssa::{self, Ssa};

/// Per-pass configuration surface (§6): the five knobs every pass exposes,
/// regardless of what pass-specific options it layers on top.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PassOptions {
    pub enabled: bool,
    pub max_iterations: u32,
    pub timeout_ms: u64,
    pub debug: bool,
    pub metrics_collection: bool,
}

impl Default for PassOptions {
    fn default() -> Self {
        Self { enabled: true, max_iterations: 100, timeout_ms: 5_000, debug: false, metrics_collection: true }
    }
}

impl PassOptions {
    /// Configuration errors (§7) are raised at pipeline-construction time,
    /// not discovered mid-run.
    pub fn validate(&self) -> Result<()> {
        if self.max_iterations == 0 {
            return Err(Error::Configuration("max_iterations must be >= 1".into()));
        }
        if self.timeout_ms == 0 {
            return Err(Error::Configuration("timeout_ms must be >= 1".into()));
        }
        Ok(())
    }
}

/// Execution metrics a pass reports back on its [`PassOutcome`] (§4.4).
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct PassMetrics {
    pub execution_time_ms: u64,
    pub nodes_visited: usize,
    pub nodes_changed: usize,
    /// Rough proxy for memory use: the size of the committed `NodeTable`
    /// after this pass, in number of arena entries. A real allocator-level
    /// figure isn't available without instrumenting the global allocator,
    /// which this crate doesn't do.
    pub memory_nodes: usize,
}

/// The state a pass reads and rewrites: the IR arena, the top-level
/// statement sequence it came from, the CFG built over that sequence, and
/// (while the pipeline is between SSA construction and destruction) the SSA
/// snapshot layered on top of it.
#[derive(Clone)]
pub struct ProgramState {
    pub table: NodeTable,
    pub body: Vec<NodeId>,
    pub cfg: Cfg,
    pub ssa: Option<Ssa>,
}

impl ProgramState {
    pub fn build(table: NodeTable, body: Vec<NodeId>) -> Result<Self> {
        let cfg = CfgBuilder::new(&table).build(&body)?;
        Ok(Self { table, body, cfg, ssa: None })
    }

    pub fn construct_ssa(&mut self) -> Result<()> {
        let dom = crate::cfg::dominance::dominators(&self.cfg);
        let phi_blocks = ssa::place_phis(&mut self.table, &self.cfg, &dom.frontier);
        let chains = ssa::rename(&mut self.table, &self.cfg, &phi_blocks, &dom.children);
        ssa::validate(&self.table, &self.cfg, &phi_blocks)?;
        self.ssa = Some(Ssa { phi_blocks, chains });
        Ok(())
    }

    pub fn destroy_ssa(&mut self) {
        if let Some(ssa) = self.ssa.take() {
            ssa::destroy(&mut self.table, &self.cfg, &ssa.phi_blocks);
        }
    }

    /// Rebuilds the CFG from `body` after a pass changed the IR's control
    /// topology. Any SSA snapshot is discarded -- it no longer describes
    /// this CFG's blocks and must be reconstructed by a later pass that
    /// needs it (see [`Pass::requires_ssa`]). The table is lowered back to
    /// raw `Identifier` form first (against the *old* CFG, which still
    /// matches the snapshot being discarded): a pass that doesn't declare
    /// `requires_ssa` expects to see `Identifier`, not a leftover
    /// `SsaIdentifier` from a renaming no later pass will ever destroy.
    pub fn rebuild_cfg(&mut self) -> Result<()> {
        self.destroy_ssa();
        self.cfg = CfgBuilder::new(&self.table).build(&self.body)?;
        Ok(())
    }
}

/// What a pass hands back to the manager: a full replacement state (the
/// "new state" of §4.4), whether anything actually changed, and the
/// metrics/diagnostics the manager folds into the pipeline result.
pub struct PassOutcome {
    pub table: NodeTable,
    pub body: Vec<NodeId>,
    pub changed: bool,
    /// Set when this pass rewrote control flow (added/removed/merged
    /// blocks worth of statements) and the committed CFG/SSA must be
    /// rebuilt before the next pass runs.
    pub invalidates_cfg: bool,
    pub metrics: PassMetrics,
    pub warnings: Vec<String>,
    pub errors: Vec<Error>,
}

impl PassOutcome {
    pub fn unchanged(state: &ProgramState, metrics: PassMetrics) -> Self {
        Self {
            table: state.table.clone(),
            body: state.body.clone(),
            changed: false,
            invalidates_cfg: false,
            metrics,
            warnings: Vec::new(),
            errors: Vec::new(),
        }
    }
}

pub trait Pass {
    fn name(&self) -> &'static str;
    fn description(&self) -> &'static str;
    /// Names of passes that must have already run in this pipeline
    /// invocation. Resolved into run order by [`PassManager::build`].
    fn dependencies(&self) -> &'static [&'static str];
    /// Whether this pass needs `state.ssa` populated before it runs. The
    /// manager (re)constructs SSA automatically when true.
    fn requires_ssa(&self) -> bool {
        false
    }
    fn options(&self) -> &PassOptions;
    fn run(&self, state: &ProgramState) -> PassOutcome;
}

/// One entry of the pipeline result's `pass_results` (§6).
pub struct PassResult {
    pub name: &'static str,
    pub state: ProgramState,
    pub changed: bool,
    pub metrics: PassMetrics,
    pub warnings: Vec<String>,
    pub errors: Vec<Error>,
}

pub struct PipelineResult {
    pub final_state: ProgramState,
    pub pass_results: Vec<PassResult>,
    pub total_changes: usize,
    pub total_execution_time_ms: u64,
}

/// Orders registered passes by dependency and runs them over a
/// [`ProgramState`] (§4.4, §5).
pub struct PassManager {
    order: Vec<Box<dyn Pass>>,
}

impl PassManager {
    /// Builds a stable topological order over `passes` (lexicographic
    /// tie-break on name, per §5's ordering guarantees), validating every
    /// `dependencies()` name resolves to a registered pass and that the
    /// dependency graph has no cycle. Both are configuration errors (§7):
    /// raised here, at construction time, so a malformed pipeline never
    /// starts.
    pub fn build(passes: Vec<Box<dyn Pass>>) -> Result<Self> {
        for p in &passes {
            p.options().validate()?;
        }

        let names: std::collections::BTreeSet<&'static str> = passes.iter().map(|p| p.name()).collect();
        for p in &passes {
            for dep in p.dependencies() {
                if !names.contains(dep) {
                    return Err(Error::Configuration(format!(
                        "pass {} depends on unregistered pass {dep}",
                        p.name()
                    )));
                }
            }
        }

        let mut by_name: std::collections::BTreeMap<&'static str, usize> =
            passes.iter().enumerate().map(|(i, p)| (p.name(), i)).collect();
        let mut indegree: Vec<usize> = vec![0; passes.len()];
        let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); passes.len()];
        for (i, p) in passes.iter().enumerate() {
            indegree[i] = p.dependencies().len();
            for dep in p.dependencies() {
                dependents[by_name[dep]].push(i);
            }
        }

        let mut ready: std::collections::BTreeSet<(&'static str, usize)> = indegree
            .iter()
            .enumerate()
            .filter(|&(_, &d)| d == 0)
            .map(|(i, _)| (passes[i].name(), i))
            .collect();
        let mut order_idx = Vec::with_capacity(passes.len());
        while let Some(&(name, i)) = ready.iter().next() {
            ready.remove(&(name, i));
            order_idx.push(i);
            for &dep_i in &dependents[i] {
                indegree[dep_i] -= 1;
                if indegree[dep_i] == 0 {
                    ready.insert((passes[dep_i].name(), dep_i));
                }
            }
        }
        if order_idx.len() != passes.len() {
            return Err(Error::Configuration("pass dependency graph has a cycle".into()));
        }

        let mut slots: Vec<Option<Box<dyn Pass>>> = passes.into_iter().map(Some).collect();
        let order = order_idx.into_iter().map(|i| slots[i].take().unwrap()).collect();
        by_name.clear();
        Ok(Self { order })
    }

    pub fn passes(&self) -> impl Iterator<Item = &dyn Pass> {
        self.order.iter().map(|p| p.as_ref())
    }

    pub fn run(&self, mut state: ProgramState) -> Result<PipelineResult> {
        let mut pass_results = Vec::with_capacity(self.order.len());
        let mut total_changes = 0usize;
        let mut total_execution_time_ms = 0u64;

        for pass in &self.order {
            let opts = pass.options();
            if !opts.enabled {
                debug!(pass = pass.name(), "skipped: disabled");
                continue;
            }

            if pass.requires_ssa() && state.ssa.is_none() {
                state.construct_ssa()?;
            } else if !pass.requires_ssa() && state.ssa.is_some() {
                // A pass that matches on the raw `Identifier` namespace (copy
                // propagation, structuring) must never see the `SsaIdentifier`
                // form a prior pass left behind just because that prior pass
                // happened not to touch control flow.
                state.destroy_ssa();
            }

            let span = tracing::debug_span!("pass", name = pass.name());
            let _enter = span.enter();

            let start = Instant::now();
            let mut outcome = pass.run(&state);
            let elapsed_ms = start.elapsed().as_millis() as u64;
            outcome.metrics.execution_time_ms = elapsed_ms;
            total_execution_time_ms += elapsed_ms;

            if elapsed_ms > opts.timeout_ms {
                warn!(pass = pass.name(), elapsed_ms, budget_ms = opts.timeout_ms, "pass timed out, reverted");
                pass_results.push(PassResult {
                    name: pass.name(),
                    state: state.clone(),
                    changed: false,
                    metrics: outcome.metrics,
                    warnings: outcome.warnings,
                    errors: vec![Error::Timeout { pass: pass.name().into(), budget_ms: opts.timeout_ms }],
                });
                continue;
            }

            if !outcome.errors.is_empty() {
                warn!(pass = pass.name(), errors = outcome.errors.len(), "pass errored, reverted");
                pass_results.push(PassResult {
                    name: pass.name(),
                    state: state.clone(),
                    changed: false,
                    metrics: outcome.metrics,
                    warnings: outcome.warnings,
                    errors: outcome.errors,
                });
                continue;
            }

            state.table = outcome.table;
            state.body = outcome.body;
            if outcome.invalidates_cfg {
                state.rebuild_cfg()?;
            }
            if outcome.changed {
                total_changes += 1;
            }
            pass_results.push(PassResult {
                name: pass.name(),
                state: state.clone(),
                changed: outcome.changed,
                metrics: outcome.metrics,
                warnings: outcome.warnings,
                errors: Vec::new(),
            });
        }

        Ok(PipelineResult { final_state: state, pass_results, total_changes, total_execution_time_ms })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Noop(&'static str, &'static [&'static str], PassOptions);
    impl Pass for Noop {
        fn name(&self) -> &'static str {
            self.0
        }
        fn description(&self) -> &'static str {
            "test no-op"
        }
        fn dependencies(&self) -> &'static [&'static str] {
            self.1
        }
        fn options(&self) -> &PassOptions {
            &self.2
        }
        fn run(&self, state: &ProgramState) -> PassOutcome {
            PassOutcome::unchanged(state, PassMetrics::default())
        }
    }

    fn empty_state() -> ProgramState {
        let table = NodeTable::new();
        ProgramState::build(table, Vec::new()).unwrap()
    }

    #[test]
    fn topological_order_respects_dependencies() {
        let passes: Vec<Box<dyn Pass>> = vec![
            Box::new(Noop("b", &["a"], PassOptions::default())),
            Box::new(Noop("a", &[], PassOptions::default())),
        ];
        let manager = PassManager::build(passes).unwrap();
        let names: Vec<&str> = manager.passes().map(|p| p.name()).collect();
        assert_eq!(names, vec!["a", "b"]);
    }

    #[test]
    fn unknown_dependency_is_a_configuration_error() {
        let passes: Vec<Box<dyn Pass>> = vec![Box::new(Noop("a", &["missing"], PassOptions::default()))];
        assert!(PassManager::build(passes).is_err());
    }

    #[test]
    fn cyclic_dependency_is_a_configuration_error() {
        let passes: Vec<Box<dyn Pass>> =
            vec![Box::new(Noop("a", &["b"], PassOptions::default())), Box::new(Noop("b", &["a"], PassOptions::default()))];
        assert!(PassManager::build(passes).is_err());
    }

    #[test]
    fn empty_program_runs_with_no_changes() {
        let passes: Vec<Box<dyn Pass>> = vec![Box::new(Noop("a", &[], PassOptions::default()))];
        let manager = PassManager::build(passes).unwrap();
        let result = manager.run(empty_state()).unwrap();
        assert_eq!(result.total_changes, 0);
    }
}
