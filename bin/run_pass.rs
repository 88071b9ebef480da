// Runs a single named pass over a built-in sample program and reports its
// metrics, warnings and whether it changed anything. No parser lives in
// this crate (§1), so the input is selected by name rather than read from a
// file.

#[path = "fixtures.rs"]
mod fixtures;

use std::env;

use arachne_core::passes::constant_prop::ConstantPropagation;
use arachne_core::passes::copy_prop::CopyPropagation;
use arachne_core::passes::dce::DeadCodeElimination;
use arachne_core::passes::structuring::Structuring;
use arachne_core::passes::{Pass, PassManager, ProgramState};

fn known_passes() -> &'static [&'static str] {
    &["constant-propagation", "copy-propagation", "dead-code-elimination", "control-flow-structuring"]
}

fn build_pass(name: &str) -> Option<Box<dyn Pass>> {
    match name {
        "constant-propagation" => Some(Box::new(ConstantPropagation::default())),
        "copy-propagation" => Some(Box::new(CopyPropagation::default())),
        "dead-code-elimination" => Some(Box::new(DeadCodeElimination::default())),
        "control-flow-structuring" => Some(Box::new(Structuring::default())),
        _ => None,
    }
}

fn main() {
    let args: Vec<String> = env::args().collect();
    if args.len() < 3 {
        eprintln!("Usage: {} <pass-name> <scenario>", args[0]);
        eprintln!("Passes: {}", known_passes().join(", "));
        eprintln!("Scenarios: {}", fixtures::available().join(", "));
        std::process::exit(1);
    }

    let pass_name = &args[1];
    let scenario_name = &args[2];

    let pass = build_pass(pass_name).unwrap_or_else(|| {
        eprintln!("Unknown pass: {pass_name}");
        eprintln!("Passes: {}", known_passes().join(", "));
        std::process::exit(1);
    });

    let scenario = fixtures::build(scenario_name).unwrap_or_else(|| {
        eprintln!("Unknown scenario: {scenario_name}");
        eprintln!("Scenarios: {}", fixtures::available().join(", "));
        std::process::exit(1);
    });

    let state = ProgramState::build(scenario.table, scenario.body)
        .unwrap_or_else(|e| panic!("Failed to build CFG for {scenario_name}: {e}"));
    let manager = PassManager::build(vec![pass]).unwrap_or_else(|e| panic!("Failed to register {pass_name}: {e}"));
    let result = manager.run(state).unwrap_or_else(|e| panic!("{pass_name} failed on {scenario_name}: {e}"));

    let pass_result = &result.pass_results[0];
    println!("pass: {pass_name}");
    println!("changed: {}", pass_result.changed);
    println!(
        "nodes visited: {}, nodes changed: {}, execution time: {}ms",
        pass_result.metrics.nodes_visited, pass_result.metrics.nodes_changed, pass_result.metrics.execution_time_ms
    );
    for warning in &pass_result.warnings {
        println!("warning: {warning}");
    }
    for error in &pass_result.errors {
        println!("error: {error}");
    }
}
