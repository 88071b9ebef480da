// Runs the canonical four-pass pipeline over a built-in sample program and
// reports a per-pass summary. Optionally reads a `PipelineConfig` override
// from a JSON file (the pipeline's shape is `Serialize`/`Deserialize`, but
// reading it off disk is the outer CLI's job everywhere else in this crate
// -- this binary is the one place that's allowed to do it, for the sake of
// having something runnable).

#[path = "fixtures.rs"]
mod fixtures;

use std::env;

use arachne_core::pipeline::{run_default_pipeline, PipelineConfig};

fn main() {
    let args: Vec<String> = env::args().collect();
    if args.len() < 2 {
        eprintln!("Usage: {} <scenario> [config.json]", args[0]);
        eprintln!("Scenarios: {}", fixtures::available().join(", "));
        std::process::exit(1);
    }

    let scenario_name = &args[1];
    let scenario = fixtures::build(scenario_name).unwrap_or_else(|| {
        eprintln!("Unknown scenario: {scenario_name}");
        eprintln!("Scenarios: {}", fixtures::available().join(", "));
        std::process::exit(1);
    });

    let config = match args.get(2) {
        Some(path) => {
            let text = std::fs::read_to_string(path).unwrap_or_else(|e| panic!("Could not read {path}: {e}"));
            serde_json::from_str(&text).unwrap_or_else(|e| panic!("{path} is not a valid PipelineConfig: {e}"))
        }
        None => PipelineConfig::default(),
    };

    let result = run_default_pipeline(scenario.table, scenario.body, &config)
        .unwrap_or_else(|e| panic!("Pipeline failed on {scenario_name}: {e}"));

    println!("scenario: {scenario_name}");
    println!("total changes: {}, total execution time: {}ms", result.total_changes, result.total_execution_time_ms);
    for pass_result in &result.pass_results {
        println!(
            "  {}: changed={} visited={} changed_nodes={} time={}ms",
            pass_result.name,
            pass_result.changed,
            pass_result.metrics.nodes_visited,
            pass_result.metrics.nodes_changed,
            pass_result.metrics.execution_time_ms
        );
        for warning in &pass_result.warnings {
            println!("    warning: {warning}");
        }
        for error in &pass_result.errors {
            println!("    error: {error}");
        }
    }
}
