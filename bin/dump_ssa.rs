// Constructs SSA form over a built-in sample program and dumps phi
// placements and use-def chains. No parser lives in this crate (§1), so the
// input is selected by name rather than read from a file.

#[path = "fixtures.rs"]
mod fixtures;

use std::env;

use arachne_core::passes::ProgramState;

fn main() {
    let args: Vec<String> = env::args().collect();
    if args.len() < 2 {
        eprintln!("Usage: {} <scenario>", args[0]);
        eprintln!("Scenarios: {}", fixtures::available().join(", "));
        std::process::exit(1);
    }

    let scenario_name = &args[1];
    let scenario = fixtures::build(scenario_name).unwrap_or_else(|| {
        eprintln!("Unknown scenario: {scenario_name}");
        eprintln!("Scenarios: {}", fixtures::available().join(", "));
        std::process::exit(1);
    });

    let mut state = ProgramState::build(scenario.table, scenario.body)
        .unwrap_or_else(|e| panic!("Failed to build CFG for {scenario_name}: {e}"));
    state.construct_ssa().unwrap_or_else(|e| panic!("SSA construction failed for {scenario_name}: {e}"));

    println!("{}", dump(&state));
}

fn dump(state: &ProgramState) -> String {
    let ssa = state.ssa.as_ref().expect("construct_ssa was just called");
    let mut out = String::new();

    out += "phi nodes:\n";
    if ssa.phi_blocks.values().all(Vec::is_empty) {
        out += "  (none)\n";
    }
    for (bb, phis) in &ssa.phi_blocks {
        for &phi_id in phis {
            let phi = state.table.get(phi_id).as_phi().expect("phi_blocks entries are always phi nodes");
            out += &format!("  {bb}: {}_{} = phi(", phi.var, phi.target_version);
            let operands: Vec<String> = phi.operands.iter().map(|(pred, op)| format!("{pred}: {op:?}")).collect();
            out += &operands.join(", ");
            out += ")\n";
        }
    }

    out += &format!("\ndefinitions: {}\n", ssa.chains.defs.len());
    for ((name, version), def_id) in &ssa.chains.defs {
        let use_count = ssa.chains.uses.get(&(name.clone(), *version)).map_or(0, |u| u.len());
        out += &format!("  {name}_{version} defined at {def_id}, {use_count} use(s)\n");
    }

    out
}
