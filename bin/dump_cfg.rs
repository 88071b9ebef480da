// Dumps the basic-block graph the CFG builder produces for a built-in
// sample program. No parser lives in this crate (§1), so the input is
// selected by name rather than read from a file.

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

    let state = ProgramState::build(scenario.table, scenario.body)
        .unwrap_or_else(|e| panic!("Failed to build CFG for {scenario_name}: {e}"));

    println!("{}", dump(&state));
}

fn dump(state: &ProgramState) -> String {
    let cfg = &state.cfg;
    let mut out = String::new();
    out += &format!("entry: {}\nexit: {}\n\n", cfg.entry, cfg.exit);

    for bb in cfg.reverse_postorder() {
        let block = cfg.block(bb);
        let header = if cfg.loop_headers.contains(&bb) { format!("{bb} (loop header)") } else { bb.to_string() };
        out += &format!("{header}:\n");
        out += &format!("  stmts: {} node(s)\n", block.stmts.len());
        for (succ, kind) in cfg.succ(bb) {
            out += &format!("  -> {succ} [{kind:?}]\n");
        }
        out += "\n";
    }
    out
}
