#![forbid(unsafe_code)]

//! `tn-node` — telemetry node durable-delivery core, CLI entry point.

use clap::Parser;
use telemetry_node::cli::{self, Cli};

fn main() {
    let cli = Cli::parse();
    if let Err(e) = cli::run(&cli) {
        eprintln!("[TN-CLI] {e}");
        std::process::exit(e.exit_code());
    }
}
