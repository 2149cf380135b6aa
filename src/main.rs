use clap::Parser;
use dropsort::cli::{Cli, run};
use dropsort::logging;
use dropsort::output::OutputFormatter;

fn main() {
    let cli = Cli::parse();

    if let Err(e) = logging::init(cli.verbose) {
        eprintln!("Failed to initialise logging: {}", e);
    }

    if let Err(e) = run(cli) {
        OutputFormatter::error(&e.to_string());
        std::process::exit(1);
    }
}
