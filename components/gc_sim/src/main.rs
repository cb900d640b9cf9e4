//! gc-sim
//!
//! Entry point for the workload simulator. Parses CLI arguments, runs the
//! workload and prints the report.

use clap::Parser;
use gc_sim::{run, Cli, OutputFormat, SimError};

fn main() {
    let cli = Cli::parse();

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(cli.log_level())).init();

    if let Err(e) = execute(&cli) {
        match e {
            SimError::Gc(err) if err.is_fatal() => eprintln!("Fatal: {}", err),
            other => eprintln!("Error: {}", other),
        }
        std::process::exit(1);
    }
}

fn execute(cli: &Cli) -> Result<(), SimError> {
    let config = cli.gc_config()?;
    let workload = cli.workload()?;
    let report = run(config, &workload)?;
    match cli.format {
        OutputFormat::Text => println!("{}", report),
        OutputFormat::Json => println!("{}", report.to_json()?),
    }
    Ok(())
}
