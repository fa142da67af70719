use clap::Parser;
use tracing_subscriber::EnvFilter;

use pactwork::cli::{run, Cli};

fn main() {
    let cli = Cli::parse();

    let default_filter = if cli.debug { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)),
        )
        .with_writer(std::io::stderr)
        .init();

    if let Err(error) = run(cli) {
        eprintln!("error: {:#}", error);
        std::process::exit(1);
    }
}
