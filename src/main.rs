mod cli;
mod commands;
mod formatting;

use std::process::ExitCode;

use tracing_subscriber::EnvFilter;

use cli::Commands;
use commands::{run_clone, run_detect};

#[tokio::main]
async fn main() -> ExitCode {
    let args = cli::parse();
    init_tracing(args.verbose);

    match args.command {
        Commands::Clone {
            url,
            viewport,
            max_depth,
            no_assets,
            no_refine,
            output,
            format,
        } => {
            run_clone(
                args.config,
                args.verbose,
                url,
                viewport,
                max_depth,
                no_assets,
                no_refine,
                output,
                format,
            )
            .await
        }
        Commands::Detect {
            url,
            viewport,
            max_depth,
            output,
            format,
        } => {
            run_detect(
                args.config,
                args.verbose,
                url,
                viewport,
                max_depth,
                output,
                format,
            )
            .await
        }
    }
}

fn init_tracing(verbose: bool) {
    let default_filter = if verbose {
        "siteclone=debug,siteclone_lib=debug"
    } else {
        "siteclone=warn,siteclone_lib=warn"
    };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_filter));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}
