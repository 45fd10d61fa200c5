//! revtunnel - reverse-tunnel proxy routing tools

use anyhow::Result;
use clap::{CommandFactory, Parser};
use clap_complete::env::CompleteEnv;

use revtunnel::cli::commands::{completion, config, dial, version};
use revtunnel::cli::exit_code::ExitCode;
use revtunnel::cli::{Cli, Commands, LogFormat};

#[tokio::main]
async fn main() {
    // Handle dynamic shell completion if COMPLETE env var is set
    CompleteEnv::with_factory(Cli::command).complete();

    let cli = Cli::parse();

    let json = cli.log_format == LogFormat::Json;
    if let Err(e) = revtunnel::logging::init(cli.verbose, cli.quiet, json) {
        eprintln!("Warning: {}", e);
    }

    let code = match run(cli).await {
        Ok(()) => ExitCode::Success,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            ExitCode::for_error(&e)
        }
    };

    // Exit here rather than dropping the runtime: a `dial` whose target hung
    // up may still have a stdin read parked on a blocking thread.
    std::process::exit(i32::from(u8::from(code)));
}

async fn run(cli: Cli) -> Result<()> {
    let config_path = cli.config.as_deref();
    match cli.command {
        Commands::Dial(args) => dial::execute(args, config_path).await?,
        Commands::Config(args) => config::execute(args, config_path).await?,
        Commands::Version(args) => version::execute(args),
        Commands::Completion(args) => completion::execute(args),
    }
    Ok(())
}
