use anyhow::Result;
use clap::Parser;

use oauth2_cli::cli::{Cli, Command};
use oauth2_cli::commands::{expand_config_dir, run_authorize, version_info};

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    if let Err(e) = run(cli) {
        eprintln!("{:#}", e);
        std::process::exit(1);
    }
}

fn init_logging(verbose: bool) {
    let default_filter = if verbose { "oauth2_cli=debug" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter))
        .format_timestamp(None)
        .init();
}

fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Command::Authorize(args) => {
            let config_dir = expand_config_dir(&cli.config)?;
            let output = run_authorize(&config_dir, &args)?;
            println!("{}", output);
        }
        Command::Version => println!("{}", version_info()),
    }
    Ok(())
}
