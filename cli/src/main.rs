use std::process::ExitCode;

use aplus::{cli::Cli, init_logging, load_config, run};
use aplus_engine::pipeline::EXIT_INVALID_INPUT;
use clap::Parser;
use color_eyre::Result;
use log::{error, warn};

#[tokio::main]
async fn main() -> Result<ExitCode> {
    color_eyre::install()?;
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let config = match load_config(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            error!("{e:?}");
            return Ok(ExitCode::from(EXIT_INVALID_INPUT));
        }
    };

    let interrupt = async {
        match tokio::signal::ctrl_c().await {
            Ok(()) => warn!("Interrupted, abandoning unfinished modules"),
            Err(e) => {
                warn!("Couldn't listen for Ctrl-C: {e}");
                std::future::pending::<()>().await
            }
        }
    };

    let code = run(cli, config, |name| std::env::var(name).ok(), interrupt).await;
    Ok(ExitCode::from(code))
}
