use clap::Parser;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::error;

use release_watchbot::{config, invoke};

#[derive(Debug, Parser)]
#[command(author, version, about = "Check watched repositories for new releases and announce them on Telegram")]
struct Args {
    /// Path to YAML config file (optional; defaults and environment apply when absent)
    #[arg(long, default_value = "config.yaml")]
    config: PathBuf,

    /// Print an example config file and exit
    #[arg(long)]
    example_config: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .with_target(false)
        .compact()
        .init();

    let args = Args::parse();
    if args.example_config {
        print!("{}", config::example());
        return ExitCode::SUCCESS;
    }

    let response = match config::load(Some(args.config.as_path())) {
        Ok(cfg) => invoke::handle(&cfg).await,
        Err(err) => {
            error!(%err, "failed to load configuration");
            invoke::failure(&err.into())
        }
    };

    match response.render_body() {
        Ok(rendered) => println!("{}", rendered),
        Err(err) => error!(%err, "failed to render response"),
    }

    if response.is_success() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}
