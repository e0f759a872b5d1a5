use anyhow::{Context, Result};
use clap::Parser;
use std::fs;
use std::io::Read;
use std::path::PathBuf;

use release_watchbot::markup;
use release_watchbot::model::{NotificationMessage, RepositoryRef};

#[derive(Debug, Parser)]
#[command(
    author,
    version,
    about = "Preview how release notes will look once converted to Telegram HTML"
)]
struct Args {
    /// Markdown file with release notes (reads stdin when omitted)
    #[arg(long)]
    input: Option<PathBuf>,

    /// Print the whole notification instead of just the converted notes
    #[arg(long)]
    full: bool,

    /// Repository shown in the notification title (with --full)
    #[arg(long, default_value = "owner/repo")]
    repo: RepositoryRef,

    /// Release name shown in the notification title (with --full)
    #[arg(long, default_value = "v0.0.0")]
    title: String,

    /// Release link (with --full)
    #[arg(long, default_value = "https://github.com/owner/repo/releases")]
    url: String,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .with_target(false)
        .compact()
        .init();

    let args = Args::parse();
    let raw = match &args.input {
        Some(path) => fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?,
        None => {
            let mut buf = String::new();
            std::io::stdin()
                .read_to_string(&mut buf)
                .context("failed to read stdin")?;
            buf
        }
    };

    if args.full {
        let message = NotificationMessage {
            repository: args.repo.to_string(),
            title: args.title,
            notes: markup::convert(Some(&raw)),
            url: args.url,
        };
        println!("{}", message.render());
    } else {
        println!("{}", markup::convert(Some(&raw)));
    }
    Ok(())
}
