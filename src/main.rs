//! mockwire - CLI Entry Point

use anyhow::Result;
use clap::Parser;
use mockwire::{Suite, Supervisor};
use std::path::PathBuf;
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser, Debug)]
#[command(
    name = "mockwire",
    about = "Service virtualization - canned responses over HTTP and AMQP",
    version
)]
struct Args {
    /// Suite directory (defaults to the current directory)
    #[arg(short = 'd', long = "dir", value_name = "DIR")]
    dir: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short = 'L', long, default_value = "info")]
    log_level: Level,

    /// Validate the suite and exit
    #[arg(long)]
    validate: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let subscriber = FmtSubscriber::builder()
        .with_max_level(args.log_level)
        .with_target(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let work_dir = match args.dir {
        Some(dir) => dir,
        None => std::env::current_dir()?,
    };

    info!(path = %work_dir.display(), "Loading suite");
    let suite = Suite::load(&work_dir)?;

    if args.validate {
        let endpoints: usize = suite.listen.iter().map(|l| l.endpoints.len()).sum();
        println!(
            "Suite is valid ({} connections, {} listen groups, {} endpoints)",
            suite.connections.len(),
            suite.listen.len(),
            endpoints
        );
        return Ok(());
    }

    let supervisor = Supervisor::new(&suite)?;
    supervisor
        .run(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!(error = %e, "Failed to listen for Ctrl-C");
                std::future::pending::<()>().await;
            }
        })
        .await
}
