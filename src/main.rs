use anyhow::Result;
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{Level, warn};

use kling_video::cli::{self, Cli};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose { Level::DEBUG } else { Level::INFO };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_target(false)
        .init();

    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted; cancelling monitoring and downloads");
            on_interrupt.cancel();
        }
    });

    let code = cli::run(cli, cancel).await?;
    std::process::exit(code);
}
