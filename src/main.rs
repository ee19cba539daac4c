use clap::Parser;
use gateway::{config::CliArgs, logging::init_logging, server};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = CliArgs::parse();
    let config = args.load()?;
    let _log_guard = init_logging(&config.logging)?;

    server::startup(config).await
}
