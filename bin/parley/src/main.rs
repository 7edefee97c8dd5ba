//! Parley relay and peer binary.

mod cli;
mod config;
mod console;
mod logging;
mod peer;
mod relay;

#[tokio::main]
async fn main() -> eyre::Result<()> {
    cli::run().await
}
