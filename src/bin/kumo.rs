//! Shim binary that calls into the `kumo_bridge` library's `inner_main`.
use clap::Parser as _;
use eyre::Result;

#[tokio::main]
async fn main() -> Result<()> {
    kumo_bridge::inner_main(kumo_bridge::cli::Cli::parse()).await
}
