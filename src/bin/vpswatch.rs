//! Shim binary that calls into the `vpswatch_bot` library's `inner_main`.
use clap::Parser as _;
use eyre::Result;

#[tokio::main]
async fn main() -> Result<()> {
    // Delegate to library entrypoint
    vpswatch_bot::inner_main(vpswatch_bot::cli::Cli::parse()).await
}
