mod cli;
mod runtime;

use anyhow::Result;
use std::process::ExitCode;

#[tokio::main]
async fn main() -> Result<ExitCode> {
    // Main entrypoint simply delegates control to CLI layer.
    // The CLI parses the command line, then hands over to the runtime.
    cli::cli::run().await
}
