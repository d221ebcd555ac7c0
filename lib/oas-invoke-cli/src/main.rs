#![allow(missing_docs)]

use std::io::Write;
use std::process::ExitCode;

use anyhow::{Context, Result};
use oas_invoke_cli::{Command, HELP, assets, run_call, write_output};

#[tokio::main]
async fn main() -> Result<ExitCode> {
    tracing_subscriber::fmt()
        .pretty()
        .with_writer(std::io::stderr)
        .init();

    match Command::from_env()? {
        Command::Help => {
            std::io::stdout()
                .lock()
                .write_all(HELP.as_bytes())
                .context("writing help")?;
            Ok(ExitCode::SUCCESS)
        }
        Command::Call(args) => {
            let output = run_call(args).await?;
            write_output(std::io::stdout().lock(), &output)?;
            Ok(if output.is_success() {
                ExitCode::SUCCESS
            } else {
                ExitCode::FAILURE
            })
        }
        Command::Assets { addr, root } => {
            assets::run(addr, root).await?;
            Ok(ExitCode::SUCCESS)
        }
    }
}
