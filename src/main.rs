//! padrelay: TLS relay with optional length hiding.
//!
//! Terminates TLS from each origin, opens a fresh TLS session to the
//! configured destination and forwards between the two, optionally padding
//! every write so that record lengths no longer reveal payload lengths.

use std::process::ExitCode;

use clap::Parser;
use padrelay_relay::cli::RelayArgs;

#[tokio::main]
async fn main() -> ExitCode {
    let args = RelayArgs::parse();

    match padrelay_relay::cli::run(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}
