//! `ferrite-server` binary entry point: parses CLI flags, resolves
//! configuration, wires up logging, and drives the server until a
//! shutdown signal arrives.

use clap::Parser;
use ferrite::config::{Cli, Options};
use ferrite::server::Server;
use std::process::ExitCode;
use std::sync::Arc;

#[tokio::main(flavor = "multi_thread")]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let options = match Options::load(&cli) {
        Ok(o) => o,
        Err(e) => {
            eprintln!("ferrite-server: configuration error: {e}");
            return ExitCode::FAILURE;
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::new(options.log_level.clone()))
        .init();

    let server = match Server::new(options) {
        Ok(s) => Arc::new(s),
        Err(e) => {
            tracing::error!(error = %e, "failed to start server");
            return ExitCode::FAILURE;
        }
    };

    tokio::select! {
        result = server.clone().run() => {
            if let Err(e) = result {
                tracing::error!(error = %e, "server exited with error");
                return ExitCode::FAILURE;
            }
        }
        _ = shutdown_signal() => {
            tracing::info!("shutdown signal received, exiting");
        }
    }

    ExitCode::SUCCESS
}

async fn shutdown_signal() {
    use tokio::signal::unix::{signal, SignalKind};

    let mut term = signal(SignalKind::terminate()).expect("failed to install SIGTERM handler");
    let mut interrupt = signal(SignalKind::interrupt()).expect("failed to install SIGINT handler");

    tokio::select! {
        _ = term.recv() => {}
        _ = interrupt.recv() => {}
    }
}
