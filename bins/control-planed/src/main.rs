// SPDX-License-Identifier: Apache-2.0
//! `control-planed`: node registry, module distribution, match deployment,
//! autoscaling, and node proxying for the simulation-hosting platform
//!.

mod dto;
mod error;
mod http;
mod state;
mod transport;

use std::net::SocketAddr;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::state::AppState;

#[derive(Parser, Debug)]
#[command(author, version, about = "Control plane: node registry, module distribution, deployment, autoscaling")]
struct Args {
    /// Address to bind the HTTP listener on.
    #[arg(long, default_value = "0.0.0.0:7800")]
    listen: SocketAddr,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("info".parse()?))
        .init();

    let state = AppState::new();
    let app = http::router(state);

    let listener = tokio::net::TcpListener::bind(args.listen).await.context("bind listener")?;
    info!(listen = %args.listen, "control-planed listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("serve")?;

    Ok(())
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
    info!("shutdown signal received");
}
