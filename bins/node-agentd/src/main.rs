// SPDX-License-Identifier: Apache-2.0
//! `node-agentd`: hosts containers, matches, and commands for one simulation
//! node, exposing the container-scoped HTTP/WebSocket surface.

mod dto;
mod error;
mod http;
mod modules;
mod state;
mod ws;

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::Router;
use clap::Parser;
use sim_ecs::module::InMemoryModuleCatalog;
use sim_runtime::ContainerManager;
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::modules::EntityModuleFactory;
use crate::state::AppState;

#[derive(Parser, Debug)]
#[command(author, version, about = "Simulation node agent: hosts containers, matches, and commands")]
struct Args {
    /// Address to bind the HTTP/WebSocket listener on.
    #[arg(long, default_value = "0.0.0.0:7700")]
    listen: SocketAddr,
    /// This node's self-reported identity, used in status responses and
    /// when registering with a control plane.
    #[arg(long, default_value = "node-1")]
    node_id: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("info".parse()?))
        .init();

    let mut catalog = InMemoryModuleCatalog::new();
    catalog.register(Arc::new(EntityModuleFactory));
    let containers = Arc::new(ContainerManager::new(Arc::new(catalog)));

    let state = AppState::new(containers, args.node_id.clone());

    let app = Router::new().merge(http::router(state.clone())).merge(ws::router(state));

    let listener = tokio::net::TcpListener::bind(args.listen).await.context("bind listener")?;
    info!(node_id = %args.node_id, listen = %args.listen, "node-agentd listening");

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
