// SPDX-License-Identifier: Apache-2.0
//! Node registry, module distribution, match deployment, autoscaling, and
//! node proxying for the control plane.
#![forbid(unsafe_code)]
#![deny(missing_docs, rust_2018_idioms, unused_must_use)]
#![deny(
    clippy::all,
    clippy::pedantic,
    clippy::nursery,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::todo,
    clippy::unimplemented,
    clippy::dbg_macro,
    clippy::print_stdout,
    clippy::print_stderr
)]
#![allow(
    clippy::must_use_candidate,
    clippy::missing_const_for_fn,
    clippy::module_name_repetitions
)]

pub mod artifact;
pub mod autoscaler;
pub mod config;
pub mod deploy;
pub mod node;
pub mod proxy;
pub mod transport;

pub use artifact::{ModuleArtifact, ModuleDistributor, NodeDistributionResult};
pub use autoscaler::{Autoscaler, Recommendation};
pub use config::{ControlPlaneConfig, ProxyConfig};
pub use deploy::{Deployment, DeploymentStatus, MatchDeployer, MatchSpec};
pub use node::{Node, NodeId, NodeMetrics, NodeRegistry, NodeStatus};
pub use proxy::{NodeProxy, ProxyRequest, ProxyResponse};
pub use transport::{CreateMatchAck, CreateMatchRequest, DistributeOutcome, NodeTransport};
