// SPDX-License-Identifier: Apache-2.0
//! Container lifecycle, tick loop, player sessions, and the process-wide
//! container registry for the simulation-hosting platform.
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

pub mod container;
pub mod manager;
pub mod persistence;
pub mod session;

pub use container::{
    spawn_container, AutoAdvance, CommandSummary, Container, ContainerConfig, ContainerDescriptor,
    ContainerHandle, ContainerStatus, MatchDescriptor, DEFAULT_AUTO_ADVANCE_INTERVAL_MS,
};
pub use manager::ContainerManager;
pub use persistence::{
    ContainerStateStore, InMemoryContainerStateStore, InMemoryHistoryStore, InMemoryMatchStateStore,
    MatchStateRecord, NullHistoryStore, HistoryStore, MatchStateStore, PersistenceConfig,
};
pub use session::{Session, SCOPE_RECEIVE_ERRORS, SCOPE_SUBMIT_COMMANDS, SCOPE_VIEW_SNAPSHOTS};
