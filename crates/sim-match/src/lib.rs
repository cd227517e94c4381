// SPDX-License-Identifier: Apache-2.0
//! Command queue, snapshot engine, and match lifecycle on top
//! of `sim-ecs`.
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

pub mod match_;
pub mod queue;
pub mod snapshot;
pub mod types;

pub use match_::Match;
pub use queue::{CommandQueue, QueuedCommand};
pub use snapshot::{
    capture, delta, filtered_capture, ComponentTable, Delta, HistoryInfo, Snapshot,
    SnapshotEngine, SnapshotHistory, SparseChanges, DEFAULT_HISTORY_CAPACITY,
};
pub use types::{ContainerId, MatchId, PlayerId};
