// SPDX-License-Identifier: Apache-2.0
//! Component store, module/permission model, and shared error taxonomy for
//! the simulation-hosting platform.
//!
//! See the crate README for how this fits into the rest of the workspace.
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

#[cfg(any(test, feature = "testing"))]
pub mod builtin;
pub mod component;
pub mod config;
pub mod entity;
pub mod error;
pub mod module;
pub mod store;

pub use component::{AccessIntent, ComponentDescriptor, ComponentId, ComponentIdAllocator, PermissionLevel};
pub use config::{env_or, ConfigError, ConfigService, ConfigStore, InMemoryConfigStore};
pub use entity::{EntityAllocator, EntityId, EntityRange, RangeCursor};
pub use error::{ErrorKind, PlatformError, PlatformResult};
pub use module::{
    CommandDescriptor, CommandPayload, DescriptorRegistry, FieldType, FnSystem,
    InMemoryModuleCatalog, ModuleCatalog, ModuleDescriptor, ModuleFactory, PayloadValue, System,
    SystemView, ValidationIssue,
};
pub use store::{ComponentStore, StoreStats};
