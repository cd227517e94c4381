// SPDX-License-Identifier: Apache-2.0
//! Users, roles, scopes, password hashing, signed bearer tokens, and the
//! request authorization filter.
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

pub mod config;
pub mod filter;
pub mod password;
pub mod role;
pub mod scope;
pub mod service;
pub mod token;
pub mod user;

pub use config::AuthConfig;
pub use filter::{authorize, authorize_match};
pub use password::{hash_password, verify_password, DEFAULT_BCRYPT_COST};
pub use role::{Role, RoleStore};
pub use scope::{matches, scope_matches};
pub use service::AuthService;
pub use token::{
    hash_api_token, ApiToken, AuthToken, Claims, MatchToken, TokenSigner, DEFAULT_MATCH_SCOPES,
};
pub use user::{User, UserStore};
