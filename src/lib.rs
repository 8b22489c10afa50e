//! # Vehicle Gateway Library
//!
//! Keeps one OAuth2 session with a vehicle-control API alive and forwards
//! authenticated calls on behalf of a single trusted client.
//!
//! Modules:
//! - `token`: token record, durable store, lifecycle manager (refresh, single-flight)
//! - `oauth`: token endpoint client, login redirect and code exchange
//! - `executor`: authenticated call with one reactive refresh on 401
//! - `server`: axum routes: login/callback/status and key-guarded API pass-through
//! - `config`: YAML service configuration with env expansion and validation

pub mod config;
pub mod errors;
pub mod executor;
pub mod helpers;
pub mod oauth;
pub mod observability;
pub mod server;
#[cfg(test)]
mod tests;
pub mod token;
pub mod utils;

pub use crate::config::service::ServiceConfig;
pub use crate::errors::{ApiError, AuthError};
pub use crate::executor::{CallExecutor, RequestDescriptor};
pub use crate::token::manager::TokenManager;
pub use crate::token::record::TokenRecord;
