//! # gantry-api
//!
//! HTTP boundary for the gantry artifact proxy. The crate wires the
//! resolution engine from `gantry-core` into an axum server and keeps the
//! handlers thin: parse the path, delegate to the coordinator, map the
//! outcome to a redirect or an error response.
//!
//! ## Endpoints
//!
//! ```text
//! GET /targets/:target/runs/:run/artifacts/:artifact        redirect to the artifact directory
//! GET /targets/:target/runs/:run/artifacts/:artifact/*file  redirect to a file in the artifact
//! GET /artifacts/*                                          static cache tree
//! GET /health                                               liveness probe
//! GET /ready                                                readiness probe
//! ```
//!
//! Redirect responses and everything served from `/artifacts` carry
//! `Cache-Control: no-cache` so clients re-resolve run references instead
//! of pinning stale artifact IDs.

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![deny(rust_2018_idioms)]
#![warn(clippy::pedantic)]

pub mod config;
pub mod error;
pub mod routes;
pub mod server;

pub use config::{Args, Config};
pub use error::{ApiError, ApiResult};
pub use server::Server;
