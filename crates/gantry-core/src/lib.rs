//! # gantry-core
//!
//! Core engine of the Gantry build artifact proxy.
//!
//! This crate turns `(target, run reference, artifact name, file)` requests
//! into files in a durable on-disk cache:
//!
//! - **Targets**: Configured views onto one workflow's artifacts
//! - **Resolution**: Run references (`latest` or a run id) resolved against
//!   the GitHub Actions API, with per-target metadata caching
//! - **Materialization**: Artifact archives downloaded once, validated and
//!   extracted into the cache tree
//! - **Coordination**: A per-target gate that collapses concurrent requests
//!   into a single upstream download
//!
//! ## Crate Boundary
//!
//! `gantry-core` owns every interaction with the upstream API and the cache
//! directory. HTTP serving lives in `gantry-api`; embedders needing the
//! engine without the server can depend on this crate alone.
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::collections::HashMap;
//! use std::time::Duration;
//!
//! use gantry_core::prelude::*;
//!
//! # async fn run() -> Result<()> {
//! let targets: HashMap<String, Target> = HashMap::new();
//! let tokens: HashMap<String, String> = HashMap::new();
//!
//! let coordinator = RequestCoordinator::new(
//!     targets,
//!     UpstreamRegistry::new(tokens),
//!     ArtifactStore::new("/var/lib/gantry"),
//!     Duration::from_secs(300),
//!     Duration::from_secs(30),
//! )?;
//! let file = coordinator
//!     .resolve_file("coverage", "latest", "coverage-report", "coverage.svg")
//!     .await?;
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![deny(rust_2018_idioms)]
#![warn(clippy::pedantic)]

pub mod coordinator;
pub mod error;
pub mod gate;
pub mod github;
pub mod observability;
pub mod pipeline;
pub mod resolver;
pub mod run_cache;
pub mod store;
pub mod target;

/// Prelude module for convenient imports.
///
/// # Example
///
/// ```rust
/// use gantry_core::prelude::*;
/// ```
pub mod prelude {
    pub use crate::coordinator::{RequestCoordinator, ResolvedFile};
    pub use crate::error::{Error, Result};
    pub use crate::github::{ActionsBackend, Artifact, GithubClient, UpstreamRegistry, WorkflowRun};
    pub use crate::store::ArtifactStore;
    pub use crate::target::{LatestFilter, RunReference, Target};
}

// Re-export key types at crate root for ergonomics
pub use coordinator::{RequestCoordinator, ResolvedFile};
pub use error::{Error, Result};
pub use gate::{GatePermit, TargetGate};
pub use github::{ActionsBackend, Artifact, GithubClient, UpstreamRegistry, WorkflowRun};
pub use observability::{LogFormat, init_logging};
pub use pipeline::ArtifactPipeline;
pub use resolver::RunResolver;
pub use run_cache::{CachedRun, RunCache};
pub use store::ArtifactStore;
pub use target::{LatestFilter, RunReference, Target};
