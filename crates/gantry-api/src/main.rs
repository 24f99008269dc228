//! gantry binary entrypoint.

#![forbid(unsafe_code)]
#![deny(rust_2018_idioms)]

use clap::Parser;

use gantry_api::config::{Args, Config, normalize_base_path};
use gantry_api::server::Server;
use gantry_core::coordinator::RequestCoordinator;
use gantry_core::github::UpstreamRegistry;
use gantry_core::observability::init_logging;
use gantry_core::store::ArtifactStore;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_logging(args.log_format.into());

    let config = Config::load(&args.config)?;
    let base_path = normalize_base_path(&args.http_base_path)?;

    let store = ArtifactStore::new(&args.download_dir);
    store.ensure_layout().await?;

    let Config { tokens, targets } = config;
    tracing::info!(
        targets = targets.len(),
        download_dir = %args.download_dir.display(),
        cache_ttl = ?args.github_api_cache_ttl,
        "Loaded proxy configuration"
    );

    let coordinator = RequestCoordinator::new(
        targets,
        UpstreamRegistry::new(tokens),
        store,
        args.github_api_cache_ttl,
        args.target_lock_timeout,
    )?;

    Server::new(coordinator, args.http_addr, base_path).serve().await
}
