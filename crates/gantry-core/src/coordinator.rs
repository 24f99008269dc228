//! Per-request orchestration across gate, resolver, store and pipeline.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::error::{Error, Result};
use crate::gate::TargetGate;
use crate::github::UpstreamRegistry;
use crate::pipeline::ArtifactPipeline;
use crate::resolver::RunResolver;
use crate::run_cache::RunCache;
use crate::store::ArtifactStore;
use crate::target::Target;

struct TargetState {
    spec: Target,
    gate: TargetGate,
    runs: RunCache,
}

/// Location of a file inside a materialized artifact.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedFile {
    /// Workflow run the artifact belongs to.
    pub run_id: u64,
    /// Artifact whose archive carries the file.
    pub artifact_id: u64,
    /// Path of the file (or artifact directory) in the cache tree.
    pub path: PathBuf,
}

/// Coordinates one artifact request end to end.
///
/// Each configured target owns a capacity-one gate and a run cache; a request
/// holds the gate from resolution through materialization so concurrent
/// requests for the same target collapse into one upstream download.
pub struct RequestCoordinator {
    targets: HashMap<String, TargetState>,
    upstream: UpstreamRegistry,
    store: ArtifactStore,
    pipeline: ArtifactPipeline,
    gate_timeout: Duration,
}

impl RequestCoordinator {
    /// Builds a coordinator over the configured targets.
    ///
    /// `cache_ttl` bounds how long resolved run metadata is reused and
    /// `gate_timeout` bounds how long a request waits for its target's gate.
    ///
    /// # Errors
    /// Returns [`Error::Internal`] if the artifact pipeline cannot be
    /// constructed.
    pub fn new(
        targets: HashMap<String, Target>,
        upstream: UpstreamRegistry,
        store: ArtifactStore,
        cache_ttl: Duration,
        gate_timeout: Duration,
    ) -> Result<Self> {
        let pipeline = ArtifactPipeline::new(store.clone())?;
        let targets = targets
            .into_iter()
            .map(|(name, spec)| {
                let state = TargetState {
                    spec,
                    gate: TargetGate::new(),
                    runs: RunCache::new(cache_ttl),
                };
                (name, state)
            })
            .collect();

        Ok(Self {
            targets,
            upstream,
            store,
            pipeline,
            gate_timeout,
        })
    }

    /// The store this coordinator materializes artifacts into.
    #[must_use]
    pub fn store(&self) -> &ArtifactStore {
        &self.store
    }

    /// Resolves a request to a file in the cache tree, downloading and
    /// extracting the owning artifact first when it is not cached yet.
    ///
    /// `file` is the path inside the artifact; empty means the artifact
    /// directory itself. The target's gate is held for the whole operation.
    ///
    /// # Errors
    /// [`Error::NotFound`] for unknown targets, runs, artifacts or files,
    /// [`Error::MalformedRunReference`] for an unparseable reference,
    /// [`Error::GateTimeout`] when the gate stays busy past the configured
    /// timeout, and the resolver's or pipeline's errors otherwise.
    pub async fn resolve_file(
        &self,
        target_name: &str,
        reference: &str,
        artifact_name: &str,
        file: &str,
    ) -> Result<ResolvedFile> {
        let state = self
            .targets
            .get(target_name)
            .ok_or_else(|| Error::not_found(format!("unknown target '{target_name}'")))?;

        let _permit = state.gate.acquire(target_name, self.gate_timeout).await?;

        let backend = self.upstream.backend(&state.spec.token)?;
        let resolver = RunResolver::new(Arc::clone(&backend));
        let resolved = resolver
            .resolve(
                &state.spec,
                &state.runs,
                reference,
                artifact_name,
                Instant::now(),
            )
            .await?;

        let file = file.trim_start_matches('/');
        if self.store.contains(resolved.artifact.id).await {
            tracing::debug!(
                target = target_name,
                artifact_id = resolved.artifact.id,
                "artifact already cached"
            );
        } else {
            self.pipeline
                .materialize(backend.as_ref(), &state.spec, &resolved.artifact, file)
                .await?;
        }

        let dir = self.store.artifact_dir(resolved.artifact.id);
        let path = if file.is_empty() { dir } else { dir.join(file) };
        Ok(ResolvedFile {
            run_id: resolved.run_id,
            artifact_id: resolved.artifact.id,
            path,
        })
    }
}
