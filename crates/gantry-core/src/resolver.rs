//! Resolution of run references to concrete artifacts.

use std::sync::Arc;
use std::time::Instant;

use crate::error::{Error, Result};
use crate::github::ActionsBackend;
use crate::run_cache::{CachedRun, RunCache};
use crate::target::{RunReference, Target};

/// Resolves `(target, run reference, artifact name)` to a concrete run and
/// artifact descriptor, consulting the target's run cache first.
pub struct RunResolver {
    backend: Arc<dyn ActionsBackend>,
}

impl RunResolver {
    /// Creates a resolver querying the given backend on cache misses.
    #[must_use]
    pub fn new(backend: Arc<dyn ActionsBackend>) -> Self {
        Self { backend }
    }

    /// Resolves `reference` for `target`, returning the cached entry when it
    /// is still fresh at `now` and querying upstream otherwise.
    ///
    /// A fresh resolution is stored under the verbatim `reference` string,
    /// overwriting any prior entry.
    ///
    /// # Errors
    /// [`Error::MalformedRunReference`] for an unparseable reference,
    /// [`Error::NotFound`] when no run or artifact matches, and the
    /// backend's errors otherwise.
    pub async fn resolve(
        &self,
        target: &Target,
        cache: &RunCache,
        reference: &str,
        artifact_name: &str,
        now: Instant,
    ) -> Result<CachedRun> {
        if let Some(hit) = cache.get(reference, now)? {
            tracing::debug!(
                run_id = hit.run_id,
                artifact_id = hit.artifact.id,
                "using cached run metadata"
            );
            return Ok(hit);
        }

        let run_id = match reference.parse::<RunReference>()? {
            RunReference::Latest => self.latest_run_id(target).await?,
            RunReference::Id(id) => {
                self.backend
                    .workflow_run(&target.owner, &target.repo, id)
                    .await?
                    .id
            }
        };

        let artifacts = self
            .backend
            .run_artifacts(&target.owner, &target.repo, run_id)
            .await?;
        tracing::info!(
            workflow = %target.workflow_file,
            run_id,
            amount = artifacts.len(),
            "retrieved workflow artifacts"
        );

        let artifact = artifacts
            .into_iter()
            .find(|artifact| artifact.name == artifact_name)
            .ok_or_else(|| {
                Error::not_found(format!(
                    "run {run_id} has no artifact named '{artifact_name}'"
                ))
            })?;

        let entry = CachedRun {
            run_id,
            artifact,
            fetched_at: now,
        };
        cache.insert(reference, entry.clone())?;
        Ok(entry)
    }

    async fn latest_run_id(&self, target: &Target) -> Result<u64> {
        let runs = self
            .backend
            .list_workflow_runs(
                &target.owner,
                &target.repo,
                &target.workflow_file,
                target.latest_filter.as_ref(),
            )
            .await?;
        tracing::info!(
            workflow = %target.workflow_file,
            amount = runs.len(),
            "retrieved workflow runs"
        );

        // The listing exposes no sort parameter; the head of the default
        // ordering is taken as the latest run.
        runs.first().map(|run| run.id).ok_or_else(|| {
            Error::not_found(format!(
                "workflow '{}' has no matching runs",
                target.workflow_file
            ))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::github::{Artifact, WorkflowRun};
    use crate::target::LatestFilter;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[derive(Default)]
    struct FakeBackend {
        runs: Vec<WorkflowRun>,
        artifacts: HashMap<u64, Vec<Artifact>>,
        list_calls: AtomicUsize,
        lookup_calls: AtomicUsize,
        artifact_calls: AtomicUsize,
    }

    fn run(id: u64) -> WorkflowRun {
        WorkflowRun {
            id,
            head_branch: Some("master".to_string()),
            event: Some("push".to_string()),
            status: Some("completed".to_string()),
            conclusion: Some("success".to_string()),
            created_at: None,
        }
    }

    fn artifact(id: u64, name: &str) -> Artifact {
        Artifact {
            id,
            name: name.to_string(),
            size_in_bytes: 1024,
            created_at: None,
        }
    }

    #[async_trait]
    impl ActionsBackend for FakeBackend {
        async fn list_workflow_runs(
            &self,
            _owner: &str,
            _repo: &str,
            _workflow_file: &str,
            _filter: Option<&LatestFilter>,
        ) -> crate::error::Result<Vec<WorkflowRun>> {
            self.list_calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.runs.clone())
        }

        async fn workflow_run(
            &self,
            _owner: &str,
            _repo: &str,
            run_id: u64,
        ) -> crate::error::Result<WorkflowRun> {
            self.lookup_calls.fetch_add(1, Ordering::SeqCst);
            self.runs
                .iter()
                .find(|run| run.id == run_id)
                .cloned()
                .ok_or_else(|| Error::not_found(format!("run {run_id}")))
        }

        async fn run_artifacts(
            &self,
            _owner: &str,
            _repo: &str,
            run_id: u64,
        ) -> crate::error::Result<Vec<Artifact>> {
            self.artifact_calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.artifacts.get(&run_id).cloned().unwrap_or_default())
        }

        async fn artifact_download_url(
            &self,
            _owner: &str,
            _repo: &str,
            artifact_id: u64,
        ) -> crate::error::Result<String> {
            Ok(format!("https://blobs.test/{artifact_id}.zip"))
        }
    }

    fn target() -> Target {
        Target {
            token: "ci".to_string(),
            owner: "menta".to_string(),
            repo: "menta".to_string(),
            workflow_file: "ci.yml".to_string(),
            latest_filter: None,
        }
    }

    fn backend_with(
        runs: Vec<WorkflowRun>,
        artifacts: HashMap<u64, Vec<Artifact>>,
    ) -> Arc<FakeBackend> {
        Arc::new(FakeBackend {
            runs,
            artifacts,
            ..FakeBackend::default()
        })
    }

    #[tokio::test]
    async fn latest_resolves_to_head_of_listing() {
        let backend = backend_with(
            vec![run(42), run(41)],
            HashMap::from([(42, vec![artifact(777, "coverage")])]),
        );
        let resolver = RunResolver::new(Arc::clone(&backend) as Arc<dyn ActionsBackend>);
        let cache = RunCache::new(Duration::from_secs(300));

        let resolved = resolver
            .resolve(&target(), &cache, "latest", "coverage", Instant::now())
            .await
            .expect("resolve");

        assert_eq!(resolved.run_id, 42);
        assert_eq!(resolved.artifact.id, 777);
        assert_eq!(backend.list_calls.load(Ordering::SeqCst), 1);
        assert_eq!(backend.lookup_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn fresh_cache_entries_skip_upstream() {
        let backend = backend_with(
            vec![run(42)],
            HashMap::from([(42, vec![artifact(777, "coverage")])]),
        );
        let resolver = RunResolver::new(Arc::clone(&backend) as Arc<dyn ActionsBackend>);
        let cache = RunCache::new(Duration::from_secs(300));
        let t0 = Instant::now();

        resolver
            .resolve(&target(), &cache, "latest", "coverage", t0)
            .await
            .expect("first resolve");
        let hit = resolver
            .resolve(&target(), &cache, "latest", "coverage", t0 + Duration::from_secs(10))
            .await
            .expect("second resolve");

        assert_eq!(hit.artifact.id, 777);
        assert_eq!(backend.list_calls.load(Ordering::SeqCst), 1);
        assert_eq!(backend.artifact_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn expired_cache_entries_resolve_again() {
        let ttl = Duration::from_secs(300);
        let backend = backend_with(
            vec![run(42)],
            HashMap::from([(42, vec![artifact(777, "coverage")])]),
        );
        let resolver = RunResolver::new(Arc::clone(&backend) as Arc<dyn ActionsBackend>);
        let cache = RunCache::new(ttl);
        let t0 = Instant::now();

        resolver
            .resolve(&target(), &cache, "latest", "coverage", t0)
            .await
            .expect("first resolve");
        resolver
            .resolve(
                &target(),
                &cache,
                "latest",
                "coverage",
                t0 + ttl + Duration::from_millis(1),
            )
            .await
            .expect("second resolve");

        assert_eq!(backend.list_calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn explicit_run_ids_use_the_run_lookup() {
        let backend = backend_with(
            vec![run(42)],
            HashMap::from([(42, vec![artifact(777, "coverage")])]),
        );
        let resolver = RunResolver::new(Arc::clone(&backend) as Arc<dyn ActionsBackend>);
        let cache = RunCache::new(Duration::from_secs(300));

        let resolved = resolver
            .resolve(&target(), &cache, "42", "coverage", Instant::now())
            .await
            .expect("resolve");

        assert_eq!(resolved.run_id, 42);
        assert_eq!(backend.lookup_calls.load(Ordering::SeqCst), 1);
        assert_eq!(backend.list_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn latest_and_explicit_ids_cache_independently() {
        let backend = backend_with(
            vec![run(42)],
            HashMap::from([(42, vec![artifact(777, "coverage")])]),
        );
        let resolver = RunResolver::new(Arc::clone(&backend) as Arc<dyn ActionsBackend>);
        let cache = RunCache::new(Duration::from_secs(300));
        let t0 = Instant::now();

        resolver
            .resolve(&target(), &cache, "latest", "coverage", t0)
            .await
            .expect("latest");
        resolver
            .resolve(&target(), &cache, "42", "coverage", t0)
            .await
            .expect("explicit");

        assert_eq!(backend.list_calls.load(Ordering::SeqCst), 1);
        assert_eq!(backend.lookup_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn unparseable_references_are_malformed() {
        let backend = backend_with(vec![], HashMap::new());
        let resolver = RunResolver::new(Arc::clone(&backend) as Arc<dyn ActionsBackend>);
        let cache = RunCache::new(Duration::from_secs(300));

        let err = resolver
            .resolve(&target(), &cache, "newest", "coverage", Instant::now())
            .await
            .unwrap_err();

        assert!(matches!(err, Error::MalformedRunReference { reference } if reference == "newest"));
        assert_eq!(backend.list_calls.load(Ordering::SeqCst), 0);
        assert_eq!(backend.lookup_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn empty_run_listing_is_not_found() {
        let backend = backend_with(vec![], HashMap::new());
        let resolver = RunResolver::new(Arc::clone(&backend) as Arc<dyn ActionsBackend>);
        let cache = RunCache::new(Duration::from_secs(300));

        let err = resolver
            .resolve(&target(), &cache, "latest", "coverage", Instant::now())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::NotFound { .. }));
    }

    #[tokio::test]
    async fn missing_run_is_not_found() {
        let backend = backend_with(vec![run(42)], HashMap::new());
        let resolver = RunResolver::new(Arc::clone(&backend) as Arc<dyn ActionsBackend>);
        let cache = RunCache::new(Duration::from_secs(300));

        let err = resolver
            .resolve(&target(), &cache, "999", "coverage", Instant::now())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::NotFound { .. }));
    }

    #[tokio::test]
    async fn missing_artifact_name_is_not_found() {
        let backend = backend_with(
            vec![run(42)],
            HashMap::from([(42, vec![artifact(777, "coverage")])]),
        );
        let resolver = RunResolver::new(Arc::clone(&backend) as Arc<dyn ActionsBackend>);
        let cache = RunCache::new(Duration::from_secs(300));

        let err = resolver
            .resolve(&target(), &cache, "latest", "docs", Instant::now())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::NotFound { .. }));
    }

    #[tokio::test]
    async fn failed_resolutions_are_not_cached() {
        let backend = backend_with(vec![], HashMap::new());
        let resolver = RunResolver::new(Arc::clone(&backend) as Arc<dyn ActionsBackend>);
        let cache = RunCache::new(Duration::from_secs(300));
        let t0 = Instant::now();

        let _ = resolver
            .resolve(&target(), &cache, "latest", "coverage", t0)
            .await
            .unwrap_err();
        let _ = resolver
            .resolve(&target(), &cache, "latest", "coverage", t0)
            .await
            .unwrap_err();

        assert_eq!(backend.list_calls.load(Ordering::SeqCst), 2);
    }
}
