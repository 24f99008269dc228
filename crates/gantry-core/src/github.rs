//! GitHub Actions API access.
//!
//! [`GithubClient`] is a thin authenticated client over the four REST calls
//! the proxy needs; [`ActionsBackend`] is the seam tests implement with
//! fakes. Clients are constructed once per credential and shared through the
//! [`UpstreamRegistry`].

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::header::{self, HeaderMap, HeaderValue};
use reqwest::{StatusCode, redirect};
use serde::Deserialize;

use crate::error::{Error, Result};
use crate::target::LatestFilter;

const DEFAULT_API_BASE: &str = "https://api.github.com";
const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
const USER_AGENT: &str = concat!("gantry/", env!("CARGO_PKG_VERSION"));
const API_VERSION: &str = "2022-11-28";

/// One workflow run as reported by the upstream API.
#[derive(Debug, Clone, Deserialize)]
pub struct WorkflowRun {
    /// Upstream run id.
    pub id: u64,
    /// Branch the run was triggered on.
    #[serde(default)]
    pub head_branch: Option<String>,
    /// Event that triggered the run.
    #[serde(default)]
    pub event: Option<String>,
    /// Current run status.
    #[serde(default)]
    pub status: Option<String>,
    /// Final conclusion, if the run completed.
    #[serde(default)]
    pub conclusion: Option<String>,
    /// When the run was created upstream.
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

/// One build artifact belonging to a workflow run.
///
/// This is the resolved descriptor the run cache stores: a pointer into the
/// upstream artifact list, not the artifact content.
#[derive(Debug, Clone, Deserialize)]
pub struct Artifact {
    /// Upstream artifact id; names the on-disk cache directory.
    pub id: u64,
    /// Artifact name as declared by the workflow.
    pub name: String,
    /// Archive size in bytes, as reported upstream.
    #[serde(default)]
    pub size_in_bytes: u64,
    /// When the artifact was created upstream.
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
struct ListRunsResponse {
    #[serde(default)]
    workflow_runs: Vec<WorkflowRun>,
}

#[derive(Debug, Deserialize)]
struct ListArtifactsResponse {
    #[serde(default)]
    artifacts: Vec<Artifact>,
}

/// The four upstream operations the proxy performs.
///
/// Every method distinguishes "not found" from other upstream failures so
/// callers can map them to different responses.
#[async_trait]
pub trait ActionsBackend: Send + Sync {
    /// Lists runs of a workflow file, most recent first, optionally narrowed
    /// by a server-side filter.
    ///
    /// # Errors
    /// [`Error::NotFound`] when the repository or workflow is unknown
    /// upstream; [`Error::Upstream`] for any other failure.
    async fn list_workflow_runs(
        &self,
        owner: &str,
        repo: &str,
        workflow_file: &str,
        filter: Option<&LatestFilter>,
    ) -> Result<Vec<WorkflowRun>>;

    /// Fetches a single run by id.
    ///
    /// # Errors
    /// [`Error::NotFound`] when the run does not exist; [`Error::Upstream`]
    /// for any other failure.
    async fn workflow_run(&self, owner: &str, repo: &str, run_id: u64) -> Result<WorkflowRun>;

    /// Lists the artifacts belonging to a run.
    ///
    /// # Errors
    /// [`Error::NotFound`] when the run does not exist; [`Error::Upstream`]
    /// for any other failure.
    async fn run_artifacts(&self, owner: &str, repo: &str, run_id: u64) -> Result<Vec<Artifact>>;

    /// Obtains a time-limited download URL for an artifact archive.
    ///
    /// # Errors
    /// [`Error::Upstream`] when no redirect is produced; [`Error::NotFound`]
    /// when the artifact is gone upstream.
    async fn artifact_download_url(
        &self,
        owner: &str,
        repo: &str,
        artifact_id: u64,
    ) -> Result<String>;
}

impl std::fmt::Debug for dyn ActionsBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("ActionsBackend")
    }
}

/// Authenticated client for the GitHub REST API.
///
/// Redirect following is disabled so the artifact download endpoint's `302`
/// can be captured as a URL instead of being chased.
#[derive(Clone)]
pub struct GithubClient {
    api_base: String,
    client: reqwest::Client,
}

impl GithubClient {
    /// Creates a client that authenticates with the given token.
    ///
    /// # Errors
    /// Returns [`Error::Internal`] if the token is not a valid header value
    /// or the underlying HTTP client cannot be constructed.
    pub fn new(token: &str) -> Result<Self> {
        let mut auth = HeaderValue::from_str(&format!("Bearer {token}"))
            .map_err(|e| Error::internal_with_source("token is not a valid header value", e))?;
        auth.set_sensitive(true);

        let mut headers = HeaderMap::new();
        headers.insert(header::AUTHORIZATION, auth);
        headers.insert(
            header::ACCEPT,
            HeaderValue::from_static("application/vnd.github+json"),
        );
        headers.insert(
            "x-github-api-version",
            HeaderValue::from_static(API_VERSION),
        );

        let client = reqwest::Client::builder()
            .timeout(DEFAULT_REQUEST_TIMEOUT)
            .redirect(redirect::Policy::none())
            .user_agent(USER_AGENT)
            .default_headers(headers)
            .build()
            .map_err(|e| Error::internal_with_source("failed to construct http client", e))?;

        Ok(Self {
            api_base: DEFAULT_API_BASE.to_string(),
            client,
        })
    }

    /// Overrides the API base URL (tests point this at a local server).
    #[must_use]
    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into();
        self.api_base = self.api_base.trim_end_matches('/').to_string();
        self
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.api_base)
    }

    async fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        context: &'static str,
        request: reqwest::RequestBuilder,
    ) -> Result<T> {
        let response = request
            .send()
            .await
            .map_err(|e| Error::upstream_with_source(format!("{context} request failed"), e))?;

        if !response.status().is_success() {
            return Err(upstream_failure(context, response).await);
        }

        response
            .json::<T>()
            .await
            .map_err(|e| Error::upstream_with_source(format!("invalid {context} response"), e))
    }
}

/// Maps a non-success upstream response to an error, extracting the API's
/// `message` field when the body carries one.
async fn upstream_failure(context: &str, response: reqwest::Response) -> Error {
    let status = response.status();
    let body = response.bytes().await.unwrap_or_default();
    let message = serde_json::from_slice::<serde_json::Value>(&body)
        .ok()
        .and_then(|value| {
            value
                .get("message")
                .and_then(|v| v.as_str())
                .map(str::to_string)
        })
        .unwrap_or_else(|| String::from_utf8_lossy(&body).to_string());

    match status {
        StatusCode::NOT_FOUND | StatusCode::GONE => {
            Error::not_found(format!("{context}: {message}"))
        }
        _ => Error::upstream(format!("{context} failed ({status}): {message}")),
    }
}

#[async_trait]
impl ActionsBackend for GithubClient {
    async fn list_workflow_runs(
        &self,
        owner: &str,
        repo: &str,
        workflow_file: &str,
        filter: Option<&LatestFilter>,
    ) -> Result<Vec<WorkflowRun>> {
        let url = self.url(&format!(
            "/repos/{owner}/{repo}/actions/workflows/{workflow_file}/runs"
        ));
        let mut request = self.client.get(url);
        if let Some(filter) = filter {
            if let Some(branch) = &filter.branch {
                request = request.query(&[("branch", branch)]);
            }
            if let Some(event) = &filter.event {
                request = request.query(&[("event", event)]);
            }
            if let Some(status) = &filter.status {
                request = request.query(&[("status", status)]);
            }
        }

        let runs: ListRunsResponse = self.get_json("workflow run listing", request).await?;
        Ok(runs.workflow_runs)
    }

    async fn workflow_run(&self, owner: &str, repo: &str, run_id: u64) -> Result<WorkflowRun> {
        let url = self.url(&format!("/repos/{owner}/{repo}/actions/runs/{run_id}"));
        self.get_json("workflow run lookup", self.client.get(url))
            .await
    }

    async fn run_artifacts(&self, owner: &str, repo: &str, run_id: u64) -> Result<Vec<Artifact>> {
        let url = self.url(&format!(
            "/repos/{owner}/{repo}/actions/runs/{run_id}/artifacts"
        ));
        let request = self.client.get(url).query(&[("per_page", "100")]);
        let artifacts: ListArtifactsResponse = self.get_json("artifact listing", request).await?;
        Ok(artifacts.artifacts)
    }

    async fn artifact_download_url(
        &self,
        owner: &str,
        repo: &str,
        artifact_id: u64,
    ) -> Result<String> {
        let url = self.url(&format!(
            "/repos/{owner}/{repo}/actions/artifacts/{artifact_id}/zip"
        ));
        let response = self.client.get(url).send().await.map_err(|e| {
            Error::upstream_with_source("artifact download url request failed", e)
        })?;

        if response.status().is_redirection() {
            return response
                .headers()
                .get(header::LOCATION)
                .and_then(|value| value.to_str().ok())
                .map(str::to_string)
                .ok_or_else(|| {
                    Error::upstream("artifact download url response missing location header")
                });
        }

        Err(upstream_failure("artifact download url", response).await)
    }
}

/// GitHub clients keyed by credential id, constructed on first use.
///
/// Owned by the composition root. The lock is held only around map access;
/// after warm-up every lookup is a clone of an existing `Arc`.
pub struct UpstreamRegistry {
    api_base: Option<String>,
    credentials: HashMap<String, String>,
    clients: Mutex<HashMap<String, Arc<dyn ActionsBackend>>>,
}

fn poison_err<T>(_: PoisonError<T>) -> Error {
    Error::internal("upstream registry lock poisoned")
}

impl UpstreamRegistry {
    /// Creates a registry over the configured credential map.
    #[must_use]
    pub fn new(credentials: HashMap<String, String>) -> Self {
        Self {
            api_base: None,
            credentials,
            clients: Mutex::new(HashMap::new()),
        }
    }

    /// Overrides the API base URL of clients constructed by this registry.
    #[must_use]
    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = Some(api_base.into());
        self
    }

    /// Pre-seeds a backend for a credential, bypassing client construction.
    ///
    /// # Errors
    /// Returns [`Error::Internal`] if the registry lock is poisoned.
    pub fn insert(
        &self,
        credential: impl Into<String>,
        backend: Arc<dyn ActionsBackend>,
    ) -> Result<()> {
        let mut clients = self.clients.lock().map_err(poison_err)?;
        clients.insert(credential.into(), backend);
        Ok(())
    }

    /// Returns the backend for a credential, constructing it on first use.
    ///
    /// # Errors
    /// Returns [`Error::Internal`] when the credential is not configured
    /// (configuration validation makes this unreachable for known targets)
    /// or client construction fails.
    pub fn backend(&self, credential: &str) -> Result<Arc<dyn ActionsBackend>> {
        let mut clients = self.clients.lock().map_err(poison_err)?;
        if let Some(backend) = clients.get(credential) {
            return Ok(Arc::clone(backend));
        }

        let token = self.credentials.get(credential).ok_or_else(|| {
            Error::internal(format!("credential '{credential}' is not configured"))
        })?;
        let mut client = GithubClient::new(token)?;
        if let Some(api_base) = &self.api_base {
            client = client.with_api_base(api_base.clone());
        }

        let backend: Arc<dyn ActionsBackend> = Arc::new(client);
        clients.insert(credential.to_string(), Arc::clone(&backend));
        Ok(backend)
    }
}
