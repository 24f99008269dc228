//! Targets: the configured upstream coordinates artifacts are resolved against.

use std::fmt;
use std::str::FromStr;

use serde::Deserialize;

use crate::error::Error;

/// A named upstream repository/workflow coordinate.
///
/// Targets are immutable after configuration load and live for the process
/// lifetime. The runtime state attached to a target (its gate and run cache)
/// is owned by the [`RequestCoordinator`](crate::coordinator::RequestCoordinator).
#[derive(Debug, Clone, Deserialize)]
pub struct Target {
    /// Credential id; must name an entry in the configured token map.
    pub token: String,
    /// Repository owner (user or organization).
    pub owner: String,
    /// Repository name.
    pub repo: String,
    /// Workflow file name within the repository (e.g. `ci.yml`).
    #[serde(rename = "filename")]
    pub workflow_file: String,
    /// Filter applied when resolving the `latest` run reference.
    #[serde(default)]
    pub latest_filter: Option<LatestFilter>,
}

/// Narrows which workflow runs qualify as `latest`.
///
/// All fields are optional and combine conjunctively; they are forwarded to
/// the upstream API as server-side query filters.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct LatestFilter {
    /// Branch the run must belong to.
    #[serde(default)]
    pub branch: Option<String>,
    /// Event that must have triggered the run (e.g. `push`).
    #[serde(default)]
    pub event: Option<String>,
    /// Status or conclusion the run must have (e.g. `success`).
    #[serde(default)]
    pub status: Option<String>,
}

/// A caller-supplied reference to one workflow run.
///
/// Derived per request, never persisted. The verbatim request string, not
/// this parsed form, keys the run cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunReference {
    /// The most recent run matching the target's filter.
    Latest,
    /// A concrete run id.
    Id(u64),
}

impl FromStr for RunReference {
    type Err = Error;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        if value == "latest" {
            return Ok(Self::Latest);
        }
        value
            .parse::<u64>()
            .map(Self::Id)
            .map_err(|_| Error::MalformedRunReference {
                reference: value.to_string(),
            })
    }
}

impl fmt::Display for RunReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Latest => f.write_str("latest"),
            Self::Id(id) => write!(f, "{id}"),
        }
    }
}
