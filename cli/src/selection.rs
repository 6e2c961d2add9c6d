//! Choosing which bundles and revisions a command looks at.

use crate::error::{CliError, CliResult};
use admin::{AdminApi, AdminResult, BundleKind};
use regex::Regex;
use serde::Serialize;
use std::str::FromStr;
use tracing::debug;

/// Name filter for proxies and sharedflows.
#[derive(Debug, Clone, Default)]
pub enum NamePredicate {
    #[default]
    All,
    Regex(Regex),
    Prefix(String),
}

impl NamePredicate {
    pub fn regex(pattern: Option<&str>) -> CliResult<Self> {
        Self::from_options(pattern, None)
    }

    /// A regex and a prefix are mutually exclusive.
    pub fn from_options(regex: Option<&str>, prefix: Option<&str>) -> CliResult<Self> {
        match (regex, prefix) {
            (Some(_), Some(_)) => Err(CliError::usage(
                "specify at most one of a regular expression or a prefix",
            )),
            (Some(pattern), None) => {
                debug!("using regex match ({})", pattern);
                Ok(NamePredicate::Regex(Regex::new(pattern)?))
            }
            (None, Some(prefix)) => Ok(NamePredicate::Prefix(prefix.to_string())),
            (None, None) => Ok(NamePredicate::All),
        }
    }

    pub fn matches(&self, name: &str) -> bool {
        match self {
            NamePredicate::All => true,
            NamePredicate::Regex(re) => re.is_match(name),
            NamePredicate::Prefix(prefix) => name.starts_with(prefix.as_str()),
        }
    }

    /// Matching names, sorted.
    pub fn select(&self, names: Vec<String>) -> Vec<String> {
        let mut selected: Vec<String> = names.into_iter().filter(|n| self.matches(n)).collect();
        selected.sort();
        selected
    }
}

/// Which revisions of each selected bundle to examine.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum RevisionFilter {
    #[default]
    All,
    Latest,
    Deployed,
    DeployedIn(String),
}

impl FromStr for RevisionFilter {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "latest" => Ok(RevisionFilter::Latest),
            "deployed" => Ok(RevisionFilter::Deployed),
            other => match other.strip_prefix("deployed:") {
                Some(env) if !env.is_empty() => Ok(RevisionFilter::DeployedIn(env.to_string())),
                _ => Err(format!(
                    "invalid filter '{}', expected latest, deployed, or deployed:<env>",
                    other
                )),
            },
        }
    }
}

impl RevisionFilter {
    /// Combines a `--filter` value with a `--latestrevision` style flag.
    pub fn with_latest_flag(filter: Option<RevisionFilter>, latest: bool) -> CliResult<Self> {
        match (filter, latest) {
            (Some(RevisionFilter::Latest), _) | (None, true) => Ok(RevisionFilter::Latest),
            (Some(_), true) => Err(CliError::usage(
                "the latest-revision flag cannot be combined with a deployment filter",
            )),
            (Some(filter), false) => Ok(filter),
            (None, false) => Ok(RevisionFilter::All),
        }
    }
}

/// One bundle plus the revisions a command should examine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Candidate {
    pub name: String,
    pub revisions: Vec<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub environment: Option<String>,
}

/// Lists the bundles of `kind`, keeps the names the predicate accepts, and
/// resolves revisions for each, one request at a time.
pub async fn resolve_candidates(
    api: &dyn AdminApi,
    kind: BundleKind,
    predicate: &NamePredicate,
    filter: &RevisionFilter,
) -> AdminResult<Vec<Candidate>> {
    let names = predicate.select(api.list_bundles(kind).await?);
    debug!("{} {} candidates", names.len(), kind);

    let mut candidates = Vec::new();
    for name in names {
        match filter {
            RevisionFilter::Deployed | RevisionFilter::DeployedIn(_) => {
                let environment = match filter {
                    RevisionFilter::DeployedIn(env) => Some(env.as_str()),
                    _ => None,
                };
                for deployment in api.bundle_deployments(kind, &name, environment).await? {
                    candidates.push(Candidate {
                        name: name.clone(),
                        revisions: vec![deployment.revision],
                        environment: Some(deployment.environment),
                    });
                }
            }
            RevisionFilter::Latest | RevisionFilter::All => {
                let mut revisions = api.list_revisions(kind, &name).await?;
                if *filter == RevisionFilter::Latest {
                    revisions = revisions.pop().into_iter().collect();
                }
                candidates.push(Candidate {
                    name,
                    revisions,
                    environment: None,
                });
            }
        }
    }
    Ok(candidates)
}
