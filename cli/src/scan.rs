//! Exporting revisions and walking them one bundle at a time.

use crate::error::CliResult;
use crate::selection::Candidate;
use admin::{AdminApi, BundleKind};
use bundle::{Bundle, BundleResult, ScratchDir};
use serde::Serialize;
use tracing::{debug, info};

/// Exports revisions of one kind into a scratch directory that lives as long
/// as the scanner.
pub struct BundleScanner<'a> {
    api: &'a dyn AdminApi,
    kind: BundleKind,
    scratch: ScratchDir,
}

impl<'a> BundleScanner<'a> {
    pub fn new(api: &'a dyn AdminApi, kind: BundleKind) -> CliResult<Self> {
        Ok(Self {
            api,
            kind,
            scratch: ScratchDir::new("apigee-scan-")?,
        })
    }

    pub fn kind(&self) -> BundleKind {
        self.kind
    }

    pub async fn open(&self, name: &str, revision: u32) -> CliResult<Bundle> {
        debug!("exporting {} {} r{}", self.kind, name, revision);
        let exported = self.api.export_revision(self.kind, name, revision).await?;
        Ok(self.scratch.unpack(name, revision, &exported.bytes)?)
    }

    /// Runs `inspect` over every candidate revision, in order. Revisions for
    /// which it returns `None` are left out, as are items with no hits.
    pub async fn scan<T, F>(
        &self,
        candidates: &[Candidate],
        mut inspect: F,
    ) -> CliResult<Vec<ItemHits<T>>>
    where
        T: Send,
        F: FnMut(&str, u32, &Bundle) -> BundleResult<Option<T>> + Send,
    {
        info!("scanning {} {} candidates", candidates.len(), self.kind);
        let mut items: Vec<ItemHits<T>> = Vec::new();
        for candidate in candidates {
            let mut found = Vec::new();
            for &revision in &candidate.revisions {
                let bundle = self.open(&candidate.name, revision).await?;
                if let Some(hit) = inspect(&candidate.name, revision, &bundle)? {
                    found.push(RevisionHits {
                        environment: candidate.environment.clone(),
                        revision,
                        hit,
                    });
                }
            }
            if found.is_empty() {
                continue;
            }
            // deployed filters yield one candidate per environment
            match items.iter_mut().find(|item| item.proxyname == candidate.name) {
                Some(item) => item.found.extend(found),
                None => items.push(ItemHits {
                    proxyname: candidate.name.clone(),
                    found,
                }),
            }
        }
        Ok(items)
    }
}

/// Hits for one proxy or sharedflow.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ItemHits<T> {
    pub proxyname: String,
    pub found: Vec<RevisionHits<T>>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RevisionHits<T> {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub environment: Option<String>,
    pub revision: u32,
    #[serde(flatten)]
    pub hit: T,
}

/// `{results, count}` wrapper used by reports that count matching items.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Counted<T> {
    pub results: Vec<T>,
    pub count: usize,
}

impl<T> Counted<T> {
    pub fn new(results: Vec<T>) -> Self {
        let count = results.len();
        Self { results, count }
    }
}
