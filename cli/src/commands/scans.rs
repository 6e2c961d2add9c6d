//! Questions the management API cannot answer directly, answered by exporting
//! each candidate revision and reading its XML.

use super::credentials::{iso_millis, now_millis};
use super::Command;
use crate::error::{CliError, CliResult};
use crate::output::Output;
use crate::scan::{BundleScanner, Counted, ItemHits, RevisionHits};
use crate::selection::{resolve_candidates, NamePredicate, RevisionFilter};
use admin::{AdminApi, BundleKind};
use async_trait::async_trait;
use bundle::{
    flow_callout_target, java_callout_resource, kvm_reference, policy_type, Bundle, BundleResult,
    TargetConnection, TargetKind,
};
use clap::Args;
use regex::Regex;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use tracing::info;

/// Resolves proxy candidates and runs `inspect` over each of their revisions.
async fn scan_proxies<T, F>(
    api: &dyn AdminApi,
    predicate: &NamePredicate,
    filter: &RevisionFilter,
    inspect: F,
) -> CliResult<Vec<ItemHits<T>>>
where
    T: Send,
    F: FnMut(&str, u32, &Bundle) -> BundleResult<Option<T>> + Send,
{
    let candidates = resolve_candidates(api, BundleKind::Proxy, predicate, filter).await?;
    let scanner = BundleScanner::new(api, BundleKind::Proxy)?;
    scanner.scan(&candidates, inspect).await
}

fn non_empty<T>(items: Vec<T>) -> Option<Vec<T>> {
    (!items.is_empty()).then_some(items)
}

fn revision_path(org: &str, proxy: &str, revision: u32) -> String {
    format!("/v1/organizations/{}/apis/{}/revisions/{}", org, proxy, revision)
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Policies {
    pub policies: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Endpoints<T> {
    pub endpoints: Vec<T>,
}

/// `{proxy, revisions}` rows used by the counted reports.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProxyRevisions<T> {
    pub proxy: String,
    pub revisions: Vec<T>,
}

fn by_proxy<T>(items: Vec<ItemHits<T>>) -> Vec<ProxyRevisions<RevisionHits<T>>> {
    items
        .into_iter()
        .map(|item| ProxyRevisions {
            proxy: item.proxyname,
            revisions: item.found,
        })
        .collect()
}

/// Names of FlowCallout policies, optionally only those calling `sharedflow`.
pub fn flow_callouts(bundle: &Bundle, sharedflow: Option<&str>) -> BundleResult<Vec<String>> {
    Ok(bundle
        .policies()?
        .into_iter()
        .filter(|p| match flow_callout_target(&p.root) {
            Some(target) => sharedflow.map_or(true, |sf| sf == target),
            None => false,
        })
        .map(|p| p.name)
        .collect())
}

/// Distinct sharedflows invoked by the bundle's FlowCallout policies, sorted.
pub fn sharedflows_called(bundle: &Bundle) -> BundleResult<Vec<String>> {
    let called: BTreeSet<String> = bundle
        .policies()?
        .iter()
        .filter_map(|p| flow_callout_target(&p.root).map(str::to_string))
        .collect();
    Ok(called.into_iter().collect())
}

pub fn policies_of_type(bundle: &Bundle, policytype: &str) -> BundleResult<Vec<String>> {
    Ok(bundle
        .policies()?
        .into_iter()
        .filter(|p| policy_type(&p.root) == policytype)
        .map(|p| p.name)
        .collect())
}

#[derive(Args, Debug)]
pub struct FindFlowCallouts {
    /// Only FlowCallouts referencing this sharedflow
    #[arg(short = 'F', long)]
    pub sharedflow: Option<String>,

    /// Just list the sharedflows in the org
    #[arg(short = 'L', long)]
    pub list: bool,

    /// Only the latest revision of each proxy
    #[arg(long)]
    pub latestrevision: bool,

    #[arg(long)]
    pub proxyregexp: Option<String>,
}

#[async_trait]
impl Command for FindFlowCallouts {
    fn validate(&self) -> CliResult<()> {
        NamePredicate::regex(self.proxyregexp.as_deref()).map(|_| ())
    }

    async fn run(&self, api: &dyn AdminApi) -> CliResult<Output> {
        if self.list {
            return Output::json(&api.list_bundles(BundleKind::SharedFlow).await?);
        }
        let org = api.organization().to_string();
        let predicate = NamePredicate::regex(self.proxyregexp.as_deref())?;
        let filter = RevisionFilter::with_latest_flag(None, self.latestrevision)?;
        let sharedflow = self.sharedflow.as_deref();

        let items = scan_proxies(api, &predicate, &filter, |name, revision, bundle| {
            let base = revision_path(&org, name, revision);
            Ok(non_empty(flow_callouts(bundle, sharedflow)?).map(|names| Policies {
                policies: names
                    .into_iter()
                    .map(|p| format!("{}/policies/{}", base, p))
                    .collect(),
            }))
        })
        .await?;

        let flattened: Vec<FlowCalloutUse> = items
            .into_iter()
            .map(|item| FlowCalloutUse {
                proxy: item.proxyname,
                policies: item.found.into_iter().flat_map(|r| r.hit.policies).collect(),
            })
            .collect();
        info!("{} proxies with matching FlowCallouts", flattened.len());
        Output::json(&flattened)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FlowCalloutUse {
    pub proxy: String,
    pub policies: Vec<String>,
}

#[derive(Args, Debug)]
pub struct ReportSharedflowUsage {
    /// Just list the sharedflows in the org
    #[arg(short = 'L', long)]
    pub list: bool,

    #[arg(long)]
    pub proxypattern: Option<String>,

    /// latest, deployed, or deployed:<env>
    #[arg(long)]
    pub filter: Option<RevisionFilter>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Sharedflows {
    pub sharedflows: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProxyRevision {
    pub proxyname: String,
    pub revision: u32,
}

#[derive(Debug, Serialize)]
pub struct SharedflowUsage {
    pub proxies: Vec<ItemHits<Sharedflows>>,
    pub sharedflows: BTreeMap<String, Vec<ProxyRevision>>,
}

/// Inverts proxy→sharedflows into sharedflow→proxy revisions.
pub fn invert_usage(items: &[ItemHits<Sharedflows>]) -> BTreeMap<String, Vec<ProxyRevision>> {
    let mut inverted: BTreeMap<String, Vec<ProxyRevision>> = BTreeMap::new();
    for item in items {
        for found in &item.found {
            for sf in &found.hit.sharedflows {
                inverted.entry(sf.clone()).or_default().push(ProxyRevision {
                    proxyname: item.proxyname.clone(),
                    revision: found.revision,
                });
            }
        }
    }
    inverted
}

#[async_trait]
impl Command for ReportSharedflowUsage {
    fn validate(&self) -> CliResult<()> {
        NamePredicate::regex(self.proxypattern.as_deref()).map(|_| ())
    }

    async fn run(&self, api: &dyn AdminApi) -> CliResult<Output> {
        let sharedflows = api.list_bundles(BundleKind::SharedFlow).await?;
        if self.list {
            return Output::json(&sharedflows);
        }
        if sharedflows.is_empty() {
            info!("There are no sharedflows.");
            return Output::json(&SharedflowUsage {
                proxies: Vec::new(),
                sharedflows: BTreeMap::new(),
            });
        }

        let predicate = NamePredicate::regex(self.proxypattern.as_deref())?;
        let filter = self.filter.clone().unwrap_or_default();
        let proxies = scan_proxies(api, &predicate, &filter, |_, _, bundle| {
            Ok(non_empty(sharedflows_called(bundle)?).map(|sharedflows| Sharedflows { sharedflows }))
        })
        .await?;

        let sharedflows = invert_usage(&proxies);
        Output::json(&SharedflowUsage {
            proxies,
            sharedflows,
        })
    }
}

#[derive(Args, Debug)]
pub struct ScanPolicyType {
    /// Policy element name, such as ServiceCallout or HMAC
    #[arg(long)]
    pub policytype: String,

    #[arg(long)]
    pub proxyregexp: Option<String>,

    /// latest, deployed, or deployed:<env>
    #[arg(long)]
    pub filter: Option<RevisionFilter>,
}

#[async_trait]
impl Command for ScanPolicyType {
    fn validate(&self) -> CliResult<()> {
        if self.policytype.trim().is_empty() {
            return Err(CliError::usage("specify --policytype, e.g. ServiceCallout or HMAC"));
        }
        NamePredicate::regex(self.proxyregexp.as_deref()).map(|_| ())
    }

    async fn run(&self, api: &dyn AdminApi) -> CliResult<Output> {
        let predicate = NamePredicate::regex(self.proxyregexp.as_deref())?;
        let filter = self.filter.clone().unwrap_or_default();
        let items = scan_proxies(api, &predicate, &filter, |_, _, bundle| {
            Ok(non_empty(policies_of_type(bundle, &self.policytype)?).map(|policies| Policies { policies }))
        })
        .await?;
        Output::json(&items)
    }
}

/// How a JAR name is matched against `java://` resources.
#[derive(Debug, Clone)]
pub enum JarMatch {
    Exact(String),
    Pattern(Regex),
}

impl JarMatch {
    pub fn matches(&self, resource: &str) -> bool {
        let Some(jar) = resource.strip_prefix("java://") else {
            return false;
        };
        match self {
            JarMatch::Exact(name) => jar == name,
            JarMatch::Pattern(re) => re.is_match(jar),
        }
    }
}

/// JavaCallout policy names, or with a jar matcher the matching resources.
pub fn java_usage(bundle: &Bundle, jar: Option<&JarMatch>) -> BundleResult<Vec<String>> {
    match jar {
        Some(matcher) => Ok(bundle
            .resources()?
            .into_iter()
            .filter(|r| matcher.matches(r))
            .collect()),
        None => Ok(bundle
            .policies()?
            .into_iter()
            .filter(|p| p.root.name == "JavaCallout")
            .map(|p| match java_callout_resource(&p.root) {
                Some(resource) => format!("{} ({})", p.name, resource),
                None => p.name,
            })
            .collect()),
    }
}

#[derive(Args, Debug)]
pub struct FindJavaPolicies {
    /// JAR to find; all JavaCallout policies otherwise
    #[arg(short = 'J', long)]
    pub jar: Option<String>,

    /// Treat the JAR name as a regex
    #[arg(short = 'R', long, requires = "jar")]
    pub regexp: bool,

    #[arg(short = 'E', long)]
    pub proxyregexp: Option<String>,

    /// Only the latest revision of each proxy
    #[arg(short = 'L', long)]
    pub latestrevisionnumber: bool,
}

impl FindJavaPolicies {
    fn jar_match(&self) -> CliResult<Option<JarMatch>> {
        match &self.jar {
            None => Ok(None),
            Some(jar) if self.regexp => Ok(Some(JarMatch::Pattern(Regex::new(jar)?))),
            Some(jar) => Ok(Some(JarMatch::Exact(jar.clone()))),
        }
    }
}

#[async_trait]
impl Command for FindJavaPolicies {
    fn validate(&self) -> CliResult<()> {
        self.jar_match()?;
        NamePredicate::regex(self.proxyregexp.as_deref()).map(|_| ())
    }

    async fn run(&self, api: &dyn AdminApi) -> CliResult<Output> {
        let jar = self.jar_match()?;
        let predicate = NamePredicate::regex(self.proxyregexp.as_deref())?;
        let filter = RevisionFilter::with_latest_flag(None, self.latestrevisionnumber)?;
        let items = scan_proxies(api, &predicate, &filter, |_, _, bundle| {
            Ok(non_empty(java_usage(bundle, jar.as_ref())?).map(|policies| Policies { policies }))
        })
        .await?;
        Output::json(&items)
    }
}

#[derive(Args, Debug)]
pub struct FindKvmPolicies {
    /// Only policies using this map
    #[arg(short = 'M', long)]
    pub kvm: Option<String>,

    /// Only policies with this scope: organization, environment or apiproxy
    #[arg(short = 'S', long)]
    pub scope: Option<String>,

    /// Just list the organization's KVMs
    #[arg(long)]
    pub list: bool,

    #[arg(long)]
    pub latestrevision: bool,

    #[arg(short = 'R', long)]
    pub regex: Option<String>,
}

/// Names of KeyValueMapOperations policies matching the map and scope filters.
pub fn kvm_policies(bundle: &Bundle, kvm: Option<&str>, scope: Option<&str>) -> BundleResult<Vec<String>> {
    Ok(bundle
        .policies()?
        .into_iter()
        .filter(|p| {
            kvm_reference(&p.root).is_some_and(|r| {
                kvm.map_or(true, |k| r.map_identifier.as_deref() == Some(k))
                    && scope.map_or(true, |s| r.scope == s)
            })
        })
        .map(|p| p.name)
        .collect())
}

#[async_trait]
impl Command for FindKvmPolicies {
    fn validate(&self) -> CliResult<()> {
        NamePredicate::regex(self.regex.as_deref()).map(|_| ())
    }

    async fn run(&self, api: &dyn AdminApi) -> CliResult<Output> {
        if self.list {
            return Output::json(&api.list_kvms(None).await?);
        }
        let org = api.organization().to_string();
        let predicate = NamePredicate::regex(self.regex.as_deref())?;
        let filter = RevisionFilter::with_latest_flag(None, self.latestrevision)?;
        let items = scan_proxies(api, &predicate, &filter, |name, revision, bundle| {
            let base = revision_path(&org, name, revision);
            let found = kvm_policies(bundle, self.kvm.as_deref(), self.scope.as_deref())?;
            Ok(non_empty(found).map(|names| Policies {
                policies: names
                    .into_iter()
                    .map(|p| format!("{}/policies/{}", base, p))
                    .collect(),
            }))
        })
        .await?;
        Output::json(&Counted::new(by_proxy(items)))
    }
}

#[derive(Args, Debug)]
pub struct FindVhost {
    #[arg(short = 'V', long)]
    pub vhost: String,

    #[arg(long)]
    pub latestrevision: bool,

    #[arg(long)]
    pub regex: Option<String>,
}

/// Proxy endpoints listening on `vhost`.
pub fn endpoints_on_vhost(bundle: &Bundle, vhost: &str) -> BundleResult<Vec<String>> {
    Ok(bundle
        .proxy_endpoints()?
        .into_iter()
        .filter(|ep| ep.virtual_hosts.iter().any(|v| v == vhost))
        .map(|ep| ep.name)
        .collect())
}

#[async_trait]
impl Command for FindVhost {
    fn validate(&self) -> CliResult<()> {
        NamePredicate::regex(self.regex.as_deref()).map(|_| ())
    }

    async fn run(&self, api: &dyn AdminApi) -> CliResult<Output> {
        let org = api.organization().to_string();
        let predicate = NamePredicate::regex(self.regex.as_deref())?;
        let filter = RevisionFilter::with_latest_flag(None, self.latestrevision)?;
        let items = scan_proxies(api, &predicate, &filter, |name, revision, bundle| {
            let base = revision_path(&org, name, revision);
            Ok(non_empty(endpoints_on_vhost(bundle, &self.vhost)?).map(|names| Endpoints {
                endpoints: names
                    .into_iter()
                    .map(|ep| format!("{}/proxies/{}", base, ep))
                    .collect::<Vec<String>>(),
            }))
        })
        .await?;
        Output::json(&Counted::new(by_proxy(items)))
    }
}

#[derive(Args, Debug)]
pub struct FindVhosts {
    /// Only endpoints with a vhost matching this regex
    #[arg(short = 'R', long)]
    pub regexp: Option<String>,

    /// Only proxies with names matching this regex
    #[arg(short = 'P', long)]
    pub proxyregexp: Option<String>,

    /// Look at the latest revision of every proxy instead of deployed revisions
    #[arg(long = "also-undeployed")]
    pub also_undeployed: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EndpointVhosts {
    pub endpoint: String,
    pub virtual_hosts: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VhostRevision {
    pub revision: u32,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub environments: Vec<String>,
    pub endpoints: Vec<EndpointVhosts>,
}

pub fn endpoint_vhosts(bundle: &Bundle, vhost: Option<&Regex>) -> BundleResult<Vec<EndpointVhosts>> {
    Ok(bundle
        .proxy_endpoints()?
        .into_iter()
        .filter(|ep| vhost.map_or(true, |re| ep.virtual_hosts.iter().any(|v| re.is_match(v))))
        .map(|ep| EndpointVhosts {
            endpoint: ep.name,
            virtual_hosts: ep.virtual_hosts,
        })
        .collect())
}

/// Folds per-environment hits of the same revision into one entry.
pub fn merge_environments(found: Vec<RevisionHits<Endpoints<EndpointVhosts>>>) -> Vec<VhostRevision> {
    let mut merged: Vec<VhostRevision> = Vec::new();
    for hit in found {
        match merged.iter_mut().find(|r| r.revision == hit.revision) {
            Some(existing) => existing.environments.extend(hit.environment),
            None => merged.push(VhostRevision {
                revision: hit.revision,
                environments: hit.environment.into_iter().collect(),
                endpoints: hit.hit.endpoints,
            }),
        }
    }
    merged
}

#[async_trait]
impl Command for FindVhosts {
    fn validate(&self) -> CliResult<()> {
        NamePredicate::regex(self.regexp.as_deref())?;
        NamePredicate::regex(self.proxyregexp.as_deref()).map(|_| ())
    }

    async fn run(&self, api: &dyn AdminApi) -> CliResult<Output> {
        let vhost = self.regexp.as_deref().map(Regex::new).transpose()?;
        let predicate = NamePredicate::regex(self.proxyregexp.as_deref())?;
        let filter = if self.also_undeployed {
            RevisionFilter::Latest
        } else {
            RevisionFilter::Deployed
        };
        let items = scan_proxies(api, &predicate, &filter, |_, _, bundle| {
            Ok(non_empty(endpoint_vhosts(bundle, vhost.as_ref())?).map(|endpoints| Endpoints { endpoints }))
        })
        .await?;

        let rows: Vec<ProxyRevisions<VhostRevision>> = items
            .into_iter()
            .map(|item| ProxyRevisions {
                proxy: item.proxyname,
                revisions: merge_environments(item.found),
            })
            .collect();
        Output::json(&Counted::new(rows))
    }
}

#[derive(Args, Debug)]
pub struct FindProxyForBasepath {
    #[arg(short = 'B', long)]
    pub basepath: String,

    /// Treat the base path as a regex
    #[arg(short = 'R', long)]
    pub regexp: bool,

    #[arg(long)]
    pub proxypattern: Option<String>,

    #[arg(long)]
    pub latestrevision: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BasepathMatch {
    pub name: String,
    pub base_path: String,
    pub admin_path: String,
}

/// Proxy endpoints whose base path equals `basepath`, or matches it as a regex.
pub fn basepath_matches(
    bundle: &Bundle,
    proxy: &str,
    revision: u32,
    basepath: &str,
    pattern: Option<&Regex>,
) -> BundleResult<Vec<BasepathMatch>> {
    Ok(bundle
        .proxy_endpoints()?
        .into_iter()
        .filter_map(|ep| {
            let base_path = ep.base_path?;
            let hit = match pattern {
                Some(re) => re.is_match(&base_path),
                None => base_path == basepath,
            };
            hit.then(|| BasepathMatch {
                admin_path: format!("apis/{}/revisions/{}/endpoints/{}", proxy, revision, ep.name),
                name: ep.name,
                base_path,
            })
        })
        .collect())
}

#[async_trait]
impl Command for FindProxyForBasepath {
    fn validate(&self) -> CliResult<()> {
        if self.regexp {
            Regex::new(&self.basepath)?;
        }
        NamePredicate::regex(self.proxypattern.as_deref()).map(|_| ())
    }

    async fn run(&self, api: &dyn AdminApi) -> CliResult<Output> {
        let pattern = if self.regexp {
            Some(Regex::new(&self.basepath)?)
        } else {
            None
        };
        let predicate = NamePredicate::regex(self.proxypattern.as_deref())?;
        let filter = RevisionFilter::with_latest_flag(None, self.latestrevision)?;
        let items = scan_proxies(api, &predicate, &filter, |name, revision, bundle| {
            let found = basepath_matches(bundle, name, revision, &self.basepath, pattern.as_ref())?;
            Ok(non_empty(found).map(|endpoints| Endpoints { endpoints }))
        })
        .await?;
        Output::json(&items)
    }
}

#[derive(Args, Debug)]
pub struct FindTargetType {
    /// http, node or hosted
    #[arg(short = 'T', long)]
    pub targettype: TargetKind,

    #[arg(short = 'R', long)]
    pub regexp: Option<String>,

    /// latest, deployed, or deployed:<env>
    #[arg(long)]
    pub filter: Option<RevisionFilter>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TargetEndpoints {
    pub target_endpoints: Vec<String>,
}

#[async_trait]
impl Command for FindTargetType {
    fn validate(&self) -> CliResult<()> {
        NamePredicate::regex(self.regexp.as_deref()).map(|_| ())
    }

    async fn run(&self, api: &dyn AdminApi) -> CliResult<Output> {
        let predicate = NamePredicate::regex(self.regexp.as_deref())?;
        let filter = self.filter.clone().unwrap_or_default();
        info!("looking for {} targets", self.targettype.element_name());
        let items = scan_proxies(api, &predicate, &filter, |_, _, bundle| {
            let names: Vec<String> = bundle
                .target_endpoints()?
                .into_iter()
                .filter(|t| t.is_kind(self.targettype))
                .map(|t| t.name)
                .collect();
            Ok(non_empty(names).map(|target_endpoints| TargetEndpoints { target_endpoints }))
        })
        .await?;
        Output::json(&items)
    }
}

#[derive(Args, Debug)]
pub struct ListBasepathsAndTargets {
    #[arg(long)]
    pub proxypattern: Option<String>,

    /// latest, deployed, or deployed:<env>
    #[arg(long)]
    pub filter: Option<RevisionFilter>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum EndpointEntry {
    Proxy {
        proxy: String,
        #[serde(rename = "basePath")]
        base_path: String,
        #[serde(rename = "adminPath")]
        admin_path: String,
    },
    Target {
        target: String,
        url: String,
        #[serde(rename = "adminPath")]
        admin_path: String,
    },
    LocalTarget {
        target: String,
        #[serde(rename = "proxyName", skip_serializing_if = "Option::is_none")]
        proxy_name: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        path: Option<String>,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EndpointList {
    pub endpoint: Vec<EndpointEntry>,
}

/// Base paths of every proxy endpoint followed by the destination of every
/// HTTP or local target endpoint.
pub fn basepaths_and_targets(
    bundle: &Bundle,
    proxy: &str,
    revision: u32,
) -> BundleResult<Vec<EndpointEntry>> {
    let admin = format!("/apis/{}/revisions/{}", proxy, revision);
    let mut entries: Vec<EndpointEntry> = bundle
        .proxy_endpoints()?
        .into_iter()
        .map(|ep| EndpointEntry::Proxy {
            admin_path: format!("{}/proxies/{}", admin, ep.name),
            base_path: ep.base_path.unwrap_or_else(|| "unknown".to_string()),
            proxy: ep.name,
        })
        .collect();

    for target in bundle.target_endpoints()? {
        match target.connection {
            TargetConnection::Http { url, servers, .. } => {
                let url = match url {
                    Some(url) => url,
                    None if !servers.is_empty() => format!("load-balancer: {}", servers.join(", ")),
                    None => "unknown".to_string(),
                };
                entries.push(EndpointEntry::Target {
                    admin_path: format!("{}/targets/{}", admin, target.name),
                    target: target.name,
                    url,
                });
            }
            TargetConnection::Local { api_proxy, path } => entries.push(EndpointEntry::LocalTarget {
                target: target.name,
                proxy_name: api_proxy,
                path,
            }),
            _ => {}
        }
    }
    Ok(entries)
}

#[async_trait]
impl Command for ListBasepathsAndTargets {
    fn validate(&self) -> CliResult<()> {
        NamePredicate::regex(self.proxypattern.as_deref()).map(|_| ())
    }

    async fn run(&self, api: &dyn AdminApi) -> CliResult<Output> {
        let predicate = NamePredicate::regex(self.proxypattern.as_deref())?;
        let filter = self.filter.clone().unwrap_or_default();
        let items = scan_proxies(api, &predicate, &filter, |name, revision, bundle| {
            Ok(non_empty(basepaths_and_targets(bundle, name, revision)?).map(|endpoint| EndpointList { endpoint }))
        })
        .await?;
        Output::json(&items)
    }
}

#[derive(Args, Debug)]
pub struct FindTargetBadSsl {
    #[arg(short = 'R', long)]
    pub regexp: Option<String>,

    /// Only the latest revision of each proxy
    #[arg(short = 'L', long)]
    pub latest: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FlaggedTarget {
    pub name: String,
    pub reason_flagged: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FlaggedRevision {
    pub revision: u32,
    pub targets: Vec<FlaggedTarget>,
}

#[derive(Debug, Serialize)]
pub struct BadSslReport {
    pub report: &'static str,
    pub search: &'static str,
    pub org: String,
    pub now: String,
    pub found: Vec<ProxyRevisions<FlaggedRevision>>,
}

pub fn flagged_targets(bundle: &Bundle) -> BundleResult<Vec<FlaggedTarget>> {
    Ok(bundle
        .target_endpoints()?
        .into_iter()
        .filter_map(|t| {
            t.ssl_flag().map(|reason| FlaggedTarget {
                name: t.name.clone(),
                reason_flagged: reason.to_string(),
            })
        })
        .collect())
}

#[async_trait]
impl Command for FindTargetBadSsl {
    fn validate(&self) -> CliResult<()> {
        NamePredicate::regex(self.regexp.as_deref()).map(|_| ())
    }

    async fn run(&self, api: &dyn AdminApi) -> CliResult<Output> {
        let predicate = NamePredicate::regex(self.regexp.as_deref())?;
        let filter = RevisionFilter::with_latest_flag(None, self.latest)?;
        let items = scan_proxies(api, &predicate, &filter, |_, _, bundle| {
            Ok(non_empty(flagged_targets(bundle)?).map(|targets| Endpoints { endpoints: targets }))
        })
        .await?;

        let found = items
            .into_iter()
            .map(|item| ProxyRevisions {
                proxy: item.proxyname,
                revisions: item
                    .found
                    .into_iter()
                    .map(|r| FlaggedRevision {
                        revision: r.revision,
                        targets: r.hit.endpoints,
                    })
                    .collect(),
            })
            .collect();
        Output::json(&BadSslReport {
            report: "Proxies with bad SSLInfo",
            search: if self.latest { "latest revision" } else { "all revisions" },
            org: api.organization().to_string(),
            now: iso_millis(now_millis()),
            found,
        })
    }
}

#[derive(Args, Debug)]
pub struct ListProxyPolicies {
    #[arg(long)]
    pub regexp: Option<String>,

    #[arg(long)]
    pub latestrevision: bool,
}

#[derive(Debug, Serialize)]
pub struct PolicyListing {
    pub proxyname: String,
    pub analysis: Vec<RevisionHits<Policies>>,
}

#[async_trait]
impl Command for ListProxyPolicies {
    fn validate(&self) -> CliResult<()> {
        NamePredicate::regex(self.regexp.as_deref()).map(|_| ())
    }

    async fn run(&self, api: &dyn AdminApi) -> CliResult<Output> {
        let predicate = NamePredicate::regex(self.regexp.as_deref())?;
        let filter = RevisionFilter::with_latest_flag(None, self.latestrevision)?;
        let items = scan_proxies(api, &predicate, &filter, |_, _, bundle| {
            let policies = bundle.policies()?.into_iter().map(|p| p.name).collect();
            Ok(Some(Policies { policies }))
        })
        .await?;
        let listing: Vec<PolicyListing> = items
            .into_iter()
            .map(|item| PolicyListing {
                proxyname: item.proxyname,
                analysis: item.found,
            })
            .collect();
        Output::json(&listing)
    }
}
