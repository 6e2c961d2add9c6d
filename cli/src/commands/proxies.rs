use super::{bundle_kind, split_list, Command};
use crate::error::{CliError, CliResult};
use crate::output::Output;
use crate::selection::NamePredicate;
use admin::{AdminApi, AdminError, ApiProduct, BundleKind, Deployment};
use async_trait::async_trait;
use bundle::ScratchDir;
use clap::Args;
use futures::stream::{self, StreamExt, TryStreamExt};
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Revisions deleted concurrently per proxy during cleanup.
const CLEANUP_CONCURRENCY: usize = 4;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EnvironmentRevisions {
    pub name: String,
    pub revisions: Vec<u32>,
}

/// Deployments grouped by environment, in order of first appearance.
pub fn group_by_environment(deployments: &[Deployment]) -> Vec<EnvironmentRevisions> {
    let mut groups: Vec<EnvironmentRevisions> = Vec::new();
    for d in deployments {
        match groups.iter_mut().find(|g| g.name == d.environment) {
            Some(group) => group.revisions.push(d.revision),
            None => groups.push(EnvironmentRevisions {
                name: d.environment.clone(),
                revisions: vec![d.revision],
            }),
        }
    }
    groups
}

#[derive(Args, Debug)]
pub struct ListProxies {
    /// Also show the deployments of each item
    #[arg(short = 'E', long)]
    pub elaborate: bool,

    /// List sharedflows instead of proxies
    #[arg(short = 'S', long)]
    pub sharedflows: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct DeployedItem {
    proxy: String,
    deployed_environments: Vec<EnvironmentRevisions>,
}

#[async_trait]
impl Command for ListProxies {
    async fn run(&self, api: &dyn AdminApi) -> CliResult<Output> {
        let kind = bundle_kind(self.sharedflows);
        let names = api.list_bundles(kind).await?;
        info!("found {} {}s", names.len(), kind);
        if !self.elaborate {
            return Output::json(&names);
        }
        let mut items = Vec::with_capacity(names.len());
        for name in names {
            let deployments = api.bundle_deployments(kind, &name, None).await?;
            items.push(DeployedItem {
                deployed_environments: group_by_environment(&deployments),
                proxy: name,
            });
        }
        Output::json(&items)
    }
}

#[derive(Args, Debug)]
pub struct ListDeployments {
    /// Only this environment; all environments otherwise
    #[arg(short = 'e', long)]
    pub environment: Option<String>,
}

#[async_trait]
impl Command for ListDeployments {
    async fn run(&self, api: &dyn AdminApi) -> CliResult<Output> {
        let environments = match &self.environment {
            Some(env) => vec![env.clone()],
            None => api.list_environments().await?,
        };
        let mut deployments = Vec::new();
        for env in &environments {
            deployments.extend(api.environment_deployments(env).await?);
        }
        info!("found {} deployments", deployments.len());
        Output::json(&deployments)
    }
}

#[derive(Args, Debug)]
pub struct CountRevisions {
    /// Only items whose names start with this prefix
    #[arg(short = 'P', long)]
    pub prefix: Option<String>,

    /// Only items whose names match this regex
    #[arg(short = 'R', long)]
    pub regex: Option<String>,

    #[arg(short = 'S', long)]
    pub sharedflow: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RevisionCount {
    pub itemname: String,
    pub count: usize,
}

#[async_trait]
impl Command for CountRevisions {
    fn validate(&self) -> CliResult<()> {
        NamePredicate::from_options(self.regex.as_deref(), self.prefix.as_deref()).map(|_| ())
    }

    async fn run(&self, api: &dyn AdminApi) -> CliResult<Output> {
        let predicate = NamePredicate::from_options(self.regex.as_deref(), self.prefix.as_deref())?;
        let kind = bundle_kind(self.sharedflow);
        let names = predicate.select(api.list_bundles(kind).await?);

        let mut counts = Vec::with_capacity(names.len());
        for name in names {
            let count = api.list_revisions(kind, &name).await?.len();
            counts.push(RevisionCount {
                itemname: name,
                count,
            });
        }
        Output::json(&counts)
    }
}

/// All but the newest `keep` revisions, ascending.
pub fn revisions_to_examine(revisions: &[u32], keep: usize) -> Vec<u32> {
    let mut sorted = revisions.to_vec();
    sorted.sort_unstable();
    sorted.dedup();
    let cut = sorted.len().saturating_sub(keep);
    sorted.truncate(cut);
    sorted
}

#[derive(Args, Debug)]
pub struct CleanOldRevisions {
    /// Number of revisions of each item to retain
    #[arg(short = 'K', long = "num-to-keep")]
    pub num_to_keep: usize,

    /// Only items whose names match this regex
    #[arg(short = 'R', long)]
    pub regexp: Option<String>,

    #[arg(short = 'S', long)]
    pub sharedflows: bool,

    /// Report what would be deleted without deleting
    #[arg(long)]
    pub dry_run: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CleanedItem {
    pub item: String,
    pub revisions: Vec<u32>,
}

impl CleanOldRevisions {
    /// Deletes the old, undeployed revisions of one item and returns them.
    pub async fn clean_item(
        &self,
        api: &dyn AdminApi,
        kind: BundleKind,
        name: &str,
    ) -> CliResult<Vec<u32>> {
        let revisions = api.list_revisions(kind, name).await?;
        debug!("revisions {}: {:?}", name, revisions);
        let candidates = revisions_to_examine(&revisions, self.num_to_keep);

        let removed: Vec<Option<u32>> = stream::iter(candidates)
            .map(|revision| self.remove_if_undeployed(api, kind, name, revision))
            .buffered(CLEANUP_CONCURRENCY)
            .try_collect()
            .await?;

        Ok(removed.into_iter().flatten().collect())
    }

    async fn remove_if_undeployed(
        &self,
        api: &dyn AdminApi,
        kind: BundleKind,
        name: &str,
        revision: u32,
    ) -> CliResult<Option<u32>> {
        let environments = api.revision_deployments(kind, name, revision).await?;
        if !environments.is_empty() {
            debug!("{} r{} is deployed to {:?}, keeping", name, revision, environments);
            return Ok(None);
        }
        if !self.dry_run {
            api.delete_revision(kind, name, revision).await?;
        }
        Ok(Some(revision))
    }
}

#[async_trait]
impl Command for CleanOldRevisions {
    fn validate(&self) -> CliResult<()> {
        if self.num_to_keep == 0 {
            return Err(CliError::usage("the number of revisions to keep must be at least 1"));
        }
        NamePredicate::regex(self.regexp.as_deref()).map(|_| ())
    }

    async fn run(&self, api: &dyn AdminApi) -> CliResult<Output> {
        let predicate = NamePredicate::regex(self.regexp.as_deref())?;
        let kind = bundle_kind(self.sharedflows);
        let names = predicate.select(api.list_bundles(kind).await?);
        if names.is_empty() {
            info!("no matching {}s", kind);
        }
        if self.dry_run {
            info!("dry run, nothing will be deleted");
        }

        let mut cleaned = Vec::new();
        for name in names {
            let revisions = self.clean_item(api, kind, &name).await?;
            if !revisions.is_empty() {
                info!("deleted {}: {:?}", name, revisions);
                cleaned.push(CleanedItem {
                    item: name,
                    revisions,
                });
            }
        }
        Output::json(&cleaned)
    }
}

#[derive(Args, Debug)]
pub struct Export {
    /// Name of the proxy or sharedflow
    #[arg(long, conflicts_with = "pattern")]
    pub name: Option<String>,

    /// Regex for names; always exports the latest revision
    #[arg(short = 'P', long)]
    pub pattern: Option<String>,

    /// Revision to export; the latest by default
    #[arg(short = 'R', long, conflicts_with = "pattern")]
    pub revision: Option<u32>,

    #[arg(short = 'D', long, default_value = "exported")]
    pub destination: PathBuf,

    /// Report what would be exported without writing anything
    #[arg(short = 't', long)]
    pub trial: bool,

    #[arg(short = 'S', long)]
    pub sharedflow: bool,
}

impl Export {
    async fn export_one(
        &self,
        api: &dyn AdminApi,
        kind: BundleKind,
        name: &str,
        revision: Option<u32>,
    ) -> CliResult<String> {
        let revision = match revision {
            Some(r) => r,
            None => api
                .list_revisions(kind, name)
                .await?
                .last()
                .copied()
                .ok_or_else(|| AdminError::UnexpectedResponse {
                    message: format!("{} has no revisions", name),
                })?,
        };
        if self.trial {
            info!("would export {} r{}", name, revision);
            return Ok(format!("{}-r{}.zip", name, revision));
        }
        let exported = api.export_revision(kind, name, revision).await?;
        tokio::fs::write(self.destination.join(&exported.filename), &exported.bytes).await?;
        debug!("export ok file: {}", exported.filename);
        Ok(exported.filename)
    }
}

#[async_trait]
impl Command for Export {
    fn validate(&self) -> CliResult<()> {
        match (&self.name, &self.pattern) {
            (None, None) => Err(CliError::usage("specify a name, or a pattern for the name")),
            (Some(_), Some(_)) => Err(CliError::usage("specify only one of a name or a pattern")),
            (None, Some(_)) if self.revision.is_some() => Err(CliError::usage(
                "a revision cannot be combined with a pattern",
            )),
            (None, Some(pattern)) => NamePredicate::regex(Some(pattern)).map(|_| ()),
            (Some(_), None) => Ok(()),
        }
    }

    async fn run(&self, api: &dyn AdminApi) -> CliResult<Output> {
        let kind = bundle_kind(self.sharedflow);
        if !self.trial {
            tokio::fs::create_dir_all(&self.destination).await?;
        }

        if let Some(name) = &self.name {
            let filename = self.export_one(api, kind, name, self.revision).await?;
            return Output::json(&filename);
        }

        let predicate = NamePredicate::regex(self.pattern.as_deref())?;
        let mut filenames = Vec::new();
        for name in predicate.select(api.list_bundles(kind).await?) {
            filenames.push(self.export_one(api, kind, &name, None).await?);
        }
        Output::json(&filenames)
    }
}

#[derive(Args, Debug)]
pub struct ImportAndDeploy {
    /// Directory holding apiproxy/ or sharedflowbundle/, or a zip bundle
    #[arg(short = 'd', long)]
    pub source: PathBuf,

    /// Name to import under; read from the bundle descriptor by default
    #[arg(short = 'N', long)]
    pub name: Option<String>,

    /// Environment(s) to deploy to, comma separated
    #[arg(short = 'e', long = "env", env = "ENV")]
    pub environments: Option<String>,

    /// Base path for a proxy deployment
    #[arg(short = 'b', long)]
    pub basepath: Option<String>,

    #[arg(short = 'S', long)]
    pub sharedflow: bool,
}

#[derive(Debug, Serialize)]
struct ImportReport {
    name: String,
    revision: u32,
    deployed: Vec<String>,
}

fn is_zip(path: &Path) -> bool {
    path.is_file()
        && path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("zip"))
}

impl ImportAndDeploy {
    /// The zip to upload and the name to import it under.
    fn prepare(&self) -> CliResult<(Vec<u8>, String)> {
        let (zip, declared) = if is_zip(&self.source) {
            let zip = std::fs::read(&self.source)?;
            let declared = match &self.name {
                Some(_) => None,
                None => {
                    let scratch = ScratchDir::new("apigee-import-")?;
                    let unpacked = scratch.unpack("import", 0, &zip)?;
                    let root = unpacked.base().parent().unwrap_or(scratch.path());
                    bundle::declared_name(root)?
                }
            };
            (zip, declared)
        } else {
            let declared = match &self.name {
                Some(_) => None,
                None => bundle::declared_name(&self.source)?,
            };
            (bundle::pack_directory(&self.source)?, declared)
        };
        let name = self
            .name
            .clone()
            .or(declared)
            .ok_or_else(|| CliError::usage("no name given and none declared in the bundle"))?;
        Ok((zip, name))
    }
}

#[async_trait]
impl Command for ImportAndDeploy {
    fn validate(&self) -> CliResult<()> {
        if self.basepath.is_some() && self.sharedflow {
            return Err(CliError::usage(
                "a basepath does not apply when deploying a sharedflow",
            ));
        }
        if !self.source.exists() {
            return Err(CliError::usage(format!(
                "source {} does not exist",
                self.source.display()
            )));
        }
        Ok(())
    }

    async fn run(&self, api: &dyn AdminApi) -> CliResult<Output> {
        let kind = bundle_kind(self.sharedflow);
        let (zip, name) = self.prepare()?;
        info!("importing {} {} ({} bytes)", kind, name, zip.len());
        let imported = api.import_bundle(kind, &name, zip).await?;
        info!("import ok. {} name: {} r{}", kind, imported.name, imported.revision);

        let mut deployed = Vec::new();
        let environments = self.environments.as_deref().map(split_list).unwrap_or_default();
        if environments.is_empty() {
            info!("finished (not deploying)");
        }
        for env in environments {
            let basepath = match kind {
                BundleKind::Proxy => Some(self.basepath.as_deref().unwrap_or("/")),
                BundleKind::SharedFlow => None,
            };
            api.deploy(kind, &imported.name, imported.revision, &env, basepath)
                .await?;
            info!("deployment to {} ok", env);
            deployed.push(env);
        }

        Output::json(&ImportReport {
            name: imported.name,
            revision: imported.revision,
            deployed,
        })
    }
}

#[derive(Args, Debug)]
pub struct UndeployAndDelete {
    /// Name prefix of the items to undeploy
    #[arg(short = 'P', long)]
    pub prefix: String,

    /// Delete the items after undeploying them
    #[arg(short = 'D', long)]
    pub delete: bool,

    #[arg(short = 'S', long)]
    pub sharedflows: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Undeployment {
    pub environment: String,
    pub revision: u32,
}

#[derive(Debug, Serialize)]
struct UndeployedItem {
    name: String,
    undeployed: Vec<Undeployment>,
    deleted: bool,
}

#[async_trait]
impl Command for UndeployAndDelete {
    fn validate(&self) -> CliResult<()> {
        if self.prefix.trim().is_empty() {
            return Err(CliError::usage("specify a name prefix (-P)"));
        }
        Ok(())
    }

    async fn run(&self, api: &dyn AdminApi) -> CliResult<Output> {
        let kind = bundle_kind(self.sharedflows);
        let predicate = NamePredicate::Prefix(self.prefix.clone());
        let mut items = Vec::new();

        for name in predicate.select(api.list_bundles(kind).await?) {
            let mut undeployed = Vec::new();
            for revision in api.list_revisions(kind, &name).await? {
                for environment in api.revision_deployments(kind, &name, revision).await? {
                    info!("undeploying {} r{} from {}", name, revision, environment);
                    api.undeploy(kind, &name, revision, &environment).await?;
                    undeployed.push(Undeployment {
                        environment,
                        revision,
                    });
                }
            }
            if self.delete {
                info!("deleting {}", name);
                api.delete_bundle(kind, &name).await?;
            }
            items.push(UndeployedItem {
                name,
                undeployed,
                deleted: self.delete,
            });
        }
        Output::json(&items)
    }
}

#[derive(Args, Debug)]
pub struct RemoveProxy {
    #[arg(short = 'P', long)]
    pub proxy: String,

    /// Actually make the changes; without it, only reports them
    #[arg(long)]
    pub doit: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ProductStatus {
    Updated,
    WillBeUpdated,
    Deleted,
    WillBeDeleted,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProductChange {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub proxies: Option<Vec<String>>,
    pub status: ProductStatus,
}

/// Products referencing `proxy`, with the reference removed. A product left
/// with no proxy references is to be deleted rather than updated.
pub fn detach_proxy(products: Vec<ApiProduct>, proxy: &str) -> Vec<(ApiProduct, bool)> {
    products
        .into_iter()
        .filter_map(|mut product| {
            if !product.remove_proxy(proxy) {
                return None;
            }
            let keep = product.reference_count() > 0;
            Some((product, keep))
        })
        .collect()
}

#[derive(Debug, Serialize)]
struct EnvironmentUndeployment {
    environment: String,
    revs: Vec<u32>,
}

#[derive(Debug, Serialize)]
struct RemovalReport {
    products: Vec<ProductChange>,
    undeployments: Vec<EnvironmentUndeployment>,
    deleted: bool,
}

#[async_trait]
impl Command for RemoveProxy {
    async fn run(&self, api: &dyn AdminApi) -> CliResult<Output> {
        let kind = BundleKind::Proxy;
        if !self.doit {
            info!("will not make any changes (see --doit)");
        }
        // fails with a 404 when the proxy does not exist
        api.list_revisions(kind, &self.proxy).await?;

        let products = api.list_products_expanded().await?;
        let affected = detach_proxy(products, &self.proxy);
        info!("found {} API products containing proxy {}", affected.len(), self.proxy);

        let mut changes = Vec::with_capacity(affected.len());
        for (product, keep) in affected {
            let status = match (keep, self.doit) {
                (true, true) => {
                    api.update_product(&product).await?;
                    ProductStatus::Updated
                }
                (true, false) => ProductStatus::WillBeUpdated,
                (false, true) => {
                    api.delete_product(&product.name).await?;
                    ProductStatus::Deleted
                }
                (false, false) => ProductStatus::WillBeDeleted,
            };
            changes.push(ProductChange {
                proxies: keep.then(|| product.proxies.clone()),
                name: product.name,
                status,
            });
        }

        let deployments = api.bundle_deployments(kind, &self.proxy, None).await?;
        let mut undeployments = Vec::new();
        for group in group_by_environment(&deployments) {
            if self.doit {
                for &revision in &group.revisions {
                    api.undeploy(kind, &self.proxy, revision, &group.name).await?;
                }
            }
            undeployments.push(EnvironmentUndeployment {
                environment: group.name,
                revs: group.revisions,
            });
        }

        if self.doit {
            api.delete_bundle(kind, &self.proxy).await?;
        }
        Output::json(&RemovalReport {
            products: changes,
            undeployments,
            deleted: self.doit,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_revisions_to_examine() {
        assert_eq!(revisions_to_examine(&[1, 2, 3, 4, 5], 2), vec![1, 2, 3]);
        assert_eq!(revisions_to_examine(&[5, 3, 1, 4, 2], 2), vec![1, 2, 3]);
        assert!(revisions_to_examine(&[1, 2], 2).is_empty());
        assert!(revisions_to_examine(&[1], 5).is_empty());
        assert!(revisions_to_examine(&[], 1).is_empty());
    }

    #[test]
    fn test_group_by_environment() {
        let d = |env: &str, revision| Deployment {
            name: "orders".to_string(),
            environment: env.to_string(),
            revision,
            state: None,
        };
        let groups = group_by_environment(&[d("test", 3), d("prod", 2), d("test", 4)]);
        assert_eq!(
            groups,
            vec![
                EnvironmentRevisions {
                    name: "test".to_string(),
                    revisions: vec![3, 4]
                },
                EnvironmentRevisions {
                    name: "prod".to_string(),
                    revisions: vec![2]
                },
            ]
        );
    }

    #[test]
    fn test_detach_proxy() {
        let products: Vec<ApiProduct> = serde_json::from_value(json!([
            {"name": "shared", "proxies": ["orders", "users"]},
            {"name": "solo", "proxies": ["orders"]},
            {"name": "other", "proxies": ["users"]},
            {"name": "grouped", "operationGroup": {
                "operationConfigType": "proxy",
                "operationConfigs": [{"apiSource": "orders"}, {"apiSource": "billing"}]
            }}
        ]))
        .unwrap();
        let detached = detach_proxy(products, "orders");
        let summary: Vec<(&str, bool)> = detached
            .iter()
            .map(|(p, keep)| (p.name.as_str(), *keep))
            .collect();
        assert_eq!(summary, vec![("shared", true), ("solo", false), ("grouped", true)]);
        assert_eq!(detached[0].0.proxies, vec!["users"]);
    }

    #[test]
    fn test_product_status_names() {
        assert_eq!(
            serde_json::to_value(ProductStatus::WillBeDeleted).unwrap(),
            json!("will-be-deleted")
        );
    }

    #[test]
    fn test_export_validation() {
        let export = |name: Option<&str>, pattern: Option<&str>, revision| Export {
            name: name.map(str::to_string),
            pattern: pattern.map(str::to_string),
            revision,
            destination: PathBuf::from("exported"),
            trial: true,
            sharedflow: false,
        };
        assert!(export(None, None, None).validate().is_err());
        assert!(export(Some("a"), Some("b"), None).validate().is_err());
        assert!(export(None, Some("^a"), Some(3)).validate().is_err());
        assert!(export(Some("a"), None, Some(3)).validate().is_ok());
        assert!(export(None, Some("^a"), None).validate().is_ok());
    }

    #[test]
    fn test_import_prepare_reads_declared_name() {
        let dir = tempfile::tempdir().unwrap();
        let proxy = dir.path().join("apiproxy");
        std::fs::create_dir_all(proxy.join("proxies")).unwrap();
        std::fs::write(proxy.join("orders.xml"), r#"<APIProxy name="orders"/>"#).unwrap();
        std::fs::write(proxy.join("proxies/default.xml"), "<ProxyEndpoint name=\"default\"/>").unwrap();

        let args = ImportAndDeploy {
            source: dir.path().to_path_buf(),
            name: None,
            environments: None,
            basepath: None,
            sharedflow: false,
        };
        let (zip, name) = args.prepare().unwrap();
        assert_eq!(name, "orders");

        let zip_path = dir.path().join("orders.zip");
        std::fs::write(&zip_path, &zip).unwrap();
        let from_zip = ImportAndDeploy {
            source: zip_path,
            ..args
        };
        assert_eq!(from_zip.prepare().unwrap().1, "orders");

        let with_basepath = ImportAndDeploy {
            basepath: Some("/v1".to_string()),
            sharedflow: true,
            ..from_zip
        };
        assert!(with_basepath.validate().is_err());
    }
}
