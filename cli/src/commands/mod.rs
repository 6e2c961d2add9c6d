//! One module per family of subcommands. Every subcommand is an args struct
//! implementing [`Command`].

pub mod apps;
pub mod credentials;
pub mod kvm;
pub mod products;
pub mod proxies;
pub mod scans;

use crate::error::{CliError, CliResult};
use crate::output::Output;
use admin::{AdminApi, BundleKind};
use async_trait::async_trait;
use clap::Subcommand;

#[async_trait]
pub trait Command: Send + Sync {
    /// Argument checks that need no network access.
    fn validate(&self) -> CliResult<()> {
        Ok(())
    }

    async fn run(&self, api: &dyn AdminApi) -> CliResult<Output>;
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Find the app and developer holding an API key
    FindApiKey(credentials::FindApiKey),
    /// Partition apps into no-expiry, expired and expiring-soon credentials
    CredentialStatus(credentials::CredentialStatus),
    /// List apps by credential state, or delete expired credentials
    Credentials(credentials::Credentials),
    /// Add a credential to a developer app, creating the app if needed
    AddAppCredential(credentials::AddAppCredential),
    /// Add an API product to every credential of an app
    AddProductToApp(credentials::AddProductToApp),
    /// Revoke or approve a developer, app, key, or product within a key
    RevokeOrApprove(credentials::RevokeOrApprove),
    /// Show one developer app, or the names of a developer's apps
    GetDeveloperApp(apps::GetDeveloperApp),
    /// List developers
    ListDevelopers(apps::ListDevelopers),
    /// Find apps with a credential authorized for a product
    FindAppForProduct(apps::FindAppForProduct),
    /// Find apps that can call a proxy through some product
    FindAppForProxy(apps::FindAppForProxy),
    /// Find products that grant access to a proxy
    FindProductForProxy(products::FindProductForProxy),
    /// Find credentials whose products overlap on the same operations
    CheckProductOverlap(products::CheckProductOverlap),
    /// List API products
    ListProducts(products::ListProducts),
    /// List proxies or sharedflows
    ListProxies(proxies::ListProxies),
    /// List deployments per environment
    ListDeployments(proxies::ListDeployments),
    /// Count revisions per proxy or sharedflow
    CountRevisions(proxies::CountRevisions),
    /// Delete all but the latest revisions, keeping anything deployed
    CleanOldRevisions(proxies::CleanOldRevisions),
    /// Export proxy or sharedflow bundles to zip files
    Export(proxies::Export),
    /// Import a bundle from a directory or zip and deploy it
    ImportAndDeploy(proxies::ImportAndDeploy),
    /// Undeploy every revision of matching proxies, optionally deleting them
    UndeployAndDelete(proxies::UndeployAndDelete),
    /// Detach a proxy from products, undeploy it and delete it
    RemoveProxy(proxies::RemoveProxy),
    /// Store a file's contents as a KVM entry
    LoadFileIntoKvm(kvm::LoadFileIntoKvm),
    /// List key value maps
    ListKvms(kvm::ListKvms),
    /// Find FlowCallout policies, optionally for one sharedflow
    FindFlowCallouts(scans::FindFlowCallouts),
    /// Report which proxies use which sharedflows
    ReportSharedflowUsage(scans::ReportSharedflowUsage),
    /// Find policies of one type
    ScanPolicyType(scans::ScanPolicyType),
    /// Find JavaCallout policies or JAR resources
    FindJavaPolicies(scans::FindJavaPolicies),
    /// Find KeyValueMapOperations policies
    FindKvmPolicies(scans::FindKvmPolicies),
    /// Find proxy endpoints listening on a virtual host
    FindVhost(scans::FindVhost),
    /// List virtual hosts per proxy revision
    FindVhosts(scans::FindVhosts),
    /// Find proxies serving a base path
    FindProxyForBasepath(scans::FindProxyForBasepath),
    /// Find proxies with target endpoints of a type
    FindTargetType(scans::FindTargetType),
    /// List base paths and targets of each proxy
    ListBasepathsAndTargets(scans::ListBasepathsAndTargets),
    /// Find HTTP targets with missing or weak TLS settings
    FindTargetBadSsl(scans::FindTargetBadSsl),
    /// List the policies in each proxy revision
    ListProxyPolicies(scans::ListProxyPolicies),
}

impl Commands {
    pub fn command(&self) -> &dyn Command {
        match self {
            Commands::FindApiKey(c) => c,
            Commands::CredentialStatus(c) => c,
            Commands::Credentials(c) => c,
            Commands::AddAppCredential(c) => c,
            Commands::AddProductToApp(c) => c,
            Commands::RevokeOrApprove(c) => c,
            Commands::GetDeveloperApp(c) => c,
            Commands::ListDevelopers(c) => c,
            Commands::FindAppForProduct(c) => c,
            Commands::FindAppForProxy(c) => c,
            Commands::FindProductForProxy(c) => c,
            Commands::CheckProductOverlap(c) => c,
            Commands::ListProducts(c) => c,
            Commands::ListProxies(c) => c,
            Commands::ListDeployments(c) => c,
            Commands::CountRevisions(c) => c,
            Commands::CleanOldRevisions(c) => c,
            Commands::Export(c) => c,
            Commands::ImportAndDeploy(c) => c,
            Commands::UndeployAndDelete(c) => c,
            Commands::RemoveProxy(c) => c,
            Commands::LoadFileIntoKvm(c) => c,
            Commands::ListKvms(c) => c,
            Commands::FindFlowCallouts(c) => c,
            Commands::ReportSharedflowUsage(c) => c,
            Commands::ScanPolicyType(c) => c,
            Commands::FindJavaPolicies(c) => c,
            Commands::FindKvmPolicies(c) => c,
            Commands::FindVhost(c) => c,
            Commands::FindVhosts(c) => c,
            Commands::FindProxyForBasepath(c) => c,
            Commands::FindTargetType(c) => c,
            Commands::ListBasepathsAndTargets(c) => c,
            Commands::FindTargetBadSsl(c) => c,
            Commands::ListProxyPolicies(c) => c,
        }
    }

    pub fn validate(&self) -> CliResult<()> {
        self.command().validate()
    }

    pub async fn run(&self, api: &dyn AdminApi) -> CliResult<Output> {
        let command = self.command();
        command.validate()?;
        command.run(api).await
    }
}

/// Splits a comma-separated option, dropping empty entries.
pub(crate) fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

pub(crate) fn bundle_kind(sharedflows: bool) -> BundleKind {
    if sharedflows {
        BundleKind::SharedFlow
    } else {
        BundleKind::Proxy
    }
}

pub(crate) fn require(value: &Option<String>, message: &str) -> CliResult<()> {
    match value {
        Some(v) if !v.trim().is_empty() => Ok(()),
        _ => Err(CliError::usage(message)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_list() {
        assert_eq!(split_list("a, b,,c "), vec!["a", "b", "c"]);
        assert!(split_list(" , ").is_empty());
    }

    #[test]
    fn test_require() {
        assert!(require(&Some("x".to_string()), "missing").is_ok());
        assert!(require(&Some("  ".to_string()), "missing").is_err());
        assert!(matches!(require(&None, "missing"), Err(CliError::Usage(m)) if m == "missing"));
    }
}
