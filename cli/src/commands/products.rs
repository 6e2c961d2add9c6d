use super::apps::products_for_proxy;
use super::Command;
use crate::error::CliResult;
use crate::output::Output;
use crate::selection::NamePredicate;
use admin::{AdminApi, ApiProduct, App, OperationConfig};
use async_trait::async_trait;
use clap::Args;
use futures::future::try_join_all;
use serde::Serialize;
use std::collections::{BTreeSet, HashMap};
use tracing::{debug, info};

#[derive(Args, Debug)]
pub struct FindProductForProxy {
    #[arg(short = 'P', long)]
    pub proxy: String,
}

#[async_trait]
impl Command for FindProductForProxy {
    async fn run(&self, api: &dyn AdminApi) -> CliResult<Output> {
        let products = api.list_products_expanded().await?;
        info!("total count of API products for that org: {}", products.len());
        let names = products_for_proxy(&products, &self.proxy);
        if names.is_empty() {
            info!("No API products containing {}", self.proxy);
        }
        Output::json(&names)
    }
}

#[derive(Args, Debug)]
pub struct ListProducts {
    /// Show the full product records
    #[arg(short = 'E', long)]
    pub elaborate: bool,
}

#[async_trait]
impl Command for ListProducts {
    async fn run(&self, api: &dyn AdminApi) -> CliResult<Output> {
        if self.elaborate {
            Output::json(&api.list_products_expanded().await?)
        } else {
            Output::json(&api.list_products().await?)
        }
    }
}

#[derive(Args, Debug)]
pub struct CheckProductOverlap {
    /// Only check apps whose name matches this regex
    #[arg(long)]
    pub appname: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OverlapWith {
    pub prod: String,
    pub op: OperationConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductOverlap {
    pub prod: String,
    pub overlaps_with: Vec<OverlapWith>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CredentialOverlap {
    pub app: String,
    pub cred: String,
    pub products: Vec<String>,
    pub found_overlaps: Vec<ProductOverlap>,
}

/// Proxy operation configs of a product. Products without a proxy-typed
/// operation group contribute nothing.
pub fn proxy_operations(product: &ApiProduct) -> Vec<OperationConfig> {
    match &product.operation_group {
        Some(group) if group.operation_config_type.as_deref() == Some("proxy") => {
            group.operation_configs.clone()
        }
        _ => Vec::new(),
    }
}

/// Two configs overlap when they target the same proxy and share a resource
/// with at least one method in common.
pub fn overlapping(a: &OperationConfig, b: &OperationConfig) -> bool {
    a.api_source == b.api_source
        && a.operations.iter().any(|op1| {
            b.operations.iter().any(|op2| {
                op1.resource == op2.resource && op1.methods.iter().any(|m| op2.methods.contains(m))
            })
        })
}

/// For each product but the last, the other products holding an operation
/// that overlaps one of its own.
pub fn find_overlaps(products: &[(String, Vec<OperationConfig>)]) -> Vec<ProductOverlap> {
    let mut overlaps = Vec::new();
    for (i, (name, ops)) in products.iter().enumerate().take(products.len().saturating_sub(1)) {
        let mut overlaps_with = Vec::new();
        for op1 in ops {
            for (other, other_ops) in products
                .iter()
                .enumerate()
                .filter(|(j, _)| *j != i)
                .map(|(_, p)| p)
            {
                if let Some(found) = other_ops.iter().find(|op2| overlapping(op1, op2)) {
                    overlaps_with.push(OverlapWith {
                        prod: other.clone(),
                        op: OperationConfig {
                            quota: None,
                            ..found.clone()
                        },
                    });
                }
            }
        }
        if !overlaps_with.is_empty() {
            overlaps.push(ProductOverlap {
                prod: name.clone(),
                overlaps_with,
            });
        }
    }
    overlaps
}

pub fn credential_overlaps(
    apps: &[App],
    operations: &HashMap<String, Vec<OperationConfig>>,
) -> Vec<CredentialOverlap> {
    let mut results = Vec::new();
    for app in apps {
        for cred in app.credentials.iter().filter(|c| c.api_products.len() > 1) {
            let products = cred.product_names();
            let elaborated: Vec<(String, Vec<OperationConfig>)> = products
                .iter()
                .map(|p| (p.clone(), operations.get(p).cloned().unwrap_or_default()))
                .collect();
            results.push(CredentialOverlap {
                app: app.name.clone(),
                cred: cred.consumer_key.clone(),
                found_overlaps: find_overlaps(&elaborated),
                products,
            });
        }
    }
    results
}

#[async_trait]
impl Command for CheckProductOverlap {
    fn validate(&self) -> CliResult<()> {
        NamePredicate::regex(self.appname.as_deref()).map(|_| ())
    }

    async fn run(&self, api: &dyn AdminApi) -> CliResult<Output> {
        let predicate = NamePredicate::regex(self.appname.as_deref())?;

        let ids = api.list_app_ids().await?;
        let mut apps = Vec::with_capacity(ids.len());
        for id in &ids {
            let app = api.get_app(id).await?;
            if predicate.matches(&app.name) {
                apps.push(app);
            }
        }
        info!("checking {} of {} apps", apps.len(), ids.len());

        let wanted: BTreeSet<String> = apps
            .iter()
            .flat_map(|app| app.credentials.iter())
            .filter(|c| c.api_products.len() > 1)
            .flat_map(|c| c.product_names())
            .collect();
        debug!("fetching {} products", wanted.len());
        let products = try_join_all(wanted.iter().map(|name| api.get_product(name))).await?;
        let operations: HashMap<String, Vec<OperationConfig>> = products
            .iter()
            .map(|p| (p.name.clone(), proxy_operations(p)))
            .collect();

        Output::json(&credential_overlaps(&apps, &operations))
    }
}
