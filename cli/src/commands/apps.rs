use super::Command;
use crate::error::CliResult;
use crate::output::Output;
use admin::{AdminApi, ApiProduct, App};
use async_trait::async_trait;
use clap::Args;
use serde::Serialize;
use std::collections::BTreeSet;
use tracing::info;

#[derive(Args, Debug)]
pub struct GetDeveloperApp {
    /// Email of the developer owning the app
    #[arg(short = 'D', long)]
    pub developer: String,

    /// App to show; without it, lists the developer's app names
    #[arg(short = 'A', long)]
    pub app: Option<String>,
}

#[async_trait]
impl Command for GetDeveloperApp {
    async fn run(&self, api: &dyn AdminApi) -> CliResult<Output> {
        match &self.app {
            Some(app) => Output::json(&api.get_developer_app(&self.developer, app).await?),
            None => Output::json(&api.list_developer_apps(&self.developer).await?),
        }
    }
}

#[derive(Args, Debug)]
pub struct ListDevelopers {
    /// Fetch the full record of each developer
    #[arg(short = 'E', long)]
    pub expand: bool,
}

#[async_trait]
impl Command for ListDevelopers {
    async fn run(&self, api: &dyn AdminApi) -> CliResult<Output> {
        let emails = api.list_developers().await?;
        info!("{} developers", emails.len());
        if !self.expand {
            return Output::json(&emails);
        }
        let mut developers = Vec::with_capacity(emails.len());
        for email in &emails {
            developers.push(api.get_developer(email).await?);
        }
        Output::json(&developers)
    }
}

/// Name and owner of an app, the way the management API addresses it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AppRef {
    pub developer_id: String,
    pub name: String,
}

impl AppRef {
    fn from_app(app: &App) -> Self {
        Self {
            developer_id: app.developer_id.clone(),
            name: app.name.clone(),
        }
    }
}

/// Apps with at least one credential authorized for any of `products`.
pub fn apps_with_products<'a>(apps: &'a [App], products: &[String]) -> Vec<&'a App> {
    apps.iter()
        .filter(|app| products.iter().any(|p| app.has_product(p)))
        .collect()
}

#[derive(Args, Debug)]
pub struct FindAppForProduct {
    #[arg(short = 'P', long)]
    pub apiproduct: String,

    /// List the emails of the owning developers instead of the apps
    #[arg(short = 'D', long)]
    pub developers: bool,
}

#[derive(Serialize)]
struct AppsReport {
    apps: Vec<AppRef>,
}

#[derive(Serialize)]
struct DevelopersReport {
    developers: Vec<String>,
}

#[async_trait]
impl Command for FindAppForProduct {
    async fn run(&self, api: &dyn AdminApi) -> CliResult<Output> {
        let apps = api.list_apps().await?;
        info!("total count of apps for that org: {}", apps.len());
        let matching = apps_with_products(&apps, std::slice::from_ref(&self.apiproduct));

        if !self.developers {
            return Output::json(&AppsReport {
                apps: matching.into_iter().map(AppRef::from_app).collect(),
            });
        }

        let mut seen = BTreeSet::new();
        let mut developers = Vec::new();
        for app in matching {
            if seen.insert(app.developer_id.as_str()) {
                developers.push(api.get_developer(&app.developer_id).await?.email);
            }
        }
        Output::json(&DevelopersReport { developers })
    }
}

#[derive(Args, Debug)]
pub struct FindAppForProxy {
    #[arg(short = 'P', long)]
    pub proxy: String,
}

#[derive(Debug, Serialize)]
pub struct ProxyAppsReport {
    pub products: Vec<String>,
    pub apps: Vec<AppPath>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AppPath {
    pub developer_id: String,
    pub name: String,
    pub path: String,
}

pub fn products_for_proxy(products: &[ApiProduct], proxy: &str) -> Vec<String> {
    products
        .iter()
        .filter(|p| p.covers_proxy(proxy))
        .map(|p| p.name.clone())
        .collect()
}

#[async_trait]
impl Command for FindAppForProxy {
    async fn run(&self, api: &dyn AdminApi) -> CliResult<Output> {
        let products = api.list_products_expanded().await?;
        info!("total count of API products for that org: {}", products.len());
        let names = products_for_proxy(&products, &self.proxy);
        info!("count of API products containing {}: {}", self.proxy, names.len());

        let mut report = ProxyAppsReport {
            products: names,
            apps: Vec::new(),
        };
        if report.products.is_empty() {
            return Output::json(&report);
        }

        let apps = api.list_apps().await?;
        info!("total count of apps for that org: {}", apps.len());
        report.apps = apps_with_products(&apps, &report.products)
            .into_iter()
            .map(|app| AppPath {
                developer_id: app.developer_id.clone(),
                name: app.name.clone(),
                path: format!(
                    "/v1/organizations/{}/developers/{}/apps/{}",
                    api.organization(),
                    app.developer_id,
                    app.name
                ),
            })
            .collect();
        Output::json(&report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn app(name: &str, products: &[&str]) -> App {
        serde_json::from_value(json!({
            "appId": format!("id-{}", name),
            "name": name,
            "developerId": format!("dev-{}", name),
            "credentials": [{
                "consumerKey": format!("key-{}", name),
                "expiresAt": -1,
                "apiProducts": products
                    .iter()
                    .map(|p| json!({"apiproduct": p, "status": "approved"}))
                    .collect::<Vec<_>>()
            }]
        }))
        .unwrap()
    }

    #[test]
    fn test_apps_with_products() {
        let apps = vec![app("a", &["gold"]), app("b", &["silver", "bronze"]), app("c", &[])];
        let found: Vec<&str> = apps_with_products(&apps, &["bronze".to_string(), "gold".to_string()])
            .iter()
            .map(|a| a.name.as_str())
            .collect();
        assert_eq!(found, vec!["a", "b"]);
        assert!(apps_with_products(&apps, &["platinum".to_string()]).is_empty());
    }

    #[test]
    fn test_products_for_proxy_both_models() {
        let products: Vec<ApiProduct> = serde_json::from_value(json!([
            {"name": "old-style", "proxies": ["orders", "users"]},
            {"name": "new-style", "operationGroup": {
                "operationConfigType": "proxy",
                "operationConfigs": [{"apiSource": "orders", "operations": []}]
            }},
            {"name": "unrelated", "proxies": ["billing"]}
        ]))
        .unwrap();
        assert_eq!(products_for_proxy(&products, "orders"), vec!["old-style", "new-style"]);
        assert_eq!(products_for_proxy(&products, "users"), vec!["old-style"]);
        assert!(products_for_proxy(&products, "nothing").is_empty());
    }
}
