use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

/// The two kinds of revisioned bundle the management plane stores.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BundleKind {
    Proxy,
    SharedFlow,
}

impl BundleKind {
    /// Path segment of the collection under the organization.
    pub fn collection(&self) -> &'static str {
        match self {
            BundleKind::Proxy => "apis",
            BundleKind::SharedFlow => "sharedflows",
        }
    }

    /// Key holding the listing array in X responses.
    pub fn list_key(&self) -> &'static str {
        match self {
            BundleKind::Proxy => "proxies",
            BundleKind::SharedFlow => "sharedFlows",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            BundleKind::Proxy => "apiproxy",
            BundleKind::SharedFlow => "sharedflow",
        }
    }
}

impl std::fmt::Display for BundleKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StatusAction {
    Approve,
    Revoke,
}

impl StatusAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            StatusAction::Approve => "approve",
            StatusAction::Revoke => "revoke",
        }
    }
}

/// One deployed revision of a proxy or sharedflow in one environment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Deployment {
    pub name: String,
    pub environment: String,
    pub revision: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductGrant {
    pub apiproduct: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Credential {
    pub consumer_key: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub consumer_secret: Option<String>,
    /// Milliseconds since the epoch; `-1` means the credential never expires.
    #[serde(default = "never_expires", deserialize_with = "millis_from_string_or_number")]
    pub expires_at: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub issued_at: Option<Value>,
    #[serde(default)]
    pub api_products: Vec<ProductGrant>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
}

impl Credential {
    pub fn never_expires(&self) -> bool {
        self.expires_at == -1
    }

    pub fn product_names(&self) -> Vec<String> {
        self.api_products
            .iter()
            .map(|grant| grant.apiproduct.clone())
            .collect()
    }

    pub fn has_product(&self, product: &str) -> bool {
        self.api_products.iter().any(|grant| grant.apiproduct == product)
    }
}

fn never_expires() -> i64 {
    -1
}

/// Edge sends `expiresAt` as a number, X sends it as a string.
fn millis_from_string_or_number<'de, D>(deserializer: D) -> Result<i64, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Millis {
        Number(i64),
        Float(f64),
        Text(String),
    }

    match Millis::deserialize(deserializer)? {
        Millis::Number(n) => Ok(n),
        Millis::Float(f) => Ok(f as i64),
        Millis::Text(s) => s.trim().parse::<i64>().map_err(serde::de::Error::custom),
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct App {
    #[serde(default)]
    pub app_id: String,
    pub name: String,
    #[serde(default)]
    pub developer_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(default)]
    pub credentials: Vec<Credential>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl App {
    pub fn credential(&self, consumer_key: &str) -> Option<&Credential> {
        self.credentials
            .iter()
            .find(|cred| cred.consumer_key == consumer_key)
    }

    pub fn has_product(&self, product: &str) -> bool {
        self.credentials.iter().any(|cred| cred.has_product(product))
    }
}

/// Request body for creating an app owned by a developer.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NewDeveloperApp {
    #[serde(skip)]
    pub developer_email: String,
    pub name: String,
    pub api_products: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key_expires_in: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub callback_url: Option<String>,
}

impl NewDeveloperApp {
    pub fn new(developer_email: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            developer_email: developer_email.into(),
            name: name.into(),
            api_products: Vec::new(),
            key_expires_in: None,
            callback_url: None,
        }
    }

    pub fn with_products(mut self, products: Vec<String>) -> Self {
        self.api_products = products;
        self
    }

    pub fn with_key_expiry(mut self, expires_in_ms: Option<i64>) -> Self {
        self.key_expires_in = expires_in_ms;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Developer {
    pub email: String,
    #[serde(default)]
    pub developer_id: String,
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
    #[serde(default)]
    pub user_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(default)]
    pub apps: Vec<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Operation {
    #[serde(default)]
    pub resource: String,
    #[serde(default)]
    pub methods: Vec<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OperationConfig {
    pub api_source: String,
    #[serde(default)]
    pub operations: Vec<Operation>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quota: Option<Value>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OperationGroup {
    #[serde(default)]
    pub operation_configs: Vec<OperationConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub operation_config_type: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiProduct {
    pub name: String,
    #[serde(default)]
    pub proxies: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub operation_group: Option<OperationGroup>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub graphql_operation_group: Option<OperationGroup>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ApiProduct {
    /// True when the product grants access to `proxy`, through the proxy list
    /// or through an operation group.
    pub fn covers_proxy(&self, proxy: &str) -> bool {
        self.proxies.iter().any(|p| p == proxy)
            || self.operation_groups().any(|group| {
                group
                    .operation_configs
                    .iter()
                    .any(|config| config.api_source == proxy)
            })
    }

    pub fn operation_groups(&self) -> impl Iterator<Item = &OperationGroup> {
        self.operation_group
            .iter()
            .chain(self.graphql_operation_group.iter())
    }

    /// Drops every reference to `proxy`. Returns true when something was removed.
    pub fn remove_proxy(&mut self, proxy: &str) -> bool {
        let before = self.reference_count();
        self.proxies.retain(|p| p != proxy);
        for group in [&mut self.operation_group, &mut self.graphql_operation_group]
            .into_iter()
            .flatten()
        {
            group
                .operation_configs
                .retain(|config| config.api_source != proxy);
        }
        self.reference_count() != before
    }

    /// Number of proxy references (list entries plus operation configs).
    pub fn reference_count(&self) -> usize {
        self.proxies.len()
            + self
                .operation_groups()
                .map(|group| group.operation_configs.len())
                .sum::<usize>()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportedBundle {
    pub filename: String,
    pub bytes: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportedRevision {
    pub name: String,
    pub revision: u32,
}
