use crate::types::{
    ApiProduct, App, BundleKind, Credential, Deployment, Developer, ExportedBundle,
    ImportedRevision, NewDeveloperApp, StatusAction,
};
use async_trait::async_trait;
use thiserror::Error;

/// Error code Edge returns when asking for the deployments of an undeployed bundle.
pub const APPLICATION_NOT_DEPLOYED: &str = "distribution.ApplicationNotDeployed";
pub const DEVELOPER_DOES_NOT_EXIST: &str = "developer.service.DeveloperDoesNotExist";
pub const INVALID_CLIENT_ID_FOR_APP: &str = "keymanagement.service.InvalidClientIdForGivenApp";

#[derive(Error, Debug)]
pub enum AdminError {
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Admin API returned {status}{}: {message}", code_suffix(.code))]
    Api {
        status: u16,
        code: Option<String>,
        message: String,
    },

    #[error("Invalid configuration: {message}")]
    InvalidConfig { message: String },

    #[error("Service unavailable: {message}")]
    ServiceUnavailable { message: String },

    #[error("Authentication failed (status {status})")]
    Authentication { status: u16 },

    #[error("Unexpected response: {message}")]
    UnexpectedResponse { message: String },
}

impl AdminError {
    pub fn status(&self) -> Option<u16> {
        match self {
            AdminError::Api { status, .. } | AdminError::Authentication { status } => Some(*status),
            _ => None,
        }
    }

    /// The structured error code from the response body, if the server sent one.
    pub fn code(&self) -> Option<&str> {
        match self {
            AdminError::Api { code, .. } => code.as_deref(),
            _ => None,
        }
    }

    pub fn is_not_found(&self) -> bool {
        self.status() == Some(404)
    }

    pub(crate) fn unexpected(message: impl Into<String>) -> Self {
        AdminError::UnexpectedResponse {
            message: message.into(),
        }
    }
}

fn code_suffix(code: &Option<String>) -> String {
    code.as_deref()
        .map(|c| format!(" ({})", c))
        .unwrap_or_default()
}

pub type AdminResult<T> = Result<T, AdminError>;

/// An organization handle exposing the management-plane resource collections.
///
/// Implementations hide the differences between the Edge and the X/hybrid
/// response shapes; callers only ever see the typed values from
/// [`crate::types`].
#[async_trait]
pub trait AdminApi: Send + Sync {
    fn organization(&self) -> &str;

    // proxies and sharedflows

    async fn list_bundles(&self, kind: BundleKind) -> AdminResult<Vec<String>>;

    /// Revision numbers of a bundle, ascending.
    async fn list_revisions(&self, kind: BundleKind, name: &str) -> AdminResult<Vec<u32>>;

    /// Deployments of a bundle, optionally confined to one environment. An
    /// undeployed bundle yields an empty list, not an error.
    async fn bundle_deployments(
        &self,
        kind: BundleKind,
        name: &str,
        environment: Option<&str>,
    ) -> AdminResult<Vec<Deployment>>;

    /// Environments in which one revision is deployed.
    async fn revision_deployments(
        &self,
        kind: BundleKind,
        name: &str,
        revision: u32,
    ) -> AdminResult<Vec<String>>;

    async fn delete_revision(&self, kind: BundleKind, name: &str, revision: u32)
        -> AdminResult<()>;

    async fn export_revision(
        &self,
        kind: BundleKind,
        name: &str,
        revision: u32,
    ) -> AdminResult<ExportedBundle>;

    async fn import_bundle(
        &self,
        kind: BundleKind,
        name: &str,
        zip: Vec<u8>,
    ) -> AdminResult<ImportedRevision>;

    async fn deploy(
        &self,
        kind: BundleKind,
        name: &str,
        revision: u32,
        environment: &str,
        basepath: Option<&str>,
    ) -> AdminResult<serde_json::Value>;

    async fn undeploy(
        &self,
        kind: BundleKind,
        name: &str,
        revision: u32,
        environment: &str,
    ) -> AdminResult<()>;

    async fn delete_bundle(&self, kind: BundleKind, name: &str) -> AdminResult<()>;

    // environments

    async fn list_environments(&self) -> AdminResult<Vec<String>>;

    async fn environment_deployments(&self, environment: &str) -> AdminResult<Vec<Deployment>>;

    // developers

    async fn list_developers(&self) -> AdminResult<Vec<String>>;

    /// Look up a developer by email or by developer id.
    async fn get_developer(&self, id_or_email: &str) -> AdminResult<Developer>;

    async fn set_developer_status(&self, email: &str, action: StatusAction) -> AdminResult<()>;

    // apps

    async fn list_apps(&self) -> AdminResult<Vec<App>>;

    async fn list_app_ids(&self) -> AdminResult<Vec<String>>;

    async fn get_app(&self, app_id: &str) -> AdminResult<App>;

    async fn list_developer_apps(&self, email: &str) -> AdminResult<Vec<String>>;

    async fn get_developer_app(&self, email: &str, app: &str) -> AdminResult<App>;

    async fn create_developer_app(&self, app: &NewDeveloperApp) -> AdminResult<App>;

    async fn set_developer_app_status(
        &self,
        email: &str,
        app: &str,
        action: StatusAction,
    ) -> AdminResult<()>;

    // credentials

    /// Ask the server to generate a new key/secret pair on an existing app.
    async fn add_generated_credential(
        &self,
        email: &str,
        app: &str,
        products: &[String],
        expires_in_ms: Option<i64>,
    ) -> AdminResult<Credential>;

    async fn add_credential(
        &self,
        email: &str,
        app: &str,
        consumer_key: &str,
        consumer_secret: &str,
        products: &[String],
    ) -> AdminResult<Credential>;

    async fn delete_credential(
        &self,
        developer: &str,
        app: &str,
        consumer_key: &str,
    ) -> AdminResult<Credential>;

    async fn add_product_to_credential(
        &self,
        email: &str,
        app: &str,
        consumer_key: &str,
        product: &str,
    ) -> AdminResult<Credential>;

    async fn set_credential_status(
        &self,
        developer: &str,
        app: &str,
        consumer_key: &str,
        action: StatusAction,
    ) -> AdminResult<()>;

    async fn set_credential_product_status(
        &self,
        developer: &str,
        app: &str,
        consumer_key: &str,
        product: &str,
        action: StatusAction,
    ) -> AdminResult<()>;

    // products

    async fn list_products(&self) -> AdminResult<Vec<String>>;

    async fn list_products_expanded(&self) -> AdminResult<Vec<ApiProduct>>;

    async fn get_product(&self, name: &str) -> AdminResult<ApiProduct>;

    async fn update_product(&self, product: &ApiProduct) -> AdminResult<ApiProduct>;

    async fn delete_product(&self, name: &str) -> AdminResult<()>;

    // key value maps

    /// KVM names in an environment, or at organization scope when `environment` is `None`.
    async fn list_kvms(&self, environment: Option<&str>) -> AdminResult<Vec<String>>;

    async fn create_kvm(&self, environment: &str, name: &str, encrypted: bool) -> AdminResult<()>;

    async fn put_kvm_entry(
        &self,
        environment: &str,
        map: &str,
        key: &str,
        value: &str,
    ) -> AdminResult<()>;
}
