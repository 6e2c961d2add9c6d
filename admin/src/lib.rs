pub mod api;
pub mod client;
pub mod config;
pub mod lookup;
pub mod normalize;
pub mod types;

pub use api::{AdminApi, AdminError, AdminResult};
pub use client::ApigeeClient;
pub use config::{AdminConfig, ApiVariant, Auth, ConnectionProfile};
pub use lookup::{find_credential, CredentialLookup, DeveloperSummary};
pub use types::{
    ApiProduct, App, BundleKind, Credential, Deployment, Developer, ExportedBundle,
    ImportedRevision, NewDeveloperApp, Operation, OperationConfig, OperationGroup, ProductGrant,
    StatusAction,
};

pub mod prelude {
    pub use crate::api::*;
    pub use crate::client::*;
    pub use crate::config::*;
    pub use crate::lookup::*;
    pub use crate::types::*;
}
