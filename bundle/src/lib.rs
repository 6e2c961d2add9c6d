//! Client-side inspection of exported proxy and sharedflow bundles.
//!
//! Exported revisions are ZIP archives of XML configuration: a top-level
//! descriptor, `policies/`, `proxies/` (proxy endpoints), `targets/` (target
//! endpoints) and `resources/`. This crate unpacks them into a scratch
//! directory, parses the XML into a small element tree, and exposes pure
//! inspectors for the questions the management API cannot answer directly.

use std::path::PathBuf;
use thiserror::Error;

pub mod archive;
pub mod inspect;
pub mod xml;

pub use archive::{declared_name, pack_directory, pack_entries, Bundle, BundleFile, ScratchDir};
pub use inspect::{
    flow_callout_target, java_callout_resource, kvm_reference, policy_type, KvmReference,
    ProxyEndpoint, SslInfo, TargetConnection, TargetEndpoint, TargetKind,
};
pub use xml::Element;

/// Errors raised while unpacking or reading a bundle
#[derive(Error, Debug)]
pub enum BundleError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("ZIP error: {0}")]
    Zip(#[from] zip::result::ZipError),
    #[error("Malformed XML in {file}: {message}")]
    Xml { file: PathBuf, message: String },
    #[error("No apiproxy/ or sharedflowbundle/ directory under {path}")]
    MissingRoot { path: PathBuf },
}

pub type BundleResult<T> = Result<T, BundleError>;
