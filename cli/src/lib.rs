//! Subcommands for administering an Apigee organization through its
//! management API.
//!
//! Each subcommand is an args struct implementing [`commands::Command`]; the
//! binary parses one, connects with [`ConnectionArgs`], and prints the
//! [`Output`] it returns.

pub mod commands;
pub mod connection;
pub mod error;
pub mod keygen;
pub mod output;
pub mod scan;
pub mod selection;
pub mod timespan;

pub use commands::{Command, Commands};
pub use connection::ConnectionArgs;
pub use error::{CliError, CliResult};
pub use output::Output;
pub use scan::{BundleScanner, Counted, ItemHits, RevisionHits};
pub use selection::{resolve_candidates, Candidate, NamePredicate, RevisionFilter};
