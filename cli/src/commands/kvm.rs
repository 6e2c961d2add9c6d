use super::Command;
use crate::error::CliResult;
use crate::output::Output;
use admin::AdminApi;
use async_trait::async_trait;
use clap::Args;
use std::path::PathBuf;
use tracing::info;

/// Converts CRLF and lone CR line endings to LF.
pub fn normalize_newlines(content: &str) -> String {
    content.replace("\r\n", "\n").replace('\r', "\n")
}

#[derive(Args, Debug)]
pub struct LoadFileIntoKvm {
    #[arg(short = 'e', long = "env")]
    pub environment: String,

    /// KVM to store into; created when missing
    #[arg(short = 'm', long, default_value = "settings")]
    pub mapname: String,

    /// Create the map encrypted, if it has to be created
    #[arg(short = 'E', long)]
    pub encrypted: bool,

    /// File whose contents become the entry value
    #[arg(short = 'F', long)]
    pub file: PathBuf,

    #[arg(long)]
    pub entryname: String,
}

#[async_trait]
impl Command for LoadFileIntoKvm {
    async fn run(&self, api: &dyn AdminApi) -> CliResult<Output> {
        let content = normalize_newlines(&tokio::fs::read_to_string(&self.file).await?);

        let maps = api.list_kvms(Some(&self.environment)).await?;
        if maps.iter().any(|m| *m == self.mapname) {
            info!("ok. the required map exists");
        } else {
            info!("creating map {} in {}", self.mapname, self.environment);
            api.create_kvm(&self.environment, &self.mapname, self.encrypted)
                .await?;
        }

        info!("storing new key '{}'", self.entryname);
        api.put_kvm_entry(&self.environment, &self.mapname, &self.entryname, &content)
            .await?;
        Ok(Output::text("ok. the key was loaded successfully."))
    }
}

#[derive(Args, Debug)]
pub struct ListKvms {
    /// Environment to list; organization-scoped maps otherwise
    #[arg(short = 'e', long = "env")]
    pub environment: Option<String>,
}

#[async_trait]
impl Command for ListKvms {
    async fn run(&self, api: &dyn AdminApi) -> CliResult<Output> {
        Output::json(&api.list_kvms(self.environment.as_deref()).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_newlines() {
        assert_eq!(normalize_newlines("a\r\nb\rc\nd"), "a\nb\nc\nd");
        assert_eq!(normalize_newlines("-----BEGIN-----\r\n"), "-----BEGIN-----\n");
        assert_eq!(normalize_newlines(""), "");
    }
}
