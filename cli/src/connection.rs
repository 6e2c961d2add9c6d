use crate::error::{CliError, CliResult};
use admin::{AdminConfig, ApiVariant, ApigeeClient, Auth, ConnectionProfile};
use clap::Args;
use std::path::PathBuf;
use std::time::Duration;
use tracing::debug;

/// Options shared by every subcommand. Explicit flags win over environment
/// variables, which win over the profile file.
#[derive(Args, Debug, Clone, Default)]
pub struct ConnectionArgs {
    /// The organization
    #[arg(short = 'o', long, env = "APIGEE_ORG")]
    pub org: Option<String>,

    /// Bearer token for the management API
    #[arg(long, env = "APIGEE_TOKEN", hide_env_values = true)]
    pub token: Option<String>,

    /// Username for basic authentication (Edge)
    #[arg(short = 'u', long)]
    pub username: Option<String>,

    /// Password for basic authentication (Edge)
    #[arg(long, env = "APIGEE_PASSWORD", hide_env_values = true)]
    pub password: Option<String>,

    /// Talk to Apigee X or hybrid rather than Edge
    #[arg(long)]
    pub apigeex: bool,

    /// Base URL of the management server
    #[arg(long)]
    pub mgmtserver: Option<String>,

    /// TOML file with connection defaults
    #[arg(long)]
    pub profile: Option<PathBuf>,
}

impl ConnectionArgs {
    fn load_profile(&self) -> CliResult<ConnectionProfile> {
        match &self.profile {
            Some(path) => ConnectionProfile::load(path).map_err(CliError::Usage),
            None => Ok(ConnectionProfile::default()),
        }
    }

    /// Merges flags with the profile into a validated `AdminConfig`.
    pub fn resolve(&self) -> CliResult<AdminConfig> {
        let profile = self.load_profile()?;

        let org = self
            .org
            .clone()
            .or(profile.org)
            .ok_or_else(|| CliError::usage("an organization is required (-o/--org or APIGEE_ORG)"))?;

        let variant = if self.apigeex || profile.apigeex.unwrap_or(false) {
            ApiVariant::X
        } else {
            ApiVariant::Edge
        };

        let auth = match (&self.token, &self.username) {
            (Some(token), _) => Auth::Bearer {
                token: token.clone(),
            },
            (None, Some(username)) => Auth::Basic {
                username: username.clone(),
                password: self
                    .password
                    .clone()
                    .or(profile.password.clone())
                    .ok_or_else(|| CliError::usage("a password is required with --username"))?,
            },
            (None, None) => match (profile.token, profile.username) {
                (Some(token), _) => Auth::Bearer { token },
                (None, Some(username)) => Auth::Basic {
                    username,
                    password: self
                        .password
                        .clone()
                        .or(profile.password)
                        .ok_or_else(|| CliError::usage("the profile has a username but no password"))?,
                },
                (None, None) => {
                    return Err(CliError::usage(
                        "credentials are required (--token, -u/--username, or a profile)",
                    ))
                }
            },
        };

        if variant == ApiVariant::X && matches!(auth, Auth::Basic { .. }) {
            return Err(CliError::usage("Apigee X requires a bearer token, not a username"));
        }

        let mut config = AdminConfig::new(org).with_variant(variant).with_auth(auth);
        if let Some(server) = self.mgmtserver.clone().or(profile.mgmtserver) {
            config = config.with_base_url(server);
        }
        if let Some(secs) = profile.timeout_secs {
            config = config.with_timeout(Duration::from_secs(secs));
        }

        config.validate().map_err(CliError::Usage)?;
        debug!("resolved connection for org {}", config.organization);
        Ok(config)
    }

    pub fn connect(&self) -> CliResult<ApigeeClient> {
        Ok(ApigeeClient::new(self.resolve()?)?)
    }
}
