use super::{split_list, Command};
use crate::error::{CliError, CliResult};
use crate::keygen;
use crate::output::Output;
use crate::timespan;
use admin::api::{DEVELOPER_DOES_NOT_EXIST, INVALID_CLIENT_ID_FOR_APP};
use admin::{find_credential, AdminApi, AdminError, App, NewDeveloperApp, StatusAction};
use async_trait::async_trait;
use chrono::{SecondsFormat, TimeZone, Utc};
use clap::{ArgGroup, Args, ValueEnum};
use serde::Serialize;
use tracing::{debug, info, warn};

pub(crate) fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}

/// ISO-8601 rendering of an epoch-millisecond timestamp.
pub(crate) fn iso_millis(ms: i64) -> String {
    Utc.timestamp_millis_opt(ms)
        .single()
        .map(|t| t.to_rfc3339_opts(SecondsFormat::Millis, true))
        .unwrap_or_else(|| ms.to_string())
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CredentialRow {
    pub consumer_key: String,
    pub expires_at: i64,
    pub expires: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AppRow {
    pub name: String,
    pub developer_id: String,
    pub creds: Vec<CredentialRow>,
}

impl AppRow {
    fn any_expiring_before(&self, cutoff: i64) -> bool {
        self.creds
            .iter()
            .any(|c| c.expires_at != -1 && c.expires_at < cutoff)
    }
}

pub fn app_rows(apps: &[App]) -> Vec<AppRow> {
    apps.iter()
        .map(|app| AppRow {
            name: app.name.clone(),
            developer_id: app.developer_id.clone(),
            creds: app
                .credentials
                .iter()
                .map(|c| CredentialRow {
                    consumer_key: c.consumer_key.clone(),
                    expires_at: c.expires_at,
                    expires: if c.never_expires() {
                        "never".to_string()
                    } else {
                        iso_millis(c.expires_at)
                    },
                })
                .collect(),
        })
        .collect()
}

#[derive(Args, Debug)]
pub struct FindApiKey {
    /// The API key to find
    #[arg(short = 'k', long)]
    pub key: String,
}

#[async_trait]
impl Command for FindApiKey {
    async fn run(&self, api: &dyn AdminApi) -> CliResult<Output> {
        match find_credential(api, &self.key).await? {
            Some(found) => Output::json(&found),
            None => Ok(Output::text("that key was not found.")),
        }
    }
}

#[derive(Args, Debug)]
pub struct CredentialStatus {
    /// Threshold for "soon", such as 30d, 40w or 1y
    #[arg(long)]
    pub timespan: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CredentialStatusReport {
    pub no_expiry: Vec<AppRow>,
    pub expired: Vec<AppRow>,
    pub expiring_soon: Vec<AppRow>,
}

impl CredentialStatusReport {
    /// An app lands in the first bucket it qualifies for: any never-expiring
    /// credential, then any credential already expired, then any credential
    /// expiring before `horizon`. Apps in none of these are left out.
    pub fn partition(rows: Vec<AppRow>, now: i64, horizon: i64) -> Self {
        let mut report = CredentialStatusReport {
            no_expiry: Vec::new(),
            expired: Vec::new(),
            expiring_soon: Vec::new(),
        };
        for row in rows {
            if row.creds.iter().any(|c| c.expires_at == -1) {
                report.no_expiry.push(row);
            } else if row.creds.iter().any(|c| c.expires_at < now) {
                report.expired.push(row);
            } else if row.creds.iter().any(|c| c.expires_at < horizon) {
                report.expiring_soon.push(row);
            }
        }
        report
    }
}

#[async_trait]
impl Command for CredentialStatus {
    async fn run(&self, api: &dyn AdminApi) -> CliResult<Output> {
        let span = timespan::parse_or(self.timespan.as_deref().filter(|s| !s.starts_with('-')), "30d");
        let now = now_millis();
        info!("looking for apps expiring before {}", iso_millis(now + span));

        let apps = api.list_apps().await?;
        info!("found {} apps for that org", apps.len());
        Output::json(&CredentialStatusReport::partition(app_rows(&apps), now, now + span))
    }
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum CredentialAction {
    /// Apps with credentials expired before now minus the timespan
    List,
    /// Apps where no credential has an expiry
    ListNoExpiry,
    /// Apps with zero credentials
    ListNoCreds,
    /// Delete credentials expired before now minus the timespan
    DeleteExpired,
}

#[derive(Args, Debug)]
pub struct Credentials {
    #[arg(long, value_enum)]
    pub action: CredentialAction,

    /// Look back this far, or forward with a negative value such as -30d
    #[arg(long, allow_hyphen_values = true)]
    pub timespan: Option<String>,

    /// Actually delete; without it delete-expired only reports
    #[arg(long)]
    pub doit: bool,
}

impl Credentials {
    fn span(&self) -> i64 {
        timespan::parse_or(self.timespan.as_deref(), "none")
    }
}

/// Rows for the list actions. `cutoff` is now minus the timespan.
pub fn select_rows(rows: Vec<AppRow>, action: CredentialAction, now: i64, cutoff: i64) -> Vec<AppRow> {
    match action {
        CredentialAction::ListNoCreds => rows.into_iter().filter(|r| r.creds.is_empty()).collect(),
        CredentialAction::ListNoExpiry => rows
            .into_iter()
            .filter(|r| r.creds.iter().all(|c| c.expires_at == -1))
            .collect(),
        CredentialAction::List | CredentialAction::DeleteExpired => {
            let before: Vec<AppRow> = rows
                .into_iter()
                .filter(|r| r.any_expiring_before(cutoff))
                .collect();
            if cutoff > now {
                // looking forward: skip apps that already have dead or eternal keys
                before
                    .into_iter()
                    .filter(|r| !r.creds.iter().any(|c| c.expires_at == -1 || c.expires_at < now))
                    .collect()
            } else {
                before
            }
        }
    }
}

#[async_trait]
impl Command for Credentials {
    fn validate(&self) -> CliResult<()> {
        match self.action {
            CredentialAction::ListNoExpiry | CredentialAction::ListNoCreds
                if self.timespan.is_some() =>
            {
                Err(CliError::usage(format!(
                    "do not specify a timespan with {:?}",
                    self.action
                )))
            }
            CredentialAction::DeleteExpired if self.span() < 0 => Err(CliError::usage(
                "do not specify a negative timespan with delete-expired",
            )),
            _ => Ok(()),
        }
    }

    async fn run(&self, api: &dyn AdminApi) -> CliResult<Output> {
        let now = now_millis();
        let cutoff = now - self.span();
        debug!("credential cutoff {}", iso_millis(cutoff));

        let apps = api.list_apps().await?;
        info!("found {} apps for that org", apps.len());
        let selected = select_rows(app_rows(&apps), self.action, now, cutoff);
        info!("{} matching apps", selected.len());

        if self.action != CredentialAction::DeleteExpired {
            return Output::json(&selected);
        }
        if !self.doit {
            info!("dry run, pass --doit to delete these credentials");
            return Output::json(&selected);
        }

        let mut deleted = Vec::new();
        for row in &selected {
            for cred in row.creds.iter().filter(|c| c.expires_at != -1 && c.expires_at < cutoff) {
                info!("deleting {} from {}", cred.consumer_key, row.name);
                deleted.push(
                    api.delete_credential(&row.developer_id, &row.name, &cred.consumer_key)
                        .await?,
                );
            }
        }
        Output::json(&deleted)
    }
}

#[derive(Args, Debug)]
pub struct AddAppCredential {
    /// API product, or a comma-separated list of products
    #[arg(short = 'p', long = "product")]
    pub products: String,

    /// Email of the developer owning the app
    #[arg(short = 'E', long)]
    pub email: String,

    #[arg(short = 'A', long)]
    pub appname: String,

    /// Explicit client id; generated when absent
    #[arg(short = 'I', long)]
    pub clientid: Option<String>,

    /// Explicit client secret; generated when absent
    #[arg(short = 'S', long)]
    pub secret: Option<String>,

    /// Length of any generated value
    #[arg(short = 'L', long, default_value_t = keygen::DEFAULT_LENGTH)]
    pub credlength: usize,

    /// Credential lifetime such as 90d; ignored with explicit credentials
    #[arg(short = 'x', long)]
    pub expiry: Option<String>,
}

impl AddAppCredential {
    fn expires_in(&self) -> CliResult<Option<i64>> {
        match &self.expiry {
            None => Ok(None),
            Some(s) => match timespan::parse_millis(s) {
                Some(ms) if ms > 0 => Ok(Some(ms)),
                _ => Err(CliError::usage(format!("invalid expiry '{}'", s))),
            },
        }
    }

    /// An explicit value when its length is acceptable, otherwise a fresh one.
    fn valid_value(&self, explicit: Option<&str>, label: &str) -> String {
        match explicit {
            Some(value) if keygen::is_valid_length(value) => value.to_string(),
            Some(_) => {
                warn!("invalid length for the explicitly-provided {}, generating one", label);
                keygen::random_string(self.credlength)
            }
            None => keygen::random_string(self.credlength),
        }
    }
}

#[async_trait]
impl Command for AddAppCredential {
    fn validate(&self) -> CliResult<()> {
        if split_list(&self.products).is_empty() {
            return Err(CliError::usage("you must specify an API product"));
        }
        self.expires_in().map(|_| ())
    }

    async fn run(&self, api: &dyn AdminApi) -> CliResult<Output> {
        let products = split_list(&self.products);
        let expires_in = self.expires_in()?;

        match api.get_developer(&self.email).await {
            Ok(developer) => debug!("developer {}", developer.developer_id),
            Err(e) if e.code() == Some(DEVELOPER_DOES_NOT_EXIST) || e.is_not_found() => {
                return Ok(Output::text("That developer does not exist."));
            }
            Err(e) => return Err(e.into()),
        }

        let (app, is_new) = match api.get_developer_app(&self.email, &self.appname).await {
            Ok(app) => (app, false),
            Err(e) if e.is_not_found() => {
                info!("That app does not exist.... creating it.");
                let new_app = NewDeveloperApp::new(&self.email, &self.appname)
                    .with_products(products.clone())
                    .with_key_expiry(expires_in);
                (api.create_developer_app(&new_app).await?, true)
            }
            Err(e) => return Err(e.into()),
        };

        if self.clientid.is_none() && self.secret.is_none() {
            if is_new {
                let generated = app.credentials.into_iter().next().ok_or_else(|| {
                    AdminError::UnexpectedResponse {
                        message: "new app has no credential".to_string(),
                    }
                })?;
                return Output::json(&generated);
            }
            let added = api
                .add_generated_credential(&self.email, &self.appname, &products, expires_in)
                .await?;
            return Output::json(&added);
        }

        if is_new {
            if let Some(generated) = app.credentials.first() {
                api.delete_credential(&self.email, &self.appname, &generated.consumer_key)
                    .await?;
            }
        }
        if self.expiry.is_some() {
            warn!("a credential expiry cannot be set with an explicit client id and secret");
        }
        let key = self.valid_value(self.clientid.as_deref(), "client id");
        let secret = self.valid_value(self.secret.as_deref(), "client secret");

        match api
            .add_credential(&self.email, &self.appname, &key, &secret, &products)
            .await
        {
            Ok(added) => Output::json(&added),
            Err(e) if e.code() == Some(INVALID_CLIENT_ID_FOR_APP) => {
                Ok(Output::text("That clientId is invalid. Duplicate?"))
            }
            Err(e) => Err(e.into()),
        }
    }
}

#[derive(Args, Debug)]
pub struct AddProductToApp {
    #[arg(short = 'p', long)]
    pub product: String,

    #[arg(short = 'E', long)]
    pub email: String,

    #[arg(short = 'A', long)]
    pub appname: String,
}

#[async_trait]
impl Command for AddProductToApp {
    async fn run(&self, api: &dyn AdminApi) -> CliResult<Output> {
        let app = api.get_developer_app(&self.email, &self.appname).await?;
        for cred in &app.credentials {
            debug!("adding {} to {}", self.product, cred.consumer_key);
            api.add_product_to_credential(&self.email, &self.appname, &cred.consumer_key, &self.product)
                .await?;
        }
        Ok(Output::text("ok"))
    }
}

#[derive(Args, Debug)]
#[command(group(ArgGroup::new("action").required(true).args(["approve", "revoke"])))]
pub struct RevokeOrApprove {
    #[arg(short = 'A', long)]
    pub approve: bool,

    #[arg(short = 'R', long)]
    pub revoke: bool,

    /// Developer email
    #[arg(short = 'd', long)]
    pub developer: Option<String>,

    /// Developer app name, used with -d
    #[arg(short = 'a', long)]
    pub app: Option<String>,

    /// Consumer key
    #[arg(short = 'k', long)]
    pub key: Option<String>,

    /// Product within the key
    #[arg(short = 'p', long)]
    pub product: Option<String>,
}

impl RevokeOrApprove {
    fn action(&self) -> StatusAction {
        if self.approve {
            StatusAction::Approve
        } else {
            StatusAction::Revoke
        }
    }
}

#[async_trait]
impl Command for RevokeOrApprove {
    fn validate(&self) -> CliResult<()> {
        if self.approve == self.revoke {
            return Err(CliError::usage("specify one of -A or -R"));
        }
        if self.key.is_none() && self.developer.is_none() {
            return Err(CliError::usage("specify a key, or a developer (and optionally an app)"));
        }
        if self.product.is_some() && self.key.is_none() {
            return Err(CliError::usage("a product can only be given together with a key"));
        }
        Ok(())
    }

    async fn run(&self, api: &dyn AdminApi) -> CliResult<Output> {
        let action = self.action();

        if let Some(key) = &self.key {
            let Some(found) = find_credential(api, key).await? else {
                return Ok(Output::text("That key was not found."));
            };
            if let Some(developer) = &self.developer {
                if found.developer.email != *developer {
                    return Err(CliError::usage(
                        "mismatch between expected and actual developer",
                    ));
                }
            }
            let email = &found.developer.email;
            match &self.product {
                Some(product) => {
                    api.set_credential_product_status(email, &found.app_name, key, product, action)
                        .await?
                }
                None => {
                    api.set_credential_status(email, &found.app_name, key, action)
                        .await?
                }
            }
            return Ok(Output::text("ok"));
        }

        let Some(developer) = &self.developer else {
            return Err(CliError::usage("illegal parameters"));
        };
        match &self.app {
            Some(app) => api.set_developer_app_status(developer, app, action).await?,
            None => api.set_developer_status(developer, action).await?,
        }
        Ok(Output::text("ok"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DAY: i64 = 86_400_000;

    fn row(name: &str, expiries: &[i64]) -> AppRow {
        AppRow {
            name: name.to_string(),
            developer_id: format!("dev-{}", name),
            creds: expiries
                .iter()
                .enumerate()
                .map(|(i, &expires_at)| CredentialRow {
                    consumer_key: format!("{}-{}", name, i),
                    expires_at,
                    expires: String::new(),
                })
                .collect(),
        }
    }

    fn names(rows: &[AppRow]) -> Vec<&str> {
        rows.iter().map(|r| r.name.as_str()).collect()
    }

    #[test]
    fn test_status_partition() {
        let now = 1_700_000_000_000;
        let rows = vec![
            row("eternal", &[-1, now - DAY]),
            row("dead", &[now - DAY, now + 100 * DAY]),
            row("soon", &[now + 10 * DAY]),
            row("later", &[now + 60 * DAY]),
            row("empty", &[]),
        ];
        let report = CredentialStatusReport::partition(rows, now, now + 30 * DAY);
        assert_eq!(names(&report.no_expiry), vec!["eternal"]);
        assert_eq!(names(&report.expired), vec!["dead"]);
        assert_eq!(names(&report.expiring_soon), vec!["soon"]);
    }

    #[test]
    fn test_select_rows() {
        let now = 1_700_000_000_000;
        let rows = || {
            vec![
                row("none", &[]),
                row("eternal", &[-1]),
                row("old", &[now - 40 * DAY]),
                row("recent", &[now - 5 * DAY]),
                row("soon", &[now + 5 * DAY]),
                row("mixed", &[-1, now + 5 * DAY]),
            ]
        };

        assert_eq!(names(&select_rows(rows(), CredentialAction::ListNoCreds, now, now)), vec!["none"]);
        assert_eq!(
            names(&select_rows(rows(), CredentialAction::ListNoExpiry, now, now)),
            vec!["none", "eternal"]
        );
        // expired more than 30 days ago
        assert_eq!(
            names(&select_rows(rows(), CredentialAction::List, now, now - 30 * DAY)),
            vec!["old"]
        );
        // expiring within the next 30 days, not yet expired
        assert_eq!(
            names(&select_rows(rows(), CredentialAction::List, now, now + 30 * DAY)),
            vec!["soon"]
        );
    }

    #[test]
    fn test_credentials_validation() {
        let with = |action, timespan: Option<&str>| Credentials {
            action,
            timespan: timespan.map(str::to_string),
            doit: false,
        };
        assert!(with(CredentialAction::ListNoExpiry, Some("30d")).validate().is_err());
        assert!(with(CredentialAction::ListNoCreds, Some("30d")).validate().is_err());
        assert!(with(CredentialAction::DeleteExpired, Some("-30d")).validate().is_err());
        assert!(with(CredentialAction::DeleteExpired, Some("30d")).validate().is_ok());
        assert!(with(CredentialAction::List, Some("-30d")).validate().is_ok());
        assert_eq!(with(CredentialAction::List, None).span(), 0);
    }

    #[test]
    fn test_app_rows_label_expiry() {
        let app: App = serde_json::from_value(serde_json::json!({
            "appId": "a-1",
            "name": "app1",
            "developerId": "dev1",
            "credentials": [
                {"consumerKey": "k1", "expiresAt": -1},
                {"consumerKey": "k2", "expiresAt": "0"}
            ]
        }))
        .unwrap();
        let rows = app_rows(&[app]);
        assert_eq!(rows[0].creds[0].expires, "never");
        assert_eq!(rows[0].creds[1].expires, "1970-01-01T00:00:00.000Z");
    }

    #[test]
    fn test_add_app_credential_values() {
        let args = AddAppCredential {
            products: "p1,p2".to_string(),
            email: "dev@example.com".to_string(),
            appname: "app1".to_string(),
            clientid: Some("tooshort".to_string()),
            secret: Some("s".repeat(32)),
            credlength: 20,
            expiry: Some("90d".to_string()),
        };
        assert_eq!(args.valid_value(args.clientid.as_deref(), "client id").len(), 20);
        assert_eq!(args.valid_value(args.secret.as_deref(), "client secret"), "s".repeat(32));
        assert_eq!(args.expires_in().unwrap(), Some(90 * DAY));

        let bad = AddAppCredential {
            expiry: Some("soon".to_string()),
            ..args
        };
        assert!(bad.validate().is_err());
    }

    #[test]
    fn test_revoke_validation() {
        let base = RevokeOrApprove {
            approve: false,
            revoke: true,
            developer: None,
            app: None,
            key: None,
            product: None,
        };
        assert!(base.validate().is_err());
        let with_key = RevokeOrApprove {
            key: Some("k".to_string()),
            product: Some("p".to_string()),
            ..base
        };
        assert!(with_key.validate().is_ok());
        assert_eq!(with_key.action(), StatusAction::Revoke);
    }
}
