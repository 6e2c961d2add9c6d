use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Which management-plane flavor the organization lives on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ApiVariant {
    #[default]
    Edge,
    X,
}

impl ApiVariant {
    pub fn default_base_url(&self) -> &'static str {
        match self {
            ApiVariant::Edge => "https://api.enterprise.apigee.com",
            ApiVariant::X => "https://apigee.googleapis.com",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Auth {
    Bearer { token: String },
    Basic { username: String, password: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdminConfig {
    pub organization: String,
    pub variant: ApiVariant,
    pub base_url: String,
    pub auth: Option<Auth>,
    pub timeout: Duration,
    pub page_size: usize,
}

impl Default for AdminConfig {
    fn default() -> Self {
        Self {
            organization: String::new(),
            variant: ApiVariant::Edge,
            base_url: ApiVariant::Edge.default_base_url().to_string(),
            auth: None,
            timeout: Duration::from_secs(60),
            page_size: 1000,
        }
    }
}

impl AdminConfig {
    pub fn new(organization: impl Into<String>) -> Self {
        Self {
            organization: organization.into(),
            ..Self::default()
        }
    }

    /// Switches the variant, resetting the base URL to that variant's default.
    pub fn with_variant(mut self, variant: ApiVariant) -> Self {
        self.variant = variant;
        self.base_url = variant.default_base_url().to_string();
        self
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_auth(mut self, auth: Auth) -> Self {
        self.auth = Some(auth);
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size;
        self
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.organization.is_empty() {
            return Err("Organization cannot be empty".to_string());
        }

        if self.base_url.is_empty() {
            return Err("Base URL cannot be empty".to_string());
        }

        if !self.base_url.starts_with("http://") && !self.base_url.starts_with("https://") {
            return Err("Base URL must start with http:// or https://".to_string());
        }

        match &self.auth {
            Some(Auth::Bearer { token }) if token.is_empty() => {
                return Err("Token cannot be empty".to_string());
            }
            Some(Auth::Basic { username, .. }) if username.is_empty() => {
                return Err("Username cannot be empty".to_string());
            }
            _ => {}
        }

        if self.page_size < 2 {
            return Err("Page size must be at least 2".to_string());
        }

        if self.timeout.is_zero() {
            return Err("Timeout must be greater than 0".to_string());
        }

        Ok(())
    }
}

/// Connection defaults read from a TOML file. Every field is optional so a
/// profile can carry only the organization, or only the credentials.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectionProfile {
    pub org: Option<String>,
    pub apigeex: Option<bool>,
    pub mgmtserver: Option<String>,
    pub token: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
    pub timeout_secs: Option<u64>,
}

impl ConnectionProfile {
    pub fn from_toml_str(text: &str) -> Result<Self, String> {
        toml::from_str(text).map_err(|e| format!("Invalid profile: {}", e))
    }

    pub fn load(path: &Path) -> Result<Self, String> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| format!("Cannot read profile {}: {}", path.display(), e))?;
        Self::from_toml_str(&text)
    }
}
