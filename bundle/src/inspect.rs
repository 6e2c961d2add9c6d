//! Pure readers over parsed bundle files.

use crate::xml::Element;
use serde::Serialize;
use std::str::FromStr;

pub fn policy_type(root: &Element) -> &str {
    &root.name
}

/// The shared flow a FlowCallout policy invokes.
pub fn flow_callout_target(root: &Element) -> Option<&str> {
    if root.name != "FlowCallout" {
        return None;
    }
    root.find_text("SharedFlowBundle")
}

/// The resource a JavaCallout policy loads, such as `java://my-callout.jar`.
pub fn java_callout_resource(root: &Element) -> Option<&str> {
    if root.name != "JavaCallout" {
        return None;
    }
    root.find_text("ResourceURL")
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct KvmReference {
    pub map_identifier: Option<String>,
    pub scope: String,
}

/// Map and scope of a KeyValueMapOperations policy. Scope defaults to
/// `environment` when the policy omits it.
pub fn kvm_reference(root: &Element) -> Option<KvmReference> {
    if root.name != "KeyValueMapOperations" {
        return None;
    }
    Some(KvmReference {
        map_identifier: root.attr("mapIdentifier").map(str::to_string),
        scope: root.find_text("Scope").unwrap_or("environment").to_string(),
    })
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProxyEndpoint {
    pub name: String,
    pub base_path: Option<String>,
    pub virtual_hosts: Vec<String>,
}

pub fn proxy_endpoint(root: &Element) -> Option<ProxyEndpoint> {
    if root.name != "ProxyEndpoint" {
        return None;
    }
    let connection = root.child("HTTPProxyConnection");
    Some(ProxyEndpoint {
        name: root.attr("name").unwrap_or_default().to_string(),
        base_path: connection
            .and_then(|c| c.find_text("BasePath"))
            .map(str::to_string),
        virtual_hosts: connection
            .map(|c| {
                c.children_named("VirtualHost")
                    .map(|v| v.text().to_string())
                    .filter(|v| !v.is_empty())
                    .collect()
            })
            .unwrap_or_default(),
    })
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SslInfo {
    pub enabled: Option<String>,
    pub ignore_validation_errors: Option<String>,
    pub trust_store: Option<String>,
}

impl SslInfo {
    fn from_element(element: &Element) -> Self {
        let text = |name: &str| element.find_text(name).map(str::to_string);
        Self {
            enabled: text("Enabled"),
            ignore_validation_errors: text("IgnoreValidationErrors"),
            trust_store: text("TrustStore"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum TargetConnection {
    Http {
        url: Option<String>,
        servers: Vec<String>,
        ssl: Option<SslInfo>,
    },
    Local {
        api_proxy: Option<String>,
        path: Option<String>,
    },
    Node,
    Hosted,
    None,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TargetEndpoint {
    pub name: String,
    pub connection: TargetConnection,
}

/// The target types a search can ask for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetKind {
    Http,
    Node,
    Hosted,
}

impl TargetKind {
    pub fn element_name(&self) -> &'static str {
        match self {
            TargetKind::Http => "HTTPTargetConnection",
            TargetKind::Node => "ScriptTarget",
            TargetKind::Hosted => "HostedTarget",
        }
    }
}

impl FromStr for TargetKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "http" => Ok(TargetKind::Http),
            "node" => Ok(TargetKind::Node),
            "hosted" => Ok(TargetKind::Hosted),
            other => Err(format!(
                "unknown target type '{}', expected one of http, node, hosted",
                other
            )),
        }
    }
}

pub fn target_endpoint(root: &Element) -> Option<TargetEndpoint> {
    if root.name != "TargetEndpoint" {
        return None;
    }

    let connection = if let Some(http) = root.child("HTTPTargetConnection") {
        TargetConnection::Http {
            url: http.find_text("URL").map(str::to_string),
            servers: http
                .find_all("LoadBalancer/Server")
                .into_iter()
                .filter_map(|server| server.attr("name"))
                .map(str::to_string)
                .collect(),
            ssl: http.child("SSLInfo").map(SslInfo::from_element),
        }
    } else if let Some(local) = root.child("LocalTargetConnection") {
        TargetConnection::Local {
            api_proxy: local.find_text("APIProxy").map(str::to_string),
            path: local.find_text("Path").map(str::to_string),
        }
    } else if root.child("ScriptTarget").is_some() {
        TargetConnection::Node
    } else if root.child("HostedTarget").is_some() {
        TargetConnection::Hosted
    } else {
        TargetConnection::None
    };

    Some(TargetEndpoint {
        name: root.attr("name").unwrap_or_default().to_string(),
        connection,
    })
}

impl TargetEndpoint {
    pub fn is_kind(&self, kind: TargetKind) -> bool {
        matches!(
            (kind, &self.connection),
            (TargetKind::Http, TargetConnection::Http { .. })
                | (TargetKind::Node, TargetConnection::Node)
                | (TargetKind::Hosted, TargetConnection::Hosted)
        )
    }

    /// Why an HTTP target's TLS settings look unsafe, if they do. Non-HTTP
    /// targets are never flagged.
    pub fn ssl_flag(&self) -> Option<&'static str> {
        let TargetConnection::Http { ssl, .. } = &self.connection else {
            return None;
        };
        let Some(ssl) = ssl else {
            return Some("No SSLInfo");
        };
        if matches!(ssl.enabled.as_deref(), None | Some("false")) {
            return Some("SSLInfo.enabled = false");
        }
        if ssl.ignore_validation_errors.as_deref() == Some("true") {
            return Some("SSLInfo.ignoreValidationErrors = true");
        }
        if ssl.trust_store.is_none() {
            return Some("No Truststore");
        }
        None
    }
}
