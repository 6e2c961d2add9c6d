//! Conversions from the two management-plane response shapes into typed values.
//!
//! Edge answers most listings with bare arrays of names and nests deployments
//! per environment; X wraps listings in an object keyed by the collection and
//! flattens deployments into a `deployments` array. An empty X object means an
//! empty collection.

use crate::api::{AdminError, AdminResult};
use crate::types::{App, Deployment, ImportedRevision};
use serde_json::Value;

/// Names from a listing: `["a"]`, `[{"name":"a"}]`, or `{"<key>":[...]}`.
/// `field` is the identifying field inside object entries.
pub fn names(value: &Value, key: &str, field: &str) -> AdminResult<Vec<String>> {
    match value {
        Value::Array(items) => items
            .iter()
            .map(|item| match item {
                Value::String(s) => Ok(s.clone()),
                Value::Object(obj) => obj
                    .get(field)
                    .and_then(Value::as_str)
                    .map(str::to_string)
                    .ok_or_else(|| AdminError::unexpected(format!("entry without {}", field))),
                other => Err(AdminError::unexpected(format!(
                    "unexpected listing entry: {}",
                    other
                ))),
            })
            .collect(),
        Value::Object(obj) => match obj.get(key) {
            Some(inner) => names(inner, key, field),
            None if obj.is_empty() => Ok(Vec::new()),
            None => Err(AdminError::unexpected(format!("listing without {}", key))),
        },
        Value::Null => Ok(Vec::new()),
        other => Err(AdminError::unexpected(format!("unexpected listing: {}", other))),
    }
}

pub fn revision_number(value: &Value) -> AdminResult<u32> {
    let parsed = match value {
        Value::String(s) => s.trim().parse::<u32>().ok(),
        Value::Number(n) => n.as_u64().and_then(|n| u32::try_from(n).ok()),
        Value::Object(obj) => {
            return obj
                .get("name")
                .or_else(|| obj.get("revision"))
                .ok_or_else(|| AdminError::unexpected("revision entry without name"))
                .and_then(revision_number)
        }
        _ => None,
    };
    parsed.ok_or_else(|| AdminError::unexpected(format!("invalid revision: {}", value)))
}

/// Revision numbers, ascending, from `["1","2"]` or `{"revision":["1","2"]}`.
pub fn revisions(value: &Value) -> AdminResult<Vec<u32>> {
    let items = match value {
        Value::Array(items) => items.as_slice(),
        Value::Object(obj) => match obj.get("revision") {
            Some(Value::Array(items)) => items.as_slice(),
            _ if obj.is_empty() => &[],
            _ => return Err(AdminError::unexpected("revision listing without revision")),
        },
        _ => return Err(AdminError::unexpected("unexpected revision listing")),
    };
    let mut revisions = items
        .iter()
        .map(revision_number)
        .collect::<AdminResult<Vec<_>>>()?;
    revisions.sort_unstable();
    Ok(revisions)
}

fn str_field<'a>(value: &'a Value, field: &str) -> Option<&'a str> {
    value.get(field).and_then(Value::as_str)
}

fn nested_revisions(
    name: &str,
    environment: &str,
    revisions: Option<&Value>,
) -> AdminResult<Vec<Deployment>> {
    let Some(Value::Array(revisions)) = revisions else {
        return Ok(Vec::new());
    };
    revisions
        .iter()
        .map(|rev| {
            Ok(Deployment {
                name: name.to_string(),
                environment: environment.to_string(),
                revision: revision_number(rev)?,
                state: str_field(rev, "state").map(str::to_string),
            })
        })
        .collect()
}

fn flat_deployments(items: &[Value], fallback_name: Option<&str>) -> AdminResult<Vec<Deployment>> {
    items
        .iter()
        .map(|item| {
            let name = str_field(item, "apiProxy")
                .or_else(|| str_field(item, "sharedFlow"))
                .or(fallback_name)
                .ok_or_else(|| AdminError::unexpected("deployment without proxy name"))?;
            let environment = str_field(item, "environment")
                .ok_or_else(|| AdminError::unexpected("deployment without environment"))?;
            let revision = item
                .get("revision")
                .ok_or_else(|| AdminError::unexpected("deployment without revision"))
                .and_then(revision_number)?;
            Ok(Deployment {
                name: name.to_string(),
                environment: environment.to_string(),
                revision,
                state: str_field(item, "state").map(str::to_string),
            })
        })
        .collect()
}

/// Deployments of one bundle. Accepts the Edge bundle-wide shape
/// (`environment` is an array), the Edge environment-scoped shape
/// (`environment` is a string), and the X `deployments` array.
pub fn bundle_deployments(value: &Value, name: &str) -> AdminResult<Vec<Deployment>> {
    if let Some(Value::Array(items)) = value.get("deployments") {
        return flat_deployments(items, Some(name));
    }
    match value.get("environment") {
        Some(Value::Array(envs)) => {
            let mut deployments = Vec::new();
            for env in envs {
                let env_name = str_field(env, "name")
                    .ok_or_else(|| AdminError::unexpected("environment without name"))?;
                deployments.extend(nested_revisions(name, env_name, env.get("revision"))?);
            }
            Ok(deployments)
        }
        Some(Value::String(env_name)) => nested_revisions(name, env_name, value.get("revision")),
        _ if value.as_object().is_some_and(|obj| {
            obj.is_empty() || obj.contains_key("name") || obj.contains_key("deployments")
        }) =>
        {
            Ok(Vec::new())
        }
        _ => Err(AdminError::unexpected("unrecognized deployment listing")),
    }
}

/// Environments in which a single revision is deployed.
pub fn revision_environments(value: &Value) -> AdminResult<Vec<String>> {
    if let Some(Value::Array(items)) = value.get("deployments") {
        return Ok(items
            .iter()
            .filter_map(|item| str_field(item, "environment"))
            .map(str::to_string)
            .collect());
    }
    match value.get("environment") {
        Some(Value::Array(envs)) => Ok(envs
            .iter()
            .filter_map(|env| str_field(env, "name"))
            .map(str::to_string)
            .collect()),
        _ => Ok(Vec::new()),
    }
}

/// Everything deployed in one environment.
pub fn environment_deployments(value: &Value, environment: &str) -> AdminResult<Vec<Deployment>> {
    if let Some(Value::Array(items)) = value.get("deployments") {
        return flat_deployments(items, None);
    }
    let Some(Value::Array(proxies)) = value.get("aPIProxy") else {
        return Ok(Vec::new());
    };
    let mut deployments = Vec::new();
    for proxy in proxies {
        let name =
            str_field(proxy, "name").ok_or_else(|| AdminError::unexpected("proxy without name"))?;
        deployments.extend(nested_revisions(name, environment, proxy.get("revision"))?);
    }
    Ok(deployments)
}

/// Expanded app listing: `{"app":[...]}` on both variants, `{}` when empty.
pub fn apps(value: &Value) -> AdminResult<Vec<App>> {
    match value.get("app") {
        Some(items) => Ok(serde_json::from_value(items.clone())?),
        None if value.as_object().is_some_and(|obj| obj.is_empty()) => Ok(Vec::new()),
        None => Err(AdminError::unexpected("app listing without app")),
    }
}

/// Code and message from an error body, either `{code,message}` or
/// `{error:{code,message,status}}`.
pub fn error_body(value: &Value) -> (Option<String>, Option<String>) {
    let inner = value.get("error").filter(|e| e.is_object()).unwrap_or(value);
    let code = str_field(inner, "code")
        .map(str::to_string)
        .or_else(|| {
            inner
                .get("details")
                .and_then(Value::as_array)
                .and_then(|details| details.iter().find_map(|d| str_field(d, "reason")))
                .map(str::to_string)
        })
        .or_else(|| str_field(inner, "status").map(str::to_string));
    let message = str_field(inner, "message").map(str::to_string);
    (code, message)
}

pub fn imported_revision(value: &Value) -> AdminResult<ImportedRevision> {
    let name = str_field(value, "name")
        .ok_or_else(|| AdminError::unexpected("import response without name"))?;
    let revision = value
        .get("revision")
        .ok_or_else(|| AdminError::unexpected("import response without revision"))
        .and_then(revision_number)?;
    Ok(ImportedRevision {
        name: name.to_string(),
        revision,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_names_both_shapes() {
        assert_eq!(
            names(&json!(["a", "b"]), "proxies", "name").unwrap(),
            vec!["a", "b"]
        );
        assert_eq!(
            names(&json!({"proxies": [{"name": "a"}, {"name": "b"}]}), "proxies", "name").unwrap(),
            vec!["a", "b"]
        );
        assert_eq!(
            names(&json!({"developer": [{"email": "x@y.com"}]}), "developer", "email").unwrap(),
            vec!["x@y.com"]
        );
        assert!(names(&json!({}), "sharedFlows", "name").unwrap().is_empty());
        assert!(names(&json!({"other": []}), "proxies", "name").is_err());
        assert!(names(&json!(42), "proxies", "name").is_err());
    }

    #[test]
    fn test_revisions_are_numeric_ascending() {
        assert_eq!(
            revisions(&json!(["10", "9", "1"])).unwrap(),
            vec![1, 9, 10]
        );
        assert_eq!(
            revisions(&json!({"name": "p", "revision": ["2", "1"]})).unwrap(),
            vec![1, 2]
        );
        assert!(revisions(&json!(["latest"])).is_err());
    }

    #[test]
    fn test_edge_bundle_deployments() {
        let value = json!({
            "name": "p1",
            "environment": [
                {"name": "test", "revision": [{"name": "3", "state": "deployed"}]},
                {"name": "prod", "revision": [{"name": "2", "state": "deployed"}]}
            ]
        });
        let deployments = bundle_deployments(&value, "p1").unwrap();
        assert_eq!(deployments.len(), 2);
        assert_eq!(deployments[0].environment, "test");
        assert_eq!(deployments[0].revision, 3);
        assert_eq!(deployments[1].environment, "prod");

        let scoped = json!({"environment": "test", "name": "p1", "revision": [{"name": "4"}]});
        let deployments = bundle_deployments(&scoped, "p1").unwrap();
        assert_eq!(deployments[0].revision, 4);
        assert_eq!(deployments[0].environment, "test");

        let none = json!({"name": "p1", "environment": []});
        assert!(bundle_deployments(&none, "p1").unwrap().is_empty());
    }

    #[test]
    fn test_x_bundle_deployments() {
        let value = json!({
            "deployments": [
                {"environment": "eval", "apiProxy": "p1", "revision": "7"}
            ]
        });
        let deployments = bundle_deployments(&value, "p1").unwrap();
        assert_eq!(
            deployments,
            vec![Deployment {
                name: "p1".to_string(),
                environment: "eval".to_string(),
                revision: 7,
                state: None,
            }]
        );
        assert!(bundle_deployments(&json!({}), "p1").unwrap().is_empty());
    }

    #[test]
    fn test_revision_environments() {
        let edge = json!({"environment": [{"name": "test"}, {"name": "prod"}]});
        assert_eq!(revision_environments(&edge).unwrap(), vec!["test", "prod"]);

        let x = json!({"deployments": [{"environment": "eval"}]});
        assert_eq!(revision_environments(&x).unwrap(), vec!["eval"]);

        assert!(revision_environments(&json!({})).unwrap().is_empty());
    }

    #[test]
    fn test_environment_deployments() {
        let edge = json!({
            "name": "test",
            "aPIProxy": [
                {"name": "p1", "revision": [{"name": "1", "state": "deployed"}]},
                {"name": "p2", "revision": [{"name": "5"}]}
            ]
        });
        let deployments = environment_deployments(&edge, "test").unwrap();
        assert_eq!(deployments.len(), 2);
        assert_eq!(deployments[1].name, "p2");
        assert_eq!(deployments[1].revision, 5);
        assert_eq!(deployments[0].state.as_deref(), Some("deployed"));

        let x = json!({"deployments": [{"environment": "eval", "apiProxy": "p3", "revision": "2"}]});
        let deployments = environment_deployments(&x, "eval").unwrap();
        assert_eq!(deployments[0].name, "p3");
    }

    #[test]
    fn test_error_body_shapes() {
        let edge = json!({"code": "distribution.ApplicationNotDeployed", "message": "not deployed"});
        assert_eq!(
            error_body(&edge),
            (
                Some("distribution.ApplicationNotDeployed".to_string()),
                Some("not deployed".to_string())
            )
        );

        let x = json!({"error": {"code": 404, "message": "not found", "status": "NOT_FOUND"}});
        assert_eq!(
            error_body(&x),
            (Some("NOT_FOUND".to_string()), Some("not found".to_string()))
        );

        assert_eq!(error_body(&json!("oops")), (None, None));
    }

    #[test]
    fn test_imported_revision() {
        let value = json!({"name": "p1", "revision": "3", "configurationVersion": {}});
        let imported = imported_revision(&value).unwrap();
        assert_eq!(imported.name, "p1");
        assert_eq!(imported.revision, 3);
    }

    #[test]
    fn test_apps_listing() {
        let value = json!({"app": [{"appId": "a1", "name": "app1", "credentials": []}]});
        let apps = apps(&value).unwrap();
        assert_eq!(apps[0].app_id, "a1");
        assert!(super::apps(&json!({})).unwrap().is_empty());
    }
}
