use crate::api::{AdminApi, AdminResult};
use serde::{Deserialize, Serialize};
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeveloperSummary {
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub user_name: String,
}

/// Where an API key lives: its app and the app's developer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CredentialLookup {
    pub key: String,
    pub app_name: String,
    pub app_id: String,
    pub developer_id: String,
    pub developer: DeveloperSummary,
}

/// Resolves an API key by walking every app in the organization.
pub async fn find_credential(
    api: &dyn AdminApi,
    key: &str,
) -> AdminResult<Option<CredentialLookup>> {
    let apps = api.list_apps().await?;
    debug!("searching {} apps for key", apps.len());

    let Some(app) = apps.into_iter().find(|app| app.credential(key).is_some()) else {
        return Ok(None);
    };

    let developer = api.get_developer(&app.developer_id).await?;

    Ok(Some(CredentialLookup {
        key: key.to_string(),
        app_name: app.name,
        app_id: app.app_id,
        developer_id: app.developer_id,
        developer: DeveloperSummary {
            email: developer.email,
            first_name: developer.first_name,
            last_name: developer.last_name,
            user_name: developer.user_name,
        },
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_lookup_serializes_in_field_order() {
        let lookup = CredentialLookup {
            key: "ABC123".to_string(),
            app_name: "app1".to_string(),
            app_id: "a-1".to_string(),
            developer_id: "dev1".to_string(),
            developer: DeveloperSummary {
                email: "dev@example.com".to_string(),
                first_name: "Dana".to_string(),
                last_name: "Lee".to_string(),
                user_name: "dlee".to_string(),
            },
        };

        let text = serde_json::to_string(&lookup).unwrap();
        assert!(text.starts_with(r#"{"key":"ABC123","appName":"app1","appId":"a-1","developerId":"dev1""#));
        assert_eq!(
            serde_json::to_value(&lookup).unwrap()["developer"],
            json!({
                "email": "dev@example.com",
                "firstName": "Dana",
                "lastName": "Lee",
                "userName": "dlee"
            })
        );
    }
}
