use admin::{AdminConfig, ApigeeClient, Auth};
use serde_json::Value;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

pub const ORG: &str = "/v1/organizations/org1";

pub fn client_for(server: &MockServer) -> ApigeeClient {
    let config = AdminConfig::new("org1")
        .with_base_url(server.uri())
        .with_auth(Auth::Bearer {
            token: "tok".to_string(),
        });
    ApigeeClient::new(config).expect("client creation")
}

/// Mounts a JSON response for `verb` on a path under the organization.
pub async fn mount_json(server: &MockServer, verb: &str, sub_path: &str, status: u16, body: Value) {
    Mock::given(method(verb))
        .and(path(format!("{}/{}", ORG, sub_path)))
        .respond_with(ResponseTemplate::new(status).set_body_json(body))
        .mount(server)
        .await;
}
