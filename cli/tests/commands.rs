mod common;

use admin::api::{APPLICATION_NOT_DEPLOYED, DEVELOPER_DOES_NOT_EXIST};
use admin::AdminError;
use bundle::pack_entries;
use chrono::Utc;
use cli::commands::credentials::{
    AddAppCredential, CredentialAction, CredentialStatus, Credentials, FindApiKey,
};
use cli::commands::proxies::{
    CleanOldRevisions, Export, ImportAndDeploy, ListProxies, RemoveProxy,
};
use cli::commands::scans::FindFlowCallouts;
use cli::commands::Command;
use cli::{CliError, Commands, Output};
use common::{client_for, mount_json, ORG};
use serde_json::json;
use wiremock::matchers::{body_partial_json, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

async fn mount_apps(server: &MockServer, apps: serde_json::Value) {
    mount_json(server, "GET", "apps", 200, json!({ "app": apps })).await;
}

#[tokio::test]
async fn test_find_api_key_found() {
    let server = MockServer::start().await;
    mount_apps(
        &server,
        json!([
            {"appId": "a-0", "name": "other", "developerId": "dev0", "credentials": [
                {"consumerKey": "XYZ", "expiresAt": -1, "apiProducts": []}
            ]},
            {"appId": "a-1", "name": "app1", "developerId": "dev1", "credentials": [
                {"consumerKey": "ABC123", "expiresAt": -1, "apiProducts": [{"apiproduct": "gold", "status": "approved"}]}
            ]}
        ]),
    )
    .await;
    mount_json(
        &server,
        "GET",
        "developers/dev1",
        200,
        json!({
            "email": "dana@example.com",
            "developerId": "dev1",
            "firstName": "Dana",
            "lastName": "Lee",
            "userName": "dlee",
            "status": "active"
        }),
    )
    .await;

    let client = client_for(&server);
    let output = FindApiKey {
        key: "ABC123".to_string(),
    }
    .run(&client)
    .await
    .unwrap();

    assert_eq!(
        output.as_value().unwrap(),
        json!({
            "key": "ABC123",
            "appName": "app1",
            "appId": "a-1",
            "developerId": "dev1",
            "developer": {
                "email": "dana@example.com",
                "firstName": "Dana",
                "lastName": "Lee",
                "userName": "dlee"
            }
        })
    );
}

#[tokio::test]
async fn test_find_api_key_not_found() {
    let server = MockServer::start().await;
    mount_apps(&server, json!([])).await;

    let client = client_for(&server);
    let output = FindApiKey {
        key: "nope".to_string(),
    }
    .run(&client)
    .await
    .unwrap();
    assert_eq!(output, Output::text("that key was not found."));
}

#[tokio::test]
async fn test_clean_old_revisions_skips_deployed() {
    let server = MockServer::start().await;
    mount_json(&server, "GET", "apis", 200, json!(["p1"])).await;
    mount_json(
        &server,
        "GET",
        "apis/p1/revisions",
        200,
        json!(["1", "2", "3", "4", "5"]),
    )
    .await;
    mount_json(
        &server,
        "GET",
        "apis/p1/revisions/2/deployments",
        200,
        json!({"name": "2", "environment": [{"name": "test"}]}),
    )
    .await;
    for revision in [1, 3] {
        mount_json(
            &server,
            "GET",
            &format!("apis/p1/revisions/{}/deployments", revision),
            400,
            json!({"code": APPLICATION_NOT_DEPLOYED, "message": "not deployed"}),
        )
        .await;
        Mock::given(method("DELETE"))
            .and(path(format!("{}/apis/p1/revisions/{}", ORG, revision)))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
            .expect(1)
            .mount(&server)
            .await;
    }
    Mock::given(method("DELETE"))
        .and(path(format!("{}/apis/p1/revisions/2", ORG)))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let client = client_for(&server);
    let output = CleanOldRevisions {
        num_to_keep: 2,
        regexp: None,
        sharedflows: false,
        dry_run: false,
    }
    .run(&client)
    .await
    .unwrap();

    assert_eq!(
        output.as_value().unwrap(),
        json!([{"item": "p1", "revisions": [1, 3]}])
    );
}

#[tokio::test]
async fn test_find_flow_callouts_by_sharedflow() {
    let zip = pack_entries(&[
        ("apiproxy/p1.xml", r#"<APIProxy name="p1"/>"#),
        (
            "apiproxy/policies/FC-1.xml",
            r#"<FlowCallout name="FC-1"><SharedFlowBundle>sf1</SharedFlowBundle></FlowCallout>"#,
        ),
        (
            "apiproxy/policies/AM-1.xml",
            r#"<AssignMessage name="AM-1"><AssignTo createNew="false"/></AssignMessage>"#,
        ),
    ])
    .unwrap();

    let server = MockServer::start().await;
    mount_json(&server, "GET", "apis", 200, json!(["p1"])).await;
    mount_json(&server, "GET", "apis/p1/revisions", 200, json!(["1"])).await;
    Mock::given(method("GET"))
        .and(path(format!("{}/apis/p1/revisions/1", ORG)))
        .and(query_param("format", "bundle"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(zip))
        .mount(&server)
        .await;

    let client = client_for(&server);
    let search = |sharedflow: &str| FindFlowCallouts {
        sharedflow: Some(sharedflow.to_string()),
        list: false,
        latestrevision: false,
        proxyregexp: None,
    };

    let found = search("sf1").run(&client).await.unwrap();
    assert_eq!(
        found.as_value().unwrap(),
        json!([{
            "proxy": "p1",
            "policies": ["/v1/organizations/org1/apis/p1/revisions/1/policies/FC-1"]
        }])
    );

    let none = search("sf2").run(&client).await.unwrap();
    assert_eq!(none.as_value().unwrap(), json!([]));
}

#[tokio::test]
async fn test_credential_status_partitions_apps() {
    let now = Utc::now().timestamp_millis();
    let day = 86_400_000_i64;
    let app = |name: &str, expires_at: i64| {
        json!({
            "appId": format!("id-{}", name),
            "name": name,
            "developerId": "dev1",
            "credentials": [{"consumerKey": format!("key-{}", name), "expiresAt": expires_at, "apiProducts": []}]
        })
    };

    let server = MockServer::start().await;
    mount_apps(
        &server,
        json!([
            app("forever", -1),
            app("stale", now - day),
            app("soon", now + day),
            app("later", now + 400 * day)
        ]),
    )
    .await;

    let client = client_for(&server);
    let report = CredentialStatus { timespan: None }
        .run(&client)
        .await
        .unwrap()
        .as_value()
        .unwrap();

    let names = |bucket: &str| -> Vec<String> {
        report[bucket]
            .as_array()
            .unwrap()
            .iter()
            .map(|row| row["name"].as_str().unwrap().to_string())
            .collect()
    };
    assert_eq!(names("noExpiry"), vec!["forever"]);
    assert_eq!(names("expired"), vec!["stale"]);
    assert_eq!(names("expiringSoon"), vec!["soon"]);
}

#[tokio::test]
async fn test_listing_is_repeatable() {
    let server = MockServer::start().await;
    mount_json(
        &server,
        "GET",
        "sharedflows",
        200,
        json!({"sharedFlows": [{"name": "sf-auth"}, {"name": "sf-log"}]}),
    )
    .await;

    let client = client_for(&server);
    let list = ListProxies {
        elaborate: false,
        sharedflows: true,
    };
    let first = list.run(&client).await.unwrap();
    let second = list.run(&client).await.unwrap();
    assert_eq!(first, second);
    assert_eq!(first.as_value().unwrap(), json!(["sf-auth", "sf-log"]));
}

#[tokio::test]
async fn test_validation_fails_before_any_request() {
    let server = MockServer::start().await;
    let client = client_for(&server);

    let command = Commands::CleanOldRevisions(CleanOldRevisions {
        num_to_keep: 0,
        regexp: None,
        sharedflows: false,
        dry_run: false,
    });
    let err = command.run(&client).await.unwrap_err();
    assert!(matches!(err, CliError::Usage(_)));
    assert!(server.received_requests().await.unwrap().is_empty());
}

async fn mount_expiring_apps(server: &MockServer) {
    let now = Utc::now().timestamp_millis();
    mount_apps(
        server,
        json!([
            {"appId": "id-forever", "name": "forever", "developerId": "dev1", "credentials": [
                {"consumerKey": "key-forever", "expiresAt": -1, "apiProducts": []}
            ]},
            {"appId": "id-stale", "name": "stale", "developerId": "dev1", "credentials": [
                {"consumerKey": "key-stale", "expiresAt": now - 86_400_000, "apiProducts": []}
            ]}
        ]),
    )
    .await;
}

fn delete_expired(doit: bool) -> Credentials {
    Credentials {
        action: CredentialAction::DeleteExpired,
        timespan: None,
        doit,
    }
}

#[tokio::test]
async fn test_delete_expired_without_doit_only_reports() {
    let server = MockServer::start().await;
    mount_expiring_apps(&server).await;
    Mock::given(method("DELETE"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let client = client_for(&server);
    let report = delete_expired(false)
        .run(&client)
        .await
        .unwrap()
        .as_value()
        .unwrap();

    let rows = report.as_array().unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0]["name"], "stale");
    assert_eq!(rows[0]["creds"][0]["consumerKey"], "key-stale");
}

#[tokio::test]
async fn test_delete_expired_with_doit_deletes_only_expired() {
    let server = MockServer::start().await;
    mount_expiring_apps(&server).await;
    Mock::given(method("DELETE"))
        .and(path(format!("{}/developers/dev1/apps/stale/keys/key-stale", ORG)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "consumerKey": "key-stale",
            "expiresAt": 1,
            "apiProducts": []
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("DELETE"))
        .and(path(format!("{}/developers/dev1/apps/forever/keys/key-forever", ORG)))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let client = client_for(&server);
    let deleted = delete_expired(true)
        .run(&client)
        .await
        .unwrap()
        .as_value()
        .unwrap();

    assert_eq!(
        deleted,
        json!([{"consumerKey": "key-stale", "expiresAt": 1, "apiProducts": []}])
    );
}

fn add_credential(email: &str, appname: &str) -> AddAppCredential {
    AddAppCredential {
        products: "gold".to_string(),
        email: email.to_string(),
        appname: appname.to_string(),
        clientid: None,
        secret: None,
        credlength: cli::keygen::DEFAULT_LENGTH,
        expiry: None,
    }
}

#[tokio::test]
async fn test_add_app_credential_unknown_developer() {
    let server = MockServer::start().await;
    mount_json(
        &server,
        "GET",
        "developers/nobody@example.com",
        404,
        json!({"code": DEVELOPER_DOES_NOT_EXIST, "message": "DeveloperId nobody@example.com does not exist"}),
    )
    .await;

    let client = client_for(&server);
    let output = add_credential("nobody@example.com", "app1")
        .run(&client)
        .await
        .unwrap();

    assert_eq!(output, Output::text("That developer does not exist."));
    assert_eq!(server.received_requests().await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_add_app_credential_creates_missing_app() {
    let server = MockServer::start().await;
    mount_json(
        &server,
        "GET",
        "developers/dana@example.com",
        200,
        json!({"email": "dana@example.com", "developerId": "dev1"}),
    )
    .await;
    mount_json(
        &server,
        "GET",
        "developers/dana@example.com/apps/newapp",
        404,
        json!({"code": "developer.service.AppDoesNotExist", "message": "App named newapp does not exist"}),
    )
    .await;
    Mock::given(method("POST"))
        .and(path(format!("{}/developers/dana@example.com/apps", ORG)))
        .and(body_partial_json(json!({"name": "newapp", "apiProducts": ["gold"]})))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({
            "appId": "a-9",
            "name": "newapp",
            "developerId": "dev1",
            "credentials": [{
                "consumerKey": "GENERATED",
                "consumerSecret": "SECRET",
                "expiresAt": -1,
                "apiProducts": [{"apiproduct": "gold", "status": "approved"}]
            }]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let client = client_for(&server);
    let created = add_credential("dana@example.com", "newapp")
        .run(&client)
        .await
        .unwrap()
        .as_value()
        .unwrap();

    assert_eq!(created["consumerKey"], "GENERATED");
    assert_eq!(created["consumerSecret"], "SECRET");
    assert_eq!(created["apiProducts"][0]["apiproduct"], "gold");
}

#[tokio::test]
async fn test_remove_proxy_rewrites_products_then_deletes() {
    let server = MockServer::start().await;
    mount_json(&server, "GET", "apis/p1/revisions", 200, json!(["1", "2"])).await;
    Mock::given(method("GET"))
        .and(path(format!("{}/apiproducts", ORG)))
        .and(query_param("expand", "true"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"apiProduct": [
            {"name": "shared", "proxies": ["p1", "p2"]},
            {"name": "solo", "proxies": ["p1"]},
            {"name": "other", "proxies": ["p3"]}
        ]})))
        .mount(&server)
        .await;
    Mock::given(method("PUT"))
        .and(path(format!("{}/apiproducts/shared", ORG)))
        .and(body_partial_json(json!({"proxies": ["p2"]})))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({"name": "shared", "proxies": ["p2"]})),
        )
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("DELETE"))
        .and(path(format!("{}/apiproducts/solo", ORG)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .expect(1)
        .mount(&server)
        .await;
    mount_json(
        &server,
        "GET",
        "apis/p1/deployments",
        200,
        json!({"name": "p1", "environment": [
            {"name": "test", "revision": [{"name": "2", "state": "deployed"}]}
        ]}),
    )
    .await;
    Mock::given(method("DELETE"))
        .and(path(format!(
            "{}/environments/test/apis/p1/revisions/2/deployments",
            ORG
        )))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("DELETE"))
        .and(path(format!("{}/apis/p1", ORG)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .expect(1)
        .mount(&server)
        .await;

    let client = client_for(&server);
    let report = RemoveProxy {
        proxy: "p1".to_string(),
        doit: true,
    }
    .run(&client)
    .await
    .unwrap();

    assert_eq!(
        report.as_value().unwrap(),
        json!({
            "products": [
                {"name": "shared", "proxies": ["p2"], "status": "updated"},
                {"name": "solo", "status": "deleted"}
            ],
            "undeployments": [{"environment": "test", "revs": [2]}],
            "deleted": true
        })
    );

    let requests = server.received_requests().await.unwrap();
    let last = requests.last().unwrap();
    assert_eq!(last.method.as_str(), "DELETE");
    assert_eq!(last.url.path(), format!("{}/apis/p1", ORG));
}

#[tokio::test]
async fn test_import_and_deploy_imports_then_deploys() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::create_dir_all(dir.path().join("apiproxy/policies")).unwrap();
    std::fs::write(dir.path().join("apiproxy/p1.xml"), r#"<APIProxy name="p1"/>"#).unwrap();
    std::fs::write(
        dir.path().join("apiproxy/policies/AM-1.xml"),
        r#"<AssignMessage name="AM-1"/>"#,
    )
    .unwrap();

    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(format!("{}/apis", ORG)))
        .and(query_param("action", "import"))
        .and(query_param("name", "p1"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({"name": "p1", "revision": "3"})))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path(format!(
            "{}/environments/test/apis/p1/revisions/3/deployments",
            ORG
        )))
        .and(query_param("override", "true"))
        .and(query_param("basepath", "/"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"state": "deployed"})))
        .expect(1)
        .mount(&server)
        .await;

    let client = client_for(&server);
    let command = Commands::ImportAndDeploy(ImportAndDeploy {
        source: dir.path().to_path_buf(),
        name: Some("p1".to_string()),
        environments: Some("test".to_string()),
        basepath: None,
        sharedflow: false,
    });
    let report = command.run(&client).await.unwrap();

    assert_eq!(
        report.as_value().unwrap(),
        json!({"name": "p1", "revision": 3, "deployed": ["test"]})
    );
    let requests = server.received_requests().await.unwrap();
    assert_eq!(requests.len(), 2);
    assert_eq!(requests[0].url.path(), format!("{}/apis", ORG));
    assert!(requests[1].url.path().ends_with("/revisions/3/deployments"));
}

#[tokio::test]
async fn test_export_without_revisions_is_an_unexpected_response() {
    let server = MockServer::start().await;
    mount_json(&server, "GET", "apis/p1/revisions", 200, json!([])).await;

    let client = client_for(&server);
    let err = Export {
        name: Some("p1".to_string()),
        pattern: None,
        revision: None,
        destination: "unused".into(),
        trial: true,
        sharedflow: false,
    }
    .run(&client)
    .await
    .unwrap_err();

    assert!(!err.is_usage());
    assert!(matches!(
        err,
        CliError::Admin(AdminError::UnexpectedResponse { .. })
    ));
}
