use crate::api::{AdminApi, AdminError, AdminResult, APPLICATION_NOT_DEPLOYED};
use crate::config::{AdminConfig, ApiVariant, Auth};
use crate::normalize;
use crate::types::{
    ApiProduct, App, BundleKind, Credential, Deployment, Developer, ExportedBundle,
    ImportedRevision, NewDeveloperApp, StatusAction,
};
use async_trait::async_trait;
use reqwest::{Method, RequestBuilder, Response};
use serde::Serialize;
use serde_json::{json, Value};
use std::collections::HashSet;
use tracing::{debug, info};

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct CredentialBody<'a> {
    consumer_key: &'a str,
    consumer_secret: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ProductsBody<'a> {
    api_products: &'a [String],
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateKeyBody<'a> {
    name: &'a str,
    api_products: &'a [String],
    #[serde(skip_serializing_if = "Option::is_none")]
    key_expires_in: Option<i64>,
}

#[derive(Serialize)]
struct KvmEntryBody<'a> {
    name: &'a str,
    value: &'a str,
}

/// `AdminApi` over HTTPS, for either management-plane variant.
pub struct ApigeeClient {
    http_client: reqwest::Client,
    org_url: String,
    config: AdminConfig,
}

impl ApigeeClient {
    pub fn new(config: AdminConfig) -> AdminResult<Self> {
        config
            .validate()
            .map_err(|msg| AdminError::InvalidConfig { message: msg })?;

        let http_client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| AdminError::InvalidConfig {
                message: format!("Failed to build HTTP client: {}", e),
            })?;

        let org_url = format!(
            "{}/v1/organizations/{}",
            config.base_url.trim_end_matches('/'),
            config.organization
        );

        info!(
            "Using {:?} management API at {} for org {}",
            config.variant, config.base_url, config.organization
        );

        Ok(Self {
            http_client,
            org_url,
            config,
        })
    }

    pub fn variant(&self) -> ApiVariant {
        self.config.variant
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.org_url, path)
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let url = self.url(path);
        debug!("{} {}", method, url);
        let builder = self.http_client.request(method, url);
        match &self.config.auth {
            Some(Auth::Bearer { token }) => builder.bearer_auth(token),
            Some(Auth::Basic { username, password }) => builder.basic_auth(username, Some(password)),
            None => builder,
        }
    }

    fn handle_http_error(err: reqwest::Error) -> AdminError {
        if err.is_timeout() {
            AdminError::ServiceUnavailable {
                message: "Request timeout".to_string(),
            }
        } else if err.is_connect() {
            AdminError::ServiceUnavailable {
                message: "Cannot connect to the management server".to_string(),
            }
        } else {
            AdminError::Network(err)
        }
    }

    /// Maps a non-success response onto `AdminError`, reading the structured
    /// code from either error body shape.
    async fn check(response: Response) -> AdminResult<Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let code = status.as_u16();
        if code == 401 || code == 403 {
            return Err(AdminError::Authentication { status: code });
        }

        let text = response.text().await.unwrap_or_default();
        let (error_code, message) = serde_json::from_str::<Value>(&text)
            .map(|body| normalize::error_body(&body))
            .unwrap_or((None, None));
        debug!("{} {:?}: {}", code, error_code, text);

        Err(AdminError::Api {
            status: code,
            code: error_code,
            message: message
                .or_else(|| (!text.is_empty()).then(|| text.clone()))
                .unwrap_or_else(|| status.canonical_reason().unwrap_or("error").to_string()),
        })
    }

    async fn send(&self, builder: RequestBuilder) -> AdminResult<Response> {
        let response = builder.send().await.map_err(Self::handle_http_error)?;
        Self::check(response).await
    }

    async fn send_json(&self, builder: RequestBuilder) -> AdminResult<Value> {
        let response = self.send(builder).await?;
        let text = response.text().await.map_err(Self::handle_http_error)?;
        if text.trim().is_empty() {
            return Ok(Value::Null);
        }
        Ok(serde_json::from_str(&text)?)
    }

    async fn get_json(&self, path: &str, query: &[(&str, &str)]) -> AdminResult<Value> {
        self.send_json(self.request(Method::GET, path).query(query))
            .await
    }

    async fn post_json<B: Serialize + ?Sized>(&self, path: &str, body: &B) -> AdminResult<Value> {
        self.send_json(self.request(Method::POST, path).json(body))
            .await
    }

    async fn delete_json(&self, path: &str) -> AdminResult<Value> {
        self.send_json(self.request(Method::DELETE, path)).await
    }

    /// POST `?action=approve|revoke` with an empty octet-stream body.
    async fn post_action(&self, path: &str, action: StatusAction) -> AdminResult<()> {
        let builder = self
            .request(Method::POST, path)
            .query(&[("action", action.as_str())])
            .header(reqwest::header::CONTENT_TYPE, "application/octet-stream");
        self.send(builder).await?;
        Ok(())
    }

    /// Walks a `startKey`-paged listing. Every page after the first starts with
    /// the last element of the previous page, which is skipped.
    async fn paginate<T, P, K>(
        &self,
        path: &str,
        size_param: &str,
        extra: &[(&str, &str)],
        parse: P,
        key_of: K,
    ) -> AdminResult<Vec<T>>
    where
        P: Fn(&Value) -> AdminResult<Vec<T>>,
        K: Fn(&T) -> String,
    {
        let page_size = self.config.page_size.to_string();
        let mut all: Vec<T> = Vec::new();
        let mut start_key: Option<String> = None;

        loop {
            let value = {
                let mut query: Vec<(&str, &str)> = extra.to_vec();
                query.push((size_param, &page_size));
                if let Some(key) = &start_key {
                    query.push(("startKey", key));
                }
                self.get_json(path, &query).await?
            };

            let mut page = parse(&value)?;
            let page_len = page.len();
            if let Some(key) = &start_key {
                if page.first().is_some_and(|first| key_of(first) == *key) {
                    page.remove(0);
                }
            }

            let before = all.len();
            all.extend(page);
            debug!("{}: page of {} ({} total)", path, page_len, all.len());

            if page_len < self.config.page_size || all.len() == before {
                break;
            }
            start_key = all.last().map(&key_of);
        }

        Ok(all)
    }

    fn bundle_path(kind: BundleKind, name: &str) -> String {
        format!("{}/{}", kind.collection(), name)
    }

    fn revision_path(kind: BundleKind, name: &str, revision: u32) -> String {
        format!("{}/{}/revisions/{}", kind.collection(), name, revision)
    }

    fn deployment_path(kind: BundleKind, name: &str, revision: u32, environment: &str) -> String {
        format!(
            "environments/{}/{}/{}/revisions/{}/deployments",
            environment,
            kind.collection(),
            name,
            revision
        )
    }

    fn key_path(developer: &str, app: &str, consumer_key: &str) -> String {
        format!("developers/{}/apps/{}/keys/{}", developer, app, consumer_key)
    }

    fn credential_from(value: Value) -> AdminResult<Credential> {
        Ok(serde_json::from_value(value)?)
    }
}

fn not_deployed_is_empty<T>(result: AdminResult<Vec<T>>) -> AdminResult<Vec<T>> {
    match result {
        Err(e) if e.code() == Some(APPLICATION_NOT_DEPLOYED) => Ok(Vec::new()),
        other => other,
    }
}

#[async_trait]
impl AdminApi for ApigeeClient {
    fn organization(&self) -> &str {
        &self.config.organization
    }

    async fn list_bundles(&self, kind: BundleKind) -> AdminResult<Vec<String>> {
        let value = self.get_json(kind.collection(), &[]).await?;
        normalize::names(&value, kind.list_key(), "name")
    }

    async fn list_revisions(&self, kind: BundleKind, name: &str) -> AdminResult<Vec<u32>> {
        let path = format!("{}/revisions", Self::bundle_path(kind, name));
        normalize::revisions(&self.get_json(&path, &[]).await?)
    }

    async fn bundle_deployments(
        &self,
        kind: BundleKind,
        name: &str,
        environment: Option<&str>,
    ) -> AdminResult<Vec<Deployment>> {
        let path = match environment {
            Some(env) => format!(
                "environments/{}/{}/deployments",
                env,
                Self::bundle_path(kind, name)
            ),
            None => format!("{}/deployments", Self::bundle_path(kind, name)),
        };
        let result = match self.get_json(&path, &[]).await {
            Ok(value) => normalize::bundle_deployments(&value, name),
            Err(e) => Err(e),
        };
        not_deployed_is_empty(result)
    }

    async fn revision_deployments(
        &self,
        kind: BundleKind,
        name: &str,
        revision: u32,
    ) -> AdminResult<Vec<String>> {
        let path = format!("{}/deployments", Self::revision_path(kind, name, revision));
        let result = match self.get_json(&path, &[]).await {
            Ok(value) => normalize::revision_environments(&value),
            Err(e) => Err(e),
        };
        not_deployed_is_empty(result)
    }

    async fn delete_revision(
        &self,
        kind: BundleKind,
        name: &str,
        revision: u32,
    ) -> AdminResult<()> {
        self.delete_json(&Self::revision_path(kind, name, revision))
            .await?;
        info!("deleted {} {} r{}", kind, name, revision);
        Ok(())
    }

    async fn export_revision(
        &self,
        kind: BundleKind,
        name: &str,
        revision: u32,
    ) -> AdminResult<ExportedBundle> {
        let builder = self
            .request(Method::GET, &Self::revision_path(kind, name, revision))
            .query(&[("format", "bundle")]);
        let response = self.send(builder).await?;
        let bytes = response.bytes().await.map_err(Self::handle_http_error)?;
        Ok(ExportedBundle {
            filename: format!("{}-r{}.zip", name, revision),
            bytes: bytes.to_vec(),
        })
    }

    async fn import_bundle(
        &self,
        kind: BundleKind,
        name: &str,
        zip: Vec<u8>,
    ) -> AdminResult<ImportedRevision> {
        let part = reqwest::multipart::Part::bytes(zip)
            .file_name(format!("{}.zip", name))
            .mime_str("application/octet-stream")?;
        let form = reqwest::multipart::Form::new().part("file", part);
        let builder = self
            .request(Method::POST, kind.collection())
            .query(&[("action", "import"), ("name", name)])
            .multipart(form);
        let imported = normalize::imported_revision(&self.send_json(builder).await?)?;
        info!("imported {} {} as r{}", kind, imported.name, imported.revision);
        Ok(imported)
    }

    async fn deploy(
        &self,
        kind: BundleKind,
        name: &str,
        revision: u32,
        environment: &str,
        basepath: Option<&str>,
    ) -> AdminResult<Value> {
        let mut query = vec![("override", "true")];
        if let Some(basepath) = basepath {
            query.push(("basepath", basepath));
        }
        let builder = self
            .request(
                Method::POST,
                &Self::deployment_path(kind, name, revision, environment),
            )
            .query(&query)
            .header(
                reqwest::header::CONTENT_TYPE,
                "application/x-www-form-urlencoded",
            );
        self.send_json(builder).await
    }

    async fn undeploy(
        &self,
        kind: BundleKind,
        name: &str,
        revision: u32,
        environment: &str,
    ) -> AdminResult<()> {
        self.delete_json(&Self::deployment_path(kind, name, revision, environment))
            .await?;
        Ok(())
    }

    async fn delete_bundle(&self, kind: BundleKind, name: &str) -> AdminResult<()> {
        self.delete_json(&Self::bundle_path(kind, name)).await?;
        Ok(())
    }

    async fn list_environments(&self) -> AdminResult<Vec<String>> {
        normalize::names(&self.get_json("environments", &[]).await?, "environments", "name")
    }

    async fn environment_deployments(&self, environment: &str) -> AdminResult<Vec<Deployment>> {
        let path = format!("environments/{}/deployments", environment);
        normalize::environment_deployments(&self.get_json(&path, &[]).await?, environment)
    }

    async fn list_developers(&self) -> AdminResult<Vec<String>> {
        self.paginate(
            "developers",
            "count",
            &[],
            |value| normalize::names(value, "developer", "email"),
            |email: &String| email.clone(),
        )
        .await
    }

    async fn get_developer(&self, id_or_email: &str) -> AdminResult<Developer> {
        let value = self
            .get_json(&format!("developers/{}", id_or_email), &[])
            .await?;
        Ok(serde_json::from_value(value)?)
    }

    async fn set_developer_status(&self, email: &str, action: StatusAction) -> AdminResult<()> {
        self.post_action(&format!("developers/{}", email), action)
            .await
    }

    async fn list_apps(&self) -> AdminResult<Vec<App>> {
        self.paginate(
            "apps",
            "rows",
            &[("expand", "true")],
            normalize::apps,
            |app: &App| app.app_id.clone(),
        )
        .await
    }

    async fn list_app_ids(&self) -> AdminResult<Vec<String>> {
        self.paginate(
            "apps",
            "rows",
            &[],
            |value| normalize::names(value, "app", "appId"),
            |id: &String| id.clone(),
        )
        .await
    }

    async fn get_app(&self, app_id: &str) -> AdminResult<App> {
        let value = self.get_json(&format!("apps/{}", app_id), &[]).await?;
        Ok(serde_json::from_value(value)?)
    }

    async fn list_developer_apps(&self, email: &str) -> AdminResult<Vec<String>> {
        let value = self
            .get_json(&format!("developers/{}/apps", email), &[("expand", "true")])
            .await?;
        match &value {
            Value::Object(obj) if obj.contains_key("app") => {
                Ok(normalize::apps(&value)?.into_iter().map(|app| app.name).collect())
            }
            _ => normalize::names(&value, "app", "name"),
        }
    }

    async fn get_developer_app(&self, email: &str, app: &str) -> AdminResult<App> {
        let value = self
            .get_json(&format!("developers/{}/apps/{}", email, app), &[])
            .await?;
        Ok(serde_json::from_value(value)?)
    }

    async fn create_developer_app(&self, app: &NewDeveloperApp) -> AdminResult<App> {
        let value = self
            .post_json(&format!("developers/{}/apps", app.developer_email), app)
            .await?;
        info!("created app {} for {}", app.name, app.developer_email);
        Ok(serde_json::from_value(value)?)
    }

    async fn set_developer_app_status(
        &self,
        email: &str,
        app: &str,
        action: StatusAction,
    ) -> AdminResult<()> {
        self.post_action(&format!("developers/{}/apps/{}", email, app), action)
            .await
    }

    async fn add_generated_credential(
        &self,
        email: &str,
        app: &str,
        products: &[String],
        expires_in_ms: Option<i64>,
    ) -> AdminResult<Credential> {
        let existing: HashSet<String> = self
            .get_developer_app(email, app)
            .await?
            .credentials
            .into_iter()
            .map(|cred| cred.consumer_key)
            .collect();

        let body = GenerateKeyBody {
            name: app,
            api_products: products,
            key_expires_in: expires_in_ms,
        };
        let value = self
            .post_json(&format!("developers/{}/apps/{}", email, app), &body)
            .await?;
        let updated: App = serde_json::from_value(value)?;

        updated
            .credentials
            .into_iter()
            .find(|cred| !existing.contains(&cred.consumer_key))
            .ok_or_else(|| AdminError::unexpected("no new credential on the updated app"))
    }

    async fn add_credential(
        &self,
        email: &str,
        app: &str,
        consumer_key: &str,
        consumer_secret: &str,
        products: &[String],
    ) -> AdminResult<Credential> {
        let create_path = match self.variant() {
            ApiVariant::Edge => format!("developers/{}/apps/{}/keys/create", email, app),
            ApiVariant::X => format!("developers/{}/apps/{}/keys", email, app),
        };
        self.post_json(
            &create_path,
            &CredentialBody {
                consumer_key,
                consumer_secret,
            },
        )
        .await?;

        let value = self
            .post_json(
                &Self::key_path(email, app, consumer_key),
                &ProductsBody {
                    api_products: products,
                },
            )
            .await?;
        Self::credential_from(value)
    }

    async fn delete_credential(
        &self,
        developer: &str,
        app: &str,
        consumer_key: &str,
    ) -> AdminResult<Credential> {
        let value = self
            .delete_json(&Self::key_path(developer, app, consumer_key))
            .await?;
        info!("deleted credential {} from {}", consumer_key, app);
        Self::credential_from(value)
    }

    async fn add_product_to_credential(
        &self,
        email: &str,
        app: &str,
        consumer_key: &str,
        product: &str,
    ) -> AdminResult<Credential> {
        let products = [product.to_string()];
        let value = self
            .post_json(
                &Self::key_path(email, app, consumer_key),
                &ProductsBody {
                    api_products: &products,
                },
            )
            .await?;
        Self::credential_from(value)
    }

    async fn set_credential_status(
        &self,
        developer: &str,
        app: &str,
        consumer_key: &str,
        action: StatusAction,
    ) -> AdminResult<()> {
        self.post_action(&Self::key_path(developer, app, consumer_key), action)
            .await
    }

    async fn set_credential_product_status(
        &self,
        developer: &str,
        app: &str,
        consumer_key: &str,
        product: &str,
        action: StatusAction,
    ) -> AdminResult<()> {
        let path = format!(
            "{}/apiproducts/{}",
            Self::key_path(developer, app, consumer_key),
            product
        );
        self.post_action(&path, action).await
    }

    async fn list_products(&self) -> AdminResult<Vec<String>> {
        normalize::names(&self.get_json("apiproducts", &[]).await?, "apiProduct", "name")
    }

    async fn list_products_expanded(&self) -> AdminResult<Vec<ApiProduct>> {
        let value = self.get_json("apiproducts", &[("expand", "true")]).await?;
        match value.get("apiProduct") {
            Some(items) => Ok(serde_json::from_value(items.clone())?),
            None => Ok(Vec::new()),
        }
    }

    async fn get_product(&self, name: &str) -> AdminResult<ApiProduct> {
        let value = self.get_json(&format!("apiproducts/{}", name), &[]).await?;
        Ok(serde_json::from_value(value)?)
    }

    async fn update_product(&self, product: &ApiProduct) -> AdminResult<ApiProduct> {
        let builder = self
            .request(Method::PUT, &format!("apiproducts/{}", product.name))
            .json(product);
        Ok(serde_json::from_value(self.send_json(builder).await?)?)
    }

    async fn delete_product(&self, name: &str) -> AdminResult<()> {
        self.delete_json(&format!("apiproducts/{}", name)).await?;
        Ok(())
    }

    async fn list_kvms(&self, environment: Option<&str>) -> AdminResult<Vec<String>> {
        let path = match environment {
            Some(env) => format!("environments/{}/keyvaluemaps", env),
            None => "keyvaluemaps".to_string(),
        };
        normalize::names(&self.get_json(&path, &[]).await?, "keyValueMaps", "name")
    }

    async fn create_kvm(&self, environment: &str, name: &str, encrypted: bool) -> AdminResult<()> {
        self.post_json(
            &format!("environments/{}/keyvaluemaps", environment),
            &json!({ "name": name, "encrypted": encrypted }),
        )
        .await?;
        info!("created KVM {} in {}", name, environment);
        Ok(())
    }

    async fn put_kvm_entry(
        &self,
        environment: &str,
        map: &str,
        key: &str,
        value: &str,
    ) -> AdminResult<()> {
        let entries = format!("environments/{}/keyvaluemaps/{}/entries", environment, map);
        let body = KvmEntryBody { name: key, value };

        match self.post_json(&entries, &body).await {
            Ok(_) => Ok(()),
            Err(e) if e.status() == Some(409) => {
                debug!("entry {} exists in {}, updating", key, map);
                let entry = format!("{}/{}", entries, key);
                let builder = match self.variant() {
                    ApiVariant::Edge => self.request(Method::POST, &entry),
                    ApiVariant::X => self.request(Method::PUT, &entry),
                };
                self.send_json(builder.json(&body)).await?;
                Ok(())
            }
            Err(e) => Err(e),
        }
    }
}
