// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

// Trusted Apps Registry Client
//
// Reads trusted applications and authorizations, and serves as the key
// directory for verifying trusted-app signatures. Registry writes go through
// the JSON-RPC endpoint as signed ledger transactions.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::{ClientError, HttpTransport, JsonRpcClient, resource_url};
use crate::domain::authorization::Authorization;
use crate::domain::directory::{DirectoryError, KeyDirectory};
use crate::domain::harness_config::CallKind;
use crate::domain::pagination::{Page, PageRequest};
use crate::domain::session::HeaderOverlay;
use crate::infrastructure::crypto::{Jwk, PublicKey};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppPublicKey {
    pub kid: String,
    pub jwk: Jwk,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrustedApp {
    pub name: String,
    #[serde(default)]
    pub domain: Option<String>,
    #[serde(default)]
    pub public_keys: Vec<AppPublicKey>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppSummary {
    pub name: String,
    #[serde(default)]
    pub href: Option<String>,
}

#[derive(Clone)]
pub struct TrustedAppsClient {
    transport: Arc<HttpTransport>,
    base_url: String,
    rpc: JsonRpcClient,
}

impl TrustedAppsClient {
    pub fn new(transport: Arc<HttpTransport>, base_url: &str) -> Self {
        let base_url = base_url.trim_end_matches('/').to_string();
        Self {
            rpc: JsonRpcClient::new(transport.clone(), format!("{}/jsonrpc", base_url)),
            transport,
            base_url,
        }
    }

    pub fn rpc(&self) -> &JsonRpcClient {
        &self.rpc
    }

    pub async fn get_app(&self, name: &str, headers: &HeaderOverlay) -> Result<TrustedApp, ClientError> {
        self.transport
            .get_json(&resource_url(&self.base_url, &["apps", name])?, &[], headers, CallKind::Default)
            .await
    }

    pub async fn list_apps(&self, page: PageRequest, headers: &HeaderOverlay) -> Result<Page<AppSummary>, ClientError> {
        self.transport
            .get_json(&format!("{}/apps", self.base_url), &page.query(), headers, CallKind::Default)
            .await
    }

    pub async fn get_authorization(&self, id: &str, headers: &HeaderOverlay) -> Result<Authorization, ClientError> {
        self.transport
            .get_json(
                &resource_url(&self.base_url, &["authorizations", id])?,
                &[],
                headers,
                CallKind::Default,
            )
            .await
    }
}

#[async_trait]
impl KeyDirectory for TrustedAppsClient {
    async fn resolve_app_key(&self, app: &str, kid: Option<&str>) -> Result<PublicKey, DirectoryError> {
        let record = self.get_app(app, &HeaderOverlay::default()).await?;
        let key = match kid {
            Some(kid) => record.public_keys.iter().find(|k| k.kid == kid),
            None => record.public_keys.first(),
        }
        .ok_or_else(|| DirectoryError::UnknownKey {
            app: app.to_string(),
            kid: kid.map(str::to_string),
        })?;

        Ok(PublicKey::from_jwk(&key.jwk)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::harness_config::TimeoutConfig;
    use crate::domain::identity::Algorithm;
    use crate::infrastructure::crypto::SecretKey;
    use serde_json::json;

    fn client(url: &str) -> TrustedAppsClient {
        TrustedAppsClient::new(Arc::new(HttpTransport::new(TimeoutConfig::default())), url)
    }

    #[tokio::test]
    async fn test_resolve_app_key_by_kid() {
        let secret = SecretKey::generate(Algorithm::Es256k).unwrap();
        let jwk = secret.public_key().to_jwk();

        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/apps/authorisation-api")
            .with_status(200)
            .with_body(
                json!({
                    "name": "authorisation-api",
                    "publicKeys": [{"kid": "authorisation-api#k1", "jwk": jwk}]
                })
                .to_string(),
            )
            .expect(2)
            .create_async()
            .await;

        let directory = client(&server.url());
        let key = directory
            .resolve_app_key("authorisation-api", Some("authorisation-api#k1"))
            .await
            .unwrap();
        assert_eq!(key, secret.public_key());

        assert!(matches!(
            directory.resolve_app_key("authorisation-api", Some("other")).await,
            Err(DirectoryError::UnknownKey { .. })
        ));
    }

    #[tokio::test]
    async fn test_missing_app_propagates_status() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/apps/ghost")
            .with_status(404)
            .create_async()
            .await;

        let err = client(&server.url()).resolve_app_key("ghost", None).await.unwrap_err();
        assert!(matches!(err, DirectoryError::Client(ref e) if e.status() == Some(404)));
    }

    #[tokio::test]
    async fn test_app_name_is_one_path_segment() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/apps/my%20app")
            .with_status(200)
            .with_body(json!({"name": "my app", "publicKeys": []}).to_string())
            .create_async()
            .await;

        let app = client(&server.url())
            .get_app("my app", &HeaderOverlay::default())
            .await
            .unwrap();
        assert_eq!(app.name, "my app");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_list_apps_full_page() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/apps")
            .match_query(mockito::Matcher::UrlEncoded("page[size]".into(), "10".into()))
            .with_status(200)
            .with_body(
                json!({
                    "self": "/apps?page[after]=1&page[size]=10",
                    "items": [{"name": "ledger-api", "href": "/apps/ledger-api"}],
                    "total": 1,
                    "pageSize": 10,
                    "links": {"first": "/apps", "prev": "/apps", "next": "/apps", "last": "/apps"}
                })
                .to_string(),
            )
            .create_async()
            .await;

        let page = client(&server.url())
            .list_apps(PageRequest::default(), &HeaderOverlay::default())
            .await
            .unwrap();
        assert!(page.is_full());
        assert_eq!(page.items[0].name, "ledger-api");
    }
}
