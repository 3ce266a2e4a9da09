//! OAuth2 client-credentials exchanges

use super::credential::{AccessToken, TokenSource};
use crate::config::{GraphConfig, Secret, ZitadelConfig};
use crate::error::AuthError;
use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;

const GRAPH_SCOPE: &str = "https://graph.microsoft.com/.default";

/// Lifetime assumed when a token response omits `expires_in`.
const DEFAULT_TOKEN_LIFETIME_SECS: u64 = 3600;

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: Option<String>,
    expires_in: Option<u64>,
}

async fn client_credentials(
    http: &reqwest::Client,
    provider: &'static str,
    token_url: &str,
    client_id: &str,
    client_secret: &Secret,
    scope: &str,
) -> Result<AccessToken, AuthError> {
    let form = [
        ("grant_type", "client_credentials"),
        ("client_id", client_id),
        ("client_secret", client_secret.expose()),
        ("scope", scope),
    ];

    let response = http
        .post(token_url)
        .form(&form)
        .send()
        .await
        .map_err(|source| AuthError::Http { provider, source })?;

    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(AuthError::Rejected {
            provider,
            status: status.as_u16(),
            body,
        });
    }

    let body: TokenResponse = response
        .json()
        .await
        .map_err(|source| AuthError::Http { provider, source })?;

    let value = body
        .access_token
        .filter(|t| !t.is_empty())
        .ok_or(AuthError::MissingToken { provider })?;
    let lifetime = body.expires_in.unwrap_or(DEFAULT_TOKEN_LIFETIME_SECS);

    Ok(AccessToken::new(value, Duration::from_secs(lifetime)))
}

/// Microsoft identity platform, app-only token for Graph
pub struct GraphTokenSource {
    http: reqwest::Client,
    token_url: String,
    client_id: String,
    client_secret: Secret,
}

impl GraphTokenSource {
    pub fn new(http: reqwest::Client, config: &GraphConfig) -> Self {
        let token_url = format!(
            "{}/{}/oauth2/v2.0/token",
            config.authority_url.trim_end_matches('/'),
            config.tenant_id
        );
        Self {
            http,
            token_url,
            client_id: config.client_id.clone(),
            client_secret: config.client_secret.clone(),
        }
    }
}

#[async_trait]
impl TokenSource for GraphTokenSource {
    fn provider(&self) -> &'static str {
        "Microsoft Graph"
    }

    async fn fetch(&self) -> Result<AccessToken, AuthError> {
        client_credentials(
            &self.http,
            self.provider(),
            &self.token_url,
            &self.client_id,
            &self.client_secret,
            GRAPH_SCOPE,
        )
        .await
    }
}

/// Zitadel token scoped to the destination project
pub struct ZitadelTokenSource {
    http: reqwest::Client,
    token_url: String,
    client_id: String,
    client_secret: Secret,
    scope: String,
}

impl ZitadelTokenSource {
    pub fn new(http: reqwest::Client, config: &ZitadelConfig) -> Self {
        Self {
            http,
            token_url: config.token_url.clone(),
            client_id: config.client_id.clone(),
            client_secret: config.client_secret.clone(),
            scope: zitadel_scope(&config.project_id),
        }
    }
}

fn zitadel_scope(project_id: &str) -> String {
    format!(
        "openid profile email urn:zitadel:iam:user:resourceowner \
         urn:zitadel:iam:org:projects:roles urn:zitadel:iam:org:project:id:{project_id}:aud"
    )
}

#[async_trait]
impl TokenSource for ZitadelTokenSource {
    fn provider(&self) -> &'static str {
        "Zitadel"
    }

    async fn fetch(&self) -> Result<AccessToken, AuthError> {
        client_credentials(
            &self.http,
            self.provider(),
            &self.token_url,
            &self.client_id,
            &self.client_secret,
            &self.scope,
        )
        .await
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::auth::{CachedCredential, GRAPH_TOKEN_EXPIRY_BUFFER};
    use serde_json::json;
    use std::sync::Arc;
    use wiremock::matchers::{body_string_contains, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn graph_config(authority: &str) -> GraphConfig {
        GraphConfig {
            client_id: "graph-client".to_string(),
            client_secret: Secret::new("graph-secret"),
            tenant_id: "tenant-1".to_string(),
            authority_url: authority.to_string(),
            api_base_url: "http://unused".to_string(),
        }
    }

    fn zitadel_config(token_url: String) -> ZitadelConfig {
        ZitadelConfig {
            token_url,
            project_id: "proj-7".to_string(),
            client_id: "zitadel-client".to_string(),
            client_secret: Secret::new("zitadel-secret"),
        }
    }

    #[tokio::test]
    async fn test_graph_token_exchange() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/tenant-1/oauth2/v2.0/token"))
            .and(body_string_contains("grant_type=client_credentials"))
            .and(body_string_contains("client_id=graph-client"))
            .and(body_string_contains("graph.microsoft.com%2F.default"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "access_token": "graph-token",
                "expires_in": 3599,
                "token_type": "Bearer"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let source = GraphTokenSource::new(reqwest::Client::new(), &graph_config(&server.uri()));
        let token = source.fetch().await.unwrap();

        assert_eq!(token.value, "graph-token");
        assert!(token.is_fresh(Duration::from_secs(3000)));
    }

    #[tokio::test]
    async fn test_zitadel_scope_includes_project_audience() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/oauth/v2/token"))
            .and(body_string_contains("urn%3Azitadel%3Aiam%3Aorg%3Aproject%3Aid%3Aproj-7%3Aaud"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "access_token": "unique-token",
                "expires_in": 43199
            })))
            .expect(1)
            .mount(&server)
            .await;

        let config = zitadel_config(format!("{}/oauth/v2/token", server.uri()));
        let source = ZitadelTokenSource::new(reqwest::Client::new(), &config);

        assert_eq!(source.fetch().await.unwrap().value, "unique-token");
    }

    #[tokio::test]
    async fn test_rejected_exchange_reports_status() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(401).set_body_string("invalid_client"))
            .mount(&server)
            .await;

        let source = GraphTokenSource::new(reqwest::Client::new(), &graph_config(&server.uri()));
        let err = source.fetch().await.unwrap_err();

        assert!(matches!(
            err,
            AuthError::Rejected { provider: "Microsoft Graph", status: 401, .. }
        ));
    }

    #[tokio::test]
    async fn test_empty_access_token_rejected() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "access_token": "" })))
            .mount(&server)
            .await;

        let config = zitadel_config(format!("{}/token", server.uri()));
        let source = ZitadelTokenSource::new(reqwest::Client::new(), &config);

        assert!(matches!(
            source.fetch().await.unwrap_err(),
            AuthError::MissingToken { provider: "Zitadel" }
        ));
    }

    #[tokio::test]
    async fn test_cached_credential_hits_endpoint_once() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "access_token": "graph-token",
                "expires_in": 3600
            })))
            .expect(1)
            .mount(&server)
            .await;

        let source = GraphTokenSource::new(reqwest::Client::new(), &graph_config(&server.uri()));
        let credential = CachedCredential::new(Arc::new(source), GRAPH_TOKEN_EXPIRY_BUFFER);

        assert_eq!(credential.get().await.unwrap(), "graph-token");
        assert_eq!(credential.get().await.unwrap(), "graph-token");
    }
}
