//! Shared helpers for the connector integration tests
//!
//! - [`TestPostgres`]: a throwaway PostgreSQL container with migrations applied
//! - [`MockApis`]: one wiremock server standing in for both identity
//!   providers, Microsoft Graph and the destination API
//!
//! Container tests need a running Docker daemon and are `#[ignore]`d:
//!
//! ```bash
//! cargo test -p spc-connector --test postgres_tests -- --ignored --nocapture
//! ```

#![allow(dead_code, clippy::unwrap_used, clippy::expect_used)]

use anyhow::{Context, Result};
use serde_json::{json, Value};
use spc_connector::config::Config;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use std::collections::HashMap;
use std::time::Duration;
use testcontainers::{core::IntoContainerPort, runners::AsyncRunner, ContainerAsync, ImageExt};
use testcontainers_modules::postgres::Postgres;
use tracing::info;
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

pub const SITE_ID: &str = "site-1";
pub const DRIVE_ID: &str = "drive-1";
pub const SCOPE_ID: &str = "scope-1";

// ============================================================================
// PostgreSQL Test Container
// ============================================================================

pub struct TestPostgres {
    _container: ContainerAsync<Postgres>,
    pool: PgPool,
}

impl TestPostgres {
    pub async fn start() -> Result<Self> {
        info!("Starting PostgreSQL test container...");

        let container = Postgres::default()
            .with_tag("16-alpine")
            .start()
            .await
            .context("Failed to start PostgreSQL container")?;

        let host = container.get_host().await.context("Failed to get container host")?;
        let port = container
            .get_host_port_ipv4(5432.tcp())
            .await
            .context("Failed to get container port")?;
        let url = format!("postgresql://postgres:postgres@{}:{}/postgres", host, port);

        let pool = PgPoolOptions::new()
            .max_connections(8)
            .acquire_timeout(Duration::from_secs(30))
            .connect(&url)
            .await
            .context("Failed to connect to PostgreSQL")?;

        sqlx::migrate!("../../migrations")
            .run(&pool)
            .await
            .context("Failed to run migrations")?;

        Ok(Self {
            _container: container,
            pool,
        })
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub fn pool_clone(&self) -> PgPool {
        self.pool.clone()
    }
}

pub fn init_test_tracing() {
    use tracing_subscriber::{fmt, EnvFilter};

    let _ = fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new("info,spc_connector=debug,sqlx=warn,testcontainers=info")
        }))
        .with_test_writer()
        .try_init();
}

// ============================================================================
// Mocked external APIs
// ============================================================================

pub struct MockApis {
    pub server: MockServer,
}

impl MockApis {
    pub async fn start() -> Self {
        Self {
            server: MockServer::start().await,
        }
    }

    pub fn uri(&self) -> String {
        self.server.uri()
    }

    /// Configuration with every external endpoint on the mock server
    pub fn config(&self) -> Config {
        let uri = self.uri();
        let vars: HashMap<&'static str, String> = HashMap::from([
            ("DATABASE_URL", "postgres://localhost/spc".to_string()),
            ("GRAPH_CLIENT_ID", "graph-client".to_string()),
            ("GRAPH_CLIENT_SECRET", "graph-secret".to_string()),
            ("GRAPH_TENANT_ID", "tenant-1".to_string()),
            ("GRAPH_AUTHORITY_URL", uri.clone()),
            ("GRAPH_API_BASE_URL", uri.clone()),
            ("SHAREPOINT_SITES", SITE_ID.to_string()),
            ("UNIQUE_INGESTION_URL", format!("{uri}/ingestion")),
            ("UNIQUE_INGESTION_URL_GRAPHQL", format!("{uri}/graphql")),
            ("UNIQUE_SCOPE_ID", SCOPE_ID.to_string()),
            ("ZITADEL_OAUTH_TOKEN_URL", format!("{uri}/oauth/v2/token")),
            ("ZITADEL_PROJECT_ID", "project-1".to_string()),
            ("ZITADEL_CLIENT_ID", "zitadel-client".to_string()),
            ("ZITADEL_CLIENT_SECRET", "zitadel-secret".to_string()),
        ]);

        Config::from_lookup(|name| vars.get(name).cloned()).expect("valid test configuration")
    }

    pub async fn mount_token_endpoints(&self) {
        Mock::given(method("POST"))
            .and(path("/tenant-1/oauth2/v2.0/token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "access_token": "graph-token",
                "expires_in": 3600,
                "token_type": "Bearer"
            })))
            .mount(&self.server)
            .await;

        Mock::given(method("POST"))
            .and(path("/oauth/v2/token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "access_token": "unique-token",
                "expires_in": 3600,
                "token_type": "Bearer"
            })))
            .mount(&self.server)
            .await;
    }

    /// One drive in [`SITE_ID`] whose root holds `files`
    pub async fn mount_library(&self, files: &[(&str, &[u8])]) {
        Mock::given(method("GET"))
            .and(path(format!("/sites/{SITE_ID}/drives")))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "value": [{ "id": DRIVE_ID, "name": "Documents" }]
            })))
            .mount(&self.server)
            .await;

        let children: Vec<Value> = files
            .iter()
            .map(|(id, content)| drive_item(id, content.len()))
            .collect();
        Mock::given(method("GET"))
            .and(path(format!("/drives/{DRIVE_ID}/items/root/children")))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "value": children })))
            .mount(&self.server)
            .await;

        for (id, content) in files {
            Mock::given(method("GET"))
                .and(path(format!("/drives/{DRIVE_ID}/items/{id}/content")))
                .respond_with(ResponseTemplate::new(200).set_body_bytes(content.to_vec()))
                .mount(&self.server)
                .await;
        }
    }

    pub async fn mount_file_diff(&self, new_and_updated: &[&str]) {
        Mock::given(method("POST"))
            .and(path("/ingestion/file-diff"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "newAndUpdatedFiles": new_and_updated,
                "deletedFiles": [],
                "movedFiles": []
            })))
            .mount(&self.server)
            .await;
    }

    /// Registration, blob upload and finalization for `file_id`, each expected once
    pub async fn mount_ingestion(&self, file_id: &str, byte_size: usize) {
        let uri = self.uri();
        let key = format!("sharepoint_{SITE_ID}_{DRIVE_ID}_{file_id}");

        Mock::given(method("POST"))
            .and(path("/graphql"))
            .and(body_partial_json(json!({
                "variables": { "input": { "key": key }, "storeInternally": true }
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": { "contentUpsert": {
                    "id": format!("cont_{file_id}"),
                    "key": key,
                    "mimeType": "application/pdf",
                    "ownerType": "SCOPE",
                    "writeUrl": format!("{uri}/blob/{file_id}"),
                    "readUrl": format!("{uri}/read/{file_id}")
                }}
            })))
            .expect(1)
            .named("content registration")
            .mount(&self.server)
            .await;

        Mock::given(method("PUT"))
            .and(path(format!("/blob/{file_id}")))
            .respond_with(ResponseTemplate::new(201))
            .expect(1)
            .named("storage upload")
            .mount(&self.server)
            .await;

        Mock::given(method("POST"))
            .and(path("/graphql"))
            .and(body_partial_json(json!({
                "variables": {
                    "input": { "key": key, "byteSize": byte_size },
                    "fileUrl": format!("{uri}/read/{file_id}")
                }
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": { "contentUpsert": { "id": format!("cont_{file_id}") } }
            })))
            .expect(1)
            .named("ingestion finalization")
            .mount(&self.server)
            .await;
    }
}

/// A flagged PDF as Graph lists it in a folder
pub fn drive_item(id: &str, size: usize) -> Value {
    json!({
        "id": id,
        "name": format!("{id}.pdf"),
        "webUrl": format!("https://contoso.sharepoint.com/sites/Finance/Shared%20Documents/{id}.pdf"),
        "size": size,
        "lastModifiedDateTime": "2026-09-30T08:00:00Z",
        "file": { "mimeType": "application/pdf" },
        "parentReference": { "driveId": DRIVE_ID },
        "listItem": { "fields": { "FinanceGPTKnowledge": true } }
    })
}
