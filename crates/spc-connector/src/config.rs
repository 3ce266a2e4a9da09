//! Configuration management
//!
//! Settings come from the environment (a `.env` file is honoured) and are
//! resolved once at startup into an explicit [`Config`] that is handed to each
//! component at construction.

use crate::error::ConfigError;
use std::time::Duration;

// ============================================================================
// Server Configuration Constants
// ============================================================================

/// Default bind host for the health and metrics surface.
pub const DEFAULT_SERVER_HOST: &str = "0.0.0.0";

/// Default bind port for the health and metrics surface.
pub const DEFAULT_SERVER_PORT: u16 = 3000;

/// Default maximum database connections in the pool.
pub const DEFAULT_DATABASE_MAX_CONNECTIONS: u32 = 10;

// ============================================================================
// Processing Configuration Constants
// ============================================================================

/// Default number of pipeline runs a worker executes at once.
pub const DEFAULT_PROCESSING_CONCURRENCY: usize = 4;

/// Default number of attempts per job before it is moved to the failed state.
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Default base delay for exponential job backoff in milliseconds.
pub const DEFAULT_RETRY_BACKOFF_MS: u64 = 1000;

/// Default per-step timeout in seconds.
pub const DEFAULT_STEP_TIMEOUT_SECONDS: u64 = 30;

/// Default maximum size of a downloaded file (200 MiB).
pub const DEFAULT_MAX_FILE_SIZE_BYTES: u64 = 200 * 1024 * 1024;

// ============================================================================
// Queue Configuration Constants
// ============================================================================

/// Default idle poll interval of the worker in milliseconds.
pub const DEFAULT_QUEUE_POLL_INTERVAL_MS: u64 = 1000;

/// Default age after which an active job is considered abandoned.
pub const DEFAULT_QUEUE_VISIBILITY_TIMEOUT_SECS: u64 = 300;

/// Default number of failed jobs kept for inspection.
pub const DEFAULT_QUEUE_FAILED_RETENTION: u64 = 1000;

// ============================================================================
// Source / Destination Configuration Constants
// ============================================================================

/// Default Microsoft identity platform authority.
pub const DEFAULT_GRAPH_AUTHORITY_URL: &str = "https://login.microsoftonline.com";

/// Default Microsoft Graph API base URL.
pub const DEFAULT_GRAPH_API_BASE_URL: &str = "https://graph.microsoft.com/v1.0";

/// Default list column that marks a file for synchronisation.
pub const DEFAULT_SYNC_COLUMN_NAME: &str = "FinanceGPTKnowledge";

/// Default prefix of registered content keys.
pub const DEFAULT_CONTENT_KEY_PREFIX: &str = "sharepoint";

// ============================================================================
// Scan Configuration Constants
// ============================================================================

/// Default scan interval in seconds (15 minutes).
pub const DEFAULT_SCAN_INTERVAL_SECS: u64 = 900;

/// Default distributed lock key guarding the scan.
pub const DEFAULT_SCAN_LOCK_KEY: &str = "spc:scan-lock";

/// A credential that never shows up in `Debug` output.
#[derive(Clone, PartialEq, Eq)]
pub struct Secret(String);

impl Secret {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Debug for Secret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Secret(***)")
    }
}

/// Connector configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub processing: ProcessingConfig,
    pub queue: QueueConfig,
    pub graph: GraphConfig,
    pub sharepoint: SharePointConfig,
    pub unique: UniqueConfig,
    pub zitadel: ZitadelConfig,
    pub scan: ScanConfig,
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub url: Secret,
    pub max_connections: u32,
}

/// Pipeline and worker settings
#[derive(Debug, Clone)]
pub struct ProcessingConfig {
    pub concurrency: usize,
    pub max_retries: u32,
    pub retry_backoff_ms: u64,
    pub step_timeout_secs: u64,
    pub max_file_size_bytes: u64,
    /// Empty means every MIME type is accepted.
    pub allowed_mime_types: Vec<String>,
}

impl ProcessingConfig {
    pub fn step_timeout(&self) -> Duration {
        Duration::from_secs(self.step_timeout_secs)
    }

    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms)
    }
}

#[derive(Debug, Clone)]
pub struct QueueConfig {
    pub poll_interval_ms: u64,
    pub visibility_timeout_secs: u64,
    pub failed_retention: u64,
}

impl QueueConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn visibility_timeout(&self) -> Duration {
        Duration::from_secs(self.visibility_timeout_secs)
    }
}

/// Microsoft Graph application credentials
#[derive(Debug, Clone)]
pub struct GraphConfig {
    pub client_id: String,
    pub client_secret: Secret,
    pub tenant_id: String,
    pub authority_url: String,
    pub api_base_url: String,
}

#[derive(Debug, Clone)]
pub struct SharePointConfig {
    pub sites: Vec<String>,
    pub sync_column_name: String,
}

/// Destination ingestion API
#[derive(Debug, Clone)]
pub struct UniqueConfig {
    pub ingestion_url: String,
    pub graphql_url: String,
    pub scope_id: String,
    pub content_key_prefix: String,
    /// `basePath` sent with file-diff requests
    pub diff_base_path: String,
}

/// Destination identity provider
#[derive(Debug, Clone)]
pub struct ZitadelConfig {
    pub token_url: String,
    pub project_id: String,
    pub client_id: String,
    pub client_secret: Secret,
}

#[derive(Debug, Clone)]
pub struct ScanConfig {
    pub interval_secs: u64,
    pub lock_key: String,
}

impl ScanConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }
}

impl Config {
    /// Load configuration from `.env`, the environment and defaults
    pub fn load() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build configuration from an arbitrary variable source
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let env = Env { lookup };

        let config = Config {
            server: ServerConfig {
                host: env.string_or("HOST", DEFAULT_SERVER_HOST),
                port: env.parsed_or("PORT", DEFAULT_SERVER_PORT)?,
            },
            database: DatabaseConfig {
                url: Secret::new(env.required("DATABASE_URL")?),
                max_connections: env
                    .parsed_or("DATABASE_MAX_CONNECTIONS", DEFAULT_DATABASE_MAX_CONNECTIONS)?,
            },
            processing: ProcessingConfig {
                concurrency: env
                    .parsed_or("PROCESSING_CONCURRENCY", DEFAULT_PROCESSING_CONCURRENCY)?,
                max_retries: env.parsed_or("MAX_RETRIES", DEFAULT_MAX_RETRIES)?,
                retry_backoff_ms: env.parsed_or("RETRY_BACKOFF_MS", DEFAULT_RETRY_BACKOFF_MS)?,
                step_timeout_secs: env
                    .parsed_or("STEP_TIMEOUT_SECONDS", DEFAULT_STEP_TIMEOUT_SECONDS)?,
                max_file_size_bytes: env
                    .parsed_or("MAX_FILE_SIZE_BYTES", DEFAULT_MAX_FILE_SIZE_BYTES)?,
                allowed_mime_types: env.list("ALLOWED_MIME_TYPES"),
            },
            queue: QueueConfig {
                poll_interval_ms: env
                    .parsed_or("QUEUE_POLL_INTERVAL_MS", DEFAULT_QUEUE_POLL_INTERVAL_MS)?,
                visibility_timeout_secs: env.parsed_or(
                    "QUEUE_VISIBILITY_TIMEOUT_SECS",
                    DEFAULT_QUEUE_VISIBILITY_TIMEOUT_SECS,
                )?,
                failed_retention: env
                    .parsed_or("QUEUE_FAILED_RETENTION", DEFAULT_QUEUE_FAILED_RETENTION)?,
            },
            graph: GraphConfig {
                client_id: env.required("GRAPH_CLIENT_ID")?,
                client_secret: Secret::new(env.required("GRAPH_CLIENT_SECRET")?),
                tenant_id: env.required("GRAPH_TENANT_ID")?,
                authority_url: env.string_or("GRAPH_AUTHORITY_URL", DEFAULT_GRAPH_AUTHORITY_URL),
                api_base_url: env.string_or("GRAPH_API_BASE_URL", DEFAULT_GRAPH_API_BASE_URL),
            },
            sharepoint: SharePointConfig {
                sites: env.list("SHAREPOINT_SITES"),
                sync_column_name: env
                    .string_or("SHAREPOINT_SYNC_COLUMN_NAME", DEFAULT_SYNC_COLUMN_NAME),
            },
            unique: UniqueConfig {
                ingestion_url: env.required("UNIQUE_INGESTION_URL")?,
                graphql_url: env.required("UNIQUE_INGESTION_URL_GRAPHQL")?,
                scope_id: env.required("UNIQUE_SCOPE_ID")?,
                content_key_prefix: env
                    .string_or("CONTENT_KEY_PREFIX", DEFAULT_CONTENT_KEY_PREFIX),
                diff_base_path: env.string_or("UNIQUE_DIFF_BASE_PATH", ""),
            },
            zitadel: ZitadelConfig {
                token_url: env.required("ZITADEL_OAUTH_TOKEN_URL")?,
                project_id: env.required("ZITADEL_PROJECT_ID")?,
                client_id: env.required("ZITADEL_CLIENT_ID")?,
                client_secret: Secret::new(env.required("ZITADEL_CLIENT_SECRET")?),
            },
            scan: ScanConfig {
                interval_secs: env.parsed_or("SCAN_INTERVAL_SECS", DEFAULT_SCAN_INTERVAL_SECS)?,
                lock_key: env.string_or("SCAN_LOCK_KEY", DEFAULT_SCAN_LOCK_KEY),
            },
        };

        config.validate()?;

        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.server.port == 0 {
            return Err(ConfigError::invalid("PORT", "must be greater than 0"));
        }

        if self.database.max_connections == 0 {
            return Err(ConfigError::invalid("DATABASE_MAX_CONNECTIONS", "must be greater than 0"));
        }

        if self.processing.concurrency == 0 {
            return Err(ConfigError::invalid("PROCESSING_CONCURRENCY", "must be greater than 0"));
        }

        if self.processing.max_retries == 0 {
            return Err(ConfigError::invalid("MAX_RETRIES", "must allow at least one attempt"));
        }

        if self.processing.step_timeout_secs == 0 {
            return Err(ConfigError::invalid("STEP_TIMEOUT_SECONDS", "must be greater than 0"));
        }

        if self.processing.max_file_size_bytes == 0 {
            return Err(ConfigError::invalid("MAX_FILE_SIZE_BYTES", "must be greater than 0"));
        }

        if self.sharepoint.sites.is_empty() {
            return Err(ConfigError::Missing("SHAREPOINT_SITES"));
        }

        // The lock TTL equals the interval and renewal runs at two thirds of it
        if self.scan.interval_secs < 3 {
            return Err(ConfigError::invalid("SCAN_INTERVAL_SECS", "must be at least 3 seconds"));
        }

        if self.scan.lock_key.trim().is_empty() {
            return Err(ConfigError::invalid("SCAN_LOCK_KEY", "cannot be empty"));
        }

        for (name, value) in [
            ("GRAPH_AUTHORITY_URL", &self.graph.authority_url),
            ("GRAPH_API_BASE_URL", &self.graph.api_base_url),
            ("UNIQUE_INGESTION_URL", &self.unique.ingestion_url),
            ("UNIQUE_INGESTION_URL_GRAPHQL", &self.unique.graphql_url),
            ("ZITADEL_OAUTH_TOKEN_URL", &self.zitadel.token_url),
        ] {
            url::Url::parse(value).map_err(|e| ConfigError::invalid(name, e.to_string()))?;
        }

        Ok(())
    }
}

struct Env<F> {
    lookup: F,
}

impl<F> Env<F>
where
    F: Fn(&str) -> Option<String>,
{
    fn get(&self, name: &str) -> Option<String> {
        (self.lookup)(name)
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    }

    fn required(&self, name: &'static str) -> Result<String, ConfigError> {
        self.get(name).ok_or(ConfigError::Missing(name))
    }

    fn string_or(&self, name: &str, default: &str) -> String {
        self.get(name).unwrap_or_else(|| default.to_string())
    }

    fn parsed_or<T>(&self, name: &'static str, default: T) -> Result<T, ConfigError>
    where
        T: std::str::FromStr,
        T::Err: std::fmt::Display,
    {
        match self.get(name) {
            Some(raw) => raw
                .parse()
                .map_err(|e: T::Err| ConfigError::invalid(name, format!("{raw:?}: {e}"))),
            None => Ok(default),
        }
    }

    fn list(&self, name: &str) -> Vec<String> {
        self.get(name)
            .map(|raw| {
                raw.split(',')
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
                    .collect()
            })
            .unwrap_or_default()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
pub(crate) mod tests {
    use super::*;
    use serial_test::serial;
    use std::collections::HashMap;

    pub(crate) fn required_vars() -> HashMap<&'static str, &'static str> {
        HashMap::from([
            ("DATABASE_URL", "postgres://localhost/spc"),
            ("GRAPH_CLIENT_ID", "graph-client"),
            ("GRAPH_CLIENT_SECRET", "graph-secret"),
            ("GRAPH_TENANT_ID", "tenant-1"),
            ("SHAREPOINT_SITES", "site-a, site-b"),
            ("UNIQUE_INGESTION_URL", "https://ingest.example.com/v1"),
            ("UNIQUE_INGESTION_URL_GRAPHQL", "https://ingest.example.com/graphql"),
            ("UNIQUE_SCOPE_ID", "scope-1"),
            ("ZITADEL_OAUTH_TOKEN_URL", "https://id.example.com/oauth/v2/token"),
            ("ZITADEL_PROJECT_ID", "project-1"),
            ("ZITADEL_CLIENT_ID", "zitadel-client"),
            ("ZITADEL_CLIENT_SECRET", "zitadel-secret"),
        ])
    }

    fn load_with(vars: &HashMap<&'static str, &'static str>) -> Result<Config, ConfigError> {
        Config::from_lookup(|name| vars.get(name).map(|v| v.to_string()))
    }

    #[test]
    fn test_defaults_applied() {
        let config = load_with(&required_vars()).unwrap();

        assert_eq!(config.server.host, DEFAULT_SERVER_HOST);
        assert_eq!(config.server.port, DEFAULT_SERVER_PORT);
        assert_eq!(config.processing.concurrency, DEFAULT_PROCESSING_CONCURRENCY);
        assert_eq!(config.processing.max_retries, 3);
        assert_eq!(config.processing.step_timeout(), Duration::from_secs(30));
        assert_eq!(config.processing.max_file_size_bytes, 209_715_200);
        assert!(config.processing.allowed_mime_types.is_empty());
        assert_eq!(config.scan.interval(), Duration::from_secs(900));
        assert_eq!(config.scan.lock_key, DEFAULT_SCAN_LOCK_KEY);
        assert_eq!(config.sharepoint.sites, vec!["site-a", "site-b"]);
        assert_eq!(config.sharepoint.sync_column_name, DEFAULT_SYNC_COLUMN_NAME);
        assert_eq!(config.unique.content_key_prefix, "sharepoint");
    }

    #[test]
    fn test_missing_required_setting() {
        let mut vars = required_vars();
        vars.remove("ZITADEL_PROJECT_ID");

        let err = load_with(&vars).unwrap_err();
        assert!(matches!(err, ConfigError::Missing("ZITADEL_PROJECT_ID")));
    }

    #[test]
    fn test_blank_value_counts_as_missing() {
        let mut vars = required_vars();
        vars.insert("DATABASE_URL", "   ");

        let err = load_with(&vars).unwrap_err();
        assert!(matches!(err, ConfigError::Missing("DATABASE_URL")));
    }

    #[test]
    fn test_empty_site_list_rejected() {
        let mut vars = required_vars();
        vars.insert("SHAREPOINT_SITES", " , ");

        let err = load_with(&vars).unwrap_err();
        assert!(matches!(err, ConfigError::Missing("SHAREPOINT_SITES")));
    }

    #[test]
    fn test_unparseable_number_rejected() {
        let mut vars = required_vars();
        vars.insert("STEP_TIMEOUT_SECONDS", "soon");

        let err = load_with(&vars).unwrap_err();
        assert!(err.to_string().contains("STEP_TIMEOUT_SECONDS"));
    }

    #[test]
    fn test_zero_concurrency_rejected() {
        let mut vars = required_vars();
        vars.insert("PROCESSING_CONCURRENCY", "0");

        assert!(load_with(&vars).is_err());
    }

    #[test]
    fn test_allowed_mime_types_parsed() {
        let mut vars = required_vars();
        vars.insert("ALLOWED_MIME_TYPES", "application/pdf, text/plain");

        let config = load_with(&vars).unwrap();
        assert_eq!(
            config.processing.allowed_mime_types,
            vec!["application/pdf", "text/plain"]
        );
    }

    #[test]
    fn test_secrets_redacted_in_debug() {
        let config = load_with(&required_vars()).unwrap();
        let rendered = format!("{:?}", config);

        assert!(!rendered.contains("graph-secret"));
        assert!(!rendered.contains("zitadel-secret"));
        assert!(!rendered.contains("postgres://localhost/spc"));
        assert_eq!(config.graph.client_secret.expose(), "graph-secret");
    }

    #[test]
    #[serial]
    fn test_load_reads_process_environment() {
        let vars = required_vars();
        for (key, value) in &vars {
            std::env::set_var(key, value);
        }
        std::env::set_var("PORT", "8080");

        let config = Config::load();

        for key in vars.keys() {
            std::env::remove_var(key);
        }
        std::env::remove_var("PORT");

        let config = config.unwrap();
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.graph.tenant_id, "tenant-1");
    }
}
