//! SurrealDB connection setup
//!
//! Every constructor selects the namespace/database and runs
//! [`crate::migrations::init_schema`] before handing the connection out.
//! Supports in-memory (`mem://`), local (`surrealkv://`), URL and cloud
//! (WebSocket) connections.

use std::path::Path;

use surrealdb::engine::any::Any;
use surrealdb::opt::auth::{Database, Root};
use surrealdb::Surreal;
use tracing::{info, instrument};

use crate::error::StateError;
use crate::migrations;
use crate::Result;

/// Namespace used when none is configured
pub const DEFAULT_NAMESPACE: &str = "agentmem";
/// Database used when none is configured
pub const DEFAULT_DATABASE: &str = "main";
/// Local store path used when neither cloud config nor `SURREALDB_URL` is set
pub const DEFAULT_LOCAL_PATH: &str = ".agentmem/db";

/// Configuration for SurrealDB Cloud connection
#[derive(Debug, Clone)]
pub struct CloudConfig {
    /// WebSocket endpoint URL (e.g., "wss://xxx.aws-use1.surrealdb.cloud")
    pub endpoint: String,
    pub username: String,
    pub password: String,
    /// Namespace (default: "agentmem")
    pub namespace: String,
    /// Database name (default: "main")
    pub database: String,
    /// Whether this is a root user (true) or database user (false)
    pub is_root: bool,
}

impl CloudConfig {
    /// Create a new cloud configuration for a database user
    pub fn new(
        endpoint: impl Into<String>,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            endpoint: endpoint.into(),
            username: username.into(),
            password: password.into(),
            namespace: DEFAULT_NAMESPACE.to_string(),
            database: DEFAULT_DATABASE.to_string(),
            is_root: false,
        }
    }

    pub fn with_namespace(mut self, ns: impl Into<String>) -> Self {
        self.namespace = ns.into();
        self
    }

    pub fn with_database(mut self, db: impl Into<String>) -> Self {
        self.database = db.into();
        self
    }

    pub fn with_root(mut self, is_root: bool) -> Self {
        self.is_root = is_root;
        self
    }

    /// Create from environment variables
    ///
    /// Reads:
    /// - SURREALDB_ENDPOINT (required)
    /// - SURREALDB_USERNAME (required)
    /// - SURREALDB_PASSWORD (required)
    /// - SURREALDB_NAMESPACE (optional, default: "agentmem")
    /// - SURREALDB_DATABASE (optional, default: "main")
    /// - SURREALDB_ROOT (optional, default: "false") - set to "true" for root users
    pub fn from_env() -> std::result::Result<Self, String> {
        let endpoint =
            std::env::var("SURREALDB_ENDPOINT").map_err(|_| "SURREALDB_ENDPOINT not set")?;
        let username =
            std::env::var("SURREALDB_USERNAME").map_err(|_| "SURREALDB_USERNAME not set")?;
        let password =
            std::env::var("SURREALDB_PASSWORD").map_err(|_| "SURREALDB_PASSWORD not set")?;
        let namespace = std::env::var("SURREALDB_NAMESPACE")
            .unwrap_or_else(|_| DEFAULT_NAMESPACE.to_string());
        let database =
            std::env::var("SURREALDB_DATABASE").unwrap_or_else(|_| DEFAULT_DATABASE.to_string());
        let is_root = std::env::var("SURREALDB_ROOT")
            .map(|v| v.eq_ignore_ascii_case("true"))
            .unwrap_or(false);

        Ok(Self {
            endpoint,
            username,
            password,
            namespace,
            database,
            is_root,
        })
    }
}

async fn open(url: &str, namespace: &str, database: &str) -> Result<Surreal<Any>> {
    let db = surrealdb::engine::any::connect(url)
        .await
        .map_err(|e| StateError::Connection(format!("Failed to connect to {url}: {e}")))?;

    db.use_ns(namespace)
        .use_db(database)
        .await
        .map_err(|e| StateError::Connection(e.to_string()))?;

    migrations::init_schema(&db).await?;
    Ok(db)
}

/// Connect to the embedded in-memory engine.
pub async fn connect_memory() -> Result<Surreal<Any>> {
    open("mem://", DEFAULT_NAMESPACE, DEFAULT_DATABASE).await
}

/// Connect to an arbitrary engine URL (`mem://`, `surrealkv://…`, `ws://…`).
#[instrument(skip_all, fields(url = %url))]
pub async fn connect_url(url: &str) -> Result<Surreal<Any>> {
    let db = open(url, DEFAULT_NAMESPACE, DEFAULT_DATABASE).await?;
    info!("SurrealDB connected");
    Ok(db)
}

/// Connect to an on-disk `surrealkv` store, creating the directory if needed.
pub async fn connect_local(path: impl AsRef<Path>) -> Result<Surreal<Any>> {
    let path = path.as_ref();
    std::fs::create_dir_all(path).map_err(|e| {
        StateError::Connection(format!(
            "Failed to create database directory {}: {}",
            path.display(),
            e
        ))
    })?;
    connect_url(&format!("surrealkv://{}", path.display())).await
}

/// Connect to SurrealDB Cloud
///
/// # Example
/// ```ignore
/// let config = CloudConfig::new(
///     "wss://xxx.aws-use1.surrealdb.cloud",
///     "your_username",
///     "your_password",
/// );
/// let db = connect_cloud(&config).await?;
/// ```
#[instrument(skip(config), fields(endpoint = %config.endpoint, namespace = %config.namespace, database = %config.database))]
pub async fn connect_cloud(config: &CloudConfig) -> Result<Surreal<Any>> {
    info!("Connecting to SurrealDB Cloud (root={})", config.is_root);

    let db = surrealdb::engine::any::connect(&config.endpoint)
        .await
        .map_err(|e| {
            StateError::Connection(format!("Failed to connect to {}: {}", config.endpoint, e))
        })?;

    if config.is_root {
        db.signin(Root {
            username: &config.username,
            password: &config.password,
        })
        .await
        .map_err(|e| StateError::Connection(format!("Root auth failed: {e}")))?;
    } else {
        db.signin(Database {
            namespace: &config.namespace,
            database: &config.database,
            username: &config.username,
            password: &config.password,
        })
        .await
        .map_err(|e| StateError::Connection(format!("DB auth failed: {e}")))?;
    }

    db.use_ns(&config.namespace)
        .use_db(&config.database)
        .await
        .map_err(|e| StateError::Connection(e.to_string()))?;

    migrations::init_schema(&db).await?;
    info!("SurrealDB Cloud connected and schema initialized");
    Ok(db)
}

/// Connect using the environment.
///
/// Order: `CloudConfig::from_env()`, then `SURREALDB_URL`, then a local
/// `surrealkv` store under [`DEFAULT_LOCAL_PATH`].
pub async fn connect_from_env() -> Result<Surreal<Any>> {
    if let Ok(config) = CloudConfig::from_env() {
        return connect_cloud(&config).await;
    }

    if let Ok(url) = std::env::var("SURREALDB_URL") {
        return connect_url(&url).await;
    }

    info!(
        "No cloud config or SURREALDB_URL found, using local persistence: {}",
        DEFAULT_LOCAL_PATH
    );
    connect_local(DEFAULT_LOCAL_PATH).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cloud_config_defaults() {
        let config = CloudConfig::new("wss://example", "user", "pw");
        assert_eq!(config.namespace, DEFAULT_NAMESPACE);
        assert_eq!(config.database, DEFAULT_DATABASE);
        assert!(!config.is_root);

        let config = config.with_namespace("ns").with_database("db").with_root(true);
        assert_eq!(config.namespace, "ns");
        assert_eq!(config.database, "db");
        assert!(config.is_root);
    }

    #[tokio::test]
    async fn memory_connection_runs_migrations_once_and_again() {
        let db = connect_memory().await.unwrap();
        migrations::init_schema(&db).await.unwrap();
    }
}
