use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::env;
use std::time::Duration;
use surrealdb::Surreal;
use surrealdb::engine::any::Any;
use surrealdb::opt::auth::Root;
use tracing::{debug, info};

pub type Db = Surreal<Any>;

/// Default budget for a single store call.
pub const DEFAULT_QUERY_TIMEOUT_MS: u64 = 5_000;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub namespace: String,
    pub database: String,
    pub username: Option<String>,
    pub password: Option<String>,
    /// Upper bound for every credential-store query
    #[serde(default = "default_query_timeout_ms")]
    pub query_timeout_ms: u64,
}

fn default_query_timeout_ms() -> u64 {
    DEFAULT_QUERY_TIMEOUT_MS
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: env::var("SURREALDB_URL").unwrap_or_else(|_| "memory".to_string()),
            namespace: env::var("SURREALDB_NAMESPACE").unwrap_or_else(|_| "recipes".to_string()),
            database: env::var("SURREALDB_DATABASE").unwrap_or_else(|_| "identity".to_string()),
            username: env::var("SURREALDB_USERNAME").ok(),
            password: env::var("SURREALDB_PASSWORD").ok(),
            query_timeout_ms: env::var("STORE_TIMEOUT_MS")
                .ok()
                .and_then(|v| v.trim().parse().ok())
                .filter(|ms| *ms > 0)
                .unwrap_or(DEFAULT_QUERY_TIMEOUT_MS),
        }
    }
}

impl DatabaseConfig {
    /// In-memory database, used by tests and `--db-url memory`.
    pub fn memory() -> Self {
        Self {
            url: "memory".to_string(),
            namespace: "recipes".to_string(),
            database: "identity".to_string(),
            username: None,
            password: None,
            query_timeout_ms: DEFAULT_QUERY_TIMEOUT_MS,
        }
    }

    pub fn query_timeout(&self) -> Duration {
        Duration::from_millis(self.query_timeout_ms)
    }
}

pub async fn create_connection(config: DatabaseConfig) -> Result<Db> {
    debug!(url = %config.url, "Connecting to SurrealDB");
    let db = surrealdb::engine::any::connect(config.url).await?;

    // Sign in if credentials are provided
    if let (Some(username), Some(password)) = (config.username, config.password) {
        db.signin(Root {
            username: &username,
            password: &password,
        })
        .await?;
    }

    db.use_ns(config.namespace).use_db(config.database).await?;

    Ok(db)
}

/// Define the principal and catalog tables. Safe to run repeatedly.
pub async fn ensure_schema(db: &Db) -> Result<()> {
    let schema_queries = [
        // Principals
        "DEFINE TABLE IF NOT EXISTS user SCHEMAFULL;
         DEFINE FIELD IF NOT EXISTS username ON TABLE user TYPE string;
         DEFINE FIELD IF NOT EXISTS email ON TABLE user TYPE string;
         DEFINE FIELD IF NOT EXISTS password_hash ON TABLE user TYPE string;
         DEFINE FIELD IF NOT EXISTS roles ON TABLE user TYPE array<string>;
         DEFINE FIELD IF NOT EXISTS created_at ON TABLE user TYPE datetime DEFAULT time::now();",
        // Uniqueness backs the service-level existence checks under races
        "DEFINE INDEX IF NOT EXISTS user_username ON TABLE user COLUMNS username UNIQUE;
         DEFINE INDEX IF NOT EXISTS user_email ON TABLE user COLUMNS email UNIQUE;",
        // Catalog entries share the identifier allocator
        "DEFINE TABLE IF NOT EXISTS recipe SCHEMALESS;",
    ];

    for query in schema_queries {
        db.query(query).await?.check()?;
    }

    info!("Database schema ensured");
    Ok(())
}
