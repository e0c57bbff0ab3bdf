//! SurrealDB-backed credential store.
//!
//! Principals live in the `user` table keyed by their allocated identifier.
//! Every call is bounded by the configured query timeout; a call that runs
//! past it surfaces as [`StoreError::Timeout`].

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::{error, warn};

use crate::db::Db;
use crate::model::{Principal, Role};
use crate::store::{CredentialStore, IdSource, StoreError};
use crate::types::{Email, Namespace, PrincipalId, Username};

/// Row shape of the `user` table with the record key flattened to a string.
#[derive(Debug, Deserialize)]
struct PrincipalRow {
    id: String,
    username: String,
    email: String,
    password_hash: String,
    #[serde(default)]
    roles: Vec<String>,
}

impl PrincipalRow {
    fn into_principal(self) -> Principal {
        let roles: Vec<Role> = self
            .roles
            .iter()
            .filter_map(|name| {
                let role = Role::parse(name);
                if role.is_none() {
                    warn!(username = %self.username, role = %name, "Ignoring unknown stored role");
                }
                role
            })
            .collect();

        Principal::new(
            PrincipalId::new(self.id),
            Username::new(self.username),
            self.password_hash,
            Email::new(self.email),
            roles,
        )
    }
}

const SELECT_PRINCIPAL: &str = r#"
    SELECT <string> meta::id(id) AS id, username, email, password_hash, roles
    FROM user
    WHERE username = $username
    LIMIT 1
"#;

pub struct SurrealCredentialStore {
    db: Db,
    timeout: Duration,
}

impl SurrealCredentialStore {
    pub fn new(db: Db, timeout: Duration) -> Self {
        Self { db, timeout }
    }

    pub fn db(&self) -> &Db {
        &self.db
    }

    async fn exists(
        &self,
        operation: &'static str,
        field: &'static str,
        value: String,
    ) -> Result<bool, StoreError> {
        let query = format!(
            "SELECT VALUE <string> meta::id(id) FROM user WHERE {} = $value LIMIT 1",
            field
        );
        let ids: Vec<String> = bounded(operation, self.timeout, async {
            let mut res = self.db.query(query).bind(("value", value)).await?.check()?;
            res.take(0)
        })
        .await?;
        Ok(!ids.is_empty())
    }
}

#[async_trait]
impl CredentialStore for SurrealCredentialStore {
    async fn find_by_username(&self, username: &Username) -> Result<Option<Principal>, StoreError> {
        let username = username.to_string();
        let rows: Vec<PrincipalRow> = bounded("find_by_username", self.timeout, async {
            let mut res = self
                .db
                .query(SELECT_PRINCIPAL)
                .bind(("username", username))
                .await?
                .check()?;
            res.take(0)
        })
        .await?;

        Ok(rows.into_iter().next().map(PrincipalRow::into_principal))
    }

    async fn exists_by_username(&self, username: &Username) -> Result<bool, StoreError> {
        self.exists("exists_by_username", "username", username.to_string())
            .await
    }

    async fn exists_by_email(&self, email: &Email) -> Result<bool, StoreError> {
        self.exists("exists_by_email", "email", email.to_string()).await
    }

    async fn save(&self, principal: Principal) -> Result<Principal, StoreError> {
        let query = r#"
            CREATE type::thing('user', $id) CONTENT {
                username: $username,
                email: $email,
                password_hash: $password_hash,
                roles: $roles
            } RETURN NONE
        "#;

        let roles: Vec<String> = principal
            .roles()
            .iter()
            .map(|r| r.as_str().to_string())
            .collect();

        bounded("save", self.timeout, async {
            self.db
                .query(query)
                .bind(("id", principal.id.to_string()))
                .bind(("username", principal.username.to_string()))
                .bind(("email", principal.email.to_string()))
                .bind(("password_hash", principal.password_hash.clone()))
                .bind(("roles", roles))
                .await?
                .check()?;
            Ok::<(), surrealdb::Error>(())
        })
        .await?;

        Ok(principal)
    }
}

#[async_trait]
impl IdSource for SurrealCredentialStore {
    async fn scan_ids(&self, namespace: &Namespace) -> Result<Vec<String>, StoreError> {
        let table = namespace.to_string();
        bounded("scan_ids", self.timeout, async {
            let mut res = self
                .db
                .query("SELECT VALUE <string> meta::id(id) FROM type::table($table)")
                .bind(("table", table))
                .await?
                .check()?;
            res.take(0)
        })
        .await
    }
}

/// Run a store query under a time budget.
async fn bounded<T, F>(operation: &'static str, after: Duration, query: F) -> Result<T, StoreError>
where
    F: Future<Output = Result<T, surrealdb::Error>>,
{
    match tokio::time::timeout(after, query).await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(e)) => Err(classify(operation, e)),
        Err(_) => {
            error!(operation, ?after, "Store query timed out");
            Err(StoreError::Timeout { operation, after })
        }
    }
}

fn classify(operation: &'static str, err: surrealdb::Error) -> StoreError {
    let message = err.to_string();
    if message.contains("user_username") {
        StoreError::Duplicate("username".to_string())
    } else if message.contains("user_email") {
        StoreError::Duplicate("email".to_string())
    } else if message.contains("already exists") {
        StoreError::Duplicate("id".to_string())
    } else {
        error!(operation, error = %message, "Store query failed");
        StoreError::Unavailable(message)
    }
}
