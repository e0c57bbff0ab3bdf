//! Collaborator interfaces consumed by the identity subsystem.
//!
//! The catalog's persistence layer lives outside this crate. These traits are
//! the only surface the subsystem needs from it; `crate::db` ships a SurrealDB
//! implementation.

use async_trait::async_trait;
use std::fmt;
use std::time::Duration;

use crate::model::Principal;
use crate::types::{Email, Namespace, Username};

/// Failures reported by a storage collaborator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// The store could not be reached or the query failed.
    Unavailable(String),
    /// The store did not answer within its time budget.
    Timeout { operation: &'static str, after: Duration },
    /// A unique field (`username`, `email`, `id`) already holds the value.
    Duplicate(String),
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unavailable(msg) => write!(f, "Store unavailable: {}", msg),
            Self::Timeout { operation, after } => {
                write!(f, "Store timed out after {:?} during {}", after, operation)
            }
            Self::Duplicate(field) => write!(f, "Duplicate value for unique field: {}", field),
        }
    }
}

impl std::error::Error for StoreError {}

/// Lookup and persistence of principals.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    async fn find_by_username(&self, username: &Username) -> Result<Option<Principal>, StoreError>;

    async fn exists_by_username(&self, username: &Username) -> Result<bool, StoreError>;

    async fn exists_by_email(&self, email: &Email) -> Result<bool, StoreError>;

    async fn save(&self, principal: Principal) -> Result<Principal, StoreError>;
}

/// Enumerates the identifiers already stored in a namespace.
#[async_trait]
pub trait IdSource: Send + Sync {
    async fn scan_ids(&self, namespace: &Namespace) -> Result<Vec<String>, StoreError>;
}
