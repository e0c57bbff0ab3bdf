// Core modules
pub mod allocator;
pub mod api;
pub mod auth;
pub mod clock;
pub mod config;
pub mod db;
pub mod model;
pub mod store;
pub mod types;

// Re-export key types and functions
pub use allocator::{AllocatorError, IdAllocator};
pub use api::{AppState, create_router};
pub use auth::{AccessGate, AccessPolicy, AuthError, AuthService, TokenCodec};
pub use config::{AppConfig, AuthConfig, LoginErrorPolicy, TokenConfig};
pub use db::{DatabaseConfig, SurrealCredentialStore, create_connection, ensure_schema};
pub use model::{Principal, Role};
pub use store::{CredentialStore, IdSource, StoreError};

use anyhow::Result;
use axum::Router;
use std::sync::Arc;
use tracing::info;

use auth::Argon2Hasher;

/// Wire the store, allocator, codec, service and gate from configuration.
pub async fn create_state(config: &AppConfig) -> Result<AppState> {
    let db = create_connection(config.database.clone()).await?;
    ensure_schema(&db).await?;

    let store = Arc::new(SurrealCredentialStore::new(
        db,
        config.database.query_timeout(),
    ));
    let codec = Arc::new(TokenCodec::new(&config.token)?);
    let policy = Arc::new(config.auth.load_policy()?);
    let allocator = Arc::new(IdAllocator::new(store.clone()));

    let service = AuthService::new(
        store.clone(),
        allocator,
        Arc::new(Argon2Hasher::new()),
        codec.clone(),
    )
    .with_login_errors(config.auth.login_errors);

    let gate = AccessGate::new(codec, store, policy)
        .with_degraded_roles(config.auth.allow_degraded_roles);

    info!(
        public_rules = gate.policy().public.len(),
        role_rules = gate.policy().roles.len(),
        degraded_roles = config.auth.allow_degraded_roles,
        "Identity subsystem ready"
    );

    Ok(AppState {
        service: Arc::new(service),
        gate: Arc::new(gate),
    })
}

/// Convenience function to create the fully configured HTTP application.
pub async fn create_app(config: &AppConfig) -> Result<Router> {
    Ok(create_router(create_state(config).await?))
}
