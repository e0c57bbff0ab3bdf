//! Authentication and authorization.
//!
//! - [`TokenCodec`] signs and verifies stateless HS512 bearer tokens
//! - [`AuthService`] registers principals and exchanges credentials for tokens
//! - [`AccessGate`] runs per request: it classifies the route against the
//!   [`AccessPolicy`], verifies the bearer token and attaches an
//!   [`AuthContext`] carrying the principal's current roles
//!
//! ## Usage
//!
//! ```ignore
//! let gate = Arc::new(AccessGate::new(codec, store, Arc::new(AccessPolicy::catalog())));
//!
//! let app = Router::new()
//!     .route("/api/me", get(me))
//!     .layer(axum::middleware::from_fn_with_state(gate, access_gate));
//!
//! async fn me(CurrentUser(ctx): CurrentUser) -> String {
//!     ctx.username().to_string()
//! }
//! ```

mod context;
mod error;
mod gate;
mod password;
mod policy;
mod service;
mod token;

pub use context::{AuthContext, CurrentUser, MaybeUser, is_authenticated, require_role};
pub use error::AuthError;
pub use gate::{AccessGate, Decision, access_gate, bearer_token};
pub use password::{Argon2Hasher, PasswordError, PasswordHasher};
pub use policy::{
    Access, AccessPolicy, PathPattern, PublicRule, RequestPath, RoleRequirement, RoleRule,
};
pub use service::{AuthService, IssuedToken};
pub use token::{TokenClaims, TokenCodec, TokenError};
