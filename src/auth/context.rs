//! Request-scoped identity.

use std::collections::BTreeSet;

use axum::{extract::FromRequestParts, http::request::Parts};
use serde::Serialize;

use crate::auth::error::AuthError;
use crate::model::{Principal, Role};
use crate::types::{PrincipalId, Username};

/// Identity attached to a request by the access gate.
///
/// Immutable once created and owned by the request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AuthContext {
    /// `None` only in degraded mode, where the store could not be read
    principal_id: Option<PrincipalId>,
    username: Username,
    roles: BTreeSet<Role>,
    /// Roles came from the token rather than the credential store
    degraded: bool,
    ip_address: Option<String>,
    user_agent: Option<String>,
}

impl AuthContext {
    /// Context backed by the store's current view of the principal.
    pub fn from_principal(principal: &Principal) -> Self {
        Self {
            principal_id: Some(principal.id.clone()),
            username: principal.username.clone(),
            roles: principal.roles().clone(),
            degraded: false,
            ip_address: None,
            user_agent: None,
        }
    }

    /// Context built from token claims alone, used when the store is down.
    pub fn degraded(username: Username, roles: impl IntoIterator<Item = Role>) -> Self {
        Self {
            principal_id: None,
            username,
            roles: roles.into_iter().collect(),
            degraded: true,
            ip_address: None,
            user_agent: None,
        }
    }

    /// Set client metadata for audit logging.
    pub fn with_client_info(
        mut self,
        ip_address: Option<String>,
        user_agent: Option<String>,
    ) -> Self {
        self.ip_address = ip_address;
        self.user_agent = user_agent;
        self
    }

    pub fn principal_id(&self) -> Option<&PrincipalId> {
        self.principal_id.as_ref()
    }

    pub fn username(&self) -> &Username {
        &self.username
    }

    pub fn roles(&self) -> &BTreeSet<Role> {
        &self.roles
    }

    pub fn has_role(&self, role: Role) -> bool {
        self.roles.contains(&role)
    }

    pub fn is_degraded(&self) -> bool {
        self.degraded
    }

    pub fn ip_address(&self) -> Option<&str> {
        self.ip_address.as_deref()
    }

    pub fn user_agent(&self) -> Option<&str> {
        self.user_agent.as_deref()
    }
}

/// Whether a principal is attached to the current request.
pub fn is_authenticated(context: Option<&AuthContext>) -> bool {
    context.is_some()
}

/// Fail with `ACCESS_DENIED` unless the attached principal holds `role`.
pub fn require_role(context: Option<&AuthContext>, role: Role) -> Result<(), AuthError> {
    match context {
        Some(ctx) if ctx.has_role(role) => Ok(()),
        _ => Err(AuthError::AccessDenied),
    }
}

/// Handler extractor for the attached principal.
///
/// Rejects with `UNAUTHENTICATED` when the gate forwarded the request
/// anonymously.
#[derive(Debug, Clone)]
pub struct CurrentUser(pub AuthContext);

impl<S> FromRequestParts<S> for CurrentUser
where
    S: Send + Sync,
{
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<AuthContext>()
            .cloned()
            .map(CurrentUser)
            .ok_or(AuthError::Unauthenticated(None))
    }
}

/// Like [`CurrentUser`] but never rejects.
#[derive(Debug, Clone)]
pub struct MaybeUser(pub Option<AuthContext>);

impl<S> FromRequestParts<S> for MaybeUser
where
    S: Send + Sync,
{
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(MaybeUser(parts.extensions.get::<AuthContext>().cloned()))
    }
}
