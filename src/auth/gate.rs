//! Per-request authorization.
//!
//! Every inbound request walks the same stages:
//!
//! 1. classify `(method, path)` against the [`AccessPolicy`]
//! 2. public routes are forwarded anonymously, without reading the token
//! 3. protected routes need `Authorization: Bearer <token>`; any other
//!    header shape counts as no token
//! 4. the token is verified and its subject loaded from the credential store,
//!    whose current roles are authoritative
//! 5. the roles are checked against the route's requirement
//!
//! Token roles only matter in degraded mode, when the store cannot be read
//! and `allow_degraded_roles` is set.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    extract::{ConnectInfo, Request, State},
    http::{Method, header},
    middleware::Next,
    response::Response,
};
use tracing::{debug, error, info, warn};

use crate::auth::context::AuthContext;
use crate::auth::error::AuthError;
use crate::auth::policy::{Access, AccessPolicy};
use crate::auth::token::TokenCodec;
use crate::model::Role;
use crate::store::CredentialStore;
use crate::types::Username;

/// Outcome of a successful authorization.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    /// Public route; no principal attached.
    Anonymous,
    Authenticated(AuthContext),
}

/// Authorization middleware state.
pub struct AccessGate {
    codec: Arc<TokenCodec>,
    store: Arc<dyn CredentialStore>,
    policy: Arc<AccessPolicy>,
    allow_degraded_roles: bool,
}

impl AccessGate {
    pub fn new(
        codec: Arc<TokenCodec>,
        store: Arc<dyn CredentialStore>,
        policy: Arc<AccessPolicy>,
    ) -> Self {
        Self {
            codec,
            store,
            policy,
            allow_degraded_roles: false,
        }
    }

    /// Accept token-embedded roles when the credential store is unreachable.
    pub fn with_degraded_roles(mut self, allow: bool) -> Self {
        self.allow_degraded_roles = allow;
        self
    }

    pub fn policy(&self) -> &AccessPolicy {
        &self.policy
    }

    /// Decide whether a request may proceed.
    pub async fn authorize(
        &self,
        method: &Method,
        path: &str,
        authorization: Option<&str>,
    ) -> Result<Decision, AuthError> {
        let requirement = match self.policy.classify(method, path) {
            Access::Public => {
                debug!(%method, path, "Public route, skipping authentication");
                return Ok(Decision::Anonymous);
            }
            Access::Protected(requirement) => requirement,
        };

        let Some(token) = bearer_token(authorization) else {
            debug!(%method, path, "No bearer token on protected route");
            return Err(AuthError::Unauthenticated(None));
        };

        let claims = self.codec.parse(token).map_err(|e| {
            debug!(%method, path, reason = e.code(), "Token rejected");
            AuthError::Unauthenticated(Some(e))
        })?;

        let context = self.load_context(&claims.sub, &claims.roles).await?;

        if !requirement.is_satisfied_by(context.roles()) {
            warn!(
                %method,
                path,
                subject = %context.username(),
                required = %requirement,
                "Insufficient role"
            );
            return Err(AuthError::Forbidden);
        }

        debug!(%method, path, subject = %context.username(), "Principal attached");
        Ok(Decision::Authenticated(context))
    }

    async fn load_context(
        &self,
        subject: &str,
        token_roles: &[Role],
    ) -> Result<AuthContext, AuthError> {
        let username = Username::new(subject);

        match self.store.find_by_username(&username).await {
            Ok(Some(principal)) => Ok(AuthContext::from_principal(&principal)),
            Ok(None) => {
                debug!(subject, "Token subject no longer exists");
                Err(AuthError::Unauthenticated(None))
            }
            Err(e) if self.allow_degraded_roles => {
                warn!(subject, error = %e, "Credential store unavailable, using token roles");
                Ok(AuthContext::degraded(username, token_roles.iter().copied()))
            }
            Err(e) => {
                error!(subject, error = %e, "Credential store unavailable during authorization");
                Err(AuthError::StoreUnavailable(e.to_string()))
            }
        }
    }
}

/// Token part of a `Bearer` authorization header.
pub fn bearer_token(authorization: Option<&str>) -> Option<&str> {
    authorization?
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|token| !token.is_empty())
}

/// axum middleware running [`AccessGate::authorize`] and attaching the
/// resulting [`AuthContext`] to the request extensions.
///
/// Denials and attachments are logged with the client address and user agent.
pub async fn access_gate(
    State(gate): State<Arc<AccessGate>>,
    mut request: Request,
    next: Next,
) -> Result<Response, AuthError> {
    // Request is not Sync; nothing borrowed from it may cross the await.
    let method = request.method().clone();
    let path = request.uri().path().to_string();
    let authorization = header_value(&request, header::AUTHORIZATION);
    let user_agent = header_value(&request, header::USER_AGENT);
    let ip_address = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip().to_string());

    let decision = match gate.authorize(&method, &path, authorization.as_deref()).await {
        Ok(decision) => decision,
        Err(e) => {
            info!(
                %method,
                path,
                code = e.code(),
                ip = ip_address.as_deref().unwrap_or("-"),
                user_agent = user_agent.as_deref().unwrap_or("-"),
                "Request denied"
            );
            return Err(e);
        }
    };

    if let Decision::Authenticated(context) = decision {
        let context = context.with_client_info(ip_address, user_agent);
        info!(
            %method,
            path,
            subject = %context.username(),
            degraded = context.is_degraded(),
            ip = context.ip_address().unwrap_or("-"),
            user_agent = context.user_agent().unwrap_or("-"),
            "Request authorized"
        );
        request.extensions_mut().insert(context);
    }

    Ok(next.run(request).await)
}

fn header_value(request: &Request, name: header::HeaderName) -> Option<String> {
    request
        .headers()
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
}
