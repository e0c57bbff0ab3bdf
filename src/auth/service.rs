//! Registration and login.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::OnceCell;
use tracing::{debug, info, warn};
use validator::Validate;

use crate::allocator::IdAllocator;
use crate::auth::error::AuthError;
use crate::auth::password::PasswordHasher;
use crate::auth::token::{TokenCodec, TokenError};
use crate::config::LoginErrorPolicy;
use crate::model::{LoginRequest, Principal, RegisterRequest};
use crate::store::CredentialStore;
use crate::types::{Email, Namespace, PrincipalId, Username};

/// Token handed back by a successful login.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IssuedToken {
    pub token: String,
    pub token_type: String,
    /// Lifetime in seconds
    pub expires_in: i64,
}

/// Hashed once and verified against when a login names an unknown user, so
/// that path costs the same as a wrong password.
const DECOY_PASSWORD: &str = "decoy-password-for-unknown-users";

pub struct AuthService {
    store: Arc<dyn CredentialStore>,
    allocator: Arc<IdAllocator>,
    hasher: Arc<dyn PasswordHasher>,
    codec: Arc<TokenCodec>,
    login_errors: LoginErrorPolicy,
    decoy_hash: OnceCell<String>,
}

impl AuthService {
    pub fn new(
        store: Arc<dyn CredentialStore>,
        allocator: Arc<IdAllocator>,
        hasher: Arc<dyn PasswordHasher>,
        codec: Arc<TokenCodec>,
    ) -> Self {
        Self {
            store,
            allocator,
            hasher,
            codec,
            login_errors: LoginErrorPolicy::default(),
            decoy_hash: OnceCell::new(),
        }
    }

    pub fn with_login_errors(mut self, policy: LoginErrorPolicy) -> Self {
        self.login_errors = policy;
        self
    }

    /// Create a principal.
    ///
    /// Both uniqueness checks run before an identifier is allocated, so a
    /// rejected duplicate does not consume one. A failure after allocation
    /// leaves a gap in the `user` sequence.
    pub async fn register(&self, request: RegisterRequest) -> Result<Principal, AuthError> {
        request.validate()?;

        let username = Username::new(request.username.trim());
        let email = Email::new(request.email.trim());

        if self.store.exists_by_username(&username).await? {
            debug!(username = %username, "Registration rejected, username taken");
            return Err(AuthError::UsernameTaken);
        }
        if self.store.exists_by_email(&email).await? {
            debug!(username = %username, "Registration rejected, email taken");
            return Err(AuthError::EmailTaken);
        }

        let password_hash = self.hash_password(&request.password).await?;
        let id = self.allocator.next_id(&Namespace::user()).await?;

        let principal = Principal::new(
            PrincipalId::new(id),
            username,
            password_hash,
            email,
            request.role,
        );

        let saved = self.store.save(principal).await.map_err(|e| {
            warn!(error = %e, "Saving new principal failed");
            AuthError::from(e)
        })?;

        info!(
            id = %saved.id,
            username = %saved.username,
            roles = ?saved.role_list(),
            "Principal registered"
        );
        Ok(saved)
    }

    /// Verify credentials and mint a token carrying the principal's current
    /// roles.
    pub async fn login(&self, request: &LoginRequest) -> Result<IssuedToken, AuthError> {
        let username = Username::new(request.username.trim());

        let Some(principal) = self.store.find_by_username(&username).await? else {
            debug!(username = %username, "Login for unknown user");
            let decoy = self
                .decoy_hash
                .get_or_try_init(|| self.hash_password(DECOY_PASSWORD))
                .await?;
            self.verify_password(&request.password, decoy).await?;
            return Err(match self.login_errors {
                LoginErrorPolicy::Uniform => AuthError::BadCredentials,
                LoginErrorPolicy::Distinct => AuthError::UserNotFound,
            });
        };

        if !self
            .verify_password(&request.password, &principal.password_hash)
            .await?
        {
            debug!(username = %username, "Login with wrong password");
            return Err(AuthError::BadCredentials);
        }

        let issued = self.mint(&principal)?;
        info!(username = %principal.username, "Login succeeded");
        Ok(issued)
    }

    /// Mint a token for an existing principal without checking a password.
    pub async fn issue_for(&self, username: &Username) -> Result<IssuedToken, AuthError> {
        let principal = self
            .store
            .find_by_username(username)
            .await?
            .ok_or(AuthError::UserNotFound)?;
        self.mint(&principal)
    }

    /// Argon2 is CPU-bound; it runs on the blocking pool.
    async fn hash_password(&self, raw: &str) -> Result<String, AuthError> {
        let hasher = self.hasher.clone();
        let raw = raw.to_string();
        let hash = tokio::task::spawn_blocking(move || hasher.hash(&raw))
            .await
            .map_err(|e| AuthError::Internal(format!("Password hashing task failed: {}", e)))??;
        Ok(hash)
    }

    async fn verify_password(&self, raw: &str, hash: &str) -> Result<bool, AuthError> {
        let hasher = self.hasher.clone();
        let raw = raw.to_string();
        let hash = hash.to_string();
        tokio::task::spawn_blocking(move || hasher.verify(&raw, &hash))
            .await
            .map_err(|e| AuthError::Internal(format!("Password verification task failed: {}", e)))
    }

    fn mint(&self, principal: &Principal) -> Result<IssuedToken, AuthError> {
        let token = self
            .codec
            .issue_now(principal.username.as_str(), &principal.role_list())
            .map_err(|e: TokenError| AuthError::Internal(e.to_string()))?;

        Ok(IssuedToken {
            token,
            token_type: "Bearer".to_string(),
            expires_in: self.codec.expiration().num_seconds(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::password::{Argon2Hasher, PasswordError};
    use crate::config::TokenConfig;
    use crate::model::Role;
    use crate::store::testing::MemoryStore;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Reversible stand-in so tests don't pay for argon2.
    struct PlainHasher;

    impl PasswordHasher for PlainHasher {
        fn hash(&self, raw: &str) -> Result<String, PasswordError> {
            Ok(format!("plain:{}", raw))
        }

        fn verify(&self, raw: &str, hash: &str) -> bool {
            hash.strip_prefix("plain:") == Some(raw)
        }
    }

    /// Counts calls so tests can see which paths pay for a verify.
    #[derive(Default)]
    struct CountingHasher {
        hashes: AtomicUsize,
        verifies: AtomicUsize,
    }

    impl CountingHasher {
        fn hashes(&self) -> usize {
            self.hashes.load(Ordering::SeqCst)
        }

        fn verifies(&self) -> usize {
            self.verifies.load(Ordering::SeqCst)
        }
    }

    impl PasswordHasher for CountingHasher {
        fn hash(&self, raw: &str) -> Result<String, PasswordError> {
            self.hashes.fetch_add(1, Ordering::SeqCst);
            PlainHasher.hash(raw)
        }

        fn verify(&self, raw: &str, hash: &str) -> bool {
            self.verifies.fetch_add(1, Ordering::SeqCst);
            PlainHasher.verify(raw, hash)
        }
    }

    struct Fixture {
        service: AuthService,
        store: Arc<MemoryStore>,
        allocator: Arc<IdAllocator>,
        codec: Arc<TokenCodec>,
    }

    fn fixture_with(hasher: Arc<dyn PasswordHasher>) -> Fixture {
        let store = Arc::new(MemoryStore::default());
        let allocator = Arc::new(IdAllocator::new(store.clone()));
        let codec = Arc::new(
            TokenCodec::new(&TokenConfig {
                secret: "service-test-secret".to_string(),
                expiration_ms: 3_600_000,
            })
            .unwrap(),
        );
        let service = AuthService::new(store.clone(), allocator.clone(), hasher, codec.clone());
        Fixture {
            service,
            store,
            allocator,
            codec,
        }
    }

    fn fixture() -> Fixture {
        fixture_with(Arc::new(PlainHasher))
    }

    fn alice() -> RegisterRequest {
        RegisterRequest::new("alice", "a@x.com", "pw123456", Some(Role::Client))
    }

    fn login(username: &str, password: &str) -> LoginRequest {
        LoginRequest {
            username: username.to_string(),
            password: password.to_string(),
        }
    }

    #[tokio::test]
    async fn test_register_assigns_sequential_ids() {
        let f = fixture();

        let a = f.service.register(alice()).await.unwrap();
        let b = f
            .service
            .register(RegisterRequest::new("bob", "b@x.com", "pw123456", None))
            .await
            .unwrap();

        assert_eq!(a.id.as_str(), "1");
        assert_eq!(b.id.as_str(), "2");
        assert_eq!(f.store.len(), 2);
    }

    #[tokio::test]
    async fn test_register_defaults_role_to_client() {
        let f = fixture();
        let p = f
            .service
            .register(RegisterRequest::new("bob", "b@x.com", "pw123456", None))
            .await
            .unwrap();
        assert_eq!(p.role_list(), vec![Role::Client]);
    }

    #[tokio::test]
    async fn test_register_hashes_password() {
        let f = fixture();
        let p = f.service.register(alice()).await.unwrap();
        assert_ne!(p.password_hash, "pw123456");
        assert_eq!(f.store.get("alice").unwrap().password_hash, "plain:pw123456");
    }

    #[tokio::test]
    async fn test_duplicate_username_does_not_allocate() {
        let f = fixture();
        f.service.register(alice()).await.unwrap();
        let before = f.allocator.peek(&Namespace::user()).await;

        let err = f
            .service
            .register(RegisterRequest::new("alice", "other@x.com", "pw123456", None))
            .await
            .unwrap_err();

        assert_eq!(err, AuthError::UsernameTaken);
        assert_eq!(f.allocator.peek(&Namespace::user()).await, before);
        assert_eq!(before, Some(1));
    }

    #[tokio::test]
    async fn test_duplicate_email_is_rejected() {
        let f = fixture();
        f.service.register(alice()).await.unwrap();

        let err = f
            .service
            .register(RegisterRequest::new("alice2", "a@x.com", "pw123456", None))
            .await
            .unwrap_err();
        assert_eq!(err, AuthError::EmailTaken);
        assert_eq!(f.allocator.peek(&Namespace::user()).await, Some(1));
    }

    #[tokio::test]
    async fn test_invalid_payload_is_rejected_before_io() {
        let f = fixture();
        let err = f
            .service
            .register(RegisterRequest::new("alice", "a@x.com", "short", None))
            .await
            .unwrap_err();

        assert_eq!(err.code(), "INVALID_REQUEST");
        assert_eq!(f.store.calls(), 0);
    }

    #[tokio::test]
    async fn test_register_with_store_down() {
        let f = fixture();
        f.store.set_unavailable(true);

        let err = f.service.register(alice()).await.unwrap_err();
        assert_eq!(err.code(), "STORE_UNAVAILABLE");
        assert_eq!(f.allocator.peek(&Namespace::user()).await, None);
    }

    #[tokio::test]
    async fn test_login_issues_token_with_current_roles() {
        let f = fixture();
        f.service
            .register(RegisterRequest::new("root", "r@x.com", "pw123456", Some(Role::Admin)))
            .await
            .unwrap();

        let issued = f.service.login(&login("root", "pw123456")).await.unwrap();
        assert_eq!(issued.token_type, "Bearer");
        assert_eq!(issued.expires_in, 3600);

        let claims = f.codec.parse(&issued.token).unwrap();
        assert_eq!(claims.sub, "root");
        assert_eq!(claims.roles, vec![Role::Admin]);
    }

    #[tokio::test]
    async fn test_login_failures_are_uniform_by_default() {
        let f = fixture();
        f.service.register(alice()).await.unwrap();

        let wrong_password = f.service.login(&login("alice", "nope1234")).await.unwrap_err();
        let unknown_user = f.service.login(&login("mallory", "pw123456")).await.unwrap_err();

        assert_eq!(wrong_password, AuthError::BadCredentials);
        assert_eq!(unknown_user, AuthError::BadCredentials);
    }

    #[tokio::test]
    async fn test_unknown_user_pays_for_one_verify() {
        let hasher = Arc::new(CountingHasher::default());
        let f = fixture_with(hasher.clone());
        f.service.register(alice()).await.unwrap();
        assert_eq!(hasher.hashes(), 1);

        let err = f.service.login(&login("mallory", "pw123456")).await.unwrap_err();
        assert_eq!(err, AuthError::BadCredentials);
        assert_eq!(hasher.verifies(), 1);

        // The decoy hash is computed once and reused.
        f.service.login(&login("mallory", "pw123456")).await.unwrap_err();
        assert_eq!(hasher.verifies(), 2);
        assert_eq!(hasher.hashes(), 2);

        f.service.login(&login("alice", "nope1234")).await.unwrap_err();
        assert_eq!(hasher.verifies(), 3);
    }

    #[tokio::test]
    async fn test_decoy_hash_never_matches_a_login() {
        let f = fixture();
        let err = f
            .service
            .login(&login("mallory", DECOY_PASSWORD))
            .await
            .unwrap_err();
        assert_eq!(err, AuthError::BadCredentials);
    }

    #[tokio::test]
    async fn test_login_distinct_errors() {
        let f = fixture();
        let service = f.service.with_login_errors(LoginErrorPolicy::Distinct);

        let err = service.login(&login("mallory", "pw123456")).await.unwrap_err();
        assert_eq!(err, AuthError::UserNotFound);
    }

    #[tokio::test]
    async fn test_issue_for_existing_user() {
        let f = fixture();
        f.service.register(alice()).await.unwrap();

        let issued = f.service.issue_for(&Username::new("alice")).await.unwrap();
        assert_eq!(f.codec.parse(&issued.token).unwrap().sub, "alice");

        let err = f.service.issue_for(&Username::new("ghost")).await.unwrap_err();
        assert_eq!(err, AuthError::UserNotFound);
    }

    #[tokio::test]
    async fn test_register_and_login_with_argon2() {
        let f = fixture_with(Arc::new(Argon2Hasher::new()));
        f.service.register(alice()).await.unwrap();

        assert!(f.service.login(&login("alice", "pw123456")).await.is_ok());
        assert_eq!(
            f.service.login(&login("alice", "pw1234567")).await.unwrap_err(),
            AuthError::BadCredentials
        );
    }

    #[tokio::test]
    async fn test_allocator_seeds_from_existing_principals() {
        let f = fixture();
        f.store.put(Principal::new(
            PrincipalId::new("41"),
            Username::new("legacy"),
            "plain:pw123456".to_string(),
            Email::new("l@x.com"),
            [Role::Client],
        ));

        let p = f.service.register(alice()).await.unwrap();
        assert_eq!(p.id.as_str(), "42");
    }
}
