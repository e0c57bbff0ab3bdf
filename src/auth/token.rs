//! Signed bearer tokens.
//!
//! Tokens are compact JWS strings signed with HS512 over a shared secret and
//! carry `{sub, roles, iat, exp}`. Nothing is stored server-side: a token with
//! a valid signature and an `exp` strictly after "now" is accepted.

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};

use crate::clock::{Clock, SystemClock};
use crate::config::TokenConfig;
use crate::model::Role;

const ALGORITHM: Algorithm = Algorithm::HS512;

/// Token claims.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenClaims {
    /// Subject (username)
    pub sub: String,
    /// Roles held when the token was issued
    pub roles: Vec<Role>,
    /// Issued at (Unix seconds)
    pub iat: i64,
    /// Expiration (Unix seconds)
    pub exp: i64,
}

/// Token codec errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenError {
    /// Not a structurally valid token for this codec.
    Malformed(String),
    /// Signature does not verify against the configured secret.
    InvalidSignature,
    /// `exp` is not in the future.
    Expired,
    /// Signing failed: a misconfigured secret, or an expiry past the
    /// representable calendar.
    Signing(String),
}

impl TokenError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::Malformed(_) => "MALFORMED_TOKEN",
            Self::InvalidSignature => "INVALID_SIGNATURE",
            Self::Expired => "EXPIRED_TOKEN",
            Self::Signing(_) => "TOKEN_SIGNING_FAILED",
        }
    }
}

impl fmt::Display for TokenError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Malformed(msg) => write!(f, "Malformed token: {}", msg),
            Self::InvalidSignature => write!(f, "Token signature is invalid"),
            Self::Expired => write!(f, "Token has expired"),
            Self::Signing(msg) => write!(f, "Token signing failed: {}", msg),
        }
    }
}

impl std::error::Error for TokenError {}

impl From<jsonwebtoken::errors::Error> for TokenError {
    fn from(err: jsonwebtoken::errors::Error) -> Self {
        match err.kind() {
            ErrorKind::InvalidSignature => Self::InvalidSignature,
            ErrorKind::ExpiredSignature => Self::Expired,
            _ => Self::Malformed(err.to_string()),
        }
    }
}

/// Issues and verifies tokens. Stateless and safe to share across requests.
pub struct TokenCodec {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    validation: Validation,
    expiration: Duration,
    clock: Arc<dyn Clock>,
}

impl TokenCodec {
    /// Create a codec on the system clock.
    pub fn new(config: &TokenConfig) -> anyhow::Result<Self> {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    pub fn with_clock(config: &TokenConfig, clock: Arc<dyn Clock>) -> anyhow::Result<Self> {
        config.validate()?;

        let secret = config.secret.as_bytes();

        // Expiry is checked against our own clock, with no leeway.
        let mut validation = Validation::new(ALGORITHM);
        validation.validate_exp = false;
        validation.validate_nbf = false;
        validation.leeway = 0;
        validation.set_required_spec_claims(&["sub", "exp", "iat"]);

        Ok(Self {
            encoding_key: EncodingKey::from_secret(secret),
            decoding_key: DecodingKey::from_secret(secret),
            validation,
            expiration: config.expiration(),
            clock,
        })
    }

    /// Lifetime of newly issued tokens.
    pub fn expiration(&self) -> Duration {
        self.expiration
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    /// Sign a token for `subject` holding `roles`, issued at `now`.
    pub fn issue(
        &self,
        subject: &str,
        roles: &[Role],
        now: DateTime<Utc>,
    ) -> Result<String, TokenError> {
        let expires_at = now.checked_add_signed(self.expiration).ok_or_else(|| {
            TokenError::Signing(format!("expiry overflows the calendar at {}", now))
        })?;

        let claims = TokenClaims {
            sub: subject.to_string(),
            roles: roles.to_vec(),
            iat: now.timestamp(),
            exp: expires_at.timestamp(),
        };

        encode(&Header::new(ALGORITHM), &claims, &self.encoding_key)
            .map_err(|e| TokenError::Signing(e.to_string()))
    }

    /// Sign a token issued at the codec clock's current time.
    pub fn issue_now(&self, subject: &str, roles: &[Role]) -> Result<String, TokenError> {
        self.issue(subject, roles, self.clock.now())
    }

    /// Verify `token` and return its claims.
    pub fn parse(&self, token: &str) -> Result<TokenClaims, TokenError> {
        self.parse_at(token, self.clock.now())
    }

    /// Verify `token` as of `now`.
    pub fn parse_at(&self, token: &str, now: DateTime<Utc>) -> Result<TokenClaims, TokenError> {
        let data = decode::<TokenClaims>(token, &self.decoding_key, &self.validation)?;
        let claims = data.claims;

        if claims.sub.is_empty() {
            return Err(TokenError::Malformed("empty subject".to_string()));
        }

        if claims.exp <= now.timestamp() {
            return Err(TokenError::Expired);
        }

        Ok(claims)
    }

    pub fn is_valid(&self, token: &str) -> bool {
        self.parse(token).is_ok()
    }
}
