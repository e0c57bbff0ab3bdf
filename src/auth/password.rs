//! Password hashing.
//!
//! Argon2id with a random salt per hash, stored in PHC string format.

use std::fmt;

use argon2::{
    Argon2,
    password_hash::{
        PasswordHash, PasswordHasher as _, PasswordVerifier, SaltString, rand_core::OsRng,
    },
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PasswordError {
    HashingFailed(String),
}

impl fmt::Display for PasswordError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::HashingFailed(msg) => write!(f, "Password hashing failed: {}", msg),
        }
    }
}

impl std::error::Error for PasswordError {}

/// One-way password hashing collaborator.
pub trait PasswordHasher: Send + Sync {
    fn hash(&self, raw: &str) -> Result<String, PasswordError>;

    /// `false` for a wrong password and for an unparseable stored hash.
    fn verify(&self, raw: &str, hash: &str) -> bool;
}

#[derive(Default)]
pub struct Argon2Hasher {
    argon2: Argon2<'static>,
}

impl Argon2Hasher {
    pub fn new() -> Self {
        Self::default()
    }
}

impl PasswordHasher for Argon2Hasher {
    fn hash(&self, raw: &str) -> Result<String, PasswordError> {
        let salt = SaltString::generate(&mut OsRng);
        self.argon2
            .hash_password(raw.as_bytes(), &salt)
            .map(|hash| hash.to_string())
            .map_err(|e| PasswordError::HashingFailed(e.to_string()))
    }

    fn verify(&self, raw: &str, hash: &str) -> bool {
        let Ok(parsed) = PasswordHash::new(hash) else {
            return false;
        };
        self.argon2.verify_password(raw.as_bytes(), &parsed).is_ok()
    }
}
