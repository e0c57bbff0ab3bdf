use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use validator::{Validate, ValidationError};

use crate::types::{Email, PrincipalId, Username};

/// Capability granted to a principal.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "UPPERCASE")]
pub enum Role {
    #[default]
    Client,
    Admin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Client => "CLIENT",
            Role::Admin => "ADMIN",
        }
    }

    /// Parse a role name, case-insensitively.
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "CLIENT" => Some(Role::Client),
            "ADMIN" => Some(Role::Admin),
            _ => None,
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An authenticated identity record.
///
/// The role set is never empty; a principal constructed without roles holds
/// `CLIENT`.
#[derive(Clone, PartialEq, Eq)]
pub struct Principal {
    pub id: PrincipalId,
    pub username: Username,
    pub password_hash: String,
    pub email: Email,
    roles: BTreeSet<Role>,
}

impl Principal {
    pub fn new(
        id: PrincipalId,
        username: Username,
        password_hash: String,
        email: Email,
        roles: impl IntoIterator<Item = Role>,
    ) -> Self {
        let mut roles: BTreeSet<Role> = roles.into_iter().collect();
        if roles.is_empty() {
            roles.insert(Role::Client);
        }
        Self {
            id,
            username,
            password_hash,
            email,
            roles,
        }
    }

    pub fn roles(&self) -> &BTreeSet<Role> {
        &self.roles
    }

    pub fn role_list(&self) -> Vec<Role> {
        self.roles.iter().copied().collect()
    }

    pub fn has_role(&self, role: Role) -> bool {
        self.roles.contains(&role)
    }

    /// Public projection without the password hash.
    pub fn view(&self) -> PrincipalView {
        PrincipalView {
            id: self.id.clone(),
            username: self.username.clone(),
            email: self.email.clone(),
            roles: self.role_list(),
        }
    }
}

// The password hash stays out of logs.
impl fmt::Debug for Principal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Principal")
            .field("id", &self.id)
            .field("username", &self.username)
            .field("email", &self.email)
            .field("roles", &self.roles)
            .finish_non_exhaustive()
    }
}

/// Principal as returned to API callers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrincipalView {
    pub id: PrincipalId,
    pub username: Username,
    pub email: Email,
    pub roles: Vec<Role>,
}

/// Registration payload.
#[derive(Clone, Deserialize, Validate)]
pub struct RegisterRequest {
    #[validate(custom(function = "non_blank"))]
    pub username: String,
    #[validate(email(message = "must be a valid email address"))]
    pub email: String,
    #[validate(length(min = 6, message = "must be at least 6 characters"))]
    pub password: String,
    #[serde(default)]
    pub role: Option<Role>,
}

impl RegisterRequest {
    pub fn new(
        username: impl Into<String>,
        email: impl Into<String>,
        password: impl Into<String>,
        role: Option<Role>,
    ) -> Self {
        Self {
            username: username.into(),
            email: email.into(),
            password: password.into(),
            role,
        }
    }
}

/// Login payload.
#[derive(Clone, Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

fn non_blank(value: &str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        let mut err = ValidationError::new("blank");
        err.message = Some("must not be blank".into());
        return Err(err);
    }
    Ok(())
}
