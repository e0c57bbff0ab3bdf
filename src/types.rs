//! NewType wrappers for strong typing across the identity subsystem.
//!
//! These types prevent accidental mixing of semantically different strings
//! (e.g., passing an email where a username is expected).

use serde::{Deserialize, Serialize};
use std::fmt;

/// Macro to generate a NewType wrapper with standard trait implementations.
macro_rules! newtype_string {
    (
        $(#[$meta:meta])*
        $name:ident
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Create a new instance.
            pub fn new(value: impl Into<String>) -> Self {
                Self(value.into())
            }

            /// Get the inner value as a string slice.
            pub fn as_str(&self) -> &str {
                &self.0
            }

            /// Consume and return the inner String.
            pub fn into_inner(self) -> String {
                self.0
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_string())
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl std::borrow::Borrow<str> for $name {
            fn borrow(&self) -> &str {
                &self.0
            }
        }
    };
}

newtype_string!(
    /// Login name of a principal. Unique across the credential store.
    ///
    /// This is also the `sub` claim of every token minted for the principal.
    Username
);

newtype_string!(
    /// Email address of a principal. Unique across the credential store.
    Email
);

newtype_string!(
    /// Storage identifier of a principal (e.g., "42").
    ///
    /// Freshly registered principals always get a decimal identifier from the
    /// allocator, but legacy records may carry arbitrary strings.
    PrincipalId
);

newtype_string!(
    /// Logical entity category with its own identifier sequence.
    ///
    /// Each namespace maps to one storage table (e.g., "user", "recipe").
    Namespace
);

impl Namespace {
    /// Namespace of registered principals.
    pub const USER: &'static str = "user";
    /// Namespace of catalog recipes.
    pub const RECIPE: &'static str = "recipe";

    pub fn user() -> Self {
        Self::new(Self::USER)
    }

    pub fn recipe() -> Self {
        Self::new(Self::RECIPE)
    }
}

impl From<u64> for PrincipalId {
    fn from(id: u64) -> Self {
        Self(id.to_string())
    }
}
