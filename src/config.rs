use serde::Deserialize;
use std::{env, fmt, fs, path::PathBuf, str::FromStr};

use crate::auth::AccessPolicy;
use crate::db::DatabaseConfig;

/// Default token lifetime: 24 hours.
pub const DEFAULT_EXPIRATION_MS: u64 = 86_400_000;

/// Longest accepted token lifetime: 100 years.
pub const MAX_EXPIRATION_MS: u64 = 100 * 365 * DEFAULT_EXPIRATION_MS;

/// Signing secret and lifetime for bearer tokens.
#[derive(Clone, Deserialize)]
pub struct TokenConfig {
    pub secret: String,
    #[serde(default = "default_expiration_ms")]
    pub expiration_ms: u64,
}

fn default_expiration_ms() -> u64 {
    DEFAULT_EXPIRATION_MS
}

impl TokenConfig {
    /// Read `JWT_SECRET` (required) and `JWT_EXPIRATION_MS`.
    pub fn from_env() -> anyhow::Result<Self> {
        let secret = env::var("JWT_SECRET")
            .map_err(|_| anyhow::anyhow!("JWT_SECRET must be set"))?;

        let expiration_ms = match env::var("JWT_EXPIRATION_MS") {
            Ok(raw) => raw
                .trim()
                .parse::<u64>()
                .map_err(|e| anyhow::anyhow!("Invalid JWT_EXPIRATION_MS '{}': {}", raw, e))?,
            Err(_) => DEFAULT_EXPIRATION_MS,
        };

        let config = Self {
            secret,
            expiration_ms,
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.secret.trim().is_empty() {
            return Err(anyhow::anyhow!("Token secret must not be empty"));
        }
        if self.expiration_ms == 0 {
            return Err(anyhow::anyhow!("Token expiration must be positive"));
        }
        if self.expiration_ms > MAX_EXPIRATION_MS {
            return Err(anyhow::anyhow!(
                "Token expiration {}ms exceeds the maximum of {}ms",
                self.expiration_ms,
                MAX_EXPIRATION_MS
            ));
        }
        Ok(())
    }

    pub fn expiration(&self) -> chrono::Duration {
        let ms = self.expiration_ms.min(MAX_EXPIRATION_MS);
        chrono::Duration::milliseconds(i64::try_from(ms).unwrap_or(i64::MAX))
    }
}

impl fmt::Debug for TokenConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenConfig")
            .field("secret", &"<redacted>")
            .field("expiration_ms", &self.expiration_ms)
            .finish()
    }
}

/// How login reports an unknown username.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LoginErrorPolicy {
    /// Unknown user and wrong password both yield `BAD_CREDENTIALS`.
    #[default]
    Uniform,
    /// Unknown user yields `USER_NOT_FOUND`.
    Distinct,
}

impl FromStr for LoginErrorPolicy {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "uniform" => Ok(Self::Uniform),
            "distinct" => Ok(Self::Distinct),
            other => Err(anyhow::anyhow!("Unknown login error policy: {}", other)),
        }
    }
}

/// Authorization behaviour.
#[derive(Debug, Clone, Default)]
pub struct AuthConfig {
    /// Fall back to token-embedded roles when the credential store is down.
    pub allow_degraded_roles: bool,
    pub login_errors: LoginErrorPolicy,
    /// JSON access policy; the built-in catalog policy is used when unset.
    pub policy_path: Option<PathBuf>,
}

impl AuthConfig {
    /// Read `AUTH_DEGRADED_ROLES`, `AUTH_LOGIN_ERRORS` and `AUTH_POLICY`.
    pub fn from_env() -> anyhow::Result<Self> {
        let allow_degraded_roles = match env::var("AUTH_DEGRADED_ROLES") {
            Ok(raw) => parse_bool(&raw)
                .ok_or_else(|| anyhow::anyhow!("Invalid AUTH_DEGRADED_ROLES '{}'", raw))?,
            Err(_) => false,
        };

        let login_errors = match env::var("AUTH_LOGIN_ERRORS") {
            Ok(raw) => raw.parse()?,
            Err(_) => LoginErrorPolicy::default(),
        };

        Ok(Self {
            allow_degraded_roles,
            login_errors,
            policy_path: env::var("AUTH_POLICY").ok().map(PathBuf::from),
        })
    }

    /// Load the configured access policy.
    pub fn load_policy(&self) -> anyhow::Result<AccessPolicy> {
        match &self.policy_path {
            Some(path) => {
                let raw = fs::read_to_string(path).map_err(|e| {
                    anyhow::anyhow!("Could not read access policy {}: {}", path.display(), e)
                })?;
                let policy: AccessPolicy = serde_json::from_str(&raw)?;
                Ok(policy)
            }
            None => Ok(AccessPolicy::catalog()),
        }
    }
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Everything the service needs at startup.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub token: TokenConfig,
    pub auth: AuthConfig,
    pub database: DatabaseConfig,
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        Ok(Self {
            token: TokenConfig::from_env()?,
            auth: AuthConfig::from_env()?,
            database: DatabaseConfig::default(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_token_config_validation() {
        let ok = TokenConfig {
            secret: "s3cret".to_string(),
            expiration_ms: DEFAULT_EXPIRATION_MS,
        };
        assert!(ok.validate().is_ok());
        assert_eq!(ok.expiration(), chrono::Duration::hours(24));

        let empty = TokenConfig {
            secret: "  ".to_string(),
            ..ok.clone()
        };
        assert!(empty.validate().is_err());

        let zero = TokenConfig {
            expiration_ms: 0,
            ..ok.clone()
        };
        assert!(zero.validate().is_err());
    }

    #[test]
    fn test_token_config_rejects_unrepresentable_lifetime() {
        let longest = TokenConfig {
            secret: "s3cret".to_string(),
            expiration_ms: MAX_EXPIRATION_MS,
        };
        assert!(longest.validate().is_ok());
        assert!(
            chrono::Utc::now()
                .checked_add_signed(longest.expiration())
                .is_some()
        );

        for expiration_ms in [MAX_EXPIRATION_MS + 1, 10_000_000_000_000_000, u64::MAX] {
            let config = TokenConfig {
                expiration_ms,
                ..longest.clone()
            };
            assert!(config.validate().is_err(), "{} accepted", expiration_ms);
        }
    }

    #[test]
    fn test_token_config_debug_redacts_secret() {
        let config = TokenConfig {
            secret: "super-secret-value".to_string(),
            expiration_ms: 1000,
        };
        let debug = format!("{:?}", config);
        assert!(!debug.contains("super-secret-value"));
        assert!(debug.contains("redacted"));
    }

    #[test]
    fn test_token_config_deserialize_default_expiration() {
        let config: TokenConfig = serde_json::from_str(r#"{"secret":"abc"}"#).unwrap();
        assert_eq!(config.expiration_ms, DEFAULT_EXPIRATION_MS);
    }

    #[test]
    fn test_login_error_policy_parse() {
        assert_eq!(
            "uniform".parse::<LoginErrorPolicy>().unwrap(),
            LoginErrorPolicy::Uniform
        );
        assert_eq!(
            "DISTINCT".parse::<LoginErrorPolicy>().unwrap(),
            LoginErrorPolicy::Distinct
        );
        assert!("loud".parse::<LoginErrorPolicy>().is_err());
    }

    #[test]
    fn test_parse_bool() {
        assert_eq!(parse_bool("true"), Some(true));
        assert_eq!(parse_bool(" ON "), Some(true));
        assert_eq!(parse_bool("0"), Some(false));
        assert_eq!(parse_bool("maybe"), None);
    }

    #[test]
    fn test_auth_config_default_uses_catalog_policy() {
        let config = AuthConfig::default();
        assert!(!config.allow_degraded_roles);
        assert_eq!(config.login_errors, LoginErrorPolicy::Uniform);

        let policy = config.load_policy().unwrap();
        assert_eq!(policy, AccessPolicy::catalog());
    }

    #[test]
    fn test_auth_config_loads_policy_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{
                "public": [{{"path": "/open/**"}}],
                "roles": [{{"method": "DELETE", "path": "/things/**", "any_of": ["ADMIN"]}}]
            }}"#
        )
        .unwrap();

        let config = AuthConfig {
            policy_path: Some(file.path().to_path_buf()),
            ..Default::default()
        };
        let policy = config.load_policy().unwrap();
        assert_eq!(policy.public.len(), 1);
        assert_eq!(policy.roles.len(), 1);
    }

    #[test]
    fn test_auth_config_missing_policy_file_fails() {
        let config = AuthConfig {
            policy_path: Some(PathBuf::from("/definitely/not/here.json")),
            ..Default::default()
        };
        assert!(config.load_policy().is_err());
    }
}
