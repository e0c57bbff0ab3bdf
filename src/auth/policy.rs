//! Route access policy.
//!
//! One ordered table decides, for a `(method, path)` pair, whether a request
//! may pass without a token and, if not, which roles it needs. Public rules
//! are consulted first; the first matching role rule wins; anything else only
//! needs an authenticated principal.
//!
//! Path patterns come in two shapes:
//! - `/a/b` matches exactly `/a/b` (a trailing slash is ignored)
//! - `/a/b/**` matches `/a/b` and everything below it, segment-wise, so
//!   `/api/auth/**` covers `/api/auth/login` but not `/api/authz`

use std::collections::BTreeSet;
use std::fmt;

use http::Method;
use serde::{Deserialize, Serialize};

use crate::model::Role;

/// A path matcher.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum PathPattern {
    Exact(Vec<String>),
    Prefix(Vec<String>),
}

impl PathPattern {
    pub fn parse(pattern: &str) -> Result<Self, String> {
        if !pattern.starts_with('/') {
            return Err(format!("path pattern must start with '/': {}", pattern));
        }

        let (base, prefix) = match pattern.strip_suffix("/**") {
            Some(base) => (base, true),
            None => (pattern, false),
        };

        let segments: Vec<String> = base
            .split('/')
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect();

        if segments.iter().any(|s| s.contains('*')) {
            return Err(format!(
                "wildcards are only supported as a trailing '/**': {}",
                pattern
            ));
        }

        Ok(if prefix {
            Self::Prefix(segments)
        } else {
            Self::Exact(segments)
        })
    }

    pub fn matches(&self, path: &RequestPath) -> bool {
        match self {
            Self::Exact(segments) => path.segments == *segments,
            Self::Prefix(segments) => path.segments.starts_with(segments),
        }
    }
}

impl TryFrom<String> for PathPattern {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<PathPattern> for String {
    fn from(pattern: PathPattern) -> Self {
        pattern.to_string()
    }
}

impl fmt::Display for PathPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (segments, suffix) = match self {
            Self::Exact(segments) => (segments, ""),
            Self::Prefix(segments) => (segments, "/**"),
        };
        if segments.is_empty() && suffix.is_empty() {
            return f.write_str("/");
        }
        for segment in segments {
            write!(f, "/{}", segment)?;
        }
        f.write_str(suffix)
    }
}

/// A request path split into normalized segments.
///
/// Empty segments are dropped and `.`/`..` are resolved, so a path cannot
/// climb out of a public prefix into a protected route.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestPath {
    segments: Vec<String>,
}

impl RequestPath {
    pub fn new(path: &str) -> Self {
        let path = path.split(['?', '#']).next().unwrap_or("");
        let mut segments: Vec<String> = Vec::new();
        for segment in path.split('/') {
            match segment {
                "" | "." => {}
                ".." => {
                    segments.pop();
                }
                other => segments.push(other.to_string()),
            }
        }
        Self { segments }
    }
}

/// Roles needed on a protected route.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RoleRequirement {
    /// Any authenticated principal.
    None,
    /// At least one of the listed roles.
    AnyOf(Vec<Role>),
}

impl RoleRequirement {
    pub fn is_satisfied_by(&self, roles: &BTreeSet<Role>) -> bool {
        match self {
            Self::None => true,
            Self::AnyOf(required) => required.iter().any(|r| roles.contains(r)),
        }
    }
}

impl fmt::Display for RoleRequirement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::None => f.write_str("authenticated"),
            Self::AnyOf(roles) => {
                let names: Vec<&str> = roles.iter().map(Role::as_str).collect();
                write!(f, "any of [{}]", names.join(", "))
            }
        }
    }
}

/// Outcome of classifying a request against the policy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Access {
    Public,
    Protected(RoleRequirement),
}

/// A route that bypasses token checks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublicRule {
    /// Restrict the rule to one method; any method when absent.
    #[serde(default, with = "method_opt", skip_serializing_if = "Option::is_none")]
    pub method: Option<Method>,
    pub path: PathPattern,
}

/// A route that needs specific roles.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleRule {
    #[serde(default, with = "method_opt", skip_serializing_if = "Option::is_none")]
    pub method: Option<Method>,
    pub path: PathPattern,
    /// Empty means "authenticated, no particular role".
    #[serde(default)]
    pub any_of: Vec<Role>,
}

impl RoleRule {
    fn requirement(&self) -> RoleRequirement {
        if self.any_of.is_empty() {
            RoleRequirement::None
        } else {
            RoleRequirement::AnyOf(self.any_of.clone())
        }
    }
}

fn method_matches(rule: &Option<Method>, method: &Method) -> bool {
    rule.as_ref().is_none_or(|m| m == method)
}

/// Static access table. Built once at startup and read-only afterwards.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessPolicy {
    #[serde(default)]
    pub public: Vec<PublicRule>,
    #[serde(default)]
    pub roles: Vec<RoleRule>,
}

impl AccessPolicy {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a public route for every method.
    pub fn public(mut self, pattern: &str) -> Self {
        self.public.push(PublicRule {
            method: None,
            path: parse_static(pattern),
        });
        self
    }

    /// Add a public route for one method.
    pub fn public_for(mut self, method: Method, pattern: &str) -> Self {
        self.public.push(PublicRule {
            method: Some(method),
            path: parse_static(pattern),
        });
        self
    }

    /// Require one of `roles` for `method` on `pattern`.
    pub fn require(mut self, method: Method, pattern: &str, roles: &[Role]) -> Self {
        self.roles.push(RoleRule {
            method: Some(method),
            path: parse_static(pattern),
            any_of: roles.to_vec(),
        });
        self
    }

    /// Access table of the recipe catalog service.
    pub fn catalog() -> Self {
        Self::new()
            .public("/")
            .public("/index.html")
            .public("/docs")
            .public("/javadoc")
            .public("/favicon.ico")
            .public("/swagger-ui.html")
            .public("/api/health")
            .public("/error")
            .public("/error/**")
            .public("/api/auth/**")
            .public("/v3/api-docs/**")
            .public("/swagger-ui/**")
            .public("/OOPDocumentationJavaDoc/**")
            .public("/actuator/**")
            .public_for(Method::GET, "/api/recipes")
            .public_for(Method::GET, "/api/recipes/**")
            .require(Method::POST, "/api/recipes", &[Role::Admin])
            .require(Method::PUT, "/api/recipes/**", &[Role::Admin])
            .require(Method::DELETE, "/api/recipes/**", &[Role::Admin])
            .require(Method::GET, "/api/users", &[Role::Admin])
    }

    pub fn is_public(&self, method: &Method, path: &RequestPath) -> bool {
        self.public
            .iter()
            .any(|rule| method_matches(&rule.method, method) && rule.path.matches(path))
    }

    pub fn requirement(&self, method: &Method, path: &RequestPath) -> RoleRequirement {
        self.roles
            .iter()
            .find(|rule| method_matches(&rule.method, method) && rule.path.matches(path))
            .map(RoleRule::requirement)
            .unwrap_or(RoleRequirement::None)
    }

    pub fn classify(&self, method: &Method, path: &str) -> Access {
        let path = RequestPath::new(path);
        if self.is_public(method, &path) {
            Access::Public
        } else {
            Access::Protected(self.requirement(method, &path))
        }
    }
}

// Builder patterns are compile-time literals.
fn parse_static(pattern: &str) -> PathPattern {
    PathPattern::parse(pattern).unwrap_or_else(|e| panic!("invalid built-in path pattern: {}", e))
}

mod method_opt {
    use http::Method;
    use serde::{Deserialize, Deserializer, Serializer, de::Error};

    pub fn serialize<S: Serializer>(method: &Option<Method>, s: S) -> Result<S::Ok, S::Error> {
        match method {
            Some(m) => s.serialize_str(m.as_str()),
            None => s.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<Method>, D::Error> {
        let raw: Option<String> = Option::deserialize(d)?;
        raw.map(|m| Method::from_bytes(m.to_ascii_uppercase().as_bytes()).map_err(D::Error::custom))
            .transpose()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn admin_only() -> Access {
        Access::Protected(RoleRequirement::AnyOf(vec![Role::Admin]))
    }

    #[test]
    fn test_pattern_parse_and_display() {
        assert_eq!(
            PathPattern::parse("/api/auth/**").unwrap(),
            PathPattern::Prefix(vec!["api".into(), "auth".into()])
        );
        assert_eq!(PathPattern::parse("/").unwrap(), PathPattern::Exact(vec![]));
        assert_eq!(PathPattern::parse("/**").unwrap(), PathPattern::Prefix(vec![]));

        for raw in ["/", "/api/users", "/api/auth/**", "/**"] {
            assert_eq!(PathPattern::parse(raw).unwrap().to_string(), raw);
        }

        assert!(PathPattern::parse("api/users").is_err());
        assert!(PathPattern::parse("/api/*/users").is_err());
    }

    #[test]
    fn test_prefix_is_segment_aware() {
        let pattern = PathPattern::parse("/api/auth/**").unwrap();
        assert!(pattern.matches(&RequestPath::new("/api/auth")));
        assert!(pattern.matches(&RequestPath::new("/api/auth/login")));
        assert!(pattern.matches(&RequestPath::new("/api/auth/")));
        assert!(!pattern.matches(&RequestPath::new("/api/authz")));
        assert!(!pattern.matches(&RequestPath::new("/api")));
    }

    #[test]
    fn test_exact_ignores_trailing_slash_and_query() {
        let pattern = PathPattern::parse("/api/health").unwrap();
        assert!(pattern.matches(&RequestPath::new("/api/health")));
        assert!(pattern.matches(&RequestPath::new("/api/health/")));
        assert!(pattern.matches(&RequestPath::new("/api/health?verbose=1")));
        assert!(!pattern.matches(&RequestPath::new("/api/health/deep")));
    }

    #[test]
    fn test_root_is_exact_only() {
        let policy = AccessPolicy::catalog();
        assert_eq!(policy.classify(&Method::GET, "/"), Access::Public);
        assert_eq!(
            policy.classify(&Method::GET, "/api/private"),
            Access::Protected(RoleRequirement::None)
        );
    }

    #[test]
    fn test_dot_segments_cannot_escape_public_prefix() {
        let policy = AccessPolicy::catalog();
        assert_eq!(
            policy.classify(&Method::GET, "/api/auth/../users"),
            admin_only()
        );
        assert_eq!(
            policy.classify(&Method::POST, "/api/auth/./login"),
            Access::Public
        );
    }

    #[test]
    fn test_catalog_public_routes() {
        let policy = AccessPolicy::catalog();
        for path in [
            "/api/auth/login",
            "/api/auth/register",
            "/api/health",
            "/swagger-ui/index.html",
            "/v3/api-docs",
            "/error",
            "/actuator/health",
        ] {
            assert_eq!(policy.classify(&Method::POST, path), Access::Public, "{}", path);
        }
    }

    #[test]
    fn test_catalog_method_specific_rules() {
        let policy = AccessPolicy::catalog();

        assert_eq!(policy.classify(&Method::GET, "/api/recipes"), Access::Public);
        assert_eq!(policy.classify(&Method::GET, "/api/recipes/12"), Access::Public);

        assert_eq!(policy.classify(&Method::POST, "/api/recipes"), admin_only());
        assert_eq!(policy.classify(&Method::PUT, "/api/recipes/12"), admin_only());
        assert_eq!(policy.classify(&Method::DELETE, "/api/recipes/12"), admin_only());
        assert_eq!(policy.classify(&Method::GET, "/api/users"), admin_only());

        assert_eq!(
            policy.classify(&Method::PATCH, "/api/recipes/12"),
            Access::Protected(RoleRequirement::None)
        );
    }

    #[test]
    fn test_first_role_rule_wins() {
        let policy = AccessPolicy::new()
            .require(Method::GET, "/reports/admin", &[Role::Admin])
            .require(Method::GET, "/reports/**", &[Role::Client, Role::Admin]);

        assert_eq!(policy.classify(&Method::GET, "/reports/admin"), admin_only());
        assert_eq!(
            policy.classify(&Method::GET, "/reports/daily"),
            Access::Protected(RoleRequirement::AnyOf(vec![Role::Client, Role::Admin]))
        );
    }

    #[test]
    fn test_requirement_satisfaction() {
        let client: BTreeSet<Role> = [Role::Client].into_iter().collect();
        let both: BTreeSet<Role> = [Role::Client, Role::Admin].into_iter().collect();

        assert!(RoleRequirement::None.is_satisfied_by(&client));
        assert!(!RoleRequirement::AnyOf(vec![Role::Admin]).is_satisfied_by(&client));
        assert!(RoleRequirement::AnyOf(vec![Role::Admin]).is_satisfied_by(&both));
        assert!(!RoleRequirement::AnyOf(vec![]).is_satisfied_by(&both));
    }

    #[test]
    fn test_policy_json_round_trip() {
        let json = r#"{
            "public": [
                {"path": "/api/auth/**"},
                {"method": "get", "path": "/api/recipes/**"}
            ],
            "roles": [
                {"method": "POST", "path": "/api/recipes", "any_of": ["ADMIN"]},
                {"path": "/api/me"}
            ]
        }"#;

        let policy: AccessPolicy = serde_json::from_str(json).unwrap();
        assert_eq!(policy.public[1].method, Some(Method::GET));
        assert_eq!(policy.roles[1].method, None);
        assert_eq!(policy.classify(&Method::POST, "/api/recipes"), admin_only());
        assert_eq!(policy.classify(&Method::GET, "/api/recipes/3"), Access::Public);

        let reparsed: AccessPolicy =
            serde_json::from_str(&serde_json::to_string(&policy).unwrap()).unwrap();
        assert_eq!(reparsed, policy);
    }

    #[test]
    fn test_policy_json_rejects_bad_pattern() {
        let json = r#"{"public": [{"path": "no-leading-slash"}]}"#;
        assert!(serde_json::from_str::<AccessPolicy>(json).is_err());
    }
}
