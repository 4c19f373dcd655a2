//! Uniform resource names
//!
//! Every resource is identified by a URN that is stable across plans:
//!
//! ```text
//! urn:tidemark:<stack>::<project>::<type>::<name>
//! ```
//!
//! The project component drives multi-stack routing: a unified deployment
//! spanning several stacks dispatches each resource to the backend that owns
//! its project.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// URN scheme prefix shared by all resource names.
pub const URN_PREFIX: &str = "urn:tidemark:";

/// Separator between URN components.
const URN_SEPARATOR: &str = "::";

/// Errors raised when parsing a URN from its string form.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum UrnParseError {
    /// The string does not start with `urn:tidemark:`.
    #[error("URN missing `{URN_PREFIX}` prefix: {0}")]
    MissingPrefix(String),

    /// The body does not split into stack, project, type, and name.
    #[error("URN has {found} components, expected 4: {urn}")]
    WrongComponentCount {
        /// Number of `::`-separated components found.
        found: usize,
        /// The offending URN string.
        urn: String,
    },

    /// A component is empty.
    #[error("URN component `{component}` is empty: {urn}")]
    EmptyComponent {
        /// Which component was empty.
        component: &'static str,
        /// The offending URN string.
        urn: String,
    },
}

/// A uniform, globally unique resource name.
///
/// URNs are compared and hashed by their full string form. Accessors expose
/// the individual components; `project()` is what the routing manager keys
/// on.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Urn(String);

impl Urn {
    /// Build a URN from its four components.
    pub fn new(stack: &str, project: &str, type_token: &str, name: &str) -> Self {
        Urn(format!(
            "{URN_PREFIX}{stack}{URN_SEPARATOR}{project}{URN_SEPARATOR}{type_token}{URN_SEPARATOR}{name}"
        ))
    }

    /// The full URN string.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    fn components(&self) -> impl Iterator<Item = &str> {
        self.0[URN_PREFIX.len()..].split(URN_SEPARATOR)
    }

    /// The stack component.
    pub fn stack(&self) -> &str {
        self.components().next().unwrap_or("")
    }

    /// The project component.
    pub fn project(&self) -> &str {
        self.components().nth(1).unwrap_or("")
    }

    /// The type token component.
    pub fn type_token(&self) -> &str {
        self.components().nth(2).unwrap_or("")
    }

    /// The resource name component.
    pub fn name(&self) -> &str {
        self.components().nth(3).unwrap_or("")
    }
}

impl fmt::Display for Urn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for Urn {
    type Err = UrnParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let body = s
            .strip_prefix(URN_PREFIX)
            .ok_or_else(|| UrnParseError::MissingPrefix(s.to_string()))?;

        let components: Vec<&str> = body.split(URN_SEPARATOR).collect();
        if components.len() != 4 {
            return Err(UrnParseError::WrongComponentCount {
                found: components.len(),
                urn: s.to_string(),
            });
        }

        let names = ["stack", "project", "type", "name"];
        for (component, name) in components.iter().zip(names) {
            if component.is_empty() {
                return Err(UrnParseError::EmptyComponent {
                    component: name,
                    urn: s.to_string(),
                });
            }
        }

        Ok(Urn(s.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_urn_components() {
        let urn = Urn::new("prod", "website", "aws:s3:Bucket", "assets");
        assert_eq!(urn.stack(), "prod");
        assert_eq!(urn.project(), "website");
        assert_eq!(urn.type_token(), "aws:s3:Bucket");
        assert_eq!(urn.name(), "assets");
        assert_eq!(
            urn.as_str(),
            "urn:tidemark:prod::website::aws:s3:Bucket::assets"
        );
    }

    #[test]
    fn test_urn_roundtrip() {
        let urn = Urn::new("dev", "api", "kubernetes:apps:Deployment", "web");
        let parsed: Urn = urn.as_str().parse().unwrap();
        assert_eq!(urn, parsed);
    }

    #[test]
    fn test_urn_missing_prefix() {
        let result: Result<Urn, _> = "prod::website::t::n".parse();
        assert!(matches!(result, Err(UrnParseError::MissingPrefix(_))));
    }

    #[test]
    fn test_urn_wrong_component_count() {
        let result: Result<Urn, _> = "urn:tidemark:prod::website::t".parse();
        assert!(matches!(
            result,
            Err(UrnParseError::WrongComponentCount { found: 3, .. })
        ));
    }

    #[test]
    fn test_urn_empty_component() {
        let result: Result<Urn, _> = "urn:tidemark:prod::::t::n".parse();
        assert!(matches!(
            result,
            Err(UrnParseError::EmptyComponent {
                component: "project",
                ..
            })
        ));
    }

    #[test]
    fn test_urn_display_matches_str() {
        let urn = Urn::new("prod", "website", "aws:s3:Bucket", "assets");
        assert_eq!(format!("{}", urn), urn.as_str());
    }

    #[test]
    fn test_urn_ordering_is_lexicographic() {
        let a = Urn::new("prod", "api", "t", "a");
        let b = Urn::new("prod", "api", "t", "b");
        assert!(a < b);
    }

    proptest::proptest! {
        #[test]
        fn parse_roundtrip_preserves_components(
            stack in "[a-z0-9-]{1,12}",
            project in "[a-z0-9-]{1,12}",
            type_token in "[a-z]{1,8}(:[a-z]{1,8}){0,2}",
            name in "[a-zA-Z0-9_.-]{1,16}",
        ) {
            let urn = Urn::new(&stack, &project, &type_token, &name);
            let parsed: Urn = urn.as_str().parse().unwrap();
            proptest::prop_assert_eq!(&parsed, &urn);
            proptest::prop_assert_eq!(parsed.stack(), stack);
            proptest::prop_assert_eq!(parsed.project(), project);
            proptest::prop_assert_eq!(parsed.type_token(), type_token);
            proptest::prop_assert_eq!(parsed.name(), name);
        }
    }
}
