//! Authorization gate for southbound calls.
//!
//! Rules are loaded once at startup; a request is allowed when any rule
//! matches its operation, tenant and one of the caller's roles.
//!
//! ```yaml
//! rules:
//!   - operations: [register, update-status]
//!     roles: [node-agent]
//!     tenants: ["*"]
//! ```

use crate::error::SouthboundError;
use serde::Deserialize;
use std::fmt;
use std::path::Path;

const WILDCARD: &str = "*";

/// Southbound operations subject to authorization
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Register,
    UpdateStatus,
}

impl Operation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::Register => "register",
            Operation::UpdateStatus => "update-status",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Caller identity as established by the authenticating gateway
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestContext {
    pub tenant: String,
    pub roles: Vec<String>,
}

/// Yes/no authorization decision
pub trait PolicyEvaluator: Send + Sync {
    fn allow(&self, ctx: &RequestContext, operation: Operation) -> bool;
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct PolicyRule {
    pub operations: Vec<String>,
    pub roles: Vec<String>,
    #[serde(default = "any_tenant")]
    pub tenants: Vec<String>,
}

fn any_tenant() -> Vec<String> {
    vec![WILDCARD.to_string()]
}

fn matches(patterns: &[String], value: &str) -> bool {
    patterns.iter().any(|p| p == WILDCARD || p == value)
}

impl PolicyRule {
    fn allows(&self, ctx: &RequestContext, operation: Operation) -> bool {
        matches(&self.operations, operation.as_str())
            && matches(&self.tenants, &ctx.tenant)
            && ctx.roles.iter().any(|role| matches(&self.roles, role))
    }
}

#[derive(Debug, Deserialize)]
struct PolicyDocument {
    #[serde(default)]
    rules: Vec<PolicyRule>,
}

/// Role-based policy loaded from YAML
#[derive(Debug, Clone)]
pub struct RolePolicy {
    rules: Vec<PolicyRule>,
}

impl RolePolicy {
    pub fn new(rules: Vec<PolicyRule>) -> Result<Self, SouthboundError> {
        if rules.is_empty() {
            return Err(SouthboundError::InvalidPolicy("policy has no rules".to_string()));
        }
        Ok(Self { rules })
    }

    pub fn from_yaml(source: &str) -> Result<Self, SouthboundError> {
        let document: PolicyDocument =
            serde_yaml::from_str(source).map_err(|e| SouthboundError::InvalidPolicy(e.to_string()))?;
        Self::new(document.rules)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, SouthboundError> {
        let path = path.as_ref();
        let source = std::fs::read_to_string(path)
            .map_err(|e| SouthboundError::InvalidPolicy(format!("{}: {}", path.display(), e)))?;
        Self::from_yaml(&source)
    }
}

impl PolicyEvaluator for RolePolicy {
    fn allow(&self, ctx: &RequestContext, operation: Operation) -> bool {
        self.rules.iter().any(|rule| rule.allows(ctx, operation))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx(tenant: &str, roles: &[&str]) -> RequestContext {
        RequestContext {
            tenant: tenant.to_string(),
            roles: roles.iter().map(|r| r.to_string()).collect(),
        }
    }

    #[test]
    fn test_role_and_operation_must_match() {
        let policy = RolePolicy::from_yaml(
            r#"
rules:
  - operations: [register, update-status]
    roles: [node-agent]
"#,
        )
        .unwrap();

        assert!(policy.allow(&ctx("tenant-a", &["node-agent"]), Operation::Register));
        assert!(policy.allow(&ctx("tenant-b", &["viewer", "node-agent"]), Operation::UpdateStatus));
        assert!(!policy.allow(&ctx("tenant-a", &["viewer"]), Operation::Register));
        assert!(!policy.allow(&ctx("tenant-a", &[]), Operation::Register));
    }

    #[test]
    fn test_tenant_scoped_rule() {
        let policy = RolePolicy::from_yaml(
            r#"
rules:
  - operations: ["*"]
    roles: [node-agent]
    tenants: [edge]
"#,
        )
        .unwrap();

        assert!(policy.allow(&ctx("edge", &["node-agent"]), Operation::UpdateStatus));
        assert!(!policy.allow(&ctx("other", &["node-agent"]), Operation::UpdateStatus));
    }

    #[test]
    fn test_empty_policy_is_rejected() {
        assert!(matches!(RolePolicy::from_yaml("rules: []"), Err(SouthboundError::InvalidPolicy(_))));
        assert!(matches!(RolePolicy::from_yaml("{}"), Err(SouthboundError::InvalidPolicy(_))));
        assert!(matches!(RolePolicy::new(Vec::new()), Err(SouthboundError::InvalidPolicy(_))));
    }

    #[test]
    fn test_malformed_policy_is_rejected() {
        assert!(matches!(RolePolicy::from_yaml("rules: 3"), Err(SouthboundError::InvalidPolicy(_))));
        assert!(matches!(
            RolePolicy::from_file("/nonexistent/policy.yaml"),
            Err(SouthboundError::InvalidPolicy(_))
        ));
    }
}
