use serde::{Deserialize, Serialize};

/// Access requirement attached to a protected route.
///
/// When both `groups` and `roles` are present, `groups` is the one checked.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccessRule {
    pub path: String,
    pub methods: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub groups: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub roles: Option<Vec<String>>,
}

impl AccessRule {
    pub fn credential_kind(&self) -> CredentialKind {
        if self.groups.is_some() {
            CredentialKind::Groups
        } else {
            CredentialKind::Roles
        }
    }

    pub fn allows_method(&self, method: &str) -> bool {
        self.methods.iter().any(|m| m.eq_ignore_ascii_case(method))
    }

    pub(crate) fn required(&self, kind: CredentialKind) -> &[String] {
        let set = match kind {
            CredentialKind::Groups => &self.groups,
            CredentialKind::Roles => &self.roles,
        };
        set.as_deref().unwrap_or_default()
    }
}

/// Which claim an access rule is checked against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CredentialKind {
    Groups,
    Roles,
}

impl CredentialKind {
    pub fn claim_name(&self) -> &'static str {
        match self {
            Self::Groups => "groups",
            Self::Roles => "roles",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DenyReason {
    MethodNotAllowed,
    MissingGroup,
    MissingRole,
    MissingClaim(&'static str),
    NotAuthenticated,
    DirectoryLookupFailed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AccessDecision {
    Allow,
    Deny(DenyReason),
}

impl AccessDecision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Self::Allow)
    }
}
