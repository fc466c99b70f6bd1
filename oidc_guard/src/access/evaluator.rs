use super::types::{AccessDecision, AccessRule, CredentialKind, DenyReason};

/// Decides whether `credentials` satisfy `rule` for `method`.
///
/// Any single credential listed by the rule is enough.
pub fn evaluate(
    method: &str,
    rule: &AccessRule,
    credentials: &[String],
    kind: CredentialKind,
) -> AccessDecision {
    if !rule.allows_method(method) {
        tracing::debug!("Method {} not allowed for {}", method, rule.path);
        return AccessDecision::Deny(DenyReason::MethodNotAllowed);
    }

    let required = rule.required(kind);
    if !required.iter().any(|r| credentials.contains(r)) {
        tracing::debug!(
            "Principal has none of the required {} for {}",
            kind.claim_name(),
            rule.path
        );
        return AccessDecision::Deny(match kind {
            CredentialKind::Groups => DenyReason::MissingGroup,
            CredentialKind::Roles => DenyReason::MissingRole,
        });
    }

    AccessDecision::Allow
}
