use http::Method;

use crate::access::{
    AccessDecision, AccessRule, CredentialKind, DenyReason, claim_values, collect_member_ids,
    evaluate, has_overage_indicator, materialize_groups,
};
use crate::identity::{Account, SilentRequest};
use crate::session::AuthSession;

use super::errors::GuardError;
use super::provider::AuthProvider;

impl AuthProvider {
    /// Access rule configured for `path`, if any.
    pub fn access_rule(&self, path: &str) -> Option<&AccessRule> {
        self.settings
            .access_matrix
            .values()
            .find(|rule| rule.path == path)
    }

    /// Gate for a protected route. Routes without a rule only need authentication.
    pub async fn check_access(
        &self,
        session: &mut AuthSession,
        method: &Method,
        path: &str,
    ) -> AccessDecision {
        if !session.is_authenticated {
            return AccessDecision::Deny(DenyReason::NotAuthenticated);
        }

        let Some(rule) = self.access_rule(path).cloned() else {
            tracing::debug!("No access rule for {}", path);
            return AccessDecision::Allow;
        };

        self.check_access_rule(session, method, &rule).await
    }

    /// Evaluates `rule` against the session's claims, resolving a groups overage if needed.
    pub async fn check_access_rule(
        &self,
        session: &mut AuthSession,
        method: &Method,
        rule: &AccessRule,
    ) -> AccessDecision {
        if !session.is_authenticated {
            return AccessDecision::Deny(DenyReason::NotAuthenticated);
        }
        let Some(account) = session.account.as_ref() else {
            return AccessDecision::Deny(DenyReason::NotAuthenticated);
        };

        let kind = rule.credential_kind();
        let claims = &account.id_token_claims;

        if let Some(values) = claim_values(claims, kind.claim_name()) {
            return evaluate(method.as_str(), rule, &values, kind);
        }

        if kind == CredentialKind::Groups && has_overage_indicator(claims) {
            return self.resolve_overage(session, method, rule).await;
        }

        tracing::warn!("Account has no {} claim", kind.claim_name());
        AccessDecision::Deny(DenyReason::MissingClaim(kind.claim_name()))
    }

    /// Reads the full group list from the directory, stores it on the account and evaluates `rule`.
    ///
    /// Any failure denies access. Nothing is retried and the user is never sent to sign in.
    pub async fn resolve_overage(
        &self,
        session: &mut AuthSession,
        method: &Method,
        rule: &AccessRule,
    ) -> AccessDecision {
        let Some(account) = session.account.clone() else {
            return AccessDecision::Deny(DenyReason::NotAuthenticated);
        };

        let groups = match self.fetch_overage_groups(&account).await {
            Ok(groups) => groups,
            Err(e) => {
                e.log();
                return AccessDecision::Deny(DenyReason::DirectoryLookupFailed);
            }
        };

        tracing::info!("Resolved groups overage with {} groups", groups.len());
        let claims = materialize_groups(&account.id_token_claims, groups.clone());
        if let Some(account) = session.account.as_mut() {
            account.id_token_claims = claims;
        }

        evaluate(method.as_str(), rule, &groups, CredentialKind::Groups)
    }

    async fn fetch_overage_groups(&self, account: &Account) -> Result<Vec<String>, GuardError> {
        let directory = &self.settings.directory;

        let response = self
            .identity
            .acquire_token_silently(&SilentRequest {
                account: account.clone(),
                scopes: directory.scopes.clone(),
            })
            .await
            .map_err(|e| GuardError::DirectoryLookup(format!("Silent acquisition failed: {e}")))?;

        if response.access_token.is_empty() {
            return Err(GuardError::DirectoryLookup(
                "Empty directory access token".to_string(),
            ));
        }

        collect_member_ids(
            self.fetcher.as_ref(),
            &response.access_token,
            &directory.member_of_endpoint,
        )
        .await
        .map_err(|e| GuardError::DirectoryLookup(e.to_string()))
    }

    /// Validates a bearer token presented to `route_path` against the owned resource for that route.
    pub async fn is_token_valid(&self, token: &str, route_path: &str) -> bool {
        let Some(resource) = self
            .settings
            .owned_resources
            .values()
            .find(|resource| resource.path.as_deref() == Some(route_path))
        else {
            tracing::warn!("No owned resource protects {}", route_path);
            return false;
        };

        match self
            .validator
            .validate_access_token(token, &resource.scopes)
            .await
        {
            Ok(valid) => valid,
            Err(e) => {
                GuardError::TokenValidation(e).log();
                false
            }
        }
    }
}
