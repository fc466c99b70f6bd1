//! Groups claim overage.
//!
//! When a user belongs to too many groups, the identity provider leaves the
//! `groups` claim out of the ID token and adds `_claim_names`/`_claim_sources`
//! instead. The full list then has to be read from the directory.

use serde_json::{Map, Value};

use crate::directory::{DirectoryFetcher, FetchError, NEXT_LINK_KEY};

pub const CLAIM_NAMES: &str = "_claim_names";
pub const CLAIM_SOURCES: &str = "_claim_sources";
pub const GROUPS_CLAIM: &str = "groups";

pub fn has_overage_indicator(claims: &Map<String, Value>) -> bool {
    claims.contains_key(CLAIM_NAMES) || claims.contains_key(CLAIM_SOURCES)
}

/// Copy of `claims` without the overage indicators and with `groups` set to `groups`.
pub fn materialize_groups(claims: &Map<String, Value>, groups: Vec<String>) -> Map<String, Value> {
    let mut resolved: Map<String, Value> = claims
        .iter()
        .filter(|(k, _)| k.as_str() != CLAIM_NAMES && k.as_str() != CLAIM_SOURCES)
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect();
    resolved.insert(
        GROUPS_CLAIM.to_string(),
        Value::Array(groups.into_iter().map(Value::String).collect()),
    );
    resolved
}

/// String values of a claim, or `None` when the claim is absent.
pub fn claim_values(claims: &Map<String, Value>, name: &str) -> Option<Vec<String>> {
    match claims.get(name)? {
        Value::Array(items) => Some(
            items
                .iter()
                .filter_map(|v| v.as_str().map(str::to_string))
                .collect(),
        ),
        Value::String(single) => Some(vec![single.clone()]),
        _ => Some(Vec::new()),
    }
}

pub(crate) fn member_ids(page: &Value) -> Vec<String> {
    page.get("value")
        .and_then(Value::as_array)
        .map(|members| {
            members
                .iter()
                .filter_map(|m| m.get("id").and_then(Value::as_str))
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

/// Reads every member id from the "member of" endpoint, following continuation links.
pub(crate) async fn collect_member_ids(
    fetcher: &dyn DirectoryFetcher,
    bearer_token: &str,
    endpoint: &str,
) -> Result<Vec<String>, FetchError> {
    let first_page = fetcher.fetch(endpoint, bearer_token).await?;
    let mut groups = member_ids(&first_page);

    if let Some(next_link) = first_page.get(NEXT_LINK_KEY).and_then(Value::as_str) {
        tracing::debug!("Directory response is paginated, following {}", next_link);
        let members = fetcher.follow_pagination(bearer_token, next_link).await?;
        groups.extend(
            members
                .iter()
                .filter_map(|m| m.get("id").and_then(Value::as_str))
                .map(str::to_string),
        );
    }

    tracing::debug!("Collected {} group memberships", groups.len());
    Ok(groups)
}
