//! Downstream ("remote") and caller-facing ("owned") protected resources.
//!
//! A resource is identified by its exact scope list. The redirect handler only
//! sees the scopes recorded in the pending token request, so the resource name
//! is recovered by reverse lookup.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceConfig {
    pub endpoint: String,
    pub scopes: Vec<String>,
    /// Route served by this application that the resource's scopes protect.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
}

/// Finds the resource whose configured scopes equal `scopes` element by element.
///
/// Owned resources are searched before remote ones.
pub fn resolve_resource_name(
    scopes: &[String],
    owned: &HashMap<String, ResourceConfig>,
    remote: &HashMap<String, ResourceConfig>,
) -> Option<String> {
    owned
        .iter()
        .chain(remote.iter())
        .find(|(_, resource)| resource.scopes.as_slice() == scopes)
        .map(|(name, _)| name.clone())
}

/// Returns the names of two resources sharing a scope list, if any.
pub(crate) fn find_duplicate_scopes(
    owned: &HashMap<String, ResourceConfig>,
    remote: &HashMap<String, ResourceConfig>,
) -> Option<(String, String)> {
    let mut all: Vec<(&String, &ResourceConfig)> = owned.iter().chain(remote.iter()).collect();
    all.sort_by(|a, b| a.0.cmp(b.0));

    for (i, (name_a, a)) in all.iter().enumerate() {
        for (name_b, b) in all.iter().skip(i + 1) {
            if a.scopes == b.scopes {
                return Some(((*name_a).clone(), (*name_b).clone()));
            }
        }
    }
    None
}
