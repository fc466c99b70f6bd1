mod evaluator;
mod overage;
mod types;

pub use evaluator::evaluate;
pub use overage::{claim_values, has_overage_indicator, materialize_groups};
pub use types::{AccessDecision, AccessRule, CredentialKind, DenyReason};

pub(crate) use overage::collect_member_ids;
