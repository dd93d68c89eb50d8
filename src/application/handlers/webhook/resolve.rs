//! Ties provider objects back to site users and levels.

use std::collections::HashMap;

use crate::domain::foundation::{LevelId, UserId};

/// Metadata key carrying the site user id.
pub const META_USER_ID: &str = "user_id";
/// Metadata key carrying the level id.
pub const META_LEVEL_ID: &str = "membership_id";
pub const META_ORDER_CODE: &str = "order_code";
pub const META_ORDER_ID: &str = "order_id";

/// User and level an event is about, as far as they could be resolved.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Resolved {
    pub user_id: Option<UserId>,
    pub level_id: Option<LevelId>,
}

impl Resolved {
    /// Reads metadata first, then the trailing digits of the plan id
    /// (`khm_level_7` names level 7).
    pub fn from_metadata(metadata: &HashMap<String, String>, plan_id: Option<&str>) -> Self {
        Self {
            user_id: metadata_id(metadata, META_USER_ID).map(UserId::new),
            level_id: metadata_id(metadata, META_LEVEL_ID)
                .or_else(|| plan_id.and_then(trailing_id))
                .map(LevelId::new),
        }
    }

    /// Fills whatever is still missing from `other`.
    pub fn or(self, other: Resolved) -> Self {
        Self {
            user_id: self.user_id.or(other.user_id),
            level_id: self.level_id.or(other.level_id),
        }
    }

    pub fn pair(&self) -> Option<(UserId, LevelId)> {
        Some((self.user_id?, self.level_id?))
    }
}

/// Positive integer stored under `key`.
pub fn metadata_id(metadata: &HashMap<String, String>, key: &str) -> Option<i64> {
    metadata
        .get(key)
        .and_then(|v| v.trim().parse::<i64>().ok())
        .filter(|id| *id > 0)
}

/// Positive integer formed by the trailing digits of `s`.
pub fn trailing_id(s: &str) -> Option<i64> {
    let prefix_len = s.trim_end_matches(|c: char| c.is_ascii_digit()).len();
    s[prefix_len..].parse::<i64>().ok().filter(|id| *id > 0)
}
