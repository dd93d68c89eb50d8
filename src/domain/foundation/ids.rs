//! Strongly-typed identifier value objects.
//!
//! Users and levels come from the host site and are numeric; orders and
//! memberships use database-assigned surrogate keys.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::num::ParseIntError;
use std::str::FromStr;

/// Identifier of a site user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(i64);

impl UserId {
    /// Creates a UserId from a raw integer.
    pub const fn new(id: i64) -> Self {
        Self(id)
    }

    /// Returns the raw integer value.
    pub const fn as_i64(&self) -> i64 {
        self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for UserId {
    type Err = ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(s.trim().parse()?))
    }
}

/// Identifier of a membership level (the plan a user subscribes to).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LevelId(i64);

impl LevelId {
    /// Creates a LevelId from a raw integer.
    pub const fn new(id: i64) -> Self {
        Self(id)
    }

    /// Returns the raw integer value.
    pub const fn as_i64(&self) -> i64 {
        self.0
    }
}

impl fmt::Display for LevelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for LevelId {
    type Err = ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(s.trim().parse()?))
    }
}

/// Surrogate key of an order row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OrderId(i64);

impl OrderId {
    /// Creates an OrderId from a raw integer.
    pub const fn new(id: i64) -> Self {
        Self(id)
    }

    /// Returns the raw integer value.
    pub const fn as_i64(&self) -> i64 {
        self.0
    }
}

impl fmt::Display for OrderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for OrderId {
    type Err = ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(s.trim().parse()?))
    }
}

/// Surrogate key of a membership row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MembershipId(i64);

impl MembershipId {
    /// Creates a MembershipId from a raw integer.
    pub const fn new(id: i64) -> Self {
        Self(id)
    }

    /// Returns the raw integer value.
    pub const fn as_i64(&self) -> i64 {
        self.0
    }
}

impl fmt::Display for MembershipId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for MembershipId {
    type Err = ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(s.trim().parse()?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn user_id_parses_from_string() {
        let id: UserId = "42".parse().unwrap();
        assert_eq!(id, UserId::new(42));
    }

    #[test]
    fn user_id_parse_trims_whitespace() {
        let id: UserId = " 42 ".parse().unwrap();
        assert_eq!(id.as_i64(), 42);
    }

    #[test]
    fn user_id_rejects_non_numeric() {
        assert!("abc".parse::<UserId>().is_err());
    }

    #[test]
    fn level_id_displays_raw_value() {
        assert_eq!(LevelId::new(7).to_string(), "7");
    }

    #[test]
    fn order_id_serializes_transparently() {
        let json = serde_json::to_string(&OrderId::new(15)).unwrap();
        assert_eq!(json, "15");
    }

    #[test]
    fn membership_id_deserializes_from_number() {
        let id: MembershipId = serde_json::from_str("99").unwrap();
        assert_eq!(id.as_i64(), 99);
    }
}
