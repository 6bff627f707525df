//! Strongly-typed identifiers (avoid mixing strings/UUIDs arbitrarily).

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Gang identifier, assigned at creation (UUID v7, time-ordered).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct GangId(pub Uuid);

impl GangId {
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Default for GangId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for GangId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for GangId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

/// User identifier: the opaque id issued by the identity provider.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct UserId(pub String);

impl UserId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for UserId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for UserId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gang_id_display_roundtrip() {
        let id = GangId::new();
        let parsed: GangId = id.to_string().parse().unwrap();
        assert_eq!(id, parsed);
    }

    #[test]
    fn gang_ids_are_time_ordered() {
        let a = GangId::new();
        let b = GangId::new();
        assert!(a <= b);
    }

    #[test]
    fn user_id_equality_and_hash() {
        use std::collections::HashSet;

        let u1 = UserId::from("uid-1");
        let u2 = UserId::from("uid-1");
        assert_eq!(u1, u2);

        let mut set = HashSet::new();
        set.insert(u1);
        assert!(set.contains(&u2));
    }
}
