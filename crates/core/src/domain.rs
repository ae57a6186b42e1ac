//! Reconciliation domains.
//!
//! Each domain pairs one storage bucket with the database field that holds
//! references into it.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A bucket/field pairing that is reconciled as a unit.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReconcileDomain {
    /// Visitor entry photos (`visitor_entries.photo_url`).
    Visitor,
    /// Profile images (`profiles.profile_image`).
    Profile,
}

impl ReconcileDomain {
    /// All domains, in the order runs process them.
    pub const ALL: [ReconcileDomain; 2] = [ReconcileDomain::Visitor, ReconcileDomain::Profile];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Visitor => "visitor",
            Self::Profile => "profile",
        }
    }

    pub fn parse(s: &str) -> crate::Result<Self> {
        match s {
            "visitor" => Ok(Self::Visitor),
            "profile" => Ok(Self::Profile),
            other => Err(crate::Error::InvalidDomain(other.to_string())),
        }
    }
}

impl fmt::Display for ReconcileDomain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_domain_parse() {
        assert_eq!(
            ReconcileDomain::parse("visitor").unwrap(),
            ReconcileDomain::Visitor
        );
        assert_eq!(
            ReconcileDomain::parse("profile").unwrap(),
            ReconcileDomain::Profile
        );
        assert!(ReconcileDomain::parse("farm").is_err());
    }
}
