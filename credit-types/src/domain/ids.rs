//! Strongly typed identifiers.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

macro_rules! define_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(Uuid);

        impl $name {
            /// Creates a new random identifier.
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }

            /// Creates an identifier from an existing UUID.
            pub fn from_uuid(uuid: Uuid) -> Self {
                Self(uuid)
            }

            /// Returns the underlying UUID.
            pub fn as_uuid(&self) -> &Uuid {
                &self.0
            }

            /// Returns the UUID value.
            pub fn into_uuid(self) -> Uuid {
                self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl std::str::FromStr for $name {
            type Err = uuid::Error;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Ok(Self(Uuid::parse_str(s)?))
            }
        }
    };
}

define_id!(
    /// Identifies the user who owns accounts and credits.
    UserId
);
define_id!(
    /// Unique identifier for an Account.
    AccountId
);
define_id!(
    /// Unique identifier for a Credit.
    CreditId
);
define_id!(
    /// Unique identifier for a payment schedule entry.
    EntryId
);
define_id!(
    /// Unique identifier for a ledger Transaction.
    TransactionId
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_id_parse_round_trip() {
        let id = AccountId::new();
        let parsed: AccountId = id.to_string().parse().unwrap();
        assert_eq!(parsed, id);
    }

    #[test]
    fn test_ordering_matches_string_ordering() {
        // Lock ordering relies on ids comparing the same way as their text form.
        let a = AccountId::from_uuid(Uuid::parse_str("00000000-0000-4000-8000-000000000001").unwrap());
        let b = AccountId::from_uuid(Uuid::parse_str("f0000000-0000-4000-8000-000000000000").unwrap());
        assert!(a < b);
        assert!(a.to_string() < b.to_string());
    }
}
