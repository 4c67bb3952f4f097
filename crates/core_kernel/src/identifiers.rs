//! Typed identifiers
//!
//! One UUID newtype per entity, so a booking id never stands in for a
//! session id. Identifiers print with a three-letter tag (`BKG-…`) and parse
//! from either the tagged or the bare UUID form; a string carrying another
//! entity's tag is rejected.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum IdParseError {
    #[error("expected a {expected} id, got {found}")]
    WrongTag { expected: &'static str, found: String },

    #[error(transparent)]
    Uuid(#[from] uuid::Error),
}

fn split_tag(s: &str) -> Option<(&str, &str)> {
    let (tag, rest) = s.split_once('-')?;
    (tag.len() == 3 && tag.bytes().all(|b| b.is_ascii_uppercase())).then_some((tag, rest))
}

macro_rules! typed_id {
    ($(#[$meta:meta])* $name:ident, $tag:literal) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(Uuid);

        impl $name {
            pub const TAG: &'static str = $tag;

            /// Random (v4) identifier
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }

            /// Time-ordered (v7) identifier, for rows read back in creation order
            pub fn new_v7() -> Self {
                Self(Uuid::now_v7())
            }

            pub const fn from_uuid(uuid: Uuid) -> Self {
                Self(uuid)
            }

            pub fn as_uuid(&self) -> &Uuid {
                &self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}-{}", $tag, self.0)
            }
        }

        impl FromStr for $name {
            type Err = IdParseError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                let raw = match split_tag(s) {
                    Some(($tag, rest)) => rest,
                    Some((other, _)) => {
                        return Err(IdParseError::WrongTag { expected: $tag, found: other.to_string() })
                    }
                    None => s,
                };
                Ok(Self(Uuid::parse_str(raw)?))
            }
        }

        impl From<Uuid> for $name {
            fn from(uuid: Uuid) -> Self {
                Self(uuid)
            }
        }

        impl From<$name> for Uuid {
            fn from(id: $name) -> Uuid {
                id.0
            }
        }
    };
}

typed_id!(
    /// A customer who holds a wallet and credit lots
    UserId, "USR"
);
typed_id!(CounselorId, "CSL");
typed_id!(BookingId, "BKG");
typed_id!(SessionId, "SES");
typed_id!(CashTransactionId, "CTX");
typed_id!(CreditLotId, "LOT");
typed_id!(UsageLogId, "USE");
typed_id!(SettlementTransactionId, "STX");
typed_id!(
    /// One counselor's aggregate for one calendar month
    CounselorSettlementId, "CST"
);
