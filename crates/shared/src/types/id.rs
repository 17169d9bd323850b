//! Typed IDs for tenant-scoped ledger records.
//!
//! A `VoucherId` can never be handed to something expecting an `AccountId`,
//! which matters when every repository call also carries a `TenantId`.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Declares a UUID-backed identifier newtype.
macro_rules! typed_id {
    ($name:ident, $doc:expr) => {
        #[doc = $doc]
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub Uuid);

        impl $name {
            /// Generates a fresh time-ordered (v7) identifier.
            #[must_use]
            pub fn new() -> Self {
                Self(Uuid::now_v7())
            }

            /// Wraps an existing UUID.
            #[must_use]
            pub const fn from_uuid(uuid: Uuid) -> Self {
                Self(uuid)
            }

            /// Unwraps into the raw UUID.
            #[must_use]
            pub const fn into_inner(self) -> Uuid {
                self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl From<Uuid> for $name {
            fn from(uuid: Uuid) -> Self {
                Self(uuid)
            }
        }

        impl From<$name> for Uuid {
            fn from(id: $name) -> Self {
                id.0
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
                Uuid::parse_str(s).map(Self)
            }
        }
    };
}

typed_id!(TenantId, "Identifier of an isolated tenant (company).");
typed_id!(UserId, "Identifier of an acting user.");
typed_id!(AccountId, "Identifier of a chart of accounts entry.");
typed_id!(PeriodId, "Identifier of an accounting period.");
typed_id!(PartyId, "Identifier of a customer or supplier party.");
typed_id!(VoucherId, "Identifier of a voucher.");
typed_id!(VoucherLineId, "Identifier of a single voucher line.");
typed_id!(SequenceId, "Identifier of a voucher numbering sequence.");
typed_id!(ApprovalId, "Identifier of a voucher approval log entry.");
