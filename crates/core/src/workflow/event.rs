//! Domain events emitted by the workflow after a transition commits.

use serde::{Deserialize, Serialize};
use tally_shared::types::{TenantId, UserId, VoucherId};

use crate::ledger::balance::SyncDirection;
use crate::workflow::types::VoucherStatus;

/// Something that happened to a voucher.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LedgerEvent {
    /// A draft was created.
    VoucherCreated {
        /// Owning tenant.
        tenant_id: TenantId,
        /// The voucher.
        voucher_id: VoucherId,
        /// Creator.
        actor: UserId,
    },
    /// An editable voucher changed.
    VoucherEdited {
        /// Owning tenant.
        tenant_id: TenantId,
        /// The voucher.
        voucher_id: VoucherId,
        /// Editor.
        actor: UserId,
    },
    /// A draft went to approval.
    VoucherSubmitted {
        /// Owning tenant.
        tenant_id: TenantId,
        /// The voucher.
        voucher_id: VoucherId,
        /// Submitter.
        actor: UserId,
    },
    /// A voucher was approved and posted.
    VoucherPosted {
        /// Owning tenant.
        tenant_id: TenantId,
        /// The voucher.
        voucher_id: VoucherId,
        /// Assigned document number.
        voucher_number: String,
        /// True if balances were applied in the same unit of work.
        balances_applied: bool,
    },
    /// A pending voucher was sent back.
    VoucherRejected {
        /// Owning tenant.
        tenant_id: TenantId,
        /// The voucher.
        voucher_id: VoucherId,
        /// Rejecting user.
        actor: UserId,
    },
    /// A posted voucher left the books.
    VoucherCancelled {
        /// Owning tenant.
        tenant_id: TenantId,
        /// The voucher.
        voucher_id: VoucherId,
        /// True if it was also soft-deleted.
        deleted: bool,
    },
    /// An unposted voucher was soft-deleted.
    VoucherDeleted {
        /// Owning tenant.
        tenant_id: TenantId,
        /// The voucher.
        voucher_id: VoucherId,
        /// Status at deletion.
        status: VoucherStatus,
    },
    /// A reversing voucher was raised against a posted one.
    ReversingVoucherCreated {
        /// Owning tenant.
        tenant_id: TenantId,
        /// The original voucher.
        voucher_id: VoucherId,
        /// The reversing voucher.
        reversal_id: VoucherId,
        /// True if the reversal was posted immediately.
        posted: bool,
    },
}

impl LedgerEvent {
    /// Returns the tenant the event belongs to.
    #[must_use]
    pub const fn tenant_id(&self) -> TenantId {
        match self {
            Self::VoucherCreated { tenant_id, .. }
            | Self::VoucherEdited { tenant_id, .. }
            | Self::VoucherSubmitted { tenant_id, .. }
            | Self::VoucherPosted { tenant_id, .. }
            | Self::VoucherRejected { tenant_id, .. }
            | Self::VoucherCancelled { tenant_id, .. }
            | Self::VoucherDeleted { tenant_id, .. }
            | Self::ReversingVoucherCreated { tenant_id, .. } => *tenant_id,
        }
    }

    /// Returns the voucher the event is about.
    #[must_use]
    pub const fn voucher_id(&self) -> VoucherId {
        match self {
            Self::VoucherCreated { voucher_id, .. }
            | Self::VoucherEdited { voucher_id, .. }
            | Self::VoucherSubmitted { voucher_id, .. }
            | Self::VoucherPosted { voucher_id, .. }
            | Self::VoucherRejected { voucher_id, .. }
            | Self::VoucherCancelled { voucher_id, .. }
            | Self::VoucherDeleted { voucher_id, .. }
            | Self::ReversingVoucherCreated { voucher_id, .. } => *voucher_id,
        }
    }

    /// Returns the balance work still owed for this event.
    ///
    /// Only a post whose balances were not applied inline leaves work
    /// behind; reversals always run inline.
    #[must_use]
    pub const fn pending_balance_work(&self) -> Option<SyncDirection> {
        match self {
            Self::VoucherPosted {
                balances_applied: false,
                ..
            } => Some(SyncDirection::Apply),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deferred_post_leaves_work() {
        let event = LedgerEvent::VoucherPosted {
            tenant_id: TenantId::new(),
            voucher_id: VoucherId::new(),
            voucher_number: "GEN-2024Q1-0001".into(),
            balances_applied: false,
        };
        assert_eq!(event.pending_balance_work(), Some(SyncDirection::Apply));
    }

    #[test]
    fn test_inline_post_leaves_nothing() {
        let tenant_id = TenantId::new();
        let voucher_id = VoucherId::new();
        let event = LedgerEvent::VoucherPosted {
            tenant_id,
            voucher_id,
            voucher_number: "GEN-2024Q1-0001".into(),
            balances_applied: true,
        };
        assert_eq!(event.pending_balance_work(), None);
        assert_eq!(event.tenant_id(), tenant_id);
        assert_eq!(event.voucher_id(), voucher_id);
    }

    #[test]
    fn test_event_serializes_with_tag() {
        let event = LedgerEvent::VoucherCancelled {
            tenant_id: TenantId::new(),
            voucher_id: VoucherId::new(),
            deleted: true,
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "voucher_cancelled");
        assert_eq!(json["deleted"], true);
    }
}
