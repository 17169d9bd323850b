//! Workflow domain types for the voucher lifecycle.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use tally_shared::types::{ApprovalId, TenantId, UserId, VoucherId};

use crate::ledger::balance::SyncDirection;

/// Voucher status in the approval workflow.
///
/// Valid transitions:
/// - Draft → PendingApproval (submit)
/// - PendingApproval → Posted (approve)
/// - PendingApproval → Rejected (reject)
/// - Rejected → Posted (approve)
/// - Posted → Cancelled (cancel, or delete of a posted voucher)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VoucherStatus {
    /// Being prepared; lines are freely editable.
    Draft,
    /// Submitted and waiting for an approver; locked.
    PendingApproval,
    /// In the books; immutable.
    Posted,
    /// Sent back by an approver; editable again.
    Rejected,
    /// Posting undone by reversal; terminal.
    Cancelled,
}

impl VoucherStatus {
    /// All statuses.
    pub const ALL: [Self; 5] = [
        Self::Draft,
        Self::PendingApproval,
        Self::Posted,
        Self::Rejected,
        Self::Cancelled,
    ];

    /// Returns the string representation of the status.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::PendingApproval => "pending_approval",
            Self::Posted => "posted",
            Self::Rejected => "rejected",
            Self::Cancelled => "cancelled",
        }
    }

    /// Parses a status from a string.
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "draft" => Some(Self::Draft),
            "pending_approval" | "pending" => Some(Self::PendingApproval),
            "posted" => Some(Self::Posted),
            "rejected" => Some(Self::Rejected),
            "cancelled" | "canceled" => Some(Self::Cancelled),
            _ => None,
        }
    }

    /// Returns true if lines and header fields may change.
    #[must_use]
    pub const fn is_editable(&self) -> bool {
        matches!(self, Self::Draft | Self::Rejected)
    }

    /// Returns true if no further transition is possible.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

impl fmt::Display for VoucherStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Actions gated by the permission checker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VoucherAction {
    /// Create a draft.
    Create,
    /// Change an editable voucher.
    Edit,
    /// Send a draft for approval.
    Submit,
    /// Approve and post.
    Approve,
    /// Send back to the preparer.
    Reject,
    /// Delete a voucher.
    Delete,
    /// Cancel a posted voucher.
    Cancel,
    /// Raise a reversing voucher.
    Reverse,
    /// Add a comment to the audit log.
    Comment,
}

impl VoucherAction {
    /// Returns the string representation of the action.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Edit => "edit",
            Self::Submit => "submit",
            Self::Approve => "approve",
            Self::Reject => "reject",
            Self::Delete => "delete",
            Self::Cancel => "cancel",
            Self::Reverse => "reverse",
            Self::Comment => "comment",
        }
    }
}

impl fmt::Display for VoucherAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Kind of entry in the approval audit log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ApprovalAction {
    /// Voucher was submitted.
    Submitted,
    /// Voucher was approved and posted.
    Approved,
    /// Voucher was rejected.
    Rejected,
    /// Voucher was cancelled or deleted after posting.
    Cancelled,
    /// Free-form note.
    Commented,
}

impl ApprovalAction {
    /// Returns the string representation.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Submitted => "submitted",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
            Self::Cancelled => "cancelled",
            Self::Commented => "commented",
        }
    }
}

/// Append-only audit log entry for a voucher.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoucherApproval {
    /// Unique identifier.
    pub id: ApprovalId,
    /// Owning tenant.
    pub tenant_id: TenantId,
    /// Voucher the entry is about.
    pub voucher_id: VoucherId,
    /// What happened.
    pub action: ApprovalAction,
    /// Status before the action.
    pub from_status: VoucherStatus,
    /// Status after the action.
    pub to_status: VoucherStatus,
    /// Who did it.
    pub actor: UserId,
    /// When.
    pub created_at: DateTime<Utc>,
    /// Optional comment.
    pub comment: Option<String>,
}

/// Validated state transition with its audit data and side effects.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkflowAction {
    /// Draft → PendingApproval.
    Submit {
        /// Status after submission.
        new_status: VoucherStatus,
        /// Submitter.
        submitted_by: UserId,
        /// Submission time.
        submitted_at: DateTime<Utc>,
    },
    /// PendingApproval or Rejected → Posted.
    Approve {
        /// Status before approval.
        from: VoucherStatus,
        /// Status after approval.
        new_status: VoucherStatus,
        /// Approver, also recorded as poster.
        approved_by: UserId,
        /// Approval time.
        approved_at: DateTime<Utc>,
        /// True if no number has been assigned yet.
        assign_number: bool,
        /// Optional approver comment.
        comment: Option<String>,
    },
    /// PendingApproval → Rejected.
    Reject {
        /// Status after rejection.
        new_status: VoucherStatus,
        /// Rejecting user.
        rejected_by: UserId,
        /// Mandatory reason.
        reason: String,
    },
    /// Posted → Cancelled, balances reversed in the same unit of work.
    Cancel {
        /// Status after cancellation.
        new_status: VoucherStatus,
        /// Cancelling user.
        cancelled_by: UserId,
        /// Optional reason.
        reason: Option<String>,
    },
    /// Soft delete; a posted voucher is cancelled on the way out.
    Delete {
        /// Status before deletion.
        from: VoucherStatus,
        /// Status after deletion.
        new_status: VoucherStatus,
        /// Deleting user.
        deleted_by: UserId,
        /// Deletion time.
        deleted_at: DateTime<Utc>,
    },
}

impl WorkflowAction {
    /// Returns the new status resulting from this action.
    #[must_use]
    pub const fn new_status(&self) -> VoucherStatus {
        match self {
            Self::Submit { new_status, .. }
            | Self::Approve { new_status, .. }
            | Self::Reject { new_status, .. }
            | Self::Cancel { new_status, .. }
            | Self::Delete { new_status, .. } => *new_status,
        }
    }

    /// Returns the balance work this action requires, if any.
    #[must_use]
    pub const fn balance_effect(&self) -> Option<SyncDirection> {
        match self {
            Self::Approve { .. } => Some(SyncDirection::Apply),
            Self::Cancel { .. } => Some(SyncDirection::Reverse),
            Self::Delete { from, .. } => match from {
                VoucherStatus::Posted => Some(SyncDirection::Reverse),
                _ => None,
            },
            Self::Submit { .. } | Self::Reject { .. } => None,
        }
    }

    /// Returns the audit log kind for this action, if it is logged.
    #[must_use]
    pub const fn approval_action(&self) -> Option<ApprovalAction> {
        match self {
            Self::Submit { .. } => Some(ApprovalAction::Submitted),
            Self::Approve { .. } => Some(ApprovalAction::Approved),
            Self::Reject { .. } => Some(ApprovalAction::Rejected),
            Self::Cancel { .. } => Some(ApprovalAction::Cancelled),
            Self::Delete { from, .. } => match from {
                VoucherStatus::Posted => Some(ApprovalAction::Cancelled),
                _ => None,
            },
        }
    }

    /// Returns the acting user.
    #[must_use]
    pub const fn actor(&self) -> UserId {
        match self {
            Self::Submit { submitted_by, .. } => *submitted_by,
            Self::Approve { approved_by, .. } => *approved_by,
            Self::Reject { rejected_by, .. } => *rejected_by,
            Self::Cancel { cancelled_by, .. } => *cancelled_by,
            Self::Delete { deleted_by, .. } => *deleted_by,
        }
    }

    /// Returns the comment to record in the audit log.
    #[must_use]
    pub fn comment(&self) -> Option<String> {
        match self {
            Self::Submit { .. } => Some("Submitted for approval.".to_string()),
            Self::Approve { comment, .. } => comment
                .clone()
                .or_else(|| Some("Approved and posted.".to_string())),
            Self::Reject { reason, .. } => Some(reason.clone()),
            Self::Cancel { reason, .. } => reason.clone(),
            Self::Delete { .. } => Some("Deleted after posting.".to_string()),
        }
    }

    /// Builds the audit log entry for this action.
    #[must_use]
    pub fn approval_entry(
        &self,
        tenant_id: TenantId,
        voucher_id: VoucherId,
        from_status: VoucherStatus,
    ) -> Option<VoucherApproval> {
        self.approval_action().map(|action| VoucherApproval {
            id: ApprovalId::new(),
            tenant_id,
            voucher_id,
            action,
            from_status,
            to_status: self.new_status(),
            actor: self.actor(),
            created_at: Utc::now(),
            comment: self.comment(),
        })
    }
}
