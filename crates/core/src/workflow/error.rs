//! Workflow error types for the voucher lifecycle.
//!
//! Every failure of a transition maps to exactly one variant here. Errors
//! raised before commit leave no partial state behind.

use tally_shared::AppError;
use tally_shared::types::{PeriodId, TenantId, UserId, VoucherId};
use thiserror::Error;

use crate::ledger::error::ValidationError;
use crate::workflow::types::{VoucherAction, VoucherStatus};

/// Errors that can occur during workflow operations.
#[derive(Debug, Error)]
pub enum WorkflowError {
    /// Structural problem with the voucher or its lines.
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// The action is not legal for the current status.
    #[error("Cannot {action} a voucher in status {from}")]
    InvalidStateTransition {
        /// The attempted action.
        action: VoucherAction,
        /// The current status.
        from: VoucherStatus,
    },

    /// The owning accounting period is locked.
    #[error("Accounting period {0} is locked")]
    PeriodLocked(PeriodId),

    /// The actor lacks the permission for the action.
    #[error("User {user_id} is not permitted to {action} vouchers")]
    PermissionDenied {
        /// The attempted action.
        action: VoucherAction,
        /// The acting user.
        user_id: UserId,
    },

    /// Number allocation failed; the transition was aborted.
    #[error("Sequence generation failed: {0}")]
    SequenceGeneration(String),

    /// Balance synchronization failed.
    #[error("Balance sync failed: {0}")]
    BalanceSync(String),

    /// Voucher not found within the acting tenant.
    #[error("Voucher {0} not found")]
    VoucherNotFound(VoucherId),

    /// Tenant not found or inactive.
    #[error("Tenant {0} not found")]
    TenantNotFound(TenantId),

    /// No tenant supplied by the caller.
    #[error("No active tenant")]
    MissingTenant,

    /// The record belongs to another tenant.
    #[error("Voucher {voucher_id} does not belong to tenant {tenant_id}")]
    TenantMismatch {
        /// The acting tenant.
        tenant_id: TenantId,
        /// The foreign voucher.
        voucher_id: VoucherId,
    },

    /// A reversing voucher already exists.
    #[error("Voucher {0} has already been reversed")]
    AlreadyReversed(VoucherId),

    /// Database error.
    #[error("Database error: {0}")]
    Database(String),
}

impl WorkflowError {
    /// Returns the HTTP status code for this error.
    #[must_use]
    pub const fn status_code(&self) -> u16 {
        match self {
            Self::Validation(_) => 400,
            Self::InvalidStateTransition { .. }
            | Self::PeriodLocked(_)
            | Self::AlreadyReversed(_) => 422,
            Self::PermissionDenied { .. } | Self::TenantMismatch { .. } => 403,
            Self::VoucherNotFound(_) | Self::TenantNotFound(_) => 404,
            Self::MissingTenant => 401,
            Self::SequenceGeneration(_) => 409,
            Self::BalanceSync(_) | Self::Database(_) => 500,
        }
    }

    /// Returns the error code for callers surfacing this error.
    #[must_use]
    pub const fn error_code(&self) -> &'static str {
        match self {
            Self::Validation(e) => e.error_code(),
            Self::InvalidStateTransition { .. } => "INVALID_STATE_TRANSITION",
            Self::PeriodLocked(_) => "PERIOD_LOCKED",
            Self::PermissionDenied { .. } => "PERMISSION_DENIED",
            Self::SequenceGeneration(_) => "SEQUENCE_GENERATION_FAILED",
            Self::BalanceSync(_) => "BALANCE_SYNC_FAILED",
            Self::VoucherNotFound(_) => "VOUCHER_NOT_FOUND",
            Self::TenantNotFound(_) => "TENANT_NOT_FOUND",
            Self::MissingTenant => "MISSING_TENANT",
            Self::TenantMismatch { .. } => "TENANT_MISMATCH",
            Self::AlreadyReversed(_) => "ALREADY_REVERSED",
            Self::Database(_) => "DATABASE_ERROR",
        }
    }

    /// Returns true if repeating the operation may succeed.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::SequenceGeneration(_) | Self::BalanceSync(_) | Self::Database(_)
        )
    }
}

impl From<WorkflowError> for AppError {
    fn from(err: WorkflowError) -> Self {
        let message = err.to_string();
        match err {
            WorkflowError::Validation(_) => Self::Validation(message),
            WorkflowError::InvalidStateTransition { .. }
            | WorkflowError::PeriodLocked(_)
            | WorkflowError::AlreadyReversed(_) => Self::BusinessRule(message),
            WorkflowError::PermissionDenied { .. }
            | WorkflowError::TenantMismatch { .. }
            | WorkflowError::MissingTenant => Self::Forbidden(message),
            WorkflowError::VoucherNotFound(_) | WorkflowError::TenantNotFound(_) => {
                Self::NotFound(message)
            }
            WorkflowError::SequenceGeneration(_) => Self::Conflict(message),
            WorkflowError::Database(_) => Self::Database(message),
            WorkflowError::BalanceSync(_) => Self::Internal(message),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_invalid_transition_error() {
        let err = WorkflowError::InvalidStateTransition {
            action: VoucherAction::Approve,
            from: VoucherStatus::Draft,
        };
        assert_eq!(err.status_code(), 422);
        assert_eq!(err.error_code(), "INVALID_STATE_TRANSITION");
        assert_eq!(err.to_string(), "Cannot approve a voucher in status draft");
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_validation_passes_through_code() {
        let err: WorkflowError = ValidationError::Unbalanced {
            debit: dec!(10),
            credit: dec!(5),
        }
        .into();
        assert_eq!(err.status_code(), 400);
        assert_eq!(err.error_code(), "UNBALANCED_VOUCHER");
        assert!(err.to_string().contains("Debit: 10"));
    }

    #[test]
    fn test_retryable_errors() {
        assert!(WorkflowError::SequenceGeneration("lock timeout".into()).is_retryable());
        assert!(WorkflowError::BalanceSync("deadlock".into()).is_retryable());
        assert!(!WorkflowError::PeriodLocked(PeriodId::new()).is_retryable());
        assert!(!WorkflowError::MissingTenant.is_retryable());
    }

    #[test]
    fn test_permission_denied_error() {
        let err = WorkflowError::PermissionDenied {
            action: VoucherAction::Reject,
            user_id: UserId::new(),
        };
        assert_eq!(err.status_code(), 403);
        assert_eq!(err.error_code(), "PERMISSION_DENIED");
        assert!(err.to_string().contains("reject"));
    }

    #[test]
    fn test_into_app_error() {
        let app: AppError = WorkflowError::PeriodLocked(PeriodId::new()).into();
        assert_eq!(app.error_code(), "BUSINESS_RULE_VIOLATION");

        let app: AppError = WorkflowError::VoucherNotFound(VoucherId::new()).into();
        assert_eq!(app.status_code(), 404);

        let app: AppError = WorkflowError::MissingTenant.into();
        assert_eq!(app.status_code(), 403);
    }
}
