//! Workflow service for voucher state transitions.
//!
//! Pure state machine: callers load the voucher, run the checks here in
//! order (tenant, state, permission, period, validation), then persist the
//! returned `WorkflowAction` in one unit of work.

use chrono::Utc;
use tally_shared::types::{TenantId, UserId};

use crate::fiscal::AccountingPeriod;
use crate::ledger::error::ValidationError;
use crate::ledger::voucher::Voucher;
use crate::workflow::error::WorkflowError;
use crate::workflow::permission::{Actor, PermissionChecker};
use crate::workflow::types::{VoucherAction, VoucherStatus, WorkflowAction};

/// Stateless service for managing voucher workflow transitions.
pub struct WorkflowService;

impl WorkflowService {
    /// Submit a draft voucher for approval.
    ///
    /// # Errors
    ///
    /// `InvalidStateTransition` unless the voucher is in Draft.
    pub fn submit(
        current_status: VoucherStatus,
        submitted_by: UserId,
    ) -> Result<WorkflowAction, WorkflowError> {
        match current_status {
            VoucherStatus::Draft => Ok(WorkflowAction::Submit {
                new_status: VoucherStatus::PendingApproval,
                submitted_by,
                submitted_at: Utc::now(),
            }),
            _ => Err(WorkflowError::InvalidStateTransition {
                action: VoucherAction::Submit,
                from: current_status,
            }),
        }
    }

    /// Approve and post a pending or rejected voucher.
    ///
    /// # Arguments
    /// * `current_status` - The current status of the voucher
    /// * `approved_by` - The approving user
    /// * `has_number` - Whether a document number is already assigned
    /// * `comment` - Optional approver comment
    ///
    /// # Errors
    ///
    /// `InvalidStateTransition` from any other status.
    pub fn approve(
        current_status: VoucherStatus,
        approved_by: UserId,
        has_number: bool,
        comment: Option<String>,
    ) -> Result<WorkflowAction, WorkflowError> {
        match current_status {
            VoucherStatus::PendingApproval | VoucherStatus::Rejected => Ok(WorkflowAction::Approve {
                from: current_status,
                new_status: VoucherStatus::Posted,
                approved_by,
                approved_at: Utc::now(),
                assign_number: !has_number,
                comment: comment.filter(|c| !c.trim().is_empty()),
            }),
            _ => Err(WorkflowError::InvalidStateTransition {
                action: VoucherAction::Approve,
                from: current_status,
            }),
        }
    }

    /// Reject a pending voucher back to the preparer.
    ///
    /// # Errors
    ///
    /// `InvalidStateTransition` unless pending, then `CommentRequired` if
    /// the reason is blank.
    pub fn reject(
        current_status: VoucherStatus,
        rejected_by: UserId,
        reason: String,
    ) -> Result<WorkflowAction, WorkflowError> {
        match current_status {
            VoucherStatus::PendingApproval => {
                if reason.trim().is_empty() {
                    return Err(ValidationError::CommentRequired.into());
                }
                Ok(WorkflowAction::Reject {
                    new_status: VoucherStatus::Rejected,
                    rejected_by,
                    reason,
                })
            }
            _ => Err(WorkflowError::InvalidStateTransition {
                action: VoucherAction::Reject,
                from: current_status,
            }),
        }
    }

    /// Cancel a posted voucher.
    ///
    /// # Errors
    ///
    /// `InvalidStateTransition` unless the voucher is Posted.
    pub fn cancel(
        current_status: VoucherStatus,
        cancelled_by: UserId,
        reason: Option<String>,
    ) -> Result<WorkflowAction, WorkflowError> {
        match current_status {
            VoucherStatus::Posted => Ok(WorkflowAction::Cancel {
                new_status: VoucherStatus::Cancelled,
                cancelled_by,
                reason: reason.filter(|r| !r.trim().is_empty()),
            }),
            _ => Err(WorkflowError::InvalidStateTransition {
                action: VoucherAction::Cancel,
                from: current_status,
            }),
        }
    }

    /// Soft-delete a voucher.
    ///
    /// Draft and Rejected vouchers are deleted as they are. A Posted voucher
    /// is cancelled on the way out and its balance effects reversed.
    ///
    /// # Errors
    ///
    /// `InvalidStateTransition` for PendingApproval and Cancelled.
    pub fn delete(
        current_status: VoucherStatus,
        deleted_by: UserId,
    ) -> Result<WorkflowAction, WorkflowError> {
        let new_status = match current_status {
            VoucherStatus::Draft | VoucherStatus::Rejected => current_status,
            VoucherStatus::Posted => VoucherStatus::Cancelled,
            VoucherStatus::PendingApproval | VoucherStatus::Cancelled => {
                return Err(WorkflowError::InvalidStateTransition {
                    action: VoucherAction::Delete,
                    from: current_status,
                });
            }
        };
        Ok(WorkflowAction::Delete {
            from: current_status,
            new_status,
            deleted_by,
            deleted_at: Utc::now(),
        })
    }

    /// Checks that lines and header fields may be changed.
    ///
    /// # Errors
    ///
    /// `InvalidStateTransition` unless in Draft or Rejected.
    pub fn ensure_editable(current_status: VoucherStatus) -> Result<(), WorkflowError> {
        if current_status.is_editable() {
            Ok(())
        } else {
            Err(WorkflowError::InvalidStateTransition {
                action: VoucherAction::Edit,
                from: current_status,
            })
        }
    }

    /// Checks that the voucher belongs to the acting tenant.
    ///
    /// # Errors
    ///
    /// `TenantMismatch` otherwise.
    pub fn ensure_tenant(tenant_id: TenantId, voucher: &Voucher) -> Result<(), WorkflowError> {
        if voucher.tenant_id == tenant_id {
            Ok(())
        } else {
            Err(WorkflowError::TenantMismatch {
                tenant_id,
                voucher_id: voucher.id,
            })
        }
    }

    /// Checks the actor's permission for an action.
    ///
    /// # Errors
    ///
    /// `PermissionDenied` if the checker refuses.
    pub fn authorize(
        checker: &dyn PermissionChecker,
        actor: &Actor,
        action: VoucherAction,
        voucher: Option<&Voucher>,
    ) -> Result<(), WorkflowError> {
        if checker.has_permission(actor, action, voucher) {
            Ok(())
        } else {
            Err(WorkflowError::PermissionDenied {
                action,
                user_id: actor.user_id,
            })
        }
    }

    /// Checks that the period accepts changes.
    ///
    /// # Errors
    ///
    /// `PeriodLocked` if the period is locked.
    pub fn ensure_period_open(period: &AccountingPeriod) -> Result<(), WorkflowError> {
        if period.locked {
            Err(WorkflowError::PeriodLocked(period.id))
        } else {
            Ok(())
        }
    }

    /// Check if a status transition is valid.
    ///
    /// Valid transitions:
    /// - Draft → PendingApproval (submit)
    /// - PendingApproval → Posted (approve)
    /// - PendingApproval → Rejected (reject)
    /// - Rejected → Posted (approve)
    /// - Posted → Cancelled (cancel or delete)
    #[must_use]
    pub fn is_valid_transition(from: VoucherStatus, to: VoucherStatus) -> bool {
        matches!(
            (from, to),
            (VoucherStatus::Draft, VoucherStatus::PendingApproval)
                | (
                    VoucherStatus::PendingApproval,
                    VoucherStatus::Posted | VoucherStatus::Rejected
                )
                | (VoucherStatus::Rejected, VoucherStatus::Posted)
                | (VoucherStatus::Posted, VoucherStatus::Cancelled)
        )
    }

    /// Checks a status change against the transition table before it is
    /// persisted. Deleting a Draft or Rejected voucher keeps its status.
    ///
    /// # Errors
    ///
    /// `InvalidStateTransition` if the table does not allow `from` to `to`.
    pub fn ensure_transition(
        action: VoucherAction,
        from: VoucherStatus,
        to: VoucherStatus,
    ) -> Result<(), WorkflowError> {
        let unchanged = action == VoucherAction::Delete && from == to;
        if unchanged || Self::is_valid_transition(from, to) {
            Ok(())
        } else {
            Err(WorkflowError::InvalidStateTransition { action, from })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::balance::SyncDirection;
    use crate::ledger::voucher::VoucherType;
    use crate::workflow::permission::{Role, RolePermissions};
    use chrono::NaiveDate;
    use tally_shared::types::PeriodId;
    use rstest::rstest;

    #[test]
    fn test_submit_from_draft() {
        let action = WorkflowService::submit(VoucherStatus::Draft, UserId::new()).unwrap();
        assert_eq!(action.new_status(), VoucherStatus::PendingApproval);
        assert_eq!(action.balance_effect(), None);
    }

    #[test]
    fn test_submit_from_non_draft_fails() {
        let result = WorkflowService::submit(VoucherStatus::Posted, UserId::new());
        assert!(matches!(
            result,
            Err(WorkflowError::InvalidStateTransition {
                action: VoucherAction::Submit,
                from: VoucherStatus::Posted
            })
        ));
    }

    #[test]
    fn test_approve_from_pending_assigns_number() {
        let action =
            WorkflowService::approve(VoucherStatus::PendingApproval, UserId::new(), false, None)
                .unwrap();
        assert_eq!(action.new_status(), VoucherStatus::Posted);
        assert_eq!(action.balance_effect(), Some(SyncDirection::Apply));
        assert!(matches!(
            action,
            WorkflowAction::Approve {
                assign_number: true,
                ..
            }
        ));
    }

    #[test]
    fn test_approve_from_rejected_keeps_number() {
        let action =
            WorkflowService::approve(VoucherStatus::Rejected, UserId::new(), true, None).unwrap();
        assert!(matches!(
            action,
            WorkflowAction::Approve {
                assign_number: false,
                from: VoucherStatus::Rejected,
                ..
            }
        ));
    }

    #[test]
    fn test_approve_from_draft_fails() {
        let result = WorkflowService::approve(VoucherStatus::Draft, UserId::new(), false, None);
        assert!(matches!(
            result,
            Err(WorkflowError::InvalidStateTransition { .. })
        ));
    }

    #[test]
    fn test_reject_requires_comment() {
        let result =
            WorkflowService::reject(VoucherStatus::PendingApproval, UserId::new(), "  ".into());
        assert!(matches!(
            result,
            Err(WorkflowError::Validation(ValidationError::CommentRequired))
        ));
    }

    #[test]
    fn test_reject_from_draft_is_state_error_first() {
        let result = WorkflowService::reject(VoucherStatus::Draft, UserId::new(), String::new());
        assert!(matches!(
            result,
            Err(WorkflowError::InvalidStateTransition { .. })
        ));
    }

    #[test]
    fn test_delete_rules() {
        let user = UserId::new();
        let draft = WorkflowService::delete(VoucherStatus::Draft, user).unwrap();
        assert_eq!(draft.new_status(), VoucherStatus::Draft);
        assert_eq!(draft.balance_effect(), None);

        let posted = WorkflowService::delete(VoucherStatus::Posted, user).unwrap();
        assert_eq!(posted.new_status(), VoucherStatus::Cancelled);
        assert_eq!(posted.balance_effect(), Some(SyncDirection::Reverse));

        assert!(WorkflowService::delete(VoucherStatus::PendingApproval, user).is_err());
        assert!(WorkflowService::delete(VoucherStatus::Cancelled, user).is_err());
    }

    #[test]
    fn test_cancel_only_from_posted() {
        let user = UserId::new();
        assert!(WorkflowService::cancel(VoucherStatus::Posted, user, None).is_ok());
        for status in [
            VoucherStatus::Draft,
            VoucherStatus::PendingApproval,
            VoucherStatus::Rejected,
            VoucherStatus::Cancelled,
        ] {
            assert!(WorkflowService::cancel(status, user, None).is_err());
        }
    }

    #[test]
    fn test_ensure_editable() {
        assert!(WorkflowService::ensure_editable(VoucherStatus::Draft).is_ok());
        assert!(WorkflowService::ensure_editable(VoucherStatus::Rejected).is_ok());
        assert!(WorkflowService::ensure_editable(VoucherStatus::PendingApproval).is_err());
        assert!(WorkflowService::ensure_editable(VoucherStatus::Posted).is_err());
    }

    #[test]
    fn test_ensure_tenant() {
        let voucher = Voucher::draft(
            TenantId::new(),
            VoucherType::General,
            PeriodId::new(),
            NaiveDate::from_ymd_opt(2024, 1, 5).unwrap(),
            UserId::new(),
        );
        assert!(WorkflowService::ensure_tenant(voucher.tenant_id, &voucher).is_ok());
        assert!(matches!(
            WorkflowService::ensure_tenant(TenantId::new(), &voucher),
            Err(WorkflowError::TenantMismatch { .. })
        ));
    }

    #[test]
    fn test_authorize() {
        let checker = RolePermissions::default();
        let auditor = Actor::new(UserId::new(), Role::Auditor);
        let result = WorkflowService::authorize(&checker, &auditor, VoucherAction::Approve, None);
        assert!(matches!(result, Err(WorkflowError::PermissionDenied { .. })));
    }

    #[test]
    fn test_ensure_period_open() {
        let mut period = AccountingPeriod::new(
            TenantId::new(),
            "Q1 2024",
            NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
            NaiveDate::from_ymd_opt(2024, 3, 31).unwrap(),
        );
        assert!(WorkflowService::ensure_period_open(&period).is_ok());
        period.locked = true;
        assert!(matches!(
            WorkflowService::ensure_period_open(&period),
            Err(WorkflowError::PeriodLocked(_))
        ));
    }

    #[test]
    fn test_valid_transitions() {
        assert!(WorkflowService::is_valid_transition(
            VoucherStatus::Draft,
            VoucherStatus::PendingApproval
        ));
        assert!(WorkflowService::is_valid_transition(
            VoucherStatus::Rejected,
            VoucherStatus::Posted
        ));
        assert!(!WorkflowService::is_valid_transition(
            VoucherStatus::Draft,
            VoucherStatus::Posted
        ));
        assert!(!WorkflowService::is_valid_transition(
            VoucherStatus::Cancelled,
            VoucherStatus::Posted
        ));
    }

    #[rstest]
    #[case(VoucherAction::Submit, VoucherStatus::Draft, VoucherStatus::PendingApproval, true)]
    #[case(VoucherAction::Approve, VoucherStatus::Rejected, VoucherStatus::Posted, true)]
    #[case(VoucherAction::Delete, VoucherStatus::Draft, VoucherStatus::Draft, true)]
    #[case(VoucherAction::Delete, VoucherStatus::Posted, VoucherStatus::Cancelled, true)]
    #[case(VoucherAction::Approve, VoucherStatus::Draft, VoucherStatus::Posted, false)]
    #[case(VoucherAction::Submit, VoucherStatus::Draft, VoucherStatus::Draft, false)]
    #[case(VoucherAction::Cancel, VoucherStatus::Cancelled, VoucherStatus::Cancelled, false)]
    fn test_ensure_transition(
        #[case] action: VoucherAction,
        #[case] from: VoucherStatus,
        #[case] to: VoucherStatus,
        #[case] allowed: bool,
    ) {
        let result = WorkflowService::ensure_transition(action, from, to);
        if allowed {
            assert!(result.is_ok());
        } else {
            assert!(matches!(
                result,
                Err(WorkflowError::InvalidStateTransition { action: a, from: f }) if a == action && f == from
            ));
        }
    }
}
