//! Property-based tests for WorkflowService.
//!
//! - Every successful transition is one `is_valid_transition` allows
//! - Every refused transition is an `InvalidStateTransition` from the
//!   current status
//! - Only approve applies balances; only leaving Posted reverses them

use proptest::prelude::*;
use tally_shared::types::UserId;
use uuid::Uuid;

use crate::ledger::balance::SyncDirection;
use crate::workflow::error::WorkflowError;
use crate::workflow::service::WorkflowService;
use crate::workflow::types::{VoucherStatus, WorkflowAction};

/// Strategy for generating random VoucherStatus values.
fn arb_status() -> impl Strategy<Value = VoucherStatus> {
    prop::sample::select(VoucherStatus::ALL.to_vec())
}

/// Strategy for generating random user ids.
fn arb_user() -> impl Strategy<Value = UserId> {
    any::<u128>().prop_map(|n| UserId::from_uuid(Uuid::from_u128(n)))
}

/// Strategy for generating non-blank reasons.
fn arb_reason() -> impl Strategy<Value = String> {
    "[a-zA-Z0-9]{1,40}"
}

/// Runs every transition operation from one status.
fn attempts(status: VoucherStatus, user: UserId, reason: &str) -> Vec<Result<WorkflowAction, WorkflowError>> {
    vec![
        WorkflowService::submit(status, user),
        WorkflowService::approve(status, user, false, None),
        WorkflowService::reject(status, user, reason.to_string()),
        WorkflowService::cancel(status, user, None),
    ]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    /// Successful transitions agree with the transition table.
    #[test]
    fn prop_success_matches_table(status in arb_status(), user in arb_user(), reason in arb_reason()) {
        for result in attempts(status, user, &reason) {
            if let Ok(action) = result {
                prop_assert!(
                    WorkflowService::is_valid_transition(status, action.new_status()),
                    "{:?} -> {:?} is not in the table",
                    status,
                    action.new_status()
                );
                prop_assert_eq!(action.actor(), user);
            }
        }
    }

    /// Refusals always name the status the voucher is in.
    #[test]
    fn prop_refusal_reports_current_status(status in arb_status(), user in arb_user(), reason in arb_reason()) {
        for result in attempts(status, user, &reason) {
            if let Err(err) = result {
                match err {
                    WorkflowError::InvalidStateTransition { from, .. } => prop_assert_eq!(from, status),
                    other => prop_assert!(false, "unexpected error {:?}", other),
                }
            }
        }
    }

    /// Cancelled is terminal.
    #[test]
    fn prop_cancelled_is_terminal(user in arb_user(), reason in arb_reason()) {
        for result in attempts(VoucherStatus::Cancelled, user, &reason) {
            prop_assert!(result.is_err());
        }
        prop_assert!(WorkflowService::delete(VoucherStatus::Cancelled, user).is_err());
    }

    /// Balance effects follow the status crossing into or out of Posted.
    #[test]
    fn prop_balance_effect_tracks_posted(status in arb_status(), user in arb_user(), reason in arb_reason()) {
        let mut all = attempts(status, user, &reason);
        all.push(WorkflowService::delete(status, user));
        for action in all.into_iter().flatten() {
            let expected = match (status, action.new_status()) {
                (from, VoucherStatus::Posted) if from != VoucherStatus::Posted => Some(SyncDirection::Apply),
                (VoucherStatus::Posted, to) if to != VoucherStatus::Posted => Some(SyncDirection::Reverse),
                _ => None,
            };
            prop_assert_eq!(action.balance_effect(), expected);
        }
    }

    /// Blank rejection reasons are refused for pending vouchers.
    #[test]
    fn prop_blank_reason_refused(user in arb_user(), blanks in "[ \t]{0,10}") {
        let result = WorkflowService::reject(VoucherStatus::PendingApproval, user, blanks);
        prop_assert!(matches!(result, Err(WorkflowError::Validation(_))));
    }
}
