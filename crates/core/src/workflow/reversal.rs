//! Reversing vouchers for posted documents.
//!
//! A reversing voucher carries the same lines with debit and credit
//! swapped, so posting it nets every affected account back to zero while
//! both documents stay in the books.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::ledger::error::ValidationError;
use crate::ledger::types::LineInput;
use crate::ledger::voucher::{NewVoucher, Voucher, VoucherLine, VoucherType};
use crate::workflow::error::WorkflowError;
use crate::workflow::types::VoucherAction;

/// Maximum number of characters of the original narration carried over.
pub const ORIGINAL_NARRATION_LIMIT: usize = 150;

/// Options for creating a reversing voucher.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReversalRequest {
    /// Date of the reversing voucher; defaults to the original's date.
    pub date: Option<NaiveDate>,
    /// Type of the reversing voucher; defaults to General.
    pub voucher_type: Option<VoucherType>,
    /// Number and post the reversing voucher right away.
    pub post_immediately: bool,
}

/// Stateless service for building reversing vouchers.
pub struct ReversalService;

impl ReversalService {
    /// Checks that a voucher can be reversed.
    ///
    /// # Errors
    ///
    /// `InvalidStateTransition` unless the voucher is a live Posted voucher,
    /// `AlreadyReversed` if it has been reversed before.
    pub fn ensure_reversible(original: &Voucher) -> Result<(), WorkflowError> {
        if !original.is_live_posted() {
            return Err(WorkflowError::InvalidStateTransition {
                action: VoucherAction::Reverse,
                from: original.status,
            });
        }
        if original.is_reversed || original.reversed_by_voucher.is_some() {
            return Err(WorkflowError::AlreadyReversed(original.id));
        }
        Ok(())
    }

    /// Swaps the side of every line, keeping account and amount.
    ///
    /// # Errors
    ///
    /// `NothingToReverse` if there are no lines.
    pub fn reversing_lines(lines: &[VoucherLine]) -> Result<Vec<LineInput>, ValidationError> {
        if lines.is_empty() {
            return Err(ValidationError::NothingToReverse);
        }
        Ok(lines
            .iter()
            .map(|line| LineInput {
                account_id: line.account_id,
                dr_cr: line.dr_cr.opposite(),
                amount: line.amount,
                narration: format!("Reversal - {}", line.narration),
            })
            .collect())
    }

    /// Returns the narration of the reversing voucher.
    #[must_use]
    pub fn narration(original: &Voucher) -> String {
        let mut narration = format!("Reversal of: {}", original.display_ref());
        let orig = original.narration.trim();
        if !orig.is_empty() {
            let truncated: String = orig.chars().take(ORIGINAL_NARRATION_LIMIT).collect();
            narration.push_str(" - Orig: ");
            narration.push_str(&truncated);
        }
        narration
    }

    /// Builds the draft of a reversing voucher.
    ///
    /// # Errors
    ///
    /// See [`Self::ensure_reversible`] and [`Self::reversing_lines`].
    pub fn build(
        original: &Voucher,
        lines: &[VoucherLine],
        request: &ReversalRequest,
    ) -> Result<NewVoucher, WorkflowError> {
        Self::ensure_reversible(original)?;
        let reversed = Self::reversing_lines(lines)?;

        Ok(NewVoucher {
            voucher_type: request.voucher_type.unwrap_or(VoucherType::General),
            date: request.date.unwrap_or(original.date),
            party_id: original.party_id,
            narration: Self::narration(original),
            reference: Some(format!("REV-{}", original.display_ref())),
            lines: reversed,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::types::DrCr;
    use crate::ledger::voucher::line_totals;
    use crate::workflow::types::VoucherStatus;
    use rust_decimal_macros::dec;
    use tally_shared::types::{AccountId, PeriodId, TenantId, UserId, VoucherId};

    fn posted_voucher() -> Voucher {
        let mut v = Voucher::draft(
            TenantId::new(),
            VoucherType::Sales,
            PeriodId::new(),
            NaiveDate::from_ymd_opt(2024, 2, 1).unwrap(),
            UserId::new(),
        );
        v.status = VoucherStatus::Posted;
        v.voucher_number = Some("ACME-SAL-2024Q1-0007".into());
        v.narration = "Invoice 7".into();
        v
    }

    fn lines(voucher_id: VoucherId) -> Vec<VoucherLine> {
        vec![
            VoucherLine::from_input(
                voucher_id,
                &LineInput::debit(AccountId::new(), dec!(250.00)).with_narration("AR"),
            ),
            VoucherLine::from_input(voucher_id, &LineInput::credit(AccountId::new(), dec!(250.00))),
        ]
    }

    #[test]
    fn test_build_swaps_sides() {
        let original = posted_voucher();
        let original_lines = lines(original.id);
        let draft = ReversalService::build(&original, &original_lines, &ReversalRequest::default()).unwrap();

        assert_eq!(draft.voucher_type, VoucherType::General);
        assert_eq!(draft.date, original.date);
        assert_eq!(draft.lines.len(), 2);
        assert_eq!(draft.lines[0].dr_cr, DrCr::Credit);
        assert_eq!(draft.lines[0].amount, dec!(250.00));
        assert_eq!(draft.lines[0].narration, "Reversal - AR");
        assert_eq!(draft.lines[1].dr_cr, DrCr::Debit);
        assert_eq!(draft.reference.as_deref(), Some("REV-ACME-SAL-2024Q1-0007"));
        assert_eq!(
            draft.narration,
            "Reversal of: ACME-SAL-2024Q1-0007 - Orig: Invoice 7"
        );
        assert!(line_totals(&original_lines).unwrap().is_balanced());
    }

    #[test]
    fn test_narration_truncated() {
        let mut original = posted_voucher();
        original.narration = "x".repeat(400);
        let narration = ReversalService::narration(&original);
        assert!(narration.ends_with(&"x".repeat(ORIGINAL_NARRATION_LIMIT)));
        assert_eq!(
            narration.len(),
            "Reversal of: ACME-SAL-2024Q1-0007 - Orig: ".len() + ORIGINAL_NARRATION_LIMIT
        );
    }

    #[test]
    fn test_narration_without_original_text() {
        let mut original = posted_voucher();
        original.narration = String::new();
        assert_eq!(
            ReversalService::narration(&original),
            "Reversal of: ACME-SAL-2024Q1-0007"
        );
    }

    #[test]
    fn test_cannot_reverse_unposted() {
        let mut original = posted_voucher();
        original.status = VoucherStatus::PendingApproval;
        let result = ReversalService::build(&original, &lines(original.id), &ReversalRequest::default());
        assert!(matches!(
            result,
            Err(WorkflowError::InvalidStateTransition {
                action: VoucherAction::Reverse,
                ..
            })
        ));
    }

    #[test]
    fn test_cannot_reverse_twice() {
        let mut original = posted_voucher();
        original.is_reversed = true;
        let result = ReversalService::build(&original, &lines(original.id), &ReversalRequest::default());
        assert!(matches!(result, Err(WorkflowError::AlreadyReversed(_))));
    }

    #[test]
    fn test_empty_lines_rejected() {
        let original = posted_voucher();
        let result = ReversalService::build(&original, &[], &ReversalRequest::default());
        assert!(matches!(
            result,
            Err(WorkflowError::Validation(ValidationError::NothingToReverse))
        ));
    }

    #[test]
    fn test_request_overrides() {
        let original = posted_voucher();
        let request = ReversalRequest {
            date: NaiveDate::from_ymd_opt(2024, 3, 1),
            voucher_type: Some(VoucherType::Receipt),
            post_immediately: true,
        };
        let draft = ReversalService::build(&original, &lines(original.id), &request).unwrap();
        assert_eq!(draft.voucher_type, VoucherType::Receipt);
        assert_eq!(draft.date, NaiveDate::from_ymd_opt(2024, 3, 1).unwrap());
    }
}
