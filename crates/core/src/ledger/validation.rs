//! Business rule validation for voucher lines.

use rust_decimal::Decimal;

use super::error::ValidationError;
use super::types::{DrCr, LineInput, VoucherTotals};

/// Decimal places stored for an amount (`NUMERIC(19, 4)`).
pub const AMOUNT_SCALE: u32 = 4;

/// Largest amount a single line may carry: `999_999_999_999_999.9999`.
pub const MAX_LINE_AMOUNT: Decimal = Decimal::from_parts(0x89E7_FFFF, 0x8AC7_2304, 0, false, AMOUNT_SCALE);

/// Sums debit and credit amounts.
///
/// # Errors
///
/// Returns `AmountOverflow` if either side leaves the decimal range.
pub fn calculate_totals<'a, I>(lines: I) -> Result<VoucherTotals, ValidationError>
where
    I: IntoIterator<Item = (DrCr, &'a Decimal)>,
{
    let mut totals = VoucherTotals {
        debit: Decimal::ZERO,
        credit: Decimal::ZERO,
    };
    for (dr_cr, amount) in lines {
        let side = match dr_cr {
            DrCr::Debit => &mut totals.debit,
            DrCr::Credit => &mut totals.credit,
        };
        *side = side.checked_add(*amount).ok_or(ValidationError::AmountOverflow)?;
    }
    Ok(totals)
}

/// Totals a slice of caller-supplied lines.
///
/// # Errors
///
/// Returns `AmountOverflow`.
pub fn totals_of(lines: &[LineInput]) -> Result<VoucherTotals, ValidationError> {
    calculate_totals(lines.iter().map(|l| (l.dr_cr, &l.amount)))
}

/// Rejects any line amount the ledger cannot store.
///
/// Amounts must be strictly positive, carry at most [`AMOUNT_SCALE`]
/// decimal places and not exceed [`MAX_LINE_AMOUNT`].
///
/// # Errors
///
/// Returns `NonPositiveAmount`, `AmountScale` or `AmountOutOfRange` for
/// the first offending line.
pub fn validate_amounts(lines: &[LineInput]) -> Result<(), ValidationError> {
    for (idx, line) in lines.iter().enumerate() {
        let position = idx + 1;
        if line.amount <= Decimal::ZERO {
            return Err(ValidationError::NonPositiveAmount {
                line: position,
                amount: line.amount,
            });
        }
        if line.amount.normalize().scale() > AMOUNT_SCALE {
            return Err(ValidationError::AmountScale {
                line: position,
                amount: line.amount,
                max_scale: AMOUNT_SCALE,
            });
        }
        if line.amount > MAX_LINE_AMOUNT {
            return Err(ValidationError::AmountOutOfRange {
                line: position,
                amount: line.amount,
                max: MAX_LINE_AMOUNT,
            });
        }
    }
    Ok(())
}

/// Checks that totals describe a postable voucher: balanced and non-zero.
///
/// # Errors
///
/// Returns `ZeroTotal` or `Unbalanced`.
pub fn ensure_postable(totals: VoucherTotals) -> Result<(), ValidationError> {
    if !totals.is_balanced() {
        return Err(ValidationError::Unbalanced {
            debit: totals.debit,
            credit: totals.credit,
        });
    }
    if totals.is_zero() {
        return Err(ValidationError::ZeroTotal);
    }
    Ok(())
}

/// Validates lines for any status other than Draft.
///
/// # Errors
///
/// Returns `NoLines`, any amount error from [`validate_amounts`],
/// `Unbalanced` or `ZeroTotal`.
pub fn validate_balanced(lines: &[LineInput]) -> Result<VoucherTotals, ValidationError> {
    if lines.is_empty() {
        return Err(ValidationError::NoLines);
    }
    validate_amounts(lines)?;
    let totals = totals_of(lines)?;
    ensure_postable(totals)?;
    Ok(totals)
}
