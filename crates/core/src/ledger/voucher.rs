//! Voucher documents and their lines.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use tally_shared::types::{AccountId, PartyId, PeriodId, TenantId, UserId, VoucherId, VoucherLineId};

use super::error::ValidationError;
use super::types::{DrCr, LineInput, VoucherTotals};
use super::validation::calculate_totals;
use crate::workflow::types::VoucherStatus;

/// Document type of a voucher, also part of its numbering scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VoucherType {
    /// General journal.
    General,
    /// Sales invoice.
    Sales,
    /// Purchase bill.
    Purchase,
    /// Money received.
    Receipt,
    /// Money paid.
    Payment,
    /// Transfer between cash and bank accounts.
    Contra,
}

impl VoucherType {
    /// All voucher types.
    pub const ALL: [Self; 6] = [
        Self::General,
        Self::Sales,
        Self::Purchase,
        Self::Receipt,
        Self::Payment,
        Self::Contra,
    ];

    /// Returns the string representation.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::General => "general",
            Self::Sales => "sales",
            Self::Purchase => "purchase",
            Self::Receipt => "receipt",
            Self::Payment => "payment",
            Self::Contra => "contra",
        }
    }

    /// Returns the upper-case code used in document numbers.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::General => "GENERAL",
            Self::Sales => "SALES",
            Self::Purchase => "PURCHASE",
            Self::Receipt => "RECEIPT",
            Self::Payment => "PAYMENT",
            Self::Contra => "CONTRA",
        }
    }

    /// Parses a voucher type from a string.
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "general" => Some(Self::General),
            "sales" => Some(Self::Sales),
            "purchase" => Some(Self::Purchase),
            "receipt" => Some(Self::Receipt),
            "payment" => Some(Self::Payment),
            "contra" => Some(Self::Contra),
            _ => None,
        }
    }
}

impl fmt::Display for VoucherType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A double-entry transaction document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Voucher {
    /// Unique identifier.
    pub id: VoucherId,
    /// Owning tenant.
    pub tenant_id: TenantId,
    /// Document type.
    pub voucher_type: VoucherType,
    /// Accounting period resolved from `date`.
    pub accounting_period_id: PeriodId,
    /// Transaction date.
    pub date: NaiveDate,
    /// Customer or supplier, if any.
    pub party_id: Option<PartyId>,
    /// Lifecycle state.
    pub status: VoucherStatus,
    /// Assigned on first approval, never reused.
    pub voucher_number: Option<String>,
    /// True once the line effects are in the account balance cache.
    pub balances_updated: bool,
    /// Set when deferred balance sync gave up.
    pub needs_reconciliation: bool,
    /// Free-text description.
    pub narration: String,
    /// External reference.
    pub reference: Option<String>,
    /// Set once a reversing voucher offsets this one.
    pub is_reversed: bool,
    /// The voucher that offsets this one.
    pub reversed_by_voucher: Option<VoucherId>,
    /// The voucher this one offsets.
    pub is_reversal_for: Option<VoucherId>,
    /// Creator.
    pub created_by: UserId,
    /// Approver.
    pub approved_by: Option<UserId>,
    /// Approval time.
    pub approved_at: Option<DateTime<Utc>>,
    /// Poster.
    pub posted_by: Option<UserId>,
    /// Posting time.
    pub posted_at: Option<DateTime<Utc>>,
    /// Soft-delete marker.
    pub deleted_at: Option<DateTime<Utc>>,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// Last modification time.
    pub updated_at: DateTime<Utc>,
}

impl Voucher {
    /// Creates a new draft voucher.
    #[must_use]
    pub fn draft(
        tenant_id: TenantId,
        voucher_type: VoucherType,
        accounting_period_id: PeriodId,
        date: NaiveDate,
        created_by: UserId,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: VoucherId::new(),
            tenant_id,
            voucher_type,
            accounting_period_id,
            date,
            party_id: None,
            status: VoucherStatus::Draft,
            voucher_number: None,
            balances_updated: false,
            needs_reconciliation: false,
            narration: String::new(),
            reference: None,
            is_reversed: false,
            reversed_by_voucher: None,
            is_reversal_for: None,
            created_by,
            approved_by: None,
            approved_at: None,
            posted_by: None,
            posted_at: None,
            deleted_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Returns true if the voucher has not been soft-deleted.
    #[must_use]
    pub const fn is_live(&self) -> bool {
        self.deleted_at.is_none()
    }

    /// Returns true if the voucher's lines count towards balances.
    #[must_use]
    pub fn is_live_posted(&self) -> bool {
        self.status == VoucherStatus::Posted && self.is_live()
    }

    /// Returns the number if assigned, otherwise the id, for log lines.
    #[must_use]
    pub fn display_ref(&self) -> String {
        self.voucher_number
            .clone()
            .unwrap_or_else(|| self.id.to_string())
    }
}

/// A single debit or credit line owned by one voucher.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoucherLine {
    /// Unique identifier.
    pub id: VoucherLineId,
    /// Owning voucher.
    pub voucher_id: VoucherId,
    /// Target account.
    pub account_id: AccountId,
    /// Debit or credit.
    pub dr_cr: DrCr,
    /// Strictly positive amount.
    pub amount: Decimal,
    /// Line narration.
    pub narration: String,
}

impl VoucherLine {
    /// Materialises a caller-supplied line for a voucher.
    #[must_use]
    pub fn from_input(voucher_id: VoucherId, input: &LineInput) -> Self {
        Self {
            id: VoucherLineId::new(),
            voucher_id,
            account_id: input.account_id,
            dr_cr: input.dr_cr,
            amount: input.amount,
            narration: input.narration.clone(),
        }
    }

    /// Converts back into the caller-facing shape.
    #[must_use]
    pub fn to_input(&self) -> LineInput {
        LineInput {
            account_id: self.account_id,
            dr_cr: self.dr_cr,
            amount: self.amount,
            narration: self.narration.clone(),
        }
    }
}

/// Totals a slice of stored lines.
///
/// # Errors
///
/// Returns `AmountOverflow`.
pub fn line_totals(lines: &[VoucherLine]) -> Result<VoucherTotals, ValidationError> {
    calculate_totals(lines.iter().map(|l| (l.dr_cr, &l.amount)))
}

/// Input for creating a draft voucher.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewVoucher {
    /// Document type.
    pub voucher_type: VoucherType,
    /// Transaction date; the accounting period is derived from it.
    pub date: NaiveDate,
    /// Customer or supplier, if any.
    pub party_id: Option<PartyId>,
    /// Description.
    pub narration: String,
    /// External reference.
    pub reference: Option<String>,
    /// Initial lines; may be empty or unbalanced while in Draft.
    pub lines: Vec<LineInput>,
}

/// Partial update applied to an editable voucher.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VoucherUpdate {
    /// New date, re-resolving the accounting period.
    pub date: Option<NaiveDate>,
    /// New narration.
    pub narration: Option<String>,
    /// New reference; `Some(None)` clears it.
    pub reference: Option<Option<String>>,
    /// New party; `Some(None)` clears it.
    pub party_id: Option<Option<PartyId>>,
    /// Replacement line set.
    pub lines: Option<Vec<LineInput>>,
}

impl VoucherUpdate {
    /// Returns true if the update changes nothing.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.date.is_none()
            && self.narration.is_none()
            && self.reference.is_none()
            && self.party_id.is_none()
            && self.lines.is_none()
    }
}
