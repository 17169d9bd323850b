//! Chart of accounts types and the debit/credit vocabulary.
//!
//! An account's nature is never stored independently: it is a fixed
//! function of the account type, so the two can never disagree.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use tally_shared::types::{AccountId, TenantId};

/// Side of a voucher line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DrCr {
    /// Debit side.
    Debit,
    /// Credit side.
    Credit,
}

impl DrCr {
    /// Returns the opposite side.
    #[must_use]
    pub const fn opposite(self) -> Self {
        match self {
            Self::Debit => Self::Credit,
            Self::Credit => Self::Debit,
        }
    }

    /// Returns the string representation.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Debit => "debit",
            Self::Credit => "credit",
        }
    }

    /// Parses a side from a string.
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "debit" | "dr" => Some(Self::Debit),
            "credit" | "cr" => Some(Self::Credit),
            _ => None,
        }
    }
}

impl fmt::Display for DrCr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Normal balance side of an account.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccountNature {
    /// Balance increases with debits.
    Debit,
    /// Balance increases with credits.
    Credit,
}

impl AccountNature {
    /// Returns the line side that increases an account of this nature.
    #[must_use]
    pub const fn increasing_side(self) -> DrCr {
        match self {
            Self::Debit => DrCr::Debit,
            Self::Credit => DrCr::Credit,
        }
    }

    /// Returns the string representation.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Debit => "debit",
            Self::Credit => "credit",
        }
    }
}

impl fmt::Display for AccountNature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Account classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccountType {
    /// Resources owned.
    Asset,
    /// Obligations owed.
    Liability,
    /// Owner's residual interest.
    Equity,
    /// Revenue earned.
    Income,
    /// Operating costs.
    Expense,
    /// Cost of goods sold.
    Cogs,
}

impl AccountType {
    /// All account types.
    pub const ALL: [Self; 6] = [
        Self::Asset,
        Self::Liability,
        Self::Equity,
        Self::Income,
        Self::Expense,
        Self::Cogs,
    ];

    /// Returns the nature implied by this type.
    ///
    /// Asset, Expense and COGS are debit-natured; Liability, Equity and
    /// Income are credit-natured.
    #[must_use]
    pub const fn nature(self) -> AccountNature {
        match self {
            Self::Asset | Self::Expense | Self::Cogs => AccountNature::Debit,
            Self::Liability | Self::Equity | Self::Income => AccountNature::Credit,
        }
    }

    /// Returns the string representation.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Asset => "asset",
            Self::Liability => "liability",
            Self::Equity => "equity",
            Self::Income => "income",
            Self::Expense => "expense",
            Self::Cogs => "cogs",
        }
    }

    /// Parses an account type from a string.
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "asset" => Some(Self::Asset),
            "liability" => Some(Self::Liability),
            "equity" => Some(Self::Equity),
            "income" | "revenue" => Some(Self::Income),
            "expense" => Some(Self::Expense),
            "cogs" => Some(Self::Cogs),
            _ => None,
        }
    }
}

impl fmt::Display for AccountType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A chart of accounts entry with its cached balance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    /// Unique identifier.
    pub id: AccountId,
    /// Owning tenant.
    pub tenant_id: TenantId,
    /// Account number (e.g., "1010").
    pub number: String,
    /// Display name.
    pub name: String,
    /// Classification, which also fixes the nature.
    pub account_type: AccountType,
    /// ISO 4217 currency code.
    pub currency: String,
    /// Inactive accounts reject new lines.
    pub is_active: bool,
    /// Control accounts set this to false.
    pub allow_direct_posting: bool,
    /// Cached sum of all posted, non-reversed line effects.
    pub current_balance: Decimal,
    /// When the cached balance was last touched.
    pub balance_last_updated: Option<DateTime<Utc>>,
}

impl Account {
    /// Returns the account's nature.
    #[must_use]
    pub const fn nature(&self) -> AccountNature {
        self.account_type.nature()
    }

    /// Returns true if lines may be posted to this account.
    #[must_use]
    pub const fn is_postable(&self) -> bool {
        self.is_active && self.allow_direct_posting
    }
}

/// A line as supplied by a caller building or editing a voucher.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineInput {
    /// Target account.
    pub account_id: AccountId,
    /// Debit or credit.
    pub dr_cr: DrCr,
    /// Strictly positive amount.
    pub amount: Decimal,
    /// Optional line narration.
    #[serde(default)]
    pub narration: String,
}

impl LineInput {
    /// Convenience constructor for a debit line.
    #[must_use]
    pub fn debit(account_id: AccountId, amount: Decimal) -> Self {
        Self {
            account_id,
            dr_cr: DrCr::Debit,
            amount,
            narration: String::new(),
        }
    }

    /// Convenience constructor for a credit line.
    #[must_use]
    pub fn credit(account_id: AccountId, amount: Decimal) -> Self {
        Self {
            account_id,
            dr_cr: DrCr::Credit,
            amount,
            narration: String::new(),
        }
    }

    /// Sets the line narration.
    #[must_use]
    pub fn with_narration(mut self, narration: impl Into<String>) -> Self {
        self.narration = narration.into();
        self
    }
}

/// Debit and credit totals of a set of lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoucherTotals {
    /// Sum of debit lines.
    pub debit: Decimal,
    /// Sum of credit lines.
    pub credit: Decimal,
}

impl VoucherTotals {
    /// Returns true if debits equal credits exactly.
    #[must_use]
    pub fn is_balanced(&self) -> bool {
        self.debit == self.credit
    }

    /// Returns true if nothing has been entered on either side.
    #[must_use]
    pub fn is_zero(&self) -> bool {
        self.debit.is_zero() && self.credit.is_zero()
    }
}
