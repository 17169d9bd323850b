//! Accounting period types.

use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};
use tally_shared::types::{PeriodId, TenantId};

/// A date range of one tenant's books that can be locked against changes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountingPeriod {
    /// Unique identifier.
    pub id: PeriodId,
    /// Owning tenant.
    pub tenant_id: TenantId,
    /// Period name (e.g., "Q1 2024").
    pub name: String,
    /// First day of the period.
    pub start_date: NaiveDate,
    /// Last day of the period.
    pub end_date: NaiveDate,
    /// Fiscal year the period belongs to.
    pub fiscal_year: i32,
    /// Locked periods accept no voucher transitions.
    pub locked: bool,
}

impl AccountingPeriod {
    /// Creates an unlocked period whose fiscal year is its start year.
    #[must_use]
    pub fn new(
        tenant_id: TenantId,
        name: impl Into<String>,
        start_date: NaiveDate,
        end_date: NaiveDate,
    ) -> Self {
        Self {
            id: PeriodId::new(),
            tenant_id,
            name: name.into(),
            start_date,
            end_date,
            fiscal_year: start_date.year(),
            locked: false,
        }
    }

    /// Returns true if the given date falls within this period.
    #[must_use]
    pub fn contains_date(&self, date: NaiveDate) -> bool {
        date >= self.start_date && date <= self.end_date
    }

    /// Returns the calendar quarter (1-4) in which the period starts.
    #[must_use]
    pub fn quarter(&self) -> u32 {
        quarter_of(self.start_date)
    }

    /// Returns the calendar year in which the period starts.
    #[must_use]
    pub fn start_year(&self) -> i32 {
        self.start_date.year()
    }
}

/// Finds the period of `tenant_id` whose range contains `date`.
#[must_use]
pub fn period_for_date(
    periods: &[AccountingPeriod],
    tenant_id: TenantId,
    date: NaiveDate,
) -> Option<&AccountingPeriod> {
    periods
        .iter()
        .find(|p| p.tenant_id == tenant_id && p.contains_date(date))
}

/// Returns `ceil(month / 3)` for a date.
#[must_use]
pub fn quarter_of(date: NaiveDate) -> u32 {
    date.month().div_ceil(3)
}
