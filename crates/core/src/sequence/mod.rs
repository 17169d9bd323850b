//! Document numbering per (tenant, voucher type, period) scope.
//!
//! Numbers have the shape `{prefix}{zero padded counter}`, e.g.
//! `ACME-GEN-2024Q1-0001`. Counters only ever move forward; a number is
//! never handed out twice even if its voucher is deleted later.

use serde::{Deserialize, Serialize};
use std::fmt;
use tally_shared::types::{PeriodId, SequenceId, TenantId};

use crate::fiscal::AccountingPeriod;
use crate::ledger::voucher::VoucherType;
use crate::workflow::error::WorkflowError;

#[cfg(test)]
mod format_props;

/// Number of tenant code characters used in a default prefix.
pub const TENANT_CODE_CHARS: usize = 5;

/// Number of voucher type code characters used in a default prefix.
pub const TYPE_CODE_CHARS: usize = 3;

/// Default zero padding of the counter.
pub const DEFAULT_PADDING: u8 = 4;

/// Key of one independent counter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SequenceScope {
    /// Owning tenant.
    pub tenant_id: TenantId,
    /// Document type.
    pub voucher_type: VoucherType,
    /// Accounting period.
    pub period_id: PeriodId,
}

impl SequenceScope {
    /// Creates a scope.
    #[must_use]
    pub const fn new(tenant_id: TenantId, voucher_type: VoucherType, period_id: PeriodId) -> Self {
        Self {
            tenant_id,
            voucher_type,
            period_id,
        }
    }
}

impl fmt::Display for SequenceScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.tenant_id, self.voucher_type, self.period_id)
    }
}

/// Counter row of one scope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoucherSequence {
    /// Unique identifier.
    pub id: SequenceId,
    /// Owning tenant.
    pub tenant_id: TenantId,
    /// Document type.
    pub voucher_type: VoucherType,
    /// Accounting period.
    pub accounting_period_id: PeriodId,
    /// Text placed before the counter.
    pub prefix: String,
    /// Minimum digits of the counter.
    pub padding_digits: u8,
    /// Last number handed out; zero before first use.
    pub last_number: u64,
}

impl VoucherSequence {
    /// Creates a fresh counter for a scope.
    #[must_use]
    pub fn new(scope: SequenceScope, prefix: String, padding_digits: u8) -> Self {
        Self {
            id: SequenceId::new(),
            tenant_id: scope.tenant_id,
            voucher_type: scope.voucher_type,
            accounting_period_id: scope.period_id,
            prefix,
            padding_digits,
            last_number: 0,
        }
    }

    /// Returns the scope this counter belongs to.
    #[must_use]
    pub const fn scope(&self) -> SequenceScope {
        SequenceScope::new(self.tenant_id, self.voucher_type, self.accounting_period_id)
    }

    /// Moves the counter forward and returns the formatted number.
    ///
    /// # Errors
    ///
    /// `SequenceGeneration` if the counter would overflow.
    pub fn advance(&mut self) -> Result<String, WorkflowError> {
        let next = self.last_number.checked_add(1).ok_or_else(|| {
            WorkflowError::SequenceGeneration(format!("sequence {} exhausted", self.scope()))
        })?;
        self.last_number = next;
        Ok(format_number(&self.prefix, next, self.padding_digits))
    }
}

/// Derives the default prefix of a scope.
///
/// Shape: `{TENANT}-{TYP}-{YYYY}Q{q}-`, where the tenant part is the first
/// five characters of the tenant code and is left out when the code is
/// empty.
#[must_use]
pub fn default_prefix(tenant_code: &str, voucher_type: VoucherType, period: &AccountingPeriod) -> String {
    let tenant: String = tenant_code
        .trim()
        .chars()
        .filter(|c| !c.is_whitespace())
        .take(TENANT_CODE_CHARS)
        .collect::<String>()
        .to_uppercase();
    let type_code: String = voucher_type.code().chars().take(TYPE_CODE_CHARS).collect();

    let mut prefix = String::new();
    if !tenant.is_empty() {
        prefix.push_str(&tenant);
        prefix.push('-');
    }
    prefix.push_str(&format!(
        "{type_code}-{}Q{}-",
        period.start_year(),
        period.quarter()
    ));
    prefix
}

/// Formats `{prefix}{number}` with the number zero padded to `padding`.
///
/// Numbers wider than the padding are written in full.
#[must_use]
pub fn format_number(prefix: &str, number: u64, padding: u8) -> String {
    format!("{prefix}{number:0width$}", width = usize::from(padding))
}
