//! Ledger service for line validation and balance-delta planning.
//!
//! Pure business logic: account data is supplied by the caller through a
//! lookup closure, so the same rules run against any storage backend.

use std::collections::BTreeMap;

use rust_decimal::Decimal;
use tally_shared::types::{AccountId, TenantId};

use super::balance::{effective_delta, AccountDelta, SyncDirection};
use super::error::ValidationError;
use super::types::{Account, AccountNature, DrCr, LineInput};
use super::validation::validate_amounts;

/// A line whose account has been checked and whose nature is known.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedLine {
    /// The validated line.
    pub line: LineInput,
    /// Nature of the target account.
    pub nature: AccountNature,
}

impl ResolvedLine {
    /// Returns the signed balance change of this line.
    #[must_use]
    pub fn delta(&self) -> Decimal {
        effective_delta(self.nature, self.line.dr_cr, self.line.amount)
    }
}

/// Stateless ledger rules.
pub struct LedgerService;

impl LedgerService {
    /// Validates lines against the chart of accounts of one tenant.
    ///
    /// # Arguments
    ///
    /// * `tenant_id` - The acting tenant
    /// * `lines` - Lines to validate
    /// * `account_lookup` - Returns the account for an id, if it exists anywhere
    ///
    /// # Errors
    ///
    /// Returns the first `ValidationError` found, in line order.
    pub fn resolve_lines<A>(
        tenant_id: TenantId,
        lines: &[LineInput],
        account_lookup: A,
    ) -> Result<Vec<ResolvedLine>, ValidationError>
    where
        A: Fn(AccountId) -> Option<Account>,
    {
        validate_amounts(lines)?;

        let mut resolved = Vec::with_capacity(lines.len());
        for (idx, line) in lines.iter().enumerate() {
            let position = idx + 1;
            let account = account_lookup(line.account_id).ok_or(ValidationError::AccountNotFound {
                line: position,
                account_id: line.account_id,
            })?;
            Self::check_account(tenant_id, &account, position)?;
            resolved.push(ResolvedLine {
                line: line.clone(),
                nature: account.nature(),
            });
        }
        Ok(resolved)
    }

    /// Checks that one account may receive a line for the tenant.
    ///
    /// # Errors
    ///
    /// Returns `CrossTenantAccount`, `AccountInactive` or `AccountNotPostable`.
    pub fn check_account(
        tenant_id: TenantId,
        account: &Account,
        position: usize,
    ) -> Result<(), ValidationError> {
        if account.tenant_id != tenant_id {
            return Err(ValidationError::CrossTenantAccount {
                line: position,
                account_id: account.id,
            });
        }
        if !account.is_active {
            return Err(ValidationError::AccountInactive {
                line: position,
                account_id: account.id,
            });
        }
        if !account.allow_direct_posting {
            return Err(ValidationError::AccountNotPostable {
                line: position,
                account_id: account.id,
            });
        }
        Ok(())
    }

    /// Collapses line effects into one delta per account.
    ///
    /// The result is ordered by account id, which is also the order in
    /// which account rows must be locked.
    ///
    /// # Errors
    ///
    /// Returns `AmountOverflow` if an account's net change leaves the
    /// decimal range.
    pub fn plan_deltas<I>(lines: I, direction: SyncDirection) -> Result<Vec<AccountDelta>, ValidationError>
    where
        I: IntoIterator<Item = (AccountId, AccountNature, DrCr, Decimal)>,
    {
        let mut per_account: BTreeMap<AccountId, Decimal> = BTreeMap::new();
        for (account_id, nature, dr_cr, amount) in lines {
            let net = per_account.entry(account_id).or_default();
            *net = net
                .checked_add(direction.orient(effective_delta(nature, dr_cr, amount)))
                .ok_or(ValidationError::AmountOverflow)?;
        }
        Ok(per_account
            .into_iter()
            .map(|(account_id, delta)| AccountDelta { account_id, delta })
            .collect())
    }
}
