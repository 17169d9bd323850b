//! Ledger queries computed from posted history.
//!
//! The dynamic balance of an account is the sum of effective deltas of
//! every line on a live Posted voucher. It is the ground truth the balance
//! cache is checked against, and it answers point-in-time questions the
//! cache cannot.

use std::sync::Arc;

use chrono::NaiveDate;
use rust_decimal::Decimal;
use tally_core::ledger::{net_effect, Account, AccountStatement, BalanceDrift, PostedLine};
use tally_shared::error::AppError;
use tally_shared::types::{AccountId, TenantId};
use thiserror::Error;

use crate::store::{LedgerStore, LedgerTx, StoreError};

/// Errors raised by ledger queries.
#[derive(Debug, Error)]
pub enum LedgerQueryError {
    /// The account does not exist in the tenant.
    #[error("Account not found: {0}")]
    AccountNotFound(AccountId),

    /// The range ends before it starts.
    #[error("Invalid date range: {start} is after {end}")]
    InvalidRange {
        /// Range start.
        start: NaiveDate,
        /// Range end.
        end: NaiveDate,
    },

    /// The summed balance does not fit in a decimal.
    #[error("Balance of account {0} is out of range")]
    BalanceOverflow(AccountId),

    /// Storage failure.
    #[error("Database error: {0}")]
    Database(String),
}

impl From<StoreError> for LedgerQueryError {
    fn from(err: StoreError) -> Self {
        Self::Database(err.to_string())
    }
}

impl From<LedgerQueryError> for AppError {
    fn from(err: LedgerQueryError) -> Self {
        match err {
            LedgerQueryError::AccountNotFound(_) => Self::NotFound(err.to_string()),
            LedgerQueryError::InvalidRange { .. } => Self::Validation(err.to_string()),
            LedgerQueryError::BalanceOverflow(_) => Self::Internal(err.to_string()),
            LedgerQueryError::Database(msg) => Self::Database(msg),
        }
    }
}

fn check_range(start: Option<NaiveDate>, end: Option<NaiveDate>) -> Result<(), LedgerQueryError> {
    match (start, end) {
        (Some(start), Some(end)) if start > end => Err(LedgerQueryError::InvalidRange { start, end }),
        _ => Ok(()),
    }
}

fn sum_lines(account: &Account, lines: &[PostedLine]) -> Result<Decimal, LedgerQueryError> {
    net_effect(account.nature(), lines.iter().map(|l| (l.dr_cr, l.amount)))
        .ok_or(LedgerQueryError::BalanceOverflow(account.id))
}

/// Read-only queries over posted vouchers.
#[derive(Debug)]
pub struct LedgerQuery<S> {
    store: Arc<S>,
}

impl<S> Clone for LedgerQuery<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
        }
    }
}

impl<S: LedgerStore> LedgerQuery<S> {
    /// Creates a new query service.
    #[must_use]
    pub const fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    async fn load_account<T: LedgerTx>(
        tx: &mut T,
        tenant_id: TenantId,
        account_id: AccountId,
    ) -> Result<Account, LedgerQueryError> {
        tx.find_account(tenant_id, account_id)
            .await?
            .ok_or(LedgerQueryError::AccountNotFound(account_id))
    }

    /// Computes an account's balance from posted lines, optionally bounded
    /// by voucher date (both ends inclusive).
    ///
    /// # Errors
    ///
    /// Returns `AccountNotFound` for an account outside the tenant and
    /// `InvalidRange` when `start > end`.
    pub async fn dynamic_balance(
        &self,
        tenant_id: TenantId,
        account_id: AccountId,
        start: Option<NaiveDate>,
        end: Option<NaiveDate>,
    ) -> Result<Decimal, LedgerQueryError> {
        check_range(start, end)?;
        let mut tx = self.store.begin().await?;
        let account = Self::load_account(&mut tx, tenant_id, account_id).await?;
        let lines = tx.posted_lines(tenant_id, account_id, start, end).await?;
        tx.rollback().await?;
        sum_lines(&account, &lines)
    }

    /// Builds the statement of an account between two dates.
    ///
    /// The opening balance covers every posted line dated before `start`.
    ///
    /// # Errors
    ///
    /// Returns `AccountNotFound` or `InvalidRange`.
    pub async fn account_statement(
        &self,
        tenant_id: TenantId,
        account_id: AccountId,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<AccountStatement, LedgerQueryError> {
        check_range(Some(start), Some(end))?;
        let mut tx = self.store.begin().await?;
        let account = Self::load_account(&mut tx, tenant_id, account_id).await?;

        let opening = match start.pred_opt() {
            Some(day_before) => {
                let earlier = tx
                    .posted_lines(tenant_id, account_id, None, Some(day_before))
                    .await?;
                sum_lines(&account, &earlier)?
            }
            None => Decimal::ZERO,
        };
        let lines = tx
            .posted_lines(tenant_id, account_id, Some(start), Some(end))
            .await?;
        tx.rollback().await?;

        AccountStatement::build(account_id, account.nature(), opening, lines)
            .map_err(|_| LedgerQueryError::BalanceOverflow(account_id))
    }

    /// Compares an account's cached balance with its dynamic balance.
    ///
    /// # Errors
    ///
    /// Returns `AccountNotFound`, `BalanceOverflow` or `Database`.
    pub async fn verify_account(
        &self,
        tenant_id: TenantId,
        account_id: AccountId,
    ) -> Result<BalanceDrift, LedgerQueryError> {
        let mut tx = self.store.begin().await?;
        let account = Self::load_account(&mut tx, tenant_id, account_id).await?;
        let lines = tx.posted_lines(tenant_id, account_id, None, None).await?;
        tx.rollback().await?;
        Ok(BalanceDrift {
            account_id,
            cached: account.current_balance,
            computed: sum_lines(&account, &lines)?,
        })
    }

    /// Compares cached and dynamic balances of every account of a tenant.
    ///
    /// # Errors
    ///
    /// Returns `BalanceOverflow` or `Database`.
    pub async fn verify_tenant(&self, tenant_id: TenantId) -> Result<Vec<BalanceDrift>, LedgerQueryError> {
        let mut tx = self.store.begin().await?;
        let accounts = tx.accounts(tenant_id).await?;
        let mut report = Vec::with_capacity(accounts.len());
        for account in accounts {
            let lines = tx.posted_lines(tenant_id, account.id, None, None).await?;
            report.push(BalanceDrift {
                account_id: account.id,
                cached: account.current_balance,
                computed: sum_lines(&account, &lines)?,
            });
        }
        tx.rollback().await?;
        Ok(report)
    }
}
