//! Balance synchronizer.
//!
//! Keeps `Account.current_balance` equal to the sum of effective deltas of
//! every live Posted voucher. All line effects of one voucher are written
//! in one unit of work, under row locks taken in account id order, and the
//! voucher's `balances_updated` flag makes repeated runs no-ops.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use tally_core::ledger::{Account, AccountDelta, LedgerService, SyncDirection, Voucher};
use tally_core::workflow::WorkflowError;
use tally_shared::types::{AccountId, TenantId, VoucherId};
use tracing::{debug, error, info, warn};

use crate::store::{LedgerStore, LedgerTx, RecordScope, StoreError};

fn sync_error(err: StoreError) -> WorkflowError {
    WorkflowError::BalanceSync(err.to_string())
}

/// Applies and reverses voucher effects on cached account balances.
#[derive(Debug)]
pub struct BalanceSynchronizer<S> {
    store: Arc<S>,
}

impl<S> Clone for BalanceSynchronizer<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
        }
    }
}

impl<S: LedgerStore> BalanceSynchronizer<S> {
    /// Creates a new synchronizer.
    #[must_use]
    pub const fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    /// Applies a posted voucher's effects inside the caller's unit of work.
    ///
    /// Sets `balances_updated` on success; the caller persists the voucher.
    /// Returns false if the effects were already applied.
    ///
    /// # Errors
    ///
    /// Returns `BalanceSync` if any account cannot be locked or written. The
    /// caller must then abandon the unit of work.
    pub async fn apply_in<T: LedgerTx>(tx: &mut T, voucher: &mut Voucher) -> Result<bool, WorkflowError> {
        if voucher.balances_updated {
            debug!(voucher_id = %voucher.id, "Balances already applied, skipping");
            return Ok(false);
        }
        Self::sync_in(tx, voucher, SyncDirection::Apply).await?;
        voucher.balances_updated = true;
        Ok(true)
    }

    /// Reverses a voucher's applied effects inside the caller's unit of work.
    ///
    /// Clears `balances_updated` on success; the caller persists the voucher.
    /// Returns false if nothing was applied.
    ///
    /// # Errors
    ///
    /// Returns `BalanceSync` if any account cannot be locked or written. The
    /// transition that asked for the reversal must then fail too.
    pub async fn reverse_in<T: LedgerTx>(
        tx: &mut T,
        voucher: &mut Voucher,
    ) -> Result<bool, WorkflowError> {
        if !voucher.balances_updated {
            debug!(voucher_id = %voucher.id, "No applied balances to reverse");
            return Ok(false);
        }
        Self::sync_in(tx, voucher, SyncDirection::Reverse).await?;
        voucher.balances_updated = false;
        Ok(true)
    }

    /// Marks a posted voucher whose lines changed as needing a full resync.
    ///
    /// No partial adjustment is attempted; the next reconciliation run
    /// rebuilds the affected balances from posted history. Returns true if
    /// the flag was reset.
    pub fn on_lines_mutated(voucher: &mut Voucher) -> bool {
        if voucher.is_live_posted() && voucher.balances_updated {
            voucher.balances_updated = false;
            warn!(
                tenant_id = %voucher.tenant_id,
                voucher_id = %voucher.id,
                "Lines of a posted voucher changed, balances need a resync"
            );
            true
        } else {
            false
        }
    }

    async fn sync_in<T: LedgerTx>(
        tx: &mut T,
        voucher: &Voucher,
        direction: SyncDirection,
    ) -> Result<Vec<AccountDelta>, WorkflowError> {
        let tenant_id = voucher.tenant_id;
        let lines = tx
            .voucher_lines(tenant_id, voucher.id)
            .await
            .map_err(sync_error)?;

        let mut account_ids: Vec<AccountId> = lines.iter().map(|l| l.account_id).collect();
        account_ids.sort_unstable();
        account_ids.dedup();

        let mut accounts: HashMap<AccountId, Account> = HashMap::with_capacity(account_ids.len());
        for account_id in account_ids {
            let account = tx
                .lock_account(tenant_id, account_id)
                .await
                .map_err(sync_error)?
                .ok_or_else(|| {
                    WorkflowError::BalanceSync(format!(
                        "account {account_id} of voucher {} not found",
                        voucher.id
                    ))
                })?;
            accounts.insert(account_id, account);
        }

        let effects = lines
            .iter()
            .map(|line| {
                accounts
                    .get(&line.account_id)
                    .map(|account| (line.account_id, account.nature(), line.dr_cr, line.amount))
            })
            .collect::<Option<Vec<_>>>()
            .ok_or_else(|| WorkflowError::BalanceSync("line account was not locked".to_string()))?;
        let deltas = LedgerService::plan_deltas(effects, direction)
            .map_err(|err| WorkflowError::BalanceSync(format!("voucher {}: {err}", voucher.id)))?;

        let now = Utc::now();
        for delta in &deltas {
            let Some(account) = accounts.get(&delta.account_id) else {
                continue;
            };
            let balance = account
                .current_balance
                .checked_add(delta.delta)
                .ok_or_else(|| {
                    WorkflowError::BalanceSync(format!("balance of account {} overflowed", delta.account_id))
                })?;
            tx.update_account_balance(tenant_id, delta.account_id, balance, now)
                .await
                .map_err(sync_error)?;
            debug!(
                %tenant_id,
                voucher_id = %voucher.id,
                account_id = %delta.account_id,
                delta = %delta.delta,
                %balance,
                "Account balance updated"
            );
        }

        info!(
            %tenant_id,
            voucher_id = %voucher.id,
            voucher_number = %voucher.display_ref(),
            direction = ?direction,
            accounts = deltas.len(),
            "Balances synchronized"
        );
        Ok(deltas)
    }

    /// Applies a voucher's effects in a unit of work of its own.
    ///
    /// A no-op unless the voucher is live, Posted and not yet applied, so the
    /// call is safe to repeat.
    ///
    /// # Errors
    ///
    /// Returns `VoucherNotFound` or `BalanceSync`; nothing is written then.
    pub async fn apply(&self, tenant_id: TenantId, voucher_id: VoucherId) -> Result<bool, WorkflowError> {
        let mut tx = self.store.begin().await.map_err(sync_error)?;
        let mut voucher = tx
            .lock_voucher(tenant_id, voucher_id, RecordScope::All)
            .await
            .map_err(sync_error)?
            .ok_or(WorkflowError::VoucherNotFound(voucher_id))?;

        if !voucher.is_live_posted() {
            debug!(%tenant_id, %voucher_id, status = %voucher.status, "Voucher not posted, nothing to apply");
            return Ok(false);
        }
        if !Self::apply_in(&mut tx, &mut voucher).await? {
            return Ok(false);
        }

        voucher.updated_at = Utc::now();
        tx.update_voucher(&voucher).await.map_err(sync_error)?;
        tx.commit().await.map_err(sync_error)?;
        Ok(true)
    }

    /// Reverses a voucher's effects in a unit of work of its own.
    ///
    /// A no-op unless the effects are applied and the voucher is no longer a
    /// live Posted voucher.
    ///
    /// # Errors
    ///
    /// Returns `VoucherNotFound` or `BalanceSync`; nothing is written then.
    pub async fn reverse(&self, tenant_id: TenantId, voucher_id: VoucherId) -> Result<bool, WorkflowError> {
        let mut tx = self.store.begin().await.map_err(sync_error)?;
        let mut voucher = tx
            .lock_voucher(tenant_id, voucher_id, RecordScope::All)
            .await
            .map_err(sync_error)?
            .ok_or(WorkflowError::VoucherNotFound(voucher_id))?;

        if voucher.is_live_posted() {
            debug!(%tenant_id, %voucher_id, "Voucher still posted, nothing to reverse");
            return Ok(false);
        }
        if !Self::reverse_in(&mut tx, &mut voucher).await? {
            return Ok(false);
        }

        voucher.updated_at = Utc::now();
        tx.update_voucher(&voucher).await.map_err(sync_error)?;
        tx.commit().await.map_err(sync_error)?;
        Ok(true)
    }

    /// Flags a voucher for manual reconciliation.
    ///
    /// # Errors
    ///
    /// Returns `VoucherNotFound` or `Database`.
    pub async fn flag_for_reconciliation(
        &self,
        tenant_id: TenantId,
        voucher_id: VoucherId,
    ) -> Result<(), WorkflowError> {
        let mut tx = self.store.begin().await?;
        let mut voucher = tx
            .lock_voucher(tenant_id, voucher_id, RecordScope::All)
            .await?
            .ok_or(WorkflowError::VoucherNotFound(voucher_id))?;
        voucher.needs_reconciliation = true;
        voucher.updated_at = Utc::now();
        tx.update_voucher(&voucher).await?;
        tx.commit().await?;

        error!(
            %tenant_id,
            %voucher_id,
            voucher_number = %voucher.display_ref(),
            "Voucher flagged for manual reconciliation"
        );
        Ok(())
    }
}
