//! Reconciliation of cached balances against posted history.
//!
//! Two repair paths exist. [`Reconciler::resync_flagged`] replays the
//! missing apply or reverse of each flagged voucher. [`Reconciler::reconcile_tenant`]
//! rebuilds every cached balance of a tenant from its posted lines and
//! brings each voucher's `balances_updated` flag back in line with its
//! status, which also covers posted vouchers whose lines were edited.

use std::collections::BTreeSet;
use std::sync::Arc;

use chrono::Utc;
use rust_decimal::Decimal;
use serde::Serialize;
use tally_core::ledger::{net_effect, BalanceDrift, Voucher};
use tally_core::workflow::WorkflowError;
use tally_shared::types::{AccountId, TenantId, VoucherId};
use tracing::{error, info, warn};

use super::balance::BalanceSynchronizer;
use crate::store::{LedgerStore, LedgerTx, RecordScope};

/// Outcome of rebuilding one tenant's balances.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReconcileReport {
    /// The tenant.
    pub tenant_id: TenantId,
    /// Accounts compared.
    pub accounts_checked: usize,
    /// Accounts whose cached balance differed from posted history.
    pub drifts: Vec<BalanceDrift>,
    /// Vouchers whose sync flags were corrected.
    pub vouchers_resynced: usize,
    /// True if nothing was written.
    pub dry_run: bool,
}

impl ReconcileReport {
    /// Returns true if no drift and no stale voucher was found.
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.drifts.is_empty() && self.vouchers_resynced == 0
    }
}

/// Outcome of replaying flagged vouchers.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ResyncReport {
    /// Vouchers repaired and unflagged.
    pub resynced: Vec<VoucherId>,
    /// Vouchers that are still flagged.
    pub failed: Vec<VoucherId>,
}

/// Repairs cached balances.
#[derive(Debug)]
pub struct Reconciler<S> {
    store: Arc<S>,
}

impl<S> Clone for Reconciler<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
        }
    }
}

impl<S: LedgerStore> Reconciler<S> {
    /// Creates a new reconciler.
    #[must_use]
    pub const fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    /// Rebuilds a tenant's cached balances from posted history.
    ///
    /// Every stale voucher and then every account of the tenant is locked.
    /// The rebuilt balance counts the posted lines whose effects are already
    /// applied plus those of the locked stale vouchers, which are marked
    /// synced in the same unit of work. A voucher posted after the stale
    /// list was read is left to its pending apply. With `dry_run` the drift
    /// is reported and nothing is written.
    ///
    /// # Errors
    ///
    /// Returns `TenantNotFound`, `BalanceSync` if a rebuilt balance
    /// overflows, or `Database`.
    pub async fn reconcile_tenant(
        &self,
        tenant_id: TenantId,
        dry_run: bool,
    ) -> Result<ReconcileReport, WorkflowError> {
        let mut tx = self.store.begin().await?;
        tx.find_tenant(tenant_id)
            .await?
            .ok_or(WorkflowError::TenantNotFound(tenant_id))?;

        let mut stale: BTreeSet<VoucherId> = BTreeSet::new();
        stale.extend(tx.unsynced_vouchers(tenant_id).await?.iter().map(|v| v.id));
        stale.extend(tx.flagged_vouchers(tenant_id).await?.iter().map(|v| v.id));

        let mut vouchers: Vec<Voucher> = Vec::with_capacity(stale.len());
        for voucher_id in stale {
            if let Some(voucher) = tx.lock_voucher(tenant_id, voucher_id, RecordScope::All).await? {
                vouchers.push(voucher);
            }
        }

        let settling: BTreeSet<VoucherId> = vouchers
            .iter()
            .filter(|v| v.is_live_posted())
            .map(|v| v.id)
            .collect();

        let accounts = tx.accounts(tenant_id).await?;
        let mut drifts = Vec::new();
        let mut rebuilt: Vec<(AccountId, Decimal)> = Vec::with_capacity(accounts.len());
        for listed in &accounts {
            let Some(account) = tx.lock_account(tenant_id, listed.id).await? else {
                continue;
            };
            let lines = tx.posted_lines(tenant_id, account.id, None, None).await?;
            let computed = net_effect(
                account.nature(),
                lines
                    .iter()
                    .filter(|l| l.balances_applied || settling.contains(&l.voucher_id))
                    .map(|l| (l.dr_cr, l.amount)),
            )
            .ok_or_else(|| WorkflowError::BalanceSync(format!("rebuilt balance of account {} overflowed", account.id)))?;
            let drift = BalanceDrift {
                account_id: account.id,
                cached: account.current_balance,
                computed,
            };
            if !drift.is_consistent() {
                warn!(
                    %tenant_id,
                    account_id = %account.id,
                    account_number = %account.number,
                    cached = %drift.cached,
                    computed = %drift.computed,
                    "Balance drift detected"
                );
                rebuilt.push((account.id, computed));
                drifts.push(drift);
            }
        }

        let mut vouchers_resynced = 0;
        for voucher in &vouchers {
            if voucher.balances_updated != voucher.is_live_posted() || voucher.needs_reconciliation {
                vouchers_resynced += 1;
            }
        }

        let report = ReconcileReport {
            tenant_id,
            accounts_checked: accounts.len(),
            drifts,
            vouchers_resynced,
            dry_run,
        };

        if dry_run {
            tx.rollback().await?;
            info!(%tenant_id, drifts = report.drifts.len(), vouchers = vouchers_resynced, "Reconciliation dry run finished");
            return Ok(report);
        }

        let now = Utc::now();
        for (account_id, balance) in rebuilt {
            tx.update_account_balance(tenant_id, account_id, balance, now).await?;
        }
        for mut voucher in vouchers {
            voucher.balances_updated = voucher.is_live_posted();
            voucher.needs_reconciliation = false;
            voucher.updated_at = now;
            tx.update_voucher(&voucher).await?;
        }
        tx.commit().await?;

        info!(
            %tenant_id,
            accounts = report.accounts_checked,
            drifts = report.drifts.len(),
            vouchers = vouchers_resynced,
            "Reconciliation finished"
        );
        Ok(report)
    }

    /// Reconciles every tenant, one unit of work each.
    ///
    /// # Errors
    ///
    /// Returns the first failure; tenants already reconciled stay committed.
    pub async fn reconcile_all(&self, dry_run: bool) -> Result<Vec<ReconcileReport>, WorkflowError> {
        let tenants = self.tenant_ids().await?;
        let mut reports = Vec::with_capacity(tenants.len());
        for tenant_id in tenants {
            reports.push(self.reconcile_tenant(tenant_id, dry_run).await?);
        }
        Ok(reports)
    }

    /// Returns the ids of all tenants.
    ///
    /// # Errors
    ///
    /// Returns `Database`.
    pub async fn tenant_ids(&self) -> Result<Vec<TenantId>, WorkflowError> {
        let mut tx = self.store.begin().await?;
        let tenants = tx.list_tenants().await?;
        tx.rollback().await?;
        Ok(tenants.into_iter().map(|t| t.id).collect())
    }

    /// Replays the missing balance effect of each flagged voucher.
    ///
    /// Each voucher is repaired in its own unit of work; one failure does
    /// not stop the others and leaves that voucher flagged.
    ///
    /// # Errors
    ///
    /// Returns `Database` if the flagged vouchers cannot be listed.
    pub async fn resync_flagged(&self, tenant_id: TenantId) -> Result<ResyncReport, WorkflowError> {
        let flagged = {
            let mut tx = self.store.begin().await?;
            let flagged = tx.flagged_vouchers(tenant_id).await?;
            tx.rollback().await?;
            flagged
        };

        let mut report = ResyncReport::default();
        for voucher in flagged {
            match self.resync_one(tenant_id, voucher.id).await {
                Ok(()) => report.resynced.push(voucher.id),
                Err(err) => {
                    error!(%tenant_id, voucher_id = %voucher.id, error = %err, "Resync of flagged voucher failed");
                    report.failed.push(voucher.id);
                }
            }
        }

        info!(
            %tenant_id,
            resynced = report.resynced.len(),
            failed = report.failed.len(),
            "Flagged vouchers replayed"
        );
        Ok(report)
    }

    async fn resync_one(&self, tenant_id: TenantId, voucher_id: VoucherId) -> Result<(), WorkflowError> {
        let mut tx = self.store.begin().await?;
        let mut voucher = tx
            .lock_voucher(tenant_id, voucher_id, RecordScope::All)
            .await?
            .ok_or(WorkflowError::VoucherNotFound(voucher_id))?;

        if voucher.is_live_posted() {
            BalanceSynchronizer::<S>::apply_in(&mut tx, &mut voucher).await?;
        } else {
            BalanceSynchronizer::<S>::reverse_in(&mut tx, &mut voucher).await?;
        }

        voucher.needs_reconciliation = false;
        voucher.updated_at = Utc::now();
        tx.update_voucher(&voucher).await?;
        tx.commit().await?;
        Ok(())
    }
}
