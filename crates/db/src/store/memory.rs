//! In-process ledger store.
//!
//! Committed rows live behind one `RwLock`. Each unit of work buffers its
//! writes in an overlay that is folded into the committed state on commit
//! and dropped on rollback. Row locks are per-key `tokio` mutexes held by
//! the unit of work until it ends, so concurrent callers serialize exactly
//! where PostgreSQL would block on `FOR UPDATE`.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use dashmap::DashMap;
use rust_decimal::Decimal;
use tokio::sync::{Mutex, OwnedMutexGuard};

use tally_core::fiscal::{period_for_date, AccountingPeriod};
use tally_core::ledger::{Account, PostedLine, Voucher, VoucherLine};
use tally_core::sequence::{SequenceScope, VoucherSequence};
use tally_core::tenant::Tenant;
use tally_core::workflow::VoucherApproval;
use tally_shared::types::{AccountId, PeriodId, TenantId, VoucherId};

use super::{LedgerStore, LedgerTx, RecordScope, StoreError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum LockKey {
    Voucher(VoucherId),
    Sequence(SequenceScope),
    Account(AccountId),
}

#[derive(Debug, Default)]
struct MemoryState {
    tenants: HashMap<TenantId, Tenant>,
    periods: HashMap<PeriodId, AccountingPeriod>,
    accounts: HashMap<AccountId, Account>,
    vouchers: HashMap<VoucherId, Voucher>,
    lines: HashMap<VoucherId, Vec<VoucherLine>>,
    sequences: HashMap<SequenceScope, VoucherSequence>,
    approvals: Vec<VoucherApproval>,
}

#[derive(Debug, Default)]
struct Overlay {
    accounts: HashMap<AccountId, Account>,
    vouchers: HashMap<VoucherId, Voucher>,
    lines: HashMap<VoucherId, Vec<VoucherLine>>,
    sequences: HashMap<SequenceScope, VoucherSequence>,
    approvals: Vec<VoucherApproval>,
}

/// Failures to inject into the next writes, for exercising error paths.
#[derive(Debug, Default)]
struct Faults {
    balance_writes: AtomicU32,
    sequence_writes: AtomicU32,
}

impl Faults {
    fn trip(counter: &AtomicU32) -> bool {
        counter
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

#[derive(Debug, Default)]
struct Inner {
    state: RwLock<MemoryState>,
    locks: DashMap<LockKey, Arc<Mutex<()>>>,
    faults: Faults,
}

impl Inner {
    fn read(&self) -> RwLockReadGuard<'_, MemoryState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, MemoryState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }
}

/// In-process store with PostgreSQL-like row locking.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    inner: Arc<Inner>,
}

impl MemoryStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds or replaces a tenant.
    pub fn insert_tenant(&self, tenant: Tenant) {
        self.inner.write().tenants.insert(tenant.id, tenant);
    }

    /// Adds or replaces an accounting period.
    pub fn insert_period(&self, period: AccountingPeriod) {
        self.inner.write().periods.insert(period.id, period);
    }

    /// Adds or replaces an account.
    pub fn insert_account(&self, account: Account) {
        self.inner.write().accounts.insert(account.id, account);
    }

    /// Locks or unlocks a period.
    pub fn set_period_locked(&self, period_id: PeriodId, locked: bool) {
        if let Some(period) = self.inner.write().periods.get_mut(&period_id) {
            period.locked = locked;
        }
    }

    /// Overwrites a cached balance outside of any unit of work.
    pub fn set_account_balance(&self, account_id: AccountId, balance: Decimal) {
        if let Some(account) = self.inner.write().accounts.get_mut(&account_id) {
            account.current_balance = balance;
        }
    }

    /// Returns the committed state of an account.
    #[must_use]
    pub fn account(&self, account_id: AccountId) -> Option<Account> {
        self.inner.read().accounts.get(&account_id).cloned()
    }

    /// Returns the committed state of a voucher.
    #[must_use]
    pub fn voucher(&self, voucher_id: VoucherId) -> Option<Voucher> {
        self.inner.read().vouchers.get(&voucher_id).cloned()
    }

    /// Returns the committed counter of a scope.
    #[must_use]
    pub fn sequence(&self, scope: SequenceScope) -> Option<VoucherSequence> {
        self.inner.read().sequences.get(&scope).cloned()
    }

    /// Makes the next `n` balance writes fail.
    pub fn fail_balance_writes(&self, n: u32) {
        self.inner.faults.balance_writes.store(n, Ordering::SeqCst);
    }

    /// Makes the next `n` sequence writes fail.
    pub fn fail_sequence_writes(&self, n: u32) {
        self.inner.faults.sequence_writes.store(n, Ordering::SeqCst);
    }
}

#[async_trait]
impl LedgerStore for MemoryStore {
    type Tx = MemoryTx;

    async fn begin(&self) -> Result<Self::Tx, StoreError> {
        Ok(MemoryTx {
            inner: Arc::clone(&self.inner),
            overlay: Overlay::default(),
            held: HashSet::new(),
            guards: Vec::new(),
        })
    }
}

/// Unit of work of a [`MemoryStore`].
#[derive(Debug)]
pub struct MemoryTx {
    inner: Arc<Inner>,
    overlay: Overlay,
    held: HashSet<LockKey>,
    guards: Vec<OwnedMutexGuard<()>>,
}

impl MemoryTx {
    async fn acquire(&mut self, key: LockKey) {
        if self.held.contains(&key) {
            return;
        }
        let mutex = self
            .inner
            .locks
            .entry(key)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .value()
            .clone();
        let guard = mutex.lock_owned().await;
        self.held.insert(key);
        self.guards.push(guard);
    }

    fn require_lock(&self, key: LockKey) -> Result<(), StoreError> {
        if self.held.contains(&key) {
            Ok(())
        } else {
            Err(StoreError::Lock(format!("{key:?} is not locked by this unit of work")))
        }
    }

    fn account_view(&self, tenant_id: TenantId, account_id: AccountId) -> Option<Account> {
        self.overlay
            .accounts
            .get(&account_id)
            .cloned()
            .or_else(|| self.inner.read().accounts.get(&account_id).cloned())
            .filter(|a| a.tenant_id == tenant_id)
    }

    fn voucher_view(&self, tenant_id: TenantId, voucher_id: VoucherId) -> Option<Voucher> {
        self.overlay
            .vouchers
            .get(&voucher_id)
            .cloned()
            .or_else(|| self.inner.read().vouchers.get(&voucher_id).cloned())
            .filter(|v| v.tenant_id == tenant_id)
    }

    fn lines_view(&self, voucher_id: VoucherId) -> Vec<VoucherLine> {
        self.overlay
            .lines
            .get(&voucher_id)
            .cloned()
            .or_else(|| self.inner.read().lines.get(&voucher_id).cloned())
            .unwrap_or_default()
    }

    fn sequence_view(&self, scope: SequenceScope) -> Option<VoucherSequence> {
        self.overlay
            .sequences
            .get(&scope)
            .cloned()
            .or_else(|| self.inner.read().sequences.get(&scope).cloned())
    }

    fn tenant_vouchers(&self, tenant_id: TenantId) -> Vec<Voucher> {
        let mut merged: HashMap<VoucherId, Voucher> = self
            .inner
            .read()
            .vouchers
            .values()
            .filter(|v| v.tenant_id == tenant_id)
            .map(|v| (v.id, v.clone()))
            .collect();
        for v in self.overlay.vouchers.values().filter(|v| v.tenant_id == tenant_id) {
            merged.insert(v.id, v.clone());
        }
        merged.into_values().collect()
    }
}

#[async_trait]
impl LedgerTx for MemoryTx {
    async fn find_tenant(&mut self, tenant_id: TenantId) -> Result<Option<Tenant>, StoreError> {
        Ok(self.inner.read().tenants.get(&tenant_id).cloned())
    }

    async fn list_tenants(&mut self) -> Result<Vec<Tenant>, StoreError> {
        let mut tenants: Vec<Tenant> = self.inner.read().tenants.values().cloned().collect();
        tenants.sort_by(|a, b| a.code.cmp(&b.code));
        Ok(tenants)
    }

    async fn find_period(
        &mut self,
        tenant_id: TenantId,
        period_id: PeriodId,
    ) -> Result<Option<AccountingPeriod>, StoreError> {
        Ok(self
            .inner
            .read()
            .periods
            .get(&period_id)
            .filter(|p| p.tenant_id == tenant_id)
            .cloned())
    }

    async fn find_period_for_date(
        &mut self,
        tenant_id: TenantId,
        date: NaiveDate,
    ) -> Result<Option<AccountingPeriod>, StoreError> {
        let mut periods: Vec<AccountingPeriod> =
            self.inner.read().periods.values().cloned().collect();
        periods.sort_by_key(|p| p.start_date);
        Ok(period_for_date(&periods, tenant_id, date).cloned())
    }

    async fn find_account(
        &mut self,
        tenant_id: TenantId,
        account_id: AccountId,
    ) -> Result<Option<Account>, StoreError> {
        Ok(self.account_view(tenant_id, account_id))
    }

    async fn lock_account(
        &mut self,
        tenant_id: TenantId,
        account_id: AccountId,
    ) -> Result<Option<Account>, StoreError> {
        if self.account_view(tenant_id, account_id).is_none() {
            return Ok(None);
        }
        self.acquire(LockKey::Account(account_id)).await;
        Ok(self.account_view(tenant_id, account_id))
    }

    async fn update_account_balance(
        &mut self,
        tenant_id: TenantId,
        account_id: AccountId,
        balance: Decimal,
        updated_at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        self.require_lock(LockKey::Account(account_id))?;
        if Faults::trip(&self.inner.faults.balance_writes) {
            return Err(StoreError::Database(format!(
                "injected failure writing balance of {account_id}"
            )));
        }
        let mut account = self
            .account_view(tenant_id, account_id)
            .ok_or_else(|| StoreError::NotFound(format!("account {account_id}")))?;
        account.current_balance = balance;
        account.balance_last_updated = Some(updated_at);
        self.overlay.accounts.insert(account_id, account);
        Ok(())
    }

    async fn accounts(&mut self, tenant_id: TenantId) -> Result<Vec<Account>, StoreError> {
        let mut merged: HashMap<AccountId, Account> = self
            .inner
            .read()
            .accounts
            .values()
            .filter(|a| a.tenant_id == tenant_id)
            .map(|a| (a.id, a.clone()))
            .collect();
        for a in self.overlay.accounts.values().filter(|a| a.tenant_id == tenant_id) {
            merged.insert(a.id, a.clone());
        }
        let mut accounts: Vec<Account> = merged.into_values().collect();
        accounts.sort_by_key(|a| a.id);
        Ok(accounts)
    }

    async fn find_voucher(
        &mut self,
        tenant_id: TenantId,
        voucher_id: VoucherId,
        scope: RecordScope,
    ) -> Result<Option<Voucher>, StoreError> {
        Ok(self
            .voucher_view(tenant_id, voucher_id)
            .filter(|v| scope.includes(v.deleted_at)))
    }

    async fn lock_voucher(
        &mut self,
        tenant_id: TenantId,
        voucher_id: VoucherId,
        scope: RecordScope,
    ) -> Result<Option<Voucher>, StoreError> {
        if self.voucher_view(tenant_id, voucher_id).is_none() {
            return Ok(None);
        }
        self.acquire(LockKey::Voucher(voucher_id)).await;
        Ok(self
            .voucher_view(tenant_id, voucher_id)
            .filter(|v| scope.includes(v.deleted_at)))
    }

    async fn insert_voucher(&mut self, voucher: &Voucher) -> Result<(), StoreError> {
        let exists = self.overlay.vouchers.contains_key(&voucher.id)
            || self.inner.read().vouchers.contains_key(&voucher.id);
        if exists {
            return Err(StoreError::Conflict(format!("voucher {} exists", voucher.id)));
        }
        self.acquire(LockKey::Voucher(voucher.id)).await;
        self.overlay.vouchers.insert(voucher.id, voucher.clone());
        Ok(())
    }

    async fn update_voucher(&mut self, voucher: &Voucher) -> Result<(), StoreError> {
        self.require_lock(LockKey::Voucher(voucher.id))?;
        if self.voucher_view(voucher.tenant_id, voucher.id).is_none() {
            return Err(StoreError::NotFound(format!("voucher {}", voucher.id)));
        }
        self.overlay.vouchers.insert(voucher.id, voucher.clone());
        Ok(())
    }

    async fn voucher_lines(
        &mut self,
        tenant_id: TenantId,
        voucher_id: VoucherId,
    ) -> Result<Vec<VoucherLine>, StoreError> {
        if self.voucher_view(tenant_id, voucher_id).is_none() {
            return Ok(Vec::new());
        }
        Ok(self.lines_view(voucher_id))
    }

    async fn replace_lines(
        &mut self,
        tenant_id: TenantId,
        voucher_id: VoucherId,
        lines: &[VoucherLine],
    ) -> Result<(), StoreError> {
        if self.voucher_view(tenant_id, voucher_id).is_none() {
            return Err(StoreError::NotFound(format!("voucher {voucher_id}")));
        }
        self.overlay.lines.insert(voucher_id, lines.to_vec());
        Ok(())
    }

    async fn lock_sequence(
        &mut self,
        scope: SequenceScope,
    ) -> Result<Option<VoucherSequence>, StoreError> {
        self.acquire(LockKey::Sequence(scope)).await;
        Ok(self.sequence_view(scope))
    }

    async fn insert_sequence(&mut self, sequence: &VoucherSequence) -> Result<(), StoreError> {
        let scope = sequence.scope();
        if self.sequence_view(scope).is_none() {
            self.overlay.sequences.insert(scope, sequence.clone());
        }
        Ok(())
    }

    async fn update_sequence(&mut self, sequence: &VoucherSequence) -> Result<(), StoreError> {
        let scope = sequence.scope();
        self.require_lock(LockKey::Sequence(scope))?;
        if Faults::trip(&self.inner.faults.sequence_writes) {
            return Err(StoreError::Database(format!(
                "injected failure writing sequence {scope}"
            )));
        }
        self.overlay.sequences.insert(scope, sequence.clone());
        Ok(())
    }

    async fn append_approval(&mut self, approval: &VoucherApproval) -> Result<(), StoreError> {
        self.overlay.approvals.push(approval.clone());
        Ok(())
    }

    async fn approvals(
        &mut self,
        tenant_id: TenantId,
        voucher_id: VoucherId,
    ) -> Result<Vec<VoucherApproval>, StoreError> {
        let matches = |a: &&VoucherApproval| a.tenant_id == tenant_id && a.voucher_id == voucher_id;
        let mut entries: Vec<VoucherApproval> =
            self.inner.read().approvals.iter().filter(matches).cloned().collect();
        entries.extend(self.overlay.approvals.iter().filter(matches).cloned());
        Ok(entries)
    }

    async fn posted_lines(
        &mut self,
        tenant_id: TenantId,
        account_id: AccountId,
        start: Option<NaiveDate>,
        end: Option<NaiveDate>,
    ) -> Result<Vec<PostedLine>, StoreError> {
        let in_range = |date: NaiveDate| {
            start.is_none_or(|s| date >= s) && end.is_none_or(|e| date <= e)
        };
        let mut posted = Vec::new();
        for voucher in self.tenant_vouchers(tenant_id) {
            if !voucher.is_live_posted() || !in_range(voucher.date) {
                continue;
            }
            for line in self.lines_view(voucher.id) {
                if line.account_id != account_id {
                    continue;
                }
                let narration = if line.narration.is_empty() {
                    voucher.narration.clone()
                } else {
                    line.narration
                };
                posted.push(PostedLine {
                    voucher_id: voucher.id,
                    voucher_number: voucher.voucher_number.clone(),
                    date: voucher.date,
                    dr_cr: line.dr_cr,
                    amount: line.amount,
                    narration,
                    balances_applied: voucher.balances_updated,
                });
            }
        }
        Ok(posted)
    }

    async fn flagged_vouchers(&mut self, tenant_id: TenantId) -> Result<Vec<Voucher>, StoreError> {
        let mut flagged: Vec<Voucher> = self
            .tenant_vouchers(tenant_id)
            .into_iter()
            .filter(|v| v.needs_reconciliation)
            .collect();
        flagged.sort_by_key(|v| v.id);
        Ok(flagged)
    }

    async fn unsynced_vouchers(&mut self, tenant_id: TenantId) -> Result<Vec<Voucher>, StoreError> {
        let mut unsynced: Vec<Voucher> = self
            .tenant_vouchers(tenant_id)
            .into_iter()
            .filter(|v| v.balances_updated != v.is_live_posted())
            .collect();
        unsynced.sort_by_key(|v| v.id);
        Ok(unsynced)
    }

    async fn commit(self) -> Result<(), StoreError> {
        let Self {
            inner,
            overlay,
            guards,
            ..
        } = self;
        {
            let mut state = inner.write();
            state.accounts.extend(overlay.accounts);
            state.vouchers.extend(overlay.vouchers);
            state.lines.extend(overlay.lines);
            state.sequences.extend(overlay.sequences);
            state.approvals.extend(overlay.approvals);
        }
        drop(guards);
        Ok(())
    }

    async fn rollback(self) -> Result<(), StoreError> {
        Ok(())
    }
}
