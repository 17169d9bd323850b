//! Sequence allocator for voucher numbers.
//!
//! One counter row per (tenant, voucher type, period). Allocation locks that
//! row for the rest of the unit of work, so callers on the same scope queue
//! up while callers on other scopes never wait on each other.

use std::sync::Arc;

use tally_core::ledger::VoucherType;
use tally_core::sequence::{default_prefix, SequenceScope, VoucherSequence};
use tally_core::workflow::WorkflowError;
use tally_shared::config::LedgerConfig;
use tally_shared::types::{PeriodId, TenantId};
use tracing::{debug, info};

use crate::store::{LedgerStore, LedgerTx, StoreError};

fn sequence_error(err: StoreError) -> WorkflowError {
    WorkflowError::SequenceGeneration(err.to_string())
}

/// Hands out unique, strictly increasing document numbers.
#[derive(Debug)]
pub struct SequenceAllocator<S> {
    store: Arc<S>,
    padding: u8,
}

impl<S> Clone for SequenceAllocator<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            padding: self.padding,
        }
    }
}

impl<S: LedgerStore> SequenceAllocator<S> {
    /// Creates an allocator using the configured padding for new counters.
    #[must_use]
    pub fn new(store: Arc<S>, config: &LedgerConfig) -> Self {
        Self {
            store,
            padding: config.sequence_padding,
        }
    }

    /// Allocates the next number of a scope in its own unit of work.
    ///
    /// # Errors
    ///
    /// Returns `SequenceGeneration` if the counter cannot be locked, created
    /// or saved; nothing is consumed in that case.
    pub async fn next_number(
        &self,
        tenant_id: TenantId,
        voucher_type: VoucherType,
        period_id: PeriodId,
    ) -> Result<String, WorkflowError> {
        let mut tx = self.store.begin().await.map_err(sequence_error)?;
        let number = Self::allocate_in(&mut tx, tenant_id, voucher_type, period_id, self.padding).await?;
        tx.commit().await.map_err(sequence_error)?;
        Ok(number)
    }

    /// Allocates the next number inside the caller's unit of work.
    ///
    /// The counter row stays locked until the caller commits or rolls back,
    /// so a rolled back transition never burns a number.
    ///
    /// # Errors
    ///
    /// Returns `SequenceGeneration` on lock or save failures and when the
    /// period does not belong to the tenant, `TenantNotFound` for an unknown
    /// tenant.
    pub async fn allocate_in<T: LedgerTx>(
        tx: &mut T,
        tenant_id: TenantId,
        voucher_type: VoucherType,
        period_id: PeriodId,
        padding: u8,
    ) -> Result<String, WorkflowError> {
        let scope = SequenceScope::new(tenant_id, voucher_type, period_id);

        let mut sequence = match tx.lock_sequence(scope).await.map_err(sequence_error)? {
            Some(sequence) => sequence,
            None => {
                let tenant = tx
                    .find_tenant(tenant_id)
                    .await
                    .map_err(sequence_error)?
                    .ok_or(WorkflowError::TenantNotFound(tenant_id))?;
                let period = tx
                    .find_period(tenant_id, period_id)
                    .await
                    .map_err(sequence_error)?
                    .ok_or_else(|| {
                        WorkflowError::SequenceGeneration(format!(
                            "period {period_id} does not belong to tenant {tenant_id}"
                        ))
                    })?;

                let prefix = default_prefix(&tenant.code, voucher_type, &period);
                debug!(%tenant_id, %voucher_type, %prefix, "Creating voucher sequence");
                tx.insert_sequence(&VoucherSequence::new(scope, prefix, padding))
                    .await
                    .map_err(sequence_error)?;

                // A concurrent creator may have won the insert; either way the
                // row exists now and the lock below serializes us behind it.
                tx.lock_sequence(scope)
                    .await
                    .map_err(sequence_error)?
                    .ok_or_else(|| {
                        WorkflowError::SequenceGeneration(format!("sequence {scope} vanished"))
                    })?
            }
        };

        let number = sequence.advance()?;
        tx.update_sequence(&sequence).await.map_err(sequence_error)?;

        info!(%tenant_id, %voucher_type, voucher_number = %number, "Allocated voucher number");
        Ok(number)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use tally_core::fiscal::AccountingPeriod;
    use tally_core::tenant::Tenant;

    use crate::store::MemoryStore;

    fn setup() -> (Arc<MemoryStore>, Tenant, AccountingPeriod) {
        let store = Arc::new(MemoryStore::new());
        let tenant = Tenant::new("Acme", "Acme Corp");
        let period = AccountingPeriod::new(
            tenant.id,
            "Q1 2024",
            NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
            NaiveDate::from_ymd_opt(2024, 3, 31).unwrap(),
        );
        store.insert_tenant(tenant.clone());
        store.insert_period(period.clone());
        (store, tenant, period)
    }

    #[tokio::test]
    async fn test_first_number_creates_counter() {
        let (store, tenant, period) = setup();
        let allocator = SequenceAllocator::new(Arc::clone(&store), &LedgerConfig::default());

        let first = allocator
            .next_number(tenant.id, VoucherType::General, period.id)
            .await
            .unwrap();
        let second = allocator
            .next_number(tenant.id, VoucherType::General, period.id)
            .await
            .unwrap();

        assert_eq!(first, "ACME-GEN-2024Q1-0001");
        assert_eq!(second, "ACME-GEN-2024Q1-0002");
        let scope = SequenceScope::new(tenant.id, VoucherType::General, period.id);
        assert_eq!(store.sequence(scope).unwrap().last_number, 2);
    }

    #[tokio::test]
    async fn test_scopes_count_independently() {
        let (store, tenant, period) = setup();
        let allocator = SequenceAllocator::new(store, &LedgerConfig::default());

        allocator
            .next_number(tenant.id, VoucherType::General, period.id)
            .await
            .unwrap();
        let sales = allocator
            .next_number(tenant.id, VoucherType::Sales, period.id)
            .await
            .unwrap();

        assert_eq!(sales, "ACME-SAL-2024Q1-0001");
    }

    #[tokio::test]
    async fn test_foreign_period_fails() {
        let (store, tenant, _) = setup();
        let other = Tenant::new("Beta", "Beta LLC");
        let foreign = AccountingPeriod::new(
            other.id,
            "Q1 2024",
            NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
            NaiveDate::from_ymd_opt(2024, 3, 31).unwrap(),
        );
        store.insert_tenant(other);
        store.insert_period(foreign.clone());
        let allocator = SequenceAllocator::new(store, &LedgerConfig::default());

        let result = allocator
            .next_number(tenant.id, VoucherType::General, foreign.id)
            .await;
        assert!(matches!(result, Err(WorkflowError::SequenceGeneration(_))));
    }

    #[tokio::test]
    async fn test_failed_save_consumes_nothing() {
        let (store, tenant, period) = setup();
        let allocator = SequenceAllocator::new(Arc::clone(&store), &LedgerConfig::default());
        store.fail_sequence_writes(1);

        let failed = allocator
            .next_number(tenant.id, VoucherType::General, period.id)
            .await;
        assert!(matches!(failed, Err(WorkflowError::SequenceGeneration(_))));

        let number = allocator
            .next_number(tenant.id, VoucherType::General, period.id)
            .await
            .unwrap();
        assert_eq!(number, "ACME-GEN-2024Q1-0001");
    }
}
