//! Background balance synchronization.
//!
//! In deferred mode the workflow commits a posting first and then enqueues
//! a [`BalanceJob`]. The worker applies it with exponential backoff; a job
//! that keeps failing flags its voucher for manual reconciliation instead
//! of being dropped silently.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tally_core::ledger::SyncDirection;
use tally_core::workflow::WorkflowError;
use tally_shared::config::WorkerConfig;
use tally_shared::types::{TenantId, VoucherId};
use tokio::sync::mpsc;
use tokio::task::{JoinHandle, JoinSet};
use tracing::{debug, error, info, warn};

use crate::repositories::BalanceSynchronizer;
use crate::store::LedgerStore;

/// A balance effect to apply after commit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BalanceJob {
    /// Apply a posted voucher's effects.
    Apply {
        /// Owning tenant.
        tenant_id: TenantId,
        /// The voucher.
        voucher_id: VoucherId,
    },
    /// Reverse a voucher's applied effects.
    Reverse {
        /// Owning tenant.
        tenant_id: TenantId,
        /// The voucher.
        voucher_id: VoucherId,
    },
}

impl BalanceJob {
    /// Builds a job for a sync direction.
    #[must_use]
    pub const fn for_direction(direction: SyncDirection, tenant_id: TenantId, voucher_id: VoucherId) -> Self {
        match direction {
            SyncDirection::Apply => Self::Apply { tenant_id, voucher_id },
            SyncDirection::Reverse => Self::Reverse { tenant_id, voucher_id },
        }
    }

    /// Owning tenant.
    #[must_use]
    pub const fn tenant_id(&self) -> TenantId {
        match self {
            Self::Apply { tenant_id, .. } | Self::Reverse { tenant_id, .. } => *tenant_id,
        }
    }

    /// The voucher.
    #[must_use]
    pub const fn voucher_id(&self) -> VoucherId {
        match self {
            Self::Apply { voucher_id, .. } | Self::Reverse { voucher_id, .. } => *voucher_id,
        }
    }

    /// Direction of the effect.
    #[must_use]
    pub const fn direction(&self) -> SyncDirection {
        match self {
            Self::Apply { .. } => SyncDirection::Apply,
            Self::Reverse { .. } => SyncDirection::Reverse,
        }
    }
}

/// Exponential backoff for failed jobs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the first attempt.
    pub max_retries: u32,
    /// Delay before the first retry.
    pub base_delay: Duration,
    /// Upper bound of any delay.
    pub max_delay: Duration,
}

impl From<&WorkerConfig> for RetryPolicy {
    fn from(config: &WorkerConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            base_delay: Duration::from_millis(config.base_delay_ms),
            max_delay: Duration::from_millis(config.max_delay_ms),
        }
    }
}

impl RetryPolicy {
    /// Delay before retry number `attempt` (zero based).
    #[must_use]
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt);
        self.base_delay.saturating_mul(factor).min(self.max_delay)
    }
}

/// What happened to a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobOutcome {
    /// The job ran; `changed` is false if it was already applied.
    Completed {
        /// Whether balances were written.
        changed: bool,
    },
    /// The voucher no longer exists.
    Dropped,
    /// Retries ran out and the voucher was flagged.
    Escalated,
}

/// Enqueues balance jobs for the worker.
#[derive(Debug, Clone)]
pub struct BalanceDispatcher {
    sender: mpsc::Sender<BalanceJob>,
}

impl BalanceDispatcher {
    /// Enqueues a job, waiting for queue capacity.
    ///
    /// # Errors
    ///
    /// Returns `BalanceSync` if the worker has shut down.
    pub async fn dispatch(&self, job: BalanceJob) -> Result<(), WorkflowError> {
        self.sender
            .send(job)
            .await
            .map_err(|_| WorkflowError::BalanceSync("balance worker is not running".to_string()))?;
        debug!(tenant_id = %job.tenant_id(), voucher_id = %job.voucher_id(), "Balance job queued");
        Ok(())
    }
}

/// Consumes balance jobs until every dispatcher is dropped.
#[derive(Debug)]
pub struct BalanceWorker<S> {
    sync: BalanceSynchronizer<S>,
    policy: RetryPolicy,
    receiver: mpsc::Receiver<BalanceJob>,
}

impl<S: LedgerStore> BalanceWorker<S> {
    /// Runs the worker loop.
    ///
    /// Jobs run concurrently; row locks serialize jobs that touch the same
    /// voucher or accounts. In-flight jobs finish before this returns.
    pub async fn run(mut self) {
        let mut tasks = JoinSet::new();
        info!("Balance worker started");

        while let Some(job) = self.receiver.recv().await {
            let sync = self.sync.clone();
            let policy = self.policy;
            tasks.spawn(async move { process(&sync, policy, job).await });

            // Reap finished tasks so the set does not grow unbounded.
            while let Some(done) = tasks.try_join_next() {
                if let Err(err) = done {
                    error!(error = %err, "Balance job task panicked");
                }
            }
        }

        while let Some(done) = tasks.join_next().await {
            if let Err(err) = done {
                error!(error = %err, "Balance job task panicked");
            }
        }
        info!("Balance worker stopped");
    }
}

/// Runs one job to completion, retrying with backoff.
pub async fn process<S: LedgerStore>(
    sync: &BalanceSynchronizer<S>,
    policy: RetryPolicy,
    job: BalanceJob,
) -> JobOutcome {
    let tenant_id = job.tenant_id();
    let voucher_id = job.voucher_id();
    let mut attempt = 0;

    loop {
        let result = match job.direction() {
            SyncDirection::Apply => sync.apply(tenant_id, voucher_id).await,
            SyncDirection::Reverse => sync.reverse(tenant_id, voucher_id).await,
        };

        match result {
            Ok(changed) => return JobOutcome::Completed { changed },
            Err(WorkflowError::VoucherNotFound(_)) => {
                warn!(%tenant_id, %voucher_id, "Voucher of balance job not found, dropping");
                return JobOutcome::Dropped;
            }
            Err(err) if attempt < policy.max_retries => {
                let delay = policy.delay_for(attempt);
                warn!(
                    %tenant_id,
                    %voucher_id,
                    attempt = attempt + 1,
                    delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                    error = %err,
                    "Balance job failed, retrying"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(err) => {
                error!(
                    %tenant_id,
                    %voucher_id,
                    attempts = attempt + 1,
                    error = %err,
                    "Balance job exhausted its retries"
                );
                if let Err(flag_err) = sync.flag_for_reconciliation(tenant_id, voucher_id).await {
                    error!(%tenant_id, %voucher_id, error = %flag_err, "Could not flag voucher for reconciliation");
                }
                return JobOutcome::Escalated;
            }
        }
    }
}

/// Creates a dispatcher and spawns its worker on the current runtime.
///
/// The worker stops once every clone of the dispatcher is dropped and its
/// queue is drained.
pub fn spawn_balance_worker<S: LedgerStore>(
    store: Arc<S>,
    config: &WorkerConfig,
) -> (BalanceDispatcher, JoinHandle<()>) {
    let (sender, receiver) = mpsc::channel(config.queue_capacity.max(1));
    let worker = BalanceWorker {
        sync: BalanceSynchronizer::new(store),
        policy: RetryPolicy::from(config),
        receiver,
    };
    let handle = tokio::spawn(worker.run());
    (BalanceDispatcher { sender }, handle)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;
    use tally_core::ledger::{Account, AccountType, LineInput, Voucher, VoucherLine, VoucherType};
    use tally_core::workflow::VoucherStatus;
    use tally_shared::types::{AccountId, PeriodId, UserId};

    use crate::store::{LedgerTx, MemoryStore};

    fn policy() -> RetryPolicy {
        RetryPolicy {
            max_retries: 3,
            base_delay: Duration::from_secs(60),
            max_delay: Duration::from_secs(900),
        }
    }

    fn account(tenant_id: TenantId, account_type: AccountType) -> Account {
        Account {
            id: AccountId::new(),
            tenant_id,
            number: "1000".into(),
            name: "Test".into(),
            account_type,
            currency: "USD".into(),
            is_active: true,
            allow_direct_posting: true,
            current_balance: Decimal::ZERO,
            balance_last_updated: None,
        }
    }

    async fn setup() -> (Arc<MemoryStore>, TenantId, AccountId, VoucherId) {
        let store = Arc::new(MemoryStore::new());
        let tenant = TenantId::new();
        let cash = account(tenant, AccountType::Asset);
        let revenue = account(tenant, AccountType::Income);
        store.insert_account(cash.clone());
        store.insert_account(revenue.clone());

        let mut voucher = Voucher::draft(
            tenant,
            VoucherType::General,
            PeriodId::new(),
            NaiveDate::from_ymd_opt(2024, 1, 15).unwrap(),
            UserId::new(),
        );
        voucher.status = VoucherStatus::Posted;
        let lines: Vec<VoucherLine> = [LineInput::debit(cash.id, dec!(50)), LineInput::credit(revenue.id, dec!(50))]
            .iter()
            .map(|l| VoucherLine::from_input(voucher.id, l))
            .collect();
        let mut tx = store.begin().await.unwrap();
        tx.insert_voucher(&voucher).await.unwrap();
        tx.replace_lines(tenant, voucher.id, &lines).await.unwrap();
        tx.commit().await.unwrap();

        (store, tenant, cash.id, voucher.id)
    }

    #[test]
    fn test_delay_doubles_until_cap() {
        let policy = policy();
        assert_eq!(policy.delay_for(0), Duration::from_secs(60));
        assert_eq!(policy.delay_for(1), Duration::from_secs(120));
        assert_eq!(policy.delay_for(2), Duration::from_secs(240));
        assert_eq!(policy.delay_for(4), Duration::from_secs(900));
        assert_eq!(policy.delay_for(40), Duration::from_secs(900));
    }

    #[test]
    fn test_policy_from_config() {
        let policy = RetryPolicy::from(&WorkerConfig::default());
        assert_eq!(policy.max_retries, 3);
        assert_eq!(policy.base_delay, Duration::from_secs(60));
        assert_eq!(policy.max_delay, Duration::from_secs(900));
    }

    #[test]
    fn test_job_accessors() {
        let tenant = TenantId::new();
        let voucher = VoucherId::new();
        let job = BalanceJob::for_direction(SyncDirection::Reverse, tenant, voucher);
        assert_eq!(job, BalanceJob::Reverse { tenant_id: tenant, voucher_id: voucher });
        assert_eq!(job.tenant_id(), tenant);
        assert_eq!(job.voucher_id(), voucher);
        assert_eq!(job.direction(), SyncDirection::Reverse);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_then_succeed() {
        let (store, tenant, cash, voucher_id) = setup().await;
        store.fail_balance_writes(2);
        let sync = BalanceSynchronizer::new(Arc::clone(&store));

        let outcome = process(
            &sync,
            policy(),
            BalanceJob::Apply {
                tenant_id: tenant,
                voucher_id,
            },
        )
        .await;

        assert_eq!(outcome, JobOutcome::Completed { changed: true });
        assert_eq!(store.account(cash).unwrap().current_balance, dec!(50));
        assert!(!store.voucher(voucher_id).unwrap().needs_reconciliation);
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhausted_retries_flag_voucher() {
        let (store, tenant, cash, voucher_id) = setup().await;
        store.fail_balance_writes(10);
        let sync = BalanceSynchronizer::new(Arc::clone(&store));

        let outcome = process(
            &sync,
            policy(),
            BalanceJob::Apply {
                tenant_id: tenant,
                voucher_id,
            },
        )
        .await;

        assert_eq!(outcome, JobOutcome::Escalated);
        assert_eq!(store.account(cash).unwrap().current_balance, Decimal::ZERO);
        let voucher = store.voucher(voucher_id).unwrap();
        assert!(voucher.needs_reconciliation);
        assert!(!voucher.balances_updated);
    }

    #[tokio::test]
    async fn test_missing_voucher_is_dropped() {
        let store = Arc::new(MemoryStore::new());
        let sync = BalanceSynchronizer::new(store);
        let outcome = process(
            &sync,
            policy(),
            BalanceJob::Apply {
                tenant_id: TenantId::new(),
                voucher_id: VoucherId::new(),
            },
        )
        .await;
        assert_eq!(outcome, JobOutcome::Dropped);
    }

    #[tokio::test]
    async fn test_worker_drains_queue_on_shutdown() {
        let (store, tenant, cash, voucher_id) = setup().await;
        let (dispatcher, handle) = spawn_balance_worker(Arc::clone(&store), &WorkerConfig::default());

        dispatcher
            .dispatch(BalanceJob::Apply {
                tenant_id: tenant,
                voucher_id,
            })
            .await
            .unwrap();
        drop(dispatcher);
        handle.await.unwrap();

        assert_eq!(store.account(cash).unwrap().current_balance, dec!(50));
    }
}
