//! Voucher workflow engine.
//!
//! Each operation runs as one unit of work: lock the voucher, run the
//! checks in order (tenant, state, permission, period, validation), apply
//! the transition with its numbering and balance effects, append the audit
//! entry, commit. Events are published only after commit.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{NaiveDate, Utc};
use tally_core::fiscal::AccountingPeriod;
use tally_core::ledger::validation::{ensure_postable, totals_of, validate_balanced};
use tally_core::ledger::{
    Account, LedgerService, LineInput, NewVoucher, ResolvedLine, ValidationError, Voucher,
    VoucherLine, VoucherUpdate,
};
use tally_core::workflow::{
    Actor, ApprovalAction, LedgerEvent, PermissionChecker, ReversalRequest, ReversalService,
    VoucherAction, VoucherApproval, VoucherStatus, WorkflowAction, WorkflowError, WorkflowService,
};
use tally_shared::config::{LedgerConfig, SyncMode};
use tally_shared::types::{AccountId, ApprovalId, TenantId, UserId, VoucherId};
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

use super::balance::BalanceSynchronizer;
use super::sequence::SequenceAllocator;
use crate::store::{LedgerStore, LedgerTx, RecordScope};
use crate::worker::{BalanceDispatcher, BalanceJob};

const EVENT_CAPACITY: usize = 256;

/// Drives vouchers through their lifecycle.
pub struct VoucherWorkflow<S> {
    store: Arc<S>,
    permissions: Arc<dyn PermissionChecker>,
    config: LedgerConfig,
    sync: BalanceSynchronizer<S>,
    dispatcher: Option<BalanceDispatcher>,
    events: broadcast::Sender<LedgerEvent>,
}

impl<S> Clone for VoucherWorkflow<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            permissions: Arc::clone(&self.permissions),
            config: self.config.clone(),
            sync: self.sync.clone(),
            dispatcher: self.dispatcher.clone(),
            events: self.events.clone(),
        }
    }
}

impl<S: LedgerStore> VoucherWorkflow<S> {
    /// Creates a workflow engine that syncs balances inline.
    #[must_use]
    pub fn new(store: Arc<S>, permissions: Arc<dyn PermissionChecker>, config: LedgerConfig) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            sync: BalanceSynchronizer::new(Arc::clone(&store)),
            store,
            permissions,
            config,
            dispatcher: None,
            events,
        }
    }

    /// Attaches the dispatcher used when `sync_mode` is deferred.
    #[must_use]
    pub fn with_dispatcher(mut self, dispatcher: BalanceDispatcher) -> Self {
        self.dispatcher = Some(dispatcher);
        self
    }

    /// Subscribes to events of committed transitions.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<LedgerEvent> {
        self.events.subscribe()
    }

    fn deferred(&self) -> Option<&BalanceDispatcher> {
        match self.config.sync_mode {
            SyncMode::Deferred => self.dispatcher.as_ref(),
            SyncMode::Inline => None,
        }
    }

    fn emit(&self, event: LedgerEvent) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }

    fn authorize(&self, actor: &Actor, action: VoucherAction, voucher: Option<&Voucher>) -> Result<(), WorkflowError> {
        WorkflowService::authorize(self.permissions.as_ref(), actor, action, voucher)
    }

    async fn lock<T: LedgerTx>(tx: &mut T, tenant_id: TenantId, voucher_id: VoucherId) -> Result<Voucher, WorkflowError> {
        let voucher = tx
            .lock_voucher(tenant_id, voucher_id, RecordScope::Active)
            .await?
            .ok_or(WorkflowError::VoucherNotFound(voucher_id))?;
        WorkflowService::ensure_tenant(tenant_id, &voucher)?;
        Ok(voucher)
    }

    async fn period_for<T: LedgerTx>(
        tx: &mut T,
        tenant_id: TenantId,
        date: NaiveDate,
    ) -> Result<AccountingPeriod, WorkflowError> {
        let period = tx
            .find_period_for_date(tenant_id, date)
            .await?
            .ok_or(ValidationError::NoPeriodForDate(date))?;
        WorkflowService::ensure_period_open(&period)?;
        Ok(period)
    }

    async fn open_period_of<T: LedgerTx>(tx: &mut T, voucher: &Voucher) -> Result<AccountingPeriod, WorkflowError> {
        let period = tx
            .find_period(voucher.tenant_id, voucher.accounting_period_id)
            .await?
            .ok_or(ValidationError::NoPeriodForDate(voucher.date))?;
        WorkflowService::ensure_period_open(&period)?;
        Ok(period)
    }

    async fn resolve<T: LedgerTx>(
        tx: &mut T,
        tenant_id: TenantId,
        lines: &[LineInput],
    ) -> Result<Vec<ResolvedLine>, WorkflowError> {
        let mut accounts: HashMap<AccountId, Account> = HashMap::new();
        for line in lines {
            if accounts.contains_key(&line.account_id) {
                continue;
            }
            if let Some(account) = tx.find_account(tenant_id, line.account_id).await? {
                accounts.insert(account.id, account);
            }
        }
        Ok(LedgerService::resolve_lines(tenant_id, lines, |id| {
            accounts.get(&id).cloned()
        })?)
    }

    async fn stored_inputs<T: LedgerTx>(tx: &mut T, voucher: &Voucher) -> Result<Vec<LineInput>, WorkflowError> {
        let lines = tx.voucher_lines(voucher.tenant_id, voucher.id).await?;
        Ok(lines.iter().map(VoucherLine::to_input).collect())
    }

    /// Checks that stored lines still hit valid accounts and balance.
    async fn revalidate<T: LedgerTx>(tx: &mut T, voucher: &Voucher) -> Result<(), WorkflowError> {
        let inputs = Self::stored_inputs(tx, voucher).await?;
        Self::resolve(tx, voucher.tenant_id, &inputs).await?;
        validate_balanced(&inputs)?;
        Ok(())
    }

    /// Numbers and posts a voucher inside the unit of work.
    ///
    /// Returns true if balances were applied inline.
    async fn post_in<T: LedgerTx>(
        &self,
        tx: &mut T,
        voucher: &mut Voucher,
        posted_by: UserId,
    ) -> Result<bool, WorkflowError> {
        if voucher.voucher_number.is_none() {
            let number = SequenceAllocator::<S>::allocate_in(
                tx,
                voucher.tenant_id,
                voucher.voucher_type,
                voucher.accounting_period_id,
                self.config.sequence_padding,
            )
            .await?;
            voucher.voucher_number = Some(number);
        }

        let now = Utc::now();
        voucher.status = VoucherStatus::Posted;
        voucher.approved_by = Some(posted_by);
        voucher.approved_at = Some(now);
        voucher.posted_by = Some(posted_by);
        voucher.posted_at = Some(now);
        voucher.updated_at = now;

        if self.deferred().is_some() {
            return Ok(false);
        }
        BalanceSynchronizer::<S>::apply_in(tx, voucher).await
    }

    /// Hands a post-commit balance job to the worker.
    ///
    /// The transition is already committed, so a failed enqueue flags the
    /// voucher instead of failing the call.
    async fn enqueue(&self, job: BalanceJob) {
        let Some(dispatcher) = self.deferred() else {
            return;
        };
        if let Err(err) = dispatcher.dispatch(job).await {
            error!(
                tenant_id = %job.tenant_id(),
                voucher_id = %job.voucher_id(),
                error = %err,
                "Could not enqueue balance job after commit"
            );
            if let Err(flag_err) = self
                .sync
                .flag_for_reconciliation(job.tenant_id(), job.voucher_id())
                .await
            {
                error!(voucher_id = %job.voucher_id(), error = %flag_err, "Could not flag voucher for reconciliation");
            }
        }
    }

    async fn record<T: LedgerTx>(
        tx: &mut T,
        action: &WorkflowAction,
        voucher: &Voucher,
        from: VoucherStatus,
    ) -> Result<(), WorkflowError> {
        if let Some(entry) = action.approval_entry(voucher.tenant_id, voucher.id, from) {
            tx.append_approval(&entry).await?;
        }
        Ok(())
    }

    /// Creates a draft voucher.
    ///
    /// Lines are checked structurally; an imbalanced draft is accepted.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The tenant does not exist or is inactive
    /// - The actor may not create vouchers
    /// - No open period covers the date
    /// - A line fails structural validation
    pub async fn create(&self, tenant_id: TenantId, actor: &Actor, input: NewVoucher) -> Result<Voucher, WorkflowError> {
        let mut tx = self.store.begin().await?;
        tx.find_tenant(tenant_id)
            .await?
            .filter(|t| t.is_active)
            .ok_or(WorkflowError::TenantNotFound(tenant_id))?;
        self.authorize(actor, VoucherAction::Create, None)?;

        let period = Self::period_for(&mut tx, tenant_id, input.date).await?;
        Self::resolve(&mut tx, tenant_id, &input.lines).await?;

        let mut voucher = Voucher::draft(tenant_id, input.voucher_type, period.id, input.date, actor.user_id);
        voucher.party_id = input.party_id;
        voucher.narration = input.narration;
        voucher.reference = input.reference;

        let totals = totals_of(&input.lines)?;
        if let Err(err) = ensure_postable(totals) {
            warn!(%tenant_id, voucher_id = %voucher.id, reason = %err, "Draft voucher is not balanced yet");
        }

        let lines: Vec<VoucherLine> = input.lines.iter().map(|l| VoucherLine::from_input(voucher.id, l)).collect();
        tx.insert_voucher(&voucher).await?;
        tx.replace_lines(tenant_id, voucher.id, &lines).await?;
        tx.commit().await?;

        info!(%tenant_id, voucher_id = %voucher.id, voucher_type = %voucher.voucher_type, lines = lines.len(), "Voucher created");
        self.emit(LedgerEvent::VoucherCreated {
            tenant_id,
            voucher_id: voucher.id,
            actor: actor.user_id,
        });
        Ok(voucher)
    }

    /// Edits a Draft or Rejected voucher.
    ///
    /// A new date re-resolves the period. Lines of a Rejected voucher must
    /// balance, since it can be approved again without another submit.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - Voucher is not found
    /// - Voucher is not editable
    /// - The actor may not edit vouchers
    /// - The current or new period is locked
    /// - The new lines are invalid
    pub async fn edit(
        &self,
        tenant_id: TenantId,
        actor: &Actor,
        voucher_id: VoucherId,
        update: VoucherUpdate,
    ) -> Result<Voucher, WorkflowError> {
        let mut tx = self.store.begin().await?;
        let mut voucher = Self::lock(&mut tx, tenant_id, voucher_id).await?;
        WorkflowService::ensure_editable(voucher.status)?;
        self.authorize(actor, VoucherAction::Edit, Some(&voucher))?;
        Self::open_period_of(&mut tx, &voucher).await?;

        if update.is_empty() {
            tx.rollback().await?;
            return Ok(voucher);
        }

        if let Some(date) = update.date {
            let period = Self::period_for(&mut tx, tenant_id, date).await?;
            voucher.date = date;
            voucher.accounting_period_id = period.id;
        }

        if let Some(inputs) = &update.lines {
            Self::resolve(&mut tx, tenant_id, inputs).await?;
            if voucher.status == VoucherStatus::Rejected {
                validate_balanced(inputs)?;
            } else if let Err(err) = ensure_postable(totals_of(inputs)?) {
                warn!(%tenant_id, %voucher_id, reason = %err, "Draft voucher is not balanced yet");
            }
            let lines: Vec<VoucherLine> = inputs.iter().map(|l| VoucherLine::from_input(voucher.id, l)).collect();
            tx.replace_lines(tenant_id, voucher.id, &lines).await?;
            BalanceSynchronizer::<S>::on_lines_mutated(&mut voucher);
        }

        if let Some(narration) = update.narration {
            voucher.narration = narration;
        }
        if let Some(reference) = update.reference {
            voucher.reference = reference;
        }
        if let Some(party_id) = update.party_id {
            voucher.party_id = party_id;
        }

        voucher.updated_at = Utc::now();
        tx.update_voucher(&voucher).await?;
        tx.commit().await?;

        debug!(%tenant_id, %voucher_id, "Voucher edited");
        self.emit(LedgerEvent::VoucherEdited {
            tenant_id,
            voucher_id,
            actor: actor.user_id,
        });
        Ok(voucher)
    }

    /// Submits a draft for approval.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - Voucher is not found
    /// - Voucher is not in Draft
    /// - The actor may not submit
    /// - The period is locked
    /// - Lines are missing, unbalanced or hit invalid accounts
    pub async fn submit(&self, tenant_id: TenantId, actor: &Actor, voucher_id: VoucherId) -> Result<Voucher, WorkflowError> {
        let mut tx = self.store.begin().await?;
        let mut voucher = Self::lock(&mut tx, tenant_id, voucher_id).await?;
        let from = voucher.status;
        let action = WorkflowService::submit(from, actor.user_id)?;
        self.authorize(actor, VoucherAction::Submit, Some(&voucher))?;
        Self::open_period_of(&mut tx, &voucher).await?;
        Self::revalidate(&mut tx, &voucher).await?;

        WorkflowService::ensure_transition(VoucherAction::Submit, from, action.new_status())?;
        voucher.status = action.new_status();
        voucher.updated_at = Utc::now();
        tx.update_voucher(&voucher).await?;
        Self::record(&mut tx, &action, &voucher, from).await?;
        tx.commit().await?;

        info!(%tenant_id, %voucher_id, "Voucher submitted for approval");
        self.emit(LedgerEvent::VoucherSubmitted {
            tenant_id,
            voucher_id,
            actor: actor.user_id,
        });
        Ok(voucher)
    }

    /// Approves and posts a pending or rejected voucher.
    ///
    /// Assigns the next number of the voucher's scope if it has none, and
    /// applies balances in the same unit of work unless sync is deferred,
    /// in which case a job is enqueued after commit.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - Voucher is not found
    /// - Voucher is not PendingApproval or Rejected
    /// - The actor may not approve
    /// - The period is locked
    /// - Lines no longer validate
    /// - Number allocation or inline balance sync fails
    pub async fn approve(
        &self,
        tenant_id: TenantId,
        actor: &Actor,
        voucher_id: VoucherId,
        comment: Option<String>,
    ) -> Result<Voucher, WorkflowError> {
        let mut tx = self.store.begin().await?;
        let mut voucher = Self::lock(&mut tx, tenant_id, voucher_id).await?;
        let from = voucher.status;
        let action = WorkflowService::approve(from, actor.user_id, voucher.voucher_number.is_some(), comment)?;
        self.authorize(actor, VoucherAction::Approve, Some(&voucher))?;
        Self::open_period_of(&mut tx, &voucher).await?;
        Self::revalidate(&mut tx, &voucher).await?;
        WorkflowService::ensure_transition(VoucherAction::Approve, from, action.new_status())?;

        let applied = self.post_in(&mut tx, &mut voucher, actor.user_id).await?;
        tx.update_voucher(&voucher).await?;
        Self::record(&mut tx, &action, &voucher, from).await?;
        tx.commit().await?;

        let voucher_number = voucher.display_ref();
        info!(%tenant_id, %voucher_id, %voucher_number, balances_applied = applied, "Voucher posted");
        if !applied {
            self.enqueue(BalanceJob::Apply { tenant_id, voucher_id }).await;
        }
        self.emit(LedgerEvent::VoucherPosted {
            tenant_id,
            voucher_id,
            voucher_number,
            balances_applied: applied,
        });
        Ok(voucher)
    }

    /// Sends a pending voucher back to its preparer.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - Voucher is not found
    /// - Voucher is not PendingApproval
    /// - The reason is blank
    /// - The actor may not reject
    /// - The period is locked
    pub async fn reject(
        &self,
        tenant_id: TenantId,
        actor: &Actor,
        voucher_id: VoucherId,
        reason: String,
    ) -> Result<Voucher, WorkflowError> {
        let mut tx = self.store.begin().await?;
        let mut voucher = Self::lock(&mut tx, tenant_id, voucher_id).await?;
        let from = voucher.status;
        let action = WorkflowService::reject(from, actor.user_id, reason)?;
        self.authorize(actor, VoucherAction::Reject, Some(&voucher))?;
        Self::open_period_of(&mut tx, &voucher).await?;

        WorkflowService::ensure_transition(VoucherAction::Reject, from, action.new_status())?;
        voucher.status = action.new_status();
        voucher.updated_at = Utc::now();
        tx.update_voucher(&voucher).await?;
        Self::record(&mut tx, &action, &voucher, from).await?;
        tx.commit().await?;

        warn!(%tenant_id, %voucher_id, rejected_by = %actor.user_id, "Voucher rejected");
        self.emit(LedgerEvent::VoucherRejected {
            tenant_id,
            voucher_id,
            actor: actor.user_id,
        });
        Ok(voucher)
    }

    /// Cancels a posted voucher, reversing its balances in the same unit
    /// of work.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - Voucher is not found
    /// - Voucher is not Posted
    /// - The actor may not cancel
    /// - The period is locked
    /// - The reversal fails; the voucher stays Posted then
    pub async fn cancel(
        &self,
        tenant_id: TenantId,
        actor: &Actor,
        voucher_id: VoucherId,
        reason: Option<String>,
    ) -> Result<Voucher, WorkflowError> {
        let mut tx = self.store.begin().await?;
        let mut voucher = Self::lock(&mut tx, tenant_id, voucher_id).await?;
        let from = voucher.status;
        let action = WorkflowService::cancel(from, actor.user_id, reason)?;
        self.authorize(actor, VoucherAction::Cancel, Some(&voucher))?;
        Self::open_period_of(&mut tx, &voucher).await?;
        WorkflowService::ensure_transition(VoucherAction::Cancel, from, action.new_status())?;

        BalanceSynchronizer::<S>::reverse_in(&mut tx, &mut voucher).await?;
        voucher.status = action.new_status();
        voucher.updated_at = Utc::now();
        tx.update_voucher(&voucher).await?;
        Self::record(&mut tx, &action, &voucher, from).await?;
        tx.commit().await?;

        info!(%tenant_id, %voucher_id, voucher_number = %voucher.display_ref(), "Voucher cancelled");
        self.emit(LedgerEvent::VoucherCancelled {
            tenant_id,
            voucher_id,
            deleted: false,
        });
        Ok(voucher)
    }

    /// Soft-deletes a voucher.
    ///
    /// A Posted voucher is reversed inline and becomes Cancelled before the
    /// deletion marker is set; its number stays consumed.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - Voucher is not found
    /// - Voucher is PendingApproval or Cancelled
    /// - The actor may not delete
    /// - The period is locked
    /// - The reversal fails; nothing is deleted then
    pub async fn delete(&self, tenant_id: TenantId, actor: &Actor, voucher_id: VoucherId) -> Result<Voucher, WorkflowError> {
        let mut tx = self.store.begin().await?;
        let mut voucher = Self::lock(&mut tx, tenant_id, voucher_id).await?;
        let from = voucher.status;
        let action = WorkflowService::delete(from, actor.user_id)?;
        self.authorize(actor, VoucherAction::Delete, Some(&voucher))?;
        Self::open_period_of(&mut tx, &voucher).await?;
        WorkflowService::ensure_transition(VoucherAction::Delete, from, action.new_status())?;

        if action.balance_effect().is_some() {
            BalanceSynchronizer::<S>::reverse_in(&mut tx, &mut voucher).await?;
        }
        let now = Utc::now();
        voucher.status = action.new_status();
        voucher.deleted_at = Some(now);
        voucher.updated_at = now;
        tx.update_voucher(&voucher).await?;
        Self::record(&mut tx, &action, &voucher, from).await?;
        tx.commit().await?;

        info!(%tenant_id, %voucher_id, from = %from, "Voucher deleted");
        if from == VoucherStatus::Posted {
            self.emit(LedgerEvent::VoucherCancelled {
                tenant_id,
                voucher_id,
                deleted: true,
            });
        } else {
            self.emit(LedgerEvent::VoucherDeleted {
                tenant_id,
                voucher_id,
                status: from,
            });
        }
        Ok(voucher)
    }

    /// Appends a free-form comment to the audit log.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - Voucher is not found
    /// - The actor may not comment
    /// - The comment is blank
    pub async fn add_comment(
        &self,
        tenant_id: TenantId,
        actor: &Actor,
        voucher_id: VoucherId,
        comment: String,
    ) -> Result<VoucherApproval, WorkflowError> {
        let mut tx = self.store.begin().await?;
        let voucher = tx
            .find_voucher(tenant_id, voucher_id, RecordScope::Active)
            .await?
            .ok_or(WorkflowError::VoucherNotFound(voucher_id))?;
        WorkflowService::ensure_tenant(tenant_id, &voucher)?;
        self.authorize(actor, VoucherAction::Comment, Some(&voucher))?;
        if comment.trim().is_empty() {
            return Err(ValidationError::CommentRequired.into());
        }

        let entry = VoucherApproval {
            id: ApprovalId::new(),
            tenant_id,
            voucher_id,
            action: ApprovalAction::Commented,
            from_status: voucher.status,
            to_status: voucher.status,
            actor: actor.user_id,
            created_at: Utc::now(),
            comment: Some(comment),
        };
        tx.append_approval(&entry).await?;
        tx.commit().await?;
        Ok(entry)
    }

    /// Raises a reversing voucher against a posted one.
    ///
    /// The new voucher swaps every line's side. With `post_immediately` it
    /// is numbered and posted in the same unit of work. The original stays
    /// Posted and is linked to its reversal.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The original is not found, not Posted or already reversed
    /// - The actor may not reverse, or may not approve when posting
    /// - No open period covers the reversal date
    /// - Number allocation or inline balance sync fails
    pub async fn create_reversing_voucher(
        &self,
        tenant_id: TenantId,
        actor: &Actor,
        original_id: VoucherId,
        request: ReversalRequest,
    ) -> Result<Voucher, WorkflowError> {
        let mut tx = self.store.begin().await?;
        let mut original = Self::lock(&mut tx, tenant_id, original_id).await?;
        ReversalService::ensure_reversible(&original)?;
        self.authorize(actor, VoucherAction::Reverse, Some(&original))?;
        if request.post_immediately {
            self.authorize(actor, VoucherAction::Approve, Some(&original))?;
        }

        let original_lines = tx.voucher_lines(tenant_id, original_id).await?;
        let input = ReversalService::build(&original, &original_lines, &request)?;
        let period = Self::period_for(&mut tx, tenant_id, input.date).await?;
        Self::resolve(&mut tx, tenant_id, &input.lines).await?;
        validate_balanced(&input.lines)?;

        let mut reversal = Voucher::draft(tenant_id, input.voucher_type, period.id, input.date, actor.user_id);
        reversal.party_id = input.party_id;
        reversal.narration = input.narration;
        reversal.reference = input.reference;
        reversal.is_reversal_for = Some(original_id);
        let lines: Vec<VoucherLine> = input.lines.iter().map(|l| VoucherLine::from_input(reversal.id, l)).collect();
        tx.insert_voucher(&reversal).await?;
        tx.replace_lines(tenant_id, reversal.id, &lines).await?;

        let mut applied = false;
        if request.post_immediately {
            let approve = WorkflowAction::Approve {
                from: VoucherStatus::Draft,
                new_status: VoucherStatus::Posted,
                approved_by: actor.user_id,
                approved_at: Utc::now(),
                assign_number: true,
                comment: Some(format!("Reversal of {} posted.", original.display_ref())),
            };
            applied = self.post_in(&mut tx, &mut reversal, actor.user_id).await?;
            tx.update_voucher(&reversal).await?;
            Self::record(&mut tx, &approve, &reversal, VoucherStatus::Draft).await?;
        }

        original.is_reversed = true;
        original.reversed_by_voucher = Some(reversal.id);
        original.updated_at = Utc::now();
        tx.update_voucher(&original).await?;
        tx.commit().await?;

        info!(
            %tenant_id,
            voucher_id = %original_id,
            reversal_id = %reversal.id,
            posted = request.post_immediately,
            "Reversing voucher created"
        );
        if request.post_immediately {
            if !applied {
                self.enqueue(BalanceJob::Apply {
                    tenant_id,
                    voucher_id: reversal.id,
                })
                .await;
            }
            self.emit(LedgerEvent::VoucherPosted {
                tenant_id,
                voucher_id: reversal.id,
                voucher_number: reversal.display_ref(),
                balances_applied: applied,
            });
        }
        self.emit(LedgerEvent::ReversingVoucherCreated {
            tenant_id,
            voucher_id: original_id,
            reversal_id: reversal.id,
            posted: request.post_immediately,
        });
        Ok(reversal)
    }

    /// Returns a voucher of the tenant.
    ///
    /// # Errors
    ///
    /// Returns `VoucherNotFound` if it is missing or out of scope.
    pub async fn get_voucher(
        &self,
        tenant_id: TenantId,
        voucher_id: VoucherId,
        scope: RecordScope,
    ) -> Result<Voucher, WorkflowError> {
        let mut tx = self.store.begin().await?;
        let voucher = tx
            .find_voucher(tenant_id, voucher_id, scope)
            .await?
            .ok_or(WorkflowError::VoucherNotFound(voucher_id))?;
        tx.rollback().await?;
        Ok(voucher)
    }

    /// Returns the lines of a voucher of the tenant.
    ///
    /// # Errors
    ///
    /// Returns `VoucherNotFound` if the voucher is missing.
    pub async fn voucher_lines(&self, tenant_id: TenantId, voucher_id: VoucherId) -> Result<Vec<VoucherLine>, WorkflowError> {
        let mut tx = self.store.begin().await?;
        tx.find_voucher(tenant_id, voucher_id, RecordScope::All)
            .await?
            .ok_or(WorkflowError::VoucherNotFound(voucher_id))?;
        let lines = tx.voucher_lines(tenant_id, voucher_id).await?;
        tx.rollback().await?;
        Ok(lines)
    }

    /// Returns the audit log of a voucher, oldest first.
    ///
    /// # Errors
    ///
    /// Returns `VoucherNotFound` if the voucher is missing.
    pub async fn approvals(&self, tenant_id: TenantId, voucher_id: VoucherId) -> Result<Vec<VoucherApproval>, WorkflowError> {
        let mut tx = self.store.begin().await?;
        tx.find_voucher(tenant_id, voucher_id, RecordScope::All)
            .await?
            .ok_or(WorkflowError::VoucherNotFound(voucher_id))?;
        let approvals = tx.approvals(tenant_id, voucher_id).await?;
        tx.rollback().await?;
        Ok(approvals)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;
    use tally_core::ledger::{AccountType, VoucherType};
    use tally_core::tenant::Tenant;
    use tally_core::workflow::{Role, RolePermissions};

    use crate::store::MemoryStore;

    struct Fixture {
        store: Arc<MemoryStore>,
        workflow: VoucherWorkflow<MemoryStore>,
        tenant: Tenant,
        period: AccountingPeriod,
        cash: Account,
        revenue: Account,
        clerk: Actor,
        manager: Actor,
    }

    fn account(tenant_id: TenantId, number: &str, account_type: AccountType) -> Account {
        Account {
            id: AccountId::new(),
            tenant_id,
            number: number.into(),
            name: number.into(),
            account_type,
            currency: "USD".into(),
            is_active: true,
            allow_direct_posting: true,
            current_balance: Decimal::ZERO,
            balance_last_updated: None,
        }
    }

    fn fixture() -> Fixture {
        let store = Arc::new(MemoryStore::new());
        let tenant = Tenant::new("Acme", "Acme Corp");
        let period = AccountingPeriod::new(
            tenant.id,
            "Q1 2024",
            NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
            NaiveDate::from_ymd_opt(2024, 3, 31).unwrap(),
        );
        let cash = account(tenant.id, "1000", AccountType::Asset);
        let revenue = account(tenant.id, "4000", AccountType::Income);
        store.insert_tenant(tenant.clone());
        store.insert_period(period.clone());
        store.insert_account(cash.clone());
        store.insert_account(revenue.clone());

        let workflow = VoucherWorkflow::new(
            Arc::clone(&store),
            Arc::new(RolePermissions::default()),
            LedgerConfig::default(),
        );
        Fixture {
            store,
            workflow,
            tenant,
            period,
            cash,
            revenue,
            clerk: Actor::new(UserId::new(), Role::DataEntry),
            manager: Actor::new(UserId::new(), Role::AccountingManager),
        }
    }

    fn sale(f: &Fixture, amount: Decimal) -> NewVoucher {
        NewVoucher {
            voucher_type: VoucherType::General,
            date: NaiveDate::from_ymd_opt(2024, 2, 10).unwrap(),
            party_id: None,
            narration: "Cash sale".into(),
            reference: None,
            lines: vec![LineInput::debit(f.cash.id, amount), LineInput::credit(f.revenue.id, amount)],
        }
    }

    async fn posted(f: &Fixture) -> Voucher {
        let v = f.workflow.create(f.tenant.id, &f.clerk, sale(f, dec!(100))).await.unwrap();
        f.workflow.submit(f.tenant.id, &f.clerk, v.id).await.unwrap();
        f.workflow.approve(f.tenant.id, &f.manager, v.id, None).await.unwrap()
    }

    #[tokio::test]
    async fn test_approve_numbers_and_applies() {
        let f = fixture();
        let voucher = posted(&f).await;

        assert_eq!(voucher.status, VoucherStatus::Posted);
        assert_eq!(voucher.voucher_number.as_deref(), Some("ACME-GEN-2024Q1-0001"));
        assert!(voucher.balances_updated);
        assert_eq!(voucher.posted_by, Some(f.manager.user_id));
        assert_eq!(f.store.account(f.cash.id).unwrap().current_balance, dec!(100));
        assert_eq!(f.store.account(f.revenue.id).unwrap().current_balance, dec!(100));

        let log = f.workflow.approvals(f.tenant.id, voucher.id).await.unwrap();
        let actions: Vec<_> = log.iter().map(|a| a.action).collect();
        assert_eq!(actions, vec![ApprovalAction::Submitted, ApprovalAction::Approved]);
    }

    #[tokio::test]
    async fn test_submit_rejects_unbalanced() {
        let f = fixture();
        let mut input = sale(&f, dec!(100));
        input.lines[1].amount = dec!(90);
        let draft = f.workflow.create(f.tenant.id, &f.clerk, input).await.unwrap();

        let result = f.workflow.submit(f.tenant.id, &f.clerk, draft.id).await;
        assert!(matches!(
            result,
            Err(WorkflowError::Validation(ValidationError::Unbalanced { .. }))
        ));
        assert_eq!(f.store.voucher(draft.id).unwrap().status, VoucherStatus::Draft);
    }

    #[tokio::test]
    async fn test_create_rejects_unstorable_amounts() {
        let f = fixture();
        let mut input = sale(&f, Decimal::MAX);
        input.lines.insert(0, LineInput::debit(f.cash.id, Decimal::MAX));

        let result = f.workflow.create(f.tenant.id, &f.clerk, input).await;
        assert!(matches!(
            result,
            Err(WorkflowError::Validation(ValidationError::AmountOutOfRange { line: 1, .. }))
        ));

        let result = f.workflow.create(f.tenant.id, &f.clerk, sale(&f, dec!(0.00001))).await;
        assert!(matches!(
            result,
            Err(WorkflowError::Validation(ValidationError::AmountScale { .. }))
        ));
    }

    #[tokio::test]
    async fn test_permission_denied_for_clerk_approval() {
        let f = fixture();
        let draft = f.workflow.create(f.tenant.id, &f.clerk, sale(&f, dec!(10))).await.unwrap();
        f.workflow.submit(f.tenant.id, &f.clerk, draft.id).await.unwrap();

        let result = f.workflow.approve(f.tenant.id, &f.clerk, draft.id, None).await;
        assert!(matches!(result, Err(WorkflowError::PermissionDenied { .. })));
    }

    #[tokio::test]
    async fn test_locked_period_blocks_approval() {
        let f = fixture();
        let draft = f.workflow.create(f.tenant.id, &f.clerk, sale(&f, dec!(10))).await.unwrap();
        f.workflow.submit(f.tenant.id, &f.clerk, draft.id).await.unwrap();
        f.store.set_period_locked(f.period.id, true);

        let result = f.workflow.approve(f.tenant.id, &f.manager, draft.id, None).await;
        assert!(matches!(result, Err(WorkflowError::PeriodLocked(id)) if id == f.period.id));
        assert!(f.store.voucher(draft.id).unwrap().voucher_number.is_none());
    }

    #[tokio::test]
    async fn test_reject_then_edit_and_reapprove() {
        let f = fixture();
        let draft = f.workflow.create(f.tenant.id, &f.clerk, sale(&f, dec!(10))).await.unwrap();
        f.workflow.submit(f.tenant.id, &f.clerk, draft.id).await.unwrap();

        let blank = f.workflow.reject(f.tenant.id, &f.manager, draft.id, "  ".into()).await;
        assert!(matches!(
            blank,
            Err(WorkflowError::Validation(ValidationError::CommentRequired))
        ));

        f.workflow
            .reject(f.tenant.id, &f.manager, draft.id, "Wrong amount".into())
            .await
            .unwrap();

        let unbalanced = VoucherUpdate {
            lines: Some(vec![LineInput::debit(f.cash.id, dec!(12)), LineInput::credit(f.revenue.id, dec!(10))]),
            ..VoucherUpdate::default()
        };
        assert!(f.workflow.edit(f.tenant.id, &f.clerk, draft.id, unbalanced).await.is_err());

        let fixed = VoucherUpdate {
            lines: Some(vec![LineInput::debit(f.cash.id, dec!(12)), LineInput::credit(f.revenue.id, dec!(12))]),
            ..VoucherUpdate::default()
        };
        f.workflow.edit(f.tenant.id, &f.clerk, draft.id, fixed).await.unwrap();

        let voucher = f.workflow.approve(f.tenant.id, &f.manager, draft.id, None).await.unwrap();
        assert_eq!(voucher.status, VoucherStatus::Posted);
        assert_eq!(f.store.account(f.cash.id).unwrap().current_balance, dec!(12));
    }

    #[tokio::test]
    async fn test_cancel_reverses_balances() {
        let f = fixture();
        let voucher = posted(&f).await;

        let cancelled = f
            .workflow
            .cancel(f.tenant.id, &f.manager, voucher.id, Some("Duplicate".into()))
            .await
            .unwrap();
        assert_eq!(cancelled.status, VoucherStatus::Cancelled);
        assert!(!cancelled.balances_updated);
        assert_eq!(f.store.account(f.cash.id).unwrap().current_balance, Decimal::ZERO);
        assert_eq!(f.store.account(f.revenue.id).unwrap().current_balance, Decimal::ZERO);
    }

    #[tokio::test]
    async fn test_failed_reversal_keeps_voucher_posted() {
        let f = fixture();
        let voucher = posted(&f).await;
        f.store.fail_balance_writes(1);

        let result = f.workflow.delete(f.tenant.id, &f.manager, voucher.id).await;
        assert!(matches!(result, Err(WorkflowError::BalanceSync(_))));

        let stored = f.store.voucher(voucher.id).unwrap();
        assert_eq!(stored.status, VoucherStatus::Posted);
        assert!(stored.deleted_at.is_none());
        assert!(stored.balances_updated);
        assert_eq!(f.store.account(f.cash.id).unwrap().current_balance, dec!(100));
    }

    #[tokio::test]
    async fn test_reversing_voucher_posted_immediately() {
        let f = fixture();
        let original = posted(&f).await;

        let reversal = f
            .workflow
            .create_reversing_voucher(
                f.tenant.id,
                &f.manager,
                original.id,
                ReversalRequest {
                    post_immediately: true,
                    ..ReversalRequest::default()
                },
            )
            .await
            .unwrap();

        assert_eq!(reversal.status, VoucherStatus::Posted);
        assert_eq!(reversal.is_reversal_for, Some(original.id));
        assert_eq!(reversal.voucher_number.as_deref(), Some("ACME-GEN-2024Q1-0002"));
        assert_eq!(reversal.reference.as_deref(), Some("REV-ACME-GEN-2024Q1-0001"));
        assert_eq!(f.store.account(f.cash.id).unwrap().current_balance, Decimal::ZERO);

        let original = f.store.voucher(original.id).unwrap();
        assert!(original.is_reversed);
        assert_eq!(original.reversed_by_voucher, Some(reversal.id));
        assert_eq!(original.status, VoucherStatus::Posted);

        let again = f
            .workflow
            .create_reversing_voucher(f.tenant.id, &f.manager, original.id, ReversalRequest::default())
            .await;
        assert!(matches!(again, Err(WorkflowError::AlreadyReversed(_))));
    }

    #[tokio::test]
    async fn test_comment_requires_text() {
        let f = fixture();
        let draft = f.workflow.create(f.tenant.id, &f.clerk, sale(&f, dec!(10))).await.unwrap();

        let blank = f.workflow.add_comment(f.tenant.id, &f.clerk, draft.id, String::new()).await;
        assert!(matches!(
            blank,
            Err(WorkflowError::Validation(ValidationError::CommentRequired))
        ));

        let entry = f
            .workflow
            .add_comment(f.tenant.id, &f.clerk, draft.id, "Check the invoice".into())
            .await
            .unwrap();
        assert_eq!(entry.action, ApprovalAction::Commented);
        assert_eq!(entry.from_status, VoucherStatus::Draft);
    }

    #[tokio::test]
    async fn test_events_follow_commit() {
        let f = fixture();
        let mut events = f.workflow.subscribe();
        let voucher = posted(&f).await;

        assert!(matches!(events.recv().await.unwrap(), LedgerEvent::VoucherCreated { .. }));
        assert!(matches!(events.recv().await.unwrap(), LedgerEvent::VoucherSubmitted { .. }));
        match events.recv().await.unwrap() {
            LedgerEvent::VoucherPosted {
                voucher_id,
                balances_applied,
                ..
            } => {
                assert_eq!(voucher_id, voucher.id);
                assert!(balances_applied);
            }
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_create_outside_any_period() {
        let f = fixture();
        let mut input = sale(&f, dec!(10));
        input.date = NaiveDate::from_ymd_opt(2025, 6, 1).unwrap();

        let result = f.workflow.create(f.tenant.id, &f.clerk, input).await;
        assert!(matches!(
            result,
            Err(WorkflowError::Validation(ValidationError::NoPeriodForDate(_)))
        ));
    }
}
