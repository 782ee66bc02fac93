//! Checkpoint reconciliation, refresh, audit and deletion

use bigdecimal::BigDecimal;
use chrono::NaiveDate;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::EngineConfig;
use crate::traits::*;
use crate::types::*;
use crate::utils::amount::{is_negligible, round2};

/// Keeps each account's checkpoint chain consistent with its transactions
pub struct ReconciliationEngine<S: LedgerStorage> {
    storage: S,
    config: EngineConfig,
}

impl<S: LedgerStorage> ReconciliationEngine<S> {
    pub fn new(storage: S) -> Self {
        Self::with_config(storage, EngineConfig::default())
    }

    pub fn with_config(storage: S, config: EngineConfig) -> Self {
        Self { storage, config }
    }

    /// Assert that `account_id` held `target_balance` at the end of `date`.
    ///
    /// Posts, updates or removes the Reconciliation transaction at `date` so
    /// that history explains the target, then upserts the checkpoint. All
    /// writes land in one commit.
    pub async fn reconcile(
        &mut self,
        account_id: &str,
        date: NaiveDate,
        target_balance: BigDecimal,
        checkpoint_type: CheckpointType,
    ) -> LedgerResult<BalanceCheckpoint> {
        let account = self
            .storage
            .get_account(account_id)
            .await?
            .ok_or_else(|| LedgerError::AccountNotFound(account_id.to_string()))?;

        let found = self
            .storage
            .get_checkpoint_at_or_before(account_id, date)
            .await?;
        let (existing, anchor) = match found {
            Some(checkpoint) if checkpoint.date == date => {
                let anchor = self.storage.get_checkpoint_before(account_id, date).await?;
                (Some(checkpoint), anchor)
            }
            other => (None, other),
        };
        let (anchor_date, anchor_balance) = match anchor {
            Some(cp) => (Some(cp.date), cp.balance),
            None => (None, BigDecimal::from(0)),
        };

        let history = self
            .storage
            .get_transactions_in_range(account_id, anchor_date, date)
            .await?;
        let (stale, genuine): (Vec<Transaction>, Vec<Transaction>) =
            history.into_iter().partition(|t| t.is_adjustment_on(date));

        let sum: BigDecimal = genuine.iter().map(|t| &t.amount).sum();
        let expected = anchor_balance + sum;
        let adjustment = round2(&(&target_balance - &expected));

        let mut batch = WriteBatch::new();
        let mut stale = stale.into_iter();

        if is_negligible(&adjustment) {
            for txn in stale.by_ref() {
                debug!(account_id, transaction_id = %txn.id, %date, "Removing adjustment");
                batch.delete_transaction(&txn.id);
            }
        } else {
            let now = chrono::Utc::now().naive_utc();
            let txn = match stale.next() {
                Some(mut previous) => {
                    previous.amount = adjustment.clone();
                    previous.description = self.config.updated_description(&previous.description);
                    previous.updated_at = now;
                    debug!(
                        account_id,
                        transaction_id = %previous.id,
                        %adjustment,
                        "Updating adjustment"
                    );
                    previous
                }
                None => {
                    let mut created = Transaction::new(
                        Uuid::new_v4().to_string(),
                        account_id.to_string(),
                        date,
                        adjustment.clone(),
                        self.config.reconciliation_description.clone(),
                        TransactionType::Reconciliation,
                    );
                    created.user_id = account.user_id.clone();
                    created.currency = account.currency.clone();
                    debug!(
                        account_id,
                        transaction_id = %created.id,
                        %adjustment,
                        "Creating adjustment"
                    );
                    created
                }
            };
            batch.upsert_transaction(txn);
            for duplicate in stale {
                warn!(
                    account_id,
                    transaction_id = %duplicate.id,
                    %date,
                    "Removing duplicate reconciliation transaction"
                );
                batch.delete_transaction(&duplicate.id);
            }
        }

        let checkpoint = match existing {
            Some(mut checkpoint) => {
                checkpoint.balance = target_balance.clone();
                checkpoint.checkpoint_type = checkpoint_type;
                checkpoint.validation = None;
                checkpoint
            }
            None => BalanceCheckpoint::new(
                Uuid::new_v4().to_string(),
                account_id.to_string(),
                date,
                target_balance.clone(),
                checkpoint_type,
            ),
        };
        batch.upsert_checkpoint(checkpoint.clone());

        if account.balance_date.map_or(true, |current| date >= current) {
            batch.push(WriteOp::UpdateAccountBalance {
                account_id: account_id.to_string(),
                balance: target_balance,
                balance_date: date,
            });
        }

        self.storage.commit(batch).await?;

        info!(
            account_id,
            %date,
            %expected,
            %adjustment,
            checkpoint_id = %checkpoint.id,
            "Reconciled checkpoint"
        );

        Ok(checkpoint)
    }

    /// Re-reconcile every checkpoint dated on or after `min_date`, in date
    /// order, at its recorded balance.
    ///
    /// Stops at the first failure; the error names the checkpoints already
    /// refreshed and the one that failed.
    pub async fn refresh_checkpoints(
        &mut self,
        account_id: &str,
        min_date: NaiveDate,
    ) -> LedgerResult<Vec<BalanceCheckpoint>> {
        let checkpoints = self
            .storage
            .get_checkpoints_from(account_id, min_date)
            .await?;
        if checkpoints.is_empty() {
            debug!(account_id, %min_date, "No checkpoints to refresh");
            return Ok(Vec::new());
        }

        debug!(account_id, %min_date, count = checkpoints.len(), "Refreshing checkpoints");
        let mut refreshed = Vec::with_capacity(checkpoints.len());
        for checkpoint in checkpoints {
            match self
                .reconcile(
                    account_id,
                    checkpoint.date,
                    checkpoint.balance.clone(),
                    checkpoint.checkpoint_type,
                )
                .await
            {
                Ok(updated) => refreshed.push(updated),
                Err(source) => {
                    let completed: Vec<String> =
                        refreshed.iter().map(|cp: &BalanceCheckpoint| cp.id.clone()).collect();
                    warn!(
                        account_id,
                        failed = %checkpoint.id,
                        completed = completed.len(),
                        error = %source,
                        "Checkpoint refresh aborted"
                    );
                    return Err(LedgerError::RefreshAborted {
                        completed,
                        failed: checkpoint.id,
                        source: Box::new(source),
                    });
                }
            }
        }

        info!(account_id, %min_date, refreshed = refreshed.len(), "Refreshed checkpoints");
        Ok(refreshed)
    }

    /// Audit `checkpoints` against transaction history without writing.
    ///
    /// Each checkpoint is checked against the one before it, taking the
    /// earlier checkpoint's asserted balance as the starting point, so a
    /// bad checkpoint does not taint the ones after it. Results keep the
    /// input order.
    pub async fn validate_checkpoints(
        &self,
        account_id: &str,
        checkpoints: Vec<BalanceCheckpoint>,
    ) -> LedgerResult<Vec<BalanceCheckpoint>> {
        let (Some(earliest), Some(latest)) = (
            checkpoints.iter().map(|cp| cp.date).min(),
            checkpoints.iter().map(|cp| cp.date).max(),
        ) else {
            return Ok(checkpoints);
        };

        let anchor = self
            .storage
            .get_checkpoint_before(account_id, earliest)
            .await?;
        let (mut last_date, mut running) = match anchor {
            Some(cp) => (Some(cp.date), cp.balance),
            None => (None, BigDecimal::from(0)),
        };

        let history = self
            .storage
            .get_transactions_in_range(account_id, last_date, latest)
            .await?;

        let mut order: Vec<usize> = (0..checkpoints.len()).collect();
        order.sort_by_key(|&i| checkpoints[i].date);

        let mut results = checkpoints;
        let mut cursor = 0;
        for i in order {
            let date = results[i].date;
            // Checkpoints sharing a date share one interval
            if last_date != Some(date) {
                while cursor < history.len() && history[cursor].date <= date {
                    running += &history[cursor].amount;
                    cursor += 1;
                }
            }

            let checkpoint = &mut results[i];
            let difference = round2(&(&running - &checkpoint.balance));
            checkpoint.validation = Some(CheckpointValidation {
                is_valid: is_negligible(&difference),
                difference,
            });
            running = checkpoint.balance.clone();
            last_date = Some(date);
        }

        Ok(results)
    }

    /// The `limit` most recent checkpoints, newest first, with validation
    pub async fn get_validated_checkpoints(
        &self,
        account_id: &str,
        limit: usize,
    ) -> LedgerResult<Vec<BalanceCheckpoint>> {
        let checkpoints = self
            .storage
            .list_checkpoints(account_id, Some(limit))
            .await?;
        self.validate_checkpoints(account_id, checkpoints).await
    }

    /// Delete a checkpoint together with the adjustment posted at its date
    pub async fn delete_checkpoint(
        &mut self,
        account_id: &str,
        checkpoint_id: &str,
    ) -> LedgerResult<()> {
        let checkpoint = self
            .storage
            .get_checkpoint(checkpoint_id)
            .await?
            .filter(|cp| cp.account_id == account_id)
            .ok_or_else(|| LedgerError::CheckpointNotFound(checkpoint_id.to_string()))?;

        let after = checkpoint.date.pred_opt();
        let mut batch = WriteBatch::new();
        batch.delete_checkpoint(&checkpoint.id);
        for txn in self
            .storage
            .get_transactions_in_range(account_id, after, checkpoint.date)
            .await?
            .into_iter()
            .filter(|t| t.is_adjustment_on(checkpoint.date))
        {
            batch.delete_transaction(&txn.id);
        }

        self.storage.commit(batch).await?;
        info!(account_id, checkpoint_id, date = %checkpoint.date, "Deleted checkpoint");
        Ok(())
    }
}
