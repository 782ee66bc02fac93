//! Batch import of parsed transactions with duplicate detection

use chrono::NaiveDate;
use std::collections::HashSet;
use tracing::info;
use uuid::Uuid;

use crate::config::EngineConfig;
use crate::traits::*;
use crate::types::*;

/// Options for a single batch import
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImportOptions {
    /// Drop transactions whose id repeats in the batch or already exists
    pub skip_duplicates: bool,
}

impl Default for ImportOptions {
    fn default() -> Self {
        Self {
            skip_duplicates: true,
        }
    }
}

impl From<&EngineConfig> for ImportOptions {
    fn from(config: &EngineConfig) -> Self {
        Self {
            skip_duplicates: config.skip_duplicates,
        }
    }
}

/// Writes batches of transactions for one account in a single commit
pub struct BatchImporter<S: LedgerStorage> {
    storage: S,
}

impl<S: LedgerStorage> BatchImporter<S> {
    pub fn new(storage: S) -> Self {
        Self { storage }
    }

    /// Import `transactions` into `account_id`.
    ///
    /// Transactions without an id get a random one and are always new. An id
    /// already stored under another account rejects the whole batch, as does
    /// a Reconciliation transaction. `min_date` of the summary is the
    /// earliest date actually written (or overwritten) and is `None` when
    /// nothing was imported.
    pub async fn import_batch(
        &mut self,
        account_id: &str,
        transactions: Vec<Transaction>,
        options: ImportOptions,
    ) -> LedgerResult<ImportSummary> {
        if self.storage.get_account(account_id).await?.is_none() {
            return Err(LedgerError::AccountNotFound(account_id.to_string()));
        }

        let mut duplicate_count = 0;
        let mut candidates = Vec::with_capacity(transactions.len());
        let mut seen = HashSet::new();

        for mut txn in transactions {
            if txn.transaction_type == TransactionType::Reconciliation {
                return Err(LedgerError::InvalidTransaction(format!(
                    "Reconciliation transaction '{}' cannot be imported",
                    txn.id
                )));
            }
            txn.account_id = account_id.to_string();
            if !txn.has_id() {
                txn.id = Uuid::new_v4().to_string();
                candidates.push((txn, false));
                continue;
            }
            if options.skip_duplicates && !seen.insert(txn.id.clone()) {
                duplicate_count += 1;
                continue;
            }
            candidates.push((txn, true));
        }

        let ids: Vec<String> = candidates
            .iter()
            .filter(|(_, supplied)| *supplied)
            .map(|(txn, _)| txn.id.clone())
            .collect();
        let stored = self.storage.get_transactions_by_ids(&ids).await?;
        for previous in stored.values() {
            if previous.account_id != account_id {
                return Err(LedgerError::Validation(format!(
                    "Transaction id '{}' already belongs to account '{}'",
                    previous.id, previous.account_id
                )));
            }
            if !options.skip_duplicates
                && previous.transaction_type == TransactionType::Reconciliation
            {
                return Err(LedgerError::InvalidTransaction(format!(
                    "Transaction '{}' is a reconciliation adjustment",
                    previous.id
                )));
            }
        }

        let mut batch = WriteBatch::new();
        let mut written = HashSet::new();
        let mut min_date: Option<NaiveDate> = None;
        for (txn, supplied) in candidates {
            let previous = if supplied { stored.get(&txn.id) } else { None };
            if options.skip_duplicates && previous.is_some() {
                duplicate_count += 1;
                continue;
            }
            // An overwrite disturbs history at the old date too
            for date in std::iter::once(txn.date).chain(previous.map(|p| p.date)) {
                min_date = Some(min_date.map_or(date, |current| current.min(date)));
            }
            written.insert(txn.id.clone());
            batch.upsert_transaction(txn);
        }
        let imported_count = written.len();

        if !batch.is_empty() {
            self.storage.commit(batch).await?;
        }

        info!(
            account_id,
            imported = imported_count,
            duplicates = duplicate_count,
            "Imported transaction batch"
        );

        Ok(ImportSummary {
            imported_count,
            duplicate_count,
            min_date,
        })
    }
}
