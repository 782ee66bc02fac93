//! Traits for storage abstraction and extensibility

use async_trait::async_trait;
use bigdecimal::BigDecimal;
use chrono::NaiveDate;
use std::collections::HashMap;

use crate::types::*;

/// A single write applied as part of a [`WriteBatch`]
#[derive(Debug, Clone, PartialEq)]
pub enum WriteOp {
    SaveAccount(Account),
    /// Removes the account together with its transactions and checkpoints
    DeleteAccount(String),
    UpsertTransaction(Transaction),
    DeleteTransaction(String),
    UpsertCheckpoint(BalanceCheckpoint),
    DeleteCheckpoint(String),
    UpdateAccountBalance {
        account_id: String,
        balance: BigDecimal,
        balance_date: NaiveDate,
    },
}

/// Ordered set of writes committed all-or-nothing
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WriteBatch {
    ops: Vec<WriteOp>,
}

impl WriteBatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, op: WriteOp) {
        self.ops.push(op);
    }

    pub fn upsert_transaction(&mut self, transaction: Transaction) {
        self.push(WriteOp::UpsertTransaction(transaction));
    }

    pub fn delete_transaction(&mut self, transaction_id: &str) {
        self.push(WriteOp::DeleteTransaction(transaction_id.to_string()));
    }

    pub fn upsert_checkpoint(&mut self, checkpoint: BalanceCheckpoint) {
        self.push(WriteOp::UpsertCheckpoint(checkpoint));
    }

    pub fn delete_checkpoint(&mut self, checkpoint_id: &str) {
        self.push(WriteOp::DeleteCheckpoint(checkpoint_id.to_string()));
    }

    pub fn ops(&self) -> &[WriteOp] {
        &self.ops
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }
}

impl IntoIterator for WriteBatch {
    type Item = WriteOp;
    type IntoIter = std::vec::IntoIter<WriteOp>;

    fn into_iter(self) -> Self::IntoIter {
        self.ops.into_iter()
    }
}

/// Storage abstraction for the ledger system
///
/// Reads are individual queries; every mutation goes through [`commit`],
/// which must apply the whole batch or none of it. Implementations provide
/// no isolation between separate calls.
///
/// [`commit`]: LedgerStorage::commit
#[async_trait]
pub trait LedgerStorage: Send + Sync {
    /// Get an account by ID
    async fn get_account(&self, account_id: &str) -> LedgerResult<Option<Account>>;

    /// Get a transaction by ID
    async fn get_transaction(&self, transaction_id: &str) -> LedgerResult<Option<Transaction>>;

    /// Stored transactions among `ids`, keyed by id, whatever their account
    async fn get_transactions_by_ids(
        &self,
        ids: &[String],
    ) -> LedgerResult<HashMap<String, Transaction>>;

    /// Transactions with `after < date <= through`, ascending by date.
    /// `after = None` means from the beginning of history.
    async fn get_transactions_in_range(
        &self,
        account_id: &str,
        after: Option<NaiveDate>,
        through: NaiveDate,
    ) -> LedgerResult<Vec<Transaction>>;

    /// Get a checkpoint by ID
    async fn get_checkpoint(&self, checkpoint_id: &str) -> LedgerResult<Option<BalanceCheckpoint>>;

    /// Latest checkpoint with `checkpoint.date <= date`
    async fn get_checkpoint_at_or_before(
        &self,
        account_id: &str,
        date: NaiveDate,
    ) -> LedgerResult<Option<BalanceCheckpoint>>;

    /// Latest checkpoint with `checkpoint.date < date`
    async fn get_checkpoint_before(
        &self,
        account_id: &str,
        date: NaiveDate,
    ) -> LedgerResult<Option<BalanceCheckpoint>>;

    /// All checkpoints with `checkpoint.date >= date`, ascending
    async fn get_checkpoints_from(
        &self,
        account_id: &str,
        date: NaiveDate,
    ) -> LedgerResult<Vec<BalanceCheckpoint>>;

    /// Most recent checkpoints first, at most `limit` when given
    async fn list_checkpoints(
        &self,
        account_id: &str,
        limit: Option<usize>,
    ) -> LedgerResult<Vec<BalanceCheckpoint>>;

    /// Apply every write in the batch atomically
    async fn commit(&mut self, batch: WriteBatch) -> LedgerResult<()>;
}

/// Trait for implementing custom account validation rules
pub trait AccountValidator: Send + Sync {
    /// Validate an account before saving
    fn validate_account(&self, account: &Account) -> LedgerResult<()>;
}

/// Trait for implementing custom transaction validation rules
pub trait TransactionValidator: Send + Sync {
    /// Validate a manually entered or updated transaction before saving
    fn validate_transaction(&self, transaction: &Transaction) -> LedgerResult<()>;
}

/// Default account validator with basic rules
pub struct DefaultAccountValidator;

impl AccountValidator for DefaultAccountValidator {
    fn validate_account(&self, account: &Account) -> LedgerResult<()> {
        if account.id.trim().is_empty() {
            return Err(LedgerError::Validation(
                "Account ID cannot be empty".to_string(),
            ));
        }

        if account.name.trim().is_empty() {
            return Err(LedgerError::Validation(
                "Account name cannot be empty".to_string(),
            ));
        }

        Ok(())
    }
}

/// Default transaction validator
pub struct DefaultTransactionValidator;

impl TransactionValidator for DefaultTransactionValidator {
    fn validate_transaction(&self, transaction: &Transaction) -> LedgerResult<()> {
        if transaction.account_id.trim().is_empty() {
            return Err(LedgerError::InvalidTransaction(
                "Transaction must reference an account".to_string(),
            ));
        }

        // Adjustments are owned by the reconciliation engine
        if transaction.transaction_type == TransactionType::Reconciliation {
            return Err(LedgerError::InvalidTransaction(
                "Reconciliation transactions cannot be entered manually".to_string(),
            ));
        }

        Ok(())
    }
}
