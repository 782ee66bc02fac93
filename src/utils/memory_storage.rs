//! In-memory storage implementation for testing

use async_trait::async_trait;
use chrono::NaiveDate;
use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::traits::*;
use crate::types::*;

#[derive(Debug, Default)]
struct Tables {
    accounts: HashMap<String, Account>,
    transactions: HashMap<String, Transaction>,
    checkpoints: HashMap<String, BalanceCheckpoint>,
    /// Per-account index records: (date, id) ordered
    transaction_index: HashMap<String, BTreeSet<(NaiveDate, String)>>,
    checkpoint_index: HashMap<String, BTreeSet<(NaiveDate, String)>>,
}

impl Tables {
    fn insert_transaction(&mut self, transaction: Transaction) {
        self.remove_transaction(&transaction.id);
        self.transaction_index
            .entry(transaction.account_id.clone())
            .or_default()
            .insert((transaction.date, transaction.id.clone()));
        self.transactions
            .insert(transaction.id.clone(), transaction);
    }

    fn remove_transaction(&mut self, transaction_id: &str) -> bool {
        match self.transactions.remove(transaction_id) {
            Some(old) => {
                if let Some(index) = self.transaction_index.get_mut(&old.account_id) {
                    index.remove(&(old.date, old.id));
                }
                true
            }
            None => false,
        }
    }

    fn insert_checkpoint(&mut self, checkpoint: BalanceCheckpoint) {
        self.remove_checkpoint(&checkpoint.id);
        self.checkpoint_index
            .entry(checkpoint.account_id.clone())
            .or_default()
            .insert((checkpoint.date, checkpoint.id.clone()));
        let mut stored = checkpoint;
        stored.validation = None;
        self.checkpoints.insert(stored.id.clone(), stored);
    }

    fn remove_checkpoint(&mut self, checkpoint_id: &str) -> bool {
        match self.checkpoints.remove(checkpoint_id) {
            Some(old) => {
                if let Some(index) = self.checkpoint_index.get_mut(&old.account_id) {
                    index.remove(&(old.date, old.id));
                }
                true
            }
            None => false,
        }
    }

    fn remove_account(&mut self, account_id: &str) {
        self.accounts.remove(account_id);
        for (_, id) in self.transaction_index.remove(account_id).unwrap_or_default() {
            self.transactions.remove(&id);
        }
        for (_, id) in self.checkpoint_index.remove(account_id).unwrap_or_default() {
            self.checkpoints.remove(&id);
        }
    }

    fn checkpoints_of(&self, account_id: &str) -> impl Iterator<Item = &BalanceCheckpoint> {
        self.checkpoint_index
            .get(account_id)
            .into_iter()
            .flat_map(|index| index.iter())
            .filter_map(|(_, id)| self.checkpoints.get(id))
    }

    /// Reject ops that would fail half-way through a commit
    fn check(&self, op: &WriteOp, pending_accounts: &HashSet<String>) -> LedgerResult<()> {
        match op {
            WriteOp::UpdateAccountBalance { account_id, .. } => {
                if self.accounts.contains_key(account_id) || pending_accounts.contains(account_id)
                {
                    Ok(())
                } else {
                    Err(LedgerError::AccountNotFound(account_id.clone()))
                }
            }
            WriteOp::UpsertTransaction(transaction) if transaction.id.trim().is_empty() => Err(
                LedgerError::Storage("cannot store a transaction without an id".to_string()),
            ),
            _ => Ok(()),
        }
    }

    fn apply(&mut self, op: WriteOp) {
        match op {
            WriteOp::SaveAccount(account) => {
                self.accounts.insert(account.id.clone(), account);
            }
            WriteOp::DeleteAccount(account_id) => self.remove_account(&account_id),
            WriteOp::UpsertTransaction(transaction) => self.insert_transaction(transaction),
            WriteOp::DeleteTransaction(transaction_id) => {
                self.remove_transaction(&transaction_id);
            }
            WriteOp::UpsertCheckpoint(checkpoint) => self.insert_checkpoint(checkpoint),
            WriteOp::DeleteCheckpoint(checkpoint_id) => {
                self.remove_checkpoint(&checkpoint_id);
            }
            WriteOp::UpdateAccountBalance {
                account_id,
                balance,
                balance_date,
            } => {
                if let Some(account) = self.accounts.get_mut(&account_id) {
                    account.balance = balance;
                    account.balance_date = Some(balance_date);
                    account.updated_at = chrono::Utc::now().naive_utc();
                }
            }
        }
    }
}

/// In-memory storage implementation for testing and development
#[derive(Debug, Clone)]
pub struct MemoryStorage {
    tables: Arc<RwLock<Tables>>,
    /// Remaining successful commits before failures are injected
    commit_budget: Arc<RwLock<Option<usize>>>,
}

impl MemoryStorage {
    /// Create a new memory storage instance
    pub fn new() -> Self {
        Self {
            tables: Arc::new(RwLock::new(Tables::default())),
            commit_budget: Arc::new(RwLock::new(None)),
        }
    }

    /// Clear all data (useful for testing)
    pub fn clear(&self) -> LedgerResult<()> {
        *self.write()? = Tables::default();
        Ok(())
    }

    /// Let `n` more commits succeed, then fail every later commit
    pub fn fail_commits_after(&self, n: usize) -> LedgerResult<()> {
        *self.budget()? = Some(n);
        Ok(())
    }

    /// Stop injecting commit failures
    pub fn heal(&self) -> LedgerResult<()> {
        *self.budget()? = None;
        Ok(())
    }

    /// Number of stored transactions across all accounts
    pub fn transaction_count(&self) -> LedgerResult<usize> {
        Ok(self.read()?.transactions.len())
    }

    /// All transactions of an account, ascending by date
    pub fn account_transactions(&self, account_id: &str) -> LedgerResult<Vec<Transaction>> {
        let tables = self.read()?;
        Ok(tables
            .transaction_index
            .get(account_id)
            .into_iter()
            .flat_map(|index| index.iter())
            .filter_map(|(_, id)| tables.transactions.get(id).cloned())
            .collect())
    }

    fn read(&self) -> LedgerResult<RwLockReadGuard<'_, Tables>> {
        self.tables
            .read()
            .map_err(|_| LedgerError::Storage("storage lock poisoned".to_string()))
    }

    fn write(&self) -> LedgerResult<RwLockWriteGuard<'_, Tables>> {
        self.tables
            .write()
            .map_err(|_| LedgerError::Storage("storage lock poisoned".to_string()))
    }

    fn budget(&self) -> LedgerResult<RwLockWriteGuard<'_, Option<usize>>> {
        self.commit_budget
            .write()
            .map_err(|_| LedgerError::Storage("storage lock poisoned".to_string()))
    }
}

impl Default for MemoryStorage {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LedgerStorage for MemoryStorage {
    async fn get_account(&self, account_id: &str) -> LedgerResult<Option<Account>> {
        Ok(self.read()?.accounts.get(account_id).cloned())
    }

    async fn get_transaction(&self, transaction_id: &str) -> LedgerResult<Option<Transaction>> {
        Ok(self.read()?.transactions.get(transaction_id).cloned())
    }

    async fn get_transactions_by_ids(
        &self,
        ids: &[String],
    ) -> LedgerResult<HashMap<String, Transaction>> {
        let tables = self.read()?;
        Ok(ids
            .iter()
            .filter_map(|id| {
                tables
                    .transactions
                    .get(id.as_str())
                    .map(|txn| (id.clone(), txn.clone()))
            })
            .collect())
    }

    async fn get_transactions_in_range(
        &self,
        account_id: &str,
        after: Option<NaiveDate>,
        through: NaiveDate,
    ) -> LedgerResult<Vec<Transaction>> {
        let tables = self.read()?;
        let filtered: Vec<Transaction> = tables
            .transaction_index
            .get(account_id)
            .into_iter()
            .flat_map(|index| index.iter())
            .filter(|(date, _)| {
                // Check date range
                if let Some(start) = after {
                    if *date <= start {
                        return false;
                    }
                }
                *date <= through
            })
            .filter_map(|(_, id)| tables.transactions.get(id).cloned())
            .collect();
        Ok(filtered)
    }

    async fn get_checkpoint(&self, checkpoint_id: &str) -> LedgerResult<Option<BalanceCheckpoint>> {
        Ok(self.read()?.checkpoints.get(checkpoint_id).cloned())
    }

    async fn get_checkpoint_at_or_before(
        &self,
        account_id: &str,
        date: NaiveDate,
    ) -> LedgerResult<Option<BalanceCheckpoint>> {
        let tables = self.read()?;
        Ok(tables
            .checkpoints_of(account_id)
            .filter(|checkpoint| checkpoint.date <= date)
            .last()
            .cloned())
    }

    async fn get_checkpoint_before(
        &self,
        account_id: &str,
        date: NaiveDate,
    ) -> LedgerResult<Option<BalanceCheckpoint>> {
        let tables = self.read()?;
        Ok(tables
            .checkpoints_of(account_id)
            .filter(|checkpoint| checkpoint.date < date)
            .last()
            .cloned())
    }

    async fn get_checkpoints_from(
        &self,
        account_id: &str,
        date: NaiveDate,
    ) -> LedgerResult<Vec<BalanceCheckpoint>> {
        let tables = self.read()?;
        Ok(tables
            .checkpoints_of(account_id)
            .filter(|checkpoint| checkpoint.date >= date)
            .cloned()
            .collect())
    }

    async fn list_checkpoints(
        &self,
        account_id: &str,
        limit: Option<usize>,
    ) -> LedgerResult<Vec<BalanceCheckpoint>> {
        let tables = self.read()?;
        let mut checkpoints: Vec<BalanceCheckpoint> =
            tables.checkpoints_of(account_id).cloned().collect();
        checkpoints.reverse();
        if let Some(limit) = limit {
            checkpoints.truncate(limit);
        }
        Ok(checkpoints)
    }

    async fn commit(&mut self, batch: WriteBatch) -> LedgerResult<()> {
        {
            let mut budget = self.budget()?;
            match *budget {
                Some(0) => {
                    return Err(LedgerError::Storage("injected commit failure".to_string()));
                }
                Some(ref mut remaining) => *remaining -= 1,
                None => {}
            }
        }

        let mut tables = self.write()?;

        let pending_accounts: HashSet<String> = batch
            .ops()
            .iter()
            .filter_map(|op| match op {
                WriteOp::SaveAccount(account) => Some(account.id.clone()),
                _ => None,
            })
            .collect();
        for op in batch.ops() {
            tables.check(op, &pending_accounts)?;
        }

        for op in batch {
            tables.apply(op);
        }
        Ok(())
    }
}
