//! Main ledger orchestrator that coordinates import, entry and reconciliation

use bigdecimal::BigDecimal;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::config::EngineConfig;
use crate::import::{BatchImporter, ImportOptions, RulesetKey, RulesetRegistry, StatementParser};
use crate::ledger::{AccountManager, TransactionManager};
use crate::reconciliation::ReconciliationEngine;
use crate::traits::*;
use crate::types::*;

/// Outcome of parsing a statement and importing its transactions
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatementImport {
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub skipped_rows: usize,
    pub summary: ImportSummary,
}

/// Main ledger system that orchestrates all operations on accounts
///
/// Every write that changes past history refreshes the checkpoints from
/// the earliest affected date, so stored adjustments keep explaining each
/// asserted balance.
pub struct Ledger<S: LedgerStorage> {
    account_manager: AccountManager<S>,
    transaction_manager: TransactionManager<S>,
    importer: BatchImporter<S>,
    reconciler: ReconciliationEngine<S>,
    registry: RulesetRegistry,
    config: EngineConfig,
}

impl<S: LedgerStorage + Clone> Ledger<S> {
    /// Create a new ledger with the given storage backend
    pub fn new(storage: S) -> Self {
        Self::with_config(storage, EngineConfig::default())
    }

    /// Create a new ledger with explicit configuration
    pub fn with_config(storage: S, config: EngineConfig) -> Self {
        Self {
            account_manager: AccountManager::new(storage.clone()),
            transaction_manager: TransactionManager::new(storage.clone()),
            importer: BatchImporter::new(storage.clone()),
            reconciler: ReconciliationEngine::with_config(storage, config.clone()),
            registry: RulesetRegistry::builtin(),
            config,
        }
    }

    /// Create a new ledger with custom validators
    pub fn with_validators(
        storage: S,
        account_validator: Box<dyn AccountValidator>,
        transaction_validator: Box<dyn TransactionValidator>,
    ) -> Self {
        let config = EngineConfig::default();
        Self {
            account_manager: AccountManager::with_validator(storage.clone(), account_validator),
            transaction_manager: TransactionManager::with_validator(
                storage.clone(),
                transaction_validator,
            ),
            importer: BatchImporter::new(storage.clone()),
            reconciler: ReconciliationEngine::with_config(storage, config.clone()),
            registry: RulesetRegistry::builtin(),
            config,
        }
    }

    /// Replace the statement ruleset registry
    pub fn with_registry(mut self, registry: RulesetRegistry) -> Self {
        self.registry = registry;
        self
    }

    pub fn registry(&self) -> &RulesetRegistry {
        &self.registry
    }

    pub fn registry_mut(&mut self) -> &mut RulesetRegistry {
        &mut self.registry
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    // Account operations
    /// Create a new account
    pub async fn create_account(
        &mut self,
        id: String,
        user_id: String,
        name: String,
        account_kind: AccountKind,
        currency: Currency,
    ) -> LedgerResult<Account> {
        self.account_manager
            .create_account(id, user_id, name, account_kind, currency)
            .await
    }

    /// Get an account by ID
    pub async fn get_account(&self, account_id: &str) -> LedgerResult<Option<Account>> {
        self.account_manager.get_account(account_id).await
    }

    /// Delete an account with its transactions and checkpoints
    pub async fn delete_account(&mut self, account_id: &str) -> LedgerResult<()> {
        self.account_manager.delete_account(account_id).await
    }

    // Transaction operations
    /// Record a manually entered transaction
    pub async fn record_transaction(
        &mut self,
        transaction: Transaction,
    ) -> LedgerResult<Transaction> {
        let recorded = self
            .transaction_manager
            .record_transaction(transaction)
            .await?;
        self.reconciler
            .refresh_checkpoints(&recorded.account_id, recorded.date)
            .await?;
        Ok(recorded)
    }

    /// Get a transaction by ID
    pub async fn get_transaction(&self, transaction_id: &str) -> LedgerResult<Option<Transaction>> {
        self.transaction_manager
            .get_transaction(transaction_id)
            .await
    }

    /// Transactions of an account with `after < date <= through`
    pub async fn get_account_transactions(
        &self,
        account_id: &str,
        after: Option<NaiveDate>,
        through: NaiveDate,
    ) -> LedgerResult<Vec<Transaction>> {
        self.transaction_manager
            .get_account_transactions(account_id, after, through)
            .await
    }

    /// Update a transaction
    pub async fn update_transaction(&mut self, transaction: &Transaction) -> LedgerResult<()> {
        if let Some(affected) = self
            .transaction_manager
            .update_transaction(transaction)
            .await?
        {
            self.reconciler
                .refresh_checkpoints(&transaction.account_id, affected)
                .await?;
        }
        Ok(())
    }

    /// Delete a transaction
    pub async fn delete_transaction(&mut self, transaction_id: &str) -> LedgerResult<()> {
        let deleted = self
            .transaction_manager
            .delete_transaction(transaction_id)
            .await?;
        self.reconciler
            .refresh_checkpoints(&deleted.account_id, deleted.date)
            .await?;
        Ok(())
    }

    // Statement import
    /// Parse raw statement text with the ruleset registered under `key`
    pub async fn import_statement(
        &self,
        raw: &str,
        key: &RulesetKey,
        account_id: &str,
    ) -> LedgerResult<Statement> {
        let account = self.account_manager.get_account_required(account_id).await?;
        let parser = StatementParser::new(self.registry.get(key)?)?;
        parser.parse(raw, &account)
    }

    /// Import transactions, then refresh checkpoints disturbed by them
    pub async fn import_batch(
        &mut self,
        account_id: &str,
        transactions: Vec<Transaction>,
        options: ImportOptions,
    ) -> LedgerResult<ImportSummary> {
        let summary = self
            .importer
            .import_batch(account_id, transactions, options)
            .await?;
        if let Some(min_date) = summary.min_date {
            self.reconciler
                .refresh_checkpoints(account_id, min_date)
                .await?;
        }
        Ok(summary)
    }

    /// Parse a statement and import its transactions in one step
    pub async fn import_statement_into(
        &mut self,
        raw: &str,
        key: &RulesetKey,
        account_id: &str,
    ) -> LedgerResult<StatementImport> {
        let statement = self.import_statement(raw, key, account_id).await?;
        let options = ImportOptions::from(&self.config);
        let summary = self
            .import_batch(account_id, statement.transactions, options)
            .await?;

        info!(
            account_id,
            ruleset = %key,
            imported = summary.imported_count,
            duplicates = summary.duplicate_count,
            skipped = statement.skipped_rows,
            "Imported statement"
        );

        Ok(StatementImport {
            start_date: statement.start_date,
            end_date: statement.end_date,
            skipped_rows: statement.skipped_rows,
            summary,
        })
    }

    // Checkpoint operations
    /// Assert the balance of an account at a date
    pub async fn reconcile(
        &mut self,
        account_id: &str,
        date: NaiveDate,
        balance: BigDecimal,
        checkpoint_type: CheckpointType,
    ) -> LedgerResult<BalanceCheckpoint> {
        self.reconciler
            .reconcile(account_id, date, balance, checkpoint_type)
            .await
    }

    /// Re-reconcile every checkpoint on or after `min_date`
    pub async fn refresh_checkpoints(
        &mut self,
        account_id: &str,
        min_date: NaiveDate,
    ) -> LedgerResult<Vec<BalanceCheckpoint>> {
        self.reconciler
            .refresh_checkpoints(account_id, min_date)
            .await
    }

    /// Audit specific checkpoints against transaction history
    pub async fn validate_checkpoints(
        &self,
        account_id: &str,
        checkpoints: Vec<BalanceCheckpoint>,
    ) -> LedgerResult<Vec<BalanceCheckpoint>> {
        self.reconciler
            .validate_checkpoints(account_id, checkpoints)
            .await
    }

    /// Most recent checkpoints, newest first, each with its validation
    pub async fn get_validated_checkpoints(
        &self,
        account_id: &str,
    ) -> LedgerResult<Vec<BalanceCheckpoint>> {
        self.account_manager.get_account_required(account_id).await?;
        self.reconciler
            .get_validated_checkpoints(account_id, self.config.validation_window)
            .await
    }

    /// Delete a checkpoint and its adjustment
    pub async fn delete_checkpoint(
        &mut self,
        account_id: &str,
        checkpoint_id: &str,
    ) -> LedgerResult<()> {
        self.reconciler
            .delete_checkpoint(account_id, checkpoint_id)
            .await
    }
}
