//! Manual transaction entry and editing

use bigdecimal::BigDecimal;
use chrono::NaiveDate;
use tracing::info;
use uuid::Uuid;

use crate::traits::*;
use crate::types::*;

/// Transaction manager for manually entered transactions
///
/// Mutations return the earliest date whose history they changed, so the
/// caller can refresh checkpoints from there.
pub struct TransactionManager<S: LedgerStorage> {
    storage: S,
    validator: Box<dyn TransactionValidator>,
}

impl<S: LedgerStorage> TransactionManager<S> {
    /// Create a new transaction manager
    pub fn new(storage: S) -> Self {
        Self {
            storage,
            validator: Box::new(DefaultTransactionValidator),
        }
    }

    /// Create a new transaction manager with custom validator
    pub fn with_validator(storage: S, validator: Box<dyn TransactionValidator>) -> Self {
        Self { storage, validator }
    }

    /// Record a new transaction; an empty id is replaced with a random one
    pub async fn record_transaction(
        &mut self,
        mut transaction: Transaction,
    ) -> LedgerResult<Transaction> {
        self.validator.validate_transaction(&transaction)?;

        let account = self
            .storage
            .get_account(&transaction.account_id)
            .await?
            .ok_or_else(|| LedgerError::AccountNotFound(transaction.account_id.clone()))?;

        if transaction.has_id() {
            if self.storage.get_transaction(&transaction.id).await?.is_some() {
                return Err(LedgerError::Validation(format!(
                    "Transaction with ID '{}' already exists",
                    transaction.id
                )));
            }
        } else {
            transaction.id = Uuid::new_v4().to_string();
        }

        if transaction.user_id.is_empty() {
            transaction.user_id = account.user_id;
        }
        let now = chrono::Utc::now().naive_utc();
        transaction.created_at = now;
        transaction.updated_at = now;

        let mut batch = WriteBatch::new();
        batch.upsert_transaction(transaction.clone());
        self.storage.commit(batch).await?;

        info!(
            transaction_id = %transaction.id,
            account_id = %transaction.account_id,
            date = %transaction.date,
            "Recorded transaction"
        );
        Ok(transaction)
    }

    /// Get a transaction by ID
    pub async fn get_transaction(&self, transaction_id: &str) -> LedgerResult<Option<Transaction>> {
        self.storage.get_transaction(transaction_id).await
    }

    /// Get a transaction by ID, returning an error if not found
    pub async fn get_transaction_required(
        &self,
        transaction_id: &str,
    ) -> LedgerResult<Transaction> {
        self.storage
            .get_transaction(transaction_id)
            .await?
            .ok_or_else(|| LedgerError::TransactionNotFound(transaction_id.to_string()))
    }

    /// Transactions of an account with `after < date <= through`
    pub async fn get_account_transactions(
        &self,
        account_id: &str,
        after: Option<NaiveDate>,
        through: NaiveDate,
    ) -> LedgerResult<Vec<Transaction>> {
        self.storage
            .get_transactions_in_range(account_id, after, through)
            .await
    }

    /// Replace a stored transaction.
    ///
    /// Returns the earlier of the old and new dates when the date or amount
    /// changed, `None` when balances are unaffected.
    pub async fn update_transaction(
        &mut self,
        transaction: &Transaction,
    ) -> LedgerResult<Option<NaiveDate>> {
        let old = self.get_transaction_required(&transaction.id).await?;

        self.validator.validate_transaction(transaction)?;
        ensure_manual(&old)?;
        if old.account_id != transaction.account_id {
            return Err(LedgerError::InvalidTransaction(format!(
                "Transaction '{}' cannot move to another account",
                transaction.id
            )));
        }

        let mut updated = transaction.clone();
        updated.created_at = old.created_at;
        updated.updated_at = chrono::Utc::now().naive_utc();

        let mut batch = WriteBatch::new();
        batch.upsert_transaction(updated);
        self.storage.commit(batch).await?;

        let affected = (old.date != transaction.date || old.amount != transaction.amount)
            .then(|| old.date.min(transaction.date));
        info!(transaction_id = %transaction.id, ?affected, "Updated transaction");
        Ok(affected)
    }

    /// Delete a transaction, returning what was removed
    pub async fn delete_transaction(&mut self, transaction_id: &str) -> LedgerResult<Transaction> {
        let transaction = self.get_transaction_required(transaction_id).await?;
        ensure_manual(&transaction)?;

        let mut batch = WriteBatch::new();
        batch.delete_transaction(transaction_id);
        self.storage.commit(batch).await?;

        info!(transaction_id, date = %transaction.date, "Deleted transaction");
        Ok(transaction)
    }
}

/// Adjustments are only touched through their checkpoint
fn ensure_manual(transaction: &Transaction) -> LedgerResult<()> {
    if transaction.transaction_type == TransactionType::Reconciliation {
        return Err(LedgerError::InvalidTransaction(format!(
            "Transaction '{}' is a reconciliation adjustment",
            transaction.id
        )));
    }
    Ok(())
}

/// Transaction builder for manually entered transactions
#[derive(Debug)]
pub struct TransactionBuilder {
    transaction: Transaction,
}

impl TransactionBuilder {
    /// Create a new transaction builder
    pub fn new(
        account_id: String,
        date: NaiveDate,
        amount: BigDecimal,
        description: String,
    ) -> Self {
        Self {
            transaction: Transaction::new(
                String::new(),
                account_id,
                date,
                amount,
                description,
                TransactionType::General,
            ),
        }
    }

    /// Use a caller-supplied id
    pub fn id(mut self, id: String) -> Self {
        self.transaction.id = id;
        self
    }

    pub fn transaction_type(mut self, transaction_type: TransactionType) -> Self {
        self.transaction.transaction_type = transaction_type;
        self
    }

    pub fn category(mut self, category_id: String) -> Self {
        self.transaction.category_id = Some(category_id);
        self
    }

    pub fn currency(mut self, currency: Currency) -> Self {
        self.transaction.currency = currency;
        self
    }

    /// Mark as a trade of `quantity` units of `instrument_id` at `price`
    pub fn trade(mut self, instrument_id: String, quantity: BigDecimal, price: BigDecimal) -> Self {
        self.transaction.transaction_type = TransactionType::Trade;
        self.transaction.instrument_id = Some(instrument_id);
        self.transaction.quantity = Some(quantity);
        self.transaction.price = Some(price);
        self
    }

    /// Link to the other side of a transfer
    pub fn linked_to(mut self, transaction_id: String) -> Self {
        self.transaction.linked_transaction_id = Some(transaction_id);
        self
    }

    pub fn tag(mut self, tag_id: String) -> Self {
        self.transaction.tag_ids.insert(tag_id);
        self
    }

    /// Build the transaction
    pub fn build(self) -> LedgerResult<Transaction> {
        DefaultTransactionValidator.validate_transaction(&self.transaction)?;
        Ok(self.transaction)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::MemoryStorage;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 5, d).unwrap()
    }

    async fn manager() -> TransactionManager<MemoryStorage> {
        let mut storage = MemoryStorage::new();
        let mut batch = WriteBatch::new();
        batch.push(WriteOp::SaveAccount(Account::new(
            "acc".to_string(),
            "owner".to_string(),
            "Checking".to_string(),
            AccountKind::Checking,
            Currency::usd(),
        )));
        storage.commit(batch).await.unwrap();
        TransactionManager::new(storage)
    }

    #[test]
    fn test_builder() {
        let txn = TransactionBuilder::new(
            "brokerage".to_string(),
            day(1),
            BigDecimal::from(-481),
            "Buy VTI".to_string(),
        )
        .trade("VTI".to_string(), BigDecimal::from(2), BigDecimal::from(240))
        .tag("long-term".to_string())
        .build()
        .unwrap();
        assert_eq!(txn.transaction_type, TransactionType::Trade);
        assert!(!txn.has_id());
        assert!(txn.tag_ids.contains("long-term"));

        let adjustment = TransactionBuilder::new(
            "brokerage".to_string(),
            day(1),
            BigDecimal::from(1),
            "Fix".to_string(),
        )
        .transaction_type(TransactionType::Reconciliation)
        .build();
        assert!(matches!(adjustment, Err(LedgerError::InvalidTransaction(_))));
    }

    #[tokio::test]
    async fn test_record_assigns_id_and_owner() {
        let mut manager = manager().await;
        let txn = TransactionBuilder::new(
            "acc".to_string(),
            day(3),
            BigDecimal::from(-9),
            "Lunch".to_string(),
        )
        .build()
            .unwrap();
        let recorded = manager.record_transaction(txn).await.unwrap();
        assert!(recorded.has_id());
        assert_eq!(recorded.user_id, "owner");

        let duplicate = manager.record_transaction(recorded.clone()).await;
        assert!(matches!(duplicate, Err(LedgerError::Validation(_))));
    }

    #[tokio::test]
    async fn test_update_reports_affected_date() {
        let mut manager = manager().await;
        let txn = TransactionBuilder::new(
            "acc".to_string(),
            day(10),
            BigDecimal::from(-9),
            "Lunch".to_string(),
        )
        .id("t1".to_string())
        .build()
            .unwrap();
        let mut recorded = manager.record_transaction(txn).await.unwrap();

        recorded.description = "Team lunch".to_string();
        assert_eq!(manager.update_transaction(&recorded).await.unwrap(), None);

        recorded.date = day(4);
        assert_eq!(manager.update_transaction(&recorded).await.unwrap(), Some(day(4)));

        recorded.date = day(12);
        recorded.amount = BigDecimal::from(-11);
        assert_eq!(manager.update_transaction(&recorded).await.unwrap(), Some(day(4)));

        let deleted = manager.delete_transaction("t1").await.unwrap();
        assert_eq!(deleted.date, day(12));
        assert!(manager.get_transaction("t1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_unknown_account_and_transaction() {
        let mut manager = manager().await;
        let txn = TransactionBuilder::new(
            "other".to_string(),
            day(1),
            BigDecimal::from(1),
            "x".to_string(),
        )
        .build()
            .unwrap();
        assert!(matches!(
            manager.record_transaction(txn).await,
            Err(LedgerError::AccountNotFound(_))
        ));
        assert!(matches!(
            manager.delete_transaction("missing").await,
            Err(LedgerError::TransactionNotFound(_))
        ));
    }
}
