//! Account management functionality

use tracing::info;

use crate::traits::*;
use crate::types::*;

/// Account manager for creating, reading and removing accounts
pub struct AccountManager<S: LedgerStorage> {
    storage: S,
    validator: Box<dyn AccountValidator>,
}

impl<S: LedgerStorage> AccountManager<S> {
    /// Create a new account manager
    pub fn new(storage: S) -> Self {
        Self {
            storage,
            validator: Box::new(DefaultAccountValidator),
        }
    }

    /// Create a new account manager with custom validator
    pub fn with_validator(storage: S, validator: Box<dyn AccountValidator>) -> Self {
        Self { storage, validator }
    }

    /// Create a new account
    pub async fn create_account(
        &mut self,
        id: String,
        user_id: String,
        name: String,
        account_kind: AccountKind,
        currency: Currency,
    ) -> LedgerResult<Account> {
        let account = Account::new(id, user_id, name, account_kind, currency);

        self.validator.validate_account(&account)?;

        if self.storage.get_account(&account.id).await?.is_some() {
            return Err(LedgerError::Validation(format!(
                "Account with ID '{}' already exists",
                account.id
            )));
        }

        let mut batch = WriteBatch::new();
        batch.push(WriteOp::SaveAccount(account.clone()));
        self.storage.commit(batch).await?;

        info!(account_id = %account.id, kind = ?account.account_kind, "Created account");
        Ok(account)
    }

    /// Get an account by ID
    pub async fn get_account(&self, account_id: &str) -> LedgerResult<Option<Account>> {
        self.storage.get_account(account_id).await
    }

    /// Get an account by ID, returning an error if not found
    pub async fn get_account_required(&self, account_id: &str) -> LedgerResult<Account> {
        self.storage
            .get_account(account_id)
            .await?
            .ok_or_else(|| LedgerError::AccountNotFound(account_id.to_string()))
    }

    /// Delete an account with all of its transactions and checkpoints
    pub async fn delete_account(&mut self, account_id: &str) -> LedgerResult<()> {
        if self.storage.get_account(account_id).await?.is_none() {
            return Err(LedgerError::AccountNotFound(account_id.to_string()));
        }

        let mut batch = WriteBatch::new();
        batch.push(WriteOp::DeleteAccount(account_id.to_string()));
        self.storage.commit(batch).await?;

        info!(account_id, "Deleted account");
        Ok(())
    }
}
