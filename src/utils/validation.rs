//! Validation utilities

use crate::traits::*;
use crate::types::*;
use bigdecimal::BigDecimal;

/// Validate that an amount is non-zero
pub fn validate_nonzero_amount(amount: &BigDecimal) -> LedgerResult<()> {
    if *amount == BigDecimal::from(0) {
        Err(LedgerError::Validation(
            "Amount cannot be zero".to_string(),
        ))
    } else {
        Ok(())
    }
}

/// Validate that an account ID is valid
pub fn validate_account_id(account_id: &str) -> LedgerResult<()> {
    if account_id.trim().is_empty() {
        return Err(LedgerError::Validation(
            "Account ID cannot be empty".to_string(),
        ));
    }

    if account_id.len() > 50 {
        return Err(LedgerError::Validation(
            "Account ID cannot exceed 50 characters".to_string(),
        ));
    }

    // Check for valid characters (alphanumeric, dashes, underscores)
    if !account_id
        .chars()
        .all(|c| c.is_alphanumeric() || c == '-' || c == '_')
    {
        return Err(LedgerError::Validation(
            "Account ID can only contain alphanumeric characters, dashes, and underscores"
                .to_string(),
        ));
    }

    Ok(())
}

/// Validate that an account name is valid
pub fn validate_account_name(name: &str) -> LedgerResult<()> {
    if name.trim().is_empty() {
        return Err(LedgerError::Validation(
            "Account name cannot be empty".to_string(),
        ));
    }

    if name.len() > 100 {
        return Err(LedgerError::Validation(
            "Account name cannot exceed 100 characters".to_string(),
        ));
    }

    Ok(())
}

/// Validate that a transaction description is valid
pub fn validate_transaction_description(description: &str) -> LedgerResult<()> {
    if description.trim().is_empty() {
        return Err(LedgerError::Validation(
            "Transaction description cannot be empty".to_string(),
        ));
    }

    if description.len() > 500 {
        return Err(LedgerError::Validation(
            "Transaction description cannot exceed 500 characters".to_string(),
        ));
    }

    Ok(())
}

/// Enhanced transaction validator with detailed checks
pub struct EnhancedTransactionValidator;

impl TransactionValidator for EnhancedTransactionValidator {
    fn validate_transaction(&self, transaction: &Transaction) -> LedgerResult<()> {
        // Basic validation
        DefaultTransactionValidator.validate_transaction(transaction)?;

        validate_account_id(&transaction.account_id)?;
        validate_transaction_description(&transaction.description)?;
        validate_nonzero_amount(&transaction.amount)?;

        if transaction.transaction_type == TransactionType::Trade
            && transaction.instrument_id.is_none()
        {
            return Err(LedgerError::Validation(
                "Trade transactions must reference an instrument".to_string(),
            ));
        }

        Ok(())
    }
}

/// Enhanced account validator with detailed checks
pub struct EnhancedAccountValidator;

impl AccountValidator for EnhancedAccountValidator {
    fn validate_account(&self, account: &Account) -> LedgerResult<()> {
        validate_account_id(&account.id)?;
        validate_account_name(&account.name)?;

        if account.currency.code.len() != 3 {
            return Err(LedgerError::Validation(format!(
                "Unsupported currency code '{}'",
                account.currency.code
            )));
        }

        Ok(())
    }
}
