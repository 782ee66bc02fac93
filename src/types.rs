//! Core types and data structures for the ledger

use bigdecimal::BigDecimal;
use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// Kinds of accounts a statement can be imported into
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum AccountKind {
    /// Bank checking account
    Checking,
    /// Bank savings account
    Savings,
    /// Credit card; purchases are outflows, payments are inflows
    CreditCard,
    /// Brokerage / investment account
    Brokerage,
}

/// Currency code and display symbol
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Currency {
    pub code: String,
    pub symbol: String,
}

impl Currency {
    pub fn new(code: impl Into<String>, symbol: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            symbol: symbol.into(),
        }
    }

    /// Look up a currency by ISO code, falling back to the code as its own symbol
    pub fn from_code(code: &str) -> Self {
        let code = code.trim().to_uppercase();
        let symbol = match code.as_str() {
            "USD" | "CAD" | "AUD" | "NZD" => "$",
            "EUR" => "€",
            "GBP" => "£",
            "INR" => "₹",
            "JPY" => "¥",
            _ => code.as_str(),
        }
        .to_string();
        Self { code, symbol }
    }

    pub fn usd() -> Self {
        Self::from_code("USD")
    }
}

impl Default for Currency {
    fn default() -> Self {
        Self::usd()
    }
}

/// Canonical transaction types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TransactionType {
    General,
    Trade,
    Transfer,
    Deposit,
    Withdrawal,
    Fees,
    Interest,
    Dividend,
    Payment,
    /// Synthetic adjustment created by the reconciliation engine
    Reconciliation,
    Unknown,
}

impl TransactionType {
    /// Whether money leaves the account for this type when the source amount is unsigned
    pub fn is_outflow(&self) -> bool {
        matches!(self, TransactionType::Withdrawal | TransactionType::Fees)
    }
}

impl fmt::Display for TransactionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// A ledger account owning transactions and checkpoints
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Account {
    /// Unique identifier for the account
    pub id: String,
    /// Owner of the account
    pub user_id: String,
    /// Human-readable account name
    pub name: String,
    pub account_kind: AccountKind,
    pub currency: Currency,
    /// Balance asserted by the temporally most recent reconciliation
    pub balance: BigDecimal,
    /// Date `balance` refers to; `None` until the first reconciliation
    pub balance_date: Option<NaiveDate>,
    /// When the account was created
    pub created_at: NaiveDateTime,
    /// When the account was last updated
    pub updated_at: NaiveDateTime,
}

impl Account {
    /// Create a new account
    pub fn new(
        id: String,
        user_id: String,
        name: String,
        account_kind: AccountKind,
        currency: Currency,
    ) -> Self {
        let now = chrono::Utc::now().naive_utc();
        Self {
            id,
            user_id,
            name,
            account_kind,
            currency,
            balance: BigDecimal::from(0),
            balance_date: None,
            created_at: now,
            updated_at: now,
        }
    }
}

/// A single financial event on an account
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    /// Stable identifier; empty when the caller did not supply one
    pub id: String,
    pub account_id: String,
    pub user_id: String,
    pub date: NaiveDate,
    /// Signed amount, negative for outflows
    pub amount: BigDecimal,
    pub currency: Currency,
    pub description: String,
    pub transaction_type: TransactionType,
    pub category_id: Option<String>,
    /// Trade fields
    pub instrument_id: Option<String>,
    pub quantity: Option<BigDecimal>,
    pub price: Option<BigDecimal>,
    /// Counterpart of a transfer
    pub linked_transaction_id: Option<String>,
    pub tag_ids: BTreeSet<String>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

impl Transaction {
    /// Create a new transaction with no optional fields set
    pub fn new(
        id: String,
        account_id: String,
        date: NaiveDate,
        amount: BigDecimal,
        description: String,
        transaction_type: TransactionType,
    ) -> Self {
        let now = chrono::Utc::now().naive_utc();
        Self {
            id,
            account_id,
            user_id: String::new(),
            date,
            amount,
            currency: Currency::default(),
            description,
            transaction_type,
            category_id: None,
            instrument_id: None,
            quantity: None,
            price: None,
            linked_transaction_id: None,
            tag_ids: BTreeSet::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Whether the caller supplied an id usable for duplicate detection
    pub fn has_id(&self) -> bool {
        !self.id.trim().is_empty()
    }

    /// Whether this is a reconciliation adjustment dated exactly on `date`
    pub fn is_adjustment_on(&self, date: NaiveDate) -> bool {
        self.transaction_type == TransactionType::Reconciliation && self.date == date
    }
}

/// Origin of a checkpoint's asserted balance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CheckpointType {
    /// Closing balance printed on an imported statement
    Statement,
    /// Balance entered by the user
    Manual,
    /// Opening balance of the account
    Initial,
}

/// Result of auditing a checkpoint against transaction history
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckpointValidation {
    pub is_valid: bool,
    /// `calculated - asserted`, rounded to cents
    pub difference: BigDecimal,
}

/// Externally asserted true balance of an account at a date
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BalanceCheckpoint {
    pub id: String,
    pub account_id: String,
    pub date: NaiveDate,
    pub balance: BigDecimal,
    pub checkpoint_type: CheckpointType,
    pub created_at: NaiveDateTime,
    /// Computed on read, never persisted
    #[serde(skip)]
    pub validation: Option<CheckpointValidation>,
}

impl BalanceCheckpoint {
    pub fn new(
        id: String,
        account_id: String,
        date: NaiveDate,
        balance: BigDecimal,
        checkpoint_type: CheckpointType,
    ) -> Self {
        Self {
            id,
            account_id,
            date,
            balance,
            checkpoint_type,
            created_at: chrono::Utc::now().naive_utc(),
            validation: None,
        }
    }
}

/// Parsed statement, consumed immediately by the batch importer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Statement {
    pub account_id: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    /// Sorted ascending by date
    pub transactions: Vec<Transaction>,
    /// Rows or blocks dropped as noise or unparseable
    pub skipped_rows: usize,
}

/// Outcome of a batch import
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImportSummary {
    pub imported_count: usize,
    pub duplicate_count: usize,
    /// Earliest date among the transactions actually written
    pub min_date: Option<NaiveDate>,
}

/// Errors that can occur in the ledger system
#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    #[error("Storage error: {0}")]
    Storage(String),
    #[error("Invalid transaction: {0}")]
    InvalidTransaction(String),
    #[error("Account not found: {0}")]
    AccountNotFound(String),
    #[error("Transaction not found: {0}")]
    TransactionNotFound(String),
    #[error("Checkpoint not found: {0}")]
    CheckpointNotFound(String),
    #[error("Validation error: {0}")]
    Validation(String),
    #[error("Statement not recognized: {0}")]
    UnrecognizedStatement(String),
    #[error("Invalid ruleset: {0}")]
    Ruleset(String),
    #[error("Refresh aborted at {failed} ({} done): {source}", .completed.len())]
    RefreshAborted {
        /// Checkpoint ids reconciled before the failure
        completed: Vec<String>,
        /// Checkpoint id whose reconciliation failed
        failed: String,
        #[source]
        source: Box<LedgerError>,
    },
}

/// Result type for ledger operations
pub type LedgerResult<T> = Result<T, LedgerError>;
