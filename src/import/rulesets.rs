//! Per-institution statement rulesets and the registry that serves them
//!
//! A ruleset is plain data: how to recognise a statement, how to split it
//! into records, how to map record fields onto a transaction and how to
//! classify it. [`StatementParser`](crate::import::StatementParser) compiles
//! and interprets it.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::import::classifier::*;
use crate::types::*;

/// Institutions with a known statement layout
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Institution {
    Chase,
    Fidelity,
    NavyFederal,
    /// Loaded from configuration at runtime
    Custom(String),
}

impl fmt::Display for Institution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Institution::Chase => write!(f, "Chase"),
            Institution::Fidelity => write!(f, "Fidelity"),
            Institution::NavyFederal => write!(f, "Navy Federal"),
            Institution::Custom(name) => write!(f, "{}", name),
        }
    }
}

/// Registry lookup key: one ruleset per institution and account kind
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RulesetKey {
    pub institution: Institution,
    pub account_kind: AccountKind,
}

impl RulesetKey {
    pub fn new(institution: Institution, account_kind: AccountKind) -> Self {
        Self {
            institution,
            account_kind,
        }
    }
}

impl fmt::Display for RulesetKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {:?}", self.institution, self.account_kind)
    }
}

/// Predicate deciding whether raw text belongs to a ruleset
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum Identifier {
    Contains(String),
    Regex(String),
}

impl Identifier {
    pub fn matches(&self, raw: &str) -> LedgerResult<bool> {
        match self {
            Identifier::Contains(needle) => Ok(raw.contains(needle.as_str())),
            Identifier::Regex(pattern) => Ok(compile(pattern)?.is_match(raw)),
        }
    }
}

/// How raw text is split into records
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum Layout {
    /// Rows of delimited fields; leading blank rows are ignored, then
    /// `header_rows` rows are skipped. Column names come from `columns` or
    /// from the last skipped row.
    Delimited {
        delimiter: char,
        header_rows: usize,
        #[serde(default)]
        columns: Option<Vec<String>>,
    },
    /// Free text where one transaction spans several lines. Each block is
    /// joined with single spaces and matched against `block_pattern`, whose
    /// named captures become the record fields.
    Blocked {
        start_delimiter: String,
        #[serde(default)]
        skip_delimiter: Option<String>,
        #[serde(default)]
        end_delimiter: Option<String>,
        block_pattern: String,
    },
}

/// Date interpretation for a field
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum DateFormat {
    /// chrono format strings, tried in order
    Formats(Vec<String>),
    /// Month and day only ("01/05", "Jan 05"); the year comes from the base date
    MonthDay,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateField {
    pub column: String,
    pub format: DateFormat,
}

/// Sign convention of an amount column
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignRule {
    /// Source already uses negative for outflows
    AsIs,
    /// Source uses positive for outflows
    Negate,
    /// Source is unsigned; outflow types become negative
    ByType,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AmountField {
    Column { column: String, sign: SignRule },
    /// Separate unsigned debit and credit columns
    DebitCredit { debit: String, credit: String },
}

/// Mapping from record fields to transaction fields
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldMap {
    pub date: DateField,
    pub amount: AmountField,
    /// Non-empty values are joined with a space
    pub description: Vec<String>,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub instrument: Option<String>,
    #[serde(default)]
    pub quantity: Option<String>,
    #[serde(default)]
    pub price: Option<String>,
    #[serde(default)]
    pub currency: Option<String>,
}

/// Where the statement's own date is printed; resolves month/day dates
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeaderDate {
    /// Must contain a named group `date`
    pub pattern: String,
    pub formats: Vec<String>,
}

/// Complete parsing configuration for one statement export format
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ruleset {
    pub name: String,
    pub identifier: Identifier,
    pub layout: Layout,
    pub fields: FieldMap,
    pub classifier: ClassifierSpec,
    #[serde(default)]
    pub header_date: Option<HeaderDate>,
    /// Descriptions that keep a zero-amount row instead of dropping it
    #[serde(default)]
    pub exception_markers: Vec<String>,
}

pub(crate) fn compile(pattern: &str) -> LedgerResult<Regex> {
    Regex::new(pattern)
        .map_err(|e| LedgerError::Ruleset(format!("bad pattern '{}': {}", pattern, e)))
}

/// Static lookup of rulesets by institution and account kind
#[derive(Debug, Clone, Default)]
pub struct RulesetRegistry {
    entries: Vec<(RulesetKey, Ruleset)>,
}

#[derive(Deserialize)]
struct RulesetEntry {
    key: RulesetKey,
    ruleset: Ruleset,
}

impl RulesetRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding every built-in ruleset
    pub fn builtin() -> Self {
        let mut registry = Self::new();
        registry.register(
            RulesetKey::new(Institution::Chase, AccountKind::Checking),
            builtin::chase_checking(),
        );
        registry.register(
            RulesetKey::new(Institution::Chase, AccountKind::CreditCard),
            builtin::chase_credit_card(),
        );
        registry.register(
            RulesetKey::new(Institution::Fidelity, AccountKind::Brokerage),
            builtin::fidelity_brokerage(),
        );
        registry.register(
            RulesetKey::new(Institution::NavyFederal, AccountKind::Checking),
            builtin::navy_federal_checking(),
        );
        registry
    }

    /// Add or replace the ruleset for `key`
    pub fn register(&mut self, key: RulesetKey, ruleset: Ruleset) {
        match self.entries.iter_mut().find(|(k, _)| *k == key) {
            Some(entry) => entry.1 = ruleset,
            None => self.entries.push((key, ruleset)),
        }
    }

    pub fn get(&self, key: &RulesetKey) -> LedgerResult<&Ruleset> {
        self.entries
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, ruleset)| ruleset)
            .ok_or_else(|| LedgerError::Ruleset(format!("no ruleset registered for {}", key)))
    }

    pub fn keys(&self) -> impl Iterator<Item = &RulesetKey> {
        self.entries.iter().map(|(key, _)| key)
    }

    /// First registered ruleset whose identifier matches `raw`
    pub fn identify(&self, raw: &str) -> LedgerResult<Option<&RulesetKey>> {
        for (key, ruleset) in &self.entries {
            if ruleset.identifier.matches(raw)? {
                return Ok(Some(key));
            }
        }
        Ok(None)
    }

    /// Register rulesets from a JSON array of `{"key": .., "ruleset": ..}`
    pub fn load_json(&mut self, json: &str) -> LedgerResult<usize> {
        let entries: Vec<RulesetEntry> = serde_json::from_str(json)
            .map_err(|e| LedgerError::Ruleset(format!("invalid ruleset JSON: {}", e)))?;
        let count = entries.len();
        for entry in entries {
            self.register(entry.key, entry.ruleset);
        }
        Ok(count)
    }
}

/// Built-in rulesets
pub mod builtin {
    use super::*;

    fn rule(pattern: MatchPattern, transaction_type: TransactionType) -> ClassificationRule {
        ClassificationRule::new(pattern, transaction_type)
    }

    fn exact(s: &str) -> MatchPattern {
        MatchPattern::Exact(s.to_string())
    }

    fn prefix(s: &str) -> MatchPattern {
        MatchPattern::Prefix(s.to_string())
    }

    fn contains(s: &str) -> MatchPattern {
        MatchPattern::Contains(s.to_string())
    }

    fn us_date(column: &str) -> DateField {
        DateField {
            column: column.to_string(),
            format: DateFormat::Formats(vec!["%m/%d/%y".to_string(), "%m/%d/%Y".to_string()]),
        }
    }

    /// Chase checking CSV: `Details,Posting Date,Description,Amount,Type,Balance,Check or Slip #`
    pub fn chase_checking() -> Ruleset {
        Ruleset {
            name: "Chase checking CSV".to_string(),
            identifier: Identifier::Contains(
                "Details,Posting Date,Description,Amount,Type,Balance".to_string(),
            ),
            layout: Layout::Delimited {
                delimiter: ',',
                header_rows: 1,
                columns: None,
            },
            fields: FieldMap {
                date: us_date("Posting Date"),
                amount: AmountField::Column {
                    column: "Amount".to_string(),
                    sign: SignRule::AsIs,
                },
                description: vec!["Description".to_string()],
                category: None,
                instrument: None,
                quantity: None,
                price: None,
                currency: None,
            },
            classifier: ClassifierSpec {
                type_field: "Type".to_string(),
                rules: vec![
                    rule(contains("interest"), TransactionType::Interest).on_field("Description"),
                    rule(exact("FEE_TRANSACTION"), TransactionType::Fees)
                        .with_category("bank-fees"),
                    rule(exact("ACCT_XFER"), TransactionType::Transfer),
                    rule(exact("LOAN_PMT"), TransactionType::Payment),
                    rule(
                        MatchPattern::Regex(
                            r"^(ACH|QUICKPAY|MISC)_CREDIT$|^CHECK_DEPOSIT$".to_string(),
                        ),
                        TransactionType::Deposit,
                    ),
                    rule(
                        MatchPattern::Regex(
                            r"^(ACH|QUICKPAY|MISC)_DEBIT$|^DEBIT_CARD$|^ATM$|^CHECK_PAID$|^BILLPAY$"
                                .to_string(),
                        ),
                        TransactionType::Withdrawal,
                    ),
                ],
                fallback: TransactionType::General,
                case_sensitive: false,
            },
            header_date: None,
            exception_markers: Vec::new(),
        }
    }

    /// Chase credit card CSV: `Transaction Date,Post Date,Description,Category,Type,Amount,Memo`
    pub fn chase_credit_card() -> Ruleset {
        Ruleset {
            name: "Chase credit card CSV".to_string(),
            identifier: Identifier::Contains(
                "Transaction Date,Post Date,Description,Category,Type,Amount".to_string(),
            ),
            layout: Layout::Delimited {
                delimiter: ',',
                header_rows: 1,
                columns: None,
            },
            fields: FieldMap {
                date: us_date("Transaction Date"),
                amount: AmountField::Column {
                    column: "Amount".to_string(),
                    sign: SignRule::AsIs,
                },
                description: vec!["Description".to_string()],
                category: Some("Category".to_string()),
                instrument: None,
                quantity: None,
                price: None,
                currency: None,
            },
            classifier: ClassifierSpec {
                type_field: "Type".to_string(),
                rules: vec![
                    rule(exact("Sale"), TransactionType::Withdrawal),
                    rule(exact("Payment"), TransactionType::Payment),
                    rule(exact("Return"), TransactionType::Deposit),
                    rule(exact("Fee"), TransactionType::Fees).with_category("bank-fees"),
                    rule(exact("Adjustment"), TransactionType::General),
                ],
                fallback: TransactionType::Unknown,
                case_sensitive: false,
            },
            header_date: None,
            exception_markers: vec!["Payment Thank You".to_string()],
        }
    }

    /// Fidelity brokerage activity CSV
    pub fn fidelity_brokerage() -> Ruleset {
        Ruleset {
            name: "Fidelity brokerage activity CSV".to_string(),
            identifier: Identifier::Regex(r"Run Date,Action,Symbol,Description".to_string()),
            layout: Layout::Delimited {
                delimiter: ',',
                header_rows: 1,
                columns: None,
            },
            fields: FieldMap {
                date: us_date("Run Date"),
                amount: AmountField::Column {
                    column: "Amount ($)".to_string(),
                    sign: SignRule::AsIs,
                },
                description: vec!["Action".to_string()],
                category: None,
                instrument: Some("Symbol".to_string()),
                quantity: Some("Quantity".to_string()),
                price: Some("Price ($)".to_string()),
                currency: None,
            },
            classifier: ClassifierSpec {
                type_field: "Action".to_string(),
                rules: vec![
                    rule(prefix("you bought"), TransactionType::Trade),
                    rule(prefix("you sold"), TransactionType::Trade),
                    rule(contains("reinvestment"), TransactionType::Trade),
                    rule(contains("dividend received"), TransactionType::Dividend),
                    rule(contains("interest earned"), TransactionType::Interest),
                    rule(contains("electronic funds transfer"), TransactionType::Transfer),
                    rule(contains("transferred"), TransactionType::Transfer),
                    rule(contains("fee"), TransactionType::Fees).with_category("investment-fees"),
                ],
                fallback: TransactionType::General,
                case_sensitive: false,
            },
            header_date: None,
            exception_markers: Vec::new(),
        }
    }

    /// Navy Federal checking statement text, one transaction per
    /// `MM/DD <type> <amount>` line plus continuation lines
    pub fn navy_federal_checking() -> Ruleset {
        Ruleset {
            name: "Navy Federal checking statement text".to_string(),
            identifier: Identifier::Regex(r"(?i)navy\s+federal".to_string()),
            layout: Layout::Blocked {
                start_delimiter: r"^\d{2}/\d{2}\s".to_string(),
                skip_delimiter: Some(r"^Page \d+ of \d+".to_string()),
                end_delimiter: Some(r"^Ending Balance".to_string()),
                block_pattern: concat!(
                    r"^(?P<date>\d{2}/\d{2})\s+",
                    r"(?P<type>.+?)\s+",
                    r"(?P<amount>\(?-?\$?[\d,]+\.\d{2}-?\)?)",
                    r"(?:\s+(?P<balance>[\d,]+\.\d{2}))?",
                    r"(?:\s+(?P<desc>.*))?$"
                )
                .to_string(),
            },
            fields: FieldMap {
                date: DateField {
                    column: "date".to_string(),
                    format: DateFormat::MonthDay,
                },
                amount: AmountField::Column {
                    column: "amount".to_string(),
                    sign: SignRule::ByType,
                },
                description: vec!["type".to_string(), "desc".to_string()],
                category: None,
                instrument: None,
                quantity: None,
                price: None,
                currency: None,
            },
            classifier: ClassifierSpec {
                type_field: "type".to_string(),
                rules: vec![
                    rule(prefix("transfer to"), TransactionType::Withdrawal)
                        .with_category("transfers"),
                    rule(prefix("transfer from"), TransactionType::Deposit)
                        .with_category("transfers"),
                    rule(contains("dividend"), TransactionType::Dividend),
                    rule(contains("fee"), TransactionType::Fees).with_category("bank-fees"),
                    rule(contains("deposit"), TransactionType::Deposit),
                    rule(contains("credit"), TransactionType::Deposit),
                    rule(contains("debit"), TransactionType::Withdrawal),
                    rule(contains("withdrawal"), TransactionType::Withdrawal),
                    rule(contains("check"), TransactionType::Withdrawal),
                ],
                fallback: TransactionType::Unknown,
                case_sensitive: false,
            },
            header_date: Some(HeaderDate {
                pattern: concat!(
                    r"Statement Period\s+\d{2}/\d{2}/\d{2,4}\s*-\s*",
                    r"(?P<date>\d{2}/\d{2}/\d{2,4})"
                )
                .to_string(),
                formats: vec!["%m/%d/%y".to_string(), "%m/%d/%Y".to_string()],
            }),
            exception_markers: Vec::new(),
        }
    }
}
