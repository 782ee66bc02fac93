//! Rule-table classification of statement records into transaction types

use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};

use crate::import::Record;
use crate::types::*;

/// How a rule matches the value of a record field
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum MatchPattern {
    Exact(String),
    Prefix(String),
    Contains(String),
    Regex(String),
}

/// One row of a classification table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassificationRule {
    pub pattern: MatchPattern,
    pub transaction_type: TransactionType,
    #[serde(default)]
    pub category_id: Option<String>,
    /// Field to test instead of the classifier's type field
    #[serde(default)]
    pub field: Option<String>,
}

impl ClassificationRule {
    pub fn new(pattern: MatchPattern, transaction_type: TransactionType) -> Self {
        Self {
            pattern,
            transaction_type,
            category_id: None,
            field: None,
        }
    }

    pub fn with_category(mut self, category_id: &str) -> Self {
        self.category_id = Some(category_id.to_string());
        self
    }

    pub fn on_field(mut self, field: &str) -> Self {
        self.field = Some(field.to_string());
        self
    }
}

/// Per-institution classification table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassifierSpec {
    /// Record field holding the institution's type code
    pub type_field: String,
    /// Evaluated in order, first match wins
    pub rules: Vec<ClassificationRule>,
    /// Type used when no rule matches
    pub fallback: TransactionType,
    #[serde(default)]
    pub case_sensitive: bool,
}

/// Result of classifying one record
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Classification {
    pub transaction_type: TransactionType,
    pub category_id: Option<String>,
}

#[derive(Debug)]
enum Matcher {
    Exact(String),
    Prefix(String),
    Contains(String),
    Regex(Regex),
}

#[derive(Debug)]
struct CompiledRule {
    matcher: Matcher,
    field: Option<String>,
    transaction_type: TransactionType,
    category_id: Option<String>,
}

/// Compiled classification table; `classify` is a pure lookup
#[derive(Debug)]
pub struct Classifier {
    type_field: String,
    rules: Vec<CompiledRule>,
    fallback: TransactionType,
    case_sensitive: bool,
}

impl Classifier {
    pub fn compile(spec: &ClassifierSpec) -> LedgerResult<Self> {
        let fold = |s: &str| {
            if spec.case_sensitive {
                s.to_string()
            } else {
                s.to_lowercase()
            }
        };

        let rules = spec
            .rules
            .iter()
            .map(|rule| -> LedgerResult<CompiledRule> {
                let matcher = match &rule.pattern {
                    MatchPattern::Exact(s) => Matcher::Exact(fold(s)),
                    MatchPattern::Prefix(s) => Matcher::Prefix(fold(s)),
                    MatchPattern::Contains(s) => Matcher::Contains(fold(s)),
                    MatchPattern::Regex(pattern) => Matcher::Regex(
                        RegexBuilder::new(pattern)
                            .case_insensitive(!spec.case_sensitive)
                            .build()
                            .map_err(|e| {
                                LedgerError::Ruleset(format!(
                                    "bad classification pattern '{}': {}",
                                    pattern, e
                                ))
                            })?,
                    ),
                };
                Ok(CompiledRule {
                    matcher,
                    field: rule.field.clone(),
                    transaction_type: rule.transaction_type,
                    category_id: rule.category_id.clone(),
                })
            })
            .collect::<LedgerResult<Vec<_>>>()?;

        Ok(Self {
            type_field: spec.type_field.clone(),
            rules,
            fallback: spec.fallback,
            case_sensitive: spec.case_sensitive,
        })
    }

    pub fn classify(&self, record: &Record) -> Classification {
        for rule in &self.rules {
            let field = rule.field.as_deref().unwrap_or(&self.type_field);
            let raw = record.get(field);
            let value = if self.case_sensitive {
                raw.to_string()
            } else {
                raw.to_lowercase()
            };

            let matched = match &rule.matcher {
                Matcher::Exact(s) => value == *s,
                Matcher::Prefix(s) => value.starts_with(s.as_str()),
                Matcher::Contains(s) => value.contains(s.as_str()),
                Matcher::Regex(re) => re.is_match(raw),
            };

            if matched {
                return Classification {
                    transaction_type: rule.transaction_type,
                    category_id: rule.category_id.clone(),
                };
            }
        }

        Classification {
            transaction_type: self.fallback,
            category_id: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn card_spec() -> ClassifierSpec {
        ClassifierSpec {
            type_field: "Type".to_string(),
            rules: vec![
                ClassificationRule::new(
                    MatchPattern::Contains("thank you".to_string()),
                    TransactionType::Payment,
                )
                .on_field("Description"),
                ClassificationRule::new(
                    MatchPattern::Exact("Sale".to_string()),
                    TransactionType::Withdrawal,
                ),
                ClassificationRule::new(
                    MatchPattern::Regex(r"^(return|refund)".to_string()),
                    TransactionType::Deposit,
                ),
                ClassificationRule::new(
                    MatchPattern::Prefix("fee".to_string()),
                    TransactionType::Fees,
                )
                .with_category("bank-fees"),
            ],
            fallback: TransactionType::Unknown,
            case_sensitive: false,
        }
    }

    fn record(pairs: &[(&str, &str)]) -> Record {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_first_match_wins() {
        let classifier = Classifier::compile(&card_spec()).unwrap();

        // Both the description rule and the "Sale" rule match
        let both = record(&[("Type", "Sale"), ("Description", "Payment Thank You")]);
        assert_eq!(
            classifier.classify(&both).transaction_type,
            TransactionType::Payment
        );

        let sale = record(&[("Type", "SALE"), ("Description", "Coffee")]);
        assert_eq!(
            classifier.classify(&sale).transaction_type,
            TransactionType::Withdrawal
        );
    }

    #[test]
    fn test_category_and_fallback() {
        let classifier = Classifier::compile(&card_spec()).unwrap();

        let fee = classifier.classify(&record(&[("Type", "Fee - late payment")]));
        assert_eq!(fee.transaction_type, TransactionType::Fees);
        assert_eq!(fee.category_id.as_deref(), Some("bank-fees"));

        let refund = classifier.classify(&record(&[("Type", "Refund")]));
        assert_eq!(refund.transaction_type, TransactionType::Deposit);

        let other = classifier.classify(&record(&[("Type", "Adjustment")]));
        assert_eq!(other.transaction_type, TransactionType::Unknown);
        assert_eq!(other.category_id, None);
    }

    #[test]
    fn test_bad_regex_is_a_ruleset_error() {
        let mut spec = card_spec();
        spec.rules.push(ClassificationRule::new(
            MatchPattern::Regex("(unclosed".to_string()),
            TransactionType::General,
        ));
        assert!(matches!(
            Classifier::compile(&spec),
            Err(LedgerError::Ruleset(_))
        ));
    }
}
