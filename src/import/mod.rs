//! Statement import: tokenizing, parsing, classification and batch writes

pub mod batch;
pub mod classifier;
pub mod parser;
pub mod rulesets;
pub mod tokenizer;

pub use batch::*;
pub use classifier::*;
pub use parser::*;
pub use rulesets::*;
pub use tokenizer::*;

use std::collections::HashMap;

/// One statement row or block, keyed by column or capture name
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Record {
    fields: HashMap<String, String>,
}

impl Record {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.fields.insert(name.into(), value.into());
    }

    /// Trimmed value of `name`, or `""` when absent
    pub fn get(&self, name: &str) -> &str {
        self.fields.get(name).map(|v| v.trim()).unwrap_or("")
    }

    /// Whether every field is empty
    pub fn is_blank(&self) -> bool {
        self.fields.values().all(|v| v.trim().is_empty())
    }
}

impl FromIterator<(String, String)> for Record {
    fn from_iter<I: IntoIterator<Item = (String, String)>>(iter: I) -> Self {
        Self {
            fields: iter.into_iter().collect(),
        }
    }
}
