//! Ruleset-driven conversion of raw statement text into transactions

use bigdecimal::BigDecimal;
use chrono::{Datelike, NaiveDate};
use regex::Regex;
use std::collections::HashMap;
use tracing::debug;
use uuid::Uuid;

use crate::import::classifier::Classifier;
use crate::import::rulesets::*;
use crate::import::tokenizer::tokenize;
use crate::import::Record;
use crate::types::*;
use crate::utils::amount::{parse_amount, round2};

/// Month/day dates further than this past the base date belong to the previous year
const MONTH_DAY_GRACE_DAYS: i64 = 31;

/// Why a row or block was left out of a statement
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    Blank,
    /// Block text did not match the ruleset's block pattern
    NoMatch,
    UnparseableDate,
    UnparseableAmount,
    /// Zero amount without an exception marker
    ZeroAmount,
}

/// Outcome of mapping a single record
#[derive(Debug, Clone, PartialEq)]
pub enum RowOutcome {
    Parsed(Box<Transaction>),
    Skipped(SkipReason),
}

/// Start, skip and end markers of a blocked-text statement
#[derive(Debug, Clone)]
pub struct BlockDelimiters {
    pub start: Regex,
    pub skip: Option<Regex>,
    pub end: Option<Regex>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum GroupState {
    Normal,
    Skipping,
}

/// Group lines into blocks, one per logical transaction.
///
/// A start line opens a new block, a skip line closes the open block and
/// discards lines until the next start line, and an end line stops
/// grouping. Lines are matched and joined trimmed; blank lines are dropped.
pub fn group_blocks<'a, I>(lines: I, delimiters: &BlockDelimiters) -> Vec<String>
where
    I: IntoIterator<Item = &'a str>,
{
    fn flush(blocks: &mut Vec<String>, block: Option<Vec<&str>>) {
        if let Some(lines) = block {
            blocks.push(lines.join(" "));
        }
    }

    let mut blocks = Vec::new();
    let mut current: Option<Vec<&str>> = None;
    let mut state = GroupState::Normal;

    for line in lines {
        let line = line.trim();
        match state {
            GroupState::Normal => {
                if delimiters.start.is_match(line) {
                    flush(&mut blocks, current.take());
                    current = Some(vec![line]);
                } else if delimiters.skip.as_ref().is_some_and(|re| re.is_match(line)) {
                    flush(&mut blocks, current.take());
                    state = GroupState::Skipping;
                } else if delimiters.end.as_ref().is_some_and(|re| re.is_match(line)) {
                    flush(&mut blocks, current.take());
                    return blocks;
                } else if let Some(block) = current.as_mut() {
                    if !line.is_empty() {
                        block.push(line);
                    }
                }
            }
            GroupState::Skipping => {
                if delimiters.start.is_match(line) {
                    current = Some(vec![line]);
                    state = GroupState::Normal;
                }
            }
        }
    }

    flush(&mut blocks, current);
    blocks
}

/// Resolve a month/day pair against the statement's base date
pub fn resolve_month_day(month: u32, day: u32, base: NaiveDate) -> Option<NaiveDate> {
    match NaiveDate::from_ymd_opt(base.year(), month, day) {
        Some(candidate) if (candidate - base).num_days() <= MONTH_DAY_GRACE_DAYS => {
            Some(candidate)
        }
        _ => NaiveDate::from_ymd_opt(base.year() - 1, month, day),
    }
}

fn month_from_name(name: &str) -> Option<u32> {
    let month = match name.get(..3)?.to_lowercase().as_str() {
        "jan" => 1,
        "feb" => 2,
        "mar" => 3,
        "apr" => 4,
        "may" => 5,
        "jun" => 6,
        "jul" => 7,
        "aug" => 8,
        "sep" => 9,
        "oct" => 10,
        "nov" => 11,
        "dec" => 12,
        _ => return None,
    };
    Some(month)
}

/// Parse a date field; `None` marks it unparseable
pub fn parse_date(value: &str, format: &DateFormat, base: NaiveDate) -> Option<NaiveDate> {
    let value = value.trim();
    if value.is_empty() {
        return None;
    }

    match format {
        DateFormat::Formats(formats) => formats
            .iter()
            .find_map(|fmt| NaiveDate::parse_from_str(value, fmt).ok()),
        DateFormat::MonthDay => {
            let parts: Vec<&str> = value
                .split(|c: char| c == '/' || c == '-' || c.is_whitespace())
                .filter(|p| !p.is_empty())
                .collect();
            if parts.len() != 2 {
                return None;
            }
            let month = parts[0]
                .parse()
                .ok()
                .or_else(|| month_from_name(parts[0]))?;
            let day = parts[1].parse().ok()?;
            resolve_month_day(month, day, base)
        }
    }
}

/// Give every transaction a deterministic id derived from its content.
///
/// Identical transactions within one statement are told apart by their
/// occurrence order, so re-importing the same statement yields the same ids.
pub fn assign_content_ids(transactions: &mut [Transaction]) {
    let mut seen: HashMap<String, usize> = HashMap::new();
    for txn in transactions.iter_mut() {
        let fingerprint = format!(
            "{}|{}|{}|{}",
            txn.account_id,
            txn.date,
            round2(&txn.amount),
            txn.description.to_lowercase()
        );
        let occurrence = seen.entry(fingerprint.clone()).or_insert(0);
        let key = format!("{}|{}", fingerprint, occurrence);
        *occurrence += 1;
        txn.id = Uuid::new_v5(&Uuid::NAMESPACE_OID, key.as_bytes()).to_string();
    }
}

#[derive(Debug)]
enum CompiledLayout {
    Delimited {
        delimiter: u8,
        header_rows: usize,
        columns: Option<Vec<String>>,
    },
    Blocked {
        delimiters: BlockDelimiters,
        block_pattern: Regex,
    },
}

/// A compiled ruleset, ready to parse statements
#[derive(Debug)]
pub struct StatementParser {
    name: String,
    identifier: Identifier,
    layout: CompiledLayout,
    fields: FieldMap,
    classifier: Classifier,
    header_date: Option<(Regex, Vec<String>)>,
    exception_markers: Vec<String>,
}

impl StatementParser {
    /// Compile a ruleset; fails on invalid patterns
    pub fn new(ruleset: &Ruleset) -> LedgerResult<Self> {
        let layout = match &ruleset.layout {
            Layout::Delimited {
                delimiter,
                header_rows,
                columns,
            } => CompiledLayout::Delimited {
                delimiter: u8::try_from(*delimiter)
                    .ok()
                    .filter(u8::is_ascii)
                    .ok_or_else(|| {
                        LedgerError::Ruleset(format!(
                            "Delimiter {:?} must be a single ASCII character",
                            delimiter
                        ))
                    })?,
                header_rows: *header_rows,
                columns: columns.clone(),
            },
            Layout::Blocked {
                start_delimiter,
                skip_delimiter,
                end_delimiter,
                block_pattern,
            } => CompiledLayout::Blocked {
                delimiters: BlockDelimiters {
                    start: compile(start_delimiter)?,
                    skip: skip_delimiter.as_deref().map(compile).transpose()?,
                    end: end_delimiter.as_deref().map(compile).transpose()?,
                },
                block_pattern: compile(block_pattern)?,
            },
        };

        let header_date = match &ruleset.header_date {
            Some(header) => {
                let pattern = compile(&header.pattern)?;
                if !pattern.capture_names().flatten().any(|name| name == "date") {
                    return Err(LedgerError::Ruleset(format!(
                        "header date pattern of '{}' has no `date` group",
                        ruleset.name
                    )));
                }
                Some((pattern, header.formats.clone()))
            }
            None => None,
        };

        Ok(Self {
            name: ruleset.name.clone(),
            identifier: ruleset.identifier.clone(),
            layout,
            fields: ruleset.fields.clone(),
            classifier: Classifier::compile(&ruleset.classifier)?,
            header_date,
            exception_markers: ruleset
                .exception_markers
                .iter()
                .map(|m| m.to_lowercase())
                .collect(),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Parse raw statement text for `account`.
    ///
    /// Fails only when the text is not recognised by the ruleset; individual
    /// bad rows are skipped and counted in [`Statement::skipped_rows`].
    pub fn parse(&self, raw: &str, account: &Account) -> LedgerResult<Statement> {
        if !self.identifier.matches(raw)? {
            return Err(LedgerError::UnrecognizedStatement(format!(
                "input does not match the {} layout",
                self.name
            )));
        }

        let base_date = self.base_date(raw);
        let (records, mut skipped_rows) = self.records(raw);

        let mut transactions = Vec::with_capacity(records.len());
        for record in &records {
            match self.map_record(record, base_date, account) {
                RowOutcome::Parsed(txn) => transactions.push(*txn),
                RowOutcome::Skipped(reason) => {
                    skipped_rows += 1;
                    debug!(ruleset = %self.name, ?reason, "Skipped statement row");
                }
            }
        }

        transactions.sort_by_key(|txn| txn.date);
        assign_content_ids(&mut transactions);

        let today = chrono::Utc::now().date_naive();
        let start_date = transactions.first().map(|t| t.date).unwrap_or(today);
        let end_date = transactions.last().map(|t| t.date).unwrap_or(today);

        debug!(
            ruleset = %self.name,
            account_id = %account.id,
            parsed = transactions.len(),
            skipped = skipped_rows,
            "Parsed statement"
        );

        Ok(Statement {
            account_id: account.id.clone(),
            start_date,
            end_date,
            transactions,
            skipped_rows,
        })
    }

    /// Date printed in the statement header, or today
    fn base_date(&self, raw: &str) -> NaiveDate {
        self.header_date
            .as_ref()
            .and_then(|(pattern, formats)| {
                let value = pattern.captures(raw)?.name("date")?.as_str().to_string();
                formats
                    .iter()
                    .find_map(|fmt| NaiveDate::parse_from_str(&value, fmt).ok())
            })
            .unwrap_or_else(|| chrono::Utc::now().date_naive())
    }

    /// Split raw text into records plus the count of blocks that could not be read
    fn records(&self, raw: &str) -> (Vec<Record>, usize) {
        match &self.layout {
            CompiledLayout::Delimited {
                delimiter,
                header_rows,
                columns,
            } => {
                let is_blank = |row: &Vec<String>| row.iter().all(|f| f.trim().is_empty());
                let mut rows = tokenize(raw, *delimiter)
                    .into_iter()
                    .skip_while(|row| is_blank(row));

                let mut header = None;
                for _ in 0..*header_rows {
                    header = rows.next();
                }
                let names: Vec<String> = columns
                    .clone()
                    .or_else(|| header.map(|h| h.iter().map(|c| c.trim().to_string()).collect()))
                    .unwrap_or_default();

                let records = rows
                    .filter(|row| !is_blank(row))
                    .map(|row| {
                        row.into_iter()
                            .enumerate()
                            .map(|(i, value)| {
                                let name = names.get(i).cloned().unwrap_or_else(|| i.to_string());
                                (name, value)
                            })
                            .collect::<Record>()
                    })
                    .collect();
                (records, 0)
            }
            CompiledLayout::Blocked {
                delimiters,
                block_pattern,
            } => {
                let mut skipped = 0;
                let mut records = Vec::new();
                for block in group_blocks(raw.lines(), delimiters) {
                    match block_pattern.captures(&block) {
                        Some(caps) => records.push(
                            block_pattern
                                .capture_names()
                                .flatten()
                                .filter_map(|name| {
                                    caps.name(name)
                                        .map(|m| (name.to_string(), m.as_str().to_string()))
                                })
                                .collect::<Record>(),
                        ),
                        None => {
                            skipped += 1;
                            debug!(
                                ruleset = %self.name,
                                reason = ?SkipReason::NoMatch,
                                %block,
                                "Skipped statement block"
                            );
                        }
                    }
                }
                (records, skipped)
            }
        }
    }

    /// Map one record onto a transaction, or say why it was skipped
    pub fn map_record(
        &self,
        record: &Record,
        base_date: NaiveDate,
        account: &Account,
    ) -> RowOutcome {
        if record.is_blank() {
            return RowOutcome::Skipped(SkipReason::Blank);
        }

        let date_field = &self.fields.date;
        let Some(date) = parse_date(record.get(&date_field.column), &date_field.format, base_date)
        else {
            return RowOutcome::Skipped(SkipReason::UnparseableDate);
        };

        let classification = self.classifier.classify(record);

        let Some(amount) = self.amount(record, classification.transaction_type) else {
            return RowOutcome::Skipped(SkipReason::UnparseableAmount);
        };

        let description = self
            .fields
            .description
            .iter()
            .map(|column| record.get(column))
            .filter(|value| !value.is_empty())
            .collect::<Vec<_>>()
            .join(" ");

        if amount == BigDecimal::from(0) && !self.is_exception(&description) {
            return RowOutcome::Skipped(SkipReason::ZeroAmount);
        }

        let mut txn = Transaction::new(
            String::new(),
            account.id.clone(),
            date,
            amount,
            description,
            classification.transaction_type,
        );
        txn.user_id = account.user_id.clone();
        txn.currency = optional(record, &self.fields.currency)
            .map(Currency::from_code)
            .unwrap_or_else(|| account.currency.clone());
        txn.category_id = classification
            .category_id
            .or_else(|| optional(record, &self.fields.category).map(str::to_string));
        txn.instrument_id = optional(record, &self.fields.instrument).map(str::to_string);
        txn.quantity = optional(record, &self.fields.quantity).and_then(parse_amount);
        txn.price = optional(record, &self.fields.price).and_then(parse_amount);

        RowOutcome::Parsed(Box::new(txn))
    }

    fn amount(&self, record: &Record, transaction_type: TransactionType) -> Option<BigDecimal> {
        match &self.fields.amount {
            AmountField::Column { column, sign } => {
                let value = parse_amount(record.get(column))?;
                Some(match sign {
                    SignRule::AsIs => value,
                    SignRule::Negate => -value,
                    SignRule::ByType => {
                        let magnitude = value.abs();
                        if transaction_type.is_outflow() {
                            -magnitude
                        } else {
                            magnitude
                        }
                    }
                })
            }
            AmountField::DebitCredit { debit, credit } => {
                let debit = parse_amount(record.get(debit));
                let credit = parse_amount(record.get(credit));
                if debit.is_none() && credit.is_none() {
                    return None;
                }
                let zero = || BigDecimal::from(0);
                Some(
                    credit.map(|c| c.abs()).unwrap_or_else(zero)
                        - debit.map(|d| d.abs()).unwrap_or_else(zero),
                )
            }
        }
    }

    fn is_exception(&self, description: &str) -> bool {
        let description = description.to_lowercase();
        self.exception_markers
            .iter()
            .any(|marker| description.contains(marker.as_str()))
    }
}

/// Non-empty value of an optional mapped column
fn optional<'r>(record: &'r Record, column: &Option<String>) -> Option<&'r str> {
    column
        .as_deref()
        .map(|c| record.get(c))
        .filter(|value| !value.is_empty())
}
