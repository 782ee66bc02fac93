//! Integration tests for ledger-reconciliation

use ledger_reconciliation::{
    join_row, tokenize,
    utils::{EnhancedAccountValidator, EnhancedTransactionValidator, MemoryStorage},
    AccountKind, BalanceCheckpoint, CheckpointType, Currency, ImportOptions, Institution, Ledger,
    LedgerError, LedgerStorage, RulesetKey, RulesetRegistry, Transaction, TransactionBuilder,
    TransactionType,
};
use bigdecimal::BigDecimal;
use chrono::NaiveDate;
use std::str::FromStr;

fn dec(s: &str) -> BigDecimal {
    BigDecimal::from_str(s).unwrap()
}

fn jan(day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 1, day).unwrap()
}

fn txn(id: &str, date: NaiveDate, amount: &str) -> Transaction {
    Transaction::new(
        id.to_string(),
        String::new(),
        date,
        dec(amount),
        format!("Imported {}", id),
        TransactionType::General,
    )
}

async fn setup() -> (MemoryStorage, Ledger<MemoryStorage>) {
    let storage = MemoryStorage::new();
    let mut ledger = Ledger::new(storage.clone());
    ledger
        .create_account(
            "chk".to_string(),
            "user-1".to_string(),
            "Everyday Checking".to_string(),
            AccountKind::Checking,
            Currency::usd(),
        )
        .await
        .unwrap();
    (storage, ledger)
}

fn adjustments_on(storage: &MemoryStorage, date: NaiveDate) -> Vec<Transaction> {
    storage
        .account_transactions("chk")
        .unwrap()
        .into_iter()
        .filter(|t| t.is_adjustment_on(date))
        .collect()
}

async fn assert_valid(ledger: &Ledger<MemoryStorage>, checkpoint: BalanceCheckpoint) {
    let validated = ledger
        .validate_checkpoints("chk", vec![checkpoint])
        .await
        .unwrap();
    let validation = validated[0].validation.clone().unwrap();
    assert!(validation.is_valid);
    assert_eq!(validation.difference, BigDecimal::from(0));
}

#[tokio::test]
async fn test_reconcile_scenario_from_anchor() {
    let (storage, mut ledger) = setup().await;

    ledger
        .reconcile("chk", jan(1), dec("1000"), CheckpointType::Initial)
        .await
        .unwrap();
    ledger
        .import_batch("chk", vec![txn("rent", jan(10), "-200")], ImportOptions::default())
        .await
        .unwrap();

    let checkpoint = ledger
        .reconcile("chk", jan(15), dec("1000"), CheckpointType::Statement)
        .await
        .unwrap();
    assert_eq!(checkpoint.balance, dec("1000"));

    let adjustments = adjustments_on(&storage, jan(15));
    assert_eq!(adjustments.len(), 1);
    assert_eq!(adjustments[0].amount, dec("200.00"));
    assert_eq!(adjustments[0].transaction_type, TransactionType::Reconciliation);

    let account = ledger.get_account("chk").await.unwrap().unwrap();
    assert_eq!(account.balance, dec("1000"));
    assert_eq!(account.balance_date, Some(jan(15)));
}

#[tokio::test]
async fn test_checkpoint_invariant_over_varied_histories() {
    let histories: Vec<Vec<(&str, u32, &str)>> = vec![
        vec![],
        vec![("a", 3, "12.34")],
        vec![("a", 2, "-0.01"), ("b", 9, "1500.99"), ("c", 20, "-73.10")],
        vec![("a", 20, "0.333"), ("b", 20, "0.333"), ("c", 20, "0.334")],
    ];

    for history in histories {
        let (_storage, mut ledger) = setup().await;
        ledger
            .reconcile("chk", jan(1), dec("250"), CheckpointType::Initial)
            .await
            .unwrap();
        let batch = history
            .iter()
            .map(|(id, day, amount)| txn(id, jan(*day), amount))
            .collect();
        ledger
            .import_batch("chk", batch, ImportOptions::default())
            .await
            .unwrap();

        for target in ["0", "250", "-19.99", "1000000.01"] {
            let checkpoint = ledger
                .reconcile("chk", jan(20), dec(target), CheckpointType::Manual)
                .await
                .unwrap();
            assert_valid(&ledger, checkpoint).await;
        }
    }
}

#[tokio::test]
async fn test_re_reconciliation_is_idempotent() {
    let (storage, mut ledger) = setup().await;
    ledger
        .import_batch("chk", vec![txn("a", jan(4), "40")], ImportOptions::default())
        .await
        .unwrap();

    let first = ledger
        .reconcile("chk", jan(10), dec("100"), CheckpointType::Statement)
        .await
        .unwrap();
    let second = ledger
        .reconcile("chk", jan(10), dec("100"), CheckpointType::Statement)
        .await
        .unwrap();

    assert_eq!(first.id, second.id);
    let checkpoints = storage.list_checkpoints("chk", None).await.unwrap();
    assert_eq!(checkpoints.len(), 1);
    let adjustments = adjustments_on(&storage, jan(10));
    assert_eq!(adjustments.len(), 1);
    assert_eq!(adjustments[0].amount, dec("60"));
}

#[tokio::test]
async fn test_zero_adjustment_creates_nothing_and_cleans_up() {
    let (storage, mut ledger) = setup().await;
    ledger
        .import_batch("chk", vec![txn("a", jan(4), "75.50")], ImportOptions::default())
        .await
        .unwrap();

    ledger
        .reconcile("chk", jan(5), dec("75.50"), CheckpointType::Statement)
        .await
        .unwrap();
    assert!(adjustments_on(&storage, jan(5)).is_empty());

    ledger
        .reconcile("chk", jan(5), dec("80"), CheckpointType::Statement)
        .await
        .unwrap();
    assert_eq!(adjustments_on(&storage, jan(5)).len(), 1);

    ledger
        .reconcile("chk", jan(5), dec("75.50"), CheckpointType::Statement)
        .await
        .unwrap();
    assert!(adjustments_on(&storage, jan(5)).is_empty());
}

#[tokio::test]
async fn test_batch_dedupe_keeps_store_count() {
    let (storage, mut ledger) = setup().await;

    let summary = ledger
        .import_batch(
            "chk",
            vec![txn("x", jan(2), "1"), txn("x", jan(2), "1"), txn("y", jan(3), "2")],
            ImportOptions::default(),
        )
        .await
        .unwrap();
    assert_eq!(summary.imported_count, 2);
    assert_eq!(summary.duplicate_count, 1);
    assert_eq!(storage.transaction_count().unwrap(), 2);

    let again = ledger
        .import_batch("chk", vec![txn("x", jan(2), "1")], ImportOptions::default())
        .await
        .unwrap();
    assert_eq!(again.imported_count, 0);
    assert_eq!(again.duplicate_count, 1);
    assert_eq!(again.min_date, None);
    assert_eq!(storage.transaction_count().unwrap(), 2);

    let forced = ledger
        .import_batch(
            "chk",
            vec![txn("x", jan(2), "1")],
            ImportOptions {
                skip_duplicates: false,
            },
        )
        .await
        .unwrap();
    assert_eq!(forced.imported_count, 1);
    assert_eq!(storage.transaction_count().unwrap(), 2);
}

#[tokio::test]
async fn test_back_dated_import_refreshes_later_checkpoints() {
    let (storage, mut ledger) = setup().await;
    ledger
        .reconcile("chk", jan(10), dec("100"), CheckpointType::Statement)
        .await
        .unwrap();
    ledger
        .reconcile("chk", jan(20), dec("150"), CheckpointType::Statement)
        .await
        .unwrap();

    let summary = ledger
        .import_batch(
            "chk",
            vec![txn("late-1", jan(5), "30"), txn("late-2", jan(15), "20")],
            ImportOptions::default(),
        )
        .await
        .unwrap();
    assert_eq!(summary.min_date, Some(jan(5)));

    assert_eq!(adjustments_on(&storage, jan(10))[0].amount, dec("70"));
    assert_eq!(adjustments_on(&storage, jan(20))[0].amount, dec("30"));

    let validated = ledger.get_validated_checkpoints("chk").await.unwrap();
    assert_eq!(validated.len(), 2);
    assert!(validated
        .iter()
        .all(|cp| cp.validation.as_ref().is_some_and(|v| v.is_valid)));
}

#[tokio::test]
async fn test_refresh_abort_reports_completed_checkpoints() {
    let (storage, mut ledger) = setup().await;
    let first = ledger
        .reconcile("chk", jan(10), dec("100"), CheckpointType::Statement)
        .await
        .unwrap();
    let second = ledger
        .reconcile("chk", jan(20), dec("150"), CheckpointType::Statement)
        .await
        .unwrap();

    // Import commit and first refresh succeed, second refresh fails
    storage.fail_commits_after(2).unwrap();
    let result = ledger
        .import_batch("chk", vec![txn("late", jan(5), "30")], ImportOptions::default())
        .await;

    match result {
        Err(LedgerError::RefreshAborted {
            completed, failed, ..
        }) => {
            assert_eq!(completed, vec![first.id.clone()]);
            assert_eq!(failed, second.id.clone());
        }
        other => panic!("expected RefreshAborted, got {:?}", other),
    }

    // The import and the completed checkpoint stay applied
    assert!(storage.get_transaction("late").await.unwrap().is_some());
    assert_eq!(adjustments_on(&storage, jan(10))[0].amount, dec("70"));
    assert_eq!(adjustments_on(&storage, jan(20))[0].amount, dec("50"));

    storage.heal().unwrap();
    ledger.refresh_checkpoints("chk", jan(5)).await.unwrap();
    assert_eq!(adjustments_on(&storage, jan(20))[0].amount, dec("50"));
    let validated = ledger.get_validated_checkpoints("chk").await.unwrap();
    assert!(validated
        .iter()
        .all(|cp| cp.validation.as_ref().is_some_and(|v| v.is_valid)));
}

#[tokio::test]
async fn test_delete_checkpoint_removes_its_adjustment_only() {
    let (storage, mut ledger) = setup().await;
    ledger
        .import_batch("chk", vec![txn("a", jan(8), "5")], ImportOptions::default())
        .await
        .unwrap();
    let keep = ledger
        .reconcile("chk", jan(8), dec("10"), CheckpointType::Manual)
        .await
        .unwrap();
    let remove = ledger
        .reconcile("chk", jan(9), dec("30"), CheckpointType::Manual)
        .await
        .unwrap();

    ledger.delete_checkpoint("chk", &remove.id).await.unwrap();

    assert!(adjustments_on(&storage, jan(9)).is_empty());
    assert_eq!(adjustments_on(&storage, jan(8)).len(), 1);
    assert!(storage.get_checkpoint(&keep.id).await.unwrap().is_some());
    assert!(storage.get_checkpoint(&remove.id).await.unwrap().is_none());

    assert!(matches!(
        ledger.delete_checkpoint("other-account", &keep.id).await,
        Err(LedgerError::CheckpointNotFound(_))
    ));
}

#[tokio::test]
async fn test_validation_errors_do_not_cascade() {
    let (mut storage, mut ledger) = setup().await;
    for (day, balance) in [(1, "100"), (10, "100"), (20, "100")] {
        ledger
            .reconcile("chk", jan(day), dec(balance), CheckpointType::Statement)
            .await
            .unwrap();
    }

    // Write around the ledger so no refresh repairs the chain
    let mut batch = ledger_reconciliation::WriteBatch::new();
    let mut stray = txn("stray", jan(5), "-12.50");
    stray.account_id = "chk".to_string();
    batch.upsert_transaction(stray);
    storage.commit(batch).await.unwrap();

    let validated = ledger.get_validated_checkpoints("chk").await.unwrap();
    let results: Vec<(NaiveDate, bool)> = validated
        .iter()
        .map(|cp| (cp.date, cp.validation.as_ref().unwrap().is_valid))
        .collect();
    assert_eq!(
        results,
        vec![(jan(20), true), (jan(10), false), (jan(1), true)]
    );
    assert_eq!(
        validated[1].validation.as_ref().unwrap().difference,
        dec("-12.50")
    );
}

#[tokio::test]
async fn test_cached_balance_follows_latest_date() {
    let (_storage, mut ledger) = setup().await;
    ledger
        .reconcile("chk", jan(20), dec("300"), CheckpointType::Statement)
        .await
        .unwrap();
    ledger
        .reconcile("chk", jan(5), dec("50"), CheckpointType::Statement)
        .await
        .unwrap();

    let account = ledger.get_account("chk").await.unwrap().unwrap();
    assert_eq!(account.balance, dec("300"));
    assert_eq!(account.balance_date, Some(jan(20)));

    ledger
        .reconcile("chk", jan(20), dec("310"), CheckpointType::Statement)
        .await
        .unwrap();
    let account = ledger.get_account("chk").await.unwrap().unwrap();
    assert_eq!(account.balance, dec("310"));
}

#[tokio::test]
async fn test_statement_import_end_to_end() {
    let (storage, mut ledger) = setup().await;
    let statement = "\
NAVY FEDERAL CREDIT UNION
Statement Period 12/15/23 - 01/14/24
12/20 POS Debit 45.12 1,154.88
      WHOLE FOODS MKT #123
12/28 Deposit 1,200.00 2,354.88
Page 1 of 2
Continued on next page
01/03 Dividend 0.52 2,355.40
01/05 Withdrawal 200.00 2,155.40
01/09 Transfer To Savings 1,200.00 955.40
Ending Balance 955.40
";
    let key = RulesetKey::new(Institution::NavyFederal, AccountKind::Checking);

    let first = ledger
        .import_statement_into(statement, &key, "chk")
        .await
        .unwrap();
    assert_eq!(first.summary.imported_count, 5);
    assert_eq!(first.summary.min_date, NaiveDate::from_ymd_opt(2023, 12, 20));
    assert_eq!(first.end_date, jan(9));

    let second = ledger
        .import_statement_into(statement, &key, "chk")
        .await
        .unwrap();
    assert_eq!(second.summary.imported_count, 0);
    assert_eq!(second.summary.duplicate_count, 5);
    assert_eq!(storage.transaction_count().unwrap(), 5);

    let checkpoint = ledger
        .reconcile("chk", jan(14), dec("955.40"), CheckpointType::Statement)
        .await
        .unwrap();
    assert_eq!(adjustments_on(&storage, jan(14))[0].amount, dec("1200.00"));
    assert_valid(&ledger, checkpoint).await;

    let wrong = RulesetKey::new(Institution::Chase, AccountKind::Checking);
    assert!(matches!(
        ledger.import_statement(statement, &wrong, "chk").await,
        Err(LedgerError::UnrecognizedStatement(_))
    ));
}

#[tokio::test]
async fn test_custom_ruleset_from_json() {
    let json = r#"[{
        "key": {"institution": {"Custom": "Credit Union"}, "account_kind": "Savings"},
        "ruleset": {
            "name": "Credit union savings",
            "identifier": {"kind": "contains", "value": "Date|Memo|Debit|Credit"},
            "layout": {"mode": "delimited", "delimiter": "|", "header_rows": 1},
            "fields": {
                "date": {"column": "Date", "format": {"kind": "formats", "value": ["%Y-%m-%d"]}},
                "amount": {"kind": "debit_credit", "debit": "Debit", "credit": "Credit"},
                "description": ["Memo"]
            },
            "classifier": {
                "type_field": "Memo",
                "rules": [
                    {
                        "pattern": {"kind": "contains", "value": "interest"},
                        "transaction_type": "Interest"
                    },
                    {
                        "pattern": {"kind": "regex", "value": "^xfer"},
                        "transaction_type": "Transfer",
                        "category_id": "transfers"
                    }
                ],
                "fallback": "General"
            }
        }
    }]"#;

    let mut registry = RulesetRegistry::builtin();
    registry.load_json(json).unwrap();
    let mut ledger = Ledger::new(MemoryStorage::new()).with_registry(registry);
    ledger
        .create_account(
            "sav".to_string(),
            "user-1".to_string(),
            "Savings".to_string(),
            AccountKind::Savings,
            Currency::usd(),
        )
        .await
        .unwrap();

    let raw = "Date|Memo|Debit|Credit\n\
               2024-02-29|Interest paid||1.25\n\
               2024-03-01|XFER to checking|100.00|\n";
    let key = RulesetKey::new(
        Institution::Custom("Credit Union".to_string()),
        AccountKind::Savings,
    );
    let statement = ledger.import_statement(raw, &key, "sav").await.unwrap();

    assert_eq!(statement.transactions.len(), 2);
    assert_eq!(statement.transactions[0].transaction_type, TransactionType::Interest);
    assert_eq!(statement.transactions[0].amount, dec("1.25"));
    assert_eq!(statement.transactions[1].transaction_type, TransactionType::Transfer);
    assert_eq!(statement.transactions[1].amount, dec("-100"));
    assert_eq!(
        statement.transactions[1].category_id.as_deref(),
        Some("transfers")
    );
}

#[tokio::test]
async fn test_delete_account_cascades() {
    let (storage, mut ledger) = setup().await;
    ledger
        .import_batch("chk", vec![txn("a", jan(2), "9")], ImportOptions::default())
        .await
        .unwrap();
    let checkpoint = ledger
        .reconcile("chk", jan(3), dec("10"), CheckpointType::Manual)
        .await
        .unwrap();

    ledger.delete_account("chk").await.unwrap();

    assert!(ledger.get_account("chk").await.unwrap().is_none());
    assert_eq!(storage.transaction_count().unwrap(), 0);
    assert!(storage.get_checkpoint(&checkpoint.id).await.unwrap().is_none());
    assert!(matches!(
        ledger.reconcile("chk", jan(4), dec("1"), CheckpointType::Manual).await,
        Err(LedgerError::AccountNotFound(_))
    ));
}

#[tokio::test]
async fn test_enhanced_validators() {
    let mut ledger = Ledger::with_validators(
        MemoryStorage::new(),
        Box::new(EnhancedAccountValidator),
        Box::new(EnhancedTransactionValidator),
    );

    let bad_account = ledger
        .create_account(
            "bad id".to_string(),
            "user-1".to_string(),
            "Brokerage".to_string(),
            AccountKind::Brokerage,
            Currency::usd(),
        )
        .await;
    assert!(matches!(bad_account, Err(LedgerError::Validation(_))));

    ledger
        .create_account(
            "brk".to_string(),
            "user-1".to_string(),
            "Brokerage".to_string(),
            AccountKind::Brokerage,
            Currency::usd(),
        )
        .await
        .unwrap();

    let zero = TransactionBuilder::new("brk".to_string(), jan(2), dec("0"), "Nothing".to_string())
        .build()
        .unwrap();
    assert!(ledger.record_transaction(zero).await.is_err());

    let trade = TransactionBuilder::new("brk".to_string(), jan(2), dec("-481"), "Buy".to_string())
        .trade("VTI".to_string(), dec("2"), dec("240.50"))
        .build()
        .unwrap();
    let recorded = ledger.record_transaction(trade).await.unwrap();
    assert_eq!(recorded.user_id, "user-1");
}

#[test]
fn test_tokenizer_properties() {
    assert_eq!(
        tokenize(r#"a,"b,c","d""e""#, b','),
        vec![vec!["a".to_string(), "b,c".to_string(), "d\"e".to_string()]]
    );

    let fields: Vec<String> = ["01/05/2024", "COFFEE SHOP", "-4.50", ""]
        .iter()
        .map(|s| s.to_string())
        .collect();
    for delimiter in [b',', b';', b'\t', b'|'] {
        assert_eq!(tokenize(&join_row(&fields, delimiter), delimiter), vec![fields.clone()]);
    }
}
