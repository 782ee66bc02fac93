//! Import a card statement, reconcile it, then fix history with a late import

use bigdecimal::BigDecimal;
use chrono::NaiveDate;
use ledger_reconciliation::utils::MemoryStorage;
use ledger_reconciliation::{
    AccountKind, CheckpointType, Currency, ImportOptions, Institution, Ledger, RulesetKey,
    Transaction, TransactionType,
};
use std::str::FromStr;

const CARD_STATEMENT: &str = "\
Transaction Date,Post Date,Description,Category,Type,Amount,Memo
01/03/2024,01/04/2024,AMAZON MKTP US,Shopping,Sale,-23.99,
01/05/2024,01/06/2024,BLUE BOTTLE COFFEE,Food & Drink,Sale,-6.25,
01/07/2024,01/07/2024,Payment Thank You - Web,,Payment,0.00,
01/08/2024,01/08/2024,AUTHORIZATION HOLD,,Sale,0.00,
01/12/2024,01/13/2024,AMAZON MKTP US,Shopping,Return,23.99,
01/15/2024,01/15/2024,Payment Thank You - Web,,Payment,150.00,
";

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    println!("Ledger Reconciliation - Import and Reconcile Example\n");

    let storage = MemoryStorage::new();
    let mut ledger = Ledger::new(storage.clone());

    let card = ledger
        .create_account(
            "sapphire".to_string(),
            "user-1".to_string(),
            "Sapphire Preferred".to_string(),
            AccountKind::CreditCard,
            Currency::usd(),
        )
        .await?;
    println!("Created account: {} ({:?})", card.name, card.account_kind);

    // 1. Parse and import the statement
    let key = RulesetKey::new(Institution::Chase, AccountKind::CreditCard);
    let statement = ledger.import_statement(CARD_STATEMENT, &key, &card.id).await?;
    println!(
        "\nParsed {} transactions ({} rows skipped) from {} to {}",
        statement.transactions.len(),
        statement.skipped_rows,
        statement.start_date,
        statement.end_date
    );
    for txn in &statement.transactions {
        println!(
            "  {}  {:>10}  {:<12} {}",
            txn.date,
            txn.amount,
            txn.transaction_type.to_string(),
            txn.description
        );
    }

    let imported = ledger
        .import_statement_into(CARD_STATEMENT, &key, &card.id)
        .await?;
    println!(
        "Imported {} new, {} duplicates",
        imported.summary.imported_count, imported.summary.duplicate_count
    );

    // 2. Reconcile against the closing balance printed on the statement
    let closing = NaiveDate::from_ymd_opt(2024, 1, 31).ok_or("invalid date")?;
    let checkpoint = ledger
        .reconcile(
            &card.id,
            closing,
            BigDecimal::from_str("-1200.00")?,
            CheckpointType::Statement,
        )
        .await?;
    println!("\nCheckpoint at {}: {}", checkpoint.date, checkpoint.balance);
    print_adjustment(&storage, &card.id, closing)?;

    // 3. A purchase that was missing from the export arrives later
    let late = Transaction::new(
        "late-furniture".to_string(),
        card.id.clone(),
        NaiveDate::from_ymd_opt(2024, 1, 20).ok_or("invalid date")?,
        BigDecimal::from_str("-1299.00")?,
        "WEST ELM #552".to_string(),
        TransactionType::Withdrawal,
    );
    let summary = ledger
        .import_batch(&card.id, vec![late], ImportOptions::default())
        .await?;
    println!(
        "\nLate import: {} new, earliest {:?}",
        summary.imported_count, summary.min_date
    );
    print_adjustment(&storage, &card.id, closing)?;

    // 4. Audit the checkpoint chain
    println!("\nValidated checkpoints:");
    for cp in ledger.get_validated_checkpoints(&card.id).await? {
        if let Some(validation) = cp.validation {
            println!(
                "  {}  balance {}  valid {}  difference {}",
                cp.date, cp.balance, validation.is_valid, validation.difference
            );
        }
    }

    if let Some(account) = ledger.get_account(&card.id).await? {
        println!(
            "\nCached balance: {} as of {:?}",
            account.balance, account.balance_date
        );
    }

    Ok(())
}

fn print_adjustment(
    storage: &MemoryStorage,
    account_id: &str,
    date: NaiveDate,
) -> Result<(), Box<dyn std::error::Error>> {
    let adjustment = storage
        .account_transactions(account_id)?
        .into_iter()
        .find(|t| t.is_adjustment_on(date));
    match adjustment {
        Some(txn) => println!("  Adjustment: {} ({})", txn.amount, txn.description),
        None => println!("  No adjustment needed"),
    }
    Ok(())
}
