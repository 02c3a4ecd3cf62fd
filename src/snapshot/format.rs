// ABOUTME: Fixed-column snapshot row and its byte-stable CSV rendering
// ABOUTME: Labels, date and amount formatting shared by the writer and the differ

use std::io::Write;

use chrono::Datelike;
use rust_decimal::{Decimal, RoundingStrategy};

use crate::config::ExportConfig;
use crate::models::{AccountType, Direction, TransactionRecord};
use crate::sync::installments::with_installment_suffix;

/// Column headers, in output order.
pub const HEADER: [&str; 9] = [
    "Classificação",
    "Data",
    "Descrição",
    "Valor",
    "Categoria",
    "Dono",
    "Banco",
    "Conta",
    "Recorrente?",
];

pub const DEBIT_LABEL: &str = "Saída";
pub const CREDIT_LABEL: &str = "Entrada";
pub const BANK_ACCOUNT_LABEL: &str = "Conta Corrente";
pub const CREDIT_CARD_LABEL: &str = "Cartão de Crédito";
pub const RECURRING_LABEL: &str = "Sim";
pub const NOT_RECURRING_LABEL: &str = "Não";

/// One exported line.
///
/// Two rows describe the same output iff all fields are equal, which is what
/// the differ relies on. Changing any formatter here breaks comparison with
/// snapshots written earlier.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SnapshotRow {
    pub classification: String,
    pub date: String,
    pub description: String,
    pub amount: String,
    pub category: String,
    pub owner: String,
    pub bank: String,
    pub account_type: String,
    pub recurring: String,
}

impl SnapshotRow {
    pub fn from_record(record: &TransactionRecord, config: &ExportConfig) -> Self {
        let transaction = &record.transaction;
        Self {
            classification: classification(transaction.direction).to_string(),
            date: format_date(transaction.date),
            description: format_description(record),
            amount: format_amount(transaction.display_amount()),
            category: config.category_label(transaction.category.as_deref()),
            owner: format_owner(&record.account.owner_name),
            bank: record.account.bank_name.clone(),
            account_type: account_type_label(record.account.account_type).to_string(),
            recurring: if transaction.installment_plan().is_some() {
                RECURRING_LABEL
            } else {
                NOT_RECURRING_LABEL
            }
            .to_string(),
        }
    }

    /// Fields in column order, for CSV writers and other sinks.
    pub fn to_record(&self) -> [&str; 9] {
        [
            self.classification.as_str(),
            self.date.as_str(),
            self.description.as_str(),
            self.amount.as_str(),
            self.category.as_str(),
            self.owner.as_str(),
            self.bank.as_str(),
            self.account_type.as_str(),
            self.recurring.as_str(),
        ]
    }

    /// Rebuild a row from a CSV record; `None` when the column count differs.
    pub fn from_fields(fields: &csv::StringRecord) -> Option<Self> {
        if fields.len() != HEADER.len() {
            return None;
        }
        let field = |i: usize| fields.get(i).unwrap_or_default().to_string();
        Some(Self {
            classification: field(0),
            date: field(1),
            description: field(2),
            amount: field(3),
            category: field(4),
            owner: field(5),
            bank: field(6),
            account_type: field(7),
            recurring: field(8),
        })
    }
}

pub fn classification(direction: Direction) -> &'static str {
    match direction {
        Direction::Debit => DEBIT_LABEL,
        Direction::Credit => CREDIT_LABEL,
    }
}

pub fn account_type_label(account_type: AccountType) -> &'static str {
    match account_type {
        AccountType::Bank => BANK_ACCOUNT_LABEL,
        AccountType::Credit => CREDIT_CARD_LABEL,
    }
}

/// `YYYY/M/D` of the UTC calendar day, no zero padding.
pub fn format_date(date: chrono::DateTime<chrono::Utc>) -> String {
    format!("{}/{}/{}", date.year(), date.month(), date.day())
}

/// Absolute value with exactly two decimals.
pub fn format_amount(amount: Decimal) -> String {
    let rounded = amount
        .abs()
        .round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero);
    format!("{:.2}", rounded)
}

/// First and last name of the account owner.
pub fn format_owner(owner: &str) -> String {
    let names: Vec<&str> = owner.split_whitespace().collect();
    match names.as_slice() {
        [] => String::new(),
        [only] => only.to_string(),
        [first, .., last] => format!("{} {}", first, last),
    }
}

/// Display description with installment position and payer appended.
pub fn format_description(record: &TransactionRecord) -> String {
    let transaction = &record.transaction;
    let mut description = match transaction.installment_plan() {
        Some((current, total)) => {
            with_installment_suffix(&transaction.description, current, total)
        }
        None => transaction.description.clone(),
    };

    if let Some(payer) = transaction.payer_name() {
        description = format!("{} - {}", description, payer);
    }
    description
}

/// CSV writer configured for snapshot output: every field quoted, `\n` line ends.
pub fn snapshot_writer<W: Write>(inner: W) -> csv::Writer<W> {
    csv::WriterBuilder::new()
        .quote_style(csv::QuoteStyle::Always)
        .terminator(csv::Terminator::Any(b'\n'))
        .from_writer(inner)
}

/// Header and rows written to any sink.
pub fn write_rows<W: Write>(inner: W, rows: &[SnapshotRow]) -> Result<W, csv::Error> {
    let mut writer = snapshot_writer(inner);
    writer.write_record(HEADER)?;
    for row in rows {
        writer.write_record(row.to_record())?;
    }
    writer
        .into_inner()
        .map_err(|e| csv::Error::from(std::io::Error::new(e.error().kind(), e.to_string())))
}
