// ABOUTME: Expands a first credit-card installment into its future occurrences
// ABOUTME: Pure date rollover, description rewriting, and deterministic synthetic ids

use std::sync::OnceLock;

use chrono::{DateTime, Datelike, NaiveDate, Utc};
use regex::{Captures, Regex};
use sha2::{Digest, Sha256};

use crate::models::{CreditCardMetadata, RecordOrigin, TransactionRecord};

/// Largest installment plan that is projected; larger totals are treated as malformed.
pub const MAX_INSTALLMENTS: u32 = 120;

/// Matches "current/total" tokens such as "1/3" or "01/12".
fn installment_token() -> &'static Regex {
    static TOKEN: OnceLock<Regex> = OnceLock::new();
    TOKEN.get_or_init(|| Regex::new(r"(\d+)/(\d+)").expect("installment token pattern is valid"))
}

fn token_values(caps: &Captures<'_>) -> Option<(u32, u32)> {
    let current = caps.get(1)?.as_str().parse().ok()?;
    let total = caps.get(2)?.as_str().parse().ok()?;
    Some((current, total))
}

/// True when the text already carries a `current/total` token with these values.
pub fn has_installment_token(text: &str, current: u32, total: u32) -> bool {
    installment_token()
        .captures_iter(text)
        .any(|caps| token_values(&caps) == Some((current, total)))
}

/// Append ` - {current}/{total}` unless an equivalent token is already present.
pub fn with_installment_suffix(text: &str, current: u32, total: u32) -> String {
    if has_installment_token(text, current, total) {
        text.to_string()
    } else {
        format!("{} - {}/{}", text, current, total)
    }
}

/// Rewrite a first-installment description for installment `index`.
///
/// The first `1/total` token is renumbered in place, keeping its zero
/// padding ("01/03" becomes "02/03"). Without such a token the
/// ` - {index}/{total}` suffix is appended unless already present.
pub fn rewrite_installment(text: &str, index: u32, total: u32) -> String {
    let first = installment_token()
        .captures_iter(text)
        .find(|caps| token_values(caps) == Some((1, total)));

    let Some(caps) = first else {
        return with_installment_suffix(text, index, total);
    };
    let Some(current) = caps.get(1) else {
        return with_installment_suffix(text, index, total);
    };

    let width = current.as_str().len();
    format!(
        "{}{:0width$}{}",
        &text[..current.start()],
        index,
        &text[current.end()..],
        width = width
    )
}

/// Date of installment `index` (1-based).
///
/// Month and year come from the purchase date when it is earlier than the
/// transaction date, otherwise from the transaction date, advanced by
/// `index - 1` months. Day and time come from the transaction date, clamped
/// to the length of the target month.
pub fn installment_date(
    transaction_date: DateTime<Utc>,
    purchase_date: Option<DateTime<Utc>>,
    index: u32,
) -> Option<DateTime<Utc>> {
    let base = match purchase_date {
        Some(purchase) if purchase < transaction_date => purchase,
        _ => transaction_date,
    };

    let offset = i32::try_from(index.checked_sub(1)?).ok()?;
    let months = (base.year() * 12 + base.month0() as i32).checked_add(offset)?;
    let year = months.div_euclid(12);
    let month = months.rem_euclid(12) as u32 + 1;
    let day = transaction_date.day().min(days_in_month(year, month)?);

    let date = NaiveDate::from_ymd_opt(year, month, day)?;
    Some(date.and_time(transaction_date.time()).and_utc())
}

fn days_in_month(year: i32, month: u32) -> Option<u32> {
    let first = NaiveDate::from_ymd_opt(year, month, 1)?;
    let next = if month == 12 {
        NaiveDate::from_ymd_opt(year + 1, 1, 1)?
    } else {
        NaiveDate::from_ymd_opt(year, month + 1, 1)?
    };
    Some((next - first).num_days() as u32)
}

/// Deterministic id for installment `index` of `parent_id`.
pub fn synthetic_id(parent_id: &str, index: u32) -> String {
    let mut hasher = Sha256::new();
    hasher.update(parent_id.as_bytes());
    hasher.update(b":");
    hasher.update(index.to_string().as_bytes());
    let digest = format!("{:x}", hasher.finalize());
    format!("{}-inst-{}-{}", parent_id, index, &digest[..12])
}

/// Synthetic records for installments `2..=total` of a first installment.
///
/// Returns nothing for records that are not the first of a multi-installment plan.
pub fn expand(record: &TransactionRecord) -> Vec<TransactionRecord> {
    let Some((1, total)) = record.transaction.installment_plan() else {
        return Vec::new();
    };
    let parent = &record.transaction;
    if total > MAX_INSTALLMENTS {
        tracing::warn!(
            "Transaction {} claims {} installments (max {}), not projecting",
            parent.id,
            total,
            MAX_INSTALLMENTS
        );
        return Vec::new();
    }
    let metadata = parent.credit_card_metadata.clone().unwrap_or_default();

    let mut synthetic = Vec::with_capacity(total as usize - 1);
    for index in 2..=total {
        let Some(date) = installment_date(parent.date, metadata.purchase_date, index) else {
            tracing::warn!(
                "Cannot compute date of installment {}/{} for {}, skipping",
                index,
                total,
                parent.id
            );
            continue;
        };

        let mut transaction = parent.clone();
        transaction.id = synthetic_id(&parent.id, index);
        transaction.date = date;
        transaction.description = rewrite_installment(&parent.description, index, total);
        transaction.description_raw = parent
            .description_raw
            .as_deref()
            .map(|raw| rewrite_installment(raw, index, total));
        transaction.credit_card_metadata = Some(CreditCardMetadata {
            installment_number: Some(index),
            ..metadata.clone()
        });

        synthetic.push(TransactionRecord {
            transaction,
            account: record.account.clone(),
            origin: RecordOrigin::Projected {
                parent_id: parent.id.clone(),
                installment: index,
            },
        });
    }
    synthetic
}

/// Input records in order, followed by the synthetic installments of every
/// first installment among them.
pub fn project(records: Vec<TransactionRecord>) -> Vec<TransactionRecord> {
    let synthetic: Vec<TransactionRecord> = records
        .iter()
        .filter(|record| !record.is_projected())
        .flat_map(expand)
        .collect();

    if !synthetic.is_empty() {
        tracing::info!("Projected {} future installment(s)", synthetic.len());
    }

    let mut projected = records;
    projected.extend(synthetic);
    projected
}
