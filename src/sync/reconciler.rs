// ABOUTME: Collapses overlapping fetches into one version per logical transaction
// ABOUTME: Groups records by canonical key and keeps the most recently updated one

use std::collections::HashMap;

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;

use super::installments::with_installment_suffix;
use crate::models::TransactionRecord;

/// Identity of a logical transaction across fetches.
///
/// Provider ids are not stable across re-fetches, so identity is
/// (account, amount, UTC day, description). The description is the raw one
/// when available, with the installment suffix applied so a projected
/// installment matches its later observed counterpart. Bill ids are left out
/// because they change as statements close.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CanonicalKey {
    pub account_id: String,
    pub amount: Decimal,
    pub day: NaiveDate,
    pub description: String,
}

impl CanonicalKey {
    pub fn of(record: &TransactionRecord) -> Self {
        let transaction = &record.transaction;
        let description = match transaction.installment_plan() {
            Some((current, total)) => {
                with_installment_suffix(transaction.matching_description(), current, total)
            }
            None => transaction.matching_description().to_string(),
        };

        Self {
            account_id: transaction.account_id.clone(),
            amount: transaction.amount.normalize(),
            day: transaction.date.date_naive(),
            description: description.trim().to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReconciliationResult {
    /// One record per key, in order of each key's first appearance
    pub survivors: Vec<TransactionRecord>,
    /// Superseded records, in input order
    pub removed: Vec<TransactionRecord>,
}

impl ReconciliationResult {
    pub fn duplicates_removed(&self) -> usize {
        self.removed.len()
    }
}

struct KeyGroup {
    best: usize,
    best_updated_at: DateTime<Utc>,
}

/// Reduce records to one survivor per canonical key.
///
/// The survivor is the record with the latest `updated_at` (missing counts
/// as the epoch); on a tie the first one seen wins. Running this on its own
/// output returns the same survivors and removes nothing.
pub fn reconcile(records: Vec<TransactionRecord>) -> ReconciliationResult {
    let mut slots: HashMap<CanonicalKey, usize> = HashMap::with_capacity(records.len());
    let mut groups: Vec<KeyGroup> = Vec::new();

    for (index, record) in records.iter().enumerate() {
        let updated_at = record
            .transaction
            .updated_at
            .unwrap_or(DateTime::<Utc>::UNIX_EPOCH);

        let key = CanonicalKey::of(record);
        match slots.get(&key).copied() {
            Some(slot) => {
                let group = &mut groups[slot];
                if updated_at > group.best_updated_at {
                    group.best = index;
                    group.best_updated_at = updated_at;
                }
            }
            None => {
                slots.insert(key, groups.len());
                groups.push(KeyGroup {
                    best: index,
                    best_updated_at: updated_at,
                });
            }
        }
    }

    let mut keep = vec![false; records.len()];
    let order: Vec<usize> = groups.iter().map(|g| g.best).collect();
    for &index in &order {
        keep[index] = true;
    }

    let mut slots_by_index: Vec<Option<TransactionRecord>> = Vec::with_capacity(records.len());
    let mut removed = Vec::new();
    for (index, record) in records.into_iter().enumerate() {
        if keep[index] {
            slots_by_index.push(Some(record));
        } else {
            slots_by_index.push(None);
            removed.push(record);
        }
    }

    let survivors: Vec<TransactionRecord> = order
        .into_iter()
        .filter_map(|index| slots_by_index[index].take())
        .collect();

    if !removed.is_empty() {
        tracing::info!(
            "Reconciled {} record(s) into {}, removed {} duplicate(s)",
            survivors.len() + removed.len(),
            survivors.len(),
            removed.len()
        );
    }

    ReconciliationResult { survivors, removed }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{
        AccountContext, AccountType, CreditCardMetadata, Direction, RawTransaction, RecordOrigin,
    };
    use chrono::TimeZone;

    fn record(
        id: &str,
        description: &str,
        amount: i64,
        day: u32,
        updated_hour: Option<u32>,
    ) -> TransactionRecord {
        TransactionRecord::observed(
            RawTransaction {
                id: id.to_string(),
                date: Utc.with_ymd_and_hms(2025, 6, day, 15, 0, 0).unwrap(),
                amount: Decimal::new(amount, 2),
                amount_in_account_currency: None,
                description: description.to_string(),
                description_raw: None,
                category: None,
                direction: Direction::Debit,
                account_id: "acc-1".to_string(),
                updated_at: updated_hour
                    .map(|h| Utc.with_ymd_and_hms(2025, 6, 20, h, 0, 0).unwrap()),
                credit_card_metadata: None,
                payment_data: None,
            },
            AccountContext {
                account_id: "acc-1".to_string(),
                account_type: AccountType::Bank,
                owner_name: "Ana Souza".to_string(),
                bank_name: "Nubank".to_string(),
            },
        )
    }

    fn ids(records: &[TransactionRecord]) -> Vec<&str> {
        records.iter().map(|r| r.transaction.id.as_str()).collect()
    }

    #[test]
    fn test_later_update_wins() {
        let result = reconcile(vec![
            record("old", "Coffee", 5000, 1, Some(9)),
            record("new", "Coffee", 5000, 1, Some(10)),
        ]);
        assert_eq!(ids(&result.survivors), vec!["new"]);
        assert_eq!(ids(&result.removed), vec!["old"]);
    }

    #[test]
    fn test_tie_keeps_first_seen() {
        let result = reconcile(vec![
            record("first", "Coffee", 5000, 1, Some(9)),
            record("second", "Coffee", 5000, 1, Some(9)),
        ]);
        assert_eq!(ids(&result.survivors), vec!["first"]);
    }

    #[test]
    fn test_missing_updated_at_loses() {
        let result = reconcile(vec![
            record("unknown", "Coffee", 5000, 1, None),
            record("known", "Coffee", 5000, 1, Some(0)),
        ]);
        assert_eq!(ids(&result.survivors), vec!["known"]);
    }

    #[test]
    fn test_distinct_keys_survive_in_first_appearance_order() {
        let result = reconcile(vec![
            record("a", "Coffee", 5000, 1, Some(1)),
            record("b", "Lunch", 5000, 1, Some(1)),
            record("a2", "Coffee", 5000, 1, Some(5)),
            record("c", "Coffee", 5001, 1, Some(1)),
            record("d", "Coffee", 5000, 2, Some(1)),
        ]);
        assert_eq!(ids(&result.survivors), vec!["a2", "b", "c", "d"]);
        assert_eq!(ids(&result.removed), vec!["a"]);
    }

    #[test]
    fn test_reconcile_is_idempotent() {
        let first = reconcile(vec![
            record("a", "Coffee", 5000, 1, Some(1)),
            record("b", "Coffee", 5000, 1, Some(3)),
            record("c", "Lunch", 2000, 1, None),
            record("d", "Lunch", 2000, 1, None),
        ]);
        let second = reconcile(first.survivors.clone());
        assert_eq!(second.survivors, first.survivors);
        assert!(second.removed.is_empty());
    }

    #[test]
    fn test_raw_description_takes_precedence() {
        let mut a = record("a", "Padaria", 1000, 1, Some(1));
        a.transaction.description_raw = Some("PADARIA CENTRAL".to_string());
        let mut b = record("b", "Padaria Central", 1000, 1, Some(2));
        b.transaction.description_raw = Some("PADARIA CENTRAL".to_string());
        let result = reconcile(vec![a, b]);
        assert_eq!(ids(&result.survivors), vec!["b"]);
    }

    #[test]
    fn test_projected_installment_matches_observed_one() {
        let mut projected = record("t1-inst-2-abc", "Store X - 2/3", 10000, 1, Some(1));
        projected.origin = RecordOrigin::Projected {
            parent_id: "t1".to_string(),
            installment: 2,
        };
        projected.transaction.credit_card_metadata = Some(CreditCardMetadata {
            installment_number: Some(2),
            total_installments: Some(3),
            ..Default::default()
        });

        let mut observed = record("t2", "Store X", 10000, 1, Some(8));
        observed.transaction.credit_card_metadata = Some(CreditCardMetadata {
            installment_number: Some(2),
            total_installments: Some(3),
            bill_id: Some("bill-9".to_string()),
            ..Default::default()
        });

        assert_eq!(CanonicalKey::of(&projected), CanonicalKey::of(&observed));
        let result = reconcile(vec![projected, observed]);
        assert_eq!(ids(&result.survivors), vec!["t2"]);
    }

    #[test]
    fn test_amount_scale_does_not_split_keys() {
        let a = record("a", "Coffee", 5000, 1, Some(1));
        let mut b = record("b", "Coffee", 5000, 1, Some(2));
        b.transaction.amount = Decimal::new(50, 0);
        assert_eq!(CanonicalKey::of(&a), CanonicalKey::of(&b));
    }
}
