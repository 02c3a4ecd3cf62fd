// ABOUTME: Domain types flowing through the export pipeline
// ABOUTME: Raw provider transactions, account context, and pipeline records

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Direction of money movement as reported by the provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Direction {
    Debit,
    Credit,
}

/// Kind of sub-account under a linked item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum AccountType {
    Bank,
    Credit,
}

impl AccountType {
    /// Enumeration order used when walking an item's sub-accounts.
    pub const ALL: [AccountType; 2] = [AccountType::Bank, AccountType::Credit];

    pub fn as_str(&self) -> &'static str {
        match self {
            AccountType::Bank => "BANK",
            AccountType::Credit => "CREDIT",
        }
    }
}

impl std::fmt::Display for AccountType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Installment details attached to credit-card charges.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreditCardMetadata {
    #[serde(default)]
    pub installment_number: Option<u32>,
    #[serde(default)]
    pub total_installments: Option<u32>,
    #[serde(default)]
    pub bill_id: Option<String>,
    #[serde(default)]
    pub purchase_date: Option<DateTime<Utc>>,
}

impl CreditCardMetadata {
    /// `(current, total)` when the charge belongs to a plan of more than one installment.
    pub fn installment_plan(&self) -> Option<(u32, u32)> {
        match (self.installment_number, self.total_installments) {
            (Some(current), Some(total)) if total > 1 => Some((current, total)),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentParticipant {
    #[serde(default)]
    pub name: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentData {
    #[serde(default)]
    pub payer: Option<PaymentParticipant>,
}

/// A transaction exactly as the provider reported it. Never mutated after decoding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawTransaction {
    pub id: String,
    pub date: DateTime<Utc>,
    pub amount: Decimal,
    /// Amount already converted to the account currency, when the provider supplies it
    #[serde(default)]
    pub amount_in_account_currency: Option<Decimal>,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub description_raw: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(rename = "type")]
    pub direction: Direction,
    pub account_id: String,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub credit_card_metadata: Option<CreditCardMetadata>,
    #[serde(default)]
    pub payment_data: Option<PaymentData>,
}

impl RawTransaction {
    /// `(current, total)` for multi-installment charges.
    pub fn installment_plan(&self) -> Option<(u32, u32)> {
        self.credit_card_metadata
            .as_ref()
            .and_then(CreditCardMetadata::installment_plan)
    }

    pub fn payer_name(&self) -> Option<&str> {
        self.payment_data
            .as_ref()
            .and_then(|data| data.payer.as_ref())
            .and_then(|payer| payer.name.as_deref())
            .filter(|name| !name.trim().is_empty())
    }

    /// Raw description when present, otherwise the display description.
    pub fn matching_description(&self) -> &str {
        match self.description_raw.as_deref() {
            Some(raw) if !raw.trim().is_empty() => raw,
            _ => &self.description,
        }
    }

    /// Amount used for display: the account-currency amount when known.
    pub fn display_amount(&self) -> Decimal {
        self.amount_in_account_currency.unwrap_or(self.amount)
    }
}

/// Static context of the sub-account a transaction was fetched from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountContext {
    pub account_id: String,
    pub account_type: AccountType,
    pub owner_name: String,
    pub bank_name: String,
}

/// Where a pipeline record came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RecordOrigin {
    /// Returned by the provider in this run.
    Observed,
    /// Derived from an observed first installment. Regenerated every run.
    Projected { parent_id: String, installment: u32 },
}

/// The unit flowing through projection, reconciliation and diffing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransactionRecord {
    pub transaction: RawTransaction,
    pub account: AccountContext,
    pub origin: RecordOrigin,
}

impl TransactionRecord {
    pub fn observed(transaction: RawTransaction, account: AccountContext) -> Self {
        Self {
            transaction,
            account,
            origin: RecordOrigin::Observed,
        }
    }

    pub fn is_projected(&self) -> bool {
        matches!(self.origin, RecordOrigin::Projected { .. })
    }
}
