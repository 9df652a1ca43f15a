use crate::model::Cnpj;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Whether a movement credits or debits the fund's account. Stored as `C`, `D`, or an empty
/// string when the statement carried no amount.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Polarity {
    #[serde(rename = "C")]
    Credit,
    #[serde(rename = "D")]
    Debit,
    #[default]
    #[serde(rename = "")]
    Unknown,
}

serde_plain::derive_display_from_serialize!(Polarity);
serde_plain::derive_fromstr_from_deserialize!(Polarity);

impl Polarity {
    /// `C` for zero and positive amounts, `D` for negative amounts.
    pub fn of(amount: Decimal) -> Self {
        if amount >= Decimal::ZERO {
            Polarity::Credit
        } else {
            Polarity::Debit
        }
    }
}

/// A statement entry after derivation, shaped like a row of the movements table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct TransformedRecord {
    /// `YYYY-MM-DD`, or empty when the statement carried no date.
    pub position_date: String,
    pub entity: Cnpj,
    /// Upper-cased narrative text of the movement.
    pub entry_text: String,
    /// Magnitude of the movement. `polarity` recovers the sign.
    pub total_value: Option<Decimal>,
    pub polarity: Polarity,
    pub memo: String,
    pub reference_id: i64,
    pub transaction_tag: String,
}

impl TransformedRecord {
    /// The signed amount, recovered from `total_value` and `polarity`.
    pub fn signed_value(&self) -> Option<Decimal> {
        self.total_value.map(|v| match self.polarity {
            Polarity::Debit => -v,
            _ => v,
        })
    }
}
