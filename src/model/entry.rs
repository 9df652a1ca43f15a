use crate::model::Cnpj;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One line of a cash statement as returned by the statement API, tagged with the fund that owns
/// it once it has been normalized.
///
/// Every field is optional because the API omits fields freely. The transformer decides what an
/// absent field turns into; see `pipeline::transform`.
#[derive(Default, Debug, Clone, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatementEntry {
    /// The owning fund. Never present on the wire; set by the normalizer.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entity: Option<Cnpj>,
    #[serde(rename = "titulo")]
    pub label: Option<String>,
    #[serde(rename = "tituloCp")]
    pub sub_label: Option<String>,
    #[serde(rename = "data")]
    pub date: Option<String>,
    #[serde(rename = "historico")]
    pub narrative: Option<String>,
    /// Signed balance movement. Negative is a debit.
    #[serde(rename = "saldo")]
    pub amount: Option<Decimal>,
    #[serde(rename = "tipo")]
    pub category: Option<Value>,
    #[serde(rename = "debito")]
    pub debit: Option<Value>,
    #[serde(rename = "credito")]
    pub credit: Option<Value>,
    #[serde(rename = "isDetalheTotal")]
    pub is_detail_total: Option<Value>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn test_deserialize_wire_entry() {
        let json = r#"{
            "titulo": "Resgate",
            "tituloCp": "Cota Senior",
            "data": "2024-01-05T00:00:00",
            "historico": "resgate de cotas",
            "tipo": "S",
            "debito": 150.0,
            "credito": null,
            "saldo": -150.0,
            "isDetalheTotal": false
        }"#;
        let entry: StatementEntry = serde_json::from_str(json).unwrap();
        assert_eq!(entry.entity, None);
        assert_eq!(entry.label.as_deref(), Some("Resgate"));
        assert_eq!(entry.sub_label.as_deref(), Some("Cota Senior"));
        assert_eq!(entry.amount, Some(Decimal::from_str("-150").unwrap()));
        assert_eq!(entry.is_detail_total, Some(Value::Bool(false)));
    }

    #[test]
    fn test_deserialize_sparse_entry() {
        let entry: StatementEntry = serde_json::from_str(r#"{"historico": "x"}"#).unwrap();
        assert_eq!(entry.narrative.as_deref(), Some("x"));
        assert!(entry.label.is_none());
        assert!(entry.amount.is_none());
    }
}
