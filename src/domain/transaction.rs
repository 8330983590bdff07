use super::twin::{Amount, Balance, TwinId};
use crate::error::{Result, SettlementError};
use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TransactionId(String);

impl TransactionId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TransactionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A transaction message as it arrives on the stream, before validation.
#[derive(Debug, Default, Deserialize, PartialEq, Clone)]
#[serde(rename_all = "camelCase")]
pub struct TransactionEvent {
    #[serde(default, deserialize_with = "deserialize_id")]
    pub transaction_id: Option<String>,
    #[serde(default, deserialize_with = "deserialize_id")]
    pub sender_id: Option<String>,
    #[serde(default, deserialize_with = "deserialize_id")]
    pub receiver_id: Option<String>,
    #[serde(default)]
    pub amount: Option<Decimal>,
}

/// Accepts ids sent either as JSON strings or as integers.
fn deserialize_id<'de, D>(deserializer: D) -> std::result::Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<serde_json::Value>::deserialize(deserializer)? {
        None | Some(serde_json::Value::Null) => Ok(None),
        Some(serde_json::Value::String(s)) => Ok(Some(s)),
        Some(serde_json::Value::Number(n)) => Ok(Some(n.to_string())),
        Some(other) => Err(serde::de::Error::custom(format!(
            "expected string or number id, got {}",
            other
        ))),
    }
}

impl TransactionEvent {
    /// Decodes a raw message body (UTF-8 JSON object).
    pub fn decode(body: &[u8]) -> Result<Self> {
        let text = std::str::from_utf8(body).map_err(|_| {
            SettlementError::ValidationError("message body is not valid UTF-8".to_string())
        })?;
        Ok(serde_json::from_str(text)?)
    }

    /// Checks presence of every required field and produces a [`Transaction`].
    pub fn validate(self) -> Result<Transaction> {
        let transaction_id = required(self.transaction_id, "transactionId")?;
        let sender_id = required(self.sender_id, "senderId")?;
        let receiver_id = required(self.receiver_id, "receiverId")?;
        let amount = match self.amount {
            Some(value) if !value.is_zero() => Amount::new(value)?,
            _ => {
                return Err(SettlementError::ValidationError(
                    "missing amount".to_string(),
                ));
            }
        };

        if sender_id == receiver_id {
            return Err(SettlementError::ValidationError(
                "sender and receiver must differ".to_string(),
            ));
        }

        Ok(Transaction {
            transaction_id: TransactionId::new(transaction_id),
            sender_id: TwinId::new(sender_id),
            receiver_id: TwinId::new(receiver_id),
            amount,
        })
    }
}

fn required(value: Option<String>, field: &str) -> Result<String> {
    match value {
        Some(v) if !v.is_empty() => Ok(v),
        _ => Err(SettlementError::ValidationError(format!("missing {}", field))),
    }
}

/// A validated transfer of `amount` from `sender_id` to `receiver_id`.
#[derive(Debug, PartialEq, Clone)]
pub struct Transaction {
    pub transaction_id: TransactionId,
    pub sender_id: TwinId,
    pub receiver_id: TwinId,
    pub amount: Amount,
}

/// What the ledger keeps for every settled transaction.
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
#[serde(rename_all = "camelCase")]
pub struct SettlementRecord {
    pub transaction_id: TransactionId,
    pub sender_id: TwinId,
    pub receiver_id: TwinId,
    pub amount: Amount,
    pub sender_balance: Balance,
    pub receiver_balance: Balance,
}
