use crate::error::{Result, SettlementError};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// JSON-Patch path of the only twin property this crate touches.
pub const LIQUIDITY_BALANCE_PATH: &str = "/liquidityBalance";

/// Represents a liquidity balance held by a twin.
///
/// This is a wrapper around `rust_decimal::Decimal` so balances and amounts
/// cannot be mixed up by accident.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Default, Serialize, Deserialize)]
pub struct Balance(pub Decimal);

/// Represents a positive amount to be transferred.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Serialize, Deserialize)]
pub struct Amount(Decimal);

impl Amount {
    pub fn new(value: Decimal) -> Result<Self> {
        if value > Decimal::ZERO {
            Ok(Self(value))
        } else {
            Err(SettlementError::ValidationError(
                "Amount must be positive".to_string(),
            ))
        }
    }

    pub fn value(&self) -> Decimal {
        self.0
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

impl Balance {
    pub const ZERO: Self = Self(Decimal::ZERO);

    pub fn new(amount: Decimal) -> Self {
        Self(amount)
    }

    pub fn covers(&self, amount: Amount) -> bool {
        self.0 >= amount.0
    }

    /// Balance after receiving `amount`, or `BalanceOverflow` if it does not fit.
    pub fn credit(self, amount: Amount) -> Result<Self> {
        self.0
            .checked_add(amount.0)
            .map(Self)
            .ok_or_else(|| SettlementError::BalanceOverflow(format!("{} + {}", self, amount)))
    }

    /// Balance after paying out `amount`, or `BalanceOverflow` if it does not fit.
    pub fn debit(self, amount: Amount) -> Result<Self> {
        self.0
            .checked_sub(amount.0)
            .map(Self)
            .ok_or_else(|| SettlementError::BalanceOverflow(format!("{} - {}", self, amount)))
    }
}

impl fmt::Display for Balance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

/// Identifier of a digital twin (`$dtId`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TwinId(String);

impl TwinId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TwinId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// The slice of a digital twin this crate cares about.
///
/// Twins carry arbitrary other properties; they are ignored on read and never
/// written back.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TwinRecord {
    #[serde(rename = "$dtId")]
    pub id: TwinId,
    #[serde(rename = "$etag", default, skip_serializing_if = "Option::is_none")]
    pub etag: Option<String>,
    #[serde(rename = "liquidityBalance", default)]
    pub liquidity_balance: Option<Balance>,
}

impl TwinRecord {
    pub fn new(id: TwinId, liquidity_balance: Balance) -> Self {
        Self {
            id,
            etag: None,
            liquidity_balance: Some(liquidity_balance),
        }
    }

    /// Returns the liquidity balance, failing if the twin does not carry one.
    pub fn balance(&self) -> Result<Balance> {
        self.liquidity_balance
            .ok_or_else(|| SettlementError::MissingBalance(self.id.to_string()))
    }
}

/// A single JSON-Patch operation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PatchOperation {
    pub op: &'static str,
    pub path: &'static str,
    #[serde(with = "rust_decimal::serde::float")]
    pub value: Decimal,
}

/// Builds the patch document replacing `liquidityBalance` with `balance`.
pub fn balance_patch(balance: Balance) -> Vec<PatchOperation> {
    vec![PatchOperation {
        op: "replace",
        path: LIQUIDITY_BALANCE_PATH,
        value: balance.0,
    }]
}
