use super::transaction::{SettlementRecord, TransactionId};
use super::twin::{Balance, TwinId, TwinRecord};
use crate::error::Result;
use async_trait::async_trait;

/// Get/patch-by-id access to digital twins.
#[async_trait]
pub trait TwinStore: Send + Sync {
    async fn get_twin(&self, id: &TwinId) -> Result<TwinRecord>;

    /// Replaces `liquidityBalance` on the twin. When `etag` is given the write
    /// only applies if the twin has not changed since it was read.
    async fn update_liquidity_balance(
        &self,
        id: &TwinId,
        balance: Balance,
        etag: Option<&str>,
    ) -> Result<()>;
}

/// Remembers which transactions have already been settled.
#[async_trait]
pub trait SettlementLedger: Send + Sync {
    async fn record(&self, record: SettlementRecord) -> Result<()>;
    async fn get(&self, tx_id: &TransactionId) -> Result<Option<SettlementRecord>>;
    async fn contains(&self, tx_id: &TransactionId) -> Result<bool> {
        Ok(self.get(tx_id).await?.is_some())
    }
}

/// One message pulled from the stream.
#[derive(Debug, Clone, PartialEq)]
pub struct EventMessage {
    pub body: Vec<u8>,
    pub partition: Option<i32>,
    pub offset: Option<i64>,
}

impl EventMessage {
    pub fn new(body: impl Into<Vec<u8>>) -> Self {
        Self {
            body: body.into(),
            partition: None,
            offset: None,
        }
    }
}

/// Delivers transaction messages one at a time.
#[async_trait]
pub trait EventSource: Send {
    /// Returns `None` once the stream is exhausted.
    async fn next_event(&mut self) -> Result<Option<EventMessage>>;

    /// Marks a message as handled so it is not delivered again.
    async fn acknowledge(&mut self, _message: &EventMessage) -> Result<()> {
        Ok(())
    }
}

pub type TwinStoreBox = Box<dyn TwinStore>;
pub type SettlementLedgerBox = Box<dyn SettlementLedger>;
pub type EventSourceBox = Box<dyn EventSource>;
