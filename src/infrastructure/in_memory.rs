use crate::domain::ports::{SettlementLedger, TwinStore};
use crate::domain::transaction::{SettlementRecord, TransactionId};
use crate::domain::twin::{Balance, TwinId, TwinRecord};
use crate::error::{Result, SettlementError};
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::RwLock;

/// A remote call observed by [`InMemoryTwinStore`].
#[derive(Debug, Clone, PartialEq)]
pub enum TwinCall {
    Get(TwinId),
    Update(TwinId, Balance),
}

/// A thread-safe in-memory twin store.
///
/// Behaves like the remote store: every successful update bumps the twin's
/// etag, and an update carrying a stale etag is refused. It also keeps a log of
/// every call so tests can assert on remote traffic, and can be told to fail
/// updates for chosen twins.
#[derive(Default, Clone)]
pub struct InMemoryTwinStore {
    twins: Arc<RwLock<HashMap<TwinId, TwinRecord>>>,
    calls: Arc<RwLock<Vec<TwinCall>>>,
    failing_updates: Arc<RwLock<HashSet<TwinId>>>,
}

impl InMemoryTwinStore {
    /// Creates a new, empty in-memory twin store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts or replaces a twin with the given balance.
    pub async fn insert(&self, id: impl Into<String>, balance: Balance) {
        let id = TwinId::new(id);
        let mut record = TwinRecord::new(id.clone(), balance);
        record.etag = Some(etag_for(0));
        self.twins.write().await.insert(id, record);
    }

    /// Inserts a raw twin record as-is.
    pub async fn insert_record(&self, record: TwinRecord) {
        self.twins.write().await.insert(record.id.clone(), record);
    }

    /// Current balance of a twin, without logging a call.
    pub async fn balance_of(&self, id: &str) -> Option<Balance> {
        self.twins
            .read()
            .await
            .get(&TwinId::new(id))
            .and_then(|twin| twin.liquidity_balance)
    }

    /// Makes every later update to `id` fail.
    pub async fn fail_updates_for(&self, id: impl Into<String>) {
        self.failing_updates.write().await.insert(TwinId::new(id));
    }

    pub async fn calls(&self) -> Vec<TwinCall> {
        self.calls.read().await.clone()
    }

    pub async fn update_count(&self) -> usize {
        self.calls
            .read()
            .await
            .iter()
            .filter(|call| matches!(call, TwinCall::Update(..)))
            .count()
    }
}

fn etag_for(version: u64) -> String {
    format!("W/\"{}\"", version)
}

#[async_trait]
impl TwinStore for InMemoryTwinStore {
    async fn get_twin(&self, id: &TwinId) -> Result<TwinRecord> {
        self.calls.write().await.push(TwinCall::Get(id.clone()));
        let twins = self.twins.read().await;
        twins
            .get(id)
            .cloned()
            .ok_or_else(|| SettlementError::TwinNotFound(id.to_string()))
    }

    async fn update_liquidity_balance(
        &self,
        id: &TwinId,
        balance: Balance,
        etag: Option<&str>,
    ) -> Result<()> {
        self.calls
            .write()
            .await
            .push(TwinCall::Update(id.clone(), balance));

        if self.failing_updates.read().await.contains(id) {
            return Err(SettlementError::RemoteStatus {
                status: 503,
                body: format!("update of {} unavailable", id),
            });
        }

        let mut twins = self.twins.write().await;
        let twin = twins
            .get_mut(id)
            .ok_or_else(|| SettlementError::TwinNotFound(id.to_string()))?;

        if let Some(expected) = etag
            && twin.etag.as_deref() != Some(expected)
        {
            return Err(SettlementError::PreconditionFailed(id.to_string()));
        }

        let version = twin
            .etag
            .as_deref()
            .and_then(|tag| tag.trim_start_matches("W/").trim_matches('"').parse::<u64>().ok())
            .unwrap_or(0);
        twin.liquidity_balance = Some(balance);
        twin.etag = Some(etag_for(version + 1));
        Ok(())
    }
}

/// A thread-safe in-memory settlement ledger.
///
/// Only remembers settlements for the lifetime of the process.
#[derive(Default, Clone)]
pub struct InMemorySettlementLedger {
    records: Arc<RwLock<HashMap<TransactionId, SettlementRecord>>>,
}

impl InMemorySettlementLedger {
    /// Creates a new, empty in-memory ledger.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SettlementLedger for InMemorySettlementLedger {
    async fn record(&self, record: SettlementRecord) -> Result<()> {
        let mut records = self.records.write().await;
        records.insert(record.transaction_id.clone(), record);
        Ok(())
    }

    async fn get(&self, tx_id: &TransactionId) -> Result<Option<SettlementRecord>> {
        let records = self.records.read().await;
        Ok(records.get(tx_id).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::twin::Amount;
    use rust_decimal_macros::dec;

    #[tokio::test]
    async fn test_in_memory_twin_store() {
        let store = InMemoryTwinStore::new();
        store.insert("bank-a", Balance::new(dec!(100))).await;

        let twin = store.get_twin(&TwinId::new("bank-a")).await.unwrap();
        assert_eq!(twin.balance().unwrap(), Balance::new(dec!(100)));

        assert!(matches!(
            store.get_twin(&TwinId::new("bank-z")).await,
            Err(SettlementError::TwinNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_update_bumps_etag() {
        let store = InMemoryTwinStore::new();
        store.insert("bank-a", Balance::new(dec!(100))).await;
        let id = TwinId::new("bank-a");

        let before = store.get_twin(&id).await.unwrap();
        store
            .update_liquidity_balance(&id, Balance::new(dec!(60)), before.etag.as_deref())
            .await
            .unwrap();

        let after = store.get_twin(&id).await.unwrap();
        assert_eq!(after.balance().unwrap(), Balance::new(dec!(60)));
        assert_ne!(after.etag, before.etag);

        // Writing with the old etag must be refused.
        let stale = store
            .update_liquidity_balance(&id, Balance::new(dec!(0)), before.etag.as_deref())
            .await;
        assert!(matches!(stale, Err(SettlementError::PreconditionFailed(_))));
        assert_eq!(store.balance_of("bank-a").await, Some(Balance::new(dec!(60))));
    }

    #[tokio::test]
    async fn test_injected_update_failure() {
        let store = InMemoryTwinStore::new();
        store.insert("bank-a", Balance::new(dec!(100))).await;
        store.fail_updates_for("bank-a").await;

        let result = store
            .update_liquidity_balance(&TwinId::new("bank-a"), Balance::new(dec!(1)), None)
            .await;
        assert!(matches!(result, Err(SettlementError::RemoteStatus { status: 503, .. })));
        assert_eq!(store.balance_of("bank-a").await, Some(Balance::new(dec!(100))));
        assert_eq!(store.update_count().await, 1);
    }

    #[tokio::test]
    async fn test_in_memory_ledger() {
        let ledger = InMemorySettlementLedger::new();
        let record = SettlementRecord {
            transaction_id: TransactionId::new("tx-1"),
            sender_id: TwinId::new("bank-a"),
            receiver_id: TwinId::new("bank-b"),
            amount: Amount::new(dec!(40)).unwrap(),
            sender_balance: Balance::new(dec!(60)),
            receiver_balance: Balance::new(dec!(40)),
        };

        assert!(!ledger.contains(&record.transaction_id).await.unwrap());
        ledger.record(record.clone()).await.unwrap();
        assert!(ledger.contains(&record.transaction_id).await.unwrap());
        assert_eq!(
            ledger.get(&TransactionId::new("tx-1")).await.unwrap(),
            Some(record)
        );
        assert!(ledger.get(&TransactionId::new("tx-2")).await.unwrap().is_none());
    }
}
