use crate::domain::ports::SettlementLedger;
use crate::domain::transaction::{SettlementRecord, TransactionId};
use crate::error::{Result, SettlementError};
use async_trait::async_trait;
use rocksdb::{ColumnFamilyDescriptor, DB, Options};
use std::path::Path;
use std::sync::Arc;

/// Column Family holding settled transactions keyed by transaction id.
pub const CF_SETTLEMENTS: &str = "settlements";

/// A persistent settlement ledger backed by RocksDB.
///
/// Settled transaction ids survive a restart, so a message redelivered after
/// the worker comes back up is still recognised as a duplicate.
///
/// This struct is thread-safe (`Clone` shares the underlying `Arc<DB>`).
#[derive(Clone)]
pub struct RocksDBSettlementLedger {
    db: Arc<DB>,
}

impl RocksDBSettlementLedger {
    /// Opens or creates a RocksDB instance at the specified path.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.create_missing_column_families(true);

        let cf_settlements = ColumnFamilyDescriptor::new(CF_SETTLEMENTS, Options::default());
        let db = DB::open_cf_descriptors(&opts, path, vec![cf_settlements])?;

        Ok(Self { db: Arc::new(db) })
    }

    fn missing_cf() -> SettlementError {
        SettlementError::InternalError(Box::new(std::io::Error::other(
            "Settlements column family not found",
        )))
    }
}

#[async_trait]
impl SettlementLedger for RocksDBSettlementLedger {
    async fn record(&self, record: SettlementRecord) -> Result<()> {
        let cf = self.db.cf_handle(CF_SETTLEMENTS).ok_or_else(Self::missing_cf)?;

        let value = serde_json::to_vec(&record).map_err(|e| {
            SettlementError::InternalError(Box::new(std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                format!("Serialization error: {}", e),
            )))
        })?;

        self.db
            .put_cf(&cf, record.transaction_id.as_str().as_bytes(), value)?;
        Ok(())
    }

    async fn get(&self, tx_id: &TransactionId) -> Result<Option<SettlementRecord>> {
        let cf = self.db.cf_handle(CF_SETTLEMENTS).ok_or_else(Self::missing_cf)?;

        match self.db.get_cf(&cf, tx_id.as_str().as_bytes())? {
            Some(bytes) => {
                let record = serde_json::from_slice(&bytes).map_err(|e| {
                    SettlementError::InternalError(Box::new(std::io::Error::new(
                        std::io::ErrorKind::InvalidData,
                        format!("Deserialization error: {}", e),
                    )))
                })?;
                Ok(Some(record))
            }
            None => Ok(None),
        }
    }

    async fn contains(&self, tx_id: &TransactionId) -> Result<bool> {
        let cf = self.db.cf_handle(CF_SETTLEMENTS).ok_or_else(Self::missing_cf)?;
        // Existence check without deserializing the record
        let result = self.db.get_pinned_cf(&cf, tx_id.as_str().as_bytes())?;
        Ok(result.is_some())
    }
}
