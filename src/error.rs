use thiserror::Error;

pub type Result<T> = std::result::Result<T, SettlementError>;

#[derive(Error, Debug)]
pub enum SettlementError {
    #[error("Validation error: {0}")]
    ValidationError(String),
    #[error("Decode error: {0}")]
    DecodeError(#[from] serde_json::Error),
    #[error("HTTP error: {0}")]
    HttpError(#[from] reqwest::Error),
    #[error("Twin not found: {0}")]
    TwinNotFound(String),
    #[error("Twin {0} has no liquidityBalance")]
    MissingBalance(String),
    #[error("Balance out of range: {0}")]
    BalanceOverflow(String),
    #[error("Twin {0} was modified concurrently (etag mismatch)")]
    PreconditionFailed(String),
    #[error("Twin store returned {status}: {body}")]
    RemoteStatus { status: u16, body: String },
    #[error("Receiver credit failed for transaction {transaction_id} (sender restored: {sender_restored})")]
    PartialSettlement {
        transaction_id: String,
        sender_restored: bool,
        #[source]
        source: Box<SettlementError>,
    },
    #[error("Credential error: {0}")]
    CredentialError(String),
    #[error("Configuration error: {0}")]
    ConfigError(#[from] config::ConfigError),
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
    #[error("Event source error: {0}")]
    EventSourceError(String),
    #[error("Internal error: {0}")]
    InternalError(Box<dyn std::error::Error + Send + Sync>),
}

impl SettlementError {
    /// True when the message itself was malformed, as opposed to a failure
    /// talking to the twin store or the ledger.
    pub fn is_rejection(&self) -> bool {
        matches!(
            self,
            SettlementError::ValidationError(_) | SettlementError::DecodeError(_)
        )
    }
}

#[cfg(feature = "storage-rocksdb")]
impl From<rocksdb::Error> for SettlementError {
    fn from(err: rocksdb::Error) -> Self {
        SettlementError::InternalError(Box::new(err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejection_classification() {
        assert!(SettlementError::ValidationError("missing senderId".into()).is_rejection());

        let decode = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        assert!(SettlementError::from(decode).is_rejection());

        assert!(!SettlementError::TwinNotFound("bank-a".into()).is_rejection());
        assert!(
            !SettlementError::RemoteStatus {
                status: 500,
                body: String::new()
            }
            .is_rejection()
        );
    }
}
