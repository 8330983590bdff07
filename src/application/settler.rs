use crate::domain::ports::{SettlementLedgerBox, TwinStoreBox};
use crate::domain::transaction::{SettlementRecord, Transaction, TransactionEvent, TransactionId};
use crate::domain::twin::{Amount, Balance, TwinId};
use crate::error::{Result, SettlementError};
use tracing::{error, info, warn};

/// What happened to a single transaction.
#[derive(Debug, Clone, PartialEq)]
pub enum SettlementOutcome {
    /// Both twins were updated.
    Settled(SettlementRecord),
    /// The sender could not cover the amount; nothing was written.
    InsufficientFunds {
        transaction_id: TransactionId,
        sender_id: TwinId,
        available: Balance,
        required: Amount,
    },
    /// The transaction id was settled before; nothing was fetched or written.
    Duplicate(TransactionId),
}

/// Settles transactions between two digital twins.
///
/// `TransactionSettler` owns its twin store and ledger. Each call reads both
/// twins, applies the liquidity check and writes the sender then the receiver.
/// The two writes are not atomic: every write is guarded by the etag read
/// beforehand, and a failed receiver credit is compensated by restoring the
/// sender's original balance.
pub struct TransactionSettler {
    twins: TwinStoreBox,
    ledger: SettlementLedgerBox,
}

impl TransactionSettler {
    /// Creates a new `TransactionSettler`.
    ///
    /// # Arguments
    ///
    /// * `twins` - The store holding the account twins.
    /// * `ledger` - The record of already settled transactions.
    pub fn new(twins: TwinStoreBox, ledger: SettlementLedgerBox) -> Self {
        Self { twins, ledger }
    }

    /// Decodes, validates and settles one raw message body.
    pub async fn handle_event(&self, body: &[u8]) -> Result<SettlementOutcome> {
        let tx = TransactionEvent::decode(body)?.validate()?;
        self.settle(tx).await
    }

    /// Settles a validated transaction.
    pub async fn settle(&self, tx: Transaction) -> Result<SettlementOutcome> {
        if self.ledger.contains(&tx.transaction_id).await? {
            warn!(
                transaction_id = %tx.transaction_id,
                "transaction already settled, ignoring redelivery"
            );
            return Ok(SettlementOutcome::Duplicate(tx.transaction_id));
        }

        let sender = self.twins.get_twin(&tx.sender_id).await?;
        let receiver = self.twins.get_twin(&tx.receiver_id).await?;

        let sender_balance = sender.balance()?;
        if !sender_balance.covers(tx.amount) {
            warn!(
                transaction_id = %tx.transaction_id,
                sender_id = %tx.sender_id,
                available = %sender_balance,
                required = %tx.amount,
                "insufficient funds"
            );
            return Ok(SettlementOutcome::InsufficientFunds {
                transaction_id: tx.transaction_id,
                sender_id: tx.sender_id,
                available: sender_balance,
                required: tx.amount,
            });
        }

        let receiver_balance = receiver.balance()?;
        let new_sender_balance = sender_balance.debit(tx.amount)?;
        let new_receiver_balance = receiver_balance.credit(tx.amount)?;

        self.twins
            .update_liquidity_balance(&tx.sender_id, new_sender_balance, sender.etag.as_deref())
            .await?;

        if let Err(credit_error) = self
            .twins
            .update_liquidity_balance(
                &tx.receiver_id,
                new_receiver_balance,
                receiver.etag.as_deref(),
            )
            .await
        {
            let sender_restored = self.compensate(&tx, sender_balance).await;
            return Err(SettlementError::PartialSettlement {
                transaction_id: tx.transaction_id.to_string(),
                sender_restored,
                source: Box::new(credit_error),
            });
        }

        let record = SettlementRecord {
            transaction_id: tx.transaction_id,
            sender_id: tx.sender_id,
            receiver_id: tx.receiver_id,
            amount: tx.amount,
            sender_balance: new_sender_balance,
            receiver_balance: new_receiver_balance,
        };
        if let Err(e) = self.ledger.record(record.clone()).await {
            error!(
                transaction_id = %record.transaction_id,
                sender_id = %record.sender_id,
                sender_balance = %record.sender_balance,
                receiver_id = %record.receiver_id,
                receiver_balance = %record.receiver_balance,
                error = %e,
                "transaction settled but not recorded, a redelivery will apply it again"
            );
            return Err(e);
        }

        info!(
            transaction_id = %record.transaction_id,
            sender_id = %record.sender_id,
            sender_balance = %record.sender_balance,
            receiver_id = %record.receiver_id,
            receiver_balance = %record.receiver_balance,
            "transaction settled"
        );
        Ok(SettlementOutcome::Settled(record))
    }

    /// Puts the sender's balance back after the receiver credit failed.
    async fn compensate(&self, tx: &Transaction, original: Balance) -> bool {
        match self
            .twins
            .update_liquidity_balance(&tx.sender_id, original, None)
            .await
        {
            Ok(()) => {
                warn!(
                    transaction_id = %tx.transaction_id,
                    sender_id = %tx.sender_id,
                    balance = %original,
                    "receiver credit failed, sender balance restored"
                );
                true
            }
            Err(e) => {
                error!(
                    transaction_id = %tx.transaction_id,
                    sender_id = %tx.sender_id,
                    balance = %original,
                    error = %e,
                    "receiver credit failed and sender balance could not be restored"
                );
                false
            }
        }
    }
}
