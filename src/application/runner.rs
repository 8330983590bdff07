use super::settler::{SettlementOutcome, TransactionSettler};
use crate::domain::ports::EventSource;
use crate::error::Result;
use serde::Serialize;
use tracing::{error, info, warn};

/// Counts of what happened to the messages seen during a run.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    pub received: u64,
    pub settled: u64,
    pub insufficient_funds: u64,
    pub duplicates: u64,
    pub rejected: u64,
    pub failed: u64,
}

/// Drives an [`EventSource`] through a [`TransactionSettler`].
///
/// Every message is acknowledged whatever its outcome: malformed messages and
/// failed settlements are logged and dropped, never retried.
pub struct SettlementRunner {
    settler: TransactionSettler,
}

impl SettlementRunner {
    pub fn new(settler: TransactionSettler) -> Self {
        Self { settler }
    }

    /// Processes messages until the source is exhausted.
    ///
    /// Only a failure of the source itself ends the run early.
    pub async fn run(&self, source: &mut dyn EventSource) -> Result<RunSummary> {
        let mut summary = RunSummary::default();

        while let Some(message) = source.next_event().await? {
            summary.received += 1;
            info!(
                body = %String::from_utf8_lossy(&message.body),
                partition = ?message.partition,
                offset = ?message.offset,
                "event received"
            );

            match self.settler.handle_event(&message.body).await {
                Ok(SettlementOutcome::Settled(_)) => summary.settled += 1,
                Ok(SettlementOutcome::InsufficientFunds { .. }) => summary.insufficient_funds += 1,
                Ok(SettlementOutcome::Duplicate(_)) => summary.duplicates += 1,
                Err(e) if e.is_rejection() => {
                    warn!(error = %e, "Invalid transaction data received");
                    summary.rejected += 1;
                }
                Err(e) => {
                    error!(error = %e, "Error processing event");
                    summary.failed += 1;
                }
            }

            source.acknowledge(&message).await?;
        }

        info!(?summary, "event stream exhausted");
        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ports::EventMessage;
    use crate::domain::twin::Balance;
    use crate::infrastructure::in_memory::{InMemorySettlementLedger, InMemoryTwinStore};
    use async_trait::async_trait;
    use rust_decimal_macros::dec;
    use std::collections::VecDeque;

    struct VecSource {
        pending: VecDeque<EventMessage>,
        acknowledged: usize,
    }

    impl VecSource {
        fn new(bodies: &[&str]) -> Self {
            Self {
                pending: bodies.iter().map(|b| EventMessage::new(b.as_bytes())).collect(),
                acknowledged: 0,
            }
        }
    }

    #[async_trait]
    impl EventSource for VecSource {
        async fn next_event(&mut self) -> Result<Option<EventMessage>> {
            Ok(self.pending.pop_front())
        }

        async fn acknowledge(&mut self, _message: &EventMessage) -> Result<()> {
            self.acknowledged += 1;
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_run_tallies_outcomes() {
        let store = InMemoryTwinStore::new();
        store.insert("bank-a", Balance::new(dec!(100))).await;
        store.insert("bank-b", Balance::new(dec!(10))).await;
        let runner = SettlementRunner::new(TransactionSettler::new(
            Box::new(store.clone()),
            Box::new(InMemorySettlementLedger::new()),
        ));

        let mut source = VecSource::new(&[
            r#"{"transactionId": "1", "senderId": "bank-a", "receiverId": "bank-b", "amount": 40}"#,
            r#"{"transactionId": "2", "senderId": "bank-b", "receiverId": "bank-a", "amount": 500}"#,
            r#"{"transactionId": "1", "senderId": "bank-a", "receiverId": "bank-b", "amount": 40}"#,
            r#"{"transactionId": "3", "senderId": "bank-a", "receiverId": "bank-b"}"#,
            "garbage",
            r#"{"transactionId": "4", "senderId": "bank-a", "receiverId": "bank-x", "amount": 1}"#,
        ]);

        let summary = runner.run(&mut source).await.unwrap();

        assert_eq!(
            summary,
            RunSummary {
                received: 6,
                settled: 1,
                insufficient_funds: 1,
                duplicates: 1,
                rejected: 2,
                failed: 1,
            }
        );
        assert_eq!(source.acknowledged, 6);
        assert_eq!(store.balance_of("bank-a").await, Some(Balance::new(dec!(60))));
        assert_eq!(store.balance_of("bank-b").await, Some(Balance::new(dec!(50))));
    }

    #[tokio::test]
    async fn test_balance_overflow_is_dropped() {
        let store = InMemoryTwinStore::new();
        store.insert("a", Balance::new(dec!(50000000000000000000000000000))).await;
        store.insert("b", Balance::new(dec!(50000000000000000000000000000))).await;
        let runner = SettlementRunner::new(TransactionSettler::new(
            Box::new(store.clone()),
            Box::new(InMemorySettlementLedger::new()),
        ));

        let mut source = VecSource::new(&[
            r#"{"transactionId": "t", "senderId": "a", "receiverId": "b", "amount": 40000000000000000000000000000}"#,
            r#"{"transactionId": "u", "senderId": "a", "receiverId": "b", "amount": 1}"#,
        ]);

        let summary = runner.run(&mut source).await.unwrap();

        assert_eq!(summary.received, 2);
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.settled, 1);
        assert_eq!(source.acknowledged, 2);
        assert_eq!(
            store.balance_of("a").await,
            Some(Balance::new(dec!(49999999999999999999999999999)))
        );
    }

    #[tokio::test]
    async fn test_empty_source() {
        let runner = SettlementRunner::new(TransactionSettler::new(
            Box::new(InMemoryTwinStore::new()),
            Box::new(InMemorySettlementLedger::new()),
        ));
        let summary = runner.run(&mut VecSource::new(&[])).await.unwrap();
        assert_eq!(summary, RunSummary::default());
    }
}
