use crate::config::{Settings, kafka_bootstrap_from_connection_string};
use crate::domain::ports::{EventMessage, EventSource};
use crate::error::{Result, SettlementError};
use async_trait::async_trait;
use rdkafka::config::ClientConfig;
use rdkafka::consumer::{Consumer, StreamConsumer};
use rdkafka::message::Message;
use tracing::info;

/// Consumes transaction events from an Event Hub through its Kafka endpoint.
///
/// Offsets are only stored once a message has been acknowledged, so a crash
/// mid-settlement leads to redelivery rather than loss.
pub struct KafkaEventSource {
    consumer: StreamConsumer,
    topic: String,
}

impl KafkaEventSource {
    pub fn new(brokers: &str, topic: &str, group_id: &str, connection_string: &str) -> Result<Self> {
        let consumer: StreamConsumer = ClientConfig::new()
            .set("bootstrap.servers", brokers)
            .set("group.id", group_id)
            .set("security.protocol", "SASL_SSL")
            .set("sasl.mechanisms", "PLAIN")
            .set("sasl.username", "$ConnectionString")
            .set("sasl.password", connection_string)
            .set("enable.auto.commit", "true")
            .set("enable.auto.offset.store", "false")
            .set("auto.offset.reset", "earliest")
            .create()
            .map_err(|e| SettlementError::EventSourceError(e.to_string()))?;

        consumer
            .subscribe(&[topic])
            .map_err(|e| SettlementError::EventSourceError(e.to_string()))?;

        info!(brokers, topic, group_id, "subscribed to event hub");
        Ok(Self {
            consumer,
            topic: topic.to_string(),
        })
    }

    pub fn from_settings(settings: &Settings) -> Result<Self> {
        let connection_string = settings.event_hub_connection_string.as_deref().ok_or_else(|| {
            SettlementError::ValidationError(format!(
                "{} is not set",
                crate::config::EVENT_HUB_CONNECTION_ENV
            ))
        })?;
        let brokers = kafka_bootstrap_from_connection_string(connection_string)?;
        Self::new(
            &brokers,
            &settings.event_hub_name,
            &settings.event_hub_consumer_group,
            connection_string,
        )
    }
}

#[async_trait]
impl EventSource for KafkaEventSource {
    /// Waits for the next message; the stream never ends on its own.
    async fn next_event(&mut self) -> Result<Option<EventMessage>> {
        let message = self
            .consumer
            .recv()
            .await
            .map_err(|e| SettlementError::EventSourceError(e.to_string()))?;

        Ok(Some(EventMessage {
            body: message.payload().unwrap_or_default().to_vec(),
            partition: Some(message.partition()),
            offset: Some(message.offset()),
        }))
    }

    async fn acknowledge(&mut self, message: &EventMessage) -> Result<()> {
        if let (Some(partition), Some(offset)) = (message.partition, message.offset) {
            // Stored offsets name the next message to read.
            self.consumer
                .store_offset(&self.topic, partition, offset + 1)
                .map_err(|e| SettlementError::EventSourceError(e.to_string()))?;
        }
        Ok(())
    }
}
