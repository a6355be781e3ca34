//! Kafka adapter for [`EventListener`]

use async_trait::async_trait;
use rdkafka::admin::AdminClient;
use rdkafka::client::DefaultClientContext;
use rdkafka::config::ClientConfig;
use rdkafka::consumer::{Consumer, StreamConsumer};
use rdkafka::message::Message;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

use super::{EventListener, MessageHandler};
use crate::error::{DispatchError, ListenerError};
use crate::shutdown::Shutdown;

const METADATA_TIMEOUT: Duration = Duration::from_secs(5);
const ERROR_BACKOFF: Duration = Duration::from_secs(1);

/// Configuration for the story events consumer
#[derive(Debug, Clone)]
pub struct KafkaListenerConfig {
    pub brokers: String,
    pub group_id: String,
    pub topic: String,
    pub max_poll_interval_ms: u32,
}

impl Default for KafkaListenerConfig {
    fn default() -> Self {
        Self {
            brokers: "localhost:9092".to_string(),
            group_id: "mention-service".to_string(),
            topic: "hnfetcher.topstories".to_string(),
            max_poll_interval_ms: 300_000,
        }
    }
}

impl KafkaListenerConfig {
    fn consumer_config(&self) -> ClientConfig {
        let mut config = ClientConfig::new();
        config
            .set("bootstrap.servers", &self.brokers)
            .set("group.id", &self.group_id)
            .set("enable.auto.commit", "true")
            .set("auto.offset.reset", "latest")
            .set("enable.partition.eof", "false")
            .set("session.timeout.ms", "45000")
            .set("max.poll.interval.ms", self.max_poll_interval_ms.to_string());
        config
    }
}

/// Story events consumer subscribed to a single topic
pub struct KafkaStoryListener {
    consumer: StreamConsumer,
    config: KafkaListenerConfig,
}

impl KafkaStoryListener {
    /// Verify the brokers are reachable and create the consumer.
    ///
    /// Fails when no broker answers a metadata request, so a misconfigured
    /// address stops the process at startup instead of looping on errors.
    pub async fn connect(config: KafkaListenerConfig) -> Result<Self, ListenerError> {
        let brokers = config.brokers.clone();

        tokio::task::spawn_blocking(move || -> Result<(), ListenerError> {
            let admin: AdminClient<DefaultClientContext> = ClientConfig::new()
                .set("bootstrap.servers", &brokers)
                .set("request.timeout.ms", "5000")
                .create()?;

            let metadata = admin.inner().fetch_metadata(None, METADATA_TIMEOUT)?;
            if metadata.brokers().is_empty() {
                return Err(ListenerError::Unreachable(format!(
                    "no Kafka brokers available at {}",
                    brokers
                )));
            }
            Ok(())
        })
        .await
        .map_err(|e| ListenerError::Unreachable(format!("metadata task failed: {}", e)))??;

        let consumer: StreamConsumer = config.consumer_config().create()?;

        info!(
            brokers = %config.brokers,
            group = %config.group_id,
            topic = %config.topic,
            "Kafka consumer created"
        );

        Ok(Self { consumer, config })
    }

    pub fn config(&self) -> &KafkaListenerConfig {
        &self.config
    }
}

#[async_trait]
impl EventListener for KafkaStoryListener {
    async fn listen(
        &self,
        handler: Arc<dyn MessageHandler>,
        mut shutdown: Shutdown,
    ) -> Result<(), ListenerError> {
        self.consumer.subscribe(&[&self.config.topic])?;
        info!(topic = %self.config.topic, "Subscribed to story events");

        loop {
            let record = tokio::select! {
                biased;
                _ = shutdown.triggered() => {
                    info!("Shutdown requested, stopping story consumer");
                    break;
                }
                record = self.consumer.recv() => record,
            };

            // Copy out of the borrowed message so it is released before awaiting the handler.
            let (offset, payload) = match record {
                Ok(record) => match record.payload() {
                    Some(payload) => (record.offset(), payload.to_vec()),
                    None => {
                        debug!(
                            topic = record.topic(),
                            partition = record.partition(),
                            offset = record.offset(),
                            "Received Kafka message with empty payload"
                        );
                        continue;
                    }
                },
                Err(err) => {
                    error!("Kafka error: {}", err);
                    tokio::select! {
                        _ = shutdown.triggered() => break,
                        _ = tokio::time::sleep(ERROR_BACKOFF) => {}
                    }
                    continue;
                }
            };

            match handler.on_message(payload).await {
                Ok(()) => {}
                Err(DispatchError::ShuttingDown) => {
                    info!("Handler is shutting down, stopping story consumer");
                    break;
                }
                Err(e) => {
                    warn!(offset, error = %e, "Handler rejected story message");
                }
            }
        }

        self.consumer.unsubscribe();
        info!(topic = %self.config.topic, "Unsubscribed from story events");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_consumer_config_settings() {
        let config = KafkaListenerConfig {
            brokers: "kafka-1:9092,kafka-2:9092".to_string(),
            group_id: "mentions".to_string(),
            topic: "stories".to_string(),
            max_poll_interval_ms: 600_000,
        };

        let client = config.consumer_config();
        assert_eq!(client.get("bootstrap.servers"), Some("kafka-1:9092,kafka-2:9092"));
        assert_eq!(client.get("group.id"), Some("mentions"));
        assert_eq!(client.get("enable.auto.commit"), Some("true"));
        assert_eq!(client.get("max.poll.interval.ms"), Some("600000"));
    }

    #[test]
    fn test_default_config() {
        let config = KafkaListenerConfig::default();
        assert_eq!(config.topic, "hnfetcher.topstories");
        assert_eq!(config.group_id, "mention-service");
        assert_eq!(config.max_poll_interval_ms, 300_000);
    }

    #[tokio::test]
    #[ignore = "Requires Kafka broker"]
    async fn test_connect_to_local_broker() {
        let listener = KafkaStoryListener::connect(KafkaListenerConfig::default()).await;
        assert!(listener.is_ok());
    }
}
