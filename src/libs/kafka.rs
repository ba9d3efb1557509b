use super::args::GroupName;
use super::error::AppError;
use super::message::{Inbound, MessageHandler};
use super::settings::Kafka;
use anyhow::Context;
use futures::stream::StreamExt;
use rdkafka::client::ClientContext;
use rdkafka::config::{ClientConfig, RDKafkaLogLevel};
use rdkafka::consumer::{BaseConsumer, Consumer, ConsumerContext, StreamConsumer};
use rdkafka::error::{KafkaError, KafkaResult, RDKafkaErrorCode};
use rdkafka::message::{BorrowedMessage, Message};
use rdkafka::topic_partition_list::TopicPartitionList;
use std::time::Duration;
use tokio::task::spawn_blocking;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Subscription {
    pub topic: String,
    pub from_beginning: bool,
}

/// Produces consumers bound to a group id.
pub trait ConsumerFactory {
    type Consumer: GroupConsumer;

    fn consumer(&self, group: &GroupName) -> Result<Self::Consumer, AppError>;
}

/// Lifecycle of one group member: connect, subscribe, then run until
/// cancelled or failed.
#[allow(async_fn_in_trait)]
pub trait GroupConsumer {
    async fn connect(&mut self) -> Result<(), AppError>;

    async fn subscribe(&mut self, subscription: &Subscription) -> Result<(), AppError>;

    async fn run<H: MessageHandler>(
        &mut self,
        handler: &H,
        cancel: &CancellationToken,
    ) -> Result<(), AppError>;
}

#[derive(Debug, Clone)]
pub struct KafkaClient {
    settings: Kafka,
}

impl KafkaClient {
    pub fn new(settings: Kafka) -> Self {
        Self { settings }
    }
}

impl ConsumerFactory for KafkaClient {
    type Consumer = KafkaGroupConsumer;

    fn consumer(&self, group: &GroupName) -> Result<Self::Consumer, AppError> {
        if self.settings.brokers.trim().is_empty() {
            return Err(AppError::Connect("no brokers configured".into()));
        }
        Ok(KafkaGroupConsumer {
            group: group.clone(),
            settings: self.settings.clone(),
            config: None,
            consumer: None,
        })
    }
}

/// Routes librdkafka logs and commit results into tracing.
pub struct LoggingContext {
    group: GroupName,
}

impl ClientContext for LoggingContext {
    fn log(&self, level: RDKafkaLogLevel, fac: &str, log_message: &str) {
        let group = self.group.as_str();
        match level {
            RDKafkaLogLevel::Emerg
            | RDKafkaLogLevel::Alert
            | RDKafkaLogLevel::Critical
            | RDKafkaLogLevel::Error => tracing::error!(group, fac, "{log_message}"),
            RDKafkaLogLevel::Warning => tracing::warn!(group, fac, "{log_message}"),
            RDKafkaLogLevel::Notice | RDKafkaLogLevel::Info => {
                tracing::info!(group, fac, "{log_message}")
            }
            RDKafkaLogLevel::Debug => tracing::debug!(group, fac, "{log_message}"),
        }
    }

    fn error(&self, error: KafkaError, reason: &str) {
        tracing::error!(group = self.group.as_str(), %error, reason, "kafka client error");
    }
}

impl ConsumerContext for LoggingContext {
    fn commit_callback(&self, result: KafkaResult<()>, offsets: &TopicPartitionList) {
        match result {
            Ok(()) => tracing::debug!(partitions = offsets.count(), "offsets committed"),
            Err(e) => tracing::warn!(error = %e, "offset commit failed"),
        }
    }
}

pub struct KafkaGroupConsumer {
    group: GroupName,
    settings: Kafka,
    config: Option<ClientConfig>,
    consumer: Option<StreamConsumer<LoggingContext>>,
}

impl KafkaGroupConsumer {
    fn base_config(&self) -> ClientConfig {
        let mut c = ClientConfig::new();
        c.set("bootstrap.servers", &self.settings.brokers)
            .set("client.id", &self.settings.client_id)
            .set("group.id", self.group.as_str())
            .set(
                "session.timeout.ms",
                self.settings.session_timeout_ms.to_string(),
            )
            .set("enable.auto.commit", "true")
            .set("enable.partition.eof", "false");
        for (k, v) in &self.settings.properties {
            c.set(k, v);
        }
        c
    }

    fn subscribed_config(config: &ClientConfig, subscription: &Subscription) -> ClientConfig {
        let mut c = config.clone();
        let reset = if subscription.from_beginning {
            "earliest"
        } else {
            "latest"
        };
        c.set("auto.offset.reset", reset);
        c
    }
}

/// Fetch cluster metadata with a throwaway client. Blocks, so it runs off the
/// runtime threads.
async fn probe(config: ClientConfig, timeout: Duration) -> anyhow::Result<usize> {
    spawn_blocking(move || -> anyhow::Result<usize> {
        let client: BaseConsumer = config.create().context("failed to create kafka client")?;
        let metadata = client
            .fetch_metadata(None, timeout)
            .context("failed to fetch cluster metadata")?;
        Ok(metadata.brokers().len())
    })
    .await?
}

/// librdkafka recovers from consumer errors by itself unless the client has
/// raised a fatal error.
fn is_fatal(error: &KafkaError, client_fatal: bool) -> bool {
    client_fatal || error.rdkafka_error_code() == Some(RDKafkaErrorCode::Fatal)
}

impl From<&BorrowedMessage<'_>> for Inbound {
    fn from(m: &BorrowedMessage<'_>) -> Self {
        Inbound {
            topic: m.topic().to_owned(),
            partition: m.partition(),
            offset: m.offset(),
            payload: m.payload().map(<[u8]>::to_vec),
        }
    }
}

impl GroupConsumer for KafkaGroupConsumer {
    async fn connect(&mut self) -> Result<(), AppError> {
        let config = self.base_config();
        let timeout = Duration::from_millis(self.settings.connect_timeout_ms);
        let brokers = probe(config.clone(), timeout)
            .await
            .map_err(|e| AppError::Connect(e.into()))?;
        tracing::info!(group = %self.group, brokers, "connected to kafka");
        self.config = Some(config);
        Ok(())
    }

    async fn subscribe(&mut self, subscription: &Subscription) -> Result<(), AppError> {
        let failed = |source: anyhow::Error| AppError::Subscribe {
            topic: subscription.topic.clone(),
            source: source.into(),
        };
        let config = self
            .config
            .as_ref()
            .ok_or_else(|| failed(anyhow::anyhow!("not connected")))?;
        let consumer: StreamConsumer<LoggingContext> =
            Self::subscribed_config(config, subscription)
                .create_with_context(LoggingContext {
                    group: self.group.clone(),
                })
                .context("failed to create consumer")
                .map_err(failed)?;
        consumer
            .subscribe(&[subscription.topic.as_str()])
            .context("subscription rejected")
            .map_err(failed)?;
        tracing::info!(
            group = %self.group,
            topic = %subscription.topic,
            from_beginning = subscription.from_beginning,
            "subscribed"
        );
        self.consumer = Some(consumer);
        Ok(())
    }

    async fn run<H: MessageHandler>(
        &mut self,
        handler: &H,
        cancel: &CancellationToken,
    ) -> Result<(), AppError> {
        let consumer = self
            .consumer
            .as_ref()
            .ok_or_else(|| AppError::Run("not subscribed".into()))?;
        let mut stream = consumer.stream();
        loop {
            let next = tokio::select! {
                _ = cancel.cancelled() => return Ok(()),
                next = stream.next() => next,
            };
            let message = match next {
                Some(Ok(m)) => Inbound::from(&m),
                Some(Err(e)) => {
                    let fatal = consumer.client().fatal_error();
                    if let Some((code, reason)) = &fatal {
                        tracing::error!(%code, %reason, "fatal kafka client error");
                    }
                    if is_fatal(&e, fatal.is_some()) {
                        return Err(AppError::Run(e.into()));
                    }
                    tracing::warn!(group = %self.group, error = %e, "kafka error");
                    continue;
                }
                None => return Ok(()),
            };
            tracing::trace!(
                topic = %message.topic,
                partition = message.partition,
                offset = message.offset,
                "message received"
            );
            handler.handle(&message).await?;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn settings() -> Kafka {
        Kafka {
            brokers: "kafka-1:9092".into(),
            client_id: "rider-consumer".into(),
            session_timeout_ms: 6000,
            connect_timeout_ms: 100,
            properties: HashMap::from([("fetch.min.bytes".into(), "1".into())]),
        }
    }

    fn consumer(group: &str) -> KafkaGroupConsumer {
        KafkaClient::new(settings())
            .consumer(&group.parse().unwrap())
            .unwrap()
    }

    #[test]
    fn config_binds_group_and_brokers() {
        let c = consumer("billing").base_config();
        assert_eq!(c.get("group.id"), Some("billing"));
        assert_eq!(c.get("bootstrap.servers"), Some("kafka-1:9092"));
        assert_eq!(c.get("enable.auto.commit"), Some("true"));
        assert_eq!(c.get("session.timeout.ms"), Some("6000"));
        assert_eq!(c.get("fetch.min.bytes"), Some("1"));
        assert_eq!(c.get("auto.offset.reset"), None);
    }

    #[test]
    fn offset_reset_follows_from_beginning() {
        let base = consumer("billing").base_config();
        let mut sub = Subscription {
            topic: "rider-updates".into(),
            from_beginning: true,
        };
        let c = KafkaGroupConsumer::subscribed_config(&base, &sub);
        assert_eq!(c.get("auto.offset.reset"), Some("earliest"));
        sub.from_beginning = false;
        let c = KafkaGroupConsumer::subscribed_config(&base, &sub);
        assert_eq!(c.get("auto.offset.reset"), Some("latest"));
    }

    #[test]
    fn empty_brokers_fail_to_connect() {
        let mut s = settings();
        s.brokers = " ".into();
        let err = KafkaClient::new(s)
            .consumer(&"billing".parse().unwrap())
            .err()
            .unwrap();
        assert_eq!(err.exit_code(), 2);
    }

    #[tokio::test]
    async fn subscribe_requires_connect() {
        let mut c = consumer("billing");
        let sub = Subscription {
            topic: "rider-updates".into(),
            from_beginning: true,
        };
        let err = c.subscribe(&sub).await.unwrap_err();
        assert!(matches!(err, AppError::Subscribe { ref topic, .. } if topic == "rider-updates"));
    }

    #[test]
    fn transient_consumer_errors_are_not_fatal() {
        for code in [
            RDKafkaErrorCode::BrokerTransportFailure,
            RDKafkaErrorCode::AllBrokersDown,
            RDKafkaErrorCode::UnknownTopicOrPartition,
        ] {
            assert!(!is_fatal(&KafkaError::MessageConsumption(code), false));
        }
    }

    #[test]
    fn fatal_code_or_client_state_is_fatal() {
        let fatal = KafkaError::MessageConsumption(RDKafkaErrorCode::Fatal);
        assert!(is_fatal(&fatal, false));
        let transport = KafkaError::MessageConsumption(RDKafkaErrorCode::BrokerTransportFailure);
        assert!(is_fatal(&transport, true));
    }

    struct Never;

    impl MessageHandler for Never {
        async fn handle(&self, _: &Inbound) -> Result<(), AppError> {
            unreachable!()
        }
    }

    #[tokio::test]
    async fn run_requires_subscribe() {
        let mut c = consumer("billing");
        let err = c.run(&Never, &CancellationToken::new()).await.unwrap_err();
        assert!(matches!(err, AppError::Run(_)));
    }
}
