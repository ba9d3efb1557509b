use super::args::GroupName;
use super::error::AppError;
use super::kafka::{ConsumerFactory, GroupConsumer, Subscription};
use super::message::MessageHandler;
use std::future::Future;
use tokio_util::sync::CancellationToken;

pub const TOPIC: &str = "rider-updates";
pub const FROM_BEGINNING: bool = true;

pub struct Orchestrator<F> {
    group: GroupName,
    factory: F,
}

/// `None` when cancelled before `step` finished.
async fn until_cancelled<T>(
    cancel: &CancellationToken,
    step: impl Future<Output = Result<T, AppError>>,
) -> Result<Option<T>, AppError> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Ok(None),
        r = step => r.map(Some),
    }
}

impl<F: ConsumerFactory> Orchestrator<F> {
    pub fn new(group: GroupName, factory: F) -> Self {
        Self { group, factory }
    }

    /// Connect, subscribe to the fixed topic, then hand every message to
    /// `handler` until cancelled. The first failing step ends the sequence.
    pub async fn run<H: MessageHandler>(
        &self,
        handler: &H,
        cancel: &CancellationToken,
    ) -> Result<(), AppError> {
        let mut consumer = self.factory.consumer(&self.group)?;

        if until_cancelled(cancel, consumer.connect()).await?.is_none() {
            tracing::info!(group = %self.group, "cancelled while connecting");
            return Ok(());
        }

        let subscription = Subscription {
            topic: TOPIC.to_owned(),
            from_beginning: FROM_BEGINNING,
        };
        if until_cancelled(cancel, consumer.subscribe(&subscription))
            .await?
            .is_none()
        {
            tracing::info!(group = %self.group, "cancelled while subscribing");
            return Ok(());
        }

        tracing::info!(group = %self.group, topic = TOPIC, "consuming");
        consumer.run(handler, cancel).await?;
        tracing::info!(group = %self.group, "consumer stopped");
        Ok(())
    }
}
