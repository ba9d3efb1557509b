//! In-memory stand-in for the broker client.

use super::args::GroupName;
use super::error::AppError;
use super::kafka::{ConsumerFactory, GroupConsumer, Subscription};
use super::message::{Inbound, MessageHandler};
use std::sync::{Arc, Mutex};
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Create(String),
    Connect,
    Subscribe(Subscription),
    Run,
}

#[derive(Clone, Copy, PartialEq, Eq)]
pub enum Fail {
    Nothing,
    Connect,
    Subscribe,
    Run,
}

#[derive(Clone)]
pub struct FakeClient {
    calls: Arc<Mutex<Vec<Call>>>,
    deliveries: Vec<Inbound>,
    fail: Fail,
}

impl FakeClient {
    pub fn new(deliveries: Vec<Inbound>, fail: Fail) -> Self {
        Self {
            calls: Arc::default(),
            deliveries,
            fail,
        }
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }
}

pub struct FakeConsumer(FakeClient);

impl FakeConsumer {
    fn record(&self, call: Call) {
        self.0.calls.lock().unwrap().push(call);
    }
}

impl ConsumerFactory for FakeClient {
    type Consumer = FakeConsumer;

    fn consumer(&self, group: &GroupName) -> Result<FakeConsumer, AppError> {
        self.calls
            .lock()
            .unwrap()
            .push(Call::Create(group.as_str().to_owned()));
        Ok(FakeConsumer(self.clone()))
    }
}

impl GroupConsumer for FakeConsumer {
    async fn connect(&mut self) -> Result<(), AppError> {
        tokio::task::yield_now().await;
        self.record(Call::Connect);
        match self.0.fail {
            Fail::Connect => Err(AppError::Connect("connection refused".into())),
            _ => Ok(()),
        }
    }

    async fn subscribe(&mut self, subscription: &Subscription) -> Result<(), AppError> {
        tokio::task::yield_now().await;
        self.record(Call::Subscribe(subscription.clone()));
        match self.0.fail {
            Fail::Subscribe => Err(AppError::Subscribe {
                topic: subscription.topic.clone(),
                source: "unknown topic".into(),
            }),
            _ => Ok(()),
        }
    }

    async fn run<H: MessageHandler>(
        &mut self,
        handler: &H,
        cancel: &CancellationToken,
    ) -> Result<(), AppError> {
        self.record(Call::Run);
        for m in &self.0.deliveries {
            handler.handle(m).await?;
        }
        if self.0.fail == Fail::Run {
            return Err(AppError::Run("broker transport failure".into()));
        }
        cancel.cancelled().await;
        Ok(())
    }
}
