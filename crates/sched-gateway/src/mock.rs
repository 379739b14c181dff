use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use sched_core::errors::GatewayError;
use sched_core::gateway::{Delivery, SmsGateway};

/// One message captured by [`RecordingGateway`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SentMessage {
    pub phone: String,
    pub text: String,
}

/// Gateway double that records every send instead of calling a provider.
///
/// Phones listed via [`RecordingGateway::failing_for`] get a 500 rejection and
/// are not recorded. An optional delay makes each send take a while.
#[derive(Default)]
pub struct RecordingGateway {
    sent: Mutex<Vec<SentMessage>>,
    failing: HashSet<String>,
    delay: Option<Duration>,
    attempts: AtomicUsize,
}

impl RecordingGateway {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing_for<I, S>(mut self, phones: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.failing.extend(phones.into_iter().map(Into::into));
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn sent(&self) -> Vec<SentMessage> {
        self.sent.lock().clone()
    }

    pub fn sent_to(&self, phone: &str) -> Vec<String> {
        self.sent
            .lock()
            .iter()
            .filter(|m| m.phone == phone)
            .map(|m| m.text.clone())
            .collect()
    }

    /// Sends attempted, successful or not.
    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl SmsGateway for RecordingGateway {
    fn name(&self) -> &str {
        "recording"
    }

    async fn send(&self, phone: &str, text: &str) -> Result<Delivery, GatewayError> {
        self.attempts.fetch_add(1, Ordering::Relaxed);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if self.failing.contains(phone) {
            return Err(GatewayError::from_status(500, format!("refused {phone}")));
        }
        self.sent.lock().push(SentMessage {
            phone: phone.to_string(),
            text: text.to_string(),
        });
        Ok(Delivery {
            provider_id: None,
            status: 200,
        })
    }
}

/// Gateway double whose every send fails with the same error.
pub struct FailingGateway {
    error: GatewayError,
    call_count: AtomicUsize,
}

impl FailingGateway {
    pub fn new(error: GatewayError) -> Self {
        Self {
            error,
            call_count: AtomicUsize::new(0),
        }
    }

    pub fn call_count(&self) -> usize {
        self.call_count.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl SmsGateway for FailingGateway {
    fn name(&self) -> &str {
        "failing"
    }

    async fn send(&self, _phone: &str, _text: &str) -> Result<Delivery, GatewayError> {
        self.call_count.fetch_add(1, Ordering::Relaxed);
        Err(self.error.clone())
    }
}
