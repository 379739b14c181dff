use async_trait::async_trait;

use crate::errors::GatewayError;

/// Provider acknowledgement of an accepted message.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Delivery {
    /// Provider-side message id, when the response carried one.
    pub provider_id: Option<String>,
    pub status: u16,
}

/// Outbound SMS transport. One call sends one text to one phone.
#[async_trait]
pub trait SmsGateway: Send + Sync {
    fn name(&self) -> &str;

    async fn send(&self, phone: &str, text: &str) -> Result<Delivery, GatewayError>;
}
