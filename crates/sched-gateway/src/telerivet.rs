use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use secrecy::ExposeSecret;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument, warn};

use sched_core::errors::GatewayError;
use sched_core::gateway::{Delivery, SmsGateway};
use sched_core::security::GatewayCredentials;

pub const DEFAULT_BASE_URL: &str = "https://api.telerivet.com";
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);
const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
const MAX_ERROR_BODY: usize = 512;

#[derive(Clone, Debug)]
pub struct TelerivetConfig {
    pub credentials: GatewayCredentials,
    pub base_url: String,
    /// Upper bound for the whole request, connect included.
    pub timeout: Duration,
}

impl TelerivetConfig {
    pub fn new(credentials: GatewayCredentials) -> Self {
        Self {
            credentials,
            base_url: DEFAULT_BASE_URL.to_string(),
            timeout: DEFAULT_TIMEOUT,
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

#[derive(Serialize)]
struct SendRequest<'a> {
    content: &'a str,
    to_number: &'a str,
}

#[derive(Deserialize)]
struct SendResponse {
    #[serde(default)]
    id: Option<String>,
}

/// Telerivet REST client. One POST per message, no retries.
pub struct TelerivetClient {
    client: Client,
    config: TelerivetConfig,
    send_url: String,
}

impl TelerivetClient {
    pub fn new(config: TelerivetConfig) -> Result<Self, GatewayError> {
        if config.credentials.project_id.trim().is_empty() {
            return Err(GatewayError::Config("project id is empty".into()));
        }
        if config.credentials.secret_key.expose_secret().is_empty() {
            return Err(GatewayError::Config("secret key is empty".into()));
        }

        let client = Client::builder()
            .connect_timeout(CONNECT_TIMEOUT.min(config.timeout))
            .timeout(config.timeout)
            .build()
            .map_err(|e| GatewayError::Config(format!("failed to build HTTP client: {e}")))?;

        let send_url = format!(
            "{}/v1/projects/{}/messages/send",
            config.base_url.trim_end_matches('/'),
            config.credentials.project_id
        );

        Ok(Self {
            client,
            config,
            send_url,
        })
    }

    pub fn send_url(&self) -> &str {
        &self.send_url
    }

    fn map_transport_error(&self, err: reqwest::Error) -> GatewayError {
        if err.is_timeout() {
            GatewayError::Timeout(self.config.timeout)
        } else {
            GatewayError::Network(err.to_string())
        }
    }
}

#[async_trait]
impl SmsGateway for TelerivetClient {
    fn name(&self) -> &str {
        "telerivet"
    }

    #[instrument(skip(self, text), fields(phone = %phone))]
    async fn send(&self, phone: &str, text: &str) -> Result<Delivery, GatewayError> {
        let response = self
            .client
            .post(&self.send_url)
            .basic_auth(
                self.config.credentials.secret_key.expose_secret(),
                Some(""),
            )
            .json(&SendRequest {
                content: text,
                to_number: phone,
            })
            .send()
            .await
            .map_err(|e| self.map_transport_error(e))?;

        let status = response.status();
        if !status.is_success() {
            let mut body = response.text().await.unwrap_or_default();
            truncate_at_char_boundary(&mut body, MAX_ERROR_BODY);
            return Err(GatewayError::from_status(status.as_u16(), body));
        }

        // The status already says accepted; a broken body only loses the id.
        let provider_id = match response.text().await {
            Ok(body) => serde_json::from_str::<SendResponse>(&body)
                .ok()
                .and_then(|r| r.id),
            Err(e) => {
                warn!(status = status.as_u16(), error = %e, "accepted response body unreadable");
                None
            }
        };

        debug!(status = status.as_u16(), provider_id = ?provider_id, "message accepted");
        Ok(Delivery {
            provider_id,
            status: status.as_u16(),
        })
    }
}

fn truncate_at_char_boundary(s: &mut String, max: usize) {
    if s.len() <= max {
        return;
    }
    let mut end = max;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    s.truncate(end);
}
