use secrecy::{ExposeSecret, SecretString};

/// Gateway API credentials: the project the messages are sent from and the
/// key used as the basic-auth username.
#[derive(Clone)]
pub struct GatewayCredentials {
    pub project_id: String,
    pub secret_key: SecretString,
}

impl GatewayCredentials {
    pub fn new(project_id: impl Into<String>, secret_key: impl Into<String>) -> Self {
        Self {
            project_id: project_id.into(),
            secret_key: SecretString::from(secret_key.into()),
        }
    }
}

impl std::fmt::Debug for GatewayCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GatewayCredentials")
            .field("project_id", &self.project_id)
            .field("secret_key", &"[REDACTED]")
            .finish()
    }
}

/// Shared secret the SMS provider echoes back on every inbound webhook call.
#[derive(Clone)]
pub struct WebhookKey(SecretString);

impl WebhookKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(SecretString::from(key.into()))
    }

    /// Compare a presented secret without leaking where it differs.
    pub fn verify(&self, presented: &str) -> bool {
        constant_time_eq(self.0.expose_secret().as_bytes(), presented.as_bytes())
    }
}

impl std::fmt::Debug for WebhookKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("WebhookKey([REDACTED])")
    }
}

/// Constant-time comparison for auth validation.
pub fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut result: u8 = 0;
    for (x, y) in a.iter().zip(b.iter()) {
        result |= x ^ y;
    }
    result == 0
}
