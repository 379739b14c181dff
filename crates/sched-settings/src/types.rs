//! Settings types with compiled defaults.

use serde::{Deserialize, Serialize};

/// Root settings object.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SchedSettings {
    /// Storage location (`sqlite:///relative.db`, `sqlite:////abs.db`, a plain path or `:memory:`).
    pub database_url: String,
    pub gateway: GatewaySettings,
    pub webhook: WebhookSettings,
    pub broadcast: BroadcastSettings,
    pub server: ServerSettings,
    pub logging: LoggingSettings,
}

impl Default for SchedSettings {
    fn default() -> Self {
        Self {
            database_url: DEFAULT_DATABASE_URL.to_string(),
            gateway: GatewaySettings::default(),
            webhook: WebhookSettings::default(),
            broadcast: BroadcastSettings::default(),
            server: ServerSettings::default(),
            logging: LoggingSettings::default(),
        }
    }
}

pub const DEFAULT_DATABASE_URL: &str = "sqlite:///sched.db";

/// Outbound SMS provider settings.
#[derive(Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GatewaySettings {
    pub project_id: String,
    pub secret_key: String,
    pub base_url: String,
    /// Upper bound on a single send, in seconds.
    pub timeout_secs: u64,
}

impl Default for GatewaySettings {
    fn default() -> Self {
        Self {
            project_id: String::new(),
            secret_key: String::new(),
            base_url: "https://api.telerivet.com".to_string(),
            timeout_secs: 10,
        }
    }
}

impl std::fmt::Debug for GatewaySettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GatewaySettings")
            .field("project_id", &self.project_id)
            .field("secret_key", &redacted(&self.secret_key))
            .field("base_url", &self.base_url)
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

/// Inbound webhook settings.
#[derive(Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct WebhookSettings {
    pub key: String,
}

impl std::fmt::Debug for WebhookSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WebhookSettings")
            .field("key", &redacted(&self.key))
            .finish()
    }
}

/// How messages are chosen during a broadcast tick.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BroadcastMode {
    /// A fresh random message for every contact.
    #[default]
    PerContact,
    /// One random message shared by every contact in the tick.
    PerTick,
}

impl std::str::FromStr for BroadcastMode {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "per_contact" | "per-contact" => Ok(Self::PerContact),
            "per_tick" | "per-tick" => Ok(Self::PerTick),
            other => Err(format!("unknown broadcast mode: {other}")),
        }
    }
}

/// Scheduler settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BroadcastSettings {
    pub interval_hours: u64,
    pub mode: BroadcastMode,
}

impl Default for BroadcastSettings {
    fn default() -> Self {
        Self {
            interval_hours: 1,
            mode: BroadcastMode::PerContact,
        }
    }
}

impl BroadcastSettings {
    pub fn interval(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.interval_hours.max(1).saturating_mul(3600))
    }
}

/// HTTP listener settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
    /// Seconds to wait for in-flight work during shutdown.
    pub shutdown_timeout_secs: u64,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 5000,
            shutdown_timeout_secs: 30,
        }
    }
}

/// Log output settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LoggingSettings {
    pub level: String,
    /// SQLite file receiving warn+ events. Empty disables persistence.
    pub log_db_path: String,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            log_db_path: "sched-logs.db".to_string(),
        }
    }
}

fn redacted(value: &str) -> &'static str {
    if value.is_empty() {
        "<unset>"
    } else {
        "[REDACTED]"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let settings = SchedSettings::default();
        assert_eq!(settings.database_url, "sqlite:///sched.db");
        assert_eq!(settings.gateway.base_url, "https://api.telerivet.com");
        assert_eq!(settings.gateway.timeout_secs, 10);
        assert_eq!(settings.broadcast.interval_hours, 1);
        assert_eq!(settings.broadcast.mode, BroadcastMode::PerContact);
        assert_eq!(settings.server.port, 5000);
    }

    #[test]
    fn interval_in_hours() {
        let b = BroadcastSettings {
            interval_hours: 3,
            ..Default::default()
        };
        assert_eq!(b.interval(), std::time::Duration::from_secs(3 * 3600));
    }

    #[test]
    fn interval_saturates_instead_of_overflowing() {
        let b = BroadcastSettings {
            interval_hours: u64::MAX,
            ..Default::default()
        };
        assert_eq!(b.interval(), std::time::Duration::from_secs(u64::MAX));
    }

    #[test]
    fn broadcast_mode_parsing() {
        assert_eq!("per_tick".parse::<BroadcastMode>(), Ok(BroadcastMode::PerTick));
        assert_eq!("Per-Contact".parse::<BroadcastMode>(), Ok(BroadcastMode::PerContact));
        assert!("hourly".parse::<BroadcastMode>().is_err());
    }

    #[test]
    fn secrets_redacted_in_debug() {
        let mut settings = SchedSettings::default();
        settings.gateway.secret_key = "api-secret".into();
        settings.webhook.key = "hook-secret".into();
        let rendered = format!("{settings:?}");
        assert!(!rendered.contains("api-secret"));
        assert!(!rendered.contains("hook-secret"));
        assert!(rendered.contains("[REDACTED]"));
    }

    #[test]
    fn partial_json_fills_defaults() {
        let settings: SchedSettings =
            serde_json::from_str(r#"{"broadcast": {"mode": "per_tick"}}"#).unwrap();
        assert_eq!(settings.broadcast.mode, BroadcastMode::PerTick);
        assert_eq!(settings.broadcast.interval_hours, 1);
    }
}
