//! # sched-settings
//!
//! Settings are loaded from three layers (in priority order):
//! 1. **Compiled defaults**: [`SchedSettings::default()`]
//! 2. **Settings file**: `$SCHED_SETTINGS` or `./sched.json` (deep-merged over defaults)
//! 3. **Environment variables**: `DATABASE_URL`, `PROJECT_ID`, `SECRET_KEY`,
//!    `WEBHOOK_KEY`, `BROADCAST_*`, `GATEWAY_*`, `SCHED_*` (highest priority)
//!
//! Settings are loaded once in `main` and handed to each component; there is
//! no global instance.

#![deny(unsafe_code)]

pub mod errors;
pub mod loader;
pub mod types;

pub use errors::{Result, SettingsError};
pub use loader::{apply_overrides, deep_merge, load_settings, load_settings_from_path, settings_path};
pub use types::*;

impl SchedSettings {
    /// Gateway credentials are required by anything that sends messages.
    pub fn require_gateway(&self) -> Result<()> {
        if self.gateway.project_id.is_empty() {
            return Err(SettingsError::Missing("PROJECT_ID"));
        }
        if self.gateway.secret_key.is_empty() {
            return Err(SettingsError::Missing("SECRET_KEY"));
        }
        Ok(())
    }

    /// The webhook key is required to accept inbound commands.
    pub fn require_webhook(&self) -> Result<()> {
        if self.webhook.key.is_empty() {
            return Err(SettingsError::Missing("WEBHOOK_KEY"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_lack_credentials() {
        let settings = SchedSettings::default();
        assert!(matches!(settings.require_gateway(), Err(SettingsError::Missing("PROJECT_ID"))));
        assert!(matches!(settings.require_webhook(), Err(SettingsError::Missing("WEBHOOK_KEY"))));
    }

    #[test]
    fn secret_key_checked_after_project() {
        let mut settings = SchedSettings::default();
        settings.gateway.project_id = "PJ1".into();
        assert!(matches!(settings.require_gateway(), Err(SettingsError::Missing("SECRET_KEY"))));
        settings.gateway.secret_key = "sk".into();
        assert!(settings.require_gateway().is_ok());
    }
}
