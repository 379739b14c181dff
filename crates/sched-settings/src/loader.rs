//! Settings loading with deep merge and environment variable overrides.
//!
//! Loading flow:
//! 1. Start with compiled [`SchedSettings::default()`]
//! 2. If the settings file exists, deep-merge its values over defaults
//! 3. Apply environment variable overrides (highest priority)
//!
//! Deep merge rules:
//! - Objects are merged recursively (source overrides target per-key)
//! - Arrays and primitives are replaced entirely by source
//! - Null values in source are skipped (preserving target)

use std::ops::RangeInclusive;
use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::debug;

use crate::errors::Result;
use crate::types::{BroadcastMode, SchedSettings};

const INTERVAL_HOURS: RangeInclusive<u64> = 1..=8760;
const GATEWAY_TIMEOUT_SECS: RangeInclusive<u64> = 1..=300;

/// Resolve the settings file path: `$SCHED_SETTINGS`, else `./sched.json`.
pub fn settings_path() -> PathBuf {
    std::env::var("SCHED_SETTINGS")
        .ok()
        .filter(|v| !v.is_empty())
        .map_or_else(|| PathBuf::from("sched.json"), PathBuf::from)
}

/// Load settings from the default path with env var overrides.
pub fn load_settings() -> Result<SchedSettings> {
    load_settings_from_path(&settings_path())
}

/// Load settings from a specific path with env var overrides.
///
/// If the file does not exist, returns defaults. If the file contains
/// invalid JSON, returns an error.
pub fn load_settings_from_path(path: &Path) -> Result<SchedSettings> {
    let mut settings = read_settings_file(path)?;
    apply_env_overrides(&mut settings);
    Ok(settings)
}

fn read_settings_file(path: &Path) -> Result<SchedSettings> {
    let defaults = serde_json::to_value(SchedSettings::default())?;

    let merged = if path.exists() {
        debug!(?path, "loading settings from file");
        let content = std::fs::read_to_string(path)?;
        let user: Value = serde_json::from_str(&content)?;
        deep_merge(defaults, user)
    } else {
        debug!(?path, "settings file not found, using defaults");
        defaults
    };

    let mut settings: SchedSettings = serde_json::from_value(merged)?;
    clamp_file_values(&mut settings);
    Ok(settings)
}

/// Pull file-sourced numbers into the same ranges the env overrides accept.
fn clamp_file_values(settings: &mut SchedSettings) {
    settings.broadcast.interval_hours = clamp_u64(
        "broadcast.intervalHours",
        settings.broadcast.interval_hours,
        INTERVAL_HOURS,
    );
    settings.gateway.timeout_secs = clamp_u64(
        "gateway.timeoutSecs",
        settings.gateway.timeout_secs,
        GATEWAY_TIMEOUT_SECS,
    );
}

fn clamp_u64(key: &str, value: u64, range: RangeInclusive<u64>) -> u64 {
    let clamped = value.clamp(*range.start(), *range.end());
    if clamped != value {
        tracing::warn!(key, value, clamped, "settings value out of range, clamping");
    }
    clamped
}

/// Recursive deep merge of two JSON values.
pub fn deep_merge(target: Value, source: Value) -> Value {
    match (target, source) {
        (Value::Object(mut target_map), Value::Object(source_map)) => {
            for (key, source_val) in source_map {
                if source_val.is_null() {
                    continue;
                }
                let merged = if let Some(target_val) = target_map.remove(&key) {
                    deep_merge(target_val, source_val)
                } else {
                    source_val
                };
                let _ = target_map.insert(key, merged);
            }
            Value::Object(target_map)
        }
        (_, source) => source,
    }
}

/// Apply process environment overrides to loaded settings.
pub fn apply_env_overrides(settings: &mut SchedSettings) {
    apply_overrides(settings, |name| std::env::var(name).ok());
}

/// Apply overrides read through `lookup`.
///
/// Invalid values are ignored with a warning (fall back to file/default).
pub fn apply_overrides<F>(settings: &mut SchedSettings, lookup: F)
where
    F: Fn(&str) -> Option<String>,
{
    let env = EnvReader { lookup };

    if let Some(v) = env.string("DATABASE_URL") {
        settings.database_url = v;
    }

    // ── Gateway ─────────────────────────────────────────────────────
    if let Some(v) = env.string("PROJECT_ID") {
        settings.gateway.project_id = v;
    }
    if let Some(v) = env.string("SECRET_KEY") {
        settings.gateway.secret_key = v;
    }
    if let Some(v) = env.string("GATEWAY_BASE_URL") {
        settings.gateway.base_url = v.trim_end_matches('/').to_string();
    }
    if let Some(v) = env.u64(
        "GATEWAY_TIMEOUT_SECS",
        *GATEWAY_TIMEOUT_SECS.start(),
        *GATEWAY_TIMEOUT_SECS.end(),
    ) {
        settings.gateway.timeout_secs = v;
    }

    // ── Webhook ─────────────────────────────────────────────────────
    if let Some(v) = env.string("WEBHOOK_KEY") {
        settings.webhook.key = v;
    }

    // ── Broadcast ───────────────────────────────────────────────────
    if let Some(v) = env.u64(
        "BROADCAST_INTERVAL_HOURS",
        *INTERVAL_HOURS.start(),
        *INTERVAL_HOURS.end(),
    ) {
        settings.broadcast.interval_hours = v;
    }
    if let Some(v) = env.string("BROADCAST_MODE") {
        match v.parse::<BroadcastMode>() {
            Ok(mode) => settings.broadcast.mode = mode,
            Err(e) => tracing::warn!(key = "BROADCAST_MODE", value = %v, error = %e, "ignoring"),
        }
    }

    // ── Server ──────────────────────────────────────────────────────
    if let Some(v) = env.string("SCHED_HOST") {
        settings.server.host = v;
    }
    if let Some(v) = env.u16("SCHED_PORT", 1, 65535) {
        settings.server.port = v;
    }

    // ── Logging ─────────────────────────────────────────────────────
    if let Some(v) = env.string("SCHED_LOG_LEVEL") {
        settings.logging.level = v;
    }
    // An explicitly empty value turns persistence off.
    if let Some(v) = (env.lookup)("SCHED_LOG_DB") {
        settings.logging.log_db_path = v;
    }
}

// ── Pure parsing functions (testable without env vars) ──────────────────────

/// Parse a string as a `u16` within a range.
pub fn parse_u16_range(val: &str, min: u16, max: u16) -> Option<u16> {
    let n: u16 = val.trim().parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

/// Parse a string as a `u64` within a range.
pub fn parse_u64_range(val: &str, min: u64, max: u64) -> Option<u64> {
    let n: u64 = val.trim().parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

struct EnvReader<F> {
    lookup: F,
}

impl<F> EnvReader<F>
where
    F: Fn(&str) -> Option<String>,
{
    fn string(&self, name: &str) -> Option<String> {
        (self.lookup)(name).filter(|v| !v.is_empty())
    }

    fn u16(&self, name: &str, min: u16, max: u16) -> Option<u16> {
        let val = self.string(name)?;
        let result = parse_u16_range(&val, min, max);
        if result.is_none() {
            tracing::warn!(key = name, value = %val, "invalid u16 env var, ignoring");
        }
        result
    }

    fn u64(&self, name: &str, min: u64, max: u64) -> Option<u64> {
        let val = self.string(name)?;
        let result = parse_u64_range(&val, min, max);
        if result.is_none() {
            tracing::warn!(key = name, value = %val, "invalid u64 env var, ignoring");
        }
        result
    }
}
