// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
//! Readback tuning.
//!
//! Defaults suit a 60 Hz render loop. Every field can be overridden from the
//! environment, following the `from_env_or_default` convention wgpu uses for
//! its instance descriptor:
//!
//! | Variable | Field | Notes |
//! |---|---|---|
//! | `ASYNC_READBACK_QUEUE_CAPACITY` | [`ReadbackConfig::queue_capacity`] | clamped to at least 1 |
//! | `ASYNC_READBACK_MAX_PENDING_TICKS` | [`ReadbackConfig::max_pending_ticks`] | `0` disables |
//! | `ASYNC_READBACK_MAX_PENDING_MS` | [`ReadbackConfig::max_pending_age`] | `0` disables |
//! | `ASYNC_READBACK_FORCE_HOST_UPDATE` | [`ReadbackConfig::force_host_update`] | `1`/`true`/`0`/`false` |

use crate::sys::time::Duration;

pub const DEFAULT_QUEUE_CAPACITY: usize = 8;
pub const DEFAULT_MAX_PENDING_TICKS: u32 = 600;

const ENV_QUEUE_CAPACITY: &str = "ASYNC_READBACK_QUEUE_CAPACITY";
const ENV_MAX_PENDING_TICKS: &str = "ASYNC_READBACK_MAX_PENDING_TICKS";
const ENV_MAX_PENDING_MS: &str = "ASYNC_READBACK_MAX_PENDING_MS";
const ENV_FORCE_HOST_UPDATE: &str = "ASYNC_READBACK_FORCE_HOST_UPDATE";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadbackConfig {
    /// Maximum outstanding requests in a [`crate::ReadbackQueue`].
    pub queue_capacity: usize,
    /// Ticks a queue head may stay pending before it is expired.
    pub max_pending_ticks: Option<u32>,
    /// Wall-clock age after which a pending queue head is expired.
    pub max_pending_age: Option<Duration>,
    /// Ask the host readback to check for completion on every advance.
    pub force_host_update: bool,
    /// Level read by [`crate::Platform::request`].
    pub mip_level: u32,
}

impl Default for ReadbackConfig {
    fn default() -> Self {
        ReadbackConfig {
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            max_pending_ticks: Some(DEFAULT_MAX_PENDING_TICKS),
            max_pending_age: None,
            force_host_update: false,
            mip_level: 0,
        }
    }
}

fn parse<T: std::str::FromStr>(key: &str, value: &str) -> Option<T> {
    match value.trim().parse() {
        Ok(v) => Some(v),
        Err(_) => {
            logwise::warn_sync!(
                "ignoring {key}={value}: not a valid value",
                key = logwise::privacy::LogIt(&key),
                value = logwise::privacy::LogIt(&value)
            );
            None
        }
    }
}

fn parse_bool(key: &str, value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => {
            logwise::warn_sync!(
                "ignoring {key}={value}: expected a boolean",
                key = logwise::privacy::LogIt(&key),
                value = logwise::privacy::LogIt(&value)
            );
            None
        }
    }
}

impl ReadbackConfig {
    /// Defaults, overridden by any `ASYNC_READBACK_*` environment variables.
    pub fn from_env_or_default() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Defaults, overridden by whatever `lookup` returns for each variable name.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = ReadbackConfig::default();
        if let Some(v) = lookup(ENV_QUEUE_CAPACITY).and_then(|v| parse::<usize>(ENV_QUEUE_CAPACITY, &v)) {
            config.queue_capacity = v.max(1);
        }
        if let Some(v) = lookup(ENV_MAX_PENDING_TICKS).and_then(|v| parse::<u32>(ENV_MAX_PENDING_TICKS, &v)) {
            config.max_pending_ticks = (v != 0).then_some(v);
        }
        if let Some(v) = lookup(ENV_MAX_PENDING_MS).and_then(|v| parse::<u64>(ENV_MAX_PENDING_MS, &v)) {
            config.max_pending_age = (v != 0).then(|| Duration::from_millis(v));
        }
        if let Some(v) = lookup(ENV_FORCE_HOST_UPDATE).and_then(|v| parse_bool(ENV_FORCE_HOST_UPDATE, &v)) {
            config.force_host_update = v;
        }
        config
    }
}
