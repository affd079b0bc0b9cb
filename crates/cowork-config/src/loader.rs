// SPDX-FileCopyrightText: 2026 Cowork Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration loader using Figment for layered config merging.
//!
//! Lookup order: `./cowork.toml` > `~/.config/cowork/cowork.toml` >
//! `/etc/cowork/cowork.toml`, with `COWORK_` environment overrides on top.

#![allow(clippy::result_large_err)] // figment::Error is external and cannot be boxed without wrapper

use std::path::{Path, PathBuf};

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};

use crate::model::CoworkConfig;

/// System-wide config file.
pub const SYSTEM_CONFIG_PATH: &str = "/etc/cowork/cowork.toml";

/// Config file in the working directory.
pub const LOCAL_CONFIG_FILE: &str = "cowork.toml";

/// Env-key prefixes and the dotted section they map to. Longer (nested)
/// prefixes come first so `resilience_queue_concurrency` lands in
/// `resilience.queue.concurrency`, not `resilience.queue_concurrency`.
const SECTION_PREFIXES: &[(&str, &str)] = &[
    ("resilience_breaker_", "resilience.breaker."),
    ("resilience_dispatcher_", "resilience.dispatcher."),
    ("resilience_queue_", "resilience.queue."),
    ("agent_", "agent."),
    ("storage_", "storage."),
    ("business_", "business."),
    ("capacity_", "capacity."),
    ("confirmation_", "confirmation."),
];

/// User XDG config file path, if a config dir exists.
pub fn user_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("cowork").join("cowork.toml"))
}

/// Build the layered Figment without extracting it.
///
/// Merge order (later overrides earlier):
/// 1. Compiled defaults
/// 2. `/etc/cowork/cowork.toml`
/// 3. `~/.config/cowork/cowork.toml`
/// 4. `./cowork.toml`
/// 5. `COWORK_*` environment variables
pub fn build_figment() -> Figment {
    Figment::new()
        .merge(Serialized::defaults(CoworkConfig::default()))
        .merge(Toml::file(SYSTEM_CONFIG_PATH))
        .merge(Toml::file(user_config_path().unwrap_or_default()))
        .merge(Toml::file(LOCAL_CONFIG_FILE))
        .merge(env_provider())
}

/// Load configuration from the standard hierarchy with env var overrides.
pub fn load_config() -> Result<CoworkConfig, figment::Error> {
    build_figment().extract()
}

/// Load configuration from a TOML string only (no files, no env).
pub fn load_config_from_str(toml_content: &str) -> Result<CoworkConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(CoworkConfig::default()))
        .merge(Toml::string(toml_content))
        .extract()
}

/// Load configuration from an explicit file path with env var overrides.
pub fn load_config_from_path(path: &Path) -> Result<CoworkConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(CoworkConfig::default()))
        .merge(Toml::file(path))
        .merge(env_provider())
        .extract()
}

/// Map a lowercased, prefix-stripped env key to its dotted config path.
///
/// `Env::split("_")` cannot be used because keys themselves contain
/// underscores (`pending_ttl_minutes`).
pub fn map_env_key(key: &str) -> String {
    for (prefix, section) in SECTION_PREFIXES {
        if let Some(rest) = key.strip_prefix(prefix) {
            return format!("{section}{rest}");
        }
    }
    key.to_string()
}

fn env_provider() -> Env {
    Env::prefixed("COWORK_").map(|key| map_env_key(key.as_str()).into())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn env_keys_map_to_sections() {
        assert_eq!(map_env_key("agent_log_level"), "agent.log_level");
        assert_eq!(map_env_key("storage_database_path"), "storage.database_path");
        assert_eq!(
            map_env_key("confirmation_pending_ttl_minutes"),
            "confirmation.pending_ttl_minutes"
        );
        assert_eq!(map_env_key("capacity_meeting_room"), "capacity.meeting_room");
    }

    #[test]
    fn nested_resilience_keys_map_to_subsections() {
        assert_eq!(
            map_env_key("resilience_dispatcher_timeout_ms"),
            "resilience.dispatcher.timeout_ms"
        );
        assert_eq!(
            map_env_key("resilience_breaker_failure_threshold"),
            "resilience.breaker.failure_threshold"
        );
        assert_eq!(
            map_env_key("resilience_queue_concurrency"),
            "resilience.queue.concurrency"
        );
    }

    #[test]
    fn unknown_keys_pass_through() {
        assert_eq!(map_env_key("mystery"), "mystery");
    }

    #[test]
    fn from_str_overrides_defaults() {
        let config = load_config_from_str("[capacity]\ndesk = 4\n").unwrap();
        assert_eq!(config.capacity.desk, 4);
        assert_eq!(config.capacity.meeting_room, 1);
    }
}
