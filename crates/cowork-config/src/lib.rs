// SPDX-FileCopyrightText: 2026 Cowork Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration for the cowork reservation core.
//!
//! Layered TOML loading (system, user, working directory) with `COWORK_*`
//! environment overrides, strict `deny_unknown_fields` parsing and miette
//! diagnostics that suggest the key you probably meant.
//!
//! ```no_run
//! use cowork_config::load_and_validate;
//!
//! let config = load_and_validate().expect("config errors");
//! println!("desks: {}", config.capacity.desk);
//! ```

pub mod diagnostic;
pub mod loader;
pub mod model;
pub mod validation;

pub use diagnostic::{ConfigError, render_errors};
pub use loader::{load_config, load_config_from_path, load_config_from_str};
pub use model::{
    AgentConfig, BreakerConfig, BusinessConfig, CapacityConfig, ConfirmationConfig,
    CoworkConfig, DispatcherConfig, HoursConfig, QueueConfig, ResilienceConfig, StorageConfig,
};

use std::path::Path;

/// Load from the standard file hierarchy plus environment, then validate.
pub fn load_and_validate() -> Result<CoworkConfig, Vec<ConfigError>> {
    finish(loader::load_config(), collect_toml_sources)
}

/// Load from an explicit file plus environment, then validate.
pub fn load_and_validate_path(path: &Path) -> Result<CoworkConfig, Vec<ConfigError>> {
    finish(loader::load_config_from_path(path), || {
        std::fs::read_to_string(path)
            .map(|content| vec![(path.display().to_string(), content)])
            .unwrap_or_default()
    })
}

/// Load from a TOML string (no files, no env), then validate.
pub fn load_and_validate_str(toml_content: &str) -> Result<CoworkConfig, Vec<ConfigError>> {
    finish(loader::load_config_from_str(toml_content), || {
        vec![("<inline>".to_string(), toml_content.to_string())]
    })
}

fn finish(
    loaded: Result<CoworkConfig, figment::Error>,
    sources: impl FnOnce() -> Vec<(String, String)>,
) -> Result<CoworkConfig, Vec<ConfigError>> {
    match loaded {
        Ok(config) => {
            validation::validate_config(&config)?;
            Ok(config)
        }
        Err(err) => Err(diagnostic::figment_to_config_errors(err, &sources())),
    }
}

/// Contents of whichever standard config files exist, for span lookup.
fn collect_toml_sources() -> Vec<(String, String)> {
    let local = std::env::current_dir()
        .map(|d| d.join(loader::LOCAL_CONFIG_FILE))
        .unwrap_or_else(|_| loader::LOCAL_CONFIG_FILE.into());

    [
        Some(local),
        loader::user_config_path(),
        Some(loader::SYSTEM_CONFIG_PATH.into()),
    ]
    .into_iter()
    .flatten()
    .filter_map(|path| {
        std::fs::read_to_string(&path)
            .ok()
            .map(|content| (path.display().to_string(), content))
    })
    .collect()
}
