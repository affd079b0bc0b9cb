// SPDX-FileCopyrightText: 2026 Cowork Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Process-wide set of circuit breakers keyed by integration name.

use std::collections::HashMap;
use std::sync::Arc;

use cowork_config::ResilienceConfig;
use dashmap::DashMap;

use crate::circuit_breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitStatus};

/// Lazily creates one breaker per circuit id.
///
/// Built once at startup and passed to whoever needs it; there is no global.
#[derive(Debug, Default)]
pub struct CircuitBreakerRegistry {
    defaults: CircuitBreakerConfig,
    overrides: HashMap<String, CircuitBreakerConfig>,
    breakers: DashMap<String, Arc<CircuitBreaker>>,
}

impl CircuitBreakerRegistry {
    pub fn new(defaults: CircuitBreakerConfig) -> Self {
        Self {
            defaults,
            overrides: HashMap::new(),
            breakers: DashMap::new(),
        }
    }

    /// Registry using the `[resilience.breaker]` defaults and the
    /// `[resilience.circuits.<name>]` overrides.
    pub fn from_config(config: &ResilienceConfig) -> Self {
        Self {
            defaults: CircuitBreakerConfig::from(&config.breaker),
            overrides: config
                .circuits
                .iter()
                .map(|(name, c)| (name.clone(), CircuitBreakerConfig::from(c)))
                .collect(),
            breakers: DashMap::new(),
        }
    }

    /// Overrides the thresholds for one circuit. Only affects breakers
    /// created after the call.
    pub fn with_override(mut self, name: impl Into<String>, config: CircuitBreakerConfig) -> Self {
        self.overrides.insert(name.into(), config);
        self
    }

    /// The breaker for `name`, created on first use.
    pub fn get(&self, name: &str) -> Arc<CircuitBreaker> {
        if let Some(existing) = self.breakers.get(name) {
            return Arc::clone(existing.value());
        }
        let config = self
            .overrides
            .get(name)
            .cloned()
            .unwrap_or_else(|| self.defaults.clone());
        self.breakers
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(CircuitBreaker::new(name, config)))
            .value()
            .clone()
    }

    /// Status of every breaker created so far, sorted by name.
    pub fn statuses(&self) -> Vec<CircuitStatus> {
        let mut statuses: Vec<_> = self.breakers.iter().map(|b| b.status()).collect();
        statuses.sort_by(|a, b| a.name.cmp(&b.name));
        statuses
    }

    pub fn reset_all(&self) {
        for breaker in self.breakers.iter() {
            breaker.reset();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cowork_config::BreakerConfig;

    #[test]
    fn same_name_returns_same_breaker() {
        let registry = CircuitBreakerRegistry::default();
        let a = registry.get("email");
        let b = registry.get("email");
        assert!(Arc::ptr_eq(&a, &b));
        assert!(!Arc::ptr_eq(&a, &registry.get("calendar")));
    }

    #[test]
    fn overrides_apply_by_name() {
        let mut config = ResilienceConfig::default();
        config.circuits.insert(
            "calendar".into(),
            BreakerConfig {
                failure_threshold: 1,
                ..BreakerConfig::default()
            },
        );
        let registry = CircuitBreakerRegistry::from_config(&config);
        assert_eq!(registry.get("calendar").config().failure_threshold, 1);
        assert_eq!(registry.get("email").config().failure_threshold, 5);
    }

    #[test]
    fn statuses_are_sorted_and_reset_all_closes() {
        let registry = CircuitBreakerRegistry::default();
        registry.get("notify:messaging").force_open();
        registry.get("notify:calendar");
        let names: Vec<_> = registry.statuses().into_iter().map(|s| s.name).collect();
        assert_eq!(names, ["notify:calendar", "notify:messaging"]);

        registry.reset_all();
        assert!(
            registry
                .statuses()
                .iter()
                .all(|s| s.state == crate::CircuitState::Closed)
        );
    }
}
