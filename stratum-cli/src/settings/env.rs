//! Environment provider for settings overrides.
//!
//! Wraps [`Env`] so that text settings keep the variable's exact contents:
//! `STRATUM_RELEASE=2.0` stays the string `"2.0"` rather than becoming a
//! float. List settings accept a bracketed array or comma-separated values,
//! so `STRATUM_CI_ENV_VARS=CI,BUILDKITE` yields two entries.

use figment::providers::Env;
use figment::value::{Dict, Map, Value};
use figment::{Error, Metadata, Profile, Provider};

/// Settings kept verbatim.
const TEXT_KEYS: [&str; 3] = ["release", "state_root", "backend_root"];

/// Settings holding lists of strings.
const LIST_KEYS: [&str; 1] = ["ci_env_vars"];

/// Prefixed environment provider restricted to the overridable settings.
#[derive(Clone)]
pub(super) struct SettingsEnv {
    inner: Env,
}

impl SettingsEnv {
    /// Read the settings keys from variables starting with `prefix`.
    pub(super) fn prefixed(prefix: &str) -> Self {
        let keys: Vec<&str> = TEXT_KEYS.iter().chain(LIST_KEYS.iter()).copied().collect();
        Self {
            inner: Env::prefixed(prefix).only(&keys),
        }
    }

    fn parse_list(raw: &str) -> Value {
        let trimmed = raw.trim();
        if trimmed.starts_with('[') {
            return trimmed
                .parse()
                .unwrap_or_else(|_| Value::from(trimmed.to_owned()));
        }
        trimmed
            .split(',')
            .map(str::trim)
            .filter(|item| !item.is_empty())
            .map(|item| Value::from(item.to_owned()))
            .collect::<Vec<_>>()
            .into()
    }
}

impl Provider for SettingsEnv {
    fn metadata(&self) -> Metadata {
        self.inner.metadata()
    }

    fn profile(&self) -> Option<Profile> {
        Some(self.inner.profile.clone())
    }

    fn data(&self) -> Result<Map<Profile, Dict>, Error> {
        let mut dict = Dict::new();
        for (key, raw) in self.inner.iter() {
            let key = key.as_str().to_ascii_lowercase();
            let value = if LIST_KEYS.contains(&key.as_str()) {
                Self::parse_list(&raw)
            } else {
                Value::from(raw)
            };
            dict.insert(key, value);
        }
        Ok(self.inner.profile.collect(dict))
    }
}
