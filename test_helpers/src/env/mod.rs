//! Guards for mutating process environment variables in tests.
//!
//! Mutations are serialised through a global re-entrant mutex. Each guard
//! restores the variable's previous value (or absence) when dropped, so
//! stacked guards for the same key unwind in LIFO order.
//!
//! # Examples
//!
//! ```
//! use stratum_test_helpers::env;
//!
//! let _ci = env::set_var("CI", "true");
//! assert_eq!(std::env::var("CI").as_deref(), Ok("true"));
//! ```

use std::env;
use std::ffi::{OsStr, OsString};
use std::sync::LazyLock;

use parking_lot::{ReentrantMutex, ReentrantMutexGuard};

static ENV_MUTEX: LazyLock<ReentrantMutex<()>> = LazyLock::new(ReentrantMutex::default);

/// Variables that make the gate treat a process as running under CI.
pub const CI_VARS: [&str; 2] = ["CI", "GITHUB_ACTIONS"];

/// RAII guard restoring an environment variable on drop.
#[must_use = "dropping restores the prior value"]
#[derive(Debug)]
pub struct EnvVarGuard {
    key: String,
    original: Option<OsString>,
}

impl Drop for EnvVarGuard {
    fn drop(&mut self) {
        let _lock = ENV_MUTEX.lock();
        match self.original.take() {
            // SAFETY: environment access is serialised by `ENV_MUTEX`.
            Some(value) => unsafe { env::set_var(&self.key, value) },
            // SAFETY: environment access is serialised by `ENV_MUTEX`.
            None => unsafe { env::remove_var(&self.key) },
        }
    }
}

/// Holds the environment lock for as long as it lives.
#[must_use = "dropping releases the environment lock"]
pub struct EnvLock {
    _guard: ReentrantMutexGuard<'static, ()>,
}

/// Acquire exclusive access to the environment across several mutations.
pub fn lock() -> EnvLock {
    EnvLock {
        _guard: ENV_MUTEX.lock(),
    }
}

fn mutate<F>(key: String, apply: F) -> EnvVarGuard
where
    F: FnOnce(&str),
{
    let _lock = ENV_MUTEX.lock();
    let original = env::var_os(&key);
    apply(&key);
    EnvVarGuard { key, original }
}

/// Set `key` to `value` until the returned guard is dropped.
pub fn set_var<K, V>(key: K, value: V) -> EnvVarGuard
where
    K: Into<String>,
    V: AsRef<OsStr>,
{
    // SAFETY: environment access is serialised by `ENV_MUTEX`.
    mutate(key.into(), |k| unsafe { env::set_var(k, value.as_ref()) })
}

/// Remove `key` until the returned guard is dropped.
pub fn remove_var<K>(key: K) -> EnvVarGuard
where
    K: Into<String>,
{
    // SAFETY: environment access is serialised by `ENV_MUTEX`.
    mutate(key.into(), |k| unsafe { env::remove_var(k) })
}

/// Remove every CI marker variable, so detection depends only on the TTY.
pub fn without_ci() -> Vec<EnvVarGuard> {
    CI_VARS.into_iter().map(remove_var).collect()
}
