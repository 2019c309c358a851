//! Process-global environment mutation helpers.
//!
//! Config tests mutate real environment variables. They hold [`env_lock`]
//! for their whole body and restore every touched variable through
//! [`EnvGuard`].

use std::sync::{Mutex, MutexGuard, OnceLock};

/// Process-wide mutex serializing environment mutation in tests.
pub fn env_lock() -> &'static Mutex<()> {
    static LOCK: OnceLock<Mutex<()>> = OnceLock::new();
    LOCK.get_or_init(|| Mutex::new(()))
}

/// Acquire [`env_lock`], recovering from a test that panicked while holding it.
pub fn lock_env() -> MutexGuard<'static, ()> {
    env_lock()
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Set an environment variable.
///
/// Newer toolchains mark env mutation `unsafe`; older ones warn about the
/// redundant block.
#[allow(unused_unsafe)]
pub fn set_env_var(key: &str, value: &str) {
    // SAFETY: callers hold `env_lock` while other test threads may read the env.
    unsafe {
        std::env::set_var(key, value);
    }
}

/// Remove an environment variable. See [`set_env_var`].
#[allow(unused_unsafe)]
pub fn remove_env_var(key: &str) {
    // SAFETY: callers hold `env_lock` while other test threads may read the env.
    unsafe {
        std::env::remove_var(key);
    }
}

/// Restores a set of environment variables to their prior values on drop.
#[derive(Default)]
pub struct EnvGuard {
    saved: Vec<(String, Option<String>)>,
}

impl EnvGuard {
    /// Guard that remembers nothing yet.
    pub fn new() -> Self {
        Self::default()
    }

    /// Guard created by setting `key=value`.
    pub fn set(key: &str, value: &str) -> Self {
        let mut guard = Self::new();
        guard.with(key, value);
        guard
    }

    /// Guard created by removing `key`.
    pub fn remove(key: &str) -> Self {
        let mut guard = Self::new();
        guard.without(key);
        guard
    }

    /// Set `key=value` until the guard drops.
    pub fn with(&mut self, key: &str, value: &str) -> &mut Self {
        self.remember(key);
        set_env_var(key, value);
        self
    }

    /// Remove `key` until the guard drops.
    pub fn without(&mut self, key: &str) -> &mut Self {
        self.remember(key);
        remove_env_var(key);
        self
    }

    fn remember(&mut self, key: &str) {
        // Keep the first saved value so repeated overrides restore the initial one.
        if self.saved.iter().any(|(saved, _)| saved == key) {
            return;
        }
        self.saved.push((key.to_string(), std::env::var(key).ok()));
    }
}

impl Drop for EnvGuard {
    fn drop(&mut self) {
        for (key, previous) in self.saved.drain(..).rev() {
            match previous {
                Some(value) => set_env_var(&key, &value),
                None => remove_env_var(&key),
            }
        }
    }
}
