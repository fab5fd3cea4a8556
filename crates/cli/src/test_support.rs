use std::sync::{Mutex, OnceLock};

fn env_lock() -> &'static Mutex<()> {
    static LOCK: OnceLock<Mutex<()>> = OnceLock::new();
    LOCK.get_or_init(|| Mutex::new(()))
}

/// Serializes tests that touch process-wide state (env vars, current dir).
pub(crate) fn with_locked_env<R>(run: impl FnOnce() -> R) -> R {
    let _guard = env_lock()
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner());
    run()
}

/// Sets an environment variable; call inside `with_locked_env`.
pub(crate) fn set_env_var(key: &str, value: &str) {
    // SAFETY: callers hold the env lock, so no other test thread reads or
    // writes the environment concurrently.
    unsafe {
        std::env::set_var(key, value);
    }
}

/// Removes an environment variable; call inside `with_locked_env`.
pub(crate) fn remove_env_var(key: &str) {
    // SAFETY: see `set_env_var`.
    unsafe {
        std::env::remove_var(key);
    }
}
