//! Alias-tolerant env lookup and `.env` loading.
//!
//! Grounded on `skilllite_core::config::loader`: the teacher hand-rolls its
//! own small `.env` parser rather than pulling in a crate, and centralizes
//! every `set_var`/`remove_var` call behind a couple of functions since
//! both are `unsafe` as of Rust 2024. We keep that shape rather than
//! introducing a dotenv crate for a handful of `KEY=VALUE` lines.

use std::collections::HashMap;
use std::env;
use std::path::Path;
use std::sync::Once;

static DEPRECATION_WARNED: Once = Once::new();

/// Lookup that tries the primary name first, then each alias, emitting a
/// one-time warning the first time an alias is the only reason a variable
/// resolved (keeps logs quiet in the common case).
pub fn env_or((primary, aliases): (&str, &[&str])) -> Option<String> {
    if let Ok(v) = env::var(primary) {
        return Some(v);
    }
    for alias in aliases {
        if let Ok(v) = env::var(alias) {
            DEPRECATION_WARNED.call_once(|| {
                tracing::warn!(primary, alias, "environment variable resolved via alias; prefer the primary name");
            });
            return Some(v);
        }
    }
    None
}

pub fn env_or_default(key: (&str, &[&str]), default: &str) -> String {
    env_or(key).unwrap_or_else(|| default.to_string())
}

pub fn env_bool(key: (&str, &[&str]), default: bool) -> bool {
    match env_or(key) {
        Some(v) => matches!(v.to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on"),
        None => default,
    }
}

pub fn env_usize(key: (&str, &[&str]), default: usize) -> usize {
    env_or(key).and_then(|v| v.parse().ok()).unwrap_or(default)
}

pub fn env_f64(key: (&str, &[&str]), default: f64) -> f64 {
    env_or(key).and_then(|v| v.parse().ok()).unwrap_or(default)
}

pub fn env_is_set(key: (&str, &[&str])) -> bool {
    env_or(key).is_some()
}

/// Parse a `.env` file (`KEY=VALUE` per line, `#` comments, blank lines
/// skipped, surrounding quotes stripped) and set each var unless already
/// present in the process environment, mirroring the teacher's
/// `load_dotenv`. Values already set by the caller's shell always win.
pub fn load_dotenv(path: &Path) -> std::io::Result<usize> {
    if !path.exists() {
        return Ok(0);
    }
    let contents = std::fs::read_to_string(path)?;
    let mut applied = 0;
    for line in contents.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let Some((key, value)) = line.split_once('=') else {
            continue;
        };
        let key = key.trim();
        let value = value.trim().trim_matches('"').trim_matches('\'');
        if env::var(key).is_ok() {
            continue;
        }
        // SAFETY: loader runs during startup before any worker threads
        // read the environment; callers must not invoke this concurrently
        // with other env mutation, same contract as `std::env::set_var`.
        unsafe {
            env::set_var(key, value);
        }
        applied += 1;
    }
    Ok(applied)
}

/// Snapshot + restore of a set of env vars, for tests that need to set
/// process-global state without leaking it across test cases.
pub struct ScopedEnvGuard {
    saved: HashMap<String, Option<String>>,
}

impl ScopedEnvGuard {
    pub fn set(pairs: &[(&str, &str)]) -> Self {
        let mut saved = HashMap::new();
        for (key, value) in pairs {
            saved.insert(key.to_string(), env::var(key).ok());
            // SAFETY: see `load_dotenv`; callers are expected to be
            // single-threaded test setup.
            unsafe {
                env::set_var(key, value);
            }
        }
        Self { saved }
    }
}

impl Drop for ScopedEnvGuard {
    fn drop(&mut self) {
        for (key, prior) in self.saved.drain() {
            unsafe {
                match prior {
                    Some(v) => env::set_var(&key, v),
                    None => env::remove_var(&key),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dotenv_does_not_override_existing_vars() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(".env");
        std::fs::write(&path, "DOCFLOW_TEST_LOADER_A=from_file\nDOCFLOW_TEST_LOADER_B=also_from_file\n").unwrap();
        let _guard = ScopedEnvGuard::set(&[("DOCFLOW_TEST_LOADER_A", "from_shell")]);
        load_dotenv(&path).unwrap();
        assert_eq!(env::var("DOCFLOW_TEST_LOADER_A").unwrap(), "from_shell");
        assert_eq!(env::var("DOCFLOW_TEST_LOADER_B").unwrap(), "also_from_file");
        unsafe { env::remove_var("DOCFLOW_TEST_LOADER_B") };
    }

    #[test]
    fn env_bool_parses_common_truthy_values() {
        let _guard = ScopedEnvGuard::set(&[("DOCFLOW_TEST_BOOL", "YES")]);
        assert!(env_bool(("DOCFLOW_TEST_BOOL", &[]), false));
    }
}
