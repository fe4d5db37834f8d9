//! Process-global library configuration (spec.md §6.2).
//!
//! A small module-scope singleton guarded by a mutex, initialized lazily,
//! as directed by spec.md §9 ("Global mutable state... small module-scope
//! singleton guarded by a mutex"). Tests configure it via the setters here.

use std::path::PathBuf;
use std::sync::{Mutex, OnceLock};

/// Default RAM cap before the swap allocator spills to the swap file: 32 MiB.
pub const DEFAULT_SWAP_MAX_MEMORY: i64 = 32 * 1024 * 1024;

struct Config {
    swap_file_name: Option<PathBuf>,
    swap_max_memory: i64,
    application_name: String,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            swap_file_name: None,
            swap_max_memory: DEFAULT_SWAP_MAX_MEMORY,
            application_name: "libinstpatch".to_string(),
        }
    }
}

fn config() -> &'static Mutex<Config> {
    static CONFIG: OnceLock<Mutex<Config>> = OnceLock::new();
    CONFIG.get_or_init(|| Mutex::new(Config::default()))
}

/// Sets the swap file path. Settable once in practice (subsequent calls
/// only take effect before the swap allocator's file is first opened).
pub fn set_swap_file_name(path: PathBuf) {
    config().lock().unwrap().swap_file_name = Some(path);
}

/// Returns the configured swap file path, or `None` if the default
/// (`tempfile`-provided, process-lifetime) location should be used.
pub fn swap_file_name() -> Option<PathBuf> {
    config().lock().unwrap().swap_file_name.clone()
}

/// Sets the RAM cap (bytes) before the swap allocator spills to disk.
/// `-1` means unlimited.
pub fn set_swap_max_memory(bytes: i64) {
    config().lock().unwrap().swap_max_memory = bytes;
}

pub fn swap_max_memory() -> i64 {
    config().lock().unwrap().swap_max_memory
}

/// Sets the informational application name used when writing SF2 `ISFT`.
pub fn set_application_name(name: impl Into<String>) {
    config().lock().unwrap().application_name = name.into();
}

pub fn application_name() -> String {
    config().lock().unwrap().application_name.clone()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        assert_eq!(swap_max_memory(), DEFAULT_SWAP_MAX_MEMORY);
    }

    #[test]
    fn setters_round_trip() {
        set_application_name("test-app");
        assert_eq!(application_name(), "test-app");
        set_swap_max_memory(-1);
        assert_eq!(swap_max_memory(), -1);
        // restore so other tests in this process see defaults again
        set_swap_max_memory(DEFAULT_SWAP_MAX_MEMORY);
    }
}
