//! Cache facility used to persist session state across invocations
//!
//! The provider keeps cookies, the chosen user agent and resolved frame
//! rates in an external key-value store so short-lived invocations do not
//! have to log in (or re-fetch detail pages) every time. The store is
//! injected so hosts can plug in their own persistence; [`MemoryCache`] is
//! the in-process implementation used by tests and simple hosts.

use std::collections::HashMap;

use parking_lot::Mutex;

/// Cache key for the shared user-agent string
pub const USER_AGENT_KEY: &str = "titulky_user_agent";

/// Cache key for the premium backend cookie jar
pub const PREMIUM_COOKIEJAR_KEY: &str = "premium_titulky_cookiejar";

/// Cache key for the normal backend cookie jar
pub const NORMAL_COOKIEJAR_KEY: &str = "normal_titulky_cookiejar";

/// Cache key for the frame rate of a single subtitle entry
pub fn fps_key(sub_id: &str) -> String {
    format!("titulky_subs-{sub_id}_fps")
}

/// A get/set/delete key-value store with a distinguished "absent" state.
///
/// `get` returning `None` means the key was never set (or was deleted) and
/// differs from any cached value, including a cached JSON `null` used as the
/// "unknown fps" sentinel. Implementations must tolerate concurrent readers
/// and writers; each operation is atomic on its own.
pub trait CacheStore: Send + Sync {
    fn get(&self, key: &str) -> Option<String>;
    fn set(&self, key: &str, value: &str);
    fn delete(&self, key: &str);
}

/// In-memory [`CacheStore`] implementation
#[derive(Debug, Default)]
pub struct MemoryCache {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }
}

impl CacheStore for MemoryCache {
    fn get(&self, key: &str) -> Option<String> {
        self.entries.lock().get(key).cloned()
    }

    fn set(&self, key: &str, value: &str) {
        self.entries.lock().insert(key.to_string(), value.to_string());
    }

    fn delete(&self, key: &str) {
        self.entries.lock().remove(key);
    }
}
