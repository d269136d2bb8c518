//! Engine-internal LRU caches.
//!
//! Two caches sit inside the engine: a compile-environment cache keyed by
//! the *shape* of the variable scope (its sorted top-level names, not its
//! values), and a program cache keyed by environment key plus expression
//! text. Identical expressions reused across for-each iterations or across
//! reconciles hit the program cache. Locks are fine-grained and never held
//! across parsing.

use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex};

use lru::LruCache;

use super::eval::TypeEnv;
use super::parse::Expr;

/// Default capacity of the environment cache.
pub const ENV_CACHE_CAPACITY: usize = 100;

/// Default capacity of the program cache.
pub const PROGRAM_CACHE_CAPACITY: usize = 2000;

/// Cache of compile environments keyed by sorted variable names.
pub struct EnvCache {
    entries: Mutex<LruCache<String, Arc<TypeEnv>>>,
}

impl EnvCache {
    /// Cache bounded to `capacity` entries.
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: Mutex::new(LruCache::new(
                NonZeroUsize::new(capacity.max(1)).expect("capacity clamped to >= 1"),
            )),
        }
    }

    /// Cache key for a variable scope: sorted top-level names.
    pub fn key_for(names: impl Iterator<Item = String>) -> String {
        let mut names: Vec<String> = names.collect();
        names.sort_unstable();
        names.join(",")
    }

    /// Fetch a cached environment.
    pub fn get(&self, key: &str) -> Option<Arc<TypeEnv>> {
        self.entries
            .lock()
            .expect("env cache lock poisoned")
            .get(key)
            .cloned()
    }

    /// Insert an environment built outside the lock.
    pub fn insert(&self, key: String, env: Arc<TypeEnv>) {
        self.entries
            .lock()
            .expect("env cache lock poisoned")
            .put(key, env);
    }

    /// Number of cached environments.
    pub fn len(&self) -> usize {
        self.entries.lock().expect("env cache lock poisoned").len()
    }

    /// Whether the cache is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Cache of parsed, checked programs keyed by (env key, expression text).
pub struct ProgramCache {
    entries: Mutex<LruCache<(String, String), Arc<Expr>>>,
}

impl ProgramCache {
    /// Cache bounded to `capacity` entries.
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: Mutex::new(LruCache::new(
                NonZeroUsize::new(capacity.max(1)).expect("capacity clamped to >= 1"),
            )),
        }
    }

    /// Fetch a cached program.
    pub fn get(&self, env_key: &str, source: &str) -> Option<Arc<Expr>> {
        self.entries
            .lock()
            .expect("program cache lock poisoned")
            .get(&(env_key.to_string(), source.to_string()))
            .cloned()
    }

    /// Insert a program compiled outside the lock.
    pub fn insert(&self, env_key: String, source: String, program: Arc<Expr>) {
        self.entries
            .lock()
            .expect("program cache lock poisoned")
            .put((env_key, source), program);
    }

    /// Number of cached programs.
    pub fn len(&self) -> usize {
        self.entries
            .lock()
            .expect("program cache lock poisoned")
            .len()
    }

    /// Whether the cache is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
