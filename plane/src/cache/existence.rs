//! Deployment existence cache
//!
//! Remembers whether `{prefix}/index.html` exists so the proxy does not hit
//! the artifact repository on every request. Hits and misses have separate
//! TTLs. Invalidation is process-local: other proxy processes converge once
//! their entry expires.

use std::time::Duration;

use moka::sync::Cache;

/// Existence cache options
#[derive(Debug, Clone)]
pub struct Options {
    /// Maximum entries per table
    pub capacity: u64,

    /// How long a found deployment is remembered
    pub positive_ttl: Duration,

    /// How long a missing deployment is remembered
    pub negative_ttl: Duration,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            capacity: 10_000,
            positive_ttl: Duration::from_secs(30),
            negative_ttl: Duration::from_secs(5),
        }
    }
}

/// Cached answers of the existence check and of alias resolution
#[derive(Clone)]
pub struct ExistenceCache {
    found: Cache<String, ()>,
    missing: Cache<String, ()>,
    aliases: Cache<String, Option<String>>,
}

impl ExistenceCache {
    pub fn new(options: &Options) -> Self {
        Self {
            found: Cache::builder()
                .max_capacity(options.capacity)
                .time_to_live(options.positive_ttl)
                .build(),
            missing: Cache::builder()
                .max_capacity(options.capacity)
                .time_to_live(options.negative_ttl)
                .build(),
            aliases: Cache::builder()
                .max_capacity(options.capacity)
                .time_to_live(options.negative_ttl)
                .build(),
        }
    }

    /// `Some(true)` if known to exist, `Some(false)` if known missing
    pub fn get(&self, prefix: &str) -> Option<bool> {
        if self.found.contains_key(prefix) {
            return Some(true);
        }
        if self.missing.contains_key(prefix) {
            return Some(false);
        }
        None
    }

    pub fn insert(&self, prefix: &str, exists: bool) {
        if exists {
            self.missing.invalidate(prefix);
            self.found.insert(prefix.to_string(), ());
        } else {
            self.found.invalidate(prefix);
            self.missing.insert(prefix.to_string(), ());
        }
    }

    /// Cached alias resolution: `Some(None)` means the label is no alias
    pub fn alias(&self, label: &str) -> Option<Option<String>> {
        self.aliases.get(label)
    }

    pub fn insert_alias(&self, label: &str, target: Option<String>) {
        self.aliases.insert(label.to_string(), target);
    }

    /// Forget everything known about a deployment prefix. Aliases may point
    /// at it, so they are dropped too.
    pub fn invalidate(&self, prefix: &str) {
        self.found.invalidate(prefix);
        self.missing.invalidate(prefix);
        self.aliases.invalidate_all();
    }

    pub fn invalidate_all(&self) {
        self.found.invalidate_all();
        self.missing.invalidate_all();
        self.aliases.invalidate_all();
    }
}

impl Default for ExistenceCache {
    fn default() -> Self {
        Self::new(&Options::default())
    }
}
