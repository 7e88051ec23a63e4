//! Last observed state of externally sourced files.
//!
//! Entries only let the resolver skip a fetch; dropping or evicting one never
//! changes generated output.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use moka::sync::Cache;

use crate::resource::ObjectKey;

/// Identity of one external file, at one reference, as seen by one object.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TrackerKey {
    pub object: ObjectKey,
    pub repo: String,
    pub path: String,
    /// Branch, tag or commit; the remote's default branch when `None`.
    pub reference: Option<String>,
}

impl TrackerKey {
    pub fn new(object: ObjectKey, repo: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            object,
            repo: repo.into(),
            path: path.into(),
            reference: None,
        }
    }

    pub fn at(mut self, reference: Option<&str>) -> Self {
        self.reference = reference.map(str::to_string);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GitStateRecord {
    /// Commit the file was read at.
    pub revision: String,
    /// Hex SHA-256 of the content read.
    pub digest: String,
    pub observed_at: DateTime<Utc>,
}

impl GitStateRecord {
    pub fn new(revision: impl Into<String>, digest: impl Into<String>) -> Self {
        Self {
            revision: revision.into(),
            digest: digest.into(),
            observed_at: Utc::now(),
        }
    }
}

/// Concurrent, bounded map of [`TrackerKey`] to [`GitStateRecord`].
///
/// Cloning is cheap and clones share entries.
#[derive(Clone)]
pub struct GitStateTracker {
    cache: Option<Cache<TrackerKey, Arc<GitStateRecord>>>,
}

impl GitStateTracker {
    pub fn new(capacity: u64) -> Self {
        Self {
            cache: Some(Cache::builder().max_capacity(capacity).build()),
        }
    }

    /// A tracker that remembers nothing; every resolution fetches.
    pub fn disabled() -> Self {
        Self { cache: None }
    }

    pub fn from_settings(settings: &crate::config::TrackerSettings) -> Self {
        if settings.enabled {
            Self::new(settings.capacity)
        } else {
            Self::disabled()
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.cache.is_some()
    }

    pub fn lookup(&self, key: &TrackerKey) -> Option<Arc<GitStateRecord>> {
        self.cache.as_ref()?.get(key)
    }

    pub fn update(&self, key: TrackerKey, record: GitStateRecord) {
        if let Some(cache) = &self.cache {
            cache.insert(key, Arc::new(record));
        }
    }

    pub fn invalidate(&self, key: &TrackerKey) {
        if let Some(cache) = &self.cache {
            cache.invalidate(key);
        }
    }

    /// Drops every entry recorded for `object`, e.g. after it was deleted.
    pub fn invalidate_object(&self, object: &ObjectKey) {
        let Some(cache) = &self.cache else {
            return;
        };
        let stale: Vec<TrackerKey> = cache
            .iter()
            .filter(|(key, _)| &key.object == object)
            .map(|(key, _)| (*key).clone())
            .collect();
        for key in stale {
            cache.invalidate(&key);
        }
    }

    /// Number of live entries. Approximate while writes are in flight.
    pub fn len(&self) -> u64 {
        match &self.cache {
            Some(cache) => {
                cache.run_pending_tasks();
                cache.entry_count()
            }
            None => 0,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl std::fmt::Debug for GitStateTracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GitStateTracker")
            .field("enabled", &self.is_enabled())
            .finish()
    }
}
