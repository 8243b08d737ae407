//! Codebase hash → database cache.
//!
//! A small JSON registry next to the databases maps every codebase hash to
//! the database built for it. A hit lets a run skip parsing entirely.
//!
//! Every read-modify-write of a registry holds a process-wide lock keyed by
//! the registry path, so managers created by concurrent runs serialize on
//! the same file. Separate processes sharing a registry resolve to
//! last-writer-wins; every database is a complete snapshot, so any
//! surviving entry is valid.

use std::collections::BTreeMap;
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock};

use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use lru::LruCache;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::hasher::CodebaseHash;
use crate::store::{unique_sibling, DatabaseLocation};

/// Registry format version.
pub const REGISTRY_VERSION: u32 = 1;

/// Registry problems. Lookups treat all of them as a miss.
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("Failed to read cache registry {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Corrupt cache registry {path}: {reason}")]
    Corrupt { path: PathBuf, reason: String },

    #[error("Failed to write cache registry {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

pub type Result<T> = std::result::Result<T, CacheError>;

/// One cached database.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistryEntry {
    pub path: PathBuf,
    pub input_root: PathBuf,
    pub created_at: DateTime<Utc>,
    pub last_used_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize)]
struct Registry {
    version: u32,
    entries: BTreeMap<CodebaseHash, RegistryEntry>,
}

impl Default for Registry {
    fn default() -> Self {
        Self {
            version: REGISTRY_VERSION,
            entries: BTreeMap::new(),
        }
    }
}

/// Eviction rules applied when a new database is recorded.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CachePolicy {
    /// Keep at most this many databases, least recently used evicted first.
    pub max_databases: Option<usize>,
    /// Evict entries unused for longer than this.
    pub max_age: Option<Duration>,
    /// Keep databases of earlier snapshots of the same input root.
    pub retain_superseded: bool,
}

impl CachePolicy {
    pub fn from_config(storage: &ckg_config::StorageConfig) -> Self {
        Self {
            max_databases: storage.max_databases,
            max_age: storage
                .max_age_days
                .filter(|&days| days > 0)
                .and_then(|days| i64::try_from(days).ok())
                .and_then(Duration::try_days),
            retain_superseded: storage.retain_superseded,
        }
    }
}

static REGISTRY_LOCKS: OnceLock<DashMap<PathBuf, Arc<Mutex<()>>>> = OnceLock::new();

/// Get or create the lock guarding one registry file.
fn registry_lock(registry_path: &Path) -> Arc<Mutex<()>> {
    let key = std::path::absolute(registry_path).unwrap_or_else(|_| registry_path.to_path_buf());
    REGISTRY_LOCKS
        .get_or_init(DashMap::new)
        .entry(key)
        .or_insert_with(|| Arc::new(Mutex::new(())))
        .clone()
}

/// Registry-backed database cache.
pub struct CacheManager {
    registry_path: PathBuf,
    policy: CachePolicy,
    lock: Arc<Mutex<()>>,
}

impl CacheManager {
    pub fn new(registry_path: impl Into<PathBuf>, policy: CachePolicy) -> Self {
        let registry_path = registry_path.into();
        let lock = registry_lock(&registry_path);
        Self {
            registry_path,
            policy,
            lock,
        }
    }

    pub fn registry_path(&self) -> &Path {
        &self.registry_path
    }

    pub fn policy(&self) -> &CachePolicy {
        &self.policy
    }

    /// Find the database built for a codebase hash.
    ///
    /// Entries whose database file disappeared are pruned. An unreadable
    /// registry is logged and reported as a miss.
    pub fn lookup(&self, hash: &CodebaseHash) -> Option<DatabaseLocation> {
        let _guard = self.lock.lock();
        let mut registry = match self.load() {
            Ok(registry) => registry,
            Err(e) => {
                warn!("Cache registry unusable, treating as miss: {}", e);
                return None;
            }
        };

        let entry = registry.entries.get_mut(hash)?;
        if !entry.path.is_file() {
            debug!(
                "Cached database for {} is gone: {}",
                hash.short(),
                entry.path.display()
            );
            registry.entries.remove(hash);
            self.save_or_warn(&registry);
            return None;
        }

        entry.last_used_at = Utc::now();
        let location = DatabaseLocation::new(entry.path.clone());
        self.save_or_warn(&registry);
        info!("Cache hit for {}: {}", hash.short(), location);
        Some(location)
    }

    /// Register the database built for a codebase hash.
    ///
    /// Returns the hashes evicted by the policy; their database files are
    /// deleted. The recorded hash itself is never evicted.
    pub fn record(
        &self,
        hash: &CodebaseHash,
        location: &DatabaseLocation,
        input_root: &Path,
    ) -> Result<Vec<CodebaseHash>> {
        self.record_at(hash, location, input_root, Utc::now())
    }

    pub(crate) fn record_at(
        &self,
        hash: &CodebaseHash,
        location: &DatabaseLocation,
        input_root: &Path,
        now: DateTime<Utc>,
    ) -> Result<Vec<CodebaseHash>> {
        let _guard = self.lock.lock();
        let mut registry = self.load().unwrap_or_else(|e| {
            warn!("Replacing unusable cache registry: {}", e);
            Registry::default()
        });

        // The database file now belongs to this hash only.
        registry
            .entries
            .retain(|h, entry| h == hash || entry.path != location.path());

        let created_at = registry
            .entries
            .get(hash)
            .filter(|entry| entry.path == location.path())
            .map(|entry| entry.created_at)
            .unwrap_or(now);
        registry.entries.insert(
            hash.clone(),
            RegistryEntry {
                path: location.path().to_path_buf(),
                input_root: input_root.to_path_buf(),
                created_at,
                last_used_at: now,
            },
        );

        let evicted = self.evict(&mut registry, hash, now);
        for (evicted_hash, entry) in &evicted {
            if entry.path != location.path() {
                remove_database(&entry.path);
            }
            debug!("Evicted cached database {}", evicted_hash.short());
        }

        self.save(&registry)?;
        Ok(evicted.into_iter().map(|(h, _)| h).collect())
    }

    /// Snapshot of all registry entries.
    pub fn entries(&self) -> Result<Vec<(CodebaseHash, RegistryEntry)>> {
        let _guard = self.lock.lock();
        Ok(self.load()?.entries.into_iter().collect())
    }

    /// Drop the entry for a hash, leaving its database file in place.
    pub fn forget(&self, hash: &CodebaseHash) -> Result<Option<RegistryEntry>> {
        let _guard = self.lock.lock();
        let mut registry = self.load()?;
        let removed = registry.entries.remove(hash);
        if removed.is_some() {
            self.save(&registry)?;
        }
        Ok(removed)
    }

    fn evict(
        &self,
        registry: &mut Registry,
        current: &CodebaseHash,
        now: DateTime<Utc>,
    ) -> Vec<(CodebaseHash, RegistryEntry)> {
        let mut doomed: Vec<CodebaseHash> = Vec::new();
        let Some(current_root) = registry.entries.get(current).map(|e| e.input_root.clone())
        else {
            return Vec::new();
        };

        for (hash, entry) in &registry.entries {
            if hash == current {
                continue;
            }
            let superseded = !self.policy.retain_superseded && entry.input_root == current_root;
            let expired = self
                .policy
                .max_age
                .is_some_and(|max_age| now - entry.last_used_at > max_age);
            if superseded || expired {
                doomed.push(hash.clone());
            }
        }

        if let Some(max) = self.policy.max_databases {
            let capacity = NonZeroUsize::new(max.max(1)).unwrap_or(NonZeroUsize::MIN);
            let mut order: Vec<(&CodebaseHash, &RegistryEntry)> = registry
                .entries
                .iter()
                .filter(|(hash, _)| !doomed.contains(*hash))
                .collect();
            // Oldest first; the current hash is always pushed last.
            order.sort_by_key(|(hash, entry)| (*hash == current, entry.last_used_at));

            let mut lru: LruCache<CodebaseHash, ()> = LruCache::new(capacity);
            for (hash, _) in order {
                if let Some((old, ())) = lru.push(hash.clone(), ()) {
                    doomed.push(old);
                }
            }
        }

        doomed
            .into_iter()
            .filter_map(|hash| registry.entries.remove(&hash).map(|entry| (hash, entry)))
            .collect()
    }

    fn load(&self) -> Result<Registry> {
        let content = match std::fs::read_to_string(&self.registry_path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Registry::default()),
            Err(source) => {
                return Err(CacheError::Read {
                    path: self.registry_path.clone(),
                    source,
                })
            }
        };

        let registry: Registry =
            serde_json::from_str(&content).map_err(|e| CacheError::Corrupt {
                path: self.registry_path.clone(),
                reason: e.to_string(),
            })?;
        if registry.version != REGISTRY_VERSION {
            return Err(CacheError::Corrupt {
                path: self.registry_path.clone(),
                reason: format!(
                    "unsupported version {} (expected {})",
                    registry.version, REGISTRY_VERSION
                ),
            });
        }
        Ok(registry)
    }

    /// Write via a temporary file and rename, so readers never see a torn registry.
    fn save(&self, registry: &Registry) -> Result<()> {
        let write_err = |source| CacheError::Write {
            path: self.registry_path.clone(),
            source,
        };

        if let Some(parent) = self.registry_path.parent() {
            std::fs::create_dir_all(parent).map_err(write_err)?;
        }
        let json = serde_json::to_string_pretty(registry)
            .map_err(|e| write_err(std::io::Error::other(e)))?;

        let tmp_path = unique_sibling(&self.registry_path, "tmp");

        std::fs::write(&tmp_path, json).map_err(write_err)?;
        std::fs::rename(&tmp_path, &self.registry_path).map_err(|e| {
            let _ = std::fs::remove_file(&tmp_path);
            write_err(e)
        })
    }

    fn save_or_warn(&self, registry: &Registry) {
        if let Err(e) = self.save(registry) {
            warn!("{}", e);
        }
    }
}

fn remove_database(path: &Path) {
    match std::fs::remove_file(path) {
        Ok(()) => debug!("Removed database {}", path.display()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => warn!("Failed to remove evicted database {}: {}", path.display(), e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn hash(s: &str) -> CodebaseHash {
        CodebaseHash::from(s.to_string())
    }

    fn database(dir: &Path, name: &str) -> DatabaseLocation {
        let path = dir.join(name);
        fs::write(&path, b"db").unwrap();
        DatabaseLocation::new(path)
    }

    fn manager(dir: &Path, policy: CachePolicy) -> CacheManager {
        CacheManager::new(dir.join("registry.json"), policy)
    }

    #[test]
    fn test_lookup_miss_on_empty_registry() {
        let temp = TempDir::new().unwrap();
        let cache = manager(temp.path(), CachePolicy::default());
        assert!(cache.lookup(&hash("aaa")).is_none());
        assert!(cache.entries().unwrap().is_empty());
    }

    #[test]
    fn test_record_then_lookup() {
        let temp = TempDir::new().unwrap();
        let cache = manager(temp.path(), CachePolicy::default());
        let db = database(temp.path(), "aaa.db");

        let evicted = cache.record(&hash("aaa"), &db, Path::new("/src")).unwrap();
        assert!(evicted.is_empty());
        assert_eq!(cache.lookup(&hash("aaa")), Some(db));
        assert!(cache.lookup(&hash("bbb")).is_none());
    }

    #[test]
    fn test_lookup_prunes_missing_database() {
        let temp = TempDir::new().unwrap();
        let cache = manager(temp.path(), CachePolicy::default());
        let db = database(temp.path(), "aaa.db");
        cache.record(&hash("aaa"), &db, Path::new("/src")).unwrap();

        fs::remove_file(db.path()).unwrap();
        assert!(cache.lookup(&hash("aaa")).is_none());
        assert!(cache.entries().unwrap().is_empty());
    }

    #[test]
    fn test_corrupt_registry_is_a_miss() {
        let temp = TempDir::new().unwrap();
        let cache = manager(temp.path(), CachePolicy::default());
        fs::write(cache.registry_path(), "{ not json").unwrap();

        assert!(cache.lookup(&hash("aaa")).is_none());
        assert!(matches!(
            cache.entries().unwrap_err(),
            CacheError::Corrupt { .. }
        ));

        // Recording replaces the corrupt registry.
        let db = database(temp.path(), "aaa.db");
        cache.record(&hash("aaa"), &db, Path::new("/src")).unwrap();
        assert_eq!(cache.lookup(&hash("aaa")), Some(db));
    }

    #[test]
    fn test_superseded_snapshot_is_evicted() {
        let temp = TempDir::new().unwrap();
        let cache = manager(temp.path(), CachePolicy::default());
        let old = database(temp.path(), "old.db");
        let new = database(temp.path(), "new.db");

        cache.record(&hash("old"), &old, Path::new("/src")).unwrap();
        let evicted = cache.record(&hash("new"), &new, Path::new("/src")).unwrap();

        assert_eq!(evicted, vec![hash("old")]);
        assert!(!old.path().exists());
        assert!(new.path().exists());
        assert!(cache.lookup(&hash("old")).is_none());
    }

    #[test]
    fn test_retain_superseded_keeps_other_roots_and_snapshots() {
        let temp = TempDir::new().unwrap();
        let policy = CachePolicy {
            retain_superseded: true,
            ..CachePolicy::default()
        };
        let cache = manager(temp.path(), policy);
        let a = database(temp.path(), "a.db");
        let b = database(temp.path(), "b.db");

        cache.record(&hash("a"), &a, Path::new("/src")).unwrap();
        let evicted = cache.record(&hash("b"), &b, Path::new("/src")).unwrap();
        assert!(evicted.is_empty());
        assert_eq!(cache.entries().unwrap().len(), 2);
    }

    #[test]
    fn test_same_path_moves_to_new_hash() {
        let temp = TempDir::new().unwrap();
        let policy = CachePolicy {
            retain_superseded: true,
            ..CachePolicy::default()
        };
        let cache = manager(temp.path(), policy);
        let db = database(temp.path(), "named.db");

        cache.record(&hash("first"), &db, Path::new("/src")).unwrap();
        cache.record(&hash("second"), &db, Path::new("/src")).unwrap();

        let hashes: Vec<CodebaseHash> = cache
            .entries()
            .unwrap()
            .into_iter()
            .map(|(h, _)| h)
            .collect();
        assert_eq!(hashes, vec![hash("second")]);
        assert!(db.path().exists());
    }

    #[test]
    fn test_lru_bound_never_evicts_current() {
        let temp = TempDir::new().unwrap();
        let policy = CachePolicy {
            max_databases: Some(2),
            retain_superseded: true,
            ..CachePolicy::default()
        };
        let cache = manager(temp.path(), policy);
        let t0 = Utc::now();

        let a = database(temp.path(), "a.db");
        let b = database(temp.path(), "b.db");
        let c = database(temp.path(), "c.db");
        cache.record_at(&hash("a"), &a, Path::new("/a"), t0).unwrap();
        cache
            .record_at(&hash("b"), &b, Path::new("/b"), t0 + Duration::seconds(1))
            .unwrap();
        // Same timestamp as an older entry: the current hash still survives.
        let evicted = cache
            .record_at(&hash("c"), &c, Path::new("/c"), t0)
            .unwrap();

        assert_eq!(evicted, vec![hash("a")]);
        assert!(!a.path().exists());
        let mut hashes: Vec<CodebaseHash> = cache
            .entries()
            .unwrap()
            .into_iter()
            .map(|(h, _)| h)
            .collect();
        hashes.sort();
        assert_eq!(hashes, vec![hash("b"), hash("c")]);
    }

    #[test]
    fn test_max_age_expiry() {
        let temp = TempDir::new().unwrap();
        let policy = CachePolicy {
            max_age: Some(Duration::days(7)),
            retain_superseded: true,
            ..CachePolicy::default()
        };
        let cache = manager(temp.path(), policy);
        let now = Utc::now();

        let stale = database(temp.path(), "stale.db");
        let fresh = database(temp.path(), "fresh.db");
        cache
            .record_at(&hash("stale"), &stale, Path::new("/a"), now - Duration::days(30))
            .unwrap();
        let evicted = cache
            .record_at(&hash("fresh"), &fresh, Path::new("/b"), now)
            .unwrap();

        assert_eq!(evicted, vec![hash("stale")]);
        assert!(!stale.path().exists());
    }

    #[test]
    fn test_forget() {
        let temp = TempDir::new().unwrap();
        let cache = manager(temp.path(), CachePolicy::default());
        let db = database(temp.path(), "aaa.db");
        cache.record(&hash("aaa"), &db, Path::new("/src")).unwrap();

        let entry = cache.forget(&hash("aaa")).unwrap().unwrap();
        assert_eq!(entry.path, db.path());
        assert!(db.path().exists());
        assert!(cache.forget(&hash("aaa")).unwrap().is_none());
    }

    #[test]
    fn test_policy_from_config() {
        let storage = ckg_config::StorageConfig {
            max_databases: Some(4),
            max_age_days: Some(3),
            ..Default::default()
        };
        let policy = CachePolicy::from_config(&storage);
        assert_eq!(policy.max_databases, Some(4));
        assert_eq!(policy.max_age, Some(Duration::days(3)));
        assert!(!policy.retain_superseded);
    }

    #[test]
    fn test_default_config_expires_after_a_week() {
        let policy = CachePolicy::from_config(&ckg_config::StorageConfig::default());
        assert_eq!(policy.max_age, Some(Duration::days(7)));

        let never = ckg_config::StorageConfig {
            max_age_days: Some(0),
            ..Default::default()
        };
        assert_eq!(CachePolicy::from_config(&never).max_age, None);
    }

    #[test]
    fn test_managers_on_one_registry_do_not_lose_entries() {
        let temp = TempDir::new().unwrap();
        let policy = CachePolicy {
            retain_superseded: true,
            ..CachePolicy::default()
        };

        std::thread::scope(|scope| {
            for i in 0..8 {
                let dir = temp.path();
                let policy = policy.clone();
                scope.spawn(move || {
                    let cache = manager(dir, policy);
                    let db = database(dir, &format!("{}.db", i));
                    let root = PathBuf::from(format!("/src/{}", i));
                    cache.record(&hash(&i.to_string()), &db, &root).unwrap();
                });
            }
        });

        let cache = manager(temp.path(), CachePolicy::default());
        assert_eq!(cache.entries().unwrap().len(), 8);
        let leftovers: Vec<_> = fs::read_dir(temp.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .filter(|name| name.contains(".tmp-"))
            .collect();
        assert!(leftovers.is_empty(), "temporary files left: {:?}", leftovers);
    }
}
