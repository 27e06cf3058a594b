//! Filesystem-backed artifact store
//!
//! Layout: `<root>/<unit-id>/snippet.py`, one directory per unit so the
//! unit's directory doubles as its import root. Files are written once and
//! never touched again; the unit id is the only coordination concurrent
//! writers need.
//!
//! Reclamation is age-based on the source file's mtime. A unit that is
//! leased (being validated or run) is never removed: sweep and lease share
//! one lock, so the check and the removal cannot interleave with a lease.

use crate::{Result, SourceUnit, StoreError, UnitId};
use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{debug, info, warn};

/// File name of the unit's source inside its directory
pub const SOURCE_FILE: &str = "snippet.py";

/// Default retention window
pub const DEFAULT_RETENTION_MINUTES: i64 = 30;

const MAX_ID_ATTEMPTS: usize = 4;

/// What a sweep did
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    /// Units removed by this sweep
    pub removed: Vec<UnitId>,
    /// Stale units skipped because they were leased
    pub in_flight: usize,
    /// Stale units whose removal failed
    pub failed: usize,
}

/// Owns the storage namespace of materialized units
#[derive(Debug, Clone)]
pub struct ArtifactStore {
    inner: Arc<Inner>,
}

#[derive(Debug)]
struct Inner {
    root: PathBuf,
    retention: Duration,
    leases: Mutex<HashMap<UnitId, usize>>,
}

impl ArtifactStore {
    /// Open (creating if needed) a store rooted at `root`. The root is kept
    /// in canonical form so unit paths stay valid whatever the working
    /// directory of a consumer.
    pub fn open(root: impl Into<PathBuf>, retention: Duration) -> Result<Self> {
        let root = root.into();
        fs::create_dir_all(&root)?;
        let root = fs::canonicalize(&root)?;
        Ok(Self {
            inner: Arc::new(Inner {
                root,
                retention,
                leases: Mutex::new(HashMap::new()),
            }),
        })
    }

    pub fn root(&self) -> &Path {
        &self.inner.root
    }

    pub fn retention(&self) -> Duration {
        self.inner.retention
    }

    fn unit_dir(&self, id: &UnitId) -> PathBuf {
        self.inner.root.join(id.to_string())
    }

    fn leases(&self) -> MutexGuard<'_, HashMap<UnitId, usize>> {
        // the map holds plain counters; a panic elsewhere cannot leave it torn
        self.inner.leases.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Write `source` under a freshly generated id
    pub fn materialize(&self, source: &str) -> Result<SourceUnit> {
        for _ in 0..MAX_ID_ATTEMPTS {
            let id = UnitId::generate();
            let dir = self.unit_dir(&id);
            match fs::create_dir(&dir) {
                Ok(()) => {}
                Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                    warn!(unit = %id, "unit id collision, retrying");
                    continue;
                }
                Err(e) => return Err(e.into()),
            }

            let path = dir.join(SOURCE_FILE);
            if let Err(e) = write_once(&path, source) {
                let _ = fs::remove_dir_all(&dir);
                return Err(e.into());
            }
            let created_at = modified_at(&path)?;

            info!(unit = %id, bytes = source.len(), "materialized unit");
            return Ok(SourceUnit::new(id, source.to_string(), created_at, path));
        }
        Err(StoreError::IdExhausted)
    }

    /// Load an existing unit
    pub fn get(&self, id: &UnitId) -> Result<SourceUnit> {
        let path = self.unit_dir(id).join(SOURCE_FILE);
        let source = fs::read_to_string(&path).map_err(|e| not_found_or(e, *id))?;
        let created_at = modified_at(&path)?;
        Ok(SourceUnit::new(*id, source, created_at, path))
    }

    /// Mark a unit in flight until the returned guard is dropped
    pub fn lease(&self, id: &UnitId) -> Result<UnitLease> {
        let mut leases = self.leases();
        if !self.unit_dir(id).join(SOURCE_FILE).is_file() {
            return Err(StoreError::NotFound(*id));
        }
        *leases.entry(*id).or_insert(0) += 1;
        debug!(unit = %id, "lease acquired");
        Ok(UnitLease {
            store: self.clone(),
            id: *id,
        })
    }

    pub fn is_leased(&self, id: &UnitId) -> bool {
        self.leases().contains_key(id)
    }

    fn release(&self, id: &UnitId) {
        let mut leases = self.leases();
        if let Some(count) = leases.get_mut(id) {
            *count -= 1;
            if *count == 0 {
                leases.remove(id);
            }
        }
        debug!(unit = %id, "lease released");
    }

    /// Remove a unit now. Refused while it is leased.
    pub fn discard(&self, id: &UnitId) -> Result<()> {
        let leases = self.leases();
        if leases.contains_key(id) {
            return Err(StoreError::InUse(*id));
        }
        fs::remove_dir_all(self.unit_dir(id)).map_err(|e| not_found_or(e, *id))?;
        info!(unit = %id, "discarded unit");
        Ok(())
    }

    /// All unit ids currently on disk. Foreign entries under the root are
    /// ignored.
    pub fn list(&self) -> Result<Vec<UnitId>> {
        let mut ids: Vec<UnitId> = fs::read_dir(&self.inner.root)?
            .flatten()
            .filter(|entry| entry.file_type().map(|t| t.is_dir()).unwrap_or(false))
            .filter_map(|entry| entry.file_name().to_str()?.parse().ok())
            .collect();
        ids.sort();
        Ok(ids)
    }

    /// Whether something last modified at `modified` is reclaimable at `now`
    pub fn is_stale(&self, modified: DateTime<Utc>, now: DateTime<Utc>) -> bool {
        now.signed_duration_since(modified) > self.inner.retention
    }

    /// Remove every unit whose age strictly exceeds the retention window.
    /// Idempotent; leased units are skipped.
    pub fn sweep(&self, now: DateTime<Utc>) -> SweepReport {
        let mut report = SweepReport::default();
        let ids = match self.list() {
            Ok(ids) => ids,
            Err(e) => {
                warn!(error = %e, "cannot enumerate units for sweep");
                return report;
            }
        };

        for id in ids {
            let dir = self.unit_dir(&id);
            let modified = match modified_at(&dir.join(SOURCE_FILE)).or_else(|_| modified_at(&dir)) {
                Ok(modified) => modified,
                // removed by someone else since the listing
                Err(_) => continue,
            };
            if !self.is_stale(modified, now) {
                continue;
            }

            let leases = self.leases();
            if leases.contains_key(&id) {
                report.in_flight += 1;
                continue;
            }
            match fs::remove_dir_all(&dir) {
                Ok(()) => report.removed.push(id),
                Err(e) if e.kind() == ErrorKind::NotFound => {}
                Err(e) => {
                    warn!(unit = %id, error = %e, "failed to reclaim unit");
                    report.failed += 1;
                }
            }
            drop(leases);
        }

        if !report.removed.is_empty() || report.in_flight > 0 {
            info!(
                removed = report.removed.len(),
                in_flight = report.in_flight,
                failed = report.failed,
                "sweep finished"
            );
        }
        report
    }
}

/// Guard marking a unit as in flight
#[derive(Debug)]
pub struct UnitLease {
    store: ArtifactStore,
    id: UnitId,
}

impl UnitLease {
    pub fn id(&self) -> UnitId {
        self.id
    }
}

impl Drop for UnitLease {
    fn drop(&mut self) {
        self.store.release(&self.id);
    }
}

fn write_once(path: &Path, source: &str) -> std::io::Result<()> {
    let mut file = OpenOptions::new().write(true).create_new(true).open(path)?;
    file.write_all(source.as_bytes())?;
    file.sync_all()
}

fn modified_at(path: &Path) -> std::io::Result<DateTime<Utc>> {
    Ok(DateTime::<Utc>::from(fs::metadata(path)?.modified()?))
}

fn not_found_or(err: std::io::Error, id: UnitId) -> StoreError {
    if err.kind() == ErrorKind::NotFound {
        StoreError::NotFound(id)
    } else {
        StoreError::Io(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::fs::File;
    use std::time::SystemTime;
    use tempfile::TempDir;

    fn store(tmp: &TempDir) -> ArtifactStore {
        ArtifactStore::open(
            tmp.path().join("units"),
            Duration::minutes(DEFAULT_RETENTION_MINUTES),
        )
        .unwrap()
    }

    fn backdate(unit: &SourceUnit, by: Duration) -> DateTime<Utc> {
        let when = unit.created_at() - by;
        let file = File::options().write(true).open(unit.path()).unwrap();
        file.set_modified(SystemTime::from(when)).unwrap();
        modified_at(unit.path()).unwrap()
    }

    #[test]
    fn test_relative_root_is_made_absolute() {
        let tmp = tempfile::Builder::new().tempdir_in(".").unwrap();
        let relative = tmp.path().join("units");
        assert!(relative.is_relative());

        let store = ArtifactStore::open(&relative, Duration::minutes(1)).unwrap();
        assert!(store.root().is_absolute());
        let unit = store.materialize("print(1)\n").unwrap();
        assert!(unit.path().is_absolute());
        assert_eq!(store.get(&unit.id()).unwrap().source(), "print(1)\n");
    }

    #[test]
    fn test_materialize_and_get() {
        let tmp = TempDir::new().unwrap();
        let store = store(&tmp);

        let unit = store.materialize("print('hi')\n").unwrap();
        assert_eq!(unit.source(), "print('hi')\n");
        assert_eq!(unit.path(), store.root().join(unit.id().to_string()).join(SOURCE_FILE));
        assert_eq!(fs::read_to_string(unit.path()).unwrap(), "print('hi')\n");

        let loaded = store.get(&unit.id()).unwrap();
        assert_eq!(loaded.source(), unit.source());
        assert_eq!(loaded.created_at(), unit.created_at());
    }

    #[test]
    fn test_get_unknown() {
        let tmp = TempDir::new().unwrap();
        let store = store(&tmp);
        let id = UnitId::generate();
        assert!(matches!(store.get(&id), Err(StoreError::NotFound(missing)) if missing == id));
    }

    #[test]
    fn test_sweep_respects_window() {
        let tmp = TempDir::new().unwrap();
        let store = store(&tmp);
        let unit = store.materialize("x = 1\n").unwrap();
        let created = unit.created_at();

        assert!(store.sweep(created + Duration::minutes(29)).removed.is_empty());
        // exactly at the window is not "older than"
        assert!(store.sweep(created + Duration::minutes(30)).removed.is_empty());
        assert!(unit.path().exists());

        let report = store.sweep(created + Duration::minutes(30) + Duration::seconds(1));
        assert_eq!(report.removed, vec![unit.id()]);
        assert!(!unit.dir().exists());

        // idempotent
        let again = store.sweep(created + Duration::minutes(31));
        assert_eq!(again, SweepReport::default());
    }

    #[test]
    fn test_sweep_removes_only_stale_units() {
        let tmp = TempDir::new().unwrap();
        let store = store(&tmp);
        let old = store.materialize("old = True\n").unwrap();
        let fresh = store.materialize("fresh = True\n").unwrap();
        backdate(&old, Duration::minutes(45));

        let report = store.sweep(Utc::now());
        assert_eq!(report.removed, vec![old.id()]);
        assert!(fresh.path().exists());
        assert_eq!(store.list().unwrap(), vec![fresh.id()]);
    }

    #[test]
    fn test_leased_unit_survives_sweep() {
        let tmp = TempDir::new().unwrap();
        let store = store(&tmp);
        let unit = store.materialize("pass\n").unwrap();
        let later = unit.created_at() + Duration::hours(2);

        let lease = store.lease(&unit.id()).unwrap();
        let report = store.sweep(later);
        assert!(report.removed.is_empty());
        assert_eq!(report.in_flight, 1);
        assert!(unit.path().exists());

        drop(lease);
        assert!(!store.is_leased(&unit.id()));
        assert_eq!(store.sweep(later).removed, vec![unit.id()]);
    }

    #[test]
    fn test_nested_leases() {
        let tmp = TempDir::new().unwrap();
        let store = store(&tmp);
        let unit = store.materialize("pass\n").unwrap();

        let first = store.lease(&unit.id()).unwrap();
        let second = store.lease(&unit.id()).unwrap();
        drop(first);
        assert!(store.is_leased(&unit.id()));
        drop(second);
        assert!(!store.is_leased(&unit.id()));
    }

    #[test]
    fn test_discard() {
        let tmp = TempDir::new().unwrap();
        let store = store(&tmp);
        let unit = store.materialize("pass\n").unwrap();

        let lease = store.lease(&unit.id()).unwrap();
        assert!(matches!(store.discard(&unit.id()), Err(StoreError::InUse(_))));
        drop(lease);

        store.discard(&unit.id()).unwrap();
        assert!(!unit.dir().exists());
        assert!(matches!(store.discard(&unit.id()), Err(StoreError::NotFound(_))));
        assert!(matches!(store.lease(&unit.id()), Err(StoreError::NotFound(_))));
    }

    #[test]
    fn test_foreign_entries_are_left_alone() {
        let tmp = TempDir::new().unwrap();
        let store = store(&tmp);
        let stray_dir = store.root().join("not-a-unit");
        fs::create_dir(&stray_dir).unwrap();
        fs::write(store.root().join("notes.txt"), "keep").unwrap();

        let report = store.sweep(Utc::now() + Duration::days(1));
        assert!(report.removed.is_empty());
        assert!(stray_dir.exists());
        assert!(store.root().join("notes.txt").exists());
    }

    #[test]
    fn test_concurrent_materialize_never_collides() {
        let tmp = TempDir::new().unwrap();
        let store = store(&tmp);

        let handles: Vec<_> = (0..8)
            .map(|worker| {
                let store = store.clone();
                std::thread::spawn(move || {
                    (0..25)
                        .map(|n| {
                            let source = format!("print({worker}, {n})\n");
                            let unit = store.materialize(&source).unwrap();
                            (unit.id(), source)
                        })
                        .collect::<Vec<_>>()
                })
            })
            .collect();

        let mut seen = HashSet::new();
        for handle in handles {
            for (id, source) in handle.join().unwrap() {
                assert!(seen.insert(id), "duplicate id {id}");
                assert_eq!(store.get(&id).unwrap().source(), source);
            }
        }
        assert_eq!(store.list().unwrap().len(), 200);
    }
}
