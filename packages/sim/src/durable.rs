//! Durable delayed-trigger stores.
//!
//! An entry holds a token until its deadline. Reading an entry whose
//! deadline has passed finds nothing: the trigger already fired and took the
//! token with it.

use std::collections::BTreeMap;
use std::time::Duration;
use std::{fs, io, path};

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use shuttle_core::{DurableStore, HostError};
use shuttle_wire::{ContextId, SlotId, Token};
use tracing::debug;

use crate::error::{Result, SimError};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
struct Entry {
    key: SlotId,
    fire_at: DateTime<Utc>,
    token: Token,
}

impl Entry {
    fn new(key: SlotId, fire_after: Duration, token: Token) -> std::result::Result<Self, HostError> {
        let fire_at = chrono::Duration::from_std(fire_after)
            .ok()
            .and_then(|delay| Utc::now().checked_add_signed(delay))
            .ok_or_else(|| HostError::Storage {
                message: format!("deadline {:?} out of range", fire_after),
            })?;
        Ok(Self { key, fire_at, token })
    }

    fn fired(&self, now: DateTime<Utc>) -> bool {
        self.fire_at <= now
    }
}

/// Takes the token under `key` unless its trigger already fired. Returns
/// whether the map changed.
fn take_live(entries: &mut BTreeMap<SlotId, Entry>, key: SlotId) -> (Option<Token>, bool) {
    match entries.get(&key) {
        Some(entry) if entry.fired(Utc::now()) => {
            entries.remove(&key);
            (None, true)
        }
        Some(entry) => (Some(entry.token.clone()), false),
        None => (None, false),
    }
}

/// Entries kept in process memory. Lost when the store is dropped.
#[derive(Default)]
pub struct InMemoryDurableStore {
    entries: Mutex<BTreeMap<SlotId, Entry>>,
}

impl InMemoryDurableStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

impl DurableStore for InMemoryDurableStore {
    fn schedule(&self, key: SlotId, fire_after: Duration, token: Token) -> std::result::Result<(), HostError> {
        let entry = Entry::new(key, fire_after, token)?;
        self.entries.lock().insert(key, entry);
        Ok(())
    }

    fn consume(&self, key: SlotId) -> std::result::Result<Option<Token>, HostError> {
        Ok(take_live(&mut self.entries.lock(), key).0)
    }
}

/// Entries of one context persisted as a JSON file under `root`.
///
/// The file is rewritten on every change, so reopening the same root after a
/// restart sees every entry that was scheduled before it.
pub struct JSONDurableStore {
    file: path::PathBuf,
    entries: Mutex<BTreeMap<SlotId, Entry>>,
}

impl JSONDurableStore {
    pub fn open(root: impl Into<path::PathBuf>, context: ContextId) -> Result<Self> {
        let root = root.into();
        let attr = fs::metadata(&root).map_err(|error| SimError::RootPathInvalid {
            path: root.clone(),
            error,
        })?;

        if !attr.is_dir() {
            return Err(SimError::RootPathInvalid {
                path: root,
                error: io::Error::other("Root path must be a directory."),
            });
        }
        if attr.permissions().readonly() {
            return Err(SimError::RootPathInvalid {
                path: root,
                error: io::Error::other("Root directory must be writable"),
            });
        }

        let file = root.join(format!("context-{}.json", context.0));
        let entries = Self::read_entries(&file)?;
        debug!(file = %file.display(), entries = entries.len(), "Opened durable store");
        Ok(Self {
            file,
            entries: Mutex::new(entries),
        })
    }

    pub fn path(&self) -> &path::Path {
        &self.file
    }

    fn read_entries(file: &path::Path) -> Result<BTreeMap<SlotId, Entry>> {
        let bytes = match fs::read(file) {
            Ok(bytes) => bytes,
            Err(error) if error.kind() == io::ErrorKind::NotFound => return Ok(BTreeMap::new()),
            Err(error) => {
                return Err(SimError::Io {
                    path: file.to_path_buf(),
                    error,
                })
            }
        };
        let entries: Vec<Entry> =
            serde_json::from_slice(&bytes).map_err(|error| SimError::Corrupt {
                path: file.to_path_buf(),
                error,
            })?;
        Ok(entries.into_iter().map(|e| (e.key, e)).collect())
    }

    fn write_entries(&self, entries: &BTreeMap<SlotId, Entry>) -> Result<()> {
        let list: Vec<&Entry> = entries.values().collect();
        let bytes = serde_json::to_vec_pretty(&list).map_err(|error| SimError::Corrupt {
            path: self.file.clone(),
            error,
        })?;

        let staging = self.file.with_extension("json.tmp");
        fs::write(&staging, bytes)
            .and_then(|()| fs::rename(&staging, &self.file))
            .map_err(|error| SimError::Io {
                path: self.file.clone(),
                error,
            })
    }
}

impl DurableStore for JSONDurableStore {
    fn schedule(&self, key: SlotId, fire_after: Duration, token: Token) -> std::result::Result<(), HostError> {
        let entry = Entry::new(key, fire_after, token)?;
        let mut entries = self.entries.lock();
        entries.insert(key, entry);
        self.write_entries(&entries)?;
        Ok(())
    }

    fn consume(&self, key: SlotId) -> std::result::Result<Option<Token>, HostError> {
        let mut entries = self.entries.lock();
        let (token, changed) = take_live(&mut entries, key);
        if changed {
            self.write_entries(&entries)?;
        }
        Ok(token)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const YEAR: Duration = Duration::from_secs(365 * 24 * 3600);

    fn hub_token() -> Token {
        Token::new(ContextId(0), SlotId::shuttle(ContextId(0)), None)
    }

    #[test]
    fn in_memory_schedule_and_consume() {
        let store = InMemoryDurableStore::new();
        let key = SlotId::locker(ContextId(0));
        let token = hub_token();

        store.schedule(key, YEAR, token.clone()).unwrap();
        assert!(store.consume(key).unwrap().unwrap().same_handle(&token));
        // Consuming does not remove an entry that has not fired.
        assert!(store.consume(key).unwrap().is_some());
        assert!(store.consume(SlotId::locker(ContextId(3))).unwrap().is_none());
    }

    #[test]
    fn fired_entries_read_as_absent() {
        let store = InMemoryDurableStore::new();
        let key = SlotId::locker(ContextId(0));

        store.schedule(key, Duration::ZERO, hub_token()).unwrap();
        assert!(store.consume(key).unwrap().is_none());
        assert!(store.is_empty());
    }

    #[test]
    fn schedule_replaces() {
        let store = InMemoryDurableStore::new();
        let key = SlotId::locker(ContextId(0));
        let second = hub_token();

        store.schedule(key, YEAR, hub_token()).unwrap();
        store.schedule(key, YEAR, second.clone()).unwrap();
        assert_eq!(store.len(), 1);
        assert!(store.consume(key).unwrap().unwrap().same_handle(&second));
    }

    #[test]
    fn out_of_range_deadline_is_a_storage_error() {
        let store = InMemoryDurableStore::new();
        let result = store.schedule(SlotId::locker(ContextId(0)), Duration::MAX, hub_token());
        assert!(matches!(result, Err(HostError::Storage { .. })));
    }

    #[test]
    fn json_store_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let key = SlotId::locker(ContextId(0));
        let token = hub_token();

        {
            let store = JSONDurableStore::open(dir.path(), ContextId(1)).unwrap();
            store.schedule(key, YEAR, token.clone()).unwrap();
            assert!(store.path().exists());
        }

        let reopened = JSONDurableStore::open(dir.path(), ContextId(1)).unwrap();
        assert!(reopened.consume(key).unwrap().unwrap().same_handle(&token));

        let other = JSONDurableStore::open(dir.path(), ContextId(2)).unwrap();
        assert!(other.consume(key).unwrap().is_none());
    }

    #[test]
    fn json_store_drops_fired_entries_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let key = SlotId::locker(ContextId(0));

        let store = JSONDurableStore::open(dir.path(), ContextId(1)).unwrap();
        store.schedule(key, Duration::ZERO, hub_token()).unwrap();
        assert!(store.consume(key).unwrap().is_none());

        let reopened = JSONDurableStore::open(dir.path(), ContextId(1)).unwrap();
        assert!(reopened.entries.lock().is_empty());
    }

    #[test]
    fn json_store_rejects_file_root() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("plain");
        fs::write(&file, b"{}").unwrap();

        let result = JSONDurableStore::open(&file, ContextId(1));
        assert!(matches!(result, Err(SimError::RootPathInvalid { .. })));
    }

    #[test]
    fn json_store_reports_corrupt_file() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("context-1.json"), b"not json").unwrap();

        let result = JSONDurableStore::open(dir.path(), ContextId(1));
        assert!(matches!(result, Err(SimError::Corrupt { .. })));
    }
}
