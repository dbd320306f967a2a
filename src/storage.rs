//! # Summary
//!
//! This module abstracts over the stable log. Every state a process enters
//! is appended here before it sends anything for that state.
//!
//! `Directory` uses `bincode` to append one record per state entry to a file
//! per process and syncs it before returning. `Memory` keeps the same
//! records in a shared map so runs can be audited without touching disk.
//! The protocol itself never reads a log back.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use hashbrown::HashMap as Map;
use parking_lot::Mutex;
use serde_derive::{Deserialize, Serialize};

use crate::error::Error;

/// Append-only record of one process's state entries.
pub trait Log: Send + 'static {
    fn append(&mut self, state: &str) -> Result<(), Error>;
}

/// Opens one log per process label.
pub trait Store: Clone + Send + Sync + 'static {
    type Log: Log;
    fn open(&self, label: &str) -> Result<Self::Log, Error>;
}

/// On-disk shape of a single log entry.
#[derive(Serialize, Deserialize)]
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Record {
    pub label: String,
    pub state: String,
}

/// Shared in-memory store.
#[derive(Clone, Default)]
pub struct Memory(Arc<Mutex<Map<String, Vec<String>>>>);

impl Memory {
    pub fn new() -> Self {
        Memory::default()
    }

    /// States appended under `label`, oldest first.
    pub fn entries(&self, label: &str) -> Vec<String> {
        self.0.lock()
            .get(label)
            .cloned()
            .unwrap_or_default()
    }

    /// Every label that has been opened.
    pub fn labels(&self) -> Vec<String> {
        let mut labels = self.0.lock()
            .keys()
            .cloned()
            .collect::<Vec<_>>();
        labels.sort();
        labels
    }
}

impl Store for Memory {
    type Log = MemoryLog;
    fn open(&self, label: &str) -> Result<Self::Log, Error> {
        self.0.lock().entry(label.to_string()).or_default();
        Ok(MemoryLog {
            label: label.to_string(),
            store: self.clone(),
        })
    }
}

pub struct MemoryLog {
    label: String,
    store: Memory,
}

impl Log for MemoryLog {
    fn append(&mut self, state: &str) -> Result<(), Error> {
        self.store.0
            .lock()
            .entry(self.label.clone())
            .or_default()
            .push(state.to_string());
        Ok(())
    }
}

/// One append-only file per label under a directory.
///
/// Appends block until the record is synced. On a multi-threaded runtime the
/// write is handed to `block_in_place` so other processes keep running; on a
/// current-thread runtime every process waits for the sync.
#[derive(Clone, Debug)]
pub struct Directory {
    root: PathBuf,
}

impl Directory {
    /// Creates `root` if it does not exist yet.
    pub fn new<P: AsRef<Path>>(root: P) -> Result<Self, Error> {
        std::fs::create_dir_all(root.as_ref())?;
        Ok(Directory { root: root.as_ref().to_path_buf() })
    }

    fn path(&self, label: &str) -> PathBuf {
        self.root.join(format!("{}.log", label))
    }

    /// Reads back every record appended under `label`. A truncated trailing
    /// record, as left by a crash mid-append, ends the log.
    pub fn entries(&self, label: &str) -> Result<Vec<Record>, Error> {
        let file = std::fs::File::open(self.path(label))?;
        let mut reader = std::io::BufReader::new(file);
        let mut records = Vec::new();
        loop {
            match bincode::deserialize_from::<_, Record>(&mut reader) {
            | Ok(record) => records.push(record),
            | Err(error) => {
                if let bincode::ErrorKind::Io(ref io) = *error {
                    if io.kind() == std::io::ErrorKind::UnexpectedEof {
                        break
                    }
                }
                return Err(Error::Encoding(error))
            }
            }
        }
        Ok(records)
    }
}

impl Store for Directory {
    type Log = FileLog;
    fn open(&self, label: &str) -> Result<Self::Log, Error> {
        let file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.path(label))?;
        Ok(FileLog {
            label: label.to_string(),
            file,
        })
    }
}

pub struct FileLog {
    label: String,
    file: std::fs::File,
}

impl Log for FileLog {
    fn append(&mut self, state: &str) -> Result<(), Error> {
        let record = Record {
            label: self.label.clone(),
            state: state.to_string(),
        };
        let bytes = bincode::serialize(&record)?;
        let file = &mut self.file;
        blocking(move || {
            file.write_all(&bytes)?;
            file.sync_data()
        })?;
        Ok(())
    }
}

/// Runs blocking file I/O, off the executor when the runtime allows it.
fn blocking<F, T>(f: F) -> T
    where F: FnOnce() -> T
{
    use tokio::runtime::{Handle, RuntimeFlavor};
    match Handle::try_current() {
    | Ok(handle) if handle.runtime_flavor() == RuntimeFlavor::MultiThread => {
        tokio::task::block_in_place(f)
    }
    | _ => f(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn memory_keeps_entries_per_label() {
        let store = Memory::new();
        let mut a = store.open("participant-1").unwrap();
        let mut b = store.open("participant-2").unwrap();
        a.append("INIT").unwrap();
        b.append("INIT").unwrap();
        a.append("READY").unwrap();
        assert_eq!(store.entries("participant-1"), vec!["INIT", "READY"]);
        assert_eq!(store.entries("participant-2"), vec!["INIT"]);
        assert_eq!(store.labels(), vec!["participant-1", "participant-2"]);
        assert!(store.entries("coordinator-0").is_empty());
    }

    #[test]
    fn directory_appends_across_reopens() {
        let temp_dir = TempDir::new().unwrap();
        let store = Directory::new(temp_dir.path()).unwrap();
        {
            let mut log = store.open("coordinator-0").unwrap();
            log.append("INIT").unwrap();
            log.append("WAIT").unwrap();
        }
        let mut log = store.open("coordinator-0").unwrap();
        log.append("ABORT").unwrap();

        let states = store.entries("coordinator-0")
            .unwrap()
            .into_iter()
            .map(|record| {
                assert_eq!(record.label, "coordinator-0");
                record.state
            })
            .collect::<Vec<_>>();
        assert_eq!(states, vec!["INIT", "WAIT", "ABORT"]);
    }

    #[test]
    fn directory_ignores_torn_tail() {
        let temp_dir = TempDir::new().unwrap();
        let store = Directory::new(temp_dir.path()).unwrap();
        let mut log = store.open("participant-3").unwrap();
        log.append("INIT").unwrap();
        log.file.write_all(&[7, 0, 0]).unwrap();
        let records = store.entries("participant-3").unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].state, "INIT");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn directory_appends_on_multi_threaded_runtime() {
        let temp_dir = TempDir::new().unwrap();
        let store = Directory::new(temp_dir.path()).unwrap();
        let mut log = store.open("participant-1").unwrap();
        log.append("INIT").unwrap();
        log.append("READY").unwrap();

        let states = store.entries("participant-1")
            .unwrap()
            .into_iter()
            .map(|record| record.state)
            .collect::<Vec<_>>();
        assert_eq!(states, vec!["INIT", "READY"]);
    }
}
