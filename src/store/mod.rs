//! Durable record store shared by every agent process.
//!
//! Each entity is one JSON file keyed by its id. Writes land in a temp file in
//! the same directory and are renamed into place, so readers (including
//! out-of-process tools scanning the directories) always see a whole record.
//! Read-modify-write sequences run under a per-entity lock file, see
//! [`Store::with_lock`].

mod lock;

pub use lock::LockSettings;

use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fs;
use std::io::{ErrorKind as IoErrorKind, Write};
use std::path::{Path, PathBuf};
use tracing::warn;
use uuid::Uuid;

use crate::error::{CoordinationError, Result};
use crate::ids::{AgentId, MessageId};

const RECORD_EXTENSION: &str = "json";
const LOCK_EXTENSION: &str = "lock";
const AGENT_METADATA: &str = "metadata.json";
const INBOX_DIR: &str = "inbox";
const GRAPH_LOCK: &str = ".graph.lock";

/// Top-level directories of the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Collection {
    Agents,
    Tasks,
    Teams,
    Plans,
}

impl Collection {
    pub const ALL: [Collection; 4] = [
        Collection::Agents,
        Collection::Tasks,
        Collection::Teams,
        Collection::Plans,
    ];

    pub fn dir_name(&self) -> &'static str {
        match self {
            Collection::Agents => "agents",
            Collection::Tasks => "tasks",
            Collection::Teams => "teams",
            Collection::Plans => "plans",
        }
    }

    /// Singular noun used in error messages.
    pub fn entity(&self) -> &'static str {
        match self {
            Collection::Agents => "agent",
            Collection::Tasks => "task",
            Collection::Teams => "team",
            Collection::Plans => "plan",
        }
    }
}

#[derive(Debug, Clone)]
pub struct Store {
    root: PathBuf,
    locks: LockSettings,
}

impl Store {
    /// Open (creating if needed) the store rooted at `root`.
    pub fn open(root: impl Into<PathBuf>, locks: LockSettings) -> Result<Self> {
        let root = root.into();
        for collection in Collection::ALL {
            fs::create_dir_all(root.join(collection.dir_name()))?;
        }
        Ok(Self { root, locks })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn collection_dir(&self, collection: Collection) -> PathBuf {
        self.root.join(collection.dir_name())
    }

    /// `tasks/<id>.json`, `teams/<id>.json`, `plans/<id>.json`
    pub fn record_path(&self, collection: Collection, id: impl std::fmt::Display) -> PathBuf {
        self.collection_dir(collection)
            .join(format!("{id}.{RECORD_EXTENSION}"))
    }

    pub fn agent_dir(&self, agent: AgentId) -> PathBuf {
        self.collection_dir(Collection::Agents).join(agent.to_string())
    }

    pub fn agent_path(&self, agent: AgentId) -> PathBuf {
        self.agent_dir(agent).join(AGENT_METADATA)
    }

    pub fn inbox_dir(&self, agent: AgentId) -> PathBuf {
        self.agent_dir(agent).join(INBOX_DIR)
    }

    pub fn message_path(&self, agent: AgentId, message: MessageId) -> PathBuf {
        self.inbox_dir(agent)
            .join(format!("{message}.{RECORD_EXTENSION}"))
    }

    /// Lock guarding structural changes to the task dependency graph.
    pub fn graph_lock_path(&self) -> PathBuf {
        self.collection_dir(Collection::Tasks).join(GRAPH_LOCK)
    }

    /// Read one record; `Ok(None)` when it does not exist.
    pub fn read<T: DeserializeOwned>(&self, path: &Path) -> Result<Option<T>> {
        let bytes = match fs::read(path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == IoErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        serde_json::from_slice(&bytes)
            .map(Some)
            .map_err(|source| CoordinationError::CorruptRecord {
                path: path.to_path_buf(),
                source,
            })
    }

    /// Atomically replace (or create) one record.
    pub fn write<T: Serialize>(&self, path: &Path, record: &T) -> Result<()> {
        let dir = path
            .parent()
            .ok_or_else(|| CoordinationError::InvalidInput(format!("no parent for {}", path.display())))?;
        fs::create_dir_all(dir)?;

        let bytes = serde_json::to_vec_pretty(record).map_err(|source| {
            CoordinationError::CorruptRecord {
                path: path.to_path_buf(),
                source,
            }
        })?;

        let file_name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();
        let tmp = dir.join(format!(".{file_name}.{}.tmp", Uuid::new_v4().simple()));

        let result = (|| -> std::io::Result<()> {
            let mut file = fs::File::create(&tmp)?;
            file.write_all(&bytes)?;
            file.sync_all()?;
            fs::rename(&tmp, path)
        })();

        if let Err(e) = result {
            let _ = fs::remove_file(&tmp);
            return Err(e.into());
        }
        Ok(())
    }

    /// Every readable `*.json` record directly inside `dir`.
    ///
    /// Unreadable records are skipped with a warning so one corrupt file
    /// cannot hide the rest of the collection.
    pub fn scan<T: DeserializeOwned>(&self, dir: &Path) -> Result<Vec<T>> {
        let mut records = Vec::new();
        for path in record_files(dir)? {
            match self.read(&path) {
                Ok(Some(record)) => records.push(record),
                Ok(None) => {}
                Err(e) => warn!(path = %path.display(), error = %e, "Skipping unreadable record"),
            }
        }
        Ok(records)
    }

    /// Every readable agent metadata record.
    pub fn scan_agents<T: DeserializeOwned>(&self) -> Result<Vec<T>> {
        let mut records = Vec::new();
        for entry in read_dir_or_empty(&self.collection_dir(Collection::Agents))? {
            let path = entry.join(AGENT_METADATA);
            match self.read(&path) {
                Ok(Some(record)) => records.push(record),
                Ok(None) => {}
                Err(e) => warn!(path = %path.display(), error = %e, "Skipping unreadable agent"),
            }
        }
        Ok(records)
    }

    /// Run `f` holding the exclusive lock that guards the record at `path`.
    ///
    /// Locking never creates directories: the record's directory must already
    /// exist, otherwise this fails with an io `NotFound`. Callers that may be
    /// handed an unknown id check [`Path::exists`] first.
    pub fn with_lock<R>(&self, path: &Path, f: impl FnOnce() -> Result<R>) -> Result<R> {
        lock::with_exclusive(&path.with_extension(LOCK_EXTENSION), &self.locks, f)
    }

    /// Run `f` holding the dependency-graph lock.
    pub fn with_graph_lock<R>(&self, f: impl FnOnce() -> Result<R>) -> Result<R> {
        lock::with_exclusive(&self.graph_lock_path(), &self.locks, f)
    }

    /// Expand a full id or a unique id prefix to a stored id.
    pub fn resolve_prefix(&self, collection: Collection, reference: &str) -> Result<Uuid> {
        let reference = reference.trim().to_lowercase();
        if let Ok(uuid) = Uuid::parse_str(&reference) {
            return Ok(uuid);
        }
        if reference.len() < 4 || !reference.chars().all(|c| c.is_ascii_hexdigit() || c == '-') {
            return Err(CoordinationError::InvalidInput(format!(
                "{reference:?} is not a {} id or id prefix (at least 4 hex characters)",
                collection.entity()
            )));
        }

        let dir = self.collection_dir(collection);
        let candidates: Vec<Uuid> = match collection {
            // Only directories holding a metadata record are agents
            Collection::Agents => read_dir_or_empty(&dir)?
                .iter()
                .filter(|path| path.join(AGENT_METADATA).is_file())
                .filter_map(|path| path.file_name()?.to_str()?.parse().ok())
                .collect(),
            _ => record_files(&dir)?
                .iter()
                .filter_map(|path| path.file_stem()?.to_str()?.parse().ok())
                .collect(),
        };

        let matches: Vec<Uuid> = candidates
            .into_iter()
            .filter(|id| id.to_string().starts_with(&reference))
            .collect();
        match matches.as_slice() {
            [] => Err(CoordinationError::NoMatch {
                kind: collection.entity(),
                reference,
            }),
            [only] => Ok(*only),
            many => Err(CoordinationError::AmbiguousReference {
                kind: collection.entity(),
                reference,
                matches: many.len(),
            }),
        }
    }
}

fn read_dir_or_empty(dir: &Path) -> Result<Vec<PathBuf>> {
    match fs::read_dir(dir) {
        Ok(entries) => Ok(entries
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .collect()),
        Err(e) if e.kind() == IoErrorKind::NotFound => Ok(Vec::new()),
        Err(e) => Err(e.into()),
    }
}

fn record_files(dir: &Path) -> Result<Vec<PathBuf>> {
    Ok(read_dir_or_empty(dir)?
        .into_iter()
        .filter(|path| {
            path.is_file()
                && path.extension().and_then(|ext| ext.to_str()) == Some(RECORD_EXTENSION)
                && !path
                    .file_name()
                    .and_then(|name| name.to_str())
                    .is_some_and(|name| name.starts_with('.'))
        })
        .collect())
}
