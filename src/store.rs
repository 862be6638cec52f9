use std::cell::RefCell;
use std::collections::HashSet;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::{debug, warn};

/// A persisted set of strings.
pub trait KeySetStore {
    fn load(&self) -> Result<HashSet<String>>;
    fn save(&self, keys: &HashSet<String>) -> Result<()>;
}

/// JSON array of strings, written sorted so diffs stay readable.
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        JsonFileStore { path: path.into() }
    }
}

impl KeySetStore for JsonFileStore {
    fn load(&self) -> Result<HashSet<String>> {
        if !self.path.exists() {
            return Ok(HashSet::new());
        }
        let raw = std::fs::read_to_string(&self.path)
            .with_context(|| format!("Failed to read {}", self.path.display()))?;
        let keys: Vec<String> = serde_json::from_str(&raw)
            .with_context(|| format!("Invalid JSON array in {}", self.path.display()))?;
        Ok(keys.into_iter().collect())
    }

    fn save(&self, keys: &HashSet<String>) -> Result<()> {
        ensure_parent(&self.path)?;
        let json = serde_json::to_string_pretty(&sorted(keys))?;
        std::fs::write(&self.path, json)
            .with_context(|| format!("Failed to write {}", self.path.display()))
    }
}

/// One entry per line; blank lines are skipped.
pub struct LineFileStore {
    path: PathBuf,
}

impl LineFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        LineFileStore { path: path.into() }
    }
}

impl KeySetStore for LineFileStore {
    fn load(&self) -> Result<HashSet<String>> {
        if !self.path.exists() {
            return Ok(HashSet::new());
        }
        let raw = std::fs::read_to_string(&self.path)
            .with_context(|| format!("Failed to read {}", self.path.display()))?;
        Ok(raw
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .map(str::to_string)
            .collect())
    }

    fn save(&self, keys: &HashSet<String>) -> Result<()> {
        ensure_parent(&self.path)?;
        let mut body = sorted(keys).join("\n");
        body.push('\n');
        std::fs::write(&self.path, body)
            .with_context(|| format!("Failed to write {}", self.path.display()))
    }
}

/// Keeps everything in process; used for dry runs and tests.
#[derive(Default)]
pub struct MemoryStore {
    keys: RefCell<HashSet<String>>,
}

impl MemoryStore {
    pub fn with_keys<I, S>(keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        MemoryStore {
            keys: RefCell::new(keys.into_iter().map(Into::into).collect()),
        }
    }
}

impl KeySetStore for MemoryStore {
    fn load(&self) -> Result<HashSet<String>> {
        Ok(self.keys.borrow().clone())
    }

    fn save(&self, keys: &HashSet<String>) -> Result<()> {
        *self.keys.borrow_mut() = keys.clone();
        Ok(())
    }
}

fn ensure_parent(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    Ok(())
}

fn sorted(keys: &HashSet<String>) -> Vec<&str> {
    let mut v: Vec<&str> = keys.iter().map(String::as_str).collect();
    v.sort();
    v
}

/// Known header names. The in-memory set is authoritative; the backend is
/// written after every new name and write failures are only logged.
pub struct VocabularyStore {
    words: HashSet<String>,
    backend: Box<dyn KeySetStore>,
}

impl VocabularyStore {
    /// Load the persisted vocabulary and merge in `seed`. An unreadable
    /// backend yields an empty vocabulary.
    pub fn load(backend: Box<dyn KeySetStore>, seed: &[String]) -> Self {
        let mut words = load_or_empty(backend.as_ref(), "Vocabulary");
        words.extend(seed.iter().cloned());
        debug!("Vocabulary loaded: {} names", words.len());
        VocabularyStore { words, backend }
    }

    /// Read `source` once; later learning stays in memory.
    pub fn load_detached(source: &dyn KeySetStore, seed: &[String]) -> Self {
        let words = load_or_empty(source, "Vocabulary");
        Self::load(Box::new(MemoryStore::with_keys(words)), seed)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.words.contains(name)
    }

    /// Add `name` and persist. Returns true if the name was new.
    pub fn learn(&mut self, name: &str) -> bool {
        if !self.words.insert(name.to_string()) {
            return false;
        }
        debug!("Learned header: {}", name);
        if let Err(e) = self.backend.save(&self.words) {
            warn!("Vocabulary save failed (keeping in memory): {:#}", e);
        }
        true
    }

    pub fn len(&self) -> usize {
        self.words.len()
    }

    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }

    /// Names in sorted order.
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        sorted(&self.words).into_iter()
    }
}

/// Read-only blacklist load; failures yield an empty set.
pub fn load_blacklist(store: &dyn KeySetStore) -> HashSet<String> {
    load_or_empty(store, "Blacklist")
}

fn load_or_empty(store: &dyn KeySetStore, what: &str) -> HashSet<String> {
    store.load().unwrap_or_else(|e| {
        warn!("{} load failed, using an empty set: {:#}", what, e);
        HashSet::new()
    })
}
