use std::fmt;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::storage::{StorageError, VirtualPath};

/// Display name of the notebook every journal has.
pub const DEFAULT_NOTEBOOK: &str = "Default";

const DEFAULT_PREFIX: &str = "default";
const NOTEBOOKS_PREFIX: &str = "notebooks";

/// A journal entry as persisted (JSON) inside the encrypted store.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct JournalEntry {
    pub title: String,
    pub content: String,
    pub date: NaiveDate,
    pub created_time: DateTime<Utc>,
    #[serde(default)]
    pub word_count: usize,
}

impl JournalEntry {
    pub fn new(title: String, content: String, date: NaiveDate, created_time: DateTime<Utc>) -> Self {
        let word_count = content.split_whitespace().count();
        Self {
            title,
            content,
            date,
            created_time,
            word_count,
        }
    }
}

/// Caller-level grouping of entries, expressed purely as a virtual-path prefix.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Notebook {
    Default,
    Named(String),
}

impl Notebook {
    pub fn from_name(name: &str) -> Self {
        if name == DEFAULT_NOTEBOOK {
            Notebook::Default
        } else {
            Notebook::Named(name.to_string())
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Notebook::Default => DEFAULT_NOTEBOOK,
            Notebook::Named(name) => name,
        }
    }

    /// `default` or `notebooks/<name>`. Fails if the name is not a single segment.
    pub fn prefix(&self) -> Result<VirtualPath, StorageError> {
        match self {
            Notebook::Default => VirtualPath::parse(DEFAULT_PREFIX),
            Notebook::Named(name) => VirtualPath::parse(NOTEBOOKS_PREFIX)?.child(name),
        }
    }

    /// The named notebook a folder belongs to, if it lies under `notebooks/`.
    pub fn containing(folder: &VirtualPath) -> Option<Notebook> {
        let mut segments = folder.segments();
        match (segments.next(), segments.next()) {
            (Some(NOTEBOOKS_PREFIX), Some(name)) => Some(Notebook::Named(name.to_string())),
            _ => None,
        }
    }
}

impl fmt::Display for Notebook {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// An entry together with the virtual path it lives at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredEntry {
    pub path: VirtualPath,
    pub entry: JournalEntry,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NotebookStats {
    pub total_entries: usize,
    pub total_words: usize,
    pub last_entry_date: Option<NaiveDate>,
}

/// Entry persistence contract.
pub trait EntryRepository {
    /// Create a new entry in `notebook`, or rewrite the one at `existing`.
    fn save_entry(
        &mut self,
        notebook: &Notebook,
        existing: Option<&VirtualPath>,
        title: &str,
        content: &str,
    ) -> anyhow::Result<StoredEntry>;

    fn load_entry(&mut self, path: &VirtualPath) -> anyhow::Result<Option<JournalEntry>>;

    /// Entries of one notebook, newest first.
    fn list_entries(&mut self, notebook: &Notebook) -> anyhow::Result<Vec<StoredEntry>>;

    fn delete_entry(&mut self, path: &VirtualPath) -> anyhow::Result<bool>;
}

/// Notebook management contract.
pub trait NotebookRepository {
    /// `Default` first, then named notebooks in name order.
    fn list_notebooks(&self) -> Vec<Notebook>;

    fn create_notebook(&mut self, name: &str) -> anyhow::Result<Notebook>;

    fn rename_notebook(&mut self, notebook: &Notebook, new_name: &str) -> anyhow::Result<Notebook>;

    /// Removes every stored file of the notebook; returns how many were removed.
    fn delete_notebook(&mut self, notebook: &Notebook) -> anyhow::Result<usize>;

    fn notebook_stats(&mut self, notebook: &Notebook) -> anyhow::Result<NotebookStats>;
}
