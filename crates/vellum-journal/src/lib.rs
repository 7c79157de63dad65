//! Journal entries and notebooks persisted through a `VirtualStore`.
//!
//! Entries live at `<notebook prefix>/<YYYY-MM-DD>/<safe title>_<HHMMSS>.enc` as JSON;
//! notebooks are nothing more than path prefixes plus a folder marker.

mod export;
mod naming;
mod notebooks;

use anyhow::{bail, Result};
use chrono::{DateTime, Days, Local, Utc};
use tracing::{instrument, warn};
use vellum_core::{
    journal::{EntryRepository, JournalEntry, Notebook, StoredEntry},
    storage::{StorageError, VirtualPath, VirtualStore},
};

pub use export::export_text;

use crate::naming::{safe_title, ENTRY_EXTENSION};

/// Source of "now" for entry dates and filenames.
pub type Clock = fn() -> DateTime<Local>;

/// Entry and notebook repository backed by a `VirtualStore` (encrypted at rest).
pub struct StoreJournal<S: VirtualStore> {
    store: S,
    clock: Clock,
}

impl<S: VirtualStore> StoreJournal<S> {
    pub fn new(store: S) -> Self {
        Self::with_clock(store, Local::now)
    }

    pub fn with_clock(store: S, clock: Clock) -> Self {
        Self { store, clock }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut S {
        &mut self.store
    }

    pub fn into_inner(self) -> S {
        self.store
    }

    /// Entries dated within the last `days` days, today included, newest first.
    pub fn recent_entries(&mut self, notebook: &Notebook, days: u32) -> Result<Vec<StoredEntry>> {
        if days == 0 {
            return Ok(Vec::new());
        }
        let today = (self.clock)().date_naive();
        let cutoff = today - Days::new(u64::from(days - 1));

        Ok(self
            .list_entries(notebook)?
            .into_iter()
            .filter(|stored| stored.entry.date >= cutoff)
            .collect())
    }

    /// First free `<stem>.enc`, `<stem>_2.enc`, ... inside `folder`.
    fn unique_entry_path(&self, folder: &VirtualPath, stem: &str) -> Result<VirtualPath> {
        let mut attempt = 1u32;
        loop {
            let name = if attempt == 1 {
                format!("{stem}{ENTRY_EXTENSION}")
            } else {
                format!("{stem}_{attempt}{ENTRY_EXTENSION}")
            };
            let candidate = folder.child(&name)?;
            if self.store.file_info(&candidate).is_none() {
                return Ok(candidate);
            }
            attempt += 1;
        }
    }

    /// Named notebooks keep a marker so they outlive their last entry.
    fn ensure_notebook_marker(&mut self, notebook: &Notebook) -> Result<()> {
        if let Notebook::Named(_) = notebook {
            let folder = notebook.prefix()?;
            if self.store.file_info(&folder.folder_marker()).is_none() {
                self.store.create_virtual_folder(&folder)?;
            }
        }
        Ok(())
    }

    fn entry_paths(&self, notebook: &Notebook) -> Result<Vec<VirtualPath>> {
        let prefix = format!("{}/", notebook.prefix()?);
        Ok(self
            .store
            .list_files(&prefix)
            .into_iter()
            .map(|info| info.virtual_path)
            .filter(|path| path.file_name().ends_with(ENTRY_EXTENSION))
            .collect())
    }
}

impl<S: VirtualStore> EntryRepository for StoreJournal<S> {
    #[instrument(skip_all, fields(update = existing.is_some()))]
    fn save_entry(
        &mut self,
        notebook: &Notebook,
        existing: Option<&VirtualPath>,
        title: &str,
        content: &str,
    ) -> Result<StoredEntry> {
        let title = title.trim();
        if title.is_empty() {
            bail!("entry title must not be empty");
        }
        if content.trim().is_empty() {
            bail!("entry content must not be empty");
        }

        let now = (self.clock)();
        let (path, date, created_time) = match existing {
            Some(path) => match self.store.load_json::<JournalEntry>(path)? {
                Some(previous) => (path.clone(), previous.date, previous.created_time),
                None => (path.clone(), now.date_naive(), now.with_timezone(&Utc)),
            },
            None => {
                let folder = notebook
                    .prefix()?
                    .child(&now.format("%Y-%m-%d").to_string())?;
                let stem = format!("{}_{}", safe_title(title), now.format("%H%M%S"));
                let path = self.unique_entry_path(&folder, &stem)?;
                (path, now.date_naive(), now.with_timezone(&Utc))
            }
        };

        self.ensure_notebook_marker(notebook)?;
        let entry = JournalEntry::new(title.to_string(), content.to_string(), date, created_time);
        self.store.store_json(&path, &entry)?;
        Ok(StoredEntry { path, entry })
    }

    fn load_entry(&mut self, path: &VirtualPath) -> Result<Option<JournalEntry>> {
        Ok(self.store.load_json(path)?)
    }

    #[instrument(skip_all)]
    fn list_entries(&mut self, notebook: &Notebook) -> Result<Vec<StoredEntry>> {
        let mut entries = Vec::new();
        for path in self.entry_paths(notebook)? {
            match self.store.load_json::<JournalEntry>(&path) {
                Ok(Some(entry)) => entries.push(StoredEntry { path, entry }),
                Ok(None) => {}
                Err(StorageError::Serialization { reason }) => {
                    warn!(%reason, "skipping malformed entry");
                }
                Err(err) => return Err(err.into()),
            }
        }

        entries.sort_by(|a, b| {
            (b.entry.date, b.entry.created_time).cmp(&(a.entry.date, a.entry.created_time))
        });
        Ok(entries)
    }

    fn delete_entry(&mut self, path: &VirtualPath) -> Result<bool> {
        Ok(self.store.delete_file(path)?)
    }
}
