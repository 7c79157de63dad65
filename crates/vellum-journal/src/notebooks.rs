use std::{collections::BTreeSet, iter};

use anyhow::{bail, Result};
use tracing::{info, instrument};
use vellum_core::{
    journal::{EntryRepository, Notebook, NotebookRepository, NotebookStats, DEFAULT_NOTEBOOK},
    storage::{VirtualPath, VirtualStore},
};

use crate::StoreJournal;

impl<S: VirtualStore> StoreJournal<S> {
    fn notebook_exists(&self, notebook: &Notebook) -> bool {
        self.list_notebooks().contains(notebook)
    }

    fn files_under(&self, folder: &VirtualPath) -> Vec<VirtualPath> {
        self.store
            .list_files(&format!("{folder}/"))
            .into_iter()
            .map(|info| info.virtual_path)
            .collect()
    }
}

impl<S: VirtualStore> NotebookRepository for StoreJournal<S> {
    fn list_notebooks(&self) -> Vec<Notebook> {
        let named: BTreeSet<Notebook> = self
            .store
            .list_virtual_folders()
            .iter()
            .filter_map(Notebook::containing)
            .collect();
        iter::once(Notebook::Default).chain(named).collect()
    }

    #[instrument(skip_all)]
    fn create_notebook(&mut self, name: &str) -> Result<Notebook> {
        let notebook = validated_notebook(name)?;
        if self.notebook_exists(&notebook) {
            bail!("a notebook named '{}' already exists", notebook.name());
        }

        self.store.create_virtual_folder(&notebook.prefix()?)?;
        Ok(notebook)
    }

    /// Moves every file to the new prefix by storing the copy before deleting the
    /// original, so an interruption can leave duplicates but never loses an entry.
    #[instrument(skip_all)]
    fn rename_notebook(&mut self, notebook: &Notebook, new_name: &str) -> Result<Notebook> {
        if *notebook == Notebook::Default {
            bail!("the {DEFAULT_NOTEBOOK} notebook cannot be renamed");
        }
        let target = validated_notebook(new_name)?;
        if target == *notebook {
            return Ok(target);
        }
        if !self.notebook_exists(notebook) {
            bail!("notebook '{}' does not exist", notebook.name());
        }
        if self.notebook_exists(&target) {
            bail!("a notebook named '{}' already exists", target.name());
        }

        let from = notebook.prefix()?;
        let to = target.prefix()?;
        let mut moved = 0usize;
        for path in self.files_under(&from) {
            let Some(relative) = path.relative_to(&from) else {
                continue;
            };
            let destination = to.join(relative)?;
            let Some(bytes) = self.store.load_file(&path)? else {
                continue;
            };
            self.store.store_file(&destination, &bytes)?;
            self.store.delete_file(&path)?;
            moved += 1;
        }

        self.ensure_notebook_marker(&target)?;
        info!(moved, "notebook renamed");
        Ok(target)
    }

    #[instrument(skip_all)]
    fn delete_notebook(&mut self, notebook: &Notebook) -> Result<usize> {
        if *notebook == Notebook::Default {
            bail!("the {DEFAULT_NOTEBOOK} notebook cannot be deleted");
        }
        if !self.notebook_exists(notebook) {
            bail!("notebook '{}' does not exist", notebook.name());
        }

        let mut removed = 0usize;
        for path in self.files_under(&notebook.prefix()?) {
            if self.store.delete_file(&path)? {
                removed += 1;
            }
        }
        info!(removed, "notebook deleted");
        Ok(removed)
    }

    fn notebook_stats(&mut self, notebook: &Notebook) -> Result<NotebookStats> {
        let entries = self.list_entries(notebook)?;
        Ok(NotebookStats {
            total_entries: entries.len(),
            total_words: entries.iter().map(|stored| stored.entry.word_count).sum(),
            last_entry_date: entries.iter().map(|stored| stored.entry.date).max(),
        })
    }
}

fn validated_notebook(name: &str) -> Result<Notebook> {
    let name = name.trim();
    if name.is_empty() {
        bail!("notebook name must not be empty");
    }
    if name.eq_ignore_ascii_case(DEFAULT_NOTEBOOK) {
        bail!("'{DEFAULT_NOTEBOOK}' is reserved");
    }

    let notebook = Notebook::Named(name.to_string());
    // Enforces the single-segment path grammar ('/', '.', '..', control characters).
    notebook.prefix()?;
    Ok(notebook)
}
