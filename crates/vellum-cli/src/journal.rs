use std::{
    fs,
    io::{self, Read},
    path::Path,
};

use color_eyre::{
    eyre::{bail, eyre, WrapErr},
    Result,
};
use vellum_core::{
    journal::{EntryRepository, Notebook, NotebookRepository},
    storage::{VirtualPath, VirtualStore},
};
use vellum_journal::{export_text, StoreJournal};

use crate::cli::{EntryCommand, NotebookCommand};

/// Execute an entry subcommand against the journal.
pub fn handle_entry<S: VirtualStore>(journal: &mut StoreJournal<S>, cmd: EntryCommand) -> Result<()> {
    match cmd {
        EntryCommand::Add {
            notebook,
            title,
            content,
        } => {
            let content = content_or_stdin(content)?;
            let stored = journal
                .save_entry(&Notebook::from_name(&notebook), None, &title, &content)
                .map_err(to_eyre)?;
            println!(
                "Saved \"{}\" ({} words) at {}",
                stored.entry.title, stored.entry.word_count, stored.path
            );
        }
        EntryCommand::Edit {
            path,
            title,
            content,
        } => {
            let path = VirtualPath::parse(&path)?;
            if journal.load_entry(&path).map_err(to_eyre)?.is_none() {
                bail!("no entry at {path}");
            }
            let notebook = owning_notebook(&path);
            let content = content_or_stdin(content)?;
            let stored = journal
                .save_entry(&notebook, Some(&path), &title, &content)
                .map_err(to_eyre)?;
            println!("Updated \"{}\" at {}", stored.entry.title, stored.path);
        }
        EntryCommand::List { notebook, days } => {
            let notebook = Notebook::from_name(&notebook);
            let entries = match days {
                Some(days) => journal.recent_entries(&notebook, days),
                None => journal.list_entries(&notebook),
            }
            .map_err(to_eyre)?;
            if entries.is_empty() {
                println!("No entries in {notebook}. Add one with `vellum entry add --title <title>`.");
                return Ok(());
            }
            for stored in entries {
                println!(
                    "{}  {:<30}  {:>5} words  {}",
                    stored.entry.date, stored.entry.title, stored.entry.word_count, stored.path
                );
            }
        }
        EntryCommand::Show { path } => {
            let path = VirtualPath::parse(&path)?;
            let Some(entry) = journal.load_entry(&path).map_err(to_eyre)? else {
                bail!("no entry at {path}");
            };
            println!("{}", entry.title);
            println!("{} · {} words", entry.date, entry.word_count);
            println!();
            println!("{}", entry.content);
        }
        EntryCommand::Delete { path } => {
            let path = VirtualPath::parse(&path)?;
            if journal.delete_entry(&path).map_err(to_eyre)? {
                println!("Deleted {path}");
            } else {
                println!("No entry at {path}");
            }
        }
    }
    Ok(())
}

/// Execute a notebook subcommand against the journal.
pub fn handle_notebook<S: VirtualStore>(
    journal: &mut StoreJournal<S>,
    cmd: NotebookCommand,
) -> Result<()> {
    match cmd {
        NotebookCommand::List => {
            for notebook in journal.list_notebooks() {
                println!("{notebook}");
            }
        }
        NotebookCommand::Create { name } => {
            let notebook = journal.create_notebook(&name).map_err(to_eyre)?;
            println!("Created notebook {notebook}");
        }
        NotebookCommand::Rename { name, new_name } => {
            let renamed = journal
                .rename_notebook(&Notebook::from_name(&name), &new_name)
                .map_err(to_eyre)?;
            println!("Renamed {name} to {renamed}");
        }
        NotebookCommand::Delete { name, yes } => {
            if !yes {
                bail!("deleting notebook '{name}' removes all of its entries; pass --yes to confirm");
            }
            let removed = journal
                .delete_notebook(&Notebook::from_name(&name))
                .map_err(to_eyre)?;
            println!("Deleted notebook {name} ({removed} file(s) removed)");
        }
        NotebookCommand::Stats { name } => {
            let notebook = Notebook::from_name(&name);
            let stats = journal.notebook_stats(&notebook).map_err(to_eyre)?;
            println!("Notebook:   {notebook}");
            println!("Entries:    {}", stats.total_entries);
            println!("Words:      {}", stats.total_words);
            match stats.last_entry_date {
                Some(date) => println!("Last entry: {date}"),
                None => println!("Last entry: never"),
            }
        }
    }
    Ok(())
}

/// Write a plain-text export of `notebook` to `output`.
pub fn export<S: VirtualStore>(
    journal: &mut StoreJournal<S>,
    notebook: &str,
    output: &Path,
) -> Result<usize> {
    let entries = journal
        .list_entries(&Notebook::from_name(notebook))
        .map_err(to_eyre)?;
    fs::write(output, export_text(&entries))
        .wrap_err_with(|| format!("failed to write {}", output.display()))?;
    println!("Exported {} entries to {}", entries.len(), output.display());
    Ok(entries.len())
}

fn owning_notebook(path: &VirtualPath) -> Notebook {
    path.parent()
        .and_then(|folder| Notebook::containing(&folder))
        .unwrap_or(Notebook::Default)
}

fn content_or_stdin(content: Option<String>) -> Result<String> {
    match content {
        Some(content) => Ok(content),
        None => {
            let mut buf = String::new();
            io::stdin().read_to_string(&mut buf)?;
            Ok(buf)
        }
    }
}

fn to_eyre(err: anyhow::Error) -> color_eyre::Report {
    eyre!("{err:#}")
}
