use std::path::PathBuf;

use clap::{Parser, Subcommand};
use vellum_core::journal::DEFAULT_NOTEBOOK;

/// CLI surface definition.
#[derive(Parser, Debug)]
#[command(
    name = "vellum",
    about = "Encrypted journal whose files, names, and folders stay hidden on disk",
    version,
    propagate_version = true
)]
pub struct Cli {
    /// Fall back to the previous index generation if the current index is unreadable.
    #[arg(long, global = true)]
    pub recover_index: bool,

    /// Optional subcommand; defaults to printing storage stats when absent.
    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Print version and exit.
    Version,
    /// Verify the key and run a round-trip probe against the encrypted storage.
    Health,
    /// Manage CLI configuration.
    #[command(subcommand)]
    Config(ConfigCommand),
    /// Store a document at a virtual path (reads stdin without --text or --file).
    Put {
        path: String,
        #[arg(long, conflicts_with = "file")]
        text: Option<String>,
        #[arg(long)]
        file: Option<PathBuf>,
    },
    /// Print a stored document, or write it to --output.
    Get {
        path: String,
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Delete a stored document.
    Rm { path: String },
    /// List documents whose virtual path starts with PREFIX.
    Ls {
        #[arg(default_value = "")]
        prefix: String,
    },
    /// Show index metadata for a document.
    Info { path: String },
    /// Create an (empty) virtual folder.
    Mkdir { folder: String },
    /// List virtual folders.
    Folders,
    /// Show storage statistics.
    Stats,
    /// Remove physical files that no index entry points to.
    Cleanup,
    /// Work with journal entries.
    #[command(subcommand)]
    Entry(EntryCommand),
    /// Work with notebooks.
    #[command(subcommand)]
    Notebook(NotebookCommand),
    /// Export a notebook as plain text.
    Export {
        #[arg(long, default_value = DEFAULT_NOTEBOOK)]
        notebook: String,
        #[arg(long)]
        output: PathBuf,
    },
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum ConfigCommand {
    /// Create a default config file if one does not exist.
    Init,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum EntryCommand {
    /// Write a new entry (content from stdin without --content).
    Add {
        #[arg(long, default_value = DEFAULT_NOTEBOOK)]
        notebook: String,
        #[arg(long)]
        title: String,
        #[arg(long)]
        content: Option<String>,
    },
    /// Rewrite an existing entry in place.
    Edit {
        path: String,
        #[arg(long)]
        title: String,
        #[arg(long)]
        content: Option<String>,
    },
    /// List entries of a notebook, newest first.
    List {
        #[arg(long, default_value = DEFAULT_NOTEBOOK)]
        notebook: String,
        /// Only entries from the last N days.
        #[arg(long)]
        days: Option<u32>,
    },
    /// Print one entry.
    Show { path: String },
    /// Delete one entry.
    Delete { path: String },
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum NotebookCommand {
    List,
    Create { name: String },
    Rename { name: String, new_name: String },
    /// Delete a notebook and every entry in it.
    Delete {
        name: String,
        /// Required; deletion cannot be undone.
        #[arg(long)]
        yes: bool,
    },
    Stats { name: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_to_stats_when_missing_subcommand() {
        let cli = Cli::try_parse_from(["vellum"]).expect("parse should succeed");
        assert_eq!(cli.command, None);
        assert!(!cli.recover_index);
    }

    #[test]
    fn parses_global_recover_flag_after_subcommand() {
        let cli = Cli::try_parse_from(["vellum", "stats", "--recover-index"])
            .expect("parse should succeed");
        assert_eq!(cli.command, Some(Command::Stats));
        assert!(cli.recover_index);
    }

    #[test]
    fn parses_put_with_text() {
        let cli = Cli::try_parse_from(["vellum", "put", "default/a.enc", "--text", "hi"])
            .expect("parse should succeed");
        assert_eq!(
            cli.command,
            Some(Command::Put {
                path: "default/a.enc".into(),
                text: Some("hi".into()),
                file: None,
            })
        );
    }

    #[test]
    fn put_rejects_text_and_file_together() {
        let result =
            Cli::try_parse_from(["vellum", "put", "a", "--text", "x", "--file", "/tmp/x"]);
        assert!(result.is_err());
    }

    #[test]
    fn entry_add_defaults_to_default_notebook() {
        let cli = Cli::try_parse_from(["vellum", "entry", "add", "--title", "Hello"])
            .expect("parse should succeed");
        assert_eq!(
            cli.command,
            Some(Command::Entry(EntryCommand::Add {
                notebook: DEFAULT_NOTEBOOK.into(),
                title: "Hello".into(),
                content: None,
            }))
        );
    }

    #[test]
    fn parses_notebook_rename() {
        let cli = Cli::try_parse_from(["vellum", "notebook", "rename", "Old", "New"])
            .expect("parse should succeed");
        assert_eq!(
            cli.command,
            Some(Command::Notebook(NotebookCommand::Rename {
                name: "Old".into(),
                new_name: "New".into(),
            }))
        );
    }

    #[test]
    fn parses_config_init_subcommand() {
        let cli = Cli::try_parse_from(["vellum", "config", "init"]).expect("parse should succeed");
        assert_eq!(cli.command, Some(Command::Config(ConfigCommand::Init)));
    }
}
