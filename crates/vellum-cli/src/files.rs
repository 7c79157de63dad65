use std::{
    fs,
    io::{self, Read, Write},
    path::{Path, PathBuf},
};

use color_eyre::{eyre::WrapErr, Result};
use vellum_core::storage::{VirtualPath, VirtualStore};
use vellum_storage::{SecureStorageManager, StorageStats};

/// Where `put` takes its payload from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PutSource {
    Text(String),
    File(PathBuf),
    Stdin,
}

impl PutSource {
    pub fn from_args(text: Option<String>, file: Option<PathBuf>) -> Self {
        match (text, file) {
            (Some(text), _) => PutSource::Text(text),
            (None, Some(file)) => PutSource::File(file),
            (None, None) => PutSource::Stdin,
        }
    }

    fn read(self) -> Result<Vec<u8>> {
        match self {
            PutSource::Text(text) => Ok(text.into_bytes()),
            PutSource::File(path) => {
                fs::read(&path).wrap_err_with(|| format!("failed to read {}", path.display()))
            }
            PutSource::Stdin => {
                let mut buf = Vec::new();
                io::stdin().read_to_end(&mut buf)?;
                Ok(buf)
            }
        }
    }
}

pub fn put<S: VirtualStore>(store: &mut S, path: &str, source: PutSource) -> Result<()> {
    let path = VirtualPath::parse(path)?;
    let data = source.read()?;
    store.store_file(&path, &data)?;
    println!("Stored {path} ({} bytes)", data.len());
    Ok(())
}

pub fn get<S: VirtualStore>(store: &mut S, path: &str, output: Option<&Path>) -> Result<()> {
    let path = VirtualPath::parse(path)?;
    let Some(data) = store.load_file(&path)? else {
        color_eyre::eyre::bail!("no document at {path}");
    };
    match output {
        Some(target) => {
            fs::write(target, &data)
                .wrap_err_with(|| format!("failed to write {}", target.display()))?;
            println!("Wrote {} bytes to {}", data.len(), target.display());
        }
        None => {
            let mut stdout = io::stdout().lock();
            stdout.write_all(&data)?;
            stdout.flush()?;
        }
    }
    Ok(())
}

pub fn remove<S: VirtualStore>(store: &mut S, path: &str) -> Result<()> {
    let path = VirtualPath::parse(path)?;
    if store.delete_file(&path)? {
        println!("Deleted {path}");
    } else {
        println!("Nothing stored at {path}");
    }
    Ok(())
}

pub fn list<S: VirtualStore>(store: &S, prefix: &str) {
    let files = store.list_files(prefix);
    if files.is_empty() {
        println!("No documents.");
        return;
    }
    for info in files {
        println!(
            "{}  {:>8}  {}",
            info.created_time.format("%Y-%m-%d %H:%M:%S"),
            info.size,
            info.virtual_path
        );
    }
}

pub fn info<S: VirtualStore>(store: &S, path: &str) -> Result<()> {
    let path = VirtualPath::parse(path)?;
    match store.file_info(&path) {
        Some(info) => {
            println!("path:    {}", info.virtual_path);
            println!("created: {}", info.created_time.to_rfc3339());
            println!("size:    {} bytes", info.size);
        }
        None => println!("No document at {path}"),
    }
    Ok(())
}

pub fn make_folder<S: VirtualStore>(store: &mut S, folder: &str) -> Result<()> {
    let folder = VirtualPath::parse(folder)?;
    store.create_virtual_folder(&folder)?;
    println!("Created folder {folder}");
    Ok(())
}

pub fn folders<S: VirtualStore>(store: &S) {
    let folders = store.list_virtual_folders();
    if folders.is_empty() {
        println!("No folders.");
    }
    for folder in folders {
        println!("{folder}/");
    }
}

pub fn stats(storage: &SecureStorageManager) -> Result<StorageStats> {
    let stats = storage.get_storage_stats()?;
    println!("Storage:        {}", storage.root().display());
    println!("Documents:      {}", stats.virtual_file_count);
    println!("Data files:     {}", stats.physical_file_count);
    println!("Data size:      {} MB", stats.total_size_mb());
    println!("Index size:     {} bytes", stats.index_bytes);
    Ok(stats)
}

pub fn cleanup(storage: &mut SecureStorageManager) -> Result<()> {
    let removed = storage.cleanup_orphaned_files()?;
    println!("Removed {removed} orphaned file(s)");
    Ok(())
}
