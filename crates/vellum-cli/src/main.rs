mod cli;
mod config;
mod files;
mod journal;
mod storage;

use crate::cli::{Command, ConfigCommand};
use clap::Parser;
use color_eyre::Result;
use files::PutSource;
use tracing::warn;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};
use vellum_core::storage::{VirtualPath, VirtualStore};
use vellum_journal::StoreJournal;

/// Entry point wiring the CLI to the encrypted storage and journal.
#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    init_tracing();

    let cli = cli::Cli::parse();
    let config = config::load()?;
    let recover = cli.recover_index;
    match cli.command.unwrap_or(Command::Stats) {
        Command::Version => print_version(),
        Command::Health => run_health_check(&config, recover).await?,
        Command::Config(ConfigCommand::Init) => init_config(&config)?,
        Command::Put { path, text, file } => {
            let mut storage = storage::open_storage(&config, recover).await?;
            files::put(&mut storage, &path, PutSource::from_args(text, file))?;
        }
        Command::Get { path, output } => {
            let mut storage = storage::open_storage(&config, recover).await?;
            files::get(&mut storage, &path, output.as_deref())?;
        }
        Command::Rm { path } => {
            let mut storage = storage::open_storage(&config, recover).await?;
            files::remove(&mut storage, &path)?;
        }
        Command::Ls { prefix } => {
            let storage = storage::open_storage(&config, recover).await?;
            files::list(&storage, &prefix);
        }
        Command::Info { path } => {
            let storage = storage::open_storage(&config, recover).await?;
            files::info(&storage, &path)?;
        }
        Command::Mkdir { folder } => {
            let mut storage = storage::open_storage(&config, recover).await?;
            files::make_folder(&mut storage, &folder)?;
        }
        Command::Folders => {
            let storage = storage::open_storage(&config, recover).await?;
            files::folders(&storage);
        }
        Command::Stats => {
            let storage = storage::open_storage(&config, recover).await?;
            files::stats(&storage)?;
        }
        Command::Cleanup => {
            let mut storage = storage::open_storage(&config, recover).await?;
            files::cleanup(&mut storage)?;
        }
        Command::Entry(cmd) => {
            let mut journal = StoreJournal::new(storage::open_storage(&config, recover).await?);
            journal::handle_entry(&mut journal, cmd)?;
        }
        Command::Notebook(cmd) => {
            let mut journal = StoreJournal::new(storage::open_storage(&config, recover).await?);
            journal::handle_notebook(&mut journal, cmd)?;
        }
        Command::Export { notebook, output } => {
            let mut journal = StoreJournal::new(storage::open_storage(&config, recover).await?);
            journal::export(&mut journal, &notebook, &output)?;
        }
    }

    Ok(())
}

fn init_tracing() {
    // Respect user-provided filters, default to info to avoid noisy stdout.
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_target(false)
        .with_writer(std::io::stderr);
    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .init();
}

fn print_version() {
    println!("vellum {}", env!("CARGO_PKG_VERSION"));
}

/// Checks the key, round-trips a probe document, and compares index and disk counts.
async fn run_health_check(config: &config::Config, recover: bool) -> Result<()> {
    let mut storage = storage::open_storage(config, recover).await?;
    storage.verify_key()?;
    run_store_health(&mut storage)?;

    let stats = storage.get_storage_stats()?;
    if stats.physical_file_count != stats.virtual_file_count {
        warn!(
            indexed = stats.virtual_file_count,
            on_disk = stats.physical_file_count,
            "index and storage directory disagree; `vellum cleanup` removes orphans"
        );
    }
    println!("Storage: ok ({} documents)", stats.virtual_file_count);
    Ok(())
}

fn run_store_health<S: VirtualStore>(store: &mut S) -> Result<()> {
    let probe = VirtualPath::parse("health/.probe")?;
    let payload = b"ok";
    store.store_file(&probe, payload)?;
    let round_trip = store.load_file(&probe)?;
    store.delete_file(&probe)?;

    if round_trip.as_deref() != Some(payload.as_slice()) {
        color_eyre::eyre::bail!("storage round-trip failed");
    }
    Ok(())
}

fn init_config(config: &config::Config) -> Result<()> {
    let path = config::write_default_if_missing(config)?;
    println!("Config initialized at {}", path.display());
    Ok(())
}
