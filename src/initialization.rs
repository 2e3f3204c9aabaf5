//! Startup steps extracted from `main`: primary key resolution and watch registration.

use std::sync::mpsc::Sender;
use tracing::{info, warn};

use crate::app::BannerCommand;
use crate::callbacks::{dialog_watch, target_watch};
use crate::cli::Cli;
use crate::directory::WindowHandle;
use crate::error::Result;
use crate::settings::PrimaryKeyStore;
use crate::watcher::WindowWatcher;

pub fn primary_store(cli: &Cli) -> PrimaryKeyStore {
    cli.settings_file
        .clone()
        .map_or_else(PrimaryKeyStore::default_location, PrimaryKeyStore::at)
}

/// Persist `--primary` when given, then return the stored primary key name.
pub fn resolve_primary(cli: &Cli, store: &PrimaryKeyStore) -> Result<Option<String>> {
    if let Some(name) = cli.primary.as_deref() {
        let name = name.trim();
        if name.is_empty() {
            warn!("empty --primary ignored");
        } else {
            store.save(name)?;
        }
    }
    store.load()
}

/// Register the key loader (and unless disabled, its selection dialog) and return the loader's
/// handle when it is already open.
///
/// An already-open loader gets no `on_create`, so the caller attaches the display itself.
pub fn register_watches(
    watcher: &WindowWatcher,
    cli: &Cli,
    tx: &Sender<BannerCommand>,
) -> Result<Option<WindowHandle>> {
    let target = watcher.register(target_watch(&cli.window_title, tx))?;
    match target {
        Some(hwnd) => info!(title = %cli.window_title, %hwnd, "key loader already open"),
        None => info!(title = %cli.window_title, "waiting for key loader"),
    }
    if cli.no_dialog {
        return Ok(target);
    }
    if watcher
        .register(dialog_watch(&cli.dialog_title, &cli.dialog_class, tx))?
        .is_some()
    {
        // Its edits so far were never observed; the next close reports what is buffered.
        warn!(title = %cli.dialog_title, "selection dialog already open at startup");
    }
    Ok(target)
}
