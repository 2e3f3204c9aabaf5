//! Key file banner for the key loader.
//!
//! Follows the key loader window and its key file selection dialog through out-of-process
//! WinEvent hooks, and keeps a status display showing which key file was picked last and
//! whether it is the user's primary key.
//!
//! High-level flow:
//! 1. Parse CLI and initialize tracing.
//! 2. Persist `--primary` if given and load the stored primary key name.
//! 3. Register the loader and dialog watches; an already-open loader is attached at once.
//! 4. Start the watcher. Its callbacks forward commands to the main thread.
//! 5. Drive the display from those commands until the loader closes or Ctrl+C arrives.
//! 6. Stop the watcher, which removes the hooks and ends its threads.

mod app;
mod banner;
mod callbacks;
mod cli;
mod directory;
mod discovery;
mod dispatch;
mod error;
mod hooks;
mod initialization;
mod logging;
mod registry;
mod settings;
mod shutdown;
#[cfg(test)]
mod test_support;
mod watcher;
#[cfg(windows)]
mod win32;

use anyhow::{Context, Result};
use clap::Parser;
use std::sync::mpsc::channel;
use tracing::info;

use app::{App, BannerCommand};
use banner::LogBanner;
use cli::Cli;
use initialization::{primary_store, register_watches, resolve_primary};
use logging::configure_logging;
use watcher::WindowWatcher;

/// Program entry point. Errors surfaced during startup end the process with a non-zero exit
/// code via anyhow.
fn main() -> Result<()> {
    let cli = Cli::parse();
    configure_logging(cli.log_level());
    info!(version = env!("CARGO_PKG_VERSION"), ?cli, "starting keywatch");

    let store = primary_store(&cli);
    let primary = resolve_primary(&cli, &store).context("loading primary key")?;
    info!(primary = ?primary, path = %store.path().display(), "primary key");

    let watcher = WindowWatcher::native().context("creating window watcher")?;
    let (tx, rx) = channel();
    let target = register_watches(&watcher, &cli, &tx).context("registering watches")?;

    let mut app = App::new(LogBanner::new(primary));
    if let Some(hwnd) = target {
        app.handle(BannerCommand::Attach(hwnd));
    }

    {
        let tx = tx.clone();
        ctrlc::set_handler(move || {
            info!("Ctrl+C received, shutting down");
            let _ = tx.send(BannerCommand::Shutdown);
        })
        .context("installing Ctrl+C handler")?;
    }
    drop(tx);

    watcher.start().context("starting window watcher")?;
    app.run(&rx);
    watcher.stop();
    Ok(())
}
