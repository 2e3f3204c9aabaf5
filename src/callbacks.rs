//! Watch callbacks for the key loader and its file selection dialog.
//!
//! Callbacks run on the watcher's background threads; each one only forwards a
//! [`BannerCommand`] to the main thread.

use std::sync::mpsc::Sender;
use tracing::debug;

use crate::app::BannerCommand;
use crate::registry::WatchSpec;

fn forward(tx: &Sender<BannerCommand>, command: BannerCommand) {
    if let Err(err) = tx.send(command) {
        debug!(command = ?err.0, "main thread gone; command dropped");
    }
}

/// Key loader window: attach on appearance, end the program when it closes.
pub fn target_watch(title: &str, tx: &Sender<BannerCommand>) -> WatchSpec {
    let (on_create, on_destroy) = (tx.clone(), tx.clone());
    WatchSpec::window(
        title,
        move |hwnd| forward(&on_create, BannerCommand::Attach(hwnd)),
        move || forward(&on_destroy, BannerCommand::TargetClosed),
    )
}

/// File selection dialog: placeholder while open, file-name edits buffered until it closes.
pub fn dialog_watch(title: &str, class: &str, tx: &Sender<BannerCommand>) -> WatchSpec {
    let (on_create, on_destroy, on_text) = (tx.clone(), tx.clone(), tx.clone());
    WatchSpec::dialog(
        title,
        class,
        move |_| forward(&on_create, BannerCommand::DialogOpened),
        move || forward(&on_destroy, BannerCommand::DialogClosed),
    )
    .on_text_changed(move |text| forward(&on_text, BannerCommand::FilenameEdited(text.into())))
}
