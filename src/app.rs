//! Main-thread side of the program: watcher callbacks arrive here as commands and drive the
//! status display.

use std::sync::mpsc::Receiver;
use tracing::{debug, info};

use crate::banner::StatusDisplay;
use crate::directory::WindowHandle;

/// Shown while the key file selection dialog is open.
pub const SELECTING: &str = "Selecting key file...";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BannerCommand {
    /// The key loader window is present at this handle.
    Attach(WindowHandle),
    DialogOpened,
    /// Full current text of the dialog's file-name field.
    FilenameEdited(String),
    DialogClosed,
    TargetClosed,
    Shutdown,
}

pub struct App<D: StatusDisplay> {
    display: D,
    buffered: String,
}

impl<D: StatusDisplay> App<D> {
    pub fn new(display: D) -> Self {
        Self {
            display,
            buffered: String::new(),
        }
    }

    #[cfg(test)]
    pub fn display(&self) -> &D {
        &self.display
    }

    /// Apply one command; false once the program should end.
    pub fn handle(&mut self, command: BannerCommand) -> bool {
        debug!(?command, "banner command");
        match command {
            BannerCommand::Attach(hwnd) => self.display.attach_to_window(hwnd),
            BannerCommand::DialogOpened => self.display.set_filename(SELECTING),
            BannerCommand::FilenameEdited(text) => self.buffered = text,
            // The dialog's field holds the final choice only when it closes.
            BannerCommand::DialogClosed => self.display.set_filename(&self.buffered),
            BannerCommand::TargetClosed => {
                info!("key loader closed; exiting");
                self.display.close();
                return false;
            }
            BannerCommand::Shutdown => {
                info!("shutdown requested");
                self.display.close();
                return false;
            }
        }
        true
    }

    /// Process commands until the key loader closes, shutdown is requested, or every sender
    /// is gone.
    pub fn run(&mut self, commands: &Receiver<BannerCommand>) {
        while let Ok(command) = commands.recv() {
            if !self.handle(command) {
                return;
            }
        }
        self.display.close();
    }
}
