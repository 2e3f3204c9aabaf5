//! Command line definition and verbosity resolution.

use clap::{ArgAction, Parser};
use std::path::PathBuf;

use crate::directory::DIALOG_CLASS;

pub const DEFAULT_WINDOW_TITLE: &str = "Key Loader R8B";
pub const DEFAULT_DIALOG_TITLE: &str = "Select a distribituion set...";

/// Command line interface definition.
#[derive(Parser, Debug)]
#[command(
    version,
    about = concat!(
        env!("CARGO_PKG_NAME"), " v", env!("CARGO_PKG_VERSION"),
        " - Show which key file was last selected in the key loader.",
    )
)]
pub struct Cli {
    /// Exact title of the key loader window to follow.
    #[arg(long = "window-title", default_value = DEFAULT_WINDOW_TITLE)]
    pub window_title: String,
    /// Exact title of the key file selection dialog.
    #[arg(long = "dialog-title", default_value = DEFAULT_DIALOG_TITLE)]
    pub dialog_title: String,
    /// Window class of the key file selection dialog.
    #[arg(long = "dialog-class", default_value = DIALOG_CLASS)]
    pub dialog_class: String,
    /// Follow only the key loader window; do not watch for the selection dialog.
    #[arg(long = "no-dialog")]
    pub no_dialog: bool,
    /// Store NAME as the primary key file before starting.
    #[arg(long = "primary", value_name = "NAME")]
    pub primary: Option<String>,
    /// Read and write the primary key from PATH instead of the per-user data directory.
    #[arg(long = "settings-file", value_name = "PATH")]
    pub settings_file: Option<PathBuf>,
    /// Increase verbosity (-v=debug, -vv=trace). Overrides RUST_LOG.
    #[arg(short = 'v', long = "verbose", action = ArgAction::Count)]
    pub verbose: u8,
    /// Quiet mode (-q=warnings and errors, -qq=errors only). Overrides -v and RUST_LOG.
    #[arg(short = 'q', long = "quiet", action = ArgAction::Count)]
    pub quiet: u8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl Cli {
    /// `-q` wins over any number of `-v`.
    pub fn log_level(&self) -> LogLevel {
        match (self.quiet, self.verbose) {
            (0, 0) => LogLevel::Info,
            (0, 1) => LogLevel::Debug,
            (0, _) => LogLevel::Trace,
            (1, _) => LogLevel::Warn,
            (_, _) => LogLevel::Error,
        }
    }
}
