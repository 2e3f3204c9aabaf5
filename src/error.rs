//! Error taxonomy for the window watcher.

use std::path::PathBuf;
use std::time::Duration;

use crate::directory::WindowHandle;

/// Errors surfaced by the watcher and its collaborators.
#[derive(Debug, thiserror::Error)]
pub enum WatchError {
    /// Operation not allowed in the watcher's current lifecycle state.
    #[error("invalid watcher state: {0}")]
    InvalidState(&'static str),

    /// A watch with the same title and class was already registered.
    #[error("a watch for \"{title}\" is already registered")]
    DuplicateWatch { title: String },

    /// The OS refused an event hook subscription.
    #[error("event hook subscription refused for events 0x{min:04X}-0x{max:04X}")]
    HookSubscription { min: u32, max: u32 },

    /// Reading a title, class or text from a (possibly transient) window failed.
    #[error("window query ({what}) failed for {hwnd}")]
    WindowQuery {
        hwnd: WindowHandle,
        what: &'static str,
    },

    /// A background thread did not exit within the bounded join window.
    #[error("{thread} thread did not exit within {timeout:?}")]
    ThreadShutdownTimeout {
        thread: &'static str,
        timeout: Duration,
    },

    /// The native message pump reported a failure.
    #[error("message pump failed: {0}")]
    Pump(String),

    /// Window observation is bound to Win32.
    #[error("window observation is only supported on Windows")]
    Unsupported,

    /// Reading or writing the persisted primary key failed.
    #[error("settings file {path}: {source}")]
    Settings {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

pub type Result<T, E = WatchError> = std::result::Result<T, E>;
