//! Key file status display.
//!
//! The display shows the last selected key file name, when it was selected, and a border
//! color telling whether it is the user's primary key. [`LogBanner`] is the headless
//! implementation: it keeps the displayed state and reports every change through tracing.

use chrono::Local;
use tracing::{debug, info};

use crate::directory::WindowHandle;

/// Shown before any key file has been selected.
pub const NO_TIMESTAMP: &str = "--:-- --";

/// One-way interface of the status display. Driven from the main thread only.
pub trait StatusDisplay {
    /// Position the display relative to the key loader window.
    fn attach_to_window(&mut self, hwnd: WindowHandle);

    /// Show `filename` (a bare name or a full path) stamped with the current time.
    fn set_filename(&mut self, filename: &str);

    fn close(&mut self);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BorderColor {
    /// Nothing to compare: no file shown or no primary configured.
    Neutral,
    Primary,
    Mismatch,
}

/// Final path component; both separators are accepted regardless of platform.
pub fn file_name(path: &str) -> &str {
    path.rsplit(['\\', '/']).next().unwrap_or(path)
}

/// File name without its last extension. Leading-dot names keep their dot.
pub fn file_stem(path: &str) -> &str {
    let name = file_name(path);
    match name.rfind('.') {
        Some(i) if i > 0 => &name[..i],
        _ => name,
    }
}

/// Compare stems case-insensitively against the stored primary key name.
pub fn border_color(filename: &str, primary: Option<&str>) -> BorderColor {
    let stem = file_stem(filename);
    let primary = primary.map(file_stem).unwrap_or("");
    if stem.is_empty() || primary.is_empty() {
        BorderColor::Neutral
    } else if stem.to_lowercase() == primary.to_lowercase() {
        BorderColor::Primary
    } else {
        BorderColor::Mismatch
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BannerState {
    pub filename: String,
    pub timestamp: String,
    pub border: BorderColor,
    pub attached_to: Option<WindowHandle>,
    pub closed: bool,
}

impl Default for BannerState {
    fn default() -> Self {
        Self {
            filename: String::new(),
            timestamp: NO_TIMESTAMP.to_string(),
            border: BorderColor::Neutral,
            attached_to: None,
            closed: false,
        }
    }
}

pub struct LogBanner {
    primary: Option<String>,
    state: BannerState,
}

impl LogBanner {
    pub fn new(primary: Option<String>) -> Self {
        Self {
            primary,
            state: BannerState::default(),
        }
    }

    #[cfg(test)]
    pub fn state(&self) -> &BannerState {
        &self.state
    }
}

impl StatusDisplay for LogBanner {
    fn attach_to_window(&mut self, hwnd: WindowHandle) {
        if self.state.closed {
            return;
        }
        self.state.attached_to = Some(hwnd);
        info!(%hwnd, "banner attached to key loader");
    }

    fn set_filename(&mut self, filename: &str) {
        if self.state.closed {
            return;
        }
        self.state.filename = file_name(filename).to_string();
        self.state.timestamp = Local::now().format("%I:%M %p").to_string();
        self.state.border = border_color(filename, self.primary.as_deref());
        info!(
            file = %self.state.filename,
            time = %self.state.timestamp,
            border = ?self.state.border,
            loader = ?self.state.attached_to,
            "key file"
        );
    }

    fn close(&mut self) {
        if !self.state.closed {
            self.state.closed = true;
            debug!("banner closed");
        }
    }
}
