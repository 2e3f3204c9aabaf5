//! Window handle directory: stateless lookups of live windows by title and class.
//!
//! Nothing here retains state between calls. The native implementation lives in `win32`;
//! tests substitute an in-memory desktop.

use std::fmt;

use crate::error::Result;

/// Window class shared by standard dialog boxes.
pub const DIALOG_CLASS: &str = "#32770";

/// Child class chain from a file dialog down to its file-name edit field.
pub const TRACKED_CONTROL_PATH: [&str; 3] = ["ComboBoxEx32", "ComboBox", "Edit"];

/// Opaque OS window identifier. Invalid once the window is destroyed.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct WindowHandle(pub isize);

impl WindowHandle {
    pub fn is_null(self) -> bool {
        self.0 == 0
    }
}

impl fmt::Display for WindowHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:08X}", self.0)
    }
}

/// Read-only queries against the desktop's window tree.
pub trait WindowDirectory: Send + Sync + 'static {
    /// First top-level window with exactly this title (and class, when given).
    fn find_window(&self, class: Option<&str>, title: &str) -> Option<WindowHandle>;

    /// First direct child of `parent` with the given class.
    fn find_child(&self, parent: WindowHandle, class: &str) -> Option<WindowHandle>;

    /// Whether `hwnd` is a live window with no parent. Child controls can carry any title.
    fn is_top_level(&self, hwnd: WindowHandle) -> bool;

    fn window_title(&self, hwnd: WindowHandle) -> Result<String>;

    fn window_class(&self, hwnd: WindowHandle) -> Result<String>;

    /// Full current text of an edit-style control.
    fn control_text(&self, hwnd: WindowHandle) -> Result<String>;

    /// Locate the text-entry control whose edits are reported for a dialog.
    ///
    /// Depends on the target dialog's internal control layout; override when the layout
    /// differs from [`TRACKED_CONTROL_PATH`].
    fn locate_tracked_control(&self, dialog: WindowHandle) -> Option<WindowHandle> {
        TRACKED_CONTROL_PATH
            .iter()
            .try_fold(dialog, |parent, class| self.find_child(parent, class))
    }
}
