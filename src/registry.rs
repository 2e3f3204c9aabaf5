//! Watch registry: the lock-guarded set of watched windows.
//!
//! Every registered watch lives in exactly one of two collections: `pending` (window absent,
//! no handle) or `active` (window present, handle set). All reads and writes happen under a
//! single mutex; the transition methods hand back a snapshot of the moved record so callers
//! can fire callbacks after the lock is released.

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::directory::WindowHandle;
use crate::error::{Result, WatchError};

pub type CreateCallback = Arc<dyn Fn(WindowHandle) + Send + Sync>;
pub type DestroyCallback = Arc<dyn Fn() + Send + Sync>;
pub type TextCallback = Arc<dyn Fn(&str) + Send + Sync>;

/// Identity of a watch: the window title plus, for dialogs, the dialog window class.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct WatchKey {
    pub title: String,
    pub class: Option<String>,
}

impl WatchKey {
    pub fn window(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            class: None,
        }
    }

    pub fn dialog(title: impl Into<String>, class: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            class: Some(class.into()),
        }
    }

    pub fn is_dialog(&self) -> bool {
        self.class.is_some()
    }

    /// Whether a window with this title and class satisfies the watch.
    pub fn matches(&self, title: &str, class: Option<&str>) -> bool {
        if self.title != title {
            return false;
        }
        match &self.class {
            None => true,
            Some(expected) => class == Some(expected.as_str()),
        }
    }
}

/// Consumer callbacks attached to a watch.
#[derive(Clone)]
pub struct WatchCallbacks {
    pub on_create: CreateCallback,
    pub on_destroy: DestroyCallback,
    pub on_text_changed: Option<TextCallback>,
}

/// Registration request.
pub struct WatchSpec {
    pub key: WatchKey,
    pub callbacks: WatchCallbacks,
}

impl WatchSpec {
    /// Plain top-level window matched by title.
    pub fn window<C, D>(title: impl Into<String>, on_create: C, on_destroy: D) -> Self
    where
        C: Fn(WindowHandle) + Send + Sync + 'static,
        D: Fn() + Send + Sync + 'static,
    {
        Self::new(WatchKey::window(title), on_create, on_destroy)
    }

    /// Dialog matched by title and window class.
    pub fn dialog<C, D>(
        title: impl Into<String>,
        class: impl Into<String>,
        on_create: C,
        on_destroy: D,
    ) -> Self
    where
        C: Fn(WindowHandle) + Send + Sync + 'static,
        D: Fn() + Send + Sync + 'static,
    {
        Self::new(WatchKey::dialog(title, class), on_create, on_destroy)
    }

    fn new<C, D>(key: WatchKey, on_create: C, on_destroy: D) -> Self
    where
        C: Fn(WindowHandle) + Send + Sync + 'static,
        D: Fn() + Send + Sync + 'static,
    {
        Self {
            key,
            callbacks: WatchCallbacks {
                on_create: Arc::new(on_create),
                on_destroy: Arc::new(on_destroy),
                on_text_changed: None,
            },
        }
    }

    /// Report edits of the dialog's tracked text control.
    pub fn on_text_changed<T>(mut self, on_text_changed: T) -> Self
    where
        T: Fn(&str) + Send + Sync + 'static,
    {
        self.callbacks.on_text_changed = Some(Arc::new(on_text_changed));
        self
    }
}

/// A watched window and its mutable tracking state.
#[derive(Clone)]
pub struct WatchRecord {
    pub key: WatchKey,
    pub handle: Option<WindowHandle>,
    pub callbacks: WatchCallbacks,
    pub tracked_control: Option<WindowHandle>,
}

impl fmt::Debug for WatchRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WatchRecord")
            .field("key", &self.key)
            .field("handle", &self.handle)
            .field("tracked_control", &self.tracked_control)
            .finish_non_exhaustive()
    }
}

#[derive(Default)]
struct RegistryState {
    pending: Vec<WatchRecord>,
    active: Vec<WatchRecord>,
}

impl RegistryState {
    fn records(&self) -> impl Iterator<Item = &WatchRecord> {
        self.pending.iter().chain(self.active.iter())
    }
}

/// Pending/active sets behind one lock.
#[derive(Default)]
pub struct Registry {
    state: Mutex<RegistryState>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    // Callbacks never run under this lock, so a poisoned guard carries no broken invariant.
    fn lock(&self) -> MutexGuard<'_, RegistryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Add a watch. With a handle it starts in `active` (no create callback is owed),
    /// otherwise in `pending`.
    pub fn insert(&self, spec: WatchSpec, handle: Option<WindowHandle>) -> Result<()> {
        let mut st = self.lock();
        if st.records().any(|r| r.key == spec.key) {
            return Err(WatchError::DuplicateWatch {
                title: spec.key.title,
            });
        }
        let record = WatchRecord {
            key: spec.key,
            handle,
            callbacks: spec.callbacks,
            tracked_control: None,
        };
        if handle.is_some() {
            st.active.push(record);
        } else {
            st.pending.push(record);
        }
        Ok(())
    }

    /// Move the first pending record satisfying `matches` to `active` with `handle`.
    ///
    /// Only `pending` is scanned, so a window discovered by two paths transitions once.
    pub fn transition_to_active<F>(&self, handle: WindowHandle, mut matches: F) -> Option<WatchRecord>
    where
        F: FnMut(&WatchKey) -> bool,
    {
        let mut st = self.lock();
        let idx = st.pending.iter().position(|r| matches(&r.key))?;
        let mut record = st.pending.remove(idx);
        record.handle = Some(handle);
        st.active.push(record.clone());
        Some(record)
    }

    /// Move the active record owning `handle` back to `pending`, clearing its handle and
    /// tracked control.
    pub fn transition_to_pending(&self, handle: WindowHandle) -> Option<WatchRecord> {
        let mut st = self.lock();
        let idx = st.active.iter().position(|r| r.handle == Some(handle))?;
        let mut record = st.active.remove(idx);
        record.handle = None;
        record.tracked_control = None;
        st.pending.push(record.clone());
        Some(record)
    }

    /// Returns false when no active record owns `dialog`.
    pub fn attach_tracked_control(&self, dialog: WindowHandle, control: WindowHandle) -> bool {
        let mut st = self.lock();
        match st.active.iter_mut().find(|r| r.handle == Some(dialog)) {
            Some(record) => {
                record.tracked_control = Some(control);
                true
            }
            None => false,
        }
    }

    pub fn find_by_tracked_control(&self, control: WindowHandle) -> Option<WatchRecord> {
        self.lock()
            .active
            .iter()
            .find(|r| r.tracked_control == Some(control))
            .cloned()
    }

    #[cfg(test)]
    pub fn active_handle(&self, key: &WatchKey) -> Option<WindowHandle> {
        self.lock()
            .active
            .iter()
            .find(|r| &r.key == key)
            .and_then(|r| r.handle)
    }

    #[cfg(test)]
    pub fn tracked_control(&self, key: &WatchKey) -> Option<WindowHandle> {
        self.lock()
            .active
            .iter()
            .find(|r| &r.key == key)
            .and_then(|r| r.tracked_control)
    }

    pub fn is_active_handle(&self, handle: WindowHandle) -> bool {
        self.lock().active.iter().any(|r| r.handle == Some(handle))
    }

    pub fn pending_dialogs(&self) -> Vec<WatchKey> {
        self.lock()
            .pending
            .iter()
            .filter(|r| r.key.is_dialog())
            .map(|r| r.key.clone())
            .collect()
    }

    pub fn dialog_keys(&self) -> Vec<WatchKey> {
        self.lock()
            .records()
            .filter(|r| r.key.is_dialog())
            .map(|r| r.key.clone())
            .collect()
    }

    /// True when dialogs may appear: no primary window is watched, or one is present.
    pub fn primary_ready(&self) -> bool {
        let st = self.lock();
        let mut primaries = st.records().filter(|r| !r.key.is_dialog()).peekable();
        primaries.peek().is_none() || st.active.iter().any(|r| !r.key.is_dialog())
    }

    pub fn wants_text_changes(&self) -> bool {
        self.lock()
            .records()
            .any(|r| r.callbacks.on_text_changed.is_some())
    }

    pub fn wants_text_changes_for(&self, key: &WatchKey) -> bool {
        self.lock()
            .records()
            .any(|r| &r.key == key && r.callbacks.on_text_changed.is_some())
    }

    pub fn active_len(&self) -> usize {
        self.lock().active.len()
    }

    pub fn pending_len(&self) -> usize {
        self.lock().pending.len()
    }
}
