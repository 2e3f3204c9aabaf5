//! Translation of window notifications into registry transitions and consumer callbacks.
//!
//! Runs on the pump thread. Every notification is an intent applied through the registry's
//! locked API; callbacks fire only after the lock is released and only while the watcher is
//! running.

use std::any::Any;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, error, info, trace};

use crate::directory::{WindowDirectory, WindowHandle};
use crate::discovery::DialogDiscovery;
use crate::hooks::{
    EVENT_OBJECT_CREATE, EVENT_OBJECT_DESTROY, EVENT_OBJECT_VALUECHANGE, OBJID_WINDOW, WinEvent,
};
use crate::registry::Registry;

/// Run a consumer callback, containing any panic at this boundary.
pub(crate) fn invoke_guarded(callback: &'static str, title: &str, f: impl FnOnce()) {
    if let Err(panic) = catch_unwind(AssertUnwindSafe(f)) {
        error!(
            callback,
            title,
            panic = panic_message(panic.as_ref()),
            "watch callback panicked"
        );
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> &str {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.as_str()
    } else {
        "non-string panic payload"
    }
}

pub struct Dispatcher {
    registry: Arc<Registry>,
    directory: Arc<dyn WindowDirectory>,
    discovery: Arc<DialogDiscovery>,
    running: Arc<AtomicBool>,
}

impl Dispatcher {
    pub fn new(
        registry: Arc<Registry>,
        directory: Arc<dyn WindowDirectory>,
        discovery: Arc<DialogDiscovery>,
        running: Arc<AtomicBool>,
    ) -> Self {
        Self {
            registry,
            directory,
            discovery,
            running,
        }
    }

    fn running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    pub fn dispatch(&self, ev: WinEvent) {
        if !self.running() {
            trace!(event = ev.event, hwnd = %ev.hwnd, "watcher stopped; notification dropped");
            return;
        }
        if ev.hwnd.is_null() {
            return;
        }
        match ev.event {
            EVENT_OBJECT_CREATE if ev.object_id == OBJID_WINDOW => self.window_created(ev.hwnd),
            EVENT_OBJECT_DESTROY if ev.object_id == OBJID_WINDOW => {
                self.window_destroyed(ev.hwnd)
            }
            EVENT_OBJECT_VALUECHANGE => self.value_changed(ev.hwnd),
            _ => {}
        }
    }

    fn window_created(&self, hwnd: WindowHandle) {
        if !self.directory.is_top_level(hwnd) {
            trace!(%hwnd, "creation of child window skipped");
            return;
        }
        let title = match self.directory.window_title(hwnd) {
            Ok(t) if !t.is_empty() => t,
            Ok(_) => return,
            Err(err) => {
                trace!(%err, "creation skipped");
                return;
            }
        };
        let class = match self.directory.window_class(hwnd) {
            Ok(c) => Some(c),
            Err(err) => {
                trace!(%err, "class unavailable; matching plain windows only");
                None
            }
        };
        let Some(record) = self
            .registry
            .transition_to_active(hwnd, |key| key.matches(&title, class.as_deref()))
        else {
            return;
        };
        if !self.running() {
            // Stopped mid-transition; the window must not stay active without `on_create`.
            self.registry.transition_to_pending(hwnd);
            debug!(title = %record.key.title, %hwnd, "watcher stopped; creation rolled back");
            return;
        }
        info!(title = %record.key.title, %hwnd, "watched window created");
        let on_create = record.callbacks.on_create.clone();
        invoke_guarded("on_create", &record.key.title, || on_create(hwnd));

        if !record.key.is_dialog() {
            for key in self.registry.pending_dialogs() {
                self.discovery.launch(key, None);
            }
        } else if record.callbacks.on_text_changed.is_some() {
            // Seen via the event channel; the fallback still has to find its edit field.
            self.discovery.launch(record.key, None);
        }
    }

    fn window_destroyed(&self, hwnd: WindowHandle) {
        // Clears the tracked control under the lock, so late edits of it are dropped.
        let Some(record) = self.registry.transition_to_pending(hwnd) else {
            return;
        };
        info!(title = %record.key.title, %hwnd, "watched window destroyed");
        if !self.running() {
            return;
        }
        let on_destroy = record.callbacks.on_destroy.clone();
        invoke_guarded("on_destroy", &record.key.title, || on_destroy());

        if record.key.is_dialog() && self.registry.primary_ready() {
            debug!(title = %record.key.title, "watching for the dialog to reappear");
            self.discovery.launch(record.key, Some(hwnd));
        }
    }

    /// Control text tracker: an edit of a tracked control becomes a text-changed callback
    /// carrying the control's full current text.
    fn value_changed(&self, control: WindowHandle) {
        let Some(record) = self.registry.find_by_tracked_control(control) else {
            return;
        };
        let Some(on_text_changed) = record.callbacks.on_text_changed.clone() else {
            return;
        };
        let text = match self.directory.control_text(control) {
            Ok(t) => t,
            Err(err) => {
                debug!(%err, "tracked control text unavailable");
                return;
            }
        };
        trace!(title = %record.key.title, text = %text, "tracked control edited");
        if self.running() {
            invoke_guarded("on_text_changed", &record.key.title, || on_text_changed(&text));
        }
    }
}
