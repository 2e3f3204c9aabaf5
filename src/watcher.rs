//! Window lifecycle watcher: registration and start/stop of the background machinery.
//!
//! Register every watch while stopped, then `start()`. Consumer callbacks run on the
//! watcher's background threads, asynchronously to the caller; for any one watched window
//! `on_create` and `on_destroy` strictly alternate.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, info};

use crate::directory::{WindowDirectory, WindowHandle};
use crate::discovery::DialogDiscovery;
use crate::dispatch::Dispatcher;
use crate::error::{Result, WatchError};
use crate::hooks::{EventHookProvider, EventRange, EventSink, HookManager};
use crate::registry::{Registry, WatchSpec};

pub struct WindowWatcher {
    registry: Arc<Registry>,
    directory: Arc<dyn WindowDirectory>,
    hooks: HookManager,
    discovery: Arc<DialogDiscovery>,
    running: Arc<AtomicBool>,
}

impl WindowWatcher {
    pub fn new(directory: Arc<dyn WindowDirectory>, provider: Arc<dyn EventHookProvider>) -> Self {
        let registry = Arc::new(Registry::new());
        let running = Arc::new(AtomicBool::new(false));
        let discovery = Arc::new(DialogDiscovery::new(
            registry.clone(),
            directory.clone(),
            running.clone(),
        ));
        Self {
            registry,
            directory,
            hooks: HookManager::new(provider),
            discovery,
            running,
        }
    }

    /// Watcher backed by the native WinEvent API.
    #[cfg(windows)]
    pub fn native() -> Result<Self> {
        use crate::win32::{Win32Directory, Win32Hooks};
        Ok(Self::new(Arc::new(Win32Directory), Arc::new(Win32Hooks)))
    }

    #[cfg(not(windows))]
    pub fn native() -> Result<Self> {
        Err(WatchError::Unsupported)
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    #[cfg(test)]
    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    /// Register a watch and return the handle of an already-present matching window.
    ///
    /// A window that is already present starts out active and gets no `on_create`.
    pub fn register(&self, spec: WatchSpec) -> Result<Option<WindowHandle>> {
        if self.is_running() {
            return Err(WatchError::InvalidState(
                "watches cannot be registered while the watcher is running",
            ));
        }
        let handle = self
            .directory
            .find_window(spec.key.class.as_deref(), &spec.key.title);
        debug!(title = %spec.key.title, ?handle, "registering watch");
        self.registry.insert(spec, handle)?;
        Ok(handle)
    }

    /// Install the event hooks and, when the primary window is present, start dialog discovery.
    /// No-op while running.
    pub fn start(&self) -> Result<()> {
        if self.running.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        let dispatcher = Dispatcher::new(
            self.registry.clone(),
            self.directory.clone(),
            self.discovery.clone(),
            self.running.clone(),
        );
        let sink: EventSink = Arc::new(move |ev| dispatcher.dispatch(ev));

        let mut ranges = vec![EventRange::CREATE, EventRange::DESTROY];
        if self.registry.wants_text_changes() {
            ranges.push(EventRange::VALUE_CHANGE);
        }
        if let Err(err) = self.hooks.start(&ranges, sink) {
            self.running.store(false, Ordering::Release);
            return Err(err);
        }

        if self.registry.primary_ready() {
            for key in self.registry.dialog_keys() {
                self.discovery.launch(key, None);
            }
        }
        info!(
            active = self.registry.active_len(),
            pending = self.registry.pending_len(),
            "window watcher started"
        );
        Ok(())
    }

    /// Remove the hooks and end both background threads. No callback fires once this returns.
    /// No-op while stopped.
    pub fn stop(&self) {
        if !self.running.swap(false, Ordering::AcqRel) {
            return;
        }
        self.hooks.stop();
        self.discovery.stop_all();
        info!("window watcher stopped");
    }
}

impl Drop for WindowWatcher {
    fn drop(&mut self) {
        self.stop();
    }
}
