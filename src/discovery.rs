//! Dialog discovery fallback.
//!
//! Creation events for dialogs can arrive before the dialog's class and title are queryable,
//! so a short-lived worker polls the directory for the dialog instead. Once found, the dialog
//! goes through the same registry transition the hook thread uses, its file-name edit field is
//! located and attached for text tracking, and the worker exits. Destruction is left to the
//! hook thread.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{Receiver, RecvTimeoutError, Sender, channel};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, error, info, warn};

use crate::directory::{WindowDirectory, WindowHandle};
use crate::dispatch::invoke_guarded;
use crate::registry::{Registry, WatchKey};
use crate::shutdown::{ExitNotice, JOIN_TIMEOUT, exit_channel, join_bounded};

pub const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Polls spent waiting for the edit field to exist under a found dialog.
pub const LOCATE_ATTEMPTS: usize = 20;

struct DiscoveryWorker {
    key: WatchKey,
    thread: JoinHandle<()>,
    cancel: Sender<()>,
    exited: Receiver<()>,
}

#[derive(Clone)]
struct PollContext {
    registry: Arc<Registry>,
    directory: Arc<dyn WindowDirectory>,
    running: Arc<AtomicBool>,
}

impl PollContext {
    fn running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }
}

pub struct DialogDiscovery {
    ctx: PollContext,
    workers: Mutex<Vec<DiscoveryWorker>>,
}

impl DialogDiscovery {
    pub fn new(
        registry: Arc<Registry>,
        directory: Arc<dyn WindowDirectory>,
        running: Arc<AtomicBool>,
    ) -> Self {
        Self {
            ctx: PollContext {
                registry,
                directory,
                running,
            },
            workers: Mutex::new(Vec::new()),
        }
    }

    /// Start polling for `key` unless a worker for it is still alive.
    ///
    /// `retired` is the handle of a just-destroyed instance that may linger in the window
    /// list for a moment; it is never reported as a new appearance. A worker still busy with
    /// that instance is replaced.
    pub fn launch(&self, key: WatchKey, retired: Option<WindowHandle>) {
        if !self.ctx.running() {
            return;
        }
        let mut workers = self.workers.lock().unwrap_or_else(PoisonError::into_inner);
        let (finished, live): (Vec<_>, Vec<_>) = workers
            .drain(..)
            .partition(|w| w.thread.is_finished());
        *workers = live;
        for w in finished {
            join_bounded("dialog-discovery", w.thread, &w.exited, JOIN_TIMEOUT);
        }
        if let Some(idx) = workers.iter().position(|w| w.key == key) {
            if retired.is_none() {
                debug!(title = %key.title, "dialog discovery already running");
                return;
            }
            // Still busy with the destroyed instance; replace it.
            let stale = workers.swap_remove(idx);
            let _ = stale.cancel.send(());
            join_bounded("dialog-discovery", stale.thread, &stale.exited, JOIN_TIMEOUT);
        }

        let (cancel, cancelled) = channel();
        let (notice, exited) = exit_channel();
        let ctx = self.ctx.clone();
        let worker_key = key.clone();
        let spawned = thread::Builder::new()
            .name("dialog-discovery".into())
            .spawn(move || poll_for_dialog(ctx, worker_key, retired, cancelled, notice));
        match spawned {
            Ok(thread) => workers.push(DiscoveryWorker {
                key,
                thread,
                cancel,
                exited,
            }),
            Err(err) => error!(title = %key.title, %err, "failed to spawn dialog discovery"),
        }
    }

    #[cfg(test)]
    pub fn live_workers(&self) -> usize {
        self.workers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|w| !w.thread.is_finished())
            .count()
    }

    /// Cancel every worker and wait (bounded) for each to exit.
    pub fn stop_all(&self) {
        let workers: Vec<_> = self
            .workers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .drain(..)
            .collect();
        for w in workers {
            let _ = w.cancel.send(());
            join_bounded("dialog-discovery", w.thread, &w.exited, JOIN_TIMEOUT);
        }
    }
}

/// Sleep one poll interval; false when cancelled.
fn wait_interval(cancelled: &Receiver<()>) -> bool {
    matches!(
        cancelled.recv_timeout(POLL_INTERVAL),
        Err(RecvTimeoutError::Timeout)
    )
}

fn poll_for_dialog(
    ctx: PollContext,
    key: WatchKey,
    retired: Option<WindowHandle>,
    cancelled: Receiver<()>,
    notice: ExitNotice,
) {
    let _notice = notice;
    let class = key.class.as_deref();
    debug!(title = %key.title, ?class, "dialog discovery started");

    let dialog = loop {
        if !ctx.running() {
            return;
        }
        match ctx.directory.find_window(class, &key.title) {
            Some(h) if Some(h) != retired => break h,
            _ => {}
        }
        if !wait_interval(&cancelled) {
            debug!(title = %key.title, "dialog discovery cancelled");
            return;
        }
    };

    if let Some(record) = ctx.registry.transition_to_active(dialog, |k| *k == key) {
        if !ctx.running() {
            ctx.registry.transition_to_pending(dialog);
            debug!(title = %key.title, hwnd = %dialog, "watcher stopped; discovery rolled back");
            return;
        }
        info!(title = %key.title, hwnd = %dialog, "dialog discovered");
        let on_create = record.callbacks.on_create.clone();
        invoke_guarded("on_create", &key.title, || on_create(dialog));
    }

    if ctx.registry.wants_text_changes_for(&key) {
        track_dialog_control(&ctx, &key, dialog, &cancelled);
    }
    debug!(title = %key.title, "dialog discovery finished");
}

fn track_dialog_control(
    ctx: &PollContext,
    key: &WatchKey,
    dialog: WindowHandle,
    cancelled: &Receiver<()>,
) {
    for _ in 0..LOCATE_ATTEMPTS {
        if !ctx.running() || !ctx.registry.is_active_handle(dialog) {
            return;
        }
        if let Some(control) = ctx.directory.locate_tracked_control(dialog) {
            if ctx.registry.attach_tracked_control(dialog, control) {
                debug!(title = %key.title, %control, "tracking dialog text control");
            }
            return;
        }
        if !wait_interval(cancelled) {
            return;
        }
    }
    warn!(title = %key.title, hwnd = %dialog, "dialog text control not found; edits will not be reported");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::directory::DIALOG_CLASS;
    use crate::test_support::{Call, FakeDesktop, Recorder, StopOn, StoppingDesktop, wait_until};

    fn setup() -> (Arc<FakeDesktop>, Arc<Registry>, Arc<AtomicBool>, DialogDiscovery, Recorder) {
        let desktop = Arc::new(FakeDesktop::new());
        let registry = Arc::new(Registry::new());
        let running = Arc::new(AtomicBool::new(true));
        let discovery = DialogDiscovery::new(registry.clone(), desktop.clone(), running.clone());
        (desktop, registry, running, discovery, Recorder::default())
    }

    #[test]
    fn finds_dialog_and_attaches_edit_field() {
        let (desktop, registry, _running, discovery, calls) = setup();
        let key = WatchKey::dialog("Picker", DIALOG_CLASS);
        registry
            .insert(calls.dialog_spec("Picker", DIALOG_CLASS), None)
            .unwrap();
        discovery.launch(key.clone(), None);

        let dialog = desktop.open("Picker", DIALOG_CLASS);
        let edit = desktop.open_file_name_field(dialog);

        assert!(wait_until(|| registry.tracked_control(&key) == Some(edit)));
        assert_eq!(calls.take(), vec![Call::Created("Picker".into(), dialog)]);
        assert!(wait_until(|| discovery.live_workers() == 0));
        discovery.stop_all();
    }

    #[test]
    fn already_active_dialog_only_gets_its_control_attached() {
        let (desktop, registry, _running, discovery, calls) = setup();
        let key = WatchKey::dialog("Picker", DIALOG_CLASS);
        let dialog = desktop.open("Picker", DIALOG_CLASS);
        let edit = desktop.open_file_name_field(dialog);
        registry
            .insert(calls.dialog_spec("Picker", DIALOG_CLASS), Some(dialog))
            .unwrap();

        discovery.launch(key.clone(), None);
        assert!(wait_until(|| registry.tracked_control(&key) == Some(edit)));
        assert!(calls.take().is_empty());
        discovery.stop_all();
    }

    #[test]
    fn retired_handle_is_not_rediscovered() {
        let (desktop, registry, _running, discovery, calls) = setup();
        let key = WatchKey::dialog("Picker", DIALOG_CLASS);
        registry
            .insert(calls.dialog_spec("Picker", DIALOG_CLASS), None)
            .unwrap();
        let lingering = desktop.open("Picker", DIALOG_CLASS);

        discovery.launch(key.clone(), Some(lingering));
        thread::sleep(POLL_INTERVAL * 3);
        assert!(calls.take().is_empty());

        desktop.close(lingering);
        let fresh = desktop.open("Picker", DIALOG_CLASS);
        assert!(wait_until(|| registry.active_handle(&key) == Some(fresh)));
        assert_eq!(calls.take(), vec![Call::Created("Picker".into(), fresh)]);
        discovery.stop_all();
    }

    #[test]
    fn one_worker_per_dialog() {
        let (_desktop, registry, _running, discovery, calls) = setup();
        let key = WatchKey::dialog("Picker", DIALOG_CLASS);
        registry
            .insert(calls.dialog_spec("Picker", DIALOG_CLASS), None)
            .unwrap();
        discovery.launch(key.clone(), None);
        discovery.launch(key, None);
        assert_eq!(discovery.live_workers(), 1);
        discovery.stop_all();
        assert_eq!(discovery.live_workers(), 0);
    }

    #[test]
    fn stop_before_dialog_appears_has_no_effect() {
        let (desktop, registry, running, discovery, calls) = setup();
        let key = WatchKey::dialog("Picker", DIALOG_CLASS);
        registry
            .insert(calls.dialog_spec("Picker", DIALOG_CLASS), None)
            .unwrap();
        discovery.launch(key.clone(), None);
        running.store(false, Ordering::Release);
        discovery.stop_all();

        desktop.open("Picker", DIALOG_CLASS);
        thread::sleep(POLL_INTERVAL * 2);
        assert!(calls.take().is_empty());
        assert_eq!(registry.active_handle(&key), None);
    }

    #[test]
    fn launch_is_ignored_while_stopped() {
        let (_desktop, _registry, running, discovery, _calls) = setup();
        running.store(false, Ordering::Release);
        discovery.launch(WatchKey::dialog("Picker", DIALOG_CLASS), None);
        assert_eq!(discovery.live_workers(), 0);
    }

    #[test]
    fn stop_while_dialog_is_found_leaves_it_pending() {
        let desktop = Arc::new(FakeDesktop::new());
        let registry = Arc::new(Registry::new());
        let running = Arc::new(AtomicBool::new(true));
        let directory = Arc::new(StoppingDesktop::new(
            desktop.clone(),
            running.clone(),
            StopOn::Find,
        ));
        let discovery = DialogDiscovery::new(registry.clone(), directory, running.clone());
        let calls = Recorder::default();
        let key = WatchKey::dialog("Picker", DIALOG_CLASS);
        registry
            .insert(calls.dialog_spec("Picker", DIALOG_CLASS), None)
            .unwrap();
        let dialog = desktop.open("Picker", DIALOG_CLASS);
        desktop.open_file_name_field(dialog);

        discovery.launch(key.clone(), None);
        assert!(wait_until(|| discovery.live_workers() == 0));
        discovery.stop_all();
        assert!(!running.load(Ordering::Acquire));
        assert!(calls.take().is_empty());
        assert_eq!(registry.active_handle(&key), None);
        assert_eq!(registry.pending_len(), 1);
    }
}
