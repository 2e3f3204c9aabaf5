//! Event hook manager: owns the pump thread that subscribes to out-of-process window events.
//!
//! The subscription mechanism sits behind [`EventHookProvider`] so the manager can be driven by
//! the native WinEvent API (`win32`) or by a fake in tests. Native hooks deliver their
//! notifications on the thread that installed them and can only be released from that thread,
//! so subscribing, pumping and unsubscribing all happen on the pump thread; `stop()` only posts
//! the quit request and waits (bounded) for the thread to wind down.

use std::sync::mpsc::{Receiver, Sender, channel};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};
use tracing::{debug, error, info, warn};

use crate::directory::WindowHandle;
use crate::error::{Result, WatchError};
use crate::shutdown::{ExitNotice, JOIN_TIMEOUT, exit_channel, join_bounded};

pub const EVENT_OBJECT_CREATE: u32 = 0x8000;
pub const EVENT_OBJECT_DESTROY: u32 = 0x8001;
pub const EVENT_OBJECT_VALUECHANGE: u32 = 0x800E;

/// Object id carried by notifications about the window itself (not a child object).
pub const OBJID_WINDOW: i32 = 0;

/// Inclusive range of event ids bound to one hook.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct EventRange {
    pub min: u32,
    pub max: u32,
}

impl EventRange {
    pub const CREATE: Self = Self::single(EVENT_OBJECT_CREATE);
    pub const DESTROY: Self = Self::single(EVENT_OBJECT_DESTROY);
    pub const VALUE_CHANGE: Self = Self::single(EVENT_OBJECT_VALUECHANGE);

    pub const fn single(event: u32) -> Self {
        Self {
            min: event,
            max: event,
        }
    }

    #[cfg(test)]
    pub fn contains(&self, event: u32) -> bool {
        (self.min..=self.max).contains(&event)
    }
}

/// One notification as delivered by the OS.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct WinEvent {
    pub event: u32,
    pub hwnd: WindowHandle,
    pub object_id: i32,
}

/// Receiver of notifications; invoked on the pump thread.
pub type EventSink = Arc<dyn Fn(WinEvent) + Send + Sync>;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct HookId(pub isize);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PumpThreadId(pub u32);

/// Source of window event subscriptions.
///
/// Every method except `post_quit` is called on the pump thread.
pub trait EventHookProvider: Send + Sync + 'static {
    /// Make the calling thread able to receive a quit request and return its id.
    fn prepare_thread(&self) -> PumpThreadId;

    fn subscribe(&self, range: EventRange, sink: EventSink) -> Result<HookId>;

    fn unsubscribe(&self, hook: HookId) -> Result<()>;

    /// Block servicing notifications until a quit request arrives.
    fn run_pump(&self) -> Result<()>;

    /// Ask the pump running on `thread` to return. Callable from any thread.
    fn post_quit(&self, thread: PumpThreadId) -> Result<()>;
}

/// Releases every hook installed by the pump thread when it goes out of scope.
struct HookGuard {
    provider: Arc<dyn EventHookProvider>,
    hooks: Vec<HookId>,
}

impl Drop for HookGuard {
    fn drop(&mut self) {
        for hook in self.hooks.drain(..) {
            match self.provider.unsubscribe(hook) {
                Ok(()) => debug!(?hook, "hook removed"),
                Err(err) => warn!(?hook, %err, "failed to remove hook"),
            }
        }
    }
}

struct PumpWorker {
    thread: JoinHandle<()>,
    thread_id: PumpThreadId,
    exited: Receiver<()>,
}

/// Owner of the single pump thread.
pub struct HookManager {
    provider: Arc<dyn EventHookProvider>,
    pump: Mutex<Option<PumpWorker>>,
}

impl HookManager {
    pub fn new(provider: Arc<dyn EventHookProvider>) -> Self {
        Self {
            provider,
            pump: Mutex::new(None),
        }
    }

    #[cfg(test)]
    pub fn is_running(&self) -> bool {
        self.pump
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .is_some_and(|w| !w.thread.is_finished())
    }

    /// Spawn the pump thread and block until its subscriptions are in place.
    ///
    /// No-op while a pump is already running. A refused subscription aborts the start and
    /// releases any hooks the attempt had already installed.
    pub fn start(&self, ranges: &[EventRange], sink: EventSink) -> Result<()> {
        let mut slot = self.pump.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(worker) = slot.as_ref()
            && !worker.thread.is_finished()
        {
            debug!("pump already running");
            return Ok(());
        }
        if let Some(stale) = slot.take() {
            join_bounded("winevent-pump", stale.thread, &stale.exited, JOIN_TIMEOUT);
        }

        let (ready_tx, ready_rx) = channel();
        let (notice, exited) = exit_channel();
        let provider = self.provider.clone();
        let ranges = ranges.to_vec();
        let thread = thread::Builder::new()
            .name("winevent-pump".into())
            .spawn(move || pump_main(provider, ranges, sink, ready_tx, notice))
            .map_err(|e| WatchError::Pump(e.to_string()))?;

        match ready_rx.recv() {
            Ok(Ok(thread_id)) => {
                info!(thread_id = thread_id.0, "window event hooks installed");
                *slot = Some(PumpWorker {
                    thread,
                    thread_id,
                    exited,
                });
                Ok(())
            }
            Ok(Err(err)) => {
                join_bounded("winevent-pump", thread, &exited, JOIN_TIMEOUT);
                Err(err)
            }
            Err(_) => {
                join_bounded("winevent-pump", thread, &exited, JOIN_TIMEOUT);
                Err(WatchError::Pump(
                    "pump thread exited before reporting its hooks".into(),
                ))
            }
        }
    }

    /// Request unsubscription and pump exit, then wait up to [`JOIN_TIMEOUT`]. No-op when stopped.
    pub fn stop(&self) {
        let Some(worker) = self
            .pump
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        else {
            return;
        };
        if let Err(err) = self.provider.post_quit(worker.thread_id) {
            warn!(%err, "failed to post quit to pump thread");
        }
        join_bounded("winevent-pump", worker.thread, &worker.exited, JOIN_TIMEOUT);
    }
}

fn pump_main(
    provider: Arc<dyn EventHookProvider>,
    ranges: Vec<EventRange>,
    sink: EventSink,
    ready: Sender<Result<PumpThreadId>>,
    notice: ExitNotice,
) {
    // Dropped last: hooks are released before the owner learns the thread is done.
    let _notice = notice;
    let thread_id = provider.prepare_thread();
    let mut guard = HookGuard {
        provider: provider.clone(),
        hooks: Vec::with_capacity(ranges.len()),
    };
    for range in ranges {
        match provider.subscribe(range, sink.clone()) {
            Ok(hook) => {
                debug!(min = range.min, max = range.max, ?hook, "hook installed");
                guard.hooks.push(hook);
            }
            Err(err) => {
                error!(%err, "hook subscription failed");
                let _ = ready.send(Err(err));
                return;
            }
        }
    }
    if ready.send(Ok(thread_id)).is_err() {
        return;
    }
    if let Err(err) = provider.run_pump() {
        error!(%err, "message pump ended with an error");
    }
    debug!("pump thread exiting");
}
