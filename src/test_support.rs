//! In-memory desktop and subscription provider for exercising the watcher without Win32.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicIsize, Ordering};
use std::sync::mpsc::{Receiver, Sender, channel};
use std::sync::{Arc, Mutex};
use std::thread::{self, ThreadId};
use std::time::{Duration, Instant};

use crate::directory::{TRACKED_CONTROL_PATH, WindowDirectory, WindowHandle};
use crate::error::{Result, WatchError};
use crate::hooks::{EventHookProvider, EventRange, EventSink, HookId, PumpThreadId, WinEvent};
use crate::registry::WatchSpec;

/// Poll `cond` until it holds or a few seconds pass.
pub fn wait_until(mut cond: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + Duration::from_secs(3);
    while Instant::now() < deadline {
        if cond() {
            return true;
        }
        thread::sleep(Duration::from_millis(10));
    }
    cond()
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Call {
    Created(String, WindowHandle),
    Destroyed(String),
    Text(String, String),
}

/// Shared log of consumer callback invocations.
#[derive(Clone, Default)]
pub struct Recorder(Arc<Mutex<Vec<Call>>>);

impl Recorder {
    pub fn push(&self, call: Call) {
        self.0.lock().unwrap().push(call);
    }

    pub fn take(&self) -> Vec<Call> {
        std::mem::take(&mut *self.0.lock().unwrap())
    }

    pub fn window_spec(&self, title: &str) -> WatchSpec {
        let (c, d) = (self.clone(), self.clone());
        let (t1, t2) = (title.to_string(), title.to_string());
        WatchSpec::window(
            title,
            move |h| c.push(Call::Created(t1.clone(), h)),
            move || d.push(Call::Destroyed(t2.clone())),
        )
    }

    pub fn dialog_spec(&self, title: &str, class: &str) -> WatchSpec {
        let (c, d, e) = (self.clone(), self.clone(), self.clone());
        let (t1, t2, t3) = (title.to_string(), title.to_string(), title.to_string());
        WatchSpec::dialog(
            title,
            class,
            move |h| c.push(Call::Created(t1.clone(), h)),
            move || d.push(Call::Destroyed(t2.clone())),
        )
        .on_text_changed(move |text| e.push(Call::Text(t3.clone(), text.to_string())))
    }
}

struct FakeWindow {
    title: String,
    class: String,
    parent: Option<WindowHandle>,
    text: String,
}

/// Window tree with deterministic (creation-ordered) lookups.
pub struct FakeDesktop {
    windows: Mutex<BTreeMap<WindowHandle, FakeWindow>>,
    next: AtomicIsize,
}

impl FakeDesktop {
    pub fn new() -> Self {
        Self {
            windows: Mutex::new(BTreeMap::new()),
            next: AtomicIsize::new(0x100),
        }
    }

    fn insert(&self, title: &str, class: &str, parent: Option<WindowHandle>) -> WindowHandle {
        let h = WindowHandle(self.next.fetch_add(4, Ordering::SeqCst));
        self.windows.lock().unwrap().insert(
            h,
            FakeWindow {
                title: title.to_string(),
                class: class.to_string(),
                parent,
                text: String::new(),
            },
        );
        h
    }

    pub fn open(&self, title: &str, class: &str) -> WindowHandle {
        self.insert(title, class, None)
    }

    pub fn open_child(&self, parent: WindowHandle, class: &str) -> WindowHandle {
        self.insert("", class, Some(parent))
    }

    /// Build the combo box chain of a file dialog and return its edit field.
    pub fn open_file_name_field(&self, dialog: WindowHandle) -> WindowHandle {
        TRACKED_CONTROL_PATH
            .iter()
            .fold(dialog, |parent, class| self.open_child(parent, class))
    }

    /// Remove a window and all of its descendants.
    pub fn close(&self, hwnd: WindowHandle) {
        let mut windows = self.windows.lock().unwrap();
        let mut doomed = vec![hwnd];
        while let Some(h) = doomed.pop() {
            windows.remove(&h);
            doomed.extend(
                windows
                    .iter()
                    .filter(|(_, w)| w.parent == Some(h))
                    .map(|(child, _)| *child),
            );
        }
    }

    pub fn set_title(&self, hwnd: WindowHandle, title: &str) {
        if let Some(w) = self.windows.lock().unwrap().get_mut(&hwnd) {
            w.title = title.to_string();
        }
    }

    pub fn set_text(&self, hwnd: WindowHandle, text: &str) {
        if let Some(w) = self.windows.lock().unwrap().get_mut(&hwnd) {
            w.text = text.to_string();
        }
    }

    fn read<T>(&self, hwnd: WindowHandle, what: &'static str, f: impl FnOnce(&FakeWindow) -> T) -> Result<T> {
        self.windows
            .lock()
            .unwrap()
            .get(&hwnd)
            .map(f)
            .ok_or(WatchError::WindowQuery { hwnd, what })
    }
}

impl WindowDirectory for FakeDesktop {
    fn find_window(&self, class: Option<&str>, title: &str) -> Option<WindowHandle> {
        self.windows
            .lock()
            .unwrap()
            .iter()
            .find(|(_, w)| {
                w.parent.is_none() && w.title == title && class.is_none_or(|c| w.class == c)
            })
            .map(|(h, _)| *h)
    }

    fn find_child(&self, parent: WindowHandle, class: &str) -> Option<WindowHandle> {
        self.windows
            .lock()
            .unwrap()
            .iter()
            .find(|(_, w)| w.parent == Some(parent) && w.class == class)
            .map(|(h, _)| *h)
    }

    fn is_top_level(&self, hwnd: WindowHandle) -> bool {
        self.read(hwnd, "parent", |w| w.parent.is_none()).unwrap_or(false)
    }

    fn window_title(&self, hwnd: WindowHandle) -> Result<String> {
        self.read(hwnd, "title", |w| w.title.clone())
    }

    fn window_class(&self, hwnd: WindowHandle) -> Result<String> {
        self.read(hwnd, "class", |w| w.class.clone())
    }

    fn control_text(&self, hwnd: WindowHandle) -> Result<String> {
        self.read(hwnd, "text", |w| w.text.clone())
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
pub enum StopOn {
    /// The first `find_window` that finds something.
    Find,
    /// The first `window_class` read.
    ClassRead,
}

/// Directory over a [`FakeDesktop`] that clears the running flag once, in the middle of a
/// lookup, as a `stop()` on another thread would.
pub struct StoppingDesktop {
    desktop: Arc<FakeDesktop>,
    running: Arc<AtomicBool>,
    on: StopOn,
    armed: AtomicBool,
}

impl StoppingDesktop {
    pub fn new(desktop: Arc<FakeDesktop>, running: Arc<AtomicBool>, on: StopOn) -> Self {
        Self {
            desktop,
            running,
            on,
            armed: AtomicBool::new(true),
        }
    }

    fn trip(&self, at: StopOn) {
        if self.on == at && self.armed.swap(false, Ordering::SeqCst) {
            self.running.store(false, Ordering::Release);
        }
    }
}

impl WindowDirectory for StoppingDesktop {
    fn find_window(&self, class: Option<&str>, title: &str) -> Option<WindowHandle> {
        let found = self.desktop.find_window(class, title);
        if found.is_some() {
            self.trip(StopOn::Find);
        }
        found
    }

    fn find_child(&self, parent: WindowHandle, class: &str) -> Option<WindowHandle> {
        self.desktop.find_child(parent, class)
    }

    fn is_top_level(&self, hwnd: WindowHandle) -> bool {
        self.desktop.is_top_level(hwnd)
    }

    fn window_title(&self, hwnd: WindowHandle) -> Result<String> {
        self.desktop.window_title(hwnd)
    }

    fn window_class(&self, hwnd: WindowHandle) -> Result<String> {
        let class = self.desktop.window_class(hwnd);
        self.trip(StopOn::ClassRead);
        class
    }

    fn control_text(&self, hwnd: WindowHandle) -> Result<String> {
        self.desktop.control_text(hwnd)
    }
}

enum PumpCommand {
    Deliver(WinEvent, Sender<()>),
    Quit,
}

#[derive(Default)]
struct FakeHookState {
    next_id: isize,
    subscribed: Vec<(HookId, EventRange, EventSink)>,
    refused: Vec<EventRange>,
    subscribe_calls: usize,
    unsubscribed: usize,
    last_sink: Option<EventSink>,
    subscriber: Option<ThreadId>,
    pump_tx: Option<Sender<PumpCommand>>,
    pump_rx: Option<Receiver<PumpCommand>>,
}

/// Subscription provider whose pump delivers simulated notifications on the pump thread.
#[derive(Default)]
pub struct FakeHooks {
    state: Mutex<FakeHookState>,
}

impl FakeHooks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make subscriptions for `range` fail.
    pub fn refuse(&self, range: EventRange) {
        self.state.lock().unwrap().refused.push(range);
    }

    pub fn subscribed(&self) -> Vec<EventRange> {
        self.state
            .lock()
            .unwrap()
            .subscribed
            .iter()
            .map(|(_, r, _)| *r)
            .collect()
    }

    pub fn subscribe_calls(&self) -> usize {
        self.state.lock().unwrap().subscribe_calls
    }

    pub fn unsubscribed_count(&self) -> usize {
        self.state.lock().unwrap().unsubscribed
    }

    pub fn subscribing_thread(&self) -> Option<ThreadId> {
        self.state.lock().unwrap().subscriber
    }

    /// Deliver a notification through the running pump and wait until it is handled.
    pub fn deliver(&self, event: u32, hwnd: WindowHandle, object_id: i32) {
        let tx = self
            .state
            .lock()
            .unwrap()
            .pump_tx
            .clone()
            .expect("pump not started");
        let (ack_tx, ack_rx) = channel();
        tx.send(PumpCommand::Deliver(
            WinEvent {
                event,
                hwnd,
                object_id,
            },
            ack_tx,
        ))
        .expect("pump gone");
        ack_rx
            .recv_timeout(Duration::from_secs(3))
            .expect("pump did not handle the notification");
    }

    /// Invoke the last installed sink directly, as a late notification racing `stop()` would.
    pub fn deliver_after_stop(&self, event: u32, hwnd: WindowHandle, object_id: i32) {
        let sink = self
            .state
            .lock()
            .unwrap()
            .last_sink
            .clone()
            .expect("no sink was ever installed");
        sink(WinEvent {
            event,
            hwnd,
            object_id,
        });
    }
}

impl EventHookProvider for FakeHooks {
    fn prepare_thread(&self) -> PumpThreadId {
        let (tx, rx) = channel();
        let mut st = self.state.lock().unwrap();
        st.pump_tx = Some(tx);
        st.pump_rx = Some(rx);
        st.next_id += 1;
        PumpThreadId(st.next_id as u32)
    }

    fn subscribe(&self, range: EventRange, sink: EventSink) -> Result<HookId> {
        let mut st = self.state.lock().unwrap();
        st.subscribe_calls += 1;
        st.subscriber = Some(thread::current().id());
        if st.refused.contains(&range) {
            return Err(WatchError::HookSubscription {
                min: range.min,
                max: range.max,
            });
        }
        st.next_id += 1;
        let id = HookId(st.next_id);
        st.subscribed.push((id, range, sink.clone()));
        st.last_sink = Some(sink);
        Ok(id)
    }

    fn unsubscribe(&self, hook: HookId) -> Result<()> {
        let mut st = self.state.lock().unwrap();
        st.subscribed.retain(|(id, _, _)| *id != hook);
        st.unsubscribed += 1;
        Ok(())
    }

    fn run_pump(&self) -> Result<()> {
        let rx = self
            .state
            .lock()
            .unwrap()
            .pump_rx
            .take()
            .ok_or_else(|| WatchError::Pump("thread not prepared".into()))?;
        while let Ok(cmd) = rx.recv() {
            match cmd {
                PumpCommand::Deliver(ev, ack) => {
                    let sinks: Vec<EventSink> = self
                        .state
                        .lock()
                        .unwrap()
                        .subscribed
                        .iter()
                        .filter(|(_, r, _)| r.contains(ev.event))
                        .map(|(_, _, s)| s.clone())
                        .collect();
                    for sink in sinks {
                        sink(ev);
                    }
                    let _ = ack.send(());
                }
                PumpCommand::Quit => break,
            }
        }
        Ok(())
    }

    fn post_quit(&self, _thread: PumpThreadId) -> Result<()> {
        let tx = self
            .state
            .lock()
            .unwrap()
            .pump_tx
            .clone()
            .ok_or_else(|| WatchError::Pump("no pump to quit".into()))?;
        tx.send(PumpCommand::Quit)
            .map_err(|_| WatchError::Pump("pump already gone".into()))
    }
}
