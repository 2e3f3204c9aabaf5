//! Native window directory and WinEvent subscription provider.
//!
//! Hooks are installed out-of-context (`SetWinEventHook` with no module), so the OS delivers
//! notifications to the installing thread while it pumps messages. The raw callback has no
//! user-data slot; each pump thread keeps its sinks in a thread-local table keyed by hook
//! handle.

use std::cell::RefCell;
use widestring::U16CString;
use windows::Win32::Foundation::{HWND, LPARAM, WPARAM};
use windows::Win32::System::Threading::GetCurrentThreadId;
use windows::Win32::UI::Accessibility::{HWINEVENTHOOK, SetWinEventHook, UnhookWinEvent};
use windows::Win32::UI::WindowsAndMessaging::{
    DispatchMessageW, FindWindowExW, FindWindowW, GA_ROOT, GetAncestor, GetClassNameW,
    GetMessageW, GetWindowTextW, IsWindow, MSG, PM_NOREMOVE, PeekMessageW, PostThreadMessageW, SendMessageW, TranslateMessage,
    WM_GETTEXT, WM_GETTEXTLENGTH, WM_QUIT,
};
use windows::core::PCWSTR;

use crate::directory::{WindowDirectory, WindowHandle};
use crate::error::{Result, WatchError};
use crate::hooks::{EventHookProvider, EventRange, EventSink, HookId, PumpThreadId, WinEvent};

fn to_hwnd(h: WindowHandle) -> HWND {
    HWND(h.0 as *mut _)
}

fn from_hwnd(hwnd: HWND) -> WindowHandle {
    WindowHandle(hwnd.0 as isize)
}

/// Read a UTF-16 string via a fill closure returning the number of u16 written.
fn read_wstr<F: FnOnce(&mut [u16]) -> i32>(cap: usize, fill: F) -> String {
    let mut buf = vec![0u16; cap];
    let len = fill(&mut buf).max(0) as usize;
    let slice = &buf[..buf.iter().position(|&c| c == 0).unwrap_or(len.min(cap))];
    String::from_utf16_lossy(slice)
}

fn wide(s: &str) -> Option<U16CString> {
    U16CString::from_str(s).ok()
}

fn pcwstr(s: Option<&U16CString>) -> PCWSTR {
    s.map_or(PCWSTR::null(), |w| PCWSTR(w.as_ptr()))
}

/// Live window tree of the current desktop.
pub struct Win32Directory;

impl Win32Directory {
    fn ensure_window(&self, hwnd: WindowHandle, what: &'static str) -> Result<HWND> {
        let h = to_hwnd(hwnd);
        if hwnd.is_null() || !unsafe { IsWindow(Some(h)) }.as_bool() {
            return Err(WatchError::WindowQuery { hwnd, what });
        }
        Ok(h)
    }
}

impl WindowDirectory for Win32Directory {
    fn find_window(&self, class: Option<&str>, title: &str) -> Option<WindowHandle> {
        let title = wide(title)?;
        let class = match class {
            Some(c) => Some(wide(c)?),
            None => None,
        };
        unsafe { FindWindowW(pcwstr(class.as_ref()), pcwstr(Some(&title))) }
            .ok()
            .filter(|h| !h.is_invalid())
            .map(from_hwnd)
    }

    fn find_child(&self, parent: WindowHandle, class: &str) -> Option<WindowHandle> {
        let class = wide(class)?;
        unsafe {
            FindWindowExW(
                Some(to_hwnd(parent)),
                None,
                pcwstr(Some(&class)),
                PCWSTR::null(),
            )
        }
        .ok()
        .filter(|h| !h.is_invalid())
        .map(from_hwnd)
    }

    fn is_top_level(&self, hwnd: WindowHandle) -> bool {
        let h = to_hwnd(hwnd);
        unsafe { GetAncestor(h, GA_ROOT) } == h
    }

    fn window_title(&self, hwnd: WindowHandle) -> Result<String> {
        let h = self.ensure_window(hwnd, "title")?;
        Ok(read_wstr(512, |b| unsafe { GetWindowTextW(h, b) }))
    }

    fn window_class(&self, hwnd: WindowHandle) -> Result<String> {
        let h = self.ensure_window(hwnd, "class")?;
        let class = read_wstr(256, |b| unsafe { GetClassNameW(h, b) });
        if class.is_empty() {
            return Err(WatchError::WindowQuery { hwnd, what: "class" });
        }
        Ok(class)
    }

    /// Text of a control in another process; `GetWindowTextW` cannot read those.
    fn control_text(&self, hwnd: WindowHandle) -> Result<String> {
        let h = self.ensure_window(hwnd, "text")?;
        let len = unsafe { SendMessageW(h, WM_GETTEXTLENGTH, None, None) }.0.max(0) as usize;
        let cap = len + 1;
        Ok(read_wstr(cap, |b| unsafe {
            SendMessageW(
                h,
                WM_GETTEXT,
                Some(WPARAM(b.len())),
                Some(LPARAM(b.as_mut_ptr() as isize)),
            )
            .0 as i32
        }))
    }
}

thread_local! {
    static SINKS: RefCell<Vec<(isize, EventSink)>> = const { RefCell::new(Vec::new()) };
}

/// FFI boundary: route the notification to the sink registered for `hook` on this thread.
unsafe extern "system" fn win_event_proc(
    hook: HWINEVENTHOOK,
    event: u32,
    hwnd: HWND,
    id_object: i32,
    _id_child: i32,
    _thread: u32,
    _time: u32,
) {
    let sink = SINKS.with(|s| {
        s.borrow()
            .iter()
            .find(|(id, _)| *id == hook.0 as isize)
            .map(|(_, sink)| sink.clone())
    });
    if let Some(sink) = sink {
        sink(WinEvent {
            event,
            hwnd: from_hwnd(hwnd),
            object_id: id_object,
        });
    }
}

/// Out-of-context WinEvent hooks serviced by a `GetMessageW` loop.
pub struct Win32Hooks;

impl EventHookProvider for Win32Hooks {
    fn prepare_thread(&self) -> PumpThreadId {
        // Force creation of the thread's message queue so an early quit post is not lost.
        let mut msg = MSG::default();
        unsafe {
            let _ = PeekMessageW(&mut msg, None, 0, 0, PM_NOREMOVE);
            PumpThreadId(GetCurrentThreadId())
        }
    }

    fn subscribe(&self, range: EventRange, sink: EventSink) -> Result<HookId> {
        let h = unsafe { SetWinEventHook(range.min, range.max, None, Some(win_event_proc), 0, 0, 0) };
        if h.0.is_null() {
            return Err(WatchError::HookSubscription {
                min: range.min,
                max: range.max,
            });
        }
        let id = h.0 as isize;
        SINKS.with(|s| s.borrow_mut().push((id, sink)));
        Ok(HookId(id))
    }

    fn unsubscribe(&self, hook: HookId) -> Result<()> {
        SINKS.with(|s| s.borrow_mut().retain(|(id, _)| *id != hook.0));
        let ok = unsafe { UnhookWinEvent(HWINEVENTHOOK(hook.0 as *mut _)) }.as_bool();
        if ok {
            Ok(())
        } else {
            Err(WatchError::Pump(format!("UnhookWinEvent failed for hook {:#x}", hook.0)))
        }
    }

    fn run_pump(&self) -> Result<()> {
        let mut msg = MSG::default();
        loop {
            let r = unsafe { GetMessageW(&mut msg, None, 0, 0) };
            match r.0 {
                -1 => return Err(WatchError::Pump("GetMessageW failed".into())),
                0 => return Ok(()),
                _ => unsafe {
                    let _ = TranslateMessage(&msg);
                    DispatchMessageW(&msg);
                },
            }
        }
    }

    fn post_quit(&self, thread: PumpThreadId) -> Result<()> {
        unsafe { PostThreadMessageW(thread.0, WM_QUIT, WPARAM(0), LPARAM(0)) }
            .map_err(|e| WatchError::Pump(format!("PostThreadMessageW failed: {e}")))
    }
}
