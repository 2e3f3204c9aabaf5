//! Bounded shutdown for the watcher's background threads.

use std::sync::mpsc::{Receiver, RecvTimeoutError, Sender, channel};
use std::thread::JoinHandle;
use std::time::Duration;
use tracing::{debug, error, warn};

use crate::error::WatchError;

/// Upper bound `stop()` waits for each background thread.
pub const JOIN_TIMEOUT: Duration = Duration::from_secs(1);

/// Signals the owning side when dropped, whether the thread returned or unwound.
pub struct ExitNotice(Sender<()>);

impl Drop for ExitNotice {
    fn drop(&mut self) {
        let _ = self.0.send(());
    }
}

pub fn exit_channel() -> (ExitNotice, Receiver<()>) {
    let (tx, rx) = channel();
    (ExitNotice(tx), rx)
}

/// Wait up to `timeout` for the thread's exit notice, then join it. A thread that misses the
/// deadline is detached and logged.
pub fn join_bounded(name: &'static str, thread: JoinHandle<()>, exited: &Receiver<()>, timeout: Duration) {
    match exited.recv_timeout(timeout) {
        Ok(()) | Err(RecvTimeoutError::Disconnected) => {
            if thread.join().is_err() {
                error!(thread = name, "background thread panicked");
            } else {
                debug!(thread = name, "background thread joined");
            }
        }
        Err(RecvTimeoutError::Timeout) => {
            let err = WatchError::ThreadShutdownTimeout {
                thread: name,
                timeout,
            };
            warn!(%err, "detaching background thread");
        }
    }
}
