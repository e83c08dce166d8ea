//! State shared between a connection and its reader task.
//!
//! All mutable fields live behind one per-connection lock; nothing here is
//! visible outside the owning connection and its reader.

use std::collections::HashMap;
use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use std::time::Instant;

use crate::connection::{CloseReason, Violation};
use crate::error::ConnectionError;

#[derive(Debug)]
struct Inner {
    /// Updated on every successful send and receive.
    last_activity: Instant,
    /// Occurrence count per violation category, for the lifetime of the
    /// connection. Absent categories count as zero.
    illegal_requests: HashMap<Violation, usize>,
    /// First recorded termination cause; later classifications are ignored.
    close_reason: Option<CloseReason>,
}

/// Per-connection shared state.
#[derive(Debug)]
pub(crate) struct SharedState {
    stopped: AtomicBool,
    inner: Mutex<Inner>,
}

impl SharedState {
    pub(crate) fn new() -> Self {
        Self {
            stopped: AtomicBool::new(false),
            inner: Mutex::new(Inner {
                last_activity: Instant::now(),
                illegal_requests: HashMap::new(),
                close_reason: None,
            }),
        }
    }

    /// Record activity on the connection.
    pub(crate) fn touch(&self) {
        self.inner.lock().expect("shared state lock").last_activity = Instant::now();
    }

    /// Time of the last successful send or receive.
    pub(crate) fn last_activity(&self) -> Instant {
        self.inner.lock().expect("shared state lock").last_activity
    }

    pub(crate) fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }

    /// Monotonic: once stopped, a connection never restarts.
    pub(crate) fn set_stopped(&self) {
        self.stopped.store(true, Ordering::SeqCst);
    }

    /// Count a violation against its category.
    ///
    /// Returns `true` exactly when the updated count first exceeds the
    /// tolerance, i.e. on the `tolerance + 1`-th report.
    pub(crate) fn report_violation(&self, violation: Violation, tolerance: usize) -> bool {
        let mut inner = self.inner.lock().expect("shared state lock");
        let count = inner.illegal_requests.entry(violation).or_default();
        *count += 1;
        tracing::warn!(
            category = %violation,
            count = *count,
            tolerance,
            "Illegal request reported"
        );
        *count == tolerance + 1
    }

    /// Record a termination cause. The first recorded reason sticks;
    /// concurrent failures cannot overwrite it.
    pub(crate) fn record_reason(&self, reason: CloseReason) -> CloseReason {
        let mut inner = self.inner.lock().expect("shared state lock");
        *inner.close_reason.get_or_insert(reason)
    }

    pub(crate) fn close_reason(&self) -> Option<CloseReason> {
        self.inner.lock().expect("shared state lock").close_reason
    }

    /// Translate a low-level failure into a close reason and record it.
    ///
    /// `locally_closed` distinguishes a reset from a failure caused by our
    /// own side having already closed the socket.
    pub(crate) fn classify_failure(
        &self,
        err: &ConnectionError,
        locally_closed: bool,
    ) -> CloseReason {
        let reason = match err {
            ConnectionError::Io(e) => match e.kind() {
                io::ErrorKind::UnexpectedEof => CloseReason::PeerDisconnected,
                io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock => CloseReason::Timeout,
                io::ErrorKind::ConnectionReset
                | io::ErrorKind::ConnectionAborted
                | io::ErrorKind::BrokenPipe
                | io::ErrorKind::NotConnected => {
                    if locally_closed {
                        CloseReason::SocketClosed
                    } else {
                        CloseReason::Reset
                    }
                }
                _ => {
                    tracing::info!(error = %e, "Unanticipated I/O failure on connection");
                    CloseReason::Unknown
                }
            },
            ConnectionError::ReadTimeout | ConnectionError::SendTimeout => CloseReason::Timeout,
            _ => {
                tracing::info!(error = %err, "Unanticipated failure on connection");
                CloseReason::Unknown
            }
        };

        self.record_reason(reason)
    }
}
