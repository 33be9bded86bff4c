//! Per-request wall-clock deadline, enforced by a single dedicated timer
//! thread that cancels in-flight origin work by closing its socket.
//!
//! A blocking design has no single reactor thread to park a timer on, so
//! one thread hosts the timer, but it is not a whole extra executor and it
//! is joined the instant the pipeline's origin work finishes. The timer
//! thread parks on `Receiver::recv_timeout` rather than `thread::sleep` so
//! `cancel()` wakes it immediately instead of paying the full deadline on
//! every request that finishes early.

use std::net::TcpStream;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// A running (or already-fired) per-request deadline.
pub struct Deadline {
    expired: Arc<AtomicBool>,
    socket: Arc<Mutex<Option<TcpStream>>>,
    cancel_tx: Option<mpsc::Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl Deadline {
    /// Starts the timer. If it is not cancelled within `duration`, it marks
    /// itself expired and shuts down whatever socket has been registered via
    /// [`Deadline::register_origin`] (if any yet).
    pub fn start(duration: Duration) -> Self {
        let expired = Arc::new(AtomicBool::new(false));
        let socket: Arc<Mutex<Option<TcpStream>>> = Arc::new(Mutex::new(None));
        let (cancel_tx, cancel_rx) = mpsc::channel::<()>();

        let expired2 = expired.clone();
        let socket2 = socket.clone();
        let handle = thread::Builder::new()
            .name("waypoint-deadline".into())
            .spawn(move || {
                match cancel_rx.recv_timeout(duration) {
                    Ok(()) | Err(RecvTimeoutError::Disconnected) => return,
                    Err(RecvTimeoutError::Timeout) => {}
                }
                expired2.store(true, Ordering::SeqCst);
                if let Ok(guard) = socket2.lock() {
                    if let Some(stream) = guard.as_ref() {
                        let _ = stream.shutdown(std::net::Shutdown::Both);
                    }
                }
            })
            .expect("spawning the deadline timer thread");

        Deadline { expired, socket, cancel_tx: Some(cancel_tx), handle: Some(handle) }
    }

    /// Registers the socket that should be torn down if the deadline fires.
    /// If the deadline has already fired, shuts it down immediately instead.
    pub fn register_origin(&self, stream: TcpStream) {
        if self.expired.load(Ordering::SeqCst) {
            let _ = stream.shutdown(std::net::Shutdown::Both);
            return;
        }
        if let Ok(mut guard) = self.socket.lock() {
            *guard = Some(stream);
        }
    }

    /// True once the deadline has fired.
    pub fn has_expired(&self) -> bool {
        self.expired.load(Ordering::SeqCst)
    }

    /// Cancels the timer and joins its thread. Waking the timer is
    /// immediate: sending on `cancel_tx` returns `recv_timeout` on the spot
    /// instead of waiting out the rest of `duration`. Safe to call whether
    /// or not the deadline already fired.
    pub fn cancel(mut self) {
        if let Some(tx) = self.cancel_tx.take() {
            let _ = tx.send(());
        }
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::TcpListener;
    use std::time::Instant;

    #[test]
    fn cancel_before_expiry_leaves_socket_untouched() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let client = TcpStream::connect(addr).unwrap();
        let deadline = Deadline::start(Duration::from_secs(30));
        deadline.register_origin(client.try_clone().unwrap());
        deadline.cancel();
        assert!(!client.take_error().unwrap().is_some());
    }

    #[test]
    fn cancel_returns_promptly_instead_of_waiting_out_the_full_duration() {
        let deadline = Deadline::start(Duration::from_secs(30));
        let start = Instant::now();
        deadline.cancel();
        assert!(start.elapsed() < Duration::from_secs(1));
    }

    #[test]
    fn expired_deadline_shuts_down_a_registered_socket() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let client = TcpStream::connect(addr).unwrap();
        let deadline = Deadline::start(Duration::from_millis(50));
        deadline.register_origin(client.try_clone().unwrap());
        thread::sleep(Duration::from_millis(200));
        assert!(deadline.has_expired());
        deadline.cancel();
    }
}
