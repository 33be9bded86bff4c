//! Full-duplex byte relay for `CONNECT` tunnels. The proxy never parses
//! tunnel contents; each direction is copied verbatim until its source side
//! ends, with an overall timeout bounding the whole tunnel's lifetime.
//!
//! The two relay directions run on a small pool distinct from the main
//! connection worker pool, so a handful of long-lived tunnels can never
//! starve keep-alive request handling.

use std::io::{Read, Write};
use std::net::TcpStream;
use std::thread;
use std::time::Duration;

use crossbeam_channel::bounded;

use crate::pool::WorkerPool;

const RELAY_BUFFER: usize = 4096;

/// The tunnel's hard overall lifetime, independent of how quiet either side
/// is: past this, both directions are torn down even if bytes are still
/// flowing.
pub const OVERALL_TIMEOUT: Duration = Duration::from_secs(5 * 60);

fn relay_direction(mut from: TcpStream, mut to: TcpStream) {
    let mut buf = [0u8; RELAY_BUFFER];
    loop {
        let n = match from.read(&mut buf) {
            Ok(0) | Err(_) => break,
            Ok(n) => n,
        };
        if to.write_all(&buf[..n]).is_err() {
            break;
        }
        if to.flush().is_err() {
            break;
        }
    }
    let _ = to.shutdown(std::net::Shutdown::Write);
    let _ = from.shutdown(std::net::Shutdown::Read);
}

/// Relays bytes between `client` and `origin` in both directions, using
/// `tunnel_pool` to run each direction, until each direction ends on its
/// own or [`OVERALL_TIMEOUT`] elapses, at which point both sockets are
/// forcibly shut down. Any bytes already buffered past the client's header
/// block (a pipelining client that raced ahead of the `200 Connection
/// Established` confirmation) are flushed to the origin first. Blocks the
/// calling thread until the tunnel ends.
pub fn relay(client: TcpStream, origin: TcpStream, leftover_client_bytes: Vec<u8>, tunnel_pool: &WorkerPool) {
    if !leftover_client_bytes.is_empty() {
        let mut origin_for_leftover = match origin.try_clone() {
            Ok(s) => s,
            Err(_) => return,
        };
        if origin_for_leftover.write_all(&leftover_client_bytes).is_err() {
            return;
        }
    }

    let client_to_origin = (client.try_clone(), origin.try_clone());
    let origin_to_client = (origin.try_clone(), client.try_clone());
    let (Ok(c1), Ok(o1)) = client_to_origin else { return };
    let (Ok(o2), Ok(c2)) = origin_to_client else { return };

    let (done_tx1, done_rx1) = bounded::<()>(1);
    let (done_tx2, done_rx2) = bounded::<()>(1);

    tunnel_pool.submit(move || {
        relay_direction(c1, o1);
        let _ = done_tx1.send(());
    });
    tunnel_pool.submit(move || {
        relay_direction(o2, c2);
        let _ = done_tx2.send(());
    });

    let deadline_client = client.try_clone().ok();
    let deadline_origin = origin.try_clone().ok();
    let cancel = std::sync::Arc::new(std::sync::atomic::AtomicBool::new(false));
    let cancel2 = cancel.clone();
    let watchdog = thread::Builder::new()
        .name("waypoint-tunnel-watchdog".into())
        .spawn(move || {
            thread::sleep(OVERALL_TIMEOUT);
            if cancel2.load(std::sync::atomic::Ordering::SeqCst) {
                return;
            }
            if let Some(s) = deadline_client {
                let _ = s.shutdown(std::net::Shutdown::Both);
            }
            if let Some(s) = deadline_origin {
                let _ = s.shutdown(std::net::Shutdown::Both);
            }
        })
        .expect("spawning tunnel watchdog thread");

    let _ = done_rx1.recv();
    let _ = done_rx2.recv();
    cancel.store(true, std::sync::atomic::Ordering::SeqCst);
    drop(watchdog);
}
