//! Name resolution and TCP connection setup for origin servers, each
//! explicitly bounded in time, with failures classified onto the closed
//! [`ProxyError`] set. Never retries.

use std::io;
use std::net::{TcpStream, ToSocketAddrs};
use std::sync::mpsc;
use std::thread;
use std::time::Duration;

use waypoint_core::ProxyError;

const RESOLVE_TIMEOUT: Duration = Duration::from_secs(3);

/// Resolves `(host, port)` on a dedicated thread, bounded by a hard 3 second
/// wait. A throwaway thread stands in for the "submit to an executor and
/// await with timeout" workaround platforms without native async DNS use:
/// `getaddrinfo` itself has no cancellable/timeout-bearing API in `std`.
fn resolve(host: &str, port: u16) -> Result<std::net::SocketAddr, ProxyError> {
    let (tx, rx) = mpsc::channel();
    let host = host.to_string();
    thread::spawn(move || {
        let result = (host.as_str(), port)
            .to_socket_addrs()
            .map(|mut addrs| addrs.next());
        let _ = tx.send(result);
    });

    match rx.recv_timeout(RESOLVE_TIMEOUT) {
        Ok(Ok(Some(addr))) => Ok(addr),
        Ok(Ok(None)) => Err(ProxyError::ResolveFailure(format!("no addresses for host {host}"))),
        Ok(Err(e)) => Err(ProxyError::ResolveFailure(e.to_string())),
        Err(_) => Err(ProxyError::ResolveFailure(format!("resolution of {host} timed out after {RESOLVE_TIMEOUT:?}"))),
    }
}

fn classify_connect_error(e: &io::Error) -> ProxyError {
    match e.kind() {
        io::ErrorKind::ConnectionRefused => ProxyError::ConnectionRefused(e.to_string()),
        io::ErrorKind::TimedOut => ProxyError::OriginTimeout,
        _ => {
            #[cfg(unix)]
            if let Some(errno) = e.raw_os_error() {
                // ENETUNREACH = 101, EHOSTUNREACH = 113 on Linux.
                if errno == 101 || errno == 113 {
                    return ProxyError::NetworkUnreachable(e.to_string());
                }
            }
            ProxyError::OriginIo(e.to_string())
        }
    }
}

/// Resolves and connects to an origin, installing a read/write deadline
/// equal to `idle_timeout` on the returned socket. Never retries: the first
/// resolution failure or connect failure is final.
pub fn connect(host: &str, port: u16, idle_timeout: Duration) -> Result<TcpStream, ProxyError> {
    let addr = resolve(host, port)?;

    let stream = TcpStream::connect_timeout(&addr, idle_timeout).map_err(|e| classify_connect_error(&e))?;
    stream
        .set_read_timeout(Some(idle_timeout))
        .map_err(|e| ProxyError::OriginIo(e.to_string()))?;
    stream
        .set_write_timeout(Some(idle_timeout))
        .map_err(|e| ProxyError::OriginIo(e.to_string()))?;
    Ok(stream)
}
