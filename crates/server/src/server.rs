//! Acceptor loop, worker pool wiring, and cooperative shutdown.
//!
//! The accept loop is the sole producer into the main worker pool; `CONNECT`
//! tunnels run their relay directions on a second, smaller pool so a handful
//! of long-lived tunnels can never starve keep-alive request handling.

use std::io;
use std::net::{SocketAddr, TcpListener};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use socket2::{Domain, Socket, Type};

use waypoint_config::Config;
use waypoint_core::{Cache, CacheStats, ConnectionSnapshot, ConnectionStats};

use crate::connection;
use crate::pool::WorkerPool;

/// Number of threads in the main client-connection pool.
const MAIN_POOL_SIZE: usize = 30;

/// Number of threads in the small pool dedicated to `CONNECT` tunnel relay
/// directions — deliberately much smaller than `MAIN_POOL_SIZE`, since each
/// tunnel only ever occupies two of its threads for its lifetime.
const TUNNEL_POOL_SIZE: usize = 8;

/// How long `Server::run` waits for in-flight connections to finish after
/// shutdown is requested, before giving up on the join.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(30);

/// A bound, not-yet-running proxy listener plus the state it shares across
/// every connection it serves.
pub struct Server {
    listener: TcpListener,
    config: Arc<Config>,
    cache: Arc<Cache>,
    stats: Arc<ConnectionStats>,
    running: Arc<AtomicBool>,
    shutdown_socket: Arc<Socket>,
    local_addr: SocketAddr,
}

/// A handle that can request shutdown of a running [`Server`] from another
/// thread, and read its live stats without holding the server itself.
#[derive(Clone)]
pub struct ServerHandle {
    running: Arc<AtomicBool>,
    shutdown_socket: Arc<Socket>,
    cache: Arc<Cache>,
    stats: Arc<ConnectionStats>,
    local_addr: SocketAddr,
}

impl ServerHandle {
    /// The address this server is listening on.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// A snapshot of current cache occupancy and hit/miss counters.
    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    /// A snapshot of current connection counters.
    pub fn connection_stats(&self) -> ConnectionSnapshot {
        self.stats.snapshot()
    }

    /// Requests shutdown: marks `running = false`, then shuts down a
    /// duplicate handle to the listening socket to unblock whatever thread
    /// is parked in `Server::run`'s `accept()` call. Once in-flight
    /// connections finish (or the grace deadline elapses), `run` returns.
    /// Idempotent.
    pub fn shutdown(&self) {
        self.running.store(false, Ordering::SeqCst);
        let _ = self.shutdown_socket.shutdown(std::net::Shutdown::Both);
    }
}

impl Server {
    /// Binds the configured port with `SO_REUSEADDR` set. The
    /// cache is sized from `config.max_object_bytes`/`config.max_cache_bytes`
    /// at this point and lives for the server's whole lifetime.
    pub fn bind(config: Config) -> io::Result<Self> {
        let addr: SocketAddr = ([0, 0, 0, 0], config.listen_port).into();

        let socket = Socket::new(Domain::IPV4, Type::STREAM, None)?;
        socket.set_reuse_address(true)?;
        socket.bind(&addr.into())?;
        socket.listen(1024)?;

        let shutdown_socket = Arc::new(socket.try_clone()?);
        let listener: TcpListener = socket.into();
        let local_addr = listener.local_addr()?;

        let cache = Arc::new(Cache::new(config.max_object_bytes, config.max_cache_bytes));
        let stats = Arc::new(ConnectionStats::new());

        Ok(Server {
            listener,
            config: Arc::new(config),
            cache,
            stats,
            running: Arc::new(AtomicBool::new(true)),
            shutdown_socket,
            local_addr,
        })
    }

    /// The address actually bound (useful when `listen_port` was `0` in
    /// tests).
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// A handle that can be used to request shutdown or read stats while
    /// `run` is blocking the calling thread.
    pub fn handle(&self) -> ServerHandle {
        ServerHandle {
            running: self.running.clone(),
            shutdown_socket: self.shutdown_socket.clone(),
            cache: self.cache.clone(),
            stats: self.stats.clone(),
            local_addr: self.local_addr,
        }
    }

    /// Runs the accept loop until shutdown is requested via a
    /// [`ServerHandle`]. Blocks the calling thread.
    pub fn run(self) -> io::Result<()> {
        let worker_pool = WorkerPool::new(MAIN_POOL_SIZE, "waypoint-worker");
        let tunnel_pool = Arc::new(WorkerPool::new(TUNNEL_POOL_SIZE, "waypoint-tunnel"));

        loop {
            match self.listener.accept() {
                Ok((socket, client_addr)) => {
                    if !self.running.load(Ordering::SeqCst) {
                        break;
                    }
                    let config = self.config.clone();
                    let cache = self.cache.clone();
                    let stats = self.stats.clone();
                    let tunnel_pool = tunnel_pool.clone();
                    worker_pool.submit(move || {
                        connection::handle_connection(socket, client_addr, &config, &cache, &tunnel_pool, &stats);
                    });
                }
                Err(e) => {
                    if !self.running.load(Ordering::SeqCst) {
                        break;
                    }
                    tracing::warn!(error = %e, "accept error");
                }
            }
        }

        worker_pool.join_with_timeout(SHUTDOWN_GRACE);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> Config {
        Config { listen_port: 0, idle_timeout: 5, max_object_bytes: 1024, max_cache_bytes: 4096, proxy_id: "wp-test".into() }
    }

    #[test]
    fn bind_picks_an_ephemeral_port_when_configured_with_zero() {
        let cfg = config();
        let server = Server::bind(cfg).unwrap();
        assert_ne!(server.local_addr().port(), 0);
    }

    #[test]
    fn handle_reports_zeroed_stats_before_any_connections() {
        let server = Server::bind(config()).unwrap();
        let handle = server.handle();
        let snap = handle.connection_stats();
        assert_eq!(snap.total_accepted, 0);
        let cache_stats = handle.cache_stats();
        assert_eq!(cache_stats.entries, 0);
    }

    #[test]
    fn shutdown_unblocks_a_pending_accept_and_run_returns() {
        let server = Server::bind(config()).unwrap();
        let handle = server.handle();
        let run_thread = std::thread::spawn(move || server.run());

        // Give the accept loop a moment to enter `accept()`.
        std::thread::sleep(Duration::from_millis(50));
        handle.shutdown();

        run_thread.join().unwrap().unwrap();
    }
}
