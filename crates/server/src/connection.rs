//! The per-connection request loop: reads requests off one client
//! socket strictly serially, dispatches each through the pipeline, writes
//! the response, and decides whether to keep reading or close.

use std::net::{SocketAddr, TcpStream};
use std::time::Duration;

use waypoint_config::Config;
use waypoint_core::{normalize_url, Cache, ConnectionStats, Method, ProxyError, Request, Response};

use crate::parser::parse_request_head;
use crate::pipeline::{self, PipelineOutcome};
use crate::pool::WorkerPool;
use crate::stream::{HeaderReadError, StreamReader};
use crate::transaction::{self, CacheTag};
use crate::tunnel;
use crate::writer::serialize_response;

/// Drives one accepted connection to completion. Runs on a worker-pool
/// thread; blocks until the connection ends (client closes, a timeout
/// fires, or a non-persistent response is sent) or hands off into tunnel
/// mode, in which case it returns only once the tunnel itself ends.
pub fn handle_connection(
    socket: TcpStream,
    client_addr: SocketAddr,
    config: &Config,
    cache: &Cache,
    tunnel_pool: &WorkerPool,
    stats: &ConnectionStats,
) {
    stats.record_accepted();

    let idle_timeout = Duration::from_secs(config.idle_timeout);
    if socket.set_read_timeout(Some(idle_timeout)).is_err() {
        stats.record_completed();
        return;
    }

    let mut reader = StreamReader::new(socket);

    loop {
        let header_block = match reader.read_header_block() {
            Ok(block) => block,
            Err(HeaderReadError::Eof { partial }) => {
                if partial {
                    tracing::debug!(%client_addr, "client closed mid-request");
                }
                break;
            }
            Err(HeaderReadError::Timeout) => break,
            Err(HeaderReadError::TooLarge) => {
                respond_and_close(&mut reader, &ProxyError::BadRequest("request header block exceeds 65536 bytes".into()));
                break;
            }
            Err(HeaderReadError::Io(e)) => {
                tracing::debug!(%client_addr, error = %e, "read error");
                break;
            }
        };

        let head = match parse_request_head(&header_block) {
            Ok(head) => head,
            Err(err) => {
                respond_and_close(&mut reader, &err);
                break;
            }
        };

        let body = match read_request_body(&mut reader, &head.headers) {
            Ok(body) => body,
            Err(None) => break,
            Err(Some(err)) => {
                respond_and_close(&mut reader, &err);
                break;
            }
        };

        let request_line = format!("{} {} {}", head.method, head.target, head.version);
        let cache_tag = match &head.method {
            Method::Get if cache.contains_key(&normalize_url(&head.target)) => CacheTag::Hit,
            Method::Get => CacheTag::Miss,
            _ => CacheTag::NotApplicable,
        };

        let request =
            Request { method: head.method, target: head.target, version: head.version, headers: head.headers, body };
        let client_version = request.version.clone();
        let client_connection_header = request.headers.get("connection").map(str::to_string);

        match pipeline::handle(request, config, cache) {
            PipelineOutcome::Respond(response) => {
                let body_len = response.body.len();
                let bytes = serialize_response(&response);
                let status_code = transaction::parse_status_code(&bytes);
                if reader.write_all(&bytes).is_err() {
                    break;
                }
                transaction::event(client_addr, cache_tag, &request_line, status_code, body_len).emit();

                let persistent = response
                    .headers
                    .get("connection")
                    .map(|v| v.eq_ignore_ascii_case("keep-alive"))
                    .unwrap_or_else(|| {
                        waypoint_core::client_wants_persistent(&client_version, client_connection_header.as_deref())
                    });
                if !persistent {
                    break;
                }
            }
            PipelineOutcome::Tunnel { origin, confirmation } => {
                let body_len = confirmation.body.len();
                let bytes = serialize_response(&confirmation);
                let status_code = transaction::parse_status_code(&bytes);
                if reader.write_all(&bytes).is_err() {
                    stats.record_completed();
                    return;
                }
                transaction::event(client_addr, cache_tag, &request_line, status_code, body_len).emit();

                let (client_socket, leftover) = reader.into_parts();
                tunnel::relay(client_socket, origin, leftover, tunnel_pool);
                stats.record_completed();
                return;
            }
        }
    }

    stats.record_completed();
}

/// Reads the request body: present iff `content-length` is given,
/// read exactly that many bytes; the proxy never reads chunked request
/// bodies. `Err(None)` means the connection is no longer usable (EOF/IO);
/// `Err(Some(_))` means a well-formed 400 should be sent first.
fn read_request_body(
    reader: &mut StreamReader,
    headers: &waypoint_core::Headers,
) -> Result<Vec<u8>, Option<ProxyError>> {
    match headers.get("content-length") {
        Some(len) => {
            let n: usize = len
                .trim()
                .parse()
                .map_err(|_| Some(ProxyError::BadRequest(format!("malformed content-length: {len}"))))?;
            reader.read_exact(n).map_err(|_| None)
        }
        None => Ok(Vec::new()),
    }
}

fn respond_and_close(reader: &mut StreamReader, err: &ProxyError) {
    let response: Response = pipeline::error_response(err);
    let bytes = serialize_response(&response);
    let _ = reader.write_all(&bytes);
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Read, Write};
    use std::net::TcpListener;
    use std::thread;

    fn config() -> Config {
        Config { listen_port: 9999, idle_timeout: 2, max_object_bytes: 1024, max_cache_bytes: 4096, proxy_id: "wp-test".into() }
    }

    #[test]
    fn oversize_header_block_yields_400_and_closes() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let client_thread = thread::spawn(move || {
            let mut client = TcpStream::connect(addr).unwrap();
            let oversized = vec![b'x'; crate::stream::MAX_HEADER_BYTES + 1];
            client.write_all(&oversized).unwrap();
            let mut buf = Vec::new();
            client.read_to_end(&mut buf).unwrap();
            buf
        });

        let (server_socket, client_addr) = listener.accept().unwrap();
        let cfg = config();
        let cache = Cache::new(cfg.max_object_bytes, cfg.max_cache_bytes);
        let tunnel_pool = WorkerPool::new(1, "test-tunnel");
        let stats = ConnectionStats::default();
        handle_connection(server_socket, client_addr, &cfg, &cache, &tunnel_pool, &stats);
        tunnel_pool.join();

        let response_bytes = client_thread.join().unwrap();
        let response_text = String::from_utf8_lossy(&response_bytes);
        assert!(response_text.starts_with("HTTP/1.1 400"));
    }

    #[test]
    fn well_formed_unsupported_method_reaches_the_pipeline_instead_of_closing_on_a_framing_error() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let client_thread = thread::spawn(move || {
            let mut client = TcpStream::connect(addr).unwrap();
            client.write_all(b"PUT http://example.com/ HTTP/1.1\r\nHost: example.com\r\nContent-Length: 0\r\n\r\n").unwrap();
            let mut buf = Vec::new();
            client.read_to_end(&mut buf).unwrap();
            buf
        });

        let (server_socket, client_addr) = listener.accept().unwrap();
        let cfg = config();
        let cache = Cache::new(cfg.max_object_bytes, cfg.max_cache_bytes);
        let tunnel_pool = WorkerPool::new(1, "test-tunnel");
        let stats = ConnectionStats::default();
        handle_connection(server_socket, client_addr, &cfg, &cache, &tunnel_pool, &stats);
        tunnel_pool.join();

        let response_bytes = client_thread.join().unwrap();
        let response_text = String::from_utf8_lossy(&response_bytes);
        // Reaches the pipeline (which rejects the verb) rather than being torn
        // down as a framing failure; the 400 still carries `Connection: close`.
        assert!(response_text.starts_with("HTTP/1.1 400"));
        assert!(response_text.to_lowercase().contains("connection: close"));
    }

    #[test]
    fn malformed_request_line_yields_400_and_closes() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let client_thread = thread::spawn(move || {
            let mut client = TcpStream::connect(addr).unwrap();
            client.write_all(b"NOT A REQUEST LINE\r\n\r\n").unwrap();
            let mut buf = Vec::new();
            client.read_to_end(&mut buf).unwrap();
            buf
        });

        let (server_socket, client_addr) = listener.accept().unwrap();
        let cfg = config();
        let cache = Cache::new(cfg.max_object_bytes, cfg.max_cache_bytes);
        let tunnel_pool = WorkerPool::new(1, "test-tunnel");
        let stats = ConnectionStats::default();
        handle_connection(server_socket, client_addr, &cfg, &cache, &tunnel_pool, &stats);
        tunnel_pool.join();

        let response_bytes = client_thread.join().unwrap();
        assert!(String::from_utf8_lossy(&response_bytes).starts_with("HTTP/1.1 400"));
    }
}
