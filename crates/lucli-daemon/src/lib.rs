//! Loopback-only request daemon (§4.7, C12).
//!
//! Accepts one line of UTF-8 JSON per TCP connection, dispatches it
//! through an injected [`Dispatcher`] — normally the command facade (C13)
//! — and writes back a single JSON response line before closing. This
//! crate knows nothing about commands themselves; it only owns the
//! framing and the socket, so it has no dependency on `lucli-core` and
//! can be exercised with a stub dispatcher in tests.

use std::io::{BufRead, BufReader, Write};
use std::net::{IpAddr, Ipv4Addr, TcpListener, TcpStream};

use lucli_types::{DaemonRequest, DaemonResponse};

/// Default daemon port (spec.md §4.9 CLI surface: `daemon [--port]`).
pub const DEFAULT_PORT: u16 = 10000;

/// Malformed JSON or a missing/empty `argv` (spec.md §4.7).
const USAGE_ERROR_EXIT_CODE: i32 = 2;

/// Executes one daemon request and reports its exit code and captured
/// output. Implemented by the command facade; kept as a trait here so
/// this crate stays free of a dependency on it.
pub trait Dispatcher: Send + Sync {
    fn dispatch(&self, argv: &[String]) -> (i32, String);
}

/// Bind a loopback-only listener. Any non-loopback host is rejected —
/// the daemon never listens beyond the local machine (§4.7).
pub fn bind(port: u16) -> std::io::Result<TcpListener> {
    TcpListener::bind((IpAddr::V4(Ipv4Addr::LOCALHOST), port))
}

/// Serve connections sequentially until `should_stop` reports true
/// between accepts. Each connection is handled to completion before the
/// next is accepted (§4.7 "connections are handled sequentially").
pub fn serve(listener: &TcpListener, dispatcher: &dyn Dispatcher, mut should_stop: impl FnMut() -> bool) -> std::io::Result<()> {
    listener.set_nonblocking(true)?;
    loop {
        if should_stop() {
            return Ok(());
        }
        match listener.accept() {
            Ok((stream, _addr)) => {
                stream.set_nonblocking(false)?;
                if let Err(err) = handle_connection(stream, dispatcher) {
                    tracing::warn!(error = %err, "daemon connection failed");
                }
            }
            Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                std::thread::sleep(std::time::Duration::from_millis(25));
            }
            Err(e) => return Err(e),
        }
    }
}

/// Handle one request/response cycle on an already-accepted connection.
pub fn handle_connection(stream: TcpStream, dispatcher: &dyn Dispatcher) -> std::io::Result<()> {
    let mut reader = BufReader::new(stream.try_clone()?);
    let mut line = String::new();
    let bytes_read = reader.read_line(&mut line)?;
    let mut writer = stream;

    if bytes_read == 0 {
        return Ok(());
    }

    let response = match serde_json::from_str::<DaemonRequest>(line.trim_end()) {
        Ok(request) if request.argv.is_empty() => DaemonResponse {
            id: request.id,
            exit_code: USAGE_ERROR_EXIT_CODE,
            output: "usage error: empty argv".to_string(),
        },
        Ok(request) => {
            let (exit_code, output) = dispatcher.dispatch(&request.argv);
            DaemonResponse { id: request.id, exit_code, output }
        }
        Err(err) => DaemonResponse {
            id: None,
            exit_code: USAGE_ERROR_EXIT_CODE,
            output: format!("usage error: invalid request JSON: {err}"),
        },
    };

    let mut encoded = serde_json::to_string(&response).expect("DaemonResponse always serializes");
    encoded.push('\n');
    writer.write_all(encoded.as_bytes())?;
    writer.flush()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write as _;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct EchoDispatcher {
        calls: Arc<AtomicUsize>,
    }

    impl Dispatcher for EchoDispatcher {
        fn dispatch(&self, argv: &[String]) -> (i32, String) {
            self.calls.fetch_add(1, Ordering::SeqCst);
            (0, argv.join(" "))
        }
    }

    fn roundtrip(request_line: &str) -> DaemonResponse {
        let listener = TcpListener::bind((IpAddr::V4(Ipv4Addr::LOCALHOST), 0)).unwrap();
        let addr = listener.local_addr().unwrap();
        let dispatcher = EchoDispatcher { calls: Arc::new(AtomicUsize::new(0)) };

        let handle = std::thread::spawn(move || {
            let (stream, _) = listener.accept().unwrap();
            handle_connection(stream, &dispatcher).unwrap();
        });

        let mut client = TcpStream::connect(addr).unwrap();
        client.write_all(request_line.as_bytes()).unwrap();
        client.write_all(b"\n").unwrap();
        client.shutdown(std::net::Shutdown::Write).unwrap();

        let mut reader = BufReader::new(client);
        let mut response_line = String::new();
        reader.read_line(&mut response_line).unwrap();
        handle.join().unwrap();

        serde_json::from_str(response_line.trim_end()).unwrap()
    }

    #[test]
    fn dispatches_well_formed_request() {
        let response = roundtrip(r#"{"id":"1","argv":["status"]}"#);
        assert_eq!(response.id.as_deref(), Some("1"));
        assert_eq!(response.exit_code, 0);
        assert_eq!(response.output, "status");
    }

    #[test]
    fn empty_argv_is_a_usage_error() {
        let response = roundtrip(r#"{"id":"2","argv":[]}"#);
        assert_eq!(response.exit_code, 2);
    }

    #[test]
    fn malformed_json_is_a_usage_error() {
        let response = roundtrip("not json");
        assert_eq!(response.exit_code, 2);
        assert!(response.output.contains("invalid request JSON"));
    }

    #[test]
    fn bind_only_accepts_loopback() {
        let listener = bind(0).unwrap();
        assert!(listener.local_addr().unwrap().ip().is_loopback());
    }
}
