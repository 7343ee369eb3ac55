//! Shared helpers for the end-to-end tests: a minimal `Config`, a proxy
//! spun up on a loopback ephemeral port, and raw-socket readers for
//! asserting on the exact bytes the proxy sends.
//!
//! Each test *file* must use exactly one `#[tokio::test]` function:
//! `Metrics::install()` wraps a process-global Prometheus recorder that can
//! only be installed once, and every test file under `tests/` is its own
//! process.

use std::net::SocketAddr;
use std::sync::Arc;
use tinyrelay::config::{Config, RawConfig};
use tinyrelay::net;
use tinyrelay::server::{self, ProxyState};
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tokio::net::TcpListener;

/// A `RawConfig` with every directive at a safe, permissive default — no
/// ACL, no auth, no filter, no upstream, admin surface off. `port` just
/// needs to pass `Config::from_raw`'s nonzero check; `spawn_proxy`
/// overwrites it with the real bound ephemeral port.
pub fn base_raw() -> RawConfig {
    RawConfig {
        port: 1,
        admin_listen: None,
        ..RawConfig::default()
    }
}

pub fn base_config() -> Config {
    Config::from_raw(base_raw()).expect("base config is valid")
}

/// Bind the proxy on an ephemeral loopback port and run it in the
/// background. Returns the bound address and the shared state.
pub async fn spawn_proxy(mut config: Config) -> (SocketAddr, Arc<ProxyState>) {
    let listeners = net::listen_sock(Some("127.0.0.1"), 0).expect("bind loopback listener");
    let addr = listeners[0].local_addr().expect("listener has a local addr");
    config.port = addr.port();

    let state = server::new_state(config, None).expect("build proxy state");
    let spawn_state = state.clone();
    tokio::spawn(async move {
        let _ = server::run_proxy_server(spawn_state, listeners).await;
    });
    // Give the accept loop a turn to start before the test connects.
    tokio::task::yield_now().await;
    (addr, state)
}

/// Bind a loopback listener on an ephemeral port for a fake origin/upstream
/// server, returning the address and the listener to `accept()` on.
pub fn spawn_fake_server() -> (SocketAddr, TcpListener) {
    let std_listener = std::net::TcpListener::bind("127.0.0.1:0").expect("bind fake server");
    std_listener.set_nonblocking(true).expect("nonblocking");
    let addr = std_listener.local_addr().expect("local addr");
    let listener = TcpListener::from_std(std_listener).expect("tokio listener");
    (addr, listener)
}

/// Read one `\r\n`-terminated line, stripped of the trailing CRLF.
pub async fn read_line<R: AsyncBufRead + Unpin>(reader: &mut R) -> String {
    let mut line = String::new();
    reader.read_line(&mut line).await.expect("read line");
    line.trim_end_matches(['\r', '\n']).to_string()
}

/// Read a status/request line followed by a header block up to the blank
/// line, returning (first line, headers in received order).
pub async fn read_head<R: AsyncBufRead + Unpin>(reader: &mut R) -> (String, Vec<(String, String)>) {
    let first = read_line(reader).await;
    let mut headers = Vec::new();
    loop {
        let line = read_line(reader).await;
        if line.is_empty() {
            break;
        }
        if let Some((k, v)) = line.split_once(':') {
            headers.push((k.trim().to_string(), v.trim().to_string()));
        }
    }
    (first, headers)
}

pub fn header<'a>(headers: &'a [(String, String)], name: &str) -> Option<&'a str> {
    headers
        .iter()
        .find(|(k, _)| k.eq_ignore_ascii_case(name))
        .map(|(_, v)| v.as_str())
}

/// Drain a chunked body (including the terminating `0\r\n\r\n`), returning
/// the decoded bytes.
pub async fn read_chunked_body<R: AsyncBufRead + Unpin>(reader: &mut R) -> Vec<u8> {
    let mut body = Vec::new();
    loop {
        let size_line = read_line(reader).await;
        let size = usize::from_str_radix(size_line.trim(), 16).expect("valid chunk size");
        if size == 0 {
            // trailing CRLF after the terminating 0-size chunk
            let _ = read_line(reader).await;
            break;
        }
        let mut chunk = vec![0u8; size];
        tokio::io::AsyncReadExt::read_exact(reader, &mut chunk)
            .await
            .expect("read chunk data");
        body.extend_from_slice(&chunk);
        let trailing = read_line(reader).await;
        assert!(trailing.is_empty(), "expected CRLF after chunk data");
    }
    body
}
