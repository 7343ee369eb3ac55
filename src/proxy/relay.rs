//! Bidirectional byte relay (component 4.K).
//!
//! Readiness multiplexing is `tokio::select!` over the buffer fill/drain
//! futures rather than a hand-rolled `poll`/`epoll` loop — the non-blocking
//! socket + readiness-wait split from the original collapses into async
//! I/O directly. The half-close and post-loop blocking drain described in
//! spec.md 4.K are preserved as explicit phases below.

use crate::buffer::Buffer;
use crate::error::ProxyError;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;

pub struct RelayOutcome {
    pub client_to_server_bytes: u64,
    pub server_to_client_bytes: u64,
}

/// Relay opaque bytes between `client` and `server` (the `CONNECT`/tunnel
/// case — no HTTP framing applies) until both sides have closed or
/// `idle_timeout` elapses with no activity on either side.
pub async fn relay(
    client: &mut TcpStream,
    server: &mut TcpStream,
    idle_timeout: Duration,
) -> Result<RelayOutcome, ProxyError> {
    let (mut client_r, mut client_w) = client.split();
    let (mut server_r, mut server_w) = server.split();

    let mut cbuffer = Buffer::new(); // client -> server
    let mut sbuffer = Buffer::new(); // server -> client

    let mut client_eof = false;
    let mut server_eof = false;
    let mut c2s_bytes: u64 = 0;
    let mut s2c_bytes: u64 = 0;

    loop {
        if client_eof && server_eof && cbuffer.is_empty() && sbuffer.is_empty() {
            break;
        }

        let want_read_client = !client_eof && !cbuffer.is_full();
        let want_write_to_server = !cbuffer.is_empty();
        let want_read_server = !server_eof && !sbuffer.is_full();
        let want_write_to_client = !sbuffer.is_empty();

        if !want_read_client && !want_write_to_server && !want_read_server && !want_write_to_client
        {
            break;
        }

        let step = tokio::select! {
            biased;

            res = cbuffer.fill_from(&mut client_r), if want_read_client => {
                Step::ClientRead(res)
            }
            res = sbuffer.drain_to(&mut client_w), if want_write_to_client => {
                Step::ClientWrite(res)
            }
            res = sbuffer.fill_from(&mut server_r), if want_read_server => {
                Step::ServerRead(res)
            }
            res = cbuffer.drain_to(&mut server_w), if want_write_to_server => {
                Step::ServerWrite(res)
            }
            _ = tokio::time::sleep(idle_timeout) => {
                Step::Timeout
            }
        };

        match step {
            Step::ClientRead(Ok(0)) => client_eof = true,
            Step::ClientRead(Ok(_)) => {}
            Step::ClientRead(Err(e)) => return Err(e),
            Step::ClientWrite(Ok(n)) => s2c_bytes += n as u64,
            Step::ClientWrite(Err(e)) => return Err(e),
            Step::ServerRead(Ok(0)) => server_eof = true,
            Step::ServerRead(Ok(_)) => {}
            Step::ServerRead(Err(e)) => return Err(e),
            Step::ServerWrite(Ok(n)) => c2s_bytes += n as u64,
            Step::ServerWrite(Err(e)) => return Err(e),
            Step::Timeout => {
                tracing::info!("relay idle timeout");
                break;
            }
        }
    }

    // Post-loop: best-effort drain of whatever remains, then half-close.
    let _ = sbuffer.drain_all_to(&mut client_w).await;
    let _ = client_w.shutdown().await;
    let _ = cbuffer.drain_all_to(&mut server_w).await;
    let _ = server_w.shutdown().await;

    crate::metrics::relay_bytes("client_to_server", c2s_bytes);
    crate::metrics::relay_bytes("server_to_client", s2c_bytes);

    Ok(RelayOutcome {
        client_to_server_bytes: c2s_bytes,
        server_to_client_bytes: s2c_bytes,
    })
}

enum Step {
    ClientRead(Result<usize, ProxyError>),
    ClientWrite(Result<usize, ProxyError>),
    ServerRead(Result<usize, ProxyError>),
    ServerWrite(Result<usize, ProxyError>),
    Timeout,
}
