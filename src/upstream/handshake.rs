//! Upstream handshake protocols (component 4.H): HTTP `CONNECT`, SOCKS4a,
//! SOCKS5 with optional username/password auth.

use super::UpstreamRule;
use crate::error::ProxyError;
use tokio::io::{AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;

/// Perform whichever handshake `rule.kind` calls for against an already
/// TCP-connected `stream`, so that sending the actual HTTP request
/// afterwards reaches `target_host:target_port` as if directly connected
/// (SOCKS cases), or is itself the CONNECT/absolute-form request (HTTP
/// case, handled by the caller — this function only issues the CONNECT
/// when the client's own method was CONNECT).
pub async fn socks4a(
    stream: &mut TcpStream,
    target_host: &str,
    target_port: u16,
) -> Result<(), ProxyError> {
    let mut req = Vec::with_capacity(9 + target_host.len());
    req.push(0x04);
    req.push(0x01);
    req.extend_from_slice(&target_port.to_be_bytes());
    req.extend_from_slice(&[0, 0, 0, 1]); // 0.0.0.1: signals SOCKS4a
    req.push(0x00); // empty userid
    req.extend_from_slice(target_host.as_bytes());
    req.push(0x00);

    stream
        .write_all(&req)
        .await
        .map_err(|e| ProxyError::Handshake(format!("socks4a write: {e}")))?;

    let mut resp = [0u8; 8];
    stream
        .read_exact(&mut resp)
        .await
        .map_err(|e| ProxyError::Handshake(format!("socks4a read: {e}")))?;

    if resp[0] != 0x00 || resp[1] != 0x5a {
        return Err(ProxyError::Handshake(format!(
            "socks4a rejected connection: {:02x}",
            resp[1]
        )));
    }
    Ok(())
}

pub async fn socks5(
    stream: &mut TcpStream,
    target_host: &str,
    target_port: u16,
    user: Option<&str>,
    pass: Option<&str>,
) -> Result<(), ProxyError> {
    let use_auth = user.is_some() && pass.is_some();
    let methods: &[u8] = if use_auth { &[0x00, 0x02] } else { &[0x00] };
    let mut greeting = vec![0x05, methods.len() as u8];
    greeting.extend_from_slice(methods);
    stream
        .write_all(&greeting)
        .await
        .map_err(|e| ProxyError::Handshake(format!("socks5 greeting write: {e}")))?;

    let mut chosen = [0u8; 2];
    stream
        .read_exact(&mut chosen)
        .await
        .map_err(|e| ProxyError::Handshake(format!("socks5 greeting read: {e}")))?;
    if chosen[0] != 0x05 {
        return Err(ProxyError::Handshake("socks5 bad version".into()));
    }
    match chosen[1] {
        0x00 => {}
        0x02 if use_auth => {
            let user = user.unwrap();
            let pass = pass.unwrap();
            let mut auth = vec![0x01, user.len() as u8];
            auth.extend_from_slice(user.as_bytes());
            auth.push(pass.len() as u8);
            auth.extend_from_slice(pass.as_bytes());
            stream
                .write_all(&auth)
                .await
                .map_err(|e| ProxyError::Handshake(format!("socks5 auth write: {e}")))?;

            let mut auth_resp = [0u8; 2];
            stream
                .read_exact(&mut auth_resp)
                .await
                .map_err(|e| ProxyError::Handshake(format!("socks5 auth read: {e}")))?;
            // RFC 1929 says status must be 0x00; some servers are observed
            // replying with the (wrong) method-selection reply instead.
            // Tolerate both, matching the original's documented quirk.
            let ok = auth_resp[1] == 0x00 || (auth_resp[0] == 0x01 && auth_resp[1] == 0x00);
            if !ok {
                return Err(ProxyError::Handshake("socks5 auth rejected".into()));
            }
        }
        other => {
            return Err(ProxyError::Handshake(format!(
                "socks5 rejected all methods (chosen={other:02x})"
            )))
        }
    }

    let mut connect = vec![0x05, 0x01, 0x00, 0x03, target_host.len() as u8];
    connect.extend_from_slice(target_host.as_bytes());
    connect.extend_from_slice(&target_port.to_be_bytes());
    stream
        .write_all(&connect)
        .await
        .map_err(|e| ProxyError::Handshake(format!("socks5 connect write: {e}")))?;

    let mut head = [0u8; 4];
    stream
        .read_exact(&mut head)
        .await
        .map_err(|e| ProxyError::Handshake(format!("socks5 connect read: {e}")))?;
    if head[0] != 0x05 {
        return Err(ProxyError::Handshake("socks5 bad reply version".into()));
    }
    if head[1] != 0x00 {
        return Err(ProxyError::Handshake(format!(
            "socks5 connect failed: rep={:02x}",
            head[1]
        )));
    }
    let bound_len = match head[3] {
        0x01 => 4,
        0x04 => 16,
        0x03 => {
            let mut len_byte = [0u8; 1];
            stream
                .read_exact(&mut len_byte)
                .await
                .map_err(|e| ProxyError::Handshake(format!("socks5 bound addr len: {e}")))?;
            len_byte[0] as usize
        }
        other => {
            return Err(ProxyError::Handshake(format!(
                "socks5 unknown address type {other:02x}"
            )))
        }
    };
    let mut discard = vec![0u8; bound_len + 2]; // + bound port
    stream
        .read_exact(&mut discard)
        .await
        .map_err(|e| ProxyError::Handshake(format!("socks5 bound addr: {e}")))?;
    Ok(())
}

/// Issue `CONNECT host:port` through an HTTP upstream proxy and read its
/// response status line + headers. Only used when the client's own request
/// was itself a `CONNECT` — a plain request routed through an `Http`-kind
/// upstream instead gets an absolute-form request line and its own
/// `Proxy-Authorization`, built by the caller.
pub async fn http_connect(
    stream: &mut TcpStream,
    target_host: &str,
    target_port: u16,
    rule: &UpstreamRule,
) -> Result<(), ProxyError> {
    let mut req = format!("CONNECT {target_host}:{target_port} HTTP/1.1\r\n");
    req.push_str(&format!("Host: {target_host}:{target_port}\r\n"));
    if let Some(authstr) = &rule.authstr {
        req.push_str(&format!("Proxy-Authorization: Basic {authstr}\r\n"));
    }
    req.push_str("\r\n");

    stream
        .write_all(req.as_bytes())
        .await
        .map_err(|e| ProxyError::Handshake(format!("http connect write: {e}")))?;

    let (reader_half, _) = stream.split();
    let mut reader = BufReader::new(reader_half);
    let status_line = crate::net::read_line(&mut reader)
        .await
        .map_err(|e| ProxyError::Handshake(format!("http connect status: {e}")))?
        .ok_or_else(|| ProxyError::Handshake("upstream closed before status line".into()))?;

    let status = status_line
        .split_whitespace()
        .nth(1)
        .and_then(|s| s.parse::<u16>().ok())
        .ok_or_else(|| ProxyError::Handshake(format!("malformed status line: {status_line}")))?;

    loop {
        let line = crate::net::read_line(&mut reader)
            .await
            .map_err(|e| ProxyError::Handshake(format!("http connect headers: {e}")))?
            .ok_or_else(|| ProxyError::Handshake("upstream closed mid-headers".into()))?;
        if line.is_empty() {
            break;
        }
    }

    if !(200..300).contains(&status) {
        return Err(ProxyError::Handshake(format!(
            "upstream CONNECT rejected: {status}"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn socks4a_request_layout() {
        let mut req = Vec::new();
        req.push(0x04u8);
        req.push(0x01u8);
        req.extend_from_slice(&443u16.to_be_bytes());
        req.extend_from_slice(&[0, 0, 0, 1]);
        req.push(0x00);
        req.extend_from_slice(b"example.test");
        req.push(0x00);
        assert_eq!(req[0], 0x04);
        assert_eq!(&req[2..4], &[0x01, 0xbb]);
        assert_eq!(&req[4..8], &[0, 0, 0, 1]);
    }
}
