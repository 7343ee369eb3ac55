use std::fmt;

/// Error type returned by the library-layer components (socket I/O, header
/// parsing, ACL/host-spec matching, buffers). The request processor
/// translates these into HTTP status codes; nothing here ever crosses a
/// worker boundary as a panic.
#[derive(Debug)]
#[allow(dead_code)]
pub enum ProxyError {
    Io(std::io::Error),
    /// `read_line` exceeded the 128 KiB line-length guard.
    LineTooLong,
    /// Malformed request line, header block, or URL.
    Protocol(String),
    /// DNS resolution failed for a host.
    Resolve(String),
    /// Socket connect/handshake to an upstream or origin failed.
    UpstreamConnect(String),
    /// SOCKS4/SOCKS5 handshake rejected by the upstream.
    Handshake(String),
    /// HeaderMap is already at its 256-entry cap.
    HeaderMapFull,
    /// Config failed validation at load time.
    Config(String),
}

impl fmt::Display for ProxyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProxyError::Io(e) => write!(f, "i/o error: {}", e),
            ProxyError::LineTooLong => write!(f, "line exceeds maximum length"),
            ProxyError::Protocol(msg) => write!(f, "protocol error: {}", msg),
            ProxyError::Resolve(msg) => write!(f, "resolve error: {}", msg),
            ProxyError::UpstreamConnect(msg) => write!(f, "upstream connect error: {}", msg),
            ProxyError::Handshake(msg) => write!(f, "upstream handshake error: {}", msg),
            ProxyError::HeaderMapFull => write!(f, "header map full"),
            ProxyError::Config(msg) => write!(f, "config error: {}", msg),
        }
    }
}

impl std::error::Error for ProxyError {}

impl From<std::io::Error> for ProxyError {
    fn from(e: std::io::Error) -> Self {
        ProxyError::Io(e)
    }
}
