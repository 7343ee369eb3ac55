//! Socket I/O primitives (component 4.A).
//!
//! Thin wrappers around `tokio::net` that add the resolver-driven connect
//! with multiple candidate addresses, listener setup (`SO_REUSEADDR`,
//! `IPV6_V6ONLY`), the bounded `read_line`, and the IPv4-in-IPv6 widening
//! that lets the rest of the codebase compare addresses in one address
//! family.

use crate::error::ProxyError;
use crate::loopreg::LoopRegistry;
use rand::seq::SliceRandom;
use socket2::{Domain, Protocol, Socket, Type};
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::net::{TcpListener, TcpStream};

/// `read_line` refuses to accumulate more than this many bytes without
/// seeing a terminating `\n`.
pub const MAX_LINE_LEN: usize = 128 * 1024;

/// Parse a numeric address, widening IPv4 addresses into `::ffff:a.b.c.d`
/// form so every downstream comparison (ACL, loop registry) happens in a
/// single v6 address space.
pub fn full_inet_pton(s: &str) -> Option<Ipv6Addr> {
    if let Ok(v4) = s.parse::<Ipv4Addr>() {
        return Some(v4.to_ipv6_mapped());
    }
    s.parse::<Ipv6Addr>().ok()
}

pub fn widen(ip: IpAddr) -> Ipv6Addr {
    match ip {
        IpAddr::V4(v4) => v4.to_ipv6_mapped(),
        IpAddr::V6(v6) => v6,
    }
}

/// Resolve `host:port`, try each candidate address in turn (randomized to
/// spread load across equally-valid records), optionally preferring
/// `bind_hint` as the outbound source address, and return a connected
/// stream. Records the local address in `loopreg` whenever the ephemeral
/// local port happens to equal the proxy's own listening port.
pub async fn open_sock(
    host: &str,
    port: u16,
    bind_hint: Option<IpAddr>,
    connect_timeout: Duration,
    proxy_port: u16,
    loopreg: &LoopRegistry,
) -> Result<TcpStream, ProxyError> {
    let mut candidates: Vec<SocketAddr> = tokio::net::lookup_host((host, port))
        .await
        .map_err(|e| ProxyError::Resolve(format!("{host}: {e}")))?
        .collect();
    if candidates.is_empty() {
        return Err(ProxyError::Resolve(format!("{host}: no addresses found")));
    }
    candidates.shuffle(&mut rand::thread_rng());

    let mut last_err = None;
    for candidate in candidates {
        let connect = async {
            if let Some(bind_ip) = bind_hint {
                connect_from(bind_ip, candidate).await
            } else {
                TcpStream::connect(candidate).await
            }
        };
        match tokio::time::timeout(connect_timeout, connect).await {
            Ok(Ok(stream)) => {
                if let Ok(local) = stream.local_addr() {
                    if local.port() == proxy_port {
                        loopreg.add(local);
                    }
                }
                return Ok(stream);
            }
            Ok(Err(e)) => last_err = Some(e.to_string()),
            Err(_) => last_err = Some("connect timed out".to_string()),
        }
    }
    Err(ProxyError::UpstreamConnect(
        last_err.unwrap_or_else(|| format!("{host}:{port}: all candidates failed")),
    ))
}

async fn connect_from(bind_ip: IpAddr, target: SocketAddr) -> std::io::Result<TcpStream> {
    let domain = match bind_ip {
        IpAddr::V4(_) => Domain::IPV4,
        IpAddr::V6(_) => Domain::IPV6,
    };
    let sock = Socket::new(domain, Type::STREAM, Some(Protocol::TCP))?;
    sock.set_nonblocking(true)?;
    sock.bind(&SocketAddr::new(bind_ip, 0).into())?;
    match sock.connect(&target.into()) {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => {}
        Err(e) if e.raw_os_error() == Some(libc::EINPROGRESS) => {}
        Err(e) => return Err(e),
    }
    let std_stream: std::net::TcpStream = sock.into();
    let stream = TcpStream::from_std(std_stream)?;
    stream.writable().await?;
    if let Some(e) = stream.take_error()? {
        return Err(e);
    }
    Ok(stream)
}

/// Bind the proxy's listening sockets. `addr` of `None` binds the wildcard
/// address on every available family (typically one v4 and one v6
/// listener); a numeric address binds just that family; an interface name
/// binds every address currently assigned to that interface.
pub fn listen_sock(addr: Option<&str>, port: u16) -> Result<Vec<TcpListener>, ProxyError> {
    let mut listeners = Vec::new();
    match addr {
        None => {
            listeners.push(bind_listener(
                SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), port),
                true,
            )?);
            listeners.push(bind_listener(
                SocketAddr::new(IpAddr::V6(Ipv6Addr::UNSPECIFIED), port),
                true,
            )?);
        }
        Some(spec) => {
            if let Ok(ip) = spec.parse::<IpAddr>() {
                listeners.push(bind_listener(SocketAddr::new(ip, port), false)?);
            } else {
                for ip in interface_addrs(spec) {
                    listeners.push(bind_listener(SocketAddr::new(ip, port), false)?);
                }
                if listeners.is_empty() {
                    return Err(ProxyError::Config(format!(
                        "Listen {spec}: not a numeric address and no such interface"
                    )));
                }
            }
        }
    }
    Ok(listeners)
}

/// `v6_only` should be `true` only for the wildcard `::` bind — a named
/// interface or an explicit numeric address can legitimately want a
/// dual-stack socket (e.g. an interface with both an IPv4 and a v4-mapped
/// IPv6 address reachable through the same listener).
fn bind_listener(addr: SocketAddr, v6_only: bool) -> Result<TcpListener, ProxyError> {
    let domain = match addr {
        SocketAddr::V4(_) => Domain::IPV4,
        SocketAddr::V6(_) => Domain::IPV6,
    };
    let sock = Socket::new(domain, Type::STREAM, Some(Protocol::TCP))?;
    sock.set_reuse_address(true)?;
    if domain == Domain::IPV6 {
        sock.set_only_v6(v6_only)?;
    }
    sock.set_nonblocking(true)?;
    sock.bind(&addr.into())?;
    sock.listen(1024)?;
    let std_listener: std::net::TcpListener = sock.into();
    Ok(TcpListener::from_std(std_listener)?)
}

/// Every unicast address currently bound to a named network interface.
/// Returns an empty vec if the interface doesn't exist.
fn interface_addrs(name: &str) -> Vec<IpAddr> {
    pnet_datalink::interfaces()
        .into_iter()
        .find(|iface| iface.name == name)
        .map(|iface| iface.ips.iter().map(|ipnet| ipnet.ip()).collect())
        .unwrap_or_default()
}

/// Read one `\n`-terminated line, stripping the trailing `\r\n`/`\n`.
/// Returns `Ok(None)` on a clean EOF with no bytes read (peer close before
/// any data). Errors with `LineTooLong` if the accumulated length exceeds
/// `MAX_LINE_LEN` before a newline is seen.
pub async fn read_line<R>(reader: &mut BufReader<R>) -> Result<Option<String>, ProxyError>
where
    R: tokio::io::AsyncRead + Unpin,
{
    read_line_from(reader).await
}

/// Same as [`read_line`] but works against any buffered reader, not just a
/// freshly-constructed `BufReader` — used when the caller already holds one
/// (e.g. while forwarding a chunked body through the same reader that read
/// the headers).
pub async fn read_line_from<R>(reader: &mut R) -> Result<Option<String>, ProxyError>
where
    R: AsyncBufReadExt + Unpin + ?Sized,
{
    let mut line = Vec::new();
    loop {
        let mut chunk = Vec::new();
        let n = reader.read_until(b'\n', &mut chunk).await?;
        if n == 0 {
            return if line.is_empty() {
                Ok(None)
            } else {
                Ok(Some(finish_line(line)))
            };
        }
        line.extend_from_slice(&chunk);
        if line.len() > MAX_LINE_LEN {
            return Err(ProxyError::LineTooLong);
        }
        if line.last() == Some(&b'\n') {
            return Ok(Some(finish_line(line)));
        }
    }
}

fn finish_line(mut line: Vec<u8>) -> String {
    if line.last() == Some(&b'\n') {
        line.pop();
    }
    if line.last() == Some(&b'\r') {
        line.pop();
    }
    String::from_utf8_lossy(&line).into_owned()
}

pub fn get_peer_ip(addr: SocketAddr) -> String {
    addr.ip().to_string()
}

/// Best-effort reverse DNS (PTR) lookup for ACL hostname-suffix matching.
/// `None` on any failure — ACL hostname rules simply don't match when the
/// peer has no reverse record, same as the original's behavior.
pub async fn reverse_lookup(ip: IpAddr) -> Option<String> {
    tokio::task::spawn_blocking(move || reverse_lookup_blocking(ip))
        .await
        .ok()
        .flatten()
}

fn reverse_lookup_blocking(ip: IpAddr) -> Option<String> {
    use std::os::raw::c_int;

    let sockaddr: SocketAddr = SocketAddr::new(ip, 0);
    let sock2 = socket2::SockAddr::from(sockaddr);
    let mut host = [0 as std::os::raw::c_char; 256];
    let rc = unsafe {
        libc::getnameinfo(
            sock2.as_ptr(),
            sock2.len(),
            host.as_mut_ptr(),
            host.len() as _,
            std::ptr::null_mut(),
            0,
            0 as c_int,
        )
    };
    if rc != 0 {
        return None;
    }
    let cstr = unsafe { std::ffi::CStr::from_ptr(host.as_ptr()) };
    cstr.to_str().ok().map(|s| s.to_string())
}
