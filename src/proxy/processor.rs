//! Request-processing state machine (component 4.J): takes an accepted
//! connection from the first request byte through to either a live relay
//! or a rendered HTML error page.
//!
//! The original's state machine is written as one linear function with
//! `goto`-style jumps to a shared error handler; here that collapses into
//! a sequence of `?`-propagating steps plus an explicit `conn.fail()` +
//! early-return at each decision point, which is the idiomatic equivalent.

use super::connection::{Connection, ConnectMethod, Framing, ParsedTarget};
use super::relay;
use crate::config::Config;
use crate::error::ProxyError;
use crate::headers::HeaderMap;
use crate::htmlerror;
use crate::reverse::{self, RewriteOutcome};
use crate::server::ProxyState;
use crate::upstream::{handshake, selector, UpstreamKind, UpstreamRule};
use std::collections::HashSet;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;

/// Hard cap on header lines per request — a lower, resource-exhaustion
/// bound distinct from `HeaderMap::MAX_HEADERS`, applied before a line
/// even reaches the header map.
const MAX_HEADER_LINES: usize = 10_000;

// `transfer-encoding` is deliberately absent: `forward_body` relays a
// chunked body verbatim chunk-by-chunk, so the header that tells the peer
// how to find the end of the body must survive.
const HOP_BY_HOP: &[&str] = &[
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailers",
    "upgrade",
    "proxy-connection",
];

/// Entry point: handle one accepted client connection start to finish.
pub async fn process(mut client: TcpStream, client_addr: SocketAddr, state: Arc<ProxyState>) {
    state.stats.inc_open();
    let result = run(&mut client, client_addr, &state).await;
    state.stats.inc_close();
    if let Err(e) = result {
        tracing::debug!(client = %client_addr, error = %e, "connection ended with error");
    }
}

async fn run(
    client: &mut TcpStream,
    client_addr: SocketAddr,
    state: &Arc<ProxyState>,
) -> Result<(), ProxyError> {
    let config = state.config();
    let mut conn = Connection::new(client_addr);

    // LOOP-CHECK
    if state.loopreg.contains(client_addr) {
        conn.fail(400, "Bad Request", "Proxy loop detected");
        return send_error(client, &conn, &config).await;
    }

    // ACL
    if !config.acl.check(client_addr.ip()).await {
        state.stats.inc_denied();
        conn.fail(403, "Forbidden", "Access denied");
        return send_error(client, &conn, &config).await;
    }

    let mut reader = BufReader::new(&mut *client);

    // REQUEST-LINE
    let request_line = match crate::net::read_line(&mut reader).await? {
        Some(line) if !line.trim().is_empty() => line,
        _ => return Ok(()),
    };
    conn.request_line = request_line.clone();

    // HEADERS (with line-continuation and double-CGI duplicate suppression)
    let mut headers = HeaderMap::new();
    let mut last_key: Option<String> = None;
    let mut line_count = 0usize;
    loop {
        let Some(line) = crate::net::read_line(&mut reader).await? else {
            break;
        };
        if line.is_empty() {
            break;
        }
        line_count += 1;
        if line_count > MAX_HEADER_LINES {
            drop(reader);
            state.stats.inc_badconn();
            conn.fail(400, "Bad Request", "too many header lines");
            return send_error(client, &conn, &config).await;
        }
        if (line.starts_with(' ') || line.starts_with('\t')) && last_key.is_some() {
            let key = last_key.clone().unwrap();
            if let Some(prev) = headers.find(&key).map(str::to_string) {
                let folded = format!("{prev} {}", line.trim());
                headers.set(key, folded);
            }
            continue;
        }
        let Some((key, value)) = split_header(&line) else {
            continue;
        };
        // Some broken CGI gateways emit an identical header twice; drop the
        // exact duplicate instead of forwarding both copies.
        if headers.find(&key) == Some(value.as_str()) {
            continue;
        }
        headers.append(key.clone(), value);
        last_key = Some(key);
    }
    conn.request_headers = headers;

    // PARSE REQUEST LINE
    let Some((method, target, version)) = parse_request_line(&conn.request_line) else {
        drop(reader);
        state.stats.inc_badconn();
        conn.fail(400, "Bad Request", "Malformed request line");
        return send_error(client, &conn, &config).await;
    };
    conn.protocol = version;

    // AUTH
    if config.basicauth.is_configured() {
        let authorized = conn
            .request_headers
            .find("Proxy-Authorization")
            .map(|h| config.basicauth.authenticate(h))
            .unwrap_or(false);
        if !authorized {
            drop(reader);
            state.stats.inc_denied();
            conn.fail(407, "Proxy Authentication Required", "Basic auth required");
            return send_auth_challenge(client, &conn, &config).await;
        }
    }

    if method.eq_ignore_ascii_case("CONNECT") {
        conn.connect_method = ConnectMethod::True;
        drop(reader);
        return handle_connect(client, &mut conn, &target, state, &config).await;
    }

    let target_info = match classify_target(
        &target,
        &conn.request_headers,
        config.transparent,
        config.port,
    ) {
        ClassifyOutcome::Target(t) => t,
        ClassifyOutcome::LoopbackRejected => {
            drop(reader);
            conn.fail(400, "Bad Request", "Refusing to transparently loop back to ourselves");
            return send_error(client, &conn, &config).await;
        }
        ClassifyOutcome::Unsupported => {
            drop(reader);
            conn.fail(501, "Not Implemented", "Request style not supported");
            return send_error(client, &conn, &config).await;
        }
    };

    // STATHOST shortcut
    if let Some(stat_host) = &config.stat_host {
        if target_info.host.eq_ignore_ascii_case(stat_host) {
            drop(reader);
            conn.show_stats = true;
            let page = state.stats.render_page(config.stat_page.as_deref());
            return send_stats(client, &page).await;
        }
    }

    // REVERSE-PROXY REWRITE
    let mut effective_target = target_info.clone();
    if let Some(reverse_cfg) = &config.reverse {
        match reverse::rewrite(&target, &conn.request_headers, reverse_cfg) {
            RewriteOutcome::Redirect { location } => {
                drop(reader);
                return send_redirect(client, &location).await;
            }
            RewriteOutcome::Rewritten { url, cookie_path } => {
                // A reverse rule's target is always configured as an
                // absolute URL, so this always takes the absolute-form
                // branch; fall back to the pre-rewrite target if a rule is
                // ever misconfigured without a scheme.
                effective_target = parse_absolute_url(&url).unwrap_or_else(|| effective_target.clone());
                conn.reverse_path = cookie_path;
            }
            RewriteOutcome::NoMatch => {
                if reverse_cfg.reverse_only {
                    drop(reader);
                    conn.fail(404, "Not Found", "No reverse rule matched this path");
                    return send_error(client, &conn, &config).await;
                }
            }
        }
    }
    conn.target = Some(effective_target.clone());

    // FILTER
    if let Some(filter) = &config.filter {
        let subject = match filter.target() {
            crate::filter::FilterTarget::Domain => effective_target.host.clone(),
            crate::filter::FilterTarget::Url => target.clone(),
        };
        if !filter.allows(&subject) {
            drop(reader);
            state.stats.inc_denied();
            conn.fail(403, "Forbidden", "Blocked by filter");
            return send_error(client, &conn, &config).await;
        }
    }

    // OPEN SERVER CONNECTION
    let upstream_rule = selector::select(&config.upstream_rules, &effective_target.host).await;
    let bind_hint = if config.bind_same {
        Some(client_addr.ip())
    } else {
        None
    };
    let connect_timeout = Duration::from_secs(config.idle_timeout_secs as u64);

    let mut server = match open_server(
        &effective_target.host,
        effective_target.port,
        upstream_rule,
        bind_hint,
        config.port,
        connect_timeout,
        state,
        false,
    )
    .await
    {
        Ok(s) => s,
        Err(e) => {
            drop(reader);
            state.stats.inc_badconn();
            conn.fail(502, "Bad Gateway", &e.to_string());
            return send_error(client, &conn, &config).await;
        }
    };

    // HOP-BY-HOP & VIA, anonymous headers, extra headers
    let mut forward_headers = conn.request_headers.clone();
    strip_hop_by_hop(&mut forward_headers);
    apply_via(&mut forward_headers, &config, conn.protocol);
    forward_headers.set("Host", format_host_port(&effective_target.host, effective_target.port));
    if config.add_x_tinyproxy {
        forward_headers.set("X-Tinyproxy", client_addr.ip().to_string());
    }
    if let Some(allowed) = &config.anonymous_headers {
        restrict_to_anonymous_set(&mut forward_headers, allowed);
    }
    for (k, v) in &config.add_headers {
        forward_headers.append(k.clone(), v.clone());
    }

    // EMIT REQUEST — an HTTP upstream (as opposed to a direct connection or
    // a SOCKS tunnel) needs the absolute-form URI and its own
    // Proxy-Authorization on the real request, per spec.md 4.H/6.
    let is_http_upstream = matches!(upstream_rule, Some(rule) if rule.kind == UpstreamKind::Http);
    if is_http_upstream {
        if let Some(authstr) = upstream_rule.and_then(|rule| rule.authstr.as_ref()) {
            forward_headers.set("Proxy-Authorization", format!("Basic {authstr}"));
        }
    }
    let request_target = if is_http_upstream {
        format!(
            "http://{}{}",
            format_host_port(&effective_target.host, effective_target.port),
            path_or_root(&effective_target.path)
        )
    } else {
        path_or_root(&effective_target.path)
    };
    let mut emitted = format!(
        "{method} {request_target} HTTP/{}.{}\r\n",
        conn.protocol.0, conn.protocol.1
    );
    for (k, v) in forward_headers.iter() {
        emitted.push_str(k);
        emitted.push_str(": ");
        emitted.push_str(v);
        emitted.push_str("\r\n");
    }
    emitted.push_str("\r\n");
    server.write_all(emitted.as_bytes()).await?;

    // FORWARD CLIENT BODY
    conn.client_framing = detect_request_framing(&conn.request_headers);
    forward_body(&mut reader, &mut server, conn.client_framing).await?;
    drop(reader);

    // RESPONSE HEADERS
    let mut server_reader = BufReader::new(&mut server);
    let Some(status_line) = crate::net::read_line(&mut server_reader).await? else {
        state.stats.inc_badconn();
        return Ok(());
    };
    let mut response_headers = HeaderMap::new();
    loop {
        let Some(line) = crate::net::read_line(&mut server_reader).await? else {
            break;
        };
        if line.is_empty() {
            break;
        }
        if let Some((key, value)) = split_header(&line) {
            response_headers.append(key, value);
        }
    }
    let response_framing = detect_response_framing(&status_line, &response_headers);
    strip_hop_by_hop(&mut response_headers);
    apply_via(&mut response_headers, &config, conn.protocol);
    if let Some(reverse_cfg) = &config.reverse {
        if let Some(location) = response_headers.find("Location").map(str::to_string) {
            if let Some(rewritten) = reverse::rewrite_location(&location, reverse_cfg) {
                response_headers.set("Location", rewritten);
            }
        }
    }
    if let Some(cookie_path) = &conn.reverse_path {
        response_headers.append(
            "Set-Cookie",
            format!("{}={}; Path=/", crate::reverse::MAGIC_COOKIE_NAME, cookie_path),
        );
    }

    let mut response_head = format!("{status_line}\r\n");
    for (k, v) in response_headers.iter() {
        response_head.push_str(k);
        response_head.push_str(": ");
        response_head.push_str(v);
        response_head.push_str("\r\n");
    }
    response_head.push_str("\r\n");
    client.write_all(response_head.as_bytes()).await?;

    // RESPONSE BODY + TEARDOWN
    forward_body(&mut server_reader, client, response_framing).await?;
    drop(server_reader);
    let _ = server.shutdown().await;
    let _ = client.shutdown().await;

    Ok(())
}

async fn handle_connect(
    client: &mut TcpStream,
    conn: &mut Connection,
    target: &str,
    state: &Arc<ProxyState>,
    config: &Config,
) -> Result<(), ProxyError> {
    let Some((host, port)) = split_host_port(target, 443) else {
        conn.fail(400, "Bad Request", "Malformed CONNECT target");
        return send_error(client, conn, config).await;
    };

    if !config.connect_ports.is_empty() && !config.connect_ports.contains(&port) {
        state.stats.inc_denied();
        conn.fail(403, "Forbidden", "CONNECT to this port is not permitted");
        return send_error(client, conn, config).await;
    }

    if let Some(filter) = &config.filter {
        if filter.target() == crate::filter::FilterTarget::Domain && !filter.allows(&host) {
            state.stats.inc_denied();
            conn.fail(403, "Forbidden", "Blocked by filter");
            return send_error(client, conn, config).await;
        }
    }

    let upstream_rule = selector::select(&config.upstream_rules, &host).await;
    let bind_hint = if config.bind_same {
        Some(conn.client_addr.ip())
    } else {
        None
    };
    let connect_timeout = Duration::from_secs(config.idle_timeout_secs as u64);

    let mut server = match open_server(
        &host,
        port,
        upstream_rule,
        bind_hint,
        config.port,
        connect_timeout,
        state,
        true,
    )
    .await
    {
        Ok(s) => s,
        Err(e) => {
            state.stats.inc_badconn();
            conn.fail(502, "Bad Gateway", &e.to_string());
            return send_error(client, conn, config).await;
        }
    };

    client
        .write_all(b"HTTP/1.1 200 Connection established\r\n\r\n")
        .await?;

    let idle_timeout = Duration::from_secs(config.idle_timeout_secs as u64);
    let outcome = relay::relay(client, &mut server, idle_timeout).await?;
    tracing::debug!(
        up = outcome.client_to_server_bytes,
        down = outcome.server_to_client_bytes,
        "CONNECT tunnel closed"
    );
    Ok(())
}

/// `is_connect` distinguishes the client's own `CONNECT host:port` (which
/// needs an actual `CONNECT` issued against an `Http`-kind upstream too)
/// from a plain request routed through an `Http`-kind upstream (which
/// instead gets an absolute-form request line and its own
/// `Proxy-Authorization` — built by the caller, not here).
async fn open_server(
    host: &str,
    port: u16,
    upstream_rule: Option<&UpstreamRule>,
    bind_hint: Option<std::net::IpAddr>,
    proxy_port: u16,
    connect_timeout: Duration,
    state: &Arc<ProxyState>,
    is_connect: bool,
) -> Result<TcpStream, ProxyError> {
    match upstream_rule {
        None => {
            crate::net::open_sock(host, port, bind_hint, connect_timeout, proxy_port, &state.loopreg)
                .await
        }
        Some(rule) => {
            let start = std::time::Instant::now();
            let mut stream = crate::net::open_sock(
                &rule.host,
                rule.port,
                bind_hint,
                connect_timeout,
                proxy_port,
                &state.loopreg,
            )
            .await?;
            let kind_label = match rule.kind {
                UpstreamKind::Http => "http",
                UpstreamKind::Socks4 => "socks4",
                UpstreamKind::Socks5 => "socks5",
                UpstreamKind::None => "none",
            };
            match rule.kind {
                UpstreamKind::Http => {
                    if is_connect {
                        handshake::http_connect(&mut stream, host, port, rule).await?
                    }
                }
                UpstreamKind::Socks4 => handshake::socks4a(&mut stream, host, port).await?,
                UpstreamKind::Socks5 => {
                    handshake::socks5(
                        &mut stream,
                        host,
                        port,
                        rule.user.as_deref(),
                        rule.pass.as_deref(),
                    )
                    .await?
                }
                UpstreamKind::None => unreachable!("selector never returns a None-kind rule"),
            }
            crate::metrics::upstream_handshake_duration(kind_label, start.elapsed().as_secs_f64());
            Ok(stream)
        }
    }
}

fn split_header(line: &str) -> Option<(String, String)> {
    let (key, value) = line.split_once(':')?;
    Some((key.trim().to_string(), value.trim().to_string()))
}

fn parse_request_line(line: &str) -> Option<(String, String, (u8, u8))> {
    let mut parts = line.split_whitespace();
    let method = parts.next()?.to_string();
    let target = parts.next()?.to_string();
    let version = parts.next().unwrap_or("HTTP/1.0");
    let version = version.strip_prefix("HTTP/").unwrap_or("1.0");
    let (major, minor) = version.split_once('.').unwrap_or((version, "0"));
    let major = major.parse().unwrap_or(1);
    let minor = minor.parse().unwrap_or(0);
    Some((method, target, (major, minor)))
}

enum ClassifyOutcome {
    Target(ParsedTarget),
    /// Transparent mode derived an origin that loops back to our own
    /// listener.
    LoopbackRejected,
    /// Origin-form target with transparent mode off, or with no usable
    /// `Host:` header.
    Unsupported,
}

/// Classify a non-`CONNECT` request target. Absolute-form (`http://...`)
/// targets are always accepted; origin-form targets (a bare path, relying
/// on the `Host:` header) are only accepted when `transparent` is enabled,
/// matching spec.md 4.J step 9 — otherwise the caller responds `501`.
fn classify_target(
    target: &str,
    headers: &HeaderMap,
    transparent: bool,
    proxy_port: u16,
) -> ClassifyOutcome {
    if let Some(parsed) = parse_absolute_url(target) {
        return ClassifyOutcome::Target(parsed);
    }

    if !transparent {
        return ClassifyOutcome::Unsupported;
    }

    let host_header = headers.find("Host").unwrap_or("");
    if host_header.is_empty() {
        return ClassifyOutcome::Unsupported;
    }
    let (host, port) = split_host_port(host_header, 80).unwrap_or((host_header.to_string(), 80));
    if is_loopback_to_self(&host, port, proxy_port) {
        return ClassifyOutcome::LoopbackRejected;
    }
    ClassifyOutcome::Target(ParsedTarget {
        host,
        port,
        path: target.to_string(),
    })
}

/// Parse an absolute-form URL (`http://host:port/path`) into host/port/path.
/// `None` for anything else, including a bare origin-form path.
fn parse_absolute_url(target: &str) -> Option<ParsedTarget> {
    let rest = target
        .strip_prefix("http://")
        .or_else(|| target.strip_prefix("https://"))?;
    let (authority, path) = match rest.find('/') {
        Some(idx) => (&rest[..idx], rest[idx..].to_string()),
        None => (rest, "/".to_string()),
    };
    let (host, port) = split_host_port(authority, 80).unwrap_or((authority.to_string(), 80));
    Some(ParsedTarget { host, port, path })
}

/// `Host:` derived from the `Host:` header (or, in transparent mode, the
/// lack of one) refers back to this proxy's own listening port.
fn is_loopback_to_self(host: &str, port: u16, proxy_port: u16) -> bool {
    if port != proxy_port {
        return false;
    }
    host.parse::<std::net::IpAddr>()
        .map(|ip| ip.is_loopback())
        .unwrap_or_else(|_| host.eq_ignore_ascii_case("localhost"))
}

fn path_or_root(path: &str) -> String {
    if path.is_empty() {
        "/".to_string()
    } else {
        path.to_string()
    }
}

/// Render `host:port` for the `Host` header / an absolute-form request URI,
/// bracketing bare IPv6 literals and omitting the port when it's the
/// protocol default (80 or 443) — same as the original's `portbuff` logic.
fn format_host_port(host: &str, port: u16) -> String {
    let rendered = if host.parse::<std::net::Ipv6Addr>().is_ok() {
        format!("[{host}]")
    } else {
        host.to_string()
    };
    match port {
        80 | 443 => rendered,
        _ => format!("{rendered}:{port}"),
    }
}

fn split_host_port(authority: &str, default_port: u16) -> Option<(String, u16)> {
    if authority.is_empty() {
        return None;
    }
    if let Some(stripped) = authority.strip_prefix('[') {
        // bracketed IPv6 literal: [::1]:8080
        let (addr, rest) = stripped.split_once(']')?;
        let port = rest
            .strip_prefix(':')
            .and_then(|p| p.parse().ok())
            .unwrap_or(default_port);
        return Some((addr.to_string(), port));
    }
    match authority.rsplit_once(':') {
        Some((host, port)) if port.chars().all(|c| c.is_ascii_digit()) && !port.is_empty() => {
            Some((host.to_string(), port.parse().unwrap_or(default_port)))
        }
        _ => Some((authority.to_string(), default_port)),
    }
}

fn strip_hop_by_hop(headers: &mut HeaderMap) {
    // The `Connection` header may itself list extra hop-by-hop header
    // names to strip (RFC 7230 §6.1). A header literally named
    // `connection` that lists `connection` as a token is the original's
    // "Connection: connection" quirk — handled by simply never removing
    // more than once per name below, since `remove` is idempotent.
    if let Some(conn_header) = headers.find("Connection").map(str::to_string) {
        for token in conn_header.split(',') {
            let token = token.trim();
            if !token.is_empty() {
                headers.remove(token);
            }
        }
    }
    for name in HOP_BY_HOP {
        headers.remove(name);
    }
}

fn apply_via(headers: &mut HeaderMap, config: &Config, protocol: (u8, u8)) {
    if config.disable_via_header {
        return;
    }
    let entry = format!(
        "{}.{} {}",
        protocol.0, protocol.1, config.via_proxy_name
    );
    match headers.find("Via").map(str::to_string) {
        Some(existing) => headers.set("Via", format!("{existing}, {entry}")),
        None => headers.append("Via", entry),
    }
}

/// Anonymous mode: only the configured header names (plus the handful
/// always required to route the request) survive.
fn restrict_to_anonymous_set(headers: &mut HeaderMap, allowed: &HashSet<String>) {
    let always_keep = ["host", "content-length", "content-type"];
    let kept: Vec<(String, String)> = headers
        .iter()
        .filter(|(k, _)| {
            let lower = k.to_ascii_lowercase();
            always_keep.contains(&lower.as_str())
                || allowed.iter().any(|a| a.eq_ignore_ascii_case(k))
        })
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    *headers = HeaderMap::new();
    for (k, v) in kept {
        headers.append(k, v);
    }
}

fn detect_request_framing(headers: &HeaderMap) -> Framing {
    if let Some(te) = headers.find("Transfer-Encoding") {
        if te.eq_ignore_ascii_case("chunked") {
            return Framing::Chunked;
        }
    }
    if let Some(len) = headers.find("Content-Length") {
        return len.parse().map(Framing::Fixed).unwrap_or(Framing::None);
    }
    Framing::None
}

fn detect_response_framing(status_line: &str, headers: &HeaderMap) -> Framing {
    let status: u16 = status_line
        .split_whitespace()
        .nth(1)
        .and_then(|s| s.parse().ok())
        .unwrap_or(200);
    if matches!(status, 100..=199 | 204 | 304) {
        return Framing::None;
    }
    if let Some(te) = headers.find("Transfer-Encoding") {
        if te.eq_ignore_ascii_case("chunked") {
            return Framing::Chunked;
        }
    }
    if let Some(len) = headers.find("Content-Length") {
        return len.parse().map(Framing::Fixed).unwrap_or(Framing::Unknown);
    }
    Framing::Unknown
}

/// Copy a request/response body from `reader` to `writer` according to
/// `framing`. `Chunked` is forwarded verbatim chunk-by-chunk (the proxy
/// never needs to know the decoded length, only where the stream ends).
/// `Unknown` means "until EOF" — the HTTP/1.0, no-`Content-Length` case.
async fn forward_body<R, W>(reader: &mut R, writer: &mut W, framing: Framing) -> Result<(), ProxyError>
where
    R: tokio::io::AsyncBufRead + Unpin,
    W: tokio::io::AsyncWrite + Unpin,
{
    match framing {
        Framing::None => Ok(()),
        Framing::Fixed(len) => {
            let mut remaining = len;
            let mut buf = [0u8; 16 * 1024];
            while remaining > 0 {
                let want = remaining.min(buf.len() as u64) as usize;
                let n = tokio::io::AsyncReadExt::read(reader, &mut buf[..want]).await?;
                if n == 0 {
                    break;
                }
                writer.write_all(&buf[..n]).await?;
                remaining -= n as u64;
            }
            Ok(())
        }
        Framing::Unknown => {
            tokio::io::copy(reader, writer).await?;
            Ok(())
        }
        Framing::Chunked => {
            loop {
                let Some(size_line) = crate::net::read_line_from(reader).await? else {
                    break;
                };
                let size_token = size_line.split(';').next().unwrap_or("").trim();
                let size = usize::from_str_radix(size_token, 16).unwrap_or(0);
                writer.write_all(size_line.as_bytes()).await?;
                writer.write_all(b"\r\n").await?;
                if size == 0 {
                    // trailing headers, terminated by an empty line
                    loop {
                        let Some(trailer) = crate::net::read_line_from(reader).await? else {
                            break;
                        };
                        writer.write_all(trailer.as_bytes()).await?;
                        writer.write_all(b"\r\n").await?;
                        if trailer.is_empty() {
                            break;
                        }
                    }
                    break;
                }
                let mut chunk = vec![0u8; size];
                tokio::io::AsyncReadExt::read_exact(reader, &mut chunk).await?;
                writer.write_all(&chunk).await?;
                // consume the trailing CRLF after the chunk data
                let _ = crate::net::read_line_from(reader).await?;
                writer.write_all(b"\r\n").await?;
            }
            Ok(())
        }
    }
}

async fn send_error(client: &mut TcpStream, conn: &Connection, config: &Config) -> Result<(), ProxyError> {
    let status = conn.error_number.unwrap_or(500);
    let cause = conn.error_cause.clone().unwrap_or_else(|| "Internal Server Error".into());
    let detail = conn.error_detail.clone().unwrap_or_default();
    let vars = htmlerror::error_vars(
        status,
        &cause,
        &detail,
        &conn.request_line,
        &conn.client_addr.ip().to_string(),
    );
    let body = config
        .errorpages
        .get(&status)
        .or(config.default_errorpage.as_ref())
        .map(|tpl| htmlerror::substitute(tpl, &vars))
        .unwrap_or_else(|| htmlerror::default_error_page(&vars));

    let response = format!(
        "HTTP/1.0 {status} {cause}\r\nContent-Type: text/html\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
        body.len()
    );
    client.write_all(response.as_bytes()).await?;
    let _ = client.shutdown().await;
    Ok(())
}

async fn send_auth_challenge(client: &mut TcpStream, conn: &Connection, config: &Config) -> Result<(), ProxyError> {
    let vars = htmlerror::error_vars(
        407,
        "Proxy Authentication Required",
        "Credentials required",
        &conn.request_line,
        &conn.client_addr.ip().to_string(),
    );
    let body = htmlerror::default_error_page(&vars);
    let response = format!(
        "HTTP/1.0 407 Proxy Authentication Required\r\nProxy-Authenticate: Basic realm=\"{}\"\r\nContent-Type: text/html\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
        config.basicauth.realm,
        body.len(),
        body
    );
    client.write_all(response.as_bytes()).await?;
    let _ = client.shutdown().await;
    Ok(())
}

async fn send_stats(client: &mut TcpStream, page: &str) -> Result<(), ProxyError> {
    let response = format!(
        "HTTP/1.0 200 OK\r\nContent-Type: text/html\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
        page.len(),
        page
    );
    client.write_all(response.as_bytes()).await?;
    let _ = client.shutdown().await;
    Ok(())
}

async fn send_redirect(client: &mut TcpStream, location: &str) -> Result<(), ProxyError> {
    let response = format!(
        "HTTP/1.0 301 Moved Permanently\r\nLocation: {location}\r\nContent-Length: 0\r\nConnection: close\r\n\r\n"
    );
    client.write_all(response.as_bytes()).await?;
    let _ = client.shutdown().await;
    Ok(())
}
