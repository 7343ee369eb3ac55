//! `CONNECT` tunneling: an allowed port relays bytes opaquely end to end,
//! a disallowed port is rejected with 403 before any upstream connection
//! is attempted.

mod support;

use support::*;
use tinyrelay::config::Config;
use tokio::io::{AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;

#[tokio::test]
async fn connect_to_allowed_port_tunnels_bytes_then_denies_other_ports() {
    let (origin_addr, origin_listener) = spawn_fake_server();

    let mut raw = base_raw();
    raw.connect_ports = vec![origin_addr.port()];
    let config = Config::from_raw(raw).expect("valid config");
    let (proxy_addr, _state) = spawn_proxy(config).await;

    let origin_task = tokio::spawn(async move {
        let (mut stream, _) = origin_listener.accept().await.expect("accept tunneled conn");
        let mut buf = [0u8; 5];
        stream.read_exact(&mut buf).await.expect("read tunneled bytes");
        assert_eq!(&buf, b"hello");
        stream.write_all(b"world").await.expect("write reply");
    });

    let mut client = TcpStream::connect(proxy_addr).await.expect("connect to proxy");
    let connect_req = format!("CONNECT 127.0.0.1:{} HTTP/1.1\r\n\r\n", origin_addr.port());
    client.write_all(connect_req.as_bytes()).await.expect("send CONNECT");

    let mut reader = BufReader::new(&mut client);
    let status_line = read_line(&mut reader).await;
    assert!(status_line.starts_with("HTTP/1.1 200"));
    // drain the blank line terminating the CONNECT response headers
    let blank = read_line(&mut reader).await;
    assert!(blank.is_empty());

    client.write_all(b"hello").await.expect("send tunneled bytes");
    let mut reply = [0u8; 5];
    client.read_exact(&mut reply).await.expect("read tunneled reply");
    assert_eq!(&reply, b"world");

    origin_task.await.expect("origin task panicked");

    // A second connection attempting CONNECT to a non-allowed port is
    // rejected up front.
    let mut denied_client = TcpStream::connect(proxy_addr).await.expect("connect to proxy again");
    let denied_req = "CONNECT 127.0.0.1:1 HTTP/1.1\r\n\r\n";
    denied_client
        .write_all(denied_req.as_bytes())
        .await
        .expect("send disallowed CONNECT");
    let mut denied_reader = BufReader::new(&mut denied_client);
    let denied_status = read_line(&mut denied_reader).await;
    assert!(denied_status.starts_with("HTTP/1.0 403"), "{denied_status}");
}
