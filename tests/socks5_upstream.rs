//! Plain HTTP request routed through a SOCKS5 upstream with username/
//! password auth: the fake upstream validates the exact handshake bytes
//! (RFC 1929) before replying as if it were the origin.

mod support;

use support::*;
use tinyrelay::upstream::{DomainFilter, UpstreamKind, UpstreamRule};
use tokio::io::{AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;

#[tokio::test]
async fn socks5_upstream_handshake_is_byte_exact_then_forwards_request() {
    let (upstream_addr, upstream_listener) = spawn_fake_server();

    let config = {
        let mut cfg = base_config();
        cfg.upstream_rules = vec![UpstreamRule::new(
            UpstreamKind::Socks5,
            "127.0.0.1".to_string(),
            upstream_addr.port(),
            Some("alice".to_string()),
            Some("secret".to_string()),
            None::<DomainFilter>,
        )];
        cfg
    };
    let (proxy_addr, _state) = spawn_proxy(config).await;

    let upstream_task = tokio::spawn(async move {
        let (mut stream, _) = upstream_listener.accept().await.expect("accept upstream conn");

        // Greeting: version 5, 2 methods offered (no-auth, user/pass).
        let mut greeting = [0u8; 4];
        stream.read_exact(&mut greeting).await.expect("read greeting");
        assert_eq!(greeting[0], 0x05);
        assert_eq!(greeting[1], 0x02);
        assert_eq!(&greeting[2..4], &[0x00, 0x02]);
        // Select username/password auth.
        stream.write_all(&[0x05, 0x02]).await.expect("write method select");

        // Auth sub-negotiation: ver=1, ulen, "alice", plen, "secret".
        let mut auth_head = [0u8; 2];
        stream.read_exact(&mut auth_head).await.expect("read auth header");
        assert_eq!(auth_head[0], 0x01);
        let ulen = auth_head[1] as usize;
        let mut user = vec![0u8; ulen];
        stream.read_exact(&mut user).await.expect("read username");
        assert_eq!(user, b"alice");
        let mut plen_byte = [0u8; 1];
        stream.read_exact(&mut plen_byte).await.expect("read pass len");
        let mut pass = vec![0u8; plen_byte[0] as usize];
        stream.read_exact(&mut pass).await.expect("read password");
        assert_eq!(pass, b"secret");
        stream.write_all(&[0x01, 0x00]).await.expect("write auth ok");

        // CONNECT request: ver=5, cmd=1, rsv=0, atyp=3 (domain), len, host, port.
        let mut connect_head = [0u8; 5];
        stream.read_exact(&mut connect_head).await.expect("read connect header");
        assert_eq!(connect_head[0], 0x05);
        assert_eq!(connect_head[1], 0x01);
        assert_eq!(connect_head[3], 0x03);
        let host_len = connect_head[4] as usize;
        let mut host = vec![0u8; host_len + 2];
        stream.read_exact(&mut host).await.expect("read host+port");
        assert_eq!(&host[..host_len], b"origin.internal");

        // Reply: success, bound address 0.0.0.0:0.
        stream
            .write_all(&[0x05, 0x00, 0x00, 0x01, 0, 0, 0, 0, 0, 0])
            .await
            .expect("write connect reply");

        let mut reader = BufReader::new(&mut stream);
        let (request_line, headers) = read_head(&mut reader).await;
        assert!(request_line.starts_with("GET / HTTP/1."));
        assert_eq!(header(&headers, "Host"), Some("origin.internal"));

        stream
            .write_all(b"HTTP/1.1 200 OK\r\nContent-Length: 2\r\n\r\nok")
            .await
            .expect("write response");
    });

    let mut client = TcpStream::connect(proxy_addr).await.expect("connect to proxy");
    client
        .write_all(b"GET http://origin.internal/ HTTP/1.1\r\nHost: origin.internal\r\n\r\n")
        .await
        .expect("send request");

    let mut reader = BufReader::new(&mut client);
    let (status_line, headers) = read_head(&mut reader).await;
    assert!(status_line.starts_with("HTTP/1.1 200"));
    let len: usize = header(&headers, "Content-Length").unwrap().parse().unwrap();
    let mut body = vec![0u8; len];
    reader.read_exact(&mut body).await.expect("read body");
    assert_eq!(body, b"ok");

    upstream_task.await.expect("upstream task panicked");
}
