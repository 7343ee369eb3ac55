//! Plain GET routed through an `Http`-kind upstream: the request line sent
//! to the upstream is absolute-form (not a `CONNECT`), and it carries its
//! own `Proxy-Authorization` built from the rule's credentials.

mod support;

use support::*;
use tinyrelay::upstream::{DomainFilter, UpstreamKind, UpstreamRule};
use tokio::io::{AsyncWriteExt, BufReader};
use tokio::net::TcpStream;

#[tokio::test]
async fn plain_request_through_http_upstream_uses_absolute_form_and_proxy_auth() {
    let (upstream_addr, upstream_listener) = spawn_fake_server();

    let config = {
        let mut cfg = base_config();
        cfg.upstream_rules = vec![UpstreamRule::new(
            UpstreamKind::Http,
            "127.0.0.1".to_string(),
            upstream_addr.port(),
            Some("bob".to_string()),
            Some("hunter2".to_string()),
            None::<DomainFilter>,
        )];
        cfg
    };
    let (proxy_addr, _state) = spawn_proxy(config).await;

    let upstream_task = tokio::spawn(async move {
        let (mut stream, _) = upstream_listener.accept().await.expect("accept upstream conn");
        let mut reader = BufReader::new(&mut stream);
        let (request_line, headers) = read_head(&mut reader).await;

        // Not a CONNECT: the real request, in absolute form.
        assert!(
            request_line.starts_with("GET http://origin.internal/page HTTP/1."),
            "{request_line}"
        );
        // base64("bob:hunter2")
        assert_eq!(
            header(&headers, "Proxy-Authorization"),
            Some("Basic Ym9iOmh1bnRlcjI=")
        );
        assert_eq!(header(&headers, "Host"), Some("origin.internal"));

        stream
            .write_all(b"HTTP/1.1 200 OK\r\nContent-Length: 2\r\n\r\nok")
            .await
            .expect("write response");
    });

    let mut client = TcpStream::connect(proxy_addr).await.expect("connect to proxy");
    client
        .write_all(b"GET http://origin.internal/page HTTP/1.1\r\nHost: origin.internal\r\n\r\n")
        .await
        .expect("send request");

    let mut reader = BufReader::new(&mut client);
    let (status_line, _headers) = read_head(&mut reader).await;
    assert!(status_line.starts_with("HTTP/1.1 200"));

    upstream_task.await.expect("upstream task panicked");
}
