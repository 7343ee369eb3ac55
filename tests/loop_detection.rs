//! A connection whose local address was previously recorded as one the
//! proxy itself opened (the loop registry) is refused with 400, rather
//! than being forwarded.

mod support;

use support::*;
use tokio::io::{AsyncWriteExt, BufReader};
use tokio::net::TcpStream;

#[tokio::test]
async fn pre_seeded_loop_registry_entry_returns_400() {
    let (proxy_addr, state) = spawn_proxy(base_config()).await;

    let mut client = TcpStream::connect(proxy_addr).await.expect("connect to proxy");
    let local_addr = client.local_addr().expect("local addr");
    state.loopreg.add(local_addr);

    client
        .write_all(b"GET http://example.test/ HTTP/1.1\r\nHost: example.test\r\n\r\n")
        .await
        .expect("send request");
    let mut reader = BufReader::new(&mut client);
    let status_line = read_line(&mut reader).await;
    assert!(status_line.starts_with("HTTP/1.0 400"), "{status_line}");
}
