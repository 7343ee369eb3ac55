//! ACL deny rejects before any upstream connection is attempted.

mod support;

use support::*;
use tinyrelay::acl::{Acl, AclRule, Action, HostSpec};
use tokio::io::{AsyncWriteExt, BufReader};
use tokio::net::TcpStream;

#[tokio::test]
async fn acl_deny_returns_403() {
    let mut config = base_config();
    config.acl = Acl::new(vec![AclRule {
        action: Action::Deny,
        host: HostSpec::parse("127.0.0.1/32"),
    }]);
    let (proxy_addr, _state) = spawn_proxy(config).await;

    let mut client = TcpStream::connect(proxy_addr).await.expect("connect to proxy");
    client
        .write_all(b"GET http://example.test/ HTTP/1.1\r\nHost: example.test\r\n\r\n")
        .await
        .expect("send request");
    let mut reader = BufReader::new(&mut client);
    let status_line = read_line(&mut reader).await;
    assert!(status_line.starts_with("HTTP/1.0 403"), "{status_line}");
}
