//! Integration tests for the TCP transport.
//!
//! These bind real sockets on loopback and drive them with a plain
//! `TcpStream` client, the same way the proxy sees its clients.

use metro_proxy_transport::{
    read_request_head, TcpTransport, TransportError, MAX_HEAD_BYTES,
};
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;

#[tokio::test]
async fn test_accept_assigns_increasing_ids() {
    let transport = TcpTransport::bind("127.0.0.1:0").await.expect("should bind");
    let addr = transport.local_addr().unwrap();

    let _a = TcpStream::connect(addr).await.unwrap();
    let first = transport.accept().await.expect("should accept");
    let _b = TcpStream::connect(addr).await.unwrap();
    let second = transport.accept().await.expect("should accept");

    assert!(second.id.into_inner() > first.id.into_inner());
    assert_eq!(first.peer.ip(), addr.ip());
}

#[tokio::test]
async fn test_bind_conflict_is_bind_failed() {
    let transport = TcpTransport::bind("127.0.0.1:0").await.unwrap();
    let addr = transport.local_addr().unwrap().to_string();

    let err = TcpTransport::bind(&addr).await.unwrap_err();
    assert!(matches!(err, TransportError::BindFailed { .. }));
    assert!(err.to_string().contains(&addr));
}

#[tokio::test]
async fn test_sniff_head_split_across_writes() {
    let transport = TcpTransport::bind("127.0.0.1:0").await.unwrap();
    let addr = transport.local_addr().unwrap();

    let client = tokio::spawn(async move {
        let mut stream = TcpStream::connect(addr).await.unwrap();
        stream.write_all(b"GET /index.bundle HT").await.unwrap();
        stream.flush().await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        stream.write_all(b"TP/1.1\r\nHost: x\r\n\r\n").await.unwrap();
        stream
    });

    let mut conn = transport.accept().await.unwrap();
    let sniffed = read_request_head(&mut conn.stream, MAX_HEAD_BYTES)
        .await
        .unwrap()
        .expect("head");
    assert_eq!(sniffed.head.path, "/index.bundle");
    drop(client.await.unwrap());
}
