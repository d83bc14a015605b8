use std::sync::Arc;
use std::time::Duration;

use dispatcher::{GatewayId, Registry};
use dispatcher_daemon::ingress::{handle_line, serve_ingress, IngressReply};
use serde_json::json;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};

fn registry() -> Registry {
    Registry::with_capacity(1, Duration::from_millis(50))
}

fn code(reply: &IngressReply) -> Option<&str> {
    reply.error.as_ref().map(|err| err.code.as_str())
}

#[tokio::test]
async fn accepted_request_carries_serialized_payload() {
    let registry = registry();
    let mailbox = registry
        .open(GatewayId::new("g1").expect("id"))
        .await
        .mailbox;

    let line = json!({
        "request_id": 9,
        "destination": "g1",
        "payload": {"method": "reboot", "args": [1, 2]}
    })
    .to_string();
    let reply = handle_line(&registry, &line).await;

    assert!(reply.ok);
    assert!(reply.error.is_none());
    let envelope = mailbox.recv().await.expect("queued");
    assert_eq!(envelope.request_id, 9);
    let payload: serde_json::Value = serde_json::from_slice(envelope.payload()).expect("json payload");
    assert_eq!(payload["method"], "reboot");
}

#[tokio::test]
async fn reports_each_failure_kind() {
    let registry = registry();
    registry.open(GatewayId::new("g1").expect("id")).await;

    let reply = handle_line(&registry, "not json").await;
    assert_eq!(code(&reply), Some("BAD_REQUEST"));

    let reply = handle_line(&registry, r#"{"request_id":0,"destination":"g1","payload":1}"#).await;
    assert_eq!(code(&reply), Some("INVALID_ENVELOPE"));

    let reply = handle_line(&registry, r#"{"request_id":1,"destination":"g1","payload":null}"#).await;
    assert_eq!(code(&reply), Some("INVALID_ENVELOPE"));

    let reply = handle_line(&registry, r#"{"request_id":1,"destination":"","payload":1}"#).await;
    assert_eq!(code(&reply), Some("INVALID_ENVELOPE"));

    let reply = handle_line(&registry, r#"{"request_id":1,"destination":"g2","payload":1}"#).await;
    assert_eq!(code(&reply), Some("GATEWAY_NOT_FOUND"));

    let reply = handle_line(&registry, r#"{"request_id":"one","destination":"g1","payload":1}"#).await;
    assert_eq!(code(&reply), Some("BAD_REQUEST"));

    let reply = handle_line(&registry, r#"{"request_id":1,"destination":"g1","payload":1}"#).await;
    assert!(reply.ok);
    let reply = handle_line(&registry, r#"{"request_id":2,"destination":"g1","payload":2}"#).await;
    assert_eq!(code(&reply), Some("BACKPRESSURE"));
}

#[tokio::test]
async fn missing_or_negative_fields_are_invalid_envelopes() {
    let registry = registry();
    let mailbox = registry
        .open(GatewayId::new("g1").expect("id"))
        .await
        .mailbox;

    for line in [
        r#"{"request_id":-1,"destination":"g1","payload":1}"#,
        r#"{"request_id":1,"payload":1}"#,
        r#"{"destination":"g1","payload":1}"#,
        r#"{"request_id":1,"destination":"g1"}"#,
    ] {
        let reply = handle_line(&registry, line).await;
        assert_eq!(code(&reply), Some("INVALID_ENVELOPE"), "line {}", line);
    }
    assert!(mailbox.is_empty().await);
}

#[tokio::test]
async fn serves_json_lines_over_tcp() {
    let registry = Arc::new(registry());
    let mailbox = registry
        .open(GatewayId::new("g1").expect("id"))
        .await
        .mailbox;
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("addr");
    let server = tokio::spawn(serve_ingress(listener, registry.clone()));

    let stream = TcpStream::connect(addr).await.expect("connect");
    let (reader, mut writer) = stream.into_split();
    let mut lines = BufReader::new(reader).lines();

    writer
        .write_all(b"{\"request_id\":1,\"destination\":\"g1\",\"payload\":\"hi\"}\n")
        .await
        .expect("write");
    let reply: IngressReply =
        serde_json::from_str(&lines.next_line().await.expect("read").expect("line")).expect("reply");
    assert!(reply.ok);

    writer
        .write_all(b"{\"request_id\":2,\"destination\":\"nope\",\"payload\":\"hi\"}\n")
        .await
        .expect("write");
    let reply: IngressReply =
        serde_json::from_str(&lines.next_line().await.expect("read").expect("line")).expect("reply");
    assert_eq!(code(&reply), Some("GATEWAY_NOT_FOUND"));

    assert_eq!(mailbox.recv().await.expect("queued").payload(), b"\"hi\"");
    server.abort();
}
