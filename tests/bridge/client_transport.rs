//! Client behavior against live and misbehaving backends.

use std::net::TcpListener;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde_json::json;

use dcc_bridge::client::{ClientConfig, SocketClient};
use dcc_bridge::protocol::{CommandParams, Envelope};

use crate::common;

#[tokio::test]
async fn test_ping_against_live_host() {
    let handle = common::start_host("modeler");
    let client = SocketClient::new(common::client_config(handle.local_addr()));

    let envelope = client.send_command("ping", CommandParams::new()).await;
    match envelope {
        Envelope::Result { result, id } => {
            assert_eq!(result["status"], "pong");
            assert_eq!(id.as_deref(), Some("1"));
        }
        other => panic!("expected result envelope, got {:?}", other),
    }

    client.disconnect().await;
    handle.shutdown();
}

#[tokio::test]
async fn test_backend_error_is_returned_not_retried() {
    let handle = common::start_host("modeler");
    let client = SocketClient::new(common::client_config(handle.local_addr()));

    let envelope = client.send_command("reject", CommandParams::new()).await;
    match envelope {
        Envelope::Error { error, id } => {
            assert_eq!(error.code, "VALIDATION_ERROR");
            assert_eq!(id.as_deref(), Some("1"));
        }
        other => panic!("expected error envelope, got {:?}", other),
    }
    // The connection survived the backend-reported failure.
    assert!(client.is_connected().await);

    client.disconnect().await;
    handle.shutdown();
}

/// A backend that accepts and immediately drops every connection forces the
/// client through its whole retry budget; the accept count is the number of
/// connection attempts made.
#[tokio::test]
async fn test_retry_exhaustion_counts_connection_attempts() {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    let accepted = Arc::new(AtomicUsize::new(0));

    let counter = Arc::clone(&accepted);
    let acceptor = std::thread::spawn(move || {
        // One extra accept slot so a buggy fourth attempt would be counted.
        for _ in 0..4 {
            match listener.accept() {
                Ok((stream, _)) => {
                    counter.fetch_add(1, Ordering::SeqCst);
                    drop(stream);
                }
                Err(_) => break,
            }
        }
    });

    let client = SocketClient::new(ClientConfig {
        host: "127.0.0.1".to_string(),
        port: addr.port(),
        timeout: Duration::from_millis(500),
        retry_attempts: 3,
        retry_delay: Duration::from_millis(0),
    });

    let envelope = client.send_command("ping", CommandParams::new()).await;
    match envelope {
        Envelope::Error { error, .. } => {
            assert_eq!(error.code, "CONNECTION_ERROR");
            assert_eq!(error.details["attempts"], 3);
        }
        other => panic!("expected error envelope, got {:?}", other),
    }
    assert_eq!(accepted.load(Ordering::SeqCst), 3);

    drop(acceptor);
}

#[tokio::test]
async fn test_concurrent_calls_are_serialized() {
    let handle = common::start_host("modeler");
    let client = Arc::new(SocketClient::new(common::client_config(
        handle.local_addr(),
    )));

    let mut tasks = Vec::new();
    for i in 0..4u32 {
        let client = Arc::clone(&client);
        tasks.push(tokio::spawn(async move {
            let mut params = CommandParams::new();
            params.insert("seq".to_string(), json!(i));
            (i, client.send_command("echo", params).await)
        }));
    }

    for task in tasks {
        let (i, envelope) = task.await.unwrap();
        match envelope {
            // Each caller gets the echo of its own params; interleaved
            // request/response lines would mismatch them.
            Envelope::Result { result, .. } => assert_eq!(result["seq"], i),
            other => panic!("expected result envelope, got {:?}", other),
        }
    }

    client.disconnect().await;
    handle.shutdown();
}

#[tokio::test]
async fn test_client_reconnects_after_disconnect() {
    let handle = common::start_host("modeler");
    let client = SocketClient::new(common::client_config(handle.local_addr()));

    assert!(client.connect().await);
    client.disconnect().await;
    assert!(!client.is_connected().await);

    // send_command re-establishes the connection on its own.
    let envelope = client.send_command("ping", CommandParams::new()).await;
    assert!(envelope.is_success());
    assert!(client.is_connected().await);

    client.disconnect().await;
    handle.shutdown();
}
