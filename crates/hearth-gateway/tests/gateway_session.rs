//! Integration tests driving a [`hearth_gateway::GatewayConnection`]
//! against an in-process scripted gateway.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};

use hearth_gateway::{GatewayConnection, LinkState, RemoteRegistry};
use hearth_store::TimeseriesStore;

const SENSORS_REPLY: &str = concat!(
    r#"{"type":"sensors","gateway_id":"patio_gw","sensors":["#,
    r#"{"id":"patio_temp","node_id":"patio","name":"Temperature","units":"°F","sensor_class":"BME280","is_local":false}"#,
    r#"]}"#,
    "\n"
);

fn test_registry() -> (tempfile::TempDir, Arc<RemoteRegistry>, Arc<TimeseriesStore>) {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(TimeseriesStore::open(dir.path().join("test.db")).unwrap());
    let registry = Arc::new(RemoteRegistry::new(Arc::clone(&store)));
    (dir, registry, store)
}

/// Reads one line and asserts it carries the expected `type` tag.
async fn expect_line(reader: &mut BufReader<tokio::net::tcp::OwnedReadHalf>, expected: &str) {
    let mut line = String::new();
    let n = tokio::time::timeout(Duration::from_secs(5), reader.read_line(&mut line))
        .await
        .expect("client should send within 5s")
        .unwrap();
    assert!(n > 0, "client hung up before sending {expected}");
    assert!(
        line.contains(&format!("\"type\":\"{expected}\"")),
        "expected {expected}, got {line:?}"
    );
}

/// One scripted session: answer discovery, accept the subscription, send
/// the given extra lines, then drop the connection.
async fn run_scripted_session(stream: TcpStream, extra_lines: &[&str]) {
    let (read_half, mut write_half) = stream.into_split();
    let mut reader = BufReader::new(read_half);

    expect_line(&mut reader, "discover").await;
    write_half.write_all(SENSORS_REPLY.as_bytes()).await.unwrap();

    expect_line(&mut reader, "subscribe").await;
    for line in extra_lines {
        write_half.write_all(line.as_bytes()).await.unwrap();
        write_half.write_all(b"\n").await.unwrap();
    }
    write_half.flush().await.unwrap();
    // Give the client a beat to consume before the drop.
    tokio::time::sleep(Duration::from_millis(50)).await;
}

#[tokio::test]
async fn full_session_stores_readings() {
    let (_dir, registry, store) = test_registry();

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();

    let server = tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        run_scripted_session(
            stream,
            &[
                r#"{"type":"data","readings":[{"id":"patio_temp","value":68.5,"ts":1700000100.0}]}"#,
                // Heartbeat and an unknown type must both be tolerated.
                r#"{"type":"data","readings":[]}"#,
                r#"{"type":"future_extension","x":1}"#,
                "this line is not json",
                r#"{"type":"data","readings":[{"id":"patio_temp","value":69.0,"ts":1700000160.0}]}"#,
            ],
        )
        .await;
    });

    let conn = GatewayConnection::new("127.0.0.1", port, Arc::clone(&registry))
        .with_reconnect_delay(Duration::from_secs(60));
    let handle = conn.start();

    // Wait for both readings to land.
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    loop {
        let rows = store
            .query_range("patio_temp", 0.0, f64::MAX, None)
            .unwrap();
        if rows.len() == 2 {
            break;
        }
        assert!(
            tokio::time::Instant::now() < deadline,
            "readings never arrived"
        );
        tokio::time::sleep(Duration::from_millis(20)).await;
    }

    assert_eq!(conn.gateway_id(), Some("patio_gw".to_string()));
    assert_eq!(registry.current_value("patio_temp"), Some(69.0));

    let desc = store.get_external("patio_temp").unwrap().unwrap();
    assert_eq!(desc.category, "Remote Sensors");
    assert_eq!(desc.gateway, Some("patio_gw".to_string()));

    let rows = store
        .query_range("patio_temp", 0.0, f64::MAX, None)
        .unwrap();
    assert_eq!(rows[0].timestamp, 1_700_000_100.0);
    assert_eq!(rows[1].value, Some(69.0));

    server.await.unwrap();
    conn.stop();
    tokio::time::timeout(Duration::from_secs(3), handle)
        .await
        .expect("connection loop should stop")
        .unwrap();
}

#[tokio::test]
async fn reconnects_after_drop_with_fixed_delay() {
    let (_dir, registry, _store) = test_registry();

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let discoveries = Arc::new(AtomicU32::new(0));

    let server_discoveries = Arc::clone(&discoveries);
    let server = tokio::spawn(async move {
        // Two sessions: the first drops right after the handshake, the
        // second proves the client came back.
        for _ in 0..2 {
            let (stream, _) = listener.accept().await.unwrap();
            run_scripted_session(stream, &[]).await;
            server_discoveries.fetch_add(1, Ordering::SeqCst);
        }
    });

    let conn = GatewayConnection::new("127.0.0.1", port, registry)
        .with_reconnect_delay(Duration::from_millis(100));
    let handle = conn.start();

    tokio::time::timeout(Duration::from_secs(5), server)
        .await
        .expect("client should reconnect within the window")
        .unwrap();
    assert_eq!(discoveries.load(Ordering::SeqCst), 2);

    conn.stop();
    tokio::time::timeout(Duration::from_secs(3), handle)
        .await
        .expect("connection loop should stop")
        .unwrap();
}

#[tokio::test]
async fn malformed_discovery_reply_drops_the_session() {
    let (_dir, registry, _store) = test_registry();

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();

    let server = tokio::spawn(async move {
        // Something that is not a gateway answers first: the client must
        // abandon the session right away instead of waiting out the
        // handshake window, then succeed against the real reply.
        let (stream, _) = listener.accept().await.unwrap();
        let (read_half, mut write_half) = stream.into_split();
        let mut reader = BufReader::new(read_half);
        expect_line(&mut reader, "discover").await;
        write_half.write_all(b"HTTP/1.1 400 Bad Request\n").await.unwrap();
        write_half.flush().await.unwrap();

        let (stream, _) = listener.accept().await.unwrap();
        run_scripted_session(stream, &[]).await;
        // First socket stays open for the whole test; the retry must be
        // driven by the bad reply, not a hangup.
        drop((reader, write_half));
    });

    let conn = GatewayConnection::new("127.0.0.1", port, registry)
        .with_reconnect_delay(Duration::from_millis(100));
    let handle = conn.start();

    // Well under the 30s handshake timeout.
    tokio::time::timeout(Duration::from_secs(5), server)
        .await
        .expect("client should retry immediately after a bad reply")
        .unwrap();
    assert_eq!(conn.gateway_id(), Some("patio_gw".to_string()));

    conn.stop();
    tokio::time::timeout(Duration::from_secs(3), handle)
        .await
        .expect("connection loop should stop")
        .unwrap();
}

#[tokio::test]
async fn stop_interrupts_quiet_stream() {
    let (_dir, registry, _store) = test_registry();

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();

    tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let (read_half, mut write_half) = stream.into_split();
        let mut reader = BufReader::new(read_half);

        expect_line(&mut reader, "discover").await;
        write_half.write_all(SENSORS_REPLY.as_bytes()).await.unwrap();
        expect_line(&mut reader, "subscribe").await;

        // Stay connected but silent until the client goes away.
        let mut line = String::new();
        let _ = reader.read_line(&mut line).await;
    });

    let conn = GatewayConnection::new("127.0.0.1", port, registry);
    let handle = conn.start();

    // Wait until streaming, then stop into a silent connection.
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while conn.state() != LinkState::Streaming {
        assert!(tokio::time::Instant::now() < deadline, "never reached streaming");
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    conn.stop();
    tokio::time::timeout(Duration::from_secs(3), handle)
        .await
        .expect("stop should be observed within the read poll interval")
        .unwrap();
    assert_eq!(conn.state(), LinkState::Disconnected);
}
