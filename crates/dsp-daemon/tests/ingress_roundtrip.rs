//! Integration test for the ingress adapter.
//!
//! Binds a real TCP listener via `dsp_daemon::ingress::run`, connects a plain
//! `TcpStream` as a client would, and checks that a line-delimited JSON
//! message becomes an `Event` on the other end and gets acknowledged.

use dsp_core::Event;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;

async fn free_port() -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    listener.local_addr().unwrap().port()
}

#[tokio::test]
async fn valid_message_reaches_event_channel_and_gets_acked() {
    let port = free_port().await;
    let (event_tx, mut event_rx) = mpsc::channel::<Event>(8);
    tokio::spawn(dsp_daemon::ingress::run(
        "127.0.0.1".to_string(),
        port,
        event_tx,
    ));

    // Give the listener a moment to bind before connecting.
    tokio::time::sleep(std::time::Duration::from_millis(50)).await;

    let stream = TcpStream::connect(("127.0.0.1", port)).await.unwrap();
    let (read_half, mut write_half) = stream.into_split();
    let mut lines = BufReader::new(read_half).lines();

    write_half
        .write_all(br#"{"type":"toggle_mute"}"#)
        .await
        .unwrap();
    write_half.write_all(b"\n").await.unwrap();

    let reply = lines.next_line().await.unwrap().expect("ack line");
    assert_eq!(reply, r#"{"status":"ok"}"#);

    let event = tokio::time::timeout(std::time::Duration::from_secs(1), event_rx.recv())
        .await
        .expect("event arrived in time")
        .expect("channel open");
    assert!(matches!(event, Event::ToggleMute));
}

#[tokio::test]
async fn malformed_message_gets_error_reply_and_is_never_forwarded() {
    let port = free_port().await;
    let (event_tx, mut event_rx) = mpsc::channel::<Event>(8);
    tokio::spawn(dsp_daemon::ingress::run(
        "127.0.0.1".to_string(),
        port,
        event_tx,
    ));

    tokio::time::sleep(std::time::Duration::from_millis(50)).await;

    let stream = TcpStream::connect(("127.0.0.1", port)).await.unwrap();
    let (read_half, mut write_half) = stream.into_split();
    let mut lines = BufReader::new(read_half).lines();

    write_half.write_all(b"not json at all\n").await.unwrap();

    let reply = lines.next_line().await.unwrap().expect("error line");
    assert!(reply.contains(r#""status":"error""#));

    let result = tokio::time::timeout(std::time::Duration::from_millis(200), event_rx.recv()).await;
    assert!(result.is_err(), "malformed input must not reach the event channel");
}
