//! Integration test for the DSP effects worker.
//!
//! Runs a mock DSP WebSocket server (a single `accept_async` connection that
//! echoes canned replies) and drives `dsp_daemon::dsp_client::run` against it
//! over a real loopback socket, the same way `latency_integration.rs` drives
//! its pipeline against a mock server instead of stubbing the transport.

use std::time::Duration;

use dsp_core::{Command, Event};
use dsp_daemon::dsp_client::{self, DspClientConfig};
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message as WsMessage;

async fn spawn_mock_dsp_server() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();
        while let Some(Ok(WsMessage::Text(text))) = ws.next().await {
            let reply = if text.contains("GetVolume") {
                r#"{"GetVolume":{"result":"ok","value":-12.5}}"#
            } else if text.contains("ToggleMute") {
                r#"{"ToggleMute":{"result":"ok","value":true}}"#
            } else {
                r#"{"SetVolume":{"result":"ok"}}"#
            };
            if ws.send(WsMessage::Text(reply.to_string())).await.is_err() {
                break;
            }
        }
    });

    format!("ws://{addr}/ws")
}

#[tokio::test]
async fn get_volume_round_trips_into_an_observation_event() {
    let url = spawn_mock_dsp_server().await;
    let config = DspClientConfig {
        url,
        read_timeout: Duration::from_secs(2),
        reconnect_delay: Duration::from_millis(50),
    };

    let (command_tx, command_rx) = mpsc::channel::<Command>(4);
    let (observation_tx, mut observation_rx) = mpsc::channel::<Event>(4);
    tokio::spawn(dsp_client::run(config, command_rx, observation_tx));

    command_tx.send(Command::GetVolume).await.unwrap();

    let event = tokio::time::timeout(Duration::from_secs(2), observation_rx.recv())
        .await
        .expect("observation arrived in time")
        .expect("channel open");

    match event {
        Event::DspVolumeObserved { db, .. } => assert!((db - (-12.5)).abs() < f64::EPSILON),
        other => panic!("unexpected event: {other:?}"),
    }
}

#[tokio::test]
async fn toggle_mute_round_trips_into_an_observation_event() {
    let url = spawn_mock_dsp_server().await;
    let config = DspClientConfig {
        url,
        read_timeout: Duration::from_secs(2),
        reconnect_delay: Duration::from_millis(50),
    };

    let (command_tx, command_rx) = mpsc::channel::<Command>(4);
    let (observation_tx, mut observation_rx) = mpsc::channel::<Event>(4);
    tokio::spawn(dsp_client::run(config, command_rx, observation_tx));

    command_tx.send(Command::ToggleMute).await.unwrap();

    let event = tokio::time::timeout(Duration::from_secs(2), observation_rx.recv())
        .await
        .expect("observation arrived in time")
        .expect("channel open");

    match event {
        Event::DspMuteObserved { muted, .. } => assert!(muted),
        other => panic!("unexpected event: {other:?}"),
    }
}
