//! Ingress adapter: a line-delimited JSON TCP listener. Each connection is
//! handled independently; malformed lines get a local error reply and never
//! reach the reducer. Grounded on the per-connection accept loop idiom, with
//! text line framing instead of the length-prefixed binary framing.

use chrono::Utc;
use dsp_proto::protocol::IngressMessage;
use dsp_proto::IngressResponse;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tracing::{error, info, warn};

pub async fn run(bind_address: String, port: u16, event_tx: mpsc::Sender<dsp_core::Event>) {
    let addr = format!("{bind_address}:{port}");
    let listener = match TcpListener::bind(&addr).await {
        Ok(listener) => listener,
        Err(err) => {
            error!("failed to bind ingress listener at {addr}: {err}");
            return;
        }
    };
    info!("ingress listening at {addr}");

    loop {
        match listener.accept().await {
            Ok((stream, peer)) => {
                info!("ingress connection from {peer}");
                let tx = event_tx.clone();
                tokio::spawn(handle_connection(stream, tx));
            }
            Err(err) => {
                error!("ingress accept error: {err}");
            }
        }
    }
}

async fn handle_connection(stream: TcpStream, event_tx: mpsc::Sender<dsp_core::Event>) {
    let (read_half, mut write_half) = stream.into_split();
    let mut lines = BufReader::new(read_half).lines();

    loop {
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => break,
            Err(err) => {
                warn!("ingress read error: {err}");
                break;
            }
        };
        if line.trim().is_empty() {
            continue;
        }

        let response = match serde_json::from_str::<IngressMessage>(&line) {
            Ok(message) => {
                let needs_timestamp = message.needs_timestamp();
                let event = message.into_event();
                let event = if needs_timestamp {
                    event.timed(Utc::now())
                } else {
                    event
                };
                match event_tx.try_send(event) {
                    Ok(()) => IngressResponse::Ok,
                    Err(_) => IngressResponse::Error {
                        error: "event queue full".to_string(),
                    },
                }
            }
            Err(err) => IngressResponse::Error {
                error: err.to_string(),
            },
        };

        let Ok(mut payload) = serde_json::to_vec(&response) else {
            continue;
        };
        payload.push(b'\n');
        if write_half.write_all(&payload).await.is_err() {
            break;
        }
    }
}
