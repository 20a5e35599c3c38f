//! Subscriber hub: tracks subscriber send queues and evicts slow consumers.
//! Register/unregister/broadcast are serialized through a single task, per
//! spec.md §4.6 — grounded on the `Arc<RwLock<Vec<ClientHandle>>>` client
//! registry idiom, rebuilt as an owned task-local map instead of a shared lock
//! since only this task ever mutates the subscriber set.

use std::collections::HashMap;

use axum::extract::ws::{Message as WsMessage, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use dsp_core::Event;
use futures_util::{SinkExt, StreamExt};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::{mpsc, oneshot};
use tracing::{error, info, warn};

pub enum HubCommand {
    Register { id: u64, tx: mpsc::Sender<Vec<u8>> },
    Unregister { id: u64 },
    Broadcast { frame: Vec<u8> },
}

pub async fn run(mut hub_rx: mpsc::Receiver<HubCommand>) {
    let mut subscribers: HashMap<u64, mpsc::Sender<Vec<u8>>> = HashMap::new();

    while let Some(command) = hub_rx.recv().await {
        match command {
            HubCommand::Register { id, tx } => {
                subscribers.insert(id, tx);
            }
            HubCommand::Unregister { id } => {
                subscribers.remove(&id);
            }
            HubCommand::Broadcast { frame } => {
                let mut slow = Vec::new();
                for (&id, tx) in subscribers.iter() {
                    if tx.try_send(frame.clone()).is_err() {
                        slow.push(id);
                    }
                }
                for id in slow {
                    warn!("evicting slow subscriber {id}");
                    subscribers.remove(&id);
                }
            }
        }
    }
}

#[derive(Clone)]
struct HubState {
    hub_tx: mpsc::Sender<HubCommand>,
    event_tx: mpsc::Sender<Event>,
    next_id: Arc<AtomicU64>,
    queue_depth: usize,
}

pub fn router(
    hub_tx: mpsc::Sender<HubCommand>,
    event_tx: mpsc::Sender<Event>,
    queue_depth: usize,
) -> Router {
    let state = HubState {
        hub_tx,
        event_tx,
        next_id: Arc::new(AtomicU64::new(1)),
        queue_depth,
    };
    Router::new().route("/ws", get(ws_handler)).with_state(state)
}

pub async fn serve(bind_address: String, port: u16, router: Router) {
    let addr = format!("{bind_address}:{port}");
    let listener = match TcpListener::bind(&addr).await {
        Ok(listener) => listener,
        Err(err) => {
            error!("failed to bind subscriber hub at {addr}: {err}");
            return;
        }
    };
    info!("subscriber hub listening at {addr}");
    if let Err(err) = axum::serve(listener, router).await {
        error!("subscriber hub server error: {err}");
    }
}

async fn ws_handler(ws: WebSocketUpgrade, State(state): State<HubState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: HubState) {
    let (mut sender, mut receiver) = socket.split();

    let (reply_sink, reply_rx) = oneshot::channel();
    if state
        .event_tx
        .send(Event::RequestStateSnapshot { reply_sink })
        .await
        .is_err()
    {
        warn!("event channel closed, dropping new subscriber");
        return;
    }

    let snapshot = match tokio::time::timeout(Duration::from_secs(1), reply_rx).await {
        Ok(Ok(snapshot)) => snapshot,
        Ok(Err(_)) => {
            warn!("snapshot reply sink dropped, dropping new subscriber");
            return;
        }
        Err(_) => {
            warn!("snapshot wait timed out, dropping new subscriber");
            return;
        }
    };

    let (outbound_tx, mut outbound_rx) = mpsc::channel::<Vec<u8>>(state.queue_depth);

    let envelope = dsp_proto::SubscriberEnvelope::state_init(&snapshot, chrono::Utc::now());
    let Ok(frame) = serde_json::to_vec(&envelope) else {
        return;
    };
    if outbound_tx.try_send(frame).is_err() {
        warn!("failed to queue state_init for new subscriber");
        return;
    }

    let id = state.next_id.fetch_add(1, Ordering::Relaxed);
    if state
        .hub_tx
        .send(HubCommand::Register { id, tx: outbound_tx })
        .await
        .is_err()
    {
        warn!("subscriber hub closed, dropping new subscriber");
        return;
    }

    loop {
        tokio::select! {
            frame = outbound_rx.recv() => {
                match frame {
                    Some(frame) => {
                        if sender.send(WsMessage::Text(String::from_utf8_lossy(&frame).into_owned())).await.is_err() {
                            break;
                        }
                    }
                    None => break,
                }
            }
            incoming = receiver.next() => {
                match incoming {
                    Some(Ok(WsMessage::Close(_))) | Some(Err(_)) | None => break,
                    _ => {}
                }
            }
        }
    }

    let _ = state.hub_tx.send(HubCommand::Unregister { id }).await;
}
