//! The broadcaster: the only task that serializes broadcast envelopes.
//! Coalesces `VolumeChanged` broadcasts behind a 50ms timer (latest wins);
//! everything else flushes any pending volume change first, then publishes
//! immediately.

use std::time::Duration;

use chrono::Utc;
use dsp_core::{round_to_0_1, StateBroadcast};
use dsp_proto::SubscriberEnvelope;
use tokio::sync::mpsc;
use tracing::warn;

use crate::hub::HubCommand;

pub async fn run(
    mut broadcast_rx: mpsc::Receiver<StateBroadcast>,
    hub_tx: mpsc::Sender<HubCommand>,
    coalesce_window: Duration,
) {
    let mut pending_volume_db: Option<f64> = None;
    let mut timer = tokio::time::interval(coalesce_window);
    timer.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    // The first tick fires immediately; consume it so the timer behaves as
    // "starts counting from the first pending volume change".
    timer.reset();

    loop {
        tokio::select! {
            maybe_broadcast = broadcast_rx.recv() => {
                match maybe_broadcast {
                    Some(StateBroadcast::VolumeChanged { volume_db, .. }) => {
                        pending_volume_db = Some(round_to_0_1(volume_db));
                    }
                    Some(StateBroadcast::MuteChanged { muted, at }) => {
                        flush_pending(&hub_tx, &mut pending_volume_db).await;
                        let envelope = SubscriberEnvelope::mute_changed(muted, at);
                        publish(&hub_tx, &envelope).await;
                    }
                    None => break,
                }
            }
            _ = timer.tick() => {
                flush_pending(&hub_tx, &mut pending_volume_db).await;
            }
        }
    }
}

async fn flush_pending(hub_tx: &mpsc::Sender<HubCommand>, pending_volume_db: &mut Option<f64>) {
    if let Some(volume_db) = pending_volume_db.take() {
        let envelope = SubscriberEnvelope::volume_changed(volume_db, Utc::now());
        publish(hub_tx, &envelope).await;
    }
}

async fn publish<T: serde::Serialize>(hub_tx: &mpsc::Sender<HubCommand>, envelope: &T) {
    match serde_json::to_vec(envelope) {
        Ok(frame) => {
            if hub_tx.send(HubCommand::Broadcast { frame }).await.is_err() {
                warn!("subscriber hub closed, dropping broadcast");
            }
        }
        Err(err) => warn!("failed to serialize broadcast envelope: {err}"),
    }
}
