//! The daemon loop: the single writer of `DaemonState`.
//!
//! Owns two explicit FIFOs (`event_queue`, `command_queue`) and drives them
//! to empty after every wake-up, per spec's flush_events/flush_commands
//! contract. Never blocks on external I/O itself — it only suspends on the
//! cancellation signal, the shared event channel, the observation channel,
//! or the tick interval.

use std::collections::VecDeque;
use std::time::Duration;

use chrono::Utc;
use dsp_core::{reduce, Command, DaemonState, Event, RotaryConfig, StateBroadcast, VelocityConfig};
use tokio::sync::{mpsc, watch};
use tracing::warn;

pub struct Reactor {
    state: DaemonState,
    vel_cfg: VelocityConfig,
    rotary_cfg: RotaryConfig,
    update_hz: u32,
    event_queue: VecDeque<Event>,
    command_queue: VecDeque<Command>,
    event_rx: mpsc::Receiver<Event>,
    observation_rx: mpsc::Receiver<Event>,
    command_tx: mpsc::Sender<Command>,
    broadcast_tx: mpsc::Sender<StateBroadcast>,
    cancel: watch::Receiver<bool>,
    last_tick_at: chrono::DateTime<Utc>,
}

impl Reactor {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        vel_cfg: VelocityConfig,
        rotary_cfg: RotaryConfig,
        update_hz: u32,
        event_rx: mpsc::Receiver<Event>,
        observation_rx: mpsc::Receiver<Event>,
        command_tx: mpsc::Sender<Command>,
        broadcast_tx: mpsc::Sender<StateBroadcast>,
        cancel: watch::Receiver<bool>,
    ) -> Self {
        let now = Utc::now();
        Reactor {
            state: DaemonState::bootstrap(now, vel_cfg.safe_default_db),
            vel_cfg,
            rotary_cfg,
            update_hz,
            event_queue: VecDeque::new(),
            command_queue: VecDeque::new(),
            event_rx,
            observation_rx,
            command_tx,
            broadcast_tx,
            cancel,
            last_tick_at: now,
        }
    }

    pub async fn run(mut self) {
        let now = Utc::now();
        self.event_queue.push_back(Event::DaemonStarted.timed(now));
        self.drain_observations();
        self.flush_events();
        self.flush_commands();

        let period = Duration::from_secs_f64(1.0 / self.update_hz.max(1) as f64);
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = self.cancel.changed() => {
                    if *self.cancel.borrow() {
                        break;
                    }
                }
                _ = ticker.tick() => {
                    let now = Utc::now();
                    let dt_seconds = (now - self.last_tick_at).num_milliseconds() as f64 / 1000.0;
                    self.last_tick_at = now;
                    self.event_queue.push_back(Event::Tick { now, dt_seconds });
                }
                maybe_event = self.event_rx.recv() => {
                    match maybe_event {
                        Some(event) => self.event_queue.push_back(event),
                        None => break,
                    }
                }
            }

            self.drain_observations();
            self.flush_events();
            self.flush_commands();
        }
    }

    fn drain_observations(&mut self) {
        while let Ok(event) = self.observation_rx.try_recv() {
            self.event_queue.push_back(event);
        }
    }

    fn flush_events(&mut self) {
        while let Some(event) = self.event_queue.pop_front() {
            let state = std::mem::take(&mut self.state);
            let output = reduce(state, event, &self.vel_cfg, &self.rotary_cfg);
            self.state = output.state;
            self.command_queue.extend(output.commands);
            for broadcast in output.broadcasts {
                if self.broadcast_tx.try_send(broadcast).is_err() {
                    warn!("broadcast channel full or closed, dropping state broadcast");
                }
            }
        }
    }

    fn flush_commands(&mut self) {
        while let Some(command) = self.command_queue.pop_front() {
            match self.command_tx.try_send(command) {
                Ok(()) => {}
                Err(mpsc::error::TrySendError::Full(command)) => {
                    self.command_queue.push_front(command);
                    break;
                }
                Err(mpsc::error::TrySendError::Closed(_)) => {
                    warn!("effects worker command channel closed, dropping remaining commands");
                    break;
                }
            }
        }
    }
}
