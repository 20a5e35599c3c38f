//! `reduce` — the pure event/command/broadcast transition function.

use chrono::{DateTime, Utc};

use crate::config::{RotaryConfig, VelocityConfig};
use crate::controller;
#[cfg(test)]
use crate::event::FailedCommand;
use crate::event::{Command, Event, StateBroadcast, StateSnapshot, VolumeOrigin};
use crate::state::{DaemonState, RotarySample};

/// Output of a single reduction: the next state plus any commands and
/// broadcasts that should be dispatched as a result.
#[derive(Debug, Default)]
pub struct ReduceOutput {
    pub state: DaemonState,
    pub commands: Vec<Command>,
    pub broadcasts: Vec<StateBroadcast>,
}

/// Rounds to one decimal place, the precision used for broadcast payloads
/// and change-detection gating. Internal state always keeps full precision.
pub fn round_to_0_1(db: f64) -> f64 {
    (db * 10.0).round() / 10.0
}

/// Consumes one event, returning the next state and any commands/broadcasts
/// to dispatch. No wall-clock reads, no I/O, no mutation outside the
/// returned value.
pub fn reduce(
    state: DaemonState,
    event: Event,
    vel_cfg: &VelocityConfig,
    rotary_cfg: &RotaryConfig,
) -> ReduceOutput {
    match event {
        Event::TimedEvent { inner, at } => reduce_timed(state, *inner, at, vel_cfg, rotary_cfg),
        Event::DaemonStarted => reduce_daemon_started(state),
        Event::Tick { now, dt_seconds } => reduce_tick(state, now, dt_seconds, vel_cfg),
        Event::DspVolumeObserved { db, at } => reduce_dsp_volume_observed(state, db, at),
        Event::DspMuteObserved { muted, at } => reduce_dsp_mute_observed(state, muted, at),
        Event::DspConfigFilePathObserved { path, at } => {
            reduce_dsp_config_path_observed(state, path, at)
        }
        Event::DspProcessingStateObserved { state: proc, at } => {
            reduce_dsp_processing_observed(state, proc, at)
        }
        Event::DspCommandFailed { .. } => ReduceOutput {
            state,
            ..Default::default()
        },
        Event::RequestStateSnapshot { reply_sink } => reduce_request_snapshot(state, reply_sink),
        // Bare (unwrapped) gesture events are no-ops by design: VolumeHeld and
        // RotaryTurn require a TimedEvent wrapper to carry a timestamp.
        Event::VolumeHeld { .. } | Event::RotaryTurn { .. } => ReduceOutput {
            state,
            ..Default::default()
        },
        // These require no timestamp and can be reduced whether or not a
        // caller bothered to wrap them.
        Event::VolumeRelease => reduce_volume_release(state),
        Event::ToggleMute => reduce_toggle_mute(state),
        Event::VolumeStep { steps, db_per_step } => {
            reduce_volume_step(state, steps, db_per_step, vel_cfg)
        }
        Event::SetVolumeAbsolute { db, origin } => {
            reduce_set_volume_absolute(state, db, origin, vel_cfg)
        }
        // Carried through for future policy; no state transition in this core.
        Event::MediaPlayPause
        | Event::MediaNext
        | Event::MediaPrevious
        | Event::MediaPlay
        | Event::MediaPause
        | Event::MediaStop
        | Event::LibrespotSessionConnected
        | Event::LibrespotSessionDisconnected
        | Event::LibrespotVolumeChanged { .. }
        | Event::LibrespotTrackChanged { .. }
        | Event::LibrespotPlaybackState { .. }
        | Event::PlexStateChanged { .. } => ReduceOutput {
            state,
            ..Default::default()
        },
    }
}

/// Unwraps a `TimedEvent`, dispatching with `at` available for the variants
/// that require a timestamp (`VolumeHeld`, `RotaryTurn`, `VolumeStep`,
/// `SetVolumeAbsolute`, and — harmlessly — anything else wrapped by the loop).
fn reduce_timed(
    state: DaemonState,
    inner: Event,
    at: DateTime<Utc>,
    vel_cfg: &VelocityConfig,
    rotary_cfg: &RotaryConfig,
) -> ReduceOutput {
    match inner {
        Event::VolumeHeld { direction } => reduce_volume_held(state, direction, at),
        Event::RotaryTurn { steps } => reduce_rotary_turn(state, steps, at, vel_cfg, rotary_cfg),
        Event::VolumeStep { steps, db_per_step } => {
            reduce_volume_step(state, steps, db_per_step, vel_cfg)
        }
        Event::SetVolumeAbsolute { db, origin } => {
            reduce_set_volume_absolute(state, db, origin, vel_cfg)
        }
        other => reduce(state, other, vel_cfg, rotary_cfg),
    }
}

fn reduce_daemon_started(state: DaemonState) -> ReduceOutput {
    ReduceOutput {
        state,
        commands: vec![
            Command::GetVolume,
            Command::GetMute,
            Command::GetConfigFilePath,
            Command::GetProcessingState,
        ],
        broadcasts: vec![],
    }
}

fn reduce_tick(mut state: DaemonState, now: DateTime<Utc>, dt: f64, vel_cfg: &VelocityConfig) -> ReduceOutput {
    let baseline = state
        .intent
        .desired_volume_db
        .or(state.dsp.volume.known.then_some(state.dsp.volume.value))
        .unwrap_or(state.controller.target_db);

    state.controller = controller::step(&state.controller, baseline, dt, now, vel_cfg);
    if state.controller.held_direction != 0 {
        state.intent.desired_volume_db = Some(state.controller.target_db);
    }

    let mut commands = Vec::new();

    if state.intent.mute_toggle_pending {
        commands.push(Command::ToggleMute);
        state.intent.mute_toggle_pending = false;
    }
    if let Some(muted) = state.intent.desired_mute.take() {
        commands.push(Command::SetMute { muted });
    }
    if let Some(desired) = state.intent.desired_volume_db.take() {
        let needs_command = !state.dsp.volume.known
            || (desired - state.dsp.volume.value).abs() >= vel_cfg.volume_update_threshold_db;
        if needs_command {
            commands.push(Command::SetVolume { target_db: desired });
        }
    }

    ReduceOutput {
        state,
        commands,
        broadcasts: vec![],
    }
}

fn reduce_rotary_turn(
    mut state: DaemonState,
    steps: i32,
    at: DateTime<Utc>,
    vel_cfg: &VelocityConfig,
    rotary_cfg: &RotaryConfig,
) -> ReduceOutput {
    state.controller.held_direction = 0;
    state.controller.velocity_db_per_s = 0.0;
    state.controller.hold_began_at = None;

    let window = chrono::Duration::milliseconds(rotary_cfg.velocity_window_ms);
    state.rotary.recent_steps.retain(|s| s.at > at - window);

    let direction: i8 = match steps.cmp(&0) {
        std::cmp::Ordering::Greater => 1,
        std::cmp::Ordering::Less => -1,
        std::cmp::Ordering::Equal => 0,
    };
    for _ in 0..steps.unsigned_abs() {
        state.rotary.recent_steps.push(RotarySample { at, direction });
    }

    let same_sign_count = state
        .rotary
        .recent_steps
        .iter()
        .filter(|s| s.direction == direction)
        .count() as u32;

    let effective_db_per_step = if same_sign_count >= rotary_cfg.velocity_threshold {
        rotary_cfg.db_per_step * rotary_cfg.velocity_multiplier
    } else {
        rotary_cfg.db_per_step
    };

    let delta = steps as f64 * effective_db_per_step;
    let current = rotary_gesture_baseline(&state);
    let next = (current + delta).clamp(vel_cfg.min_db, vel_cfg.max_db);

    state.intent.desired_volume_db = Some(next);
    state.controller.target_db = next;

    ReduceOutput {
        state,
        commands: vec![],
        broadcasts: vec![],
    }
}

/// Baseline for a single gesture step (`RotaryTurn`/`VolumeStep`): the last
/// DSP-observed volume when known, otherwise the pending intent, otherwise
/// the controller's current position. Observed volume wins over a pending
/// intent here so that a rapid burst of turns measures each step against
/// the DSP's last known position rather than compounding through
/// not-yet-applied intents.
fn rotary_gesture_baseline(state: &DaemonState) -> f64 {
    if state.dsp.volume.known {
        state.dsp.volume.value
    } else if let Some(desired) = state.intent.desired_volume_db {
        desired
    } else {
        state.controller.target_db
    }
}

fn reduce_volume_step(
    mut state: DaemonState,
    steps: i32,
    db_per_step: f64,
    vel_cfg: &VelocityConfig,
) -> ReduceOutput {
    state.controller.held_direction = 0;
    state.controller.velocity_db_per_s = 0.0;
    state.controller.hold_began_at = None;

    let effective_db_per_step = if db_per_step != 0.0 { db_per_step } else { 1.0 };
    let delta = steps as f64 * effective_db_per_step;
    let current = rotary_gesture_baseline(&state);
    let next = (current + delta).clamp(vel_cfg.min_db, vel_cfg.max_db);

    state.intent.desired_volume_db = Some(next);
    state.controller.target_db = next;

    ReduceOutput {
        state,
        commands: vec![],
        broadcasts: vec![],
    }
}

fn reduce_volume_held(mut state: DaemonState, direction: i8, at: DateTime<Utc>) -> ReduceOutput {
    if direction == 0 {
        // direction == 0 carries no hold; treat it as a release so Invariant
        // 2 (held_direction == 0 implies hold_began_at is unset) keeps
        // holding regardless of what was held before this reduction.
        return reduce_volume_release(state);
    }
    let was_held = state.controller.held_direction != 0;
    let reversed = was_held && state.controller.held_direction != direction;
    if !was_held || reversed {
        state.controller.hold_began_at = Some(at);
        if reversed {
            state.controller.velocity_db_per_s = 0.0;
        }
    }
    state.controller.held_direction = direction;
    state.controller.last_held_at = at;

    ReduceOutput {
        state,
        ..Default::default()
    }
}

fn reduce_volume_release(mut state: DaemonState) -> ReduceOutput {
    state.controller.held_direction = 0;
    state.controller.hold_began_at = None;
    ReduceOutput {
        state,
        ..Default::default()
    }
}

fn reduce_toggle_mute(mut state: DaemonState) -> ReduceOutput {
    state.intent.mute_toggle_pending = true;
    ReduceOutput {
        state,
        ..Default::default()
    }
}

fn reduce_set_volume_absolute(
    mut state: DaemonState,
    db: f64,
    _origin: VolumeOrigin,
    vel_cfg: &VelocityConfig,
) -> ReduceOutput {
    state.controller.held_direction = 0;
    state.controller.velocity_db_per_s = 0.0;
    state.controller.hold_began_at = None;

    let next = db.clamp(vel_cfg.min_db, vel_cfg.max_db);
    state.intent.desired_volume_db = Some(next);
    state.controller.target_db = next;

    ReduceOutput {
        state,
        ..Default::default()
    }
}

fn reduce_dsp_volume_observed(mut state: DaemonState, db: f64, at: DateTime<Utc>) -> ReduceOutput {
    let rounded_prev = state.dsp.volume.known.then(|| round_to_0_1(state.dsp.volume.value));
    let was_known = state.dsp.volume.known;

    state.dsp.volume.value = db;
    state.dsp.volume.known = true;
    state.dsp.volume.at = at;

    let mut broadcasts = Vec::new();
    let rounded = round_to_0_1(db);
    if !was_known || Some(rounded) != rounded_prev {
        broadcasts.push(StateBroadcast::VolumeChanged {
            volume_db: rounded,
            at,
        });
    }

    if state.controller.held_direction == 0 {
        state.controller.target_db = db;
        if state.controller.velocity_db_per_s.abs() < 0.01 {
            state.controller.velocity_db_per_s = 0.0;
        }
    }

    ReduceOutput {
        state,
        commands: vec![],
        broadcasts,
    }
}

fn reduce_dsp_mute_observed(mut state: DaemonState, muted: bool, at: DateTime<Utc>) -> ReduceOutput {
    let was_known = state.dsp.mute.known;
    let changed = !was_known || state.dsp.mute.value != muted;

    state.dsp.mute.value = muted;
    state.dsp.mute.known = true;
    state.dsp.mute.at = at;

    let broadcasts = if changed {
        vec![StateBroadcast::MuteChanged { muted, at }]
    } else {
        vec![]
    };

    ReduceOutput {
        state,
        commands: vec![],
        broadcasts,
    }
}

fn reduce_dsp_config_path_observed(mut state: DaemonState, path: String, at: DateTime<Utc>) -> ReduceOutput {
    state.dsp.config_path.value = path;
    state.dsp.config_path.known = true;
    state.dsp.config_path.at = at;
    ReduceOutput {
        state,
        ..Default::default()
    }
}

fn reduce_dsp_processing_observed(mut state: DaemonState, proc: String, at: DateTime<Utc>) -> ReduceOutput {
    state.dsp.processing.value = proc;
    state.dsp.processing.known = true;
    state.dsp.processing.at = at;
    ReduceOutput {
        state,
        ..Default::default()
    }
}

fn reduce_request_snapshot(
    state: DaemonState,
    reply_sink: tokio::sync::oneshot::Sender<StateSnapshot>,
) -> ReduceOutput {
    let snapshot = StateSnapshot {
        volume_db: state.dsp.volume.value,
        volume_known: state.dsp.volume.known,
        volume_at: state.dsp.volume.at,
        muted: state.dsp.mute.value,
        mute_known: state.dsp.mute.known,
        mute_at: state.dsp.mute.at,
    };
    ReduceOutput {
        state,
        commands: vec![Command::PublishStateSnapshot {
            snapshot,
            reply_sink,
        }],
        broadcasts: vec![],
    }
}
