//! The single reducer-owned state record and its sub-structures.

use chrono::{DateTime, Utc};

fn epoch() -> DateTime<Utc> {
    DateTime::<Utc>::from_timestamp(0, 0).expect("epoch timestamp is always valid")
}

/// A cached DSP-observed value that may not have been observed yet.
#[derive(Debug, Clone, PartialEq)]
pub struct Observed<T> {
    pub value: T,
    pub known: bool,
    pub at: DateTime<Utc>,
}

impl<T: Default> Default for Observed<T> {
    fn default() -> Self {
        Observed {
            value: T::default(),
            known: false,
            at: epoch(),
        }
    }
}

/// Last-observed DSP state, cached by the reducer so it can answer "is a
/// command even necessary" without asking the DSP again.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DspCache {
    pub volume: Observed<f64>,
    pub mute: Observed<bool>,
    pub config_path: Observed<String>,
    pub processing: Observed<String>,
}

/// `VolumeControllerState` — the hold/velocity integrator's working state.
#[derive(Debug, Clone, PartialEq)]
pub struct ControllerState {
    pub target_db: f64,
    pub velocity_db_per_s: f64,
    pub held_direction: i8,
    pub last_held_at: DateTime<Utc>,
    pub hold_began_at: Option<DateTime<Utc>>,
}

impl Default for ControllerState {
    fn default() -> Self {
        ControllerState {
            target_db: 0.0,
            velocity_db_per_s: 0.0,
            held_direction: 0,
            last_held_at: epoch(),
            hold_began_at: None,
        }
    }
}

/// One rotary detent sample used by the windowed velocity detector.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RotarySample {
    pub at: DateTime<Utc>,
    pub direction: i8,
}

/// `RotaryReducerState` — the rotary encoder's windowed velocity bookkeeping.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RotaryReducerState {
    pub recent_steps: Vec<RotarySample>,
}

/// `DaemonIntent` — pending desired mute/volume, collapsed at the next tick.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DaemonIntent {
    pub mute_toggle_pending: bool,
    pub desired_mute: Option<bool>,
    pub desired_volume_db: Option<f64>,
}

/// `DaemonState` — the single record mutated only by [`crate::reducer::reduce`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DaemonState {
    pub dsp: DspCache,
    pub controller: ControllerState,
    pub rotary: RotaryReducerState,
    pub intent: DaemonIntent,
}

impl DaemonState {
    /// The state the daemon loop bootstraps with: controller parked at the
    /// configured safe default, `last_held_at` set to the boot time so an
    /// unheld controller never reports a stale hold timeout.
    pub fn bootstrap(now: DateTime<Utc>, safe_default_db: f64) -> Self {
        let mut state = DaemonState::default();
        state.controller.target_db = safe_default_db;
        state.controller.last_held_at = now;
        state
    }
}
