//! Pure event/command reducer and hold/velocity volume controller.
//!
//! This crate has no I/O and no wall-clock reads: every public function is a
//! deterministic transformation of its inputs. The daemon binary (`dsp-daemon`)
//! is the only place timestamps are read and side effects happen.

pub mod config;
pub mod controller;
pub mod event;
pub mod reducer;
pub mod state;

pub use config::{RotaryConfig, VelocityConfig, VelocityMode};
pub use event::{Command, Event, FailedCommand, StateBroadcast, StateSnapshot, VolumeOrigin};
pub use reducer::{reduce, round_to_0_1, ReduceOutput};
pub use state::{ControllerState, DaemonIntent, DaemonState, DspCache, Observed, RotaryReducerState, RotarySample};
