//! Pure parameter bags consumed by [`crate::controller::step`] and [`crate::reducer::reduce`].
//!
//! These are plain data: no I/O, no defaults sourced from disk. `dsp-proto`
//! owns the on-disk `Config` record and builds these from it.

/// Selects which of the two hold-integration curves `step` uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VelocityMode {
    Accelerating,
    Constant,
}

impl Default for VelocityMode {
    fn default() -> Self {
        VelocityMode::Accelerating
    }
}

/// Controller tuning: bounds, ramp shape, and the danger-zone safety curve.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VelocityConfig {
    pub mode: VelocityMode,
    pub vel_max_db_per_s: f64,
    /// Accelerating mode: time constant to reach `vel_max`. Constant mode: turbo multiplier.
    pub accel_time_s: f64,
    /// Accelerating mode: velocity decay time constant. Constant mode: turbo delay.
    pub decay_tau_s: f64,
    pub min_db: f64,
    pub max_db: f64,
    pub hold_timeout_s: f64,
    /// Maximum `dt` accepted by `step`; set by the daemon loop to `2 / update_hz`. Zero disables clamping.
    pub max_dt_s: f64,
    pub danger_zone_db: f64,
    pub danger_vel_max_db_per_s: f64,
    pub danger_vel_min_near_max_db_per_s: f64,
    pub volume_update_threshold_db: f64,
    pub safe_default_db: f64,
}

impl Default for VelocityConfig {
    fn default() -> Self {
        VelocityConfig {
            mode: VelocityMode::Accelerating,
            vel_max_db_per_s: 15.0,
            accel_time_s: 2.0,
            decay_tau_s: 0.2,
            min_db: -80.0,
            max_db: 0.0,
            hold_timeout_s: 0.5,
            max_dt_s: 2.0 / 30.0,
            danger_zone_db: 12.0,
            danger_vel_max_db_per_s: 3.0,
            danger_vel_min_near_max_db_per_s: 0.3,
            volume_update_threshold_db: 0.02,
            safe_default_db: -45.0,
        }
    }
}

/// Rotary encoder windowed-velocity detection parameters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RotaryConfig {
    pub db_per_step: f64,
    pub velocity_window_ms: i64,
    pub velocity_multiplier: f64,
    pub velocity_threshold: u32,
}

impl Default for RotaryConfig {
    fn default() -> Self {
        RotaryConfig {
            db_per_step: 1.0,
            velocity_window_ms: 250,
            velocity_multiplier: 2.0,
            velocity_threshold: 3,
        }
    }
}
