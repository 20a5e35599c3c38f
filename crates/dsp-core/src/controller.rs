//! The hold/velocity volume controller: `step` advances controller dynamics
//! by one tick's `dt`. Pure function, no side effects.

use chrono::{DateTime, Utc};

use crate::config::{VelocityConfig, VelocityMode};
use crate::state::ControllerState;

/// Advances `ctrl` by `dt` seconds given `baseline_target` (the
/// highest-priority target source chosen by the reducer's `Tick` handling)
/// and `now` (for hold-timeout and danger-zone-entry comparisons).
///
/// `dt <= 0` is a no-op. `dt` is clamped to `cfg.max_dt_s` when that is
/// positive.
pub fn step(
    ctrl: &ControllerState,
    baseline_target: f64,
    dt: f64,
    now: DateTime<Utc>,
    cfg: &VelocityConfig,
) -> ControllerState {
    if dt <= 0.0 {
        return ctrl.clone();
    }
    let dt = if cfg.max_dt_s > 0.0 {
        dt.min(cfg.max_dt_s)
    } else {
        dt
    };

    let mut next = ctrl.clone();
    next.target_db = baseline_target;

    if next.held_direction != 0 && cfg.hold_timeout_s > 0.0 {
        let held_for = (now - next.last_held_at).num_milliseconds() as f64 / 1000.0;
        if held_for > cfg.hold_timeout_s {
            next.held_direction = 0;
            next.hold_began_at = None;
        }
    }

    let vel_max = danger_zone_vel_max(next.target_db, next.held_direction, cfg);

    match cfg.mode {
        VelocityMode::Constant => step_constant(&mut next, dt, vel_max, now, cfg),
        VelocityMode::Accelerating => step_accelerating(&mut next, dt, vel_max, cfg),
    }

    next.target_db = next.target_db.clamp(cfg.min_db, cfg.max_db);
    if next.target_db <= cfg.min_db || next.target_db >= cfg.max_db {
        next.velocity_db_per_s = 0.0;
    }

    next
}

/// Cubic ease-out velocity cap for ramp-up (`held_direction == +1`) inside
/// the danger zone near `max_db`. Ramp-down is unaffected.
fn danger_zone_vel_max(target_db: f64, held_direction: i8, cfg: &VelocityConfig) -> f64 {
    if held_direction != 1 {
        return cfg.vel_max_db_per_s;
    }
    let threshold = cfg.max_db - cfg.danger_zone_db;
    if target_db <= threshold {
        return cfg.vel_max_db_per_s;
    }
    let span = cfg.max_db - threshold;
    let x = if span > 0.0 {
        ((target_db - threshold) / span).clamp(0.0, 1.0)
    } else {
        1.0
    };
    let extra = (1.0 - x.powi(3)).clamp(0.0, 1.0);
    cfg.danger_vel_min_near_max_db_per_s
        + (cfg.danger_vel_max_db_per_s - cfg.danger_vel_min_near_max_db_per_s) * extra
}

fn step_constant(
    ctrl: &mut ControllerState,
    dt: f64,
    vel_max: f64,
    now: DateTime<Utc>,
    cfg: &VelocityConfig,
) {
    let mut rate = ctrl.held_direction as f64 * cfg.vel_max_db_per_s;
    if ctrl.held_direction != 0 {
        let mult = cfg.accel_time_s.max(1.0);
        let delay = cfg.decay_tau_s.max(0.0);
        if mult > 1.0 {
            let elapsed_s = ctrl
                .hold_began_at
                .map(|began| (now - began).num_milliseconds() as f64 / 1000.0)
                .unwrap_or(0.0);
            if delay == 0.0 || elapsed_s >= delay {
                rate *= mult;
            }
        }
    }
    rate = rate.clamp(-vel_max, vel_max);
    ctrl.velocity_db_per_s = rate;
    ctrl.target_db += rate * dt;
}

fn step_accelerating(ctrl: &mut ControllerState, dt: f64, vel_max: f64, cfg: &VelocityConfig) {
    let accel = if cfg.accel_time_s > 0.0 {
        cfg.vel_max_db_per_s / cfg.accel_time_s
    } else {
        0.0
    };

    if ctrl.held_direction != 0 {
        let target_direction = ctrl.held_direction as f64;
        if ctrl.velocity_db_per_s * target_direction < 0.0 {
            ctrl.velocity_db_per_s = 0.0;
        }
        let target_vel = target_direction * vel_max;
        let step = accel * dt;
        if ctrl.velocity_db_per_s < target_vel {
            ctrl.velocity_db_per_s = (ctrl.velocity_db_per_s + step).min(target_vel);
        } else if ctrl.velocity_db_per_s > target_vel {
            ctrl.velocity_db_per_s = (ctrl.velocity_db_per_s - step).max(target_vel);
        }
    } else if cfg.decay_tau_s > 0.0 {
        ctrl.velocity_db_per_s *= (-dt / cfg.decay_tau_s).exp();
    } else {
        ctrl.velocity_db_per_s = 0.0;
    }

    // Hard clip, not just accel-rate convergence: a shrinking danger-zone
    // vel_max must take effect on the same tick it shrinks, so an
    // already-fast ramp can't overshoot the new ceiling while it "catches up".
    ctrl.velocity_db_per_s = ctrl.velocity_db_per_s.clamp(-vel_max, vel_max);

    ctrl.target_db += ctrl.velocity_db_per_s * dt;
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use chrono::TimeZone;

    fn t(offset_ms: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000, 0).unwrap() + chrono::Duration::milliseconds(offset_ms)
    }

    fn base_cfg() -> VelocityConfig {
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

    #[test]
    fn dt_zero_is_noop() {
        let ctrl = ControllerState {
            target_db: -10.0,
            velocity_db_per_s: 2.0,
            held_direction: 1,
            last_held_at: t(0),
            hold_began_at: Some(t(0)),
        };
        let next = step(&ctrl, -10.0, 0.0, t(0), &base_cfg());
        assert_eq!(next, ctrl);
    }

    #[test]
    fn dt_is_clamped_to_max_dt() {
        let cfg = base_cfg();
        let ctrl = ControllerState {
            target_db: -40.0,
            velocity_db_per_s: 0.0,
            held_direction: 1,
            last_held_at: t(0),
            hold_began_at: Some(t(0)),
        };
        let clamped = step(&ctrl, -40.0, 10.0, t(10_000), &cfg);
        let exact = step(&ctrl, -40.0, cfg.max_dt_s, t(10_000), &cfg);
        assert_relative_eq!(clamped.target_db, exact.target_db, epsilon = 1e-9);
    }

    #[test]
    fn hold_timeout_releases_hold() {
        let cfg = base_cfg();
        let ctrl = ControllerState {
            target_db: -40.0,
            velocity_db_per_s: 3.0,
            held_direction: 1,
            last_held_at: t(0),
            hold_began_at: Some(t(0)),
        };
        let next = step(&ctrl, -40.0, 1.0 / 30.0, t(600), &cfg);
        assert_eq!(next.held_direction, 0);
        assert!(next.hold_began_at.is_none());
    }

    #[test]
    fn clamp_on_hit_zeros_velocity() {
        // Ramp-down (held_direction == -1) is unaffected by the danger-zone
        // cap, so a large velocity reliably overshoots min_db in one step.
        let cfg = base_cfg();
        let ctrl = ControllerState {
            target_db: -79.5,
            velocity_db_per_s: -10.0,
            held_direction: -1,
            last_held_at: t(0),
            hold_began_at: Some(t(0)),
        };
        let next = step(&ctrl, -79.5, 1.0, t(100), &cfg);
        assert_eq!(next.target_db, cfg.min_db);
        assert_eq!(next.velocity_db_per_s, 0.0);
    }

    #[test]
    fn danger_zone_caps_velocity_near_max() {
        let cfg = base_cfg();
        let ctrl = ControllerState {
            target_db: -1.0,
            velocity_db_per_s: cfg.vel_max_db_per_s,
            held_direction: 1,
            last_held_at: t(0),
            hold_began_at: Some(t(0)),
        };
        let dt = 1.0 / 30.0;
        let next = step(&ctrl, -1.0, dt, t(33), &cfg);
        let max_allowed_increment = cfg.danger_vel_max_db_per_s * dt;
        assert!(next.target_db - ctrl.target_db <= max_allowed_increment + 1e-9);
    }

    #[test]
    fn not_held_decays_velocity() {
        let cfg = base_cfg();
        let ctrl = ControllerState {
            target_db: -40.0,
            velocity_db_per_s: 5.0,
            held_direction: 0,
            last_held_at: t(0),
            hold_began_at: None,
        };
        let next = step(&ctrl, -40.0, 0.1, t(100), &cfg);
        assert!(next.velocity_db_per_s.abs() < 5.0);
        assert!(next.velocity_db_per_s > 0.0);
    }
}
