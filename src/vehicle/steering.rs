// ==============================================================================
// steering.rs — SPEED-SENSITIVE STEERING RATE
// ------------------------------------------------------------------------------
// The steering angle moves by an increment per second of frame time. Above
// degrade_threshold the increment shrinks with
//
//     factor = clamp(1 - ((v - v0) / (vmax - v0))^k, 0, 1)
//
// and the scaled increment is clamped into [min_inc, max_inc] so the wheel
// never locks and never snaps. With no steering input the angle returns
// toward zero at half the increment, without overshooting.
//
// Sign: positive input x steers right, which is a negative angle.
// ==============================================================================

use crate::config::VehicleTuning;

/// 1 below the threshold, falling to 0 at max speed.
pub fn degradation_factor(speed: f32, threshold: f32, max_speed: f32, exponent: f32) -> f32 {
    if speed <= threshold {
        return 1.0;
    }
    let span = (max_speed - threshold).max(1e-3);
    let t = ((speed - threshold) / span).clamp(0.0, 1.0);
    (1.0 - t.powf(exponent)).clamp(0.0, 1.0)
}

/// Steering rate (rad/s) at `speed`.
pub fn steering_increment(speed: f32, tuning: &VehicleTuning) -> f32 {
    let factor = degradation_factor(
        speed,
        tuning.degrade_threshold,
        tuning.max_speed,
        tuning.degrade_exponent,
    );
    (tuning.steering_increment * factor).clamp(tuning.min_steering_increment, tuning.max_steering_increment)
}

/// Next steering angle. `steer` is the raw x input in [-1, 1].
pub fn step_steering(current: f32, steer: f32, speed: f32, dt: f32, tuning: &VehicleTuning) -> f32 {
    let inc = steering_increment(speed, tuning) * dt;

    let next = if steer.abs() > f32::EPSILON {
        current - steer.clamp(-1.0, 1.0) * inc
    } else {
        // self-centering
        let back = inc * 0.5;
        if current.abs() <= back { 0.0 } else { current - back * current.signum() }
    };

    next.clamp(-tuning.max_steering, tuning.max_steering)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tuning() -> VehicleTuning {
        VehicleTuning::default()
    }

    #[test]
    fn factor_is_one_below_threshold_and_zero_at_top_speed() {
        let t = tuning();
        assert_eq!(degradation_factor(0.0, t.degrade_threshold, t.max_speed, t.degrade_exponent), 1.0);
        assert_eq!(degradation_factor(t.degrade_threshold, t.degrade_threshold, t.max_speed, t.degrade_exponent), 1.0);
        assert_eq!(degradation_factor(t.max_speed, t.degrade_threshold, t.max_speed, t.degrade_exponent), 0.0);
        assert_eq!(degradation_factor(500.0, t.degrade_threshold, t.max_speed, t.degrade_exponent), 0.0);
    }

    #[test]
    fn factor_decreases_with_speed() {
        let t = tuning();
        let mut last = 1.0;
        for i in 0..=50 {
            let f = degradation_factor(i as f32, t.degrade_threshold, t.max_speed, t.degrade_exponent);
            assert!(f <= last + 1e-6);
            last = f;
        }
    }

    #[test]
    fn increment_never_drops_below_minimum() {
        let t = tuning();
        assert_eq!(steering_increment(t.max_speed, &t), t.min_steering_increment);
        assert_eq!(steering_increment(0.0, &t), t.steering_increment);
    }

    #[test]
    fn left_input_turns_left_and_saturates() {
        let t = tuning();
        let mut angle = 0.0;
        for _ in 0..600 {
            angle = step_steering(angle, -1.0, 0.0, 1.0 / 60.0, &t);
            assert!(angle.abs() <= t.max_steering);
        }
        assert_eq!(angle, t.max_steering);
    }

    #[test]
    fn release_self_centers_at_half_rate_without_overshoot() {
        let t = tuning();
        let dt = 0.1;
        let angle = step_steering(0.3, 0.0, 0.0, dt, &t);
        assert!((angle - (0.3 - t.steering_increment * dt * 0.5)).abs() < 1e-6);

        let mut a = 0.3;
        for _ in 0..100 {
            a = step_steering(a, 0.0, 0.0, dt, &t);
            assert!(a >= 0.0);
        }
        assert_eq!(a, 0.0);
    }

    #[test]
    fn fast_car_steers_slower() {
        let t = tuning();
        let slow = step_steering(0.0, 1.0, 5.0, 0.1, &t);
        let fast = step_steering(0.0, 1.0, 45.0, 0.1, &t);
        assert!(fast.abs() < slow.abs());
        assert!(fast < 0.0);
    }
}
