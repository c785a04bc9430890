//! Circular phase helpers
//!
//! Phases live on [0, 2π). Collection times are expressed in hours and mapped
//! onto the circle through the configured period length.

use std::f64::consts::TAU;

/// Convert unit-circle coordinates to a phase in [0, 2π)
pub fn coords_to_phase(x: f64, y: f64) -> f64 {
    let phase = y.atan2(x);
    if phase < 0.0 {
        phase + TAU
    } else {
        phase
    }
}

/// Convert a phase to unit-circle coordinates (cos, sin)
pub fn phase_to_coords(phase: f64) -> (f64, f64) {
    (phase.cos(), phase.sin())
}

/// Map a collection time in hours onto [0, 2π)
pub fn time_to_phase(time_hours: f64, period_hours: f64) -> f64 {
    TAU * (time_hours / period_hours).rem_euclid(1.0)
}

/// Map a phase back to hours within one period
pub fn phase_to_hours(phase: f64, period_hours: f64) -> f64 {
    phase.rem_euclid(TAU) * period_hours / TAU
}

/// Absolute circular distance between two phases, in [0, π]
pub fn wrapped_distance(a: f64, b: f64) -> f64 {
    let diff = (a - b).rem_euclid(TAU);
    diff.min(TAU - diff)
}

/// Signed circular difference a - b, wrapped into (-π, π]
pub fn signed_wrapped_diff(a: f64, b: f64) -> f64 {
    let diff = (a - b).rem_euclid(TAU);
    if diff > std::f64::consts::PI {
        diff - TAU
    } else {
        diff
    }
}

/// Wrap an arbitrary angle into [0, 2π)
pub fn wrap_phase(phase: f64) -> f64 {
    phase.rem_euclid(TAU)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f64::consts::PI;

    #[test]
    fn test_coords_phase_roundtrip() {
        for &phase in &[0.0, 0.3, PI / 2.0, PI, 4.5, TAU - 1e-6] {
            let (x, y) = phase_to_coords(phase);
            assert!((coords_to_phase(x, y) - phase).abs() < 1e-9);
        }
    }

    #[test]
    fn test_coords_to_phase_range() {
        // atan2 output in (-π, π] must be shifted into [0, 2π)
        let phase = coords_to_phase(0.0, -1.0);
        assert!((phase - 3.0 * PI / 2.0).abs() < 1e-12);
    }

    #[test]
    fn test_time_to_phase() {
        assert!((time_to_phase(0.0, 24.0) - 0.0).abs() < 1e-12);
        assert!((time_to_phase(6.0, 24.0) - PI / 2.0).abs() < 1e-12);
        assert!((time_to_phase(12.0, 24.0) - PI).abs() < 1e-12);
        // times beyond one period wrap
        assert!((time_to_phase(30.0, 24.0) - PI / 2.0).abs() < 1e-12);
    }

    #[test]
    fn test_phase_to_hours_roundtrip() {
        for &hours in &[0.0, 3.5, 12.0, 23.9] {
            let phase = time_to_phase(hours, 24.0);
            assert!((phase_to_hours(phase, 24.0) - hours).abs() < 1e-9);
        }
    }

    #[test]
    fn test_wrapped_distance() {
        assert!((wrapped_distance(0.1, TAU - 0.1) - 0.2).abs() < 1e-12);
        assert!((wrapped_distance(0.0, PI) - PI).abs() < 1e-12);
        // symmetric
        assert!((wrapped_distance(1.0, 4.0) - wrapped_distance(4.0, 1.0)).abs() < 1e-12);
        // never exceeds π
        for i in 0..100 {
            let a = i as f64 * 0.17;
            let b = i as f64 * 0.31;
            assert!(wrapped_distance(a, b) <= PI + 1e-12);
        }
    }

    #[test]
    fn test_signed_wrapped_diff() {
        assert!((signed_wrapped_diff(0.1, TAU - 0.1) - 0.2).abs() < 1e-12);
        assert!((signed_wrapped_diff(TAU - 0.1, 0.1) + 0.2).abs() < 1e-12);
    }
}
