//! Easing curves used by the timed effects.
//!
//! Each curve maps progress `t` in \[0, 1\] to an eased value in \[0, 1\].

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Ease {
    #[default]
    Linear,
    QuadIn,
    QuadOut,
    QuadInOut,
    CubicIn,
    CubicOut,
    SineInOut,
}

impl Ease {
    /// Evaluate the curve at `t` (clamped to \[0, 1\]).
    pub fn sample(self, t: f32) -> f32 {
        let t = t.clamp(0.0, 1.0);
        match self {
            Self::Linear => t,
            Self::QuadIn => t * t,
            Self::QuadOut => 1.0 - (1.0 - t) * (1.0 - t),
            Self::QuadInOut => {
                if t < 0.5 {
                    2.0 * t * t
                } else {
                    1.0 - (-2.0 * t + 2.0).powi(2) / 2.0
                }
            }
            Self::CubicIn => t * t * t,
            Self::CubicOut => 1.0 - (1.0 - t).powi(3),
            Self::SineInOut => -(std::f32::consts::PI * t).cos() / 2.0 + 0.5,
        }
    }
}

/// Fraction of `duration` covered by `elapsed`, in \[0, 1\]. A non-positive
/// duration is complete immediately.
pub fn progress(elapsed: f32, duration: f32) -> f32 {
    if duration > 0.0 {
        (elapsed / duration).clamp(0.0, 1.0)
    } else {
        1.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn curves_hit_both_ends() {
        for ease in [
            Ease::Linear,
            Ease::QuadIn,
            Ease::QuadOut,
            Ease::QuadInOut,
            Ease::CubicIn,
            Ease::CubicOut,
            Ease::SineInOut,
        ] {
            assert!(ease.sample(0.0).abs() < 1e-6, "{ease:?} at 0");
            assert!((ease.sample(1.0) - 1.0).abs() < 1e-6, "{ease:?} at 1");
        }
    }

    #[test]
    fn out_curves_lead_in_curves() {
        assert!(Ease::QuadOut.sample(0.25) > Ease::Linear.sample(0.25));
        assert!(Ease::QuadIn.sample(0.25) < Ease::Linear.sample(0.25));
    }

    #[test]
    fn zero_duration_is_done() {
        assert_eq!(progress(0.0, 0.0), 1.0);
        assert_eq!(progress(0.5, 2.0), 0.25);
        assert_eq!(progress(9.0, 2.0), 1.0);
    }
}
