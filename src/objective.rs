//! Objective direction and the measurement-to-scalar combination layer.

use std::fmt;
use std::sync::Arc;

/// Direction of optimization.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub enum Mode {
    /// No direction; the reducer alone encodes preference. Folds behave like
    /// `Min` without early exit.
    #[default]
    None,
    /// Reach within a tolerance band of `opt:target`; may terminate early.
    Target,
    Min,
    Max,
}

impl Mode {
    pub fn from_name(name: &str) -> Option<Mode> {
        match name {
            "none" => Some(Mode::None),
            "target" => Some(Mode::Target),
            "min" => Some(Mode::Min),
            "max" => Some(Mode::Max),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Mode::None => "none",
            Mode::Target => "target",
            Mode::Min => "min",
            Mode::Max => "max",
        }
    }

    /// Wire encoding used by the `opt:objective_mode` option.
    pub fn from_u32(v: u32) -> Option<Mode> {
        match v {
            0 => Some(Mode::None),
            1 => Some(Mode::Target),
            2 => Some(Mode::Min),
            4 => Some(Mode::Max),
            _ => None,
        }
    }

    pub fn to_u32(self) -> u32 {
        match self {
            Mode::None => 0,
            Mode::Target => 1,
            Mode::Min => 2,
            Mode::Max => 4,
        }
    }
}

/// Collapses a measurement vector into the scalar objective a strategy sees.
#[derive(Clone, Default)]
pub enum Reducer {
    /// The first element is already the objective.
    #[default]
    First,
    /// Dot product with per-metric weights (shorter side zero-padded).
    Weighted(Vec<f64>),
    /// Absolute distance of the first element from a target value.
    TargetDistance(f64),
    /// User-supplied combination, e.g. a constrained objective.
    Func(Arc<dyn Fn(&[f64]) -> f64 + Send + Sync>),
}

impl Reducer {
    pub fn reduce(&self, measurement: &[f64]) -> f64 {
        match self {
            Reducer::First => measurement.first().copied().unwrap_or(f64::NAN),
            Reducer::Weighted(weights) => measurement
                .iter()
                .zip(weights.iter())
                .map(|(m, w)| m * w)
                .sum(),
            Reducer::TargetDistance(target) => {
                (measurement.first().copied().unwrap_or(f64::NAN) - target).abs()
            }
            Reducer::Func(f) => f(measurement),
        }
    }

    /// Rewrite element 0 of the measurement with the reduced objective, so
    /// strategies that read the primary element see the combined value. The
    /// identity reducer leaves the vector untouched.
    pub fn apply(&self, measurement: &mut [f64]) {
        if matches!(self, Reducer::First) {
            return;
        }
        let reduced = self.reduce(measurement);
        if let Some(first) = measurement.first_mut() {
            *first = reduced;
        }
    }
}

impl fmt::Debug for Reducer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Reducer::First => write!(f, "First"),
            Reducer::Weighted(w) => f.debug_tuple("Weighted").field(w).finish(),
            Reducer::TargetDistance(t) => f.debug_tuple("TargetDistance").field(t).finish(),
            Reducer::Func(_) => write!(f, "Func(..)"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mode_names_round_trip() {
        for mode in [Mode::None, Mode::Target, Mode::Min, Mode::Max] {
            assert_eq!(Mode::from_name(mode.name()), Some(mode));
            assert_eq!(Mode::from_u32(mode.to_u32()), Some(mode));
        }
        assert_eq!(Mode::from_name("bogus"), None);
        assert_eq!(Mode::from_u32(3), None);
    }

    #[test]
    fn first_reducer_is_identity() {
        let mut m = vec![3.0, 9.0];
        let r = Reducer::First;
        assert_eq!(r.reduce(&m), 3.0);
        r.apply(&mut m);
        assert_eq!(m, vec![3.0, 9.0]);
    }

    #[test]
    fn weighted_reducer() {
        let r = Reducer::Weighted(vec![1.0, -0.5]);
        assert_eq!(r.reduce(&[4.0, 2.0]), 3.0);
    }

    #[test]
    fn func_reducer_rewrites_primary() {
        // keep cr only while psnr stays above the floor
        let r = Reducer::Func(Arc::new(|m: &[f64]| {
            if m[1] >= 65.0 {
                m[0]
            } else {
                f64::NEG_INFINITY
            }
        }));
        let mut ok = vec![10.0, 70.0];
        r.apply(&mut ok);
        assert_eq!(ok, vec![10.0, 70.0]);

        let mut bad = vec![10.0, 60.0];
        r.apply(&mut bad);
        assert_eq!(bad[0], f64::NEG_INFINITY);
        assert_eq!(bad[1], 60.0);
    }

    #[test]
    fn target_distance_reducer() {
        let r = Reducer::TargetDistance(5.0);
        assert_eq!(r.reduce(&[3.0]), 2.0);
        assert_eq!(r.reduce(&[7.5]), 2.5);
    }
}
