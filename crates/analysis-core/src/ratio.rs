use serde::{Deserialize, Serialize};

/// Value reported in place of a ratio whose denominator is zero.
pub const DEGENERATE_SENTINEL: f64 = 0.0;

/// Denominators below this magnitude are treated as zero.
pub const ZERO_TOLERANCE: f64 = 1e-12;

/// Outcome of a ratio computation (Sharpe, Sortino, beta, ...).
///
/// A flat price series has zero volatility, a series without losses has zero
/// downside deviation, and a constant benchmark has zero variance. Those are
/// ordinary inputs, so the ratio is flagged `Degenerate` instead of carrying
/// NaN or infinity into a report.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", content = "value", rename_all = "snake_case")]
pub enum Ratio {
    Defined(f64),
    Degenerate,
}

impl Ratio {
    /// Divide, flagging a zero (or non-finite) denominator or a non-finite result.
    pub fn from_parts(numerator: f64, denominator: f64) -> Self {
        if !denominator.is_finite() || denominator.abs() < ZERO_TOLERANCE {
            return Ratio::Degenerate;
        }
        let value = numerator / denominator;
        if value.is_finite() {
            Ratio::Defined(value)
        } else {
            Ratio::Degenerate
        }
    }

    /// Numeric value, with `DEGENERATE_SENTINEL` for degenerate ratios.
    pub fn value(&self) -> f64 {
        match self {
            Ratio::Defined(v) => *v,
            Ratio::Degenerate => DEGENERATE_SENTINEL,
        }
    }

    pub fn is_degenerate(&self) -> bool {
        matches!(self, Ratio::Degenerate)
    }

    pub fn defined(&self) -> Option<f64> {
        match self {
            Ratio::Defined(v) => Some(*v),
            Ratio::Degenerate => None,
        }
    }

    pub fn map(self, f: impl FnOnce(f64) -> f64) -> Self {
        match self {
            Ratio::Defined(v) => {
                let mapped = f(v);
                if mapped.is_finite() {
                    Ratio::Defined(mapped)
                } else {
                    Ratio::Degenerate
                }
            }
            Ratio::Degenerate => Ratio::Degenerate,
        }
    }
}
