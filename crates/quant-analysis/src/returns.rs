//! Price-to-return conversions.
//!
//! Series shorter than two observations yield an empty `ReturnSeries`;
//! callers treat an empty result as "insufficient data".

use analysis_core::ReturnSeries;

/// Default guard added to the previous price in `ln(P[t] / P[t-1])`.
pub const LOG_EPSILON: f64 = 1e-9;

/// `ln(P[t] / (P[t-1] + epsilon))` for t = 1..N-1, non-finite values dropped.
pub fn log_returns(prices: &[f64], epsilon: f64) -> ReturnSeries {
    collect_returns(prices, |prev, cur| (cur / (prev + epsilon)).ln())
}

/// `(P[t] - P[t-1]) / P[t-1]`, rows with an undefined ratio dropped.
pub fn simple_returns(prices: &[f64]) -> ReturnSeries {
    collect_returns(prices, |prev, cur| (cur - prev) / prev)
}

/// Continuously compounded equivalent of simple returns, `ln(1 + r)`.
pub fn to_log(simple: &ReturnSeries) -> ReturnSeries {
    let mut out = ReturnSeries::default();
    for (&i, &r) in simple.index.iter().zip(&simple.values) {
        let l = r.ln_1p();
        if l.is_finite() {
            out.index.push(i);
            out.values.push(l);
        }
    }
    out
}

fn collect_returns(prices: &[f64], f: impl Fn(f64, f64) -> f64) -> ReturnSeries {
    let mut out = ReturnSeries::default();
    if prices.len() < 2 {
        return out;
    }
    for (t, w) in prices.windows(2).enumerate() {
        let r = f(w[0], w[1]);
        if r.is_finite() {
            out.index.push(t + 1);
            out.values.push(r);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_constant_growth_log_returns() {
        let r = log_returns(&[100.0, 105.0, 110.25], LOG_EPSILON);
        assert_eq!(r.len(), 2);
        assert_eq!(r.index, vec![1, 2]);
        for v in r.values() {
            assert_relative_eq!(*v, 0.04879, epsilon = 1e-5);
        }
    }

    #[test]
    fn test_log_returns_telescope() {
        let prices = vec![100.0, 97.5, 101.2, 99.9, 120.0, 118.4, 131.0];
        let r = log_returns(&prices, LOG_EPSILON);
        assert_eq!(r.len(), prices.len() - 1);
        let growth = r.values().iter().sum::<f64>().exp();
        assert_relative_eq!(growth, prices[6] / prices[0], max_relative = 1e-8);
    }

    #[test]
    fn test_short_input_is_empty() {
        assert!(log_returns(&[], LOG_EPSILON).is_empty());
        assert!(log_returns(&[42.0], LOG_EPSILON).is_empty());
        assert!(simple_returns(&[42.0]).is_empty());
    }

    #[test]
    fn test_simple_returns_drop_zero_base() {
        let r = simple_returns(&[10.0, 0.0, 5.0, 6.0]);
        // 10 -> 0 is -100%, 0 -> 5 is undefined and dropped
        assert_eq!(r.index, vec![1, 3]);
        assert_relative_eq!(r.values()[0], -1.0);
        assert_relative_eq!(r.values()[1], 0.2);
    }

    #[test]
    fn test_non_finite_rows_excluded_not_zeroed() {
        let r = simple_returns(&[10.0, f64::NAN, 12.0, 13.0]);
        assert_eq!(r.index, vec![3]);
        assert!(!r.values().contains(&0.0));
    }

    #[test]
    fn test_to_log_matches_direct_log_returns() {
        let prices = vec![50.0, 52.0, 49.0, 55.0];
        let via_simple = to_log(&simple_returns(&prices));
        let direct = log_returns(&prices, 0.0);
        for (a, b) in via_simple.values().iter().zip(direct.values()) {
            assert_relative_eq!(*a, *b, epsilon = 1e-12);
        }
    }
}
