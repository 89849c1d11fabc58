//! Sample-statistics helpers shared by the analysis crates.
//!
//! All functions take already-clean input; callers strip non-finite values
//! with [`finite`] first. Empty or single-element input yields `0.0` for the
//! dispersion measures so guards stay at the call site.

/// Copy of `data` with NaN and infinite values removed.
pub fn finite(data: &[f64]) -> Vec<f64> {
    data.iter().copied().filter(|v| v.is_finite()).collect()
}

/// Compute the mean of a data slice.
pub fn mean(data: &[f64]) -> f64 {
    if data.is_empty() {
        return 0.0;
    }
    data.iter().sum::<f64>() / data.len() as f64
}

/// Sample variance (N-1 denominator).
pub fn variance(data: &[f64]) -> f64 {
    if data.len() < 2 {
        return 0.0;
    }
    let m = mean(data);
    data.iter().map(|x| (x - m).powi(2)).sum::<f64>() / (data.len() - 1) as f64
}

/// Compute sample standard deviation.
pub fn std_dev(data: &[f64]) -> f64 {
    variance(data).sqrt()
}

/// Sample covariance of two equal-length slices (N-1 denominator).
pub fn covariance(x: &[f64], y: &[f64]) -> f64 {
    let n = x.len().min(y.len());
    if n < 2 {
        return 0.0;
    }
    let mx = mean(&x[..n]);
    let my = mean(&y[..n]);
    x[..n]
        .iter()
        .zip(&y[..n])
        .map(|(a, b)| (a - mx) * (b - my))
        .sum::<f64>()
        / (n - 1) as f64
}

/// Pearson correlation; `0.0` when either side is constant.
pub fn correlation(x: &[f64], y: &[f64]) -> f64 {
    let n = x.len().min(y.len());
    let sx = std_dev(&x[..n]);
    let sy = std_dev(&y[..n]);
    if sx == 0.0 || sy == 0.0 {
        return 0.0;
    }
    covariance(&x[..n], &y[..n]) / (sx * sy)
}

/// Biased (population) skewness, m3 / m2^1.5.
pub fn skewness(data: &[f64]) -> f64 {
    let (m2, m3, _) = central_moments(data);
    if m2 == 0.0 {
        return 0.0;
    }
    m3 / m2.powf(1.5)
}

/// Biased excess kurtosis, m4 / m2^2 - 3 (normal = 0).
pub fn excess_kurtosis(data: &[f64]) -> f64 {
    let (m2, _, m4) = central_moments(data);
    if m2 == 0.0 {
        return 0.0;
    }
    m4 / (m2 * m2) - 3.0
}

fn central_moments(data: &[f64]) -> (f64, f64, f64) {
    if data.is_empty() {
        return (0.0, 0.0, 0.0);
    }
    let n = data.len() as f64;
    let m = mean(data);
    let (mut m2, mut m3, mut m4) = (0.0, 0.0, 0.0);
    for x in data {
        let d = x - m;
        let d2 = d * d;
        m2 += d2;
        m3 += d2 * d;
        m4 += d2 * d2;
    }
    (m2 / n, m3 / n, m4 / n)
}

/// Percentile (0-100 scale) with linear interpolation between closest ranks.
pub fn percentile(data: &[f64], pct: f64) -> f64 {
    if data.is_empty() {
        return 0.0;
    }
    let mut sorted = data.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    percentile_sorted(&sorted, pct)
}

/// Same as [`percentile`] for input that is already sorted ascending.
pub fn percentile_sorted(sorted: &[f64], pct: f64) -> f64 {
    if sorted.is_empty() {
        return 0.0;
    }
    let rank = (pct.clamp(0.0, 100.0) / 100.0) * (sorted.len() - 1) as f64;
    let lo = rank.floor() as usize;
    let hi = rank.ceil() as usize;
    let frac = rank - lo as f64;
    sorted[lo] + (sorted[hi] - sorted[lo]) * frac
}

/// Median via the 50th percentile.
pub fn median(data: &[f64]) -> f64 {
    percentile(data, 50.0)
}
