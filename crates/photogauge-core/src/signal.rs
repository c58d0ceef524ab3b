//! 1-D signal helpers used by tick extraction and scale fitting.

use serde::{Deserialize, Serialize};

/// Centered moving average with truncated windows at the boundaries.
///
/// Interior outputs average exactly `window_size` inputs: `(window_size - 1) / 2`
/// before the sample and `window_size / 2` after it, so an even window leans
/// one sample to the right. Windows that would extend past the ends are
/// clipped instead of padded. A window of 0 or 1 returns the input unchanged.
pub fn moving_average(values: &[f64], window_size: usize) -> Vec<f64> {
    if window_size <= 1 || values.is_empty() {
        return values.to_vec();
    }
    let before = (window_size - 1) / 2;
    let after = window_size / 2;
    let n = values.len();

    // prefix[i] = sum(values[..i])
    let mut prefix = Vec::with_capacity(n + 1);
    prefix.push(0.0);
    for v in values {
        let last = prefix[prefix.len() - 1];
        prefix.push(last + v);
    }

    (0..n)
        .map(|i| {
            let lo = i.saturating_sub(before);
            let hi = (i + after).min(n - 1);
            (prefix[hi + 1] - prefix[lo]) / (hi + 1 - lo) as f64
        })
        .collect()
}

/// Indices of strict interior local minima.
///
/// A candidate `i` must be lower than both neighbours. Its prominence is
/// `min(max(left window), max(right window)) - values[i]` where each window
/// spans `min_distance` samples on that side. Candidates are accepted greedily
/// left to right, skipping any closer than `min_distance` to the last
/// accepted index.
pub fn local_minima(values: &[f64], min_distance: usize, min_prominence: f64) -> Vec<usize> {
    let n = values.len();
    let mut out: Vec<usize> = Vec::new();
    if n < 3 {
        return out;
    }
    let reach = min_distance.max(1);

    for i in 1..n - 1 {
        let v = values[i];
        if !(v < values[i - 1] && v < values[i + 1]) {
            continue;
        }
        let left_max = values[i.saturating_sub(reach)..i]
            .iter()
            .copied()
            .fold(f64::NEG_INFINITY, f64::max);
        let right_max = values[i + 1..=(i + reach).min(n - 1)]
            .iter()
            .copied()
            .fold(f64::NEG_INFINITY, f64::max);
        let prominence = left_max.min(right_max) - v;
        if prominence < min_prominence {
            continue;
        }
        if let Some(&last) = out.last() {
            if i - last < min_distance {
                continue;
            }
        }
        out.push(i);
    }
    out
}

/// Median of `values`; the mean of the two middle samples for even lengths.
///
/// Returns `0.0` for empty input. NaN samples are ignored.
pub fn median(values: &[f64]) -> f64 {
    let mut sorted: Vec<f64> = values.iter().copied().filter(|v| !v.is_nan()).collect();
    if sorted.is_empty() {
        return 0.0;
    }
    sorted.sort_by(f64::total_cmp);
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        0.5 * (sorted[mid - 1] + sorted[mid])
    } else {
        sorted[mid]
    }
}

/// Least-squares line `y = slope * x + intercept`.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct LinearFit {
    pub slope: f64,
    pub intercept: f64,
    /// Coefficient of determination; 1.0 when `y` is constant.
    pub r_squared: f64,
}

impl LinearFit {
    #[inline]
    pub fn eval(&self, x: f64) -> f64 {
        self.slope * x + self.intercept
    }
}

const MIN_X_VARIANCE: f64 = 1e-12;

/// Closed-form ordinary least squares fit.
///
/// Returns `None` for mismatched lengths, fewer than two samples, or when the
/// variance of `xs` is numerically zero.
pub fn linear_regression(xs: &[f64], ys: &[f64]) -> Option<LinearFit> {
    if xs.len() != ys.len() || xs.len() < 2 {
        return None;
    }
    let n = xs.len() as f64;
    let mean_x = xs.iter().sum::<f64>() / n;
    let mean_y = ys.iter().sum::<f64>() / n;

    let mut sxx = 0.0;
    let mut sxy = 0.0;
    let mut syy = 0.0;
    for (&x, &y) in xs.iter().zip(ys) {
        let dx = x - mean_x;
        let dy = y - mean_y;
        sxx += dx * dx;
        sxy += dx * dy;
        syy += dy * dy;
    }
    if !sxx.is_finite() || sxx / n <= MIN_X_VARIANCE {
        return None;
    }

    let slope = sxy / sxx;
    let intercept = mean_y - slope * mean_x;
    let r_squared = if syy > 0.0 {
        (sxy * sxy) / (sxx * syy)
    } else {
        1.0
    };
    Some(LinearFit {
        slope,
        intercept,
        r_squared,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn moving_average_truncates_boundaries() {
        let out = moving_average(&[1.0, 2.0, 3.0, 4.0, 5.0], 3);
        assert_abs_diff_eq!(out[0], 1.5);
        assert_abs_diff_eq!(out[2], 3.0);
        assert_abs_diff_eq!(out[4], 4.5);
        assert_eq!(moving_average(&[7.0, 9.0], 1), vec![7.0, 9.0]);
    }

    #[test]
    fn even_window_averages_exactly_that_many_samples() {
        let out = moving_average(&[1.0, 2.0, 3.0, 4.0, 5.0, 6.0], 4);
        // values[1..=4]: one before, two after.
        assert_abs_diff_eq!(out[2], 3.5);
        assert_abs_diff_eq!(out[0], 2.0);
        assert_abs_diff_eq!(out[5], 5.5);
    }

    #[test]
    fn local_minima_respects_spacing_and_prominence() {
        // Dips at 5 (deep), 8 (deep but too close), 20 (shallow), 30 (deep).
        let mut values = vec![200.0; 40];
        values[5] = 50.0;
        values[8] = 40.0;
        values[20] = 190.0;
        values[30] = 60.0;

        let minima = local_minima(&values, 10, 20.0);
        assert_eq!(minima, vec![5, 30]);

        for w in minima.windows(2) {
            assert!(w[1] - w[0] >= 10);
        }
    }

    #[test]
    fn local_minima_ignores_edges_and_plateaus() {
        let values = [0.0, 5.0, 5.0, 3.0, 3.0, 5.0, 0.0];
        assert!(local_minima(&values, 1, 0.0).is_empty());
    }

    #[test]
    fn median_conventions() {
        assert_eq!(median(&[]), 0.0);
        assert_eq!(median(&[3.0, 1.0, 2.0]), 2.0);
        assert_eq!(median(&[4.0, 1.0, 3.0, 2.0]), 2.5);
    }

    #[test]
    fn regression_recovers_line_and_rejects_constant_x() {
        let xs = [0.0, 100.0, 200.0, 300.0, 400.0];
        let ys = [100.0, 150.0, 200.0, 250.0, 300.0];
        let fit = linear_regression(&xs, &ys).expect("fit");
        assert_abs_diff_eq!(fit.slope, 0.5, epsilon = 1e-12);
        assert_abs_diff_eq!(fit.intercept, 100.0, epsilon = 1e-9);
        assert_abs_diff_eq!(fit.r_squared, 1.0, epsilon = 1e-12);

        assert!(linear_regression(&[2.0, 2.0, 2.0], &[1.0, 2.0, 3.0]).is_none());
        assert!(linear_regression(&[1.0], &[1.0]).is_none());
    }

    fn lcg(seed: &mut u64) -> f64 {
        *seed = seed.wrapping_mul(6364136223846793005).wrapping_add(1);
        ((*seed >> 32) as u32) as f64 / (u32::MAX as f64)
    }

    /// Noisy ruler-like profile: periodic dips of random depth on a bright
    /// background.
    fn generated_profile(seed: &mut u64) -> Vec<f64> {
        let len = 80 + (lcg(seed) * 200.0) as usize;
        let period = 4.0 + lcg(seed) * 16.0;
        (0..len)
            .map(|i| {
                let phase = (i as f64 / period).fract();
                let dip = (1.0 - (phase - 0.5).abs() * 4.0).max(0.0);
                200.0 - 120.0 * lcg(seed) * dip + 10.0 * (lcg(seed) - 0.5)
            })
            .collect()
    }

    #[test]
    fn local_minima_invariants_hold_on_generated_profiles() {
        let mut seed = 7_u64;
        for _ in 0..100 {
            let values = generated_profile(&mut seed);
            let min_distance = 1 + (lcg(&mut seed) * 10.0) as usize;
            let min_prominence = lcg(&mut seed) * 60.0;
            let minima = local_minima(&values, min_distance, min_prominence);

            for w in minima.windows(2) {
                assert!(w[1] - w[0] >= min_distance, "{minima:?} closer than {min_distance}");
            }
            for &i in &minima {
                assert!(i > 0 && i + 1 < values.len());
                assert!(values[i] < values[i - 1] && values[i] < values[i + 1]);
                let left = values[i.saturating_sub(min_distance)..i]
                    .iter()
                    .copied()
                    .fold(f64::NEG_INFINITY, f64::max);
                let right = values[i + 1..=(i + min_distance).min(values.len() - 1)]
                    .iter()
                    .copied()
                    .fold(f64::NEG_INFINITY, f64::max);
                assert!(left.min(right) - values[i] >= min_prominence);
            }
        }
    }
}
