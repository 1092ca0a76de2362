//! Small numeric helpers over sample windows

/// Arithmetic mean, 0 for an empty slice
pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// Population standard deviation
pub fn std_dev(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let m = mean(values);
    let variance = values.iter().map(|v| (v - m).powi(2)).sum::<f64>() / values.len() as f64;
    variance.sqrt()
}

/// Coefficient of variation, 0 when the mean is zero
pub fn coefficient_of_variation(values: &[f64]) -> f64 {
    let m = mean(values);
    if m.abs() < f64::EPSILON {
        0.0
    } else {
        std_dev(values) / m.abs()
    }
}

/// Least-squares slope of `values` against their index
pub fn linear_slope(values: &[f64]) -> f64 {
    let n = values.len();
    if n < 2 {
        return 0.0;
    }
    let x_mean = (n - 1) as f64 / 2.0;
    let y_mean = mean(values);
    let (num, den) = values
        .iter()
        .enumerate()
        .fold((0.0, 0.0), |(num, den), (i, y)| {
            let dx = i as f64 - x_mean;
            (num + dx * (y - y_mean), den + dx * dx)
        });
    if den == 0.0 {
        0.0
    } else {
        num / den
    }
}

/// Linear-interpolated quantile of already sorted values, `q` in `[0, 1]`
pub fn quantile_sorted(sorted: &[f64], q: f64) -> f64 {
    match sorted.len() {
        0 => 0.0,
        1 => sorted[0],
        n => {
            let pos = q.clamp(0.0, 1.0) * (n - 1) as f64;
            let lo = pos.floor() as usize;
            let hi = pos.ceil() as usize;
            let frac = pos - lo as f64;
            sorted[lo] + (sorted[hi] - sorted[lo]) * frac
        }
    }
}

/// Fraction of interior samples that are strict local extrema
pub fn extrema_ratio(values: &[f64]) -> f64 {
    if values.len() < 3 {
        return 0.0;
    }
    let extrema = values
        .windows(3)
        .filter(|w| (w[1] > w[0] && w[1] > w[2]) || (w[1] < w[0] && w[1] < w[2]))
        .count();
    extrema as f64 / (values.len() - 2) as f64
}

/// Fraction of a quantity preserved from `initial` to `current`, in `[0, 1]`
///
/// A zero initial value counts as perfectly conserved.
pub fn conservation_ratio(initial: f64, current: f64) -> f64 {
    if initial.abs() < 1e-12 {
        return 1.0;
    }
    (1.0 - (current - initial).abs() / initial.abs()).clamp(0.0, 1.0)
}

/// Smoothness of a series in `(0, 1]` from its second differences
///
/// Mean absolute second difference relative to the mean absolute first
/// difference; straight lines and constants score 1.
pub fn smoothness(values: &[f64]) -> f64 {
    if values.len() < 3 {
        return 1.0;
    }
    let first: Vec<f64> = values.windows(2).map(|w| (w[1] - w[0]).abs()).collect();
    let second: Vec<f64> = values
        .windows(3)
        .map(|w| (w[2] - 2.0 * w[1] + w[0]).abs())
        .collect();
    let scale = mean(&first);
    if scale < 1e-15 {
        return 1.0;
    }
    1.0 / (1.0 + mean(&second) / scale)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mean_and_std() {
        assert_eq!(mean(&[]), 0.0);
        assert_eq!(mean(&[1.0, 2.0, 3.0]), 2.0);
        assert!((std_dev(&[2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0]) - 2.0).abs() < 1e-12);
        assert_eq!(coefficient_of_variation(&[0.0, 0.0]), 0.0);
    }

    #[test]
    fn test_linear_slope() {
        assert!((linear_slope(&[1.0, 3.0, 5.0, 7.0]) - 2.0).abs() < 1e-12);
        assert_eq!(linear_slope(&[4.0]), 0.0);
        assert!(linear_slope(&[5.0, 4.0, 3.0]) < 0.0);
    }

    #[test]
    fn test_quantile() {
        let sorted = [1.0, 2.0, 3.0, 4.0, 5.0];
        assert_eq!(quantile_sorted(&sorted, 0.5), 3.0);
        assert_eq!(quantile_sorted(&sorted, 0.25), 2.0);
        assert_eq!(quantile_sorted(&sorted, 1.0), 5.0);
    }

    #[test]
    fn test_extrema_ratio() {
        assert_eq!(extrema_ratio(&[1.0, 2.0, 3.0, 4.0]), 0.0);
        assert_eq!(extrema_ratio(&[1.0, -1.0, 1.0, -1.0, 1.0]), 1.0);
    }

    #[test]
    fn test_conservation_ratio() {
        assert_eq!(conservation_ratio(0.0, 5.0), 1.0);
        assert!((conservation_ratio(10.0, 9.9) - 0.99).abs() < 1e-12);
        assert_eq!(conservation_ratio(1.0, 5.0), 0.0);
    }

    #[test]
    fn test_smoothness() {
        assert_eq!(smoothness(&[1.0, 2.0, 3.0, 4.0]), 1.0);
        assert_eq!(smoothness(&[2.0, 2.0, 2.0]), 1.0);
        assert!(smoothness(&[1.0, -1.0, 1.0, -1.0]) < 0.4);
    }
}
