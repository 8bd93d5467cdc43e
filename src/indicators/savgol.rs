// =============================================================================
// Savitzky–Golay smoothing
// =============================================================================
//
// Each output point is the value at that position of a least-squares
// polynomial (order `polyorder`) fitted to a window of `window` consecutive
// input points. Interior points use the centred window; the first and last
// `window / 2` points reuse the first/last full window and evaluate the fit
// at their own offset ("interp" edge handling), so the final output value is
// a genuine smoothed estimate rather than a copy of the raw input.
//
// Constraints: `window` odd, `polyorder < window`, `data.len() >= window`.
// =============================================================================

/// Smooth `data` with a Savitzky–Golay filter.
///
/// Returns `None` when the filter is inapplicable: even or zero window,
/// `polyorder >= window`, too few points, or a singular fit.
pub fn savgol_filter(data: &[f64], window: usize, polyorder: usize) -> Option<Vec<f64>> {
    if window == 0 || window % 2 == 0 || polyorder >= window || data.len() < window {
        return None;
    }

    let half = window / 2;
    let last_start = data.len() - window;
    let mut out = Vec::with_capacity(data.len());

    for i in 0..data.len() {
        let start = i.saturating_sub(half).min(last_start);
        let chunk = &data[start..start + window];
        // x measured relative to the evaluated point, so the fit at i is c0.
        let xs: Vec<f64> = (start..start + window)
            .map(|j| j as f64 - i as f64)
            .collect();
        let coeffs = polyfit(&xs, chunk, polyorder)?;
        out.push(coeffs[0]);
    }

    Some(out)
}

/// Least-squares polynomial fit, coefficients in ascending power order.
fn polyfit(xs: &[f64], ys: &[f64], order: usize) -> Option<Vec<f64>> {
    let m = order + 1;

    // Normal equations: (AᵀA) c = Aᵀy with A[j][k] = x_j^k.
    let mut ata = vec![vec![0.0_f64; m]; m];
    let mut aty = vec![0.0_f64; m];
    for (&x, &y) in xs.iter().zip(ys) {
        let mut powers = vec![1.0_f64; 2 * m - 1];
        for k in 1..powers.len() {
            powers[k] = powers[k - 1] * x;
        }
        for r in 0..m {
            aty[r] += powers[r] * y;
            for c in 0..m {
                ata[r][c] += powers[r + c];
            }
        }
    }

    solve(ata, aty)
}

/// Gaussian elimination with partial pivoting.
fn solve(mut a: Vec<Vec<f64>>, mut b: Vec<f64>) -> Option<Vec<f64>> {
    let n = b.len();
    for col in 0..n {
        let pivot = (col..n).max_by(|&r1, &r2| a[r1][col].abs().total_cmp(&a[r2][col].abs()))?;
        if a[pivot][col].abs() < 1e-12 {
            return None;
        }
        a.swap(col, pivot);
        b.swap(col, pivot);

        for row in col + 1..n {
            let factor = a[row][col] / a[col][col];
            for k in col..n {
                a[row][k] -= factor * a[col][k];
            }
            b[row] -= factor * b[col];
        }
    }

    let mut x = vec![0.0_f64; n];
    for row in (0..n).rev() {
        let tail: f64 = (row + 1..n).map(|k| a[row][k] * x[k]).sum();
        x[row] = (b[row] - tail) / a[row][row];
    }

    if x.iter().all(|v| v.is_finite()) {
        Some(x)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_even_window() {
        assert!(savgol_filter(&[1.0; 10], 4, 2).is_none());
    }

    #[test]
    fn rejects_order_not_below_window() {
        assert!(savgol_filter(&[1.0; 10], 3, 3).is_none());
    }

    #[test]
    fn rejects_short_input() {
        assert!(savgol_filter(&[1.0, 2.0, 3.0], 5, 2).is_none());
    }

    #[test]
    fn constant_series_unchanged() {
        let out = savgol_filter(&[4.0; 9], 5, 2).unwrap();
        for v in out {
            assert!((v - 4.0).abs() < 1e-9);
        }
    }

    #[test]
    fn reproduces_quadratic_exactly() {
        let data: Vec<f64> = (0..12)
            .map(|i| {
                let x = i as f64;
                0.5 * x * x - 3.0 * x + 2.0
            })
            .collect();
        let out = savgol_filter(&data, 5, 2).unwrap();
        for (a, b) in out.iter().zip(&data) {
            assert!((a - b).abs() < 1e-8, "got {a}, expected {b}");
        }
    }

    #[test]
    fn dampens_alternating_noise() {
        // A line with +/-1 zig-zag on top; a linear fit over 5 points should
        // pull the last value back toward the trend.
        let data: Vec<f64> = (0..10)
            .map(|i| i as f64 + if i % 2 == 0 { 1.0 } else { -1.0 })
            .collect();
        let out = savgol_filter(&data, 5, 1).unwrap();
        let raw_err = (data[9] - 9.0).abs();
        let smooth_err = (out[9] - 9.0).abs();
        assert!(smooth_err < raw_err);
    }

    #[test]
    fn output_length_matches_input() {
        let data: Vec<f64> = (0..7).map(|i| (i as f64).sin()).collect();
        assert_eq!(savgol_filter(&data, 7, 3).unwrap().len(), 7);
    }
}
