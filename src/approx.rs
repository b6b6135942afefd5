//! Utilities to approximate equality of floating point values.
//!
//! Comparisons are relative to the larger magnitude, floored at 1, so values
//! near zero are compared absolutely and large values relatively. This is
//! the metric used to compare analytic gradients with finite differences.

use crate::float::Element;

/// Step used for central finite differences.
pub const FINITE_DIFF_STEP: f64 = 1e-4;

/// Accepted relative error between an analytic and a numeric gradient.
pub const GRADIENT_THRESHOLD: f64 = 1e-2;

/// `|a - b| / max(|a|, |b|, 1)`.
pub fn relative_error<T: Element>(a: T, b: T) -> T {
    let scale = a.abs().max(b.abs()).max(T::one());
    (a - b).abs() / scale
}

/// Checks the relative distance against `threshold`.
pub fn approx_eq<T: Element>(a: T, b: T, threshold: T) -> bool {
    relative_error(a, b) <= threshold
}

/// Largest [`relative_error`] over two slices, with the index where it occurs.
///
/// Returns `None` if the slices differ in length or are empty.
pub fn max_relative_error<T: Element>(a: &[T], b: &[T]) -> Option<(usize, T)> {
    if a.len() != b.len() {
        return None;
    }
    a.iter()
        .zip(b)
        .map(|(&x, &y)| relative_error(x, y))
        .enumerate()
        .fold(None, |worst, (i, err)| match worst {
            Some((_, w)) if w >= err => worst,
            _ => Some((i, err)),
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn small_values_compare_absolutely() {
        assert!(approx_eq(1e-5f64, 2e-5, 1e-4));
        assert!(!approx_eq(0.0f64, 0.02, 1e-2));
    }

    #[test]
    fn large_values_compare_relatively() {
        assert!(approx_eq(1000.0f32, 1005.0, 1e-2));
        assert!(!approx_eq(1000.0f32, 1050.0, 1e-2));
    }

    #[test]
    fn worst_index_reported() {
        let (i, err) = max_relative_error(&[1.0f64, 2.0, 3.0], &[1.0, 2.5, 3.0]).unwrap();
        assert_eq!(i, 1);
        assert!((err - 0.2).abs() < 1e-12);
        assert!(max_relative_error(&[1.0f64], &[]).is_none());
    }
}
