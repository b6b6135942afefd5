//! Element types the operators are generic over.
//!
//! Every kernel is written once against [`Element`] and instantiated for
//! `f32` and `f64`; the piecewise formulas are the same for both.

use core::fmt::Debug;
use num_traits::Float;

/// Conversions through `f64`, the precision parameters are stored in.
pub trait IntermediateFp {
    /// Convert to `f64`.
    fn into_f64(self) -> f64;
    /// Convert from `f64`.
    fn from_f64(x: f64) -> Self;
}

impl IntermediateFp for f32 {
    #[allow(clippy::cast_possible_truncation)]
    fn from_f64(x: f64) -> Self {
        x as Self
    }

    fn into_f64(self) -> f64 {
        self.into()
    }
}

impl IntermediateFp for f64 {
    fn from_f64(x: Self) -> Self {
        x
    }

    fn into_f64(self) -> Self {
        self
    }
}

/// Scalar type accepted by the pooling and loss kernels.
///
/// `Send + Sync` is required because every kernel runs on the rayon pool.
pub trait Element: Float + IntermediateFp + Send + Sync + Debug + 'static {
    /// Lift a `usize` (an index or a count) into the element type.
    #[allow(clippy::cast_precision_loss)]
    fn from_usize(n: usize) -> Self {
        Self::from_f64(n as f64)
    }
}

impl Element for f32 {}
impl Element for f64 {}

/// `-1`, `0` or `1`; unlike [`Float::signum`], zero maps to zero.
#[inline]
pub fn sign<T: Element>(x: T) -> T {
    if x > T::zero() {
        T::one()
    } else if x < T::zero() {
        -T::one()
    } else {
        T::zero()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sign_of_zero_is_zero() {
        assert_eq!(sign(0.0f32), 0.0);
        assert_eq!(sign(-0.0f64), 0.0);
        assert_eq!(sign(-3.5f64), -1.0);
        assert_eq!(sign(2.0f32), 1.0);
    }

    #[test]
    fn usize_lift() {
        assert_eq!(f32::from_usize(12), 12.0);
        assert_eq!(f64::from_usize(0), 0.0);
    }

    #[test]
    fn narrowing_to_f32_rounds() {
        assert_eq!(f32::from_f64(0.1), 0.1f32);
        assert_eq!(f32::from_f64(1e60), f32::INFINITY);
        assert_eq!(0.25f32.into_f64(), 0.25);
    }
}
