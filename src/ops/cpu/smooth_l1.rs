//! Smooth-L1 loss with optional inside/outside weights.
//!
//! ```text
//! d = w_in * (a - b)
//! e = w_out * { 0.5 * sigma² * d²      if |d| < 1 / sigma²
//!             { |d| - 0.5 / sigma²     otherwise
//! loss = sum(e) / N                    N = a.shape[0]
//! ```
//!
//! Value and slope meet at `|d| = 1 / sigma²`, so the loss is quadratic near
//! zero and linear in the tails.

#![allow(clippy::similar_names)]

use rayon::prelude::*;

use crate::error::{OpError, Result};
use crate::float::{sign, Element};
use crate::tensors::Tensor;

/// The inside/outside weight pair of the weighted loss.
///
/// `inside` scales the difference before the nonlinearity, `outside` scales
/// each element's loss after it. Both must have the shape of the compared
/// tensors.
#[derive(Debug, Clone, Copy)]
pub struct LossWeights<'a, T> {
    pub inside: &'a Tensor<T>,
    pub outside: &'a Tensor<T>,
}

impl<'a, T> LossWeights<'a, T> {
    /// Pairs an inside and an outside weight tensor.
    pub fn new(inside: &'a Tensor<T>, outside: &'a Tensor<T>) -> Self {
        Self { inside, outside }
    }

    /// Builds the pair from optional halves.
    ///
    /// # Errors
    /// [`OpError::InvalidConfig`] when exactly one half is given.
    pub fn from_options(
        inside: Option<&'a Tensor<T>>,
        outside: Option<&'a Tensor<T>>,
    ) -> Result<Option<Self>> {
        match (inside, outside) {
            (Some(inside), Some(outside)) => Ok(Some(Self { inside, outside })),
            (None, None) => Ok(None),
            (Some(_), None) => Err(OpError::InvalidConfig(
                "inside weights given without outside weights".into(),
            )),
            (None, Some(_)) => Err(OpError::InvalidConfig(
                "outside weights given without inside weights".into(),
            )),
        }
    }

    fn check(&self, shape: &[usize], op: &'static str) -> Result<()> {
        for w in [self.inside, self.outside] {
            if w.shape != shape {
                return Err(OpError::shape(op, format!("weights of shape {shape:?}"), &w.shape));
            }
        }
        Ok(())
    }
}

/// Loss of one (weighted) difference.
#[inline]
pub fn smooth_l1<T: Element>(d: T, sigma2: T) -> T {
    let half = T::from_f64(0.5);
    let abs = d.abs();
    if abs < sigma2.recip() {
        half * d * d * sigma2
    } else {
        abs - half / sigma2
    }
}

/// Slope of [`smooth_l1`] at `d`.
#[inline]
pub fn smooth_l1_grad<T: Element>(d: T, sigma2: T) -> T {
    if d.abs() < sigma2.recip() {
        sigma2 * d
    } else {
        sign(d)
    }
}

fn batch_of(shape: &[usize], op: &'static str) -> Result<usize> {
    match shape.first() {
        Some(&n) if n > 0 => Ok(n),
        _ => Err(OpError::shape(op, "a non-empty leading batch axis", shape)),
    }
}

fn check_sigma2<T: Element>(sigma2: T) -> Result<()> {
    if sigma2 > T::zero() && sigma2.is_finite() && sigma2.recip().is_finite() {
        Ok(())
    } else {
        Err(OpError::InvalidConfig(format!(
            "sigma² must be positive and finite, got {sigma2:?}"
        )))
    }
}

/// Computes the smooth-L1 loss between `a` and `b`.
///
/// # Returns
/// - Scalar loss, normalised by the leading dimension of `a`
/// - The difference `d` (after inside weighting), needed by [`smooth_l1_backward`]
/// - The per-element loss before reduction
///
/// # Errors
/// - [`OpError::ShapeMismatch`] if `a`, `b` or the weights differ in shape, or `a` has no batch axis
/// - [`OpError::InvalidConfig`] if `sigma2` is not positive and finite
///
/// # Example
/// ```rust
/// use briny_rcnn::ops::cpu::smooth_l1_forward;
/// use briny_rcnn::tensor;
///
/// let a = tensor!([[0.5, 3.0]]);
/// let b = tensor!([[0.0, 0.0]]);
/// let (loss, _diff, errors) = smooth_l1_forward(&a, &b, 1.0, None).unwrap();
/// assert_eq!(errors.data, vec![0.125, 2.5]);
/// assert_eq!(loss, 2.625);
/// ```
pub fn smooth_l1_forward<T: Element>(
    a: &Tensor<T>,
    b: &Tensor<T>,
    sigma2: T,
    weights: Option<LossWeights<'_, T>>,
) -> Result<(T, Tensor<T>, Tensor<T>)> {
    let mut diff = Tensor::default();
    let mut errors = Tensor::default();
    let loss = smooth_l1_forward_into(a, b, sigma2, weights, &mut diff, &mut errors)?;
    Ok((loss, diff, errors))
}

/// [`smooth_l1_forward`] writing `d` and the per-element loss into caller-owned buffers.
///
/// The buffers are reshaped in place and left untouched on error.
///
/// # Errors
/// Same as [`smooth_l1_forward`].
pub fn smooth_l1_forward_into<T: Element>(
    a: &Tensor<T>,
    b: &Tensor<T>,
    sigma2: T,
    weights: Option<LossWeights<'_, T>>,
    diff: &mut Tensor<T>,
    errors: &mut Tensor<T>,
) -> Result<T> {
    const OP: &str = "smooth_l1_loss";
    check_sigma2(sigma2)?;
    if a.shape != b.shape {
        return Err(OpError::shape(OP, format!("{:?}", a.shape), &b.shape));
    }
    let batch = batch_of(&a.shape, OP)?;
    if let Some(w) = &weights {
        w.check(&a.shape, OP)?;
    }

    log::trace!(
        "smooth_l1 forward: shape {:?}, weighted: {}",
        a.shape,
        weights.is_some()
    );

    diff.reshape_fill(&a.shape, T::zero());
    errors.reshape_fill(&a.shape, T::zero());

    // d := a - b, then d := w_in * d
    diff.data
        .par_iter_mut()
        .zip(a.data.par_iter().zip(b.data.par_iter()))
        .for_each(|(d, (&x, &y))| *d = x - y);
    if let Some(w) = &weights {
        diff.data
            .par_iter_mut()
            .zip(w.inside.data.par_iter())
            .for_each(|(d, &w_in)| *d = w_in * *d);
    }

    errors
        .data
        .par_iter_mut()
        .zip(diff.data.par_iter())
        .for_each(|(e, &d)| *e = smooth_l1(d, sigma2));
    if let Some(w) = &weights {
        errors
            .data
            .par_iter_mut()
            .zip(w.outside.data.par_iter())
            .for_each(|(e, &w_out)| *e = w_out * *e);
    }

    let total = errors
        .data
        .par_iter()
        .copied()
        .reduce(T::zero, |x, y| x + y);

    Ok(total / T::from_usize(batch))
}

/// Propagates the upstream gradient of the loss to `a` and/or `b`.
///
/// Passing `Some(buffer)` requests the gradient for that input; the buffer is
/// reshaped to `diff` and overwritten. A `None` side is not computed. The
/// gradient for `b` is the negation of the one for `a`. `diff` is only read,
/// so the same forward state may be propagated more than once.
///
/// # Errors
/// - [`OpError::ShapeMismatch`] if the weights do not match `diff`, or `diff` has no batch axis
/// - [`OpError::InvalidConfig`] if `sigma2` is not positive and finite
pub fn smooth_l1_backward<T: Element>(
    diff: &Tensor<T>,
    upstream: T,
    sigma2: T,
    grad_a: Option<&mut Tensor<T>>,
    grad_b: Option<&mut Tensor<T>>,
    weights: Option<LossWeights<'_, T>>,
) -> Result<()> {
    const OP: &str = "smooth_l1_loss_backward";
    check_sigma2(sigma2)?;
    let batch = batch_of(&diff.shape, OP)?;
    if let Some(w) = &weights {
        w.check(&diff.shape, OP)?;
    }

    log::trace!(
        "smooth_l1 backward: shape {:?}, propagate a: {}, b: {}",
        diff.shape,
        grad_a.is_some(),
        grad_b.is_some()
    );

    let scale = upstream / T::from_usize(batch);
    for (grad, alpha) in [(grad_a, scale), (grad_b, -scale)] {
        let Some(grad) = grad else { continue };
        grad.reshape_fill(&diff.shape, T::zero());
        grad.data
            .par_iter_mut()
            .zip(diff.data.par_iter())
            .enumerate()
            .for_each(|(i, (g, &d))| {
                let mut v = alpha * smooth_l1_grad(d, sigma2);
                if let Some(w) = &weights {
                    v = v * w.inside.data[i];
                    v = v * w.outside.data[i];
                }
                *g = v;
            });
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn regimes_meet_at_threshold() {
        let sigma2 = 4.0f64;
        let t = 1.0 / sigma2;
        let eps = 1e-9;
        let below = smooth_l1(t - eps, sigma2);
        let above = smooth_l1(t + eps, sigma2);
        assert!((below - above).abs() < 1e-8);
        assert!((smooth_l1_grad(t - eps, sigma2) - smooth_l1_grad(t + eps, sigma2)).abs() < 1e-7);
    }

    #[test]
    fn slope_is_sign_in_linear_regime() {
        assert_eq!(smooth_l1_grad(-7.0f32, 1.0), -1.0);
        assert_eq!(smooth_l1_grad(7.0f32, 1.0), 1.0);
        assert_eq!(smooth_l1_grad(0.0f32, 1.0), 0.0);
    }

    #[test]
    fn partial_weight_pair_rejected() {
        let w: Tensor<f32> = Tensor::zeros(vec![1, 2]);
        assert!(LossWeights::from_options(Some(&w), None).is_err());
        assert!(LossWeights::from_options(None, Some(&w)).is_err());
        assert!(LossWeights::from_options(Some(&w), Some(&w)).unwrap().is_some());
        assert!(LossWeights::<f32>::from_options(None, None).unwrap().is_none());
    }
}
