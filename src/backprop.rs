//! Differentiable operations with backward closures.
//!
//! # Closure API
//!
//! Each operation follows the same pattern as the rest of the crate family:
//! 1. **Inputs** are references to `WithGrad<Tensor<T>>` for differentiable tensors.
//! 2. **Forward Pass** computes the output.
//! 3. **Backward Pass** is a returned closure that owns exactly the state it needs.
//! 4. **Gradient Application** uses [`WithGrad::accumulate`] on the results.
//!
//! These are convenience wrappers over [`crate::layers`]; use the layers
//! directly to reuse buffers across iterations or to skip one side of the
//! loss gradient.
//!
//! ## Usage Guidelines
//!
//! - Shape and parameter errors are returned before any work is done.
//! - The backward closures implement `Fn` and may be called more than once.
//! - Region coordinates receive no gradient.

use crate::config::{RoiPoolingParam, SmoothL1LossParam};
use crate::error::Result;
use crate::float::Element;
use crate::layers::{RoiPooling, SmoothL1Loss};
use crate::ops::cpu::LossWeights;
use crate::tensors::{Tensor, WithGrad};

/// Backward closure of a tensor-valued op: `dL/d(out)` to `dL/d(input)`.
pub type TensorBackFn<'a, T> = dyn Fn(&Tensor<T>) -> Result<Tensor<T>> + 'a;

/// Backward closure of a scalar loss: `dL/d(loss)` to `(dL/da, dL/db)`.
pub type LossBackFn<'a, T> = dyn Fn(T) -> Result<(Tensor<T>, Tensor<T>)> + 'a;

fn pool<'a, T: Element, const D: usize>(
    features: &WithGrad<Tensor<T>>,
    rois: &'a Tensor<T>,
    param: RoiPoolingParam<D>,
) -> Result<(Tensor<T>, Box<TensorBackFn<'a, T>>)> {
    let mut layer = RoiPooling::<T, D>::new(param)?;
    let out = layer.forward(&features.value, rois)?.clone();
    let back = move |grad_output: &Tensor<T>| layer.backward(grad_output, rois);
    Ok((out, Box::new(back)))
}

/// Max-pools each `[batch, x1, y1, x2, y2]` region of `(N, C, H, W)` features.
///
/// # Returns
/// - `out`: pooled tensor `(R, C, pooled_h, pooled_w)`
/// - `back`: closure routing `dL/d(out)` to `dL/d(features)` through the argmax cells
///
/// # Errors
/// Invalid parameters, mismatched shapes or undecodable regions.
///
/// # Example
/// ```rust
/// use briny_rcnn::backprop::roi_pool;
/// use briny_rcnn::config::RoiPoolingParam;
/// use briny_rcnn::tensors::WithGrad;
/// use briny_rcnn::tensor;
///
/// let features = WithGrad::new(tensor!([[[[1.0, 8.0], [3.0, 2.0]]]]));
/// let rois = tensor!([[0.0, 0.0, 0.0, 1.0, 1.0], [0.0, 1.0, 0.0, 1.0, 1.0]]);
/// let (out, back) = roi_pool(&features, &rois, RoiPoolingParam::new(1, 1)).unwrap();
/// assert_eq!(out.data, vec![8.0, 8.0]);
/// let grad = back(&tensor!([[[[1.0]]], [[[2.0]]]])).unwrap();
/// assert_eq!(grad.data, vec![0.0, 3.0, 0.0, 0.0]);
/// ```
pub fn roi_pool<'a, T: Element>(
    features: &WithGrad<Tensor<T>>,
    rois: &'a Tensor<T>,
    param: RoiPoolingParam<2>,
) -> Result<(Tensor<T>, Box<TensorBackFn<'a, T>>)> {
    pool(features, rois, param)
}

/// Max-pools each `[batch, z1, y1, x1, z2, y2, x2]` region of `(N, C, D, H, W)` features.
///
/// # Returns
/// - `out`: pooled tensor `(R, C, pooled_d, pooled_h, pooled_w)`
/// - `back`: closure routing `dL/d(out)` to `dL/d(features)`
///
/// # Errors
/// Invalid parameters, mismatched shapes or undecodable regions.
pub fn roi_pool_3d<'a, T: Element>(
    features: &WithGrad<Tensor<T>>,
    rois: &'a Tensor<T>,
    param: RoiPoolingParam<3>,
) -> Result<(Tensor<T>, Box<TensorBackFn<'a, T>>)> {
    pool(features, rois, param)
}

/// Computes the smooth-L1 loss between `a` and `b`.
///
/// `weights` must be `Some` exactly when `param.weighted` is set; the same
/// pair is reused by the backward closure.
///
/// # Returns
/// - Scalar loss, summed and divided by the leading dimension of `a`
/// - Closure mapping `dL/dloss` to `(dL/da, dL/db)`
///
/// # Errors
/// Invalid `sigma`, mismatched shapes or mismatched weight presence.
///
/// # Example
/// ```rust
/// use briny_rcnn::backprop::smooth_l1_loss;
/// use briny_rcnn::config::SmoothL1LossParam;
/// use briny_rcnn::tensors::WithGrad;
/// use briny_rcnn::tensor;
///
/// let pred = WithGrad::new(tensor!([[0.5, -2.0]]));
/// let target = WithGrad::new(tensor!([[0.0, 0.0]]));
/// let (loss, back) = smooth_l1_loss(&pred, &target, SmoothL1LossParam::default(), None).unwrap();
/// assert_eq!(loss, 1.625);
/// let (grad_pred, grad_target) = back(1.0).unwrap();
/// assert_eq!(grad_pred.data, vec![0.5, -1.0]);
/// assert_eq!(grad_target.data, vec![-0.5, 1.0]);
/// ```
pub fn smooth_l1_loss<'a, T: Element>(
    a: &WithGrad<Tensor<T>>,
    b: &WithGrad<Tensor<T>>,
    param: SmoothL1LossParam,
    weights: Option<LossWeights<'a, T>>,
) -> Result<(T, Box<LossBackFn<'a, T>>)> {
    let mut layer = SmoothL1Loss::new(param)?;
    let loss = layer.forward(&a.value, &b.value, weights)?;

    let back = move |grad_output: T| {
        let mut grad_a = Tensor::default();
        let mut grad_b = Tensor::default();
        layer.backward(grad_output, Some(&mut grad_a), Some(&mut grad_b), weights)?;
        Ok((grad_a, grad_b))
    };

    Ok((loss, Box::new(back)))
}
