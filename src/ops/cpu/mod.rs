//! Parallel CPU kernels
//!
//! # CPU Backend
//!
//! This module provides the CPU implementations of the region pooling and
//! smooth-L1 operators. The layers in [`crate::layers`] and the closures in
//! [`crate::backprop`] are thin wrappers over these functions.
//!
//! ## Features
//!
//! - Parallel execution using [`rayon`](https://docs.rs/rayon)
//! - Generic over the element type (`f32`, `f64`)
//! - One pooling kernel for planar and volumetric feature maps
//!
//! ## Implemented Ops
//!
//! - `roi_pool_forward`: adaptive max pooling over regions, with argmax map
//! - `roi_pool_backward`: argmax-routed gradient, summed where regions overlap
//! - `smooth_l1_forward`: smooth-L1 loss with optional inside/outside weights
//! - `smooth_l1_backward`: analytic gradient for either compared tensor
//!
//! ## Design Goals
//!
//! - Deterministic results: no kernel depends on scheduling order
//! - Every input is validated before any output buffer is written
//! - The `_into` variants reuse caller-owned buffers across calls

mod roi_pool;
pub use self::roi_pool::{roi_pool_backward, roi_pool_forward, roi_pool_forward_into, ArgmaxMap};

mod smooth_l1;
pub use self::smooth_l1::{
    smooth_l1, smooth_l1_backward, smooth_l1_forward, smooth_l1_forward_into, smooth_l1_grad,
    LossWeights,
};
