//! briny_rcnn: region pooling and robust regression loss for object detection.
//!
//! The two operators at the heart of a Fast R-CNN style detection head, with
//! manual backpropagation in the same style as the rest of the briny family.
//!
//! # Features
//!
//! - Adaptive max pooling over arbitrary regions of planar `(N, C, H, W)` and
//!   volumetric `(N, C, D, H, W)` feature maps, with argmax-routed gradients.
//! - Smooth-L1 loss with a tunable transition point and optional
//!   inside/outside weight masks.
//! - Generic over `f32` and `f64`; every kernel runs on the rayon pool.
//!
//! # Modules
//!
//! - [`tensors`] — Core tensor data structures.
//! - [`roi`] — Decoding of region records.
//! - [`ops`] — The numerical kernels.
//! - [`layers`] — Operators that keep their forward state for backward.
//! - [`backprop`] — Forward/backward-closure API.
//! - [`config`] — Operator parameters.
//! - [`error`] — The crate error type.
//! - [`float`] — Supported element types.
//! - [`approx`] — Tolerance checks for gradient comparison.
//!
//! # Example
//!
//! ```rust
//! use briny_rcnn::config::RoiPoolingParam;
//! use briny_rcnn::layers::RoiPooling2d;
//! use briny_rcnn::tensors::Tensor;
//!
//! let features = Tensor::new(vec![1, 1, 4, 4], (0..16).map(|x| x as f32).collect());
//! let rois = Tensor::new(vec![1, 5], vec![0.0, 0.0, 0.0, 3.0, 3.0]);
//!
//! let mut pool = RoiPooling2d::new(RoiPoolingParam::new(2, 2)).unwrap();
//! let out = pool.forward(&features, &rois).unwrap();
//! assert_eq!(out.data, vec![5.0, 7.0, 13.0, 15.0]);
//! ```

pub mod approx;
pub mod backprop;
pub mod config;
pub mod error;
pub mod float;
pub mod layers;
pub mod ops;
pub mod roi;
pub mod tensors;

pub use error::{OpError, Result};
pub use float::Element;
