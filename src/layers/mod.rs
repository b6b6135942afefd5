//! Stateful operators.
//!
//! A layer owns the buffers its backward pass reads: they are written by
//! `forward`, stay valid until the next `forward`, and `backward` only reads
//! them. Calling `backward` on a fresh layer is an error.

mod roi_pooling;
pub use roi_pooling::*;

mod smooth_l1_loss;
pub use smooth_l1_loss::*;
