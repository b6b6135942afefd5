//! # Operator Kernels
//!
//! This module holds the numerical kernels behind every operator.
//!
//! ## Submodules
//!
//! - [`cpu`] — Multi-threaded CPU operations
//!
//! ## Extending
//!
//! To add a new operation:
//!
//! 1. Implement the forward and backward kernels in `cpu`
//! 2. Validate shapes and parameters before touching any output
//! 3. Wrap it as a layer in [`crate::layers`] if it retains state between passes,
//!    and as a closure in [`crate::backprop`]
//!
//! ## Notes
//!
//! - Kernels never mutate their inputs
//! - Forward kernels return whatever state their backward kernel needs

pub mod cpu;
