//! Core tensor data structures.
//!
//! # Tensor View
//!
//! A minimal N-dimensional dense array: a shape and a flat row-major buffer.
//! The operators only need shape queries, flat index arithmetic and the
//! ability to resize a retained buffer without giving its allocation back.
//!
//! ## Design Highlights
//! - Tensors are strongly typed: `Tensor<T>` for any element type (usually `f32` or `f64`,
//!   but the argmax map is a `Tensor<Option<usize>>`)
//! - Shape is stored as a `Vec<usize>` and enforced at runtime
//! - `WithGrad<T>` pairs any value with its gradient
//! - The `tensor!` macro supports ergonomic tensor creation from nested arrays
//!
//! ## Limitations
//! - Row-major only
//! - No broadcasting or slicing
//!
//! ## Example
//!
//! ```rust
//! use briny_rcnn::tensors::Tensor;
//! let t = Tensor::new(vec![2, 3], vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
//! assert_eq!(t.shape, vec![2, 3]);
//! assert_eq!(t.offset(&[1, 2]), 5);
//! ```

use crate::error::{OpError, Result};

/// Represents an N-dimensional tensor with a shape and flat row-major data.
///
/// - All elements must be the same type (`T`).
/// - `shape` defines the structure, e.g., `[2, 3]` for a 2×3 matrix.
/// - `data` holds the flattened content in row-major order.
#[derive(Debug, Clone, PartialEq)]
pub struct Tensor<T> {
    pub shape: Vec<usize>,
    pub data: Vec<T>,
}

impl<T> Default for Tensor<T> {
    /// An empty rank-1 tensor, used as the initial state of retained buffers.
    fn default() -> Self {
        Self {
            shape: vec![0],
            data: Vec::new(),
        }
    }
}

impl<T> Tensor<T> {
    /// Creates a new tensor with the given shape and flat data.
    ///
    /// # Panics
    /// Panics if the number of elements in `data` does not match the shape product.
    pub fn new(shape: impl Into<Vec<usize>>, data: Vec<T>) -> Self {
        let shape = shape.into();
        assert_eq!(
            shape.iter().product::<usize>(),
            data.len(),
            "shape {:?} is incompatible with {} data elements",
            shape,
            data.len()
        );
        Self { shape, data }
    }

    /// Fallible form of [`Tensor::new`].
    ///
    /// # Errors
    /// [`OpError::ShapeMismatch`] if `data.len()` is not the shape product.
    pub fn try_new(shape: impl Into<Vec<usize>>, data: Vec<T>) -> Result<Self> {
        let shape = shape.into();
        let expected = shape.iter().product::<usize>();
        if expected != data.len() {
            return Err(OpError::ShapeMismatch {
                op: "tensor",
                expected: format!("{expected} elements for shape {shape:?}"),
                found: format!("{} elements", data.len()),
            });
        }
        Ok(Self { shape, data })
    }

    /// Number of stored elements.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// `true` when the tensor holds no elements.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Number of axes.
    pub fn rank(&self) -> usize {
        self.shape.len()
    }

    /// Row-major strides of the tensor.
    pub fn strides(&self) -> Vec<usize> {
        let mut strides = vec![1; self.shape.len()];
        for i in (0..self.shape.len().saturating_sub(1)).rev() {
            strides[i] = strides[i + 1] * self.shape[i + 1];
        }
        strides
    }

    /// Flat row-major offset of a multi-index.
    ///
    /// # Panics
    /// Panics if `index` has the wrong rank or an axis is out of bounds.
    pub fn offset(&self, index: &[usize]) -> usize {
        assert_eq!(index.len(), self.shape.len(), "index rank mismatch");
        index
            .iter()
            .zip(&self.shape)
            .fold(0, |acc, (&i, &dim)| {
                assert!(i < dim, "index {i} out of bounds for axis of size {dim}");
                acc * dim + i
            })
    }
}

impl<T: Clone> Tensor<T> {
    /// Creates a tensor of the given shape with every element set to `value`.
    pub fn full(shape: impl Into<Vec<usize>>, value: T) -> Self {
        let shape = shape.into();
        let len = shape.iter().product();
        Self {
            shape,
            data: vec![value; len],
        }
    }

    /// Reshapes in place and overwrites every element with `value`.
    ///
    /// The backing allocation is kept, so a buffer that is refilled on every
    /// forward call only grows when a larger input arrives.
    pub fn reshape_fill(&mut self, shape: &[usize], value: T) {
        let len = shape.iter().product();
        self.shape.clear();
        self.shape.extend_from_slice(shape);
        self.data.clear();
        self.data.resize(len, value);
    }
}

impl<T: Clone + num_traits::Zero> Tensor<T> {
    /// Creates a zero-filled tensor.
    pub fn zeros(shape: impl Into<Vec<usize>>) -> Self {
        Self::full(shape, T::zero())
    }
}

/// A container for tracking gradients of values.
///
/// Typically used as `WithGrad<Tensor<f32>>`; the loss writes the gradient of
/// each compared tensor straight into its `grad`.
#[derive(Debug, Clone, PartialEq)]
pub struct WithGrad<T> {
    pub value: T,
    pub grad: T,
}

impl<T: Clone + num_traits::Zero> WithGrad<Tensor<T>> {
    /// Wraps a tensor with a zeroed gradient of the same shape.
    pub fn new(value: Tensor<T>) -> Self {
        let grad = Tensor::zeros(value.shape.clone());
        Self { value, grad }
    }
}

impl<T: Copy + core::ops::Add<Output = T>> WithGrad<Tensor<T>> {
    /// Adds `delta` into the stored gradient.
    ///
    /// # Errors
    /// [`OpError::ShapeMismatch`] if `delta` does not have the gradient's shape.
    pub fn accumulate(&mut self, delta: &Tensor<T>) -> Result<()> {
        if delta.shape != self.grad.shape {
            return Err(OpError::shape(
                "accumulate",
                format!("{:?}", self.grad.shape),
                &delta.shape,
            ));
        }
        for (g, &d) in self.grad.data.iter_mut().zip(&delta.data) {
            *g = *g + d;
        }
        Ok(())
    }
}

/// Defines a tensor from nested literal arrays.
///
/// Supports arbitrary dimensionality as long as sublists are uniform in shape.
///
/// # Example
/// ```
/// use briny_rcnn::tensor;
/// let t = tensor!([[1.0, 2.0], [3.0, -4.0]]);
/// assert_eq!(t.shape, vec![2, 2]);
/// assert_eq!(t.data, vec![1.0, 2.0, 3.0, -4.0]);
/// ```
#[macro_export]
macro_rules! tensor {
    ([ $( [ $($inner:tt)* ] ),+ $(,)? ]) => {{
        let children = vec![ $( $crate::tensor!([ $($inner)* ]) ),+ ];
        let first_shape = &children[0].shape;
        assert!(children.iter().all(|c| c.shape == *first_shape),
            "ragged tensor literal (rows have mismatched shapes)");
        let mut shape = vec![children.len()];
        shape.extend_from_slice(first_shape);
        let mut data = Vec::with_capacity(children.len() * children[0].data.len());
        for c in children { data.extend(c.data); }
        $crate::tensors::Tensor::new(shape, data)
    }};

    ([ $( $x:expr ),+ $(,)? ]) => {{
        let data = vec![ $( $x ),+ ];
        $crate::tensors::Tensor::new(vec![data.len()], data)
    }};
}
