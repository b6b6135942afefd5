use crate::config::RoiPoolingParam;
use crate::error::{OpError, Result};
use crate::float::Element;
use crate::ops::cpu::{roi_pool_backward, roi_pool_forward_into, ArgmaxMap};
use crate::tensors::Tensor;

/// Region max pooling with `D` spatial axes.
///
/// Keeps the argmax map and the feature shape of the last forward call so
/// the gradient can be routed without the features themselves.
///
/// # Example
/// ```rust
/// use briny_rcnn::config::RoiPoolingParam;
/// use briny_rcnn::layers::RoiPooling2d;
/// use briny_rcnn::tensor;
///
/// let mut layer = RoiPooling2d::<f32>::new(RoiPoolingParam::new(1, 2)).unwrap();
/// let features = tensor!([[[[1.0, 2.0], [4.0, 3.0]]]]);
/// let rois = tensor!([[0.0, 0.0, 0.0, 1.0, 1.0]]);
/// let pooled = layer.forward(&features, &rois).unwrap();
/// assert_eq!(pooled.data, vec![4.0, 3.0]);
///
/// let grad = layer.backward(&tensor!([[[[1.0, 1.0]]]]), &rois).unwrap();
/// assert_eq!(grad.data, vec![0.0, 0.0, 1.0, 1.0]);
/// ```
#[derive(Debug, Clone)]
pub struct RoiPooling<T, const D: usize> {
    param: RoiPoolingParam<D>,
    spatial_scale: T,
    pooled: Tensor<T>,
    argmax: ArgmaxMap,
    feature_shape: Option<Vec<usize>>,
}

/// Pooling over `(N, C, H, W)` feature maps with `[batch, x1, y1, x2, y2]` records.
pub type RoiPooling2d<T> = RoiPooling<T, 2>;

/// Pooling over `(N, C, D, H, W)` feature maps with
/// `[batch, z1, y1, x1, z2, y2, x2]` records.
pub type RoiPooling3d<T> = RoiPooling<T, 3>;

impl<T: Element, const D: usize> RoiPooling<T, D> {
    /// Sets up the layer.
    ///
    /// # Errors
    /// [`OpError::InvalidConfig`] for a zero pooled size, a non-positive
    /// spatial scale, or a rank other than 2 or 3.
    pub fn new(param: RoiPoolingParam<D>) -> Result<Self> {
        param.check()?;
        let spatial_scale = T::from_f64(param.spatial_scale);
        if !(spatial_scale.is_finite() && spatial_scale > T::zero()) {
            return Err(OpError::InvalidConfig(format!(
                "spatial_scale {} is not representable",
                param.spatial_scale
            )));
        }
        log::debug!(
            "roi pooling set up: pooled {:?}, spatial_scale {}",
            param.pooled,
            param.spatial_scale
        );
        Ok(Self {
            param,
            spatial_scale,
            pooled: Tensor::default(),
            argmax: Tensor::default(),
            feature_shape: None,
        })
    }

    /// The parameters this layer was built with.
    pub fn param(&self) -> &RoiPoolingParam<D> {
        &self.param
    }

    /// Pools `features` over every record in `rois`.
    ///
    /// Returns a view of the pooled output, `(R, C, pooled...)`. On error no
    /// retained state changes.
    ///
    /// # Errors
    /// See [`crate::ops::cpu::roi_pool_forward`].
    pub fn forward(&mut self, features: &Tensor<T>, rois: &Tensor<T>) -> Result<&Tensor<T>> {
        roi_pool_forward_into(
            features,
            rois,
            self.param.pooled,
            self.spatial_scale,
            &mut self.pooled,
            &mut self.argmax,
        )?;
        self.feature_shape = Some(features.shape.clone());
        Ok(&self.pooled)
    }

    /// Routes `output_grad` to the cells selected by the last forward call.
    ///
    /// `rois` must be the records that forward call received.
    ///
    /// # Errors
    /// - [`OpError::NoForwardState`] before the first successful forward
    /// - See [`crate::ops::cpu::roi_pool_backward`]
    pub fn backward(&self, output_grad: &Tensor<T>, rois: &Tensor<T>) -> Result<Tensor<T>> {
        let feature_shape = self
            .feature_shape
            .as_deref()
            .ok_or(OpError::NoForwardState("roi_pooling"))?;
        roi_pool_backward::<T, D>(&self.argmax, output_grad, feature_shape, rois)
    }

    /// Output of the last forward call.
    pub fn output(&self) -> Option<&Tensor<T>> {
        self.feature_shape.as_ref().map(|_| &self.pooled)
    }

    /// Argmax map of the last forward call.
    pub fn argmax(&self) -> Option<&ArgmaxMap> {
        self.feature_shape.as_ref().map(|_| &self.argmax)
    }
}
