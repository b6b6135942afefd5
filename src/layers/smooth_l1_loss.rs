use crate::config::SmoothL1LossParam;
use crate::error::{OpError, Result};
use crate::float::Element;
use crate::ops::cpu::{smooth_l1_backward, smooth_l1_forward_into, LossWeights};
use crate::tensors::Tensor;

/// Smooth-L1 loss layer.
///
/// Retains the weighted difference `d` and the per-element loss of the last
/// forward call; backward reads `d` without modifying it.
///
/// # Example
/// ```rust
/// use briny_rcnn::config::SmoothL1LossParam;
/// use briny_rcnn::layers::SmoothL1Loss;
/// use briny_rcnn::tensors::Tensor;
/// use briny_rcnn::tensor;
///
/// let mut loss = SmoothL1Loss::<f64>::new(SmoothL1LossParam::default()).unwrap();
/// let a = tensor!([[2.0], [0.0]]);
/// let b = tensor!([[0.0], [0.5]]);
/// // (1.5 + 0.125) / 2
/// assert_eq!(loss.forward(&a, &b, None).unwrap(), 0.8125);
///
/// let mut grad_b = Tensor::default();
/// loss.backward(1.0, None, Some(&mut grad_b), None).unwrap();
/// assert_eq!(grad_b.data, vec![-0.5, 0.25]);
/// ```
#[derive(Debug, Clone)]
pub struct SmoothL1Loss<T> {
    param: SmoothL1LossParam,
    sigma2: T,
    diff: Tensor<T>,
    errors: Tensor<T>,
    forwarded: bool,
}

impl<T: Element> SmoothL1Loss<T> {
    /// Sets up the loss.
    ///
    /// # Errors
    /// [`OpError::InvalidConfig`] if `sigma` is not positive, or `sigma²`
    /// under- or overflows the element type.
    pub fn new(param: SmoothL1LossParam) -> Result<Self> {
        param.check()?;
        let sigma2 = T::from_f64(param.sigma2());
        if !(sigma2 > T::zero() && sigma2.is_finite() && sigma2.recip().is_finite()) {
            return Err(OpError::InvalidConfig(format!(
                "sigma {} is not representable in the element type",
                param.sigma
            )));
        }
        log::debug!(
            "smooth_l1 loss set up: sigma {}, weighted {}",
            param.sigma,
            param.weighted
        );
        Ok(Self {
            param,
            sigma2,
            diff: Tensor::default(),
            errors: Tensor::default(),
            forwarded: false,
        })
    }

    /// The parameters this loss was built with.
    pub fn param(&self) -> &SmoothL1LossParam {
        &self.param
    }

    fn check_weights(&self, weights: Option<&LossWeights<'_, T>>) -> Result<()> {
        match (self.param.weighted, weights.is_some()) {
            (true, false) => Err(OpError::InvalidConfig(
                "weighted loss requires inside and outside weights".into(),
            )),
            (false, true) => Err(OpError::InvalidConfig(
                "weights given to an unweighted loss".into(),
            )),
            _ => Ok(()),
        }
    }

    /// Computes the loss between `a` and `b`.
    ///
    /// `weights` must be given exactly when the loss was configured as weighted.
    ///
    /// # Errors
    /// - [`OpError::InvalidConfig`] if weight presence does not match the configuration
    /// - See [`crate::ops::cpu::smooth_l1_forward`]
    pub fn forward(
        &mut self,
        a: &Tensor<T>,
        b: &Tensor<T>,
        weights: Option<LossWeights<'_, T>>,
    ) -> Result<T> {
        self.check_weights(weights.as_ref())?;
        let loss = smooth_l1_forward_into(
            a,
            b,
            self.sigma2,
            weights,
            &mut self.diff,
            &mut self.errors,
        )?;
        self.forwarded = true;
        Ok(loss)
    }

    /// Writes the gradient of the last loss into `grad_a` and/or `grad_b`.
    ///
    /// `upstream` is the gradient flowing into the scalar loss. A side passed
    /// as `None` is left untouched. The weights must be the ones forward used.
    ///
    /// # Errors
    /// - [`OpError::NoForwardState`] before the first successful forward
    /// - [`OpError::InvalidConfig`] if weight presence does not match the configuration
    /// - See [`crate::ops::cpu::smooth_l1_backward`]
    pub fn backward(
        &self,
        upstream: T,
        grad_a: Option<&mut Tensor<T>>,
        grad_b: Option<&mut Tensor<T>>,
        weights: Option<LossWeights<'_, T>>,
    ) -> Result<()> {
        if !self.forwarded {
            return Err(OpError::NoForwardState("smooth_l1_loss"));
        }
        self.check_weights(weights.as_ref())?;
        smooth_l1_backward(&self.diff, upstream, self.sigma2, grad_a, grad_b, weights)
    }

    /// Weighted difference `w_in * (a - b)` of the last forward call.
    pub fn diff(&self) -> Option<&Tensor<T>> {
        self.forwarded.then_some(&self.diff)
    }

    /// Per-element loss of the last forward call, before reduction.
    pub fn errors(&self) -> Option<&Tensor<T>> {
        self.forwarded.then_some(&self.errors)
    }
}
