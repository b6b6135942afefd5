//! Operator parameters.
//!
//! These mirror the parameter messages a layer framework hands to an operator
//! at setup time. Validation happens when a layer is constructed, never on
//! the forward path.

use briny::prelude::{Validate, ValidationError};

use crate::error::{OpError, Result};

/// Parameters of the region max-pooling operator.
///
/// `pooled` lists the output size per spatial axis, outermost first:
/// `[pooled_h, pooled_w]` for planar feature maps and
/// `[pooled_d, pooled_h, pooled_w]` for volumetric ones.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RoiPoolingParam<const D: usize> {
    pub pooled: [usize; D],
    pub spatial_scale: f64,
}

impl RoiPoolingParam<2> {
    /// Planar pooling to `pooled_h × pooled_w` with a spatial scale of 1.
    pub fn new(pooled_h: usize, pooled_w: usize) -> Self {
        Self {
            pooled: [pooled_h, pooled_w],
            spatial_scale: 1.0,
        }
    }
}

impl RoiPoolingParam<3> {
    /// Volumetric pooling to `pooled_d × pooled_h × pooled_w` with a spatial scale of 1.
    pub fn new_3d(pooled_d: usize, pooled_h: usize, pooled_w: usize) -> Self {
        Self {
            pooled: [pooled_d, pooled_h, pooled_w],
            spatial_scale: 1.0,
        }
    }
}

impl<const D: usize> RoiPoolingParam<D> {
    /// Sets the factor mapping region coordinates onto the feature map.
    #[must_use]
    pub fn with_spatial_scale(mut self, spatial_scale: f64) -> Self {
        self.spatial_scale = spatial_scale;
        self
    }

    /// Validates the parameters, naming the offending field on failure.
    ///
    /// # Errors
    /// [`OpError::InvalidConfig`] for a rank other than 2 or 3, a zero pooled
    /// size, or a non-positive scale.
    pub fn check(&self) -> Result<()> {
        if self.validate().is_ok() {
            return Ok(());
        }
        if D != 2 && D != 3 {
            return Err(OpError::InvalidConfig(format!(
                "region pooling supports 2 or 3 spatial axes, not {D}"
            )));
        }
        if let Some(axis) = self.pooled.iter().position(|&p| p == 0) {
            return Err(OpError::InvalidConfig(format!(
                "pooled size must be positive on every axis, axis {axis} is 0"
            )));
        }
        Err(OpError::InvalidConfig(format!(
            "spatial_scale must be positive and finite, got {}",
            self.spatial_scale
        )))
    }
}

impl<const D: usize> Validate for RoiPoolingParam<D> {
    fn validate(&self) -> core::result::Result<(), ValidationError> {
        if D != 2 && D != 3 {
            return Err(ValidationError);
        }
        if self.pooled.iter().any(|&p| p == 0) {
            return Err(ValidationError);
        }
        if !(self.spatial_scale.is_finite() && self.spatial_scale > 0.0) {
            return Err(ValidationError);
        }
        Ok(())
    }
}

/// Parameters of the smooth-L1 loss.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SmoothL1LossParam {
    /// Width control of the quadratic region: it spans `|d| < 1 / sigma²`.
    pub sigma: f64,
    /// Whether forward and backward take an inside/outside weight pair.
    pub weighted: bool,
}

impl Default for SmoothL1LossParam {
    fn default() -> Self {
        Self {
            sigma: 1.0,
            weighted: false,
        }
    }
}

impl SmoothL1LossParam {
    /// Unweighted loss with the given `sigma`.
    pub fn new(sigma: f64) -> Self {
        Self {
            sigma,
            weighted: false,
        }
    }

    /// Toggles the inside/outside weighted path.
    #[must_use]
    pub fn weighted(mut self, weighted: bool) -> Self {
        self.weighted = weighted;
        self
    }

    /// `sigma²`.
    pub fn sigma2(&self) -> f64 {
        self.sigma * self.sigma
    }

    /// Validates the parameters.
    ///
    /// # Errors
    /// [`OpError::InvalidConfig`] if `sigma` is not a positive finite number.
    pub fn check(&self) -> Result<()> {
        self.validate().map_err(|_| {
            OpError::InvalidConfig(format!(
                "sigma must be positive and finite, got {}",
                self.sigma
            ))
        })
    }
}

impl Validate for SmoothL1LossParam {
    fn validate(&self) -> core::result::Result<(), ValidationError> {
        // sigma² must also stay finite and non-zero, or 1/sigma² degenerates
        let sigma2 = self.sigma2();
        if self.sigma > 0.0 && sigma2.is_finite() && sigma2 > 0.0 {
            Ok(())
        } else {
            Err(ValidationError)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_pooled_size_rejected() {
        let err = RoiPoolingParam::new(0, 4).check().unwrap_err();
        assert!(matches!(err, OpError::InvalidConfig(_)));
        assert!(RoiPoolingParam::new_3d(3, 3, 4).check().is_ok());
    }

    #[test]
    fn bad_spatial_scale_rejected() {
        assert!(RoiPoolingParam::new(2, 2).with_spatial_scale(0.0).check().is_err());
        assert!(RoiPoolingParam::new(2, 2).with_spatial_scale(f64::NAN).check().is_err());
        assert!(RoiPoolingParam::new(2, 2).with_spatial_scale(0.0625).check().is_ok());
    }

    #[test]
    fn only_planar_and_volumetric_ranks() {
        let param = RoiPoolingParam { pooled: [2; 4], spatial_scale: 1.0 };
        assert!(param.validate().is_err());
        assert!(matches!(param.check(), Err(OpError::InvalidConfig(_))));
    }

    #[test]
    fn sigma_must_be_positive() {
        assert!(SmoothL1LossParam::new(0.0).check().is_err());
        assert!(SmoothL1LossParam::new(-1.0).check().is_err());
        assert!(SmoothL1LossParam::new(f64::INFINITY).check().is_err());
        assert!(SmoothL1LossParam::default().check().is_ok());
        assert_eq!(SmoothL1LossParam::new(3.0).sigma2(), 9.0);
    }
}
