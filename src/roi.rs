//! Region descriptors.
//!
//! A region record is one row of the `rois` tensor:
//!
//! ```text
//! planar      [batch_index, x1, y1, x2, y2]
//! volumetric  [batch_index, z1, y1, x1, z2, y2, x2]
//! ```
//!
//! Corners are inclusive and expressed in input-image units; multiplying by
//! `spatial_scale` maps them onto the feature map. Decoded regions store their
//! axes outermost first (`[h, w]` or `[d, h, w]`), matching the feature layout.

use core::ops::Range;

use crate::error::{OpError, Result};
use crate::float::Element;
use crate::tensors::Tensor;

/// Spatial layout of a `(N, C, spatial...)` feature tensor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeatureGeometry<const D: usize> {
    pub batch: usize,
    pub channels: usize,
    pub spatial: [usize; D],
}

impl<const D: usize> FeatureGeometry<D> {
    /// Reads the geometry of a feature tensor shape.
    ///
    /// # Errors
    /// [`OpError::ShapeMismatch`] if the rank is not `D + 2` or a spatial extent is zero.
    pub fn from_shape(shape: &[usize]) -> Result<Self> {
        if shape.len() != D + 2 {
            return Err(OpError::shape("roi_pool", format!("rank {}", D + 2), shape));
        }
        let spatial: [usize; D] = core::array::from_fn(|axis| shape[axis + 2]);
        if spatial.contains(&0) {
            return Err(OpError::shape(
                "roi_pool",
                "non-empty spatial extents",
                shape,
            ));
        }
        Ok(Self {
            batch: shape[0],
            channels: shape[1],
            spatial,
        })
    }

    /// Elements in one channel plane (`H*W` or `D*H*W`).
    pub fn plane(&self) -> usize {
        self.spatial.iter().product()
    }
}

/// One decoded region: an image index and an integer box clipped to the map.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Roi<const D: usize> {
    pub batch_index: usize,
    /// First covered cell per axis.
    pub start: [usize; D],
    /// Covered cells per axis; never below 1.
    pub len: [usize; D],
}

/// Number of fields in one record of rank `D`.
pub const fn record_width(d: usize) -> usize {
    1 + 2 * d
}

// planar records list x before y, volumetric ones list z, y, x
fn start_field<const D: usize>(axis: usize) -> usize {
    if D == 2 { 1 + (D - 1 - axis) } else { 1 + axis }
}

fn end_field<const D: usize>(axis: usize) -> usize {
    start_field::<D>(axis) + D
}

/// Validates the shape of a `rois` tensor and returns its row count.
///
/// Accepts `(R, width)` plus any number of trailing unit axes.
///
/// # Errors
/// [`OpError::ShapeMismatch`] when the record width does not fit rank `D`.
pub fn roi_count<T, const D: usize>(rois: &Tensor<T>) -> Result<usize> {
    let width = record_width(D);
    let shape = &rois.shape;
    if shape.len() < 2 || shape[1] != width || shape[2..].iter().any(|&d| d != 1) {
        return Err(OpError::shape(
            "roi_pool",
            format!("(R, {width}) region records"),
            shape,
        ));
    }
    Ok(shape[0])
}

/// Decodes the batch index of record `index`.
///
/// The value is truncated toward zero.
///
/// # Errors
/// [`OpError::InvalidRoi`] for a negative, non-finite or out-of-range index.
pub fn batch_index<T: Element>(index: usize, value: T, batch: usize) -> Result<usize> {
    if !value.is_finite() || value < T::zero() {
        return Err(OpError::InvalidRoi {
            index,
            reason: format!("batch index {value:?} is not a non-negative number"),
        });
    }
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let b = value.into_f64() as usize;
    if b >= batch {
        return Err(OpError::InvalidRoi {
            index,
            reason: format!("batch index {b} out of range for batch of {batch}"),
        });
    }
    Ok(b)
}

impl<const D: usize> Roi<D> {
    /// Decodes record `index` against a feature map.
    ///
    /// Corners are scaled, rounded half away from zero and clipped to
    /// `[0, extent - 1]`; an inverted or collapsed box keeps a length of 1.
    ///
    /// # Errors
    /// [`OpError::InvalidRoi`] for a bad batch index or a NaN corner.
    pub fn decode<T: Element>(
        index: usize,
        record: &[T],
        spatial_scale: T,
        geometry: &FeatureGeometry<D>,
    ) -> Result<Self> {
        debug_assert_eq!(record.len(), record_width(D));
        let batch_index = batch_index(index, record[0], geometry.batch)?;

        let mut start = [0; D];
        let mut len = [1; D];
        for axis in 0..D {
            let extent = geometry.spatial[axis];
            let lo = clip_coord(index, record[start_field::<D>(axis)], spatial_scale, extent)?;
            let hi = clip_coord(index, record[end_field::<D>(axis)], spatial_scale, extent)?;
            start[axis] = lo;
            len[axis] = (hi + 1).saturating_sub(lo).max(1);
        }

        Ok(Self {
            batch_index,
            start,
            len,
        })
    }

    /// Input cells covered by bin `bin` of `pooled` along `axis`, or `None` if empty.
    pub fn bin_range(
        &self,
        axis: usize,
        bin: usize,
        pooled: usize,
        extent: usize,
    ) -> Option<Range<usize>> {
        bin_range(bin, self.len[axis], pooled, self.start[axis], extent)
    }
}

fn clip_coord<T: Element>(index: usize, value: T, scale: T, extent: usize) -> Result<usize> {
    let scaled = (value * scale).round();
    if scaled.is_nan() {
        return Err(OpError::InvalidRoi {
            index,
            reason: format!("corner {value:?} does not scale to a number"),
        });
    }
    let clipped = scaled.max(T::zero()).min(T::from_usize(extent - 1));
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    Ok(clipped.into_f64() as usize)
}

/// Adaptive bin boundaries along one axis.
///
/// `[floor(bin * len / pooled), ceil((bin + 1) * len / pooled))` shifted by the
/// region origin and clipped to `[0, extent]`. Evaluated in integers, so the
/// last bin ends exactly at the region edge. Returns `None` when the clipped
/// range is empty.
pub fn bin_range(
    bin: usize,
    len: usize,
    pooled: usize,
    roi_start: usize,
    extent: usize,
) -> Option<Range<usize>> {
    let lo = bin * len / pooled;
    let hi = ((bin + 1) * len).div_ceil(pooled);
    let start = roi_start.saturating_add(lo).min(extent);
    let end = roi_start.saturating_add(hi).min(extent);
    (start < end).then_some(start..end)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn geometry() -> FeatureGeometry<2> {
        FeatureGeometry::from_shape(&[2, 3, 6, 8]).unwrap()
    }

    #[test]
    fn planar_record_maps_x_to_width() {
        let roi = Roi::decode(0, &[1.0f32, 6.0, 2.0, 7.0, 5.0], 1.0, &geometry()).unwrap();
        assert_eq!(roi.batch_index, 1);
        assert_eq!(roi.start, [2, 6]);
        assert_eq!(roi.len, [4, 2]);
    }

    #[test]
    fn volumetric_record_is_outermost_first() {
        let g = FeatureGeometry::<3>::from_shape(&[1, 1, 4, 5, 6]).unwrap();
        let roi = Roi::decode(0, &[0.0f64, 1.0, 2.0, 3.0, 2.0, 4.0, 5.0], 1.0, &g).unwrap();
        assert_eq!(roi.start, [1, 2, 3]);
        assert_eq!(roi.len, [2, 3, 3]);
    }

    #[test]
    fn corners_are_scaled_and_clipped() {
        // 0.5 * [-4, 3, 40, 9] -> [-2, 2, 20, 5] (rounded half away from zero) -> clipped
        let roi = Roi::decode(0, &[0.0f32, -4.0, 3.0, 40.0, 9.0], 0.5, &geometry()).unwrap();
        assert_eq!(roi.start, [2, 0]);
        assert_eq!(roi.len, [4, 8]);
    }

    #[test]
    fn inverted_box_keeps_unit_length() {
        let roi = Roi::decode(0, &[0.0f64, 5.0, 4.0, 1.0, 1.0], 1.0, &geometry()).unwrap();
        assert_eq!(roi.start, [4, 5]);
        assert_eq!(roi.len, [1, 1]);
    }

    #[test]
    fn bad_batch_index_rejected() {
        let g = geometry();
        assert!(Roi::decode(3, &[2.0f32, 0.0, 0.0, 1.0, 1.0], 1.0, &g).is_err());
        assert!(Roi::decode(3, &[-1.0f32, 0.0, 0.0, 1.0, 1.0], 1.0, &g).is_err());
        assert!(Roi::decode(3, &[f32::NAN, 0.0, 0.0, 1.0, 1.0], 1.0, &g).is_err());
        assert!(Roi::decode(3, &[0.0f32, f32::NAN, 0.0, 1.0, 1.0], 1.0, &g).is_err());
    }

    #[test]
    fn uneven_bins_differ_by_one() {
        // 6 cells over 4 bins: [0,2) [1,3) [3,5) [4,6)
        assert_eq!(bin_range(0, 6, 4, 0, 6), Some(0..2));
        assert_eq!(bin_range(1, 6, 4, 0, 6), Some(1..3));
        assert_eq!(bin_range(2, 6, 4, 0, 6), Some(3..5));
        assert_eq!(bin_range(3, 6, 4, 0, 6), Some(4..6));
    }

    #[test]
    fn last_bin_ends_at_region_edge() {
        for (len, pooled) in [(57, 7), (7, 25), (100, 3), (13, 13), (1, 4)] {
            let last = bin_range(pooled - 1, len, pooled, 0, len + 10).unwrap();
            assert_eq!(last.end, len, "{len} cells over {pooled} bins");
            assert_eq!(bin_range(0, len, pooled, 0, len + 10).unwrap().start, 0);
        }
    }

    #[test]
    fn bin_past_extent_is_empty() {
        assert_eq!(bin_range(0, 1, 1, 8, 8), None);
        assert_eq!(bin_range(0, 2, 1, 6, 7), Some(6..7));
    }

    #[test]
    fn record_shape_checks() {
        let ok: Tensor<f32> = Tensor::zeros(vec![4, 5]);
        assert_eq!(roi_count::<_, 2>(&ok).unwrap(), 4);
        let unit_tail: Tensor<f32> = Tensor::zeros(vec![2, 7, 1, 1, 1]);
        assert_eq!(roi_count::<_, 3>(&unit_tail).unwrap(), 2);
        assert!(roi_count::<_, 3>(&ok).is_err());
        assert!(roi_count::<_, 2>(&Tensor::<f32>::zeros(vec![5])).is_err());
    }
}
