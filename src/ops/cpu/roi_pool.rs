//! Region max pooling over planar and volumetric feature maps.
//!
//! Both ranks share one kernel: `D` is the number of spatial axes (2 for
//! `(N, C, H, W)`, 3 for `(N, C, D, H, W)`).

use rayon::prelude::*;

use crate::error::{OpError, Result};
use crate::float::Element;
use crate::roi::{batch_index, record_width, roi_count, FeatureGeometry, Roi};
use crate::tensors::Tensor;

/// Argmax map produced by the forward pass.
///
/// Each entry is the offset of the selected input cell inside its image's
/// channel plane, or `None` for an empty bin.
pub type ArgmaxMap = Tensor<Option<usize>>;

/// Max-pools every region of `rois` into a fixed `pooled` grid.
///
/// NaN feature values never win a bin; a bin holding only NaN is treated as
/// empty (0 and no argmax).
///
/// # Returns
/// - Pooled tensor of shape `(R, C, pooled...)`
/// - Argmax map of the same shape, consumed by [`roi_pool_backward`]
///
/// # Errors
/// - [`OpError::ShapeMismatch`] for a feature tensor of the wrong rank or a bad record width
/// - [`OpError::InvalidConfig`] for a zero pooled size
/// - [`OpError::InvalidRoi`] for an undecodable record
///
/// # Example
/// ```rust
/// use briny_rcnn::ops::cpu::roi_pool_forward;
/// use briny_rcnn::tensor;
///
/// let features = tensor!([[[[1.0, 5.0], [3.0, 2.0]]]]);
/// let rois = tensor!([[0.0, 0.0, 0.0, 1.0, 1.0]]);
/// let (pooled, argmax) = roi_pool_forward(&features, &rois, [1, 1], 1.0).unwrap();
/// assert_eq!(pooled.data, vec![5.0]);
/// assert_eq!(argmax.data, vec![Some(1)]);
/// ```
pub fn roi_pool_forward<T: Element, const D: usize>(
    features: &Tensor<T>,
    rois: &Tensor<T>,
    pooled: [usize; D],
    spatial_scale: T,
) -> Result<(Tensor<T>, ArgmaxMap)> {
    let mut out = Tensor::default();
    let mut argmax = Tensor::default();
    roi_pool_forward_into(features, rois, pooled, spatial_scale, &mut out, &mut argmax)?;
    Ok((out, argmax))
}

/// [`roi_pool_forward`] writing into caller-owned buffers.
///
/// Both buffers are reshaped in place. They are left untouched when an error
/// is returned.
///
/// # Errors
/// Same as [`roi_pool_forward`].
pub fn roi_pool_forward_into<T: Element, const D: usize>(
    features: &Tensor<T>,
    rois: &Tensor<T>,
    pooled: [usize; D],
    spatial_scale: T,
    out: &mut Tensor<T>,
    argmax: &mut ArgmaxMap,
) -> Result<()> {
    if pooled.contains(&0) {
        return Err(OpError::InvalidConfig(format!(
            "pooled size {pooled:?} has a zero axis"
        )));
    }
    let geometry = FeatureGeometry::<D>::from_shape(&features.shape)?;
    let regions = decode_all(rois, spatial_scale, &geometry)?;

    let channels = geometry.channels;
    let plane = geometry.plane();
    let bins: usize = pooled.iter().product();

    let mut shape = Vec::with_capacity(D + 2);
    shape.extend([regions.len(), channels]);
    shape.extend(pooled);
    out.reshape_fill(&shape, T::zero());
    argmax.reshape_fill(&shape, None);

    log::trace!(
        "roi_pool forward: features {:?}, {} regions, pooled {:?}",
        features.shape,
        regions.len(),
        pooled
    );

    out.data
        .par_chunks_mut(bins)
        .zip(argmax.data.par_chunks_mut(bins))
        .enumerate()
        .for_each(|(i, (out_plane, arg_plane))| {
            let roi = &regions[i / channels];
            let base = (roi.batch_index * channels + i % channels) * plane;
            pool_plane(
                &features.data[base..base + plane],
                roi,
                &geometry.spatial,
                &pooled,
                out_plane,
                arg_plane,
            );
        });

    Ok(())
}

/// Routes `output_grad` back to the input cells recorded in `argmax`.
///
/// Bins of different regions that selected the same cell add up. Work is
/// split by input channel plane: each plane gathers from every region over its
/// image, so no two workers ever write the same cell.
///
/// # Returns
/// Gradient with shape `feature_shape`; cells never selected stay zero.
///
/// # Errors
/// - [`OpError::ShapeMismatch`] if `output_grad`, `argmax` and `rois` disagree
///   with each other or with `feature_shape`
/// - [`OpError::InvalidRoi`] for a bad batch index
pub fn roi_pool_backward<T: Element, const D: usize>(
    argmax: &ArgmaxMap,
    output_grad: &Tensor<T>,
    feature_shape: &[usize],
    rois: &Tensor<T>,
) -> Result<Tensor<T>> {
    let geometry = FeatureGeometry::<D>::from_shape(feature_shape)?;
    let count = roi_count::<T, D>(rois)?;
    let channels = geometry.channels;
    let plane = geometry.plane();

    if argmax.shape.len() != D + 2 || argmax.shape[..2] != [count, channels] {
        return Err(OpError::shape(
            "roi_pool_backward",
            format!("argmax of shape ({count}, {channels}, pooled...)"),
            &argmax.shape,
        ));
    }
    if output_grad.shape != argmax.shape {
        return Err(OpError::shape(
            "roi_pool_backward",
            format!("{:?}", argmax.shape),
            &output_grad.shape,
        ));
    }
    if argmax.data.iter().flatten().any(|&offset| offset >= plane) {
        return Err(OpError::shape(
            "roi_pool_backward",
            format!("argmax offsets below plane size {plane}"),
            feature_shape,
        ));
    }

    let width = record_width(D);
    let mut by_image = vec![Vec::new(); geometry.batch];
    for r in 0..count {
        let b = batch_index(r, rois.data[r * width], geometry.batch)?;
        by_image[b].push(r);
    }

    log::trace!(
        "roi_pool backward: {} regions into {:?}",
        count,
        feature_shape
    );

    let bins: usize = argmax.shape[2..].iter().product();
    let mut grad = Tensor::zeros(feature_shape.to_vec());

    grad.data
        .par_chunks_mut(plane)
        .enumerate()
        .for_each(|(i, grad_plane)| {
            let (n, c) = (i / channels, i % channels);
            for &r in &by_image[n] {
                let base = (r * channels + c) * bins;
                let offsets = &argmax.data[base..base + bins];
                let grads = &output_grad.data[base..base + bins];
                for (offset, &g) in offsets.iter().zip(grads) {
                    if let Some(offset) = *offset {
                        grad_plane[offset] = grad_plane[offset] + g;
                    }
                }
            }
        });

    Ok(grad)
}

fn decode_all<T: Element, const D: usize>(
    rois: &Tensor<T>,
    spatial_scale: T,
    geometry: &FeatureGeometry<D>,
) -> Result<Vec<Roi<D>>> {
    let count = roi_count::<T, D>(rois)?;
    rois.data
        .chunks_exact(record_width(D))
        .take(count)
        .enumerate()
        .map(|(i, record)| Roi::decode(i, record, spatial_scale, geometry))
        .collect()
}

/// Pools one `(region, channel)` pair.
fn pool_plane<T: Element, const D: usize>(
    input: &[T],
    roi: &Roi<D>,
    spatial: &[usize; D],
    pooled: &[usize; D],
    out: &mut [T],
    argmax: &mut [Option<usize>],
) {
    let ranges: [Vec<_>; D] = core::array::from_fn(|axis| {
        (0..pooled[axis])
            .map(|bin| roi.bin_range(axis, bin, pooled[axis], spatial[axis]))
            .collect()
    });
    let grid = core::array::from_fn(|axis| 0..pooled[axis]);

    for_each_cell(&grid, pooled, |bin, flat_bin| {
        let mut window = core::array::from_fn(|_| 0..0);
        for axis in 0..D {
            match &ranges[axis][bin[axis]] {
                Some(range) => window[axis] = range.clone(),
                None => return,
            }
        }

        let mut best: Option<(T, usize)> = None;
        for_each_cell(&window, spatial, |_, offset| {
            let value = input[offset];
            if value.is_nan() {
                return;
            }
            if best.is_none_or(|(max, _)| value > max) {
                best = Some((value, offset));
            }
        });

        if let Some((max, offset)) = best {
            out[flat_bin] = max;
            argmax[flat_bin] = Some(offset);
        }
    });
}

/// Visits every cell of a non-empty box in row-major order.
///
/// `f` receives the multi-index and its flat offset within `dims`.
fn for_each_cell<const D: usize>(
    window: &[core::ops::Range<usize>; D],
    dims: &[usize; D],
    mut f: impl FnMut(&[usize; D], usize),
) {
    if window.iter().any(|r| r.is_empty()) {
        return;
    }
    let mut index: [usize; D] = core::array::from_fn(|axis| window[axis].start);
    loop {
        let offset = index
            .iter()
            .zip(dims)
            .fold(0, |acc, (&i, &dim)| acc * dim + i);
        f(&index, offset);

        let mut axis = D;
        loop {
            if axis == 0 {
                return;
            }
            axis -= 1;
            index[axis] += 1;
            if index[axis] < window[axis].end {
                break;
            }
            index[axis] = window[axis].start;
        }
    }
}
