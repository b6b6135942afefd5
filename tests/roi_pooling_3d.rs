mod common;

use briny_rcnn::config::RoiPoolingParam;
use briny_rcnn::layers::{RoiPooling2d, RoiPooling3d};
use briny_rcnn::ops::cpu::roi_pool_forward;
use briny_rcnn::tensors::Tensor;
use briny_rcnn::OpError;
use common::{check_pool_gradient, distinct_tensor, init_logging, random_tensor};

const VOLUME: usize = 12 * 12 * 20;

fn whole_volumes() -> Tensor<f64> {
    Tensor::new(
        vec![2, 7],
        vec![
            1.0, 0.0, 0.0, 0.0, 11.0, 11.0, 19.0, //
            0.0, 0.0, 0.0, 0.0, 11.0, 11.0, 19.0,
        ],
    )
}

#[test]
fn test_unit_bins_copy_the_volume() {
    init_logging();
    let features = random_tensor(&[2, 3, 12, 12, 20], 10.0, 21);
    let mut layer = RoiPooling3d::new(RoiPoolingParam::new_3d(12, 12, 20)).unwrap();
    let out = layer.forward(&features, &whole_volumes()).unwrap();

    assert_eq!(out.shape, vec![2, 3, 12, 12, 20]);
    let (first, second) = out.data.split_at(3 * VOLUME);
    assert_eq!(first, &features.data[3 * VOLUME..]);
    assert_eq!(second, &features.data[..3 * VOLUME]);
}

#[test]
fn test_two_cubed_bins_take_block_max() {
    let features = random_tensor(&[2, 3, 12, 12, 20], 10.0, 22);
    let (out, _) = roi_pool_forward(&features, &whole_volumes(), [6, 6, 10], 1.0).unwrap();
    assert_eq!(out.shape, vec![2, 3, 6, 6, 10]);

    for (r, n) in [(0, 1), (1, 0)] {
        for c in 0..3 {
            let volume = &features.data[(n * 3 + c) * VOLUME..][..VOLUME];
            for pd in 0..6 {
                for ph in 0..6 {
                    for pw in 0..10 {
                        let mut max = f64::MIN;
                        for d in 2 * pd..2 * pd + 2 {
                            for h in 2 * ph..2 * ph + 2 {
                                for w in 2 * pw..2 * pw + 2 {
                                    max = max.max(volume[(d * 12 + h) * 20 + w]);
                                }
                            }
                        }
                        let i = (((r * 3 + c) * 6 + pd) * 6 + ph) * 10 + pw;
                        assert_eq!(out.data[i], max);
                    }
                }
            }
        }
    }
}

#[test]
fn test_record_axes_are_depth_height_width() {
    // a single cell at (d, h, w) = (1, 2, 3) of a (2, 3, 4) volume
    let features = Tensor::new(
        vec![1, 1, 2, 3, 4],
        (0..24).map(|x| x as f64).collect(),
    );
    let rois = Tensor::new(vec![1, 7], vec![0.0, 1.0, 2.0, 3.0, 1.0, 2.0, 3.0]);
    let (out, argmax) = roi_pool_forward(&features, &rois, [1, 1, 1], 1.0).unwrap();
    assert_eq!(out.data, vec![23.0]);
    assert_eq!(argmax.data, vec![Some(23)]);
}

#[test]
fn test_gradient_matches_finite_differences() {
    init_logging();
    let features = distinct_tensor(&[2, 3, 8, 8, 8], 23);
    let rois = Tensor::new(
        vec![4, 7],
        vec![
            0.0, 0.0, 0.0, 0.0, 7.0, 7.0, 7.0, //
            1.0, 6.0, 2.0, 1.0, 7.0, 5.0, 6.0, //
            1.0, 3.0, 1.0, 2.0, 6.0, 4.0, 7.0, //
            0.0, 3.0, 3.0, 3.0, 3.0, 3.0, 3.0,
        ],
    );
    check_pool_gradient(&features, &rois, RoiPoolingParam::new_3d(3, 3, 4));
}

#[test]
fn test_planar_records_rejected() {
    let features = random_tensor(&[1, 1, 2, 2, 2], 1.0, 24);
    let rois = Tensor::new(vec![1, 5], vec![0.0, 0.0, 0.0, 1.0, 1.0]);
    let mut layer = RoiPooling3d::new(RoiPoolingParam::new_3d(1, 1, 1)).unwrap();
    assert!(matches!(
        layer.forward(&features, &rois),
        Err(OpError::ShapeMismatch { .. })
    ));

    let mut planar = RoiPooling2d::new(RoiPoolingParam::new(1, 1)).unwrap();
    let records = Tensor::new(vec![1, 7], vec![0.0, 0.0, 0.0, 0.0, 1.0, 1.0, 1.0]);
    assert!(matches!(
        planar.forward(&random_tensor(&[1, 1, 2, 2], 1.0, 25), &records),
        Err(OpError::ShapeMismatch { .. })
    ));
}

#[test]
fn test_zero_depth_rejected() {
    assert!(matches!(
        RoiPooling3d::<f32>::new(RoiPoolingParam::new_3d(0, 2, 2)),
        Err(OpError::InvalidConfig(_))
    ));
}
