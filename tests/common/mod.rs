#![allow(dead_code)]

use briny_rcnn::approx::{max_relative_error, FINITE_DIFF_STEP, GRADIENT_THRESHOLD};
use briny_rcnn::config::RoiPoolingParam;
use briny_rcnn::layers::RoiPooling;
use briny_rcnn::tensors::Tensor;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Uniform values in `[-spread, spread)`.
pub fn random_tensor(shape: &[usize], spread: f64, seed: u64) -> Tensor<f64> {
    let mut rng = StdRng::seed_from_u64(seed);
    let len = shape.iter().product();
    let data = (0..len).map(|_| rng.random_range(-spread..spread)).collect();
    Tensor::new(shape.to_vec(), data)
}

/// Pairwise distinct values 0.1 apart, shuffled.
///
/// No two cells are within a finite-difference step of each other, so
/// perturbing one cell never changes which cell wins a bin.
pub fn distinct_tensor(shape: &[usize], seed: u64) -> Tensor<f64> {
    let len: usize = shape.iter().product();
    let mut data: Vec<f64> = (0..len).map(|i| (i as f64 - len as f64 / 2.0) * 0.1).collect();
    data.shuffle(&mut StdRng::seed_from_u64(seed));
    Tensor::new(shape.to_vec(), data)
}

/// Compares the argmax-routed gradient with central differences of
/// `sum(coeffs * pooled)` for every feature cell.
pub fn check_pool_gradient<const D: usize>(
    features: &Tensor<f64>,
    rois: &Tensor<f64>,
    param: RoiPoolingParam<D>,
) {
    let mut layer = RoiPooling::<f64, D>::new(param).unwrap();
    let out_shape = layer.forward(features, rois).unwrap().shape.clone();
    let coeffs = random_tensor(&out_shape, 1.0, 7);
    let analytic = layer.backward(&coeffs, rois).unwrap();
    assert_eq!(analytic.shape, features.shape);

    let mut reference_layer = RoiPooling::<f64, D>::new(param).unwrap();
    let mut objective = |x: &Tensor<f64>| -> f64 {
        let out = reference_layer.forward(x, rois).unwrap();
        out.data.iter().zip(&coeffs.data).map(|(o, c)| o * c).sum()
    };

    let h = FINITE_DIFF_STEP;
    let mut perturbed = features.clone();
    let mut numeric = vec![0.0; features.data.len()];
    for i in 0..numeric.len() {
        let orig = perturbed.data[i];
        perturbed.data[i] = orig + h;
        let plus = objective(&perturbed);
        perturbed.data[i] = orig - h;
        let minus = objective(&perturbed);
        perturbed.data[i] = orig;
        numeric[i] = (plus - minus) / (2.0 * h);
    }

    let (worst, err) = max_relative_error(&analytic.data, &numeric).unwrap();
    assert!(
        err <= GRADIENT_THRESHOLD,
        "cell {worst}: analytic {} vs numeric {}",
        analytic.data[worst],
        numeric[worst]
    );
}
