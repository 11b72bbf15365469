use itertools::Itertools;

use crate::errors::GosgraphError;
use crate::errors::GosgraphError::TensorCreateError;
use crate::graph::Tensor;

/// numpy's default `allclose` tolerances.
pub const DEFAULT_RTOL: f64 = 1e-5;
pub const DEFAULT_ATOL: f64 = 1e-8;

/// Element count of a shape. A scalar (`[]`) holds one element, negative
/// dims count as zero. Fails when the count does not fit in `usize`.
pub fn numel(shape: &[i64]) -> Result<usize, GosgraphError> {
    if shape.iter().any(|d| *d <= 0) {
        return Ok(0);
    }
    shape
        .iter()
        .try_fold(1usize, |n, d| {
            usize::try_from(*d).ok().and_then(|d| n.checked_mul(d))
        })
        .ok_or_else(|| TensorCreateError(format!("Element count of {:?} overflows", shape)))
}

pub fn tensor_len(t: &Tensor) -> Result<usize, GosgraphError> {
    numel(&t.shape())
}

pub fn to_csv_str<T: ToString>(vals: &[T]) -> String {
    vals.iter().map(|v| v.to_string()).join(",")
}

/// `|a - b| <= atol + rtol * |b|` elementwise, NaN never close.
pub fn is_close(a: f64, b: f64, rtol: f64, atol: f64) -> bool {
    if a.is_infinite() || b.is_infinite() {
        return a == b;
    }
    (a - b).abs() <= atol + rtol * b.abs()
}

pub fn all_close(a: &[f64], b: &[f64]) -> bool {
    a.len() == b.len()
        && a
            .iter()
            .zip(b.iter())
            .all(|(x, y)| is_close(*x, *y, DEFAULT_RTOL, DEFAULT_ATOL))
}

pub fn vec_close(a: Vec<f32>, b: Vec<f32>) -> bool {
    let a = a.into_iter().map(|v| v as f64).collect::<Vec<f64>>();
    let b = b.into_iter().map(|v| v as f64).collect::<Vec<f64>>();
    all_close(&a, &b)
}
