// THEORY:
// A flow field is a dense grid of motion vectors: one (u, v) pair per pixel,
// measured in pixels, for one frame or a whole sequence of frames. This module
// holds the numeric conventions every other layer relies on:
//
// 1.  **Shape**: a single field is (H, W, 2); a sequence is (N, H, W, 2). The
//     trailing axis is always 2. Everything downstream works on the sequence
//     form, so `as_batch` lifts a single field to a batch of one without
//     copying.
// 2.  **Unknown Flow**: estimators mark pixels they could not solve with huge
//     sentinel magnitudes (above 1e9) or NaN. Those samples carry no motion and
//     must never influence statistics or colors.
// 3.  **Motion Range**: the summary of a batch (largest known radius and the
//     extent of each component) that drives normalization and diagnostics.

use crate::error::{Error, Result};
use ndarray::{ArrayD, ArrayView4, ArrayViewD, Axis, Ix4, IxDyn};

/// Components above this magnitude mark a sample as unknown.
pub const UNKNOWN_FLOW_THRESHOLD: f32 = 1e9;

/// True when a sample carries no usable motion.
#[inline]
pub fn is_unknown(u: f32, v: f32) -> bool {
    u.abs() > UNKNOWN_FLOW_THRESHOLD || v.abs() > UNKNOWN_FLOW_THRESHOLD || u.is_nan() || v.is_nan()
}

/// Views a single (H, W, 2) field or an (N, H, W, 2) sequence as a sequence.
pub fn as_batch<'a>(field: ArrayViewD<'a, f32>) -> Result<ArrayView4<'a, f32>> {
    let batch = match field.ndim() {
        3 => field.insert_axis(Axis(0)),
        4 => field,
        n => {
            return Err(Error::shape(format!(
                "flow must have shape (H, W, 2) or (N, H, W, 2), got rank {n}"
            )));
        }
    };
    if batch.shape()[3] != 2 {
        return Err(Error::shape(format!(
            "flow must have a trailing axis of 2, got {:?}",
            batch.shape()
        )));
    }
    batch.into_dimensionality::<Ix4>().map_err(|e| Error::shape(e.to_string()))
}

/// Boolean mask of unknown samples, shaped like the field without its last axis.
pub fn unknown_mask(field: ArrayViewD<'_, f32>) -> Result<ArrayD<bool>> {
    let single = field.ndim() == 3;
    let batch = as_batch(field)?;
    let (n, h, w, _) = batch.dim();
    let flags: Vec<bool> = batch.lanes(Axis(3)).into_iter().map(|uv| is_unknown(uv[0], uv[1])).collect();
    let shape = if single { IxDyn(&[h, w]) } else { IxDyn(&[n, h, w]) };
    ArrayD::from_shape_vec(shape, flags).map_err(|e| Error::shape(e.to_string()))
}

/// Summary of the known motion in a batch of fields.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MotionRange {
    /// Largest `sqrt(u^2 + v^2)` over known samples; 0 when there are none.
    pub max_radius: f64,
    pub min_u: f64,
    pub max_u: f64,
    pub min_v: f64,
    pub max_v: f64,
    /// Number of samples that took part.
    pub known: usize,
    /// Number of samples skipped as unknown.
    pub unknown: usize,
}

impl MotionRange {
    pub fn of(batch: &ArrayView4<'_, f32>) -> Self {
        let mut range = MotionRange {
            max_radius: 0.0,
            min_u: f64::INFINITY,
            max_u: f64::NEG_INFINITY,
            min_v: f64::INFINITY,
            max_v: f64::NEG_INFINITY,
            known: 0,
            unknown: 0,
        };

        for uv in batch.lanes(Axis(3)) {
            let (u, v) = (uv[0], uv[1]);
            if is_unknown(u, v) {
                range.unknown += 1;
                continue;
            }
            let (u, v) = (u as f64, v as f64);
            range.max_radius = range.max_radius.max((u * u + v * v).sqrt());
            range.min_u = range.min_u.min(u);
            range.max_u = range.max_u.max(u);
            range.min_v = range.min_v.min(v);
            range.max_v = range.max_v.max(v);
            range.known += 1;
        }

        if range.known == 0 {
            range.min_u = 0.0;
            range.max_u = 0.0;
            range.min_v = 0.0;
            range.max_v = 0.0;
        }
        range
    }
}
