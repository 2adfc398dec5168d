// THEORY:
// The `FlowColorizer` turns motion into color. It is the only substantive
// algorithm in the crate and everything else (file formats, animations, the
// CLI) exists to feed it fields or to display what it returns.
//
// Encoding, per sample:
// - **Direction -> hue**: `atan2(-v, -u)` picks a position on the `ColorWheel`;
//   the two nearest wheel entries are blended linearly.
// - **Magnitude -> saturation**: the radius is divided by a normalization
//   radius. Small motion fades toward white, motion at the normalization radius
//   shows the full wheel color, and motion beyond it is dimmed to 75% so that
//   out-of-range vectors stand out instead of clipping.
// - **Unknown -> black**: samples flagged by `is_unknown` are forced to (0, 0, 0).
//
// Key architectural principles:
// 1.  **One Scale per Batch**: the normalization radius is the largest known
//     radius across the *whole* batch, not per frame, so intensities are
//     comparable from frame to frame in an animation.
// 2.  **Shape Parity**: a single (H, W, 2) field is processed as a batch of one
//     and returned as (H, W, 3); a batch comes back as (N, H, W, 3).
// 3.  **Pure**: no state beyond a borrowed, immutable wheel. Calling twice with
//     the same inputs yields identical bytes.
// 4.  **Byte Compatibility**: channel order is reversed relative to the wheel
//     and quantization truncates (`floor(255 * c)`), matching the reference
//     renderings pixel for pixel.

use crate::core_modules::color_wheel::color_wheel::{ColorWheel, Rgb};
use crate::core_modules::flow_field::{MotionRange, as_batch, is_unknown};
use crate::error::{Error, Result};
use ndarray::{Array3, Array4, ArrayD, ArrayViewD, Axis, Ix3, Ix4, Zip};
use std::f64::consts::PI;
use tracing::{debug, info};

/// Channel attenuation for motion beyond the normalization radius.
const OUT_OF_RANGE_DIM: f64 = 0.75;

/// Maps flow fields to color images using a borrowed `ColorWheel`.
#[derive(Debug, Clone, Copy)]
pub struct FlowColorizer<'w> {
    wheel: &'w ColorWheel,
}

impl Default for FlowColorizer<'static> {
    fn default() -> Self {
        Self::new(ColorWheel::standard())
    }
}

impl<'w> FlowColorizer<'w> {
    pub fn new(wheel: &'w ColorWheel) -> Self {
        Self { wheel }
    }

    pub fn wheel(&self) -> &ColorWheel {
        self.wheel
    }

    /// The radius flow components are divided by before coloring.
    ///
    /// An explicit `max_motion` wins over the measured range; a zero radius is
    /// replaced by 1 so still frames do not divide by zero.
    pub fn normalization_radius(range: &MotionRange, max_motion: Option<f32>) -> Result<f64> {
        let radius = match max_motion {
            Some(m) if !m.is_finite() || m < 0.0 => {
                return Err(Error::config(format!("max_motion must be a finite, non-negative number, got {m}")));
            }
            Some(m) => m as f64,
            None => range.max_radius,
        };
        Ok(if radius == 0.0 { 1.0 } else { radius })
    }

    /// Range of the known motion in a field or sequence, logged as a summary.
    pub fn motion_range(&self, field: ArrayViewD<'_, f32>) -> Result<MotionRange> {
        let range = MotionRange::of(&as_batch(field)?);
        info!(
            "max motion: {:.4}   motion range: u = {:.3} .. {:.3};  v = {:.3} .. {:.3}",
            range.max_radius, range.min_u, range.max_u, range.min_v, range.max_v
        );
        Ok(range)
    }

    /// Colorizes a single (H, W, 2) field or an (N, H, W, 2) sequence.
    pub fn colorize(&self, field: ArrayViewD<'_, f32>, max_motion: Option<f32>) -> Result<ArrayD<u8>> {
        let single = field.ndim() == 3;
        let range = self.motion_range(field.view())?;
        let batch = as_batch(field)?;
        let max_radius = Self::normalization_radius(&range, max_motion)?;
        debug!(max_radius, unknown = range.unknown, "normalizing flow");

        let (n, h, w, _) = batch.dim();
        let mut colors = Array4::<u8>::zeros((n, h, w, 3));
        Zip::from(colors.lanes_mut(Axis(3)))
            .and(batch.lanes(Axis(3)))
            .for_each(|mut pixel, uv| {
                let (u, v) = (uv[0], uv[1]);
                if is_unknown(u, v) {
                    return;
                }
                let rgb = self.color_at(u as f64 / max_radius, v as f64 / max_radius);
                pixel[0] = rgb[0];
                pixel[1] = rgb[1];
                pixel[2] = rgb[2];
            });

        let colors = colors.into_dyn();
        if single {
            Ok(colors.index_axis_move(Axis(0), 0))
        } else {
            Ok(colors)
        }
    }

    /// Typed form of `colorize` for one field.
    pub fn colorize_frame(&self, field: &Array3<f32>, max_motion: Option<f32>) -> Result<Array3<u8>> {
        self.colorize(field.view().into_dyn(), max_motion)?
            .into_dimensionality::<Ix3>()
            .map_err(|e| Error::shape(e.to_string()))
    }

    /// Typed form of `colorize` for a sequence; all frames share one scale.
    pub fn colorize_sequence(&self, fields: &Array4<f32>, max_motion: Option<f32>) -> Result<Array4<u8>> {
        self.colorize(fields.view().into_dyn(), max_motion)?
            .into_dimensionality::<Ix4>()
            .map_err(|e| Error::shape(e.to_string()))
    }

    /// Color of one already-normalized motion vector.
    pub fn color_at(&self, fx: f64, fy: f64) -> Rgb {
        let colors = self.wheel.colors();
        let ncols = colors.len();
        let rad = (fx * fx + fy * fy).sqrt();
        let a = (-fy).atan2(-fx) / PI;
        let fk = (a + 1.0) / 2.0 * (ncols - 1) as f64;
        let k0 = (fk as usize).min(ncols - 1);
        let k1 = (k0 + 1) % ncols;
        let f = fk - k0 as f64;

        let (c0, c1) = (colors[k0], colors[k1]);
        let mut pixel = [0u8; 3];
        for b in 0..3 {
            let col0 = c0[b] as f64 / 255.0;
            let col1 = c1[b] as f64 / 255.0;
            let mut col = (1.0 - f) * col0 + f * col1;
            if rad <= 1.0 {
                // increase saturation with radius
                col = 1.0 - rad * (1.0 - col);
            } else {
                col *= OUT_OF_RANGE_DIM;
            }
            pixel[2 - b] = (255.0 * col) as u8;
        }
        pixel
    }
}

/// Colorizes with the standard wheel.
pub fn motion_to_color(field: ArrayViewD<'_, f32>, max_motion: Option<f32>) -> Result<ArrayD<u8>> {
    FlowColorizer::default().colorize(field, max_motion)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core_modules::color_wheel::color_wheel::{MR, RY};
    use ndarray::{Array3, Array4, array, s};

    fn single_sample(u: f32, v: f32) -> Array3<f32> {
        Array3::from_shape_vec((1, 1, 2), vec![u, v]).unwrap()
    }

    fn pixel(colors: &Array3<u8>, y: usize, x: usize) -> [u8; 3] {
        [colors[[y, x, 0]], colors[[y, x, 1]], colors[[y, x, 2]]]
    }

    #[test]
    fn output_shape_follows_input() {
        let colorizer = FlowColorizer::default();
        let field = Array3::<f32>::from_shape_fn((6, 7, 2), |(y, x, c)| if c == 0 { x as f32 - 3.0 } else { y as f32 - 2.5 });
        let colors = colorizer.colorize(field.view().into_dyn(), None).unwrap();
        assert_eq!(colors.shape(), &[6, 7, 3]);

        let batch = Array4::<f32>::ones((3, 6, 7, 2));
        let colors = colorizer.colorize(batch.view().into_dyn(), None).unwrap();
        assert_eq!(colors.shape(), &[3, 6, 7, 3]);
    }

    #[test]
    fn zero_field_is_white() {
        let field = Array3::<f32>::zeros((4, 4, 2));
        let colors = FlowColorizer::default().colorize_frame(&field, None).unwrap();
        assert!(colors.iter().all(|&c| c == 255));
    }

    #[test]
    fn unit_motion_west_uses_last_wheel_entry() {
        // atan2(+0, -1) = pi -> fk = len - 1, k1 wraps to 0, no blending.
        let colors = FlowColorizer::default().colorize_frame(&single_sample(1.0, -0.0), Some(1.0)).unwrap();
        let last = ColorWheel::standard().get(54);
        assert_eq!(last, [255, 0, 43]);
        assert_eq!(pixel(&colors, 0, 0), [last[2], last[1], last[0]]);
    }

    #[test]
    fn unit_motion_with_positive_zero_uses_first_wheel_entry() {
        // -(+0) is -0, atan2(-0, -1) = -pi -> index 0.
        let colors = FlowColorizer::default().colorize_frame(&single_sample(1.0, 0.0), Some(1.0)).unwrap();
        assert_eq!(pixel(&colors, 0, 0), [0, 0, 255]);
    }

    #[test]
    fn motion_beyond_scale_is_dimmed() {
        let colors = FlowColorizer::default().colorize_frame(&single_sample(2.0, -0.0), Some(1.0)).unwrap();
        assert_eq!(pixel(&colors, 0, 0), [32, 0, 191]);
    }

    #[test]
    fn half_radius_fades_toward_white() {
        let colors = FlowColorizer::default().colorize_frame(&single_sample(0.5, -0.0), Some(1.0)).unwrap();
        assert_eq!(pixel(&colors, 0, 0), [149, 127, 255]);
    }

    #[test]
    fn unknown_samples_are_black() {
        let field = array![[[2e9f32, 0.0], [0.0, f32::NAN]], [[1.0, 1.0], [-1.0, 3e9]]];
        let colors = FlowColorizer::default().colorize_frame(&field, None).unwrap();
        assert_eq!(pixel(&colors, 0, 0), [0, 0, 0]);
        assert_eq!(pixel(&colors, 0, 1), [0, 0, 0]);
        assert_eq!(pixel(&colors, 1, 1), [0, 0, 0]);
        assert_ne!(pixel(&colors, 1, 0), [0, 0, 0]);
    }

    #[test]
    fn unknown_samples_do_not_set_the_scale() {
        let mut field = Array3::<f32>::zeros((1, 2, 2));
        field[[0, 0, 0]] = 1.0;
        field[[0, 0, 1]] = -0.0;
        field[[0, 1, 0]] = 2e9;
        let colors = FlowColorizer::default().colorize_frame(&field, None).unwrap();
        // The known sample is the largest, so it renders at full saturation.
        assert_eq!(pixel(&colors, 0, 0), [43, 0, 255]);
    }

    #[test]
    fn batch_uses_one_scale_for_all_frames() {
        let mut batch = Array4::<f32>::zeros((2, 1, 2, 2));
        batch[[0, 0, 0, 0]] = 1.0;
        batch[[0, 0, 0, 1]] = -0.0;
        batch[[1, 0, 0, 0]] = 2.0;
        batch[[1, 0, 0, 1]] = -0.0;

        let colorizer = FlowColorizer::default();
        let colors = colorizer.colorize_sequence(&batch, None).unwrap();

        let first = batch.slice(s![0, .., .., ..]).to_owned();
        let at_batch_scale = colorizer.colorize_frame(&first, Some(2.0)).unwrap();
        let at_own_scale = colorizer.colorize_frame(&first, None).unwrap();

        assert_eq!(colors.slice(s![0, .., .., ..]), at_batch_scale);
        assert_ne!(colors.slice(s![0, .., .., ..]), at_own_scale);
        assert_eq!([colors[[0, 0, 0, 0]], colors[[0, 0, 0, 1]], colors[[0, 0, 0, 2]]], [149, 127, 255]);
        assert_eq!([colors[[1, 0, 0, 0]], colors[[1, 0, 0, 1]], colors[[1, 0, 0, 2]]], [43, 0, 255]);
    }

    #[test]
    fn colorize_is_deterministic() {
        let field = Array3::<f32>::from_shape_fn((8, 8, 2), |(y, x, c)| ((x * 7 + y * 3 + c) % 11) as f32 - 5.0);
        let colorizer = FlowColorizer::default();
        let a = colorizer.colorize_frame(&field, Some(3.0)).unwrap();
        let b = colorizer.colorize_frame(&field, Some(3.0)).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn zero_max_motion_behaves_like_one() {
        let field = single_sample(0.5, -0.0);
        let colorizer = FlowColorizer::default();
        assert_eq!(colorizer.colorize_frame(&field, Some(0.0)).unwrap(), colorizer.colorize_frame(&field, Some(1.0)).unwrap());
    }

    #[test]
    fn negative_max_motion_is_rejected() {
        let result = FlowColorizer::default().colorize_frame(&single_sample(1.0, 1.0), Some(-1.0));
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn invalid_shapes_are_rejected() {
        let colorizer = FlowColorizer::default();
        let wrong = Array3::<f32>::zeros((2, 2, 3));
        assert!(matches!(colorizer.colorize(wrong.view().into_dyn(), None), Err(Error::InvalidShape(_))));
        let flat = ndarray::Array2::<f32>::zeros((2, 2));
        assert!(matches!(colorizer.colorize(flat.view().into_dyn(), None), Err(Error::InvalidShape(_))));
    }

    #[test]
    fn custom_wheel_is_honored() {
        let wheel = ColorWheel::from_segments(&[RY, MR]).unwrap();
        let colorizer = FlowColorizer::new(&wheel);
        assert_eq!(colorizer.wheel().len(), 21);
        // Last entry of MR is still the wrap-around point.
        assert_eq!(colorizer.color_at(1.0, -0.0), [43, 0, 255]);
    }

    #[test]
    fn motion_range_reports_known_samples() {
        let mut field = Array3::<f32>::zeros((2, 2, 2));
        field[[0, 0, 0]] = -3.0;
        field[[0, 1, 1]] = 4.0;
        field[[1, 1, 0]] = f32::NAN;
        let range = FlowColorizer::default().motion_range(field.view().into_dyn()).unwrap();
        assert_eq!(range.max_radius, 4.0);
        assert_eq!((range.min_u, range.max_v), (-3.0, 4.0));
        assert_eq!((range.known, range.unknown), (3, 1));
    }

    #[test]
    fn free_function_matches_default_colorizer() {
        let field = Array3::<f32>::from_elem((3, 3, 2), 0.25);
        let a = motion_to_color(field.view().into_dyn(), None).unwrap();
        let b = FlowColorizer::default().colorize(field.view().into_dyn(), None).unwrap();
        assert_eq!(a, b);
    }
}
