// THEORY:
// The overlay layer draws vector glyphs on top of rendered frames: a shaft from
// the sample position (the tail) to the displaced position (the head), and two
// short strokes forming the arrowhead. It also provides alpha compositing for
// laying a flow-color video over the source video.
//
// Lines are rasterized with Bresenham after clipping the segment to the image
// (Liang-Barsky), so an arrow with an enormous displacement costs no more than
// one crossing the frame.

use crate::error::{Error, Result};
use image::{Rgb, RgbImage};

/// Appearance of a drawn arrow.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ArrowStyle {
    pub color: [u8; 3],
    /// Length of each head stroke in pixels, capped at half the shaft.
    pub head_length: f64,
    /// Angle between the shaft and each head stroke, in degrees.
    pub head_angle_deg: f64,
}

impl Default for ArrowStyle {
    fn default() -> Self {
        Self { color: [0, 0, 0], head_length: 4.0, head_angle_deg: 25.0 }
    }
}

/// Draws a clipped line from (x0, y0) to (x1, y1).
pub fn draw_line(image: &mut RgbImage, x0: f64, y0: f64, x1: f64, y1: f64, color: [u8; 3]) {
    let (w, h) = (image.width() as f64, image.height() as f64);
    let Some((x0, y0, x1, y1)) = clip_segment(x0, y0, x1, y1, w - 1.0, h - 1.0) else {
        return;
    };

    let (mut cx, mut cy) = (x0.round() as i64, y0.round() as i64);
    let (x1, y1) = (x1.round() as i64, y1.round() as i64);
    let dx = (x1 - cx).abs();
    let dy = -(y1 - cy).abs();
    let sx = if cx < x1 { 1 } else { -1 };
    let sy = if cy < y1 { 1 } else { -1 };
    let mut err = dx + dy;

    loop {
        if cx >= 0 && cy >= 0 && (cx as u32) < image.width() && (cy as u32) < image.height() {
            image.put_pixel(cx as u32, cy as u32, Rgb(color));
        }
        if cx == x1 && cy == y1 {
            break;
        }
        let e2 = 2 * err;
        if e2 >= dy {
            err += dy;
            cx += sx;
        }
        if e2 <= dx {
            err += dx;
            cy += sy;
        }
    }
}

/// Draws an arrow from `tail` to `head`, both in pixel coordinates.
pub fn draw_arrow(image: &mut RgbImage, tail: (f64, f64), head: (f64, f64), style: &ArrowStyle) {
    draw_line(image, tail.0, tail.1, head.0, head.1, style.color);

    let (dx, dy) = (tail.0 - head.0, tail.1 - head.1);
    let len = (dx * dx + dy * dy).sqrt();
    if len < 1.0 {
        return;
    }
    let head_len = style.head_length.min(len / 2.0);
    let (ux, uy) = (dx / len, dy / len);
    let theta = style.head_angle_deg.to_radians();
    for angle in [theta, -theta] {
        let (sin, cos) = angle.sin_cos();
        let bx = ux * cos - uy * sin;
        let by = ux * sin + uy * cos;
        draw_line(image, head.0, head.1, head.0 + bx * head_len, head.1 + by * head_len, style.color);
    }
}

/// Composites `top` over `base` with opacity `alpha` in [0, 1].
pub fn blend(base: &mut RgbImage, top: &RgbImage, alpha: f32) -> Result<()> {
    if base.dimensions() != top.dimensions() {
        return Err(Error::shape(format!(
            "cannot blend {:?} over {:?}",
            top.dimensions(),
            base.dimensions()
        )));
    }
    if !(0.0..=1.0).contains(&alpha) {
        return Err(Error::config(format!("blend alpha must be in [0, 1], got {alpha}")));
    }
    for (dst, src) in base.pixels_mut().zip(top.pixels()) {
        for c in 0..3 {
            let mixed = (1.0 - alpha) * dst.0[c] as f32 + alpha * src.0[c] as f32;
            dst.0[c] = mixed.round().clamp(0.0, 255.0) as u8;
        }
    }
    Ok(())
}

/// Liang-Barsky clipping of a segment to [0, max_x] x [0, max_y].
fn clip_segment(x0: f64, y0: f64, x1: f64, y1: f64, max_x: f64, max_y: f64) -> Option<(f64, f64, f64, f64)> {
    if ![x0, y0, x1, y1].iter().all(|v| v.is_finite()) || max_x < 0.0 || max_y < 0.0 {
        return None;
    }
    let (dx, dy) = (x1 - x0, y1 - y0);
    let mut t0 = 0.0f64;
    let mut t1 = 1.0f64;
    for (p, q) in [(-dx, x0), (dx, max_x - x0), (-dy, y0), (dy, max_y - y0)] {
        if p == 0.0 {
            if q < 0.0 {
                return None;
            }
            continue;
        }
        let r = q / p;
        if p < 0.0 {
            if r > t1 {
                return None;
            }
            t0 = t0.max(r);
        } else {
            if r < t0 {
                return None;
            }
            t1 = t1.min(r);
        }
    }
    Some((x0 + t0 * dx, y0 + t0 * dy, x0 + t1 * dx, y0 + t1 * dy))
}
