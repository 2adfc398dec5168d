// THEORY:
// The `animation` module is the presentation layer. It takes a base video
// (grayscale source frames or colorized flow), optionally lays a second color
// video over it, optionally draws the flow vectors as arrows, and produces
// finished RGBA frames. Those frames can be returned as one array, written as
// an animated GIF, or handed to the `ExportPool` as a PNG sequence.
//
// Arrows follow image coordinates: a vector (u, v) sampled at pixel (x, y) is
// drawn from (x, y) to (x + u, y + v), one flow unit per pixel, tail at the
// sample. Unknown vectors and exact zeros are not drawn.

use crate::config::AnimationConfig;
use crate::core_modules::colorizer::FlowColorizer;
use crate::core_modules::flow_field::is_unknown;
use crate::core_modules::overlay::{ArrowStyle, blend, draw_arrow};
use crate::error::{Error, Result};
use crate::export::ExportPool;
use image::codecs::gif::{GifEncoder, Repeat};
use image::imageops::{self, FilterType};
use image::{Delay, DynamicImage, Frame, Rgb, RgbImage, RgbaImage};
use ndarray::{Array3, Array4, ArrayView2, ArrayView3, Axis, s};
use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// GIF quantizer speed: 1 is best quality, 30 fastest.
const GIF_SPEED: i32 = 10;

/// Base frames of an animation.
#[derive(Debug, Clone)]
pub enum Video {
    /// (N, H, W) grayscale frames.
    Gray(Array3<u8>),
    /// (N, H, W, 3) RGB frames.
    Rgb(Array4<u8>),
}

impl Video {
    /// (frames, height, width)
    pub fn dim(&self) -> (usize, usize, usize) {
        match self {
            Video::Gray(v) => v.dim(),
            Video::Rgb(v) => {
                let (n, h, w, _) = v.dim();
                (n, h, w)
            }
        }
    }

    fn frame_image(&self, i: usize) -> RgbImage {
        match self {
            Video::Gray(v) => gray_to_image(v.index_axis(Axis(0), i)),
            Video::Rgb(v) => rgb_to_image(v.index_axis(Axis(0), i)),
        }
    }
}

/// Composes video frames, color overlays and vector arrows into RGBA frames.
#[derive(Debug, Clone)]
pub struct FlowAnimation {
    video: Video,
    video2: Option<Array4<u8>>,
    vectors: Option<Array4<f32>>,
    vector_step: usize,
    scale: f64,
    video2_alpha: f32,
    style: ArrowStyle,
}

impl FlowAnimation {
    pub fn new(video: Video, config: &AnimationConfig) -> Result<Self> {
        if config.vector_step == 0 {
            return Err(Error::shape("vector_step must be at least 1"));
        }
        if !(config.scale.is_finite() && config.scale > 0.0) {
            return Err(Error::shape(format!("scale must be positive, got {}", config.scale)));
        }
        if !(0.0..=1.0).contains(&config.video2_alpha) {
            return Err(Error::config(format!("video2_alpha must be in [0, 1], got {}", config.video2_alpha)));
        }
        let (_, h, w) = video.dim();
        let animation = Self {
            video,
            video2: None,
            vectors: None,
            vector_step: config.vector_step,
            scale: config.scale,
            video2_alpha: config.video2_alpha,
            style: config.arrow_style(),
        };
        let (out_w, out_h) = animation.output_size();
        if (h > 0 && out_h == 0) || (w > 0 && out_w == 0) {
            return Err(Error::shape(format!("scale {} shrinks {w}x{h} frames to nothing", config.scale)));
        }
        Ok(animation)
    }

    /// Colorizes `flows` (with one scale for the whole sequence) and animates the colors.
    pub fn from_flow_colors(flows: &Array4<f32>, max_motion: Option<f32>, config: &AnimationConfig) -> Result<Self> {
        let colors = FlowColorizer::default().colorize_sequence(flows, max_motion)?;
        Self::new(Video::Rgb(colors), config)
    }

    /// Lays an (N, H, W, 3) color video over the base video.
    pub fn with_video2(mut self, video2: Array4<u8>) -> Result<Self> {
        let (n, h, w, c) = video2.dim();
        if (n, h, w) != self.video.dim() || c != 3 {
            return Err(Error::shape(format!(
                "video2 {:?} does not match video {:?}",
                video2.dim(),
                self.video.dim()
            )));
        }
        self.video2 = Some(video2);
        Ok(self)
    }

    /// Draws (N, H, W, 2) flow vectors as arrows.
    pub fn with_vectors(mut self, vectors: Array4<f32>) -> Result<Self> {
        let (n, h, w, c) = vectors.dim();
        if (n, h, w) != self.video.dim() || c != 2 {
            return Err(Error::shape(format!(
                "vectors {:?} do not match video {:?}",
                vectors.dim(),
                self.video.dim()
            )));
        }
        self.vectors = Some(vectors);
        Ok(self)
    }

    pub fn len(&self) -> usize {
        self.video.dim().0
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// (width, height) of rendered frames.
    pub fn output_size(&self) -> (u32, u32) {
        let (_, h, w) = self.video.dim();
        ((w as f64 * self.scale).floor() as u32, (h as f64 * self.scale).floor() as u32)
    }

    /// Renders frame `i`.
    pub fn frame(&self, i: usize) -> Result<RgbaImage> {
        if i >= self.len() {
            return Err(Error::shape(format!("frame {i} out of range for {} frames", self.len())));
        }

        let mut image = self.video.frame_image(i);
        if let Some(video2) = &self.video2 {
            let top = rgb_to_image(video2.index_axis(Axis(0), i));
            blend(&mut image, &top, self.video2_alpha)?;
        }

        let (out_w, out_h) = self.output_size();
        if (out_w, out_h) != image.dimensions() {
            image = imageops::resize(&image, out_w, out_h, FilterType::Triangle);
        }

        if let Some(vectors) = &self.vectors {
            self.draw_vectors(&mut image, vectors.slice(s![i, .., .., ..]));
        }

        Ok(DynamicImage::ImageRgb8(image).to_rgba8())
    }

    /// All frames as an (N, H', W', 4) array.
    pub fn to_rgba(&self) -> Result<Array4<u8>> {
        let (w, h) = self.output_size();
        let mut data = Vec::with_capacity(self.len() * (w * h * 4) as usize);
        for i in 0..self.len() {
            data.extend_from_slice(self.frame(i)?.as_raw());
        }
        Array4::from_shape_vec((self.len(), h as usize, w as usize, 4), data).map_err(|e| Error::shape(e.to_string()))
    }

    /// All frames as images.
    pub fn frames(&self) -> Result<Vec<RgbaImage>> {
        (0..self.len()).map(|i| self.frame(i)).collect()
    }

    /// Writes an endlessly looping GIF at `fps` frames per second.
    pub fn save_gif<P: AsRef<Path>>(&self, path: P, fps: u32) -> Result<()> {
        if fps == 0 {
            return Err(Error::config("fps must be at least 1"));
        }
        let path = path.as_ref();
        let mut encoder = GifEncoder::new_with_speed(BufWriter::new(File::create(path)?), GIF_SPEED);
        encoder.set_repeat(Repeat::Infinite)?;
        let delay = Delay::from_numer_denom_ms(1000, fps);
        for i in 0..self.len() {
            encoder.encode_frame(Frame::from_parts(self.frame(i)?, 0, 0, delay))?;
            debug!(frame = i, "encoded gif frame");
        }
        info!(path = %path.display(), frames = self.len(), fps, "saved animation");
        Ok(())
    }

    /// Writes every frame as a PNG through `pool`.
    pub async fn save_frames(&self, dir: &Path, prefix: &str, pool: &ExportPool) -> Result<Vec<PathBuf>> {
        let frames = self.frames()?;
        let paths = pool.write_frames(frames, dir, prefix).await?;
        info!(dir = %dir.display(), frames = paths.len(), "saved frame sequence");
        Ok(paths)
    }

    fn draw_vectors(&self, image: &mut RgbImage, vectors: ArrayView3<'_, f32>) {
        let (h, w, _) = vectors.dim();
        let scale = self.scale;
        // Pixel centers map to ((p + 0.5) * scale - 0.5) in the resized frame.
        let to_out = |p: f64| (p + 0.5) * scale - 0.5;
        for y in (0..h).step_by(self.vector_step) {
            for x in (0..w).step_by(self.vector_step) {
                let (u, v) = (vectors[[y, x, 0]], vectors[[y, x, 1]]);
                if is_unknown(u, v) || (u == 0.0 && v == 0.0) {
                    continue;
                }
                let (xf, yf) = (x as f64, y as f64);
                let tail = (to_out(xf), to_out(yf));
                let head = (to_out(xf + u as f64), to_out(yf + v as f64));
                draw_arrow(image, tail, head, &self.style);
            }
        }
    }
}

/// One (H, W) grayscale frame as an RGB image.
pub fn gray_to_image(frame: ArrayView2<'_, u8>) -> RgbImage {
    let (h, w) = frame.dim();
    RgbImage::from_fn(w as u32, h as u32, |x, y| {
        let g = frame[[y as usize, x as usize]];
        Rgb([g, g, g])
    })
}

/// One (H, W, 3) frame as an RGB image, channels copied in order.
pub fn rgb_to_image(frame: ArrayView3<'_, u8>) -> RgbImage {
    let (h, w, _) = frame.dim();
    RgbImage::from_fn(w as u32, h as u32, |x, y| {
        let (x, y) = (x as usize, y as usize);
        Rgb([frame[[y, x, 0]], frame[[y, x, 1]], frame[[y, x, 2]]])
    })
}
