// THEORY:
// Flow sequences and their source videos usually arrive as directories of
// numbered files (`frame_0001.flo`, `frame_0002.flo`, ...). This module turns
// such a directory into an ordered stack of frames.
//
// The frame number is the single run of digits in a file name. Names with no
// digits or with several runs (`cam2_frame_0001.flo`) are ambiguous and are
// skipped with a warning. Frames are ordered numerically, so `frame_10` comes
// after `frame_9`.

use crate::core_modules::flo_codec::read_flow;
use crate::error::{Error, Result};
use image::DynamicImage;
use ndarray::{Array3, Array4, Axis, stack};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Why a file name yields no frame number.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Unnumbered {
    NoDigits,
    SeveralRuns,
    TooLarge,
}

fn parse_frame_index(file_name: &str) -> std::result::Result<u64, Unnumbered> {
    let mut runs = file_name
        .split(|c: char| !c.is_ascii_digit())
        .filter(|run| !run.is_empty());
    let first = runs.next().ok_or(Unnumbered::NoDigits)?;
    if runs.next().is_some() {
        return Err(Unnumbered::SeveralRuns);
    }
    first.parse().map_err(|_| Unnumbered::TooLarge)
}

/// The frame number embedded in a file name, if there is exactly one.
pub fn frame_index(file_name: &str) -> Option<u64> {
    parse_frame_index(file_name).ok()
}

/// Files in `dir` ending in `extension`, sorted by frame number.
pub fn list_frames<P: AsRef<Path>>(dir: P, extension: &str) -> Result<Vec<(u64, PathBuf)>> {
    let dir = dir.as_ref();
    let mut frames = Vec::new();
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let name = entry.file_name();
        let Some(name) = name.to_str() else { continue };
        if !name.ends_with(extension) {
            continue;
        }
        match parse_frame_index(name) {
            Ok(index) => frames.push((index, entry.path())),
            Err(Unnumbered::NoDigits) => warn!(file = name, "skipping file without a frame number"),
            Err(Unnumbered::SeveralRuns) => warn!(file = name, "skipping file with several digit runs"),
            Err(Unnumbered::TooLarge) => warn!(file = name, "skipping file whose frame number exceeds u64"),
        }
    }
    frames.sort_by_key(|(index, _)| *index);
    debug!(dir = %dir.display(), count = frames.len(), "listed frames");
    Ok(frames)
}

/// Loads every `.flo` file in `dir` as an (N, H, W, 2) sequence.
pub fn read_flow_collection<P: AsRef<Path>>(dir: P) -> Result<Array4<f32>> {
    let dir = dir.as_ref();
    let frames = list_frames(dir, ".flo")?;
    if frames.is_empty() {
        return Err(Error::EmptyCollection(dir.to_path_buf()));
    }

    let fields = frames
        .iter()
        .map(|(_, path)| read_flow(path))
        .collect::<Result<Vec<Array3<f32>>>>()?;
    stack_frames(&fields)
}

/// Loads every image in `dir` ending in `extension` (e.g. ".png"), in frame order.
pub fn read_image_collection<P: AsRef<Path>>(dir: P, extension: &str) -> Result<Vec<DynamicImage>> {
    let dir = dir.as_ref();
    let frames = list_frames(dir, extension)?;
    if frames.is_empty() {
        return Err(Error::EmptyCollection(dir.to_path_buf()));
    }
    frames
        .iter()
        .map(|(_, path)| image::open(path).map_err(Error::from))
        .collect()
}

/// Converts images to an (N, H, W) grayscale video.
pub fn images_to_gray_video(images: &[DynamicImage]) -> Result<Array3<u8>> {
    let (width, height) = common_size(images)?;
    let mut video = Array3::<u8>::zeros((images.len(), height as usize, width as usize));
    for (mut frame, image) in video.outer_iter_mut().zip(images) {
        let gray = image.to_luma8();
        for (x, y, pixel) in gray.enumerate_pixels() {
            frame[[y as usize, x as usize]] = pixel.0[0];
        }
    }
    Ok(video)
}

/// Converts images to an (N, H, W, 3) RGB video.
pub fn images_to_rgb_video(images: &[DynamicImage]) -> Result<Array4<u8>> {
    let (width, height) = common_size(images)?;
    let mut video = Array4::<u8>::zeros((images.len(), height as usize, width as usize, 3));
    for (mut frame, image) in video.outer_iter_mut().zip(images) {
        let rgb = image.to_rgb8();
        for (x, y, pixel) in rgb.enumerate_pixels() {
            for c in 0..3 {
                frame[[y as usize, x as usize, c]] = pixel.0[c];
            }
        }
    }
    Ok(video)
}

fn stack_frames(fields: &[Array3<f32>]) -> Result<Array4<f32>> {
    let first = fields[0].dim();
    if let Some(bad) = fields.iter().find(|f| f.dim() != first) {
        return Err(Error::shape(format!(
            "flow frames differ in shape: {:?} vs {:?}",
            first,
            bad.dim()
        )));
    }
    let views: Vec<_> = fields.iter().map(|f| f.view()).collect();
    stack(Axis(0), &views).map_err(|e| Error::shape(e.to_string()))
}

fn common_size(images: &[DynamicImage]) -> Result<(u32, u32)> {
    let Some(first) = images.first() else {
        return Err(Error::shape("no images to convert"));
    };
    let size = (first.width(), first.height());
    if images.iter().any(|i| (i.width(), i.height()) != size) {
        return Err(Error::shape("video frames differ in size"));
    }
    Ok(size)
}
