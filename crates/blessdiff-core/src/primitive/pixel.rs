//! In-process difference primitive built on `image` and `image-compare`.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use image::{imageops, GrayImage, Rgb, RgbImage, Rgba, RgbaImage};
use image_compare::Algorithm;

use super::{CancelSignal, DiffPrimitive};
use crate::error::DiffError;

/// Below this overlap size (either axis) the structural window does not fit
/// and only the raw channel difference is used.
const MIN_STRUCTURE_SIDE: u32 = 8;

/// Perceptual dissimilarity over the union canvas, as a percentage.
///
/// Where the images overlap, the score is the structural dissimilarity
/// (`1 - MSSIM` on luma), floored by the mean absolute RGBA difference so
/// that colour or alpha changes at equal luma still register. Pixels present
/// in only one image count as fully different, so a size change is scored
/// rather than rejected.
#[derive(Debug, Clone, Copy, Default)]
pub struct PixelDiff;

impl PixelDiff {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl DiffPrimitive for PixelDiff {
    fn name(&self) -> &str {
        "pixel"
    }

    async fn diff(
        &self,
        blessed: &Path,
        current: &Path,
        diff_out: &Path,
        cancel: &CancelSignal,
    ) -> Result<f64, DiffError> {
        let blessed = blessed.to_path_buf();
        let current = current.to_path_buf();
        let diff_out = diff_out.to_path_buf();
        let cancel = cancel.clone();

        tokio::task::spawn_blocking(move || diff_files(&blessed, &current, &diff_out, &cancel))
            .await
            .map_err(|e| DiffError::Join(e.to_string()))?
    }
}

/// Decode both files, score them and save the composite.
///
/// Stops with [`DiffError::Cancelled`] at the next step boundary once
/// `cancel` fires.
pub fn diff_files(
    blessed: &Path,
    current: &Path,
    diff_out: &Path,
    cancel: &CancelSignal,
) -> Result<f64, DiffError> {
    let reference = decode(blessed)?;
    cancel.checkpoint()?;
    let candidate = decode(current)?;
    cancel.checkpoint()?;
    let (score, composite) = diff_images(&reference, &candidate)?;
    cancel.checkpoint()?;
    composite
        .save(diff_out)
        .map_err(|e| DiffError::Io(std::io::Error::other(e.to_string())))?;
    Ok(score)
}

fn decode(path: &Path) -> Result<RgbaImage, DiffError> {
    image::open(path)
        .map(|img| img.to_rgba8())
        .map_err(|e| DiffError::Decode {
            path: PathBuf::from(path),
            detail: e.to_string(),
        })
}

/// Score two decoded images and render the composite.
///
/// The composite shows the reference as faded greyscale with differing
/// pixels pushed towards red in proportion to their difference.
pub fn diff_images(
    reference: &RgbaImage,
    candidate: &RgbaImage,
) -> Result<(f64, RgbImage), DiffError> {
    let width = reference.width().max(candidate.width());
    let height = reference.height().max(candidate.height());
    let mut composite = RgbImage::new(width, height);

    if width == 0 || height == 0 {
        return Ok((0.0, composite));
    }

    let overlap_w = reference.width().min(candidate.width());
    let overlap_h = reference.height().min(candidate.height());

    let mut overlap_delta = 0.0f64;
    for y in 0..height {
        for x in 0..width {
            let a = pixel_at(reference, x, y);
            let b = pixel_at(candidate, x, y);

            let delta = match (a, b) {
                (Some(a), Some(b)) => {
                    let d = channel_delta(a, b);
                    overlap_delta += d;
                    d
                }
                _ => 1.0,
            };

            let base = a.or(b).map(faded_luma).unwrap_or(255.0);
            composite.put_pixel(x, y, highlight(base, delta));
        }
    }

    let union_area = f64::from(width) * f64::from(height);
    let overlap_area = f64::from(overlap_w) * f64::from(overlap_h);

    let overlap_score = if overlap_area == 0.0 || overlap_delta == 0.0 {
        0.0
    } else {
        let mean_abs = overlap_delta / overlap_area;
        if overlap_w < MIN_STRUCTURE_SIDE || overlap_h < MIN_STRUCTURE_SIDE {
            mean_abs
        } else {
            let similarity = structural_similarity(reference, candidate, overlap_w, overlap_h)?;
            (1.0 - similarity).clamp(0.0, 1.0).max(mean_abs)
        }
    };

    let score = (overlap_score * overlap_area + (union_area - overlap_area)) / union_area * 100.0;
    Ok((score, composite))
}

/// MSSIM of the luma planes over the shared top-left region.
fn structural_similarity(
    reference: &RgbaImage,
    candidate: &RgbaImage,
    width: u32,
    height: u32,
) -> Result<f64, DiffError> {
    let reference = luma_crop(reference, width, height);
    let candidate = luma_crop(candidate, width, height);
    image_compare::gray_similarity_structure(&Algorithm::MSSIMSimple, &reference, &candidate)
        .map(|similarity| similarity.score)
        .map_err(|e| DiffError::Compare(format!("{e:?}")))
}

fn luma_crop(img: &RgbaImage, width: u32, height: u32) -> GrayImage {
    let region = imageops::crop_imm(img, 0, 0, width, height).to_image();
    imageops::grayscale(&region)
}

fn pixel_at(img: &RgbaImage, x: u32, y: u32) -> Option<&Rgba<u8>> {
    (x < img.width() && y < img.height()).then(|| img.get_pixel(x, y))
}

/// Normalised mean absolute difference across the four channels (0..=1).
fn channel_delta(a: &Rgba<u8>, b: &Rgba<u8>) -> f64 {
    let sum: u32 = a
        .0
        .iter()
        .zip(b.0.iter())
        .map(|(&p, &q)| u32::from(p.abs_diff(q)))
        .sum();
    f64::from(sum) / (4.0 * 255.0)
}

fn faded_luma(p: &Rgba<u8>) -> f64 {
    let luma = 0.299 * f64::from(p[0]) + 0.587 * f64::from(p[1]) + 0.114 * f64::from(p[2]);
    192.0 + luma / 4.0
}

fn highlight(base: f64, delta: f64) -> Rgb<u8> {
    if delta == 0.0 {
        let g = base.round() as u8;
        return Rgb([g, g, g]);
    }
    let t = 0.25 + 0.75 * delta;
    let red = base + (255.0 - base) * t;
    let rest = base * (1.0 - t);
    Rgb([red.round() as u8, rest.round() as u8, rest.round() as u8])
}
