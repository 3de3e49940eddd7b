//! Source image loading, color-space resolution, and resizing.
//!
//! Every image that leaves this module carries a [`ColorSpace`] tag that
//! matches the eventual output format's encoding: the load path resolves
//! the mode-dependent hint, retags where `FORCE_SRGB` demands it, and
//! re-encodes pixel values when the file's encoding and the target's
//! encoding disagree.

use std::path::Path;

use image::DynamicImage;
use tracing::debug;

use crate::config::ColorSpaceMode;
use crate::error::PackError;
use crate::formats::DataType;

/// Stored encoding of pixel values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColorSpace {
    Srgb,
    Linear,
}

/// A decoded source image with its resolved encoding.
#[derive(Debug)]
pub struct LoadedImage {
    pub pixels: DynamicImage,
    pub color_space: ColorSpace,
}

impl LoadedImage {
    pub fn width(&self) -> u32 {
        self.pixels.width()
    }

    pub fn height(&self) -> u32 {
        self.pixels.height()
    }

    /// (data type, bits per channel) of the decoded pixel data.
    pub fn depth(&self) -> (DataType, u32) {
        sample_depth(&self.pixels)
    }
}

/// (data type, bits per channel) for a decoded image. The image crate
/// decodes to 8-bit unorm, 16-bit unorm, or 32-bit float buffers.
pub fn sample_depth(image: &DynamicImage) -> (DataType, u32) {
    use image::ColorType::*;
    match image.color() {
        L16 | La16 | Rgb16 | Rgba16 => (DataType::Unorm, 16),
        Rgb32F | Rgba32F => (DataType::Float, 32),
        _ => (DataType::Unorm, 8),
    }
}

/// Load-time color-space hint derived from the spec's mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SrgbHint {
    /// Treat the file as sRGB unless it declares otherwise.
    DefaultSrgb,
    /// Use the file's own encoding.
    UseDeclared,
    /// Treat the file as linear regardless of declaration.
    IgnoreSrgb,
}

fn load_hint(mode: ColorSpaceMode) -> SrgbHint {
    match mode {
        ColorSpaceMode::ForceSrgb | ColorSpaceMode::AssumeSrgb => SrgbHint::DefaultSrgb,
        ColorSpaceMode::AssumeLinear => SrgbHint::UseDeclared,
        ColorSpaceMode::ForceLinear => SrgbHint::IgnoreSrgb,
    }
}

/// The encoding a decoded image declares, under the given hint. The
/// decoder surfaces no color-space metadata, so an image only reads as
/// sRGB when the hint defaults it there; under `UseDeclared` everything
/// resolves linear (float formats are linear by convention, and LDR files
/// rarely carry an explicit sRGB declaration).
fn declared_color_space(hint: SrgbHint) -> ColorSpace {
    match hint {
        SrgbHint::DefaultSrgb => ColorSpace::Srgb,
        SrgbHint::UseDeclared | SrgbHint::IgnoreSrgb => ColorSpace::Linear,
    }
}

/// Load a source image, resolve its color space against the mode, and
/// re-encode it if its encoding differs from the target's.
pub fn load(
    path: &Path,
    mode: ColorSpaceMode,
    target_srgb: bool,
) -> Result<LoadedImage, PackError> {
    let pixels = image::open(path)?;

    let mut color_space = declared_color_space(load_hint(mode));

    // FORCE_SRGB retags without resampling.
    if mode == ColorSpaceMode::ForceSrgb && color_space == ColorSpace::Linear {
        color_space = ColorSpace::Srgb;
    }

    let (data_type, bits) = sample_depth(&pixels);
    debug!(
        path = %path.display(),
        width = pixels.width(),
        height = pixels.height(),
        srgb = (color_space == ColorSpace::Srgb),
        %data_type,
        bits,
        "loaded source image"
    );

    let target = if target_srgb {
        ColorSpace::Srgb
    } else {
        ColorSpace::Linear
    };

    let pixels = if color_space != target {
        debug!(
            path = %path.display(),
            from = ?color_space,
            to = ?target,
            "re-encoding color space"
        );
        convert_color_space(pixels, color_space, target)
    } else {
        pixels
    };

    Ok(LoadedImage {
        pixels,
        color_space: target,
    })
}

/// sRGB transfer decode (gamma-encoded value to linear light).
pub fn srgb_to_linear(v: f32) -> f32 {
    if v <= 0.04045 {
        v / 12.92
    } else {
        ((v + 0.055) / 1.055).powf(2.4)
    }
}

/// sRGB transfer encode (linear light to gamma-encoded value).
pub fn linear_to_srgb(v: f32) -> f32 {
    if v <= 0.003_130_8 {
        v * 12.92
    } else {
        1.055 * v.powf(1.0 / 2.4) - 0.055
    }
}

/// Value-preserving re-encode between sRGB and linear. Applies the
/// transfer function to color channels only; alpha passes through.
pub fn convert_color_space(image: DynamicImage, from: ColorSpace, to: ColorSpace) -> DynamicImage {
    if from == to {
        return image;
    }
    let transfer: fn(f32) -> f32 = match to {
        ColorSpace::Linear => srgb_to_linear,
        ColorSpace::Srgb => linear_to_srgb,
    };

    let mut image = image;
    match &mut image {
        DynamicImage::ImageLuma8(buf) => map_unorm::<u8>(buf, 1, 1, transfer),
        DynamicImage::ImageLumaA8(buf) => map_unorm::<u8>(buf, 2, 1, transfer),
        DynamicImage::ImageRgb8(buf) => map_unorm::<u8>(buf, 3, 3, transfer),
        DynamicImage::ImageRgba8(buf) => map_unorm::<u8>(buf, 4, 3, transfer),
        DynamicImage::ImageLuma16(buf) => map_unorm::<u16>(buf, 1, 1, transfer),
        DynamicImage::ImageLumaA16(buf) => map_unorm::<u16>(buf, 2, 1, transfer),
        DynamicImage::ImageRgb16(buf) => map_unorm::<u16>(buf, 3, 3, transfer),
        DynamicImage::ImageRgba16(buf) => map_unorm::<u16>(buf, 4, 3, transfer),
        DynamicImage::ImageRgb32F(buf) => map_float(buf, 3, 3, transfer),
        DynamicImage::ImageRgba32F(buf) => map_float(buf, 4, 3, transfer),
        _ => {}
    }
    image
}

trait UnormSample: Copy {
    const MAX: f32;
    fn to_f32(self) -> f32;
    fn from_f32(v: f32) -> Self;
}

impl UnormSample for u8 {
    const MAX: f32 = 255.0;
    fn to_f32(self) -> f32 {
        self as f32 / Self::MAX
    }
    fn from_f32(v: f32) -> Self {
        (v * Self::MAX + 0.5).clamp(0.0, Self::MAX) as u8
    }
}

impl UnormSample for u16 {
    const MAX: f32 = 65535.0;
    fn to_f32(self) -> f32 {
        self as f32 / Self::MAX
    }
    fn from_f32(v: f32) -> Self {
        (v * Self::MAX + 0.5).clamp(0.0, Self::MAX) as u16
    }
}

fn map_unorm<T: UnormSample>(
    samples: &mut [T],
    channels: usize,
    color_channels: usize,
    transfer: fn(f32) -> f32,
) {
    for pixel in samples.chunks_exact_mut(channels) {
        for sample in pixel.iter_mut().take(color_channels) {
            *sample = T::from_f32(transfer(sample.to_f32()));
        }
    }
}

fn map_float(
    samples: &mut [f32],
    channels: usize,
    color_channels: usize,
    transfer: fn(f32) -> f32,
) {
    for pixel in samples.chunks_exact_mut(channels) {
        for sample in pixel.iter_mut().take(color_channels) {
            *sample = transfer(*sample);
        }
    }
}

/// Resize an image to the target dimensions. A no-op when the dimensions
/// already match.
pub fn resize(image: DynamicImage, width: u32, height: u32) -> DynamicImage {
    if image.width() == width && image.height() == height {
        return image;
    }
    debug!(
        from_width = image.width(),
        from_height = image.height(),
        width,
        height,
        "resizing source image"
    );
    image.resize_exact(width, height, image::imageops::FilterType::Lanczos3)
}
