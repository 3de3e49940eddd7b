//! Channel extraction and interleaved combination.
//!
//! Extraction reduces a loaded image to a single-channel slice, either by
//! projecting one of its channels or by synthesizing a constant fill. The
//! combiner validates a set of slices for mutual compatibility and
//! interleaves them into one packed surface.

use bytemuck::{cast_slice, pod_collect_to_vec, Pod, Zeroable};
use tracing::debug;

use crate::config::{ConstantFill, SourceChannel};
use crate::error::PackError;
use crate::formats::{self, DataType, PackedFormat};
use crate::image_io::{srgb_to_linear, LoadedImage};

/// A single-channel image: one scalar lane in native byte order.
#[derive(Debug, Clone)]
pub struct ChannelSlice {
    pub width: u32,
    pub height: u32,
    pub data_type: DataType,
    pub bits: u32,
    pub data: Vec<u8>,
}

impl ChannelSlice {
    pub fn pixel_count(&self) -> usize {
        self.width as usize * self.height as usize
    }
}

/// Project one channel of a loaded image into a slice, preserving the
/// source bit depth. Images without an alpha channel read as opaque.
pub fn extract(image: &LoadedImage, select: SourceChannel) -> ChannelSlice {
    let lane = select.lane();
    let (data_type, bits) = image.depth();
    let (width, height) = (image.width(), image.height());

    let data = match bits {
        16 => {
            let rgba = image.pixels.to_rgba16();
            let values: Vec<u16> = rgba.pixels().map(|p| p.0[lane]).collect();
            cast_slice(&values).to_vec()
        }
        32 => {
            let rgba = image.pixels.to_rgba32f();
            let values: Vec<f32> = rgba.pixels().map(|p| p.0[lane]).collect();
            cast_slice(&values).to_vec()
        }
        _ => {
            let rgba = image.pixels.to_rgba8();
            rgba.pixels().map(|p| p.0[lane]).collect()
        }
    };

    ChannelSlice {
        width,
        height,
        data_type,
        bits,
        data,
    }
}

/// Synthesize a constant-valued slice matching the donor image's size and
/// bit depth. Only unorm 8/16 channels support constant fill; the value is
/// the fill fraction scaled to the integer range, clamped, and truncated.
pub fn extract_constant(
    donor: &LoadedImage,
    fill: ConstantFill,
) -> Result<ChannelSlice, PackError> {
    let (data_type, bits) = donor.depth();
    let (width, height) = (donor.width(), donor.height());
    let count = width as usize * height as usize;

    if data_type != DataType::Unorm {
        return Err(PackError::UnsupportedBitDepth { data_type, bits });
    }

    let data = match bits {
        8 => {
            let value = (fill.fraction() * u8::MAX as f32).clamp(0.0, u8::MAX as f32) as u8;
            vec![value; count]
        }
        16 => {
            let value = (fill.fraction() * u16::MAX as f32).clamp(0.0, u16::MAX as f32) as u16;
            cast_slice(&vec![value; count]).to_vec()
        }
        _ => return Err(PackError::UnsupportedBitDepth { data_type, bits }),
    };

    Ok(ChannelSlice {
        width,
        height,
        data_type,
        bits,
        data,
    })
}

/// One interleaved multi-channel image.
#[derive(Debug, Clone)]
pub struct PackedSurface {
    pub width: u32,
    pub height: u32,
    pub format: PackedFormat,
    pub data: Vec<u8>,
}

impl PackedSurface {
    /// Expand to an 8-bit RGBA image. Missing lanes read as zero, missing
    /// alpha as opaque; 16-bit channels quantize to their top byte.
    pub fn to_rgba8(&self) -> Result<image::RgbaImage, PackError> {
        let (data_type, bits, channels) = self.format.descriptor();
        let n = channels as usize;
        let count = self.width as usize * self.height as usize;
        let mut out = Vec::with_capacity(count * 4);

        match (data_type, bits) {
            (DataType::Unorm, 8) => {
                for pixel in self.data.chunks_exact(n) {
                    push_rgba8(&mut out, pixel, n);
                }
            }
            (DataType::Unorm, 16) => {
                let samples: Vec<u16> = pod_collect_to_vec(&self.data);
                for pixel in samples.chunks_exact(n) {
                    let quantized: Vec<u8> = pixel.iter().map(|&v| (v >> 8) as u8).collect();
                    push_rgba8(&mut out, &quantized, n);
                }
            }
            _ => return Err(PackError::UnsupportedBitDepth { data_type, bits }),
        }

        image::RgbaImage::from_raw(self.width, self.height, out)
            .ok_or_else(|| PackError::codec("packed surface has inconsistent dimensions"))
    }

    /// Expand to a 32-bit float RGBA image. sRGB-tagged surfaces are
    /// decoded to linear light in the process.
    pub fn to_rgba32f(&self) -> Result<image::Rgba32FImage, PackError> {
        let (data_type, bits, channels) = self.format.descriptor();
        let n = channels as usize;
        let srgb = self.format.is_srgb();
        let count = self.width as usize * self.height as usize;
        let mut out = Vec::with_capacity(count * 4);

        let mut push = |pixel: &[f32]| {
            for lane in 0..4 {
                let mut v = if lane < n {
                    pixel[lane]
                } else if lane == 3 {
                    1.0
                } else {
                    0.0
                };
                if srgb && lane < 3 && lane < n {
                    v = srgb_to_linear(v);
                }
                out.push(v);
            }
        };

        match (data_type, bits) {
            (DataType::Unorm, 8) => {
                for pixel in self.data.chunks_exact(n) {
                    let f: Vec<f32> = pixel.iter().map(|&v| v as f32 / 255.0).collect();
                    push(&f);
                }
            }
            (DataType::Unorm, 16) => {
                let samples: Vec<u16> = pod_collect_to_vec(&self.data);
                for pixel in samples.chunks_exact(n) {
                    let f: Vec<f32> = pixel.iter().map(|&v| v as f32 / 65535.0).collect();
                    push(&f);
                }
            }
            (DataType::Float, 32) => {
                let samples: Vec<f32> = pod_collect_to_vec(&self.data);
                for pixel in samples.chunks_exact(n) {
                    push(pixel);
                }
            }
            _ => return Err(PackError::UnsupportedBitDepth { data_type, bits }),
        }

        image::Rgba32FImage::from_raw(self.width, self.height, out)
            .ok_or_else(|| PackError::codec("packed surface has inconsistent dimensions"))
    }
}

fn push_rgba8(out: &mut Vec<u8>, pixel: &[u8], n: usize) {
    for lane in 0..4 {
        let v = if lane < n {
            pixel[lane]
        } else if lane == 3 {
            u8::MAX
        } else {
            0
        };
        out.push(v);
    }
}

/// Check every pair of slices for identical dimensions and format.
fn ensure_compatible(slices: &[ChannelSlice]) -> Result<(), PackError> {
    for i in 0..slices.len() {
        for j in i + 1..slices.len() {
            let (a, b) = (&slices[i], &slices[j]);
            if a.width != b.width {
                return Err(PackError::IncompatibleSlices(format!(
                    "slice {i} width {} != slice {j} width {}",
                    a.width, b.width
                )));
            }
            if a.height != b.height {
                return Err(PackError::IncompatibleSlices(format!(
                    "slice {i} height {} != slice {j} height {}",
                    a.height, b.height
                )));
            }
            if a.data_type != b.data_type || a.bits != b.bits {
                return Err(PackError::IncompatibleSlices(format!(
                    "slice {i} is {}-bit {} but slice {j} is {}-bit {}",
                    a.bits, a.data_type, b.bits, b.data_type
                )));
            }
        }
    }
    Ok(())
}

/// Interleave a set of slices into one packed surface. Lane order follows
/// slice order. The packed format comes from the first slice's type and
/// depth plus the slice count; `srgb` requests the gamma-tagged variant.
pub fn combine(slices: &[ChannelSlice], srgb: bool) -> Result<PackedSurface, PackError> {
    if slices.is_empty() {
        return Err(PackError::IncompatibleSlices("empty slice set".into()));
    }
    ensure_compatible(slices)?;

    let first = &slices[0];
    let mut format = formats::resolve(first.data_type, first.bits, slices.len() as u32).ok_or(
        PackError::UnresolvedFormat {
            data_type: first.data_type,
            bits: first.bits,
            channels: slices.len() as u32,
        },
    )?;
    if srgb {
        format = format.with_srgb();
    }

    let data = match first.bits {
        8 => interleave::<u8>(slices),
        16 => interleave::<u16>(slices),
        _ => {
            return Err(PackError::UnsupportedBitDepth {
                data_type: first.data_type,
                bits: first.bits,
            })
        }
    };

    debug!(
        width = first.width,
        height = first.height,
        ?format,
        lanes = slices.len(),
        "combined channel slices"
    );

    Ok(PackedSurface {
        width: first.width,
        height: first.height,
        format,
        data,
    })
}

fn interleave<T: Pod + Zeroable>(slices: &[ChannelSlice]) -> Vec<u8> {
    let n = slices.len();
    let count = slices[0].pixel_count();
    let mut out = vec![T::zeroed(); count * n];

    for (c, slice) in slices.iter().enumerate() {
        let lane: Vec<T> = pod_collect_to_vec(&slice.data);
        for (i, &value) in lane.iter().enumerate() {
            out[i * n + c] = value;
        }
    }

    cast_slice(&out).to_vec()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::image_io::ColorSpace;
    use image::DynamicImage;

    fn rgba8_image(width: u32, height: u32, pixel: [u8; 4]) -> LoadedImage {
        LoadedImage {
            pixels: DynamicImage::ImageRgba8(image::RgbaImage::from_pixel(
                width,
                height,
                image::Rgba(pixel),
            )),
            color_space: ColorSpace::Linear,
        }
    }

    fn slice_of(value: u8, width: u32, height: u32) -> ChannelSlice {
        ChannelSlice {
            width,
            height,
            data_type: DataType::Unorm,
            bits: 8,
            data: vec![value; (width * height) as usize],
        }
    }

    #[test]
    fn extract_selects_the_requested_lane() {
        let image = rgba8_image(2, 2, [10, 20, 30, 40]);
        assert_eq!(extract(&image, SourceChannel::R).data, vec![10; 4]);
        assert_eq!(extract(&image, SourceChannel::G).data, vec![20; 4]);
        assert_eq!(extract(&image, SourceChannel::B).data, vec![30; 4]);
        assert_eq!(extract(&image, SourceChannel::A).data, vec![40; 4]);
    }

    #[test]
    fn extract_reads_missing_alpha_as_opaque() {
        let image = LoadedImage {
            pixels: DynamicImage::ImageRgb8(image::RgbImage::from_pixel(
                2,
                2,
                image::Rgb([1, 2, 3]),
            )),
            color_space: ColorSpace::Linear,
        };
        assert_eq!(extract(&image, SourceChannel::A).data, vec![255; 4]);
    }

    #[test]
    fn extract_preserves_16_bit_depth() {
        let image = LoadedImage {
            pixels: DynamicImage::ImageRgba16(image::ImageBuffer::from_pixel(
                2,
                1,
                image::Rgba([1000u16, 2000, 3000, 4000]),
            )),
            color_space: ColorSpace::Linear,
        };
        let slice = extract(&image, SourceChannel::G);
        assert_eq!(slice.bits, 16);
        assert_eq!(slice.data_type, DataType::Unorm);
        let lane: Vec<u16> = pod_collect_to_vec(&slice.data);
        assert_eq!(lane, &[2000, 2000]);
    }

    #[test]
    fn constant_fill_values_at_8_bit() {
        let donor = rgba8_image(2, 2, [0, 0, 0, 0]);
        let zero = extract_constant(&donor, ConstantFill::Zero).unwrap();
        let one = extract_constant(&donor, ConstantFill::One).unwrap();
        let half = extract_constant(&donor, ConstantFill::Half).unwrap();
        assert_eq!(zero.data, vec![0; 4]);
        assert_eq!(one.data, vec![255; 4]);
        // 0.5 * 255 = 127.5; the cast truncates.
        assert_eq!(half.data, vec![127; 4]);
    }

    #[test]
    fn constant_fill_values_at_16_bit() {
        let donor = LoadedImage {
            pixels: DynamicImage::ImageLuma16(image::ImageBuffer::from_pixel(
                1,
                2,
                image::Luma([0u16]),
            )),
            color_space: ColorSpace::Linear,
        };
        let half = extract_constant(&donor, ConstantFill::Half).unwrap();
        let lane: Vec<u16> = pod_collect_to_vec(&half.data);
        assert_eq!(lane, vec![32767, 32767]);
        let one = extract_constant(&donor, ConstantFill::One).unwrap();
        let lane: Vec<u16> = pod_collect_to_vec(&one.data);
        assert_eq!(lane, vec![65535, 65535]);
    }

    #[test]
    fn constant_fill_rejects_float_donors() {
        let donor = LoadedImage {
            pixels: DynamicImage::ImageRgb32F(image::Rgb32FImage::new(2, 2)),
            color_space: ColorSpace::Linear,
        };
        assert!(matches!(
            extract_constant(&donor, ConstantFill::One),
            Err(PackError::UnsupportedBitDepth { .. })
        ));
    }

    #[test]
    fn combine_interleaves_in_lane_order() {
        let slices = vec![
            slice_of(1, 2, 2),
            slice_of(2, 2, 2),
            slice_of(3, 2, 2),
            slice_of(4, 2, 2),
        ];
        let surface = combine(&slices, false).unwrap();
        assert_eq!(surface.format, PackedFormat::Rgba8Unorm);
        assert_eq!(surface.data, [1, 2, 3, 4].repeat(4));
    }

    #[test]
    fn combine_four_equal_slices_preserves_every_pixel() {
        // Per-slice gradients so (x, y, c) can be checked individually.
        let mut slices = Vec::new();
        for c in 0..4u8 {
            let data: Vec<u8> = (0..64 * 64)
                .map(|i| (i as u8).wrapping_add(c * 17))
                .collect();
            slices.push(ChannelSlice {
                width: 64,
                height: 64,
                data_type: DataType::Unorm,
                bits: 8,
                data,
            });
        }
        let surface = combine(&slices, false).unwrap();
        assert_eq!(surface.width, 64);
        assert_eq!(surface.height, 64);
        assert_eq!(surface.format, PackedFormat::Rgba8Unorm);
        for i in 0..64 * 64 {
            for c in 0..4 {
                assert_eq!(surface.data[i * 4 + c], slices[c].data[i]);
            }
        }
    }

    #[test]
    fn combine_rejects_any_mismatched_slice() {
        // The outlier is last; pairwise checking must still catch it.
        let slices = vec![slice_of(1, 4, 4), slice_of(2, 4, 4), slice_of(3, 4, 8)];
        assert!(matches!(
            combine(&slices, false),
            Err(PackError::IncompatibleSlices(_))
        ));

        let mut mixed_depth = vec![slice_of(1, 4, 4), slice_of(2, 4, 4)];
        mixed_depth[1].bits = 16;
        mixed_depth[1].data = vec![0; 4 * 4 * 2];
        assert!(matches!(
            combine(&mixed_depth, false),
            Err(PackError::IncompatibleSlices(_))
        ));
    }

    #[test]
    fn combine_fails_on_unresolvable_channel_counts() {
        // Three 8-bit channels have no packed format.
        let slices = vec![slice_of(1, 2, 2), slice_of(2, 2, 2), slice_of(3, 2, 2)];
        assert!(matches!(
            combine(&slices, false),
            Err(PackError::UnresolvedFormat { channels: 3, .. })
        ));
    }

    #[test]
    fn combine_tags_srgb_when_the_target_wants_it() {
        let slices = vec![
            slice_of(1, 2, 2),
            slice_of(2, 2, 2),
            slice_of(3, 2, 2),
            slice_of(4, 2, 2),
        ];
        let surface = combine(&slices, true).unwrap();
        assert_eq!(surface.format, PackedFormat::Rgba8UnormSrgb);

        // Formats without an sRGB variant keep their base format.
        let two = vec![slice_of(1, 2, 2), slice_of(2, 2, 2)];
        let surface = combine(&two, true).unwrap();
        assert_eq!(surface.format, PackedFormat::Rg8Unorm);
    }

    #[test]
    fn combine_interleaves_16_bit_lanes() {
        let lane = |v: u16| ChannelSlice {
            width: 2,
            height: 1,
            data_type: DataType::Unorm,
            bits: 16,
            data: cast_slice(&[v; 2]).to_vec(),
        };
        let surface = combine(&[lane(256), lane(512)], false).unwrap();
        assert_eq!(surface.format, PackedFormat::Rg16Unorm);
        let samples: Vec<u16> = pod_collect_to_vec(&surface.data);
        assert_eq!(samples, vec![256, 512, 256, 512]);
    }

    #[test]
    fn packed_surface_expands_to_rgba8() {
        let surface = PackedSurface {
            width: 1,
            height: 1,
            format: PackedFormat::Rg8Unorm,
            data: vec![7, 9],
        };
        let rgba = surface.to_rgba8().unwrap();
        assert_eq!(rgba.get_pixel(0, 0).0, [7, 9, 0, 255]);
    }

    #[test]
    fn packed_surface_expands_16_bit_to_rgba8_by_truncation() {
        let surface = PackedSurface {
            width: 1,
            height: 1,
            format: PackedFormat::R16Unorm,
            data: cast_slice(&[0xabcdu16]).to_vec(),
        };
        let rgba = surface.to_rgba8().unwrap();
        assert_eq!(rgba.get_pixel(0, 0).0, [0xab, 0, 0, 255]);
    }
}
