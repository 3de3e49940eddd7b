//! Compression and container output.
//!
//! BC6H and BC7 go through the GPU encoder when a device is present; every
//! other format (and the GPU formats, when no device exists) encodes on the
//! CPU through image_dds. Uncompressed targets whose layout matches the
//! packed surface pass their bytes through untouched. The result is a DDS
//! container with the full mip chain.

use std::path::Path;

use bytemuck::cast_slice;
use image_dds::ddsfile::Dds;
use image_dds::{Mipmaps, Quality, Surface, SurfaceRgba32Float, SurfaceRgba8};
use tracing::{debug, info, warn};

use crate::channels::PackedSurface;
use crate::error::PackError;
use crate::formats::{DataType, TargetFormat};
use crate::gpu_encoder::GpuEncoder;

/// Compress a mip chain to the target format.
pub fn compress(
    mips: &[PackedSurface],
    target: TargetFormat,
    gpu: Option<&mut GpuEncoder>,
) -> Result<Surface<Vec<u8>>, PackError> {
    if mips.is_empty() {
        return Err(PackError::codec("empty mip chain"));
    }

    if target.requires_gpu() {
        match gpu {
            Some(encoder) => match compress_gpu(mips, target, encoder) {
                Ok(surface) => return Ok(surface),
                Err(err) => {
                    warn!("GPU encode failed, falling back to CPU: {err:#}");
                }
            },
            None => {
                warn!(
                    "no GPU device, encoding {} on the CPU instead",
                    target.name()
                );
            }
        }
    }

    compress_cpu(mips, target)
}

fn compress_gpu(
    mips: &[PackedSurface],
    target: TargetFormat,
    encoder: &mut GpuEncoder,
) -> anyhow::Result<Surface<Vec<u8>>> {
    debug!(
        "GPU encoding {} mip levels to {}",
        mips.len(),
        target.name()
    );

    let mut batch = encoder.create_batch();
    for mip in mips {
        match target {
            TargetFormat::Bc6h => {
                let rgba = mip.to_rgba32f()?;
                let raw: Vec<u8> = cast_slice(rgba.as_raw()).to_vec();
                let (padded, pw, ph) = pad_to_block(&raw, mip.width, mip.height, 16);
                encoder.queue_bc6h(&mut batch, &padded, pw, ph)?;
            }
            _ => {
                let rgba = mip.to_rgba8()?;
                let raw = rgba.into_raw();
                let (padded, pw, ph) = pad_to_block(&raw, mip.width, mip.height, 4);
                encoder.queue_bc7(&mut batch, &padded, pw, ph)?;
            }
        }
    }

    let levels = encoder.flush_batch(batch)?;

    Ok(assemble(mips, target, levels.concat()))
}

fn compress_cpu(
    mips: &[PackedSurface],
    target: TargetFormat,
) -> Result<Surface<Vec<u8>>, PackError> {
    let packed = mips[0].format;

    // Uncompressed target in the packed surface's own layout: no re-encode.
    if !target.is_compressed() && packed.image_format() == Some(target.image_format()) {
        debug!("packed surface already in {}, passing through", target.name());
        let data: Vec<u8> = mips.iter().flat_map(|m| m.data.iter().copied()).collect();
        return Ok(assemble(mips, target, data));
    }

    debug!(
        "CPU encoding {} mip levels to {}",
        mips.len(),
        target.name()
    );

    let (data_type, bits, _) = packed.descriptor();
    let mut data = Vec::new();
    for mip in mips {
        let encoded = match (data_type, bits) {
            (DataType::Unorm, 8) => {
                let rgba = mip.to_rgba8()?;
                SurfaceRgba8::from_image(&rgba)
                    .encode(target.image_format(), Quality::Normal, Mipmaps::Disabled)
                    .map_err(PackError::codec)?
            }
            _ => {
                let rgba = mip.to_rgba32f()?;
                SurfaceRgba32Float::from_image(&rgba)
                    .encode(target.image_format(), Quality::Normal, Mipmaps::Disabled)
                    .map_err(PackError::codec)?
            }
        };
        data.extend_from_slice(&encoded.data);
    }

    Ok(assemble(mips, target, data))
}

fn assemble(mips: &[PackedSurface], target: TargetFormat, data: Vec<u8>) -> Surface<Vec<u8>> {
    Surface {
        width: mips[0].width,
        height: mips[0].height,
        depth: 1,
        layers: 1,
        mipmaps: mips.len() as u32,
        image_format: target.image_format(),
        data,
    }
}

/// Replicate edge pixels out to the next multiple of the 4x4 block size.
/// The padded image produces exactly the block count the original's DDS
/// level needs, so small mips (2x2, 1x1) encode without special cases.
fn pad_to_block(
    data: &[u8],
    width: u32,
    height: u32,
    bytes_per_pixel: usize,
) -> (Vec<u8>, u32, u32) {
    let pw = width.next_multiple_of(4);
    let ph = height.next_multiple_of(4);
    if pw == width && ph == height {
        return (data.to_vec(), width, height);
    }

    let mut out = Vec::with_capacity(pw as usize * ph as usize * bytes_per_pixel);
    for y in 0..ph {
        let sy = y.min(height - 1) as usize;
        for x in 0..pw {
            let sx = x.min(width - 1) as usize;
            let offset = (sy * width as usize + sx) * bytes_per_pixel;
            out.extend_from_slice(&data[offset..offset + bytes_per_pixel]);
        }
    }
    (out, pw, ph)
}

/// Build the DDS container for a compressed surface.
pub fn to_dds(surface: &Surface<Vec<u8>>) -> Result<Dds, PackError> {
    surface.to_dds().map_err(PackError::codec)
}

/// Write a DDS container, creating parent directories as needed.
pub fn save(dds: &Dds, path: &Path) -> Result<(), PackError> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    let mut buffer = Vec::new();
    dds.write(&mut buffer).map_err(PackError::codec)?;
    std::fs::write(path, &buffer)?;

    info!(path = %path.display(), bytes = buffer.len(), "saved texture");
    Ok(())
}

/// Decode the compressed result and log round-trip diagnostics: the last
/// mip's channel values and the base level's RMSE against the uncompressed
/// chain.
pub fn log_roundtrip(dds: &Dds, mips: &[PackedSurface]) -> Result<(), PackError> {
    let last = mips.len() as u32 - 1;
    let tail = image_dds::image_from_dds(dds, last).map_err(PackError::codec)?;
    let px = tail.get_pixel(0, 0).0;
    info!(
        "last decompressed mip channel values: {} {} {} {}",
        px[0], px[1], px[2], px[3]
    );

    let decoded = image_dds::image_from_dds(dds, 0).map_err(PackError::codec)?;
    let reference = mips[0].to_rgba8()?;
    let channels = mips[0].format.channel_count() as usize;

    let mut sum = 0.0f64;
    let mut count = 0usize;
    for (a, b) in decoded.pixels().zip(reference.pixels()) {
        for c in 0..channels {
            let diff = a.0[c] as f64 - b.0[c] as f64;
            sum += diff * diff;
            count += 1;
        }
    }
    if count > 0 {
        info!("RMSE = {:.3}", (sum / count as f64).sqrt());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::formats::PackedFormat;

    fn rgba8_surface(width: u32, height: u32, pixel: [u8; 4]) -> PackedSurface {
        PackedSurface {
            width,
            height,
            format: PackedFormat::Rgba8Unorm,
            data: pixel.repeat((width * height) as usize),
        }
    }

    #[test]
    fn passthrough_keeps_raw_bytes_and_mip_count() {
        let mips = vec![
            rgba8_surface(2, 2, [1, 2, 3, 4]),
            rgba8_surface(1, 1, [5, 6, 7, 8]),
        ];
        let surface = compress(&mips, TargetFormat::Rgba8, None).unwrap();
        assert_eq!(surface.width, 2);
        assert_eq!(surface.height, 2);
        assert_eq!(surface.mipmaps, 2);
        assert_eq!(surface.image_format, image_dds::ImageFormat::Rgba8Unorm);
        let mut expected = [1, 2, 3, 4].repeat(4);
        expected.extend_from_slice(&[5, 6, 7, 8]);
        assert_eq!(surface.data, expected);
    }

    #[test]
    fn srgb_tagged_surfaces_pass_through_srgb_targets() {
        let mut base = rgba8_surface(2, 2, [9, 9, 9, 9]);
        base.format = PackedFormat::Rgba8UnormSrgb;
        let surface = compress(&[base], TargetFormat::Rgba8Srgb, None).unwrap();
        assert_eq!(surface.image_format, image_dds::ImageFormat::Rgba8UnormSrgb);
        assert_eq!(surface.data, [9, 9, 9, 9].repeat(4));
    }

    #[test]
    fn cpu_bc1_encode_produces_block_sized_levels() {
        let mips = vec![rgba8_surface(4, 4, [255, 0, 0, 255])];
        let surface = compress(&mips, TargetFormat::Bc1, None).unwrap();
        // One 4x4 BC1 block is 8 bytes.
        assert_eq!(surface.data.len(), 8);
        assert_eq!(surface.mipmaps, 1);
    }

    #[test]
    fn bc7_without_a_device_falls_back_to_cpu() {
        let mips = vec![rgba8_surface(4, 4, [0, 255, 0, 255])];
        let surface = compress(&mips, TargetFormat::Bc7, None).unwrap();
        // One 4x4 BC7 block is 16 bytes.
        assert_eq!(surface.data.len(), 16);
        assert_eq!(surface.image_format, image_dds::ImageFormat::BC7RgbaUnorm);
    }

    #[test]
    fn padding_replicates_edges_to_block_multiples() {
        // 2x1 single-byte pixels.
        let (padded, pw, ph) = pad_to_block(&[10, 20], 2, 1, 1);
        assert_eq!((pw, ph), (4, 4));
        assert_eq!(padded.len(), 16);
        // Each row is [10, 20, 20, 20]; rows replicate downward.
        for row in padded.chunks_exact(4) {
            assert_eq!(row, [10, 20, 20, 20]);
        }
    }

    #[test]
    fn padding_is_identity_for_block_aligned_sizes() {
        let data: Vec<u8> = (0..16).collect();
        let (padded, pw, ph) = pad_to_block(&data, 4, 4, 1);
        assert_eq!((pw, ph), (4, 4));
        assert_eq!(padded, data);
    }

    #[test]
    fn save_creates_parent_directories() {
        let mips = vec![rgba8_surface(2, 2, [1, 2, 3, 4])];
        let surface = compress(&mips, TargetFormat::Rgba8, None).unwrap();
        let dds = to_dds(&surface).unwrap();

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/out.dds");
        save(&dds, &path).unwrap();
        assert!(path.exists());
    }

    #[test]
    fn roundtrip_diagnostics_run_on_uncompressed_output() {
        let mips = vec![
            rgba8_surface(2, 2, [10, 20, 30, 40]),
            rgba8_surface(1, 1, [10, 20, 30, 40]),
        ];
        let surface = compress(&mips, TargetFormat::Rgba8, None).unwrap();
        let dds = to_dds(&surface).unwrap();
        log_roundtrip(&dds, &mips).unwrap();
    }
}
