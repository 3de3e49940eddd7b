//! Mip-chain generation over packed surfaces.
//!
//! Levels are floor-halved down to 1x1 and filtered with a separable
//! (1,3,3,1)/8 tent kernel. Edge taps follow the addressing mode: wrap for
//! tiling textures, clamp otherwise. sRGB-tagged surfaces filter color
//! lanes in linear light. Four-channel surfaces weight color taps by alpha
//! unless separate-alpha filtering is requested (used for BC7 outputs,
//! where the alpha lane usually carries packed non-alpha data).

use bytemuck::{cast_slice, pod_collect_to_vec};
use tracing::debug;

use crate::channels::PackedSurface;
use crate::error::PackError;
use crate::image_io::{linear_to_srgb, srgb_to_linear};

/// Filtering options for one mip chain.
#[derive(Debug, Clone, Copy)]
pub struct MipOptions {
    /// Wrap edge taps around the image instead of clamping.
    pub wrap: bool,
    /// Filter color lanes independently of the alpha lane.
    pub separate_alpha: bool,
}

/// Generate the full mip chain for a surface, base level first.
pub fn generate_mips(
    base: &PackedSurface,
    options: &MipOptions,
) -> Result<Vec<PackedSurface>, PackError> {
    let (data_type, bits, _) = base.format.descriptor();
    if bits != 8 && bits != 16 {
        return Err(PackError::UnsupportedBitDepth { data_type, bits });
    }

    let mut chain = vec![base.clone()];
    loop {
        let last = chain.last().expect("chain starts non-empty");
        if last.width == 1 && last.height == 1 {
            break;
        }
        let next = downsample(last, options);
        chain.push(next);
    }

    debug!(
        levels = chain.len(),
        width = base.width,
        height = base.height,
        wrap = options.wrap,
        separate_alpha = options.separate_alpha,
        "generated mip chain"
    );
    Ok(chain)
}

/// Tap positions and weights along one axis for destination index `i`.
fn taps(i: u32, src_dim: u32, wrap: bool) -> [(usize, f64); 4] {
    const WEIGHTS: [f64; 4] = [1.0 / 8.0, 3.0 / 8.0, 3.0 / 8.0, 1.0 / 8.0];
    let dim = src_dim as i64;
    let base = 2 * i as i64;
    let mut out = [(0usize, 0.0); 4];
    for (slot, offset) in (-1..=2).enumerate() {
        let p = base + offset;
        let p = if wrap {
            p.rem_euclid(dim)
        } else {
            p.clamp(0, dim - 1)
        };
        out[slot] = (p as usize, WEIGHTS[slot]);
    }
    out
}

fn downsample(src: &PackedSurface, options: &MipOptions) -> PackedSurface {
    let (_, bits, channels) = src.format.descriptor();
    let n = channels as usize;
    let srgb = src.format.is_srgb();
    let (sw, sh) = (src.width, src.height);
    let (dw, dh) = ((sw / 2).max(1), (sh / 2).max(1));

    // Normalized lanes, with sRGB color decoded to linear for filtering.
    let lanes = to_f64_lanes(src, bits, n, srgb);
    let sample = |x: usize, y: usize, c: usize| lanes[(y * sw as usize + x) * n + c];

    let weight_by_alpha = n == 4 && !options.separate_alpha;
    let mut out = vec![0.0f64; dw as usize * dh as usize * n];

    for y in 0..dh {
        let ty = taps(y, sh, options.wrap);
        for x in 0..dw {
            let tx = taps(x, sw, options.wrap);
            let dst = ((y * dw + x) as usize) * n;

            if weight_by_alpha {
                let mut color = [0.0f64; 3];
                let mut plain = [0.0f64; 3];
                let mut alpha = 0.0;
                for &(py, wy) in &ty {
                    for &(px, wx) in &tx {
                        let w = wx * wy;
                        let a = sample(px, py, 3);
                        for (c, acc) in color.iter_mut().enumerate() {
                            *acc += w * a * sample(px, py, c);
                        }
                        for (c, acc) in plain.iter_mut().enumerate() {
                            *acc += w * sample(px, py, c);
                        }
                        alpha += w * a;
                    }
                }
                for c in 0..3 {
                    // Fully transparent neighborhoods fall back to an
                    // unweighted average so color does not collapse to zero.
                    out[dst + c] = if alpha > f64::EPSILON {
                        color[c] / alpha
                    } else {
                        plain[c]
                    };
                }
                out[dst + 3] = alpha;
            } else {
                for c in 0..n {
                    let mut acc = 0.0;
                    for &(py, wy) in &ty {
                        for &(px, wx) in &tx {
                            acc += wx * wy * sample(px, py, c);
                        }
                    }
                    out[dst + c] = acc;
                }
            }
        }
    }

    PackedSurface {
        width: dw,
        height: dh,
        format: src.format,
        data: from_f64_lanes(&out, bits, n, srgb),
    }
}

fn to_f64_lanes(src: &PackedSurface, bits: u32, n: usize, srgb: bool) -> Vec<f64> {
    let decode = |c: usize, v: f64| {
        if srgb && c < 3 {
            srgb_to_linear(v as f32) as f64
        } else {
            v
        }
    };
    match bits {
        16 => {
            let samples: Vec<u16> = pod_collect_to_vec(&src.data);
            samples
                .iter()
                .enumerate()
                .map(|(i, &v)| decode(i % n, v as f64 / 65535.0))
                .collect()
        }
        _ => src
            .data
            .iter()
            .enumerate()
            .map(|(i, &v)| decode(i % n, v as f64 / 255.0))
            .collect(),
    }
}

fn from_f64_lanes(lanes: &[f64], bits: u32, n: usize, srgb: bool) -> Vec<u8> {
    let encode = |c: usize, v: f64| {
        if srgb && c < 3 {
            linear_to_srgb(v as f32) as f64
        } else {
            v
        }
    };
    match bits {
        16 => {
            let samples: Vec<u16> = lanes
                .iter()
                .enumerate()
                .map(|(i, &v)| (encode(i % n, v) * 65535.0 + 0.5).clamp(0.0, 65535.0) as u16)
                .collect();
            cast_slice(&samples).to_vec()
        }
        _ => lanes
            .iter()
            .enumerate()
            .map(|(i, &v)| (encode(i % n, v) * 255.0 + 0.5).clamp(0.0, 255.0) as u8)
            .collect(),
    }
}
