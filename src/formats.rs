//! Pixel format model: the packed-format resolver table and the target
//! (output) formats a spec may request.
//!
//! The resolver maps (data type, bits per channel, channel count) to a
//! concrete interleaved format. The table is sparse on purpose: not every
//! triple has a natural packed representation (no 3-channel 8/16-bit
//! formats, no 32-bit unorm/snorm), and callers must treat `None` as a
//! normal outcome.

use std::fmt;

use image_dds::ImageFormat;

/// Scalar interpretation of a channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataType {
    Float,
    Unorm,
    Snorm,
    Uint,
    Sint,
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DataType::Float => "float",
            DataType::Unorm => "unorm",
            DataType::Snorm => "snorm",
            DataType::Uint => "uint",
            DataType::Sint => "sint",
        };
        f.write_str(name)
    }
}

/// A concrete interleaved pixel format produced by the combiner.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PackedFormat {
    R16Float,
    R32Float,
    Rg16Float,
    Rg32Float,
    Rgb32Float,
    Rgba16Float,
    Rgba32Float,

    R8Unorm,
    R16Unorm,
    Rg8Unorm,
    Rg16Unorm,
    Rgba8Unorm,
    Rgba8UnormSrgb,
    Rgba16Unorm,

    R8Snorm,
    R16Snorm,
    Rg8Snorm,
    Rg16Snorm,
    Rgba8Snorm,
    Rgba16Snorm,

    R8Uint,
    R16Uint,
    R32Uint,
    Rg8Uint,
    Rg16Uint,
    Rg32Uint,
    Rgb32Uint,
    Rgba8Uint,
    Rgba16Uint,
    Rgba32Uint,

    R8Sint,
    R16Sint,
    R32Sint,
    Rg8Sint,
    Rg16Sint,
    Rg32Sint,
    Rgb32Sint,
    Rgba8Sint,
    Rgba16Sint,
    Rgba32Sint,
}

/// Resolve the packed format for a (data type, bit depth, channel count)
/// triple. Deterministic and side-effect free; `None` means the triple has
/// no packed representation.
pub fn resolve(data_type: DataType, bits: u32, channels: u32) -> Option<PackedFormat> {
    use PackedFormat::*;
    let format = match (data_type, bits, channels) {
        (DataType::Float, 16, 1) => R16Float,
        (DataType::Float, 32, 1) => R32Float,
        (DataType::Float, 16, 2) => Rg16Float,
        (DataType::Float, 32, 2) => Rg32Float,
        (DataType::Float, 32, 3) => Rgb32Float,
        (DataType::Float, 16, 4) => Rgba16Float,
        (DataType::Float, 32, 4) => Rgba32Float,

        (DataType::Unorm, 8, 1) => R8Unorm,
        (DataType::Unorm, 16, 1) => R16Unorm,
        (DataType::Unorm, 8, 2) => Rg8Unorm,
        (DataType::Unorm, 16, 2) => Rg16Unorm,
        (DataType::Unorm, 8, 4) => Rgba8Unorm,
        (DataType::Unorm, 16, 4) => Rgba16Unorm,

        (DataType::Snorm, 8, 1) => R8Snorm,
        (DataType::Snorm, 16, 1) => R16Snorm,
        (DataType::Snorm, 8, 2) => Rg8Snorm,
        (DataType::Snorm, 16, 2) => Rg16Snorm,
        (DataType::Snorm, 8, 4) => Rgba8Snorm,
        (DataType::Snorm, 16, 4) => Rgba16Snorm,

        (DataType::Uint, 8, 1) => R8Uint,
        (DataType::Uint, 16, 1) => R16Uint,
        (DataType::Uint, 32, 1) => R32Uint,
        (DataType::Uint, 8, 2) => Rg8Uint,
        (DataType::Uint, 16, 2) => Rg16Uint,
        (DataType::Uint, 32, 2) => Rg32Uint,
        (DataType::Uint, 32, 3) => Rgb32Uint,
        (DataType::Uint, 8, 4) => Rgba8Uint,
        (DataType::Uint, 16, 4) => Rgba16Uint,
        (DataType::Uint, 32, 4) => Rgba32Uint,

        (DataType::Sint, 8, 1) => R8Sint,
        (DataType::Sint, 16, 1) => R16Sint,
        (DataType::Sint, 32, 1) => R32Sint,
        (DataType::Sint, 8, 2) => Rg8Sint,
        (DataType::Sint, 16, 2) => Rg16Sint,
        (DataType::Sint, 32, 2) => Rg32Sint,
        (DataType::Sint, 32, 3) => Rgb32Sint,
        (DataType::Sint, 8, 4) => Rgba8Sint,
        (DataType::Sint, 16, 4) => Rgba16Sint,
        (DataType::Sint, 32, 4) => Rgba32Sint,

        _ => return None,
    };
    Some(format)
}

impl PackedFormat {
    /// (data type, bits per channel, channel count) for this format.
    pub fn descriptor(&self) -> (DataType, u32, u32) {
        use PackedFormat::*;
        match self {
            R16Float => (DataType::Float, 16, 1),
            R32Float => (DataType::Float, 32, 1),
            Rg16Float => (DataType::Float, 16, 2),
            Rg32Float => (DataType::Float, 32, 2),
            Rgb32Float => (DataType::Float, 32, 3),
            Rgba16Float => (DataType::Float, 16, 4),
            Rgba32Float => (DataType::Float, 32, 4),

            R8Unorm => (DataType::Unorm, 8, 1),
            R16Unorm => (DataType::Unorm, 16, 1),
            Rg8Unorm => (DataType::Unorm, 8, 2),
            Rg16Unorm => (DataType::Unorm, 16, 2),
            Rgba8Unorm | Rgba8UnormSrgb => (DataType::Unorm, 8, 4),
            Rgba16Unorm => (DataType::Unorm, 16, 4),

            R8Snorm => (DataType::Snorm, 8, 1),
            R16Snorm => (DataType::Snorm, 16, 1),
            Rg8Snorm => (DataType::Snorm, 8, 2),
            Rg16Snorm => (DataType::Snorm, 16, 2),
            Rgba8Snorm => (DataType::Snorm, 8, 4),
            Rgba16Snorm => (DataType::Snorm, 16, 4),

            R8Uint => (DataType::Uint, 8, 1),
            R16Uint => (DataType::Uint, 16, 1),
            R32Uint => (DataType::Uint, 32, 1),
            Rg8Uint => (DataType::Uint, 8, 2),
            Rg16Uint => (DataType::Uint, 16, 2),
            Rg32Uint => (DataType::Uint, 32, 2),
            Rgb32Uint => (DataType::Uint, 32, 3),
            Rgba8Uint => (DataType::Uint, 8, 4),
            Rgba16Uint => (DataType::Uint, 16, 4),
            Rgba32Uint => (DataType::Uint, 32, 4),

            R8Sint => (DataType::Sint, 8, 1),
            R16Sint => (DataType::Sint, 16, 1),
            R32Sint => (DataType::Sint, 32, 1),
            Rg8Sint => (DataType::Sint, 8, 2),
            Rg16Sint => (DataType::Sint, 16, 2),
            Rg32Sint => (DataType::Sint, 32, 2),
            Rgb32Sint => (DataType::Sint, 32, 3),
            Rgba8Sint => (DataType::Sint, 8, 4),
            Rgba16Sint => (DataType::Sint, 16, 4),
            Rgba32Sint => (DataType::Sint, 32, 4),
        }
    }

    pub fn data_type(&self) -> DataType {
        self.descriptor().0
    }

    pub fn bits_per_channel(&self) -> u32 {
        self.descriptor().1
    }

    pub fn channel_count(&self) -> u32 {
        self.descriptor().2
    }

    pub fn bytes_per_pixel(&self) -> usize {
        let (_, bits, channels) = self.descriptor();
        (bits as usize / 8) * channels as usize
    }

    pub fn is_srgb(&self) -> bool {
        matches!(self, PackedFormat::Rgba8UnormSrgb)
    }

    /// The sRGB-tagged variant of this format, where one exists. Formats
    /// without an sRGB variant are returned unchanged.
    pub fn with_srgb(self) -> Self {
        match self {
            PackedFormat::Rgba8Unorm => PackedFormat::Rgba8UnormSrgb,
            other => other,
        }
    }

    /// The matching `image_dds` format, for surfaces that can be written
    /// out without conversion.
    pub fn image_format(&self) -> Option<ImageFormat> {
        use PackedFormat::*;
        let format = match self {
            R16Float => ImageFormat::R16Float,
            R32Float => ImageFormat::R32Float,
            Rg16Float => ImageFormat::Rg16Float,
            Rg32Float => ImageFormat::Rg32Float,
            Rgba16Float => ImageFormat::Rgba16Float,
            Rgba32Float => ImageFormat::Rgba32Float,
            R8Unorm => ImageFormat::R8Unorm,
            R16Unorm => ImageFormat::R16Unorm,
            Rg8Unorm => ImageFormat::Rg8Unorm,
            Rg16Unorm => ImageFormat::Rg16Unorm,
            Rgba8Unorm => ImageFormat::Rgba8Unorm,
            Rgba8UnormSrgb => ImageFormat::Rgba8UnormSrgb,
            Rgba16Unorm => ImageFormat::Rgba16Unorm,
            R8Snorm => ImageFormat::R8Snorm,
            R16Snorm => ImageFormat::R16Snorm,
            Rg8Snorm => ImageFormat::Rg8Snorm,
            Rg16Snorm => ImageFormat::Rg16Snorm,
            Rgba16Snorm => ImageFormat::Rgba16Snorm,
            _ => return None,
        };
        Some(format)
    }
}

/// Output format a spec may request, parsed from a DXGI-style name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetFormat {
    Bc1,
    Bc1Srgb,
    Bc2,
    Bc2Srgb,
    Bc3,
    Bc3Srgb,
    Bc4,
    Bc5,
    Bc6h,
    Bc7,
    Bc7Srgb,
    R8,
    Rg8,
    Rgba8,
    Rgba8Srgb,
    R16,
    Rg16,
    Rgba16,
}

impl TargetFormat {
    /// Parse a format name. Accepts DXGI names and the common short
    /// aliases (BC7, DXT5, RGBA8, ...).
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_uppercase().as_str() {
            "BC1" | "BC1_UNORM" | "DXT1" => Some(TargetFormat::Bc1),
            "BC1_UNORM_SRGB" | "BC1_SRGB" => Some(TargetFormat::Bc1Srgb),
            "BC2" | "BC2_UNORM" | "DXT3" => Some(TargetFormat::Bc2),
            "BC2_UNORM_SRGB" | "BC2_SRGB" => Some(TargetFormat::Bc2Srgb),
            "BC3" | "BC3_UNORM" | "DXT5" => Some(TargetFormat::Bc3),
            "BC3_UNORM_SRGB" | "BC3_SRGB" => Some(TargetFormat::Bc3Srgb),
            "BC4" | "BC4_UNORM" => Some(TargetFormat::Bc4),
            "BC5" | "BC5_UNORM" => Some(TargetFormat::Bc5),
            "BC6H" | "BC6H_UF16" => Some(TargetFormat::Bc6h),
            "BC7" | "BC7_UNORM" => Some(TargetFormat::Bc7),
            "BC7_UNORM_SRGB" | "BC7_SRGB" => Some(TargetFormat::Bc7Srgb),
            "R8" | "R8_UNORM" => Some(TargetFormat::R8),
            "RG8" | "R8G8_UNORM" => Some(TargetFormat::Rg8),
            "RGBA8" | "RGBA" | "R8G8B8A8_UNORM" => Some(TargetFormat::Rgba8),
            "RGBA8_SRGB" | "R8G8B8A8_UNORM_SRGB" => Some(TargetFormat::Rgba8Srgb),
            "R16" | "R16_UNORM" => Some(TargetFormat::R16),
            "RG16" | "R16G16_UNORM" => Some(TargetFormat::Rg16),
            "RGBA16" | "R16G16B16A16_UNORM" => Some(TargetFormat::Rgba16),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            TargetFormat::Bc1 => "BC1_UNORM",
            TargetFormat::Bc1Srgb => "BC1_UNORM_SRGB",
            TargetFormat::Bc2 => "BC2_UNORM",
            TargetFormat::Bc2Srgb => "BC2_UNORM_SRGB",
            TargetFormat::Bc3 => "BC3_UNORM",
            TargetFormat::Bc3Srgb => "BC3_UNORM_SRGB",
            TargetFormat::Bc4 => "BC4_UNORM",
            TargetFormat::Bc5 => "BC5_UNORM",
            TargetFormat::Bc6h => "BC6H_UF16",
            TargetFormat::Bc7 => "BC7_UNORM",
            TargetFormat::Bc7Srgb => "BC7_UNORM_SRGB",
            TargetFormat::R8 => "R8_UNORM",
            TargetFormat::Rg8 => "R8G8_UNORM",
            TargetFormat::Rgba8 => "R8G8B8A8_UNORM",
            TargetFormat::Rgba8Srgb => "R8G8B8A8_UNORM_SRGB",
            TargetFormat::R16 => "R16_UNORM",
            TargetFormat::Rg16 => "R16G16_UNORM",
            TargetFormat::Rgba16 => "R16G16B16A16_UNORM",
        }
    }

    pub fn is_srgb(&self) -> bool {
        matches!(
            self,
            TargetFormat::Bc1Srgb
                | TargetFormat::Bc2Srgb
                | TargetFormat::Bc3Srgb
                | TargetFormat::Bc7Srgb
                | TargetFormat::Rgba8Srgb
        )
    }

    pub fn is_compressed(&self) -> bool {
        matches!(
            self,
            TargetFormat::Bc1
                | TargetFormat::Bc1Srgb
                | TargetFormat::Bc2
                | TargetFormat::Bc2Srgb
                | TargetFormat::Bc3
                | TargetFormat::Bc3Srgb
                | TargetFormat::Bc4
                | TargetFormat::Bc5
                | TargetFormat::Bc6h
                | TargetFormat::Bc7
                | TargetFormat::Bc7Srgb
        )
    }

    /// BC6H and BC7 encoding runs on GPU compute when a device is present.
    pub fn requires_gpu(&self) -> bool {
        matches!(
            self,
            TargetFormat::Bc6h | TargetFormat::Bc7 | TargetFormat::Bc7Srgb
        )
    }

    /// BC7-family outputs filter color and alpha independently during mip
    /// generation, since the alpha lane usually carries packed non-alpha
    /// data.
    pub fn separate_alpha(&self) -> bool {
        matches!(self, TargetFormat::Bc7 | TargetFormat::Bc7Srgb)
    }

    pub fn image_format(&self) -> ImageFormat {
        match self {
            TargetFormat::Bc1 => ImageFormat::BC1RgbaUnorm,
            TargetFormat::Bc1Srgb => ImageFormat::BC1RgbaUnormSrgb,
            TargetFormat::Bc2 => ImageFormat::BC2RgbaUnorm,
            TargetFormat::Bc2Srgb => ImageFormat::BC2RgbaUnormSrgb,
            TargetFormat::Bc3 => ImageFormat::BC3RgbaUnorm,
            TargetFormat::Bc3Srgb => ImageFormat::BC3RgbaUnormSrgb,
            TargetFormat::Bc4 => ImageFormat::BC4RUnorm,
            TargetFormat::Bc5 => ImageFormat::BC5RgUnorm,
            TargetFormat::Bc6h => ImageFormat::BC6hRgbUfloat,
            TargetFormat::Bc7 => ImageFormat::BC7RgbaUnorm,
            TargetFormat::Bc7Srgb => ImageFormat::BC7RgbaUnormSrgb,
            TargetFormat::R8 => ImageFormat::R8Unorm,
            TargetFormat::Rg8 => ImageFormat::Rg8Unorm,
            TargetFormat::Rgba8 => ImageFormat::Rgba8Unorm,
            TargetFormat::Rgba8Srgb => ImageFormat::Rgba8UnormSrgb,
            TargetFormat::R16 => ImageFormat::R16Unorm,
            TargetFormat::Rg16 => ImageFormat::Rg16Unorm,
            TargetFormat::Rgba16 => ImageFormat::Rgba16Unorm,
        }
    }
}
