//! Texture spec JSON parsing and validation.
//!
//! A spec document is either a single JSON object (one texture) or an array
//! of objects (a batch). Each object names the output path, the color-space
//! mode, the output format, the target resolution (`-1` on an axis keeps
//! the source dimension), and the ordered channel assignments:
//!
//! ```json
//! {
//!   "output_path": "out/packed.dds",
//!   "srgb": "ASSUME_LINEAR",
//!   "format": "BC7_UNORM",
//!   "resolution": [1024, -1],
//!   "channels": [
//!     { "file": "roughness.png", "src": "r" },
//!     { "file": "metallic.png",  "src": "r" },
//!     { "file": null,            "src": "0" },
//!     { "file": null,            "src": "1" }
//!   ]
//! }
//! ```

use std::path::PathBuf;

use serde::Deserialize;

use crate::formats::TargetFormat;

/// How a source image's color space is interpreted on load.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColorSpaceMode {
    /// Treat the file as sRGB and retag it even if it decodes linear.
    ForceSrgb,
    /// Treat the file as sRGB unless it declares otherwise.
    AssumeSrgb,
    /// Use the file's own encoding.
    AssumeLinear,
    /// Treat the file as linear regardless of what it declares.
    ForceLinear,
}

impl ColorSpaceMode {
    fn parse(s: &str) -> Option<Self> {
        match s {
            "FORCE_SRGB" => Some(ColorSpaceMode::ForceSrgb),
            "ASSUME_SRGB" => Some(ColorSpaceMode::AssumeSrgb),
            "ASSUME_LINEAR" => Some(ColorSpaceMode::AssumeLinear),
            "FORCE_LINEAR" => Some(ColorSpaceMode::ForceLinear),
            _ => None,
        }
    }
}

/// One of the four source channels of a loaded image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceChannel {
    R,
    G,
    B,
    A,
}

impl SourceChannel {
    /// Lane index in an RGBA pixel.
    pub fn lane(&self) -> usize {
        match self {
            SourceChannel::R => 0,
            SourceChannel::G => 1,
            SourceChannel::B => 2,
            SourceChannel::A => 3,
        }
    }
}

/// A synthetic constant channel value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConstantFill {
    Zero,
    One,
    Half,
}

impl ConstantFill {
    /// Fill value as a fraction of the channel's range.
    pub fn fraction(&self) -> f32 {
        match self {
            ConstantFill::Zero => 0.0,
            ConstantFill::One => 1.0,
            ConstantFill::Half => 0.5,
        }
    }
}

/// One output channel: copied from a source image or synthesized.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelAssignment {
    /// Copy one channel of a source image.
    Source {
        file: PathBuf,
        select: SourceChannel,
    },
    /// Fill the channel with a constant.
    Constant(ConstantFill),
}

/// One validated texture job.
#[derive(Debug, Clone)]
pub struct TextureSpec {
    pub output_path: PathBuf,
    pub color_space: ColorSpaceMode,
    pub format: TargetFormat,
    /// Target width; `None` keeps each source image's width.
    pub width: Option<u32>,
    /// Target height; `None` keeps each source image's height.
    pub height: Option<u32>,
    /// Channel assignments in output lane order.
    pub channels: Vec<ChannelAssignment>,
}

impl TextureSpec {
    /// The first channel that references a source image. Constant channels
    /// take their dimensions and bit depth from this image.
    pub fn first_source(&self) -> Option<&PathBuf> {
        self.channels.iter().find_map(|c| match c {
            ChannelAssignment::Source { file, .. } => Some(file),
            ChannelAssignment::Constant(_) => None,
        })
    }
}

/// Spec document validation errors. All of these are terminal before the
/// pipeline starts.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid spec JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("unknown srgb mode '{mode}' for {context}")]
    UnknownColorSpace { mode: String, context: String },

    #[error("unknown format '{format}' for {context}")]
    UnknownFormat { format: String, context: String },

    #[error("resolution axis must be positive or -1, got {value} for {context}")]
    InvalidResolution { value: i64, context: String },

    #[error("unsupported swizzle '{src}' for {context}")]
    UnsupportedSwizzle { src: String, context: String },

    #[error("no channels given for {context}")]
    NoChannels { context: String },

    #[error("no source channels for {context}: at least one channel must reference a file")]
    NoSourceChannels { context: String },
}

#[derive(Debug, Deserialize)]
struct RawChannel {
    #[serde(default)]
    file: Option<String>,
    src: String,
}

#[derive(Debug, Deserialize)]
struct RawSpec {
    output_path: String,
    srgb: String,
    format: String,
    resolution: [i64; 2],
    channels: Vec<RawChannel>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum SpecDocument {
    Many(Vec<RawSpec>),
    One(RawSpec),
}

/// Parse a spec document into validated texture specs. A single object
/// becomes a batch of one.
pub fn parse_specs(input: &str) -> Result<Vec<TextureSpec>, ConfigError> {
    let document: SpecDocument = serde_json::from_str(input)?;
    let raw = match document {
        SpecDocument::Many(specs) => specs,
        SpecDocument::One(spec) => vec![spec],
    };
    raw.into_iter().map(validate_spec).collect()
}

fn validate_spec(raw: RawSpec) -> Result<TextureSpec, ConfigError> {
    let context = raw.output_path.clone();

    let color_space =
        ColorSpaceMode::parse(&raw.srgb).ok_or_else(|| ConfigError::UnknownColorSpace {
            mode: raw.srgb.clone(),
            context: context.clone(),
        })?;

    let format = TargetFormat::parse(&raw.format).ok_or_else(|| ConfigError::UnknownFormat {
        format: raw.format.clone(),
        context: context.clone(),
    })?;

    let width = parse_axis(raw.resolution[0], &context)?;
    let height = parse_axis(raw.resolution[1], &context)?;

    if raw.channels.is_empty() {
        return Err(ConfigError::NoChannels { context });
    }

    let channels = raw
        .channels
        .into_iter()
        .map(|c| validate_channel(c, &context))
        .collect::<Result<Vec<_>, _>>()?;

    if !channels
        .iter()
        .any(|c| matches!(c, ChannelAssignment::Source { .. }))
    {
        return Err(ConfigError::NoSourceChannels { context });
    }

    Ok(TextureSpec {
        output_path: PathBuf::from(raw.output_path),
        color_space,
        format,
        width,
        height,
        channels,
    })
}

fn parse_axis(value: i64, context: &str) -> Result<Option<u32>, ConfigError> {
    match value {
        -1 => Ok(None),
        v if v > 0 && v <= u32::MAX as i64 => Ok(Some(v as u32)),
        v => Err(ConfigError::InvalidResolution {
            value: v,
            context: context.to_string(),
        }),
    }
}

fn validate_channel(raw: RawChannel, context: &str) -> Result<ChannelAssignment, ConfigError> {
    let bad_swizzle = || ConfigError::UnsupportedSwizzle {
        src: raw.src.clone(),
        context: context.to_string(),
    };

    let mut chars = raw.src.chars();
    let (selector, rest) = (chars.next(), chars.next());
    if rest.is_some() {
        return Err(bad_swizzle());
    }

    match (raw.file, selector) {
        (Some(file), Some(c)) => {
            let select = match c {
                'r' => SourceChannel::R,
                'g' => SourceChannel::G,
                'b' => SourceChannel::B,
                'a' => SourceChannel::A,
                _ => return Err(bad_swizzle()),
            };
            Ok(ChannelAssignment::Source {
                file: PathBuf::from(file),
                select,
            })
        }
        (None, Some(c)) => {
            let fill = match c {
                '0' => ConstantFill::Zero,
                '1' => ConstantFill::One,
                'h' => ConstantFill::Half,
                _ => return Err(bad_swizzle()),
            };
            Ok(ChannelAssignment::Constant(fill))
        }
        (_, None) => Err(bad_swizzle()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ONE_SPEC: &str = r#"{
        "output_path": "out/packed.dds",
        "srgb": "ASSUME_LINEAR",
        "format": "BC7_UNORM",
        "resolution": [1024, -1],
        "channels": [
            { "file": "r.png", "src": "r" },
            { "file": "m.png", "src": "r" },
            { "file": null, "src": "0" },
            { "file": null, "src": "1" }
        ]
    }"#;

    #[test]
    fn parses_a_single_object_as_a_batch_of_one() {
        let specs = parse_specs(ONE_SPEC).unwrap();
        assert_eq!(specs.len(), 1);
        let spec = &specs[0];
        assert_eq!(spec.color_space, ColorSpaceMode::AssumeLinear);
        assert_eq!(spec.format, TargetFormat::Bc7);
        assert_eq!(spec.width, Some(1024));
        assert_eq!(spec.height, None);
        assert_eq!(spec.channels.len(), 4);
        assert_eq!(
            spec.channels[0],
            ChannelAssignment::Source {
                file: PathBuf::from("r.png"),
                select: SourceChannel::R,
            }
        );
        assert_eq!(
            spec.channels[2],
            ChannelAssignment::Constant(ConstantFill::Zero)
        );
        assert_eq!(spec.first_source(), Some(&PathBuf::from("r.png")));
    }

    #[test]
    fn parses_an_array() {
        let doc = format!("[{ONE_SPEC}, {ONE_SPEC}]");
        let specs = parse_specs(&doc).unwrap();
        assert_eq!(specs.len(), 2);
    }

    #[test]
    fn rejects_unknown_srgb_mode() {
        let doc = ONE_SPEC.replace("ASSUME_LINEAR", "MAYBE_SRGB");
        assert!(matches!(
            parse_specs(&doc),
            Err(ConfigError::UnknownColorSpace { .. })
        ));
    }

    #[test]
    fn rejects_unknown_format() {
        let doc = ONE_SPEC.replace("BC7_UNORM", "BC9_UNORM");
        assert!(matches!(
            parse_specs(&doc),
            Err(ConfigError::UnknownFormat { .. })
        ));
    }

    #[test]
    fn rejects_bad_swizzles() {
        // 'x' is not a channel selector.
        let doc = ONE_SPEC.replace(r#""src": "r" }"#, r#""src": "x" }"#);
        assert!(matches!(
            parse_specs(&doc),
            Err(ConfigError::UnsupportedSwizzle { .. })
        ));

        // A constant selector on a file-backed channel is also invalid.
        let doc = ONE_SPEC.replace(r#"{ "file": "r.png", "src": "r" }"#, r#"{ "file": "r.png", "src": "0" }"#);
        assert!(matches!(
            parse_specs(&doc),
            Err(ConfigError::UnsupportedSwizzle { .. })
        ));

        // And a source selector without a file.
        let doc = ONE_SPEC.replace(r#"{ "file": null, "src": "0" }"#, r#"{ "file": null, "src": "b" }"#);
        assert!(matches!(
            parse_specs(&doc),
            Err(ConfigError::UnsupportedSwizzle { .. })
        ));
    }

    #[test]
    fn rejects_zero_resolution() {
        let doc = ONE_SPEC.replace("[1024, -1]", "[0, -1]");
        assert!(matches!(
            parse_specs(&doc),
            Err(ConfigError::InvalidResolution { value: 0, .. })
        ));
    }

    #[test]
    fn rejects_specs_with_only_constant_channels() {
        let doc = r#"{
            "output_path": "out/flat.dds",
            "srgb": "ASSUME_LINEAR",
            "format": "RGBA8",
            "resolution": [64, 64],
            "channels": [
                { "file": null, "src": "0" },
                { "file": null, "src": "1" }
            ]
        }"#;
        assert!(matches!(
            parse_specs(doc),
            Err(ConfigError::NoSourceChannels { .. })
        ));
    }

    #[test]
    fn rejects_empty_channel_lists() {
        let doc = r#"{
            "output_path": "out/none.dds",
            "srgb": "ASSUME_LINEAR",
            "format": "RGBA8",
            "resolution": [64, 64],
            "channels": []
        }"#;
        assert!(matches!(parse_specs(doc), Err(ConfigError::NoChannels { .. })));
    }
}
