//! Error taxonomy for the packing pipeline.
//!
//! Core operations return [`PackError`]. The pipeline tags each failure with
//! the [`Stage`] it occurred in; the batch orchestrator adds the failing
//! spec's output path on top of that.

use std::fmt;
use std::path::PathBuf;

use crate::formats::DataType;

/// A failure inside the texture assembly pipeline.
#[derive(Debug, thiserror::Error)]
pub enum PackError {
    /// A bit depth / data type combination with no supported code path
    /// (constant fill outside unorm 8/16, interleave outside 8/16 bit).
    #[error("unsupported bit depth: {bits}-bit {data_type}")]
    UnsupportedBitDepth { data_type: DataType, bits: u32 },

    /// Channel slices fed to the combiner differ in size or format.
    #[error("incompatible channel slices: {0}")]
    IncompatibleSlices(String),

    /// The format table has no packed format for this triple. This is an
    /// expected outcome for many triples, not an internal error.
    #[error("no packed format for {channels}-channel {bits}-bit {data_type}")]
    UnresolvedFormat {
        data_type: DataType,
        bits: u32,
        channels: u32,
    },

    /// An image decode/encode/IO call failed. The reason is passed through
    /// opaquely; the pipeline does not interpret it.
    #[error("{0}")]
    Codec(String),

    /// A format needs GPU compute and neither a device nor a CPU route
    /// exists for it.
    #[error("no GPU device available for {0} and no CPU path exists")]
    DeviceUnavailable(&'static str),
}

impl PackError {
    /// Wrap an external codec failure as an opaque reason string.
    pub fn codec(err: impl fmt::Display) -> Self {
        PackError::Codec(err.to_string())
    }
}

impl From<image::ImageError> for PackError {
    fn from(err: image::ImageError) -> Self {
        PackError::codec(err)
    }
}

impl From<std::io::Error> for PackError {
    fn from(err: std::io::Error) -> Self {
        PackError::codec(err)
    }
}

/// The pipeline stage a failure originated in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Load,
    Resize,
    Extract,
    Combine,
    Mip,
    Compress,
    Save,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Load => "load",
            Stage::Resize => "resize",
            Stage::Extract => "extract",
            Stage::Combine => "combine",
            Stage::Mip => "mip",
            Stage::Compress => "compress",
            Stage::Save => "save",
        };
        f.write_str(name)
    }
}

/// A [`PackError`] tagged with the stage it occurred in.
#[derive(Debug, thiserror::Error)]
#[error("{stage} stage failed: {source}")]
pub struct StageError {
    pub stage: Stage,
    #[source]
    pub source: PackError,
}

impl StageError {
    pub fn new(stage: Stage, source: PackError) -> Self {
        StageError { stage, source }
    }
}

/// The first failure of a batch run, tagged with the originating spec.
#[derive(Debug, thiserror::Error)]
#[error("{output_path}: {source}")]
pub struct BatchError {
    /// Output path of the spec that failed.
    pub output_path: PathBuf,
    #[source]
    pub source: StageError,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stage_error_display_names_the_stage() {
        let err = StageError::new(
            Stage::Combine,
            PackError::IncompatibleSlices("width 4 != 8".into()),
        );
        let msg = err.to_string();
        assert!(msg.contains("combine"), "{msg}");
        assert!(msg.contains("incompatible"), "{msg}");
    }

    #[test]
    fn batch_error_names_the_spec() {
        let err = BatchError {
            output_path: PathBuf::from("out/albedo.dds"),
            source: StageError::new(Stage::Load, PackError::Codec("missing file".into())),
        };
        let msg = err.to_string();
        assert!(msg.contains("albedo.dds"), "{msg}");
        assert!(msg.contains("load"), "{msg}");
    }
}
