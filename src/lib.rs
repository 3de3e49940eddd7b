//! texpack - channel-packing texture compiler
//!
//! Packs independent source images into a single multi-channel texture,
//! generates a mip chain, block-compresses the result (GPU compute for
//! BC6H/BC7, CPU for the rest), and writes a DDS container.

pub mod batch;
pub mod channels;
pub mod config;
pub mod encode;
pub mod error;
pub mod formats;
pub mod gpu_encoder;
pub mod image_io;
pub mod mips;
pub mod pipeline;

pub use batch::{run_batch, BatchOptions};
pub use config::{parse_specs, ChannelAssignment, ColorSpaceMode, ConfigError, TextureSpec};
pub use error::{BatchError, PackError, Stage, StageError};
pub use formats::{DataType, PackedFormat, TargetFormat};
pub use gpu_encoder::GpuEncoder;
pub use pipeline::TextureJob;
