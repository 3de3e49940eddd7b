//! Per-spec texture assembly pipeline.
//!
//! One [`TextureJob`] owns one spec and its image cache, and runs the
//! stages in order: Load → Resize → ExtractAll → Combine → GenerateMips →
//! Compress → Save. The first two stages are split out so the batch
//! orchestrator can run them concurrently across jobs; the rest runs
//! serially because compression shares the process-wide GPU handle. Every
//! failure is terminal for the job and carries its stage.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use image::DynamicImage;
use tracing::{debug, info};

use crate::channels;
use crate::config::{ChannelAssignment, TextureSpec};
use crate::encode;
use crate::error::{PackError, Stage, StageError};
use crate::gpu_encoder::GpuEncoder;
use crate::image_io::{self, LoadedImage};
use crate::mips::{self, MipOptions};

fn at(stage: Stage) -> impl Fn(PackError) -> StageError {
    move |source| StageError::new(stage, source)
}

/// One texture spec plus its private image cache.
pub struct TextureJob {
    spec: TextureSpec,
    images: HashMap<PathBuf, LoadedImage>,
}

impl TextureJob {
    pub fn new(spec: TextureSpec) -> Self {
        TextureJob {
            spec,
            images: HashMap::new(),
        }
    }

    pub fn spec(&self) -> &TextureSpec {
        &self.spec
    }

    pub fn output_path(&self) -> &Path {
        &self.spec.output_path
    }

    /// Load and resize every distinct source image. Each path is decoded
    /// exactly once no matter how many channels reference it.
    pub fn load_sources(&mut self) -> Result<(), StageError> {
        info!(output = %self.spec.output_path.display(), "loading sources");

        for assignment in &self.spec.channels {
            let ChannelAssignment::Source { file, .. } = assignment else {
                continue;
            };
            if self.images.contains_key(file) {
                continue;
            }
            let image = image_io::load(file, self.spec.color_space, self.spec.format.is_srgb())
                .map_err(at(Stage::Load))?;
            self.images.insert(file.clone(), image);
        }

        if self.images.is_empty() {
            return Err(StageError::new(
                Stage::Load,
                PackError::codec("spec references no source images"),
            ));
        }

        for image in self.images.values_mut() {
            let width = self.spec.width.unwrap_or_else(|| image.width());
            let height = self.spec.height.unwrap_or_else(|| image.height());
            if width != image.width() || height != image.height() {
                let pixels = std::mem::replace(&mut image.pixels, DynamicImage::new_rgba8(0, 0));
                image.pixels = image_io::resize(pixels, width, height);
            }
        }

        Ok(())
    }

    /// Run the serial stages: extract, combine, mip, compress, save.
    pub fn process(
        &self,
        mut gpu: Option<&mut GpuEncoder>,
        verbose: bool,
    ) -> Result<(), StageError> {
        info!(output = %self.spec.output_path.display(), "processing");

        // Constant channels take their dimensions and depth from the first
        // file-backed channel's image.
        let donor = self
            .spec
            .first_source()
            .and_then(|path| self.images.get(path))
            .ok_or_else(|| {
                StageError::new(
                    Stage::Extract,
                    PackError::codec("no source image available for constant channels"),
                )
            })?;

        debug!("extracting channels");
        let mut slices = Vec::with_capacity(self.spec.channels.len());
        for assignment in &self.spec.channels {
            let slice = match assignment {
                ChannelAssignment::Source { file, select } => {
                    let image = self.images.get(file).ok_or_else(|| {
                        StageError::new(
                            Stage::Extract,
                            PackError::codec(format!(
                                "source image not in cache: {}",
                                file.display()
                            )),
                        )
                    })?;
                    channels::extract(image, *select)
                }
                ChannelAssignment::Constant(fill) => {
                    channels::extract_constant(donor, *fill).map_err(at(Stage::Extract))?
                }
            };
            slices.push(slice);
        }

        debug!("combining channels");
        let combined =
            channels::combine(&slices, self.spec.format.is_srgb()).map_err(at(Stage::Combine))?;

        debug!("generating mips");
        let options = MipOptions {
            wrap: true,
            separate_alpha: self.spec.format.separate_alpha(),
        };
        let chain = mips::generate_mips(&combined, &options).map_err(at(Stage::Mip))?;

        if verbose {
            if let Some(last) = chain.last() {
                let bytes = last.format.bytes_per_pixel().min(last.data.len());
                info!(
                    "last uncompressed mip channel values: {:?}",
                    &last.data[..bytes]
                );
            }
        }

        debug!("compressing");
        let surface = encode::compress(&chain, self.spec.format, gpu.as_deref_mut())
            .map_err(at(Stage::Compress))?;

        let dds = encode::to_dds(&surface).map_err(at(Stage::Save))?;

        if verbose {
            encode::log_roundtrip(&dds, &chain).map_err(at(Stage::Compress))?;
        }

        debug!("saving");
        encode::save(&dds, &self.spec.output_path).map_err(at(Stage::Save))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{parse_specs, ColorSpaceMode, ConstantFill, SourceChannel};
    use crate::formats::TargetFormat;

    fn write_png(dir: &Path, name: &str, pixel: [u8; 4], size: u32) -> PathBuf {
        let path = dir.join(name);
        image::RgbaImage::from_pixel(size, size, image::Rgba(pixel))
            .save(&path)
            .unwrap();
        path
    }

    fn spec_for(
        output: PathBuf,
        source: &Path,
        width: Option<u32>,
        height: Option<u32>,
    ) -> TextureSpec {
        TextureSpec {
            output_path: output,
            color_space: ColorSpaceMode::AssumeLinear,
            format: TargetFormat::Rgba8,
            width,
            height,
            channels: vec![
                ChannelAssignment::Source {
                    file: source.to_path_buf(),
                    select: SourceChannel::R,
                },
                ChannelAssignment::Source {
                    file: source.to_path_buf(),
                    select: SourceChannel::G,
                },
                ChannelAssignment::Constant(ConstantFill::Zero),
                ChannelAssignment::Constant(ConstantFill::One),
            ],
        }
    }

    #[test]
    fn repeated_references_load_once() {
        let dir = tempfile::tempdir().unwrap();
        let source = write_png(dir.path(), "a.png", [10, 20, 30, 40], 4);

        let mut job = TextureJob::new(spec_for(
            dir.path().join("out.dds"),
            &source,
            None,
            None,
        ));
        job.load_sources().unwrap();
        assert_eq!(job.images.len(), 1);
    }

    #[test]
    fn resize_applies_per_axis_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let source = write_png(dir.path(), "a.png", [1, 2, 3, 4], 8);

        let mut job = TextureJob::new(spec_for(
            dir.path().join("out.dds"),
            &source,
            Some(4),
            None,
        ));
        job.load_sources().unwrap();
        let image = job.images.values().next().unwrap();
        assert_eq!(image.width(), 4);
        // Height was unspecified, so the source height is kept.
        assert_eq!(image.height(), 8);
    }

    #[test]
    fn missing_files_fail_in_the_load_stage() {
        let dir = tempfile::tempdir().unwrap();
        let mut job = TextureJob::new(spec_for(
            dir.path().join("out.dds"),
            &dir.path().join("missing.png"),
            None,
            None,
        ));
        let err = job.load_sources().unwrap_err();
        assert_eq!(err.stage, Stage::Load);
    }

    #[test]
    fn full_pipeline_packs_channels_into_a_dds() {
        let dir = tempfile::tempdir().unwrap();
        let source = write_png(dir.path(), "a.png", [200, 90, 7, 255], 4);
        let output = dir.path().join("nested/out.dds");

        let mut job = TextureJob::new(spec_for(output.clone(), &source, None, None));
        job.load_sources().unwrap();
        job.process(None, true).unwrap();

        let file = std::fs::File::open(&output).unwrap();
        let dds = image_dds::ddsfile::Dds::read(file).unwrap();

        // Base level: r and g copied from the source, b forced to 0, a to
        // max; all 16 pixels identical.
        for pixel in dds.data[..4 * 4 * 4].chunks_exact(4) {
            assert_eq!(pixel, [200, 90, 0, 255]);
        }

        // The chain runs down to 1x1: 4x4, 2x2, 1x1.
        let expected: usize = (16 + 4 + 1) * 4;
        assert_eq!(dds.data.len(), expected);
    }

    #[test]
    fn spec_parsing_feeds_the_pipeline() {
        let dir = tempfile::tempdir().unwrap();
        let source = write_png(dir.path(), "gloss.png", [128, 60, 9, 255], 4);
        let output = dir.path().join("packed.dds");

        let doc = format!(
            r#"{{
                "output_path": {output:?},
                "srgb": "ASSUME_LINEAR",
                "format": "R8G8B8A8_UNORM",
                "resolution": [-1, -1],
                "channels": [
                    {{ "file": {source:?}, "src": "g" }},
                    {{ "file": null, "src": "h" }}
                ]
            }}"#,
            output = output.display().to_string(),
            source = source.display().to_string(),
        );
        let specs = parse_specs(&doc).unwrap();
        assert_eq!(specs.len(), 1);

        // Two channels pack as RG8, which then re-encodes to the RGBA8
        // target on the CPU.
        let mut job = TextureJob::new(specs.into_iter().next().unwrap());
        job.load_sources().unwrap();
        job.process(None, false).unwrap();
        assert!(output.exists());
    }
}
