//! Two-phase batch orchestration.
//!
//! The load phase runs one task per spec (rayon) with no shared mutable
//! state; failures are held until every load finishes and the first one in
//! input order wins. The compress phase then walks the specs serially in
//! input order, because the GPU encoder is a single handle that must never
//! see concurrent submissions, and aborts on the first failure.

use rayon::prelude::*;
use tracing::info;

use crate::config::TextureSpec;
use crate::error::BatchError;
use crate::gpu_encoder::GpuEncoder;
use crate::pipeline::TextureJob;

/// Orchestration switches for one batch run.
#[derive(Debug, Clone, Copy)]
pub struct BatchOptions {
    /// Run the load phase serially instead of one task per spec. Verbose
    /// runs force this so diagnostic output stays ordered.
    pub serial_load: bool,
    /// Emit per-stage diagnostics and the post-compress round-trip check.
    pub verbose: bool,
}

/// Run a batch of texture specs to completion or first failure.
pub fn run_batch(
    specs: Vec<TextureSpec>,
    options: &BatchOptions,
    mut gpu: Option<&mut GpuEncoder>,
) -> Result<(), BatchError> {
    let total = specs.len();
    let mut jobs: Vec<TextureJob> = specs.into_iter().map(TextureJob::new).collect();

    // Load phase.
    if options.serial_load {
        for (i, job) in jobs.iter_mut().enumerate() {
            info!("loading {}/{}", i + 1, total);
            job.load_sources().map_err(|source| BatchError {
                output_path: job.output_path().to_path_buf(),
                source,
            })?;
        }
    } else {
        info!("loading {total} specs in parallel");
        let results: Vec<_> = jobs
            .par_iter_mut()
            .map(|job| job.load_sources())
            .collect();
        // Every task has finished; surface the first failure in input order.
        for (job, result) in jobs.iter().zip(results) {
            result.map_err(|source| BatchError {
                output_path: job.output_path().to_path_buf(),
                source,
            })?;
        }
    }

    // Compress phase: strictly serial, fail fast.
    for (i, job) in jobs.iter().enumerate() {
        info!("processing {}/{}", i + 1, total);
        job.process(gpu.as_deref_mut(), options.verbose)
            .map_err(|source| BatchError {
                output_path: job.output_path().to_path_buf(),
                source,
            })?;
    }

    info!("batch complete: {total} textures");
    Ok(())
}
