//! texpack - channel-packing texture compiler
//!
//! Reads texture specs as JSON (one object or an array) and produces
//! mip-mapped, block-compressed DDS textures.

use std::io::Read;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use texpack::batch::{run_batch, BatchOptions};
use texpack::config::parse_specs;
use texpack::gpu_encoder::{self, GpuEncoder};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "texpack")]
#[command(version)]
#[command(about = "Packs source images into mip-mapped, block-compressed DDS textures")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose diagnostics (forces the serial load phase)
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Pack textures from a JSON spec document
    Pack {
        /// Spec file; omit or pass "-" to read stdin
        spec: Option<PathBuf>,

        /// Run the load phase serially even without --verbose
        #[arg(long)]
        serial: bool,

        /// GPU adapter index (auto-selects when omitted)
        #[arg(long, env = "TEXPACK_GPU")]
        gpu: Option<usize>,

        /// Skip GPU initialization; BC6H/BC7 encode on the CPU
        #[arg(long)]
        no_gpu: bool,
    },

    /// List available GPU adapters
    ListGpus,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)),
        )
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Pack {
            spec,
            serial,
            gpu,
            no_gpu,
        } => pack(spec, serial, gpu, no_gpu, cli.verbose),
        Commands::ListGpus => {
            for gpu in gpu_encoder::list_gpus() {
                println!("{}: {}", gpu.adapter_index, gpu);
            }
            Ok(())
        }
    }
}

fn pack(
    spec: Option<PathBuf>,
    serial: bool,
    gpu_index: Option<usize>,
    no_gpu: bool,
    verbose: bool,
) -> Result<()> {
    if verbose {
        warn!("verbose diagnostics enabled, load phase will run serially");
    }

    let input = match spec.as_deref() {
        Some(path) if path.as_os_str() != "-" => std::fs::read_to_string(path)
            .with_context(|| format!("failed to read spec file: {}", path.display()))?,
        _ => {
            let mut buffer = String::new();
            std::io::stdin()
                .read_to_string(&mut buffer)
                .context("failed to read spec from stdin")?;
            buffer
        }
    };

    let specs = parse_specs(&input).context("failed to parse texture specs")?;
    info!("parsed {} texture specs", specs.len());

    // The GPU device is acquired once, up front, and handed by reference
    // into the serial compress phase only.
    let mut gpu = if no_gpu {
        None
    } else {
        match GpuEncoder::with_adapter(gpu_index) {
            Ok(encoder) => {
                info!("GPU encoder ready: {}", encoder.info());
                Some(encoder)
            }
            Err(err) => {
                warn!("GPU encoder not available: {err:#}. BC6H/BC7 will encode on the CPU");
                None
            }
        }
    };

    let options = BatchOptions {
        serial_load: serial || verbose,
        verbose,
    };
    run_batch(specs, &options, gpu.as_mut())?;
    Ok(())
}
