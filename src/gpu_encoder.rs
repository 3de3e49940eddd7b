//! GPU block compression using wgpu + block_compression.
//!
//! BC7 and BC6H are the two formats expensive enough to need compute-shader
//! encoding. A whole mip chain is queued as one batch, compressed in a
//! single compute pass, and read back through staging buffers. The encoder
//! owns the only device handle in the process and is driven from one thread.

use anyhow::{Context, Result};
use block_compression::{BC6HSettings, BC7Settings, CompressionVariant, GpuBlockCompressor};
use std::sync::Arc;
use tracing::{debug, info};
use wgpu::{
    Backends, Buffer, BufferDescriptor, BufferUsages, CommandEncoderDescriptor, Device, Extent3d,
    Instance, Queue, Texture, TextureDescriptor, TextureDimension, TextureFormat, TextureUsages,
    TextureView, TextureViewDescriptor,
};

/// One adapter as reported by the instance, for selection and display.
#[derive(Debug, Clone)]
pub struct GpuInfo {
    pub name: String,
    pub backend: String,
    pub device_type: String,
    pub adapter_index: usize,
}

impl GpuInfo {
    fn describe(adapter: &wgpu::Adapter, adapter_index: usize) -> Self {
        let info = adapter.get_info();
        GpuInfo {
            name: info.name,
            backend: format!("{:?}", info.backend),
            device_type: format!("{:?}", info.device_type),
            adapter_index,
        }
    }
}

impl std::fmt::Display for GpuInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({}, {})", self.name, self.backend, self.device_type)
    }
}

/// Auto-selection rank: prefer discrete GPUs, then the Vulkan backend.
fn adapter_score(adapter: &wgpu::Adapter) -> i32 {
    let info = adapter.get_info();
    let mut score = 0;
    if info.device_type == wgpu::DeviceType::DiscreteGpu {
        score += 100;
    }
    if info.backend == wgpu::Backend::Vulkan {
        score += 10;
    }
    score
}

/// One queued encode; the texture and buffers live until the flush.
struct QueuedEncode {
    #[allow(dead_code)] // backs texture_view, must outlive the compute pass
    texture: Texture,
    texture_view: TextureView,
    output_buffer: Buffer,
    staging_buffer: Buffer,
    output_size: u64,
    width: u32,
    height: u32,
    variant: CompressionVariant,
}

/// Encode tasks accumulated for one flush.
pub struct EncodeBatch {
    tasks: Vec<QueuedEncode>,
}

/// GPU encoder for BC7/BC6H block compression.
pub struct GpuEncoder {
    device: Arc<Device>,
    queue: Arc<Queue>,
    compressor: GpuBlockCompressor,
    gpu_info: GpuInfo,
}

impl GpuEncoder {
    /// Initialize on the best-ranked adapter.
    pub fn new() -> Result<Self> {
        Self::with_adapter(None)
    }

    /// Initialize on a specific adapter index.
    pub fn with_adapter(adapter_index: Option<usize>) -> Result<Self> {
        pollster::block_on(Self::new_async(adapter_index))
    }

    async fn new_async(adapter_index: Option<usize>) -> Result<Self> {
        let instance = Instance::new(&wgpu::InstanceDescriptor {
            backends: Backends::VULKAN | Backends::DX12 | Backends::METAL,
            ..Default::default()
        });

        let adapters = instance.enumerate_adapters(Backends::all()).await;
        if adapters.is_empty() {
            anyhow::bail!("no GPU adapters found");
        }
        for (i, adapter) in adapters.iter().enumerate() {
            debug!("adapter {}: {}", i, GpuInfo::describe(adapter, i));
        }

        let (adapter_index, adapter) = match adapter_index {
            Some(idx) => {
                let adapter = adapters.get(idx).ok_or_else(|| {
                    anyhow::anyhow!(
                        "adapter index {idx} out of range ({} adapters found)",
                        adapters.len()
                    )
                })?;
                (idx, adapter)
            }
            None => adapters
                .iter()
                .enumerate()
                .max_by_key(|(_, adapter)| adapter_score(adapter))
                .expect("adapter list checked non-empty"),
        };

        let gpu_info = GpuInfo::describe(adapter, adapter_index);
        info!("selected GPU: {gpu_info}");

        let (device, queue) = adapter
            .request_device(&wgpu::DeviceDescriptor {
                label: Some("texpack GPU encoder"),
                required_features: wgpu::Features::empty(),
                required_limits: wgpu::Limits::default(),
                ..Default::default()
            })
            .await
            .context("requesting the GPU device failed")?;

        let device = Arc::new(device);
        let queue = Arc::new(queue);

        let compressor = GpuBlockCompressor::new((*device).clone(), (*queue).clone());

        Ok(Self {
            device,
            queue,
            compressor,
            gpu_info,
        })
    }

    /// Start an empty batch.
    pub fn create_batch(&self) -> EncodeBatch {
        EncodeBatch { tasks: Vec::new() }
    }

    /// Queue a BC7 encode of RGBA8 pixels. Nothing runs until the flush.
    pub fn queue_bc7(
        &self,
        batch: &mut EncodeBatch,
        rgba_data: &[u8],
        width: u32,
        height: u32,
    ) -> Result<usize> {
        self.queue_task(
            batch,
            CompressionVariant::BC7(BC7Settings::alpha_basic()),
            TextureFormat::Rgba8Unorm,
            4,
            rgba_data,
            width,
            height,
        )
    }

    /// Queue a BC6H encode of RGBA32F pixels. Nothing runs until the flush.
    pub fn queue_bc6h(
        &self,
        batch: &mut EncodeBatch,
        rgba_data: &[u8],
        width: u32,
        height: u32,
    ) -> Result<usize> {
        self.queue_task(
            batch,
            CompressionVariant::BC6H(BC6HSettings::basic()),
            TextureFormat::Rgba32Float,
            16,
            rgba_data,
            width,
            height,
        )
    }

    #[allow(clippy::too_many_arguments)]
    fn queue_task(
        &self,
        batch: &mut EncodeBatch,
        variant: CompressionVariant,
        texture_format: TextureFormat,
        bytes_per_pixel: u32,
        data: &[u8],
        width: u32,
        height: u32,
    ) -> Result<usize> {
        if data.len() != (width * height * bytes_per_pixel) as usize {
            anyhow::bail!(
                "source data is {} bytes, expected {} for {width}x{height}",
                data.len(),
                width * height * bytes_per_pixel,
            );
        }

        // The compressor consumes whole 4x4 blocks.
        if width % 4 != 0 || height % 4 != 0 {
            anyhow::bail!("encode source must be block-aligned, got {width}x{height}");
        }

        debug!("queuing GPU encode: {}x{} {:?}", width, height, texture_format);

        let texture = self.device.create_texture(&TextureDescriptor {
            label: Some("encode source texture"),
            size: Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: TextureDimension::D2,
            format: texture_format,
            usage: TextureUsages::TEXTURE_BINDING | TextureUsages::COPY_DST,
            view_formats: &[],
        });

        self.queue.write_texture(
            wgpu::TexelCopyTextureInfo {
                texture: &texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            data,
            wgpu::TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(width * bytes_per_pixel),
                rows_per_image: Some(height),
            },
            Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
        );

        let texture_view = texture.create_view(&TextureViewDescriptor::default());

        let output_size = variant.blocks_byte_size(width, height) as u64;

        let output_buffer = self.device.create_buffer(&BufferDescriptor {
            label: Some("encode output buffer"),
            size: output_size,
            usage: BufferUsages::STORAGE | BufferUsages::COPY_SRC,
            mapped_at_creation: false,
        });

        let staging_buffer = self.device.create_buffer(&BufferDescriptor {
            label: Some("encode staging buffer"),
            size: output_size,
            usage: BufferUsages::MAP_READ | BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let idx = batch.tasks.len();
        batch.tasks.push(QueuedEncode {
            texture,
            texture_view,
            output_buffer,
            staging_buffer,
            output_size,
            width,
            height,
            variant,
        });

        Ok(idx)
    }

    /// Run every queued task and return each task's block data, in queue
    /// order.
    pub fn flush_batch(&mut self, batch: EncodeBatch) -> Result<Vec<Vec<u8>>> {
        if batch.tasks.is_empty() {
            return Ok(Vec::new());
        }

        debug!("flushing {} queued GPU encodes", batch.tasks.len());

        for task in &batch.tasks {
            self.compressor.add_compression_task(
                task.variant,
                &task.texture_view,
                task.width,
                task.height,
                &task.output_buffer,
                None,
                None,
            );
        }

        let mut encoder = self
            .device
            .create_command_encoder(&CommandEncoderDescriptor {
                label: Some("block compression encoder"),
            });

        // Every task dispatches inside one compute pass.
        {
            let mut compute_pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                label: Some("block compression pass"),
                timestamp_writes: None,
            });
            self.compressor.compress(&mut compute_pass);
        }

        for task in &batch.tasks {
            encoder.copy_buffer_to_buffer(
                &task.output_buffer,
                0,
                &task.staging_buffer,
                0,
                task.output_size,
            );
        }

        self.queue.submit(std::iter::once(encoder.finish()));

        // Request a read mapping on every staging buffer, then block on the
        // device once.
        let channels: Vec<_> = batch
            .tasks
            .iter()
            .map(|task| {
                let (tx, rx) = std::sync::mpsc::channel();
                task.staging_buffer
                    .slice(..)
                    .map_async(wgpu::MapMode::Read, move |result| {
                        let _ = tx.send(result);
                    });
                rx
            })
            .collect();

        let _ = self.device.poll(wgpu::PollType::Wait {
            submission_index: None,
            timeout: None,
        });

        let mut results = Vec::with_capacity(batch.tasks.len());
        for (task, rx) in batch.tasks.iter().zip(channels) {
            rx.recv()
                .context("map callback dropped")?
                .context("mapping staging buffer failed")?;

            let data = task.staging_buffer.slice(..).get_mapped_range();
            results.push(data.to_vec());
            drop(data);
            task.staging_buffer.unmap();
        }

        debug!("batch flush complete: {} levels", results.len());
        Ok(results)
    }

    /// The adapter this encoder runs on.
    pub fn info(&self) -> &GpuInfo {
        &self.gpu_info
    }
}

/// Enumerate the adapters a `--gpu` index can select.
pub fn list_gpus() -> Vec<GpuInfo> {
    pollster::block_on(list_gpus_async())
}

async fn list_gpus_async() -> Vec<GpuInfo> {
    let instance = Instance::new(&wgpu::InstanceDescriptor {
        backends: Backends::VULKAN | Backends::DX12 | Backends::METAL,
        ..Default::default()
    });

    let adapters = instance.enumerate_adapters(Backends::all()).await;

    adapters
        .iter()
        .enumerate()
        .map(|(idx, adapter)| GpuInfo::describe(adapter, idx))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn listing_adapters_never_panics() {
        // May legitimately return an empty list on headless CI.
        let _ = list_gpus();
    }

    #[test]
    #[ignore = "needs a GPU"]
    fn bc7_batch_produces_one_block_per_mip() {
        let mut encoder = GpuEncoder::new().unwrap();

        let rgba = vec![255u8; 4 * 4 * 4];
        let mut batch = encoder.create_batch();
        encoder.queue_bc7(&mut batch, &rgba, 4, 4).unwrap();
        let results = encoder.flush_batch(batch).unwrap();

        // One 4x4 BC7 block is 16 bytes.
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].len(), 16);
    }

    #[test]
    #[ignore = "needs a GPU"]
    fn bc6h_batch_produces_one_block_per_mip() {
        let mut encoder = GpuEncoder::new().unwrap();

        let rgba: Vec<u8> = bytemuck::cast_slice(&[1.0f32; 4 * 4 * 4]).to_vec();
        let mut batch = encoder.create_batch();
        encoder.queue_bc6h(&mut batch, &rgba, 4, 4).unwrap();
        let results = encoder.flush_batch(batch).unwrap();

        assert_eq!(results.len(), 1);
        assert_eq!(results[0].len(), 16);
    }
}
