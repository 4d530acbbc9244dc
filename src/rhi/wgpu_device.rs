//! # wgpu Device
//!
//! [`Device`] implementation on top of `wgpu`, enabled with the `gpu`
//! feature.
//!
//! ## Programs
//! A program blob is either SPIR-V (recognized by its magic number) or WGSL
//! source text. Every program has a `main` compute entry point and uses
//! bind group 0; its layout is derived from the shader.
//!
//! ## Command lists
//! Commands are recorded on the host and replayed into one
//! `wgpu::CommandEncoder` at submission. `wgpu` tracks resource state
//! itself, so barriers and image transitions are recorded but replay as
//! nothing.
//!
//! ## Host access
//! `wgpu` buffers used for storage cannot be mapped directly. [`Device::map`]
//! reads host-readable buffers through a staging copy and writes
//! host-writable buffers back with `Queue::write_buffer`.
//!
//! ## Limitations
//! * No physical buffer addresses; address slots in the args buffer are 0.
//! * Buffer fills support only the value 0.
//! * No timestamp queries; profiler scopes are ignored.

#![cfg(feature = "gpu")]

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{mpsc, Arc, Mutex, MutexGuard};

use super::{
    AllocId, AllocParams, AllocUsage, CommandList, Device, DeviceAllocation, DeviceCapabilities,
    DevicePtr, ImageCopyParams, ImageDimension, ImageLayout, ImageParams, PipelineCache, RhiError,
    RhiResult, ShaderResource, ShaderResourceSet, Stream, TexelFormat, WHOLE_SIZE,
};

const SPIRV_MAGIC: [u8; 4] = [0x03, 0x02, 0x23, 0x07];
const NULL_BUFFER_SIZE: u64 = 256;

struct WgpuImage {
    texture: wgpu::Texture,
    params: ImageParams,
}

struct Shared {
    device: wgpu::Device,
    queue: wgpu::Queue,
    buffers: Mutex<BufferTable>,
    images: Mutex<HashMap<AllocId, WgpuImage>>,
    null_buffer: wgpu::Buffer,
}

impl Shared {
    fn buffers(&self) -> RhiResult<MutexGuard<'_, BufferTable>> {
        self.buffers
            .lock()
            .map_err(|_| RhiError::Error("buffer table lock poisoned".into()))
    }

    fn images(&self) -> RhiResult<MutexGuard<'_, HashMap<AllocId, WgpuImage>>> {
        self.images
            .lock()
            .map_err(|_| RhiError::Error("image table lock poisoned".into()))
    }

    fn wait(&self, submission_index: Option<wgpu::SubmissionIndex>) -> RhiResult<()> {
        self.device
            .poll(wgpu::PollType::Wait {
                submission_index,
                timeout: None,
            })
            .map(|_| ())
            .map_err(|e| RhiError::Error(format!("wgpu device poll failed: {e:?}")))
    }

    /// Copies `size` bytes at `src` into new mappable buffers and returns
    /// their contents, one submission for the whole batch.
    fn read_back(&self, ranges: &[(DevicePtr, u64)]) -> RhiResult<Vec<Vec<u8>>> {
        let mut encoder = self.device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("gfx_readback_encoder"),
        });
        let mut stagings = Vec::with_capacity(ranges.len());
        {
            let buffers = self.buffers()?;
            for (ptr, size) in ranges {
                let (buffer, _) = buffers.get(&ptr.alloc.alloc_id).ok_or_else(|| {
                    RhiError::InvalidUsage(format!("readback of unknown allocation {}", ptr.alloc.alloc_id))
                })?;
                let copy_size = align4(*size);
                let staging = self.device.create_buffer(&wgpu::BufferDescriptor {
                    label: Some("gfx_readback_staging"),
                    size: copy_size,
                    usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
                    mapped_at_creation: false,
                });
                encoder.copy_buffer_to_buffer(buffer, ptr.offset, &staging, 0, copy_size);
                stagings.push((staging, *size));
            }
        }
        let submission = self.queue.submit(Some(encoder.finish()));

        let (tx, rx) = mpsc::channel();
        for (i, (staging, _)) in stagings.iter().enumerate() {
            let tx = tx.clone();
            staging
                .slice(..)
                .map_async(wgpu::MapMode::Read, move |result| {
                    let _ = tx.send((i, result));
                });
        }
        drop(tx);
        self.wait(Some(submission))?;
        for (_, result) in rx.iter() {
            result.map_err(|e| RhiError::Error(format!("buffer map failed: {e}")))?;
        }

        Ok(stagings
            .iter()
            .map(|(staging, size)| {
                let bytes = {
                    let view = staging.slice(..).get_mapped_range();
                    view[..*size as usize].to_vec()
                };
                staging.unmap();
                bytes
            })
            .collect())
    }
}

type BufferTable = HashMap<AllocId, (wgpu::Buffer, AllocParams)>;

fn buffer_or_null<'a>(buffers: &'a BufferTable, null: &'a wgpu::Buffer, alloc: DeviceAllocation) -> &'a wgpu::Buffer {
    buffers.get(&alloc.alloc_id).map(|(b, _)| b).unwrap_or(null)
}

fn align4(size: u64) -> u64 {
    size.div_ceil(4).max(1) * 4
}

fn texture_format(format: TexelFormat) -> wgpu::TextureFormat {
    match format {
        TexelFormat::R8Unorm => wgpu::TextureFormat::R8Unorm,
        TexelFormat::Rgba8Unorm => wgpu::TextureFormat::Rgba8Unorm,
        TexelFormat::R32Float => wgpu::TextureFormat::R32Float,
        TexelFormat::R32Sint => wgpu::TextureFormat::R32Sint,
        TexelFormat::Rgba32Float => wgpu::TextureFormat::Rgba32Float,
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Device
// ─────────────────────────────────────────────────────────────────────────────

/// GPU device on `wgpu`.
pub struct WgpuDevice {
    shared: Arc<Shared>,
    stream: WgpuStream,
    adapter_name: String,
    caps: DeviceCapabilities,
    next_id: AtomicU64,
}

/// Compiled compute pipeline.
#[derive(Debug, Clone)]
pub struct WgpuPipeline {
    name: String,
    pipeline: Arc<wgpu::ComputePipeline>,
}

impl WgpuPipeline {
    /// Task name the pipeline was created for.
    pub fn name(&self) -> &str {
        &self.name
    }
}

/// `wgpu` pipeline cache.
pub struct WgpuPipelineCache {
    cache: wgpu::PipelineCache,
}

impl PipelineCache for WgpuPipelineCache {
    fn data(&self) -> Vec<u8> {
        self.cache.get_data().unwrap_or_default()
    }
}

/// Completion signal: the submission index, if anything was submitted.
#[derive(Debug, Clone)]
pub struct WgpuSemaphore(Option<wgpu::SubmissionIndex>);

impl WgpuDevice {
    /// Opens the default high-performance adapter.
    ///
    /// ## Errors
    /// [`RhiError::NotSupported`] when no adapter or device is available.
    pub fn new() -> RhiResult<Self> {
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor::default());
        let adapter = pollster::block_on(instance.request_adapter(&wgpu::RequestAdapterOptions {
            power_preference: wgpu::PowerPreference::HighPerformance,
            force_fallback_adapter: false,
            compatible_surface: None,
        }))
        .map_err(|e| RhiError::NotSupported(format!("no wgpu adapter: {e}")))?;

        let wanted = wgpu::Features::PIPELINE_CACHE
            | wgpu::Features::SHADER_F16
            | wgpu::Features::SHADER_F64
            | wgpu::Features::SHADER_INT64
            | wgpu::Features::SHADER_I16;
        let features = adapter.features() & wanted;

        let (device, queue) = pollster::block_on(adapter.request_device(&wgpu::DeviceDescriptor {
            label: Some("gfx_runtime_device"),
            required_features: features,
            required_limits: adapter.limits(),
            ..Default::default()
        }))
        .map_err(|e| RhiError::NotSupported(format!("wgpu device request failed: {e}")))?;

        let null_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("gfx_null_buffer"),
            size: NULL_BUFFER_SIZE,
            usage: wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let caps = DeviceCapabilities {
            int8: false,
            int16: features.contains(wgpu::Features::SHADER_I16),
            int64: features.contains(wgpu::Features::SHADER_INT64),
            float16: features.contains(wgpu::Features::SHADER_F16),
            float64: features.contains(wgpu::Features::SHADER_F64),
            physical_pointers: false,
        };

        let shared = Arc::new(Shared {
            device,
            queue,
            buffers: Mutex::new(HashMap::new()),
            images: Mutex::new(HashMap::new()),
            null_buffer,
        });

        log::debug!("wgpu device on adapter `{}`", adapter.get_info().name);
        Ok(Self {
            stream: WgpuStream { shared: Arc::clone(&shared) },
            shared,
            adapter_name: adapter.get_info().name,
            caps,
            next_id: AtomicU64::new(1),
        })
    }

    fn next_alloc(&self) -> DeviceAllocation {
        DeviceAllocation {
            alloc_id: self.next_id.fetch_add(1, Ordering::Relaxed),
        }
    }
}

impl Device for WgpuDevice {
    type Pipeline = WgpuPipeline;
    type PipelineCache = WgpuPipelineCache;
    type CommandList = WgpuCommandList;
    type Semaphore = WgpuSemaphore;
    type Stream = WgpuStream;

    fn name(&self) -> &str {
        &self.adapter_name
    }

    fn caps(&self) -> DeviceCapabilities {
        self.caps
    }

    fn allocate_memory(&self, params: &AllocParams) -> RhiResult<DeviceAllocation> {
        let usage = match params.usage {
            AllocUsage::Storage => wgpu::BufferUsages::STORAGE,
            AllocUsage::Uniform => wgpu::BufferUsages::UNIFORM,
        } | wgpu::BufferUsages::COPY_SRC
            | wgpu::BufferUsages::COPY_DST;

        let buffer = self.shared.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("gfx_buffer"),
            size: align4(params.size),
            usage,
            mapped_at_creation: false,
        });
        let alloc = self.next_alloc();
        self.shared.buffers()?.insert(alloc.alloc_id, (buffer, *params));
        Ok(alloc)
    }

    fn dealloc_memory(&self, alloc: DeviceAllocation) {
        if let Ok(mut buffers) = self.shared.buffers.lock() {
            if let Some((buffer, _)) = buffers.remove(&alloc.alloc_id) {
                buffer.destroy();
            }
        }
    }

    fn map(&self, alloc: DeviceAllocation, f: &mut dyn FnMut(&mut [u8])) -> RhiResult<()> {
        let (size, params) = {
            let buffers = self.shared.buffers()?;
            let (buffer, params) = buffers
                .get(&alloc.alloc_id)
                .ok_or_else(|| RhiError::InvalidUsage(format!("map of unknown allocation {}", alloc.alloc_id)))?;
            (buffer.size(), *params)
        };
        if !params.host_read && !params.host_write {
            return Err(RhiError::InvalidUsage(format!(
                "allocation {} is not host visible",
                alloc.alloc_id
            )));
        }

        let mut bytes = if params.host_read {
            self.shared
                .read_back(&[(alloc.ptr(0), size)])?
                .pop()
                .unwrap_or_default()
        } else {
            vec![0; size as usize]
        };
        f(&mut bytes);

        if params.host_write {
            let buffers = self.shared.buffers()?;
            if let Some((buffer, _)) = buffers.get(&alloc.alloc_id) {
                self.shared.queue.write_buffer(buffer, 0, &bytes);
            }
        }
        Ok(())
    }

    fn get_memory_physical_pointer(&self, _ptr: DevicePtr) -> u64 {
        0
    }

    fn create_pipeline(
        &self,
        program: &[u8],
        name: &str,
        cache: Option<&WgpuPipelineCache>,
    ) -> RhiResult<WgpuPipeline> {
        let source = if program.starts_with(&SPIRV_MAGIC) {
            wgpu::util::make_spirv(program)
        } else {
            let text = std::str::from_utf8(program)
                .map_err(|_| RhiError::InvalidUsage(format!("program for `{name}` is neither SPIR-V nor WGSL")))?;
            wgpu::ShaderSource::Wgsl(text.into())
        };

        let device = &self.shared.device;
        device.push_error_scope(wgpu::ErrorFilter::Validation);
        let module = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some(name),
            source,
        });
        let pipeline = device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
            label: Some(name),
            layout: None,
            module: &module,
            entry_point: Some("main"),
            compilation_options: wgpu::PipelineCompilationOptions::default(),
            cache: cache.map(|c| &c.cache),
        });
        if let Some(error) = pollster::block_on(device.pop_error_scope()) {
            return Err(RhiError::Error(format!("pipeline `{name}`: {error}")));
        }

        Ok(WgpuPipeline {
            name: name.to_owned(),
            pipeline: Arc::new(pipeline),
        })
    }

    fn create_pipeline_cache(&self, initial_data: Option<&[u8]>) -> RhiResult<WgpuPipelineCache> {
        let device = &self.shared.device;
        if !device.features().contains(wgpu::Features::PIPELINE_CACHE) {
            return Err(RhiError::NotSupported("pipeline caches".into()));
        }
        // SAFETY: `fallback: true` makes wgpu validate the blob's header and
        // start empty when it belongs to another adapter or driver.
        let cache = unsafe {
            device.create_pipeline_cache(&wgpu::PipelineCacheDescriptor {
                label: Some("gfx_pipeline_cache"),
                data: initial_data,
                fallback: true,
            })
        };
        Ok(WgpuPipelineCache { cache })
    }

    fn compute_stream(&self) -> &WgpuStream {
        &self.stream
    }

    fn wait_idle(&self) -> RhiResult<()> {
        self.shared.wait(None)
    }

    fn readback_data(
        &self,
        srcs: &[DevicePtr],
        dsts: &mut [&mut [u8]],
        _wait_semaphores: &[WgpuSemaphore],
    ) -> RhiResult<()> {
        let ranges: Vec<(DevicePtr, u64)> = srcs
            .iter()
            .zip(dsts.iter())
            .map(|(src, dst)| (*src, dst.len() as u64))
            .collect();
        let data = self.shared.read_back(&ranges)?;
        for (dst, bytes) in dsts.iter_mut().zip(data) {
            dst.copy_from_slice(&bytes);
        }
        Ok(())
    }

    fn create_image(&self, params: &ImageParams) -> RhiResult<DeviceAllocation> {
        let format = texture_format(params.format);
        let (dimension, size) = match params.dimension {
            ImageDimension::D1 => (
                wgpu::TextureDimension::D1,
                wgpu::Extent3d { width: params.x, height: 1, depth_or_array_layers: 1 },
            ),
            ImageDimension::D2 => (
                wgpu::TextureDimension::D2,
                wgpu::Extent3d { width: params.x, height: params.y, depth_or_array_layers: 1 },
            ),
            ImageDimension::D3 => (
                wgpu::TextureDimension::D3,
                wgpu::Extent3d { width: params.x, height: params.y, depth_or_array_layers: params.z },
            ),
        };

        let mut usage = wgpu::TextureUsages::TEXTURE_BINDING
            | wgpu::TextureUsages::COPY_SRC
            | wgpu::TextureUsages::COPY_DST;
        let allowed = format.guaranteed_format_features(self.shared.device.features()).allowed_usages;
        if allowed.contains(wgpu::TextureUsages::STORAGE_BINDING) {
            usage |= wgpu::TextureUsages::STORAGE_BINDING;
        }

        let texture = self.shared.device.create_texture(&wgpu::TextureDescriptor {
            label: Some("gfx_image"),
            size,
            mip_level_count: 1,
            sample_count: 1,
            dimension,
            format,
            usage,
            view_formats: &[],
        });
        let alloc = self.next_alloc();
        self.shared.images()?.insert(alloc.alloc_id, WgpuImage { texture, params: *params });
        Ok(alloc)
    }

    fn destroy_image(&self, image: DeviceAllocation) {
        if let Ok(mut images) = self.shared.images.lock() {
            if let Some(image) = images.remove(&image.alloc_id) {
                image.texture.destroy();
            }
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Stream
// ─────────────────────────────────────────────────────────────────────────────

/// Queue of a [`WgpuDevice`].
pub struct WgpuStream {
    shared: Arc<Shared>,
}

impl WgpuStream {
    fn encode(&self, list: WgpuCommandList) -> RhiResult<wgpu::CommandBuffer> {
        let shared = &self.shared;
        let buffers = shared.buffers()?;
        let images = shared.images()?;
        let table: &BufferTable = &buffers;
        let buffer_of = |alloc: DeviceAllocation| buffer_or_null(table, &shared.null_buffer, alloc);

        let mut encoder = shared.device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("gfx_compute_encoder"),
        });
        let mut pipeline: Option<Arc<wgpu::ComputePipeline>> = None;
        let mut bind_group: Option<wgpu::BindGroup> = None;

        for command in list.commands {
            match command {
                WgpuCommand::BindPipeline(p) => pipeline = Some(p),
                WgpuCommand::BindResources(set) => {
                    let p = pipeline
                        .as_ref()
                        .ok_or_else(|| RhiError::InvalidUsage("resources bound before a pipeline".into()))?;

                    let mut views = Vec::new();
                    for (binding, resource) in set.entries() {
                        if let ShaderResource::Image(a) | ShaderResource::RwImage(a) = resource {
                            let image = images.get(&a.alloc_id).ok_or_else(|| {
                                RhiError::InvalidUsage(format!("binding {binding} refers to unknown image {}", a.alloc_id))
                            })?;
                            views.push((*binding, image.texture.create_view(&wgpu::TextureViewDescriptor::default())));
                        }
                    }

                    let mut entries: Vec<wgpu::BindGroupEntry> = Vec::with_capacity(set.entries().len());
                    for (binding, resource) in set.entries() {
                        if let ShaderResource::Buffer(ptr) | ShaderResource::RwBuffer(ptr) = resource {
                            entries.push(wgpu::BindGroupEntry {
                                binding: *binding,
                                resource: wgpu::BindingResource::Buffer(wgpu::BufferBinding {
                                    buffer: buffer_of(ptr.alloc),
                                    offset: ptr.offset,
                                    size: None,
                                }),
                            });
                        }
                    }
                    for (binding, view) in &views {
                        entries.push(wgpu::BindGroupEntry {
                            binding: *binding,
                            resource: wgpu::BindingResource::TextureView(view),
                        });
                    }

                    bind_group = Some(shared.device.create_bind_group(&wgpu::BindGroupDescriptor {
                        label: Some("gfx_bind_group"),
                        layout: &p.get_bind_group_layout(0),
                        entries: &entries,
                    }));
                }
                WgpuCommand::Dispatch { x, y, z } => {
                    let p = pipeline
                        .as_ref()
                        .ok_or_else(|| RhiError::InvalidUsage("dispatch without a bound pipeline".into()))?;
                    let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                        label: Some("gfx_compute_pass"),
                        timestamp_writes: None,
                    });
                    pass.set_pipeline(p);
                    if let Some(group) = &bind_group {
                        pass.set_bind_group(0, group, &[]);
                    }
                    pass.dispatch_workgroups(x, y, z);
                }
                WgpuCommand::Fill { ptr, size } => {
                    let size = if size == WHOLE_SIZE { None } else { Some(size) };
                    encoder.clear_buffer(buffer_of(ptr.alloc), ptr.offset, size);
                }
                WgpuCommand::Copy { dst, src, size } => {
                    let size = if size == WHOLE_SIZE { None } else { Some(size) };
                    encoder.copy_buffer_to_buffer(buffer_of(src.alloc), src.offset, buffer_of(dst.alloc), dst.offset, size);
                }
                WgpuCommand::CopyImage { dst, src, params } => {
                    let (Some(dst), Some(src)) = (images.get(&dst.alloc_id), images.get(&src.alloc_id)) else {
                        return Err(RhiError::InvalidUsage("image copy between unknown images".into()));
                    };
                    let depth = if src.params.dimension == ImageDimension::D3 { params.depth.max(1) } else { 1 };
                    encoder.copy_texture_to_texture(
                        wgpu::TexelCopyTextureInfo {
                            texture: &src.texture,
                            mip_level: 0,
                            origin: wgpu::Origin3d {
                                x: params.src_offset[0],
                                y: params.src_offset[1],
                                z: params.src_offset[2],
                            },
                            aspect: wgpu::TextureAspect::All,
                        },
                        wgpu::TexelCopyTextureInfo {
                            texture: &dst.texture,
                            mip_level: 0,
                            origin: wgpu::Origin3d {
                                x: params.dst_offset[0],
                                y: params.dst_offset[1],
                                z: params.dst_offset[2],
                            },
                            aspect: wgpu::TextureAspect::All,
                        },
                        wgpu::Extent3d {
                            width: params.width,
                            height: params.height.max(1),
                            depth_or_array_layers: depth,
                        },
                    );
                }
            }
        }

        Ok(encoder.finish())
    }
}

impl Stream<WgpuDevice> for WgpuStream {
    fn new_command_list(&self) -> RhiResult<WgpuCommandList> {
        Ok(WgpuCommandList { commands: Vec::new() })
    }

    fn submit(&self, list: WgpuCommandList, _wait_semaphores: &[WgpuSemaphore]) -> RhiResult<WgpuSemaphore> {
        let commands = self.encode(list)?;
        Ok(WgpuSemaphore(Some(self.shared.queue.submit(Some(commands)))))
    }

    fn submit_synced(&self, list: WgpuCommandList, wait_semaphores: &[WgpuSemaphore]) -> RhiResult<WgpuSemaphore> {
        let semaphore = self.submit(list, wait_semaphores)?;
        self.shared.wait(semaphore.0.clone())?;
        Ok(semaphore)
    }

    fn command_sync(&self) -> RhiResult<()> {
        self.shared.wait(None)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Command list
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug)]
enum WgpuCommand {
    BindPipeline(Arc<wgpu::ComputePipeline>),
    BindResources(ShaderResourceSet),
    Dispatch { x: u32, y: u32, z: u32 },
    Fill { ptr: DevicePtr, size: u64 },
    Copy { dst: DevicePtr, src: DevicePtr, size: u64 },
    CopyImage { dst: DeviceAllocation, src: DeviceAllocation, params: ImageCopyParams },
}

/// Recorded command list of a [`WgpuDevice`].
#[derive(Debug)]
pub struct WgpuCommandList {
    commands: Vec<WgpuCommand>,
}

impl CommandList for WgpuCommandList {
    type Pipeline = WgpuPipeline;

    fn append(&mut self, mut other: WgpuCommandList) {
        self.commands.append(&mut other.commands);
    }

    fn bind_pipeline(&mut self, pipeline: &WgpuPipeline) {
        self.commands.push(WgpuCommand::BindPipeline(Arc::clone(&pipeline.pipeline)));
    }

    fn bind_shader_resources(&mut self, resources: &ShaderResourceSet, set_index: u32) -> RhiResult<()> {
        if set_index != 0 {
            return Err(RhiError::NotSupported(format!("resource set index {set_index}")));
        }
        self.commands.push(WgpuCommand::BindResources(resources.clone()));
        Ok(())
    }

    fn dispatch(&mut self, x: u32, y: u32, z: u32) -> RhiResult<()> {
        self.commands.push(WgpuCommand::Dispatch { x, y, z });
        Ok(())
    }

    fn memory_barrier(&mut self) {}

    fn buffer_barrier(&mut self, _alloc: DeviceAllocation) {}

    fn buffer_fill(&mut self, ptr: DevicePtr, size: u64, value: u32) {
        if value != 0 {
            log::warn!("wgpu buffer fill supports only zero; filling with zero instead of {value:#x}");
        }
        self.commands.push(WgpuCommand::Fill { ptr, size });
    }

    fn buffer_copy(&mut self, dst: DevicePtr, src: DevicePtr, size: u64) {
        self.commands.push(WgpuCommand::Copy { dst, src, size });
    }

    fn image_transition(&mut self, _image: DeviceAllocation, _old: ImageLayout, _new: ImageLayout) {}

    fn copy_image(
        &mut self,
        dst: DeviceAllocation,
        _dst_layout: ImageLayout,
        src: DeviceAllocation,
        _src_layout: ImageLayout,
        params: &ImageCopyParams,
    ) {
        self.commands.push(WgpuCommand::CopyImage { dst, src, params: *params });
    }
}
