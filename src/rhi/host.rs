//! # Host Reference Device
//!
//! A [`Device`] that executes on the CPU.
//!
//! Programs are Rust closures registered by name with
//! [`HostDevice::register_program`]; a program blob handed to
//! [`Device::create_pipeline`] is simply the UTF-8 program name. Command lists
//! record commands and replay them in order when submitted, so every
//! submission has completed by the time `submit` returns.
//!
//! The device keeps counters ([`HostStats`]) and an image-transition log so
//! callers can observe how the runtime drives it: how often memory was
//! mapped, how many lists were submitted, whether a readback happened.
//!
//! ## Memory model
//!
//! * Buffers and images are zero-initialized byte vectors keyed by
//!   [`AllocId`]; IDs start at 1 so that [`DeviceAllocation::NULL`] is never
//!   a live allocation.
//! * Reads through the null allocation or past the end of a buffer yield
//!   zeroes; such writes are discarded.
//! * With physical pointers enabled, the address of `alloc + offset` is
//!   `alloc_id << 32 | offset`.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, RwLock};
use std::time::Instant;

use bytemuck::Pod;
use rayon::prelude::*;

use super::{
    AllocId, AllocParams, CommandList, Device, DeviceAllocation, DeviceCapabilities, DevicePtr,
    ImageCopyParams, ImageLayout, ImageParams, PipelineCache, RhiError, RhiResult,
    ShaderResource, ShaderResourceSet, Stream, WHOLE_SIZE,
};

type ProgramBody = dyn Fn(&mut HostInvocation<'_>) + Send + Sync;

/// A registered host program.
struct HostProgram {
    workgroup_size: u32,
    body: Arc<ProgramBody>,
}

/// Pipeline created from a registered program.
#[derive(Clone)]
pub struct HostPipeline {
    name: String,
    workgroup_size: u32,
    body: Arc<ProgramBody>,
}

impl HostPipeline {
    /// Program name.
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl std::fmt::Debug for HostPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HostPipeline")
            .field("name", &self.name)
            .field("workgroup_size", &self.workgroup_size)
            .finish()
    }
}

/// Pipeline cache: the set of program names compiled through it.
///
/// Serialized as newline-separated names.
#[derive(Debug, Default)]
pub struct HostPipelineCache {
    entries: Mutex<Vec<String>>,
}

impl HostPipelineCache {
    /// Whether `name` was already compiled through this cache.
    pub fn contains(&self, name: &str) -> bool {
        self.entries
            .lock()
            .map(|e| e.iter().any(|n| n == name))
            .unwrap_or(false)
    }

    fn insert(&self, name: &str) -> bool {
        let Ok(mut entries) = self.entries.lock() else {
            return false;
        };
        if entries.iter().any(|n| n == name) {
            return true;
        }
        entries.push(name.to_owned());
        false
    }
}

impl PipelineCache for HostPipelineCache {
    fn data(&self) -> Vec<u8> {
        self.entries
            .lock()
            .map(|e| e.join("\n").into_bytes())
            .unwrap_or_default()
    }
}

/// Completion signal of a host submission: its sequence number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct HostSemaphore(pub u64);

// ─────────────────────────────────────────────────────────────────────────────
// Shared device state
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug)]
enum MemoryKind {
    Buffer(AllocParams),
    Image(ImageParams),
}

#[derive(Debug)]
struct HostMemory {
    bytes: Vec<u8>,
    kind: MemoryKind,
}

type MemoryMap = HashMap<AllocId, HostMemory>;

#[derive(Default)]
struct Counters {
    allocations: AtomicUsize,
    deallocations: AtomicUsize,
    maps: AtomicUsize,
    submissions: AtomicUsize,
    synced_submissions: AtomicUsize,
    readback_batches: AtomicUsize,
    wait_idles: AtomicUsize,
    dispatches: AtomicUsize,
    buffer_fills: AtomicUsize,
    pipelines_created: AtomicUsize,
    pipeline_cache_hits: AtomicUsize,
    profiler_syncs: AtomicUsize,
}

/// Snapshot of the host device's counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct HostStats {
    /// Buffers and images allocated.
    pub allocations: usize,
    /// Buffers and images freed.
    pub deallocations: usize,
    /// Currently live buffers and images.
    pub live_allocations: usize,
    /// Map/unmap cycles.
    pub maps: usize,
    /// Command lists submitted (synced ones included).
    pub submissions: usize,
    /// Command lists submitted with `submit_synced`.
    pub synced_submissions: usize,
    /// `readback_data` batches.
    pub readback_batches: usize,
    /// `wait_idle` calls.
    pub wait_idles: usize,
    /// Dispatches executed.
    pub dispatches: usize,
    /// Buffer fills executed.
    pub buffer_fills: usize,
    /// Pipelines created.
    pub pipelines_created: usize,
    /// Pipelines whose program was already in the pipeline cache.
    pub pipeline_cache_hits: usize,
    /// `profiler_sync` calls.
    pub profiler_syncs: usize,
}

struct Shared {
    memory: Mutex<MemoryMap>,
    next_id: AtomicU64,
    next_submission: AtomicU64,
    counters: Counters,
    transitions: Mutex<Vec<(AllocId, ImageLayout, ImageLayout)>>,
    samples: Mutex<Vec<(String, f64)>>,
}

impl Shared {
    fn memory(&self) -> RhiResult<MutexGuard<'_, MemoryMap>> {
        self.memory
            .lock()
            .map_err(|_| RhiError::Error("host memory lock poisoned".into()))
    }

    fn insert(&self, bytes: Vec<u8>, kind: MemoryKind) -> RhiResult<DeviceAllocation> {
        let alloc_id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.memory()?.insert(alloc_id, HostMemory { bytes, kind });
        self.counters.allocations.fetch_add(1, Ordering::Relaxed);
        Ok(DeviceAllocation { alloc_id })
    }

    fn remove(&self, alloc: DeviceAllocation) {
        if alloc.is_null() {
            return;
        }
        if let Ok(mut memory) = self.memory.lock() {
            if memory.remove(&alloc.alloc_id).is_some() {
                self.counters.deallocations.fetch_add(1, Ordering::Relaxed);
            }
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Device
// ─────────────────────────────────────────────────────────────────────────────

/// CPU reference implementation of [`Device`].
pub struct HostDevice {
    caps: DeviceCapabilities,
    query_pool_limit: Option<usize>,
    programs: RwLock<HashMap<String, HostProgram>>,
    shared: Arc<Shared>,
    stream: HostStream,
}

/// Builder for [`HostDevice`].
#[derive(Debug, Clone)]
pub struct HostDeviceBuilder {
    caps: DeviceCapabilities,
    query_pool_limit: Option<usize>,
}

impl HostDeviceBuilder {
    /// Reported capabilities (default: everything supported).
    pub fn capabilities(mut self, caps: DeviceCapabilities) -> Self {
        self.caps = caps;
        self
    }

    /// Bounds the number of outstanding profiler samples.
    pub fn query_pool_limit(mut self, limit: usize) -> Self {
        self.query_pool_limit = Some(limit);
        self
    }

    /// Builds the device.
    pub fn build(self) -> HostDevice {
        let shared = Arc::new(Shared {
            memory: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
            next_submission: AtomicU64::new(1),
            counters: Counters::default(),
            transitions: Mutex::new(Vec::new()),
            samples: Mutex::new(Vec::new()),
        });
        HostDevice {
            caps: self.caps,
            query_pool_limit: self.query_pool_limit,
            programs: RwLock::new(HashMap::new()),
            stream: HostStream { shared: Arc::clone(&shared) },
            shared,
        }
    }
}

impl Default for HostDevice {
    fn default() -> Self {
        Self::new()
    }
}

impl HostDevice {
    /// Device with every capability and no profiler limit.
    pub fn new() -> Self {
        Self::builder().build()
    }

    /// Starts configuring a device.
    pub fn builder() -> HostDeviceBuilder {
        HostDeviceBuilder {
            caps: DeviceCapabilities::all(),
            query_pool_limit: None,
        }
    }

    /// Registers a program under `name`.
    ///
    /// `body` runs once per invocation; a dispatch of `n` groups runs
    /// `n * workgroup_size` invocations with global IDs `0..n * workgroup_size`.
    /// Re-registering a name replaces the program for pipelines created later.
    pub fn register_program<F>(&self, name: &str, workgroup_size: u32, body: F)
    where
        F: Fn(&mut HostInvocation<'_>) + Send + Sync + 'static,
    {
        if let Ok(mut programs) = self.programs.write() {
            programs.insert(
                name.to_owned(),
                HostProgram {
                    workgroup_size: workgroup_size.max(1),
                    body: Arc::new(body),
                },
            );
        }
    }

    /// Current counters.
    pub fn stats(&self) -> HostStats {
        let c = &self.shared.counters;
        HostStats {
            allocations: c.allocations.load(Ordering::Relaxed),
            deallocations: c.deallocations.load(Ordering::Relaxed),
            live_allocations: self.shared.memory.lock().map(|m| m.len()).unwrap_or(0),
            maps: c.maps.load(Ordering::Relaxed),
            submissions: c.submissions.load(Ordering::Relaxed),
            synced_submissions: c.synced_submissions.load(Ordering::Relaxed),
            readback_batches: c.readback_batches.load(Ordering::Relaxed),
            wait_idles: c.wait_idles.load(Ordering::Relaxed),
            dispatches: c.dispatches.load(Ordering::Relaxed),
            buffer_fills: c.buffer_fills.load(Ordering::Relaxed),
            pipelines_created: c.pipelines_created.load(Ordering::Relaxed),
            pipeline_cache_hits: c.pipeline_cache_hits.load(Ordering::Relaxed),
            profiler_syncs: c.profiler_syncs.load(Ordering::Relaxed),
        }
    }

    /// Image layout transitions executed so far, as `(image, old, new)`.
    pub fn image_transitions(&self) -> Vec<(AllocId, ImageLayout, ImageLayout)> {
        self.shared
            .transitions
            .lock()
            .map(|t| t.clone())
            .unwrap_or_default()
    }

    /// Copy of an allocation's bytes, bypassing the counters.
    pub fn contents(&self, alloc: DeviceAllocation) -> Option<Vec<u8>> {
        let memory = self.shared.memory.lock().ok()?;
        memory.get(&alloc.alloc_id).map(|m| m.bytes.clone())
    }

    /// Overwrites the front of an allocation, bypassing the counters.
    pub fn write_contents(&self, alloc: DeviceAllocation, data: &[u8]) -> RhiResult<()> {
        let mut memory = self.shared.memory()?;
        let entry = memory
            .get_mut(&alloc.alloc_id)
            .ok_or_else(|| RhiError::InvalidUsage(format!("unknown allocation {}", alloc.alloc_id)))?;
        let len = data.len().min(entry.bytes.len());
        entry.bytes[..len].copy_from_slice(&data[..len]);
        Ok(())
    }

    /// Whether `alloc` is live.
    pub fn is_live(&self, alloc: DeviceAllocation) -> bool {
        self.shared
            .memory
            .lock()
            .map(|m| m.contains_key(&alloc.alloc_id))
            .unwrap_or(false)
    }
}

impl Device for HostDevice {
    type Pipeline = HostPipeline;
    type PipelineCache = HostPipelineCache;
    type CommandList = HostCommandList;
    type Semaphore = HostSemaphore;
    type Stream = HostStream;

    fn name(&self) -> &str {
        "host"
    }

    fn caps(&self) -> DeviceCapabilities {
        self.caps
    }

    fn allocate_memory(&self, params: &AllocParams) -> RhiResult<DeviceAllocation> {
        let size = usize::try_from(params.size)
            .map_err(|_| RhiError::OutOfMemory { requested: params.size })?;
        self.shared.insert(vec![0; size], MemoryKind::Buffer(*params))
    }

    fn dealloc_memory(&self, alloc: DeviceAllocation) {
        self.shared.remove(alloc);
    }

    fn map(&self, alloc: DeviceAllocation, f: &mut dyn FnMut(&mut [u8])) -> RhiResult<()> {
        let mut memory = self.shared.memory()?;
        let entry = memory
            .get_mut(&alloc.alloc_id)
            .ok_or_else(|| RhiError::InvalidUsage(format!("map of unknown allocation {}", alloc.alloc_id)))?;
        match entry.kind {
            MemoryKind::Buffer(params) if params.host_read || params.host_write => {}
            _ => {
                return Err(RhiError::InvalidUsage(format!(
                    "allocation {} is not host visible",
                    alloc.alloc_id
                )))
            }
        }
        self.shared.counters.maps.fetch_add(1, Ordering::Relaxed);
        f(&mut entry.bytes);
        Ok(())
    }

    fn get_memory_physical_pointer(&self, ptr: DevicePtr) -> u64 {
        if !self.caps.physical_pointers || ptr.alloc.is_null() {
            return 0;
        }
        (ptr.alloc.alloc_id << 32) | (ptr.offset & 0xffff_ffff)
    }

    fn create_pipeline(
        &self,
        program: &[u8],
        name: &str,
        cache: Option<&HostPipelineCache>,
    ) -> RhiResult<HostPipeline> {
        let program_name = std::str::from_utf8(program)
            .map_err(|_| RhiError::InvalidUsage(format!("program blob for `{name}` is not a program name")))?;
        let programs = self
            .programs
            .read()
            .map_err(|_| RhiError::Error("program table lock poisoned".into()))?;
        let program = programs
            .get(program_name)
            .ok_or_else(|| RhiError::Error(format!("no host program named `{program_name}`")))?;

        if let Some(cache) = cache {
            if cache.insert(program_name) {
                self.shared.counters.pipeline_cache_hits.fetch_add(1, Ordering::Relaxed);
            }
        }
        self.shared.counters.pipelines_created.fetch_add(1, Ordering::Relaxed);

        Ok(HostPipeline {
            name: name.to_owned(),
            workgroup_size: program.workgroup_size,
            body: Arc::clone(&program.body),
        })
    }

    fn create_pipeline_cache(&self, initial_data: Option<&[u8]>) -> RhiResult<HostPipelineCache> {
        let entries = match initial_data {
            None => Vec::new(),
            Some(data) => std::str::from_utf8(data)
                .map_err(|_| RhiError::InvalidUsage("pipeline cache data is not a host cache".into()))?
                .lines()
                .filter(|l| !l.is_empty())
                .map(str::to_owned)
                .collect(),
        };
        Ok(HostPipelineCache { entries: Mutex::new(entries) })
    }

    fn compute_stream(&self) -> &HostStream {
        &self.stream
    }

    fn wait_idle(&self) -> RhiResult<()> {
        self.shared.counters.wait_idles.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    fn readback_data(
        &self,
        srcs: &[DevicePtr],
        dsts: &mut [&mut [u8]],
        _wait_semaphores: &[HostSemaphore],
    ) -> RhiResult<()> {
        if srcs.len() != dsts.len() {
            return Err(RhiError::InvalidUsage(format!(
                "readback of {} sources into {} destinations",
                srcs.len(),
                dsts.len()
            )));
        }
        let memory = self.shared.memory()?;
        let memory: &MemoryMap = &memory;
        dsts.par_iter_mut()
            .zip(srcs.par_iter())
            .try_for_each(|(dst, src)| {
                let entry = memory.get(&src.alloc.alloc_id).ok_or_else(|| {
                    RhiError::InvalidUsage(format!("readback of unknown allocation {}", src.alloc.alloc_id))
                })?;
                let start = src.offset as usize;
                let bytes = entry
                    .bytes
                    .get(start..start + dst.len())
                    .ok_or_else(|| RhiError::InvalidUsage("readback past end of allocation".into()))?;
                dst.copy_from_slice(bytes);
                Ok(())
            })?;
        self.shared.counters.readback_batches.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    fn create_image(&self, params: &ImageParams) -> RhiResult<DeviceAllocation> {
        let texels = params.x as u64 * params.y.max(1) as u64 * params.z.max(1) as u64;
        let size = texels * params.format.bytes_per_texel();
        let size = usize::try_from(size).map_err(|_| RhiError::OutOfMemory { requested: size })?;
        self.shared.insert(vec![0; size], MemoryKind::Image(*params))
    }

    fn destroy_image(&self, image: DeviceAllocation) {
        self.shared.remove(image);
    }

    fn profiler_query_pool_limit(&self) -> Option<usize> {
        self.query_pool_limit
    }

    fn profiler_sampler_count(&self) -> usize {
        self.shared.samples.lock().map(|s| s.len()).unwrap_or(0)
    }

    fn profiler_sync(&self) {
        self.shared.counters.profiler_syncs.fetch_add(1, Ordering::Relaxed);
    }

    fn profiler_flush_sampled_time(&self) -> Vec<(String, f64)> {
        self.shared
            .samples
            .lock()
            .map(|mut s| std::mem::take(&mut *s))
            .unwrap_or_default()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Stream
// ─────────────────────────────────────────────────────────────────────────────

/// Compute stream of a [`HostDevice`]. Executes lists at submission.
pub struct HostStream {
    shared: Arc<Shared>,
}

impl HostStream {
    fn execute(&self, list: HostCommandList) -> RhiResult<HostSemaphore> {
        let mut memory = self.shared.memory()?;
        let mut pipeline: Option<HostPipeline> = None;
        let mut resources = ShaderResourceSet::new();
        let mut scopes: Vec<(String, Instant)> = Vec::new();

        for command in list.commands {
            match command {
                HostCommand::BindPipeline(p) => pipeline = Some(p),
                HostCommand::BindResources(set) => resources = set,
                HostCommand::Dispatch { x, y, z } => {
                    let p = pipeline
                        .as_ref()
                        .ok_or_else(|| RhiError::InvalidUsage("dispatch without a bound pipeline".into()))?;
                    let total = x as u64 * y as u64 * z as u64 * p.workgroup_size as u64;
                    let mut invocation = HostInvocation {
                        global_id: 0,
                        num_invocations: total,
                        resources: &resources,
                        memory: &mut *memory,
                    };
                    for id in 0..total {
                        invocation.global_id = id;
                        (p.body)(&mut invocation);
                    }
                    self.shared.counters.dispatches.fetch_add(1, Ordering::Relaxed);
                }
                HostCommand::MemoryBarrier | HostCommand::BufferBarrier(_) => {}
                HostCommand::Fill { ptr, size, value } => {
                    if let Some(entry) = memory.get_mut(&ptr.alloc.alloc_id) {
                        let start = (ptr.offset as usize).min(entry.bytes.len());
                        let end = if size == WHOLE_SIZE {
                            entry.bytes.len()
                        } else {
                            (start + size as usize).min(entry.bytes.len())
                        };
                        let pattern = value.to_le_bytes();
                        for (i, b) in entry.bytes[start..end].iter_mut().enumerate() {
                            *b = pattern[i % 4];
                        }
                    }
                    self.shared.counters.buffer_fills.fetch_add(1, Ordering::Relaxed);
                }
                HostCommand::Copy { dst, src, size } => {
                    let bytes = memory
                        .get(&src.alloc.alloc_id)
                        .and_then(|e| {
                            let start = src.offset as usize;
                            let end = if size == WHOLE_SIZE {
                                e.bytes.len()
                            } else {
                                start.checked_add(size as usize)?
                            };
                            e.bytes.get(start..end)
                        })
                        .map(<[u8]>::to_vec)
                        .ok_or_else(|| RhiError::InvalidUsage("buffer copy source out of range".into()))?;
                    let target = memory
                        .get_mut(&dst.alloc.alloc_id)
                        .and_then(|e| {
                            let start = dst.offset as usize;
                            e.bytes.get_mut(start..start.checked_add(bytes.len())?)
                        })
                        .ok_or_else(|| RhiError::InvalidUsage("buffer copy destination out of range".into()))?;
                    target.copy_from_slice(&bytes);
                }
                HostCommand::ImageTransition { image, old, new } => {
                    if let Ok(mut log) = self.shared.transitions.lock() {
                        log.push((image.alloc_id, old, new));
                    }
                }
                HostCommand::CopyImage { dst, src, params } => copy_image(&mut *memory, dst, src, &params)?,
                HostCommand::BeginScope(name) => scopes.push((name, Instant::now())),
                HostCommand::EndScope => {
                    if let Some((name, start)) = scopes.pop() {
                        let elapsed_ms = start.elapsed().as_secs_f64() * 1e3;
                        if let Ok(mut samples) = self.shared.samples.lock() {
                            samples.push((name, elapsed_ms));
                        }
                    }
                }
            }
        }

        self.shared.counters.submissions.fetch_add(1, Ordering::Relaxed);
        Ok(HostSemaphore(self.shared.next_submission.fetch_add(1, Ordering::Relaxed)))
    }
}

impl Stream<HostDevice> for HostStream {
    fn new_command_list(&self) -> RhiResult<HostCommandList> {
        Ok(HostCommandList {
            shared: Arc::clone(&self.shared),
            commands: Vec::new(),
        })
    }

    fn submit(&self, list: HostCommandList, _wait_semaphores: &[HostSemaphore]) -> RhiResult<HostSemaphore> {
        self.execute(list)
    }

    fn submit_synced(&self, list: HostCommandList, _wait_semaphores: &[HostSemaphore]) -> RhiResult<HostSemaphore> {
        let semaphore = self.execute(list)?;
        self.shared.counters.synced_submissions.fetch_add(1, Ordering::Relaxed);
        Ok(semaphore)
    }

    fn command_sync(&self) -> RhiResult<()> {
        Ok(())
    }
}

fn copy_image(
    memory: &mut MemoryMap,
    dst: DeviceAllocation,
    src: DeviceAllocation,
    params: &ImageCopyParams,
) -> RhiResult<()> {
    let image_of = |memory: &MemoryMap, alloc: DeviceAllocation| -> RhiResult<ImageParams> {
        match memory.get(&alloc.alloc_id).map(|m| &m.kind) {
            Some(MemoryKind::Image(p)) => Ok(*p),
            _ => Err(RhiError::InvalidUsage(format!("allocation {} is not an image", alloc.alloc_id))),
        }
    };
    let src_params = image_of(memory, src)?;
    let dst_params = image_of(memory, dst)?;
    if src_params.format != dst_params.format {
        return Err(RhiError::InvalidUsage("image copy between different formats".into()));
    }

    let texel = src_params.format.bytes_per_texel() as usize;
    let row_bytes = params.width as usize * texel;
    let src_bytes = memory
        .get(&src.alloc_id)
        .map(|m| m.bytes.clone())
        .unwrap_or_default();
    let dst_bytes = match memory.get_mut(&dst.alloc_id) {
        Some(m) => &mut m.bytes,
        None => return Ok(()),
    };

    let offset_of = |p: &ImageParams, x: u32, y: u32, z: u32| -> usize {
        ((z as usize * p.y.max(1) as usize + y as usize) * p.x as usize + x as usize) * texel
    };

    for z in 0..params.depth.max(1) {
        for y in 0..params.height.max(1) {
            let s = offset_of(
                &src_params,
                params.src_offset[0],
                params.src_offset[1] + y,
                params.src_offset[2] + z,
            );
            let d = offset_of(
                &dst_params,
                params.dst_offset[0],
                params.dst_offset[1] + y,
                params.dst_offset[2] + z,
            );
            let row = src_bytes
                .get(s..s + row_bytes)
                .ok_or_else(|| RhiError::InvalidUsage("image copy source out of range".into()))?;
            dst_bytes
                .get_mut(d..d + row_bytes)
                .ok_or_else(|| RhiError::InvalidUsage("image copy destination out of range".into()))?
                .copy_from_slice(row);
        }
    }
    Ok(())
}

// ─────────────────────────────────────────────────────────────────────────────
// Command list
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug)]
enum HostCommand {
    BindPipeline(HostPipeline),
    BindResources(ShaderResourceSet),
    Dispatch { x: u32, y: u32, z: u32 },
    MemoryBarrier,
    BufferBarrier(DeviceAllocation),
    Fill { ptr: DevicePtr, size: u64, value: u32 },
    Copy { dst: DevicePtr, src: DevicePtr, size: u64 },
    ImageTransition { image: DeviceAllocation, old: ImageLayout, new: ImageLayout },
    CopyImage { dst: DeviceAllocation, src: DeviceAllocation, params: ImageCopyParams },
    BeginScope(String),
    EndScope,
}

/// Recorded command list of a [`HostDevice`].
pub struct HostCommandList {
    shared: Arc<Shared>,
    commands: Vec<HostCommand>,
}

impl HostCommandList {
    /// Number of recorded commands.
    pub fn len(&self) -> usize {
        self.commands.len()
    }

    /// Whether nothing has been recorded.
    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }
}

impl CommandList for HostCommandList {
    type Pipeline = HostPipeline;

    fn append(&mut self, mut other: HostCommandList) {
        self.commands.append(&mut other.commands);
    }

    fn bind_pipeline(&mut self, pipeline: &HostPipeline) {
        self.commands.push(HostCommand::BindPipeline(pipeline.clone()));
    }

    fn bind_shader_resources(&mut self, resources: &ShaderResourceSet, set_index: u32) -> RhiResult<()> {
        if set_index != 0 {
            return Err(RhiError::NotSupported(format!("resource set index {set_index}")));
        }
        let memory = self.shared.memory()?;
        for (binding, resource) in resources.entries() {
            let alloc = match resource {
                ShaderResource::Buffer(p) | ShaderResource::RwBuffer(p) => p.alloc,
                ShaderResource::Image(a) | ShaderResource::RwImage(a) => *a,
            };
            if !alloc.is_null() && !memory.contains_key(&alloc.alloc_id) {
                return Err(RhiError::InvalidUsage(format!(
                    "binding {binding} refers to unknown allocation {}",
                    alloc.alloc_id
                )));
            }
        }
        drop(memory);
        self.commands.push(HostCommand::BindResources(resources.clone()));
        Ok(())
    }

    fn dispatch(&mut self, x: u32, y: u32, z: u32) -> RhiResult<()> {
        if !self.commands.iter().any(|c| matches!(c, HostCommand::BindPipeline(_))) {
            return Err(RhiError::InvalidUsage("dispatch without a bound pipeline".into()));
        }
        self.commands.push(HostCommand::Dispatch { x, y, z });
        Ok(())
    }

    fn memory_barrier(&mut self) {
        self.commands.push(HostCommand::MemoryBarrier);
    }

    fn buffer_barrier(&mut self, alloc: DeviceAllocation) {
        self.commands.push(HostCommand::BufferBarrier(alloc));
    }

    fn buffer_fill(&mut self, ptr: DevicePtr, size: u64, value: u32) {
        self.commands.push(HostCommand::Fill { ptr, size, value });
    }

    fn buffer_copy(&mut self, dst: DevicePtr, src: DevicePtr, size: u64) {
        self.commands.push(HostCommand::Copy { dst, src, size });
    }

    fn image_transition(&mut self, image: DeviceAllocation, old: ImageLayout, new: ImageLayout) {
        self.commands.push(HostCommand::ImageTransition { image, old, new });
    }

    fn copy_image(
        &mut self,
        dst: DeviceAllocation,
        _dst_layout: ImageLayout,
        src: DeviceAllocation,
        _src_layout: ImageLayout,
        params: &ImageCopyParams,
    ) {
        self.commands.push(HostCommand::CopyImage { dst, src, params: *params });
    }

    fn begin_profiler_scope(&mut self, name: &str) {
        self.commands.push(HostCommand::BeginScope(name.to_owned()));
    }

    fn end_profiler_scope(&mut self) {
        self.commands.push(HostCommand::EndScope);
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Invocation
// ─────────────────────────────────────────────────────────────────────────────

/// View of device state handed to a host program for one invocation.
pub struct HostInvocation<'a> {
    global_id: u64,
    num_invocations: u64,
    resources: &'a ShaderResourceSet,
    memory: &'a mut MemoryMap,
}

impl HostInvocation<'_> {
    /// Global invocation index.
    pub fn global_id(&self) -> usize {
        self.global_id as usize
    }

    /// Invocations in this dispatch.
    pub fn num_invocations(&self) -> usize {
        self.num_invocations as usize
    }

    fn target(&self, binding: u32) -> Option<DevicePtr> {
        match self.resources.get(binding)? {
            ShaderResource::Buffer(p) | ShaderResource::RwBuffer(p) => Some(p),
            ShaderResource::Image(a) | ShaderResource::RwImage(a) => Some(a.ptr(0)),
        }
    }

    fn read_at<T: Pod>(&self, ptr: DevicePtr, index: usize) -> T {
        let size = std::mem::size_of::<T>();
        let start = ptr.offset as usize + index * size;
        self.memory
            .get(&ptr.alloc.alloc_id)
            .and_then(|m| m.bytes.get(start..start + size))
            .map(bytemuck::pod_read_unaligned)
            .unwrap_or_else(T::zeroed)
    }

    fn write_at<T: Pod>(&mut self, ptr: DevicePtr, index: usize, value: T) {
        let size = std::mem::size_of::<T>();
        let start = ptr.offset as usize + index * size;
        if let Some(dst) = self
            .memory
            .get_mut(&ptr.alloc.alloc_id)
            .and_then(|m| m.bytes.get_mut(start..start + size))
        {
            dst.copy_from_slice(bytemuck::bytes_of(&value));
        }
    }

    /// Element `index` of type `T` from the resource at `binding`.
    pub fn load<T: Pod>(&self, binding: u32, index: usize) -> T {
        match self.target(binding) {
            Some(ptr) => self.read_at(ptr, index),
            None => T::zeroed(),
        }
    }

    /// Stores element `index` of the resource at `binding`.
    pub fn store<T: Pod>(&mut self, binding: u32, index: usize, value: T) {
        if let Some(ptr) = self.target(binding) {
            self.write_at(ptr, index, value);
        }
    }

    /// Reads `T` at byte `offset` of the resource at `binding`.
    pub fn load_bytes_at<T: Pod>(&self, binding: u32, offset: usize) -> T {
        match self.target(binding) {
            Some(ptr) => self.read_at(ptr.alloc.ptr(ptr.offset + offset as u64), 0),
            None => T::zeroed(),
        }
    }

    /// Writes `T` at byte `offset` of the resource at `binding`.
    pub fn store_bytes_at<T: Pod>(&mut self, binding: u32, offset: usize, value: T) {
        if let Some(ptr) = self.target(binding) {
            self.write_at(ptr.alloc.ptr(ptr.offset + offset as u64), 0, value);
        }
    }

    /// Number of whole `T` elements in the resource at `binding`.
    pub fn len<T: Pod>(&self, binding: u32) -> usize {
        self.target(binding)
            .and_then(|p| {
                let bytes = self.memory.get(&p.alloc.alloc_id)?.bytes.len();
                Some(bytes.saturating_sub(p.offset as usize) / std::mem::size_of::<T>().max(1))
            })
            .unwrap_or(0)
    }

    fn resolve_address(address: u64) -> DevicePtr {
        DeviceAllocation { alloc_id: address >> 32 }.ptr(address & 0xffff_ffff)
    }

    /// Element `index` of type `T` at a physical device address.
    pub fn load_ptr<T: Pod>(&self, address: u64, index: usize) -> T {
        self.read_at(Self::resolve_address(address), index)
    }

    /// Stores element `index` of type `T` at a physical device address.
    pub fn store_ptr<T: Pod>(&mut self, address: u64, index: usize, value: T) {
        self.write_at(Self::resolve_address(address), index, value);
    }
}
