//! # Render Hardware Interface
//!
//! Backend-agnostic device abstraction the runtime executes against.
//!
//! A backend implements [`Device`] together with its associated
//! [`Stream`], [`CommandList`] and [`PipelineCache`] types. The runtime is
//! generic over the device, so a backend is chosen once when the runtime is
//! constructed and never mixed with another.
//!
//! ## Handles
//!
//! * [`DeviceAllocation`] is a plain `Copy` handle naming a buffer or image
//!   by its stable [`AllocId`]. It does not own the memory.
//! * [`AllocationGuard`] owns an allocation and returns it to the device
//!   exactly once, when dropped.
//! * [`DevicePtr`] is an allocation plus a byte offset.
//!
//! ## Mapping
//!
//! Host access goes through [`Device::map`], which hands a closure the mapped
//! bytes and unmaps when the closure returns. A mapping therefore never
//! outlives the call and can never be held across a submission.
//!
//! ## Backends
//!
//! * [`host`]: always available; runs programs registered as Rust closures.
//! * `wgpu_device`: GPU backend behind the `gpu` feature.

use std::fmt;
use std::sync::Arc;

use crate::types::PrimitiveType;

pub mod host;
#[cfg(feature = "gpu")]
pub mod wgpu_device;

/// Stable identifier of a device allocation (buffer or image).
pub type AllocId = u64;

/// Sentinel size meaning "to the end of the allocation".
pub const WHOLE_SIZE: u64 = u64::MAX;

// ─────────────────────────────────────────────────────────────────────────────
// Errors
// ─────────────────────────────────────────────────────────────────────────────

/// Failure reported by a device operation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RhiError {
    /// Generic backend failure.
    #[error("device error: {0}")]
    Error(String),

    /// The operation or format is not supported by this device.
    #[error("not supported: {0}")]
    NotSupported(String),

    /// The call was malformed (bad handle, wrong usage, out-of-range access).
    #[error("invalid usage: {0}")]
    InvalidUsage(String),

    /// The device could not satisfy an allocation.
    #[error("out of device memory (requested {requested} bytes)")]
    OutOfMemory {
        /// Requested allocation size in bytes.
        requested: u64,
    },
}

/// Result of a device operation.
pub type RhiResult<T> = Result<T, RhiError>;

// ─────────────────────────────────────────────────────────────────────────────
// Handles
// ─────────────────────────────────────────────────────────────────────────────

/// Non-owning handle to a block of device memory or an image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DeviceAllocation {
    /// Stable allocation ID.
    pub alloc_id: AllocId,
}

impl DeviceAllocation {
    /// The null allocation. Binding it is well defined; reads yield zero and
    /// writes are discarded.
    pub const NULL: DeviceAllocation = DeviceAllocation { alloc_id: 0 };

    /// Returns `true` for [`DeviceAllocation::NULL`].
    pub const fn is_null(&self) -> bool {
        self.alloc_id == 0
    }

    /// Pointer into this allocation at `offset` bytes.
    pub const fn ptr(self, offset: u64) -> DevicePtr {
        DevicePtr { alloc: self, offset }
    }
}

/// Allocation plus byte offset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DevicePtr {
    /// Target allocation.
    pub alloc: DeviceAllocation,
    /// Byte offset into the allocation.
    pub offset: u64,
}

impl From<DeviceAllocation> for DevicePtr {
    fn from(alloc: DeviceAllocation) -> Self {
        alloc.ptr(0)
    }
}

/// Owning guard: deallocates its allocation when dropped.
pub struct AllocationGuard<D: Device> {
    device: Arc<D>,
    alloc: DeviceAllocation,
}

impl<D: Device> AllocationGuard<D> {
    /// Takes ownership of `alloc`, which must have been allocated on `device`.
    pub fn new(device: Arc<D>, alloc: DeviceAllocation) -> Self {
        Self { device, alloc }
    }

    /// The guarded allocation.
    pub fn alloc(&self) -> DeviceAllocation {
        self.alloc
    }
}

impl<D: Device> fmt::Debug for AllocationGuard<D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AllocationGuard").field("alloc", &self.alloc).finish()
    }
}

impl<D: Device> Drop for AllocationGuard<D> {
    fn drop(&mut self) {
        self.device.dealloc_memory(self.alloc);
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Parameters
// ─────────────────────────────────────────────────────────────────────────────

/// How a buffer will be bound.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AllocUsage {
    /// Read-write storage buffer.
    #[default]
    Storage,
    /// Read-only uniform buffer.
    Uniform,
}

/// Buffer allocation request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AllocParams {
    /// Size in bytes.
    pub size: u64,
    /// The host will write through [`Device::map`].
    pub host_write: bool,
    /// The host will read through [`Device::map`].
    pub host_read: bool,
    /// Exportable to other APIs.
    pub export_sharing: bool,
    /// Binding usage.
    pub usage: AllocUsage,
}

/// Layout an image is in; determines which operations may touch it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ImageLayout {
    /// Contents undefined.
    Undefined,
    /// Sampled by shaders.
    ShaderRead,
    /// Written by shaders.
    ShaderWrite,
    /// Storage image, read and written by shaders.
    ShaderReadWrite,
    /// Destination of a transfer.
    TransferDst,
    /// Source of a transfer.
    TransferSrc,
    /// Ready for presentation.
    PresentSrc,
}

/// Dimensionality of an image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ImageDimension {
    /// One dimension.
    D1,
    /// Two dimensions.
    #[default]
    D2,
    /// Three dimensions.
    D3,
}

/// Texel format of an image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TexelFormat {
    /// One 8-bit unsigned normalized channel.
    R8Unorm,
    /// Four 8-bit unsigned normalized channels.
    #[default]
    Rgba8Unorm,
    /// One 32-bit float channel.
    R32Float,
    /// One 32-bit signed integer channel.
    R32Sint,
    /// Four 32-bit float channels.
    Rgba32Float,
}

impl TexelFormat {
    /// Bytes per texel.
    pub const fn bytes_per_texel(self) -> u64 {
        match self {
            TexelFormat::R8Unorm => 1,
            TexelFormat::Rgba8Unorm | TexelFormat::R32Float | TexelFormat::R32Sint => 4,
            TexelFormat::Rgba32Float => 16,
        }
    }
}

/// Image creation request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageParams {
    /// Dimensionality.
    pub dimension: ImageDimension,
    /// Texel format.
    pub format: TexelFormat,
    /// Layout the image starts in; the runtime records it when tracking.
    pub initial_layout: ImageLayout,
    /// Width in texels.
    pub x: u32,
    /// Height in texels (1 for 1D).
    pub y: u32,
    /// Depth in texels (1 for 1D/2D).
    pub z: u32,
    /// Exportable to other APIs.
    pub export_sharing: bool,
}

impl Default for ImageParams {
    fn default() -> Self {
        Self {
            dimension: ImageDimension::D2,
            format: TexelFormat::Rgba8Unorm,
            initial_layout: ImageLayout::Undefined,
            x: 1,
            y: 1,
            z: 1,
            export_sharing: false,
        }
    }
}

/// Region of an image-to-image copy. Offsets are in texels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ImageCopyParams {
    /// Copy width.
    pub width: u32,
    /// Copy height.
    pub height: u32,
    /// Copy depth.
    pub depth: u32,
    /// Source origin.
    pub src_offset: [u32; 3],
    /// Destination origin.
    pub dst_offset: [u32; 3],
}

/// Feature set a device reports for the primitive types kernels may use.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceCapabilities {
    /// 8-bit integers in shader memory.
    pub int8: bool,
    /// 16-bit integers in shader memory.
    pub int16: bool,
    /// 64-bit integers.
    pub int64: bool,
    /// Half-precision floats.
    pub float16: bool,
    /// Double-precision floats.
    pub float64: bool,
    /// Buffers expose physical device addresses.
    pub physical_pointers: bool,
}

impl DeviceCapabilities {
    /// Everything supported.
    pub const fn all() -> Self {
        Self {
            int8: true,
            int16: true,
            int64: true,
            float16: true,
            float64: true,
            physical_pointers: true,
        }
    }

    /// Only 32-bit types, no physical pointers.
    pub const fn minimal() -> Self {
        Self {
            int8: false,
            int16: false,
            int64: false,
            float16: false,
            float64: false,
            physical_pointers: false,
        }
    }

    /// Whether values of `ty` can be passed to kernels on this device.
    pub fn supports(&self, ty: PrimitiveType) -> bool {
        match ty {
            PrimitiveType::I8 | PrimitiveType::U8 => self.int8,
            PrimitiveType::I16 | PrimitiveType::U16 => self.int16,
            PrimitiveType::I32 | PrimitiveType::U32 | PrimitiveType::F32 => true,
            PrimitiveType::I64 | PrimitiveType::U64 => self.int64,
            PrimitiveType::F16 => self.float16,
            PrimitiveType::F64 => self.float64,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Shader resources
// ─────────────────────────────────────────────────────────────────────────────

/// What is bound at one binding slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShaderResource {
    /// Uniform (read-only) buffer.
    Buffer(DevicePtr),
    /// Storage (read-write) buffer.
    RwBuffer(DevicePtr),
    /// Sampled image.
    Image(DeviceAllocation),
    /// Storage image.
    RwImage(DeviceAllocation),
}

/// Set of resources bound to one dispatch, keyed by binding slot.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ShaderResourceSet {
    entries: Vec<(u32, ShaderResource)>,
}

impl ShaderResourceSet {
    /// Empty set.
    pub fn new() -> Self {
        Self::default()
    }

    fn set(&mut self, binding: u32, resource: ShaderResource) -> &mut Self {
        match self.entries.iter_mut().find(|(b, _)| *b == binding) {
            Some(entry) => entry.1 = resource,
            None => self.entries.push((binding, resource)),
        }
        self
    }

    /// Binds a uniform buffer.
    pub fn buffer(&mut self, binding: u32, ptr: impl Into<DevicePtr>) -> &mut Self {
        self.set(binding, ShaderResource::Buffer(ptr.into()))
    }

    /// Binds a storage buffer.
    pub fn rw_buffer(&mut self, binding: u32, ptr: impl Into<DevicePtr>) -> &mut Self {
        self.set(binding, ShaderResource::RwBuffer(ptr.into()))
    }

    /// Binds a sampled image.
    pub fn image(&mut self, binding: u32, image: DeviceAllocation) -> &mut Self {
        self.set(binding, ShaderResource::Image(image))
    }

    /// Binds a storage image.
    pub fn rw_image(&mut self, binding: u32, image: DeviceAllocation) -> &mut Self {
        self.set(binding, ShaderResource::RwImage(image))
    }

    /// Resource bound at `binding`, if any.
    pub fn get(&self, binding: u32) -> Option<ShaderResource> {
        self.entries.iter().find(|(b, _)| *b == binding).map(|(_, r)| *r)
    }

    /// Bindings in insertion order.
    pub fn entries(&self) -> &[(u32, ShaderResource)] {
        &self.entries
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Device traits
// ─────────────────────────────────────────────────────────────────────────────

/// Device-side pipeline cache object.
pub trait PipelineCache: Send + Sync {
    /// Serialized cache contents, suitable for persisting.
    fn data(&self) -> Vec<u8>;
}

/// A recorded sequence of device commands, submitted as one unit.
pub trait CommandList: Send {
    /// Pipeline type of the owning device.
    type Pipeline;

    /// Moves every command of `other` to the end of this list.
    fn append(&mut self, other: Self)
    where
        Self: Sized;

    /// Binds a compute pipeline for subsequent dispatches.
    fn bind_pipeline(&mut self, pipeline: &Self::Pipeline);

    /// Binds `resources` at set `set_index`.
    fn bind_shader_resources(&mut self, resources: &ShaderResourceSet, set_index: u32) -> RhiResult<()>;

    /// Dispatches `x * y * z` workgroups.
    fn dispatch(&mut self, x: u32, y: u32, z: u32) -> RhiResult<()>;

    /// Orders all preceding memory writes before subsequent accesses.
    fn memory_barrier(&mut self);

    /// Orders preceding writes to `alloc` before subsequent accesses.
    fn buffer_barrier(&mut self, alloc: DeviceAllocation);

    /// Fills `size` bytes at `ptr` ([`WHOLE_SIZE`] for the rest) with `value`.
    fn buffer_fill(&mut self, ptr: DevicePtr, size: u64, value: u32);

    /// Copies `size` bytes from `src` to `dst`.
    fn buffer_copy(&mut self, dst: DevicePtr, src: DevicePtr, size: u64);

    /// Transitions `image` from `old` to `new` layout.
    fn image_transition(&mut self, image: DeviceAllocation, old: ImageLayout, new: ImageLayout);

    /// Copies a region from `src` to `dst`.
    fn copy_image(
        &mut self,
        dst: DeviceAllocation,
        dst_layout: ImageLayout,
        src: DeviceAllocation,
        src_layout: ImageLayout,
        params: &ImageCopyParams,
    );

    /// Opens a named profiler scope.
    fn begin_profiler_scope(&mut self, _name: &str) {}

    /// Closes the innermost profiler scope.
    fn end_profiler_scope(&mut self) {}
}

/// Ordered submission queue of a device.
pub trait Stream<D: Device + ?Sized>: Send + Sync {
    /// Starts recording a new command list.
    fn new_command_list(&self) -> RhiResult<D::CommandList>;

    /// Submits `list`, after `wait_semaphores` signal. Returns the list's
    /// completion semaphore.
    fn submit(&self, list: D::CommandList, wait_semaphores: &[D::Semaphore]) -> RhiResult<D::Semaphore>;

    /// Submits `list` and blocks until it completes.
    fn submit_synced(&self, list: D::CommandList, wait_semaphores: &[D::Semaphore]) -> RhiResult<D::Semaphore>;

    /// Blocks until every submitted list has completed.
    fn command_sync(&self) -> RhiResult<()>;
}

/// A compute device.
pub trait Device: Send + Sync + Sized + 'static {
    /// Compiled pipeline; destroyed on drop.
    type Pipeline: Send + Sync;
    /// Pipeline cache object.
    type PipelineCache: PipelineCache;
    /// Command list type.
    type CommandList: CommandList<Pipeline = Self::Pipeline>;
    /// Completion signal of a submission.
    type Semaphore: Clone + fmt::Debug + Send + Sync;
    /// Compute stream type.
    type Stream: Stream<Self>;

    /// Human-readable backend name.
    fn name(&self) -> &str;

    /// Supported primitive types and features.
    fn caps(&self) -> DeviceCapabilities;

    /// Allocates a buffer.
    fn allocate_memory(&self, params: &AllocParams) -> RhiResult<DeviceAllocation>;

    /// Frees a buffer. Unknown or null handles are ignored.
    fn dealloc_memory(&self, alloc: DeviceAllocation);

    /// Maps a host-visible buffer and hands its bytes to `f`; unmaps when `f`
    /// returns.
    fn map(&self, alloc: DeviceAllocation, f: &mut dyn FnMut(&mut [u8])) -> RhiResult<()>;

    /// Device address of `ptr`, for passing buffers by pointer.
    fn get_memory_physical_pointer(&self, ptr: DevicePtr) -> u64;

    /// Creates a compute pipeline from a program blob.
    fn create_pipeline(
        &self,
        program: &[u8],
        name: &str,
        cache: Option<&Self::PipelineCache>,
    ) -> RhiResult<Self::Pipeline>;

    /// Creates a pipeline cache, seeded from `initial_data` when given.
    fn create_pipeline_cache(&self, initial_data: Option<&[u8]>) -> RhiResult<Self::PipelineCache>;

    /// Empty resource set for a pipeline.
    fn create_resource_set(&self) -> ShaderResourceSet {
        ShaderResourceSet::new()
    }

    /// The compute stream.
    fn compute_stream(&self) -> &Self::Stream;

    /// Blocks until the device is idle.
    fn wait_idle(&self) -> RhiResult<()>;

    /// Copies each `srcs[i]` into `dsts[i]` (length taken from `dsts[i]`)
    /// after `wait_semaphores` signal.
    fn readback_data(
        &self,
        srcs: &[DevicePtr],
        dsts: &mut [&mut [u8]],
        wait_semaphores: &[Self::Semaphore],
    ) -> RhiResult<()>;

    /// Creates an image in `params.initial_layout`.
    fn create_image(&self, params: &ImageParams) -> RhiResult<DeviceAllocation>;

    /// Destroys an image.
    fn destroy_image(&self, image: DeviceAllocation);

    /// Number of timestamp queries a profiler may have outstanding, if bounded.
    fn profiler_query_pool_limit(&self) -> Option<usize> {
        None
    }

    /// Number of timestamp samples recorded but not yet collected.
    fn profiler_sampler_count(&self) -> usize {
        0
    }

    /// Waits for outstanding timestamp queries to resolve.
    fn profiler_sync(&self) {}

    /// Drains resolved samples as `(scope name, elapsed milliseconds)`.
    fn profiler_flush_sampled_time(&self) -> Vec<(String, f64)> {
        Vec::new()
    }
}
