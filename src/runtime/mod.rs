//! # Kernel Runtime
//!
//! [`GfxRuntime`] executes registered kernels on a [`Device`].
//!
//! ## Lifecycle
//!
//! 1. **Construction** loads the on-disk pipeline cache (if configured).
//! 2. **Registration** turns a kernel's per-task program blobs into
//!    pipelines and returns a [`KernelHandle`].
//! 3. **Launch** marshals arguments, records every task of the kernel into
//!    the open command list and, if the kernel hands data back to the host,
//!    submits and waits for it.
//! 4. **Flush / synchronize** submit the open list; synchronize also waits
//!    for the device and collects profiler samples.
//! 5. **Shutdown** synchronizes and writes the pipeline cache back.
//!
//! ## Launch flow
//!
//! For one `launch(handle, ctx)`:
//!
//! * Transient args/returns buffers are allocated when the kernel has
//!   arguments/returns; each host array gets a staging buffer.
//! * The [`blitter`] copies host data in, the [`batcher`] records
//!   `bind → dispatch → barrier` per task, textures are transitioned through
//!   the [`images`] tracker and logical buffers resolved by the
//!   [`resources`] manager.
//! * If results must reach the host the open list is submitted, the device
//!   synchronized and the batch's transient buffers released.
//! * Otherwise the list stays open for the next launch, unless it has been
//!   open longer than the configured idle threshold.
//!
//! ## Concurrency
//!
//! The runtime is driven from one thread of control (`&mut self`). Commands
//! execute in the order they were recorded; launches are never reordered.

use std::collections::HashMap;
use std::sync::Arc;

use crate::config::{RuntimeConfig, MIN_EXT_ARRAY_ALLOC_SIZE};
use crate::error::{GfxError, GfxResult};
use crate::profiling::KernelProfiler;
use crate::rhi::{
    AllocId, AllocParams, AllocUsage, AllocationGuard, CommandList, Device, DeviceAllocation,
    DevicePtr, ImageCopyParams, ImageLayout, ImageParams, Stream,
};

pub mod kernel;
pub mod launch;

pub(crate) mod batcher;
pub(crate) mod blitter;
pub(crate) mod images;
pub(crate) mod pipeline_cache;
pub(crate) mod resources;

use batcher::CommandBatcher;
use blitter::ContextBlitter;
use images::ImageLayoutTracker;
use kernel::{CompiledKernel, KernelAttributes, KernelHandle, KernelRef, RegisterParams};
use launch::{ArgValue, LaunchContext};
use pipeline_cache::PipelineCacheManager;
use resources::{LaunchBuffers, ResourceManager};

/// An image an enqueued raw operation touches, with the layout it must be in
/// while the operation runs and the layout the operation leaves it in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ComputeOpImageRef {
    /// The image.
    pub image: DeviceAllocation,
    /// Layout required by the operation.
    pub initial_layout: ImageLayout,
    /// Layout after the operation.
    pub final_layout: ImageLayout,
}

/// Kernel execution runtime over device `D`.
pub struct GfxRuntime<D: Device> {
    device: Arc<D>,
    config: RuntimeConfig,
    kernels: Vec<KernelRef<D>>,
    kernel_names: HashMap<String, KernelHandle>,
    batcher: CommandBatcher<D>,
    resources: ResourceManager<D>,
    images: ImageLayoutTracker,
    pipeline_cache: PipelineCacheManager<D>,
    profiler: Option<Box<dyn KernelProfiler>>,
    profiling_enabled: bool,
    shut_down: bool,
}

impl<D: Device> GfxRuntime<D> {
    /// Creates a runtime on `device`.
    ///
    /// Loads the pipeline cache from `config.state_dir`; a missing or unusable
    /// cache only means pipelines compile cold.
    pub fn new(device: Arc<D>, config: RuntimeConfig) -> GfxResult<Self> {
        let pipeline_cache = PipelineCacheManager::load(&*device, config.pipeline_cache_path());
        log::debug!("runtime created on device `{}`", device.name());
        Ok(Self {
            batcher: CommandBatcher::new(config.idle_flush_threshold),
            resources: ResourceManager::new(Arc::clone(&device)),
            images: ImageLayoutTracker::default(),
            kernels: Vec::new(),
            kernel_names: HashMap::new(),
            pipeline_cache,
            profiler: None,
            profiling_enabled: false,
            shut_down: false,
            device,
            config,
        })
    }

    /// Attaches a profiler; task dispatches are timed from now on.
    pub fn with_profiler(mut self, profiler: Box<dyn KernelProfiler>) -> Self {
        self.set_profiler(Some(profiler));
        self
    }

    /// Replaces (or removes) the profiler.
    pub fn set_profiler(&mut self, profiler: Option<Box<dyn KernelProfiler>>) {
        self.profiling_enabled = profiler.is_some();
        self.profiler = profiler;
    }

    /// Whether dispatches are currently being timed.
    pub fn is_profiling(&self) -> bool {
        self.profiler.is_some() && self.profiling_enabled
    }

    /// The device.
    pub fn device(&self) -> &Arc<D> {
        &self.device
    }

    /// The configuration the runtime was created with.
    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    // ─── registration ──────────────────────────────────────────────────────

    /// Registers a kernel, building one pipeline per task.
    ///
    /// Handles are issued in registration order and never reused. The
    /// kernel's name maps to the newest handle registered under it.
    ///
    /// ## Errors
    /// * [`GfxError::TaskProgramMismatch`] if task and program counts differ.
    /// * [`GfxError::PipelineCreation`] if any task's program is rejected.
    pub fn register_kernel(&mut self, params: RegisterParams) -> GfxResult<KernelHandle> {
        let name = params.kernel_attribs.name.clone();
        let kernel = CompiledKernel::new(&*self.device, params, self.pipeline_cache.cache())?;

        let handle = KernelHandle(self.kernels.len());
        log::debug!(
            "registered kernel `{name}` as {} ({} tasks)",
            handle.id(),
            kernel.attribs().tasks.len()
        );
        self.kernels.push(Arc::new(kernel));
        self.kernel_names.insert(name, handle);
        Ok(handle)
    }

    /// Handle of the latest kernel registered as `name`.
    pub fn find_kernel(&self, name: &str) -> Option<KernelHandle> {
        self.kernel_names.get(name).copied()
    }

    /// Attributes of a registered kernel.
    pub fn kernel_attributes(&self, handle: KernelHandle) -> GfxResult<&KernelAttributes> {
        self.kernels
            .get(handle.0)
            .map(|k| k.attribs())
            .ok_or(GfxError::UnknownKernel(handle))
    }

    /// Number of registered kernels.
    pub fn kernel_count(&self) -> usize {
        self.kernels.len()
    }

    // ─── launch ────────────────────────────────────────────────────────────

    /// Launches a kernel.
    ///
    /// Arguments are read from `ctx`; host arrays the kernel writes and the
    /// kernel's return values are written back into `ctx` before this
    /// returns. Kernels without either only record work; it runs on the next
    /// flush.
    ///
    /// ## Errors
    /// * [`GfxError::UnknownKernel`] for a handle this runtime never issued.
    /// * [`GfxError::ArgumentMissing`] / [`GfxError::ArgumentMismatch`] when
    ///   `ctx` does not fit the kernel's schema.
    /// * Device failures while allocating, binding, dispatching or syncing.
    pub fn launch(&mut self, handle: KernelHandle, ctx: &mut LaunchContext<'_>) -> GfxResult<()> {
        let kernel = self
            .kernels
            .get(handle.0)
            .cloned()
            .ok_or(GfxError::UnknownKernel(handle))?;
        let attribs = kernel.attribs();
        let ctx_attribs = &attribs.ctx_attribs;

        self.check_profiler_budget(attribs)?;

        let mut launch = LaunchBuffers::default();
        if kernel.args_buffer_size() > 0 {
            launch.args = Some(self.resources.allocate_transient(
                "args buffer",
                AllocParams {
                    size: kernel.args_buffer_size(),
                    host_write: true,
                    usage: AllocUsage::Uniform,
                    ..AllocParams::default()
                },
            )?);
        }
        if kernel.ret_buffer_size() > 0 {
            launch.rets = Some(self.resources.allocate_transient(
                "returns buffer",
                AllocParams {
                    size: kernel.ret_buffer_size(),
                    host_read: true,
                    usage: AllocUsage::Storage,
                    ..AllocParams::default()
                },
            )?);
        }

        let mut textures: HashMap<usize, DeviceAllocation> = HashMap::new();
        for (index, arg) in ctx_attribs.args().iter().enumerate() {
            if !arg.is_array {
                continue;
            }
            match ctx.arg(index) {
                Some(ArgValue::Ndarray(alloc)) => {
                    launch.arrays.insert(index, *alloc);
                    self.resources.mark_ndarray_in_use(*alloc);
                }
                Some(ArgValue::Texture(image)) | Some(ArgValue::RwTexture(image)) => {
                    textures.insert(index, *image);
                }
                Some(ArgValue::HostArray(data)) => {
                    let staging = self.resources.allocate_transient(
                        "external array staging buffer",
                        AllocParams {
                            size: (data.len() as u64).max(MIN_EXT_ARRAY_ALLOC_SIZE),
                            host_write: arg.access.read,
                            host_read: arg.access.write,
                            usage: AllocUsage::Storage,
                            ..AllocParams::default()
                        },
                    )?;
                    launch.arrays.insert(index, staging);
                }
                Some(value @ ArgValue::Scalar(_)) => {
                    return Err(GfxError::ArgumentMismatch {
                        index,
                        expected: "array".into(),
                        found: value.kind().into(),
                    })
                }
                None => return Err(GfxError::ArgumentMissing { index }),
            }
        }

        let blitter = ContextBlitter::maybe_make(
            &*self.device,
            ctx_attribs,
            launch.args.unwrap_or(DeviceAllocation::NULL),
            kernel.args_buffer_size(),
            launch.rets.unwrap_or(DeviceAllocation::NULL),
            &launch.arrays,
        );
        if let Some(blitter) = &blitter {
            blitter.host_to_device(ctx)?;
        }

        // Every binding is resolved before anything is recorded, and the
        // kernel is recorded into its own list; a failing task leaves no
        // earlier task of the kernel queued.
        let mut plans = Vec::with_capacity(attribs.tasks.len());
        for (task, pipeline) in kernel.tasks() {
            let (set, fills) = self
                .resources
                .bind_buffers(task, kernel.num_snode_trees(), &launch)?;
            let bound_textures = self.images.resolve_textures(task, &textures)?;
            plans.push((task, pipeline, set, fills, bound_textures));
        }

        let profile = self.is_profiling();
        let snapshot = self.images.snapshot(plans.iter().flat_map(|p| &p.4));
        let mut list = self
            .device
            .compute_stream()
            .new_command_list()
            .map_err(GfxError::Submission)?;
        let recorded = plans.iter_mut().try_for_each(|(task, pipeline, set, fills, bound_textures)| {
            self.images.bind_textures(&mut list, bound_textures, set)?;
            CommandBatcher::<D>::record_task(&mut list, task, pipeline, set, fills, profile)
        });
        if let Err(e) = recorded {
            self.images.restore(snapshot);
            return Err(e);
        }
        self.batcher.append(&*self.device, list)?;

        if let Some(blitter) = &blitter {
            if blitter.device_to_host(&mut self.batcher, ctx)? {
                self.resources.release_transients();
            }
        }

        if self.batcher.flush_if_stale(&*self.device)? {
            self.resources.release_transients();
        }
        Ok(())
    }

    /// Keeps the device's timestamp query pool from overflowing.
    fn check_profiler_budget(&mut self, attribs: &KernelAttributes) -> GfxResult<()> {
        if !self.is_profiling() {
            return Ok(());
        }
        let Some(limit) = self.device.profiler_query_pool_limit() else {
            return Ok(());
        };
        let tasks = attribs.tasks.len();
        if tasks > limit {
            log::warn!(
                "kernel `{}` has {tasks} tasks, more than the profiler query pool holds ({limit}); profiling disabled",
                attribs.name
            );
            self.profiling_enabled = false;
        } else if self.device.profiler_sampler_count() + tasks > limit {
            self.flush()?;
            self.device.profiler_sync();
            self.collect_profiler_samples();
        }
        Ok(())
    }

    fn collect_profiler_samples(&mut self) {
        let samples = self.device.profiler_flush_sampled_time();
        if let Some(profiler) = self.profiler.as_mut() {
            for (name, elapsed_ms) in samples {
                profiler.insert_record(&name, elapsed_ms);
            }
        }
    }

    // ─── submission ────────────────────────────────────────────────────────

    /// Submits the open command list (or a barrier-only list when none is
    /// open) and releases the batch's transient buffers. Does not wait.
    pub fn flush(&mut self) -> GfxResult<D::Semaphore> {
        let semaphore = self.batcher.flush(&*self.device)?;
        self.resources.release_transients();
        Ok(semaphore)
    }

    /// Flushes and waits for the device to go idle, then hands profiler
    /// samples to the profiler and forgets which ndarrays were in use.
    pub fn synchronize(&mut self) -> GfxResult<()> {
        self.flush()?;
        self.device.wait_idle().map_err(GfxError::Submission)?;
        if self.profiler.is_some() {
            self.device.profiler_sync();
            self.collect_profiler_samples();
        }
        self.resources.release_transients();
        self.resources.clear_ndarrays_in_use();
        log::debug!("runtime synchronized");
        Ok(())
    }

    /// Whether a command list is currently open.
    pub fn has_pending_work(&self) -> bool {
        self.batcher.is_open()
    }

    /// Transient buffers held by the current batch.
    pub fn pending_transient_buffers(&self) -> usize {
        self.resources.transient_count()
    }

    // ─── buffers ───────────────────────────────────────────────────────────

    /// Allocates a zeroed root buffer (at least 4 bytes) for the next data
    /// tree; returns its index.
    pub fn add_root_buffer(&mut self, size: u64) -> GfxResult<usize> {
        let index = self.resources.add_root_buffer(size)?;
        log::debug!("added root buffer {index} ({} bytes)", size.max(crate::config::MIN_ROOT_BUFFER_SIZE));
        Ok(index)
    }

    /// Root buffer of tree `index`.
    pub fn root_buffer(&self, index: usize) -> GfxResult<DeviceAllocation> {
        self.resources.root_buffer(index)
    }

    /// Size of root buffer `index`.
    pub fn root_buffer_size(&self, index: usize) -> GfxResult<u64> {
        self.resources.root_buffer_size(index)
    }

    /// Number of root buffers.
    pub fn root_buffer_count(&self) -> usize {
        self.resources.root_count()
    }

    /// Allocates a host-visible device array for passing as an ndarray.
    pub fn allocate_ndarray(&self, size: u64) -> GfxResult<AllocationGuard<D>> {
        let params = AllocParams {
            size,
            host_write: true,
            host_read: true,
            usage: AllocUsage::Storage,
            ..AllocParams::default()
        };
        let alloc = self
            .device
            .allocate_memory(&params)
            .map_err(GfxError::allocation("ndarray", size))?;
        Ok(AllocationGuard::new(Arc::clone(&self.device), alloc))
    }

    /// Whether `alloc_id` was passed as an ndarray since the last
    /// synchronize.
    pub fn used_in_kernel(&self, alloc_id: AllocId) -> bool {
        self.resources.used_in_kernel(alloc_id)
    }

    /// Records a buffer-to-buffer copy into the open command list.
    pub fn buffer_copy(&mut self, dst: DevicePtr, src: DevicePtr, size: u64) -> GfxResult<()> {
        let list = self.batcher.ensure_open(&*self.device)?;
        list.buffer_copy(dst, src, size);
        list.memory_barrier();
        Ok(())
    }

    // ─── images ────────────────────────────────────────────────────────────

    /// Creates an image and tracks it in `params.initial_layout`.
    pub fn create_image(&mut self, params: &ImageParams) -> GfxResult<DeviceAllocation> {
        let image = self.device.create_image(params).map_err(|source| GfxError::AllocationFailed {
            what: "image",
            size: params.x as u64 * params.y as u64 * params.z as u64 * params.format.bytes_per_texel(),
            source,
        })?;
        self.images.track(image, params.initial_layout);
        Ok(image)
    }

    /// Starts tracking an image created elsewhere, currently in `layout`.
    pub fn track_image(&mut self, image: DeviceAllocation, layout: ImageLayout) {
        self.images.track(image, layout);
    }

    /// Stops tracking an image.
    pub fn untrack_image(&mut self, image: DeviceAllocation) {
        self.images.untrack(image);
    }

    /// Last layout the runtime put `image` in.
    pub fn image_layout(&self, image: DeviceAllocation) -> Option<ImageLayout> {
        self.images.layout_of(image)
    }

    /// Untracks and destroys an image.
    pub fn destroy_image(&mut self, image: DeviceAllocation) {
        self.images.untrack(image);
        self.device.destroy_image(image);
    }

    /// Records a transition of `image` to `layout`.
    ///
    /// ## Errors
    /// [`GfxError::UntrackedImage`] if the image's layout is unknown.
    pub fn transition_image(&mut self, image: DeviceAllocation, layout: ImageLayout) -> GfxResult<()> {
        if self.images.layout_of(image).is_none() {
            return Err(GfxError::UntrackedImage(image.alloc_id));
        }
        let list = self.batcher.ensure_open(&*self.device)?;
        self.images.transition(list, image, layout)
    }

    /// Records an image-to-image copy, transitioning `dst` to
    /// `TransferDst` and `src` to `TransferSrc` first.
    pub fn copy_image(
        &mut self,
        dst: DeviceAllocation,
        src: DeviceAllocation,
        params: &ImageCopyParams,
    ) -> GfxResult<()> {
        for image in [dst, src] {
            if self.images.layout_of(image).is_none() {
                return Err(GfxError::UntrackedImage(image.alloc_id));
            }
        }
        let list = self.batcher.ensure_open(&*self.device)?;
        self.images.transition(list, dst, ImageLayout::TransferDst)?;
        self.images.transition(list, src, ImageLayout::TransferSrc)?;
        list.copy_image(dst, ImageLayout::TransferDst, src, ImageLayout::TransferSrc, params);
        Ok(())
    }

    /// Runs `op` against the open command list, with every image in
    /// `image_refs` transitioned to its `initial_layout` beforehand and
    /// recorded as being in its `final_layout` afterwards.
    ///
    /// ## Errors
    /// [`GfxError::UntrackedImage`] if any referenced image is untracked;
    /// nothing is recorded in that case.
    pub fn enqueue_raw_op<F>(&mut self, op: F, image_refs: &[ComputeOpImageRef]) -> GfxResult<()>
    where
        F: FnOnce(&D, &mut D::CommandList),
    {
        if let Some(missing) = image_refs.iter().find(|r| self.images.layout_of(r.image).is_none()) {
            return Err(GfxError::UntrackedImage(missing.image.alloc_id));
        }
        let list = self.batcher.ensure_open(&*self.device)?;
        for r in image_refs {
            self.images.transition(list, r.image, r.initial_layout)?;
        }
        op(&*self.device, list);
        for r in image_refs {
            self.images.track(r.image, r.final_layout);
        }
        Ok(())
    }

    // ─── shutdown ──────────────────────────────────────────────────────────

    /// Synchronizes and writes the pipeline cache to disk.
    pub fn shutdown(mut self) -> GfxResult<()> {
        self.shut_down = true;
        self.synchronize()?;
        self.pipeline_cache.store();
        Ok(())
    }
}

impl<D: Device> Drop for GfxRuntime<D> {
    fn drop(&mut self) {
        if self.shut_down {
            return;
        }
        if let Err(e) = self.synchronize() {
            log::warn!("synchronize during runtime teardown failed: {e}");
        }
        self.pipeline_cache.store();
    }
}
