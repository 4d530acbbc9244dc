//! # Resource Manager
//!
//! Device memory the runtime owns on behalf of kernels.
//!
//! ## Persistent buffers
//! * Root buffers, one per data tree, appended by
//!   [`add_root_buffer`](ResourceManager::add_root_buffer). Sizes are kept in
//!   a side table keyed by allocation ID.
//! * Global temporaries (1 MiB) and list-generation scratch (32 MiB),
//!   allocated the first time a task binds them.
//!
//! Persistent buffers are zero-filled with a dedicated synchronous command
//! list when allocated, are never resized, and live as long as the runtime.
//!
//! ## Transient buffers
//! Per-launch args, returns and staging buffers are appended to a batch-owned
//! list of [`AllocationGuard`]s and released together when the batch they
//! were recorded into is known to have completed.
//!
//! ## Buffer resolution
//! [`bind_buffers`](ResourceManager::bind_buffers) is the one place a task's
//! logical [`BufferRef`]s become concrete allocations.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use crate::config::{GLOBAL_TMPS_BUFFER_SIZE, LIST_GEN_BUFFER_SIZE, MIN_ROOT_BUFFER_SIZE};
use crate::error::{GfxError, GfxResult};
use crate::rhi::{
    AllocId, AllocParams, AllocUsage, AllocationGuard, CommandList, Device, DeviceAllocation,
    ShaderResourceSet, Stream, WHOLE_SIZE,
};
use crate::runtime::kernel::{BufferRef, TaskAttributes, TaskKind};

/// Per-launch buffers a task may bind.
#[derive(Debug, Default)]
pub(crate) struct LaunchBuffers {
    pub(crate) args: Option<DeviceAllocation>,
    pub(crate) rets: Option<DeviceAllocation>,
    pub(crate) arrays: HashMap<usize, DeviceAllocation>,
}

/// Buffers owned by the runtime.
pub(crate) struct ResourceManager<D: Device> {
    device: Arc<D>,
    root_buffers: Vec<AllocationGuard<D>>,
    root_sizes: HashMap<AllocId, u64>,
    global_tmps: Option<AllocationGuard<D>>,
    list_gen: Option<AllocationGuard<D>>,
    transients: Vec<AllocationGuard<D>>,
    ndarrays_in_use: HashSet<AllocId>,
}

impl<D: Device> ResourceManager<D> {
    pub(crate) fn new(device: Arc<D>) -> Self {
        Self {
            device,
            root_buffers: Vec::new(),
            root_sizes: HashMap::new(),
            global_tmps: None,
            list_gen: None,
            transients: Vec::new(),
            ndarrays_in_use: HashSet::new(),
        }
    }

    fn allocate_zeroed(&self, what: &'static str, size: u64) -> GfxResult<AllocationGuard<D>> {
        let params = AllocParams {
            size,
            usage: AllocUsage::Storage,
            ..AllocParams::default()
        };
        let alloc = self
            .device
            .allocate_memory(&params)
            .map_err(GfxError::allocation(what, size))?;
        let guard = AllocationGuard::new(Arc::clone(&self.device), alloc);

        let stream = self.device.compute_stream();
        let mut list = stream.new_command_list().map_err(GfxError::Submission)?;
        list.buffer_fill(alloc.ptr(0), WHOLE_SIZE, 0);
        stream.submit_synced(list, &[]).map_err(GfxError::Submission)?;

        log::trace!("allocated {what} ({size} bytes) as {}", alloc.alloc_id);
        Ok(guard)
    }

    // ─── root buffers ──────────────────────────────────────────────────────

    /// Allocates a zeroed root buffer of at least 4 bytes; returns its index.
    pub(crate) fn add_root_buffer(&mut self, size: u64) -> GfxResult<usize> {
        let size = size.max(MIN_ROOT_BUFFER_SIZE);
        let guard = self.allocate_zeroed("root buffer", size)?;
        self.root_sizes.insert(guard.alloc().alloc_id, size);
        self.root_buffers.push(guard);
        Ok(self.root_buffers.len() - 1)
    }

    /// Root buffer `index`.
    pub(crate) fn root_buffer(&self, index: usize) -> GfxResult<DeviceAllocation> {
        self.root_buffers
            .get(index)
            .map(AllocationGuard::alloc)
            .ok_or(GfxError::RootBufferOutOfRange {
                index,
                count: self.root_buffers.len(),
            })
    }

    /// Size of root buffer `index`.
    pub(crate) fn root_buffer_size(&self, index: usize) -> GfxResult<u64> {
        let alloc = self.root_buffer(index)?;
        Ok(self.root_sizes.get(&alloc.alloc_id).copied().unwrap_or(0))
    }

    /// Number of root buffers.
    pub(crate) fn root_count(&self) -> usize {
        self.root_buffers.len()
    }

    // ─── scratch buffers ───────────────────────────────────────────────────

    /// Global temporaries buffer, allocated on first use.
    pub(crate) fn global_tmps(&mut self) -> GfxResult<DeviceAllocation> {
        if self.global_tmps.is_none() {
            self.global_tmps = Some(self.allocate_zeroed("global temporaries buffer", GLOBAL_TMPS_BUFFER_SIZE)?);
        }
        Ok(self.global_tmps.as_ref().map_or(DeviceAllocation::NULL, AllocationGuard::alloc))
    }

    /// List-generation buffer, allocated on first use.
    pub(crate) fn list_gen(&mut self) -> GfxResult<DeviceAllocation> {
        if self.list_gen.is_none() {
            self.list_gen = Some(self.allocate_zeroed("list generation buffer", LIST_GEN_BUFFER_SIZE)?);
        }
        Ok(self.list_gen.as_ref().map_or(DeviceAllocation::NULL, AllocationGuard::alloc))
    }

    // ─── transient buffers ─────────────────────────────────────────────────

    /// Allocates a buffer owned by the current batch.
    pub(crate) fn allocate_transient(&mut self, what: &'static str, params: AllocParams) -> GfxResult<DeviceAllocation> {
        let alloc = self
            .device
            .allocate_memory(&params)
            .map_err(GfxError::allocation(what, params.size))?;
        self.transients.push(AllocationGuard::new(Arc::clone(&self.device), alloc));
        Ok(alloc)
    }

    /// Releases every transient buffer; returns how many were freed.
    pub(crate) fn release_transients(&mut self) -> usize {
        let released = self.transients.len();
        self.transients.clear();
        released
    }

    /// Number of transient buffers held.
    pub(crate) fn transient_count(&self) -> usize {
        self.transients.len()
    }

    // ─── ndarrays ──────────────────────────────────────────────────────────

    pub(crate) fn mark_ndarray_in_use(&mut self, alloc: DeviceAllocation) {
        self.ndarrays_in_use.insert(alloc.alloc_id);
    }

    pub(crate) fn used_in_kernel(&self, alloc_id: AllocId) -> bool {
        self.ndarrays_in_use.contains(&alloc_id)
    }

    pub(crate) fn clear_ndarrays_in_use(&mut self) {
        self.ndarrays_in_use.clear();
    }

    // ─── resolution ────────────────────────────────────────────────────────

    /// Resolves `task`'s buffer bindings.
    ///
    /// Returns the resource set and the list-gen buffers to zero before the
    /// dispatch (non-empty only for list-generation tasks). Args and returns
    /// bind the null allocation when the launch has none; root buffers of
    /// trees added after the kernel was compiled also bind null.
    ///
    /// ## Errors
    /// * [`GfxError::MissingArrayBinding`] for an `ExtArr` with no array.
    /// * [`GfxError::RootBufferOutOfRange`] for a known tree without a buffer.
    /// * Allocation errors from lazily created scratch buffers.
    pub(crate) fn bind_buffers(
        &mut self,
        task: &TaskAttributes,
        num_snode_trees: usize,
        launch: &LaunchBuffers,
    ) -> GfxResult<(ShaderResourceSet, Vec<DeviceAllocation>)> {
        let mut set = self.device.create_resource_set();
        let mut fills = Vec::new();

        for bind in &task.buffer_binds {
            match bind.buffer {
                BufferRef::ExtArr(arg) => {
                    let alloc = launch.arrays.get(&arg).copied().ok_or_else(|| GfxError::MissingArrayBinding {
                        task: task.name.clone(),
                        arg,
                    })?;
                    set.rw_buffer(bind.binding, alloc);
                }
                BufferRef::Args => {
                    set.buffer(bind.binding, launch.args.unwrap_or(DeviceAllocation::NULL));
                }
                BufferRef::Rets => {
                    set.rw_buffer(bind.binding, launch.rets.unwrap_or(DeviceAllocation::NULL));
                }
                BufferRef::Root(tree) => {
                    let alloc = if tree < num_snode_trees {
                        self.root_buffer(tree)?
                    } else {
                        DeviceAllocation::NULL
                    };
                    set.rw_buffer(bind.binding, alloc);
                }
                BufferRef::GlobalTmps => {
                    let alloc = self.global_tmps()?;
                    set.rw_buffer(bind.binding, alloc);
                }
                BufferRef::ListGen => {
                    let alloc = self.list_gen()?;
                    set.rw_buffer(bind.binding, alloc);
                    if task.task_type == TaskKind::ListGen {
                        fills.push(alloc);
                    }
                }
            }
        }

        Ok((set, fills))
    }
}
