//! # Command Batcher
//!
//! Owns the command list launches are recorded into and decides when it is
//! submitted.
//!
//! Launches append to the same open list until one of:
//! * an explicit [`flush`](CommandBatcher::flush) or synchronize,
//! * a launch that must bring results back to the host,
//! * the list has stayed open longer than the idle threshold when a launch
//!   finishes ([`flush_if_stale`](CommandBatcher::flush_if_stale)).
//!
//! Every recorded dispatch is followed by a memory barrier, so commands take
//! effect in the order they were recorded.

use std::time::{Duration, Instant};

use crate::error::{GfxError, GfxResult};
use crate::rhi::{CommandList, Device, DeviceAllocation, ShaderResourceSet, Stream, WHOLE_SIZE};
use crate::runtime::kernel::TaskAttributes;

/// Open command list plus the time it was opened.
pub(crate) struct CommandBatcher<D: Device> {
    current: Option<D::CommandList>,
    opened_at: Instant,
    idle_threshold: Duration,
}

impl<D: Device> CommandBatcher<D> {
    pub(crate) fn new(idle_threshold: Duration) -> Self {
        Self {
            current: None,
            opened_at: Instant::now(),
            idle_threshold,
        }
    }

    /// Whether a list is open.
    pub(crate) fn is_open(&self) -> bool {
        self.current.is_some()
    }

    /// The open list, opening one if needed.
    pub(crate) fn ensure_open(&mut self, device: &D) -> GfxResult<&mut D::CommandList> {
        let list = match self.current.take() {
            Some(list) => list,
            None => {
                self.opened_at = Instant::now();
                device
                    .compute_stream()
                    .new_command_list()
                    .map_err(GfxError::Submission)?
            }
        };
        Ok(self.current.insert(list))
    }

    /// Appends `list` to the open list, or makes it the open list when none
    /// is open.
    pub(crate) fn append(&mut self, device: &D, list: D::CommandList) -> GfxResult<()> {
        self.ensure_open(device)?.append(list);
        Ok(())
    }

    /// Submits the open list, if any.
    pub(crate) fn submit(&mut self, device: &D) -> GfxResult<Option<D::Semaphore>> {
        match self.current.take() {
            Some(list) => device
                .compute_stream()
                .submit(list, &[])
                .map(Some)
                .map_err(GfxError::Submission),
            None => Ok(None),
        }
    }

    /// Submits the open list, if any, and waits for it.
    pub(crate) fn submit_synced(&mut self, device: &D) -> GfxResult<()> {
        if let Some(list) = self.current.take() {
            device
                .compute_stream()
                .submit_synced(list, &[])
                .map_err(GfxError::Submission)?;
        }
        Ok(())
    }

    /// Submits the open list, or a barrier-only list when nothing is open.
    pub(crate) fn flush(&mut self, device: &D) -> GfxResult<D::Semaphore> {
        let list = match self.current.take() {
            Some(list) => list,
            None => {
                let mut list = device
                    .compute_stream()
                    .new_command_list()
                    .map_err(GfxError::Submission)?;
                list.memory_barrier();
                list
            }
        };
        log::debug!("submitting command batch");
        device
            .compute_stream()
            .submit(list, &[])
            .map_err(GfxError::Submission)
    }

    /// Whether the open list has been open longer than the idle threshold.
    pub(crate) fn is_stale(&self) -> bool {
        self.current.is_some() && self.opened_at.elapsed() >= self.idle_threshold
    }

    /// Submits the open list when it is stale. Returns whether it did.
    pub(crate) fn flush_if_stale(&mut self, device: &D) -> GfxResult<bool> {
        if !self.is_stale() {
            return Ok(false);
        }
        log::trace!("command list idle for {:?}; submitting", self.opened_at.elapsed());
        self.submit(device)?;
        Ok(true)
    }

    /// Records one task into `list`: list-gen zero fills, pipeline and
    /// resource binding, the dispatch (inside a profiler scope when
    /// `profile` is set) and a trailing memory barrier.
    ///
    /// ## Errors
    /// * [`GfxError::ResourceBinding`] if the device rejects `resources`.
    /// * [`GfxError::Dispatch`] if the dispatch cannot be recorded.
    pub(crate) fn record_task(
        list: &mut D::CommandList,
        task: &TaskAttributes,
        pipeline: &D::Pipeline,
        resources: &ShaderResourceSet,
        list_gen_fills: &[DeviceAllocation],
        profile: bool,
    ) -> GfxResult<()> {
        for &buffer in list_gen_fills {
            list.buffer_fill(buffer.ptr(0), WHOLE_SIZE, 0);
            list.buffer_barrier(buffer);
        }

        list.bind_pipeline(pipeline);
        list.bind_shader_resources(resources, 0)
            .map_err(|source| GfxError::ResourceBinding {
                task: task.name.clone(),
                source,
            })?;

        if profile {
            list.begin_profiler_scope(&task.name);
        }
        let dispatched = list.dispatch(task.group_count(), 1, 1);
        if profile {
            list.end_profiler_scope();
        }
        dispatched.map_err(|source| GfxError::Dispatch {
            task: task.name.clone(),
            source,
        })?;

        list.memory_barrier();
        Ok(())
    }
}
