//! Error types for kernel registration, launch and runtime bookkeeping.
//!
//! Every fallible device call returns an [`RhiError`]. The runtime never lets
//! one escape bare: it is wrapped at the point of failure into a [`GfxError`]
//! variant naming the operation that failed, so a log line alone says which
//! kernel, task or buffer was involved.
//!
//! ## Categories
//! * **Fatal**: the device could not do what was asked (allocation, binding,
//!   dispatch, submission, unsupported type) or the runtime was asked to use
//!   state it never established (untracked image, unknown root buffer).
//! * **Caller input**: the launch request does not match the kernel it names
//!   (unknown handle, missing or mistyped argument).
//!
//! Degraded conditions (no pipeline cache, profiler query pool exhausted) are
//! logged and never surface as errors.
//!
//! ## Display vs. Debug
//! * `Display` is a short, log-friendly sentence.
//! * `Debug` (derived) keeps the full structure and source chain.

use crate::rhi::{AllocId, RhiError};
use crate::runtime::kernel::KernelHandle;
use crate::types::PrimitiveType;

/// Result alias used across the runtime.
pub type GfxResult<T> = Result<T, GfxError>;

/// Errors surfaced by [`GfxRuntime`](crate::runtime::GfxRuntime).
#[derive(Debug, thiserror::Error)]
pub enum GfxError {
    /// A required buffer or image could not be allocated.
    #[error("failed to allocate {what} ({size} bytes)")]
    AllocationFailed {
        /// Which buffer was being allocated.
        what: &'static str,
        /// Requested size in bytes.
        size: u64,
        /// Device failure.
        #[source]
        source: RhiError,
    },

    /// Building the pipeline for one task of a kernel failed.
    #[error("failed to create pipeline for task `{task}` of kernel `{kernel}`")]
    PipelineCreation {
        /// Kernel being registered.
        kernel: String,
        /// Task whose program failed to compile.
        task: String,
        /// Device failure.
        #[source]
        source: RhiError,
    },

    /// The number of task programs does not match the kernel's task list.
    #[error("kernel `{kernel}` declares {tasks} tasks but {programs} programs were supplied")]
    TaskProgramMismatch {
        /// Kernel being registered.
        kernel: String,
        /// Declared task count.
        tasks: usize,
        /// Supplied program count.
        programs: usize,
    },

    /// Binding a task's resource set failed.
    #[error("failed to bind resources for task `{task}`")]
    ResourceBinding {
        /// Task being recorded.
        task: String,
        /// Device failure.
        #[source]
        source: RhiError,
    },

    /// Recording a task's dispatch failed.
    #[error("failed to dispatch task `{task}`")]
    Dispatch {
        /// Task being recorded.
        task: String,
        /// Device failure.
        #[source]
        source: RhiError,
    },

    /// Submitting or waiting on a command list failed.
    #[error("command submission failed")]
    Submission(#[source] RhiError),

    /// A device operation outside the categories above failed.
    #[error("device operation `{op}` failed")]
    Device {
        /// Operation name.
        op: &'static str,
        /// Device failure.
        #[source]
        source: RhiError,
    },

    /// The device cannot carry a value of this primitive type.
    #[error("type {ty} not supported on device `{device}` ({context})")]
    UnsupportedType {
        /// Offending type.
        ty: PrimitiveType,
        /// Device name.
        device: String,
        /// Where the type was encountered.
        context: &'static str,
    },

    /// An image was bound, transitioned or copied without a known layout.
    #[error("image {0} is not tracked; create or track it before use")]
    UntrackedImage(AllocId),

    /// A root buffer index outside the registered range.
    #[error("root buffer {index} out of range ({count} registered)")]
    RootBufferOutOfRange {
        /// Requested index.
        index: usize,
        /// Number of root buffers.
        count: usize,
    },

    /// A kernel handle that was never issued by this runtime.
    #[error("unknown kernel handle {0:?}")]
    UnknownKernel(KernelHandle),

    /// The launch context has no value for a declared argument.
    #[error("argument {index} was not set")]
    ArgumentMissing {
        /// Argument index.
        index: usize,
    },

    /// The launch context value does not fit the declared argument.
    #[error("argument {index}: expected {expected}, found {found}")]
    ArgumentMismatch {
        /// Argument index.
        index: usize,
        /// Declared kind.
        expected: String,
        /// Supplied kind.
        found: String,
    },

    /// A task binds an external array whose argument is not array-backed.
    #[error("task `{task}` binds external array {arg} but no array was provided")]
    MissingArrayBinding {
        /// Task being recorded.
        task: String,
        /// Argument index.
        arg: usize,
    },

    /// A task binds a texture whose argument is not a texture.
    #[error("task `{task}` binds texture argument {arg} but no texture was provided")]
    MissingTexture {
        /// Task being recorded.
        task: String,
        /// Argument index.
        arg: usize,
    },
}

impl GfxError {
    /// Wraps a device failure of a named operation.
    pub(crate) fn device(op: &'static str) -> impl FnOnce(RhiError) -> GfxError {
        move |source| GfxError::Device { op, source }
    }

    /// Wraps an allocation failure.
    pub(crate) fn allocation(what: &'static str, size: u64) -> impl FnOnce(RhiError) -> GfxError {
        move |source| GfxError::AllocationFailed { what, size, source }
    }
}
