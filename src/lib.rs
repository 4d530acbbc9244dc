//! # gfx-runtime
//!
//! Batched kernel execution runtime over a backend-agnostic device interface.
//!
//! Kernels arrive already compiled: an ordered list of tasks, one device
//! program per task, and a schema describing the kernel's arguments and
//! return values. The runtime turns programs into pipelines, marshals host
//! arguments into device memory, records dispatches into long-lived command
//! lists and brings results back to the host when asked.
//!
//! ## Design Goals
//! - Amortize submission cost by batching many small dispatches
//! - Track device-side state (scratch buffers, image layouts) without a
//!   general dependency tracker
//! - Per-kernel argument layouts, marshaled in one map per launch
//! - Any device that implements [`rhi::Device`]
//!
//! ## Backends
//! - [`rhi::host::HostDevice`]: CPU reference device, always available
//! - `rhi::wgpu_device::WgpuDevice`: GPU device on `wgpu` (`gpu` feature)

#![forbid(unsafe_op_in_unsafe_fn)]
#![warn(missing_docs)]

pub mod config;
pub mod error;
pub mod profiling;
pub mod rhi;
pub mod runtime;
pub mod types;

// ─────────────────────────────────────────────────────────────────────────────
// Re-exports (Public API)
// ─────────────────────────────────────────────────────────────────────────────

pub use config::RuntimeConfig;

pub use error::{
    GfxError,
    GfxResult,
};

pub use runtime::{
    ComputeOpImageRef,
    GfxRuntime,
};

pub use runtime::kernel::{
    ArgAttributes,
    ArrayAccess,
    BufferRef,
    KernelAttributes,
    KernelContextAttributes,
    KernelHandle,
    RegisterParams,
    RetAttributes,
    TaskAttributes,
    TaskKind,
};

pub use runtime::launch::{
    ArgValue,
    DevAllocType,
    LaunchContext,
};

pub use types::{
    PrimitiveType,
    Scalar,
};

// ─────────────────────────────────────────────────────────────────────────────
// Prelude
// ─────────────────────────────────────────────────────────────────────────────

/// Commonly used runtime types.
///
/// Import with:
/// ```rust
/// use gfx_runtime::prelude::*;
/// ```
pub mod prelude {
    pub use crate::{
        ArrayAccess,
        BufferRef,
        GfxError,
        GfxResult,
        GfxRuntime,
        KernelAttributes,
        KernelContextAttributes,
        KernelHandle,
        LaunchContext,
        PrimitiveType,
        RegisterParams,
        RuntimeConfig,
        Scalar,
        TaskAttributes,
    };

    pub use crate::rhi::host::HostDevice;
    pub use crate::rhi::{Device, DeviceAllocation, ImageLayout, ImageParams};
}
