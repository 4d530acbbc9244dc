//! Kernel execution profiling.
//!
//! When a profiler is attached to the runtime, every task dispatch is wrapped
//! in a device profiler scope. Elapsed times are collected from the device
//! on [`synchronize`](crate::runtime::GfxRuntime::synchronize) (or earlier,
//! when the device's timestamp query pool would otherwise overflow) and
//! handed to [`KernelProfiler::insert_record`].
//!
//! [`TraceProfiler`] keeps the records, summarizes them per task and writes
//! a **Chrome Trace Event JSON** file that can be inspected using:
//!
//! - `chrome://tracing`
//! - <https://ui.perfetto.dev>
//!
//! ## Usage
//!
//! ```no_run
//! use std::sync::Arc;
//! use gfx_runtime::prelude::*;
//! use gfx_runtime::profiling::TraceProfiler;
//!
//! let profiler = TraceProfiler::new();
//! let mut runtime = GfxRuntime::new(Arc::new(HostDevice::new()), RuntimeConfig::default())
//!     .unwrap()
//!     .with_profiler(Box::new(profiler.clone()));
//!
//! // register and launch kernels ...
//! runtime.synchronize().unwrap();
//!
//! for stats in profiler.statistics() {
//!     println!("{}: {} runs, {:.3} ms", stats.name, stats.count, stats.total_ms);
//! }
//! profiler.write_chrome_trace("profile/trace.json").unwrap();
//! ```

pub mod profiler;

pub use profiler::{KernelProfiler, KernelRecord, KernelStats, TraceProfiler};
