//! Runtime configuration.
//!
//! [`RuntimeConfig`] is passed to [`GfxRuntime::new`] and fixes, for the
//! lifetime of the runtime, where persistent state lives and how long an
//! open command list may idle before it is submitted.
//!
//! Buffer sizes the device programs are compiled against are constants, not
//! configuration.
//!
//! [`GfxRuntime::new`]: crate::runtime::GfxRuntime::new

use std::path::{Path, PathBuf};
use std::time::Duration;

/// Size of the global temporaries buffer (1 MiB).
pub const GLOBAL_TMPS_BUFFER_SIZE: u64 = 1 << 20;

/// Size of the list-generation buffer (32 MiB).
pub const LIST_GEN_BUFFER_SIZE: u64 = 32 << 20;

/// Smallest staging buffer allocated for a host-backed array argument.
pub const MIN_EXT_ARRAY_ALLOC_SIZE: u64 = 32;

/// Smallest root buffer; empty trees still get a bindable allocation.
pub const MIN_ROOT_BUFFER_SIZE: u64 = 4;

/// File name of the persisted pipeline cache inside the state directory.
pub const PIPELINE_CACHE_FILE_NAME: &str = "rhi_cache.bin";

/// Default idle time after which an open command list is submitted.
pub const DEFAULT_IDLE_FLUSH_THRESHOLD: Duration = Duration::from_micros(2000);

/// Configuration of a [`GfxRuntime`](crate::runtime::GfxRuntime).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeConfig {
    /// Directory holding persistent runtime state. `None` disables the
    /// on-disk pipeline cache.
    pub state_dir: Option<PathBuf>,

    /// An open command list older than this is submitted at the end of the
    /// next launch.
    pub idle_flush_threshold: Duration,
}

impl Default for RuntimeConfig {
    /// State under the user cache directory (`<cache>/gfx-runtime`), 2 ms idle
    /// threshold.
    fn default() -> Self {
        Self {
            state_dir: dirs::cache_dir().map(|d| d.join("gfx-runtime")),
            idle_flush_threshold: DEFAULT_IDLE_FLUSH_THRESHOLD,
        }
    }
}

impl RuntimeConfig {
    /// Keeps persistent state in `dir`.
    pub fn with_state_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.state_dir = Some(dir.into());
        self
    }

    /// Disables the on-disk pipeline cache.
    pub fn without_pipeline_cache(mut self) -> Self {
        self.state_dir = None;
        self
    }

    /// Sets the idle flush threshold.
    pub fn with_idle_flush_threshold(mut self, threshold: Duration) -> Self {
        self.idle_flush_threshold = threshold;
        self
    }

    /// Path of the pipeline cache file, when caching is enabled.
    pub fn pipeline_cache_path(&self) -> Option<PathBuf> {
        self.state_dir.as_deref().map(|d: &Path| d.join(PIPELINE_CACHE_FILE_NAME))
    }
}
