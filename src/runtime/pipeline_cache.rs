//! On-disk pipeline cache.
//!
//! Loaded once when the runtime starts and written back once when it shuts
//! down. The blob is opaque: the device decides whether it is usable. Every
//! failure here degrades to uncached pipeline creation and is only logged.

use std::fs;
use std::io::ErrorKind;
use std::path::PathBuf;

use crate::rhi::{Device, PipelineCache};

/// Device pipeline cache plus the file it persists to.
pub(crate) struct PipelineCacheManager<D: Device> {
    path: Option<PathBuf>,
    cache: Option<D::PipelineCache>,
}

impl<D: Device> PipelineCacheManager<D> {
    /// Reads `path` if it exists and seeds a device cache with it.
    ///
    /// With no path, no cache is created.
    pub(crate) fn load(device: &D, path: Option<PathBuf>) -> Self {
        let Some(path) = path else {
            log::trace!("pipeline cache disabled");
            return Self { path: None, cache: None };
        };

        let data = match fs::read(&path) {
            Ok(data) => {
                log::trace!("loaded pipeline cache {} ({} bytes)", path.display(), data.len());
                Some(data)
            }
            Err(e) if e.kind() == ErrorKind::NotFound => {
                log::trace!("no pipeline cache at {}", path.display());
                None
            }
            Err(e) => {
                log::warn!("cannot read pipeline cache {}: {e}", path.display());
                None
            }
        };

        let cache = match device.create_pipeline_cache(data.as_deref()) {
            Ok(cache) => Some(cache),
            Err(e) => {
                log::warn!("pipeline cache unusable, compiling without one: {e}");
                None
            }
        };

        Self { path: Some(path), cache }
    }

    /// The device cache, if one exists.
    pub(crate) fn cache(&self) -> Option<&D::PipelineCache> {
        self.cache.as_ref()
    }

    /// Writes the cache contents back to disk, creating the directory if
    /// needed. Empty caches are not written.
    pub(crate) fn store(&self) {
        let (Some(path), Some(cache)) = (&self.path, &self.cache) else {
            return;
        };
        let data = cache.data();
        if data.is_empty() {
            return;
        }
        if let Some(dir) = path.parent() {
            if let Err(e) = fs::create_dir_all(dir) {
                log::warn!("cannot create {}: {e}", dir.display());
                return;
            }
        }
        match fs::write(path, &data) {
            Ok(()) => log::debug!("stored pipeline cache {} ({} bytes)", path.display(), data.len()),
            Err(e) => log::warn!("cannot write pipeline cache {}: {e}", path.display()),
        }
    }
}
