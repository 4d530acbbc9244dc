use std::fs;
use std::sync::Arc;

use gfx_runtime::config::PIPELINE_CACHE_FILE_NAME;
use gfx_runtime::prelude::*;

mod common;
use common::*;

fn cached_runtime(device: &Arc<HostDevice>, dir: &std::path::Path) -> GfxRuntime<HostDevice> {
    init_logging();
    GfxRuntime::new(Arc::clone(device), config().with_state_dir(dir)).unwrap()
}

#[test]
fn shutdown_persists_cache_and_next_run_hits_it() {
    let dir = tempfile::tempdir().unwrap();

    let first = device();
    let mut rt = cached_runtime(&first, dir.path());
    add_base_kernel(&mut rt, 4, ArrayAccess::WRITE);
    assert_eq!(first.stats().pipeline_cache_hits, 0);
    rt.shutdown().unwrap();

    let stored = fs::read_to_string(dir.path().join(PIPELINE_CACHE_FILE_NAME)).unwrap();
    assert!(stored.lines().any(|l| l == "add_base"));

    let second = device();
    let mut rt = cached_runtime(&second, dir.path());
    add_base_kernel(&mut rt, 4, ArrayAccess::WRITE);
    assert_eq!(second.stats().pipeline_cache_hits, 1);
}

#[test]
fn dropping_the_runtime_also_persists_cache() {
    let dir = tempfile::tempdir().unwrap();
    let device = device();
    {
        let mut rt = cached_runtime(&device, dir.path());
        echo_kernel(&mut rt, PrimitiveType::I32);
    }
    assert!(dir.path().join(PIPELINE_CACHE_FILE_NAME).exists());
}

#[test]
fn missing_state_directory_is_created_on_store() {
    let dir = tempfile::tempdir().unwrap();
    let nested = dir.path().join("a").join("b");
    let device = device();

    let mut rt = cached_runtime(&device, &nested);
    echo_kernel(&mut rt, PrimitiveType::I32);
    rt.shutdown().unwrap();

    assert!(nested.join(PIPELINE_CACHE_FILE_NAME).exists());
}

#[test]
fn corrupt_cache_file_degrades_to_uncached_pipelines() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join(PIPELINE_CACHE_FILE_NAME);
    fs::write(&path, [0xff, 0xfe, 0x00]).unwrap();

    let device = device();
    let mut rt = cached_runtime(&device, dir.path());
    let handle = echo_kernel(&mut rt, PrimitiveType::I32);

    let mut ctx = LaunchContext::new();
    ctx.set_arg(0, 3i32);
    rt.launch(handle, &mut ctx).unwrap();
    assert_eq!(ctx.ret_scalar(0, 0), Some(Scalar::I32(3)));
    rt.shutdown().unwrap();

    assert_eq!(device.stats().pipeline_cache_hits, 0);
    // Without a usable cache nothing is written back.
    assert_eq!(fs::read(&path).unwrap(), vec![0xff, 0xfe, 0x00]);
}

#[test]
fn disabled_cache_writes_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let device = device();

    let mut rt = runtime(&device);
    assert_eq!(rt.config().pipeline_cache_path(), None);
    echo_kernel(&mut rt, PrimitiveType::I32);
    rt.shutdown().unwrap();

    assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 0);
}
