use gfx_runtime::prelude::*;
use gfx_runtime::rhi::WHOLE_SIZE;

mod common;
use common::*;

#[test]
fn root_buffers_are_zeroed_and_at_least_four_bytes() {
    let device = device();
    let mut rt = runtime(&device);

    assert_eq!(rt.add_root_buffer(0).unwrap(), 0);
    assert_eq!(rt.add_root_buffer(64).unwrap(), 1);

    assert_eq!(rt.root_buffer_count(), 2);
    assert_eq!(rt.root_buffer_size(0).unwrap(), 4);
    assert_eq!(rt.root_buffer_size(1).unwrap(), 64);
    assert_eq!(device.contents(rt.root_buffer(1).unwrap()).unwrap(), vec![0u8; 64]);
}

#[test]
fn unknown_root_buffer_is_an_error() {
    let device = device();
    let mut rt = runtime(&device);
    rt.add_root_buffer(16).unwrap();

    let err = rt.root_buffer(5).unwrap_err();
    assert!(matches!(err, GfxError::RootBufferOutOfRange { index: 5, count: 1 }));
}

#[test]
fn trees_added_after_compilation_bind_null() {
    let device = device();
    let mut rt = runtime(&device);
    rt.add_root_buffer(16).unwrap();

    // Compiled when no tree existed: Root(0) resolves to the null buffer.
    let handle = rt
        .register_kernel(params(
            "set",
            KernelContextAttributes::default(),
            vec![(task("set_root", 4).bind(BufferRef::Root(0), 0), "set_root")],
            0,
        ))
        .unwrap();

    rt.launch(handle, &mut LaunchContext::new()).unwrap();
    rt.synchronize().unwrap();

    assert_eq!(read_i32s(&device, rt.root_buffer(0).unwrap()), [0, 0, 0, 0]);
}

#[test]
fn global_temporaries_are_allocated_on_first_use_and_persist() {
    let device = device();
    let mut rt = runtime(&device);

    let handle = rt
        .register_kernel(params(
            "bump",
            KernelContextAttributes::default(),
            vec![(task("bump_tmps", 1).bind(BufferRef::GlobalTmps, 0), "bump_tmps")],
            0,
        ))
        .unwrap();
    let live = device.stats().live_allocations;

    rt.launch(handle, &mut LaunchContext::new()).unwrap();
    assert_eq!(device.stats().live_allocations, live + 1);

    rt.launch(handle, &mut LaunchContext::new()).unwrap();
    rt.synchronize().unwrap();
    assert_eq!(device.stats().live_allocations, live + 1);
}

#[test]
fn list_generation_buffer_is_cleared_before_list_gen_tasks() {
    let device = device();
    let mut rt = runtime(&device);
    rt.add_root_buffer(16).unwrap();

    let count = TaskAttributes::new("count_list_gen")
        .bind(BufferRef::ListGen, 0)
        .bind(BufferRef::Root(0), 1)
        .list_gen();
    let handle = rt
        .register_kernel(params("count", KernelContextAttributes::default(), vec![(count, "count_list_gen")], 1))
        .unwrap();
    let root = rt.root_buffer(0).unwrap();

    let fills = device.stats().buffer_fills;
    rt.launch(handle, &mut LaunchContext::new()).unwrap();
    rt.launch(handle, &mut LaunchContext::new()).unwrap();
    rt.synchronize().unwrap();

    // The second launch saw the buffer re-zeroed, not the 99 left by the first.
    assert_eq!(read_u32s(&device, root)[0], 0);
    // One zero fill when the buffer was created, one per list-gen task.
    assert_eq!(device.stats().buffer_fills, fills + 3);
}

#[test]
fn ordinary_tasks_see_list_generation_state() {
    let device = device();
    let mut rt = runtime(&device);
    rt.add_root_buffer(16).unwrap();

    let count = TaskAttributes::new("count_list_gen")
        .bind(BufferRef::ListGen, 0)
        .bind(BufferRef::Root(0), 1);
    let handle = rt
        .register_kernel(params("count", KernelContextAttributes::default(), vec![(count, "count_list_gen")], 1))
        .unwrap();

    rt.launch(handle, &mut LaunchContext::new()).unwrap();
    rt.launch(handle, &mut LaunchContext::new()).unwrap();
    rt.synchronize().unwrap();

    assert_eq!(read_u32s(&device, rt.root_buffer(0).unwrap())[0], 99);
}

#[test]
fn buffer_copy_is_ordered_with_dispatches() {
    let device = device();
    let mut rt = runtime(&device);
    rt.add_root_buffer(16).unwrap();
    rt.add_root_buffer(16).unwrap();
    let (src, dst) = (rt.root_buffer(0).unwrap(), rt.root_buffer(1).unwrap());

    let set = rt.register_kernel(root_kernel("set", "set_root", 4)).unwrap();
    rt.launch(set, &mut LaunchContext::new()).unwrap();
    rt.buffer_copy(dst.ptr(0), src.ptr(0), 16).unwrap();
    rt.synchronize().unwrap();

    assert_eq!(read_i32s(&device, dst), [0, 1, 2, 3]);
}

#[test]
fn whole_size_copy_moves_the_rest_of_the_source() {
    let device = device();
    let mut rt = runtime(&device);
    rt.add_root_buffer(16).unwrap();
    rt.add_root_buffer(16).unwrap();
    let (src, dst) = (rt.root_buffer(0).unwrap(), rt.root_buffer(1).unwrap());

    let set = rt.register_kernel(root_kernel("set", "set_root", 4)).unwrap();
    rt.launch(set, &mut LaunchContext::new()).unwrap();
    rt.buffer_copy(dst.ptr(0), src.ptr(8), WHOLE_SIZE).unwrap();
    rt.synchronize().unwrap();

    assert_eq!(read_i32s(&device, dst), [2, 3, 0, 0]);
}

#[test]
fn out_of_range_copy_fails_the_submission() {
    let device = device();
    let mut rt = runtime(&device);
    rt.add_root_buffer(16).unwrap();
    rt.add_root_buffer(16).unwrap();
    let (src, dst) = (rt.root_buffer(0).unwrap(), rt.root_buffer(1).unwrap());

    rt.buffer_copy(dst.ptr(8), src.ptr(0), 16).unwrap();
    assert!(matches!(rt.synchronize(), Err(GfxError::Submission(_))));
}

#[test]
fn ndarray_guard_frees_on_drop() {
    let device = device();
    let rt = runtime(&device);

    let array = rt.allocate_ndarray(64).unwrap();
    let alloc = array.alloc();
    assert!(device.is_live(alloc));

    drop(array);
    assert!(!device.is_live(alloc));
}

#[test]
fn raw_ops_record_into_the_open_list() {
    let device = device();
    let mut rt = runtime(&device);
    rt.add_root_buffer(8).unwrap();
    let root = rt.root_buffer(0).unwrap();

    rt.enqueue_raw_op(
        |_device, list| {
            use gfx_runtime::rhi::CommandList;
            list.buffer_fill(root.ptr(0), WHOLE_SIZE, 0x0101_0101);
        },
        &[],
    )
    .unwrap();
    assert!(rt.has_pending_work());

    rt.synchronize().unwrap();
    assert_eq!(device.contents(root).unwrap(), vec![1u8; 8]);
}
