use gfx_runtime::prelude::*;

mod common;
use common::*;

#[test]
fn write_only_array_is_not_uploaded() {
    let device = device();
    let mut rt = runtime(&device);

    let ctx_attribs = KernelContextAttributes::builder()
        .array_arg(PrimitiveType::I32, ArrayAccess::WRITE)
        .build();
    let write = task("write_even", 8)
        .bind(BufferRef::Args, 0)
        .bind(BufferRef::ExtArr(0), 1);
    let handle = rt
        .register_kernel(params("write_even", ctx_attribs, vec![(write, "write_even")], 0))
        .unwrap();

    let mut data = [-1i32; 8];
    let before = device.stats();
    {
        let mut ctx = LaunchContext::new();
        ctx.set_host_array_of(0, &mut data);
        rt.launch(handle, &mut ctx).unwrap();
    }
    let after = device.stats();

    // Odd elements were never written on the device and never uploaded.
    assert_eq!(data, [7, 0, 7, 0, 7, 0, 7, 0]);
    assert_eq!(after.maps, before.maps + 1, "only the args buffer is mapped");
    assert_eq!(after.readback_batches, before.readback_batches + 1);
}

#[test]
fn read_only_array_is_never_read_back() {
    let device = device();
    let mut rt = runtime(&device);

    let ctx_attribs = KernelContextAttributes::builder()
        .array_arg(PrimitiveType::I32, ArrayAccess::READ)
        .ret(PrimitiveType::I32)
        .build();
    let sum = task("sum_and_clobber", 1)
        .bind(BufferRef::Args, 0)
        .bind(BufferRef::ExtArr(0), 1)
        .bind(BufferRef::Rets, 2);
    let handle = rt
        .register_kernel(params("sum", ctx_attribs, vec![(sum, "sum_and_clobber")], 0))
        .unwrap();

    let mut data = [1i32, 2, 3, 4];
    let before = device.stats();
    let ret = {
        let mut ctx = LaunchContext::new();
        ctx.set_host_array_of(0, &mut data);
        rt.launch(handle, &mut ctx).unwrap();
        ctx.ret_scalar(0, 0)
    };
    let after = device.stats();

    assert_eq!(ret, Some(Scalar::I32(10)));
    assert_eq!(data, [1, 2, 3, 4], "device-side writes must not reach a read-only array");
    assert_eq!(after.readback_batches, before.readback_batches);
    assert_eq!(after.synced_submissions, before.synced_submissions + 1);
}

#[test]
fn small_host_arrays_get_a_minimum_staging_buffer() {
    let device = device();
    let mut rt = runtime(&device);
    let handle = add_base_kernel(&mut rt, 1, ArrayAccess::WRITE);

    let mut one = [0i32; 1];
    {
        let mut ctx = LaunchContext::new();
        ctx.set_arg(0, 41i32).set_host_array_of(1, &mut one);
        rt.launch(handle, &mut ctx).unwrap();
    }

    assert_eq!(one, [41]);
}

#[test]
fn empty_host_array_is_skipped() {
    let device = device();
    let mut rt = runtime(&device);
    let handle = add_base_kernel(&mut rt, 0, ArrayAccess::READ_WRITE);

    let mut empty: [i32; 0] = [];
    let before = device.stats();
    {
        let mut ctx = LaunchContext::new();
        ctx.set_arg(0, 1i32).set_host_array_of(1, &mut empty);
        rt.launch(handle, &mut ctx).unwrap();
    }

    assert_eq!(device.stats().readback_batches, before.readback_batches);
}
