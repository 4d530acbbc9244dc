use gfx_runtime::prelude::*;
use gfx_runtime::rhi::{DeviceCapabilities, RhiError};

mod common;
use common::*;

#[test]
fn handles_are_issued_in_registration_order() {
    let device = device();
    let mut rt = runtime(&device);

    let a = echo_kernel(&mut rt, PrimitiveType::I32);
    let b = echo_kernel(&mut rt, PrimitiveType::F32);
    let c = echo_kernel(&mut rt, PrimitiveType::I32);

    assert_eq!((a.id(), b.id(), c.id()), (0, 1, 2));
    assert_eq!(rt.kernel_count(), 3);
    assert_eq!(rt.find_kernel("echo_i32"), Some(c), "latest registration wins");
    assert_eq!(rt.find_kernel("echo_f32"), Some(b));
    assert_eq!(rt.find_kernel("nope"), None);
    assert_eq!(rt.kernel_attributes(b).unwrap().name, "echo_f32");
    assert_eq!(device.stats().pipelines_created, 3);
}

#[test]
fn unknown_program_fails_registration() {
    let device = device();
    let mut rt = runtime(&device);

    let err = rt
        .register_kernel(params(
            "broken",
            KernelContextAttributes::default(),
            vec![(task("missing", 1), "no_such_program")],
            0,
        ))
        .unwrap_err();

    assert!(matches!(
        &err,
        GfxError::PipelineCreation { kernel, task, source: RhiError::Error(_) }
            if kernel == "broken" && task == "missing"
    ));
    assert_eq!(rt.kernel_count(), 0);
}

#[test]
fn task_and_program_counts_must_agree() {
    let device = device();
    let mut rt = runtime(&device);

    let mut request = root_kernel("set", "set_root", 4);
    request.task_programs.push(b"set_root".to_vec());

    let err = rt.register_kernel(request).unwrap_err();
    assert!(matches!(err, GfxError::TaskProgramMismatch { tasks: 1, programs: 2, .. }));
}

#[test]
fn handles_from_another_runtime_are_rejected() {
    let device = device();
    let mut issuer = runtime(&device);
    echo_kernel(&mut issuer, PrimitiveType::I32);
    let foreign = echo_kernel(&mut issuer, PrimitiveType::I32);

    let mut rt = runtime(&device);
    let err = rt.launch(foreign, &mut LaunchContext::new()).unwrap_err();
    assert!(matches!(err, GfxError::UnknownKernel(h) if h == foreign));
    assert!(rt.kernel_attributes(foreign).is_err());
}

#[test]
fn missing_scalar_argument_is_reported() {
    let device = device();
    let mut rt = runtime(&device);
    let handle = echo_kernel(&mut rt, PrimitiveType::I32);

    let err = rt.launch(handle, &mut LaunchContext::new()).unwrap_err();
    assert!(matches!(err, GfxError::ArgumentMissing { index: 0 }));
}

#[test]
fn scalar_in_array_slot_is_a_mismatch() {
    let device = device();
    let mut rt = runtime(&device);
    let handle = add_base_kernel(&mut rt, 4, ArrayAccess::WRITE);

    let mut ctx = LaunchContext::new();
    ctx.set_arg(0, 1i32).set_arg(1, 2i32);
    let err = rt.launch(handle, &mut ctx).unwrap_err();
    assert!(matches!(err, GfxError::ArgumentMismatch { index: 1, .. }));
}

#[test]
fn scalar_of_wrong_type_is_a_mismatch() {
    let device = device();
    let mut rt = runtime(&device);
    let handle = echo_kernel(&mut rt, PrimitiveType::F32);

    let mut ctx = LaunchContext::new();
    ctx.set_arg(0, 1i32);
    let err = rt.launch(handle, &mut ctx).unwrap_err();
    assert!(matches!(err, GfxError::ArgumentMismatch { index: 0, .. }));
}

#[test]
fn unsupported_argument_type_is_reported() {
    let device = device_from(HostDevice::builder().capabilities(DeviceCapabilities::minimal()));
    let mut rt = runtime(&device);
    let handle = echo_kernel(&mut rt, PrimitiveType::I64);

    let mut ctx = LaunchContext::new();
    ctx.set_arg(0, 7i64);
    let err = rt.launch(handle, &mut ctx).unwrap_err();
    assert!(matches!(err, GfxError::UnsupportedType { ty: PrimitiveType::I64, .. }));
    assert!(err.to_string().contains("i64"));
}

#[test]
fn addresses_are_zero_without_physical_pointers() {
    let device = device_from(HostDevice::builder().capabilities(DeviceCapabilities::minimal()));
    let mut rt = runtime(&device);

    let ctx_attribs = KernelContextAttributes::builder()
        .array_arg(PrimitiveType::I32, ArrayAccess::READ_WRITE)
        .build();
    let add = task("ptr_add_one", 4).bind(BufferRef::Args, 0);
    let handle = rt
        .register_kernel(params("add_one", ctx_attribs, vec![(add, "ptr_add_one")], 0))
        .unwrap();

    let array = rt.allocate_ndarray(16).unwrap();
    let mut ctx = LaunchContext::new();
    ctx.set_ndarray(0, array.alloc());
    rt.launch(handle, &mut ctx).unwrap();
    rt.synchronize().unwrap();

    // Null address: the kernel's writes go nowhere.
    assert_eq!(read_i32s(&device, array.alloc()), [0, 0, 0, 0]);
}
