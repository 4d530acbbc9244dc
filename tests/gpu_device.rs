#![cfg(feature = "gpu")]

use std::sync::Arc;

use gfx_runtime::prelude::*;
use gfx_runtime::rhi::wgpu_device::WgpuDevice;

const ADD_BASE_WGSL: &str = r#"
@group(0) @binding(0) var<uniform> args: vec4<i32>;
@group(0) @binding(1) var<storage, read_write> data: array<i32>;

@compute @workgroup_size(1)
fn main(@builtin(global_invocation_id) id: vec3<u32>) {
    let i = id.x;
    if (i < arrayLength(&data)) {
        data[i] = i32(i) + args.x;
    }
}
"#;

fn gpu() -> Option<Arc<WgpuDevice>> {
    let _ = env_logger::builder().is_test(true).try_init();
    match WgpuDevice::new() {
        Ok(device) => Some(Arc::new(device)),
        Err(e) => {
            eprintln!("skipping: {e}");
            None
        }
    }
}

fn config() -> RuntimeConfig {
    RuntimeConfig::default().without_pipeline_cache()
}

fn add_base_request(program: &str) -> RegisterParams {
    let ctx_attribs = KernelContextAttributes::builder()
        .scalar_arg(PrimitiveType::I32)
        .array_arg(PrimitiveType::I32, ArrayAccess::WRITE)
        .build();
    RegisterParams {
        kernel_attribs: KernelAttributes {
            name: "add_base".into(),
            tasks: vec![TaskAttributes::new("add_base")
                .threads(8, 1)
                .bind(BufferRef::Args, 0)
                .bind(BufferRef::ExtArr(1), 1)],
            ctx_attribs,
        },
        num_snode_trees: 0,
        task_programs: vec![program.as_bytes().to_vec()],
    }
}

#[test]
fn gpu_writes_index_plus_base_into_host_array() {
    let Some(device) = gpu() else { return };
    let mut rt = GfxRuntime::new(device, config()).unwrap();
    let handle = rt.register_kernel(add_base_request(ADD_BASE_WGSL)).unwrap();

    let mut out = [0i32; 8];
    {
        let mut ctx = LaunchContext::new();
        ctx.set_arg(0, 5i32).set_host_array_of(1, &mut out);
        rt.launch(handle, &mut ctx).unwrap();
    }

    assert_eq!(out, [5, 6, 7, 8, 9, 10, 11, 12]);
    rt.shutdown().unwrap();
}

#[test]
fn gpu_rejects_invalid_shader() {
    let Some(device) = gpu() else { return };
    let mut rt = GfxRuntime::new(device, config()).unwrap();

    let err = rt
        .register_kernel(add_base_request("fn main( {"))
        .unwrap_err();
    assert!(matches!(err, GfxError::PipelineCreation { .. }));
}

#[test]
fn gpu_root_buffers_start_zeroed() {
    let Some(device) = gpu() else { return };
    let mut rt = GfxRuntime::new(Arc::clone(&device), config()).unwrap();
    let index = rt.add_root_buffer(64).unwrap();
    let root = rt.root_buffer(index).unwrap();
    rt.synchronize().unwrap();

    let mut bytes = [0xffu8; 64];
    device
        .readback_data(&[root.ptr(0)], &mut [&mut bytes[..]], &[])
        .unwrap();
    assert_eq!(bytes, [0u8; 64]);
}
