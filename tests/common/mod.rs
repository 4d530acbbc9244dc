#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use gfx_runtime::prelude::*;
use gfx_runtime::rhi::host::HostDeviceBuilder;

/// Threshold long enough that no test ever hits an idle flush by accident.
pub const NEVER: Duration = Duration::from_secs(3600);

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Registers every host program the tests use.
///
/// Binding conventions: 0 is the args buffer (or the first root/scratch
/// buffer for argument-less kernels), 1 the first array, 2 the returns
/// buffer.
pub fn register_programs(device: &HostDevice) {
    // array[i] = i + base
    device.register_program("add_base", 1, |inv| {
        let i = inv.global_id();
        if i < inv.len::<i32>(1) {
            let base: i32 = inv.load_bytes_at(0, 0);
            inv.store(1, i, i as i32 + base);
        }
    });

    // rets[8..12] = i32(args[0..4] as f32) + args[12..16] as i32
    device.register_program("offset_sum", 1, |inv| {
        let x: f32 = inv.load_bytes_at(0, 0);
        let n: i32 = inv.load_bytes_at(0, 12);
        inv.store_bytes_at(1, 8, x as i32 + n);
    });

    device.register_program("set_root", 1, |inv| {
        let i = inv.global_id();
        inv.store(0, i, i as i32);
    });

    device.register_program("double_root", 1, |inv| {
        let i = inv.global_id();
        let v: i32 = inv.load(0, i);
        inv.store(0, i, v * 2);
    });

    device.register_program("scale_f32", 1, |inv| {
        let i = inv.global_id();
        let k: f32 = inv.load_bytes_at(0, 0);
        let v: f32 = inv.load(1, i);
        inv.store(1, i, v * k);
    });

    device.register_program("write_even", 1, |inv| {
        let i = inv.global_id();
        if i % 2 == 0 {
            inv.store(1, i, 7i32);
        }
    });

    // rets[0] = sum(array); then zeroes the array
    device.register_program("sum_and_clobber", 1, |inv| {
        let n = inv.len::<i32>(1);
        let sum: i32 = (0..n).map(|j| inv.load::<i32>(1, j)).sum();
        inv.store(2, 0, sum);
        for j in 0..n {
            inv.store(1, j, 0i32);
        }
    });

    // copies the first 8 bytes of the args buffer to the returns buffer
    device.register_program("echo", 1, |inv| {
        let raw: u64 = inv.load_bytes_at(0, 0);
        inv.store_bytes_at(2, 0, raw);
    });

    device.register_program("ret_vector", 1, |inv| {
        for (j, v) in [1.5f32, 2.5, 3.5].into_iter().enumerate() {
            inv.store(2, j, v);
        }
        inv.store_bytes_at(2, 16, -42i64);
    });

    // root[0] = list_gen[0]; list_gen[0] = 99
    device.register_program("count_list_gen", 1, |inv| {
        let prev: u32 = inv.load(0, 0);
        inv.store(1, 0, prev);
        inv.store(0, 0, 99u32);
    });

    device.register_program("bump_tmps", 1, |inv| {
        let v: u32 = inv.load(0, 0);
        inv.store(0, 0, v + 1);
    });

    device.register_program("fill_image", 1, |inv| {
        let i = inv.global_id();
        inv.store(0, i, i as u32 + 1);
    });

    // root[i] = image[i]
    device.register_program("read_image", 1, |inv| {
        let i = inv.global_id();
        let v: u32 = inv.load(0, i);
        inv.store(1, i, v);
    });

    // array reached through the address in args slot 0
    device.register_program("ptr_add_one", 1, |inv| {
        let address: u64 = inv.load_bytes_at(0, 0);
        let i = inv.global_id();
        let v: i32 = inv.load_ptr(address, i);
        inv.store_ptr(address, i, v + 1);
    });

    // marks the first shape[0] elements, shape read from the extra-args block
    device.register_program("mark_extent", 1, |inv| {
        let n: i32 = inv.load_bytes_at(0, 8);
        let i = inv.global_id();
        if (i as i32) < n {
            inv.store(1, i, 1i32);
        }
    });

    device.register_program("mark_all", 64, |inv| {
        let i = inv.global_id();
        inv.store(0, i, 1u32);
    });
}

pub fn device() -> Arc<HostDevice> {
    device_from(HostDevice::builder())
}

pub fn device_from(builder: HostDeviceBuilder) -> Arc<HostDevice> {
    let device = builder.build();
    register_programs(&device);
    Arc::new(device)
}

pub fn config() -> RuntimeConfig {
    RuntimeConfig::default()
        .without_pipeline_cache()
        .with_idle_flush_threshold(NEVER)
}

pub fn runtime(device: &Arc<HostDevice>) -> GfxRuntime<HostDevice> {
    init_logging();
    GfxRuntime::new(Arc::clone(device), config()).unwrap()
}

/// Dispatch task running `threads` invocations of a 1-wide program.
pub fn task(name: &str, threads: u32) -> TaskAttributes {
    TaskAttributes::new(name).threads(threads, 1)
}

/// Registration request for a kernel whose tasks run the named programs.
pub fn params(
    name: &str,
    ctx_attribs: KernelContextAttributes,
    tasks: Vec<(TaskAttributes, &str)>,
    num_snode_trees: usize,
) -> RegisterParams {
    let (tasks, task_programs): (Vec<_>, Vec<_>) = tasks
        .into_iter()
        .map(|(task, program)| (task, program.as_bytes().to_vec()))
        .unzip();
    RegisterParams {
        kernel_attribs: KernelAttributes {
            name: name.to_owned(),
            tasks,
            ctx_attribs,
        },
        num_snode_trees,
        task_programs,
    }
}

/// Kernel without arguments running one program over root buffer 0.
pub fn root_kernel(name: &str, program: &str, threads: u32) -> RegisterParams {
    params(
        name,
        KernelContextAttributes::default(),
        vec![(task(program, threads).bind(BufferRef::Root(0), 0), program)],
        1,
    )
}

pub fn read_i32s(device: &HostDevice, alloc: DeviceAllocation) -> Vec<i32> {
    device
        .contents(alloc)
        .unwrap()
        .chunks_exact(4)
        .map(|c| i32::from_le_bytes(c.try_into().unwrap()))
        .collect()
}

pub fn read_u32s(device: &HostDevice, alloc: DeviceAllocation) -> Vec<u32> {
    device
        .contents(alloc)
        .unwrap()
        .chunks_exact(4)
        .map(|c| u32::from_le_bytes(c.try_into().unwrap()))
        .collect()
}

/// `array[i] = i + base` over `n` elements; arg 0 is `base`, arg 1 the array.
pub fn add_base_kernel(rt: &mut GfxRuntime<HostDevice>, n: u32, access: ArrayAccess) -> KernelHandle {
    let ctx = KernelContextAttributes::builder()
        .scalar_arg(PrimitiveType::I32)
        .array_arg(PrimitiveType::I32, access)
        .build();
    let add = task("add_base", n)
        .bind(BufferRef::Args, 0)
        .bind(BufferRef::ExtArr(1), 1);
    rt.register_kernel(params("add_base", ctx, vec![(add, "add_base")], 0))
        .unwrap()
}

/// Returns its single scalar argument of type `ty`.
pub fn echo_kernel(rt: &mut GfxRuntime<HostDevice>, ty: PrimitiveType) -> KernelHandle {
    let ctx = KernelContextAttributes::builder().scalar_arg(ty).ret(ty).build();
    let echo = task("echo", 1).bind(BufferRef::Args, 0).bind(BufferRef::Rets, 2);
    rt.register_kernel(params(&format!("echo_{ty}"), ctx, vec![(echo, "echo")], 0))
        .unwrap()
}
