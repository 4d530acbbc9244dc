use criterion::*;
use std::hint::black_box;
use std::sync::Arc;
use std::time::Duration;

use gfx_runtime::prelude::*;

const LAUNCHES: usize = 1_000;

fn setup() -> (Arc<HostDevice>, GfxRuntime<HostDevice>) {
    let device = HostDevice::new();
    device.register_program("touch", 1, |inv| {
        let i = inv.global_id();
        let v: u32 = inv.load(0, i);
        inv.store(0, i, v.wrapping_add(1));
    });
    device.register_program("echo", 1, |inv| {
        let raw: u64 = inv.load_bytes_at(0, 0);
        inv.store_bytes_at(2, 0, raw);
    });
    let device = Arc::new(device);

    let config = RuntimeConfig::default()
        .without_pipeline_cache()
        .with_idle_flush_threshold(Duration::from_secs(3600));
    let rt = GfxRuntime::new(Arc::clone(&device), config).unwrap();
    (device, rt)
}

fn kernel(name: &str, ctx_attribs: KernelContextAttributes, task: TaskAttributes) -> RegisterParams {
    RegisterParams {
        kernel_attribs: KernelAttributes {
            name: name.into(),
            tasks: vec![task],
            ctx_attribs,
        },
        num_snode_trees: 1,
        task_programs: vec![name.as_bytes().to_vec()],
    }
}

fn launch_benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("launch");
    group.throughput(Throughput::Elements(LAUNCHES as u64));

    group.bench_function("batched_no_args_1k", |b| {
        let (_device, mut rt) = setup();
        rt.add_root_buffer(64 * 4).unwrap();
        let touch = rt
            .register_kernel(kernel(
                "touch",
                KernelContextAttributes::default(),
                TaskAttributes::new("touch").threads(64, 1).bind(BufferRef::Root(0), 0),
            ))
            .unwrap();

        b.iter(|| {
            for _ in 0..LAUNCHES {
                rt.launch(touch, &mut LaunchContext::new()).unwrap();
            }
            rt.synchronize().unwrap();
        });
    });

    group.bench_function("synced_scalar_return_1k", |b| {
        let (_device, mut rt) = setup();
        let echo = rt
            .register_kernel(kernel(
                "echo",
                KernelContextAttributes::builder()
                    .scalar_arg(PrimitiveType::I32)
                    .ret(PrimitiveType::I32)
                    .build(),
                TaskAttributes::new("echo")
                    .bind(BufferRef::Args, 0)
                    .bind(BufferRef::Rets, 2),
            ))
            .unwrap();

        b.iter(|| {
            for i in 0..LAUNCHES as i32 {
                let mut ctx = LaunchContext::new();
                ctx.set_arg(0, i);
                rt.launch(echo, &mut ctx).unwrap();
                black_box(ctx.ret_scalar(0, 0));
            }
        });
    });

    group.finish();
}

criterion_group!(benches, launch_benchmark);
criterion_main!(benches);
