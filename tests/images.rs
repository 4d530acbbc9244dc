use gfx_runtime::prelude::*;
use gfx_runtime::rhi::{Device, ImageCopyParams, TexelFormat};
use gfx_runtime::ComputeOpImageRef;

mod common;
use common::*;

fn r32_image(x: u32, y: u32) -> ImageParams {
    ImageParams {
        format: TexelFormat::R32Sint,
        x,
        y,
        ..ImageParams::default()
    }
}

fn texture_kernel(rt: &mut GfxRuntime<HostDevice>, program: &str, storage: bool) -> KernelHandle {
    let ctx_attribs = KernelContextAttributes::builder().texture_arg().build();
    let mut t = task(program, 4).bind_texture(0, 0, storage);
    if !storage {
        t = t.bind(BufferRef::Root(0), 1);
    }
    rt.register_kernel(params(program, ctx_attribs, vec![(t, program)], 1))
        .unwrap()
}

#[test]
fn textures_are_transitioned_once_per_layout_change() {
    let device = device();
    let mut rt = runtime(&device);
    rt.add_root_buffer(16).unwrap();

    let image = rt.create_image(&r32_image(2, 2)).unwrap();
    assert_eq!(rt.image_layout(image), Some(ImageLayout::Undefined));

    let fill = texture_kernel(&mut rt, "fill_image", true);
    let read = texture_kernel(&mut rt, "read_image", false);

    for _ in 0..2 {
        let mut ctx = LaunchContext::new();
        ctx.set_rw_texture(0, image);
        rt.launch(fill, &mut ctx).unwrap();
    }
    assert_eq!(rt.image_layout(image), Some(ImageLayout::ShaderReadWrite));

    let mut ctx = LaunchContext::new();
    ctx.set_texture(0, image);
    rt.launch(read, &mut ctx).unwrap();
    rt.synchronize().unwrap();

    let id = image.alloc_id;
    assert_eq!(
        device.image_transitions(),
        vec![
            (id, ImageLayout::Undefined, ImageLayout::ShaderReadWrite),
            (id, ImageLayout::ShaderReadWrite, ImageLayout::ShaderRead),
        ]
    );
    assert_eq!(rt.image_layout(image), Some(ImageLayout::ShaderRead));
    assert_eq!(read_u32s(&device, rt.root_buffer(0).unwrap()), [1, 2, 3, 4]);
}

#[test]
fn untracked_images_are_rejected() {
    let device = device();
    let mut rt = runtime(&device);
    rt.add_root_buffer(16).unwrap();

    let foreign = device.create_image(&r32_image(2, 2)).unwrap();
    let err = rt.transition_image(foreign, ImageLayout::ShaderRead).unwrap_err();
    assert!(matches!(err, GfxError::UntrackedImage(id) if id == foreign.alloc_id));

    let fill = texture_kernel(&mut rt, "fill_image", true);
    let mut ctx = LaunchContext::new();
    ctx.set_rw_texture(0, foreign);
    assert!(matches!(rt.launch(fill, &mut ctx), Err(GfxError::UntrackedImage(_))));

    rt.track_image(foreign, ImageLayout::ShaderRead);
    rt.transition_image(foreign, ImageLayout::TransferDst).unwrap();
    assert_eq!(rt.image_layout(foreign), Some(ImageLayout::TransferDst));

    rt.untrack_image(foreign);
    assert_eq!(rt.image_layout(foreign), None);
}

#[test]
fn missing_texture_argument_is_reported() {
    let device = device();
    let mut rt = runtime(&device);
    rt.add_root_buffer(16).unwrap();
    let fill = texture_kernel(&mut rt, "fill_image", true);

    let err = rt.launch(fill, &mut LaunchContext::new()).unwrap_err();
    assert!(matches!(err, GfxError::ArgumentMissing { index: 0 }));
}

#[test]
fn copy_image_moves_a_region_between_images() {
    let device = device();
    let mut rt = runtime(&device);

    let src = rt.create_image(&r32_image(4, 4)).unwrap();
    let dst = rt.create_image(&r32_image(4, 4)).unwrap();
    let texels: Vec<u8> = (0..16i32).flat_map(|v| v.to_le_bytes()).collect();
    device.write_contents(src, &texels).unwrap();

    let region = ImageCopyParams {
        width: 2,
        height: 2,
        depth: 1,
        src_offset: [1, 1, 0],
        dst_offset: [0, 0, 0],
    };
    rt.copy_image(dst, src, &region).unwrap();
    rt.synchronize().unwrap();

    let out = read_i32s(&device, dst);
    assert_eq!(&out[0..2], &[5, 6]);
    assert_eq!(&out[4..6], &[9, 10]);
    assert_eq!(out.iter().filter(|&&v| v != 0).count(), 4);

    assert_eq!(rt.image_layout(dst), Some(ImageLayout::TransferDst));
    assert_eq!(rt.image_layout(src), Some(ImageLayout::TransferSrc));
}

#[test]
fn raw_op_images_end_in_their_final_layout() {
    let device = device();
    let mut rt = runtime(&device);
    let image = rt.create_image(&r32_image(1, 1)).unwrap();

    let refs = [ComputeOpImageRef {
        image,
        initial_layout: ImageLayout::TransferDst,
        final_layout: ImageLayout::ShaderRead,
    }];
    rt.enqueue_raw_op(|_device, _list| {}, &refs).unwrap();
    rt.synchronize().unwrap();

    assert_eq!(rt.image_layout(image), Some(ImageLayout::ShaderRead));
    assert_eq!(
        device.image_transitions(),
        vec![(image.alloc_id, ImageLayout::Undefined, ImageLayout::TransferDst)]
    );
}

#[test]
fn raw_op_with_untracked_image_records_nothing() {
    let device = device();
    let mut rt = runtime(&device);
    let tracked = rt.create_image(&r32_image(1, 1)).unwrap();
    let foreign = device.create_image(&r32_image(1, 1)).unwrap();

    let refs = [
        ComputeOpImageRef {
            image: tracked,
            initial_layout: ImageLayout::TransferDst,
            final_layout: ImageLayout::TransferDst,
        },
        ComputeOpImageRef {
            image: foreign,
            initial_layout: ImageLayout::TransferSrc,
            final_layout: ImageLayout::TransferSrc,
        },
    ];
    let mut ran = false;
    let result = rt.enqueue_raw_op(|_device, _list| ran = true, &refs);

    assert!(matches!(result, Err(GfxError::UntrackedImage(_))));
    assert!(!ran);
    assert!(!rt.has_pending_work());
    assert_eq!(rt.image_layout(tracked), Some(ImageLayout::Undefined));
}

#[test]
fn destroyed_images_are_forgotten() {
    let device = device();
    let mut rt = runtime(&device);
    let image = rt.create_image(&r32_image(2, 2)).unwrap();

    rt.destroy_image(image);
    assert_eq!(rt.image_layout(image), None);
    assert!(!device.is_live(image));
}

#[test]
fn failed_launch_leaves_none_of_its_tasks_queued() {
    let device = device();
    let mut rt = runtime(&device);
    rt.add_root_buffer(16).unwrap();
    let foreign = device.create_image(&r32_image(2, 2)).unwrap();

    let ctx_attribs = KernelContextAttributes::builder().texture_arg().build();
    let handle = rt
        .register_kernel(params(
            "set_then_read",
            ctx_attribs,
            vec![
                (task("set_root", 4).bind(BufferRef::Root(0), 0), "set_root"),
                (
                    task("read_image", 4).bind_texture(0, 0, false).bind(BufferRef::Root(0), 1),
                    "read_image",
                ),
            ],
            1,
        ))
        .unwrap();

    let mut ctx = LaunchContext::new();
    ctx.set_texture(0, foreign);
    let err = rt.launch(handle, &mut ctx).unwrap_err();
    assert!(matches!(err, GfxError::UntrackedImage(id) if id == foreign.alloc_id));

    rt.synchronize().unwrap();
    assert_eq!(read_i32s(&device, rt.root_buffer(0).unwrap()), [0, 0, 0, 0]);
    assert_eq!(device.stats().dispatches, 0);
}

#[test]
fn binding_failure_rolls_back_image_layouts() {
    let device = device();
    let mut rt = runtime(&device);
    rt.add_root_buffer(16).unwrap();
    let image = rt.create_image(&r32_image(2, 2)).unwrap();

    let ctx_attribs = KernelContextAttributes::builder()
        .texture_arg()
        .array_arg(PrimitiveType::I32, ArrayAccess::READ_WRITE)
        .build();
    let handle = rt
        .register_kernel(params(
            "fill_then_touch",
            ctx_attribs,
            vec![
                (task("fill_image", 4).bind_texture(0, 0, true), "fill_image"),
                (task("set_root", 4).bind(BufferRef::ExtArr(1), 0), "set_root"),
            ],
            1,
        ))
        .unwrap();

    // A freed ndarray is unknown to the device by the time it is bound.
    let stale = rt.allocate_ndarray(16).unwrap().alloc();

    let mut ctx = LaunchContext::new();
    ctx.set_rw_texture(0, image).set_ndarray(1, stale);
    let err = rt.launch(handle, &mut ctx).unwrap_err();
    assert!(matches!(err, GfxError::ResourceBinding { .. }));

    assert_eq!(rt.image_layout(image), Some(ImageLayout::Undefined));
    rt.synchronize().unwrap();
    assert!(device.image_transitions().is_empty());
    assert_eq!(device.stats().dispatches, 0);
}
