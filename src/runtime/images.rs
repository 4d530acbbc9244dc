//! Image layout tracking.
//!
//! The runtime remembers the last layout it put every image into and records
//! a transition whenever an operation needs a different one. An image the
//! runtime has no layout for cannot be bound, transitioned or copied.

use std::collections::HashMap;

use crate::error::{GfxError, GfxResult};
use crate::rhi::{AllocId, CommandList, DeviceAllocation, ImageLayout, ShaderResourceSet};
use crate::runtime::kernel::TaskAttributes;

/// Last-known layout per image.
#[derive(Debug, Default)]
pub(crate) struct ImageLayoutTracker {
    layouts: HashMap<AllocId, ImageLayout>,
}

impl ImageLayoutTracker {
    pub(crate) fn track(&mut self, image: DeviceAllocation, layout: ImageLayout) {
        self.layouts.insert(image.alloc_id, layout);
    }

    pub(crate) fn untrack(&mut self, image: DeviceAllocation) {
        self.layouts.remove(&image.alloc_id);
    }

    pub(crate) fn layout_of(&self, image: DeviceAllocation) -> Option<ImageLayout> {
        self.layouts.get(&image.alloc_id).copied()
    }

    /// Records a transition of `image` to `layout` into `list`. No command is
    /// recorded when the image is already in `layout`.
    pub(crate) fn transition<L: CommandList>(
        &mut self,
        list: &mut L,
        image: DeviceAllocation,
        layout: ImageLayout,
    ) -> GfxResult<()> {
        let old = self
            .layout_of(image)
            .ok_or(GfxError::UntrackedImage(image.alloc_id))?;
        if old != layout {
            list.image_transition(image, old, layout);
            self.layouts.insert(image.alloc_id, layout);
        }
        Ok(())
    }

    /// Looks up `task`'s textures among the launch's texture arguments and
    /// checks that every one is tracked. Records nothing.
    pub(crate) fn resolve_textures(
        &self,
        task: &TaskAttributes,
        textures: &HashMap<usize, DeviceAllocation>,
    ) -> GfxResult<Vec<TextureBinding>> {
        task.texture_binds
            .iter()
            .map(|bind| {
                let image = textures.get(&bind.arg_id).copied().ok_or_else(|| GfxError::MissingTexture {
                    task: task.name.clone(),
                    arg: bind.arg_id,
                })?;
                if self.layout_of(image).is_none() {
                    return Err(GfxError::UntrackedImage(image.alloc_id));
                }
                Ok(TextureBinding {
                    binding: bind.binding,
                    image,
                    is_storage: bind.is_storage,
                })
            })
            .collect()
    }

    /// Transitions and binds resolved textures: storage textures go to
    /// `ShaderReadWrite` and bind read-write, sampled ones go to `ShaderRead`.
    pub(crate) fn bind_textures<L: CommandList>(
        &mut self,
        list: &mut L,
        textures: &[TextureBinding],
        set: &mut ShaderResourceSet,
    ) -> GfxResult<()> {
        for t in textures {
            if t.is_storage {
                self.transition(list, t.image, ImageLayout::ShaderReadWrite)?;
                set.rw_image(t.binding, t.image);
            } else {
                self.transition(list, t.image, ImageLayout::ShaderRead)?;
                set.image(t.binding, t.image);
            }
        }
        Ok(())
    }

    /// Current layouts of the bound images, for [`restore`](Self::restore).
    pub(crate) fn snapshot<'a>(
        &self,
        textures: impl IntoIterator<Item = &'a TextureBinding>,
    ) -> Vec<(DeviceAllocation, Option<ImageLayout>)> {
        textures.into_iter().map(|t| (t.image, self.layout_of(t.image))).collect()
    }

    pub(crate) fn restore(&mut self, snapshot: Vec<(DeviceAllocation, Option<ImageLayout>)>) {
        for (image, layout) in snapshot {
            match layout {
                Some(layout) => self.track(image, layout),
                None => self.untrack(image),
            }
        }
    }
}

/// A texture binding of one task, checked against the tracker.
#[derive(Debug, Clone, Copy)]
pub(crate) struct TextureBinding {
    binding: u32,
    image: DeviceAllocation,
    is_storage: bool,
}
