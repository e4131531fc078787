// SPDX-License-Identifier: CEPL-1.0
use anyhow::{Context, Result};
use ash::vk;
use phongbox_render::{ResourceState, StateTracker};
use tracing::{debug, warn};

use crate::barrier::cmd_image_transition;
use crate::buffer::allocate_for;
use crate::context::{DeviceContext, SubmitSync};
use crate::unwind::InitGuard;

/// 24-bit depth + 8-bit stencil first.
pub(crate) const DEPTH_CANDIDATES: [vk::Format; 4] = [
    vk::Format::D24_UNORM_S8_UINT,
    vk::Format::D32_SFLOAT_S8_UINT,
    vk::Format::D32_SFLOAT,
    vk::Format::D16_UNORM,
];

pub(crate) fn first_supported(
    candidates: &[vk::Format],
    mut supports: impl FnMut(vk::Format) -> bool,
) -> Option<vk::Format> {
    candidates.iter().copied().find(|&f| supports(f))
}

pub(crate) fn has_stencil(format: vk::Format) -> bool {
    matches!(
        format,
        vk::Format::D24_UNORM_S8_UINT | vk::Format::D32_SFLOAT_S8_UINT | vk::Format::D16_UNORM_S8_UINT
    )
}

fn barrier_aspect(format: vk::Format) -> vk::ImageAspectFlags {
    if has_stencil(format) {
        vk::ImageAspectFlags::DEPTH | vk::ImageAspectFlags::STENCIL
    } else {
        vk::ImageAspectFlags::DEPTH
    }
}

unsafe fn pick_depth_format(ctx: &DeviceContext) -> Result<vk::Format> {
    first_supported(&DEPTH_CANDIDATES, |fmt| {
        ctx.instance()
            .get_physical_device_format_properties(ctx.phys(), fmt)
            .optimal_tiling_features
            .contains(vk::FormatFeatureFlags::DEPTH_STENCIL_ATTACHMENT)
    })
    .context("no depth/stencil attachment format supported")
}

/// The single depth/stencil target. Lives in `DepthWrite` from creation on.
pub struct DepthResource {
    pub image: vk::Image,
    pub memory: vk::DeviceMemory,
    pub view: vk::ImageView,
    pub format: vk::Format,
    pub extent: vk::Extent2D,
}

impl DepthResource {
    pub fn create(ctx: &mut DeviceContext, extent: vk::Extent2D) -> Result<Self> {
        let mut guard = InitGuard::new();
        let (image, memory, view, format) = unsafe {
            let device = ctx.device();
            let format = pick_depth_format(ctx)?;
            let img_ci = vk::ImageCreateInfo {
                s_type: vk::StructureType::IMAGE_CREATE_INFO,
                image_type: vk::ImageType::TYPE_2D,
                format,
                extent: vk::Extent3D {
                    width: extent.width,
                    height: extent.height,
                    depth: 1,
                },
                mip_levels: 1,
                array_layers: 1,
                samples: vk::SampleCountFlags::TYPE_1,
                tiling: vk::ImageTiling::OPTIMAL,
                usage: vk::ImageUsageFlags::DEPTH_STENCIL_ATTACHMENT,
                sharing_mode: vk::SharingMode::EXCLUSIVE,
                initial_layout: vk::ImageLayout::UNDEFINED,
                ..Default::default()
            };
            let image = device.create_image(&img_ci, None).context("create_image(depth)")?;
            let d = device.clone();
            guard.push("depth image", move || d.destroy_image(image, None));
            let req = device.get_image_memory_requirements(image);
            let memory = allocate_for(ctx, req, vk::MemoryPropertyFlags::DEVICE_LOCAL)?;
            let d = device.clone();
            guard.push("depth memory", move || d.free_memory(memory, None));
            device
                .bind_image_memory(image, memory, 0)
                .context("bind_image_memory(depth)")?;

            let view_ci = vk::ImageViewCreateInfo {
                s_type: vk::StructureType::IMAGE_VIEW_CREATE_INFO,
                image,
                view_type: vk::ImageViewType::TYPE_2D,
                format,
                subresource_range: vk::ImageSubresourceRange {
                    aspect_mask: vk::ImageAspectFlags::DEPTH,
                    base_mip_level: 0,
                    level_count: 1,
                    base_array_layer: 0,
                    layer_count: 1,
                },
                ..Default::default()
            };
            let view = device
                .create_image_view(&view_ci, None)
                .context("create_image_view(depth)")?;
            let d = device.clone();
            guard.push("depth view", move || d.destroy_image_view(view, None));
            (image, memory, view, format)
        };
        let device = ctx.device().clone();
        guard.push("pending depth transition", move || unsafe {
            if let Err(e) = device.device_wait_idle() {
                warn!("device_wait_idle after failed depth init: {e}");
            }
        });

        // One-time batch: undefined -> depth-write, flushed before first use.
        let mut states = StateTracker::new();
        states.register((), ResourceState::Undefined);
        let t = states.transition((), ResourceState::DepthWrite)?;
        ctx.record_and_submit(SubmitSync::default(), |d, cmd| {
            unsafe { cmd_image_transition(d, cmd, image, barrier_aspect(format), &t) };
            Ok(())
        })
        .context("record depth transition")?;
        ctx.flush().context("flush depth transition")?;
        guard.disarm();

        debug!(
            "depth buffer {}x{} {:?}",
            extent.width, extent.height, format
        );
        Ok(Self {
            image,
            memory,
            view,
            format,
            extent,
        })
    }

    /// Nulls the handles, so a second call is harmless.
    pub(crate) unsafe fn destroy(&mut self, device: &ash::Device) {
        device.destroy_image_view(self.view, None);
        device.destroy_image(self.image, None);
        device.free_memory(self.memory, None);
        self.view = vk::ImageView::null();
        self.image = vk::Image::null();
        self.memory = vk::DeviceMemory::null();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prefers_d24s8() {
        assert_eq!(
            first_supported(&DEPTH_CANDIDATES, |_| true),
            Some(vk::Format::D24_UNORM_S8_UINT)
        );
    }

    #[test]
    fn falls_back_in_order() {
        let got = first_supported(&DEPTH_CANDIDATES, |f| f != vk::Format::D24_UNORM_S8_UINT);
        assert_eq!(got, Some(vk::Format::D32_SFLOAT_S8_UINT));
        let got = first_supported(&DEPTH_CANDIDATES, |f| f == vk::Format::D16_UNORM);
        assert_eq!(got, Some(vk::Format::D16_UNORM));
        assert_eq!(first_supported(&DEPTH_CANDIDATES, |_| false), None);
    }

    #[test]
    fn stencil_formats_transition_both_aspects() {
        assert_eq!(
            barrier_aspect(vk::Format::D24_UNORM_S8_UINT),
            vk::ImageAspectFlags::DEPTH | vk::ImageAspectFlags::STENCIL
        );
        assert_eq!(barrier_aspect(vk::Format::D32_SFLOAT), vk::ImageAspectFlags::DEPTH);
    }
}
