// SPDX-License-Identifier: CEPL-1.0
use anyhow::{bail, Context, Result};
use ash::khr::swapchain;
use ash::vk;
use phongbox_render::{BackBufferRing, RenderSize, ResourceState, StateTracker, BACK_BUFFER_COUNT};
use tracing::{debug, info, warn};

use crate::barrier::{acquire_barrier, cmd_image_barrier, cmd_image_transition, ACQUIRE_WAIT_STAGE};
use crate::context::{DeviceContext, SubmitSync};
use crate::unwind::InitGuard;

/// 8-bit RGBA/BGRA UNORM in the sRGB colour space; otherwise whatever the driver lists first.
pub(crate) fn pick_surface_format(formats: &[vk::SurfaceFormatKHR]) -> Option<vk::SurfaceFormatKHR> {
    [vk::Format::B8G8R8A8_UNORM, vk::Format::R8G8B8A8_UNORM]
        .into_iter()
        .find_map(|want| {
            formats
                .iter()
                .copied()
                .find(|f| f.format == want && f.color_space == vk::ColorSpaceKHR::SRGB_NONLINEAR)
        })
        .or_else(|| formats.first().copied())
}

pub(crate) fn choose_present_mode(modes: &[vk::PresentModeKHR], vsync: bool) -> vk::PresentModeKHR {
    if vsync {
        return vk::PresentModeKHR::FIFO;
    }
    [vk::PresentModeKHR::MAILBOX, vk::PresentModeKHR::IMMEDIATE]
        .into_iter()
        .find(|m| modes.contains(m))
        .unwrap_or(vk::PresentModeKHR::FIFO)
}

pub(crate) fn extent_from_caps(caps: &vk::SurfaceCapabilitiesKHR, want: RenderSize) -> vk::Extent2D {
    if caps.current_extent.width != u32::MAX {
        caps.current_extent
    } else {
        vk::Extent2D {
            width: want
                .width
                .clamp(caps.min_image_extent.width, caps.max_image_extent.width),
            height: want
                .height
                .clamp(caps.min_image_extent.height, caps.max_image_extent.height),
        }
    }
}

/// `BACK_BUFFER_COUNT` clamped to what the surface allows (max 0 = unbounded).
pub(crate) fn image_count(caps: &vk::SurfaceCapabilitiesKHR) -> u32 {
    let want = (BACK_BUFFER_COUNT as u32).max(caps.min_image_count);
    if caps.max_image_count == 0 {
        want
    } else {
        want.min(caps.max_image_count)
    }
}

/// Every image starts `Undefined`; nothing touches an image before the driver
/// hands it out through acquire.
pub(crate) fn fresh_image_states(count: usize) -> StateTracker<usize> {
    let mut states = StateTracker::new();
    for i in 0..count {
        states.register(i, ResourceState::Undefined);
    }
    states
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PresentOutcome {
    Presented,
    /// Shown, but the surface no longer matches exactly.
    Suboptimal,
    /// Not shown; the swapchain must be rebuilt.
    OutOfDate,
}

pub(crate) fn classify_present(result: Result<bool, vk::Result>) -> Result<PresentOutcome, vk::Result> {
    match result {
        Ok(false) => Ok(PresentOutcome::Presented),
        Ok(true) => Ok(PresentOutcome::Suboptimal),
        Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => Ok(PresentOutcome::OutOfDate),
        Err(e) => Err(e),
    }
}

/// A suboptimal swapchain is only worth rebuilding when a rebuild would pick
/// a different extent; otherwise it would come back suboptimal again.
pub(crate) fn extent_changed(caps: &vk::SurfaceCapabilitiesKHR, want: RenderSize, current: vk::Extent2D) -> bool {
    extent_from_caps(caps, want) != current
}

/// Swapchain, its image views and the back-buffer rotation.
pub struct PresentationChain {
    loader: swapchain::Device,
    swapchain: vk::SwapchainKHR,
    pub format: vk::Format,
    pub extent: vk::Extent2D,
    images: Vec<vk::Image>,
    views: Vec<vk::ImageView>,
    ring: BackBufferRing,
    states: StateTracker<usize>,
    image_available: vk::Semaphore,
    /// One per image: present waits on the semaphore of the image it shows.
    render_finished: Vec<vk::Semaphore>,
}

impl PresentationChain {
    pub fn create(ctx: &DeviceContext, size: RenderSize, vsync: bool) -> Result<Self> {
        let loader = swapchain::Device::new(ctx.instance(), ctx.device());
        let device = ctx.device();
        let mut guard = InitGuard::new();
        unsafe {
            let surf = ctx.surface_loader();
            let caps = surf
                .get_physical_device_surface_capabilities(ctx.phys(), ctx.surface())
                .context("get_physical_device_surface_capabilities")?;
            let formats = surf
                .get_physical_device_surface_formats(ctx.phys(), ctx.surface())
                .context("get_physical_device_surface_formats")?;
            let modes = surf
                .get_physical_device_surface_present_modes(ctx.phys(), ctx.surface())
                .context("get_physical_device_surface_present_modes")?;

            let Some(surf_format) = pick_surface_format(&formats) else {
                bail!("surface reports no formats");
            };
            let present_mode = choose_present_mode(&modes, vsync);
            let extent = extent_from_caps(&caps, size);
            let min_count = image_count(&caps);

            let pre_transform = if caps
                .supported_transforms
                .contains(vk::SurfaceTransformFlagsKHR::IDENTITY)
            {
                vk::SurfaceTransformFlagsKHR::IDENTITY
            } else {
                caps.current_transform
            };

            let swap_info = vk::SwapchainCreateInfoKHR {
                s_type: vk::StructureType::SWAPCHAIN_CREATE_INFO_KHR,
                surface: ctx.surface(),
                min_image_count: min_count,
                image_format: surf_format.format,
                image_color_space: surf_format.color_space,
                image_extent: extent,
                image_array_layers: 1,
                image_usage: vk::ImageUsageFlags::COLOR_ATTACHMENT,
                image_sharing_mode: vk::SharingMode::EXCLUSIVE,
                pre_transform,
                composite_alpha: vk::CompositeAlphaFlagsKHR::OPAQUE,
                present_mode,
                clipped: vk::TRUE,
                ..Default::default()
            };
            let swapchain = loader
                .create_swapchain(&swap_info, None)
                .context("create_swapchain")?;
            let l = loader.clone();
            guard.push("swapchain", move || l.destroy_swapchain(swapchain, None));

            let images = loader
                .get_swapchain_images(swapchain)
                .context("get_swapchain_images")?;
            if images.len() != BACK_BUFFER_COUNT {
                warn!(
                    "asked for {} back buffers, driver created {}",
                    BACK_BUFFER_COUNT,
                    images.len()
                );
            }

            let mut views = Vec::with_capacity(images.len());
            for &img in &images {
                let iv_info = vk::ImageViewCreateInfo {
                    s_type: vk::StructureType::IMAGE_VIEW_CREATE_INFO,
                    image: img,
                    view_type: vk::ImageViewType::TYPE_2D,
                    format: surf_format.format,
                    subresource_range: vk::ImageSubresourceRange {
                        aspect_mask: vk::ImageAspectFlags::COLOR,
                        base_mip_level: 0,
                        level_count: 1,
                        base_array_layer: 0,
                        layer_count: 1,
                    },
                    ..Default::default()
                };
                let view = device.create_image_view(&iv_info, None).context("create_image_view")?;
                let d = device.clone();
                guard.push("swapchain image view", move || d.destroy_image_view(view, None));
                views.push(view);
            }

            let sem_ci = vk::SemaphoreCreateInfo::default();
            let image_available = device
                .create_semaphore(&sem_ci, None)
                .context("create_semaphore(image available)")?;
            let d = device.clone();
            guard.push("acquire semaphore", move || d.destroy_semaphore(image_available, None));
            let mut render_finished = Vec::with_capacity(images.len());
            for _ in &images {
                let sem = device
                    .create_semaphore(&sem_ci, None)
                    .context("create_semaphore(render finished)")?;
                let d = device.clone();
                guard.push("present semaphore", move || d.destroy_semaphore(sem, None));
                render_finished.push(sem);
            }
            let ring = BackBufferRing::new(images.len())?;

            info!(
                "swapchain: {} images, {:?} {}x{}, {:?}",
                images.len(),
                surf_format.format,
                extent.width,
                extent.height,
                present_mode
            );

            guard.disarm();
            Ok(Self {
                ring,
                states: fresh_image_states(images.len()),
                loader,
                swapchain,
                format: surf_format.format,
                extent,
                images,
                views,
                image_available,
                render_finished,
            })
        }
    }

    /// Query the surface and report whether a rebuild at `want` would change the extent.
    pub(crate) fn surface_changed(&self, ctx: &DeviceContext, want: RenderSize) -> Result<bool> {
        let caps = unsafe {
            ctx.surface_loader()
                .get_physical_device_surface_capabilities(ctx.phys(), ctx.surface())
                .context("get_physical_device_surface_capabilities")?
        };
        Ok(extent_changed(&caps, want, self.extent))
    }

    pub fn current_target_view(&self) -> vk::ImageView {
        self.views[self.ring.current()]
    }

    pub fn aspect_ratio(&self) -> f32 {
        RenderSize {
            width: self.extent.width,
            height: self.extent.height,
        }
        .aspect_ratio()
    }

    /// Acquire the next image. `Ok(None)` means the swapchain is out of date.
    pub fn acquire(&mut self) -> Result<Option<usize>> {
        let acquired = unsafe {
            self.loader.acquire_next_image(
                self.swapchain,
                u64::MAX,
                self.image_available,
                vk::Fence::null(),
            )
        };
        let index = match acquired {
            Ok((index, suboptimal)) => {
                if suboptimal {
                    debug!("acquire: swapchain suboptimal");
                }
                index as usize
            }
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => return Ok(None),
            Err(e) => return Err(e).context("acquire_next_image"),
        };
        if !self.ring.acquired(index)? {
            debug!("acquire: driver returned image {index} out of rotation");
        }
        Ok(Some(index))
    }

    /// Semaphores for the frame batch: wait for the acquired image, signal for present.
    pub fn frame_sync(&self) -> SubmitSync {
        SubmitSync {
            wait: Some((self.image_available, ACQUIRE_WAIT_STAGE)),
            signal: Some(self.render_finished[self.ring.current()]),
        }
    }

    /// Record the acquired image's move to render-target: from `Undefined` on
    /// its first use, from `Present` afterwards.
    pub(crate) unsafe fn cmd_begin_frame(&mut self, device: &ash::Device, cmd: vk::CommandBuffer) -> Result<()> {
        let i = self.ring.current();
        let t = self.states.transition(i, ResourceState::RenderTarget)?;
        cmd_image_barrier(device, cmd, &acquire_barrier(self.images[i], &t));
        Ok(())
    }

    /// Record render-target -> present for the current image.
    pub(crate) unsafe fn cmd_end_frame(&mut self, device: &ash::Device, cmd: vk::CommandBuffer) -> Result<()> {
        let i = self.ring.current();
        self.states.expect(i, ResourceState::RenderTarget)?;
        let t = self.states.transition(i, ResourceState::Present)?;
        cmd_image_transition(device, cmd, self.images[i], vk::ImageAspectFlags::COLOR, &t);
        Ok(())
    }

    /// Present the current image, then advance the ring.
    pub fn present(&mut self, queue: vk::Queue) -> Result<PresentOutcome> {
        let index = self.ring.current();
        self.states.expect(index, ResourceState::Present)?;
        let image_index = index as u32;
        let present = vk::PresentInfoKHR {
            s_type: vk::StructureType::PRESENT_INFO_KHR,
            wait_semaphore_count: 1,
            p_wait_semaphores: &self.render_finished[index],
            swapchain_count: 1,
            p_swapchains: &self.swapchain,
            p_image_indices: &image_index,
            ..Default::default()
        };
        let result = unsafe { self.loader.queue_present(queue, &present) };
        self.ring.advance();
        classify_present(result).context("queue_present")
    }

    // STRICT TEARDOWN ORDER: views and semaphores, then the swapchain.
    // Handles are nulled, so a second call is harmless.
    pub(crate) unsafe fn destroy(&mut self, device: &ash::Device) {
        for &iv in &self.views {
            device.destroy_image_view(iv, None);
        }
        self.views.clear();
        for &s in &self.render_finished {
            device.destroy_semaphore(s, None);
        }
        self.render_finished.clear();
        device.destroy_semaphore(self.image_available, None);
        self.image_available = vk::Semaphore::null();
        self.loader.destroy_swapchain(self.swapchain, None);
        self.swapchain = vk::SwapchainKHR::null();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn caps(min: u32, max: u32, current: (u32, u32)) -> vk::SurfaceCapabilitiesKHR {
        vk::SurfaceCapabilitiesKHR {
            min_image_count: min,
            max_image_count: max,
            current_extent: vk::Extent2D {
                width: current.0,
                height: current.1,
            },
            min_image_extent: vk::Extent2D {
                width: 1,
                height: 1,
            },
            max_image_extent: vk::Extent2D {
                width: 4096,
                height: 4096,
            },
            ..Default::default()
        }
    }

    fn sf(format: vk::Format) -> vk::SurfaceFormatKHR {
        vk::SurfaceFormatKHR {
            format,
            color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
        }
    }

    #[test]
    fn two_images_unless_the_surface_disagrees() {
        assert_eq!(image_count(&caps(1, 0, (800, 600))), 2);
        assert_eq!(image_count(&caps(2, 8, (800, 600))), 2);
        assert_eq!(image_count(&caps(3, 8, (800, 600))), 3);
        assert_eq!(image_count(&caps(1, 1, (800, 600))), 1);
    }

    #[test]
    fn extent_follows_surface_or_clamps_request() {
        let fixed = caps(2, 0, (800, 600));
        let want = RenderSize {
            width: 1024,
            height: 768,
        };
        assert_eq!(extent_from_caps(&fixed, want), vk::Extent2D { width: 800, height: 600 });

        let free = caps(2, 0, (u32::MAX, u32::MAX));
        assert_eq!(extent_from_caps(&free, want), vk::Extent2D { width: 1024, height: 768 });
        let huge = RenderSize {
            width: 10_000,
            height: 0,
        };
        assert_eq!(extent_from_caps(&free, huge), vk::Extent2D { width: 4096, height: 1 });
    }

    #[test]
    fn prefers_8bit_unorm() {
        let formats = [sf(vk::Format::B8G8R8A8_SRGB), sf(vk::Format::R8G8B8A8_UNORM)];
        assert_eq!(pick_surface_format(&formats).unwrap().format, vk::Format::R8G8B8A8_UNORM);
        let formats = [sf(vk::Format::A2B10G10R10_UNORM_PACK32)];
        assert_eq!(
            pick_surface_format(&formats).unwrap().format,
            vk::Format::A2B10G10R10_UNORM_PACK32
        );
        assert!(pick_surface_format(&[]).is_none());
    }

    #[test]
    fn images_stay_undefined_until_acquired() {
        let mut states = fresh_image_states(3);
        let mut ring = BackBufferRing::new(3).unwrap();

        ring.acquired(1).unwrap();
        let first = states.transition(ring.current(), ResourceState::RenderTarget).unwrap();
        assert_eq!(first.from, ResourceState::Undefined);
        assert_eq!(
            acquire_barrier(vk::Image::null(), &first).old_layout,
            vk::ImageLayout::UNDEFINED
        );
        states.transition(1, ResourceState::Present).unwrap();

        assert_eq!(states.state(0), Some(ResourceState::Undefined));
        assert_eq!(states.state(2), Some(ResourceState::Undefined));
        assert_eq!(states.state(1), Some(ResourceState::Present));

        let second = states.transition(1, ResourceState::RenderTarget).unwrap();
        assert_eq!(second.from, ResourceState::Present);
        let barrier = acquire_barrier(vk::Image::null(), &second);
        assert_eq!(barrier.old_layout, vk::ImageLayout::PRESENT_SRC_KHR);
        assert_eq!(barrier.src_stage_mask, ACQUIRE_WAIT_STAGE);
    }

    #[test]
    fn rebuilt_chain_forgets_previous_layouts() {
        let mut states = fresh_image_states(2);
        states.transition(0, ResourceState::RenderTarget).unwrap();
        states.transition(0, ResourceState::Present).unwrap();
        let rebuilt = fresh_image_states(2);
        assert_eq!(rebuilt.state(0), Some(ResourceState::Undefined));
        assert_eq!(rebuilt.state(1), Some(ResourceState::Undefined));
        assert_eq!(rebuilt.state(2), None);
    }

    #[test]
    fn present_results_are_classified() {
        assert_eq!(classify_present(Ok(false)), Ok(PresentOutcome::Presented));
        assert_eq!(classify_present(Ok(true)), Ok(PresentOutcome::Suboptimal));
        assert_eq!(
            classify_present(Err(vk::Result::ERROR_OUT_OF_DATE_KHR)),
            Ok(PresentOutcome::OutOfDate)
        );
        assert_eq!(
            classify_present(Err(vk::Result::ERROR_DEVICE_LOST)),
            Err(vk::Result::ERROR_DEVICE_LOST)
        );
    }

    #[test]
    fn suboptimal_rebuilds_only_when_the_extent_would_change() {
        let current = vk::Extent2D {
            width: 800,
            height: 600,
        };
        let want = RenderSize {
            width: 800,
            height: 600,
        };
        assert!(!extent_changed(&caps(2, 0, (800, 600)), want, current));
        assert!(extent_changed(&caps(2, 0, (1024, 768)), want, current));

        let free = caps(2, 0, (u32::MAX, u32::MAX));
        assert!(!extent_changed(&free, want, current));
        let resized = RenderSize {
            width: 640,
            height: 480,
        };
        assert!(extent_changed(&free, resized, current));
    }

    #[test]
    fn vsync_means_fifo() {
        let all = [
            vk::PresentModeKHR::IMMEDIATE,
            vk::PresentModeKHR::MAILBOX,
            vk::PresentModeKHR::FIFO,
        ];
        assert_eq!(choose_present_mode(&all, true), vk::PresentModeKHR::FIFO);
        assert_eq!(choose_present_mode(&all, false), vk::PresentModeKHR::MAILBOX);
        assert_eq!(
            choose_present_mode(&[vk::PresentModeKHR::FIFO], false),
            vk::PresentModeKHR::FIFO
        );
    }
}
