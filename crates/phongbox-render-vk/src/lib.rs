// SPDX-License-Identifier: CEPL-1.0
//! Vulkan 1.3 backend for the phongbox frame loop.
//!
//! `VkRenderer` assembles the device context, presentation chain, depth
//! buffer, binding layout, Phong pipeline, constant buffers and cube geometry,
//! and implements [`FrameBackend`] on top of them.
mod barrier;
mod buffer;
mod constants;
mod context;
mod depth;
mod pipeline;
pub mod shader;
mod swapchain;
mod unwind;

use std::path::PathBuf;

use anyhow::{anyhow, bail, Context, Result};
use ash::vk;
use phongbox_math::cube::{CUBE_INDICES, CUBE_VERTICES};
use phongbox_render::{FrameBackend, FrameInputs, RenderSize};
use raw_window_handle::{HasDisplayHandle, HasWindowHandle};
use tracing::{debug, info, warn};

pub use buffer::{GeometryBuffers, GpuBuffer, UploadBuffer};
pub use constants::ConstantBuffers;
pub use context::{DeviceContext, SubmitSync};
pub use depth::DepthResource;
pub use pipeline::{BindingLayout, PhongPipeline};
pub use swapchain::{PresentOutcome, PresentationChain};

use shader::{PhongSpirv, ShaderSources};

/// Renderer knobs that come from the application config.
#[derive(Clone, Debug, PartialEq)]
pub struct VkConfig {
    pub clear_color: [f32; 4],
    pub vsync: bool,
    /// Read `phong.vert` / `phong.frag` from here instead of the embedded text.
    pub shader_dir: Option<PathBuf>,
}

impl Default for VkConfig {
    fn default() -> Self {
        Self {
            clear_color: [0.0, 0.2, 0.4, 1.0],
            vsync: true,
            shader_dir: None,
        }
    }
}

/// Negative-height viewport so clip-space +Y points up on screen.
pub(crate) fn flipped_viewport(extent: vk::Extent2D) -> vk::Viewport {
    vk::Viewport {
        x: 0.0,
        y: extent.height as f32,
        width: extent.width as f32,
        height: -(extent.height as f32),
        min_depth: 0.0,
        max_depth: 1.0,
    }
}

/// Scene objects created so far by `VkRenderer::new`.
#[derive(Default)]
struct PartialScene {
    chain: Option<PresentationChain>,
    depth: Option<DepthResource>,
    bindings: Option<BindingLayout>,
    pipeline: Option<PhongPipeline>,
    constants: Option<ConstantBuffers>,
    geometry: Option<GeometryBuffers>,
}

struct Scene {
    chain: PresentationChain,
    depth: DepthResource,
    bindings: BindingLayout,
    pipeline: PhongPipeline,
    constants: ConstantBuffers,
    geometry: GeometryBuffers,
}

impl PartialScene {
    fn build(&mut self, ctx: &mut DeviceContext, spirv: &PhongSpirv, size: RenderSize, config: &VkConfig) -> Result<()> {
        let chain = self
            .chain
            .insert(PresentationChain::create(ctx, size, config.vsync)?);
        let (extent, color_format) = (chain.extent, chain.format);
        let depth_format = self.depth.insert(DepthResource::create(ctx, extent)?).format;

        let bindings = self.bindings.insert(BindingLayout::create(ctx.device())?);
        self.pipeline = Some(PhongPipeline::create(
            ctx.device(),
            bindings,
            spirv,
            color_format,
            depth_format,
        )?);

        let constants = self.constants.insert(ConstantBuffers::new(ctx)?);
        bindings.write(ctx.device(), constants)?;

        self.geometry = Some(GeometryBuffers::upload(ctx, &CUBE_VERTICES, &CUBE_INDICES)?);
        Ok(())
    }

    /// `Some` only when every object exists.
    fn complete(&mut self) -> Option<Scene> {
        if self.chain.is_none()
            || self.depth.is_none()
            || self.bindings.is_none()
            || self.pipeline.is_none()
            || self.constants.is_none()
            || self.geometry.is_none()
        {
            return None;
        }
        Some(Scene {
            chain: self.chain.take()?,
            depth: self.depth.take()?,
            bindings: self.bindings.take()?,
            pipeline: self.pipeline.take()?,
            constants: self.constants.take()?,
            geometry: self.geometry.take()?,
        })
    }

    // Same order as `VkRenderer::teardown`.
    unsafe fn destroy(&mut self, device: &ash::Device) {
        if let Some(g) = self.geometry.take() {
            g.destroy(device);
        }
        if let Some(mut c) = self.constants.take() {
            c.destroy(device);
        }
        if let Some(p) = self.pipeline.take() {
            p.destroy(device);
        }
        if let Some(b) = self.bindings.take() {
            b.destroy(device);
        }
        if let Some(mut d) = self.depth.take() {
            d.destroy(device);
        }
        if let Some(mut c) = self.chain.take() {
            c.destroy(device);
        }
    }
}

pub struct VkRenderer {
    ctx: DeviceContext,
    chain: PresentationChain,
    depth: DepthResource,
    bindings: BindingLayout,
    spirv: PhongSpirv,
    pipeline: PhongPipeline,
    constants: ConstantBuffers,
    geometry: GeometryBuffers,

    clear_color: [f32; 4],
    vsync: bool,
    size: RenderSize,
    needs_rebuild: bool,
    released: bool,
}

impl VkRenderer {
    // STRICT ORDER:
    // 1) shaders compiled (no GPU needed; fail before touching the driver)
    // 2) device context (instance, surface, device, queue, pool, fence)
    // 3) presentation chain, then depth sized to the chain's extent
    // 4) binding layout, then the pipeline against the chain/depth formats
    // 5) constant buffers + descriptor writes
    // 6) geometry upload (flushed inside), then a final flush
    // On failure everything created so far is destroyed, context last.
    pub fn new(
        window: &dyn HasWindowHandle,
        display: &dyn HasDisplayHandle,
        size: RenderSize,
        config: &VkConfig,
    ) -> Result<Self> {
        let sources = ShaderSources::load(config.shader_dir.as_deref())?;
        let spirv = shader::compile(&sources).context("compile phong shaders")?;

        let mut ctx = DeviceContext::new(window, display)?;
        let mut partial = PartialScene::default();
        let built = partial
            .build(&mut ctx, &spirv, size, config)
            .and_then(|()| ctx.flush().context("initialization flush"));
        let scene = match built.map(|fence| (fence, partial.complete())) {
            Ok((fence, Some(scene))) => {
                info!(
                    "renderer ready on {} ({}x{}, fence {fence})",
                    ctx.adapter_name(),
                    scene.chain.extent.width,
                    scene.chain.extent.height
                );
                scene
            }
            outcome => {
                unsafe {
                    if let Err(e) = ctx.device().device_wait_idle() {
                        warn!("device_wait_idle after failed init: {e}");
                    }
                    partial.destroy(ctx.device());
                    ctx.destroy();
                }
                return Err(match outcome {
                    Err(e) => e,
                    Ok(_) => anyhow!("renderer scene incomplete after build"),
                });
            }
        };

        let Scene {
            chain,
            depth,
            bindings,
            pipeline,
            constants,
            geometry,
        } = scene;
        Ok(Self {
            ctx,
            chain,
            depth,
            bindings,
            spirv,
            pipeline,
            constants,
            geometry,
            clear_color: config.clear_color,
            vsync: config.vsync,
            size,
            needs_rebuild: false,
            released: false,
        })
    }

    pub fn adapter_name(&self) -> &str {
        self.ctx.adapter_name()
    }

    pub fn is_software(&self) -> bool {
        self.ctx.is_software()
    }

    /// Record the new surface size. The swapchain and depth buffer are rebuilt
    /// at the start of the next rendered frame.
    pub fn resize(&mut self, size: RenderSize) {
        if size != self.size {
            self.size = size;
            self.needs_rebuild = true;
        }
    }

    /// Recreate everything that depends on the surface extent or format.
    fn rebuild(&mut self) -> Result<()> {
        self.ctx.flush().context("flush before swapchain rebuild")?;
        unsafe {
            self.depth.destroy(self.ctx.device());
            self.chain.destroy(self.ctx.device());
        }
        self.chain = PresentationChain::create(&self.ctx, self.size, self.vsync)?;
        self.depth = DepthResource::create(&mut self.ctx, self.chain.extent)?;

        if self.chain.format != self.pipeline.color_format
            || self.depth.format != self.pipeline.depth_format
        {
            warn!("surface format changed; rebuilding pipeline");
            let pipeline = PhongPipeline::create(
                self.ctx.device(),
                &self.bindings,
                &self.spirv,
                self.chain.format,
                self.depth.format,
            )?;
            unsafe { self.pipeline.destroy(self.ctx.device()) };
            self.pipeline = pipeline;
        }

        self.needs_rebuild = false;
        debug!(
            "swapchain rebuilt at {}x{}",
            self.chain.extent.width, self.chain.extent.height
        );
        Ok(())
    }

    fn acquire(&mut self) -> Result<()> {
        if self.needs_rebuild {
            self.rebuild()?;
        }
        if self.chain.acquire()?.is_some() {
            return Ok(());
        }
        debug!("acquire: swapchain out of date");
        self.rebuild()?;
        if self.chain.acquire()?.is_none() {
            bail!("swapchain still out of date after rebuild");
        }
        Ok(())
    }

    // STRICT TEARDOWN ORDER (children before parents; caller has flushed):
    // - geometry and constant buffers
    // - pipeline BEFORE its layout; descriptor pool with the layout
    // - depth, then swapchain views/semaphores, then the swapchain
    // - device context last (device, surface, instance)
    unsafe fn teardown(&mut self) {
        let d = self.ctx.device();
        if let Err(e) = d.device_wait_idle() {
            warn!("device_wait_idle before teardown: {e}");
        }
        self.geometry.destroy(d);
        self.constants.destroy(d);
        self.pipeline.destroy(d);
        self.bindings.destroy(d);
        self.depth.destroy(d);
        self.chain.destroy(d);
        self.ctx.destroy();
    }
}

impl FrameBackend for VkRenderer {
    fn aspect_ratio(&self) -> f32 {
        self.chain.aspect_ratio()
    }

    fn update_constants(&mut self, inputs: &FrameInputs) -> Result<()> {
        self.constants.update(inputs)
    }

    fn record_and_submit(&mut self) -> Result<()> {
        self.acquire()?;

        let sync = self.chain.frame_sync();
        let Self {
            ctx,
            chain,
            depth,
            bindings,
            pipeline,
            geometry,
            clear_color,
            ..
        } = self;
        let extent = chain.extent;
        let target = chain.current_target_view();

        ctx.record_and_submit(sync, |d, cmd| unsafe {
            chain.cmd_begin_frame(d, cmd)?;

            let color_att = vk::RenderingAttachmentInfo {
                s_type: vk::StructureType::RENDERING_ATTACHMENT_INFO,
                image_view: target,
                image_layout: vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
                load_op: vk::AttachmentLoadOp::CLEAR,
                store_op: vk::AttachmentStoreOp::STORE,
                clear_value: vk::ClearValue {
                    color: vk::ClearColorValue {
                        float32: *clear_color,
                    },
                },
                ..Default::default()
            };
            let depth_att = vk::RenderingAttachmentInfo {
                s_type: vk::StructureType::RENDERING_ATTACHMENT_INFO,
                image_view: depth.view,
                image_layout: vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL,
                load_op: vk::AttachmentLoadOp::CLEAR,
                store_op: vk::AttachmentStoreOp::DONT_CARE,
                clear_value: vk::ClearValue {
                    depth_stencil: vk::ClearDepthStencilValue {
                        depth: 1.0,
                        stencil: 0,
                    },
                },
                ..Default::default()
            };
            let rendering = vk::RenderingInfo {
                s_type: vk::StructureType::RENDERING_INFO,
                render_area: vk::Rect2D {
                    offset: vk::Offset2D { x: 0, y: 0 },
                    extent,
                },
                layer_count: 1,
                color_attachment_count: 1,
                p_color_attachments: &color_att,
                p_depth_attachment: &depth_att,
                ..Default::default()
            };
            d.cmd_begin_rendering(cmd, &rendering);

            d.cmd_bind_pipeline(cmd, vk::PipelineBindPoint::GRAPHICS, pipeline.pipeline);
            d.cmd_set_viewport(cmd, 0, std::slice::from_ref(&flipped_viewport(extent)));
            let scissor = vk::Rect2D {
                offset: vk::Offset2D { x: 0, y: 0 },
                extent,
            };
            d.cmd_set_scissor(cmd, 0, std::slice::from_ref(&scissor));
            bindings.cmd_bind(d, cmd);

            d.cmd_bind_vertex_buffers(cmd, 0, &[geometry.vertices.buffer], &[0]);
            d.cmd_bind_index_buffer(cmd, geometry.indices.buffer, 0, vk::IndexType::UINT16);
            d.cmd_draw_indexed(cmd, geometry.index_count, 1, 0, 0, 0);

            d.cmd_end_rendering(cmd);

            chain.cmd_end_frame(d, cmd)?;
            Ok(())
        })
    }

    fn present(&mut self) -> Result<()> {
        match self.chain.present(self.ctx.queue())? {
            PresentOutcome::Presented => {}
            PresentOutcome::OutOfDate => {
                debug!("present: swapchain out of date");
                self.needs_rebuild = true;
            }
            PresentOutcome::Suboptimal => {
                if self.chain.surface_changed(&self.ctx, self.size)? {
                    debug!("present: suboptimal and the surface extent moved");
                    self.needs_rebuild = true;
                }
            }
        }
        Ok(())
    }

    fn flush(&mut self) -> Result<u64> {
        self.ctx.flush()
    }

    fn release(&mut self) {
        if self.released {
            return;
        }
        self.released = true;
        unsafe { self.teardown() };
        info!("renderer released");
    }
}

impl Drop for VkRenderer {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        if let Err(e) = self.ctx.flush() {
            warn!("flush on drop failed: {e:#}");
        }
        self.release();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn viewport_flips_y() {
        let vp = flipped_viewport(vk::Extent2D {
            width: 800,
            height: 600,
        });
        assert_eq!(vp.y, 600.0);
        assert_eq!(vp.height, -600.0);
        assert_eq!(vp.width, 800.0);
        assert_eq!((vp.min_depth, vp.max_depth), (0.0, 1.0));
    }

    #[test]
    fn default_config_matches_reference_scene() {
        let c = VkConfig::default();
        assert_eq!(c.clear_color, [0.0, 0.2, 0.4, 1.0]);
        assert!(c.vsync);
        assert!(c.shader_dir.is_none());
    }
}
