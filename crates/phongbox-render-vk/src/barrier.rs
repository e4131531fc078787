// SPDX-License-Identifier: CEPL-1.0
//! `ResourceState` → synchronization2 barrier translation.
use ash::vk;
use phongbox_render::{ResourceState, Transition};

/// Stage the frame submit waits on for the acquire semaphore. The
/// present → render-target barrier starts from the same stage so the layout
/// change is ordered after the image is actually available.
pub(crate) const ACQUIRE_WAIT_STAGE: vk::PipelineStageFlags2 =
    vk::PipelineStageFlags2::COLOR_ATTACHMENT_OUTPUT;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct Access {
    pub stage: vk::PipelineStageFlags2,
    pub access: vk::AccessFlags2,
    /// Meaningless for buffers.
    pub layout: vk::ImageLayout,
}

pub(crate) fn access_for(state: ResourceState) -> Access {
    use ResourceState as S;
    let (stage, access, layout) = match state {
        S::Undefined => (
            vk::PipelineStageFlags2::TOP_OF_PIPE,
            vk::AccessFlags2::NONE,
            vk::ImageLayout::UNDEFINED,
        ),
        S::Present => (
            ACQUIRE_WAIT_STAGE,
            vk::AccessFlags2::NONE,
            vk::ImageLayout::PRESENT_SRC_KHR,
        ),
        S::RenderTarget => (
            vk::PipelineStageFlags2::COLOR_ATTACHMENT_OUTPUT,
            vk::AccessFlags2::COLOR_ATTACHMENT_READ | vk::AccessFlags2::COLOR_ATTACHMENT_WRITE,
            vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
        ),
        S::DepthWrite => (
            vk::PipelineStageFlags2::EARLY_FRAGMENT_TESTS
                | vk::PipelineStageFlags2::LATE_FRAGMENT_TESTS,
            vk::AccessFlags2::DEPTH_STENCIL_ATTACHMENT_READ
                | vk::AccessFlags2::DEPTH_STENCIL_ATTACHMENT_WRITE,
            vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL,
        ),
        S::CopyDest => (
            vk::PipelineStageFlags2::COPY,
            vk::AccessFlags2::TRANSFER_WRITE,
            vk::ImageLayout::TRANSFER_DST_OPTIMAL,
        ),
        S::VertexBuffer => (
            vk::PipelineStageFlags2::VERTEX_ATTRIBUTE_INPUT,
            vk::AccessFlags2::VERTEX_ATTRIBUTE_READ,
            vk::ImageLayout::UNDEFINED,
        ),
        S::IndexBuffer => (
            vk::PipelineStageFlags2::INDEX_INPUT,
            vk::AccessFlags2::INDEX_READ,
            vk::ImageLayout::UNDEFINED,
        ),
    };
    Access {
        stage,
        access,
        layout,
    }
}

pub(crate) fn image_barrier<Id>(
    image: vk::Image,
    aspect_mask: vk::ImageAspectFlags,
    t: &Transition<Id>,
) -> vk::ImageMemoryBarrier2<'static> {
    let src = access_for(t.from);
    let dst = access_for(t.to);
    vk::ImageMemoryBarrier2 {
        s_type: vk::StructureType::IMAGE_MEMORY_BARRIER_2,
        src_stage_mask: src.stage,
        src_access_mask: src.access,
        dst_stage_mask: dst.stage,
        dst_access_mask: dst.access,
        old_layout: src.layout,
        new_layout: dst.layout,
        src_queue_family_index: vk::QUEUE_FAMILY_IGNORED,
        dst_queue_family_index: vk::QUEUE_FAMILY_IGNORED,
        image,
        subresource_range: vk::ImageSubresourceRange {
            aspect_mask,
            base_mip_level: 0,
            level_count: 1,
            base_array_layer: 0,
            layer_count: 1,
        },
        ..Default::default()
    }
}

/// Barrier for a freshly acquired swapchain image. Its source stage is the
/// acquire wait stage whatever the tracked state, so the layout change waits
/// for the acquire semaphore even on the image's first use.
pub(crate) fn acquire_barrier<Id>(image: vk::Image, t: &Transition<Id>) -> vk::ImageMemoryBarrier2<'static> {
    vk::ImageMemoryBarrier2 {
        src_stage_mask: ACQUIRE_WAIT_STAGE,
        ..image_barrier(image, vk::ImageAspectFlags::COLOR, t)
    }
}

pub(crate) fn buffer_barrier<Id>(
    buffer: vk::Buffer,
    t: &Transition<Id>,
) -> vk::BufferMemoryBarrier2<'static> {
    let src = access_for(t.from);
    let dst = access_for(t.to);
    vk::BufferMemoryBarrier2 {
        s_type: vk::StructureType::BUFFER_MEMORY_BARRIER_2,
        src_stage_mask: src.stage,
        src_access_mask: src.access,
        dst_stage_mask: dst.stage,
        dst_access_mask: dst.access,
        src_queue_family_index: vk::QUEUE_FAMILY_IGNORED,
        dst_queue_family_index: vk::QUEUE_FAMILY_IGNORED,
        buffer,
        offset: 0,
        size: vk::WHOLE_SIZE,
        ..Default::default()
    }
}

pub(crate) unsafe fn cmd_image_transition<Id>(
    device: &ash::Device,
    cmd: vk::CommandBuffer,
    image: vk::Image,
    aspect_mask: vk::ImageAspectFlags,
    t: &Transition<Id>,
) {
    cmd_image_barrier(device, cmd, &image_barrier(image, aspect_mask, t));
}

pub(crate) unsafe fn cmd_image_barrier(
    device: &ash::Device,
    cmd: vk::CommandBuffer,
    barrier: &vk::ImageMemoryBarrier2<'_>,
) {
    let dep = vk::DependencyInfo {
        s_type: vk::StructureType::DEPENDENCY_INFO,
        image_memory_barrier_count: 1,
        p_image_memory_barriers: barrier,
        ..Default::default()
    };
    device.cmd_pipeline_barrier2(cmd, &dep);
}

pub(crate) unsafe fn cmd_buffer_transitions(
    device: &ash::Device,
    cmd: vk::CommandBuffer,
    barriers: &[vk::BufferMemoryBarrier2<'_>],
) {
    let dep = vk::DependencyInfo {
        s_type: vk::StructureType::DEPENDENCY_INFO,
        buffer_memory_barrier_count: barriers.len() as u32,
        p_buffer_memory_barriers: barriers.as_ptr(),
        ..Default::default()
    };
    device.cmd_pipeline_barrier2(cmd, &dep);
}
