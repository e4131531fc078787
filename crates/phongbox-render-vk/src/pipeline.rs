// SPDX-License-Identifier: CEPL-1.0
use std::mem::{offset_of, size_of};

use anyhow::{anyhow, Context, Result};
use ash::vk;
use phongbox_math::Vertex;
use tracing::debug;

use crate::constants::ConstantBuffers;
use crate::shader::{create_module, PhongSpirv};
use crate::unwind::InitGuard;

pub(crate) fn vertex_attributes() -> [vk::VertexInputAttributeDescription; 3] {
    [
        vk::VertexInputAttributeDescription {
            location: 0,
            binding: 0,
            format: vk::Format::R32G32B32_SFLOAT,
            offset: offset_of!(Vertex, pos) as u32,
        },
        vk::VertexInputAttributeDescription {
            location: 1,
            binding: 0,
            format: vk::Format::R32G32B32_SFLOAT,
            offset: offset_of!(Vertex, normal) as u32,
        },
        vk::VertexInputAttributeDescription {
            location: 2,
            binding: 0,
            format: vk::Format::R32G32B32A32_SFLOAT,
            offset: offset_of!(Vertex, color) as u32,
        },
    ]
}

unsafe fn uniform_set_layout(
    device: &ash::Device,
    stages: vk::ShaderStageFlags,
) -> Result<vk::DescriptorSetLayout> {
    let binding = vk::DescriptorSetLayoutBinding {
        binding: 0,
        descriptor_type: vk::DescriptorType::UNIFORM_BUFFER,
        descriptor_count: 1,
        stage_flags: stages,
        ..Default::default()
    };
    let ci = vk::DescriptorSetLayoutCreateInfo {
        s_type: vk::StructureType::DESCRIPTOR_SET_LAYOUT_CREATE_INFO,
        binding_count: 1,
        p_bindings: &binding,
        ..Default::default()
    };
    device
        .create_descriptor_set_layout(&ci, None)
        .context("create_descriptor_set_layout")
}

/// Root binding layout: set 0 = object constants, set 1 = light constants.
pub struct BindingLayout {
    set_layouts: [vk::DescriptorSetLayout; 2],
    pub pipeline_layout: vk::PipelineLayout,
    pool: vk::DescriptorPool,
    pub sets: [vk::DescriptorSet; 2],
}

impl BindingLayout {
    pub fn create(device: &ash::Device) -> Result<Self> {
        let mut guard = InitGuard::new();
        unsafe {
            let object = uniform_set_layout(
                device,
                vk::ShaderStageFlags::VERTEX | vk::ShaderStageFlags::FRAGMENT,
            )?;
            let d = device.clone();
            guard.push("object set layout", move || d.destroy_descriptor_set_layout(object, None));
            let light = uniform_set_layout(device, vk::ShaderStageFlags::FRAGMENT)?;
            let d = device.clone();
            guard.push("light set layout", move || d.destroy_descriptor_set_layout(light, None));
            let set_layouts = [object, light];

            let layout_info = vk::PipelineLayoutCreateInfo {
                s_type: vk::StructureType::PIPELINE_LAYOUT_CREATE_INFO,
                set_layout_count: set_layouts.len() as u32,
                p_set_layouts: set_layouts.as_ptr(),
                ..Default::default()
            };
            let pipeline_layout = device
                .create_pipeline_layout(&layout_info, None)
                .context("create_pipeline_layout")?;
            let d = device.clone();
            guard.push("pipeline layout", move || d.destroy_pipeline_layout(pipeline_layout, None));

            let pool_sizes = [vk::DescriptorPoolSize {
                ty: vk::DescriptorType::UNIFORM_BUFFER,
                descriptor_count: set_layouts.len() as u32,
            }];
            let pool_ci = vk::DescriptorPoolCreateInfo {
                s_type: vk::StructureType::DESCRIPTOR_POOL_CREATE_INFO,
                max_sets: set_layouts.len() as u32,
                pool_size_count: pool_sizes.len() as u32,
                p_pool_sizes: pool_sizes.as_ptr(),
                ..Default::default()
            };
            let pool = device
                .create_descriptor_pool(&pool_ci, None)
                .context("create_descriptor_pool")?;
            let d = device.clone();
            guard.push("descriptor pool", move || d.destroy_descriptor_pool(pool, None));

            let alloc = vk::DescriptorSetAllocateInfo {
                s_type: vk::StructureType::DESCRIPTOR_SET_ALLOCATE_INFO,
                descriptor_pool: pool,
                descriptor_set_count: set_layouts.len() as u32,
                p_set_layouts: set_layouts.as_ptr(),
                ..Default::default()
            };
            let allocated = device
                .allocate_descriptor_sets(&alloc)
                .context("allocate_descriptor_sets")?;

            guard.disarm();
            Ok(Self {
                set_layouts,
                pipeline_layout,
                pool,
                sets: [allocated[0], allocated[1]],
            })
        }
    }

    /// Point both sets at slot 0 of their constant buffers. Done once; the
    /// buffers are rewritten in place every frame.
    pub fn write(&self, device: &ash::Device, constants: &ConstantBuffers) -> Result<()> {
        let infos = [
            constants.object.descriptor_info(0)?,
            constants.light.descriptor_info(0)?,
        ];
        let writes: Vec<vk::WriteDescriptorSet> = self
            .sets
            .iter()
            .zip(infos.iter())
            .map(|(&set, info)| vk::WriteDescriptorSet {
                s_type: vk::StructureType::WRITE_DESCRIPTOR_SET,
                dst_set: set,
                dst_binding: 0,
                descriptor_count: 1,
                descriptor_type: vk::DescriptorType::UNIFORM_BUFFER,
                p_buffer_info: info,
                ..Default::default()
            })
            .collect();
        unsafe { device.update_descriptor_sets(&writes, &[]) };
        Ok(())
    }

    pub(crate) unsafe fn cmd_bind(&self, device: &ash::Device, cmd: vk::CommandBuffer) {
        device.cmd_bind_descriptor_sets(
            cmd,
            vk::PipelineBindPoint::GRAPHICS,
            self.pipeline_layout,
            0,
            &self.sets,
            &[],
        );
    }

    // Sets are freed with the pool.
    pub(crate) unsafe fn destroy(&self, device: &ash::Device) {
        device.destroy_descriptor_pool(self.pool, None);
        device.destroy_pipeline_layout(self.pipeline_layout, None);
        for &l in &self.set_layouts {
            device.destroy_descriptor_set_layout(l, None);
        }
    }
}

/// The single Phong graphics pipeline.
pub struct PhongPipeline {
    pub pipeline: vk::Pipeline,
    pub color_format: vk::Format,
    pub depth_format: vk::Format,
}

impl PhongPipeline {
    // STRICT: color_format MUST match the current swapchain format; rebuild on change.
    pub fn create(
        device: &ash::Device,
        layout: &BindingLayout,
        spirv: &PhongSpirv,
        color_format: vk::Format,
        depth_format: vk::Format,
    ) -> Result<Self> {
        unsafe {
            let vs = create_module(device, &spirv.vertex).context("vertex module")?;
            let fs = match create_module(device, &spirv.fragment) {
                Ok(fs) => fs,
                Err(e) => {
                    device.destroy_shader_module(vs, None);
                    return Err(e.context("fragment module"));
                }
            };
            let built = build_pipeline(device, layout.pipeline_layout, vs, fs, color_format, depth_format);
            device.destroy_shader_module(vs, None);
            device.destroy_shader_module(fs, None);
            let pipeline = built?;

            debug!("phong pipeline: color {:?}, depth {:?}", color_format, depth_format);
            Ok(Self {
                pipeline,
                color_format,
                depth_format,
            })
        }
    }

    pub(crate) unsafe fn destroy(&self, device: &ash::Device) {
        device.destroy_pipeline(self.pipeline, None);
    }
}

unsafe fn build_pipeline(
    device: &ash::Device,
    layout: vk::PipelineLayout,
    vs: vk::ShaderModule,
    fs: vk::ShaderModule,
    color_format: vk::Format,
    depth_format: vk::Format,
) -> Result<vk::Pipeline> {
    let entry = c"main";
    let stages = [
        vk::PipelineShaderStageCreateInfo {
            s_type: vk::StructureType::PIPELINE_SHADER_STAGE_CREATE_INFO,
            stage: vk::ShaderStageFlags::VERTEX,
            module: vs,
            p_name: entry.as_ptr(),
            ..Default::default()
        },
        vk::PipelineShaderStageCreateInfo {
            s_type: vk::StructureType::PIPELINE_SHADER_STAGE_CREATE_INFO,
            stage: vk::ShaderStageFlags::FRAGMENT,
            module: fs,
            p_name: entry.as_ptr(),
            ..Default::default()
        },
    ];

    let vb = vk::VertexInputBindingDescription {
        binding: 0,
        stride: size_of::<Vertex>() as u32,
        input_rate: vk::VertexInputRate::VERTEX,
    };
    let va = vertex_attributes();
    let vertex_input = vk::PipelineVertexInputStateCreateInfo {
        s_type: vk::StructureType::PIPELINE_VERTEX_INPUT_STATE_CREATE_INFO,
        vertex_binding_description_count: 1,
        p_vertex_binding_descriptions: &vb,
        vertex_attribute_description_count: va.len() as u32,
        p_vertex_attribute_descriptions: va.as_ptr(),
        ..Default::default()
    };
    let input_assembly = vk::PipelineInputAssemblyStateCreateInfo {
        s_type: vk::StructureType::PIPELINE_INPUT_ASSEMBLY_STATE_CREATE_INFO,
        topology: vk::PrimitiveTopology::TRIANGLE_LIST,
        ..Default::default()
    };
    let dyn_states = [vk::DynamicState::VIEWPORT, vk::DynamicState::SCISSOR];
    let dynamic_state = vk::PipelineDynamicStateCreateInfo {
        s_type: vk::StructureType::PIPELINE_DYNAMIC_STATE_CREATE_INFO,
        dynamic_state_count: dyn_states.len() as u32,
        p_dynamic_states: dyn_states.as_ptr(),
        ..Default::default()
    };
    let viewport_state = vk::PipelineViewportStateCreateInfo {
        s_type: vk::StructureType::PIPELINE_VIEWPORT_STATE_CREATE_INFO,
        viewport_count: 1,
        scissor_count: 1,
        ..Default::default()
    };
    // No culling: depth alone resolves visibility.
    let raster = vk::PipelineRasterizationStateCreateInfo {
        s_type: vk::StructureType::PIPELINE_RASTERIZATION_STATE_CREATE_INFO,
        polygon_mode: vk::PolygonMode::FILL,
        cull_mode: vk::CullModeFlags::NONE,
        front_face: vk::FrontFace::CLOCKWISE,
        line_width: 1.0,
        ..Default::default()
    };
    let multisample = vk::PipelineMultisampleStateCreateInfo {
        s_type: vk::StructureType::PIPELINE_MULTISAMPLE_STATE_CREATE_INFO,
        rasterization_samples: vk::SampleCountFlags::TYPE_1,
        ..Default::default()
    };
    let depth_stencil = vk::PipelineDepthStencilStateCreateInfo {
        s_type: vk::StructureType::PIPELINE_DEPTH_STENCIL_STATE_CREATE_INFO,
        depth_test_enable: vk::TRUE,
        depth_write_enable: vk::TRUE,
        depth_compare_op: vk::CompareOp::LESS_OR_EQUAL,
        ..Default::default()
    };
    let color_blend_att = vk::PipelineColorBlendAttachmentState {
        color_write_mask: vk::ColorComponentFlags::RGBA,
        blend_enable: vk::FALSE,
        ..Default::default()
    };
    let color_blend = vk::PipelineColorBlendStateCreateInfo {
        s_type: vk::StructureType::PIPELINE_COLOR_BLEND_STATE_CREATE_INFO,
        attachment_count: 1,
        p_attachments: &color_blend_att,
        ..Default::default()
    };

    let rendering = vk::PipelineRenderingCreateInfo {
        s_type: vk::StructureType::PIPELINE_RENDERING_CREATE_INFO,
        color_attachment_count: 1,
        p_color_attachment_formats: &color_format,
        // Stencil is never attached; the depth view covers the depth aspect only.
        depth_attachment_format: depth_format,
        ..Default::default()
    };

    let pipeline_info = vk::GraphicsPipelineCreateInfo {
        s_type: vk::StructureType::GRAPHICS_PIPELINE_CREATE_INFO,
        p_next: (&rendering as *const vk::PipelineRenderingCreateInfo) as *const _,
        stage_count: stages.len() as u32,
        p_stages: stages.as_ptr(),
        p_vertex_input_state: &vertex_input,
        p_input_assembly_state: &input_assembly,
        p_viewport_state: &viewport_state,
        p_rasterization_state: &raster,
        p_multisample_state: &multisample,
        p_depth_stencil_state: &depth_stencil,
        p_color_blend_state: &color_blend,
        p_dynamic_state: &dynamic_state,
        layout,
        ..Default::default()
    };

    let pipelines = device
        .create_graphics_pipelines(
            vk::PipelineCache::null(),
            std::slice::from_ref(&pipeline_info),
            None,
        )
        .map_err(|(_, err)| anyhow!("create_graphics_pipelines failed: {err:?}"))?;
    Ok(pipelines[0])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn attributes_match_vertex_layout() {
        let va = vertex_attributes();
        assert_eq!(size_of::<Vertex>(), 40);
        let offsets: Vec<u32> = va.iter().map(|a| a.offset).collect();
        assert_eq!(offsets, [0, 12, 24]);
        let locations: Vec<u32> = va.iter().map(|a| a.location).collect();
        assert_eq!(locations, [0, 1, 2]);
        assert_eq!(va[2].format, vk::Format::R32G32B32A32_SFLOAT);
    }
}
