// SPDX-License-Identifier: CEPL-1.0
use anyhow::{Context, Result};
use ash::vk;
use phongbox_math::{LightConstants, ObjectConstants};
use phongbox_render::FrameInputs;

use crate::buffer::UploadBuffer;
use crate::context::DeviceContext;

/// The two per-frame constant buffers: slot 0 object transforms, slot 1 lighting.
pub struct ConstantBuffers {
    pub object: UploadBuffer<ObjectConstants>,
    pub light: UploadBuffer<LightConstants>,
}

impl ConstantBuffers {
    pub fn new(ctx: &DeviceContext) -> Result<Self> {
        let mut object = UploadBuffer::new(ctx, 1, vk::BufferUsageFlags::UNIFORM_BUFFER)
            .context("object constants")?;
        let light = match UploadBuffer::new(ctx, 1, vk::BufferUsageFlags::UNIFORM_BUFFER) {
            Ok(light) => light,
            Err(e) => {
                unsafe { object.destroy(ctx.device()) };
                return Err(e.context("light constants"));
            }
        };
        Ok(Self { object, light })
    }

    /// Only valid once the previous frame's flush has returned.
    pub fn update(&mut self, inputs: &FrameInputs) -> Result<()> {
        let (object, light) = inputs.constants();
        self.object.write(0, &object)?;
        self.light.write(0, &light)?;
        Ok(())
    }

    pub(crate) unsafe fn destroy(&mut self, device: &ash::Device) {
        self.object.destroy(device);
        self.light.destroy(device);
    }
}
