// SPDX-License-Identifier: CEPL-1.0
use bytemuck::{Pod, Zeroable};
use glam::{Mat4, Vec3};
use std::marker::PhantomData;

/// Minimum offset alignment for constant-buffer elements.
pub const CONSTANT_BUFFER_ALIGNMENT: usize = 256;

pub const fn align_constant_size(size: usize) -> usize {
    (size + CONSTANT_BUFFER_ALIGNMENT - 1) & !(CONSTANT_BUFFER_ALIGNMENT - 1)
}

/// Binding slot 0. Matrices are column-major, matching GLSL `mat4` in a std140 block,
/// so the shader multiplies `world_view_proj * vec4(pos, 1)`.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
pub struct ObjectConstants {
    pub world: [[f32; 4]; 4],
    pub world_view_proj: [[f32; 4]; 4],
    pub time: f32,
    pub scale: f32,
    pub _pad: [f32; 2],
}

impl ObjectConstants {
    pub fn compose(world: Mat4, view: Mat4, proj: Mat4, time: f32) -> Self {
        let wvp = proj * view * world;
        Self {
            world: world.to_cols_array_2d(),
            world_view_proj: wvp.to_cols_array_2d(),
            time,
            scale: 1.0,
            _pad: [0.0; 2],
        }
    }
}

/// Binding slot 1.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
pub struct LightConstants {
    pub light_position: [f32; 4],
    pub light_color: [f32; 4],
    pub eye_position: [f32; 4],
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Light {
    pub position: Vec3,
    pub color: Vec3,
}

impl Default for Light {
    fn default() -> Self {
        Self {
            position: Vec3::new(3.0, 3.0, 3.0),
            color: Vec3::ONE,
        }
    }
}

impl LightConstants {
    pub fn compose(light: &Light, eye: Vec3) -> Self {
        Self {
            light_position: light.position.extend(1.0).to_array(),
            light_color: light.color.extend(1.0).to_array(),
            eye_position: eye.extend(1.0).to_array(),
        }
    }
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum SlotError {
    #[error("slot {index} out of range (count {count})")]
    OutOfRange { index: usize, count: usize },
    #[error("mapped region holds {have} bytes, slots need {need}")]
    RegionTooSmall { need: usize, have: usize },
}

/// Layout of `count` elements of `T`, each padded to the constant-buffer alignment,
/// inside one mapped byte region.
#[derive(Debug)]
pub struct ConstantSlots<T> {
    count: usize,
    _marker: PhantomData<T>,
}

impl<T> Clone for ConstantSlots<T> {
    fn clone(&self) -> Self {
        *self
    }
}
impl<T> Copy for ConstantSlots<T> {}

impl<T: Pod> ConstantSlots<T> {
    pub const fn new(count: usize) -> Self {
        Self {
            count,
            _marker: PhantomData,
        }
    }

    pub const fn stride(&self) -> usize {
        align_constant_size(std::mem::size_of::<T>())
    }

    pub const fn count(&self) -> usize {
        self.count
    }

    pub const fn byte_len(&self) -> usize {
        self.stride() * self.count
    }

    pub fn offset(&self, index: usize) -> Result<usize, SlotError> {
        if index >= self.count {
            return Err(SlotError::OutOfRange {
                index,
                count: self.count,
            });
        }
        Ok(index * self.stride())
    }

    fn range(&self, region_len: usize, index: usize) -> Result<std::ops::Range<usize>, SlotError> {
        if region_len < self.byte_len() {
            return Err(SlotError::RegionTooSmall {
                need: self.byte_len(),
                have: region_len,
            });
        }
        let start = self.offset(index)?;
        Ok(start..start + std::mem::size_of::<T>())
    }

    /// Copy `value` into slot `index`. Padding bytes are left untouched.
    pub fn write(&self, region: &mut [u8], index: usize, value: &T) -> Result<(), SlotError> {
        let range = self.range(region.len(), index)?;
        region[range].copy_from_slice(bytemuck::bytes_of(value));
        Ok(())
    }

    pub fn read(&self, region: &[u8], index: usize) -> Result<T, SlotError> {
        let range = self.range(region.len(), index)?;
        Ok(bytemuck::pod_read_unaligned(&region[range]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::OrbitCamera;

    #[test]
    fn alignment_rounds_up_to_256() {
        assert_eq!(align_constant_size(1), 256);
        assert_eq!(align_constant_size(256), 256);
        assert_eq!(align_constant_size(257), 512);
        assert_eq!(align_constant_size(std::mem::size_of::<ObjectConstants>()), 256);
        assert_eq!(align_constant_size(std::mem::size_of::<LightConstants>()), 256);
    }

    #[test]
    fn layouts_match_std140_sizes() {
        assert_eq!(std::mem::size_of::<ObjectConstants>(), 144);
        assert_eq!(std::mem::size_of::<LightConstants>(), 48);
    }

    #[test]
    fn object_constants_read_back_identically() {
        let cam = OrbitCamera::default();
        let world = Mat4::from_rotation_y(0.7);
        let value = ObjectConstants::compose(world, cam.view(), crate::perspective(4.0 / 3.0), 2.5);

        let slots = ConstantSlots::<ObjectConstants>::new(1);
        let mut region = vec![0xAAu8; slots.byte_len()];
        slots.write(&mut region, 0, &value).unwrap();

        let back = slots.read(&region, 0).unwrap();
        assert_eq!(bytemuck::bytes_of(&back), bytemuck::bytes_of(&value));
        // Tail padding of the aligned slot is not written.
        assert!(region[std::mem::size_of::<ObjectConstants>()..].iter().all(|&b| b == 0xAA));
    }

    #[test]
    fn light_constants_land_at_aligned_offsets() {
        let slots = ConstantSlots::<LightConstants>::new(3);
        let mut region = vec![0u8; slots.byte_len()];
        let light = Light::default();
        for i in 0..3 {
            let v = LightConstants::compose(&light, Vec3::splat(i as f32));
            slots.write(&mut region, i, &v).unwrap();
        }
        for i in 0..3 {
            assert_eq!(slots.offset(i).unwrap(), i * 256);
            let v = slots.read(&region, i).unwrap();
            assert_eq!(v.eye_position, [i as f32, i as f32, i as f32, 1.0]);
            assert_eq!(v.light_position, [3.0, 3.0, 3.0, 1.0]);
        }
    }

    #[test]
    fn out_of_range_and_short_regions_are_rejected() {
        let slots = ConstantSlots::<LightConstants>::new(2);
        let mut region = vec![0u8; slots.byte_len()];
        let v = LightConstants::compose(&Light::default(), Vec3::ZERO);
        assert_eq!(
            slots.write(&mut region, 2, &v),
            Err(SlotError::OutOfRange { index: 2, count: 2 })
        );
        let mut short = vec![0u8; 300];
        assert_eq!(
            slots.write(&mut short, 0, &v),
            Err(SlotError::RegionTooSmall { need: 512, have: 300 })
        );
    }

    #[test]
    fn world_view_proj_is_column_major_product() {
        let world = Mat4::from_translation(Vec3::new(1.0, 2.0, 3.0));
        let view = OrbitCamera::default().view();
        let proj = crate::perspective(1.0);
        let c = ObjectConstants::compose(world, view, proj, 0.0);
        let expected = proj * view * world;
        assert_eq!(Mat4::from_cols_array_2d(&c.world_view_proj), expected);
        // Translation sits in the fourth column.
        assert_eq!(c.world[3], [1.0, 2.0, 3.0, 1.0]);
    }
}
