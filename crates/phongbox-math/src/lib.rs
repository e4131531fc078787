// SPDX-License-Identifier: CEPL-1.0
//! Camera, constant-buffer layouts and the cube mesh shared by the renderer.
mod camera;
mod constants;
pub mod cube;

pub use camera::{perspective, OrbitCamera, PointerButtons, POLAR_MAX, POLAR_MIN, RADIUS_MAX, RADIUS_MIN};
pub use constants::{
    align_constant_size, Light, LightConstants, ObjectConstants, SlotError, ConstantSlots,
    CONSTANT_BUFFER_ALIGNMENT,
};
pub use cube::Vertex;

pub use glam::{Mat4, Vec3};
