// SPDX-License-Identifier: CEPL-1.0
//! Unit cube with flat per-face normals: four vertices per face, two triangles per face.
use bytemuck::{Pod, Zeroable};

#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
pub struct Vertex {
    pub pos: [f32; 3],
    pub normal: [f32; 3],
    pub color: [f32; 4],
}

const fn v(pos: [f32; 3], normal: [f32; 3], color: [f32; 4]) -> Vertex {
    Vertex { pos, normal, color }
}

const WHITE: [f32; 4] = [1.0, 1.0, 1.0, 1.0];
const BLACK: [f32; 4] = [0.0, 0.0, 0.0, 1.0];
const RED: [f32; 4] = [1.0, 0.0, 0.0, 1.0];
const GREEN: [f32; 4] = [0.0, 1.0, 0.0, 1.0];
const BLUE: [f32; 4] = [0.0, 0.0, 1.0, 1.0];
const YELLOW: [f32; 4] = [1.0, 1.0, 0.0, 1.0];
const CYAN: [f32; 4] = [0.0, 1.0, 1.0, 1.0];
const MAGENTA: [f32; 4] = [1.0, 0.0, 1.0, 1.0];

pub const FACE_COUNT: usize = 6;
pub const VERTEX_COUNT: usize = 24;
pub const INDEX_COUNT: usize = 36;

pub const CUBE_VERTICES: [Vertex; VERTEX_COUNT] = [
    // -Z
    v([-1.0, -1.0, -1.0], [0.0, 0.0, -1.0], WHITE),
    v([-1.0, 1.0, -1.0], [0.0, 0.0, -1.0], BLACK),
    v([1.0, 1.0, -1.0], [0.0, 0.0, -1.0], RED),
    v([1.0, -1.0, -1.0], [0.0, 0.0, -1.0], GREEN),
    // +Z
    v([-1.0, -1.0, 1.0], [0.0, 0.0, 1.0], BLUE),
    v([-1.0, 1.0, 1.0], [0.0, 0.0, 1.0], YELLOW),
    v([1.0, 1.0, 1.0], [0.0, 0.0, 1.0], CYAN),
    v([1.0, -1.0, 1.0], [0.0, 0.0, 1.0], MAGENTA),
    // -X
    v([-1.0, -1.0, -1.0], [-1.0, 0.0, 0.0], WHITE),
    v([-1.0, 1.0, -1.0], [-1.0, 0.0, 0.0], BLACK),
    v([-1.0, 1.0, 1.0], [-1.0, 0.0, 0.0], YELLOW),
    v([-1.0, -1.0, 1.0], [-1.0, 0.0, 0.0], BLUE),
    // +X
    v([1.0, -1.0, -1.0], [1.0, 0.0, 0.0], GREEN),
    v([1.0, 1.0, -1.0], [1.0, 0.0, 0.0], RED),
    v([1.0, 1.0, 1.0], [1.0, 0.0, 0.0], CYAN),
    v([1.0, -1.0, 1.0], [1.0, 0.0, 0.0], MAGENTA),
    // +Y
    v([-1.0, 1.0, -1.0], [0.0, 1.0, 0.0], BLACK),
    v([-1.0, 1.0, 1.0], [0.0, 1.0, 0.0], YELLOW),
    v([1.0, 1.0, 1.0], [0.0, 1.0, 0.0], CYAN),
    v([1.0, 1.0, -1.0], [0.0, 1.0, 0.0], RED),
    // -Y
    v([-1.0, -1.0, -1.0], [0.0, -1.0, 0.0], WHITE),
    v([-1.0, -1.0, 1.0], [0.0, -1.0, 0.0], BLUE),
    v([1.0, -1.0, 1.0], [0.0, -1.0, 0.0], MAGENTA),
    v([1.0, -1.0, -1.0], [0.0, -1.0, 0.0], GREEN),
];

pub const CUBE_INDICES: [u16; INDEX_COUNT] = [
    0, 1, 2, 0, 2, 3, //
    4, 5, 6, 4, 6, 7, //
    8, 9, 10, 8, 10, 11, //
    12, 13, 14, 12, 14, 15, //
    16, 17, 18, 16, 18, 19, //
    20, 21, 22, 20, 22, 23,
];
