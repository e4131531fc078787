// SPDX-License-Identifier: CEPL-1.0
use bitflags::bitflags;
use glam::{Mat4, Vec3};
use std::f32::consts::PI;

pub const POLAR_MIN: f32 = 0.1;
pub const POLAR_MAX: f32 = PI - 0.1;
pub const RADIUS_MIN: f32 = 3.0;
pub const RADIUS_MAX: f32 = 15.0;

// Degrees of orbit per pixel of drag, and radius change per pixel of zoom drag.
const ORBIT_DEG_PER_PIXEL: f32 = 0.25;
const ZOOM_PER_PIXEL: f32 = 0.005;

const FOV_Y: f32 = 0.25 * PI;
const Z_NEAR: f32 = 0.1;
const Z_FAR: f32 = 1000.0;

bitflags! {
    /// Buttons held while the pointer moves.
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
    pub struct PointerButtons: u8 {
        const PRIMARY   = 1 << 0;
        const SECONDARY = 1 << 1;
        const MIDDLE    = 1 << 2;
    }
}

/// Camera orbiting the origin in spherical coordinates.
///
/// `theta` is the azimuth around +Y, `phi` the polar angle measured from +Y.
/// Both `phi` and `radius` are clamped on every mutation, so no input sequence
/// can leave the valid range.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct OrbitCamera {
    radius: f32,
    theta: f32,
    phi: f32,
    last_pointer: (i32, i32),
}

impl Default for OrbitCamera {
    fn default() -> Self {
        Self::new(5.0, 1.5 * PI, 0.25 * PI)
    }
}

impl OrbitCamera {
    pub fn new(radius: f32, theta: f32, phi: f32) -> Self {
        Self {
            radius: radius.clamp(RADIUS_MIN, RADIUS_MAX),
            theta,
            phi: phi.clamp(POLAR_MIN, POLAR_MAX),
            last_pointer: (0, 0),
        }
    }

    pub fn radius(&self) -> f32 {
        self.radius
    }

    pub fn theta(&self) -> f32 {
        self.theta
    }

    pub fn phi(&self) -> f32 {
        self.phi
    }

    /// Anchor a drag at the press position.
    pub fn pointer_down(&mut self, x: i32, y: i32) {
        self.last_pointer = (x, y);
    }

    pub fn pointer_up(&mut self, x: i32, y: i32) {
        self.last_pointer = (x, y);
    }

    /// Primary drag orbits, secondary drag zooms. Other moves only re-anchor.
    pub fn pointer_moved(&mut self, buttons: PointerButtons, x: i32, y: i32) {
        let dx = (i64::from(x) - i64::from(self.last_pointer.0)) as f32;
        let dy = (i64::from(y) - i64::from(self.last_pointer.1)) as f32;

        if buttons.contains(PointerButtons::PRIMARY) {
            self.theta += (ORBIT_DEG_PER_PIXEL * dx).to_radians();
            self.phi = (self.phi + (ORBIT_DEG_PER_PIXEL * dy).to_radians())
                .clamp(POLAR_MIN, POLAR_MAX);
        } else if buttons.contains(PointerButtons::SECONDARY) {
            self.radius = (self.radius + ZOOM_PER_PIXEL * (dx - dy)).clamp(RADIUS_MIN, RADIUS_MAX);
        }

        self.last_pointer = (x, y);
    }

    /// Cartesian eye position.
    pub fn eye(&self) -> Vec3 {
        let (sin_phi, cos_phi) = self.phi.sin_cos();
        let (sin_theta, cos_theta) = self.theta.sin_cos();
        Vec3::new(
            self.radius * sin_phi * cos_theta,
            self.radius * cos_phi,
            self.radius * sin_phi * sin_theta,
        )
    }

    /// Right-handed look-at toward the origin with +Y up.
    pub fn view(&self) -> Mat4 {
        Mat4::look_at_rh(self.eye(), Vec3::ZERO, Vec3::Y)
    }
}

/// Right-handed perspective with a [0, 1] depth range.
pub fn perspective(aspect: f32) -> Mat4 {
    Mat4::perspective_rh(FOV_Y, aspect.max(f32::EPSILON), Z_NEAR, Z_FAR)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn in_bounds(cam: &OrbitCamera) -> bool {
        (POLAR_MIN..=POLAR_MAX).contains(&cam.phi())
            && (RADIUS_MIN..=RADIUS_MAX).contains(&cam.radius())
    }

    #[test]
    fn constructor_clamps() {
        let cam = OrbitCamera::new(100.0, 0.0, -1.0);
        assert_eq!(cam.radius(), RADIUS_MAX);
        assert_eq!(cam.phi(), POLAR_MIN);
    }

    #[test]
    fn primary_drag_orbits() {
        let mut cam = OrbitCamera::default();
        let theta0 = cam.theta();
        cam.pointer_down(100, 100);
        cam.pointer_moved(PointerButtons::PRIMARY, 140, 100);
        assert!((cam.theta() - theta0 - 10f32.to_radians()).abs() < 1e-5);
    }

    #[test]
    fn secondary_drag_zooms() {
        let mut cam = OrbitCamera::default();
        cam.pointer_down(0, 0);
        cam.pointer_moved(PointerButtons::SECONDARY, 100, 0);
        assert!((cam.radius() - 5.5).abs() < 1e-5);
    }

    #[test]
    fn move_without_buttons_only_reanchors() {
        let mut cam = OrbitCamera::default();
        let before = cam;
        cam.pointer_down(0, 0);
        cam.pointer_moved(PointerButtons::empty(), 500, 500);
        assert_eq!(cam.radius(), before.radius());
        assert_eq!(cam.phi(), before.phi());
        // The next drag starts from the re-anchored point.
        cam.pointer_moved(PointerButtons::SECONDARY, 600, 500);
        assert!((cam.radius() - 5.5).abs() < 1e-5);
    }

    #[test]
    fn extreme_drags_stay_clamped() {
        let mut cam = OrbitCamera::default();
        cam.pointer_down(0, 0);
        cam.pointer_moved(PointerButtons::PRIMARY, 0, 100_000);
        assert_eq!(cam.phi(), POLAR_MAX);
        cam.pointer_moved(PointerButtons::PRIMARY, 0, -100_000);
        assert_eq!(cam.phi(), POLAR_MIN);
        cam.pointer_moved(PointerButtons::SECONDARY, 100_000, 0);
        assert_eq!(cam.radius(), RADIUS_MAX);
        cam.pointer_moved(PointerButtons::SECONDARY, -100_000, 0);
        assert_eq!(cam.radius(), RADIUS_MIN);
    }

    #[test]
    fn drags_across_the_whole_coordinate_range_do_not_overflow() {
        let mut cam = OrbitCamera::default();
        cam.pointer_down(i32::MIN, i32::MAX);
        cam.pointer_moved(PointerButtons::PRIMARY, i32::MAX, i32::MIN);
        assert!(in_bounds(&cam));
        assert_eq!(cam.phi(), POLAR_MIN);

        cam.pointer_moved(PointerButtons::SECONDARY, i32::MIN, i32::MAX);
        assert!(in_bounds(&cam));
        assert_eq!(cam.radius(), RADIUS_MIN);
        cam.pointer_moved(PointerButtons::SECONDARY, i32::MAX, i32::MIN);
        assert_eq!(cam.radius(), RADIUS_MAX);
    }

    #[test]
    fn pseudo_random_input_never_escapes_bounds() {
        let mut cam = OrbitCamera::default();
        let mut seed: u32 = 0x9E37_79B9;
        let mut next = || {
            seed ^= seed << 13;
            seed ^= seed >> 17;
            seed ^= seed << 5;
            seed
        };
        for _ in 0..10_000 {
            let x = (next() % 4000) as i32 - 2000;
            let y = (next() % 4000) as i32 - 2000;
            let buttons = PointerButtons::from_bits_truncate((next() % 8) as u8);
            match next() % 3 {
                0 => cam.pointer_down(x, y),
                1 => cam.pointer_up(x, y),
                _ => cam.pointer_moved(buttons, x, y),
            }
            assert!(in_bounds(&cam), "escaped bounds: {cam:?}");
        }
    }

    #[test]
    fn eye_lies_on_sphere() {
        let cam = OrbitCamera::new(7.0, 0.3, 1.1);
        assert!((cam.eye().length() - 7.0).abs() < 1e-4);
    }

    #[test]
    fn default_eye_matches_reference_pose() {
        // theta = 1.5 pi, phi = pi / 4, radius 5: eye sits on -Z, above the XZ plane.
        let eye = OrbitCamera::default().eye();
        assert!(eye.x.abs() < 1e-4);
        assert!((eye.y - 5.0 * (0.25 * PI).cos()).abs() < 1e-4);
        assert!(eye.z < 0.0);
    }

    #[test]
    fn view_maps_origin_in_front_of_camera() {
        let cam = OrbitCamera::default();
        let p = cam.view().transform_point3(Vec3::ZERO);
        assert!((p.z + cam.radius()).abs() < 1e-4);
    }
}
