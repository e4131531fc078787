// SPDX-License-Identifier: CEPL-1.0
//! Window surface, input translation and the window registry.
mod event;
mod registry;
mod surface;

pub use event::{translate_window_event, PointerTracker, SurfaceEvent};
pub use registry::{Registry, SurfaceRegistry};
pub use surface::{Surface, SurfaceState};

pub use winit;
