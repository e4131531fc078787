// SPDX-License-Identifier: CEPL-1.0
use anyhow::{Context, Result};
use tracing::{debug, info};
use winit::dpi::PhysicalSize;
use winit::event::WindowEvent;
use winit::event_loop::ActiveEventLoop;
use winit::window::{Window, WindowId};

use crate::event::{translate_window_event, PointerTracker, SurfaceEvent};

const MIN_SIZE: u32 = 200;

/// Pause bookkeeping for one surface, independent of the native window.
#[derive(Clone, Copy, Debug)]
pub struct SurfaceState {
    width: u32,
    height: u32,
    active: bool,
    occluded: bool,
    close_requested: bool,
}

impl SurfaceState {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            active: true,
            occluded: false,
            close_requested: false,
        }
    }

    pub fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn is_minimized(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    /// Inactive, minimized or occluded surfaces withhold GPU work.
    pub fn is_paused(&self) -> bool {
        !self.active || self.occluded || self.is_minimized()
    }

    pub fn close_requested(&self) -> bool {
        self.close_requested
    }

    pub fn apply(&mut self, event: &SurfaceEvent) {
        let was_paused = self.is_paused();
        match *event {
            SurfaceEvent::Resized { width, height } => {
                self.width = width;
                self.height = height;
            }
            SurfaceEvent::Focused(active) => self.active = active,
            SurfaceEvent::Occluded(occluded) => self.occluded = occluded,
            SurfaceEvent::CloseRequested => self.close_requested = true,
            SurfaceEvent::PointerDown { .. }
            | SurfaceEvent::PointerMoved { .. }
            | SurfaceEvent::PointerUp { .. } => {}
        }
        let paused = self.is_paused();
        if paused != was_paused {
            info!(
                "surface {}x{} → paused={}",
                self.width, self.height, paused
            );
        }
    }
}

/// An OS window plus its pause state and pointer tracking.
pub struct Surface {
    window: Window,
    state: SurfaceState,
    pointer: PointerTracker,
    title: String,
}

impl Surface {
    pub fn create(event_loop: &ActiveEventLoop, width: u32, height: u32, title: &str) -> Result<Self> {
        let attrs = Window::default_attributes()
            .with_title(title)
            .with_inner_size(PhysicalSize::new(width, height))
            .with_min_inner_size(PhysicalSize::new(MIN_SIZE, MIN_SIZE));
        let window = event_loop.create_window(attrs).context("create_window")?;
        let size = window.inner_size();
        debug!("window created ({}x{})", size.width, size.height);
        Ok(Self {
            window,
            state: SurfaceState::new(size.width, size.height),
            pointer: PointerTracker::default(),
            title: title.to_owned(),
        })
    }

    pub fn id(&self) -> WindowId {
        self.window.id()
    }

    pub fn window(&self) -> &Window {
        &self.window
    }

    pub fn state(&self) -> &SurfaceState {
        &self.state
    }

    pub fn is_paused(&self) -> bool {
        self.state.is_paused()
    }

    pub fn request_redraw(&self) {
        self.window.request_redraw();
    }

    /// Shows `status` after the base title.
    pub fn set_status(&self, status: &str) {
        self.window.set_title(&format!("{}    {}", self.title, status));
    }

    /// Translate, fold into the pause state, and forward.
    pub fn handle(&mut self, event: &WindowEvent) -> Option<SurfaceEvent> {
        let ev = translate_window_event(&mut self.pointer, event)?;
        self.state.apply(&ev);
        Some(ev)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_running() {
        assert!(!SurfaceState::new(800, 600).is_paused());
    }

    #[test]
    fn deactivate_pauses_and_activate_resumes() {
        let mut s = SurfaceState::new(800, 600);
        s.apply(&SurfaceEvent::Focused(false));
        assert!(s.is_paused());
        s.apply(&SurfaceEvent::Focused(true));
        assert!(!s.is_paused());
    }

    #[test]
    fn minimize_and_restore() {
        let mut s = SurfaceState::new(800, 600);
        s.apply(&SurfaceEvent::Resized { width: 0, height: 0 });
        assert!(s.is_minimized());
        assert!(s.is_paused());
        s.apply(&SurfaceEvent::Resized { width: 800, height: 600 });
        assert!(!s.is_paused());
    }

    #[test]
    fn occlusion_pauses_independently_of_focus() {
        let mut s = SurfaceState::new(800, 600);
        s.apply(&SurfaceEvent::Occluded(true));
        s.apply(&SurfaceEvent::Focused(true));
        assert!(s.is_paused());
        s.apply(&SurfaceEvent::Occluded(false));
        assert!(!s.is_paused());
    }

    #[test]
    fn close_is_latched() {
        let mut s = SurfaceState::new(800, 600);
        assert!(!s.close_requested());
        s.apply(&SurfaceEvent::CloseRequested);
        s.apply(&SurfaceEvent::Focused(true));
        assert!(s.close_requested());
    }
}
