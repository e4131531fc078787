// SPDX-License-Identifier: CEPL-1.0
//! The frame orchestrator.
//!
//! `FrameLoop` owns the camera and drives an injected [`FrameBackend`] through
//! update, record/submit, present and flush once per rendered frame. A frame
//! never overlaps the next: the flush at the end of each frame is what makes it
//! safe to rewrite the constant buffers and reset the command allocator.
use anyhow::{Context, Result};
use phongbox_core::Timer;
use phongbox_math::{perspective, Light, LightConstants, Mat4, ObjectConstants, OrbitCamera, PointerButtons, Vec3};
use tracing::{debug, info, warn};

use crate::ProtocolError;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Lifecycle {
    Uninitialized,
    Initialized,
    Idle,
    Rendering,
    ShuttingDown,
    Terminated,
}

/// Pointer input in surface pixel coordinates.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum PointerInput {
    Down { x: i32, y: i32 },
    Moved { buttons: PointerButtons, x: i32, y: i32 },
    Up { x: i32, y: i32 },
}

/// Everything the backend needs to fill the two constant slots for one frame.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FrameInputs {
    pub world: Mat4,
    pub view: Mat4,
    pub proj: Mat4,
    pub eye: Vec3,
    pub light: Light,
    pub total_time: f32,
}

impl FrameInputs {
    pub fn constants(&self) -> (ObjectConstants, LightConstants) {
        (
            ObjectConstants::compose(self.world, self.view, self.proj, self.total_time),
            LightConstants::compose(&self.light, self.eye),
        )
    }
}

/// The GPU side of a frame.
///
/// Calls arrive in a fixed order per rendered frame:
/// `update_constants`, `record_and_submit`, `present`, `flush`.
pub trait FrameBackend {
    /// Width over height of the current render target.
    fn aspect_ratio(&self) -> f32;

    /// Write the per-frame constants. Only called after the previous frame's flush.
    fn update_constants(&mut self, inputs: &FrameInputs) -> Result<()>;

    /// Reset the allocator, record the frame and submit it as one batch.
    fn record_and_submit(&mut self) -> Result<()>;

    /// Present the current back buffer and advance to the next one.
    fn present(&mut self) -> Result<()>;

    /// Block until all submitted work has completed. Returns the fence value waited on.
    fn flush(&mut self) -> Result<u64>;

    /// Destroy every GPU object, children before parents.
    fn release(&mut self);
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TickOutcome {
    /// Surface paused; no GPU work was issued.
    Idle,
    /// A frame was presented and the fence reached `fence`.
    Rendered { fence: u64 },
}

pub struct FrameLoop<B> {
    state: Lifecycle,
    backend: Option<B>,
    camera: OrbitCamera,
    light: Light,
    spin_rate: f32,
    frames_rendered: u64,
}

impl<B: FrameBackend> FrameLoop<B> {
    pub fn new(camera: OrbitCamera) -> Self {
        Self {
            state: Lifecycle::Uninitialized,
            backend: None,
            camera,
            light: Light::default(),
            spin_rate: 0.0,
            frames_rendered: 0,
        }
    }

    /// Rotation of the world about +Y, in radians per second of total time.
    pub fn with_spin_rate(mut self, radians_per_second: f32) -> Self {
        self.spin_rate = radians_per_second;
        self
    }

    pub fn with_light(mut self, light: Light) -> Self {
        self.light = light;
        self
    }

    pub fn state(&self) -> Lifecycle {
        self.state
    }

    pub fn camera(&self) -> &OrbitCamera {
        &self.camera
    }

    pub fn backend(&self) -> Option<&B> {
        self.backend.as_ref()
    }

    pub fn backend_mut(&mut self) -> Option<&mut B> {
        self.backend.as_mut()
    }

    pub fn frames_rendered(&self) -> u64 {
        self.frames_rendered
    }

    /// Create the backend. A failure leaves the loop uninitialized.
    pub fn initialize<F>(&mut self, create: F) -> Result<()>
    where
        F: FnOnce() -> Result<B>,
    {
        if self.state != Lifecycle::Uninitialized {
            return Err(ProtocolError::WrongLifecycle(self.state).into());
        }
        let backend = create().context("renderer initialization failed")?;
        self.backend = Some(backend);
        self.state = Lifecycle::Initialized;
        info!("renderer initialized");
        Ok(())
    }

    /// Run one iteration. When `paused` nothing reaches the GPU.
    pub fn tick(&mut self, paused: bool, timer: &Timer) -> Result<TickOutcome> {
        match self.state {
            Lifecycle::Initialized => self.state = Lifecycle::Idle,
            Lifecycle::Idle => {}
            other => return Err(ProtocolError::WrongLifecycle(other).into()),
        }
        if paused {
            return Ok(TickOutcome::Idle);
        }
        let Some(backend) = self.backend.as_mut() else {
            return Err(ProtocolError::WrongLifecycle(self.state).into());
        };

        self.state = Lifecycle::Rendering;

        let total_time = timer.total_time();
        let inputs = FrameInputs {
            world: Mat4::from_rotation_y(self.spin_rate * total_time),
            view: self.camera.view(),
            proj: perspective(backend.aspect_ratio()),
            eye: self.camera.eye(),
            light: self.light,
            total_time,
        };

        backend.update_constants(&inputs).context("update constants")?;
        backend.record_and_submit().context("record frame")?;
        backend.present().context("present")?;
        let fence = backend.flush().context("end-of-frame flush")?;

        self.frames_rendered += 1;
        self.state = Lifecycle::Idle;
        Ok(TickOutcome::Rendered { fence })
    }

    /// Apply pointer input to the camera between frames.
    pub fn on_pointer(&mut self, input: PointerInput) -> Result<(), ProtocolError> {
        match self.state {
            Lifecycle::Rendering | Lifecycle::ShuttingDown | Lifecycle::Terminated => {
                return Err(ProtocolError::WrongLifecycle(self.state))
            }
            _ => {}
        }
        match input {
            PointerInput::Down { x, y } => self.camera.pointer_down(x, y),
            PointerInput::Moved { buttons, x, y } => self.camera.pointer_moved(buttons, x, y),
            PointerInput::Up { x, y } => self.camera.pointer_up(x, y),
        }
        Ok(())
    }

    /// Final flush, then release. Safe to call from any state, including after a
    /// frame failed part way through; calling it again is a no-op.
    pub fn shutdown(&mut self) -> Result<()> {
        if self.state == Lifecycle::Terminated {
            return Ok(());
        }
        let from = self.state;
        self.state = Lifecycle::ShuttingDown;
        debug!(?from, "shutting down");

        let mut result = Ok(());
        if let Some(mut backend) = self.backend.take() {
            match backend.flush() {
                Ok(fence) => debug!(fence, "final flush complete"),
                Err(e) => {
                    warn!("final flush failed: {e:#}");
                    result = Err(e.context("final flush"));
                }
            }
            backend.release();
        }

        self.state = Lifecycle::Terminated;
        info!(frames = self.frames_rendered, "renderer terminated");
        result
    }
}
