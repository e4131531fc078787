// SPDX-License-Identifier: CEPL-1.0
use phongbox_math::PointerButtons;
use winit::event::{ElementState, MouseButton, WindowEvent};

/// Surface events the renderer cares about, in physical pixels.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SurfaceEvent {
    Resized { width: u32, height: u32 },
    PointerDown { buttons: PointerButtons, x: i32, y: i32 },
    PointerMoved { buttons: PointerButtons, x: i32, y: i32 },
    PointerUp { buttons: PointerButtons, x: i32, y: i32 },
    /// Activate (`true`) / deactivate (`false`).
    Focused(bool),
    Occluded(bool),
    CloseRequested,
}

/// Tracks the held-button mask and last cursor position, since winit reports
/// button changes without a position.
#[derive(Clone, Copy, Debug, Default)]
pub struct PointerTracker {
    buttons: PointerButtons,
    x: i32,
    y: i32,
}

impl PointerTracker {
    pub fn buttons(&self) -> PointerButtons {
        self.buttons
    }

    pub fn position(&self) -> (i32, i32) {
        (self.x, self.y)
    }

    pub fn moved(&mut self, x: i32, y: i32) -> SurfaceEvent {
        self.x = x;
        self.y = y;
        SurfaceEvent::PointerMoved {
            buttons: self.buttons,
            x,
            y,
        }
    }

    pub fn pressed(&mut self, button: PointerButtons) -> SurfaceEvent {
        self.buttons |= button;
        SurfaceEvent::PointerDown {
            buttons: self.buttons,
            x: self.x,
            y: self.y,
        }
    }

    pub fn released(&mut self, button: PointerButtons) -> SurfaceEvent {
        self.buttons.remove(button);
        SurfaceEvent::PointerUp {
            buttons: self.buttons,
            x: self.x,
            y: self.y,
        }
    }
}

fn map_button(button: MouseButton) -> Option<PointerButtons> {
    match button {
        MouseButton::Left => Some(PointerButtons::PRIMARY),
        MouseButton::Right => Some(PointerButtons::SECONDARY),
        MouseButton::Middle => Some(PointerButtons::MIDDLE),
        _ => None,
    }
}

/// Translates a winit `WindowEvent`. Returns `None` for events the renderer ignores.
pub fn translate_window_event(
    pointer: &mut PointerTracker,
    event: &WindowEvent,
) -> Option<SurfaceEvent> {
    match event {
        WindowEvent::Resized(size) => Some(SurfaceEvent::Resized {
            width: size.width,
            height: size.height,
        }),
        WindowEvent::CursorMoved { position, .. } => {
            Some(pointer.moved(position.x as i32, position.y as i32))
        }
        WindowEvent::MouseInput { state, button, .. } => {
            let b = map_button(*button)?;
            Some(match state {
                ElementState::Pressed => pointer.pressed(b),
                ElementState::Released => pointer.released(b),
            })
        }
        WindowEvent::Focused(f) => Some(SurfaceEvent::Focused(*f)),
        WindowEvent::Occluded(o) => Some(SurfaceEvent::Occluded(*o)),
        WindowEvent::CloseRequested => Some(SurfaceEvent::CloseRequested),
        _ => None,
    }
}
