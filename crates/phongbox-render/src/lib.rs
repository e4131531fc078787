// SPDX-License-Identifier: CEPL-1.0
//! Backend-neutral submission protocol: fence bookkeeping, command-list lifecycle,
//! back-buffer rotation, resource-state tracking and the frame orchestrator.
mod command;
mod error;
mod fence;
mod frame;
mod ring;
mod state;

pub use command::CommandListState;
pub use error::ProtocolError;
pub use fence::{CompletionSignal, FenceCounter};
pub use frame::{FrameBackend, FrameInputs, FrameLoop, Lifecycle, PointerInput, TickOutcome};
pub use ring::BackBufferRing;
pub use state::{ResourceState, StateTracker, Transition};

/// Number of swapchain back buffers.
pub const BACK_BUFFER_COUNT: usize = 2;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RenderSize {
    pub width: u32,
    pub height: u32,
}

impl RenderSize {
    pub fn aspect_ratio(&self) -> f32 {
        self.width.max(1) as f32 / self.height.max(1) as f32
    }
}
