// SPDX-License-Identifier: CEPL-1.0
use crate::frame::Lifecycle;
use crate::state::ResourceState;

/// Violations of the submission protocol. All of them indicate a logic error.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("command list is still open from a previous recording")]
    ListStillOpen,
    #[error("command list is not open for recording")]
    ListNotOpen,
    #[error("closed command list must be submitted before it is reset")]
    ListNotSubmitted,
    #[error("command allocator still in flight: needs fence {needed}, completed {completed}")]
    AllocatorInFlight { needed: u64, completed: u64 },
    #[error("fence did not reach {target} (completed {completed})")]
    FenceIncomplete { target: u64, completed: u64 },
    #[error("resource is not tracked")]
    Untracked,
    #[error("illegal transition {from:?} -> {to:?}")]
    IllegalTransition {
        from: ResourceState,
        to: ResourceState,
    },
    #[error("resource used as {expected:?} while in {actual:?}")]
    WrongState {
        expected: ResourceState,
        actual: ResourceState,
    },
    #[error("back-buffer ring needs at least one image")]
    EmptyRing,
    #[error("back-buffer index {index} out of range ({count} images)")]
    IndexOutOfRange { index: usize, count: usize },
    #[error("operation not valid while {0:?}")]
    WrongLifecycle(Lifecycle),
}
