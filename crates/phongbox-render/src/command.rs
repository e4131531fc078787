// SPDX-License-Identifier: CEPL-1.0
use crate::ProtocolError;

/// Lifecycle of the single allocator/list pair.
///
/// `Pending { until }` means the last submission is covered by fence value `until`;
/// the allocator may be reset only once the fence has completed that value.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum CommandListState {
    #[default]
    Initial,
    Recording,
    Executable,
    Pending {
        until: u64,
    },
}

impl CommandListState {
    /// Reset allocator + list and open the list.
    pub fn begin(&mut self, completed: u64) -> Result<(), ProtocolError> {
        match *self {
            CommandListState::Recording => return Err(ProtocolError::ListStillOpen),
            CommandListState::Executable => return Err(ProtocolError::ListNotSubmitted),
            CommandListState::Pending { until } if completed < until => {
                return Err(ProtocolError::AllocatorInFlight {
                    needed: until,
                    completed,
                })
            }
            CommandListState::Initial | CommandListState::Pending { .. } => {}
        }
        *self = CommandListState::Recording;
        Ok(())
    }

    pub fn close(&mut self) -> Result<(), ProtocolError> {
        if *self != CommandListState::Recording {
            return Err(ProtocolError::ListNotOpen);
        }
        *self = CommandListState::Executable;
        Ok(())
    }

    /// Mark the closed list as enqueued; `until` is the fence value of the next flush.
    pub fn submitted(&mut self, until: u64) -> Result<(), ProtocolError> {
        match *self {
            CommandListState::Executable => {
                *self = CommandListState::Pending { until };
                Ok(())
            }
            CommandListState::Recording => Err(ProtocolError::ListStillOpen),
            _ => Err(ProtocolError::ListNotOpen),
        }
    }

    pub fn is_recording(&self) -> bool {
        *self == CommandListState::Recording
    }
}
