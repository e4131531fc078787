// SPDX-License-Identifier: CEPL-1.0
use std::collections::HashMap;
use std::hash::Hash;

use crate::ProtocolError;

/// How a resource is currently being used by the GPU.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ResourceState {
    /// Contents undefined; only valid as a starting state.
    Undefined,
    Present,
    RenderTarget,
    DepthWrite,
    CopyDest,
    VertexBuffer,
    IndexBuffer,
}

/// A barrier to record, in program order, before the next use.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Transition<Id> {
    pub resource: Id,
    pub from: ResourceState,
    pub to: ResourceState,
}

/// Declared state of every tracked resource.
#[derive(Debug)]
pub struct StateTracker<Id> {
    states: HashMap<Id, ResourceState>,
}

impl<Id> Default for StateTracker<Id> {
    fn default() -> Self {
        Self {
            states: HashMap::new(),
        }
    }
}

impl<Id: Copy + Eq + Hash> StateTracker<Id> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, id: Id, initial: ResourceState) {
        self.states.insert(id, initial);
    }

    pub fn state(&self, id: Id) -> Option<ResourceState> {
        self.states.get(&id).copied()
    }

    /// Record the move to `to` and return the barrier describing it.
    pub fn transition(&mut self, id: Id, to: ResourceState) -> Result<Transition<Id>, ProtocolError> {
        let from = self.state(id).ok_or(ProtocolError::Untracked)?;
        if from == to || to == ResourceState::Undefined {
            return Err(ProtocolError::IllegalTransition { from, to });
        }
        self.states.insert(id, to);
        Ok(Transition {
            resource: id,
            from,
            to,
        })
    }

    /// Check that a use matches the declared state.
    pub fn expect(&self, id: Id, expected: ResourceState) -> Result<(), ProtocolError> {
        let actual = self.state(id).ok_or(ProtocolError::Untracked)?;
        if actual != expected {
            return Err(ProtocolError::WrongState { expected, actual });
        }
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use super::ResourceState::*;

    #[test]
    fn frame_round_trip_restores_present() {
        let mut t = StateTracker::new();
        t.register(0u32, Present);
        t.register(1u32, Present);
        for frame in 0..6u32 {
            let img = frame % 2;
            let before = t.state(img).unwrap();
            let a = t.transition(img, RenderTarget).unwrap();
            assert_eq!((a.from, a.to), (Present, RenderTarget));
            t.expect(img, RenderTarget).unwrap();
            let b = t.transition(img, Present).unwrap();
            assert_eq!((b.from, b.to), (RenderTarget, Present));
            assert_eq!(t.state(img), Some(before));
        }
    }

    #[test]
    fn upload_sequence() {
        let mut t = StateTracker::new();
        t.register("vb", CopyDest);
        t.transition("vb", VertexBuffer).unwrap();
        t.expect("vb", VertexBuffer).unwrap();
        assert_eq!(
            t.expect("vb", CopyDest),
            Err(ProtocolError::WrongState {
                expected: CopyDest,
                actual: VertexBuffer
            })
        );
    }

    #[test]
    fn redundant_and_undefined_targets_rejected() {
        let mut t = StateTracker::new();
        t.register(1u8, Present);
        assert_eq!(
            t.transition(1, Present),
            Err(ProtocolError::IllegalTransition {
                from: Present,
                to: Present
            })
        );
        assert!(t.transition(1, Undefined).is_err());
        // A failed transition leaves the state untouched.
        assert_eq!(t.state(1), Some(Present));
    }

    #[test]
    fn untracked_resources_error() {
        let mut t: StateTracker<u8> = StateTracker::new();
        assert_eq!(t.transition(9, Present), Err(ProtocolError::Untracked));
        assert!(t.is_empty());
        t.register(9, Undefined);
        assert_eq!(t.len(), 1);
        assert_eq!(
            t.expect(9, Present),
            Err(ProtocolError::WrongState {
                expected: Present,
                actual: Undefined
            })
        );
    }
}
