// SPDX-License-Identifier: CEPL-1.0
use std::collections::HashMap;
use std::hash::Hash;

use winit::event::WindowEvent;
use winit::window::WindowId;

use crate::event::SurfaceEvent;
use crate::surface::Surface;

/// Explicit mapping from native window id to the component that owns it.
///
/// Event dispatch resolves the target through this map instead of through
/// per-window user data.
#[derive(Debug)]
pub struct Registry<K, V> {
    entries: HashMap<K, V>,
}

impl<K, V> Default for Registry<K, V> {
    fn default() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }
}

impl<K: Eq + Hash + Copy, V> Registry<K, V> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the previous owner, if any.
    pub fn insert(&mut self, key: K, value: V) -> Option<V> {
        self.entries.insert(key, value)
    }

    pub fn get(&self, key: K) -> Option<&V> {
        self.entries.get(&key)
    }

    pub fn get_mut(&mut self, key: K) -> Option<&mut V> {
        self.entries.get_mut(&key)
    }

    pub fn remove(&mut self, key: K) -> Option<V> {
        self.entries.remove(&key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

pub type SurfaceRegistry = Registry<WindowId, Surface>;

impl Registry<WindowId, Surface> {
    /// Route a native event to its surface. Events for unknown windows are dropped.
    pub fn dispatch(&mut self, id: WindowId, event: &WindowEvent) -> Option<SurfaceEvent> {
        self.get_mut(id)?.handle(event)
    }

    pub fn register(&mut self, surface: Surface) -> WindowId {
        let id = surface.id();
        self.insert(id, surface);
        id
    }
}
