// SPDX-License-Identifier: CEPL-1.0
//! Cleanup for objects created by a constructor that may fail halfway.
use tracing::debug;

/// Destroys what was registered, newest first, when dropped. A constructor
/// pushes one step per object it creates and calls [`InitGuard::disarm`]
/// once the finished value owns them.
#[derive(Default)]
pub(crate) struct InitGuard {
    steps: Vec<(&'static str, Box<dyn FnOnce()>)>,
}

impl InitGuard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, what: &'static str, undo: impl FnOnce() + 'static) {
        self.steps.push((what, Box::new(undo)));
    }

    /// Ownership moved elsewhere; nothing is destroyed.
    pub fn disarm(mut self) {
        self.steps.clear();
    }
}

impl Drop for InitGuard {
    fn drop(&mut self) {
        while let Some((what, undo)) = self.steps.pop() {
            debug!("unwinding partial init: {what}");
            undo();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    fn recording(log: &Rc<RefCell<Vec<&'static str>>>, names: &[&'static str]) -> InitGuard {
        let mut guard = InitGuard::new();
        for &name in names {
            let log = Rc::clone(log);
            guard.push(name, move || log.borrow_mut().push(name));
        }
        guard
    }

    #[test]
    fn failure_destroys_newest_first() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let guard = recording(&log, &["instance", "surface", "device", "command pool"]);
        drop(guard);
        assert_eq!(*log.borrow(), ["command pool", "device", "surface", "instance"]);
    }

    #[test]
    fn early_return_unwinds_only_what_was_created() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let build = |fail_at: usize| -> Result<InitGuard, usize> {
            let mut guard = InitGuard::new();
            for (i, name) in ["instance", "surface", "device"].into_iter().enumerate() {
                if i == fail_at {
                    return Err(i);
                }
                let log = Rc::clone(&log);
                guard.push(name, move || log.borrow_mut().push(name));
            }
            Ok(guard)
        };
        assert_eq!(build(2).err(), Some(2));
        assert_eq!(*log.borrow(), ["surface", "instance"]);
    }

    #[test]
    fn disarmed_guard_destroys_nothing() {
        let log = Rc::new(RefCell::new(Vec::new()));
        recording(&log, &["instance", "device"]).disarm();
        assert!(log.borrow().is_empty());
    }
}
