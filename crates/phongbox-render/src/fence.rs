// SPDX-License-Identifier: CEPL-1.0
use anyhow::Result;
use tracing::trace;

use crate::ProtocolError;

/// A GPU-to-CPU completion counter.
pub trait CompletionSignal {
    /// Ask the queue to set the counter to `value` once all previously
    /// enqueued work has completed.
    fn enqueue_signal(&mut self, value: u64) -> Result<()>;

    fn completed_value(&self) -> Result<u64>;

    /// Block until the counter reaches `value`. No timeout.
    fn wait_for(&self, value: u64) -> Result<()>;
}

/// Owns the fence target value and implements the stop-the-world flush.
#[derive(Debug)]
pub struct FenceCounter<S> {
    signal: S,
    target: u64,
}

impl<S: CompletionSignal> FenceCounter<S> {
    pub fn new(signal: S) -> Self {
        Self { signal, target: 0 }
    }

    /// The value of the most recent flush.
    pub fn target(&self) -> u64 {
        self.target
    }

    pub fn signal(&self) -> &S {
        &self.signal
    }

    pub fn signal_mut(&mut self) -> &mut S {
        &mut self.signal
    }

    pub fn completed(&self) -> Result<u64> {
        self.signal.completed_value()
    }

    /// True once resources tagged with `value` may be reused.
    pub fn is_complete(&self, value: u64) -> Result<bool> {
        Ok(self.signal.completed_value()? >= value)
    }

    /// Signal a fresh value behind all enqueued work and wait for it.
    ///
    /// On return every command enqueued before the call has completed.
    pub fn flush(&mut self) -> Result<u64> {
        self.target += 1;
        let target = self.target;
        self.signal.enqueue_signal(target)?;

        if self.signal.completed_value()? < target {
            self.signal.wait_for(target)?;
        }

        let completed = self.signal.completed_value()?;
        if completed < target {
            return Err(ProtocolError::FenceIncomplete { target, completed }.into());
        }
        trace!("flush → fence {target}");
        Ok(target)
    }

    pub fn into_inner(self) -> S {
        self.signal
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    /// Completes a signal only when someone waits for it.
    #[derive(Default)]
    struct LazySignal {
        pending: Option<u64>,
        completed: Cell<u64>,
        waits: Cell<u32>,
    }

    impl CompletionSignal for LazySignal {
        fn enqueue_signal(&mut self, value: u64) -> Result<()> {
            self.pending = Some(value);
            Ok(())
        }
        fn completed_value(&self) -> Result<u64> {
            Ok(self.completed.get())
        }
        fn wait_for(&self, value: u64) -> Result<()> {
            self.waits.set(self.waits.get() + 1);
            if let Some(p) = self.pending {
                if p >= value {
                    self.completed.set(p);
                }
            }
            Ok(())
        }
    }

    /// Never completes.
    struct HungSignal;

    impl CompletionSignal for HungSignal {
        fn enqueue_signal(&mut self, _value: u64) -> Result<()> {
            Ok(())
        }
        fn completed_value(&self) -> Result<u64> {
            Ok(0)
        }
        fn wait_for(&self, _value: u64) -> Result<()> {
            Ok(())
        }
    }

    #[test]
    fn targets_strictly_increase_and_complete() {
        let mut fence = FenceCounter::new(LazySignal::default());
        let mut last = fence.target();
        for _ in 0..50 {
            let t = fence.flush().unwrap();
            assert!(t > last);
            assert!(fence.completed().unwrap() >= t);
            assert!(fence.is_complete(t).unwrap());
            last = t;
        }
        assert_eq!(fence.target(), 50);
        assert_eq!(fence.signal().waits.get(), 50);
    }

    #[test]
    fn no_wait_when_already_complete() {
        struct Eager(u64);
        impl CompletionSignal for Eager {
            fn enqueue_signal(&mut self, value: u64) -> Result<()> {
                self.0 = value;
                Ok(())
            }
            fn completed_value(&self) -> Result<u64> {
                Ok(self.0)
            }
            fn wait_for(&self, _value: u64) -> Result<()> {
                panic!("should not wait");
            }
        }
        let mut fence = FenceCounter::new(Eager(0));
        assert_eq!(fence.flush().unwrap(), 1);
    }

    #[test]
    fn signal_that_never_arrives_is_an_error() {
        let mut fence = FenceCounter::new(HungSignal);
        let err = fence.flush().unwrap_err();
        assert_eq!(
            err.downcast_ref::<ProtocolError>(),
            Some(&ProtocolError::FenceIncomplete {
                target: 1,
                completed: 0
            })
        );
    }
}
