// SPDX-License-Identifier: CEPL-1.0
use crate::ProtocolError;

/// Index of the current back buffer in a ring of `count` images.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BackBufferRing {
    count: usize,
    current: usize,
}

impl BackBufferRing {
    pub fn new(count: usize) -> Result<Self, ProtocolError> {
        if count == 0 {
            return Err(ProtocolError::EmptyRing);
        }
        Ok(Self { count, current: 0 })
    }

    pub fn count(&self) -> usize {
        self.count
    }

    pub fn current(&self) -> usize {
        self.current
    }

    /// Called after present: the next image becomes current.
    pub fn advance(&mut self) -> usize {
        self.current = (self.current + 1) % self.count;
        self.current
    }

    /// Adopt the index the presentation engine handed out. Returns whether it
    /// matched the expected rotation.
    pub fn acquired(&mut self, index: usize) -> Result<bool, ProtocolError> {
        if index >= self.count {
            return Err(ProtocolError::IndexOutOfRange {
                index,
                count: self.count,
            });
        }
        let in_order = index == self.current;
        self.current = index;
        Ok(in_order)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn two_buffers_alternate() {
        let mut ring = BackBufferRing::new(2).unwrap();
        let mut seq = vec![ring.current()];
        for _ in 0..7 {
            seq.push(ring.advance());
        }
        assert_eq!(seq, [0, 1, 0, 1, 0, 1, 0, 1]);
        assert!(seq.windows(2).all(|w| w[0] != w[1]));
    }

    #[test]
    fn three_buffers_never_skip() {
        let mut ring = BackBufferRing::new(3).unwrap();
        for i in 1..10 {
            assert_eq!(ring.advance(), i % 3);
        }
    }

    #[test]
    fn single_buffer_stays_put() {
        let mut ring = BackBufferRing::new(1).unwrap();
        assert_eq!(ring.advance(), 0);
    }

    #[test]
    fn zero_buffers_rejected() {
        assert_eq!(BackBufferRing::new(0), Err(ProtocolError::EmptyRing));
    }

    #[test]
    fn acquired_reports_rotation_mismatch() {
        let mut ring = BackBufferRing::new(2).unwrap();
        assert_eq!(ring.acquired(0), Ok(true));
        ring.advance();
        assert_eq!(ring.acquired(0), Ok(false));
        assert_eq!(ring.current(), 0);
        assert_eq!(
            ring.acquired(2),
            Err(ProtocolError::IndexOutOfRange { index: 2, count: 2 })
        );
    }
}
