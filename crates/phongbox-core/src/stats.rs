// SPDX-License-Identifier: CEPL-1.0

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FrameReport {
    pub fps: f32,
    /// Milliseconds per frame.
    pub mspf: f32,
}

/// Counts frames and emits a report once per elapsed second of timer time.
#[derive(Debug, Default)]
pub struct FrameStats {
    frames: u32,
    window_start: f32,
}

impl FrameStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one rendered frame at `total_time` seconds.
    pub fn record(&mut self, total_time: f32) -> Option<FrameReport> {
        self.frames += 1;
        if total_time - self.window_start < 1.0 {
            return None;
        }
        let fps = self.frames as f32;
        let report = FrameReport {
            fps,
            mspf: 1000.0 / fps,
        };
        self.frames = 0;
        self.window_start += 1.0;
        Some(report)
    }
}
