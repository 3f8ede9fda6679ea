use std::time::{Duration, Instant};

const REPORT_INTERVAL: Duration = Duration::from_secs(1);

/// Counts presented frames and reports the rate once per second
pub struct FpsCounter {
    window_start: Instant,
    frame_count: u32,
}

impl FpsCounter {
    pub fn new(now: Instant) -> Self {
        Self {
            window_start: now,
            frame_count: 0,
        }
    }

    /// Records one frame; returns the frame rate when a full interval has passed
    pub fn tick(&mut self, now: Instant) -> Option<f64> {
        self.frame_count += 1;
        let elapsed = now.saturating_duration_since(self.window_start);
        if elapsed < REPORT_INTERVAL {
            return None;
        }

        let fps = f64::from(self.frame_count) / elapsed.as_secs_f64();
        self.window_start = now;
        self.frame_count = 0;
        Some(fps)
    }
}
