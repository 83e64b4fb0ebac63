use foundation::time::Time;

/// Per-frame metadata handed to animation callbacks.
///
/// Frames are numbered from 0 for each loop. `dt_s` is the measured delta since the
/// previous frame, so callers never assume a fixed refresh rate.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct Frame {
    /// 0-based frame index within the loop.
    pub index: u64,
    /// Seconds since the previous frame.
    pub dt_s: f64,
    /// Loop time at the start of the frame (seconds).
    pub time: Time,
}

impl Frame {
    pub fn first() -> Self {
        Self {
            index: 0,
            dt_s: 0.0,
            time: Time(0.0),
        }
    }

    /// Advance by a measured delta. Negative deltas are clamped to zero.
    pub fn advance(self, dt_s: f64) -> Self {
        let dt_s = dt_s.max(0.0);
        Self {
            index: self.index + 1,
            dt_s,
            time: Time(self.time.0 + dt_s),
        }
    }
}
