//! Progress percentages reported over the life of a generation job.
//!
//! | stage                   | percent   |
//! |-------------------------|-----------|
//! | accepted                | 0         |
//! | submitted               | 10        |
//! | polling                 | 20 .. 80  |
//! | service reports done    | 80        |
//! | downloading             | 90        |
//! | asset on disk           | 100       |

pub const PROGRESS_STARTED: u8 = 0;
pub const PROGRESS_SUBMITTED: u8 = 10;
pub const PROGRESS_POLL_MIN: u8 = 20;
pub const PROGRESS_POLL_MAX: u8 = 80;
pub const PROGRESS_DOWNLOADING: u8 = 90;
pub const PROGRESS_COMPLETE: u8 = 100;

const POLL_SPAN: u32 = (PROGRESS_POLL_MAX - PROGRESS_POLL_MIN) as u32;

/// Map one poll attempt to a percentage inside the polling band.
///
/// A service-supplied `hint` (0-100) wins over the attempt count.
pub fn poll_progress(attempt: u32, max_attempts: u32, hint: Option<u8>) -> u8 {
    let offset = match hint {
        Some(h) => u32::from(h.min(100)) * POLL_SPAN / 100,
        None if max_attempts == 0 => 0,
        None => attempt.min(max_attempts) * POLL_SPAN / max_attempts,
    };
    (u32::from(PROGRESS_POLL_MIN) + offset).min(u32::from(PROGRESS_POLL_MAX)) as u8
}

/// Keeps reported progress non-decreasing for a single job.
#[derive(Debug, Clone, Default)]
pub struct ProgressTracker {
    last: Option<u8>,
}

impl ProgressTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `percent` and return the value to report, or `None` when it
    /// would not advance past what has already been reported.
    pub fn advance(&mut self, percent: u8) -> Option<u8> {
        let percent = percent.min(PROGRESS_COMPLETE);
        match self.last {
            Some(prev) if percent <= prev => None,
            _ => {
                self.last = Some(percent);
                Some(percent)
            }
        }
    }

    pub fn current(&self) -> u8 {
        self.last.unwrap_or(PROGRESS_STARTED)
    }
}
