use std::time::SystemTime;
use std::time::UNIX_EPOCH;

use tokio::time::Instant;

/// Source of wall-clock milliseconds for comparing against reset hints.
///
/// Reset hints are server wall-clock timestamps, so the system clock is read
/// on every call. An anchored clock instead advances with tokio's clock,
/// which lets `tokio::time::pause()` drive quota arithmetic in tests.
#[derive(Debug, Clone, Copy)]
pub struct Clock {
    source: Source,
}

#[derive(Debug, Clone, Copy)]
enum Source {
    System,
    Anchored { anchor: Instant, epoch_ms: u64 },
}

impl Default for Clock {
    fn default() -> Self {
        Self::system()
    }
}

impl Clock {
    /// Reads `SystemTime::now()` on every call.
    pub fn system() -> Self {
        Self {
            source: Source::System,
        }
    }

    /// Anchored so that "now" reads as `epoch_ms` and then follows tokio time.
    pub fn from_epoch_millis(epoch_ms: u64) -> Self {
        Self {
            source: Source::Anchored {
                anchor: Instant::now(),
                epoch_ms,
            },
        }
    }

    /// Milliseconds since the Unix epoch.
    pub fn now_ms(&self) -> u64 {
        match self.source {
            Source::System => SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .map(|d| d.as_millis() as u64)
                .unwrap_or_default(),
            Source::Anchored { anchor, epoch_ms } => {
                epoch_ms.saturating_add(anchor.elapsed().as_millis() as u64)
            }
        }
    }
}
