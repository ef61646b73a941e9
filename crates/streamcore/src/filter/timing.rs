use crate::frame::{Micros, PresentationTime};

/// A filter's timestamping baseline (spec.md §4.4, §4.5).
///
/// `frame_time == 0` means "best effort": the filter has no mixing window
/// and just forwards whatever's freshest, taking `sync_ts` from the last
/// frame it actually consumed. `frame_time > 0` means the filter advances
/// `sync_ts` by a fixed step every tick regardless of which readers had
/// fresh data, mixing frames that fall inside `[sync_ts, sync_ts +
/// frame_time)`.
#[derive(Debug, Clone, Copy)]
pub struct Timing {
    pub frame_time: Micros,
    pub sync_ts: PresentationTime,
}

impl Timing {
    pub fn new(frame_time: Micros) -> Self {
        Self {
            frame_time,
            sync_ts: 0,
        }
    }
}

impl Default for Timing {
    fn default() -> Self {
        Self::new(0)
    }
}
