//! Reader/Writer: the endpoint pair that binds a [`FrameQueue`] between two
//! filters.
//!
//! Connection is symmetric (connecting a writer to a reader installs the
//! same queue on both); disconnection is one-sided and asynchronous — the
//! peer observes `connected == false` on its next access rather than being
//! notified immediately (spec.md §3, §4.2). That's implemented here with a
//! connected flag shared via `Arc<AtomicBool>` between the two endpoints,
//! rather than requiring either side to reach into the other filter's
//! locked state (which would risk a cross-filter lock-ordering deadlock).

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::queue::FrameQueue;

/// Consumer-side endpoint of a [`FrameQueue`].
pub struct Reader {
    queue: Option<Arc<FrameQueue>>,
    connected: Arc<AtomicBool>,
}

impl Reader {
    pub fn new() -> Self {
        Self {
            queue: None,
            connected: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }

    /// Installs `queue` directly, sharing `connected` with the peer writer.
    ///
    /// The original C++ `setReader` accepted a `FrameQueue*` argument and
    /// then silently ignored it, constructing a fresh disconnected `Reader`
    /// instead (spec.md §9, Open Question). Here the passed queue is what
    /// actually gets installed.
    pub(crate) fn install(&mut self, queue: Arc<FrameQueue>, connected: Arc<AtomicBool>) {
        self.queue = Some(queue);
        self.connected = connected;
    }

    pub fn queue(&self) -> Option<&Arc<FrameQueue>> {
        self.queue.as_ref()
    }

    /// One-sided disconnect: flips the shared flag. The peer writer sees
    /// `connected == false` the next time it checks, and is reaped by the
    /// next `demandDestinationFrames` sweep (spec.md §4.2).
    pub fn disconnect(&mut self) {
        self.connected.store(false, Ordering::Release);
    }
}

impl Default for Reader {
    fn default() -> Self {
        Self::new()
    }
}

/// Producer-side endpoint of a [`FrameQueue`].
pub struct Writer {
    queue: Option<Arc<FrameQueue>>,
    connected: Arc<AtomicBool>,
}

impl Writer {
    pub fn new() -> Self {
        Self {
            queue: None,
            connected: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }

    /// Establishes `queue` as the shared queue between this writer and
    /// `reader`, flipping both sides' connected flag. Returns `false`
    /// (without mutating either side) if either endpoint is already
    /// connected — the caller is expected to have allocated `queue` only
    /// after confirming both preconditions, so this should not normally
    /// fail (spec.md §9, Open Question: the writer itself is no longer
    /// constructed until all preconditions pass, so there's nothing to
    /// leak on this path either).
    pub fn connect(&mut self, reader: &mut Reader, queue: Arc<FrameQueue>) -> bool {
        if self.is_connected() || reader.is_connected() {
            return false;
        }
        let flag = Arc::new(AtomicBool::new(true));
        self.queue = Some(queue.clone());
        self.connected = flag.clone();
        reader.install(queue, flag);
        true
    }

    pub fn queue(&self) -> Option<&Arc<FrameQueue>> {
        self.queue.as_ref()
    }

    pub fn disconnect(&mut self) {
        self.connected.store(false, Ordering::Release);
    }
}

impl Default for Writer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids::FilterId;

    fn queue() -> Arc<FrameQueue> {
        Arc::new(FrameQueue::new(4, FilterId(1), FilterId(2)))
    }

    #[test]
    fn connect_flips_both_sides() {
        let mut w = Writer::new();
        let mut r = Reader::new();
        assert!(w.connect(&mut r, queue()));
        assert!(w.is_connected());
        assert!(r.is_connected());
    }

    #[test]
    fn second_connect_attempt_is_rejected() {
        let mut w = Writer::new();
        let mut r = Reader::new();
        assert!(w.connect(&mut r, queue()));
        let mut r2 = Reader::new();
        assert!(!w.connect(&mut r2, queue()), "writer already connected");
    }

    #[test]
    fn disconnect_is_observed_on_peer() {
        let mut w = Writer::new();
        let mut r = Reader::new();
        w.connect(&mut r, queue());
        w.disconnect();
        assert!(!r.is_connected(), "reader observes writer's disconnect");
        assert!(!w.is_connected());
    }
}
