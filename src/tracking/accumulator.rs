use std::time::{Duration, Instant};

/// Active-time ledger for the page currently on screen.
///
/// Time is accounted in segments bounded by transitions (page change,
/// visibility change, idle change, interval flush, teardown). On every
/// boundary the elapsed segment is charged to the page only if the state
/// *before* the boundary was visible, not idle, and tracking-enabled; the
/// segment clock is then re-armed unconditionally. Hidden and idle spans
/// therefore fall out of the ledger without any continuous polling.
#[derive(Debug)]
pub struct DurationAccumulator {
    page_number: u32,
    segment_start: Instant,
    accrued: Duration,
    visible: bool,
    idle: bool,
    enabled: bool,
}

impl DurationAccumulator {
    pub fn new(page_number: u32, now: Instant) -> Self {
        DurationAccumulator {
            page_number,
            segment_start: now,
            accrued: Duration::ZERO,
            visible: true,
            idle: false,
            enabled: true,
        }
    }

    fn accruing(&self) -> bool {
        self.visible && !self.idle && self.enabled
    }

    /// Closes the current segment: charges it to the page if the state prior
    /// to the boundary was accruing, then re-arms the segment clock.
    pub fn on_boundary(&mut self, now: Instant) {
        if self.accruing() {
            self.accrued += now.saturating_duration_since(self.segment_start);
        }
        self.segment_start = now;
    }

    /// Pure read of the running total as of `now`, including the in-flight
    /// segment when currently accruing. Used by periodic flushes.
    pub fn active_duration(&self, now: Instant) -> Duration {
        let mut total = self.accrued;
        if self.accruing() {
            total += now.saturating_duration_since(self.segment_start);
        }
        total
    }

    /// Zeroes the ledger and re-arms the segment clock. Called after every
    /// flush and when the tab regains visibility, so no duration is ever
    /// attributed to the gap.
    pub fn restart(&mut self, now: Instant) {
        self.accrued = Duration::ZERO;
        self.segment_start = now;
    }

    /// Begins tracking a new page with a fresh ledger. Visibility and idle
    /// state carry over; only the page and its accrual reset.
    pub fn enter_page(&mut self, page_number: u32, now: Instant) {
        self.page_number = page_number;
        self.restart(now);
    }

    /// Closes the ledger for a page exit: boundary, then hands back the
    /// total and zeroes it so the flush cannot double-count.
    pub fn take_for_flush(&mut self, now: Instant) -> Duration {
        self.on_boundary(now);
        let total = self.accrued;
        self.accrued = Duration::ZERO;
        total
    }

    pub fn set_visible(&mut self, visible: bool) {
        self.visible = visible;
    }

    pub fn set_idle(&mut self, idle: bool) {
        self.idle = idle;
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    pub fn page_number(&self) -> u32 {
        self.page_number
    }

    pub fn is_visible(&self) -> bool {
        self.visible
    }

    pub fn is_idle(&self) -> bool {
        self.idle
    }
}
