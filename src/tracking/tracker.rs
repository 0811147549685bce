// src/tracking/tracker.rs

use crate::event_types::{PageViewPayload, TrackingEvent, ViewSession};
use crate::network::DeliveryHandle;
use crate::tracking::DurationAccumulator;
use std::time::{Duration, Instant};
use tokio::time::MissedTickBehavior;

/// Orchestrates duration accounting for the page currently on screen and
/// turns boundary events into flushes.
///
/// Per page visit the state machine is ENTER -> ACTIVE <-> HIDDEN <-> IDLE
/// -> EXIT, with ACTIVE the only accruing state. Every exit from ACTIVE
/// flushes the ledger once; the receiving endpoint accumulates additively,
/// so the total delivered for a page equals the wall-clock time it was
/// current minus hidden and idle sub-intervals, within one timer tick.
pub struct PageViewTracker {
    session: ViewSession,
    accumulator: DurationAccumulator,
    delivery: DeliveryHandle,
    interval_flush: Duration,
    interval: Option<tokio::time::Interval>,
    interval_page: Option<u32>,
}

impl PageViewTracker {
    pub fn new(
        session: ViewSession,
        delivery: DeliveryHandle,
        interval_flush: Duration,
        first_page: u32,
        now: Instant,
    ) -> Self {
        PageViewTracker {
            session,
            accumulator: DurationAccumulator::new(first_page, now),
            delivery,
            interval_flush,
            interval: None,
            interval_page: None,
        }
    }

    /// (Re-)arms the periodic non-final flush timer for the current page.
    /// Idempotent per page: re-invocation replaces the timer instead of
    /// stacking a second one.
    pub fn start_interval_tracking(&mut self) {
        let page = self.accumulator.page_number();
        if self.interval.is_some() && self.interval_page == Some(page) {
            tracing::trace!("Tracker: interval timer for page {} replaced", page);
        }
        let mut interval = tokio::time::interval_at(
            tokio::time::Instant::now() + self.interval_flush,
            self.interval_flush,
        );
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        self.interval = Some(interval);
        self.interval_page = Some(page);
    }

    /// Cancels the periodic timer. Called before page switches and on
    /// teardown; never leaves an orphaned timer behind.
    pub fn stop_interval_tracking(&mut self) {
        self.interval = None;
        self.interval_page = None;
    }

    /// Re-arms the segment clock without flushing. Used when the tab regains
    /// visibility: no duration may be attributed to the hidden gap.
    pub fn reset_tracking_state(&mut self, now: Instant) {
        self.accumulator.restart(now);
    }

    /// Completes when the periodic timer ticks; pends forever while no timer
    /// is armed, so the reducer can select on it unconditionally.
    pub async fn next_interval_tick(&mut self) {
        match self.interval.as_mut() {
            Some(interval) => {
                interval.tick().await;
            }
            None => std::future::pending().await,
        }
    }

    /// The flush primitive. Silently does nothing for preview sessions and
    /// skips non-positive durations; a final flush is routed through the
    /// teardown-safe path, everything else through the cancellable one.
    pub fn track_page_view_safely(&self, duration: Duration, page_number: u32, is_final: bool) {
        if self.session.is_preview {
            tracing::trace!("Tracker: preview session, flush suppressed");
            return;
        }
        let duration_ms = duration.as_millis() as u64;
        if duration_ms == 0 {
            tracing::trace!("Tracker: zero duration for page {}, flush skipped", page_number);
            return;
        }
        let payload = PageViewPayload::for_session(&self.session, page_number, duration_ms);
        if is_final {
            self.delivery.final_flush(payload);
        } else {
            self.delivery.flush(payload);
        }
    }

    /// Folds one boundary event into the ledger. Each arm charges the
    /// outgoing state before mutating it, then flushes at most once.
    pub fn handle_event(&mut self, event: TrackingEvent) {
        match event {
            TrackingEvent::PageChanged { page, at } => {
                let outgoing = self.accumulator.page_number();
                if page == outgoing {
                    return;
                }
                let duration = self.accumulator.take_for_flush(at);
                self.track_page_view_safely(duration, outgoing, false);
                self.accumulator.enter_page(page, at);
                // A fresh page gets a full interval period.
                if self.interval.is_some() {
                    self.start_interval_tracking();
                }
                tracing::debug!("Tracker: page {} -> {}", outgoing, page);
            }
            TrackingEvent::Visibility { visible: false, at } => {
                let duration = self.accumulator.take_for_flush(at);
                self.accumulator.set_visible(false);
                self.track_page_view_safely(duration, self.accumulator.page_number(), false);
            }
            TrackingEvent::Visibility { visible: true, at } => {
                self.accumulator.set_visible(true);
                self.reset_tracking_state(at);
            }
            TrackingEvent::Idle { idle: true, at } => {
                let duration = self.accumulator.take_for_flush(at);
                self.accumulator.set_idle(true);
                self.track_page_view_safely(duration, self.accumulator.page_number(), false);
            }
            TrackingEvent::Idle { idle: false, at } => {
                self.accumulator.set_idle(false);
                self.accumulator.restart(at);
            }
            TrackingEvent::IntervalTick { at } => {
                // Pure read, then restart: each interval flush carries only
                // the delta since the previous boundary.
                let duration = self.accumulator.active_duration(at);
                self.track_page_view_safely(duration, self.accumulator.page_number(), false);
                self.accumulator.restart(at);
            }
            TrackingEvent::Teardown { at } => {
                let duration = self.accumulator.take_for_flush(at);
                self.track_page_view_safely(duration, self.accumulator.page_number(), true);
                self.stop_interval_tracking();
                // Nothing accrues after teardown; a second disposal path
                // finds an empty ledger and sends nothing.
                self.accumulator.set_enabled(false);
            }
        }
    }

    pub fn current_page(&self) -> u32 {
        self.accumulator.page_number()
    }

    pub fn session(&self) -> &ViewSession {
        &self.session
    }
}
