use crate::event_types::{ActivityTransition, InputKind};
use std::time::{Duration, Instant};

/// Watches qualifying viewer input (pointer, key, scroll) and derives the
/// idle flag. `Idle` is emitted exactly once per idle onset; only input or an
/// explicit dismiss of the away affordance clears it.
///
/// Known limitation: an actively playing media element produces no qualifying
/// input, so a viewer passively watching embedded video is classified idle.
#[derive(Debug)]
pub struct ActivityMonitor {
    inactivity_threshold: Duration,
    last_input_at: Instant,
    is_idle: bool,
}

impl ActivityMonitor {
    pub fn new(inactivity_threshold: Duration, now: Instant) -> Self {
        ActivityMonitor {
            inactivity_threshold,
            last_input_at: now,
            is_idle: false,
        }
    }

    /// Qualifying input: resets the inactivity clock, and returns `Resume`
    /// iff the monitor was idle immediately before this input.
    pub fn record_input(&mut self, kind: InputKind, now: Instant) -> Option<ActivityTransition> {
        tracing::trace!("ActivityMonitor: input {:?}", kind);
        self.last_input_at = now;
        if self.is_idle {
            self.is_idle = false;
            tracing::debug!("ActivityMonitor: viewer resumed after idle");
            return Some(ActivityTransition::Resume);
        }
        None
    }

    /// Dismissing the away/paused affordance counts as activity.
    pub fn dismiss(&mut self, now: Instant) -> Option<ActivityTransition> {
        self.record_input(InputKind::Pointer, now)
    }

    /// Periodic poll. Returns `Idle` on the single poll that crosses the
    /// inactivity threshold; subsequent polls while idle return nothing.
    pub fn check(&mut self, now: Instant) -> Option<ActivityTransition> {
        if self.is_idle {
            return None;
        }
        if now.duration_since(self.last_input_at) >= self.inactivity_threshold {
            self.is_idle = true;
            tracing::debug!(
                "ActivityMonitor: no input for {:?}, viewer marked idle",
                self.inactivity_threshold
            );
            return Some(ActivityTransition::Idle);
        }
        None
    }

    pub fn is_idle(&self) -> bool {
        self.is_idle
    }

    pub fn last_input_at(&self) -> Instant {
        self.last_input_at
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const THRESHOLD: Duration = Duration::from_secs(60);

    #[test]
    fn idle_emitted_exactly_once() {
        let start = Instant::now();
        let mut monitor = ActivityMonitor::new(THRESHOLD, start);

        assert_eq!(monitor.check(start + Duration::from_secs(30)), None);
        assert_eq!(
            monitor.check(start + Duration::from_secs(61)),
            Some(ActivityTransition::Idle)
        );
        // Repeated polls while idle stay quiet.
        assert_eq!(monitor.check(start + Duration::from_secs(120)), None);
        assert_eq!(monitor.check(start + Duration::from_secs(600)), None);
        assert!(monitor.is_idle());
    }

    #[test]
    fn input_resumes_and_rearms() {
        let start = Instant::now();
        let mut monitor = ActivityMonitor::new(THRESHOLD, start);

        assert_eq!(
            monitor.check(start + Duration::from_secs(61)),
            Some(ActivityTransition::Idle)
        );
        assert_eq!(
            monitor.record_input(InputKind::Key, start + Duration::from_secs(70)),
            Some(ActivityTransition::Resume)
        );
        assert!(!monitor.is_idle());
        // Threshold counts from the resume input, not the old idle onset.
        assert_eq!(monitor.check(start + Duration::from_secs(100)), None);
        assert_eq!(
            monitor.check(start + Duration::from_secs(131)),
            Some(ActivityTransition::Idle)
        );
    }

    #[test]
    fn input_while_active_emits_nothing() {
        let start = Instant::now();
        let mut monitor = ActivityMonitor::new(THRESHOLD, start);
        assert_eq!(monitor.record_input(InputKind::Scroll, start + Duration::from_secs(1)), None);
        assert_eq!(monitor.record_input(InputKind::Pointer, start + Duration::from_secs(2)), None);
    }

    #[test]
    fn dismiss_clears_idle() {
        let start = Instant::now();
        let mut monitor = ActivityMonitor::new(THRESHOLD, start);
        monitor.check(start + Duration::from_secs(61));
        assert!(monitor.is_idle());
        assert_eq!(
            monitor.dismiss(start + Duration::from_secs(65)),
            Some(ActivityTransition::Resume)
        );
        assert!(!monitor.is_idle());
    }
}
