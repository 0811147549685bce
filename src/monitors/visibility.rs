use crate::event_types::{VisibilitySignal, VisibilityTransition};

/// Collapses the surface's tab-visibility and window focus/blur signals into
/// deduplicated hidden/visible transitions. Visibility is independent of
/// idle: a hidden tab never accrues duration regardless of idle state.
#[derive(Debug)]
pub struct VisibilityMonitor {
    is_visible: bool,
}

impl VisibilityMonitor {
    pub fn new() -> Self {
        VisibilityMonitor { is_visible: true }
    }

    /// Folds a raw signal; returns a transition only on an actual state
    /// change, so focus following an already-visible tab emits nothing.
    pub fn observe(&mut self, signal: VisibilitySignal) -> Option<VisibilityTransition> {
        let visible = match signal {
            VisibilitySignal::TabVisible | VisibilitySignal::WindowFocus => true,
            VisibilitySignal::TabHidden | VisibilitySignal::WindowBlur => false,
        };
        if visible == self.is_visible {
            return None;
        }
        self.is_visible = visible;
        let transition = if visible {
            VisibilityTransition::Visible
        } else {
            VisibilityTransition::Hidden
        };
        tracing::debug!("VisibilityMonitor: {:?} -> {:?}", signal, transition);
        Some(transition)
    }

    pub fn is_visible(&self) -> bool {
        self.is_visible
    }
}

impl Default for VisibilityMonitor {
    fn default() -> Self {
        Self::new()
    }
}
