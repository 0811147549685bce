use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Instant;
use uuid::Uuid;

/// Identity of one viewer sitting on one shared document. Created when the
/// viewer surface mounts, immutable for its lifetime, dropped on unmount.
#[derive(Debug, Clone)]
pub struct ViewSession {
    pub link_id: String,
    pub document_id: String,
    pub view_id: Option<Uuid>,
    pub version_number: u32,
    pub dataroom_id: Option<String>,
    /// Preview sessions never emit network traffic.
    pub is_preview: bool,
    pub started_at: DateTime<Utc>,
}

impl ViewSession {
    pub fn new(
        link_id: impl Into<String>,
        document_id: impl Into<String>,
        view_id: Option<Uuid>,
        version_number: u32,
        dataroom_id: Option<String>,
        is_preview: bool,
    ) -> Self {
        ViewSession {
            link_id: link_id.into(),
            document_id: document_id.into(),
            view_id,
            version_number,
            dataroom_id,
            is_preview,
            started_at: Utc::now(),
        }
    }
}

/// Wire payload for one duration flush. Field names match what the
/// aggregation endpoint expects; the endpoint accumulates additively per
/// (viewId, pageNumber), so overlapping flushes over-report by at most one
/// interval tick.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PageViewPayload {
    pub link_id: String,
    pub document_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub view_id: Option<Uuid>,
    /// Active milliseconds accrued since the previous flush boundary.
    pub duration: u64,
    pub page_number: u32,
    pub version_number: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dataroom_id: Option<String>,
}

impl PageViewPayload {
    pub fn for_session(session: &ViewSession, page_number: u32, duration_ms: u64) -> Self {
        PageViewPayload {
            link_id: session.link_id.clone(),
            document_id: session.document_id.clone(),
            view_id: session.view_id,
            duration: duration_ms,
            page_number,
            version_number: session.version_number,
            dataroom_id: session.dataroom_id.clone(),
        }
    }
}

/// Input kinds that count as viewer activity for idle detection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputKind {
    Pointer,
    Key,
    Scroll,
}

/// Transition emitted by the ActivityMonitor. `Idle` fires exactly once per
/// idle onset; `Resume` fires on the first qualifying input after it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActivityTransition {
    Idle,
    Resume,
}

/// Transition emitted by the VisibilityMonitor after deduplication.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VisibilityTransition {
    Hidden,
    Visible,
}

/// Raw visibility-ish signals the surface forwards. Focus/blur and the tab
/// visibility API overlap; the monitor collapses them into one boolean.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VisibilitySignal {
    TabHidden,
    TabVisible,
    WindowBlur,
    WindowFocus,
}

/// Geometry of one rendered page in document scroll coordinates, supplied by
/// the surface on every scroll tick (already scaled for zoom).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PageRect {
    pub page_number: u32,
    pub top: f64,
    pub height: f64,
}

/// What the rendering surface knows about the document being shown. The
/// synthetic trailing slides (feedback prompt, account-creation prompt) are
/// not content pages but count toward the pagination bound.
#[derive(Debug, Clone)]
pub struct DocumentLayout {
    pub total_pages: u32,
    /// Natural (unscaled) page dimensions, one per content page.
    pub page_dimensions: Vec<(f64, f64)>,
    pub has_feedback_slide: bool,
    pub has_account_creation_slide: bool,
}

impl DocumentLayout {
    pub fn extra_slide_count(&self) -> u32 {
        u32::from(self.has_feedback_slide) + u32::from(self.has_account_creation_slide)
    }

    /// Upper pagination bound: content pages plus synthetic slides.
    pub fn max_page(&self) -> u32 {
        self.total_pages + self.extra_slide_count()
    }

    /// Scroll offset of a page in continuous mode. The single home of this
    /// formula; pagination and the viewer handle both delegate here.
    pub fn scroll_offset_for(&self, page: u32, total_scrollable_height: f64) -> f64 {
        (page.saturating_sub(1)) as f64 * total_scrollable_height / self.max_page() as f64
    }
}

/// Everything the viewer surface can feed into the runtime reducer.
#[derive(Debug, Clone)]
pub enum SurfaceEvent {
    Input(InputKind),
    /// Viewer dismissed the away/paused affordance.
    DismissIdle,
    Visibility(VisibilitySignal),
    /// Discrete navigation request.
    NextPage,
    PreviousPage,
    /// Intra-document link jump.
    JumpToPage(u32),
    /// Presentational zoom actions (explicit controls or keyboard
    /// shortcuts); never consulted by tracking.
    ZoomIn,
    ZoomOut,
    ResetZoom,
    /// Continuous-mode scroll tick.
    Scroll {
        scroll_top: f64,
        viewport_height: f64,
        page_rects: Vec<PageRect>,
    },
    /// beforeunload / final teardown signal from the surface.
    Teardown,
}

/// Boundary events folded by the tracker. Each carries the instant it was
/// observed so the accumulator math stays deterministic under test.
#[derive(Debug, Clone, Copy)]
pub enum TrackingEvent {
    PageChanged { page: u32, at: Instant },
    Visibility { visible: bool, at: Instant },
    Idle { idle: bool, at: Instant },
    IntervalTick { at: Instant },
    Teardown { at: Instant },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_records_its_start_time() {
        let before = Utc::now();
        let session = ViewSession::new("link-1", "doc-1", None, 1, None, false);
        assert!(session.started_at >= before);
        assert!(session.started_at <= Utc::now());
    }

    #[test]
    fn scroll_offset_spreads_pages_over_the_scrollable_height() {
        let layout = DocumentLayout {
            total_pages: 20,
            page_dimensions: vec![(612.0, 792.0); 20],
            has_feedback_slide: false,
            has_account_creation_slide: false,
        };
        assert_eq!(layout.scroll_offset_for(1, 20_000.0), 0.0);
        assert_eq!(layout.scroll_offset_for(10, 20_000.0), 9_000.0);
        // Extra slides widen the divisor.
        let layout = DocumentLayout {
            has_feedback_slide: true,
            has_account_creation_slide: true,
            ..layout
        };
        assert_eq!(layout.scroll_offset_for(12, 22_000.0), 11_000.0);
    }
}
