// src/pagination/controller.rs

use crate::app_config::Settings;
use crate::event_types::{DocumentLayout, PageRect};
use crate::pagination::PreloadWindow;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

const ZOOM_MIN: f32 = 0.5;
const ZOOM_MAX: f32 = 3.0;
const ZOOM_STEP: f32 = 0.25;

/// Visible-fraction threshold an incoming page must cross before a
/// scroll-derived page transition commits.
const SCROLL_COMMIT_FRACTION: f64 = 0.5;

/// Synchronously-updated view of the current page. The controller writes it
/// in the same call that commits a navigation, so a flush issued immediately
/// afterwards can never observe the previous page.
#[derive(Debug, Clone)]
pub struct CurrentPageHandle {
    page: Arc<AtomicU32>,
}

impl CurrentPageHandle {
    fn new(page: u32) -> Self {
        CurrentPageHandle {
            page: Arc::new(AtomicU32::new(page)),
        }
    }

    pub fn get(&self) -> u32 {
        self.page.load(Ordering::Acquire)
    }

    fn set(&self, page: u32) {
        self.page.store(page, Ordering::Release);
    }
}

/// Shared read of the presentational zoom scale, for renderers living
/// outside the reducer task. Purely presentational: tracking never reads it.
#[derive(Debug, Clone)]
pub struct ZoomHandle {
    scale_bits: Arc<AtomicU32>,
}

impl ZoomHandle {
    fn new(scale: f32) -> Self {
        ZoomHandle {
            scale_bits: Arc::new(AtomicU32::new(scale.to_bits())),
        }
    }

    pub fn get(&self) -> f32 {
        f32::from_bits(self.scale_bits.load(Ordering::Acquire))
    }

    fn set(&self, scale: f32) {
        self.scale_bits.store(scale.to_bits(), Ordering::Release);
    }
}

/// Owns the current page under discrete and scroll-derived navigation, the
/// monotone preload window, and the presentational zoom scale.
pub struct PaginationController {
    layout: DocumentLayout,
    current: CurrentPageHandle,
    preload: PreloadWindow,
    preload_ahead: u32,
    preload_behind: u32,
    zoom: ZoomHandle,
    last_scroll_top: f64,
    /// One-shot guard: set by programmatic navigation so the resulting
    /// scroll tick is not re-detected as a user page change.
    suppress_scroll_detection: bool,
}

impl PaginationController {
    pub fn new(layout: DocumentLayout, settings: &Settings) -> Self {
        let preload = PreloadWindow::new(layout.max_page(), settings.min_preloaded_count);
        PaginationController {
            current: CurrentPageHandle::new(1),
            preload,
            preload_ahead: settings.preload_ahead_count,
            preload_behind: settings.preload_behind_count,
            zoom: ZoomHandle::new(1.0),
            last_scroll_top: 0.0,
            suppress_scroll_detection: false,
            layout,
        }
    }

    pub fn max_page(&self) -> u32 {
        self.layout.max_page()
    }

    pub fn current_page(&self) -> u32 {
        self.current.get()
    }

    /// Cloneable synchronous handle for readers outside the controller.
    pub fn page_handle(&self) -> CurrentPageHandle {
        self.current.clone()
    }

    /// Shared preload flags, for the renderer deciding which pages may
    /// mount their media.
    pub fn preload_handle(&self) -> PreloadWindow {
        self.preload.clone()
    }

    /// Shared zoom scale, for the renderer applying the scale factor.
    pub fn zoom_handle(&self) -> ZoomHandle {
        self.zoom.clone()
    }

    pub fn is_page_loaded(&self, page: u32) -> bool {
        self.preload.is_loaded(page)
    }

    /// Advances one page, clamped at the upper bound (content pages plus
    /// synthetic slides). Returns the new page iff it changed.
    pub fn next(&mut self) -> Option<u32> {
        let page = self.current.get();
        if page >= self.max_page() {
            return None;
        }
        let new_page = page + 1;
        self.preload.mark_range(new_page, new_page + self.preload_ahead);
        self.current.set(new_page);
        Some(new_page)
    }

    /// Recedes one page, clamped at 1. Returns the new page iff it changed.
    pub fn previous(&mut self) -> Option<u32> {
        let page = self.current.get();
        if page <= 1 {
            return None;
        }
        let new_page = page - 1;
        self.preload.mark_range(new_page.saturating_sub(self.preload_behind), new_page);
        self.current.set(new_page);
        Some(new_page)
    }

    /// Intra-document jump: preloads the window around the target, commits
    /// the current page synchronously, and arms the one-shot scroll guard so
    /// the programmatic scroll that follows is not re-detected. The caller
    /// must flush the outgoing page's duration *before* invoking this.
    pub fn jump_to(&mut self, target: u32) -> u32 {
        let page = target.clamp(1, self.max_page());
        self.preload.mark_range(page.saturating_sub(2), page + 2);
        self.current.set(page);
        self.suppress_scroll_detection = true;
        tracing::debug!("Pagination: jump to page {}", page);
        page
    }

    /// Scroll offset for a page in continuous mode.
    pub fn scroll_offset_for(&self, page: u32, total_scrollable_height: f64) -> f64 {
        self.layout.scroll_offset_for(page, total_scrollable_height)
    }

    /// Scroll-derived page detection. The page with the largest visible
    /// fraction is the candidate; a transition commits only when the
    /// incoming page crosses the 50% threshold in the scroll direction.
    /// Returns the committed page, which the caller must feed into the
    /// tracker as a page change.
    pub fn observe_scroll(
        &mut self,
        scroll_top: f64,
        viewport_height: f64,
        page_rects: &[PageRect],
    ) -> Option<u32> {
        let scrolling_down = scroll_top > self.last_scroll_top;
        let moved = (scroll_top - self.last_scroll_top).abs() > f64::EPSILON;
        self.last_scroll_top = scroll_top;

        if self.suppress_scroll_detection {
            self.suppress_scroll_detection = false;
            return None;
        }
        if !moved || viewport_height <= 0.0 {
            return None;
        }

        let viewport_bottom = scroll_top + viewport_height;
        let mut candidate: Option<(u32, f64)> = None;
        for rect in page_rects {
            if rect.height <= 0.0 {
                continue;
            }
            let overlap =
                (rect.top + rect.height).min(viewport_bottom) - rect.top.max(scroll_top);
            // Fraction of whichever is smaller, the page or the viewport: a
            // page taller than the viewport (high zoom) can still reach the
            // commit threshold once it dominates the visible area.
            let reference = rect.height.min(viewport_height);
            let fraction = (overlap.max(0.0) / reference).min(1.0);
            match candidate {
                Some((_, best)) if fraction <= best => {}
                _ => candidate = Some((rect.page_number, fraction)),
            }
        }

        let (page, fraction) = candidate?;
        let current = self.current.get();
        if page == current || fraction < SCROLL_COMMIT_FRACTION {
            return None;
        }
        // Commit only in the direction the user is scrolling.
        if (scrolling_down && page < current) || (!scrolling_down && page > current) {
            return None;
        }

        if page > current {
            self.preload.mark_range(page, page + self.preload_ahead);
        } else {
            self.preload.mark_range(page.saturating_sub(self.preload_behind), page);
        }
        self.current.set(page);
        tracing::trace!(
            "Pagination: scroll committed page {} (fraction {:.2})",
            page,
            fraction
        );
        Some(page)
    }

    pub fn zoom(&self) -> f32 {
        self.zoom.get()
    }

    pub fn zoom_in(&mut self) -> f32 {
        let scale = (self.zoom.get() + ZOOM_STEP).min(ZOOM_MAX);
        self.zoom.set(scale);
        scale
    }

    pub fn zoom_out(&mut self) -> f32 {
        let scale = (self.zoom.get() - ZOOM_STEP).max(ZOOM_MIN);
        self.zoom.set(scale);
        scale
    }

    pub fn reset_zoom(&mut self) -> f32 {
        self.zoom.set(1.0);
        1.0
    }
}
