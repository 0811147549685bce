use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Per-page "permitted to render" flags, 1-based. The window only ever
/// grows: once a page's media has been loaded it stays loaded.
///
/// Clones share the same flags, so the renderer can hold one handle and
/// observe marks committed by the pagination controller, the same way
/// `CurrentPageHandle` shares the current page.
#[derive(Debug, Clone)]
pub struct PreloadWindow {
    loaded: Arc<Vec<AtomicBool>>,
}

impl PreloadWindow {
    /// Marks the first `initial_count` pages loaded so the opening view
    /// renders instantly.
    pub fn new(max_page: u32, initial_count: u32) -> Self {
        let window = PreloadWindow {
            loaded: Arc::new((0..max_page).map(|_| AtomicBool::new(false)).collect()),
        };
        window.mark_range(1, initial_count.min(max_page));
        window
    }

    pub fn is_loaded(&self, page: u32) -> bool {
        page >= 1
            && (page as usize) <= self.loaded.len()
            && self.loaded[page as usize - 1].load(Ordering::Acquire)
    }

    pub fn mark_loaded(&self, page: u32) {
        if page >= 1 && (page as usize) <= self.loaded.len() {
            self.loaded[page as usize - 1].store(true, Ordering::Release);
        }
    }

    /// Marks an inclusive page range loaded, clamped to the valid range.
    pub fn mark_range(&self, from: u32, to: u32) {
        for page in from.max(1)..=to.min(self.loaded.len() as u32) {
            self.loaded[page as usize - 1].store(true, Ordering::Release);
        }
    }

    pub fn loaded_count(&self) -> usize {
        self.loaded
            .iter()
            .filter(|l| l.load(Ordering::Acquire))
            .count()
    }

    pub fn max_page(&self) -> u32 {
        self.loaded.len() as u32
    }
}
