// src/viewer.rs

use crate::app_config::Settings;
use crate::errors::TrackerError;
use crate::event_types::{
    ActivityTransition, DocumentLayout, SurfaceEvent, TrackingEvent, ViewSession,
    VisibilityTransition,
};
use crate::monitors::{ActivityMonitor, VisibilityMonitor};
use crate::network::DeliveryHandle;
use crate::pagination::{CurrentPageHandle, PaginationController, PreloadWindow, ZoomHandle};
use crate::tracking::PageViewTracker;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{mpsc, watch};
use tokio::time::MissedTickBehavior;

/// One mounted viewer. Starting it acquires every resource the tracking
/// stack needs (reducer task, timers, channels); `shutdown()` is the single
/// disposal path for all of them, whatever triggered it (navigation away,
/// error, unmount).
pub struct ViewerHandle {
    event_tx: mpsc::Sender<SurfaceEvent>,
    shutdown_tx: watch::Sender<bool>,
    idle_rx: watch::Receiver<bool>,
    page_handle: CurrentPageHandle,
    preload: PreloadWindow,
    zoom: ZoomHandle,
    layout: DocumentLayout,
    reducer_task: tokio::task::JoinHandle<Result<(), TrackerError>>,
    delivery_task: Option<tokio::task::JoinHandle<Result<(), TrackerError>>>,
}

pub struct ViewerRuntime;

impl ViewerRuntime {
    /// Wires monitors, tracker, and pagination into a single reducer task
    /// and starts interval tracking for page 1. The delivery handle comes
    /// from `create_delivery_channel`; pass its join handle too if this
    /// viewer should drain the delivery queue on shutdown.
    pub fn start(
        settings: Arc<Settings>,
        session: ViewSession,
        layout: DocumentLayout,
        delivery: DeliveryHandle,
        delivery_task: Option<tokio::task::JoinHandle<Result<(), TrackerError>>>,
    ) -> ViewerHandle {
        let (event_tx, event_rx) = mpsc::channel::<SurfaceEvent>(128);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let (idle_tx, idle_rx) = watch::channel(false);

        let controller = PaginationController::new(layout.clone(), &settings);
        let page_handle = controller.page_handle();
        let preload = controller.preload_handle();
        let zoom = controller.zoom_handle();

        tracing::info!(
            "Viewer started at {}. Document: {}, link: {}, pages: {} (+{} extra), preview: {}",
            session.started_at.to_rfc3339(),
            session.document_id,
            session.link_id,
            layout.total_pages,
            layout.extra_slide_count(),
            session.is_preview
        );

        let reducer_task = tokio::spawn(run_viewer_reducer(
            Arc::clone(&settings),
            session,
            controller,
            delivery,
            event_rx,
            shutdown_rx,
            idle_tx,
        ));

        ViewerHandle {
            event_tx,
            shutdown_tx,
            idle_rx,
            page_handle,
            preload,
            zoom,
            layout,
            reducer_task,
            delivery_task,
        }
    }
}

impl ViewerHandle {
    /// Forwards a surface event into the reducer. Fire-and-forget: a full
    /// queue drops the event rather than blocking the UI.
    pub fn send(&self, event: SurfaceEvent) {
        if let Err(e) = self.event_tx.try_send(event) {
            tracing::warn!("Viewer: dropping surface event, queue unavailable: {}", e);
        }
    }

    /// Synchronously-updated current page. Always reflects the last
    /// committed navigation, never a stale deferred value.
    pub fn current_page(&self) -> u32 {
        self.page_handle.get()
    }

    /// Observable idle flag for the away/paused affordance.
    pub fn idle_notice(&self) -> watch::Receiver<bool> {
        self.idle_rx.clone()
    }

    /// Whether the renderer may mount media for a page. Shares the preload
    /// flags with the controller, like `current_page`.
    pub fn is_page_loaded(&self, page: u32) -> bool {
        self.preload.is_loaded(page)
    }

    /// Current presentational zoom scale.
    pub fn zoom(&self) -> f32 {
        self.zoom.get()
    }

    /// Target scroll offset for a page jump in continuous mode.
    pub fn scroll_offset_for(&self, page: u32, total_scrollable_height: f64) -> f64 {
        self.layout.scroll_offset_for(page, total_scrollable_height)
    }

    /// The single disposal path: issues the final teardown-safe flush,
    /// stops the reducer, and waits for the delivery queue to drain.
    pub async fn shutdown(self) {
        let ViewerHandle {
            event_tx,
            shutdown_tx,
            reducer_task,
            delivery_task,
            ..
        } = self;

        if shutdown_tx.send(true).is_err() {
            tracing::warn!("Viewer: reducer already gone at shutdown.");
        }
        drop(event_tx);

        match tokio::time::timeout(std::time::Duration::from_secs(5), reducer_task).await {
            Ok(Ok(Ok(()))) => tracing::debug!("Viewer: reducer completed."),
            Ok(Ok(Err(e))) => tracing::error!("Viewer: reducer finished with error: {}", e),
            Ok(Err(e)) => tracing::error!("Viewer: reducer panicked or was cancelled: {}", e),
            Err(_) => tracing::warn!("Viewer: reducer timed out during shutdown."),
        }

        if let Some(task) = delivery_task {
            match tokio::time::timeout(std::time::Duration::from_secs(10), task).await {
                Ok(Ok(Ok(()))) => tracing::debug!("Viewer: delivery queue drained."),
                Ok(Ok(Err(e))) => tracing::error!("Viewer: delivery actor error: {}", e),
                Ok(Err(e)) => tracing::error!("Viewer: delivery task panicked: {}", e),
                Err(_) => tracing::warn!("Viewer: delivery drain timed out."),
            }
        }

        tracing::info!("Viewer shut down.");
    }
}

/// Single-threaded fold of every tracking input: surface events, the idle
/// poll, the periodic flush timer, and the shutdown signal. All tracking
/// state lives inside this task, so no locking is needed anywhere.
async fn run_viewer_reducer(
    settings: Arc<Settings>,
    session: ViewSession,
    mut controller: PaginationController,
    delivery: DeliveryHandle,
    mut event_rx: mpsc::Receiver<SurfaceEvent>,
    mut shutdown_rx: watch::Receiver<bool>,
    idle_tx: watch::Sender<bool>,
) -> Result<(), TrackerError> {
    let now = Instant::now();
    let mut tracker = PageViewTracker::new(
        session,
        delivery,
        settings.interval_flush(),
        controller.current_page(),
        now,
    );
    tracker.start_interval_tracking();

    let mut activity = ActivityMonitor::new(settings.inactivity_threshold(), now);
    let mut visibility = VisibilityMonitor::new();

    let mut idle_poll = tokio::time::interval(std::time::Duration::from_millis(
        settings.idle_poll_ms.max(1),
    ));
    idle_poll.set_missed_tick_behavior(MissedTickBehavior::Delay);
    idle_poll.tick().await; // consume the immediate first tick

    let mut torn_down = false;

    loop {
        tokio::select! {
            biased;

            _ = shutdown_rx.changed() => {
                if *shutdown_rx.borrow_and_update() {
                    tracing::debug!("Viewer reducer: shutdown signal received.");
                    if !torn_down {
                        tracker.handle_event(TrackingEvent::Teardown { at: Instant::now() });
                    }
                    break;
                }
            }

            _ = tracker.next_interval_tick() => {
                tracker.handle_event(TrackingEvent::IntervalTick { at: Instant::now() });
            }

            _ = idle_poll.tick() => {
                if let Some(ActivityTransition::Idle) = activity.check(Instant::now()) {
                    let _ = idle_tx.send(true);
                    tracker.handle_event(TrackingEvent::Idle { idle: true, at: Instant::now() });
                }
            }

            maybe_event = event_rx.recv() => {
                match maybe_event {
                    Some(event) => {
                        apply_surface_event(
                            event,
                            &mut tracker,
                            &mut controller,
                            &mut activity,
                            &mut visibility,
                            &idle_tx,
                            &mut torn_down,
                        );
                    }
                    None => {
                        tracing::debug!("Viewer reducer: surface channel closed.");
                        if !torn_down {
                            tracker.handle_event(TrackingEvent::Teardown { at: Instant::now() });
                        }
                        break;
                    }
                }
            }
        }
    }

    // Dropping the tracker here releases its interval timer and the last
    // reducer-owned delivery handle.
    Ok(())
}

fn apply_surface_event(
    event: SurfaceEvent,
    tracker: &mut PageViewTracker,
    controller: &mut PaginationController,
    activity: &mut ActivityMonitor,
    visibility: &mut VisibilityMonitor,
    idle_tx: &watch::Sender<bool>,
    torn_down: &mut bool,
) {
    let now = Instant::now();
    match event {
        SurfaceEvent::Input(kind) => {
            if let Some(ActivityTransition::Resume) = activity.record_input(kind, now) {
                let _ = idle_tx.send(false);
                tracker.handle_event(TrackingEvent::Idle { idle: false, at: now });
            }
        }
        SurfaceEvent::DismissIdle => {
            if let Some(ActivityTransition::Resume) = activity.dismiss(now) {
                let _ = idle_tx.send(false);
                tracker.handle_event(TrackingEvent::Idle { idle: false, at: now });
            }
        }
        SurfaceEvent::Visibility(signal) => match visibility.observe(signal) {
            Some(VisibilityTransition::Hidden) => {
                tracker.handle_event(TrackingEvent::Visibility { visible: false, at: now });
            }
            Some(VisibilityTransition::Visible) => {
                tracker.handle_event(TrackingEvent::Visibility { visible: true, at: now });
            }
            None => {}
        },
        SurfaceEvent::NextPage => {
            if let Some(page) = controller.next() {
                tracker.handle_event(TrackingEvent::PageChanged { page, at: now });
            }
        }
        SurfaceEvent::PreviousPage => {
            if let Some(page) = controller.previous() {
                tracker.handle_event(TrackingEvent::PageChanged { page, at: now });
            }
        }
        SurfaceEvent::JumpToPage(target) => {
            let page = target.clamp(1, controller.max_page());
            // Ordering matters: the outgoing page's duration is flushed
            // before the preload window and current-page slot move, so the
            // jump's scroll can never attribute time to the wrong page.
            if page != tracker.current_page() {
                tracker.handle_event(TrackingEvent::PageChanged { page, at: now });
            }
            controller.jump_to(page);
        }
        SurfaceEvent::ZoomIn => {
            controller.zoom_in();
        }
        SurfaceEvent::ZoomOut => {
            controller.zoom_out();
        }
        SurfaceEvent::ResetZoom => {
            controller.reset_zoom();
        }
        SurfaceEvent::Scroll {
            scroll_top,
            viewport_height,
            page_rects,
        } => {
            // Scrolling is qualifying input before it is navigation.
            if let Some(ActivityTransition::Resume) =
                activity.record_input(crate::event_types::InputKind::Scroll, now)
            {
                let _ = idle_tx.send(false);
                tracker.handle_event(TrackingEvent::Idle { idle: false, at: now });
            }
            if let Some(page) = controller.observe_scroll(scroll_top, viewport_height, &page_rects)
            {
                tracker.handle_event(TrackingEvent::PageChanged { page, at: now });
            }
        }
        SurfaceEvent::Teardown => {
            tracker.handle_event(TrackingEvent::Teardown { at: now });
            *torn_down = true;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event_types::{InputKind, VisibilitySignal};
    use crate::network::delivery::DeliveryCommand;
    use std::path::PathBuf;
    use std::time::Duration;

    fn test_settings() -> Arc<Settings> {
        Arc::new(Settings {
            endpoint_url: "http://127.0.0.1:9/api/record_view".to_string(),
            inactivity_threshold_ms: 60_000,
            interval_flush_ms: 10_000,
            idle_poll_ms: 5,
            preload_ahead_count: 2,
            preload_behind_count: 4,
            min_preloaded_count: 5,
            request_timeout_ms: 500,
            connect_timeout_ms: 500,
            internal_log_level: "info".to_string(),
            internal_log_file_dir: PathBuf::from("logs"),
            internal_log_file_name: "view_tracker.log".to_string(),
        })
    }

    fn layout(total_pages: u32) -> DocumentLayout {
        DocumentLayout {
            total_pages,
            page_dimensions: vec![(612.0, 792.0); total_pages as usize],
            has_feedback_slide: false,
            has_account_creation_slide: false,
        }
    }

    fn stub_delivery() -> (DeliveryHandle, mpsc::Receiver<DeliveryCommand>) {
        let (tx, rx) = mpsc::channel(64);
        (DeliveryHandle::from_sender(tx), rx)
    }

    async fn drain(rx: &mut mpsc::Receiver<DeliveryCommand>) -> Vec<(u32, u64, bool)> {
        let mut flushes = Vec::new();
        while let Some(command) = rx.recv().await {
            match command {
                DeliveryCommand::Flush(p) => flushes.push((p.page_number, p.duration, false)),
                DeliveryCommand::FinalFlush(p) => flushes.push((p.page_number, p.duration, true)),
            }
        }
        flushes
    }

    #[tokio::test]
    async fn navigation_and_teardown_flush_in_order() {
        let (delivery, mut rx) = stub_delivery();
        let session = ViewSession::new("link-1", "doc-1", None, 1, None, false);
        let handle =
            ViewerRuntime::start(test_settings(), session, layout(5), delivery, None);

        tokio::time::sleep(Duration::from_millis(40)).await;
        handle.send(SurfaceEvent::NextPage);
        tokio::time::sleep(Duration::from_millis(40)).await;
        handle.shutdown().await;

        let flushes = drain(&mut rx).await;
        assert_eq!(flushes.len(), 2);
        // Page 1 flushed on navigation, page 2 on teardown via the final path.
        assert_eq!(flushes[0].0, 1);
        assert!(!flushes[0].2);
        assert!(flushes[0].1 >= 30);
        assert_eq!(flushes[1].0, 2);
        assert!(flushes[1].2);
    }

    #[tokio::test]
    async fn preview_viewer_emits_nothing() {
        let (delivery, mut rx) = stub_delivery();
        let session = ViewSession::new("link-1", "doc-1", None, 1, None, true);
        let handle =
            ViewerRuntime::start(test_settings(), session, layout(5), delivery, None);

        tokio::time::sleep(Duration::from_millis(30)).await;
        handle.send(SurfaceEvent::NextPage);
        handle.send(SurfaceEvent::Visibility(VisibilitySignal::TabHidden));
        tokio::time::sleep(Duration::from_millis(30)).await;
        handle.shutdown().await;

        assert!(drain(&mut rx).await.is_empty());
    }

    #[tokio::test]
    async fn hidden_span_does_not_accrue() {
        let (delivery, mut rx) = stub_delivery();
        let session = ViewSession::new("link-1", "doc-1", None, 1, None, false);
        let handle =
            ViewerRuntime::start(test_settings(), session, layout(5), delivery, None);

        tokio::time::sleep(Duration::from_millis(30)).await;
        handle.send(SurfaceEvent::Visibility(VisibilitySignal::TabHidden));
        tokio::time::sleep(Duration::from_millis(100)).await;
        handle.send(SurfaceEvent::Visibility(VisibilitySignal::TabVisible));
        tokio::time::sleep(Duration::from_millis(30)).await;
        handle.shutdown().await;

        let flushes = drain(&mut rx).await;
        let total: u64 = flushes.iter().map(|f| f.1).sum();
        // ~60ms of visible time; the 100ms hidden span must be excluded.
        assert!(total < 120, "hidden time leaked into the ledger: {}ms", total);
        assert!(total >= 40);
    }

    #[tokio::test]
    async fn current_page_handle_updates_synchronously_with_jump() {
        let (delivery, _rx) = stub_delivery();
        let session = ViewSession::new("link-1", "doc-1", None, 1, None, false);
        let handle =
            ViewerRuntime::start(test_settings(), session, layout(20), delivery, None);

        handle.send(SurfaceEvent::JumpToPage(10));
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(handle.current_page(), 10);

        let offset = handle.scroll_offset_for(10, 20_000.0);
        assert!((offset - 9_000.0).abs() < f64::EPSILON);
        handle.shutdown().await;
    }

    #[tokio::test]
    async fn surface_teardown_event_is_final_and_not_doubled_by_shutdown() {
        let (delivery, mut rx) = stub_delivery();
        let session = ViewSession::new("link-1", "doc-1", None, 1, None, false);
        let handle =
            ViewerRuntime::start(test_settings(), session, layout(5), delivery, None);

        tokio::time::sleep(Duration::from_millis(40)).await;
        handle.send(SurfaceEvent::Teardown);
        tokio::time::sleep(Duration::from_millis(20)).await;
        handle.shutdown().await;

        let flushes = drain(&mut rx).await;
        // Exactly one teardown-safe flush; the later shutdown found an
        // already-closed ledger and sent nothing.
        assert_eq!(flushes.len(), 1);
        assert!(flushes[0].2);
        assert!(flushes[0].1 >= 30);
    }

    #[tokio::test]
    async fn zoom_events_are_observable_through_the_handle() {
        let (delivery, _rx) = stub_delivery();
        let session = ViewSession::new("link-1", "doc-1", None, 1, None, false);
        let handle =
            ViewerRuntime::start(test_settings(), session, layout(5), delivery, None);

        assert_eq!(handle.zoom(), 1.0);
        handle.send(SurfaceEvent::ZoomIn);
        handle.send(SurfaceEvent::ZoomIn);
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert_eq!(handle.zoom(), 1.5);
        handle.send(SurfaceEvent::ResetZoom);
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert_eq!(handle.zoom(), 1.0);
        handle.send(SurfaceEvent::ZoomOut);
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert_eq!(handle.zoom(), 0.75);
        handle.shutdown().await;
    }

    #[tokio::test]
    async fn jump_preload_is_observable_through_the_handle() {
        let (delivery, _rx) = stub_delivery();
        let session = ViewSession::new("link-1", "doc-1", None, 1, None, false);
        let handle =
            ViewerRuntime::start(test_settings(), session, layout(20), delivery, None);

        assert!(!handle.is_page_loaded(10));
        handle.send(SurfaceEvent::JumpToPage(10));
        tokio::time::sleep(Duration::from_millis(50)).await;
        for page in 8..=12 {
            assert!(handle.is_page_loaded(page), "page {} not loaded", page);
        }
        assert!(!handle.is_page_loaded(13));
        handle.shutdown().await;
    }

    #[tokio::test]
    async fn input_keeps_viewer_active() {
        let (delivery, _rx) = stub_delivery();
        let session = ViewSession::new("link-1", "doc-1", None, 1, None, false);
        let handle =
            ViewerRuntime::start(test_settings(), session, layout(5), delivery, None);

        let idle = handle.idle_notice();
        handle.send(SurfaceEvent::Input(InputKind::Pointer));
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert!(!*idle.borrow());
        handle.shutdown().await;
    }
}
