//! Viewer-side page view telemetry for shared documents.
//!
//! Measures, per page, how long a viewer actually looked at it — excluding
//! time the tab was hidden, time the viewer was idle, and synthetic
//! non-content slides — and delivers the measurement best-effort, including
//! during abrupt teardown. Rendering, storage, and the receiving endpoint's
//! aggregation live outside this crate; the viewer surface forwards its DOM
//! events as [`SurfaceEvent`]s and wires navigation through
//! [`ViewerHandle`].
//!
//! Tracking is fail-open: every delivery error is logged and discarded, and
//! the viewer stays fully usable if telemetry is permanently broken.

pub mod app_config;
pub mod errors;
pub mod event_types;
pub mod internal_logger;
pub mod monitors;
pub mod network;
pub mod pagination;
pub mod tracking;
pub mod viewer;

pub use app_config::Settings;
pub use errors::TrackerError;
pub use event_types::{
    DocumentLayout, InputKind, PageRect, PageViewPayload, SurfaceEvent, ViewSession,
    VisibilitySignal,
};
pub use network::{create_delivery_channel, DeliveryHandle};
pub use pagination::{CurrentPageHandle, PaginationController, PreloadWindow, ZoomHandle};
pub use tracking::{DurationAccumulator, PageViewTracker};
pub use viewer::{ViewerHandle, ViewerRuntime};
