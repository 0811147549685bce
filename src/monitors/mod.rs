pub mod activity;
pub mod visibility;

pub use activity::ActivityMonitor;
pub use visibility::VisibilityMonitor;
