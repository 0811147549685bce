pub mod controller;
pub mod preload;

pub use controller::{CurrentPageHandle, PaginationController, ZoomHandle};
pub use preload::PreloadWindow;
