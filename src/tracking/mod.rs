pub mod accumulator;
pub mod tracker;

pub use accumulator::DurationAccumulator;
pub use tracker::PageViewTracker;
