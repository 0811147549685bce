pub mod delivery;

pub use delivery::{create_delivery_channel, DeliveryHandle};
