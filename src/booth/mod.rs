//! The booth state machine and its event surface.

pub mod events;
pub mod state;

pub use events::{BoothEvent, BoothNotification, BoothScreen, RoutedFrame};
pub use state::{Booth, BoothHandle, BoothOutputs};
