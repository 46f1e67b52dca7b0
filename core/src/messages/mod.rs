pub mod detection;
pub mod display;
pub mod estimate;

pub use detection::{DetectionMessage, EstimatorContext};
pub use display::DisplayModel;
pub use estimate::EstimateMessage;
