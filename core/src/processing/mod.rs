pub mod decimator;
pub mod estimator;
pub mod generator;
pub mod mixer;
pub mod peak;
pub mod spectrum;
pub mod transceiver;

pub use decimator::{Decimator, LengthScaler};
pub use estimator::RangeVelocityEstimator;
pub use generator::{CwGenerator, ToneChannel, ToneStage};
pub use mixer::ConjugateMixer;
pub use peak::PeakDetector;
pub use spectrum::SpectrumStage;
pub use transceiver::TransceiverAdapter;
