//! Network filter states
mod key;
mod noise;
mod registry;
mod statistics;

pub use key::{StateKey, StateKind};
pub use noise::NoiseModel;
pub use registry::StateRegistry;
pub use statistics::Statistics;
