pub mod analyze;
pub mod backend;
pub mod collector;
pub mod normalize;

pub use analyze::analyze_trace;
pub use backend::{Backend, FetchError};
pub use collector::{Collector, CollectorOptions};
pub use normalize::NormalizedTrace;
