pub mod config;
pub mod error;
pub mod filter;
pub mod graph;
pub mod ids;
pub mod model;
pub mod query;
pub mod stats;
pub mod time;

pub use error::{MeshflowError, Result};
