pub mod dependency;
pub mod flow;
pub mod span;
