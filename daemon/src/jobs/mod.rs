//! Job execution: admission, process running and build/deploy chaining

pub mod pipeline;
pub mod runner;
pub mod tracker;
