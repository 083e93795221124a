//! Integration tests

mod support;
mod test_pipeline;
mod test_runner;
