//! Run log capture and live broadcast

pub mod hub;
pub mod log_store;
pub mod viewer;
