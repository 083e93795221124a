//! buildcast library
//!
//! Build and deploy trigger daemon: runs each service's shell commands one at
//! a time per phase, keeps the output of the latest run on disk and streams
//! it live to any number of viewers.

pub mod app;
pub mod errors;
pub mod filesys;
pub mod jobs;
pub mod logs;
pub mod models;
pub mod server;
pub mod storage;
pub mod streaming;
pub mod utils;
