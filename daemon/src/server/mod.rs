//! Local HTTP server: dashboard, triggers, webhook and live log viewers

pub mod handlers;
pub mod serve;
pub mod state;
pub mod viewer;
