//! Viewer connection abstraction
//!
//! A viewer is a duplex channel split into an outbound half that receives log
//! bytes and an inbound half that only carries heartbeats.

use async_trait::async_trait;
use bytes::Bytes;

use crate::errors::AppError;

/// Outbound half of a viewer connection
#[async_trait]
pub trait ViewerSink: Send {
    /// Send a chunk of log bytes
    async fn send(&mut self, data: Bytes) -> Result<(), AppError>;

    /// Close the connection
    async fn close(&mut self) {}
}

/// Inbound half of a viewer connection
#[async_trait]
pub trait ViewerSource: Send + 'static {
    /// Wait for inbound activity. Returns `Ok(false)` once the viewer closed
    /// the connection.
    async fn receive(&mut self) -> Result<bool, AppError>;
}
