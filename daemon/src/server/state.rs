//! Server state

use std::sync::Arc;

use crate::jobs::pipeline::Pipeline;
use crate::streaming::hub::BroadcastHub;

/// Server state shared across handlers
pub struct ServerState {
    pub pipeline: Arc<Pipeline>,
    pub hub: Arc<BroadcastHub>,
}

impl ServerState {
    pub fn new(pipeline: Arc<Pipeline>, hub: Arc<BroadcastHub>) -> Self {
        Self { pipeline, hub }
    }
}
