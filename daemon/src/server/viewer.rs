//! WebSocket transport for log viewers

use async_trait::async_trait;
use axum::extract::ws::{Message, WebSocket};
use bytes::Bytes;
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};

use crate::errors::AppError;
use crate::streaming::viewer::{ViewerSink, ViewerSource};

/// Split a WebSocket into the hub's viewer halves
pub fn split(socket: WebSocket) -> (WsViewerSink, WsViewerSource) {
    let (sink, stream) = socket.split();
    (WsViewerSink { sink }, WsViewerSource { stream })
}

/// Sends log bytes as binary frames
pub struct WsViewerSink {
    sink: SplitSink<WebSocket, Message>,
}

#[async_trait]
impl ViewerSink for WsViewerSink {
    async fn send(&mut self, data: Bytes) -> Result<(), AppError> {
        self.sink
            .send(Message::Binary(data))
            .await
            .map_err(|e| AppError::ViewerError(e.to_string()))
    }

    async fn close(&mut self) {
        let _ = self.sink.close().await;
    }
}

/// Treats any inbound frame as a heartbeat
pub struct WsViewerSource {
    stream: SplitStream<WebSocket>,
}

#[async_trait]
impl ViewerSource for WsViewerSource {
    async fn receive(&mut self) -> Result<bool, AppError> {
        match self.stream.next().await {
            Some(Ok(Message::Close(_))) | None => Ok(false),
            Some(Ok(_)) => Ok(true),
            Some(Err(e)) => Err(AppError::ViewerError(e.to_string())),
        }
    }
}
