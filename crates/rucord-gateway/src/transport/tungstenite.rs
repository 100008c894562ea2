//! Transport over `tokio-tungstenite`

use super::{CloseFrame, Frame, Socket, Transport, FRAME_BUFFER_SIZE};
use crate::error::{GatewayError, GatewayResult};
use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode as WsCloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame as WsCloseFrame;
use tokio_tungstenite::tungstenite::Message;

/// Real WebSocket transport
#[derive(Debug, Clone, Default)]
pub struct TungsteniteTransport;

impl TungsteniteTransport {
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Transport for TungsteniteTransport {
    async fn connect(&self, url: &str) -> GatewayResult<Socket> {
        let (stream, _response) = tokio_tungstenite::connect_async(url)
            .await
            .map_err(|e| GatewayError::Transport(e.to_string()))?;

        tracing::debug!(url = %url, "WebSocket connected");

        let (mut ws_sink, mut ws_stream) = stream.split();
        let (outbound_tx, mut outbound_rx) = mpsc::channel::<Frame>(FRAME_BUFFER_SIZE);
        let (inbound_tx, inbound_rx) = mpsc::channel::<Frame>(FRAME_BUFFER_SIZE);

        // Writer: drains the outbound channel, stops after a close frame
        tokio::spawn(async move {
            while let Some(frame) = outbound_rx.recv().await {
                match frame {
                    Frame::Text(text) => {
                        if let Err(e) = ws_sink.send(Message::Text(text.into())).await {
                            tracing::warn!(error = %e, "Failed to send WebSocket frame");
                            break;
                        }
                    }
                    Frame::Close(close) => {
                        let close = close.map(|c| WsCloseFrame {
                            code: WsCloseCode::from(c.code),
                            reason: c.reason.into(),
                        });
                        if let Err(e) = ws_sink.send(Message::Close(close)).await {
                            tracing::debug!(error = %e, "Failed to send close frame");
                        }
                        break;
                    }
                }
            }

            let _ = ws_sink.close().await;
        });

        // Reader: forwards text and close frames until the stream ends
        let reader = tokio::spawn(async move {
            while let Some(message) = ws_stream.next().await {
                let frame = match message {
                    Ok(Message::Text(text)) => Frame::Text(text.to_string()),
                    Ok(Message::Close(close)) => {
                        let close = close.map(|c| CloseFrame::new(u16::from(c.code), c.reason));
                        let _ = inbound_tx.send(Frame::Close(close)).await;
                        return;
                    }
                    Ok(Message::Binary(_)) => {
                        tracing::debug!("Ignoring binary frame, compression is not negotiated");
                        continue;
                    }
                    Ok(_) => continue,
                    Err(e) => {
                        tracing::warn!(error = %e, "WebSocket error");
                        return;
                    }
                };

                if inbound_tx.send(frame).await.is_err() {
                    return;
                }
            }
        });

        Ok(Socket::new(outbound_tx, inbound_rx).with_reader(reader.abort_handle()))
    }
}
