use super::{
    ChannelCommand, ChannelHandle, ChannelMessage, ChannelPayload, ChannelToken,
    NotificationTransport,
};
use crate::error::ChannelError;
use crate::session::{InboundEvent, SessionId};
use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, info, warn};
use url::Url;

const CANCEL_FRAME: &str = r#"{"action":"cancel"}"#;

/// How long a severed channel waits for the backend to answer its close
const CLOSE_TIMEOUT: Duration = Duration::from_secs(2);

/// Push channel over the backend's `/ws/{session_id}` endpoint
pub struct WebSocketTransport {
    base: Url,
}

impl WebSocketTransport {
    pub fn new(base: Url) -> Self {
        Self { base }
    }

    fn session_url(&self, session_id: &SessionId) -> Result<Url, ChannelError> {
        Ok(self.base.join(&format!("ws/{}", session_id))?)
    }
}

#[async_trait]
impl NotificationTransport for WebSocketTransport {
    async fn open(
        &self,
        session_id: &SessionId,
        token: ChannelToken,
        sink: mpsc::UnboundedSender<ChannelMessage>,
    ) -> Result<ChannelHandle, ChannelError> {
        let url = self.session_url(session_id)?;
        let (stream, _) = connect_async(url.as_str())
            .await
            .map_err(|e| ChannelError::Connect {
                url: url.to_string(),
                reason: e.to_string(),
            })?;
        info!("Channel {} connected to {}", token, url);

        let (mut writer, mut reader) = stream.split();
        let (commands, mut command_rx) = mpsc::unbounded_channel();

        let task = tokio::spawn(async move {
            loop {
                tokio::select! {
                    frame = reader.next() => {
                        let payload = match frame {
                            Some(Ok(Message::Text(text))) => {
                                match serde_json::from_str::<InboundEvent>(&text) {
                                    Ok(event) => ChannelPayload::Event(event),
                                    Err(e) => {
                                        warn!("Skipping malformed push frame on {}: {}", token, e);
                                        continue;
                                    }
                                }
                            }
                            Some(Ok(Message::Close(_))) | None => ChannelPayload::Closed,
                            Some(Ok(_)) => continue,
                            Some(Err(e)) => ChannelPayload::Failed(e.to_string()),
                        };

                        let done = !matches!(payload, ChannelPayload::Event(_));
                        if sink.send(ChannelMessage { token, payload }).is_err() || done {
                            break;
                        }
                    }
                    command = command_rx.recv() => match command {
                        Some(ChannelCommand::Cancel) => {
                            if let Err(e) = writer.send(Message::Text(CANCEL_FRAME.to_string())).await {
                                warn!("Failed to send cancel on {}: {}", token, e);
                            }
                        }
                        None => {
                            debug!("Channel {} severed", token);
                            if let Err(e) = writer.close().await {
                                debug!("Closing channel {} failed: {}", token, e);
                                break;
                            }
                            let acknowledged = tokio::time::timeout(CLOSE_TIMEOUT, async {
                                while let Some(Ok(frame)) = reader.next().await {
                                    if frame.is_close() {
                                        break;
                                    }
                                }
                            })
                            .await;
                            if acknowledged.is_err() {
                                warn!("Backend did not acknowledge close of channel {}", token);
                            }
                            break;
                        }
                    }
                }
            }
            debug!("Channel {} task finished", token);
        });

        Ok(ChannelHandle::new(token, commands).with_task(task))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_url() {
        let transport = WebSocketTransport::new(Url::parse("ws://127.0.0.1:8001/").unwrap());
        let url = transport
            .session_url(&SessionId::new("5b0c7e1e-2f6d-4d4c-9a55-0f3e2d1c6b7a"))
            .unwrap();
        assert_eq!(
            url.as_str(),
            "ws://127.0.0.1:8001/ws/5b0c7e1e-2f6d-4d4c-9a55-0f3e2d1c6b7a"
        );
    }

    #[tokio::test]
    async fn test_open_unreachable_is_connect_error() {
        // Port 9 (discard) is almost never listening for websockets
        let transport = WebSocketTransport::new(Url::parse("ws://127.0.0.1:9/").unwrap());
        let (sink, _inbox) = mpsc::unbounded_channel();
        let result = transport
            .open(&SessionId::new("abc"), ChannelToken::new(1), sink)
            .await;
        assert!(matches!(result, Err(ChannelError::Connect { .. })));
    }
}
