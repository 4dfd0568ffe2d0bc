//! In-memory transport for controller tests

use super::{
    ChannelCommand, ChannelHandle, ChannelMessage, ChannelPayload, ChannelToken,
    NotificationTransport,
};
use crate::error::ChannelError;
use crate::session::{InboundEvent, SessionId};
use async_trait::async_trait;
use std::sync::{Arc, Mutex};
use tokio::sync::{mpsc, Notify};

struct Opened {
    session_id: SessionId,
    token: ChannelToken,
    sink: mpsc::UnboundedSender<ChannelMessage>,
    commands: mpsc::UnboundedReceiver<ChannelCommand>,
}

/// Channel lifecycle as seen by the backend
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lifecycle {
    Opened(ChannelToken),
    /// The channel's task finished
    Closed(ChannelToken),
}

#[derive(Default)]
pub struct FakeTransport {
    opened: Mutex<Vec<Opened>>,
    fail_next: Mutex<Option<ChannelError>>,
    close_gate: Mutex<Option<Arc<Notify>>>,
    lifecycle: Arc<Mutex<Vec<Lifecycle>>>,
}

impl FakeTransport {
    pub fn fail_next_open(&self, error: ChannelError) {
        *self.fail_next.lock().unwrap() = Some(error);
    }

    /// The next channel opened finishes closing only once the returned gate
    /// is notified
    pub fn gate_close(&self) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        *self.close_gate.lock().unwrap() = Some(gate.clone());
        gate
    }

    pub fn lifecycle(&self) -> Vec<Lifecycle> {
        self.lifecycle.lock().unwrap().clone()
    }

    pub fn open_count(&self) -> usize {
        self.opened.lock().unwrap().len()
    }

    pub fn session_of(&self, channel: usize) -> SessionId {
        self.opened.lock().unwrap()[channel].session_id.clone()
    }

    /// Deliver an event as the `channel`-th opened channel
    pub fn push(&self, channel: usize, event: InboundEvent) {
        self.deliver(channel, ChannelPayload::Event(event));
    }

    pub fn deliver(&self, channel: usize, payload: ChannelPayload) {
        let opened = self.opened.lock().unwrap();
        let entry = &opened[channel];
        let _ = entry.sink.send(ChannelMessage {
            token: entry.token,
            payload,
        });
    }

    /// Commands the client sent on a channel; `None` once it was severed
    pub fn try_command(&self, channel: usize) -> Option<Result<ChannelCommand, ()>> {
        let mut opened = self.opened.lock().unwrap();
        match opened[channel].commands.try_recv() {
            Ok(command) => Some(Ok(command)),
            Err(mpsc::error::TryRecvError::Empty) => Some(Err(())),
            Err(mpsc::error::TryRecvError::Disconnected) => None,
        }
    }
}

#[async_trait]
impl NotificationTransport for FakeTransport {
    async fn open(
        &self,
        session_id: &SessionId,
        token: ChannelToken,
        sink: mpsc::UnboundedSender<ChannelMessage>,
    ) -> Result<ChannelHandle, ChannelError> {
        if let Some(error) = self.fail_next.lock().unwrap().take() {
            return Err(error);
        }
        let (commands, command_rx) = mpsc::unbounded_channel();
        self.opened.lock().unwrap().push(Opened {
            session_id: session_id.clone(),
            token,
            sink,
            commands: command_rx,
        });
        self.lifecycle.lock().unwrap().push(Lifecycle::Opened(token));

        let gate = self.close_gate.lock().unwrap().take();
        let lifecycle = self.lifecycle.clone();
        let task = tokio::spawn(async move {
            if let Some(gate) = gate {
                gate.notified().await;
            }
            lifecycle.lock().unwrap().push(Lifecycle::Closed(token));
        });
        Ok(ChannelHandle::new(token, commands).with_task(task))
    }
}
