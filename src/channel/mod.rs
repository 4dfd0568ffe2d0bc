//! Push-notification transport, one channel per session
//!
//! A channel pushes `ChannelMessage`s tagged with the token it was opened
//! with into the controller's inbox. Dropping the `ChannelHandle` severs the
//! channel; messages it already queued are filtered by token downstream.
//! `ChannelHandle::close` does the same and also waits for the connection
//! to shut, for callers about to reopen a channel for the same session.

mod websocket;

#[cfg(test)]
pub(crate) mod fake;

pub use websocket::WebSocketTransport;

use crate::error::ChannelError;
use crate::session::{InboundEvent, SessionId};
use async_trait::async_trait;
use std::fmt;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::debug;

/// Identity of one opened channel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ChannelToken(u64);

impl ChannelToken {
    pub fn new(value: u64) -> Self {
        Self(value)
    }
}

impl fmt::Display for ChannelToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ChannelPayload {
    Event(InboundEvent),
    /// The backend closed the channel
    Closed,
    /// The transport failed; the channel is gone
    Failed(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct ChannelMessage {
    pub token: ChannelToken,
    pub payload: ChannelPayload,
}

/// Client-to-backend commands
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelCommand {
    Cancel,
}

/// Owning handle for an open channel
#[derive(Debug)]
pub struct ChannelHandle {
    token: ChannelToken,
    commands: mpsc::UnboundedSender<ChannelCommand>,
    task: Option<JoinHandle<()>>,
}

impl ChannelHandle {
    pub fn new(token: ChannelToken, commands: mpsc::UnboundedSender<ChannelCommand>) -> Self {
        Self {
            token,
            commands,
            task: None,
        }
    }

    /// Attach the task that runs the channel so `close` can wait for it
    pub fn with_task(mut self, task: JoinHandle<()>) -> Self {
        self.task = Some(task);
        self
    }

    pub fn token(&self) -> ChannelToken {
        self.token
    }

    pub fn send(&self, command: ChannelCommand) -> Result<(), ChannelError> {
        self.commands.send(command).map_err(|_| ChannelError::Closed)
    }

    /// Sever the channel and wait until its task has shut the connection
    pub async fn close(self) {
        let Self {
            token,
            commands,
            task,
        } = self;
        drop(commands);
        if let Some(task) = task {
            if let Err(e) = task.await {
                debug!("Channel {} task ended abnormally: {}", token, e);
            }
        }
    }
}

pub type Inbox = mpsc::UnboundedReceiver<ChannelMessage>;

#[async_trait]
pub trait NotificationTransport: Send + Sync {
    /// Open a channel for `session_id`. Returns once the channel is ready to
    /// deliver events.
    async fn open(
        &self,
        session_id: &SessionId,
        token: ChannelToken,
        sink: mpsc::UnboundedSender<ChannelMessage>,
    ) -> Result<ChannelHandle, ChannelError>;
}
