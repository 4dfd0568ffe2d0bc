//! Single owner of the live session
//!
//! User-triggered operations and channel messages both mutate the session
//! through this controller. The lock is only held for synchronous sections;
//! every network await is followed by an epoch check, so an operation that
//! outlived its session (reset or replaced) aborts with `Superseded`.

use chrono::Utc;
use std::sync::Arc;
use tokio::sync::{mpsc, watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::event::SideEffect;
use super::reducer::reduce;
use super::types::{Failure, Session, SessionId, Stage};
use super::SessionView;
use crate::channel::{
    ChannelCommand, ChannelHandle, ChannelMessage, ChannelPayload, ChannelToken, Inbox,
    NotificationTransport,
};
use crate::error::SessionError;
use crate::orchestrator::RequestOrchestrator;

pub const CHANNEL_DELAYED: &str = "Connection error. Research may be delayed.";

#[derive(Default)]
struct Live {
    session: Option<Session>,
    /// Bumped whenever the live session is replaced or discarded
    epoch: u64,
    next_token: u64,
    /// Token of the channel whose messages are accepted
    token: Option<ChannelToken>,
    channel: Option<ChannelHandle>,
    /// Epoch of the user-triggered request in flight
    in_flight: Option<u64>,
}

impl Live {
    fn current(&mut self, epoch: u64) -> Result<&mut Session, SessionError> {
        if self.epoch != epoch {
            return Err(SessionError::Superseded);
        }
        self.session.as_mut().ok_or(SessionError::Superseded)
    }

    fn sever(&mut self) {
        self.token = None;
        self.channel = None;
    }

    fn stage(&self) -> Stage {
        self.session.as_ref().map(|s| s.stage).unwrap_or_default()
    }
}

pub struct SessionController {
    orchestrator: RequestOrchestrator,
    transport: Arc<dyn NotificationTransport>,
    reopen_after_answers: bool,
    live: Mutex<Live>,
    inbox: mpsc::UnboundedSender<ChannelMessage>,
    stage_tx: watch::Sender<Stage>,
}

impl SessionController {
    /// Build a controller and the inbox its channels deliver into. Drain the
    /// inbox with `spawn_pump` (or `handle_inbound_event` directly).
    pub fn new(
        orchestrator: RequestOrchestrator,
        transport: Arc<dyn NotificationTransport>,
        reopen_after_answers: bool,
    ) -> (Self, Inbox) {
        let (inbox, inbox_rx) = mpsc::unbounded_channel();
        let (stage_tx, _) = watch::channel(Stage::Init);
        let controller = Self {
            orchestrator,
            transport,
            reopen_after_answers,
            live: Mutex::new(Live::default()),
            inbox,
            stage_tx,
        };
        (controller, inbox_rx)
    }

    /// Receiver of the live session's stage
    pub fn subscribe(&self) -> watch::Receiver<Stage> {
        self.stage_tx.subscribe()
    }

    fn publish(&self, live: &Live) {
        self.stage_tx.send_if_modified(|stage| {
            let next = live.stage();
            let changed = *stage != next;
            *stage = next;
            changed
        });
    }

    /// Start a new session and return its clarifying questions
    pub async fn start_session(
        &self,
        intent: &str,
        model_name: &str,
    ) -> Result<Vec<String>, SessionError> {
        let intent = intent.trim();
        if intent.is_empty() {
            return Err(SessionError::validation("Research intent must not be blank"));
        }

        let epoch = {
            let mut live = self.live.lock().await;
            ensure_idle(&live)?;
            if live.stage().is_active() {
                return Err(SessionError::validation(format!(
                    "A session is already {}; reset it before starting another",
                    live.stage()
                )));
            }

            live.epoch += 1;
            live.sever();
            let mut session = Session::new(intent, model_name);
            session.set_status("Creating research session...");
            live.session = Some(session);
            live.in_flight = Some(live.epoch);
            self.publish(&live);
            live.epoch
        };

        let result = self
            .orchestrator
            .start_session(intent, model_name, |id| self.on_created(epoch, id))
            .await;

        let mut live = self.live.lock().await;
        release(&mut live, epoch);
        let outcome = match result {
            Ok((_, questions)) => {
                let session = live.current(epoch)?;
                session.receive_questions(questions.clone());
                session.set_status("Waiting for answers to the clarifying questions");
                Ok(questions)
            }
            Err(SessionError::Superseded) => Err(SessionError::Superseded),
            Err(e) if live.epoch != epoch => {
                debug!("Start of a superseded session failed: {}", e);
                Err(SessionError::Superseded)
            }
            Err(e) => {
                warn!("Starting session failed: {}", e);
                live.sever();
                let mut session = Session::new(intent, model_name);
                session.set_status(format!("Failed to start research: {}", e));
                live.session = Some(session);
                Err(e)
            }
        };
        self.publish(&live);
        outcome
    }

    async fn on_created(&self, epoch: u64, session_id: SessionId) -> Result<(), SessionError> {
        {
            let mut live = self.live.lock().await;
            let session = live.current(epoch)?;
            session.id = Some(session_id.clone());
            session.advance(Stage::QuestionsPending);
            session.set_status("Generating clarifying questions...");
            self.publish(&live);
        }
        self.attach(epoch, &session_id).await
    }

    /// Open a channel for `session_id` and make it the accepted one. The
    /// token is installed before the open completes so that events pushed
    /// right after the connect are not dropped. A channel already open for
    /// the session is closed first; the backend keeps one socket per
    /// session and would otherwise unregister the new one on the old close.
    async fn attach(&self, epoch: u64, session_id: &SessionId) -> Result<(), SessionError> {
        let (token, previous) = {
            let mut live = self.live.lock().await;
            live.current(epoch)?;
            live.next_token += 1;
            let token = ChannelToken::new(live.next_token);
            let previous = live.channel.take();
            live.sever();
            live.token = Some(token);
            (token, previous)
        };

        if let Some(previous) = previous {
            debug!("Closing channel {} before reopening", previous.token());
            previous.close().await;
        }

        let opened = self
            .transport
            .open(session_id, token, self.inbox.clone())
            .await;

        let mut live = self.live.lock().await;
        live.current(epoch)?;
        if live.token != Some(token) {
            return Err(SessionError::Superseded);
        }
        match opened {
            Ok(handle) => {
                info!("Channel {} attached to session {}", token, session_id);
                live.channel = Some(handle);
                Ok(())
            }
            Err(e) => {
                live.token = None;
                Err(e.into())
            }
        }
    }

    /// Record a single answer
    pub async fn set_answer(&self, question: &str, answer: &str) -> Result<(), SessionError> {
        let mut live = self.live.lock().await;
        let session = live
            .session
            .as_mut()
            .ok_or_else(|| SessionError::validation("No research session is active"))?;
        session.record_answer(question, answer.to_string())
    }

    /// Merge `answers` into the session, submit them and fetch the plan.
    /// Returns the session's plan afterwards, which may still be empty when
    /// the plan arrives by push instead.
    pub async fn submit_answers<I>(&self, answers: I) -> Result<Vec<String>, SessionError>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let (epoch, session_id, pairs) = {
            let mut live = self.live.lock().await;
            ensure_idle(&live)?;
            let epoch = live.epoch;
            let session = live
                .session
                .as_mut()
                .ok_or_else(|| SessionError::validation("No research session is active"))?;
            if session.stage != Stage::AwaitingAnswers {
                return Err(SessionError::validation(format!(
                    "Answers can only be submitted while awaiting answers (session is {})",
                    session.stage
                )));
            }
            for (question, answer) in answers {
                session.record_answer(&question, answer)?;
            }
            let unanswered = session.unanswered();
            if !unanswered.is_empty() {
                return Err(SessionError::validation(format!(
                    "Please answer every question; missing: {}",
                    unanswered.join(", ")
                )));
            }
            let session_id = session
                .id
                .clone()
                .ok_or_else(|| SessionError::validation("Session has no backend id"))?;
            let pairs = session.qa_pairs();
            session.set_status("Submitting answers...");
            live.in_flight = Some(epoch);
            (epoch, session_id, pairs)
        };

        let result = self
            .orchestrator
            .submit_answers(&session_id, &pairs, || {
                self.on_answers_accepted(epoch, &session_id)
            })
            .await;

        self.finish_plan_fetch(epoch, result).await
    }

    async fn on_answers_accepted(
        &self,
        epoch: u64,
        session_id: &SessionId,
    ) -> Result<(), SessionError> {
        {
            let mut live = self.live.lock().await;
            let session = live.current(epoch)?;
            session.advance(Stage::PlanPending);
            session.set_status("Generating research plan...");
            self.publish(&live);
        }

        if self.reopen_after_answers {
            match self.attach(epoch, session_id).await {
                Err(SessionError::Superseded) => return Err(SessionError::Superseded),
                Err(e) => self.channel_delayed(epoch, &e).await?,
                Ok(()) => {}
            }
        }
        Ok(())
    }

    async fn channel_delayed(&self, epoch: u64, error: &SessionError) -> Result<(), SessionError> {
        warn!("Reopening channel failed: {}", error);
        let mut live = self.live.lock().await;
        live.current(epoch)?.set_status(CHANNEL_DELAYED);
        Ok(())
    }

    /// Repeat the plan fetch after it failed with the answers accepted
    pub async fn refetch_plan(&self) -> Result<Vec<String>, SessionError> {
        let (epoch, session_id, needs_channel) = {
            let mut live = self.live.lock().await;
            ensure_idle(&live)?;
            let epoch = live.epoch;
            let needs_channel = live.token.is_none();
            let session = live
                .session
                .as_mut()
                .ok_or_else(|| SessionError::validation("No research session is active"))?;
            if session.stage != Stage::PlanPending || !session.plan.is_empty() {
                return Err(SessionError::validation(format!(
                    "The plan can only be refetched while it is pending (session is {})",
                    session.stage
                )));
            }
            let session_id = session
                .id
                .clone()
                .ok_or_else(|| SessionError::validation("Session has no backend id"))?;
            session.set_status("Generating research plan...");
            live.in_flight = Some(epoch);
            (epoch, session_id, needs_channel)
        };

        let result = self
            .reattach_and_fetch(epoch, &session_id, needs_channel)
            .await;

        self.finish_plan_fetch(epoch, result).await
    }

    async fn reattach_and_fetch(
        &self,
        epoch: u64,
        session_id: &SessionId,
        needs_channel: bool,
    ) -> Result<Vec<String>, SessionError> {
        if needs_channel {
            match self.attach(epoch, session_id).await {
                Err(SessionError::Superseded) => return Err(SessionError::Superseded),
                Err(e) => self.channel_delayed(epoch, &e).await?,
                Ok(()) => {}
            }
        }
        self.orchestrator.fetch_plan(session_id).await
    }

    /// Apply the result of a submit/plan sequence to the session
    async fn finish_plan_fetch(
        &self,
        epoch: u64,
        result: Result<Vec<String>, SessionError>,
    ) -> Result<Vec<String>, SessionError> {
        let mut live = self.live.lock().await;
        release(&mut live, epoch);
        let session = live.current(epoch)?;

        let outcome = match result {
            Ok(plan) => {
                if session.apply_plan(plan) {
                    info!("Plan applied from HTTP response");
                    session.set_status("Research plan generated. Beginning execution...");
                } else if session.plan.is_empty() {
                    debug!("Plan not ready yet; waiting for plan_generated");
                }
                Ok(session.plan.clone())
            }
            Err(SessionError::Superseded) => Err(SessionError::Superseded),
            Err(e) if !session.plan.is_empty() => {
                debug!("Plan fetch failed after the plan arrived by push: {}", e);
                Ok(session.plan.clone())
            }
            Err(e) => {
                warn!("Answer submission failed in stage {}: {}", session.stage, e);
                let message = match session.stage {
                    Stage::AwaitingAnswers => format!("Failed to submit answers: {}", e),
                    _ => format!("Failed to fetch research plan: {}", e),
                };
                session.set_status(message);
                Err(e)
            }
        };
        self.publish(&live);
        outcome
    }

    /// Fold one channel message into the live session. Messages from any
    /// channel but the accepted one are dropped.
    pub async fn handle_inbound_event(&self, message: ChannelMessage) -> Vec<SideEffect> {
        let mut live = self.live.lock().await;
        if live.token != Some(message.token) {
            debug!("Dropping message from stale channel {}", message.token);
            return Vec::new();
        }
        let Some(session) = live.session.take() else {
            return Vec::new();
        };

        let (session, effects) = match message.payload {
            ChannelPayload::Event(event) => {
                let (mut session, effects) = reduce(session, event);
                session.last_event_at = Some(Utc::now());
                (session, effects)
            }
            ChannelPayload::Closed => {
                info!("Channel {} closed by the backend", message.token);
                live.sever();
                (session, Vec::new())
            }
            ChannelPayload::Failed(reason) => {
                live.sever();
                channel_failed(session, reason)
            }
        };

        live.session = Some(session);
        self.publish(&live);
        effects
    }

    pub async fn current_view(&self) -> Option<SessionView> {
        let live = self.live.lock().await;
        live.session.clone().map(SessionView::new)
    }

    /// Discard the live session and sever its channel
    pub async fn reset(&self) {
        let mut live = self.live.lock().await;
        live.epoch += 1;
        live.session = None;
        live.in_flight = None;
        live.sever();
        info!("Session reset");
        self.publish(&live);
    }

    /// Ask the backend to stop the running research
    pub async fn cancel(&self) -> Result<(), SessionError> {
        let live = self.live.lock().await;
        let channel = live
            .channel
            .as_ref()
            .ok_or_else(|| SessionError::validation("No open channel to cancel"))?;
        channel.send(ChannelCommand::Cancel)?;
        info!("Sent cancel on channel {}", channel.token());
        Ok(())
    }

    /// Drain `inbox` in arrival order, forwarding side effects. Ends when the
    /// effects receiver is dropped.
    pub fn spawn_pump(
        self: &Arc<Self>,
        mut inbox: Inbox,
        effects: mpsc::UnboundedSender<SideEffect>,
    ) -> JoinHandle<()> {
        let controller = Arc::clone(self);
        tokio::spawn(async move {
            while let Some(message) = inbox.recv().await {
                for effect in controller.handle_inbound_event(message).await {
                    if effects.send(effect).is_err() {
                        return;
                    }
                }
            }
        })
    }
}

fn ensure_idle(live: &Live) -> Result<(), SessionError> {
    match live.in_flight {
        Some(epoch) if epoch == live.epoch => Err(SessionError::validation(
            "Another request is still in progress",
        )),
        _ => Ok(()),
    }
}

fn release(live: &mut Live, epoch: u64) {
    if live.in_flight == Some(epoch) {
        live.in_flight = None;
    }
}

fn channel_failed(mut session: Session, reason: String) -> (Session, Vec<SideEffect>) {
    let mut effects = Vec::new();
    match session.stage {
        Stage::Researching => {
            warn!("Channel failed during research: {}", reason);
            session.fail(Failure::Transport(reason.clone()));
            let message = format!("Connection lost: {}", reason);
            session.set_status(message.clone());
            session.transcript.push(message.clone());
            effects.push(SideEffect::Status(message));
            effects.push(SideEffect::SurfaceError(reason));
        }
        stage if stage.is_terminal() => {
            debug!("Channel failed after the session ended: {}", reason);
        }
        _ => {
            warn!("Channel failed before research started: {}", reason);
            session.set_status(CHANNEL_DELAYED);
            effects.push(SideEffect::Status(CHANNEL_DELAYED.to_string()));
        }
    }
    (session, effects)
}
