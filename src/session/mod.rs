mod controller;
mod correlator;
mod event;
mod reducer;
mod types;

pub use controller::SessionController;
pub use correlator::{correlate, Correlation};
pub use event::{InboundEvent, SideEffect};
pub use reducer::reduce;
pub use types::*;

use crate::error::SessionError;
use serde::Serialize;

/// Read-only snapshot of the session plus its correlation
#[derive(Debug, Clone, Serialize)]
pub struct SessionView {
    pub session: Session,
    pub correlation: Correlation,
    pub researching: bool,
}

impl SessionView {
    pub fn new(session: Session) -> Self {
        let correlation = correlate(
            &session.plan,
            session.current_step.as_deref(),
            &session.search_results,
        );
        let researching = session.stage == Stage::Researching;
        Self {
            session,
            correlation,
            researching,
        }
    }

    /// The report reference once complete, or why the session failed
    pub fn outcome(&self) -> Result<Option<&str>, SessionError> {
        match &self.session.failure {
            Some(failure) => Err(failure.into()),
            None => Ok(self.session.report_ref.as_deref()),
        }
    }
}
