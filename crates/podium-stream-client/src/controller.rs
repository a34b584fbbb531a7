//! Drives one submission end to end: gate, auth, geolocate, stream, page.

use std::sync::Arc;

use thiserror::Error;
use tracing::warn;

use podium_client_core::auth::{AuthInputError, AuthSession, SessionStore, normalize_email};
use podium_client_core::gate::SubmissionGate;
use podium_client_core::geo::GeoProvider;
use podium_client_core::pager::ResultPager;
use podium_client_core::session::{SessionPhase, SessionState};

use crate::login::{LoginError, login};
use crate::stream::{GenerateRequest, StreamEvent, StreamSession};
use crate::{StreamClientConfig, StreamClientError, build_http_client};

#[derive(Debug, Error)]
pub enum SubmitError {
    /// Blank input, or another submission is already in flight.
    #[error("submission not admitted")]
    NotAdmitted,
    /// No persisted session; run the login flow first.
    #[error("not logged in")]
    NotAuthenticated,
    #[error("session store failed: {message}")]
    Store { message: String },
}

#[derive(Debug, Error)]
pub enum AuthFlowError {
    #[error(transparent)]
    Input(#[from] AuthInputError),
    #[error(transparent)]
    Login(#[from] LoginError),
    #[error("session store failed: {message}")]
    Store { message: String },
}

/// Owns everything one client needs: the HTTP client, the persisted
/// session, a location source, and the state of the current submission.
/// Store and location are seams so hosts can swap in their environment.
pub struct SessionController<S, G> {
    config: StreamClientConfig,
    http: reqwest::Client,
    store: S,
    geo: G,
    gate: SubmissionGate,
    state: SessionState,
    pager: Option<ResultPager>,
    last_retries: u32,
}

impl<S, G> SessionController<S, G>
where
    S: SessionStore,
    S::Error: std::fmt::Display,
    G: GeoProvider,
{
    pub fn new(config: StreamClientConfig, store: S, geo: G) -> Result<Self, StreamClientError> {
        let http = build_http_client()?;
        Ok(Self {
            config,
            http,
            store,
            geo,
            gate: SubmissionGate::new(),
            state: SessionState::new(),
            pager: None,
            last_retries: 0,
        })
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    /// Paging over the latest completed result set, once one exists.
    pub fn pager(&self) -> Option<&ResultPager> {
        self.pager.as_ref()
    }

    pub fn pager_mut(&mut self) -> Option<&mut ResultPager> {
        self.pager.as_mut()
    }

    /// How many reconnects the most recent submission needed before it
    /// ended.
    pub fn last_retry_count(&self) -> u32 {
        self.last_retries
    }

    pub fn is_submitting(&self) -> bool {
        self.gate.is_locked()
    }

    /// Runs one submission through to its terminal phase. `on_update` fires
    /// after every observable state change; a UI redraws there.
    ///
    /// Recoverable failures (geolocation, stream errors, rate limits) land
    /// the session in [`SessionPhase::Error`] rather than in `Err`, which is
    /// reserved for refusals before a session starts.
    pub async fn submit(
        &mut self,
        input: &str,
        mut on_update: impl FnMut(&SessionState),
    ) -> Result<SessionPhase, SubmitError> {
        let _permit = self.gate.try_admit(input).ok_or(SubmitError::NotAdmitted)?;

        let session = self
            .store
            .load_session()
            .map_err(|error| SubmitError::Store {
                message: error.to_string(),
            })?
            .ok_or(SubmitError::NotAuthenticated)?;

        self.pager = None;
        self.last_retries = 0;
        self.state.start();
        on_update(&self.state);

        let location = match self.geo.current_location().await {
            Ok(point) => point,
            Err(error) => {
                self.state.fail(error.to_string());
                on_update(&self.state);
                return Ok(SessionPhase::Error);
            }
        };

        let request = GenerateRequest {
            input: input.to_string(),
            location,
        };
        let mut stream = StreamSession::open(
            self.http.clone(),
            &self.config,
            &request,
            &session.access_token,
        );

        while let Some(event) = stream.next_event().await {
            match event {
                StreamEvent::Opened => self.state.mark_streaming(),
                StreamEvent::Record(record) => {
                    if let Err(ignored) = self.state.apply(record) {
                        warn!(%ignored, "dropping stream record");
                    }
                    if self.state.phase() == SessionPhase::Complete
                        && self.pager.is_none()
                        && let Some(results) = self.state.results()
                    {
                        self.pager = Some(ResultPager::new(Arc::clone(results)));
                    }
                }
                StreamEvent::Fatal { message } => self.state.fail(message),
            }
            on_update(&self.state);
            if self.state.phase().is_terminal() {
                break;
            }
        }

        if !self.state.phase().is_terminal() {
            self.state.fail("stream closed before completion");
            on_update(&self.state);
        }

        self.last_retries = stream.retries();
        Ok(self.state.phase())
    }

    /// Normalizes the email, exchanges credentials, and persists the
    /// returned session so later submissions find it.
    pub async fn login_and_persist(
        &self,
        email: &str,
        password: &str,
    ) -> Result<AuthSession, AuthFlowError> {
        let email = normalize_email(email)?;
        let session = login(&self.http, &self.config, &email, password).await?;
        self.store
            .persist_session(&session)
            .map_err(|error| AuthFlowError::Store {
                message: error.to_string(),
            })?;
        Ok(session)
    }

    /// Clears the persisted session and drops any local session state.
    pub fn logout(&mut self) -> Result<(), AuthFlowError> {
        self.store
            .clear_session()
            .map_err(|error| AuthFlowError::Store {
                message: error.to_string(),
            })?;
        self.state.reset();
        self.pager = None;
        Ok(())
    }

    /// Who the persisted session says we are, if anyone.
    pub fn current_session(&self) -> Result<Option<AuthSession>, SubmitError> {
        self.store.load_session().map_err(|error| SubmitError::Store {
            message: error.to_string(),
        })
    }
}
