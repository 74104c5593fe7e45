//! Request/response/moderation flow behind the chat screen.
//!
//! The controller owns the transcript and the single in-flight exchange. It is
//! cheap to clone; clones share state, so an exchange can run on a spawned
//! task while the UI keeps rendering snapshots.

use std::sync::{Arc, Mutex, MutexGuard};

use crate::client::{Backend, ClientError, Reply};
use crate::transcript::{Transcript, Turn};

pub const PROMPT_FLAGGED: &str = "Please ensure that your prompt is appropriate.";
pub const FALLBACK_REPLY: &str = "The storyteller is encountering some trouble, please try again.";
pub const BACKEND_UNREACHABLE: &str = "Could not reach the storyteller. Check that the backend is running.";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExchangeKind {
    Start,
    Question,
    Feedback,
}

impl ExchangeKind {
    fn as_str(&self) -> &'static str {
        match self {
            ExchangeKind::Start => "start",
            ExchangeKind::Question => "question",
            ExchangeKind::Feedback => "feedback",
        }
    }
}

/// What the in-flight exchange is doing right now.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Pre-send moderation of a prompt.
    Moderating,
    /// Waiting for the backend; the loading placeholder is shown.
    Waiting(ExchangeKind),
}

/// Identifies the one exchange allowed in flight.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RequestToken(u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Submission {
    Sent,
    /// Blank input; nothing was sent.
    Empty,
    /// Another exchange is in flight; nothing was sent.
    Busy,
    /// The prompt failed moderation; an alert is raised.
    Flagged,
}

/// A validated prompt holding the exchange slot.
#[derive(Debug)]
pub struct PromptClaim {
    token: RequestToken,
    prompt: String,
}

/// Selected feedback messages holding the exchange slot.
#[derive(Debug)]
pub struct FeedbackClaim {
    token: RequestToken,
    selected: Vec<String>,
}

#[derive(Debug, Clone, Copy)]
struct Pending {
    token: RequestToken,
    phase: Phase,
}

#[derive(Debug, Default)]
struct State {
    transcript: Transcript,
    pending: Option<Pending>,
    next_token: u64,
    alert: Option<String>,
}

/// Read-only view of the controller for rendering.
#[derive(Debug, Clone)]
pub struct Snapshot {
    pub transcript: Transcript,
    pub phase: Option<Phase>,
    pub alert: Option<String>,
}

impl Snapshot {
    pub fn input_enabled(&self) -> bool {
        self.phase.is_none()
    }
}

#[derive(Clone)]
pub struct Controller {
    backend: Arc<dyn Backend>,
    state: Arc<Mutex<State>>,
}

impl Controller {
    pub fn new(backend: Arc<dyn Backend>) -> Self {
        Self {
            backend,
            state: Arc::new(Mutex::new(State::default())),
        }
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn snapshot(&self) -> Snapshot {
        let state = self.lock();
        Snapshot {
            transcript: state.transcript.clone(),
            phase: state.pending.map(|p| p.phase),
            alert: state.alert.clone(),
        }
    }

    pub fn input_enabled(&self) -> bool {
        self.lock().pending.is_none()
    }

    pub fn dismiss_alert(&self) {
        self.lock().alert = None;
    }

    /// Claim the exchange slot, or `None` if one is already in flight.
    pub fn begin(&self, phase: Phase) -> Option<RequestToken> {
        let mut state = self.lock();
        if state.pending.is_some() {
            return None;
        }
        state.next_token += 1;
        let token = RequestToken(state.next_token);
        state.pending = Some(Pending { token, phase });
        Some(token)
    }

    /// Move the exchange to `phase`, appending `turn` first if given.
    fn advance(&self, token: RequestToken, phase: Phase, turn: Option<Turn>) {
        let mut guard = self.lock();
        let state = &mut *guard;
        match state.pending.as_mut() {
            Some(pending) if pending.token == token => {
                pending.phase = phase;
                if let Some(turn) = turn {
                    state.transcript.push(turn);
                }
            }
            _ => tracing::warn!(?token, "ignoring update from stale request"),
        }
    }

    /// Release the slot held by `token`, appending `turn` if given.
    /// Returns false when `token` is not the current exchange.
    pub fn finish(&self, token: RequestToken, turn: Option<Turn>) -> bool {
        let mut state = self.lock();
        if state.pending.map(|p| p.token) != Some(token) {
            tracing::warn!(?token, "ignoring completion of stale request");
            return false;
        }
        if let Some(turn) = turn {
            state.transcript.push(turn);
        }
        state.pending = None;
        true
    }

    /// Fetch the greeting. Returns false if another exchange was in flight.
    pub async fn initialize(&self) -> bool {
        match self.begin(Phase::Waiting(ExchangeKind::Start)) {
            Some(token) => {
                self.run_start(token).await;
                true
            }
            None => false,
        }
    }

    pub async fn run_start(&self, token: RequestToken) {
        let result = self.backend.start().await;
        let turn = self.receive(ExchangeKind::Start, result).await;
        self.finish(token, Some(turn));
    }

    pub async fn submit_prompt(&self, text: &str) -> Submission {
        match self.claim_prompt(text) {
            Ok(claim) => self.run_prompt(claim).await,
            Err(rejected) => rejected,
        }
    }

    /// Validate `text` and claim the exchange slot for it without awaiting,
    /// so the UI can disable input before the work is spawned.
    pub fn claim_prompt(&self, text: &str) -> Result<PromptClaim, Submission> {
        let prompt = text.trim();
        if prompt.is_empty() {
            return Err(Submission::Empty);
        }

        match self.begin(Phase::Moderating) {
            Some(token) => Ok(PromptClaim {
                token,
                prompt: prompt.to_string(),
            }),
            None => {
                tracing::debug!("prompt submitted while busy");
                Err(Submission::Busy)
            }
        }
    }

    pub async fn run_prompt(&self, claim: PromptClaim) -> Submission {
        let PromptClaim { token, prompt } = claim;

        if !self.moderation_check(&prompt).await {
            tracing::info!("prompt rejected by moderation");
            self.lock().alert = Some(PROMPT_FLAGGED.to_string());
            self.finish(token, None);
            return Submission::Flagged;
        }

        self.advance(
            token,
            Phase::Waiting(ExchangeKind::Question),
            Some(Turn::User(prompt.clone())),
        );

        let result = self.backend.question(&prompt).await;
        let turn = self.receive(ExchangeKind::Question, result).await;
        self.finish(token, Some(turn));
        Submission::Sent
    }

    /// Claim the exchange slot for a feedback round. An empty selection is
    /// sent as is.
    pub fn claim_feedback(&self, selected: Vec<String>) -> Result<FeedbackClaim, Submission> {
        match self.begin(Phase::Waiting(ExchangeKind::Feedback)) {
            Some(token) => Ok(FeedbackClaim { token, selected }),
            None => {
                tracing::debug!("feedback submitted while busy");
                Err(Submission::Busy)
            }
        }
    }

    pub async fn run_feedback(&self, claim: FeedbackClaim) -> Submission {
        let FeedbackClaim { token, selected } = claim;
        tracing::info!(count = selected.len(), "sending feedback");
        let result = self.backend.feedback(&selected).await;
        let turn = self.receive(ExchangeKind::Feedback, result).await;
        self.finish(token, Some(turn));
        Submission::Sent
    }

    /// Ask the moderation endpoint whether `text` is safe. Fails open: if
    /// the service cannot be reached or answers garbage, the text is allowed.
    pub async fn moderation_check(&self, text: &str) -> bool {
        match self.backend.moderate(text).await {
            Ok(is_safe) => is_safe,
            Err(e) => {
                tracing::warn!(error = %e, "moderation unavailable, allowing text");
                true
            }
        }
    }

    /// Turn a backend result into the transcript entry to show for it.
    async fn receive(&self, kind: ExchangeKind, result: Result<Reply, ClientError>) -> Turn {
        match result {
            Ok(reply) => {
                let mut text = reply.output.clone();
                if let Some(thoughts) = &reply.thoughts {
                    text.push_str(thoughts);
                }
                if self.moderation_check(&text).await {
                    Turn::from_reply(&reply)
                } else {
                    tracing::warn!(exchange = kind.as_str(), "reply rejected by moderation");
                    Turn::Notice(FALLBACK_REPLY.to_string())
                }
            }
            Err(e) => {
                tracing::error!(exchange = kind.as_str(), error = %e, "exchange failed");
                Turn::Notice(BACKEND_UNREACHABLE.to_string())
            }
        }
    }
}
