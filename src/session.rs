//! Direct-interaction chat session.
//!
//! A [`ChatSession`] owns the conversation and runs at most one streaming
//! request at a time. Progress is published as [`SessionEvent`]s on an
//! unbounded channel; the front-end redraws from those events and never
//! touches session state directly.
//!
//! Request lifecycle:
//!
//! ```text
//! Idle -> Sending -> Streaming -> Done
//!            |           |
//!            |           +------> Aborted   (abort / reset / drop)
//!            +------------------> Aborted   (no first chunk before the guard: one toast)
//!            +------------------> Errored   (connect or HTTP failure: one toast)
//! ```

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::api::{ChatRequest, SummaryRequest};
use crate::assembler::StreamingChatAssembler;
use crate::client::{ChatTransport, StreamRequest};
use crate::config::Config;
use crate::error::{HospitalError, Result, Toast};
use crate::language::{translations, Doctor, Language};
use crate::message::{ChatMessage, Conversation, MessageId, Role};
use crate::stream::{FragmentStream, RetryPolicy};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum RequestState {
    #[default]
    Idle,
    Sending,
    Streaming,
    Done,
    Aborted,
    Errored,
}

impl RequestState {
    pub fn is_active(self) -> bool {
        matches!(self, RequestState::Sending | RequestState::Streaming)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// A message was added or changed; carries a full snapshot of it.
    MessageUpdated(ChatMessage),
    Waiting(bool),
    State(RequestState),
    Toast(Toast),
    /// The conversation was emptied by a reset.
    Cleared,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionSettings {
    pub chat_timeout: Duration,
    pub summary_timeout: Duration,
    pub retry: RetryPolicy,
}

impl Default for SessionSettings {
    fn default() -> Self {
        SessionSettings::from_config(&Config::default())
    }
}

impl SessionSettings {
    pub fn from_config(config: &Config) -> Self {
        SessionSettings {
            chat_timeout: config.chat_timeout(),
            summary_timeout: config.summary_timeout(),
            retry: RetryPolicy::from_config(config),
        }
    }
}

struct ActiveRequest {
    seq: u64,
    message: MessageId,
    cancel: CancellationToken,
}

struct Inner {
    conversation: Conversation,
    assembler: StreamingChatAssembler,
    state: RequestState,
    language: Language,
    doctor: Doctor,
    active: Option<ActiveRequest>,
    next_seq: u64,
    events: mpsc::UnboundedSender<SessionEvent>,
}

impl Inner {
    fn emit(&self, event: SessionEvent) {
        // A closed receiver only means nobody is watching.
        let _ = self.events.send(event);
    }

    fn set_state(&mut self, state: RequestState) {
        if self.state != state {
            self.state = state;
            self.emit(SessionEvent::State(state));
        }
    }

    /// Whether request `seq` is still the one this session is waiting on.
    fn owns(&self, seq: u64) -> bool {
        self.active.as_ref().is_some_and(|a| a.seq == seq)
    }

    /// Close out the active request: finalize its message, stop waiting and
    /// record the terminal state.
    fn finish(&mut self, message: MessageId, state: RequestState) {
        self.active = None;
        if let Some(done) = self.conversation.finalize(message) {
            self.emit(SessionEvent::MessageUpdated(done));
        }
        self.emit(SessionEvent::Waiting(false));
        self.set_state(state);
    }

    fn abort_active(&mut self) -> bool {
        let Some(active) = self.active.take() else {
            return false;
        };
        active.cancel.cancel();
        info!(seq = active.seq, "request aborted");
        self.finish(active.message, RequestState::Aborted);
        true
    }
}

fn lock(inner: &Mutex<Inner>) -> MutexGuard<'_, Inner> {
    inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

pub struct ChatSession<T: ChatTransport> {
    transport: Arc<T>,
    inner: Arc<Mutex<Inner>>,
    settings: SessionSettings,
}

impl<T: ChatTransport> ChatSession<T> {
    /// Create a session and the receiver its events are published on.
    pub fn new(
        transport: T,
        settings: SessionSettings,
        language: Language,
        doctor: Doctor,
    ) -> (Self, mpsc::UnboundedReceiver<SessionEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let inner = Inner {
            conversation: Conversation::new(),
            assembler: StreamingChatAssembler::new(),
            state: RequestState::Idle,
            language,
            doctor,
            active: None,
            next_seq: 0,
            events: tx,
        };
        let session = ChatSession {
            transport: Arc::new(transport),
            inner: Arc::new(Mutex::new(inner)),
            settings,
        };
        (session, rx)
    }

    /// Send a patient message and stream the doctor's reply.
    ///
    /// Returns a handle resolving to the terminal state of the request.
    ///
    /// # Errors
    /// - [`HospitalError::Validation`] for blank text.
    /// - [`HospitalError::Busy`] while another request is outstanding.
    pub fn send_message(&self, text: &str) -> Result<JoinHandle<RequestState>> {
        let text = text.trim();
        if text.is_empty() {
            return Err(HospitalError::Validation("message is empty".into()));
        }
        let mut inner = lock(&self.inner);
        if inner.active.is_some() {
            return Err(HospitalError::Busy);
        }
        let user = ChatMessage::user(text);
        inner.conversation.push(user.clone());
        inner.emit(SessionEvent::MessageUpdated(user));

        let request = StreamRequest::Chat(ChatRequest {
            message: text.to_string(),
            language: inner.language,
            doctor: inner.doctor,
        });
        Ok(self.start(inner, request, Role::Doctor, self.settings.chat_timeout))
    }

    /// Ask for the end-of-consultation summary, spoken by the reporter.
    pub fn generate_summary(&self) -> Result<JoinHandle<RequestState>> {
        let inner = lock(&self.inner);
        if inner.active.is_some() {
            return Err(HospitalError::Busy);
        }
        let request = StreamRequest::Summary(SummaryRequest {
            language: inner.language,
            doctor: inner.doctor,
        });
        Ok(self.start(inner, request, Role::Reporter, self.settings.summary_timeout))
    }

    fn start(
        &self,
        mut inner: MutexGuard<'_, Inner>,
        request: StreamRequest,
        role: Role,
        guard: Duration,
    ) -> JoinHandle<RequestState> {
        let placeholder = ChatMessage::placeholder(role);
        let message = inner.conversation.push(placeholder.clone());
        inner.emit(SessionEvent::MessageUpdated(placeholder));

        inner.next_seq += 1;
        let seq = inner.next_seq;
        let cancel = CancellationToken::new();
        inner.active = Some(ActiveRequest {
            seq,
            message,
            cancel: cancel.clone(),
        });
        inner.emit(SessionEvent::Waiting(true));
        inner.set_state(RequestState::Sending);
        drop(inner);

        debug!(seq, path = request.path(), "request started");
        let task = RequestTask {
            transport: Arc::clone(&self.transport),
            inner: Arc::clone(&self.inner),
            seq,
            message,
            cancel,
            guard,
            retry: self.settings.retry,
        };
        tokio::spawn(task.run(request))
    }

    /// Cancel the in-flight request without a toast. No-op when idle.
    pub fn abort(&self) -> bool {
        lock(&self.inner).abort_active()
    }

    /// Clear the dialogue memory on the server, then locally.
    ///
    /// Any in-flight request is aborted first. On failure the local
    /// conversation is kept and an error toast is published.
    pub async fn reset_dialogue(&self) -> Result<()> {
        self.abort();
        match self.transport.reset().await {
            Ok(resp) => {
                let mut inner = lock(&self.inner);
                inner.abort_active();
                inner.conversation.reset();
                inner.set_state(RequestState::Idle);
                inner.emit(SessionEvent::Cleared);
                let text = resp
                    .message
                    .filter(|m| !m.trim().is_empty())
                    .unwrap_or_else(|| translations::RESET_SUCCESS.get(inner.language).to_string());
                inner.emit(SessionEvent::Toast(Toast::info(text)));
                Ok(())
            }
            Err(e) => {
                warn!(error = %e, "dialogue reset failed");
                let inner = lock(&self.inner);
                if let Some(toast) = e.toast(inner.language) {
                    inner.emit(SessionEvent::Toast(toast));
                }
                Err(e)
            }
        }
    }

    pub fn messages(&self) -> Vec<ChatMessage> {
        lock(&self.inner).conversation.messages().to_vec()
    }

    pub fn is_waiting(&self) -> bool {
        lock(&self.inner).active.is_some()
    }

    pub fn state(&self) -> RequestState {
        lock(&self.inner).state
    }

    pub fn language(&self) -> Language {
        lock(&self.inner).language
    }

    pub fn set_language(&self, language: Language) {
        lock(&self.inner).language = language;
    }

    pub fn doctor(&self) -> Doctor {
        lock(&self.inner).doctor
    }

    /// Takes effect from the next request.
    pub fn set_doctor(&self, doctor: Doctor) {
        lock(&self.inner).doctor = doctor;
    }
}

impl<T: ChatTransport> Drop for ChatSession<T> {
    fn drop(&mut self) {
        if let Some(active) = lock(&self.inner).active.as_ref() {
            active.cancel.cancel();
        }
    }
}

// -- Request task ----------------------------------------------------------

struct RequestTask<T: ChatTransport> {
    transport: Arc<T>,
    inner: Arc<Mutex<Inner>>,
    seq: u64,
    message: MessageId,
    cancel: CancellationToken,
    guard: Duration,
    retry: RetryPolicy,
}

impl<T: ChatTransport> RequestTask<T> {
    async fn run(self, request: StreamRequest) -> RequestState {
        let opened = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(HospitalError::Aborted),
            r = self.open_first(&request) => r,
            _ = tokio::time::sleep(self.guard) => Err(HospitalError::Timeout {
                secs: self.guard.as_secs(),
            }),
        };

        let (mut fragments, first) = match opened {
            Ok(v) => v,
            Err(e) => return self.fail(e),
        };

        if let Some(first) = first {
            if !self.mark_streaming() || !self.apply(&first) {
                return RequestState::Aborted;
            }
            while let Some(fragment) = fragments.next_fragment().await {
                if !self.apply(&fragment) {
                    return RequestState::Aborted;
                }
            }
        }

        let state = if self.cancel.is_cancelled() {
            RequestState::Aborted
        } else {
            RequestState::Done
        };
        debug!(
            seq = self.seq,
            chunks = fragments.chunks_read(),
            retries = fragments.retries_used(),
            ?state,
            "request finished"
        );
        let mut inner = lock(&self.inner);
        if inner.owns(self.seq) {
            inner.finish(self.message, state);
        }
        state
    }

    /// Open the response and wait for its first fragment. Everything up to
    /// that fragment runs under the first-chunk guard.
    async fn open_first(&self, request: &StreamRequest) -> Result<(FragmentStream, Option<String>)> {
        let body = self.transport.open_stream(request).await?;
        let mut fragments = FragmentStream::new(body, self.retry, self.cancel.clone());
        let first = fragments.next_fragment().await;
        Ok((fragments, first))
    }

    fn mark_streaming(&self) -> bool {
        let mut inner = lock(&self.inner);
        if !inner.owns(self.seq) {
            return false;
        }
        inner.set_state(RequestState::Streaming);
        true
    }

    /// Returns `false` once this request has been superseded.
    fn apply(&self, fragment: &str) -> bool {
        let mut inner = lock(&self.inner);
        if !inner.owns(self.seq) {
            return false;
        }
        let Inner {
            conversation,
            assembler,
            ..
        } = &mut *inner;
        if let Some(updated) = assembler.apply(conversation, self.message, fragment) {
            inner.emit(SessionEvent::MessageUpdated(updated));
        }
        true
    }

    fn fail(self, error: HospitalError) -> RequestState {
        let state = match error {
            HospitalError::Aborted => RequestState::Aborted,
            HospitalError::Timeout { .. } => {
                self.cancel.cancel();
                RequestState::Aborted
            }
            _ => RequestState::Errored,
        };
        let mut inner = lock(&self.inner);
        if !inner.owns(self.seq) {
            return state;
        }
        if error.is_silent() {
            debug!(seq = self.seq, "request cancelled before first chunk");
        } else {
            warn!(seq = self.seq, error = %error, "request failed");
            if let Some(toast) = error.toast(inner.language) {
                inner.emit(SessionEvent::Toast(toast));
            }
        }
        inner.finish(self.message, state);
        state
    }
}
