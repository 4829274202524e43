//! Client for the AI Hospital medical-dialogue services.
//!
//! Two ways to use it:
//!
//! - **Direct interaction**: a [`ChatSession`] sends patient messages to the
//!   agent service and assembles the streamed doctor reply fragment by
//!   fragment (see [`assembler`]).
//! - **Case replay**: a [`DialoguePlayback`] steps through a scripted case
//!   transcript, driven by a timer and key bindings.
//!
//! Catalog search, sign-in and session history talk to the data service.

pub mod api;
pub mod assembler;
pub mod auth;
pub mod catalog;
pub mod cli;
pub mod client;
pub mod config;
pub mod error;
pub mod history;
pub mod language;
pub mod message;
pub mod playback;
pub mod render;
pub mod session;
pub mod stream;

pub use assembler::{apply_fragment, ChatFragment, StreamingChatAssembler};
pub use auth::{AuthContext, AuthStore, User};
pub use catalog::{builtin_cases, CaseQuery, DialogueLine, MedicalCase};
pub use client::{AuthBackend, ChatTransport, HospitalClient, StreamRequest};
pub use config::Config;
pub use error::{HospitalError, Result, Toast};
pub use language::{Doctor, Language, LanguageContext};
pub use message::{ChatMessage, Conversation, MessageId, Role};
pub use playback::{DialoguePlayback, PlaybackCommand, PlaybackDriver, PlaybackKey};
pub use session::{ChatSession, RequestState, SessionEvent, SessionSettings};
pub use stream::{FragmentStream, RetryPolicy};
