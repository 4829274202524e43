//! HTTP client for the agent and data services.

use async_trait::async_trait;
use futures_util::StreamExt;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::time::Duration;
use tracing::{debug, warn};

use crate::api::{
    AuthResponse, ChatRequest, CredentialsRequest, EditPersonalProfileRequest,
    EditUsernamePasswordRequest, ListDialoguesRequest, ListDialoguesResponse, ResetResponse,
    SummaryRequest,
};
use crate::catalog::{CaseListResponse, CaseQuery};
use crate::config::Config;
use crate::error::{HospitalError, Result};
use crate::stream::ByteStream;

pub const CHAT_PATH: &str = "/interaction/chat";
pub const SUMMARY_PATH: &str = "/interaction/generate_summary";
pub const RESET_PATH: &str = "/interaction/reset";
pub const CASES_PATH: &str = "/cases/list";
pub const LOGIN_PATH: &str = "/auth/login";
pub const REGISTER_PATH: &str = "/auth/register";
pub const EDIT_PROFILE_PATH: &str = "/auth/edit_personal_profile";
pub const EDIT_CREDENTIALS_PATH: &str = "/auth/edit_username_and_password";
pub const LIST_DIALOGUES_PATH: &str = "/interaction/list_all_dialogues";

/// Which streaming endpoint to open.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamRequest {
    Chat(ChatRequest),
    Summary(SummaryRequest),
}

impl StreamRequest {
    pub fn path(&self) -> &'static str {
        match self {
            StreamRequest::Chat(_) => CHAT_PATH,
            StreamRequest::Summary(_) => SUMMARY_PATH,
        }
    }
}

/// The agent-service surface a chat session needs.
#[async_trait]
pub trait ChatTransport: Send + Sync + 'static {
    /// Send the request and return the response body as raw chunks.
    async fn open_stream(&self, request: &StreamRequest) -> Result<ByteStream>;

    /// Clear the server-side dialogue memory.
    async fn reset(&self) -> Result<ResetResponse>;
}

/// The data-service auth surface.
#[async_trait]
pub trait AuthBackend: Send + Sync {
    async fn login(&self, request: &CredentialsRequest) -> Result<AuthResponse>;
    async fn register(&self, request: &CredentialsRequest) -> Result<AuthResponse>;
    async fn edit_profile(
        &self,
        token: &str,
        request: &EditPersonalProfileRequest,
    ) -> Result<AuthResponse>;
    async fn edit_credentials(
        &self,
        token: &str,
        request: &EditUsernamePasswordRequest,
    ) -> Result<AuthResponse>;
}

#[derive(Debug, Clone)]
pub struct HospitalClient {
    data_url: String,
    agent_url: String,
    client: reqwest::Client,
}

impl HospitalClient {
    pub fn builder() -> HospitalClientBuilder {
        HospitalClientBuilder::default()
    }

    pub fn from_config(config: &Config) -> Self {
        Self::builder()
            .data_url(&config.data_api_url)
            .agent_url(&config.agent_api_url)
            .connect_timeout(config.connect_timeout())
            .build()
    }

    pub fn data_url(&self) -> &str {
        &self.data_url
    }

    pub fn agent_url(&self) -> &str {
        &self.agent_url
    }

    fn send_error(url: &str, e: reqwest::Error) -> HospitalError {
        HospitalError::Connect {
            url: url.to_string(),
            detail: e.to_string(),
        }
    }

    /// POST `body` as JSON and decode a JSON reply.
    async fn post_json<B, R>(&self, url: String, body: &B, token: Option<&str>) -> Result<R>
    where
        B: Serialize + ?Sized + Sync,
        R: DeserializeOwned,
    {
        let mut request = self.client.post(&url).json(body);
        if let Some(token) = token {
            request = request.bearer_auth(token);
        }
        let resp = request.send().await.map_err(|e| Self::send_error(&url, e))?;

        if !resp.status().is_success() {
            let status = resp.status().as_u16();
            warn!(%url, status, "request rejected");
            return Err(HospitalError::Http { status, url });
        }

        let bytes = resp.bytes().await.map_err(|e| Self::send_error(&url, e))?;
        serde_json::from_slice(&bytes).map_err(|e| HospitalError::Json {
            field: url,
            detail: e.to_string(),
        })
    }

    /// Fetch one page of the case catalog.
    pub async fn list_cases(&self, query: &CaseQuery) -> Result<CaseListResponse> {
        self.post_json(format!("{}{CASES_PATH}", self.data_url), query, None)
            .await
    }

    pub async fn list_dialogues(&self, user_id: i64) -> Result<ListDialoguesResponse> {
        let body = ListDialoguesRequest { user_id };
        self.post_json(format!("{}{LIST_DIALOGUES_PATH}", self.data_url), &body, None)
            .await
    }
}

#[async_trait]
impl ChatTransport for HospitalClient {
    async fn open_stream(&self, request: &StreamRequest) -> Result<ByteStream> {
        let url = format!("{}{}", self.agent_url, request.path());
        let builder = match request {
            StreamRequest::Chat(body) => self.client.post(&url).json(body),
            StreamRequest::Summary(body) => self.client.post(&url).json(body),
        };
        let resp = builder.send().await.map_err(|e| Self::send_error(&url, e))?;

        if !resp.status().is_success() {
            return Err(HospitalError::Http {
                status: resp.status().as_u16(),
                url,
            });
        }
        debug!(%url, "response stream opened");

        let stream = resp
            .bytes_stream()
            .map(move |chunk| chunk.map_err(|e| Self::send_error(&url, e)));
        Ok(stream.boxed())
    }

    async fn reset(&self) -> Result<ResetResponse> {
        self.post_json(
            format!("{}{RESET_PATH}", self.agent_url),
            &serde_json::json!({}),
            None,
        )
        .await
    }
}

#[async_trait]
impl AuthBackend for HospitalClient {
    async fn login(&self, request: &CredentialsRequest) -> Result<AuthResponse> {
        self.post_json(format!("{}{LOGIN_PATH}", self.data_url), request, None)
            .await
    }

    async fn register(&self, request: &CredentialsRequest) -> Result<AuthResponse> {
        self.post_json(format!("{}{REGISTER_PATH}", self.data_url), request, None)
            .await
    }

    async fn edit_profile(
        &self,
        token: &str,
        request: &EditPersonalProfileRequest,
    ) -> Result<AuthResponse> {
        self.post_json(
            format!("{}{EDIT_PROFILE_PATH}", self.data_url),
            request,
            Some(token),
        )
        .await
    }

    async fn edit_credentials(
        &self,
        token: &str,
        request: &EditUsernamePasswordRequest,
    ) -> Result<AuthResponse> {
        self.post_json(
            format!("{}{EDIT_CREDENTIALS_PATH}", self.data_url),
            request,
            Some(token),
        )
        .await
    }
}

#[derive(Debug, Clone)]
pub struct HospitalClientBuilder {
    data_url: String,
    agent_url: String,
    connect_timeout: Duration,
}

impl Default for HospitalClientBuilder {
    fn default() -> Self {
        let defaults = Config::default();
        let connect_timeout = defaults.connect_timeout();
        HospitalClientBuilder {
            data_url: defaults.data_api_url,
            agent_url: defaults.agent_api_url,
            connect_timeout,
        }
    }
}

impl HospitalClientBuilder {
    pub fn data_url(mut self, url: impl Into<String>) -> Self {
        self.data_url = url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn agent_url(mut self, url: impl Into<String>) -> Self {
        self.agent_url = url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// No overall request timeout: the body of a chat reply may stream for
    /// minutes. The first-chunk guard lives in the session.
    pub fn build(self) -> HospitalClient {
        let client = reqwest::Client::builder()
            .connect_timeout(self.connect_timeout)
            .build()
            .unwrap_or_default();
        HospitalClient {
            data_url: self.data_url,
            agent_url: self.agent_url,
            client,
        }
    }
}
