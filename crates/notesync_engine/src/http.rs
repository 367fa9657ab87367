//! HTTP binding of the remote collaborator.
//!
//! Notes travel as JSON. Endpoints, relative to the base URL:
//! - `GET /notes?since=<rfc3339>` - fetch
//! - `PUT /notes/{id}` - create or update
//! - `DELETE /notes/{id}` - delete

use crate::error::{EngineResult, SyncError};
use crate::transport::RemoteNotes;
use chrono::{DateTime, SecondsFormat, Utc};
use notesync_protocol::Note;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use std::time::Duration;

/// HTTP-based remote.
#[derive(Debug, Clone)]
pub struct HttpRemote {
    /// Base URL of the notes API (e.g., "https://notes.example.com/api").
    base_url: String,
    client: Client,
    auth_token: Option<String>,
}

impl HttpRemote {
    /// Creates a remote for `base_url` with a 30 second request timeout.
    pub fn new(base_url: impl Into<String>) -> EngineResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| SyncError::transport_fatal(e.to_string()))?;
        Ok(Self::with_client(base_url, client))
    }

    /// Creates a remote using an existing client.
    pub fn with_client(base_url: impl Into<String>, client: Client) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client,
            auth_token: None,
        }
    }

    /// Sends `token` as a bearer token on every request.
    pub fn with_auth_token(mut self, token: impl Into<String>) -> Self {
        self.auth_token = Some(token.into());
        self
    }

    /// Returns the base URL.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn note_url(&self, note_id: &str) -> String {
        format!("{}/notes/{}", self.base_url, urlencoding::encode(note_id))
    }

    async fn send(&self, request: RequestBuilder) -> EngineResult<Response> {
        let request = match &self.auth_token {
            Some(token) => request.bearer_auth(token),
            None => request,
        };
        let response = request.send().await.map_err(classify_request_error)?;
        check_status(response).await
    }
}

impl RemoteNotes for HttpRemote {
    async fn fetch_since(&self, since: Option<DateTime<Utc>>) -> EngineResult<Vec<Note>> {
        let mut request = self.client.get(format!("{}/notes", self.base_url));
        if let Some(since) = since {
            let since = since.to_rfc3339_opts(SecondsFormat::Millis, true);
            request = request.query(&[("since", since)]);
        }
        let response = self.send(request).await?;
        response
            .json()
            .await
            .map_err(|e| SyncError::Protocol(format!("invalid note list: {e}")))
    }

    async fn push_note(&self, note: &Note) -> EngineResult<Note> {
        let request = self.client.put(self.note_url(&note.id)).json(note);
        let response = self.send(request).await?;
        if response.status() == StatusCode::NO_CONTENT {
            return Ok(note.clone());
        }
        response
            .json()
            .await
            .map_err(|e| SyncError::Protocol(format!("invalid note: {e}")))
    }

    async fn push_deletion(&self, note_id: &str) -> EngineResult<()> {
        let request = self.client.delete(self.note_url(note_id));
        match self.send(request).await {
            Ok(_) | Err(SyncError::NotFound(_)) => Ok(()),
            Err(e) => Err(e),
        }
    }
}

fn classify_request_error(err: reqwest::Error) -> SyncError {
    if err.is_timeout() {
        SyncError::Timeout
    } else if err.is_connect() || err.is_request() || err.is_body() {
        SyncError::transport_retryable(err.to_string())
    } else {
        SyncError::transport_fatal(err.to_string())
    }
}

async fn check_status(response: Response) -> EngineResult<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    let message = if body.is_empty() {
        status.to_string()
    } else {
        format!("{status}: {body}")
    };
    Err(status_error(status, message))
}

fn status_error(status: StatusCode, message: String) -> SyncError {
    match status {
        StatusCode::NOT_FOUND => SyncError::NotFound(message),
        StatusCode::PAYLOAD_TOO_LARGE | StatusCode::INSUFFICIENT_STORAGE => {
            SyncError::QuotaExceeded(message)
        }
        StatusCode::REQUEST_TIMEOUT | StatusCode::TOO_MANY_REQUESTS => {
            SyncError::transport_retryable(message)
        }
        s if s.is_server_error() => SyncError::transport_retryable(message),
        _ => SyncError::Validation(message),
    }
}
