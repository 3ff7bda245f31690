//! HTTP [`NoteStore`] backed by the service's JSON gateway.
//!
//! Every operation is `POST {base_url}/{operation}` with a JSON body and the
//! account token as a bearer credential. Successful calls answer with the
//! result object; failures answer with a JSON error object:
//!
//! ```json
//! {"type": "user", "errorCode": 11, "parameter": "Element type \"x\" ..."}
//! {"type": "system", "errorCode": 19, "message": "rate limited"}
//! {"type": "notFound", "identifier": "Note.guid", "key": "..."}
//! ```
//!
//! Retry strategy:
//! - HTTP 429 → retry with exponential backoff
//! - HTTP 5xx or network error → retry, except for creates
//! - other HTTP 4xx → fail immediately
//!
//! A create whose request may have reached the service is never sent again,
//! since a lost response would otherwise produce a duplicate note or
//! notebook. Creates are only repeated on 429 or when the connection could
//! not be opened.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, warn};

use super::{NoteStore, StoreResult};
use crate::config::ServiceConfig;
use crate::error::{ErrorCode, ServiceError};
use crate::models::{
    NoteFilter, Notebook, NotesMetadataList, NotesMetadataResultSpec, RemoteNote, Resource, Tag,
};

/// Whether a failed request may be sent again.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Replay {
    /// Repeating the request has no additional effect.
    Always,
    /// Only when the service cannot have acted on it.
    Unsent,
}

impl Replay {
    fn after_status(self, status: StatusCode) -> bool {
        status == StatusCode::TOO_MANY_REQUESTS
            || (self == Replay::Always && status.is_server_error())
    }

    fn after_error(self, err: &reqwest::Error) -> bool {
        self == Replay::Always || err.is_connect()
    }
}

pub struct HttpNoteStore {
    client: reqwest::Client,
    base_url: String,
    token: String,
    max_retries: u32,
    backoff: Duration,
}

impl HttpNoteStore {
    pub fn new(
        base_url: impl Into<String>,
        token: impl Into<String>,
        timeout: Duration,
        max_retries: u32,
    ) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(format!("enote/{}", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token: token.into(),
            max_retries,
            backoff: Duration::from_secs(1),
        })
    }

    /// Build from `[service]`; requires a token.
    pub fn from_config(config: &ServiceConfig) -> anyhow::Result<Self> {
        let token = config
            .token
            .clone()
            .ok_or_else(|| anyhow::anyhow!("service.token (or ENOTE_TOKEN) is required for the http backend"))?;
        let url = config.resolved_note_store_url()?;
        Self::new(
            url,
            token,
            Duration::from_secs(config.timeout_secs),
            config.max_retries,
        )
    }

    /// Base delay of the exponential backoff (1s by default).
    pub fn with_backoff(mut self, backoff: Duration) -> Self {
        self.backoff = backoff;
        self
    }

    async fn send(
        &self,
        operation: &str,
        body: &serde_json::Value,
        replay: Replay,
    ) -> StoreResult<String> {
        let url = format!("{}/{}", self.base_url, operation);
        let mut last_err = None;

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                // 1x, 2x, 4x, ... the base delay
                let delay = self.backoff * (1u32 << (attempt - 1).min(5));
                debug!(operation, attempt, ?delay, "retrying");
                tokio::time::sleep(delay).await;
            }

            let resp = self
                .client
                .post(&url)
                .bearer_auth(&self.token)
                .json(body)
                .send()
                .await;

            match resp {
                Ok(response) => {
                    let status = response.status();
                    let text = response
                        .text()
                        .await
                        .map_err(|e| ServiceError::Unreachable(e.to_string()))?;

                    if status.is_success() {
                        return Ok(text);
                    }

                    let err = parse_error(status, &text);
                    if replay.after_status(status) {
                        warn!(operation, %status, "transient note service error");
                        last_err = Some(err);
                        continue;
                    }
                    return Err(err);
                }
                Err(e) => {
                    warn!(operation, error = %e, "note service request failed");
                    let err = ServiceError::Unreachable(e.to_string());
                    if !replay.after_error(&e) {
                        return Err(err);
                    }
                    last_err = Some(err);
                    continue;
                }
            }
        }

        Err(last_err.unwrap_or_else(|| {
            ServiceError::Unreachable(format!("{} failed after retries", operation))
        }))
    }

    async fn call<T: DeserializeOwned>(
        &self,
        operation: &str,
        body: serde_json::Value,
    ) -> StoreResult<T> {
        self.call_with(operation, body, Replay::Always).await
    }

    async fn call_with<T: DeserializeOwned>(
        &self,
        operation: &str,
        body: serde_json::Value,
        replay: Replay,
    ) -> StoreResult<T> {
        let text = self.send(operation, &body, replay).await?;
        serde_json::from_str(&text).map_err(|e| {
            ServiceError::Protocol(format!("{} returned an invalid body: {}", operation, e))
        })
    }
}

#[derive(Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
enum WireError {
    #[serde(rename_all = "camelCase")]
    User {
        error_code: i32,
        #[serde(default)]
        parameter: String,
    },
    #[serde(rename_all = "camelCase")]
    System {
        error_code: i32,
        #[serde(default)]
        message: String,
    },
    #[serde(rename_all = "camelCase")]
    NotFound {
        #[serde(default)]
        identifier: String,
        #[serde(default)]
        key: String,
    },
}

fn parse_error(status: StatusCode, body: &str) -> ServiceError {
    if let Ok(wire) = serde_json::from_str::<WireError>(body) {
        return match wire {
            WireError::User {
                error_code,
                parameter,
            } => ServiceError::User {
                code: ErrorCode::from_code(error_code),
                parameter,
            },
            WireError::System {
                error_code,
                message,
            } => ServiceError::System {
                code: ErrorCode::from_code(error_code),
                message,
            },
            WireError::NotFound { identifier, key } => ServiceError::NotFound { identifier, key },
        };
    }
    match status {
        StatusCode::UNAUTHORIZED => ServiceError::user(ErrorCode::InvalidAuth, "authenticationToken"),
        StatusCode::TOO_MANY_REQUESTS => ServiceError::System {
            code: ErrorCode::RateLimitReached,
            message: body.to_string(),
        },
        _ => ServiceError::Protocol(format!("HTTP {}: {}", status, body)),
    }
}

#[async_trait]
impl NoteStore for HttpNoteStore {
    async fn find_notes_metadata(
        &self,
        filter: &NoteFilter,
        offset: usize,
        max_notes: usize,
        spec: &NotesMetadataResultSpec,
    ) -> StoreResult<NotesMetadataList> {
        self.call(
            "findNotesMetadata",
            json!({
                "filter": filter,
                "offset": offset,
                "maxNotes": max_notes,
                "resultSpec": spec,
            }),
        )
        .await
    }

    async fn get_note(
        &self,
        guid: &str,
        with_content: bool,
        with_resources_data: bool,
    ) -> StoreResult<RemoteNote> {
        self.call(
            "getNote",
            json!({
                "guid": guid,
                "withContent": with_content,
                "withResourcesData": with_resources_data,
            }),
        )
        .await
    }

    async fn get_note_tag_names(&self, guid: &str) -> StoreResult<Vec<String>> {
        self.call("getNoteTagNames", json!({ "guid": guid })).await
    }

    async fn create_note(&self, note: &RemoteNote) -> StoreResult<RemoteNote> {
        self.call_with("createNote", json!({ "note": note }), Replay::Unsent)
            .await
    }

    async fn update_note(&self, note: &RemoteNote) -> StoreResult<RemoteNote> {
        self.call("updateNote", json!({ "note": note })).await
    }

    async fn delete_note(&self, guid: &str) -> StoreResult<()> {
        self.send("deleteNote", &json!({ "guid": guid }), Replay::Always)
            .await?;
        Ok(())
    }

    async fn list_notebooks(&self) -> StoreResult<Vec<Notebook>> {
        self.call("listNotebooks", json!({})).await
    }

    async fn create_notebook(&self, name: &str) -> StoreResult<Notebook> {
        self.call_with(
            "createNotebook",
            json!({ "notebook": { "name": name } }),
            Replay::Unsent,
        )
        .await
    }

    async fn list_tags(&self) -> StoreResult<Vec<Tag>> {
        self.call("listTags", json!({})).await
    }

    async fn get_tag(&self, guid: &str) -> StoreResult<Tag> {
        self.call("getTag", json!({ "guid": guid })).await
    }

    async fn get_resource(&self, guid: &str, with_data: bool) -> StoreResult<Resource> {
        self.call("getResource", json!({ "guid": guid, "withData": with_data }))
            .await
    }
}
