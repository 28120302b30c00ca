//! Client-side synchronization and workflow-orchestration engine for the
//! case-management service.
//!
//! The engine keeps an in-memory [`EntityStore`] reconciled with the remote
//! service: it issues typed requests, drives multi-file uploads with
//! per-file outcome tracking, polls document processing status until every
//! document settles, and gates draft generation on document readiness. A
//! presentation layer consumes the store through [`CaseworkHandle`] and the
//! broadcast [`ClientEvent`] stream; nothing in here renders anything.

use std::{sync::Arc, time::Duration};

use anyhow::Result;
use async_trait::async_trait;
use futures::future::join_all;
use reqwest::{multipart, Client, RequestBuilder};
use serde::{de::DeserializeOwned, Serialize};
use shared::{
    domain::{CaseId, DocumentId, DraftType},
    error::ApiError,
    protocol::{
        Case, CreateCaseRequest, Document, DocumentDetail, Draft, ErrorBody, GenerateDraftRequest,
    },
};
use thiserror::Error;
use tokio::{
    sync::{broadcast, Mutex},
    task::JoinHandle,
};
use tracing::{error, info, warn};

mod store;
pub use store::{ApplyOutcome, EntityStore, StatusRegression, StoreSnapshot};

/// Interval between reconciliation ticks while documents are processing.
const DOCUMENT_POLL_INTERVAL: Duration = Duration::from_secs(3);
const EVENT_CHANNEL_CAPACITY: usize = 1024;

/// Failure talking to the remote service. `Api` carries the message the
/// service put under its `detail` field; `Transport` covers connection and
/// payload-decoding failures.
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error(transparent)]
    Api(#[from] ApiError),
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),
}

/// Client-side failure detected before any request is issued.
#[derive(Debug, Error)]
pub enum CaseworkError {
    #[error("{0}")]
    Validation(String),
    #[error(transparent)]
    Service(#[from] ServiceError),
}

#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub server_url: String,
    pub poll_interval: Duration,
}

impl ClientConfig {
    pub fn new(server_url: impl Into<String>) -> Self {
        Self {
            server_url: server_url.into(),
            poll_interval: DOCUMENT_POLL_INTERVAL,
        }
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }
}

/// One file handed to the upload orchestrator.
#[derive(Debug, Clone)]
pub struct UploadFile {
    pub filename: String,
    pub mime_type: Option<String>,
    pub bytes: Vec<u8>,
}

/// Per-file result of an upload batch. Every file in a batch yields exactly
/// one outcome regardless of how its siblings fared.
#[derive(Debug, Clone)]
pub enum UploadOutcome {
    Uploaded { filename: String, document: Document },
    Failed { filename: String, reason: String },
}

impl UploadOutcome {
    pub fn filename(&self) -> &str {
        match self {
            Self::Uploaded { filename, .. } | Self::Failed { filename, .. } => filename,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Uploaded { .. })
    }
}

/// Notifications consumed by the renderer.
#[derive(Debug, Clone)]
pub enum ClientEvent {
    CasesUpdated(Vec<Case>),
    ActiveCaseChanged(Option<Case>),
    DocumentsUpdated(Vec<Document>),
    DraftsUpdated(Vec<Draft>),
    UploadFinished(UploadOutcome),
    DraftGenerated { draft_type: DraftType },
    Error(String),
}

/// Actions exposed to the presentation layer. Implemented for
/// `Arc<CaseworkClient>`; every method resolves with the outcome the
/// renderer should surface and never panics on service failure.
#[async_trait]
pub trait CaseworkHandle: Send + Sync {
    async fn load_cases(&self) -> Result<Vec<Case>>;
    async fn select_case(&self, case_id: Option<CaseId>) -> Result<()>;
    async fn create_case(&self, name: &str, description: &str) -> Result<Case>;
    async fn delete_case(&self, case_id: CaseId) -> Result<()>;
    async fn upload_documents(&self, files: Vec<UploadFile>) -> Result<Vec<UploadOutcome>>;
    async fn generate_draft(&self, draft_type: DraftType) -> Result<Draft>;
    async fn fetch_document_detail(&self, document_id: DocumentId) -> Result<DocumentDetail>;
    async fn snapshot(&self) -> StoreSnapshot;
    async fn is_polling(&self) -> bool;
    fn subscribe_events(&self) -> broadcast::Receiver<ClientEvent>;
}

pub struct CaseworkClient {
    http: Client,
    config: ClientConfig,
    store: Mutex<EntityStore>,
    poll_task: Mutex<Option<JoinHandle<()>>>,
    events: broadcast::Sender<ClientEvent>,
}

impl CaseworkClient {
    pub fn new(config: ClientConfig) -> Arc<Self> {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Arc::new(Self {
            http: Client::new(),
            config,
            store: Mutex::new(EntityStore::new()),
            poll_task: Mutex::new(None),
            events,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.config.server_url, path)
    }

    // ── Remote service client ──────────────────────────────────────────

    /// Single choke point for every request: sends it and normalizes any
    /// non-2xx response into an [`ApiError`] built from the body's `detail`
    /// field when one is present.
    async fn send(&self, request: RequestBuilder) -> Result<reqwest::Response, ServiceError> {
        let response = request.send().await?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.json::<ErrorBody>().await.ok();
        Err(ApiError::from_response_body(status.as_u16(), body).into())
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, ServiceError> {
        Ok(self.send(self.http.get(self.url(path))).await?.json().await?)
    }

    async fn post_json<B: Serialize, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, ServiceError> {
        Ok(self
            .send(self.http.post(self.url(path)).json(body))
            .await?
            .json()
            .await?)
    }

    /// DELETE endpoints answer 204 with no body, so nothing is parsed.
    async fn delete_empty(&self, path: &str) -> Result<(), ServiceError> {
        self.send(self.http.delete(self.url(path))).await?;
        Ok(())
    }

    async fn fetch_cases(&self) -> Result<Vec<Case>, ServiceError> {
        self.get_json("/cases").await
    }

    async fn fetch_documents(&self, case_id: CaseId) -> Result<Vec<Document>, ServiceError> {
        self.get_json(&format!("/cases/{}/documents", case_id.0)).await
    }

    async fn fetch_drafts(&self, case_id: CaseId) -> Result<Vec<Draft>, ServiceError> {
        self.get_json(&format!("/cases/{}/drafts", case_id.0)).await
    }

    /// Uploads a single file as the multipart `file` field; the only
    /// request that bypasses the JSON payload format.
    async fn upload_one(&self, case_id: CaseId, file: UploadFile) -> Result<Document, ServiceError> {
        let mut part = multipart::Part::bytes(file.bytes).file_name(file.filename);
        if let Some(mime) = &file.mime_type {
            part = part.mime_str(mime)?;
        }
        let form = multipart::Form::new().part("file", part);
        Ok(self
            .send(
                self.http
                    .post(self.url(&format!("/cases/{}/documents", case_id.0)))
                    .multipart(form),
            )
            .await?
            .json()
            .await?)
    }

    // ── Store application ──────────────────────────────────────────────

    /// Applies a fetched document list under the epoch check and notifies
    /// the renderer. A regression rejection keeps the last-known-good list
    /// and is reported as an error event, not a crash.
    async fn apply_fetched_documents(
        &self,
        epoch: u64,
        documents: Vec<Document>,
    ) -> Result<ApplyOutcome, StatusRegression> {
        let payload = documents.clone();
        let result = { self.store.lock().await.apply_documents(epoch, documents) };
        match &result {
            Ok(ApplyOutcome::Applied) => {
                let _ = self.events.send(ClientEvent::DocumentsUpdated(payload));
            }
            Ok(ApplyOutcome::Stale) => {
                info!("documents: dropping response for a selection that changed mid-flight");
            }
            Err(regression) => {
                error!("documents: {regression}");
                let _ = self.events.send(ClientEvent::Error(regression.to_string()));
            }
        }
        result
    }

    async fn apply_fetched_drafts(&self, epoch: u64, drafts: Vec<Draft>) -> ApplyOutcome {
        let payload = drafts.clone();
        let outcome = { self.store.lock().await.apply_drafts(epoch, drafts) };
        match outcome {
            ApplyOutcome::Applied => {
                let _ = self.events.send(ClientEvent::DraftsUpdated(payload));
            }
            ApplyOutcome::Stale => {
                info!("drafts: dropping response for a selection that changed mid-flight");
            }
        }
        outcome
    }

    // ── Status reconciliation loop ─────────────────────────────────────

    /// Starts the reconciliation loop when the store holds unsettled
    /// documents, cancelling any previous timer first so at most one is
    /// ever live. Idempotent; safe to call after every fetch/upload/select.
    async fn ensure_polling(self: &Arc<Self>) {
        let should_poll = {
            let store = self.store.lock().await;
            store.active_case_id().is_some() && store.has_unsettled_documents()
        };
        if !should_poll {
            self.stop_polling().await;
            return;
        }

        let client = Arc::clone(self);
        let task = tokio::spawn(async move {
            client.run_reconciliation().await;
        });
        let previous = { self.poll_task.lock().await.replace(task) };
        if let Some(previous) = previous {
            previous.abort();
        }
    }

    async fn stop_polling(&self) {
        if let Some(task) = self.poll_task.lock().await.take() {
            task.abort();
        }
    }

    /// One reconciliation tick per interval, strictly sequential: the next
    /// sleep only starts after the previous fetch resolved. The loop reads
    /// the *current* active case on every tick rather than capturing one,
    /// and exits when the case changes, the selection clears, or every
    /// document reaches a terminal status. A failed tick fetch is logged
    /// and the loop keeps polling; transient errors never stop it.
    async fn run_reconciliation(self: Arc<Self>) {
        loop {
            tokio::time::sleep(self.config.poll_interval).await;

            let current = {
                let store = self.store.lock().await;
                store.active_case_id().map(|id| (id, store.selection_epoch()))
            };
            let Some((case_id, epoch)) = current else {
                info!("poll: no active case, stopping");
                break;
            };

            match self.fetch_documents(case_id).await {
                Ok(documents) => match self.apply_fetched_documents(epoch, documents).await {
                    Ok(ApplyOutcome::Applied) => {
                        let settled = { !self.store.lock().await.has_unsettled_documents() };
                        if settled {
                            info!(case_id = case_id.0, "poll: all documents settled");
                            break;
                        }
                    }
                    Ok(ApplyOutcome::Stale) => {
                        info!(case_id = case_id.0, "poll: selection changed mid-tick, stopping");
                        break;
                    }
                    // Last-known-good kept; keep watching for a sane snapshot.
                    Err(_) => {}
                },
                Err(err) => {
                    warn!(case_id = case_id.0, "poll: document fetch failed, will retry: {err}");
                }
            }
        }
    }
}

#[async_trait]
impl CaseworkHandle for Arc<CaseworkClient> {
    async fn load_cases(&self) -> Result<Vec<Case>> {
        let cases = self.fetch_cases().await?;
        {
            self.store.lock().await.replace_cases(cases.clone());
        }
        let _ = self.events.send(ClientEvent::CasesUpdated(cases.clone()));
        Ok(cases)
    }

    /// Selecting `None`, or an id missing from the loaded case list,
    /// clears the active case and its scoped lists. Selecting a known case
    /// replaces the scoped lists with fresh fetches and restarts the
    /// reconciliation loop if anything is still processing.
    async fn select_case(&self, case_id: Option<CaseId>) -> Result<()> {
        self.stop_polling().await;

        let (selected, epoch) = {
            let mut store = self.store.lock().await;
            let selected = case_id.and_then(|id| store.case_by_id(id).cloned());
            let epoch = match &selected {
                Some(case) => store.activate(case.clone()),
                None => store.clear_active(),
            };
            (selected, epoch)
        };
        let _ = self
            .events
            .send(ClientEvent::ActiveCaseChanged(selected.clone()));

        let Some(case) = selected else {
            return Ok(());
        };
        info!(case_id = case.id.0, "case: selected \"{}\"", case.name);

        let (documents, drafts) = futures::try_join!(
            self.fetch_documents(case.id),
            self.fetch_drafts(case.id)
        )?;

        if let Ok(ApplyOutcome::Stale) = self.apply_fetched_documents(epoch, documents).await {
            return Ok(());
        }
        self.apply_fetched_drafts(epoch, drafts).await;
        self.ensure_polling().await;
        Ok(())
    }

    async fn create_case(&self, name: &str, description: &str) -> Result<Case> {
        let name = name.trim();
        if name.is_empty() {
            return Err(CaseworkError::Validation("Case name is required".into()).into());
        }

        let case: Case = self
            .post_json(
                "/cases",
                &CreateCaseRequest {
                    name: name.to_string(),
                    description: description.trim().to_string(),
                },
            )
            .await?;
        info!(case_id = case.id.0, "case: created \"{name}\"");

        self.load_cases().await?;
        self.select_case(Some(case.id)).await?;
        Ok(case)
    }

    async fn delete_case(&self, case_id: CaseId) -> Result<()> {
        self.delete_empty(&format!("/cases/{}", case_id.0)).await?;
        info!(case_id = case_id.0, "case: deleted");

        let was_active = { self.store.lock().await.active_case_id() == Some(case_id) };
        if was_active {
            self.select_case(None).await?;
        }
        self.load_cases().await?;
        Ok(())
    }

    /// Uploads every file independently: one failure never aborts the rest
    /// of the batch, outcomes are accumulated per file in whatever order
    /// the requests settle, and exactly one document re-fetch follows the
    /// batch no matter how many files failed. Without an active case this
    /// is a no-op.
    async fn upload_documents(&self, files: Vec<UploadFile>) -> Result<Vec<UploadOutcome>> {
        let active = {
            let store = self.store.lock().await;
            store.active_case_id().map(|id| (id, store.selection_epoch()))
        };
        let Some((case_id, epoch)) = active else {
            info!("upload: no active case, ignoring {} file(s)", files.len());
            return Ok(Vec::new());
        };
        if files.is_empty() {
            return Ok(Vec::new());
        }

        let uploads = files.into_iter().map(|file| {
            let filename = file.filename.clone();
            async move {
                match self.upload_one(case_id, file).await {
                    Ok(document) => UploadOutcome::Uploaded { filename, document },
                    Err(err) => UploadOutcome::Failed {
                        filename,
                        reason: err.to_string(),
                    },
                }
            }
        });
        let outcomes = join_all(uploads).await;

        for outcome in &outcomes {
            match outcome {
                UploadOutcome::Uploaded { filename, .. } => {
                    info!(case_id = case_id.0, "upload: stored {filename}");
                }
                UploadOutcome::Failed { filename, reason } => {
                    warn!(case_id = case_id.0, "upload: {filename} failed: {reason}");
                }
            }
            let _ = self.events.send(ClientEvent::UploadFinished(outcome.clone()));
        }

        match self.fetch_documents(case_id).await {
            Ok(documents) => {
                let _ = self.apply_fetched_documents(epoch, documents).await;
            }
            Err(err) => {
                warn!(case_id = case_id.0, "upload: post-batch refresh failed: {err}");
                let _ = self.events.send(ClientEvent::Error(err.to_string()));
            }
        }
        self.ensure_polling().await;

        Ok(outcomes)
    }

    /// Client-side gate only; the service validates again. Generation is a
    /// single synchronous request, never polled.
    async fn generate_draft(&self, draft_type: DraftType) -> Result<Draft> {
        let gate = {
            let store = self.store.lock().await;
            store
                .active_case_id()
                .map(|id| (id, store.selection_epoch(), store.has_completed_document()))
        };
        let Some((case_id, epoch, has_completed)) = gate else {
            return Err(CaseworkError::Validation("No active case selected".into()).into());
        };
        if !has_completed {
            return Err(CaseworkError::Validation(
                "No completed documents to generate from".into(),
            )
            .into());
        }

        let draft: Draft = self
            .post_json(
                &format!("/cases/{}/generate", case_id.0),
                &GenerateDraftRequest {
                    draft_type,
                    document_ids: Vec::new(),
                },
            )
            .await?;
        info!(case_id = case_id.0, "draft: generated {}", draft_type.label());
        let _ = self.events.send(ClientEvent::DraftGenerated { draft_type });

        let drafts = self.fetch_drafts(case_id).await?;
        self.apply_fetched_drafts(epoch, drafts).await;
        Ok(draft)
    }

    async fn fetch_document_detail(&self, document_id: DocumentId) -> Result<DocumentDetail> {
        let detail: DocumentDetail = self
            .get_json(&format!("/documents/{}", document_id.0))
            .await?;
        Ok(detail)
    }

    async fn snapshot(&self) -> StoreSnapshot {
        self.store.lock().await.snapshot()
    }

    async fn is_polling(&self) -> bool {
        self.poll_task
            .lock()
            .await
            .as_ref()
            .is_some_and(|task| !task.is_finished())
    }

    fn subscribe_events(&self) -> broadcast::Receiver<ClientEvent> {
        self.events.subscribe()
    }
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
