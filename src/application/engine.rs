//! Download lifecycle engine.
//!
//! The engine is a synchronous state machine owned by the event loop. Each
//! fetch is handed back to the caller as a stream of [`FetchEvent`]s; the
//! caller drives it on whatever executor it runs and feeds every event back
//! through [`DownloadEngine::apply`]. The engine keeps the abort handle of
//! the live fetch so cancel and retry can dispose of it.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Instant;

use bytes::{Bytes, BytesMut};
use futures::stream::{self, AbortHandle, BoxStream};
use futures::StreamExt;
use tracing::{debug, info, trace, warn};

use super::persistence::PersistJob;
use crate::api::ApiClient;
use crate::domain::{AppError, Download, DownloadId, DownloadRequest, DownloadState};

pub type FetchStream = BoxStream<'static, FetchEvent>;

#[derive(Debug, Clone)]
pub struct FetchEvent {
    pub id: DownloadId,
    pub attempt: u32,
    pub kind: FetchEventKind,
}

#[derive(Debug, Clone)]
pub enum FetchEventKind {
    Progress { received: u64, total: Option<u64> },
    Finished(Result<Bytes, AppError>),
}

pub struct DownloadEngine {
    client: ApiClient,
    downloads: BTreeMap<DownloadId, Download>,
    next_id: u64,
}

impl DownloadEngine {
    pub fn new(client: ApiClient) -> Self {
        Self {
            client,
            downloads: BTreeMap::new(),
            next_id: 1,
        }
    }

    pub fn get(&self, id: DownloadId) -> Option<&Download> {
        self.downloads.get(&id)
    }

    /// All downloads in creation order.
    pub fn downloads(&self) -> impl Iterator<Item = &Download> {
        self.downloads.values()
    }

    /// Whether any download still has a fetch in flight.
    pub fn has_active(&self) -> bool {
        self.downloads
            .values()
            .any(|d| d.state == DownloadState::Running)
    }

    /// Accept a request and start fetching it right away.
    pub fn submit(
        &mut self,
        request: DownloadRequest,
        destination: PathBuf,
    ) -> (DownloadId, FetchStream) {
        let id = DownloadId(self.next_id);
        self.next_id += 1;

        info!(%id, url = %request.locator, path = %destination.display(), "download created");

        let mut download = Download::new(id, request.locator, destination);
        let fetch = self.start_fetch(&mut download);
        self.downloads.insert(id, download);

        (id, fetch)
    }

    pub fn cancel(&mut self, id: DownloadId) -> Result<(), AppError> {
        let download = self.lookup(id)?;
        if download.state != DownloadState::Running {
            return Err(invalid(download, "cancel"));
        }

        if let Some(handle) = download.fetch.take() {
            handle.abort();
        }
        download.body = None;
        download.state = DownloadState::Cancelled;

        info!(%id, received = download.bytes_received, "download cancelled");
        Ok(())
    }

    /// Re-issue the fetch for a failed or cancelled download.
    pub fn retry(&mut self, id: DownloadId) -> Result<FetchStream, AppError> {
        let client = self.client.clone();
        let download = self.lookup(id)?;
        if !download.state.is_retryable() {
            return Err(invalid(download, "retry"));
        }

        info!(%id, attempt = download.attempt + 1, "retrying download");
        Ok(fetch_for(client, download))
    }

    /// Remove a download that reached a terminal state.
    pub fn dismiss(&mut self, id: DownloadId) -> Result<Download, AppError> {
        let download = self.lookup(id)?;
        if !download.state.is_terminal() {
            return Err(invalid(download, "dismiss"));
        }

        info!(%id, state = %download.state, "download dismissed");
        self.downloads
            .remove(&id)
            .ok_or(AppError::UnknownDownload(id))
    }

    /// Apply one event from a fetch stream.
    ///
    /// Returns the write job when the body has been fully received.
    pub fn apply(&mut self, event: FetchEvent) -> Option<PersistJob> {
        let Some(download) = self.downloads.get_mut(&event.id) else {
            trace!(id = %event.id, "event for dismissed download");
            return None;
        };

        if event.attempt != download.attempt || download.state != DownloadState::Running {
            trace!(
                id = %event.id,
                attempt = event.attempt,
                current = download.attempt,
                state = %download.state,
                "stale fetch event dropped"
            );
            return None;
        }

        match event.kind {
            FetchEventKind::Progress { received, total } => {
                download.bytes_received = download.bytes_received.max(received);
                if total.is_some() {
                    download.bytes_total = total;
                }
                None
            }
            FetchEventKind::Finished(Ok(body)) => {
                download.fetch = None;
                download.bytes_received = body.len() as u64;
                download.bytes_total = Some(body.len() as u64);
                download.body = Some(body.clone());
                download.state = DownloadState::Saving;

                info!(id = %download.id, len = body.len(), "download finished");
                Some(PersistJob {
                    id: download.id,
                    destination: download.destination.clone(),
                    body,
                })
            }
            FetchEventKind::Finished(Err(e)) => {
                download.fetch = None;
                download.last_error = Some(e.to_string());
                download.state = DownloadState::Failed;

                warn!(id = %download.id, error = %e, "download failed");
                None
            }
        }
    }

    /// Record the outcome of a write started from [`apply`](Self::apply) or
    /// [`retry_save`](Self::retry_save).
    pub fn record_save(
        &mut self,
        id: DownloadId,
        result: Result<(), AppError>,
    ) -> Result<(), AppError> {
        let download = self.lookup(id)?;
        if download.state != DownloadState::Saving {
            return Err(invalid(download, "record a write for"));
        }

        match result {
            Ok(()) => {
                download.body = None;
                download.write_error = None;
                download.state = DownloadState::Completed;
                info!(%id, path = %download.destination.display(), "download saved");
            }
            Err(e) => {
                download.write_error = Some(e.to_string());
                download.state = DownloadState::WriteFailed;
                warn!(%id, error = %e, "download not saved, awaiting decision");
            }
        }

        Ok(())
    }

    /// Write the retained body again to the same destination.
    pub fn retry_save(&mut self, id: DownloadId) -> Result<PersistJob, AppError> {
        let download = self.lookup(id)?;
        let body = match (&download.state, &download.body) {
            (DownloadState::WriteFailed, Some(body)) => body.clone(),
            _ => return Err(invalid(download, "retry the write of")),
        };

        download.write_error = None;
        download.state = DownloadState::Saving;
        info!(%id, "retrying write");

        Ok(PersistJob {
            id,
            destination: download.destination.clone(),
            body,
        })
    }

    /// Give up writing the body; the fetched bytes are released.
    pub fn abandon_save(&mut self, id: DownloadId) -> Result<(), AppError> {
        let download = self.lookup(id)?;
        if download.state != DownloadState::WriteFailed {
            return Err(invalid(download, "abandon the write of"));
        }

        download.body = None;
        download.state = DownloadState::Unsaved;
        info!(%id, "write abandoned");
        Ok(())
    }

    fn start_fetch(&self, download: &mut Download) -> FetchStream {
        fetch_for(self.client.clone(), download)
    }

    fn lookup(&mut self, id: DownloadId) -> Result<&mut Download, AppError> {
        self.downloads
            .get_mut(&id)
            .ok_or(AppError::UnknownDownload(id))
    }
}

fn invalid(download: &Download, action: &'static str) -> AppError {
    let error = AppError::InvalidTransition {
        id: download.id,
        action,
        state: download.state,
    };
    warn!("{}", error);
    error
}

/// Move `download` into `Running` on a fresh attempt and build its fetch.
fn fetch_for(client: ApiClient, download: &mut Download) -> FetchStream {
    // Only one live fetch per download
    if let Some(previous) = download.fetch.take() {
        previous.abort();
    }

    download.attempt += 1;
    download.bytes_received = 0;
    download.bytes_total = None;
    download.last_error = None;
    download.write_error = None;
    download.body = None;
    download.started_at = Instant::now();
    download.state = DownloadState::Running;

    debug!(id = %download.id, attempt = download.attempt, url = %download.locator, "fetch issued");

    let (fetch, handle) = stream::abortable(fetch_stream(
        client,
        download.id,
        download.attempt,
        download.locator.as_str().to_string(),
    ));
    download.fetch = Some(handle);

    fetch.boxed()
}

enum FetchRuntimeState {
    Start {
        client: ApiClient,
        url: String,
    },
    Downloading {
        stream: BoxStream<'static, crate::api::Result<Bytes>>,
        buffer: BytesMut,
        total: Option<u64>,
    },
    Finished,
}

fn fetch_stream(
    client: ApiClient,
    id: DownloadId,
    attempt: u32,
    url: String,
) -> impl futures::Stream<Item = FetchEvent> + Send + 'static {
    let event = move |kind| FetchEvent { id, attempt, kind };

    stream::unfold(
        FetchRuntimeState::Start { client, url },
        move |state| async move {
            match state {
                FetchRuntimeState::Start { client, url } => {
                    match client.download_file_stream(&url).await {
                        Ok((total, stream)) => Some((
                            event(FetchEventKind::Progress { received: 0, total }),
                            FetchRuntimeState::Downloading {
                                stream: stream.boxed(),
                                buffer: BytesMut::with_capacity(
                                    total.unwrap_or(0).min(64 * 1024 * 1024) as usize,
                                ),
                                total,
                            },
                        )),
                        Err(e) => Some((
                            event(FetchEventKind::Finished(Err(AppError::Network(
                                e.to_string(),
                            )))),
                            FetchRuntimeState::Finished,
                        )),
                    }
                }
                FetchRuntimeState::Downloading {
                    mut stream,
                    mut buffer,
                    total,
                } => match stream.next().await {
                    Some(Ok(chunk)) => {
                        buffer.extend_from_slice(&chunk);
                        Some((
                            event(FetchEventKind::Progress {
                                received: buffer.len() as u64,
                                total,
                            }),
                            FetchRuntimeState::Downloading {
                                stream,
                                buffer,
                                total,
                            },
                        ))
                    }
                    Some(Err(e)) => Some((
                        event(FetchEventKind::Finished(Err(AppError::Network(
                            e.to_string(),
                        )))),
                        FetchRuntimeState::Finished,
                    )),
                    None => Some((
                        event(FetchEventKind::Finished(Ok(buffer.freeze()))),
                        FetchRuntimeState::Finished,
                    )),
                },
                FetchRuntimeState::Finished => None,
            }
        },
    )
}
