use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use iced::{Subscription, Task};
use tracing::{info, warn};

use crate::api::ApiClient;
use crate::application::{DownloadEngine, FetchEvent, PersistJob};
use crate::domain::{AppError, DownloadId, DownloadRequest};
use crate::transport::Listener;
use crate::ui::dialogs::{self, WriteDecision};
use crate::ui::{DownloadMessage, DownloadView};

/// Everything the window needs when the event loop starts.
#[derive(Clone)]
pub struct Startup {
    pub listener: Arc<Listener>,
    pub client: ApiClient,
    /// Command-line requests whose destination was already chosen.
    pub initial: Vec<(DownloadRequest, PathBuf)>,
    pub tick_interval: Duration,
}

pub struct DownloadApp {
    engine: DownloadEngine,
    view: DownloadView,
    tick_interval: Duration,
}

#[derive(Debug, Clone)]
pub enum Message {
    UiMessage(DownloadMessage),
    /// Forwarded by another instance
    RequestReceived(DownloadRequest),
    /// (Request, Selected Path)
    DestinationSelected(DownloadRequest, Option<PathBuf>),
    Fetch(FetchEvent),
    Saved(DownloadId, Result<(), AppError>),
    WriteDecided(DownloadId, WriteDecision),
    Tick,
}

impl DownloadApp {
    pub fn boot(startup: Startup) -> (Self, Task<Message>) {
        let mut app = Self {
            engine: DownloadEngine::new(startup.client),
            view: DownloadView::default(),
            tick_interval: startup.tick_interval,
        };

        let mut tasks = vec![Task::run(
            startup.listener.incoming(),
            Message::RequestReceived,
        )];
        for (request, destination) in startup.initial {
            tasks.push(app.start(request, destination));
        }

        (app, Task::batch(tasks))
    }

    fn start(&mut self, request: DownloadRequest, destination: PathBuf) -> Task<Message> {
        let (id, fetch) = self.engine.submit(request, destination);
        self.view.restart(id);
        Task::run(fetch, Message::Fetch)
    }

    fn retry(&mut self, id: DownloadId) -> Task<Message> {
        match accepted(self.engine.retry(id)) {
            Some(fetch) => {
                self.view.restart(id);
                Task::run(fetch, Message::Fetch)
            }
            None => Task::none(),
        }
    }

    fn retry_save(&mut self, id: DownloadId) -> Task<Message> {
        match accepted(self.engine.retry_save(id)) {
            Some(job) => persist(job),
            None => Task::none(),
        }
    }
}

/// Drop a rejected user action. Invalid transitions are already logged by
/// the engine; actions on downloads it no longer knows are logged here.
fn accepted<T>(result: Result<T, AppError>) -> Option<T> {
    match result {
        Ok(value) => Some(value),
        Err(AppError::UnknownDownload(id)) => {
            warn!(%id, "action on unknown download ignored");
            None
        }
        Err(_) => None,
    }
}

fn persist(job: PersistJob) -> Task<Message> {
    Task::perform(job.execute(), |(id, result)| Message::Saved(id, result))
}

pub fn update(app: &mut DownloadApp, message: Message) -> Task<Message> {
    match message {
        Message::RequestReceived(request) => {
            let hint = request.locator.file_name_hint();

            return Task::perform(
                async move {
                    let path = dialogs::pick_destination(hint).await;
                    (request, path)
                },
                |(request, path)| Message::DestinationSelected(request, path),
            );
        }
        Message::DestinationSelected(request, Some(path)) => {
            return app.start(request, path);
        }
        Message::DestinationSelected(request, None) => {
            info!(url = %request.locator, "save dialog cancelled, request dropped");
        }
        Message::Fetch(event) => {
            let id = event.id;
            let job = app.engine.apply(event);

            if let Some(download) = app.engine.get(id) {
                app.view.on_progress(download);
            }
            if let Some(job) = job {
                return persist(job);
            }
        }
        Message::Saved(id, result) => {
            let failure = result.as_ref().err().map(ToString::to_string);
            if accepted(app.engine.record_save(id, result)).is_none() {
                return Task::none();
            }

            if let (Some(error), Some(download)) = (failure, app.engine.get(id)) {
                let path = download.destination().to_path_buf();
                return Task::perform(dialogs::confirm_write_retry(path, error), move |decision| {
                    Message::WriteDecided(id, decision)
                });
            }
        }
        Message::WriteDecided(id, WriteDecision::Retry)
        | Message::UiMessage(DownloadMessage::RetrySave(id)) => {
            return app.retry_save(id);
        }
        Message::WriteDecided(id, WriteDecision::Abandon)
        | Message::UiMessage(DownloadMessage::AbandonSave(id)) => {
            accepted(app.engine.abandon_save(id));
        }
        Message::WriteDecided(id, WriteDecision::Undecided) => {
            warn!(%id, "write failure left undecided");
        }
        Message::UiMessage(DownloadMessage::Cancel(id)) => {
            accepted(app.engine.cancel(id));
        }
        Message::UiMessage(DownloadMessage::Retry(id)) => {
            return app.retry(id);
        }
        Message::UiMessage(DownloadMessage::Dismiss(id)) => {
            if accepted(app.engine.dismiss(id)).is_some() {
                app.view.forget(id);
            }
        }
        Message::Tick => {
            app.view.on_tick(app.engine.downloads(), Instant::now());
        }
    }
    Task::none()
}

pub fn view(app: &DownloadApp) -> iced::Element<'_, Message> {
    app.view.view(&app.engine).map(Message::UiMessage)
}

/// The ETA timer only runs while something is downloading.
pub fn subscription(app: &DownloadApp) -> Subscription<Message> {
    if app.engine.has_active() {
        iced::time::every(app.tick_interval).map(|_| Message::Tick)
    } else {
        Subscription::none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::ApiConfig;

    fn app() -> DownloadApp {
        DownloadApp {
            engine: DownloadEngine::new(ApiClient::new(ApiConfig::default()).unwrap()),
            view: DownloadView::default(),
            tick_interval: Duration::from_secs(1),
        }
    }

    #[test]
    fn test_accepted_swallows_rejections() {
        assert_eq!(accepted::<u8>(Ok(3)), Some(3));
        assert_eq!(
            accepted::<()>(Err(AppError::UnknownDownload(DownloadId(9)))),
            None
        );
    }

    #[test]
    fn test_actions_on_unknown_download_are_ignored() {
        let mut app = app();
        let gone = DownloadId(7);

        for message in [
            DownloadMessage::Cancel(gone),
            DownloadMessage::Retry(gone),
            DownloadMessage::Dismiss(gone),
            DownloadMessage::RetrySave(gone),
            DownloadMessage::AbandonSave(gone),
        ] {
            let _ = update(&mut app, Message::UiMessage(message));
        }
        let _ = update(&mut app, Message::Saved(gone, Ok(())));

        assert_eq!(app.engine.downloads().count(), 0);
        assert!(!app.engine.has_active());
    }
}
