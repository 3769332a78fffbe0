pub mod dialogs;

use std::collections::BTreeMap;
use std::time::Instant;

use iced::{
    font,
    widget::{button, column, container, progress_bar, row, scrollable, text, Column},
    Alignment, Element, Font, Length,
};

use crate::application::{DownloadEngine, ProgressReporter};
use crate::domain::{Download, DownloadId, DownloadState};
use crate::utils::split_destination;

/// User actions on a download row.
#[derive(Debug, Clone)]
pub enum DownloadMessage {
    Cancel(DownloadId),
    Retry(DownloadId),
    Dismiss(DownloadId),
    RetrySave(DownloadId),
    AbandonSave(DownloadId),
}

/// Main view state
#[derive(Default)]
pub struct DownloadView {
    reporters: BTreeMap<DownloadId, ProgressReporter>,
}

impl DownloadView {
    /// Byte counters change on every progress event.
    pub fn on_progress(&mut self, download: &Download) {
        let sample = download.sample(Instant::now());
        self.reporters
            .entry(download.id())
            .or_default()
            .on_progress(&sample);
    }

    /// ETA strings change only on the timer.
    pub fn on_tick<'a>(&mut self, downloads: impl Iterator<Item = &'a Download>, now: Instant) {
        for download in downloads.filter(|d| d.state() == DownloadState::Running) {
            let sample = download.sample(now);
            self.reporters
                .entry(download.id())
                .or_default()
                .on_tick(&sample);
        }
    }

    pub fn restart(&mut self, id: DownloadId) {
        self.reporters.entry(id).or_default().reset();
    }

    pub fn forget(&mut self, id: DownloadId) {
        self.reporters.remove(&id);
    }

    pub fn view<'a>(&'a self, engine: &'a DownloadEngine) -> Element<'a, DownloadMessage> {
        if engine.downloads().next().is_none() {
            return container(text("Waiting for downloads...").size(14))
                .padding(20)
                .into();
        }

        let rows = engine
            .downloads()
            .map(|download| self.download_row(download));
        let list = Column::with_children(rows).spacing(16).padding(20);

        scrollable(list).height(Length::Fill).into()
    }

    fn download_row<'a>(&'a self, download: &'a Download) -> Element<'a, DownloadMessage> {
        let id = download.id();
        let (dir, name) = split_destination(download.destination());
        let reporter = self.reporters.get(&id);

        let path = row![
            text(dir).size(14),
            text(name).size(14).font(Font {
                weight: font::Weight::Bold,
                ..Font::DEFAULT
            }),
        ];

        let fraction = match download.state() {
            DownloadState::Saving
            | DownloadState::Completed
            | DownloadState::WriteFailed
            | DownloadState::Unsaved => 1.0,
            _ => download
                .sample(Instant::now())
                .fraction()
                .unwrap_or(0.0),
        };

        let status = match download.state() {
            DownloadState::Running if download.attempt() > 1 => format!(
                "{} (attempt {})  {}  {} left",
                download.state(),
                download.attempt(),
                reporter.map(|r| r.counters()).unwrap_or_default(),
                reporter.map(|r| r.eta()).unwrap_or("unknown"),
            ),
            DownloadState::Running => format!(
                "{}  {}  {} left",
                download.state(),
                reporter.map(|r| r.counters()).unwrap_or_default(),
                reporter.map(|r| r.eta()).unwrap_or("unknown"),
            ),
            DownloadState::Failed => format!(
                "{}: {}",
                download.state(),
                download.last_error().unwrap_or("unknown error")
            ),
            DownloadState::WriteFailed => format!(
                "{}: {}",
                download.state(),
                download.write_error().unwrap_or("unknown error")
            ),
            _ => format!(
                "{}  {}",
                download.state(),
                reporter.map(|r| r.counters()).unwrap_or_default()
            ),
        };

        let actions: Element<'a, DownloadMessage> = match download.state() {
            DownloadState::Pending | DownloadState::Running => button("cancel")
                .on_press(DownloadMessage::Cancel(id))
                .into(),
            DownloadState::Saving => button("cancel").into(),
            DownloadState::Failed | DownloadState::Cancelled => row![
                button("retry").on_press(DownloadMessage::Retry(id)),
                button("clear").on_press(DownloadMessage::Dismiss(id)),
            ]
            .spacing(8)
            .into(),
            DownloadState::WriteFailed => row![
                button("retry save").on_press(DownloadMessage::RetrySave(id)),
                button("abandon").on_press(DownloadMessage::AbandonSave(id)),
            ]
            .spacing(8)
            .into(),
            DownloadState::Completed | DownloadState::Unsaved => button("clear")
                .on_press(DownloadMessage::Dismiss(id))
                .into(),
        };

        column![
            row![
                column![path, text(download.locator().as_str()).size(12)]
                    .spacing(4)
                    .width(Length::Fill),
                actions,
            ]
            .spacing(10)
            .align_y(Alignment::Center),
            progress_bar(0.0..=1.0, fraction),
            text(status).size(12),
        ]
        .spacing(6)
        .into()
    }
}
