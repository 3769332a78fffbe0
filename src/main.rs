mod api;
mod app;
mod application;
mod config;
mod domain;
mod transport;
mod ui;
mod utils;

use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use color_eyre::eyre::WrapErr;
use iced::window;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use crate::api::ApiClient;
use crate::application::singleton::forward_all_blocking;
use crate::application::{Role, SingletonCoordinator};
use crate::config::Config;
use crate::transport::Endpoint;

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

fn main() -> color_eyre::Result<ExitCode> {
    color_eyre::install()?;
    // Exits with usage when no URL is given, before any negotiation
    let config = Config::parse();
    init_tracing();

    let requests = config.requests();
    let coordinator = SingletonCoordinator::new(Endpoint::new(config.endpoint_path()));

    let listener = match coordinator.claim()? {
        Role::Client(endpoint) => {
            forward_all_blocking(&endpoint, &requests).wrap_err_with(|| {
                format!(
                    "Failed to reach the running downloader at {}",
                    coordinator.endpoint().path().display()
                )
            })?;
            info!(count = requests.len(), "requests handed to the running instance");
            return Ok(ExitCode::SUCCESS);
        }
        Role::Server(listener) => listener,
    };

    let initial: Vec<_> = requests
        .into_iter()
        .filter_map(|request| {
            let hint = request.locator.file_name_hint();
            match ui::dialogs::pick_destination_blocking(&hint) {
                Some(path) => Some((request, path)),
                None => {
                    info!(url = %request.locator, "save dialog cancelled");
                    None
                }
            }
        })
        .collect();

    if initial.is_empty() {
        warn!("no download could be started");
        drop(listener);
        return Ok(ExitCode::FAILURE);
    }

    let startup = app::Startup {
        listener: Arc::new(listener),
        client: ApiClient::new(config.api_config()).wrap_err("Failed to build HTTP client")?,
        initial,
        tick_interval: config.tick_interval(),
    };

    iced::application(
        move || app::DownloadApp::boot(startup.clone()),
        app::update,
        app::view,
    )
    .title("Dobostorta downloader")
    .subscription(app::subscription)
    .window(window::Settings {
        exit_on_close_request: true,
        ..Default::default()
    })
    .run()
    .wrap_err("Download window failed")?;

    info!("window closed, releasing endpoint");
    Ok(ExitCode::SUCCESS)
}
