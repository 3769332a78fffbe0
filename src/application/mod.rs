pub mod engine;
pub mod persistence;
pub mod progress;
pub mod singleton;

pub use engine::{DownloadEngine, FetchEvent};
pub use persistence::PersistJob;
pub use progress::ProgressReporter;
pub use singleton::{Role, SingletonCoordinator};
