use std::path::{Path, PathBuf};

use rfd::{MessageButtons, MessageDialogResult, MessageLevel};

/// Answer to the write-failure dialog.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteDecision {
    Retry,
    Abandon,
    /// Dialog dismissed; the row keeps offering both choices.
    Undecided,
}

/// Save dialog shown before any event loop exists.
pub fn pick_destination_blocking(hint: &str) -> Option<PathBuf> {
    rfd::FileDialog::new()
        .set_title("Save file")
        .set_file_name(hint)
        .save_file()
}

pub async fn pick_destination(hint: String) -> Option<PathBuf> {
    rfd::AsyncFileDialog::new()
        .set_title("Save file")
        .set_file_name(&hint)
        .save_file()
        .await
        .map(|handle| handle.path().to_path_buf())
}

pub async fn confirm_write_retry(path: PathBuf, error: String) -> WriteDecision {
    let result = rfd::AsyncMessageDialog::new()
        .set_level(MessageLevel::Error)
        .set_title("Failed to save download")
        .set_description(write_failure_text(&path, &error))
        .set_buttons(MessageButtons::YesNoCancel)
        .show()
        .await;

    match result {
        MessageDialogResult::Yes => WriteDecision::Retry,
        MessageDialogResult::No => WriteDecision::Abandon,
        _ => WriteDecision::Undecided,
    }
}

fn write_failure_text(path: &Path, error: &str) -> String {
    format!(
        "Could not write {}:\n{}\n\n\
         Yes: try writing to the same path again.\n\
         No: discard the downloaded data.",
        path.display(),
        error
    )
}
