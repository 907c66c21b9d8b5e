//! Append-only notification log files

use super::NotificationSink;
use crate::protocol::NotificationPayload;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::warn;

/// Appends `[yyyy-mm-dd HH:MM:SS] title: body` lines to one file per slot.
///
/// Tagged notifications are recorded under their tag, untagged ones under
/// their title.
#[derive(Debug, Clone)]
pub struct FileRecorder {
    directory: PathBuf,
}

impl FileRecorder {
    /// Create the recorder, creating `directory` if needed
    pub fn new(directory: impl Into<PathBuf>) -> std::io::Result<Self> {
        let directory = directory.into();
        std::fs::create_dir_all(&directory)?;
        Ok(Self { directory })
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    /// Log file backing a slot
    pub fn slot_path(&self, slot: &str) -> PathBuf {
        self.directory.join(format!("{}.log", sanitize_slot(slot)))
    }

    fn append(&self, slot: &str, payload: &NotificationPayload) {
        let path = self.slot_path(slot);
        let line = format_line(&chrono::Local::now(), payload);

        let result = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .and_then(|mut file| file.write_all(line.as_bytes()));

        if let Err(e) = result {
            warn!(path = %path.display(), error = %e, "Failed to record notification");
        }
    }
}

impl NotificationSink for FileRecorder {
    fn post(&self, payload: &NotificationPayload) {
        self.append(&payload.title, payload);
    }

    fn post_tagged(&self, tag: &str, payload: &NotificationPayload) {
        self.append(tag, payload);
    }
}

/// Topic characters that are unsafe in file names become `_`
pub fn sanitize_slot(slot: &str) -> String {
    let sanitized: String = slot
        .chars()
        .map(|c| match c {
            '/' | '#' | '+' | '\\' | '\0' => '_',
            c => c,
        })
        .collect();

    match sanitized.as_str() {
        "" | "." | ".." => "_".to_string(),
        _ => sanitized,
    }
}

fn format_line<Tz>(at: &chrono::DateTime<Tz>, payload: &NotificationPayload) -> String
where
    Tz: chrono::TimeZone,
    Tz::Offset: std::fmt::Display,
{
    format!(
        "[{}] {}: {}\n",
        at.format("%Y-%m-%d %H:%M:%S"),
        payload.title,
        payload.body
    )
}
