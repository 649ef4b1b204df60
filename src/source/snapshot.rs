//! Client for the raw-data snapshot API.
//!
//! An export is asynchronous: the filter document is submitted to
//! `/snapshot/`, which answers with a task id; `/tasks/status/<id>` is polled
//! until the task reports `SUCCESS` together with a download URL; the
//! download is a zip archive whose `Export.geojson` entry is the result.
//! The archive is held in memory while the entry is extracted.

use std::{
    io::{Cursor, Read},
    time::Duration,
};

use serde::Deserialize;
use serde_json::Value;

use crate::{
    cancel::CancellationToken,
    config::SnapshotConfig,
    error::{ExtractError, Result},
};

use super::transport::{with_retry, HttpTransport, ReqwestTransport, RetryPolicy};

/// Name of the GeoJSON entry inside the downloaded archive.
pub const EXPORT_ENTRY: &str = "Export.geojson";

/// Task states that mean "not finished yet".
const IN_PROGRESS_STATES: [&str; 4] = ["PENDING", "RECEIVED", "STARTED", "RETRY"];

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SnapshotSettings {
    pub base_url: String,
    pub poll_interval: Duration,
    pub max_polls: u32,
    pub retry: RetryPolicy,
}

impl From<&SnapshotConfig> for SnapshotSettings {
    fn from(value: &SnapshotConfig) -> Self {
        Self {
            base_url: value.base_url.trim_end_matches('/').to_string(),
            poll_interval: Duration::from_millis(value.poll_interval_ms),
            max_polls: value.max_polls,
            retry: RetryPolicy {
                max_retries: value.max_retries,
                base_delay: Duration::from_millis(value.retry_base_delay_ms),
            },
        }
    }
}

#[derive(Deserialize, Debug)]
struct SubmitResponse {
    task_id: Option<Value>,
}

#[derive(Deserialize, Debug)]
struct TaskStatus {
    status: String,
    #[serde(default)]
    result: Option<TaskResult>,
}

#[derive(Deserialize, Debug)]
struct TaskResult {
    download_url: Option<String>,
}

pub struct RemoteSnapshotClient<T: HttpTransport = ReqwestTransport> {
    transport: T,
    settings: SnapshotSettings,
}

impl RemoteSnapshotClient<ReqwestTransport> {
    pub fn new(config: &SnapshotConfig) -> Result<Self> {
        let transport =
            ReqwestTransport::new(Duration::from_secs(config.request_timeout_secs))?;
        Ok(Self::with_transport(transport, SnapshotSettings::from(config)))
    }
}

impl<T: HttpTransport> RemoteSnapshotClient<T> {
    pub fn with_transport(transport: T, settings: SnapshotSettings) -> Self {
        Self {
            transport,
            settings,
        }
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Submits the filter document, waits for the export and returns the raw
    /// bytes of the exported GeoJSON document.
    pub fn submit_and_fetch(&self, filter: &Value, cancel: &CancellationToken) -> Result<Vec<u8>> {
        let task_id = self.submit(filter, cancel)?;
        log::info!("Snapshot task {} submitted", task_id);
        let download_url = self.wait_for_task(&task_id, cancel)?;
        log::info!("Downloading snapshot from {}", download_url);
        let archive = with_retry(&self.settings.retry, cancel, "Snapshot download", || {
            self.transport.get(&download_url)
        })?;
        extract_export(&archive)
    }

    fn submit(&self, filter: &Value, cancel: &CancellationToken) -> Result<String> {
        let url = format!("{}/snapshot/", self.settings.base_url);
        let body = with_retry(&self.settings.retry, cancel, "Snapshot submit", || {
            self.transport.post_json(&url, filter)
        })?;
        let response: SubmitResponse = serde_json::from_slice(&body).map_err(|err| {
            ExtractError::protocol(format!("Invalid snapshot submit response: {}", err))
        })?;
        match response.task_id {
            Some(Value::String(task_id)) if !task_id.is_empty() => Ok(task_id),
            Some(Value::Number(task_id)) => Ok(task_id.to_string()),
            _ => Err(ExtractError::protocol(
                "Snapshot submit response has no task_id",
            )),
        }
    }

    /// Polls the task status until it succeeds. Transient HTTP failures use
    /// up a poll instead of aborting; the number of polls is bounded.
    fn wait_for_task(&self, task_id: &str, cancel: &CancellationToken) -> Result<String> {
        let url = format!("{}/tasks/status/{}", self.settings.base_url, task_id);
        let spinner = indicatif::ProgressBar::new_spinner();
        spinner.set_message(format!("Waiting for snapshot task {}", task_id));

        for poll in 1..=self.settings.max_polls {
            cancel.check()?;
            spinner.tick();
            match self.transport.get(&url) {
                Ok(body) => {
                    let status: TaskStatus = serde_json::from_slice(&body).map_err(|err| {
                        ExtractError::protocol(format!("Invalid task status response: {}", err))
                    })?;
                    if status.status == "SUCCESS" {
                        spinner.finish_and_clear();
                        return status
                            .result
                            .and_then(|result| result.download_url)
                            .ok_or_else(|| {
                                ExtractError::protocol(format!(
                                    "Task {} succeeded without a download_url",
                                    task_id
                                ))
                            });
                    }
                    if !IN_PROGRESS_STATES.contains(&status.status.as_str()) {
                        spinner.finish_and_clear();
                        return Err(ExtractError::TaskFailed {
                            task_id: task_id.to_string(),
                            status: status.status,
                        });
                    }
                    log::debug!("Task {} is {} (poll {})", task_id, status.status, poll);
                }
                Err(err) if err.is_transient() => {
                    log::warn!("Polling task {} failed: {}", task_id, err);
                }
                Err(err) => {
                    spinner.finish_and_clear();
                    return Err(err);
                }
            }
            if poll < self.settings.max_polls {
                cancel.sleep(self.settings.poll_interval)?;
            }
        }
        spinner.finish_and_clear();
        Err(ExtractError::Timeout {
            message: format!(
                "snapshot task {} not finished after {} polls",
                task_id, self.settings.max_polls
            ),
        })
    }
}

/// Returns the exact bytes of [`EXPORT_ENTRY`] from a zip archive.
pub fn extract_export(archive: &[u8]) -> Result<Vec<u8>> {
    let mut zip = zip::ZipArchive::new(Cursor::new(archive))
        .map_err(|err| ExtractError::protocol(format!("Snapshot is not a zip archive: {}", err)))?;
    let mut entry = zip.by_name(EXPORT_ENTRY).map_err(|err| {
        ExtractError::protocol(format!("Snapshot archive has no {}: {}", EXPORT_ENTRY, err))
    })?;
    let mut contents = Vec::new();
    entry.read_to_end(&mut contents).map_err(|err| {
        ExtractError::protocol(format!("Cannot read {} from archive: {}", EXPORT_ENTRY, err))
    })?;
    Ok(contents)
}
