//! File queue source.
//!
//! Polls one path for a JSON queue document at a fixed interval.
//!
//! - With `delete_on_success`, every successfully parsed document is dispatched
//!   and the file is removed, so the producer writes a fresh file per queue.
//! - Without it, a document is dispatched only when the file's (length, mtime)
//!   signature changes.
//! - Empty files and a missing path are skipped quietly. Invalid JSON is logged
//!   and retried on the next poll.

use std::fs;
use std::time::{Duration, SystemTime};

use serde_json::Value;
use tokio::{
    fs as afs,
    sync::mpsc::Sender,
    task::JoinHandle,
    time::{Instant, sleep},
};
use tracing::{error, info, trace, warn};

use super::EventSource;

const DEFAULT_POLL_MS: u64 = 100;
const MIN_POLL_MS: u64 = 10;

/// Source that polls a single file for queue documents.
#[derive(Debug, Clone)]
pub struct FileSource {
    path: String,
    poll_ms: u64,
    delete_on_success: bool,
}

impl FileSource {
    /// `poll_ms` defaults to 100 and is clamped to at least 10.
    pub fn new(path: String, poll_ms: Option<u64>, delete_on_success: Option<bool>) -> Self {
        Self {
            path,
            poll_ms: poll_ms.unwrap_or(DEFAULT_POLL_MS).max(MIN_POLL_MS),
            delete_on_success: delete_on_success.unwrap_or(false),
        }
    }

    pub fn poll_ms(&self) -> u64 {
        self.poll_ms
    }

    fn file_signature(meta: &fs::Metadata) -> (u64, u64) {
        let mtime = meta
            .modified()
            .ok()
            .and_then(|t| t.duration_since(SystemTime::UNIX_EPOCH).ok())
            .map(|d| d.as_nanos() as u64)
            .unwrap_or(0);
        (meta.len(), mtime)
    }
}

impl EventSource for FileSource {
    fn name(&self) -> &'static str {
        "file"
    }

    fn start(&self, sender: Sender<Value>) -> JoinHandle<()> {
        let path = self.path.clone();
        let poll_ms = self.poll_ms;
        let delete_on_success = self.delete_on_success;

        tokio::spawn(async move {
            info!(
                target: "screenqueue::sources",
                %path, poll_ms, delete_on_success,
                "FileSource task started"
            );

            let mut last_sig: Option<(u64, u64)> = None;
            let interval = Duration::from_millis(poll_ms);
            let mut next_tick = Instant::now();

            loop {
                let now = Instant::now();
                if now < next_tick {
                    sleep(next_tick - now).await;
                }
                next_tick += interval;

                if sender.is_closed() {
                    break;
                }

                let meta = match fs::metadata(&path) {
                    Ok(m) if m.is_file() => m,
                    Ok(_) => {
                        warn!(target: "screenqueue::sources", %path, "Path exists but is not a regular file");
                        continue;
                    }
                    // Missing: the producer has not written it yet.
                    Err(_) => continue,
                };

                let sig = Self::file_signature(&meta);
                if !delete_on_success && last_sig == Some(sig) {
                    trace!(target: "screenqueue::sources", %path, "File unchanged; skipping");
                    continue;
                }

                let content = match afs::read_to_string(&path).await {
                    Ok(content) => content,
                    Err(e) => {
                        warn!(target: "screenqueue::sources", %path, error = %e, "Failed to read file");
                        continue;
                    }
                };
                let trimmed = content.trim();
                if trimmed.is_empty() {
                    trace!(target: "screenqueue::sources", %path, "File is empty; ignoring");
                    continue;
                }

                let document = match serde_json::from_str::<Value>(trimmed) {
                    Ok(value) => value,
                    Err(e) => {
                        warn!(target: "screenqueue::sources", %path, error = %e, "Failed to parse JSON; will retry");
                        continue;
                    }
                };

                if let Err(e) = sender.send(document).await {
                    error!(
                        target: "screenqueue::sources",
                        %path, error = %e,
                        "Channel closed; FileSource terminating"
                    );
                    break;
                }
                info!(target: "screenqueue::sources", %path, "Dispatched queue document from file");

                if delete_on_success {
                    if let Err(e) = afs::remove_file(&path).await {
                        warn!(target: "screenqueue::sources", %path, error = %e, "Failed to delete file after dispatch");
                    }
                } else {
                    last_sig = Some(sig);
                }
            }

            info!(target: "screenqueue::sources", %path, "FileSource task ended");
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tokio::sync::mpsc;
    use tokio::time::timeout;

    #[test]
    fn poll_interval_is_clamped() {
        assert_eq!(FileSource::new("x".into(), Some(50), Some(false)).poll_ms(), 50);
        assert_eq!(FileSource::new("y".into(), Some(1), None).poll_ms(), MIN_POLL_MS);
        assert_eq!(FileSource::new("z".into(), None, None).poll_ms(), DEFAULT_POLL_MS);
    }

    #[tokio::test]
    async fn dispatches_and_deletes_queue_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("queue.json");
        std::fs::write(&path, r#"[{"type":"delay","params":{"duration":0}}]"#).unwrap();

        let (tx, mut rx) = mpsc::channel::<Value>(4);
        let src = FileSource::new(path.display().to_string(), Some(10), Some(true));
        let handle = src.start(tx);

        let doc = timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("no document within timeout")
            .expect("channel closed");
        assert_eq!(doc, json!([{"type": "delay", "params": {"duration": 0}}]));

        // Removal follows the send; give the task a moment.
        for _ in 0..100 {
            if !path.exists() {
                break;
            }
            sleep(Duration::from_millis(10)).await;
        }
        assert!(!path.exists());
        handle.abort();
    }

    #[tokio::test]
    async fn invalid_json_is_not_dispatched() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("queue.json");
        std::fs::write(&path, "{ not json").unwrap();

        let (tx, mut rx) = mpsc::channel::<Value>(4);
        let handle = FileSource::new(path.display().to_string(), Some(10), Some(true)).start(tx);

        assert!(timeout(Duration::from_millis(200), rx.recv()).await.is_err());
        assert!(path.exists());
        handle.abort();
    }
}
