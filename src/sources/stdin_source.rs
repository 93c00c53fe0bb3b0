//! Stdin queue source.
//!
//! Reads newline-delimited JSON from standard input, one queue document per line:
//!
//! ```text
//! echo '[{"type":"delay","params":{"duration":0.5}}]' | screenqueue --stdin
//! ```
//!
//! Malformed lines are logged and skipped. EOF or a dropped receiver ends the task.

use serde_json::Value;
use tokio::{
    io::{self, AsyncBufRead, AsyncBufReadExt, BufReader},
    sync::mpsc::Sender,
    task::JoinHandle,
};
use tracing::{error, info, trace, warn};

use super::EventSource;

/// Source that reads newline-delimited queue documents from stdin.
#[derive(Debug, Clone, Default)]
pub struct StdinSource;

impl StdinSource {
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl EventSource for StdinSource {
    fn name(&self) -> &'static str {
        "stdin"
    }

    fn start(&self, sender: Sender<Value>) -> JoinHandle<()> {
        tokio::spawn(async move {
            info!(target: "screenqueue::sources", "StdinSource task started (reading lines)");
            forward_lines(BufReader::new(io::stdin()), sender).await;
            trace!(target: "screenqueue::sources", "StdinSource task ended");
        })
    }
}

/// Forward every parseable line of `reader` as a JSON value. Returns the number forwarded.
pub(crate) async fn forward_lines<R>(mut reader: R, sender: Sender<Value>) -> usize
where
    R: AsyncBufRead + Unpin,
{
    let mut line = String::new();
    let mut forwarded = 0;

    loop {
        line.clear();
        match reader.read_line(&mut line).await {
            Ok(0) => {
                info!(target: "screenqueue::sources", "EOF on input; stopping");
                break;
            }
            Ok(_) => {
                let raw = line.trim();
                if raw.is_empty() {
                    continue;
                }
                match serde_json::from_str::<Value>(raw) {
                    Ok(value) => {
                        if let Err(e) = sender.send(value).await {
                            error!(
                                target: "screenqueue::sources",
                                error = %e,
                                "Channel closed while sending queue document; terminating task"
                            );
                            break;
                        }
                        forwarded += 1;
                    }
                    Err(e) => {
                        warn!(
                            target: "screenqueue::sources",
                            error = %e, line = raw,
                            "Failed to parse JSON line"
                        );
                    }
                }
            }
            Err(e) => {
                warn!(target: "screenqueue::sources", error = %e, "Error reading input; terminating task");
                break;
            }
        }
    }

    forwarded
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tokio::sync::mpsc;

    #[test]
    fn test_name_and_new() {
        assert_eq!(StdinSource::new().name(), "stdin");
    }

    #[tokio::test]
    async fn test_forwards_valid_lines_only() {
        let input = b"[{\"type\":\"delay\"}]\n\nnot json\n{\"actions\":[]}\n";
        let (tx, mut rx) = mpsc::channel::<Value>(8);

        let forwarded = forward_lines(&input[..], tx).await;
        assert_eq!(forwarded, 2);
        assert_eq!(rx.recv().await, Some(json!([{"type": "delay"}])));
        assert_eq!(rx.recv().await, Some(json!({"actions": []})));
        assert_eq!(rx.recv().await, None);
    }

    #[tokio::test]
    async fn test_stops_when_receiver_dropped() {
        let (tx, rx) = mpsc::channel::<Value>(1);
        drop(rx);
        assert_eq!(forward_lines(&b"[]\n[]\n"[..], tx).await, 0);
    }
}
