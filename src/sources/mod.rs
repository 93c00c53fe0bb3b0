/*!
Queue sources.

A source produces whole queue documents (`serde_json::Value`, either a bare
array of action descriptors or `{settings?, actions}`) and pushes them into a
channel. The binary drains that channel from a single loop, so queue runs never
overlap.

- `file.rs`         -> `FileSource`  (poll a single JSON file)
- `stdin_source.rs` -> `StdinSource` (newline-delimited JSON from standard input)

Sources parse raw input as JSON only; turning it into a `QueueDocument` happens
on the receiving side. Tasks log errors and keep going, and end when the
receiver is dropped.
*/

use serde_json::Value;
use tokio::{sync::mpsc::Sender, task::JoinHandle};
use tracing::info;

use crate::config::SourceConfig;

pub mod file;
pub mod stdin_source;

pub use file::FileSource;
pub use stdin_source::StdinSource;

/// Trait implemented by all queue sources.
pub trait EventSource: Send + Sync {
    /// Static human-readable identifier (used in logs).
    fn name(&self) -> &'static str;

    /// Start the source in the background.
    fn start(&self, sender: Sender<Value>) -> JoinHandle<()>;
}

/// Construct the given sources, in order.
pub fn build_sources_from_config(configs: &[SourceConfig]) -> Vec<Box<dyn EventSource>> {
    configs
        .iter()
        .map(|sc| -> Box<dyn EventSource> {
            match sc {
                SourceConfig::File {
                    path,
                    poll_ms,
                    delete_on_success,
                } => Box::new(FileSource::new(path.clone(), *poll_ms, *delete_on_success)),
                SourceConfig::Stdin => Box::new(StdinSource::new()),
            }
        })
        .collect()
}

/// Spawn every source, returning their `JoinHandle`s.
pub fn spawn_all_sources(
    sources: &[Box<dyn EventSource>],
    sender: Sender<Value>,
) -> Vec<JoinHandle<()>> {
    sources
        .iter()
        .map(|src| {
            info!(
                target: "screenqueue::sources",
                source = %src.name(),
                "Starting source task"
            );
            src.start(sender.clone())
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_sources_in_order() {
        let configs = vec![
            SourceConfig::Stdin,
            SourceConfig::File {
                path: "queue.json".into(),
                poll_ms: None,
                delete_on_success: Some(true),
            },
        ];
        let names: Vec<&str> = build_sources_from_config(&configs)
            .iter()
            .map(|s| s.name())
            .collect();
        assert_eq!(names, vec!["stdin", "file"]);
        assert!(build_sources_from_config(&[]).is_empty());
    }
}
