#![allow(clippy::missing_errors_doc, clippy::missing_panics_doc)]

/*!
Execution engine.

- `actions`: low-level input (mouse, keyboard, clipboard, sleep) with dry-run support
- `keys`: key-name parsing for hotkey chords
- `store`: the per-run result store and its dotted-path view
- `runtime`: the queue runner and action interpreter

Typical usage:

```no_run
use screenqueue::config::{ActionDescriptor, Settings};
use screenqueue::executor::Runtime;
use serde_json::json;

let mut rt = Runtime::new(Settings { dry_run: true, ..Settings::default() });
let queue = vec![
    ActionDescriptor::new("send_hotkey", json!({"hot_keys": ["ctrl", "c"], "execute_identifier": "copy"})),
    ActionDescriptor::new("send_text", json!({"text": "copied: {{copy.result.clipboard}}", "interpolate": true})),
];
let report = rt.run_action_queue(&queue)?;
println!("{} actions executed", report.executed.len());
# Ok::<(), screenqueue::error::QueueError>(())
```
*/

pub mod actions;
pub mod keys;
pub mod runtime;
pub mod store;

pub use actions::ActionExecutor;
pub use runtime::{ActionOutcome, ExecutedAction, FailedAction, QueueReport, Runtime};
pub use store::{ActionOutput, ResultStore, StoredResult};
