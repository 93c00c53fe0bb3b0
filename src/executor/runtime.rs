use image::{DynamicImage, RgbaImage};
use rand::random_range;
use serde::Serialize;
use serde_json::Value;
use std::path::Path;
use std::time::Duration;
use tracing::{debug, error, info, trace, warn};

use crate::config::{
    Action, ActionDef, ActionDescriptor, DelayParams, FindImageParams, FindTextParams,
    MouseOperation, MouseParams, MouseTarget, Point, ScreenshotParams, SendHotkeyParams,
    SendTextParams, Settings,
};
use crate::error::{ActionError, ActionResult, QueueError};
use crate::executor::actions::ActionExecutor;
use crate::executor::keys;
use crate::executor::store::{ActionOutput, ResultStore, StoredResult};
use crate::utils::interpolation;
use crate::vision::capture::{self, ScreenCapture, XcapScreen};
use crate::vision::matcher::{self, ImageMatcher};
use crate::vision::ocr::{self, OcrEngine, TesseractCli, TextMatch};

/// One action that completed during a queue run.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ExecutedAction {
    pub index: usize,
    pub execute_identifier: String,
    pub action_type: String,
}

/// One action that failed while `continue_on_error` was set.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct FailedAction {
    pub index: usize,
    pub action_type: String,
    pub execute_identifier: Option<String>,
    /// Times the action was executed; 0 when it failed before dispatch.
    pub attempts: u32,
    pub error: String,
}

/// Summary of a queue run, in execution order.
#[derive(Debug, Clone, Default, Serialize, PartialEq)]
pub struct QueueReport {
    pub executed: Vec<ExecutedAction>,
    pub failures: Vec<FailedAction>,
}

impl QueueReport {
    pub fn is_success(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Result of `run_single_action`.
#[derive(Debug, Clone, PartialEq)]
pub struct ActionOutcome {
    pub execute_identifier: String,
    pub record: StoredResult,
}

/// Runtime is responsible for:
/// - running action queues strictly in order (stop or continue on failure)
/// - dispatching each typed action to its capability (capture, matching, OCR, input)
/// - recording results under their execute identifiers for later actions
pub struct Runtime {
    settings: Settings,
    executor: ActionExecutor,
    screen: Box<dyn ScreenCapture>,
    ocr: Box<dyn OcrEngine>,
    store: ResultStore,
}

impl Runtime {
    /// Create a runtime that captures with `xcap` and reads text with the
    /// configured `tesseract` executable.
    pub fn new(settings: Settings) -> Self {
        let ocr = TesseractCli::new(settings.ocr.tesseract.clone());
        Self::with_backends(settings, Box::new(XcapScreen), Box::new(ocr))
    }

    /// Create a runtime with explicit capture and OCR backends.
    pub fn with_backends(
        settings: Settings,
        screen: Box<dyn ScreenCapture>,
        ocr: Box<dyn OcrEngine>,
    ) -> Self {
        debug!(
            target: "screenqueue::runtime",
            screen = screen.name(),
            ocr = ocr.name(),
            dry_run = settings.dry_run,
            "Runtime created"
        );
        Self {
            executor: ActionExecutor::new(settings.dry_run),
            settings,
            screen,
            ocr,
            store: ResultStore::new(),
        }
    }

    /// Returns a reference to the settings.
    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Replace all settings at once. The OCR engine is the one chosen at construction.
    pub fn apply_settings(&mut self, settings: Settings) -> ActionResult<()> {
        settings.check()?;
        self.executor.set_dry_run(settings.dry_run);
        self.settings = settings;
        Ok(())
    }

    pub fn set_scale_factor(&mut self, scale_factor: f32) -> ActionResult<()> {
        let mut next = self.settings.clone();
        next.scale_factor = scale_factor;
        self.apply_settings(next)
    }

    pub fn set_threshold(&mut self, threshold: f32) -> ActionResult<()> {
        let mut next = self.settings.clone();
        next.threshold = threshold;
        self.apply_settings(next)
    }

    pub fn set_debug(&mut self, debug: bool) {
        self.settings.debug = debug;
    }

    pub fn set_continue_on_error(&mut self, continue_on_error: bool) {
        self.settings.continue_on_error = continue_on_error;
    }

    /// Enable or disable dry-run mode at runtime.
    pub fn set_dry_run(&mut self, dry_run: bool) {
        self.settings.dry_run = dry_run;
        self.executor.set_dry_run(dry_run);
    }

    /// Is dry-run currently enabled?
    pub fn is_dry_run(&self) -> bool {
        self.executor.is_dry_run()
    }

    /// Results recorded so far.
    pub fn results(&self) -> &ResultStore {
        &self.store
    }

    /// Dotted-path lookup into a recorded result, e.g. `("copy", "result.clipboard")`.
    pub fn get_execute_result(&self, identifier: &str, path: &str) -> ActionResult<Value> {
        self.store.get(identifier, path)
    }

    /// Low-level input executor (e.g. to seed the simulated clipboard in dry-run mode).
    pub fn executor_mut(&mut self) -> &mut ActionExecutor {
        &mut self.executor
    }

    /// Run a queue of untyped descriptors.
    ///
    /// Starts from an empty result store. Each descriptor is converted to a typed
    /// action only when its turn comes, so the steps before a malformed one still run.
    /// Each action gets up to `max_retries` attempts.
    /// Stops at the first failure unless `continue_on_error` is set.
    pub fn run_action_queue(
        &mut self,
        descriptors: &[ActionDescriptor],
    ) -> Result<QueueReport, QueueError> {
        self.store.clear();
        info!(
            target: "screenqueue::runtime",
            actions = descriptors.len(),
            "Starting action queue"
        );

        let mut report = QueueReport::default();
        for (index, descriptor) in descriptors.iter().enumerate() {
            let (outcome, attempts) = match descriptor.to_action() {
                Ok(action) => self.run_queued(index, &action),
                Err(e) => (Err(e), 0),
            };
            settle(
                self.settings.continue_on_error,
                index,
                &descriptor.action_type,
                descriptor.execute_identifier(),
                outcome,
                attempts,
                &mut report,
            )?;
        }

        info!(
            target: "screenqueue::runtime",
            executed = report.executed.len(),
            failed = report.failures.len(),
            "Action queue completed"
        );
        Ok(report)
    }

    /// Run a queue of typed actions. Same semantics as `run_action_queue`.
    pub fn run_actions(&mut self, actions: &[Action]) -> Result<QueueReport, QueueError> {
        self.store.clear();
        info!(
            target: "screenqueue::runtime",
            actions = actions.len(),
            "Starting action queue"
        );

        let mut report = QueueReport::default();
        for (index, action) in actions.iter().enumerate() {
            let (outcome, attempts) = self.run_queued(index, action);
            settle(
                self.settings.continue_on_error,
                index,
                action.def.kind(),
                action.execute_identifier.as_deref(),
                outcome,
                attempts,
                &mut report,
            )?;
        }

        info!(
            target: "screenqueue::runtime",
            executed = report.executed.len(),
            failed = report.failures.len(),
            "Action queue completed"
        );
        Ok(report)
    }

    /// Run one descriptor against the current result store.
    /// Unlike a queue run, an existing result with the same identifier is overwritten.
    pub fn run_single_action(&mut self, descriptor: &ActionDescriptor) -> ActionResult<ActionOutcome> {
        let action = descriptor.to_action()?;
        self.run_single(&action)
    }

    /// Typed counterpart of `run_single_action`.
    pub fn run_single(&mut self, action: &Action) -> ActionResult<ActionOutcome> {
        let id = action
            .execute_identifier
            .clone()
            .unwrap_or_else(generate_execute_id);
        self.log_action(None, &id, &action.def);
        let record = self.execute_action(&action.def, &id)?;
        if self.store.set(id.clone(), record.clone()).is_some() {
            debug!(target: "screenqueue::runtime", %id, "Overwrote earlier result");
        }
        Ok(ActionOutcome {
            execute_identifier: id,
            record,
        })
    }

    /// Execute one queued action, retrying up to `max_retries` attempts.
    /// Returns the outcome and the number of attempts made.
    fn run_queued(&mut self, index: usize, action: &Action) -> (ActionResult<String>, u32) {
        let id = match &action.execute_identifier {
            Some(id) if self.store.contains(id) => {
                return (Err(ActionError::DuplicateIdentifier(id.clone())), 0);
            }
            Some(id) => id.clone(),
            None => generate_execute_id(),
        };
        self.log_action(Some(index), &id, &action.def);

        let max_attempts = self.settings.max_retries.max(1);
        let mut attempt = 1;
        loop {
            match self.execute_action(&action.def, &id) {
                Ok(record) => {
                    self.store.set(id.clone(), record);
                    return (Ok(id), attempt);
                }
                Err(e) if attempt < max_attempts => {
                    warn!(
                        target: "screenqueue::runtime",
                        index, %id, attempt, max_attempts, error = %e,
                        "Action failed; retrying"
                    );
                    attempt += 1;
                }
                Err(e) => return (Err(e), attempt),
            }
        }
    }

    fn log_action(&self, index: Option<usize>, id: &str, def: &ActionDef) {
        info!(
            target: "screenqueue::runtime",
            ?index, action_type = def.kind(), %id,
            "Executing action"
        );
        if self.settings.debug {
            info!(target: "screenqueue::runtime", %id, params = ?def, "Action params");
        } else {
            trace!(target: "screenqueue::runtime", %id, params = ?def, "Action params");
        }
    }

    /// Dispatch one typed action to its capability.
    fn execute_action(&mut self, def: &ActionDef, id: &str) -> ActionResult<StoredResult> {
        match def {
            ActionDef::Screenshot(p) => self.take_screenshot(p),
            ActionDef::FindImage(p) => self.find_image(p, id),
            ActionDef::FindText(p) => self.find_text(p),
            ActionDef::Mouse(p) => self.mouse(p),
            ActionDef::SendText(p) => self.send_text(p),
            ActionDef::SendHotkey(p) => self.send_hotkey(p),
            ActionDef::Delay(p) => self.delay(p),
        }
    }

    fn take_screenshot(&mut self, p: &ScreenshotParams) -> ActionResult<StoredResult> {
        let shot = self.screen.capture(p.monitor)?;
        let shot = match p.region {
            Some(region) => capture::crop_region(&shot, region)?,
            None => shot,
        };
        capture::save_image(&shot, &p.screenshot_file)?;
        info!(
            target: "screenqueue::runtime",
            path = %p.screenshot_file.display(),
            width = shot.width(),
            height = shot.height(),
            "Screenshot written"
        );
        Ok(StoredResult {
            action: "screenshot".into(),
            coordinates: None,
            result: ActionOutput::Screenshot {
                path: p.screenshot_file.clone(),
                width: shot.width(),
                height: shot.height(),
            },
        })
    }

    fn find_image(&mut self, p: &FindImageParams, id: &str) -> ActionResult<StoredResult> {
        let threshold = p.threshold.unwrap_or(self.settings.threshold);
        check_unit_interval("find_image", "threshold", threshold)?;

        let (source, label) = self.load_source(p.src_image.as_deref())?;
        let template = capture::load_image(&p.target_image)?;
        let screen_gray = matcher::preprocess(&source, &p.preprocess_options)?;
        let template_gray = matcher::preprocess(&template, &p.preprocess_options)?;
        let template_size = template_gray.dimensions();

        let image_matcher = ImageMatcher::new(self.settings.scale_factor, threshold);
        let (best, mut candidates) = image_matcher.find_candidates(&screen_gray, &template_gray);

        if let Some(context_path) = &p.target_context_image {
            let context_threshold = p.context_threshold.unwrap_or(threshold);
            check_unit_interval("find_image", "context_threshold", context_threshold)?;
            let context = matcher::preprocess(&capture::load_image(context_path)?, &p.preprocess_options)?;
            let before = candidates.len();
            candidates = image_matcher.filter_by_context(
                &screen_gray,
                candidates,
                template_size,
                &context,
                context_threshold,
                p.context_area_size,
            );
            debug!(
                target: "screenqueue::runtime",
                before, after = candidates.len(),
                "Filtered matches by context image"
            );
        }

        let found = image_matcher.summarize(best, &candidates, template_size);
        if self.settings.debug {
            self.write_debug_image(id, "find_image", &matcher::annotate_matches(&source, &candidates, template_size));
        }

        info!(
            target: "screenqueue::runtime",
            target_image = %p.target_image.display(),
            source = %label,
            found = found.found,
            confidence = found.confidence,
            position = ?found.position,
            "Image search finished"
        );

        if !found.found && p.fail_if_missing {
            return Err(ActionError::ImageNotFound {
                target: p.target_image.clone(),
                source_image: label,
            });
        }

        Ok(StoredResult {
            action: "find_image".into(),
            coordinates: found.position,
            result: ActionOutput::ImageSearch(found),
        })
    }

    fn find_text(&mut self, p: &FindTextParams) -> ActionResult<StoredResult> {
        if !(p.context_distance.is_finite() && p.context_distance >= 0.0) {
            return Err(ActionError::invalid_params(
                "find_text",
                format!("context_distance must be a non-negative number, got {}", p.context_distance),
            ));
        }

        let (source, label) = self.load_source(p.src_image.as_deref())?;
        let gray = matcher::preprocess(&source, &p.preprocess_options)?;
        let lang = p.lang.as_deref().unwrap_or(&self.settings.ocr.lang);
        let config = p.custom_config.as_deref().unwrap_or(&self.settings.ocr.config);

        let words = self.ocr.recognize(&gray, lang, config)?;
        let hits = ocr::find_text_positions(
            &words,
            &p.target_text,
            &p.target_context_text,
            p.context_distance,
        );
        debug!(
            target: "screenqueue::runtime",
            words = words.len(), hits = hits.len(),
            "OCR lookup"
        );

        let scale = self.settings.scale_factor;
        let found = TextMatch {
            found: !hits.is_empty(),
            position: hits.first().map(|w| {
                let (x, y) = w.center();
                matcher::scale_to_input(x, y, scale)
            }),
            words: hits.into_iter().cloned().collect(),
        };

        info!(
            target: "screenqueue::runtime",
            text = %p.target_text,
            source = %label,
            found = found.found,
            position = ?found.position,
            "Text search finished"
        );

        if !found.found && p.fail_if_missing {
            return Err(ActionError::TextNotFound {
                text: p.target_text.clone(),
                source_image: label,
            });
        }

        Ok(StoredResult {
            action: "find_text".into(),
            coordinates: found.position,
            result: ActionOutput::TextSearch(found),
        })
    }

    fn mouse(&mut self, p: &MouseParams) -> ActionResult<StoredResult> {
        match p.operation {
            MouseOperation::Move => {
                let target = p.target.as_ref().ok_or_else(|| {
                    ActionError::invalid_params("mouse", "operation 'move' requires a target")
                })?;
                let point = self.target_point(target, p.offset)?;
                self.executor.mouse_move_to(point)?;
            }
            MouseOperation::Click => {
                let target = p.target.clone().unwrap_or(MouseTarget::Cursor);
                if target != MouseTarget::Cursor || p.offset.is_some() {
                    let point = self.target_point(&target, p.offset)?;
                    self.executor.mouse_move_to(point)?;
                }
                self.executor.mouse_click(p.click)?;
            }
            MouseOperation::Scroll => {
                if let Some(target) = &p.target {
                    let point = self.target_point(target, p.offset)?;
                    self.executor.mouse_move_to(point)?;
                }
                self.executor.mouse_scroll(p.delta, p.axis)?;
            }
            MouseOperation::Drag => {
                let target = p.target.as_ref().ok_or_else(|| {
                    ActionError::invalid_params("mouse", "operation 'drag' requires a target")
                })?;
                let point = self.target_point(target, p.offset)?;
                self.executor.mouse_drag_to(point, p.click)?;
            }
        }

        let position = self.executor.cursor_position()?;
        Ok(StoredResult {
            action: "mouse".into(),
            coordinates: Some(position),
            result: ActionOutput::Mouse { position },
        })
    }

    /// Resolved target shifted by `offset`.
    fn target_point(&mut self, target: &MouseTarget, offset: Option<Point>) -> ActionResult<Point> {
        let base = self.resolve_target(target)?;
        base.checked_offset(offset).ok_or_else(|| {
            ActionError::invalid_params(
                "mouse",
                format!("offset {offset:?} moves {base:?} outside the coordinate range"),
            )
        })
    }

    fn resolve_target(&mut self, target: &MouseTarget) -> ActionResult<Point> {
        match target {
            MouseTarget::Cursor => self.executor.cursor_position(),
            MouseTarget::At(point) => Ok(*point),
            MouseTarget::Result(id) => self.store.coordinates(id),
        }
    }

    fn send_text(&mut self, p: &SendTextParams) -> ActionResult<StoredResult> {
        let text = if p.interpolate {
            interpolation::interpolate_string(&p.text, &self.store)?
        } else {
            p.text.clone()
        };
        self.executor.type_text(&text, self.settings.type_interval_ms)?;
        Ok(StoredResult {
            action: "send_text".into(),
            coordinates: None,
            result: ActionOutput::Text {
                chars: text.chars().count(),
            },
        })
    }

    fn send_hotkey(&mut self, p: &SendHotkeyParams) -> ActionResult<StoredResult> {
        if p.hot_keys.is_empty() {
            return Err(ActionError::invalid_params("send_hotkey", "hot_keys is empty"));
        }
        let chord = p
            .hot_keys
            .iter()
            .map(|k| keys::parse_key(k))
            .collect::<ActionResult<Vec<_>>>()?;
        self.executor.key_chord(&chord)?;

        let capture = p
            .capture_clipboard
            .unwrap_or_else(|| keys::is_clipboard_chord(&p.hot_keys));
        let clipboard = if capture {
            self.executor
                .sleep(Duration::from_millis(self.settings.clipboard_settle_ms));
            self.executor.clipboard_text()
        } else {
            None
        };
        debug!(
            target: "screenqueue::runtime",
            keys = ?p.hot_keys, captured = clipboard.is_some(),
            "Hotkey sent"
        );

        Ok(StoredResult {
            action: "send_hotkey".into(),
            coordinates: None,
            result: ActionOutput::Hotkey {
                keys: p.hot_keys.iter().map(|k| k.trim().to_lowercase()).collect(),
                clipboard,
            },
        })
    }

    fn delay(&mut self, p: &DelayParams) -> ActionResult<StoredResult> {
        if !(p.duration.is_finite() && p.duration >= 0.0) {
            return Err(ActionError::invalid_params(
                "delay",
                format!("duration must be a non-negative number, got {}", p.duration),
            ));
        }
        let seconds = match p.max_duration {
            Some(max) if !(max.is_finite() && max >= p.duration) => {
                return Err(ActionError::invalid_params(
                    "delay",
                    format!("max_duration must be >= duration, got {max}"),
                ));
            }
            Some(max) if max > p.duration => random_range(p.duration..=max),
            _ => p.duration,
        };

        let duration = Duration::from_secs_f64(seconds);
        self.executor.sleep(duration);
        Ok(StoredResult {
            action: "delay".into(),
            coordinates: None,
            result: ActionOutput::Delay {
                waited_ms: duration.as_millis() as u64,
            },
        })
    }

    /// Load the image to search in: a file, or a live capture of the primary monitor.
    fn load_source(&mut self, path: Option<&Path>) -> ActionResult<(DynamicImage, String)> {
        match path {
            Some(path) => Ok((capture::load_image(path)?, path.display().to_string())),
            None => {
                let shot = self.screen.capture(None)?;
                Ok((DynamicImage::ImageRgba8(shot), "live screen".to_string()))
            }
        }
    }

    fn write_debug_image(&self, id: &str, kind: &str, image: &RgbaImage) {
        let path = self.settings.debug_dir.join(format!("{id}_{kind}.png"));
        match capture::save_image(image, &path) {
            Ok(()) => debug!(target: "screenqueue::runtime", path = %path.display(), "Debug image written"),
            Err(e) => warn!(target: "screenqueue::runtime", path = %path.display(), error = %e, "Failed to write debug image"),
        }
    }
}

/// Record an action's outcome in the report, or turn a failure into a `QueueError`.
fn settle(
    continue_on_error: bool,
    index: usize,
    action_type: &str,
    declared_id: Option<&str>,
    outcome: ActionResult<String>,
    attempts: u32,
    report: &mut QueueReport,
) -> Result<(), QueueError> {
    match outcome {
        Ok(execute_identifier) => {
            report.executed.push(ExecutedAction {
                index,
                execute_identifier,
                action_type: action_type.to_string(),
            });
            Ok(())
        }
        Err(source) if continue_on_error => {
            warn!(
                target: "screenqueue::runtime",
                index, %action_type, attempts, error = %source,
                "Action failed; continuing"
            );
            report.failures.push(FailedAction {
                index,
                action_type: action_type.to_string(),
                execute_identifier: declared_id.map(str::to_string),
                attempts,
                error: source.to_string(),
            });
            Ok(())
        }
        Err(source) => {
            error!(
                target: "screenqueue::runtime",
                index, %action_type, attempts, error = %source,
                "Action failed; stopping queue"
            );
            Err(QueueError {
                index,
                action_type: action_type.to_string(),
                execute_identifier: declared_id.map(str::to_string),
                source,
            })
        }
    }
}

fn check_unit_interval(action_type: &str, name: &str, value: f32) -> ActionResult<()> {
    if (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(ActionError::invalid_params(
            action_type,
            format!("{name} must be within 0..=1, got {value}"),
        ))
    }
}

/// A fresh identifier for actions that did not name their result.
pub fn generate_execute_id() -> String {
    uuid::Uuid::new_v4().to_string()
}
