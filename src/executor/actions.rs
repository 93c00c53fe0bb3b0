use enigo::Keyboard as _;
use enigo::Mouse as _;
use enigo::{Axis, Button as EButton, Coordinate, Direction, Enigo, Key, Settings};
use std::thread;
use std::time::Duration;
use tracing::{info, trace, warn};

use crate::config::{ClickKind, Point, ScrollAxis};
use crate::error::{ActionError, ActionResult};

const DOUBLE_CLICK_INTERVAL: Duration = Duration::from_millis(120);
/// Hold time at the drop point before the button is released.
const DRAG_SETTLE: Duration = Duration::from_millis(100);

/// Executes low-level input actions (mouse/keyboard/clipboard/sleep) with optional dry-run mode.
/// In dry-run mode, actions are only logged; the pointer and the clipboard are simulated
/// so later steps still see consistent state.
pub struct ActionExecutor {
    dry_run: bool,
    enigo: Option<Enigo>,
    virtual_cursor: Point,
    virtual_clipboard: Option<String>,
}

impl ActionExecutor {
    /// Create a new executor.
    /// - dry_run: when true, only logs instead of simulating real input.
    pub fn new(dry_run: bool) -> Self {
        Self {
            dry_run,
            enigo: None,
            virtual_cursor: Point::default(),
            virtual_clipboard: None,
        }
    }

    /// Returns whether the executor is currently in dry-run mode.
    pub fn is_dry_run(&self) -> bool {
        self.dry_run
    }

    /// Enable or disable dry-run mode dynamically.
    pub fn set_dry_run(&mut self, dry_run: bool) {
        self.dry_run = dry_run;
    }

    /// Move mouse cursor to absolute screen coordinates.
    pub fn mouse_move_to(&mut self, point: Point) -> ActionResult<()> {
        if self.dry_run {
            info!(target: "screenqueue::actions", x = point.x, y = point.y, "DRY-RUN mouse_move_to");
            self.virtual_cursor = point;
            return Ok(());
        }
        let enigo = self.ensure_enigo()?;
        trace!(target: "screenqueue::actions", x = point.x, y = point.y, "mouse_move_to");
        enigo
            .move_mouse(point.x, point.y, Coordinate::Abs)
            .map_err(input_err)
    }

    /// Click at the current pointer position.
    pub fn mouse_click(&mut self, kind: ClickKind) -> ActionResult<()> {
        if self.dry_run {
            info!(target: "screenqueue::actions", ?kind, "DRY-RUN mouse_click");
            return Ok(());
        }
        let enigo = self.ensure_enigo()?;
        trace!(target: "screenqueue::actions", ?kind, "mouse_click");
        let clicked = match kind {
            ClickKind::Left => enigo.button(EButton::Left, Direction::Click),
            ClickKind::Right => enigo.button(EButton::Right, Direction::Click),
            ClickKind::Middle => enigo.button(EButton::Middle, Direction::Click),
            ClickKind::Double => {
                enigo.button(EButton::Left, Direction::Click).map_err(input_err)?;
                thread::sleep(DOUBLE_CLICK_INTERVAL);
                enigo.button(EButton::Left, Direction::Click)
            }
        };
        clicked.map_err(input_err)
    }

    /// Press `kind` at the current position, move to `point`, release.
    /// The button is released even when the move fails.
    pub fn mouse_drag_to(&mut self, point: Point, kind: ClickKind) -> ActionResult<()> {
        let button = match kind {
            ClickKind::Left => EButton::Left,
            ClickKind::Right => EButton::Right,
            ClickKind::Middle => EButton::Middle,
            ClickKind::Double => {
                return Err(ActionError::invalid_params("mouse", "drag needs a single button, not 'double'"));
            }
        };
        if self.dry_run {
            info!(target: "screenqueue::actions", x = point.x, y = point.y, ?kind, "DRY-RUN mouse_drag_to");
            self.virtual_cursor = point;
            return Ok(());
        }
        let enigo = self.ensure_enigo()?;
        trace!(target: "screenqueue::actions", x = point.x, y = point.y, ?kind, "mouse_drag_to");

        enigo.button(button, Direction::Press).map_err(input_err)?;
        let moved = enigo.move_mouse(point.x, point.y, Coordinate::Abs).map_err(input_err);
        if moved.is_ok() {
            thread::sleep(DRAG_SETTLE);
        }
        let released = enigo.button(button, Direction::Release).map_err(input_err);
        moved.and(released)
    }

    /// Scroll the mouse wheel along one axis.
    pub fn mouse_scroll(&mut self, delta: i32, axis: ScrollAxis) -> ActionResult<()> {
        if self.dry_run {
            info!(target: "screenqueue::actions", delta, ?axis, "DRY-RUN mouse_scroll");
            return Ok(());
        }
        if delta == 0 {
            return Ok(());
        }
        let enigo = self.ensure_enigo()?;
        trace!(target: "screenqueue::actions", delta, ?axis, "mouse_scroll");
        let axis = match axis {
            ScrollAxis::Vertical => Axis::Vertical,
            ScrollAxis::Horizontal => Axis::Horizontal,
        };
        enigo.scroll(delta, axis).map_err(input_err)
    }

    /// Current pointer position (the simulated one in dry-run mode).
    pub fn cursor_position(&mut self) -> ActionResult<Point> {
        if self.dry_run {
            return Ok(self.virtual_cursor);
        }
        let enigo = self.ensure_enigo()?;
        let (x, y) = enigo.location().map_err(input_err)?;
        Ok(Point::new(x, y))
    }

    /// Type literal text (unicode). A non-zero interval types one character at a time.
    pub fn type_text(&mut self, text: &str, interval_ms: u64) -> ActionResult<()> {
        if self.dry_run {
            info!(target: "screenqueue::actions", %text, "DRY-RUN type_text");
            return Ok(());
        }
        let enigo = self.ensure_enigo()?;
        trace!(target: "screenqueue::actions", chars = text.chars().count(), interval_ms, "type_text");
        if interval_ms == 0 {
            return enigo.text(text).map_err(input_err);
        }
        let mut buf = [0u8; 4];
        for c in text.chars() {
            enigo.text(c.encode_utf8(&mut buf)).map_err(input_err)?;
            thread::sleep(Duration::from_millis(interval_ms));
        }
        Ok(())
    }

    /// Press `keys` down in order and release them in reverse order.
    /// Keys already pressed are released even when a later press fails.
    pub fn key_chord(&mut self, keys: &[Key]) -> ActionResult<()> {
        if self.dry_run {
            info!(target: "screenqueue::actions", ?keys, "DRY-RUN key_chord");
            return Ok(());
        }
        let enigo = self.ensure_enigo()?;
        trace!(target: "screenqueue::actions", ?keys, "key_chord");

        let mut pressed = 0;
        let mut failure = None;
        for key in keys {
            match enigo.key(*key, Direction::Press) {
                Ok(()) => pressed += 1,
                Err(e) => {
                    failure = Some(input_err(e));
                    break;
                }
            }
        }
        for key in keys[..pressed].iter().rev() {
            if let Err(e) = enigo.key(*key, Direction::Release) {
                warn!(target: "screenqueue::actions", ?key, error = %e, "Failed to release key");
                failure.get_or_insert(input_err(e));
            }
        }
        failure.map_or(Ok(()), Err)
    }

    /// Clipboard text. Read failures are logged and reported as `None`.
    pub fn clipboard_text(&mut self) -> Option<String> {
        if self.dry_run {
            return self.virtual_clipboard.clone();
        }
        match cli_clipboard::get_contents() {
            Ok(text) => Some(text),
            Err(e) => {
                warn!(target: "screenqueue::actions", error = %e, "Failed to read clipboard");
                None
            }
        }
    }

    /// Seed the simulated clipboard used in dry-run mode.
    pub fn set_virtual_clipboard(&mut self, text: Option<String>) {
        self.virtual_clipboard = text;
    }

    /// Sleep (blocking). Skipped in dry-run mode.
    pub fn sleep(&self, duration: Duration) {
        if self.dry_run {
            info!(target: "screenqueue::actions", ms = duration.as_millis() as u64, "DRY-RUN sleep");
            return;
        }
        trace!(target: "screenqueue::actions", ms = duration.as_millis() as u64, "sleep");
        thread::sleep(duration);
    }

    fn ensure_enigo(&mut self) -> ActionResult<&mut Enigo> {
        if self.enigo.is_none() {
            trace!(target: "screenqueue::actions", "Initializing Enigo");
            let enigo = Enigo::new(&Settings::default()).map_err(|e| {
                ActionError::InputInjectionFailed(format!("failed to initialize Enigo: {e}"))
            })?;
            self.enigo = Some(enigo);
        }
        self.enigo
            .as_mut()
            .ok_or_else(|| ActionError::InputInjectionFailed("Enigo is not initialized".into()))
    }
}

fn input_err(e: enigo::InputError) -> ActionError {
    ActionError::InputInjectionFailed(e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dry_run_tracks_virtual_pointer() {
        let mut ex = ActionExecutor::new(true);
        assert_eq!(ex.cursor_position().unwrap(), Point::new(0, 0));
        ex.mouse_move_to(Point::new(120, 45)).unwrap();
        ex.mouse_click(ClickKind::Double).unwrap();
        ex.mouse_scroll(-3, ScrollAxis::Vertical).unwrap();
        assert_eq!(ex.cursor_position().unwrap(), Point::new(120, 45));
    }

    #[test]
    fn dry_run_drag_ends_at_the_drop_point() {
        let mut ex = ActionExecutor::new(true);
        ex.mouse_move_to(Point::new(10, 10)).unwrap();
        ex.mouse_drag_to(Point::new(200, 150), ClickKind::Right).unwrap();
        assert_eq!(ex.cursor_position().unwrap(), Point::new(200, 150));

        let err = ex.mouse_drag_to(Point::new(0, 0), ClickKind::Double).unwrap_err();
        assert!(matches!(err, ActionError::InvalidParams { .. }));
        assert_eq!(ex.cursor_position().unwrap(), Point::new(200, 150));
    }

    #[test]
    fn dry_run_input_is_a_no_op() {
        let mut ex = ActionExecutor::new(true);
        ex.type_text("hello", 10).unwrap();
        ex.key_chord(&[Key::Control, Key::Unicode('c')]).unwrap();
        ex.sleep(Duration::from_secs(5));
        assert!(ex.is_dry_run());
    }

    #[test]
    fn dry_run_clipboard_is_simulated() {
        let mut ex = ActionExecutor::new(true);
        assert_eq!(ex.clipboard_text(), None);
        ex.set_virtual_clipboard(Some("copied".into()));
        assert_eq!(ex.clipboard_text().as_deref(), Some("copied"));
    }
}
