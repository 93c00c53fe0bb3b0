use enigo::Key;

use crate::error::{ActionError, ActionResult};

/// Map a key name (as written in `hot_keys`) to an enigo key.
///
/// Names are case-insensitive. Single characters map to `Key::Unicode`.
pub fn parse_key(name: &str) -> ActionResult<Key> {
    let lower = name.trim().to_lowercase();
    let key = match lower.as_str() {
        "ctrl" | "control" => Key::Control,
        "shift" => Key::Shift,
        "alt" | "option" => Key::Alt,
        "cmd" | "command" | "win" | "super" | "meta" => Key::Meta,
        "enter" | "return" => Key::Return,
        "tab" => Key::Tab,
        "esc" | "escape" => Key::Escape,
        "space" => Key::Space,
        "backspace" => Key::Backspace,
        "delete" | "del" => Key::Delete,
        "up" => Key::UpArrow,
        "down" => Key::DownArrow,
        "left" => Key::LeftArrow,
        "right" => Key::RightArrow,
        "home" => Key::Home,
        "end" => Key::End,
        "pageup" | "pgup" => Key::PageUp,
        "pagedown" | "pgdn" => Key::PageDown,
        "capslock" => Key::CapsLock,
        "f1" => Key::F1,
        "f2" => Key::F2,
        "f3" => Key::F3,
        "f4" => Key::F4,
        "f5" => Key::F5,
        "f6" => Key::F6,
        "f7" => Key::F7,
        "f8" => Key::F8,
        "f9" => Key::F9,
        "f10" => Key::F10,
        "f11" => Key::F11,
        "f12" => Key::F12,
        other => {
            let mut chars = other.chars();
            match (chars.next(), chars.next()) {
                (Some(c), None) => Key::Unicode(c),
                _ => {
                    return Err(ActionError::invalid_params(
                        "send_hotkey",
                        format!("unknown key '{name}'"),
                    ));
                }
            }
        }
    };
    Ok(key)
}

/// Copy, cut and paste chords: one modifier (ctrl/cmd) plus c, x or v.
pub fn is_clipboard_chord(keys: &[String]) -> bool {
    let lower: Vec<String> = keys.iter().map(|k| k.trim().to_lowercase()).collect();
    match lower.as_slice() {
        [modifier, letter] => {
            matches!(modifier.as_str(), "ctrl" | "control" | "cmd" | "command" | "meta")
                && matches!(letter.as_str(), "c" | "x" | "v")
        }
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn named_and_single_char_keys() {
        assert_eq!(parse_key("Ctrl").unwrap(), Key::Control);
        assert_eq!(parse_key(" enter ").unwrap(), Key::Return);
        assert_eq!(parse_key("F5").unwrap(), Key::F5);
        assert_eq!(parse_key("c").unwrap(), Key::Unicode('c'));
        assert_eq!(parse_key("C").unwrap(), Key::Unicode('c'));
    }

    #[test]
    fn unknown_key_is_invalid_params() {
        let err = parse_key("hyper").unwrap_err();
        assert!(err.to_string().contains("hyper"));
        assert!(parse_key("").is_err());
    }

    #[test]
    fn clipboard_chords() {
        let keys = |ks: &[&str]| ks.iter().map(|s| s.to_string()).collect::<Vec<_>>();
        assert!(is_clipboard_chord(&keys(&["ctrl", "c"])));
        assert!(is_clipboard_chord(&keys(&["CMD", "v"])));
        assert!(!is_clipboard_chord(&keys(&["ctrl", "s"])));
        assert!(!is_clipboard_chord(&keys(&["ctrl", "shift", "c"])));
    }
}
