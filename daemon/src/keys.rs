/// Key names accepted by `key_tap` / `key_hold` actions.
///
/// Names are matched case-insensitively. Anything that is not a known named
/// key or a single printable ASCII character is rejected, and the executor
/// reports it as an unknown key instead of guessing.
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Key {
    Backspace,
    Delete,
    Enter,
    Tab,
    Escape,
    Up,
    Down,
    Right,
    Left,
    Home,
    End,
    PageUp,
    PageDown,
    /// Function keys `F1`–`F12`.
    F(u8),
    Command,
    Alt,
    Control,
    Shift,
    RightShift,
    Space,
    PrintScreen,
    Insert,
    AudioMute,
    AudioVolumeDown,
    AudioVolumeUp,
    AudioPlay,
    AudioPrev,
    AudioNext,
    /// A single printable character, normalised to lowercase.
    Char(char),
}

/// Converts a configured key name (e.g. `"F8"`, `"space"`, `"a"`) to a [`Key`].
///
/// Supported keys:
/// - Navigation and editing keys (`ENTER`, `TAB`, `PAGEUP`, …).
/// - Function keys `F1`–`F12`.
/// - Modifiers (`ALT`, `CONTROL`, `SHIFT`, `RS` for right shift, `COMMAND`).
/// - Media keys (`AUDIO_MUTE`, `AUDIO_VOL_UP`, `PLAY`, `NEXT`, …).
/// - Any single printable ASCII character.
///
/// Returns `None` for any unrecognised name.
pub fn parse_key(name: &str) -> Option<Key> {
    let key = match name.to_uppercase().as_str() {
        "BACKSPACE" => Key::Backspace,
        "DELETE" => Key::Delete,
        "ENTER" => Key::Enter,
        "TAB" => Key::Tab,
        "ESCAPE" => Key::Escape,
        "UP" => Key::Up,
        "DOWN" => Key::Down,
        "RIGHT" => Key::Right,
        "LEFT" => Key::Left,
        "HOME" => Key::Home,
        "END" => Key::End,
        "PAGEUP" => Key::PageUp,
        "PAGEDOWN" => Key::PageDown,
        "COMMAND" => Key::Command,
        "ALT" => Key::Alt,
        "CONTROL" => Key::Control,
        "SHIFT" => Key::Shift,
        "RS" => Key::RightShift,
        "SPACE" => Key::Space,
        "PRINT" => Key::PrintScreen,
        "INSERT" => Key::Insert,
        "AUDIO_MUTE" => Key::AudioMute,
        "AUDIO_VOL_DOWN" => Key::AudioVolumeDown,
        "AUDIO_VOL_UP" => Key::AudioVolumeUp,
        "PLAY" => Key::AudioPlay,
        "PREV" => Key::AudioPrev,
        "NEXT" => Key::AudioNext,
        s if s.len() > 1 && s.starts_with('F') => {
            let n: u8 = s[1..].parse().ok()?;
            if !(1..=12).contains(&n) {
                return None;
            }
            Key::F(n)
        }
        _ => {
            let mut chars = name.chars();
            let c = chars.next()?;
            if chars.next().is_some() || !c.is_ascii_graphic() {
                return None;
            }
            Key::Char(c.to_ascii_lowercase())
        }
    };
    Some(key)
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Key::F(n) => write!(f, "f{n}"),
            Key::Char(c) => write!(f, "{c}"),
            other => write!(f, "{}", format!("{other:?}").to_lowercase()),
        }
    }
}
