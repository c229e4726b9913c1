use serde::Deserialize;
use std::path::PathBuf;

use crate::input::MouseButton;

pub const DEFAULT_HOLD_MS: u64 = 1_000;
pub const DEFAULT_IMAGE_MS: u64 = 3_000;

/// A configured side effect. Actions are immutable once loaded; triggers refer
/// to them by `id`.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct Action {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(flatten)]
    pub kind: ActionKind,
}

/// Per-kind parameters, selected by the `type` field in the config file.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ActionKind {
    KeyTap {
        key: String,
    },
    KeyHold {
        key: String,
        #[serde(default = "default_hold_ms")]
        duration_ms: u64,
        /// Tap the key repeatedly for the duration instead of holding it down.
        #[serde(default)]
        repeat: bool,
    },
    MouseClick {
        x: i32,
        y: i32,
        #[serde(default)]
        button: MouseButton,
    },
    Tts {
        text: String,
    },
    Sound {
        file_path: PathBuf,
    },
    OverlayImage {
        file_path: String,
        #[serde(default = "default_image_ms")]
        duration_ms: u64,
    },
    Command {
        command: String,
    },
}

impl ActionKind {
    /// Config-file name of the kind, used in logs.
    pub fn label(&self) -> &'static str {
        match self {
            ActionKind::KeyTap { .. } => "key_tap",
            ActionKind::KeyHold { .. } => "key_hold",
            ActionKind::MouseClick { .. } => "mouse_click",
            ActionKind::Tts { .. } => "tts",
            ActionKind::Sound { .. } => "sound",
            ActionKind::OverlayImage { .. } => "overlay_image",
            ActionKind::Command { .. } => "command",
        }
    }
}

fn default_hold_ms() -> u64 {
    DEFAULT_HOLD_MS
}

fn default_image_ms() -> u64 {
    DEFAULT_IMAGE_MS
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Deserialize)]
    struct Actions {
        actions: Vec<Action>,
    }

    fn parse(toml_src: &str) -> Vec<Action> {
        toml::from_str::<Actions>(toml_src).unwrap().actions
    }

    #[test]
    fn parses_every_kind() {
        let actions = parse(
            r#"
[[actions]]
id = "a1"
name = "Jump"
type = "key_tap"
key = "space"

[[actions]]
id = "a2"
type = "key_hold"
key = "w"
duration_ms = 2500
repeat = true

[[actions]]
id = "a3"
type = "mouse_click"
x = 640
y = 360
button = "right"

[[actions]]
id = "a4"
type = "tts"
text = "thank you"

[[actions]]
id = "a5"
type = "sound"
file_path = "/tmp/airhorn.wav"

[[actions]]
id = "a6"
type = "overlay_image"
file_path = "/tmp/cat.gif"
duration_ms = 1500

[[actions]]
id = "a7"
type = "command"
command = "echo hi"
"#,
        );

        let labels: Vec<_> = actions.iter().map(|a| a.kind.label()).collect();
        assert_eq!(
            labels,
            ["key_tap", "key_hold", "mouse_click", "tts", "sound", "overlay_image", "command"]
        );
        assert_eq!(actions[0].name, "Jump");
        assert_eq!(
            actions[1].kind,
            ActionKind::KeyHold { key: "w".into(), duration_ms: 2500, repeat: true }
        );
        assert_eq!(
            actions[2].kind,
            ActionKind::MouseClick { x: 640, y: 360, button: MouseButton::Right }
        );
    }

    #[test]
    fn optional_params_take_defaults() {
        let actions = parse(
            r#"
[[actions]]
id = "hold"
type = "key_hold"
key = "a"

[[actions]]
id = "click"
type = "mouse_click"
x = 1
y = 2

[[actions]]
id = "img"
type = "overlay_image"
file_path = "x.png"
"#,
        );

        assert_eq!(
            actions[0].kind,
            ActionKind::KeyHold { key: "a".into(), duration_ms: DEFAULT_HOLD_MS, repeat: false }
        );
        assert_eq!(
            actions[1].kind,
            ActionKind::MouseClick { x: 1, y: 2, button: MouseButton::Left }
        );
        assert_eq!(
            actions[2].kind,
            ActionKind::OverlayImage { file_path: "x.png".into(), duration_ms: DEFAULT_IMAGE_MS }
        );
        assert_eq!(actions[0].name, "");
    }

    #[test]
    fn missing_required_param_is_rejected() {
        let result = toml::from_str::<Actions>(
            r#"
[[actions]]
id = "broken"
type = "key_tap"
"#,
        );
        assert!(result.is_err());
    }

    #[test]
    fn unknown_kind_is_rejected() {
        let result = toml::from_str::<Actions>(
            r#"
[[actions]]
id = "broken"
type = "teleport"
"#,
        );
        assert!(result.is_err());
    }
}
