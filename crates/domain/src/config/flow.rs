use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Flow coordinator tables: how intents map onto rendering parameters.
///
/// Both tables are merged over the built-in defaults, so a config only
/// needs to list the entries it wants to change.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct FlowConfig {
    /// Emotion name → expression slider values.
    #[serde(default)]
    pub emotion_expressions: HashMap<String, HashMap<String, f32>>,
    /// Action kind → hotkey name.
    #[serde(default)]
    pub action_hotkeys: HashMap<String, String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flow_tables_parse() {
        let toml = r#"
            [emotion_expressions.happy]
            mouth_smile = 0.9
            eye_open = 0.7

            [action_hotkeys]
            wave = "HotkeyWave"
        "#;
        let config: FlowConfig = toml::from_str(toml).unwrap();
        assert_eq!(config.emotion_expressions["happy"]["mouth_smile"], 0.9);
        assert_eq!(config.action_hotkeys["wave"], "HotkeyWave");
    }
}
