use std::collections::BTreeMap;

use serde::Serialize;
use serde_json::{Map, Value};

use crate::settings::FieldIssue;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum ScalerAction {
    CompanionShrink,
    CompanionNormal,
    CompanionGrow,
    PlayerShrink,
    PlayerNormal,
    PlayerGrow,
    PlayerRestore,
    ToggleShapes,
}

impl ScalerAction {
    pub const ALL: [ScalerAction; 8] = [
        ScalerAction::CompanionShrink,
        ScalerAction::CompanionNormal,
        ScalerAction::CompanionGrow,
        ScalerAction::PlayerShrink,
        ScalerAction::PlayerNormal,
        ScalerAction::PlayerGrow,
        ScalerAction::PlayerRestore,
        ScalerAction::ToggleShapes,
    ];

    pub fn name(self) -> &'static str {
        match self {
            ScalerAction::CompanionShrink => "CompanionShrink",
            ScalerAction::CompanionNormal => "CompanionNormal",
            ScalerAction::CompanionGrow => "CompanionGrow",
            ScalerAction::PlayerShrink => "PlayerShrink",
            ScalerAction::PlayerNormal => "PlayerNormal",
            ScalerAction::PlayerGrow => "PlayerGrow",
            ScalerAction::PlayerRestore => "PlayerRestore",
            ScalerAction::ToggleShapes => "ToggleShapes",
        }
    }

    /// Case-insensitive lookup by action name.
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|action| action.name().eq_ignore_ascii_case(name.trim()))
    }

    pub fn default_key(self) -> &'static str {
        match self {
            ScalerAction::CompanionShrink => "Keypad2",
            ScalerAction::CompanionNormal => "Keypad5",
            ScalerAction::CompanionGrow => "Keypad8",
            ScalerAction::PlayerShrink => "Keypad3",
            ScalerAction::PlayerNormal => "Keypad6",
            ScalerAction::PlayerGrow => "Keypad9",
            ScalerAction::PlayerRestore => "KeypadPeriod",
            ScalerAction::ToggleShapes => "Keypad0",
        }
    }
}

/// Action to key table. Every action always has a key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct Keybinds {
    bindings: BTreeMap<ScalerAction, String>,
}

impl Default for Keybinds {
    fn default() -> Self {
        let bindings = ScalerAction::ALL
            .into_iter()
            .map(|action| (action, action.default_key().to_string()))
            .collect();
        Self { bindings }
    }
}

impl Keybinds {
    /// Builds the table from a raw `keybinds` object. Unknown actions and
    /// unusable keys are reported and skipped; missing actions keep their
    /// default key.
    pub(crate) fn from_raw(raw: Option<&Map<String, Value>>, issues: &mut Vec<FieldIssue>) -> Self {
        let mut keybinds = Self::default();
        let Some(raw) = raw else {
            return keybinds;
        };

        for (name, value) in raw {
            let field = format!("keybinds.{name}");
            let Some(action) = ScalerAction::from_name(name) else {
                issues.push(FieldIssue::new(field, "unknown action"));
                continue;
            };
            match value.as_str().map(str::trim) {
                Some(key) if !key.is_empty() => {
                    keybinds.bindings.insert(action, key.to_string());
                }
                _ => issues.push(FieldIssue::new(field, "expected a non-empty key name")),
            }
        }
        keybinds
    }

    pub fn key_for(&self, action: ScalerAction) -> &str {
        self.bindings
            .get(&action)
            .map(String::as_str)
            .unwrap_or_else(|| action.default_key())
    }

    /// First action bound to `key`, compared case-insensitively.
    pub fn action_for_key(&self, key: &str) -> Option<ScalerAction> {
        let key = key.trim();
        self.bindings
            .iter()
            .find(|(_, bound)| bound.eq_ignore_ascii_case(key))
            .map(|(action, _)| *action)
    }
}
