use std::fmt::Display;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;
use tracing::{info, warn};

use crate::actions::Keybinds;
use crate::atomic_io::write_text_atomic;
use crate::mode::{COMPANION_SCALE_MIN, PLAYER_SCALE_MAX, PLAYER_SCALE_MIN};
use crate::sync::{AccessoryRule, SyncOptions, DEFAULT_OFF_CYCLE_INTERVAL};

pub const SETTINGS_FILE_NAME: &str = "settings.json";
pub const DEFAULT_SCALE_FACTOR: f32 = 1.02;
pub const SCALE_FACTOR_MIN: f32 = 1.001;
pub const SCALE_FACTOR_MAX: f32 = 2.0;
pub const DEFAULT_SAVE_TIMEOUT_SECONDS: u64 = 10;
pub const SAVE_TIMEOUT_MIN_SECONDS: u64 = 2;
pub const SAVE_TIMEOUT_MAX_SECONDS: u64 = 60;

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("failed to read settings file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to write settings file {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to encode settings json: {0}")]
    Encode(#[source] serde_json::Error),
    #[error("failed to parse settings json at {location}: {source}")]
    Parse {
        location: String,
        #[source]
        source: serde_json::Error,
    },
}

/// A field that was ignored, replaced by its default, or clamped while
/// reading the settings file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldIssue {
    pub field: String,
    pub message: String,
}

impl FieldIssue {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Configuration {
    pub fixed_height_mode: bool,
    pub include_miniature_companion: bool,
    pub include_core_companion: bool,
    pub scale_factor: f32,
    pub after_scale_save_timeout_seconds: u64,
    pub allow_shape_toggle: bool,
    pub include_player_speed: bool,
    pub include_companion_speed: bool,
    pub off_cycle_interval: u32,
    pub companion_name_excludes: Vec<String>,
    pub accessories: Vec<AccessoryRule>,
}

impl Default for Configuration {
    fn default() -> Self {
        Self {
            fixed_height_mode: false,
            include_miniature_companion: false,
            include_core_companion: false,
            scale_factor: DEFAULT_SCALE_FACTOR,
            after_scale_save_timeout_seconds: DEFAULT_SAVE_TIMEOUT_SECONDS,
            allow_shape_toggle: false,
            include_player_speed: false,
            include_companion_speed: false,
            off_cycle_interval: DEFAULT_OFF_CYCLE_INTERVAL,
            companion_name_excludes: Vec::new(),
            accessories: Vec::new(),
        }
    }
}

impl Configuration {
    pub fn save_timeout(&self) -> Duration {
        Duration::from_secs(self.after_scale_save_timeout_seconds)
    }

    pub fn sync_options(&self) -> SyncOptions {
        SyncOptions {
            include_miniature_companion: self.include_miniature_companion,
            include_core_companion: self.include_core_companion,
            include_player_speed: self.include_player_speed,
            include_companion_speed: self.include_companion_speed,
            companion_name_excludes: self.companion_name_excludes.clone(),
            accessories: self.accessories.clone(),
            off_cycle_interval: self.off_cycle_interval,
        }
    }
}

/// The persisted `scales` section.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ScaleSnapshot {
    pub companion_scale: f32,
    pub player_scale: f32,
    pub player_restore_scale: f32,
}

impl Default for ScaleSnapshot {
    fn default() -> Self {
        Self {
            companion_scale: 1.0,
            player_scale: 1.0,
            player_restore_scale: 1.0,
        }
    }
}

/// Sink for debounced scale saves.
pub trait ScalePersistence {
    fn save(&mut self, scales: &ScaleSnapshot) -> Result<(), SettingsError>;
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Settings {
    pub configuration: Configuration,
    pub scales: ScaleSnapshot,
    pub keybinds: Keybinds,
}

#[derive(Debug, Clone)]
pub struct ParsedSettings {
    pub settings: Settings,
    pub issues: Vec<FieldIssue>,
}

#[derive(Debug, Default, Deserialize)]
struct RawSettings {
    #[serde(default)]
    configuration: Option<Value>,
    #[serde(default)]
    scales: Option<Value>,
    #[serde(default)]
    keybinds: Option<Value>,
}

/// A section that is present but not an object is reported and read as
/// empty, so only that section falls back to its defaults.
fn section_object<'v>(
    section: &str,
    value: Option<&'v Value>,
    issues: &mut Vec<FieldIssue>,
) -> Option<&'v Map<String, Value>> {
    match value? {
        Value::Object(map) => Some(map),
        Value::Null => None,
        _ => {
            issues.push(FieldIssue::new(
                section,
                "expected an object; using defaults for the whole section",
            ));
            None
        }
    }
}

/// Reads typed fields out of one raw section, substituting defaults for
/// anything missing or mistyped.
struct SectionReader<'a> {
    section: &'static str,
    values: Option<&'a Map<String, Value>>,
    issues: &'a mut Vec<FieldIssue>,
}

impl<'a> SectionReader<'a> {
    fn new(
        section: &'static str,
        values: Option<&'a Map<String, Value>>,
        issues: &'a mut Vec<FieldIssue>,
    ) -> Self {
        Self {
            section,
            values,
            issues,
        }
    }

    fn field_name(&self, key: &str) -> String {
        format!("{}.{key}", self.section)
    }

    fn read<T: DeserializeOwned>(&mut self, key: &str, default: T) -> T {
        let Some(value) = self.values.and_then(|values| values.get(key)) else {
            return default;
        };
        if value.is_null() {
            return default;
        }
        match serde_path_to_error::deserialize::<_, T>(value.clone()) {
            Ok(parsed) => parsed,
            Err(error) => {
                let field = join_path(&self.field_name(key), &error.path().to_string());
                self.issues.push(FieldIssue::new(
                    field,
                    format!("{}; using default", error.into_inner()),
                ));
                default
            }
        }
    }

    fn read_clamped<T>(&mut self, key: &str, default: T, min: T, max: T) -> T
    where
        T: DeserializeOwned + PartialOrd + Copy + Display,
    {
        let value = self.read(key, default);
        let clamped = if value < min {
            min
        } else if value > max {
            max
        } else {
            value
        };
        if clamped != value {
            let field = self.field_name(key);
            self.issues.push(FieldIssue::new(
                field,
                format!("{value} is outside [{min}, {max}]; clamped to {clamped}"),
            ));
        }
        clamped
    }

    /// Keeps every well-formed element of a list, dropping the rest.
    fn read_list<T: DeserializeOwned>(&mut self, key: &str) -> Vec<T> {
        let elements: Vec<Value> = self.read(key, Vec::new());
        let base = self.field_name(key);
        let mut parsed = Vec::with_capacity(elements.len());
        for (index, element) in elements.into_iter().enumerate() {
            match serde_path_to_error::deserialize::<_, T>(element) {
                Ok(item) => parsed.push(item),
                Err(error) => {
                    let field = join_path(&format!("{base}[{index}]"), &error.path().to_string());
                    self.issues.push(FieldIssue::new(
                        field,
                        format!("{}; entry skipped", error.into_inner()),
                    ));
                }
            }
        }
        parsed
    }
}

fn join_path(base: &str, inner: &str) -> String {
    if inner.is_empty() || inner == "." {
        base.to_string()
    } else if inner.starts_with('[') {
        format!("{base}{inner}")
    } else {
        format!("{base}.{inner}")
    }
}

/// Parses a settings document. Only a structurally broken document is an
/// error; individual bad fields are reported as issues and defaulted.
pub fn parse_settings(raw: &str) -> Result<ParsedSettings, SettingsError> {
    let mut deserializer = serde_json::Deserializer::from_str(raw);
    let sections = serde_path_to_error::deserialize::<_, RawSettings>(&mut deserializer)
        .map_err(|error| {
            let path = error.path().to_string();
            let location = if path.is_empty() || path == "." {
                "document root".to_string()
            } else {
                path
            };
            SettingsError::Parse {
                location,
                source: error.into_inner(),
            }
        })?;

    let mut issues = Vec::new();
    let configuration_values =
        section_object("configuration", sections.configuration.as_ref(), &mut issues);
    let configuration = read_configuration(configuration_values, &mut issues);
    let scales_values = section_object("scales", sections.scales.as_ref(), &mut issues);
    let scales = read_scales(scales_values, &mut issues);
    let keybinds_values = section_object("keybinds", sections.keybinds.as_ref(), &mut issues);
    let keybinds = Keybinds::from_raw(keybinds_values, &mut issues);

    Ok(ParsedSettings {
        settings: Settings {
            configuration,
            scales,
            keybinds,
        },
        issues,
    })
}

fn read_configuration(
    values: Option<&Map<String, Value>>,
    issues: &mut Vec<FieldIssue>,
) -> Configuration {
    let defaults = Configuration::default();
    let mut reader = SectionReader::new("configuration", values, issues);
    Configuration {
        fixed_height_mode: reader.read("fixed_height_mode", defaults.fixed_height_mode),
        include_miniature_companion: reader.read(
            "include_miniature_companion",
            defaults.include_miniature_companion,
        ),
        include_core_companion: reader
            .read("include_core_companion", defaults.include_core_companion),
        scale_factor: reader.read_clamped(
            "scale_factor",
            defaults.scale_factor,
            SCALE_FACTOR_MIN,
            SCALE_FACTOR_MAX,
        ),
        after_scale_save_timeout_seconds: reader.read_clamped(
            "after_scale_save_timeout_seconds",
            defaults.after_scale_save_timeout_seconds,
            SAVE_TIMEOUT_MIN_SECONDS,
            SAVE_TIMEOUT_MAX_SECONDS,
        ),
        allow_shape_toggle: reader.read("allow_shape_toggle", defaults.allow_shape_toggle),
        include_player_speed: reader.read("include_player_speed", defaults.include_player_speed),
        include_companion_speed: reader
            .read("include_companion_speed", defaults.include_companion_speed),
        off_cycle_interval: reader.read_clamped(
            "off_cycle_interval",
            defaults.off_cycle_interval,
            1,
            u32::MAX,
        ),
        companion_name_excludes: reader
            .read_list::<String>("companion_name_excludes")
            .into_iter()
            .filter(|exclude| !exclude.trim().is_empty())
            .collect(),
        accessories: reader.read_list("accessories"),
    }
}

fn read_scales(values: Option<&Map<String, Value>>, issues: &mut Vec<FieldIssue>) -> ScaleSnapshot {
    let defaults = ScaleSnapshot::default();
    let mut reader = SectionReader::new("scales", values, issues);
    ScaleSnapshot {
        companion_scale: reader.read_clamped(
            "companion_scale",
            defaults.companion_scale,
            COMPANION_SCALE_MIN,
            f32::MAX,
        ),
        player_scale: reader.read_clamped(
            "player_scale",
            defaults.player_scale,
            PLAYER_SCALE_MIN,
            PLAYER_SCALE_MAX,
        ),
        player_restore_scale: reader.read_clamped(
            "player_restore_scale",
            defaults.player_restore_scale,
            PLAYER_SCALE_MIN,
            PLAYER_SCALE_MAX,
        ),
    }
}

impl Settings {
    /// `Ok(None)` when there is no file at `path`.
    pub fn read(path: &Path) -> Result<Option<ParsedSettings>, SettingsError> {
        let raw = match fs::read_to_string(path) {
            Ok(raw) => raw,
            Err(error) if error.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(source) => {
                return Err(SettingsError::Read {
                    path: path.to_path_buf(),
                    source,
                })
            }
        };
        parse_settings(&raw).map(Some)
    }

    /// Loads settings, falling back to defaults for anything that cannot be
    /// used. Every fallback is logged.
    pub fn load(path: &Path) -> Self {
        Self::load_for_rewrite(path).0
    }

    /// Like [`Settings::load`], also telling whether the file may be written
    /// back. A file that exists but cannot be read or parsed is left alone.
    pub fn load_for_rewrite(path: &Path) -> (Self, bool) {
        match Self::read(path) {
            Ok(Some(parsed)) => {
                for issue in &parsed.issues {
                    warn!(
                        field = issue.field.as_str(),
                        message = issue.message.as_str(),
                        "settings_field_ignored"
                    );
                }
                info!(path = %path.display(), issues = parsed.issues.len(), "settings_loaded");
                (parsed.settings, true)
            }
            Ok(None) => {
                info!(path = %path.display(), "settings_missing_using_defaults");
                (Self::default(), true)
            }
            Err(error) => {
                warn!(error = %error, "settings_unreadable_using_defaults");
                (Self::default(), false)
            }
        }
    }

    pub fn to_json(&self) -> Result<String, SettingsError> {
        serde_json::to_string_pretty(self).map_err(SettingsError::Encode)
    }

    pub fn save(&self, path: &Path) -> Result<(), SettingsError> {
        let json = self.to_json()?;
        write_text_atomic(path, &json).map_err(|source| SettingsError::Write {
            path: path.to_path_buf(),
            source,
        })?;
        info!(path = %path.display(), "settings_saved");
        Ok(())
    }
}

/// Settings file on disk whose `scales` section receives debounced saves.
/// The rest of the document is written back as it was loaded.
#[derive(Debug, Clone)]
pub struct SettingsFile {
    path: PathBuf,
    settings: Settings,
}

impl SettingsFile {
    pub fn new(path: PathBuf, settings: Settings) -> Self {
        Self { path, settings }
    }
}

impl ScalePersistence for SettingsFile {
    fn save(&mut self, scales: &ScaleSnapshot) -> Result<(), SettingsError> {
        self.settings.scales = *scales;
        self.settings.save(&self.path)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::actions::ScalerAction;
    use crate::sync::AccessoryMode;

    fn parse(value: Value) -> ParsedSettings {
        parse_settings(&value.to_string()).expect("parse")
    }

    fn issue_fields(parsed: &ParsedSettings) -> Vec<&str> {
        parsed
            .issues
            .iter()
            .map(|issue| issue.field.as_str())
            .collect()
    }

    #[test]
    fn empty_document_yields_defaults() {
        let parsed = parse(json!({}));
        assert_eq!(parsed.settings, Settings::default());
        assert!(parsed.issues.is_empty());
    }

    #[test]
    fn reads_every_configuration_field() {
        let parsed = parse(json!({
            "configuration": {
                "fixed_height_mode": true,
                "include_miniature_companion": true,
                "include_core_companion": true,
                "scale_factor": 1.05,
                "after_scale_save_timeout_seconds": 5,
                "allow_shape_toggle": true,
                "include_player_speed": true,
                "include_companion_speed": true,
                "off_cycle_interval": 12,
                "companion_name_excludes": ["Mannequin", ""],
                "accessories": [
                    {
                        "owner_name_prefix": "reader",
                        "path": "Position Glasses",
                        "mode": { "kind": "follow_owner", "offset": [0.0, 0.1, 0.2] }
                    }
                ]
            },
            "scales": {
                "companion_scale": 3.5,
                "player_scale": 0.25,
                "player_restore_scale": 0.5
            }
        }));

        let configuration = &parsed.settings.configuration;
        assert!(parsed.issues.is_empty(), "{:?}", parsed.issues);
        assert!(configuration.fixed_height_mode);
        assert!(configuration.allow_shape_toggle);
        assert_eq!(configuration.scale_factor, 1.05);
        assert_eq!(configuration.save_timeout(), Duration::from_secs(5));
        assert_eq!(configuration.off_cycle_interval, 12);
        assert_eq!(configuration.companion_name_excludes, vec!["Mannequin"]);
        assert_eq!(
            configuration.accessories[0].mode,
            AccessoryMode::FollowOwner {
                offset: Some([0.0, 0.1, 0.2])
            }
        );
        assert_eq!(
            parsed.settings.scales,
            ScaleSnapshot {
                companion_scale: 3.5,
                player_scale: 0.25,
                player_restore_scale: 0.5,
            }
        );
    }

    #[test]
    fn mistyped_fields_fall_back_individually() {
        let parsed = parse(json!({
            "configuration": {
                "fixed_height_mode": "yes",
                "allow_shape_toggle": true,
                "scale_factor": null
            },
            "scales": { "companion_scale": "big", "player_scale": 0.5 }
        }));

        let settings = &parsed.settings;
        assert!(!settings.configuration.fixed_height_mode);
        assert!(settings.configuration.allow_shape_toggle);
        assert_eq!(settings.configuration.scale_factor, DEFAULT_SCALE_FACTOR);
        assert_eq!(settings.scales.companion_scale, 1.0);
        assert_eq!(settings.scales.player_scale, 0.5);
        assert_eq!(
            issue_fields(&parsed),
            vec!["configuration.fixed_height_mode", "scales.companion_scale"]
        );
    }

    #[test]
    fn out_of_range_values_are_clamped() {
        let parsed = parse(json!({
            "configuration": {
                "scale_factor": 5.0,
                "after_scale_save_timeout_seconds": 1,
                "off_cycle_interval": 0
            },
            "scales": {
                "companion_scale": 0.01,
                "player_scale": 4.0,
                "player_restore_scale": 0.0
            }
        }));

        let settings = &parsed.settings;
        assert_eq!(settings.configuration.scale_factor, SCALE_FACTOR_MAX);
        assert_eq!(
            settings.configuration.after_scale_save_timeout_seconds,
            SAVE_TIMEOUT_MIN_SECONDS
        );
        assert_eq!(settings.configuration.off_cycle_interval, 1);
        assert_eq!(settings.scales.companion_scale, COMPANION_SCALE_MIN);
        assert_eq!(settings.scales.player_scale, PLAYER_SCALE_MAX);
        assert_eq!(settings.scales.player_restore_scale, PLAYER_SCALE_MIN);
        assert_eq!(parsed.issues.len(), 6);
    }

    #[test]
    fn malformed_accessory_rules_are_dropped_with_their_path() {
        let parsed = parse(json!({
            "configuration": {
                "accessories": [
                    { "owner_name_prefix": "a", "path": "Hat", "mode": { "kind": "pinned", "scale": 1.0 } },
                    { "owner_name_prefix": "b", "path": "Hat", "mode": { "kind": "spinning" } }
                ]
            }
        }));

        assert_eq!(parsed.settings.configuration.accessories.len(), 1);
        assert_eq!(parsed.issues.len(), 1);
        assert!(parsed.issues[0]
            .field
            .starts_with("configuration.accessories[1]"));
    }

    #[test]
    fn mistyped_section_keeps_its_siblings() {
        let parsed = parse(json!({
            "configuration": 5,
            "scales": { "player_scale": 0.5, "companion_scale": 3.0 },
            "keybinds": { "PlayerGrow": "PageUp" }
        }));

        assert_eq!(parsed.settings.configuration, Configuration::default());
        assert_eq!(parsed.settings.scales.player_scale, 0.5);
        assert_eq!(parsed.settings.scales.companion_scale, 3.0);
        assert_eq!(
            parsed.settings.keybinds.key_for(ScalerAction::PlayerGrow),
            "PageUp"
        );
        assert_eq!(issue_fields(&parsed), vec!["configuration"]);

        let parsed = parse(json!({ "keybinds": [], "scales": { "player_scale": 0.5 } }));
        assert_eq!(parsed.settings.keybinds, Keybinds::default());
        assert_eq!(parsed.settings.scales.player_scale, 0.5);
        assert_eq!(issue_fields(&parsed), vec!["keybinds"]);
    }

    #[test]
    fn load_keeps_valid_sections_of_a_partly_mistyped_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join(SETTINGS_FILE_NAME);
        let raw = json!({
            "configuration": 5,
            "scales": { "player_scale": 0.5 },
            "keybinds": { "PlayerGrow": "PageUp" }
        });
        fs::write(&path, raw.to_string()).expect("write");

        let loaded = Settings::load(&path);
        assert_eq!(loaded.scales.player_scale, 0.5);
        assert_eq!(loaded.keybinds.key_for(ScalerAction::PlayerGrow), "PageUp");
    }

    #[test]
    fn non_object_document_is_a_parse_error() {
        let error = parse_settings("5").expect_err("must fail");
        assert!(matches!(error, SettingsError::Parse { .. }));

        let error = parse_settings("{ not json").expect_err("must fail");
        assert!(matches!(error, SettingsError::Parse { .. }));
    }

    #[test]
    fn load_falls_back_to_defaults() {
        let dir = tempfile::tempdir().expect("tempdir");
        let missing = dir.path().join("missing.json");
        assert_eq!(Settings::load(&missing), Settings::default());

        let corrupt = dir.path().join("corrupt.json");
        fs::write(&corrupt, "{ not json").expect("write");
        assert_eq!(Settings::load(&corrupt), Settings::default());
    }

    #[test]
    fn only_usable_files_may_be_rewritten() {
        let dir = tempfile::tempdir().expect("tempdir");
        let missing = dir.path().join("missing.json");
        assert!(Settings::load_for_rewrite(&missing).1);

        let partial = dir.path().join("partial.json");
        fs::write(&partial, r#"{"configuration": 5}"#).expect("write");
        assert!(Settings::load_for_rewrite(&partial).1);

        let corrupt = dir.path().join("corrupt.json");
        fs::write(&corrupt, "{ not json").expect("write");
        assert!(!Settings::load_for_rewrite(&corrupt).1);
    }

    #[test]
    fn saved_file_loads_back_unchanged() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join(SETTINGS_FILE_NAME);
        let mut settings = Settings::default();
        settings.configuration.allow_shape_toggle = true;
        settings.configuration.companion_name_excludes = vec!["mannequin".to_string()];
        settings.scales.player_scale = 0.5;

        settings.save(&path).expect("save");
        let parsed = Settings::read(&path).expect("read").expect("present");
        assert!(parsed.issues.is_empty(), "{:?}", parsed.issues);
        assert_eq!(parsed.settings, settings);
    }

    #[test]
    fn settings_file_persists_scales_and_keeps_the_rest() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join(SETTINGS_FILE_NAME);
        let raw = json!({
            "configuration": { "fixed_height_mode": true },
            "keybinds": { "PlayerGrow": "PageUp" }
        });
        let settings = parse(raw).settings;
        let mut file = SettingsFile::new(path.clone(), settings);

        let scales = ScaleSnapshot {
            companion_scale: 0.5,
            player_scale: 0.75,
            player_restore_scale: 0.75,
        };
        file.save(&scales).expect("save");

        let reloaded = Settings::load(&path);
        assert_eq!(reloaded.scales, scales);
        assert!(reloaded.configuration.fixed_height_mode);
        assert_eq!(reloaded.keybinds.key_for(ScalerAction::PlayerGrow), "PageUp");
    }
}
