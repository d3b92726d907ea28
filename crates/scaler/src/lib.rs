use std::env;
use std::path::{Path, PathBuf};

use thiserror::Error;

pub mod actions;
mod arbiter;
mod atomic_io;
pub mod host;
pub mod mode;
pub mod motion;
mod scaler;
pub mod settings;
mod shadow;
pub mod sim;
pub mod sync;

pub use actions::{Keybinds, ScalerAction};
pub use arbiter::{EnabledArbiter, WriteOrigin};
pub use host::{
    CompanionKind, EntityCategory, EntityId, EntityLocator, EntityRef, NodeId, SceneHost,
    ShapeId, ShapeQuery, ShapeRadius, Vec3,
};
pub use mode::{DynamicMode, FixedMode, ModeKind, ScalingMode};
pub use scaler::Scaler;
pub use settings::{
    parse_settings, Configuration, FieldIssue, ScalePersistence, ScaleSnapshot, Settings,
    SettingsError, SettingsFile, SETTINGS_FILE_NAME,
};
pub use shadow::{ShadowRecord, ShadowStore, DEFAULT_PRUNE_INTERVAL};
pub use sync::{AccessoryMode, AccessoryRule, ScaleSync, ScaleTargets, SyncOptions, TickReport};

pub const SETTINGS_ENV_VAR: &str = "SCALER_SETTINGS";

#[derive(Debug, Error)]
pub enum StartupError {
    #[error("failed to read environment variable {var}: {source}")]
    EnvVar {
        var: &'static str,
        #[source]
        source: env::VarError,
    },
    #[error("{var} is set but empty")]
    EmptyEnvPath { var: &'static str },
    #[error("failed to resolve current executable path: {0}")]
    CurrentExe(#[source] std::io::Error),
    #[error("current executable path has no parent directory: {0}")]
    ExeHasNoParent(PathBuf),
}

/// Settings location: `SCALER_SETTINGS` when set, otherwise `settings.json`
/// beside the running executable.
pub fn resolve_settings_path() -> Result<PathBuf, StartupError> {
    match env::var(SETTINGS_ENV_VAR) {
        Ok(value) => settings_path_from_env(&value),
        Err(env::VarError::NotPresent) => {
            let exe = env::current_exe().map_err(StartupError::CurrentExe)?;
            let exe_dir = exe
                .parent()
                .map(Path::to_path_buf)
                .ok_or_else(|| StartupError::ExeHasNoParent(exe.clone()))?;
            Ok(exe_dir.join(SETTINGS_FILE_NAME))
        }
        Err(source) => Err(StartupError::EnvVar {
            var: SETTINGS_ENV_VAR,
            source,
        }),
    }
}

fn settings_path_from_env(value: &str) -> Result<PathBuf, StartupError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(StartupError::EmptyEnvPath {
            var: SETTINGS_ENV_VAR,
        });
    }
    let path = PathBuf::from(trimmed);
    if path.is_dir() {
        Ok(path.join(SETTINGS_FILE_NAME))
    } else {
        Ok(path)
    }
}
