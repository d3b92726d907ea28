use std::env;

use scaler::{resolve_settings_path, Scaler, Settings, SettingsFile, StartupError};
use thiserror::Error;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use super::loop_runner::LoopConfig;
use super::script::{ActionScript, ScriptError};
use super::world_setup::DemoScene;

const SCRIPT_ENV_VAR: &str = "SCALER_SCRIPT";
const DEFAULT_SCRIPT: &str = "CompanionShrink@30,CompanionShrink@31,PlayerShrink@60,\
ToggleShapes@120,CompanionGrow@240,PlayerRestore@300,ToggleShapes@360,CompanionNormal@420";

#[derive(Debug, Error)]
pub(crate) enum AppError {
    #[error(transparent)]
    Startup(#[from] StartupError),
    #[error(transparent)]
    Script(#[from] ScriptError),
    #[error("failed to read environment variable {var}: {source}")]
    EnvVar {
        var: &'static str,
        #[source]
        source: env::VarError,
    },
}

pub(crate) struct AppWiring {
    pub(crate) config: LoopConfig,
    pub(crate) scaler: Scaler,
    pub(crate) scene: DemoScene,
    pub(crate) script: ActionScript,
}

pub(crate) fn build_app() -> Result<AppWiring, AppError> {
    init_tracing();
    info!("=== Scaler Headless Startup ===");

    let settings_path = resolve_settings_path()?;
    let (settings, rewritable) = Settings::load_for_rewrite(&settings_path);
    if !rewritable {
        warn!(path = %settings_path.display(), "settings_left_untouched");
    } else if let Err(error) = settings.save(&settings_path) {
        warn!(error = %error, "settings_normalize_failed");
    }

    let script = ActionScript::parse(&read_script_from_env()?, &settings.keybinds)?;
    let persistence = SettingsFile::new(settings_path, settings.clone());
    let scaler = Scaler::from_settings(&settings, Box::new(persistence));
    let config = LoopConfig::from_env();
    info!(
        ticks = config.ticks,
        ticks_per_second = config.ticks_per_second,
        script_steps = script.len(),
        "headless_configured"
    );

    Ok(AppWiring {
        config,
        scaler,
        scene: DemoScene::build(),
        script,
    })
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_names(true)
        .compact()
        .init();
}

fn read_script_from_env() -> Result<String, AppError> {
    match env::var(SCRIPT_ENV_VAR) {
        Ok(raw) => Ok(raw),
        Err(env::VarError::NotPresent) => Ok(DEFAULT_SCRIPT.to_string()),
        Err(source) => Err(AppError::EnvVar {
            var: SCRIPT_ENV_VAR,
            source,
        }),
    }
}
