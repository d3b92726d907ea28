use std::env;
use std::process::ExitCode;
use std::str::FromStr;
use std::time::Duration;

use scaler::TickReport;
use tracing::{info, warn};

use super::bootstrap::AppWiring;

const TICKS_ENV_VAR: &str = "SCALER_TICKS";
const TPS_ENV_VAR: &str = "SCALER_TPS";
const DEFAULT_TICKS: u64 = 600;
const DEFAULT_TICKS_PER_SECOND: u32 = 60;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct LoopConfig {
    pub(crate) ticks: u64,
    pub(crate) ticks_per_second: u32,
}

impl Default for LoopConfig {
    fn default() -> Self {
        Self {
            ticks: DEFAULT_TICKS,
            ticks_per_second: DEFAULT_TICKS_PER_SECOND,
        }
    }
}

impl LoopConfig {
    pub(crate) fn from_env() -> Self {
        Self {
            ticks: read_env_or(TICKS_ENV_VAR, DEFAULT_TICKS),
            ticks_per_second: read_env_or(TPS_ENV_VAR, DEFAULT_TICKS_PER_SECOND).max(1),
        }
    }

    pub(crate) fn fixed_dt(&self) -> Duration {
        Duration::from_secs_f64(1.0 / self.ticks_per_second.max(1) as f64)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct RunSummary {
    pub(crate) ticks: u64,
    pub(crate) actions: u64,
    pub(crate) ticks_without_player: u64,
    pub(crate) player_writes: u64,
    pub(crate) companion_rescales: u64,
    pub(crate) shapes_reasserted: u64,
}

impl RunSummary {
    fn record(&mut self, report: &TickReport) {
        self.ticks += 1;
        if !report.player_found {
            self.ticks_without_player += 1;
        }
        self.player_writes += u64::from(report.player_writes);
        self.companion_rescales += u64::from(report.companions_scaled);
        self.shapes_reasserted += u64::from(report.shapes_reasserted);
    }
}

pub(crate) fn run(app: AppWiring) -> ExitCode {
    let summary = run_ticks(app);
    info!(
        ticks = summary.ticks,
        actions = summary.actions,
        ticks_without_player = summary.ticks_without_player,
        player_writes = summary.player_writes,
        companion_rescales = summary.companion_rescales,
        shapes_reasserted = summary.shapes_reasserted,
        "run_summary"
    );
    ExitCode::SUCCESS
}

fn run_ticks(app: AppWiring) -> RunSummary {
    let AppWiring {
        config,
        mut scaler,
        mut scene,
        script,
    } = app;
    let fixed_dt = config.fixed_dt();
    let mut summary = RunSummary::default();

    for tick in 0..config.ticks {
        for action in script.actions_at(tick) {
            info!(tick, action = action.name(), "action_dispatched");
            scaler.dispatch(&mut scene.world, action);
            summary.actions += 1;
        }
        scene.run_host_tick(tick, &mut scaler);
        let report = scaler.update(&mut scene.world, fixed_dt);
        summary.record(&report);
    }

    let writes = scene.world.write_counts();
    info!(
        entity_scale = writes.entity_scale,
        shape_radius = writes.shape_radius,
        shape_enabled = writes.shape_enabled,
        node_scale = writes.node_scale,
        host_toggles = scene.host_toggles(),
        shadow_records = scaler.sync().store().len(),
        "world_writes"
    );
    summary
}

fn read_env_or<T: FromStr + Copy>(var: &'static str, default: T) -> T {
    match env::var(var) {
        Ok(value) => match value.trim().parse::<T>() {
            Ok(parsed) => parsed,
            Err(_) => {
                warn!(
                    env_var = var,
                    value = value.as_str(),
                    "invalid env var value; falling back to default"
                );
                default
            }
        },
        Err(env::VarError::NotPresent) => default,
        Err(err) => {
            warn!(env_var = var, error = %err, "unable to read env var; falling back to default");
            default
        }
    }
}
