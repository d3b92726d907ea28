use std::time::Duration;

use tracing::info;

use crate::actions::ScalerAction;
use crate::host::{SceneHost, ShapeId};
use crate::mode::{DynamicMode, FixedMode, ModeKind, ScalingMode};
use crate::settings::{ScalePersistence, Settings};
use crate::sync::{ScaleSync, ScaleTargets, TickReport};

/// Plugin entry points: resize commands, the gate toggle, the per-tick update
/// and the interception hook for host writes to a shape's active attribute.
pub struct Scaler {
    sync: ScaleSync,
    mode: Box<dyn ScalingMode>,
    scale_factor: f32,
}

impl Scaler {
    pub fn new(sync: ScaleSync, mode: Box<dyn ScalingMode>, scale_factor: f32) -> Self {
        Self {
            sync,
            mode,
            scale_factor,
        }
    }

    /// Picks the mode from `fixed_height_mode`. Only fixed mode persists
    /// scales; dynamic mode drops `persistence`.
    pub fn from_settings(settings: &Settings, persistence: Box<dyn ScalePersistence>) -> Self {
        let configuration = &settings.configuration;
        let sync = ScaleSync::new(
            configuration.sync_options(),
            configuration.allow_shape_toggle,
        );
        let mode: Box<dyn ScalingMode> = if configuration.fixed_height_mode {
            Box::new(FixedMode::new(
                settings.scales,
                configuration.save_timeout(),
                persistence,
            ))
        } else {
            Box::new(DynamicMode::new(settings.scales.player_restore_scale))
        };

        info!(
            mode = mode.kind().as_str(),
            gating_allowed = configuration.allow_shape_toggle,
            scale_factor = configuration.scale_factor,
            "scaler_started"
        );
        Self::new(sync, mode, configuration.scale_factor)
    }

    pub fn mode_kind(&self) -> ModeKind {
        self.mode.kind()
    }

    pub fn sync(&self) -> &ScaleSync {
        &self.sync
    }

    pub fn targets(&self) -> Option<ScaleTargets> {
        self.mode.targets()
    }

    pub fn resize_player(
        &mut self,
        host: &mut dyn SceneHost,
        fixed: Option<f32>,
        factor: Option<f32>,
    ) {
        self.mode.resize_player(&mut self.sync, host, fixed, factor);
    }

    pub fn resize_companion(
        &mut self,
        host: &mut dyn SceneHost,
        fixed: Option<f32>,
        factor: Option<f32>,
    ) {
        self.mode.resize_companion(&mut self.sync, host, fixed, factor);
    }

    /// `None` when shape gating is not allowed by configuration.
    pub fn toggle_gate(&mut self) -> Option<bool> {
        self.mode.toggle_gate(&mut self.sync)
    }

    pub fn update(&mut self, host: &mut dyn SceneHost, dt: Duration) -> TickReport {
        self.mode.update(&mut self.sync, host, dt)
    }

    /// Must be routed every host-originated write to a shape's active
    /// attribute. Returns the value to commit.
    pub fn intercept_enabled_write(
        &mut self,
        host: &dyn SceneHost,
        shape: ShapeId,
        proposed: bool,
    ) -> bool {
        self.sync.intercept_host_write(host, shape, proposed)
    }

    pub fn dispatch(&mut self, host: &mut dyn SceneHost, action: ScalerAction) {
        let shrink = 1.0 / self.scale_factor;
        let grow = self.scale_factor;
        match action {
            ScalerAction::CompanionShrink => self.resize_companion(host, None, Some(shrink)),
            ScalerAction::CompanionNormal => self.resize_companion(host, Some(1.0), None),
            ScalerAction::CompanionGrow => self.resize_companion(host, None, Some(grow)),
            ScalerAction::PlayerShrink => self.resize_player(host, None, Some(shrink)),
            ScalerAction::PlayerNormal => self.resize_player(host, Some(1.0), None),
            ScalerAction::PlayerGrow => self.resize_player(host, None, Some(grow)),
            ScalerAction::PlayerRestore => self.resize_player(host, None, None),
            ScalerAction::ToggleShapes => {
                self.toggle_gate();
            }
        }
    }
}
