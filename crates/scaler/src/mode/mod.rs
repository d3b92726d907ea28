mod dynamic;
mod fixed;

use std::time::Duration;

pub use dynamic::DynamicMode;
pub use fixed::FixedMode;

use crate::host::SceneHost;
use crate::sync::{ScaleSync, ScaleTargets, TickReport};

pub const PLAYER_SCALE_MIN: f32 = 0.1;
pub const PLAYER_SCALE_MAX: f32 = 1.0;
pub const COMPANION_SCALE_MIN: f32 = 0.1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModeKind {
    Dynamic,
    Fixed,
}

impl ModeKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ModeKind::Dynamic => "dynamic",
            ModeKind::Fixed => "fixed",
        }
    }
}

/// Scaling strategy. Chosen once at startup; there are no transitions
/// between modes at runtime.
pub trait ScalingMode {
    fn kind(&self) -> ModeKind;

    /// Resizes the player. `fixed` wins over `factor`; with neither, the last
    /// restore scale is used.
    fn resize_player(
        &mut self,
        sync: &mut ScaleSync,
        host: &mut dyn SceneHost,
        fixed: Option<f32>,
        factor: Option<f32>,
    );

    fn resize_companion(
        &mut self,
        sync: &mut ScaleSync,
        host: &mut dyn SceneHost,
        fixed: Option<f32>,
        factor: Option<f32>,
    );

    fn toggle_gate(&mut self, sync: &mut ScaleSync) -> Option<bool> {
        sync.toggle_gate()
    }

    fn update(&mut self, sync: &mut ScaleSync, host: &mut dyn SceneHost, dt: Duration)
        -> TickReport;

    /// Steady-state targets, when the mode keeps any.
    fn targets(&self) -> Option<ScaleTargets> {
        None
    }
}

pub(crate) fn clamp_player_scale(scale: f32) -> f32 {
    if !scale.is_finite() {
        return PLAYER_SCALE_MAX;
    }
    scale.clamp(PLAYER_SCALE_MIN, PLAYER_SCALE_MAX)
}

pub(crate) fn clamp_companion_scale(scale: f32) -> f32 {
    if !scale.is_finite() {
        return 1.0;
    }
    scale.max(COMPANION_SCALE_MIN)
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct PlayerResize {
    pub scale: f32,
    /// New restore scale, set only by factor resizes.
    pub restore: Option<f32>,
}

pub(crate) fn resolve_player_resize(
    current: f32,
    restore: f32,
    fixed: Option<f32>,
    factor: Option<f32>,
) -> PlayerResize {
    match (fixed, factor) {
        (Some(fixed), _) => PlayerResize {
            scale: clamp_player_scale(fixed),
            restore: None,
        },
        (None, Some(factor)) => {
            let scale = clamp_player_scale(current * factor);
            PlayerResize {
                scale,
                restore: Some(scale),
            }
        }
        (None, None) => PlayerResize {
            scale: clamp_player_scale(restore),
            restore: None,
        },
    }
}

/// `None` when neither a fixed value nor a factor was given.
pub(crate) fn resolve_companion_resize(
    current: f32,
    fixed: Option<f32>,
    factor: Option<f32>,
) -> Option<f32> {
    match (fixed, factor) {
        (Some(fixed), _) => Some(clamp_companion_scale(fixed)),
        (None, Some(factor)) => Some(clamp_companion_scale(current * factor)),
        (None, None) => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixed_player_resize_wins_and_keeps_restore() {
        let resize = resolve_player_resize(0.5, 0.7, Some(1.0), Some(2.0));
        assert_eq!(
            resize,
            PlayerResize {
                scale: 1.0,
                restore: None
            }
        );
    }

    #[test]
    fn factor_player_resize_clamps_and_records_restore() {
        let resize = resolve_player_resize(0.95, 0.5, None, Some(1.1));
        assert_eq!(resize.scale, 1.0);
        assert_eq!(resize.restore, Some(1.0));

        let resize = resolve_player_resize(0.1, 0.5, None, Some(0.5));
        assert_eq!(resize.scale, PLAYER_SCALE_MIN);
    }

    #[test]
    fn bare_player_resize_restores() {
        let resize = resolve_player_resize(1.0, 0.3, None, None);
        assert_eq!(resize.scale, 0.3);
        assert_eq!(resize.restore, None);
    }

    #[test]
    fn companion_resize_is_floored_but_not_capped() {
        assert_eq!(resolve_companion_resize(1.0, Some(3.0), None), Some(3.0));
        assert_eq!(resolve_companion_resize(0.11, None, Some(0.5)), Some(0.1));
        assert_eq!(resolve_companion_resize(1.0, None, None), None);
    }

    #[test]
    fn non_finite_scales_fall_back() {
        assert_eq!(clamp_player_scale(f32::NAN), PLAYER_SCALE_MAX);
        assert_eq!(clamp_companion_scale(f32::INFINITY), 1.0);
    }
}
