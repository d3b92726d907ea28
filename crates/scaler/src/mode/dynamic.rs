use std::time::Duration;

use tracing::{info, warn};

use super::{resolve_companion_resize, resolve_player_resize, ModeKind, ScalingMode};
use crate::host::{EntityId, SceneHost};
use crate::sync::{write_scale_if_changed, ScaleSync, TickReport};

/// Every resize is applied to the scene right away and becomes the new
/// steady state. Nothing is persisted.
#[derive(Debug)]
pub struct DynamicMode {
    restore_scale: f32,
}

impl DynamicMode {
    pub fn new(restore_scale: f32) -> Self {
        Self { restore_scale }
    }

    fn nearest_companion(
        sync: &mut ScaleSync,
        host: &dyn SceneHost,
        player: EntityId,
    ) -> Option<EntityId> {
        let origin = host.entity_position(player)?;
        sync.locate_companions(host)
            .into_iter()
            .filter_map(|companion| {
                host.entity_position(companion)
                    .map(|position| (companion, origin.distance_squared(position)))
            })
            .min_by(|a, b| a.1.total_cmp(&b.1))
            .map(|(companion, _)| companion)
    }
}

impl Default for DynamicMode {
    fn default() -> Self {
        Self::new(1.0)
    }
}

impl ScalingMode for DynamicMode {
    fn kind(&self) -> ModeKind {
        ModeKind::Dynamic
    }

    fn resize_player(
        &mut self,
        sync: &mut ScaleSync,
        host: &mut dyn SceneHost,
        fixed: Option<f32>,
        factor: Option<f32>,
    ) {
        let Some(player) = sync.locate_player(host) else {
            return;
        };
        let Some(current) = host.entity_scale(player) else {
            return;
        };

        let resize = resolve_player_resize(current, self.restore_scale, fixed, factor);
        if let Some(restore) = resize.restore {
            self.restore_scale = restore;
        }
        write_scale_if_changed(host, player, resize.scale);
        sync.apply_player_motion(host, resize.scale);
        info!(player_scale = resize.scale, "player_resized");
    }

    /// Only the companion closest to the player is resized.
    fn resize_companion(
        &mut self,
        sync: &mut ScaleSync,
        host: &mut dyn SceneHost,
        fixed: Option<f32>,
        factor: Option<f32>,
    ) {
        let Some(player) = sync.locate_player(host) else {
            return;
        };
        let Some(companion) = Self::nearest_companion(sync, host, player) else {
            warn!("nearest_companion_unavailable");
            return;
        };
        let Some(current) = host.entity_scale(companion) else {
            return;
        };
        let Some(scale) = resolve_companion_resize(current, fixed, factor) else {
            return;
        };
        sync.apply_companion_scale(host, companion, scale);
    }

    fn update(
        &mut self,
        sync: &mut ScaleSync,
        host: &mut dyn SceneHost,
        _dt: Duration,
    ) -> TickReport {
        TickReport {
            shapes_reasserted: sync.refresh_shapes(host),
            ..TickReport::default()
        }
    }
}
