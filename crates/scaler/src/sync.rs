use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::arbiter::{EnabledArbiter, WriteOrigin};
use crate::host::{
    CompanionKind, EntityCategory, EntityId, EntityRef, SceneHost, ShapeId, Vec3,
};
use crate::motion::{movement_slowdown, proportional_speed};
use crate::shadow::ShadowStore;

pub const DEFAULT_OFF_CYCLE_INTERVAL: u32 = 30;

/// How an accessory on a companion is kept in shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AccessoryMode {
    /// Re-snapped to a fixed scale on off-cycle ticks.
    Pinned { scale: f32 },
    /// Follows the owner's scale whenever the owner is resized.
    FollowOwner {
        #[serde(default)]
        offset: Option<[f32; 3]>,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccessoryRule {
    /// Case-insensitive prefix of the owning companion's name.
    pub owner_name_prefix: String,
    pub path: String,
    pub mode: AccessoryMode,
}

#[derive(Debug, Clone)]
pub struct SyncOptions {
    pub include_miniature_companion: bool,
    pub include_core_companion: bool,
    pub include_player_speed: bool,
    pub include_companion_speed: bool,
    pub companion_name_excludes: Vec<String>,
    pub accessories: Vec<AccessoryRule>,
    pub off_cycle_interval: u32,
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self {
            include_miniature_companion: false,
            include_core_companion: false,
            include_player_speed: false,
            include_companion_speed: false,
            companion_name_excludes: Vec::new(),
            accessories: Vec::new(),
            off_cycle_interval: DEFAULT_OFF_CYCLE_INTERVAL,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScaleTargets {
    pub player: f32,
    pub companion: f32,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickReport {
    pub player_found: bool,
    pub player_writes: u32,
    pub companions_located: u32,
    pub companions_scaled: u32,
    pub shapes_reasserted: u32,
}

/// Logs a warning when something goes missing, not on every tick it stays
/// missing.
#[derive(Debug, Default)]
struct PresenceWatch {
    last_present: Option<bool>,
}

impl PresenceWatch {
    /// Returns true when `present` flips to false (or starts out false).
    fn went_missing(&mut self, present: bool) -> bool {
        let changed = self.last_present != Some(present);
        self.last_present = Some(present);
        changed && !present
    }
}

/// Per-tick reconciliation of entity scales, shape radii and shape activity.
///
/// Owns the shadow store and the arbiter, so every active-attribute write,
/// from the host or from this pass, ends up in the same decision function.
#[derive(Debug)]
pub struct ScaleSync {
    store: ShadowStore,
    arbiter: EnabledArbiter,
    options: SyncOptions,
    gate_toggled: bool,
    off_cycle_tick: u32,
    player_watch: PresenceWatch,
    companion_watch: PresenceWatch,
}

impl ScaleSync {
    pub fn new(mut options: SyncOptions, gating_allowed: bool) -> Self {
        options.off_cycle_interval = options.off_cycle_interval.max(1);
        for exclude in &mut options.companion_name_excludes {
            *exclude = exclude.to_lowercase();
        }
        Self {
            store: ShadowStore::default(),
            arbiter: EnabledArbiter::new(gating_allowed),
            options,
            gate_toggled: false,
            off_cycle_tick: 0,
            player_watch: PresenceWatch::default(),
            companion_watch: PresenceWatch::default(),
        }
    }

    pub fn with_store(mut self, store: ShadowStore) -> Self {
        self.store = store;
        self
    }

    pub fn store(&self) -> &ShadowStore {
        &self.store
    }

    pub fn arbiter(&self) -> &EnabledArbiter {
        &self.arbiter
    }

    /// Flips the policy gate; the next reconciliation re-asserts every
    /// companion shape so the new policy takes effect at once.
    pub fn toggle_gate(&mut self) -> Option<bool> {
        let toggled = self.arbiter.toggle();
        match toggled {
            Some(enabled) => {
                self.gate_toggled = true;
                info!(shapes_enabled = enabled, "shape_gate_toggled");
            }
            None => debug!("shape_gate_toggle_ignored"),
        }
        toggled
    }

    /// Entry point for the host's own writes to a shape's active attribute.
    /// Returns the value the host must commit.
    pub fn intercept_host_write(
        &mut self,
        host: &dyn SceneHost,
        shape: ShapeId,
        proposed: bool,
    ) -> bool {
        self.arbiter
            .arbitrate(&mut self.store, host, shape, proposed, WriteOrigin::Host)
    }

    pub fn locate_player(&mut self, host: &dyn SceneHost) -> Option<EntityId> {
        let player = host.find(EntityCategory::Player, None).into_iter().next();
        if self.player_watch.went_missing(player.is_some()) {
            warn!("player_not_found");
        }
        player
    }

    pub fn locate_companions(&mut self, host: &dyn SceneHost) -> Vec<EntityId> {
        let excludes = &self.options.companion_name_excludes;
        let not_excluded = |entity: EntityRef<'_>| {
            let name = entity.name.to_lowercase();
            !excludes.iter().any(|exclude| name.contains(exclude.as_str()))
        };

        let mut kinds = vec![CompanionKind::Standard];
        if self.options.include_miniature_companion {
            kinds.push(CompanionKind::Miniature);
        }
        if self.options.include_core_companion {
            kinds.push(CompanionKind::Core);
        }

        let mut found = Vec::new();
        for kind in kinds {
            let category = EntityCategory::Companion(kind);
            if excludes.is_empty() {
                found.extend(host.find(category, None));
            } else {
                found.extend(host.find(category, Some(&not_excluded)));
            }
        }

        if self.companion_watch.went_missing(!found.is_empty()) {
            warn!("no_companions_found");
        }
        found
    }

    /// Writes the player scale to the primary player and every double whose
    /// scale differs. Returns the number of writes.
    pub fn apply_player_scale(
        &self,
        host: &mut dyn SceneHost,
        player: Option<EntityId>,
        scale: f32,
    ) -> u32 {
        let mut writes = 0;
        let doubles = host.find(EntityCategory::PlayerDouble, None);
        for entity in player.into_iter().chain(doubles) {
            if write_scale_if_changed(host, entity, scale).is_some() {
                writes += 1;
            }
        }
        if writes > 0 {
            debug!(scale, writes, "player_scaled");
        }
        writes
    }

    pub fn apply_player_motion(&self, host: &mut dyn SceneHost, player_scale: f32) {
        if self.options.include_player_speed {
            host.apply_player_motion(player_scale, movement_slowdown(player_scale));
        }
    }

    /// Brings one companion to `scale`: transform, shape radii, shape
    /// activity, speed and follow-scale accessories. Returns whether the
    /// scale changed and how many shapes were re-asserted.
    pub fn apply_companion_scale(
        &mut self,
        host: &mut dyn SceneHost,
        entity: EntityId,
        scale: f32,
    ) -> (bool, u32) {
        let previous = write_scale_if_changed(host, entity, scale);
        let changed = previous.is_some();
        let mut reasserted = 0;

        if changed || self.arbiter.gating_allowed() {
            for shape in host.find_shapes_of(entity) {
                if self.sync_shape(host, shape, changed.then_some(scale)) {
                    reasserted += 1;
                }
            }
        }

        if let Some(previous) = previous {
            if self.options.include_companion_speed {
                if let Some(speed) = host.entity_speed(entity) {
                    if let Some(speed) = proportional_speed(speed, previous, scale) {
                        host.set_entity_speed(entity, speed);
                    }
                }
            }
            self.apply_follow_accessories(host, entity, scale);
            info!(
                entity = entity.0,
                from = previous,
                to = scale,
                shapes_reasserted = reasserted,
                "companion_scaled"
            );
        }

        (changed, reasserted)
    }

    /// Full per-tick pass over player and companions.
    pub fn reconcile(&mut self, host: &mut dyn SceneHost, targets: ScaleTargets) -> TickReport {
        let mut report = TickReport::default();

        self.apply_player_motion(host, targets.player);
        let player = self.locate_player(host);
        report.player_found = player.is_some();
        report.player_writes = self.apply_player_scale(host, player, targets.player);

        let companions = self.locate_companions(host);
        report.companions_located = companions.len() as u32;
        let off_cycle = self.off_cycle_tick == 0;
        for companion in companions {
            let (changed, reasserted) =
                self.apply_companion_scale(host, companion, targets.companion);
            if changed {
                report.companions_scaled += 1;
            }
            report.shapes_reasserted += reasserted;
            if off_cycle {
                self.snap_pinned_accessories(host, companion);
            }
        }

        self.finish_tick();
        report
    }

    /// Re-asserts companion shapes without touching any scale, for modes that
    /// write scales outside the tick.
    pub fn refresh_shapes(&mut self, host: &mut dyn SceneHost) -> u32 {
        let mut reasserted = 0;
        if self.arbiter.gating_allowed() {
            for companion in self.locate_companions(host) {
                for shape in host.find_shapes_of(companion) {
                    if self.sync_shape(host, shape, None) {
                        reasserted += 1;
                    }
                }
            }
        }
        self.finish_tick();
        reasserted
    }

    fn finish_tick(&mut self) {
        self.gate_toggled = false;
        self.off_cycle_tick += 1;
        if self.off_cycle_tick >= self.options.off_cycle_interval {
            self.off_cycle_tick = 0;
        }
    }

    /// `rescale` carries the owner's new scale when it just changed. Returns
    /// true when the shape's active attribute was re-asserted.
    fn sync_shape(
        &mut self,
        host: &mut dyn SceneHost,
        shape: ShapeId,
        rescale: Option<f32>,
    ) -> bool {
        let Some(record) = self.store.get_or_create(&*host, shape) else {
            return false;
        };

        if let (Some(scale), Some(initial)) = (rescale, record.initial_radius) {
            host.set_shape_radius(shape, initial.compensated(scale));
        }

        if !self.arbiter.gating_allowed() {
            return false;
        }
        // Shapes that missed a gate change, e.g. while their owner was
        // inactive, still carry the old policy.
        let policy = self.arbiter.policy_enabled();
        let stale_policy = record.applied_policy != policy;
        if !(rescale.is_some() || self.gate_toggled || stale_policy) {
            return false;
        }

        let Some(current) = host.shape_enabled(shape) else {
            return false;
        };
        let committed =
            self.arbiter
                .arbitrate(&mut self.store, &*host, shape, current, WriteOrigin::Plugin);
        host.commit_shape_enabled(shape, committed);
        self.store.mark_policy_applied(shape, policy);
        true
    }

    fn apply_follow_accessories(&self, host: &mut dyn SceneHost, entity: EntityId, scale: f32) {
        let Some(owner) = host.entity_name(entity).map(str::to_owned) else {
            return;
        };
        for rule in self.rules_for_owner(&owner) {
            let AccessoryMode::FollowOwner { offset } = rule.mode else {
                continue;
            };
            let Some(node) = host.find_accessory(entity, &rule.path) else {
                debug!(entity = entity.0, path = %rule.path, "accessory_not_found");
                continue;
            };
            host.set_node_scale(node, scale);
            if let Some([x, y, z]) = offset {
                host.set_node_offset(node, Vec3::new(x, y, z).scaled(scale));
            }
        }
    }

    fn snap_pinned_accessories(&self, host: &mut dyn SceneHost, entity: EntityId) {
        let Some(owner) = host.entity_name(entity).map(str::to_owned) else {
            return;
        };
        for rule in self.rules_for_owner(&owner) {
            let AccessoryMode::Pinned { scale } = rule.mode else {
                continue;
            };
            let Some(node) = host.find_accessory(entity, &rule.path) else {
                continue;
            };
            if host.node_scale(node) != Some(scale) {
                host.set_node_scale(node, scale);
            }
        }
    }

    /// Rules whose owner prefix matches the start of `owner`, ignoring case.
    fn rules_for_owner<'a>(
        &'a self,
        owner: &'a str,
    ) -> impl Iterator<Item = &'a AccessoryRule> + 'a {
        self.options.accessories.iter().filter(move |rule| {
            owner
                .get(..rule.owner_name_prefix.len())
                .is_some_and(|head| head.eq_ignore_ascii_case(&rule.owner_name_prefix))
        })
    }
}

/// Writes `scale` only when it differs from the current value. Returns the
/// previous scale when a write happened.
pub fn write_scale_if_changed(
    host: &mut dyn SceneHost,
    entity: EntityId,
    scale: f32,
) -> Option<f32> {
    let current = host.entity_scale(entity)?;
    if current == scale {
        return None;
    }
    host.set_entity_scale(entity, scale);
    Some(current)
}
