use std::collections::HashMap;

use tracing::debug;

use crate::host::{ShapeId, ShapeQuery, ShapeRadius};

pub const DEFAULT_PRUNE_INTERVAL: u32 = 1000;

/// Plugin-side metadata for one host shape.
///
/// `identity`, `initial_radius` and `known_to_plugin` are captured when the
/// record is created and never change afterwards, no matter how often the core
/// rewrites the shape's radius.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ShadowRecord {
    pub identity: ShapeId,
    pub initial_radius: Option<ShapeRadius>,
    pub host_intended_enabled: bool,
    pub known_to_plugin: bool,
    /// Gate value the sync pass last committed to this shape. Starts open.
    pub applied_policy: bool,
}

/// Identity-keyed side table for host shapes.
///
/// The host gives no destruction callback, so dead entries linger until the
/// next sweep. A sweep runs every `prune_interval` store accesses.
#[derive(Debug)]
pub struct ShadowStore {
    records: HashMap<ShapeId, ShadowRecord>,
    prune_interval: u32,
    accesses_since_prune: u32,
}

impl Default for ShadowStore {
    fn default() -> Self {
        Self::with_prune_interval(DEFAULT_PRUNE_INTERVAL)
    }
}

impl ShadowStore {
    pub fn with_prune_interval(prune_interval: u32) -> Self {
        Self {
            records: HashMap::new(),
            prune_interval: prune_interval.max(1),
            accesses_since_prune: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Returns the record for `shape`, creating it on first observation.
    /// Dead shapes yield `None` and are never inserted.
    pub fn get_or_create<P: ShapeQuery + ?Sized>(
        &mut self,
        shapes: &P,
        shape: ShapeId,
    ) -> Option<ShadowRecord> {
        self.count_access(shapes);
        if !shapes.shape_alive(shape) {
            return None;
        }
        if let Some(record) = self.records.get(&shape) {
            return Some(*record);
        }

        let record = ShadowRecord {
            identity: shape,
            initial_radius: shapes.shape_radius(shape),
            host_intended_enabled: shapes.shape_enabled(shape).unwrap_or(true),
            known_to_plugin: true,
            applied_policy: true,
        };
        self.records.insert(shape, record);
        Some(record)
    }

    pub fn try_get<P: ShapeQuery + ?Sized>(
        &mut self,
        shapes: &P,
        shape: ShapeId,
    ) -> Option<ShadowRecord> {
        self.count_access(shapes);
        if !shapes.shape_alive(shape) {
            return None;
        }
        self.records
            .get(&shape)
            .copied()
            .filter(|record| record.known_to_plugin)
    }

    /// Stores what the host last tried to write. Untracked shapes are left
    /// alone.
    pub fn record_host_intent<P: ShapeQuery + ?Sized>(
        &mut self,
        shapes: &P,
        shape: ShapeId,
        value: bool,
    ) {
        self.count_access(shapes);
        if let Some(record) = self.records.get_mut(&shape) {
            record.host_intended_enabled = value;
        }
    }

    /// Remembers the gate value just committed to `shape` by the sync pass.
    pub fn mark_policy_applied(&mut self, shape: ShapeId, policy: bool) {
        if let Some(record) = self.records.get_mut(&shape) {
            record.applied_policy = policy;
        }
    }

    /// Drops every record whose shape the host no longer has. Returns the
    /// number of records removed.
    pub fn prune<P: ShapeQuery + ?Sized>(&mut self, shapes: &P) -> usize {
        let before = self.records.len();
        self.records.retain(|shape, _| shapes.shape_alive(*shape));
        self.accesses_since_prune = 0;
        let removed = before - self.records.len();
        if removed > 0 {
            debug!(removed, remaining = self.records.len(), "shadow_store_pruned");
        }
        removed
    }

    fn count_access<P: ShapeQuery + ?Sized>(&mut self, shapes: &P) {
        self.accesses_since_prune = self.accesses_since_prune.saturating_add(1);
        if self.accesses_since_prune >= self.prune_interval {
            self.prune(shapes);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::SceneHost;
    use crate::sim::{SimShape, SimWorld};

    fn capsule(radius: f32) -> SimShape {
        SimShape::new(Some(ShapeRadius::Uniform(radius)), true)
    }

    #[test]
    fn get_or_create_captures_initial_radius_once() {
        let mut world = SimWorld::default();
        let shape = world.spawn_loose_shape(capsule(0.3));
        let mut store = ShadowStore::default();

        let first = store.get_or_create(&world, shape).expect("record");
        world.set_shape_radius(shape, ShapeRadius::Uniform(0.9));
        for _ in 0..5 {
            let again = store.get_or_create(&world, shape).expect("record");
            assert_eq!(again.initial_radius, first.initial_radius);
        }
        assert_eq!(first.initial_radius, Some(ShapeRadius::Uniform(0.3)));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn get_or_create_captures_current_enabled_as_host_intent() {
        let mut world = SimWorld::default();
        let shape = world.spawn_loose_shape(SimShape::new(None, false));
        let mut store = ShadowStore::default();

        let record = store.get_or_create(&world, shape).expect("record");
        assert!(!record.host_intended_enabled);
        assert!(record.known_to_plugin);
        assert_eq!(record.initial_radius, None);
    }

    #[test]
    fn try_get_never_creates() {
        let mut world = SimWorld::default();
        let shape = world.spawn_loose_shape(capsule(0.3));
        let mut store = ShadowStore::default();

        assert!(store.try_get(&world, shape).is_none());
        assert!(store.is_empty());
    }

    #[test]
    fn dead_shapes_read_as_unknown() {
        let mut world = SimWorld::default();
        let shape = world.spawn_loose_shape(capsule(0.3));
        let mut store = ShadowStore::default();
        store.get_or_create(&world, shape).expect("record");

        world.destroy_shape(shape);
        assert!(store.try_get(&world, shape).is_none());
        assert!(store.get_or_create(&world, shape).is_none());
    }

    #[test]
    fn record_host_intent_ignores_untracked_shapes() {
        let mut world = SimWorld::default();
        let shape = world.spawn_loose_shape(capsule(0.3));
        let mut store = ShadowStore::default();

        store.record_host_intent(&world, shape, false);
        assert!(store.is_empty());

        store.get_or_create(&world, shape).expect("record");
        store.record_host_intent(&world, shape, false);
        let record = store.try_get(&world, shape).expect("record");
        assert!(!record.host_intended_enabled);
    }

    #[test]
    fn destroyed_entries_survive_until_the_prune_interval() {
        let mut world = SimWorld::default();
        let mut store = ShadowStore::with_prune_interval(10);
        let survivor = world.spawn_loose_shape(capsule(0.5));
        store.get_or_create(&world, survivor).expect("survivor");

        let mut doomed = Vec::new();
        for _ in 0..4 {
            let shape = world.spawn_loose_shape(capsule(0.3));
            store.get_or_create(&world, shape).expect("record");
            doomed.push(shape);
        }
        for shape in &doomed {
            world.destroy_shape(*shape);
        }
        assert_eq!(store.len(), 5);

        // 5 accesses so far; 4 more keeps us below the interval.
        for _ in 0..4 {
            store.get_or_create(&world, survivor).expect("survivor");
        }
        assert_eq!(store.len(), 5);

        // The tenth access triggers the sweep.
        store.get_or_create(&world, survivor).expect("survivor");
        assert_eq!(store.len(), 1);
        assert!(store.try_get(&world, survivor).is_some());
    }

    #[test]
    fn explicit_prune_keeps_live_entries() {
        let mut world = SimWorld::default();
        let mut store = ShadowStore::default();
        let live = world.spawn_loose_shape(capsule(0.3));
        let dead = world.spawn_loose_shape(capsule(0.3));
        store.get_or_create(&world, live).expect("live");
        store.get_or_create(&world, dead).expect("dead");
        world.destroy_shape(dead);

        assert_eq!(store.prune(&world), 1);
        assert_eq!(store.len(), 1);
        assert_eq!(store.prune(&world), 0);
    }
}
