//! Contract between the scaling core and the scene it runs inside.
//!
//! The host owns every entity, shape and accessory node. The core only ever
//! holds ids; ids must never be reused for a different object during the
//! lifetime of a session, because the shadow store keys on them.

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EntityId(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ShapeId(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub u64);

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Vec3 {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Vec3 {
    pub const fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }

    pub fn scaled(self, factor: f32) -> Self {
        Self {
            x: self.x * factor,
            y: self.y * factor,
            z: self.z * factor,
        }
    }

    pub fn distance_squared(self, other: Vec3) -> f32 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        let dz = self.z - other.z;
        dx * dx + dy * dy + dz * dz
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CompanionKind {
    Standard,
    Miniature,
    Core,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityCategory {
    /// The controllable player body.
    Player,
    /// Stand-ins that must track the player scale (cutscene copies and the like).
    PlayerDouble,
    Companion(CompanionKind),
}

/// Radius data of a shape. Tapered shapes carry independent end radii.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ShapeRadius {
    Uniform(f32),
    Tapered { start: f32, end: f32 },
}

impl ShapeRadius {
    /// Radius that keeps the world-space footprint of the shape unchanged
    /// after its owner is scaled by `scale`.
    pub fn compensated(self, scale: f32) -> Self {
        match self {
            ShapeRadius::Uniform(radius) => ShapeRadius::Uniform(radius / scale),
            ShapeRadius::Tapered { start, end } => ShapeRadius::Tapered {
                start: start / scale,
                end: end / scale,
            },
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct EntityRef<'a> {
    pub id: EntityId,
    pub name: &'a str,
}

pub type EntityPredicate<'p> = dyn Fn(EntityRef<'_>) -> bool + 'p;

pub trait EntityLocator {
    /// Currently live and active entities of `category`, optionally filtered.
    fn find(
        &self,
        category: EntityCategory,
        predicate: Option<&EntityPredicate<'_>>,
    ) -> Vec<EntityId>;

    fn find_shapes_of(&self, entity: EntityId) -> Vec<ShapeId>;
}

/// Read-only view of shapes, enough to initialize and prune shadow records.
pub trait ShapeQuery {
    fn shape_alive(&self, shape: ShapeId) -> bool;
    fn shape_radius(&self, shape: ShapeId) -> Option<ShapeRadius>;
    fn shape_enabled(&self, shape: ShapeId) -> Option<bool>;
}

pub trait SceneHost: EntityLocator + ShapeQuery {
    fn entity_name(&self, entity: EntityId) -> Option<&str>;
    fn entity_scale(&self, entity: EntityId) -> Option<f32>;
    fn set_entity_scale(&mut self, entity: EntityId, scale: f32);
    fn entity_position(&self, entity: EntityId) -> Option<Vec3>;

    fn entity_speed(&self, _entity: EntityId) -> Option<f32> {
        None
    }
    fn set_entity_speed(&mut self, _entity: EntityId, _speed: f32) {}

    fn set_shape_radius(&mut self, shape: ShapeId, radius: ShapeRadius);

    /// Raw write of the active attribute. Callers must have arbitrated the
    /// value already; this never loops back into the arbiter.
    fn commit_shape_enabled(&mut self, shape: ShapeId, enabled: bool);

    fn find_accessory(&self, _entity: EntityId, _path: &str) -> Option<NodeId> {
        None
    }
    fn node_scale(&self, _node: NodeId) -> Option<f32> {
        None
    }
    fn set_node_scale(&mut self, _node: NodeId, _scale: f32) {}
    fn set_node_offset(&mut self, _node: NodeId, _offset: Vec3) {}

    /// Movement tuning for a shrunken player: `speed_factor` is the player
    /// scale, `slowdown` multiplies the host's move damping.
    fn apply_player_motion(&mut self, _speed_factor: f32, _slowdown: f32) {}
}
