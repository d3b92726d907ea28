//! In-memory scene that implements [`SceneHost`].
//!
//! Used by the headless runner and by tests. Ids come from one monotonic
//! counter and are never reused, matching what the shadow store expects of a
//! real host.

use std::collections::HashMap;

use crate::host::{
    CompanionKind, EntityCategory, EntityId, EntityLocator, EntityPredicate, EntityRef, NodeId,
    SceneHost, ShapeId, ShapeQuery, ShapeRadius, Vec3,
};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SimShape {
    pub radius: Option<ShapeRadius>,
    pub enabled: bool,
}

impl SimShape {
    pub fn new(radius: Option<ShapeRadius>, enabled: bool) -> Self {
        Self { radius, enabled }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SimNode {
    pub scale: f32,
    pub offset: Vec3,
}

#[derive(Debug, Clone)]
pub struct SimEntity {
    pub id: EntityId,
    pub name: String,
    pub category: EntityCategory,
    pub scale: f32,
    pub position: Vec3,
    pub speed: Option<f32>,
    pub active: bool,
    shapes: Vec<ShapeId>,
    accessories: Vec<(String, NodeId)>,
}

impl SimEntity {
    pub fn shapes(&self) -> &[ShapeId] {
        &self.shapes
    }
}

/// Writes the core performed against the world, for assertions and summaries.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WriteCounts {
    pub entity_scale: u32,
    pub entity_speed: u32,
    pub shape_radius: u32,
    pub shape_enabled: u32,
    pub node_scale: u32,
    pub node_offset: u32,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlayerMotion {
    pub speed_factor: f32,
    pub slowdown: f32,
}

#[derive(Debug, Default)]
pub struct SimWorld {
    next_id: u64,
    entities: Vec<SimEntity>,
    shapes: HashMap<ShapeId, SimShape>,
    nodes: HashMap<NodeId, SimNode>,
    writes: WriteCounts,
    player_motion: Option<PlayerMotion>,
}

impl SimWorld {
    fn allocate(&mut self) -> u64 {
        let id = self.next_id;
        self.next_id = self.next_id.saturating_add(1);
        id
    }

    pub fn spawn(&mut self, name: &str, category: EntityCategory, scale: f32) -> EntityId {
        let id = EntityId(self.allocate());
        self.entities.push(SimEntity {
            id,
            name: name.to_string(),
            category,
            scale,
            position: Vec3::default(),
            speed: None,
            active: true,
            shapes: Vec::new(),
            accessories: Vec::new(),
        });
        id
    }

    pub fn spawn_companion(&mut self, name: &str, scale: f32) -> EntityId {
        self.spawn(name, EntityCategory::Companion(CompanionKind::Standard), scale)
    }

    pub fn despawn(&mut self, entity: EntityId) -> bool {
        let Some(index) = self.entities.iter().position(|e| e.id == entity) else {
            return false;
        };
        let removed = self.entities.remove(index);
        for shape in removed.shapes {
            self.shapes.remove(&shape);
        }
        for (_, node) in removed.accessories {
            self.nodes.remove(&node);
        }
        true
    }

    pub fn attach_shape(&mut self, entity: EntityId, shape: SimShape) -> Option<ShapeId> {
        let id = ShapeId(self.allocate());
        let owner = self.entity_mut(entity)?;
        owner.shapes.push(id);
        self.shapes.insert(id, shape);
        Some(id)
    }

    /// A shape with no owning entity, as hosts sometimes keep around.
    pub fn spawn_loose_shape(&mut self, shape: SimShape) -> ShapeId {
        let id = ShapeId(self.allocate());
        self.shapes.insert(id, shape);
        id
    }

    pub fn destroy_shape(&mut self, shape: ShapeId) -> bool {
        for entity in &mut self.entities {
            entity.shapes.retain(|id| *id != shape);
        }
        self.shapes.remove(&shape).is_some()
    }

    pub fn attach_accessory(&mut self, entity: EntityId, path: &str, scale: f32) -> Option<NodeId> {
        let id = NodeId(self.allocate());
        let owner = self.entity_mut(entity)?;
        owner.accessories.push((path.to_string(), id));
        self.nodes.insert(
            id,
            SimNode {
                scale,
                offset: Vec3::default(),
            },
        );
        Some(id)
    }

    pub fn entity(&self, entity: EntityId) -> Option<&SimEntity> {
        self.entities.iter().find(|e| e.id == entity)
    }

    pub fn entity_mut(&mut self, entity: EntityId) -> Option<&mut SimEntity> {
        self.entities.iter_mut().find(|e| e.id == entity)
    }

    pub fn entities(&self) -> &[SimEntity] {
        &self.entities
    }

    pub fn shape(&self, shape: ShapeId) -> Option<&SimShape> {
        self.shapes.get(&shape)
    }

    pub fn shape_count(&self) -> usize {
        self.shapes.len()
    }

    pub fn node(&self, node: NodeId) -> Option<&SimNode> {
        self.nodes.get(&node)
    }

    pub fn write_counts(&self) -> WriteCounts {
        self.writes
    }

    pub fn reset_write_counts(&mut self) {
        self.writes = WriteCounts::default();
    }

    pub fn player_motion(&self) -> Option<PlayerMotion> {
        self.player_motion
    }
}

impl EntityLocator for SimWorld {
    fn find(
        &self,
        category: EntityCategory,
        predicate: Option<&EntityPredicate<'_>>,
    ) -> Vec<EntityId> {
        self.entities
            .iter()
            .filter(|entity| entity.active && entity.category == category)
            .filter(|entity| {
                predicate.map_or(true, |accept| {
                    accept(EntityRef {
                        id: entity.id,
                        name: &entity.name,
                    })
                })
            })
            .map(|entity| entity.id)
            .collect()
    }

    fn find_shapes_of(&self, entity: EntityId) -> Vec<ShapeId> {
        self.entity(entity)
            .map(|e| e.shapes.clone())
            .unwrap_or_default()
    }
}

impl ShapeQuery for SimWorld {
    fn shape_alive(&self, shape: ShapeId) -> bool {
        self.shapes.contains_key(&shape)
    }

    fn shape_radius(&self, shape: ShapeId) -> Option<ShapeRadius> {
        self.shapes.get(&shape).and_then(|s| s.radius)
    }

    fn shape_enabled(&self, shape: ShapeId) -> Option<bool> {
        self.shapes.get(&shape).map(|s| s.enabled)
    }
}

impl SceneHost for SimWorld {
    fn entity_name(&self, entity: EntityId) -> Option<&str> {
        self.entity(entity).map(|e| e.name.as_str())
    }

    fn entity_scale(&self, entity: EntityId) -> Option<f32> {
        self.entity(entity).map(|e| e.scale)
    }

    fn set_entity_scale(&mut self, entity: EntityId, scale: f32) {
        if let Some(e) = self.entity_mut(entity) {
            e.scale = scale;
            self.writes.entity_scale += 1;
        }
    }

    fn entity_position(&self, entity: EntityId) -> Option<Vec3> {
        self.entity(entity).map(|e| e.position)
    }

    fn entity_speed(&self, entity: EntityId) -> Option<f32> {
        self.entity(entity).and_then(|e| e.speed)
    }

    fn set_entity_speed(&mut self, entity: EntityId, speed: f32) {
        if let Some(e) = self.entity_mut(entity) {
            e.speed = Some(speed);
            self.writes.entity_speed += 1;
        }
    }

    fn set_shape_radius(&mut self, shape: ShapeId, radius: ShapeRadius) {
        if let Some(s) = self.shapes.get_mut(&shape) {
            s.radius = Some(radius);
            self.writes.shape_radius += 1;
        }
    }

    fn commit_shape_enabled(&mut self, shape: ShapeId, enabled: bool) {
        if let Some(s) = self.shapes.get_mut(&shape) {
            s.enabled = enabled;
            self.writes.shape_enabled += 1;
        }
    }

    fn find_accessory(&self, entity: EntityId, path: &str) -> Option<NodeId> {
        self.entity(entity)?
            .accessories
            .iter()
            .find(|(accessory_path, _)| accessory_path == path)
            .map(|(_, node)| *node)
    }

    fn node_scale(&self, node: NodeId) -> Option<f32> {
        self.nodes.get(&node).map(|n| n.scale)
    }

    fn set_node_scale(&mut self, node: NodeId, scale: f32) {
        if let Some(n) = self.nodes.get_mut(&node) {
            n.scale = scale;
            self.writes.node_scale += 1;
        }
    }

    fn set_node_offset(&mut self, node: NodeId, offset: Vec3) {
        if let Some(n) = self.nodes.get_mut(&node) {
            n.offset = offset;
            self.writes.node_offset += 1;
        }
    }

    fn apply_player_motion(&mut self, speed_factor: f32, slowdown: f32) {
        self.player_motion = Some(PlayerMotion {
            speed_factor,
            slowdown,
        });
    }
}
