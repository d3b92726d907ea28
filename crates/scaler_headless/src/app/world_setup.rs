use scaler::sim::{SimShape, SimWorld};
use scaler::{
    CompanionKind, EntityCategory, EntityId, Scaler, SceneHost, ShapeId, ShapeQuery, ShapeRadius,
    Vec3,
};
use tracing::{debug, info};

const HOST_TOGGLE_INTERVAL_TICKS: u64 = 45;
const RESPAWN_TICK: u64 = 200;

/// Demo scene plus the scripted host behaviour that runs alongside the
/// scaler: periodic activity writes on companion shapes and one companion
/// despawn and respawn.
pub(crate) struct DemoScene {
    pub(crate) world: SimWorld,
    wanderer: Option<EntityId>,
    host_toggles: u32,
}

impl DemoScene {
    pub(crate) fn build() -> Self {
        let mut world = SimWorld::default();

        let player = world.spawn("Player", EntityCategory::Player, 1.0);
        world.spawn("Player Cutscene Double", EntityCategory::PlayerDouble, 1.0);
        if let Some(entity) = world.entity_mut(player) {
            entity.speed = Some(4.0);
        }

        let reader = spawn_companion(&mut world, "Reader Companion", Vec3::new(1.5, 0.0, 0.0));
        world.attach_accessory(reader, "Position Glasses", 1.0);
        world.attach_accessory(reader, "RightItem/Pillow", 1.0);
        spawn_companion(&mut world, "Companion Mannequin", Vec3::new(8.0, 0.0, 0.0));
        let wanderer = spawn_companion(&mut world, "Wandering Companion", Vec3::new(4.0, 0.0, 2.0));

        let mini = world.spawn(
            "Miniature Companion",
            EntityCategory::Companion(CompanionKind::Miniature),
            1.0,
        );
        world.attach_shape(mini, SimShape::new(Some(ShapeRadius::Uniform(0.1)), true));
        let core = world.spawn(
            "Core Companion",
            EntityCategory::Companion(CompanionKind::Core),
            1.0,
        );
        world.attach_shape(core, SimShape::new(Some(ShapeRadius::Uniform(0.5)), true));

        info!(
            entities = world.entities().len(),
            shapes = world.shape_count(),
            "demo_scene_built"
        );
        Self {
            world,
            wanderer: Some(wanderer),
            host_toggles: 0,
        }
    }

    pub(crate) fn host_toggles(&self) -> u32 {
        self.host_toggles
    }

    /// Host-side work for one tick. Every activity write goes through the
    /// scaler's interception hook before it is committed.
    pub(crate) fn run_host_tick(&mut self, tick: u64, scaler: &mut Scaler) {
        if tick > 0 && tick % HOST_TOGGLE_INTERVAL_TICKS == 0 {
            self.toggle_companion_shapes(scaler);
        }
        if tick == RESPAWN_TICK {
            self.respawn_wanderer();
        }
    }

    fn toggle_companion_shapes(&mut self, scaler: &mut Scaler) {
        let shapes: Vec<ShapeId> = self
            .world
            .entities()
            .iter()
            .filter(|entity| matches!(entity.category, EntityCategory::Companion(_)))
            .flat_map(|entity| entity.shapes().to_vec())
            .collect();

        for shape in shapes {
            let Some(current) = self.world.shape_enabled(shape) else {
                continue;
            };
            let committed = scaler.intercept_enabled_write(&self.world, shape, !current);
            self.world.commit_shape_enabled(shape, committed);
            self.host_toggles += 1;
            debug!(shape = shape.0, proposed = !current, committed, "host_shape_write");
        }
    }

    fn respawn_wanderer(&mut self) {
        if let Some(wanderer) = self.wanderer.take() {
            self.world.despawn(wanderer);
        }
        let replacement = spawn_companion(
            &mut self.world,
            "Wandering Companion",
            Vec3::new(3.0, 0.0, -2.0),
        );
        self.wanderer = Some(replacement);
        info!(entity = replacement.0, "companion_respawned");
    }
}

fn spawn_companion(world: &mut SimWorld, name: &str, position: Vec3) -> EntityId {
    let entity = world.spawn_companion(name, 1.0);
    if let Some(companion) = world.entity_mut(entity) {
        companion.position = position;
        companion.speed = Some(3.0);
    }
    world.attach_shape(entity, SimShape::new(Some(ShapeRadius::Uniform(0.3)), true));
    world.attach_shape(
        entity,
        SimShape::new(
            Some(ShapeRadius::Tapered {
                start: 0.12,
                end: 0.08,
            }),
            true,
        ),
    );
    entity
}
