mod geometry;

pub use geometry::{Aabb, Obstacle, ObstacleKind, Ramp, RampPlane, WorldGeometry};

use crate::config::{GameConfig, WorldConfig};
use bevy::prelude::*;
use geometry::euler_degrees_to_quat;

const GROUND_COLOR: Color = Color::srgb(0.0, 1.0, 0.0);
const WALL_COLOR: Color = Color::srgb(0.53, 0.53, 0.53);
const RAMP_COLOR: Color = Color::srgb(0.55, 0.27, 0.07);
const CONE_COLOR: Color = Color::srgb(1.0, 0.65, 0.0);
const PATH_COLOR: Color = Color::srgb(0.0, 0.0, 1.0);

pub struct WorldScenePlugin;

impl Plugin for WorldScenePlugin {
    fn build(&self, app: &mut App) {
        app.init_resource::<WorldSceneState>().add_systems(
            Update,
            (sync_world_scene, draw_course_path)
                .chain()
                .run_if(resource_exists::<GameConfig>),
        );
    }
}

#[derive(Component)]
struct WorldVisual;

#[derive(Resource, Debug, Default)]
struct WorldSceneState {
    built_from: Option<WorldConfig>,
}

fn sync_world_scene(
    mut commands: Commands,
    config: Res<GameConfig>,
    mut scene_state: ResMut<WorldSceneState>,
    mut meshes: ResMut<Assets<Mesh>>,
    mut materials: ResMut<Assets<StandardMaterial>>,
    existing_visuals: Query<Entity, With<WorldVisual>>,
) {
    if scene_state.built_from.as_ref() == Some(&config.world) {
        return;
    }

    for entity in &existing_visuals {
        commands.entity(entity).despawn();
    }

    let geometry = WorldGeometry::from_config(&config.world);
    info!(
        "Built world geometry: {} obstacles, {} ramps.",
        geometry.obstacles.len(),
        geometry.ramps.len()
    );
    commands.insert_resource(geometry);

    spawn_world_visuals(&mut commands, &config.world, &mut meshes, &mut materials);
    scene_state.built_from = Some(config.world.clone());
}

fn unlit(materials: &mut Assets<StandardMaterial>, color: Color) -> Handle<StandardMaterial> {
    materials.add(StandardMaterial {
        base_color: color,
        unlit: true,
        ..default()
    })
}

fn spawn_world_visuals(
    commands: &mut Commands,
    world: &WorldConfig,
    meshes: &mut Assets<Mesh>,
    materials: &mut Assets<StandardMaterial>,
) {
    let ground_material = unlit(materials, GROUND_COLOR);
    let wall_material = unlit(materials, WALL_COLOR);
    let ramp_material = unlit(materials, RAMP_COLOR);
    let cone_material = unlit(materials, CONE_COLOR);

    commands.spawn((
        Name::new("Ground"),
        WorldVisual,
        Mesh3d(
            meshes.add(
                Plane3d::default()
                    .mesh()
                    .size(world.ground.size[0], world.ground.size[1]),
            ),
        ),
        MeshMaterial3d(ground_material),
        Transform::default(),
    ));

    for wall in &world.walls {
        commands.spawn((
            Name::new(format!("Wall {}", wall.id)),
            WorldVisual,
            Mesh3d(meshes.add(Cuboid::new(wall.size[0], wall.size[1], wall.size[2]))),
            MeshMaterial3d(wall_material.clone()),
            Transform::from_translation(Vec3::from_array(wall.center))
                .with_rotation(euler_degrees_to_quat(wall.rotation_degrees)),
        ));
    }

    for ramp_config in &world.ramps {
        let ramp = Ramp::from_config(ramp_config);
        let rail_layout = Ramp::side_wall_layout(ramp_config);

        commands
            .spawn((
                Name::new(format!("Ramp {}", ramp.id)),
                WorldVisual,
                Mesh3d(meshes.add(Cuboid::from_size(ramp.size))),
                MeshMaterial3d(ramp_material.clone()),
                Transform::from_translation(ramp.center).with_rotation(ramp.rotation),
            ))
            .with_children(|parent| {
                for (offset, size) in rail_layout {
                    parent.spawn((
                        Name::new("RampSideWall"),
                        Mesh3d(meshes.add(Cuboid::from_size(size))),
                        MeshMaterial3d(wall_material.clone()),
                        Transform::from_translation(offset),
                    ));
                }
            });
    }

    for cone in &world.cones {
        commands.spawn((
            Name::new(format!("Cone {}", cone.id)),
            WorldVisual,
            Mesh3d(meshes.add(Cone::new(cone.radius, cone.height))),
            MeshMaterial3d(cone_material.clone()),
            Transform::from_xyz(cone.x, cone.height * 0.5, cone.z),
        ));
    }
}

fn draw_course_path(config: Res<GameConfig>, mut gizmos: Gizmos) {
    gizmos.linestrip(
        config
            .world
            .path
            .points
            .iter()
            .map(|point| Vec3::from_array(*point)),
        PATH_COLOR,
    );
}
