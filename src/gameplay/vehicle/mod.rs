mod collision;
mod physics;
mod ramps;
mod replay;

pub use physics::{FrameInput, VehicleState};

use crate::config::{CameraConfig, GameConfig};
use crate::gameplay::world::WorldGeometry;
use crate::states::GameState;
use bevy::prelude::*;
use collision::Contact;
use physics::{FrameContext, Simulation};
use replay::{ReplayRecorder, REPLAY_DIR};
use std::path::Path;

const PLAYER_COLOR: Color = Color::srgb(1.0, 0.0, 0.0);

pub struct VehicleGameplayPlugin;

impl Plugin for VehicleGameplayPlugin {
    fn build(&self, app: &mut App) {
        app.init_resource::<FrameInput>()
            .init_resource::<VehicleInputBindings>()
            .init_resource::<VehicleTelemetry>()
            .init_resource::<ReplayRecorder>()
            .add_systems(OnEnter(GameState::InRun), spawn_player_vehicle)
            .add_systems(
                Update,
                (
                    read_vehicle_input,
                    reset_vehicle_hotkey,
                    drive_vehicle,
                    sync_vehicle_transform,
                    update_vehicle_telemetry,
                    camera_follow_vehicle,
                )
                    .chain()
                    .run_if(in_state(GameState::InRun))
                    .run_if(resource_exists::<GameConfig>)
                    .run_if(resource_exists::<WorldGeometry>),
            )
            .add_systems(
                Update,
                (save_replay_hotkey, verify_replay_hotkey)
                    .run_if(resource_exists::<GameConfig>)
                    .run_if(resource_exists::<WorldGeometry>),
            );
    }
}

#[derive(Component)]
pub struct PlayerVehicle;

#[derive(Component, Debug, Clone, Copy, Default)]
pub struct VehicleContact {
    pub obstacle: Option<Contact>,
    pub new_obstacle: bool,
    pub ramp_index: Option<usize>,
    pub sanitized: bool,
}

#[derive(Resource, Debug, Clone)]
struct VehicleInputBindings {
    accelerate: Vec<KeyCode>,
    brake: Vec<KeyCode>,
    steer_left: Vec<KeyCode>,
    steer_right: Vec<KeyCode>,
    jump: Vec<KeyCode>,
    reset: Vec<KeyCode>,
}

impl Default for VehicleInputBindings {
    fn default() -> Self {
        Self {
            accelerate: vec![KeyCode::ArrowUp, KeyCode::KeyW],
            brake: vec![KeyCode::ArrowDown, KeyCode::KeyS],
            steer_left: vec![KeyCode::ArrowLeft, KeyCode::KeyA],
            steer_right: vec![KeyCode::ArrowRight, KeyCode::KeyD],
            jump: vec![KeyCode::Space],
            reset: vec![KeyCode::KeyR],
        }
    }
}

#[derive(Resource, Debug, Clone, Default)]
pub struct VehicleTelemetry {
    pub position: Vec3,
    pub yaw_degrees: f32,
    pub speed: f32,
    pub horizontal_speed: f32,
    pub grounded: bool,
    pub ramp_id: Option<String>,
    pub contact_id: Option<String>,
    pub contact_count: u32,
    pub sanitized_count: u32,
}

fn spawn_player_vehicle(
    mut commands: Commands,
    mut meshes: ResMut<Assets<Mesh>>,
    mut materials: ResMut<Assets<StandardMaterial>>,
    config: Res<GameConfig>,
    mut recorder: ResMut<ReplayRecorder>,
    existing_player: Query<Entity, With<PlayerVehicle>>,
) {
    // Resuming from pause re-enters InRun with the vehicle still alive.
    if !existing_player.is_empty() {
        return;
    }

    let vehicle = VehicleState::spawn(&config.vehicle.vehicle);
    recorder.start(&vehicle, config.max_frame_dt(), config.reference_dt());

    commands.spawn((
        Name::new("PlayerVehicle"),
        PlayerVehicle,
        vehicle,
        VehicleContact::default(),
        Mesh3d(meshes.add(Cuboid::from_size(vehicle.half_extents * 2.0))),
        MeshMaterial3d(materials.add(StandardMaterial {
            base_color: PLAYER_COLOR,
            unlit: true,
            ..default()
        })),
        Transform::from_translation(vehicle.position).with_rotation(vehicle.rotation()),
    ));
    info!("Spawned player vehicle at {:?}.", vehicle.position);
}

fn read_vehicle_input(
    keyboard: Res<ButtonInput<KeyCode>>,
    bindings: Res<VehicleInputBindings>,
    mut input: ResMut<FrameInput>,
) {
    let held = |keys: &[KeyCode]| keys.iter().any(|key| keyboard.pressed(*key));

    input.accelerate = held(&bindings.accelerate);
    input.brake = held(&bindings.brake);
    input.steer_left = held(&bindings.steer_left);
    input.steer_right = held(&bindings.steer_right);
    input.jump = held(&bindings.jump);
}

fn reset_vehicle_hotkey(
    keyboard: Res<ButtonInput<KeyCode>>,
    bindings: Res<VehicleInputBindings>,
    config: Res<GameConfig>,
    mut recorder: ResMut<ReplayRecorder>,
    mut telemetry: ResMut<VehicleTelemetry>,
    mut player_query: Query<(&mut VehicleState, &mut VehicleContact), With<PlayerVehicle>>,
) {
    if !keyboard.any_just_pressed(bindings.reset.iter().copied()) {
        return;
    }
    let Ok((mut vehicle, mut contact)) = player_query.single_mut() else {
        return;
    };

    *vehicle = VehicleState::spawn(&config.vehicle.vehicle);
    *contact = VehicleContact::default();
    *telemetry = VehicleTelemetry::default();
    recorder.start(&vehicle, config.max_frame_dt(), config.reference_dt());
    info!("Vehicle reset to spawn.");
}

fn drive_vehicle(
    time: Res<Time>,
    config: Res<GameConfig>,
    world: Res<WorldGeometry>,
    input: Res<FrameInput>,
    mut recorder: ResMut<ReplayRecorder>,
    mut player_query: Query<(&mut VehicleState, &mut VehicleContact), With<PlayerVehicle>>,
) {
    let Ok((mut vehicle, mut contact)) = player_query.single_mut() else {
        return;
    };

    let raw_dt = time.delta_secs();
    let frame = FrameContext::new(
        raw_dt,
        config.max_frame_dt(),
        config.reference_dt(),
        *input,
    );
    let simulation = Simulation::new(&config.vehicle.physics, &world);
    let outcome = simulation.step(*vehicle, &frame);
    recorder.record(raw_dt, *input);

    if outcome.sanitized {
        warn!(
            "Vehicle state went non-finite (dt {raw_dt:.4}s); repaired to position {:?}.",
            outcome.vehicle.position
        );
    }

    let previous_obstacle = contact.obstacle.map(|hit| hit.obstacle_index);
    let new_obstacle = outcome
        .contact
        .is_some_and(|hit| previous_obstacle != Some(hit.obstacle_index));
    if let Some(hit) = outcome.contact.filter(|_| new_obstacle) {
        if let Some(obstacle) = world.obstacles.get(hit.obstacle_index) {
            debug!(
                "Vehicle hit {:?} `{}` (mtv {:?}).",
                obstacle.kind, obstacle.id, hit.mtv
            );
        }
    }
    if outcome.ramp_snapped {
        if let Some(ramp) = outcome.ramp_index.and_then(|index| world.ramps.get(index)) {
            debug!("Vehicle snapped onto ramp `{}`.", ramp.id);
        }
    }

    *vehicle = outcome.vehicle;
    *contact = VehicleContact {
        obstacle: outcome.contact,
        new_obstacle,
        ramp_index: outcome.ramp_index,
        sanitized: outcome.sanitized,
    };
}

fn sync_vehicle_transform(
    mut player_query: Query<(&VehicleState, &mut Transform), With<PlayerVehicle>>,
) {
    for (vehicle, mut transform) in &mut player_query {
        transform.translation = vehicle.position;
        transform.rotation = vehicle.rotation();
    }
}

fn update_vehicle_telemetry(
    config: Res<GameConfig>,
    world: Res<WorldGeometry>,
    mut telemetry: ResMut<VehicleTelemetry>,
    player_query: Query<(&VehicleState, &VehicleContact), With<PlayerVehicle>>,
) {
    let Ok((vehicle, contact)) = player_query.single() else {
        return;
    };

    if let Some(obstacle) = contact
        .obstacle
        .and_then(|hit| world.obstacles.get(hit.obstacle_index))
    {
        telemetry.contact_id = Some(obstacle.id.clone());
    }
    if contact.new_obstacle {
        telemetry.contact_count += 1;
    }
    if contact.sanitized {
        telemetry.sanitized_count += 1;
    }

    telemetry.position = vehicle.position;
    telemetry.yaw_degrees = vehicle.yaw.to_degrees();
    telemetry.speed = vehicle.velocity.length();
    telemetry.horizontal_speed = vehicle.horizontal_speed();
    telemetry.ramp_id = contact
        .ramp_index
        .and_then(|index| world.ramps.get(index))
        .map(|ramp| ramp.id.clone());
    telemetry.grounded = telemetry.ramp_id.is_some()
        || physics::is_near_ground(vehicle, &config.vehicle.physics);
}

fn camera_follow_vehicle(
    config: Res<GameConfig>,
    player_query: Query<&Transform, With<PlayerVehicle>>,
    mut camera_query: Query<&mut Transform, (With<Camera3d>, Without<PlayerVehicle>)>,
) {
    let Ok(player_transform) = player_query.single() else {
        return;
    };
    let Ok(mut camera_transform) = camera_query.single_mut() else {
        return;
    };

    camera_transform.translation = follow_camera_position(
        camera_transform.translation,
        player_transform.translation,
        &config.game.camera,
    );
    camera_transform.look_at(player_transform.translation, Vec3::Y);
}

fn follow_camera_position(current: Vec3, target: Vec3, camera: &CameraConfig) -> Vec3 {
    current.lerp(target + Vec3::from_array(camera.offset), camera.smoothing)
}

fn save_replay_hotkey(keyboard: Res<ButtonInput<KeyCode>>, recorder: Res<ReplayRecorder>) {
    if !keyboard.just_pressed(KeyCode::F9) {
        return;
    }

    let Some(log) = recorder.log() else {
        warn!("Replay save requested, but nothing has been recorded yet.");
        return;
    };
    if recorder.dropped_frames() > 0 {
        warn!(
            "Replay is truncated: {} frames past the recording cap were dropped.",
            recorder.dropped_frames()
        );
    }

    match log.save(Path::new(REPLAY_DIR)) {
        Ok(path) => info!(
            "Saved replay with {} frames to `{}`.",
            log.frames.len(),
            path.display()
        ),
        Err(error) => error!("Replay save failed: {error}"),
    }
}

fn verify_replay_hotkey(
    keyboard: Res<ButtonInput<KeyCode>>,
    config: Res<GameConfig>,
    world: Res<WorldGeometry>,
    recorder: Res<ReplayRecorder>,
    player_query: Query<&VehicleState, With<PlayerVehicle>>,
) {
    if !keyboard.just_pressed(KeyCode::F10) {
        return;
    }

    let (Some(log), Ok(live)) = (recorder.log(), player_query.single()) else {
        warn!("Replay check requested, but there is no active recording.");
        return;
    };

    let simulation = Simulation::new(&config.vehicle.physics, &world);
    let replayed = log
        .run(&simulation)
        .last()
        .copied()
        .unwrap_or_else(|| log.spawn.vehicle());
    if replayed == *live {
        info!(
            "Replay check passed: {} frames reproduce the live state.",
            log.frames.len()
        );
    } else {
        warn!(
            "Replay check diverged after {} frames: replayed {:?}, live {:?}.",
            log.frames.len(),
            replayed.position,
            live.position
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::test_config;

    #[test]
    fn camera_closes_fixed_fraction_of_gap_each_frame() {
        let camera = CameraConfig::default();
        let target = Vec3::new(4.0, 0.5, -6.0);
        let goal = target + Vec3::from_array(camera.offset);

        let next = follow_camera_position(Vec3::ZERO, target, &camera);

        assert!(next.abs_diff_eq(goal * camera.smoothing, 1e-5));
    }

    #[test]
    fn camera_settles_on_offset_for_a_parked_target() {
        let camera = CameraConfig::default();
        let target = Vec3::new(0.0, 0.5, 5.0);
        let mut position = Vec3::new(30.0, 2.0, -10.0);

        for _ in 0..1_000 {
            position = follow_camera_position(position, target, &camera);
        }

        assert!(position.abs_diff_eq(Vec3::new(0.0, 10.5, 25.0), 1e-3));
    }

    #[test]
    fn default_bindings_cover_arrows_and_wasd() {
        let bindings = VehicleInputBindings::default();

        assert!(bindings.accelerate.contains(&KeyCode::ArrowUp));
        assert!(bindings.accelerate.contains(&KeyCode::KeyW));
        assert!(bindings.steer_left.contains(&KeyCode::KeyA));
        assert_eq!(bindings.jump, vec![KeyCode::Space]);
    }

    #[test]
    fn configured_spawn_rests_on_the_ground() {
        let config = test_config();
        let vehicle = VehicleState::spawn(&config.vehicle.vehicle);

        assert_eq!(vehicle.position, Vec3::new(0.0, 0.5, 5.0));
        assert_eq!(vehicle.position.y, vehicle.resting_height());
        assert_eq!(vehicle.velocity, Vec3::ZERO);
    }
}
