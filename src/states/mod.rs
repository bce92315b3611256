use crate::config::GameConfig;
use bevy::prelude::*;

const CAMERA_START: Vec3 = Vec3::new(0.0, 10.5, 25.0);
const CAMERA_START_LOOK_AT: Vec3 = Vec3::new(0.0, 0.5, 5.0);

#[derive(States, Debug, Clone, Copy, Eq, PartialEq, Hash, Default)]
pub enum GameState {
    #[default]
    Boot,
    InRun,
    Pause,
}

pub struct GameStatePlugin;

impl Plugin for GameStatePlugin {
    fn build(&self, app: &mut App) {
        app.add_systems(Startup, setup_camera)
            .add_systems(OnEnter(GameState::Boot), enter_boot)
            .add_systems(
                Update,
                boot_to_in_run
                    .run_if(in_state(GameState::Boot))
                    .run_if(resource_exists::<GameConfig>),
            )
            .add_systems(OnEnter(GameState::InRun), enter_in_run)
            .add_systems(
                Update,
                in_run_controls.run_if(in_state(GameState::InRun)),
            )
            .add_systems(OnEnter(GameState::Pause), enter_pause)
            .add_systems(Update, pause_controls.run_if(in_state(GameState::Pause)));
    }
}

fn setup_camera(mut commands: Commands) {
    commands.spawn((
        Name::new("FollowCamera"),
        Camera3d::default(),
        Transform::from_translation(CAMERA_START).looking_at(CAMERA_START_LOOK_AT, Vec3::Y),
    ));
}

fn enter_boot() {
    info!("Entered state: Boot");
}

fn boot_to_in_run(mut next_state: ResMut<NextState<GameState>>) {
    next_state.set(GameState::InRun);
}

fn enter_in_run() {
    info!("Entered state: InRun");
}

fn in_run_controls(
    keyboard: Res<ButtonInput<KeyCode>>,
    mut next_state: ResMut<NextState<GameState>>,
) {
    if keyboard.just_pressed(KeyCode::Escape) {
        next_state.set(GameState::Pause);
    }
}

fn enter_pause() {
    info!("Entered state: Pause");
}

fn pause_controls(
    keyboard: Res<ButtonInput<KeyCode>>,
    mut next_state: ResMut<NextState<GameState>>,
) {
    if keyboard.just_pressed(KeyCode::Escape) {
        next_state.set(GameState::InRun);
    }
}
