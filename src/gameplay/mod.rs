pub mod vehicle;
pub mod world;

use bevy::prelude::*;
use vehicle::VehicleGameplayPlugin;
use world::WorldScenePlugin;

pub struct GameplayPlugin;

impl Plugin for GameplayPlugin {
    fn build(&self, app: &mut App) {
        app.add_plugins(WorldScenePlugin)
            .add_plugins(VehicleGameplayPlugin);
    }
}
