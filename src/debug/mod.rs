use crate::config::{GameConfig, VehiclePhysics, CONFIG_DIR};
use crate::gameplay::vehicle::{FrameInput, VehicleTelemetry};
use crate::states::GameState;
use bevy::diagnostic::{DiagnosticsStore, FrameTimeDiagnosticsPlugin};
use bevy::prelude::*;
use bevy_egui::{egui, EguiContexts, EguiPrimaryContextPass};
use std::fs;
use std::path::Path;

pub struct DebugOverlayPlugin;

impl Plugin for DebugOverlayPlugin {
    fn build(&self, app: &mut App) {
        app.init_resource::<KeybindOverlayState>()
            .init_resource::<PhysicsTuningPanelState>()
            .add_systems(Update, spawn_debug_overlay)
            .add_systems(Update, toggle_keybind_overlay)
            .add_systems(Update, toggle_physics_tuning_panel)
            .add_systems(Update, sync_keybind_overlay_visibility)
            .add_systems(
                Update,
                update_debug_overlay_text
                    .run_if(in_state(GameState::InRun))
                    .run_if(resource_exists::<GameConfig>),
            )
            .add_systems(
                EguiPrimaryContextPass,
                physics_tuning_panel_ui
                    .run_if(in_state(GameState::InRun))
                    .run_if(resource_exists::<GameConfig>),
            );
    }
}

#[derive(Component)]
struct DebugOverlayText;

#[derive(Component)]
struct KeybindOverlayText;

#[derive(Resource, Debug, Clone, Default)]
struct KeybindOverlayState {
    visible: bool,
}

#[derive(Resource, Debug, Default)]
struct PhysicsTuningPanelState {
    visible: bool,
    params: Option<VehiclePhysics>,
    status: String,
}

fn spawn_debug_overlay(
    mut commands: Commands,
    keybind_overlay: Res<KeybindOverlayState>,
    config: Option<Res<GameConfig>>,
    existing_overlay: Query<Entity, With<DebugOverlayText>>,
) {
    if !existing_overlay.is_empty() {
        return;
    }

    let Some(config) = config else {
        return;
    };

    if !config.game.app.debug_overlay {
        return;
    }

    commands.spawn((
        DebugOverlayText,
        Text::new("debug overlay initializing..."),
        TextFont {
            font_size: 16.0,
            ..default()
        },
        TextColor(Color::srgb(0.92, 0.95, 0.97)),
        Node {
            position_type: PositionType::Absolute,
            left: Val::Px(12.0),
            top: Val::Px(12.0),
            ..default()
        },
        ZIndex(100),
    ));

    commands.spawn((
        KeybindOverlayText,
        Text::new(keybind_overlay_text()),
        TextFont {
            font_size: 15.0,
            ..default()
        },
        TextColor(Color::srgb(0.90, 0.94, 0.97)),
        BackgroundColor(Color::srgba(0.06, 0.08, 0.10, 0.82)),
        BorderColor::all(Color::srgba(0.60, 0.68, 0.74, 0.9)),
        Node {
            position_type: PositionType::Absolute,
            left: Val::Px(12.0),
            top: Val::Px(200.0),
            padding: UiRect::axes(Val::Px(10.0), Val::Px(8.0)),
            border: UiRect::all(Val::Px(1.0)),
            ..default()
        },
        if keybind_overlay.visible {
            Visibility::Inherited
        } else {
            Visibility::Hidden
        },
        ZIndex(100),
    ));
}

fn update_debug_overlay_text(
    diagnostics: Res<DiagnosticsStore>,
    telemetry: Res<VehicleTelemetry>,
    input: Option<Res<FrameInput>>,
    mut overlay_query: Query<&mut Text, With<DebugOverlayText>>,
) {
    let Ok(mut text) = overlay_query.single_mut() else {
        return;
    };

    let fps = diagnostics
        .get(&FrameTimeDiagnosticsPlugin::FPS)
        .and_then(|value| value.smoothed())
        .unwrap_or(0.0);
    let input = input.map(|input| *input).unwrap_or_default();

    *text = Text::new(overlay_text(fps, &telemetry, &input));
}

fn overlay_text(fps: f64, telemetry: &VehicleTelemetry, input: &FrameInput) -> String {
    let flag = |on: bool| if on { "yes" } else { "no" };
    let position = telemetry.position;

    format!(
        "FPS: {fps:>5.1}\n\
Position: ({x:>6.2}, {y:>5.2}, {z:>6.2}) | Yaw: {yaw:>6.1} deg\n\
Speed: {speed:>5.3} (horizontal {horizontal:>5.3}) per frame\n\
Grounded: {grounded} | Ramp: {ramp}\n\
Last Contact: {contact} | Contacts: {contacts} | Repairs: {repairs}\n\
Input: accel={accel} brake={brake} left={left} right={right} jump={jump}\n\
Hotkeys: H help | V physics tune | F5 reload config | F9 save replay | F10 check replay",
        x = position.x,
        y = position.y,
        z = position.z,
        yaw = telemetry.yaw_degrees,
        speed = telemetry.speed,
        horizontal = telemetry.horizontal_speed,
        grounded = flag(telemetry.grounded),
        ramp = telemetry.ramp_id.as_deref().unwrap_or("none"),
        contact = telemetry.contact_id.as_deref().unwrap_or("none"),
        contacts = telemetry.contact_count,
        repairs = telemetry.sanitized_count,
        accel = flag(input.accelerate),
        brake = flag(input.brake),
        left = flag(input.steer_left),
        right = flag(input.steer_right),
        jump = flag(input.jump),
    )
}

fn toggle_keybind_overlay(
    keyboard: Res<ButtonInput<KeyCode>>,
    mut state: ResMut<KeybindOverlayState>,
    config: Option<Res<GameConfig>>,
) {
    let Some(config) = config else {
        return;
    };

    if !config.game.app.debug_overlay {
        return;
    }

    if keyboard.just_pressed(KeyCode::KeyH) {
        state.visible = !state.visible;
        info!(
            "Debug keybind panel {}.",
            if state.visible { "shown" } else { "hidden" }
        );
    }
}

fn sync_keybind_overlay_visibility(
    state: Res<KeybindOverlayState>,
    mut query: Query<&mut Visibility, With<KeybindOverlayText>>,
) {
    if !state.is_changed() {
        return;
    }

    let next_visibility = if state.visible {
        Visibility::Inherited
    } else {
        Visibility::Hidden
    };

    for mut visibility in &mut query {
        *visibility = next_visibility;
    }
}

fn toggle_physics_tuning_panel(
    keyboard: Res<ButtonInput<KeyCode>>,
    mut panel_state: ResMut<PhysicsTuningPanelState>,
    config: Option<Res<GameConfig>>,
) {
    if !keyboard.just_pressed(KeyCode::KeyV) {
        return;
    }

    panel_state.visible = !panel_state.visible;
    if panel_state.visible {
        if let Some(config) = config {
            panel_state.params = Some(config.vehicle.physics.clone());
        }
        info!("Physics tuning panel shown.");
    } else {
        info!("Physics tuning panel hidden.");
    }
}

fn physics_tuning_panel_ui(
    mut egui_contexts: EguiContexts,
    mut panel_state: ResMut<PhysicsTuningPanelState>,
    mut config: ResMut<GameConfig>,
) {
    if !panel_state.visible {
        return;
    }

    let mut params = panel_state
        .params
        .clone()
        .unwrap_or_else(|| config.vehicle.physics.clone());

    let mut window_open = panel_state.visible;
    let mut params_changed = false;
    let mut reload_clicked = false;
    let mut apply_clicked = false;
    let status = panel_state.status.clone();

    let Ok(ctx) = egui_contexts.ctx_mut() else {
        return;
    };
    egui::Window::new("Vehicle Physics Tuning")
        .open(&mut window_open)
        .resizable(true)
        .default_width(520.0)
        .show(ctx, |ui| {
            ui.label("Rates, drag and gravity are per reference frame.");
            ui.separator();

            ui.collapsing("Drive", |ui| {
                params_changed |=
                    tuning_slider_row(ui, "max_speed", &mut params.max_speed, 0.1..=5.0, 0.01);
                params_changed |= tuning_slider_row(
                    ui,
                    "acceleration_rate",
                    &mut params.acceleration_rate,
                    0.001..=0.2,
                    0.001,
                );
                params_changed |= tuning_slider_row(
                    ui,
                    "braking_rate",
                    &mut params.braking_rate,
                    0.001..=0.2,
                    0.001,
                );
                params_changed |=
                    tuning_slider_row(ui, "turn_rate", &mut params.turn_rate, 0.0..=0.2, 0.001);
                params_changed |= tuning_slider_row(
                    ui,
                    "steer_speed_threshold",
                    &mut params.steer_speed_threshold,
                    0.0..=0.5,
                    0.001,
                );
                params_changed |=
                    tuning_slider_row(ui, "air_drag", &mut params.air_drag, 0.9..=1.0, 0.0005);
            });

            ui.collapsing("Vertical", |ui| {
                params_changed |=
                    tuning_slider_row(ui, "gravity", &mut params.gravity, -0.1..=0.0, 0.0005);
                params_changed |=
                    tuning_slider_row(ui, "jump_force", &mut params.jump_force, 0.0..=1.0, 0.005);
                params_changed |= tuning_slider_row(
                    ui,
                    "jump_ground_tolerance",
                    &mut params.jump_ground_tolerance,
                    0.0..=0.5,
                    0.001,
                );
            });

            ui.collapsing("Contacts + Ramps", |ui| {
                params_changed |= tuning_slider_row(
                    ui,
                    "restitution",
                    &mut params.restitution,
                    0.0..=1.0,
                    0.01,
                );
                params_changed |= tuning_slider_row(
                    ui,
                    "ramp_blend",
                    &mut params.ramp_blend,
                    0.01..=1.0,
                    0.01,
                );
                params_changed |= tuning_slider_row(
                    ui,
                    "ramp_snap_epsilon",
                    &mut params.ramp_snap_epsilon,
                    0.0..=0.1,
                    0.0005,
                );
                params_changed |= tuning_slider_row(
                    ui,
                    "footprint_height",
                    &mut params.footprint_height,
                    0.01..=1.0,
                    0.005,
                );
            });

            ui.separator();
            ui.horizontal(|ui| {
                if ui.button("Reload From Config").clicked() {
                    reload_clicked = true;
                }
                if ui.button("Apply To vehicle.toml").clicked() {
                    apply_clicked = true;
                }
            });

            if !status.is_empty() {
                ui.separator();
                ui.label(status);
            }
        });

    panel_state.visible = window_open;

    if reload_clicked {
        panel_state.params = Some(config.vehicle.physics.clone());
        panel_state.status = "Reloaded values from current config.".to_string();
        return;
    }

    panel_state.params = Some(params.clone());

    if params_changed {
        panel_state.status = match apply_physics_to_runtime_config(&mut config, &params) {
            Ok(()) => "Live-tuning active (in-memory config updated).".to_string(),
            Err(error) => error,
        };
    }

    if apply_clicked {
        match persist_physics_tuning_and_reload(&mut config, &params) {
            Ok(message) => {
                panel_state.status = message;
                panel_state.params = Some(config.vehicle.physics.clone());
            }
            Err(error) => panel_state.status = error,
        }
    }
}

fn tuning_slider_row(
    ui: &mut egui::Ui,
    label: &str,
    value: &mut f32,
    slider_range: std::ops::RangeInclusive<f32>,
    drag_speed: f32,
) -> bool {
    let mut changed = false;
    ui.horizontal(|ui| {
        ui.label(label);
        changed |= ui
            .add(egui::Slider::new(value, slider_range).show_value(false))
            .changed();
        changed |= ui
            .add(egui::DragValue::new(value).speed(drag_speed as f64))
            .changed();
    });
    changed
}

fn apply_physics_to_runtime_config(
    config: &mut GameConfig,
    params: &VehiclePhysics,
) -> Result<(), String> {
    let mut candidate = config.clone();
    candidate.vehicle.physics = params.clone();
    candidate
        .validate()
        .map_err(|error| format!("Tuning rejected: {error}"))?;

    *config = candidate;
    Ok(())
}

fn persist_physics_tuning_and_reload(
    config: &mut GameConfig,
    params: &VehiclePhysics,
) -> Result<String, String> {
    let config_dir = Path::new(CONFIG_DIR);
    let path = config_dir.join("vehicle.toml");
    let previous_raw = fs::read_to_string(&path)
        .map_err(|error| format!("Failed reading `{}`: {error}", path.display()))?;
    let mut root: toml::Value = toml::from_str(&previous_raw)
        .map_err(|error| format!("Failed parsing `{}`: {error}", path.display()))?;

    write_physics_to_toml_value(&mut root, params)?;

    let updated_raw = toml::to_string_pretty(&root)
        .map_err(|error| format!("Failed serializing vehicle TOML: {error}"))?;
    fs::write(&path, updated_raw)
        .map_err(|error| format!("Failed writing `{}`: {error}", path.display()))?;

    match GameConfig::load_from_dir(config_dir) {
        Ok(new_config) => {
            *config = new_config;
            info!("Persisted physics tuning to `{}`.", path.display());
            Ok(format!("Applied tuning and saved to {}.", path.display()))
        }
        Err(error) => {
            if let Err(restore_error) = fs::write(&path, previous_raw) {
                error!(
                    "Failed restoring `{}` after rejected tuning: {restore_error}",
                    path.display()
                );
            }
            if let Ok(restored) = GameConfig::load_from_dir(config_dir) {
                *config = restored;
            }
            Err(format!(
                "Apply failed validation: {error}. Reverted `{}`.",
                path.display()
            ))
        }
    }
}

fn write_physics_to_toml_value(
    root: &mut toml::Value,
    params: &VehiclePhysics,
) -> Result<(), String> {
    let Some(root_table) = root.as_table_mut() else {
        return Err("vehicle.toml root is not a table".to_string());
    };
    let physics_table = root_table
        .entry("physics")
        .or_insert(toml::Value::Table(toml::map::Map::new()));
    let Some(physics_table) = physics_table.as_table_mut() else {
        return Err("vehicle.toml `physics` is not a table".to_string());
    };

    let fields = [
        ("max_speed", params.max_speed),
        ("acceleration_rate", params.acceleration_rate),
        ("braking_rate", params.braking_rate),
        ("turn_rate", params.turn_rate),
        ("steer_speed_threshold", params.steer_speed_threshold),
        ("air_drag", params.air_drag),
        ("gravity", params.gravity),
        ("restitution", params.restitution),
        ("jump_force", params.jump_force),
        ("jump_ground_tolerance", params.jump_ground_tolerance),
        ("ramp_snap_epsilon", params.ramp_snap_epsilon),
        ("ramp_blend", params.ramp_blend),
        ("footprint_height", params.footprint_height),
    ];
    for (key, value) in fields {
        set_toml_float(physics_table, key, value)?;
    }

    Ok(())
}

fn set_toml_float(
    table: &mut toml::map::Map<String, toml::Value>,
    key: &str,
    value: f32,
) -> Result<(), String> {
    if !value.is_finite() {
        return Err(format!("`{key}` is not a finite number"));
    }

    table.insert(key.to_string(), toml::Value::Float(value as f64));
    Ok(())
}

fn keybind_overlay_text() -> &'static str {
    "Keybinds\n\
H - Toggle this panel\n\
V - Toggle physics tuning panel\n\
F5 - Hot-reload config\n\
F9 - Save replay\n\
F10 - Check replay against live state\n\
W / Up - Accelerate\n\
S / Down - Brake / reverse\n\
A / Left - Steer left\n\
D / Right - Steer right\n\
Space - Jump\n\
R - Reset vehicle\n\
Esc - Pause / resume"
}
