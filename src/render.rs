//! Rendering collaborator
//!
//! The session never draws anything itself. It emits [`RenderCommand`]s and
//! the runtime hands them to whatever [`Renderer`] the front end provides.

use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, info};

use crate::game::state::{Building, PeerId};
use crate::game::weapons::WeaponKind;
use crate::net::protocol::PlayerSnapshot;
use crate::util::vec3::Vec3;

/// Visual one-shots
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum EffectKind {
    /// Bullet trail drawn with the weapon's color and width
    Trail { weapon: WeaponKind },
    /// Local player was eliminated
    Elimination,
    Hit,
}

#[derive(Debug, Clone, PartialEq)]
pub enum RenderCommand {
    SpawnEntity(PlayerSnapshot),
    RemoveEntity(PeerId),
    UpdateTransform {
        id: PeerId,
        position: Vec3,
        rotation: f32,
    },
    PlayEffect {
        kind: EffectKind,
        origin: Vec3,
        direction: Vec3,
    },
    ShowEndScreen(String),
    PlaceStructure(Building),
}

pub trait Renderer: Send {
    fn spawn_entity(&mut self, player: &PlayerSnapshot);

    fn remove_entity(&mut self, id: &str);

    fn update_entity_transform(&mut self, id: &str, position: Vec3, rotation: f32);

    fn play_effect(&mut self, kind: EffectKind, origin: Vec3, direction: Vec3);

    fn show_end_screen(&mut self, message: &str);

    fn place_structure(&mut self, building: &Building) {
        debug!("Structure {} ({:?}) at {:?}", building.id, building.kind, building.position);
    }
}

/// Dispatch one command
pub fn apply<R: Renderer + ?Sized>(renderer: &mut R, command: &RenderCommand) {
    match command {
        RenderCommand::SpawnEntity(player) => renderer.spawn_entity(player),
        RenderCommand::RemoveEntity(id) => renderer.remove_entity(id),
        RenderCommand::UpdateTransform {
            id,
            position,
            rotation,
        } => renderer.update_entity_transform(id, *position, *rotation),
        RenderCommand::PlayEffect {
            kind,
            origin,
            direction,
        } => renderer.play_effect(*kind, *origin, *direction),
        RenderCommand::ShowEndScreen(message) => renderer.show_end_screen(message),
        RenderCommand::PlaceStructure(building) => renderer.place_structure(building),
    }
}

/// Headless renderer that logs what a screen would show
#[derive(Debug, Default)]
pub struct TracingRenderer;

impl Renderer for TracingRenderer {
    fn spawn_entity(&mut self, player: &PlayerSnapshot) {
        info!(
            "Spawn {} ({}){} at ({:.1}, {:.1})",
            player.name,
            player.id,
            if player.is_bot { " [bot]" } else { "" },
            player.position.x,
            player.position.z
        );
    }

    fn remove_entity(&mut self, id: &str) {
        info!("Remove {}", id);
    }

    fn update_entity_transform(&mut self, _id: &str, _position: Vec3, _rotation: f32) {}

    fn play_effect(&mut self, kind: EffectKind, origin: Vec3, _direction: Vec3) {
        match kind {
            EffectKind::Trail { .. } => {}
            EffectKind::Elimination => info!("You were eliminated at ({:.1}, {:.1})", origin.x, origin.z),
            EffectKind::Hit => debug!("Hit at {:?}", origin),
        }
    }

    fn show_end_screen(&mut self, message: &str) {
        info!("=== {} ===", message);
    }
}

/// Keeps every command; clones share the same log
#[derive(Debug, Clone, Default)]
pub struct RecordingRenderer {
    commands: Arc<Mutex<Vec<RenderCommand>>>,
}

impl RecordingRenderer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn commands(&self) -> Vec<RenderCommand> {
        self.commands.lock().clone()
    }

    pub fn end_screens(&self) -> Vec<String> {
        self.commands
            .lock()
            .iter()
            .filter_map(|c| match c {
                RenderCommand::ShowEndScreen(message) => Some(message.clone()),
                _ => None,
            })
            .collect()
    }

    fn push(&self, command: RenderCommand) {
        self.commands.lock().push(command);
    }
}

impl Renderer for RecordingRenderer {
    fn spawn_entity(&mut self, player: &PlayerSnapshot) {
        self.push(RenderCommand::SpawnEntity(player.clone()));
    }

    fn remove_entity(&mut self, id: &str) {
        self.push(RenderCommand::RemoveEntity(id.to_string()));
    }

    fn update_entity_transform(&mut self, id: &str, position: Vec3, rotation: f32) {
        self.push(RenderCommand::UpdateTransform {
            id: id.to_string(),
            position,
            rotation,
        });
    }

    fn play_effect(&mut self, kind: EffectKind, origin: Vec3, direction: Vec3) {
        self.push(RenderCommand::PlayEffect {
            kind,
            origin,
            direction,
        });
    }

    fn show_end_screen(&mut self, message: &str) {
        self.push(RenderCommand::ShowEndScreen(message.to_string()));
    }

    fn place_structure(&mut self, building: &Building) {
        self.push(RenderCommand::PlaceStructure(building.clone()));
    }
}
