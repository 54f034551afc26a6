//! One live map: the players and NPCs on it and the rules between them
//!
//! The map exclusively owns its players and NPCs. NPC logic that needs to see
//! the rest of the map gets a [`MapContext`], a borrow of everything on the map
//! except the NPC being updated. All occupancy decisions go through
//! `is_passable`, on the map or on the context.

use crate::combat::Matchup;
use crate::content::{ItemId, MapId, MapInfo, Warp};
use crate::npc::Npc;
use crate::pathfinding::Pathfinder;
use crate::player::{encode_frame, Player, Target};
use log::{debug, info, warn};
use rand::rngs::StdRng;
use shared::{ChatColor, Direction, MovementType, Packet};
use std::sync::Arc;

/// Loot lying on a tile.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GroundItem {
    pub item_id: ItemId,
    pub quantity: i32,
    pub x: i32,
    pub y: i32,
}

impl GroundItem {
    pub fn position(&self) -> (i32, i32) {
        (self.x, self.y)
    }

    fn spawn_packet(&self) -> Packet {
        Packet::SpawnItem {
            item_id: self.item_id,
            quantity: self.quantity,
            x: self.x,
            y: self.y,
        }
    }
}

/// Result of a player move request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MoveOutcome {
    /// The move was refused and the client told where the player really is.
    Rejected,
    Moved,
    /// The player stepped onto a warp tile.
    Warp(Warp),
}

/// Serializes `packet` once and hands the frame to every player matching `filter`.
fn broadcast<P, F>(players: &mut [P], packet: &Packet, mut filter: F)
where
    P: Player,
    F: FnMut(&P) -> bool,
{
    let Some(frame) = encode_frame(packet) else {
        return;
    };
    for player in players.iter_mut().filter(|p| filter(p)) {
        player.send_frame(&frame);
    }
}

/// Everything on a map except the NPC currently acting.
pub struct MapContext<'a, P: Player> {
    pub info: &'a MapInfo,
    pub pathfinder: &'a Pathfinder,
    pub players: &'a mut [P],
    pub rng: &'a mut StdRng,
    other_npcs: [&'a [Npc]; 2],
    items: &'a mut Vec<GroundItem>,
}

impl<'a, P: Player> MapContext<'a, P> {
    pub fn is_passable(&self, x: i32, y: i32) -> bool {
        if self.info.is_blocked(x, y) {
            return false;
        }
        if self.players.iter().any(|p| p.character().position() == (x, y)) {
            return false;
        }
        !self
            .other_npcs
            .iter()
            .any(|npcs| npcs.iter().any(|npc| npc.occupies(x, y)))
    }

    pub fn player_index(&self, id: u32) -> Option<usize> {
        self.players.iter().position(|p| p.id() == id)
    }

    pub fn player(&self, id: u32) -> Option<&P> {
        self.players.iter().find(|p| p.id() == id)
    }

    pub fn send(&mut self, packet: &Packet) {
        broadcast(self.players, packet, |_| true);
    }

    pub fn send_where<F: FnMut(&P) -> bool>(&mut self, packet: &Packet, filter: F) {
        broadcast(self.players, packet, filter);
    }

    /// Places loot on a tile and announces the tile's new total. A drop of an
    /// item already lying there stacks onto it.
    pub fn drop_item(&mut self, item_id: ItemId, quantity: i32, x: i32, y: i32) {
        debug!("Dropped {} x{} at ({}, {})", item_id, quantity, x, y);
        let existing = self
            .items
            .iter_mut()
            .find(|item| item.item_id == item_id && item.position() == (x, y));
        let packet = match existing {
            Some(item) => {
                item.quantity = item.quantity.saturating_add(quantity);
                item.spawn_packet()
            }
            None => {
                let item = GroundItem {
                    item_id,
                    quantity,
                    x,
                    y,
                };
                self.items.push(item);
                item.spawn_packet()
            }
        };
        self.send(&packet);
    }
}

pub struct Map<P: Player> {
    info: Arc<MapInfo>,
    pathfinder: Pathfinder,
    players: Vec<P>,
    npcs: Vec<Npc>,
    items: Vec<GroundItem>,
    rng: StdRng,
}

impl<P: Player> Map<P> {
    pub fn new(info: Arc<MapInfo>, npcs: Vec<Npc>, rng: StdRng) -> Self {
        for npc in &npcs {
            debug_assert!(
                !info.is_blocked(npc.x(), npc.y()),
                "NPC {} spawned on blocked tile ({}, {}) of map {}",
                npc.id(),
                npc.x(),
                npc.y(),
                info.id
            );
        }

        let pathfinder = Pathfinder::new(info.width, info.height);
        Self {
            info,
            pathfinder,
            players: Vec::new(),
            npcs,
            items: Vec::new(),
            rng,
        }
    }

    pub fn id(&self) -> MapId {
        self.info.id
    }

    pub fn name(&self) -> &str {
        &self.info.name
    }

    pub fn info(&self) -> &MapInfo {
        &self.info
    }

    pub fn players(&self) -> &[P] {
        &self.players
    }

    pub fn player(&self, id: u32) -> Option<&P> {
        self.players.iter().find(|p| p.id() == id)
    }

    pub fn player_mut(&mut self, id: u32) -> Option<&mut P> {
        self.players.iter_mut().find(|p| p.id() == id)
    }

    pub fn npcs(&self) -> &[Npc] {
        &self.npcs
    }

    pub fn items(&self) -> &[GroundItem] {
        &self.items
    }

    fn player_index(&self, id: u32) -> Option<usize> {
        self.players.iter().position(|p| p.id() == id)
    }

    fn alive_npc_at(&self, x: i32, y: i32) -> Option<usize> {
        self.npcs.iter().position(|npc| npc.occupies(x, y))
    }

    /// Runs `f` on one NPC with the rest of the map borrowed as its context.
    fn with_npc<R, F>(&mut self, index: usize, f: F) -> Option<R>
    where
        F: FnOnce(&mut Npc, &mut MapContext<'_, P>) -> R,
    {
        let (before, rest) = self.npcs.split_at_mut(index);
        let (npc, after) = rest.split_first_mut()?;
        let mut ctx = MapContext {
            info: &self.info,
            pathfinder: &self.pathfinder,
            players: &mut self.players,
            rng: &mut self.rng,
            other_npcs: [&*before, &*after],
            items: &mut self.items,
        };
        Some(f(npc, &mut ctx))
    }

    /// Advances every player, then every NPC. Maps nobody stands on are skipped.
    pub fn update(&mut self, dt: f32) {
        if self.players.is_empty() {
            return;
        }

        for player in &mut self.players {
            player.update(dt);
        }

        for index in 0..self.npcs.len() {
            self.with_npc(index, |npc, ctx| npc.update(dt, ctx));
        }
    }

    /// False for walls, tiles off the map, and tiles held by a player or a
    /// living NPC.
    pub fn is_passable(&self, x: i32, y: i32) -> bool {
        if self.info.is_blocked(x, y) {
            return false;
        }
        if self.players.iter().any(|p| p.character().position() == (x, y)) {
            return false;
        }
        !self.npcs.iter().any(|npc| npc.occupies(x, y))
    }

    /// Brings a player onto this map and synchronises both sides.
    pub fn add(&mut self, mut player: P) {
        if self.player_index(player.id()).is_some() {
            warn!("Player {} is already on map {}", player.id(), self.info.id);
            return;
        }

        player.send(&Packet::LoadMap {
            map_id: self.info.id,
        });
        for other in &self.players {
            player.send(&other.character().create_packet(other.id()));
        }
        for npc in self.npcs.iter().filter(|npc| npc.is_alive()) {
            player.send(&npc.create_packet());
        }
        for item in &self.items {
            player.send(&item.spawn_packet());
        }

        let arrival = player.character().create_packet(player.id());
        info!(
            "Player {} joined map {} ({})",
            player.id(),
            self.info.id,
            self.info.name
        );
        self.players.push(player);
        self.send(&arrival);
    }

    /// Takes a player off this map, handing ownership back to the caller.
    pub fn remove(&mut self, id: u32) -> Option<P> {
        let index = self.player_index(id)?;
        let player = self.players.remove(index);
        info!("Player {} left map {}", id, self.info.id);
        self.send(&Packet::DestroyActor { id });
        Some(player)
    }

    pub fn move_player(
        &mut self,
        id: u32,
        direction: Direction,
        movement_type: MovementType,
    ) -> MoveOutcome {
        let Some(index) = self.player_index(id) else {
            return MoveOutcome::Rejected;
        };

        let (x, y) = self.players[index].character().position();
        let (target_x, target_y) = direction.step(x, y);
        self.players[index].character_mut().direction = direction;

        if !self.is_passable(target_x, target_y) {
            debug!(
                "Player {} blocked moving {:?} from ({}, {})",
                id, direction, x, y
            );
            self.players[index].send(&Packet::SetActorPosition {
                id,
                direction,
                x,
                y,
            });
            return MoveOutcome::Rejected;
        }

        let character = self.players[index].character_mut();
        character.x = target_x;
        character.y = target_y;

        self.send_where(
            &Packet::ActorMove {
                id,
                direction,
                movement_type,
            },
            |p| p.id() != id,
        );

        match self.info.warp_at(target_x, target_y) {
            Some(warp) => MoveOutcome::Warp(*warp),
            None => MoveOutcome::Moved,
        }
    }

    pub fn attack(&mut self, id: u32) {
        let Some(attacker) = self.player_index(id) else {
            return;
        };

        self.send_where(&Packet::ActorAttack { id }, |p| p.id() != id);

        let character = self.players[attacker].character();
        let (x, y) = character.direction.step(character.x, character.y);
        let Some(target) = self.alive_npc_at(x, y) else {
            return;
        };

        self.with_npc(target, |npc, ctx| {
            if let Some(damage) = ctx.players[attacker].attack(npc) {
                npc.hurt(attacker, damage, ctx);
            }
        });
    }

    pub fn look_at(&mut self, id: u32, x: i32, y: i32) {
        if !self.info.in_bounds(x, y) {
            return;
        }
        let Some(viewer) = self.player_index(id) else {
            return;
        };

        let other = self
            .players
            .iter()
            .find(|p| p.id() != id && p.character().position() == (x, y))
            .map(|p| (p.id(), p.character().name.clone(), p.character().level));

        if let Some((other_id, name, level)) = other {
            let matchup = Matchup::classify(self.players[viewer].character().level, level);
            let player = &mut self.players[viewer];
            player.tell(&matchup.describe(&name), matchup.color());
            player.set_target(Target::Player(other_id));
            return;
        }

        if let Some(index) = self.alive_npc_at(x, y) {
            let npc = &self.npcs[index];
            let message = format!("You see a {}.", npc.info().name);
            let npc_id = npc.id();
            let player = &mut self.players[viewer];
            player.tell(&message, ChatColor::White);
            player.set_target(Target::Npc(npc_id));
        }
    }

    pub fn send(&mut self, packet: &Packet) {
        broadcast(&mut self.players, packet, |_| true);
    }

    pub fn send_where<F: FnMut(&P) -> bool>(&mut self, packet: &Packet, filter: F) {
        broadcast(&mut self.players, packet, filter);
    }
}
