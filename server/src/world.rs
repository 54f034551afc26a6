//! Registry of live maps and the players on them
//!
//! Holds exactly one [`Map`] per map definition and remembers which map each
//! player is on, so requests coming from the network can be routed by player
//! id alone. Moving a player between maps transfers ownership of the player
//! value from one map to the other.

use crate::content::{ContentRepository, MapId};
use crate::map::{Map, MoveOutcome};
use crate::npc::Npc;
use crate::player::Player;
use log::{debug, info, warn};
use rand::rngs::StdRng;
use rand::SeedableRng;
use shared::{Direction, MovementType};
use std::collections::{BTreeMap, HashMap};

/// How far `join` searches around the requested tile for a free one.
const JOIN_SEARCH_RADIUS: i32 = 8;

pub struct World<P: Player> {
    maps: BTreeMap<MapId, Map<P>>,
    locations: HashMap<u32, MapId>,
}

impl<P: Player> World<P> {
    /// Instantiates every map in `content` with its NPC spawns.
    ///
    /// Spawn slots run sequentially across the whole world starting at 1. With a
    /// seed, every map gets its own deterministic random stream.
    pub fn new(content: &ContentRepository, seed: Option<u64>) -> Self {
        let mut maps = BTreeMap::new();
        let mut next_slot = 1u32;

        for info in content.maps() {
            let mut npcs = Vec::with_capacity(info.spawns.len());
            for spawn in &info.spawns {
                let Some(npc_info) = content.npc(spawn.npc) else {
                    warn!("Map {} spawns unknown NPC {}", info.id, spawn.npc);
                    continue;
                };
                npcs.push(Npc::new(next_slot, npc_info.clone(), spawn.x, spawn.y));
                next_slot += 1;
            }

            let rng = match seed {
                Some(seed) => StdRng::seed_from_u64(seed.wrapping_add(u64::from(info.id))),
                None => StdRng::from_entropy(),
            };

            debug!("Loaded map {} ({}) with {} NPCs", info.id, info.name, npcs.len());
            maps.insert(info.id, Map::new(info.clone(), npcs, rng));
        }

        info!("World ready: {} maps, {} NPCs", maps.len(), next_slot - 1);

        Self {
            maps,
            locations: HashMap::new(),
        }
    }

    pub fn map(&self, id: MapId) -> Option<&Map<P>> {
        self.maps.get(&id)
    }

    pub fn map_mut(&mut self, id: MapId) -> Option<&mut Map<P>> {
        self.maps.get_mut(&id)
    }

    pub fn maps(&self) -> impl Iterator<Item = &Map<P>> {
        self.maps.values()
    }

    /// The map a player is currently on.
    pub fn location(&self, player_id: u32) -> Option<MapId> {
        self.locations.get(&player_id).copied()
    }

    pub fn player(&self, player_id: u32) -> Option<&P> {
        let map = self.maps.get(&self.location(player_id)?)?;
        map.player(player_id)
    }

    pub fn player_count(&self) -> usize {
        self.locations.len()
    }

    /// Places a player on `map_id`. If their tile is taken the nearest free
    /// tile is used. The player is handed back when the map is unknown, the id
    /// is already in the world, or the map has no room near the tile.
    pub fn join(&mut self, mut player: P, map_id: MapId) -> Result<(), P> {
        if self.locations.contains_key(&player.id()) {
            warn!("Player {} is already in the world", player.id());
            return Err(player);
        }
        let Some(map) = self.maps.get_mut(&map_id) else {
            warn!("Player {} tried to join unknown map {}", player.id(), map_id);
            return Err(player);
        };

        let (x, y) = player.character().position();
        let Some((x, y)) = nearest_open_tile(map, x, y) else {
            warn!("No free tile near ({}, {}) on map {}", x, y, map_id);
            return Err(player);
        };
        let character = player.character_mut();
        character.x = x;
        character.y = y;

        self.locations.insert(player.id(), map_id);
        map.add(player);
        Ok(())
    }

    /// Takes a player out of the world entirely.
    pub fn leave(&mut self, player_id: u32) -> Option<P> {
        let map_id = self.locations.remove(&player_id)?;
        self.maps.get_mut(&map_id)?.remove(player_id)
    }

    /// Moves a player to `(x, y)` on `map_id`. Refused when the destination
    /// is unknown or not passable.
    pub fn change_map(&mut self, player_id: u32, map_id: MapId, x: i32, y: i32) -> bool {
        let Some(from) = self.location(player_id) else {
            return false;
        };
        if !self
            .maps
            .get(&map_id)
            .is_some_and(|map| map.is_passable(x, y))
        {
            debug!(
                "Player {} cannot enter map {} at ({}, {})",
                player_id, map_id, x, y
            );
            return false;
        }

        let Some(mut player) = self.maps.get_mut(&from).and_then(|map| map.remove(player_id)) else {
            return false;
        };
        let character = player.character_mut();
        character.x = x;
        character.y = y;

        let Some(map) = self.maps.get_mut(&map_id) else {
            return false;
        };
        map.add(player);
        self.locations.insert(player_id, map_id);
        info!("Player {} moved from map {} to map {}", player_id, from, map_id);
        true
    }

    /// Routes a move to the player's map and follows a warp if the step
    /// landed on one.
    pub fn move_player(
        &mut self,
        player_id: u32,
        direction: Direction,
        movement_type: MovementType,
    ) -> MoveOutcome {
        let Some(map) = self.location(player_id).and_then(|id| self.maps.get_mut(&id)) else {
            return MoveOutcome::Rejected;
        };

        let outcome = map.move_player(player_id, direction, movement_type);
        if let MoveOutcome::Warp(warp) = outcome {
            if !self.change_map(player_id, warp.to_map, warp.to_x, warp.to_y) {
                debug!("Warp for player {} to map {} is blocked", player_id, warp.to_map);
                return MoveOutcome::Moved;
            }
        }
        outcome
    }

    pub fn attack(&mut self, player_id: u32) {
        if let Some(map) = self.location(player_id).and_then(|id| self.maps.get_mut(&id)) {
            map.attack(player_id);
        }
    }

    pub fn look_at(&mut self, player_id: u32, x: i32, y: i32) {
        if let Some(map) = self.location(player_id).and_then(|id| self.maps.get_mut(&id)) {
            map.look_at(player_id, x, y);
        }
    }

    /// Advances every map by `dt` seconds, one after another.
    pub fn update(&mut self, dt: f32) {
        for map in self.maps.values_mut() {
            map.update(dt);
        }
    }
}

/// Closest passable tile to `(x, y)` by Manhattan distance.
fn nearest_open_tile<P: Player>(map: &Map<P>, x: i32, y: i32) -> Option<(i32, i32)> {
    for radius in 0..=JOIN_SEARCH_RADIUS {
        for dx in -radius..=radius {
            let dy = radius - dx.abs();
            for (tx, ty) in [(x + dx, y + dy), (x + dx, y - dy)] {
                if map.is_passable(tx, ty) {
                    return Some((tx, ty));
                }
            }
        }
    }
    None
}
