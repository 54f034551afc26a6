//! Static world content loaded once at startup
//!
//! Map layouts, NPC definitions and the new-character template are read from a
//! JSON document, validated, and handed out as shared read-only handles. Nothing
//! in here changes after the server starts ticking.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;

pub type MapId = u32;
pub type NpcId = u32;
pub type ItemId = u32;

/// World shipped with the server binary, used when no content file is given.
const BUILTIN_WORLD: &str = include_str!("../content/world.json");

#[derive(Debug, Error)]
pub enum ContentError {
    #[error("failed to read content file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("malformed content document: {0}")]
    Json(#[from] serde_json::Error),
    #[error("map {map}: {reason}")]
    InvalidMap { map: MapId, reason: String },
    #[error("npc {npc}: {reason}")]
    InvalidNpc { npc: NpcId, reason: String },
    #[error("new character template: {0}")]
    InvalidTemplate(String),
    #[error("duplicate map id {0}")]
    DuplicateMap(MapId),
    #[error("duplicate npc id {0}")]
    DuplicateNpc(NpcId),
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Stats {
    pub strength: i32,
    pub defense: i32,
    pub speed: i32,
    pub intelligence: i32,
}

/// Behavior category of an NPC definition.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum NpcBehavior {
    Monster,
    Guard,
    Friendly,
    Shopkeeper,
}

impl NpcBehavior {
    /// Friendly and shopkeeper NPCs cannot be fought.
    pub fn is_attackable(self) -> bool {
        matches!(self, NpcBehavior::Monster | NpcBehavior::Guard)
    }
}

/// One row of an NPC loot table.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LootEntry {
    pub item_id: ItemId,
    /// Chance in percent, `0..=100`.
    pub drop_rate: u8,
    pub min_quantity: i32,
    pub max_quantity: i32,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NpcInfo {
    pub id: NpcId,
    pub name: String,
    pub sprite: u32,
    pub behavior: NpcBehavior,
    pub aggression_range: i32,
    pub stats: Stats,
    /// Seconds between death and respawn.
    pub spawn_secs: f32,
    #[serde(default)]
    pub loot: Vec<LootEntry>,
}

impl NpcInfo {
    pub fn max_health(&self) -> i32 {
        self.stats.strength * self.stats.defense
    }

    pub fn health_regen(&self) -> i32 {
        (self.stats.defense / 3).max(1)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct Warp {
    pub x: i32,
    pub y: i32,
    pub to_map: MapId,
    pub to_x: i32,
    pub to_y: i32,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct Spawn {
    pub npc: NpcId,
    pub x: i32,
    pub y: i32,
}

/// Static tile data of one map, independent of who stands where.
#[derive(Debug, Clone, PartialEq)]
pub struct MapInfo {
    pub id: MapId,
    pub name: String,
    pub width: i32,
    pub height: i32,
    blocked: Vec<bool>,
    pub warps: Vec<Warp>,
    pub spawns: Vec<Spawn>,
}

impl MapInfo {
    /// Builds a map from text rows where `#` marks a blocked tile and any other
    /// character an open one. All rows must have the same length.
    pub fn from_layout<S: AsRef<str>>(
        id: MapId,
        name: impl Into<String>,
        rows: &[S],
    ) -> Result<Self, ContentError> {
        let width = rows.first().map(|row| row.as_ref().chars().count()).unwrap_or(0);
        if width == 0 {
            return Err(ContentError::InvalidMap {
                map: id,
                reason: "layout is empty".to_string(),
            });
        }

        let mut blocked = Vec::with_capacity(width * rows.len());
        for (row_index, row) in rows.iter().enumerate() {
            let row = row.as_ref();
            if row.chars().count() != width {
                return Err(ContentError::InvalidMap {
                    map: id,
                    reason: format!("row {} has {} tiles, expected {}", row_index, row.chars().count(), width),
                });
            }
            blocked.extend(row.chars().map(|tile| tile == '#'));
        }

        Ok(Self {
            id,
            name: name.into(),
            width: width as i32,
            height: rows.len() as i32,
            blocked,
            warps: Vec::new(),
            spawns: Vec::new(),
        })
    }

    pub fn with_warp(mut self, warp: Warp) -> Self {
        self.warps.push(warp);
        self
    }

    pub fn with_spawn(mut self, spawn: Spawn) -> Self {
        self.spawns.push(spawn);
        self
    }

    pub fn in_bounds(&self, x: i32, y: i32) -> bool {
        x >= 0 && y >= 0 && x < self.width && y < self.height
    }

    /// Tiles outside the map count as blocked.
    pub fn is_blocked(&self, x: i32, y: i32) -> bool {
        if !self.in_bounds(x, y) {
            return true;
        }
        self.blocked[(y * self.width + x) as usize]
    }

    pub fn warp_at(&self, x: i32, y: i32) -> Option<&Warp> {
        self.warps.iter().find(|warp| warp.x == x && warp.y == y)
    }
}

/// Starting equipment and vitals handed to every new character.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CharacterTemplate {
    pub map: MapId,
    pub x: i32,
    pub y: i32,
    pub sprite: u32,
    pub level: u32,
    pub max_hp: i32,
    pub max_mp: i32,
    pub max_sp: i32,
    pub stats: Stats,
    pub armor: i32,
    #[serde(default)]
    pub shield: Option<Shield>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct Shield {
    pub item_id: ItemId,
    /// Chance in percent to negate a hit completely.
    pub block_chance: u8,
}

#[derive(Debug, Deserialize)]
struct MapDefinition {
    id: MapId,
    name: String,
    layout: Vec<String>,
    #[serde(default)]
    warps: Vec<Warp>,
    #[serde(default)]
    spawns: Vec<Spawn>,
}

#[derive(Debug, Deserialize)]
struct ContentDocument {
    maps: Vec<MapDefinition>,
    npcs: Vec<NpcInfo>,
    new_character: CharacterTemplate,
}

/// Read-only registry of every map and NPC definition.
#[derive(Debug, Clone)]
pub struct ContentRepository {
    maps: BTreeMap<MapId, Arc<MapInfo>>,
    npcs: HashMap<NpcId, Arc<NpcInfo>>,
    new_character: CharacterTemplate,
}

impl ContentRepository {
    /// Builds and validates a repository from already parsed definitions.
    pub fn new(
        maps: Vec<MapInfo>,
        npcs: Vec<NpcInfo>,
        new_character: CharacterTemplate,
    ) -> Result<Self, ContentError> {
        let mut npc_table = HashMap::new();
        for npc in npcs {
            validate_npc(&npc)?;
            let id = npc.id;
            if npc_table.insert(id, Arc::new(npc)).is_some() {
                return Err(ContentError::DuplicateNpc(id));
            }
        }

        let mut map_table = BTreeMap::new();
        for map in maps {
            let id = map.id;
            if map_table.insert(id, Arc::new(map)).is_some() {
                return Err(ContentError::DuplicateMap(id));
            }
        }

        for map in map_table.values() {
            validate_map(map, &map_table, &npc_table)?;
        }

        match map_table.get(&new_character.map) {
            Some(map) if !map.is_blocked(new_character.x, new_character.y) => {}
            Some(_) => {
                return Err(ContentError::InvalidTemplate(
                    "start tile is blocked".to_string(),
                ))
            }
            None => {
                return Err(ContentError::InvalidTemplate(format!(
                    "unknown start map {}",
                    new_character.map
                )))
            }
        }

        Ok(Self {
            maps: map_table,
            npcs: npc_table,
            new_character,
        })
    }

    pub fn from_json(document: &str) -> Result<Self, ContentError> {
        let document: ContentDocument = serde_json::from_str(document)?;

        let mut maps = Vec::with_capacity(document.maps.len());
        for definition in document.maps {
            let mut map = MapInfo::from_layout(definition.id, definition.name, &definition.layout)?;
            map.warps = definition.warps;
            map.spawns = definition.spawns;
            maps.push(map);
        }

        Self::new(maps, document.npcs, document.new_character)
    }

    pub fn load(path: &Path) -> Result<Self, ContentError> {
        let document = std::fs::read_to_string(path).map_err(|source| ContentError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json(&document)
    }

    /// The world bundled with the server.
    pub fn builtin() -> Result<Self, ContentError> {
        Self::from_json(BUILTIN_WORLD)
    }

    pub fn map(&self, id: MapId) -> Option<&Arc<MapInfo>> {
        self.maps.get(&id)
    }

    /// Maps in ascending id order.
    pub fn maps(&self) -> impl Iterator<Item = &Arc<MapInfo>> {
        self.maps.values()
    }

    pub fn npc(&self, id: NpcId) -> Option<&Arc<NpcInfo>> {
        self.npcs.get(&id)
    }

    pub fn new_character(&self) -> &CharacterTemplate {
        &self.new_character
    }
}

fn validate_npc(npc: &NpcInfo) -> Result<(), ContentError> {
    let invalid = |reason: &str| ContentError::InvalidNpc {
        npc: npc.id,
        reason: reason.to_string(),
    };

    match npc.stats.strength.checked_mul(npc.stats.defense) {
        Some(health) if health > 0 => {}
        Some(_) => return Err(invalid("strength and defense must be positive")),
        None => return Err(invalid("strength times defense overflows health")),
    }
    if npc.spawn_secs.is_nan() || npc.spawn_secs < 0.0 {
        return Err(invalid("spawn delay must not be negative"));
    }
    for entry in &npc.loot {
        if entry.drop_rate > 100 {
            return Err(invalid("loot drop rate above 100%"));
        }
        if entry.min_quantity > entry.max_quantity {
            return Err(invalid("loot quantity range is inverted"));
        }
    }
    Ok(())
}

fn validate_map(
    map: &MapInfo,
    maps: &BTreeMap<MapId, Arc<MapInfo>>,
    npcs: &HashMap<NpcId, Arc<NpcInfo>>,
) -> Result<(), ContentError> {
    let invalid = |reason: String| ContentError::InvalidMap { map: map.id, reason };

    let mut occupied = HashSet::new();
    for spawn in &map.spawns {
        if !npcs.contains_key(&spawn.npc) {
            return Err(invalid(format!("spawn references unknown npc {}", spawn.npc)));
        }
        if map.is_blocked(spawn.x, spawn.y) {
            return Err(invalid(format!("spawn at ({}, {}) is on a blocked tile", spawn.x, spawn.y)));
        }
        if !occupied.insert((spawn.x, spawn.y)) {
            return Err(invalid(format!("two spawns share tile ({}, {})", spawn.x, spawn.y)));
        }
    }

    for warp in &map.warps {
        if !map.in_bounds(warp.x, warp.y) {
            return Err(invalid(format!("warp at ({}, {}) is outside the map", warp.x, warp.y)));
        }
        let Some(target) = maps.get(&warp.to_map) else {
            return Err(invalid(format!("warp references unknown map {}", warp.to_map)));
        };
        if target.is_blocked(warp.to_x, warp.to_y) {
            return Err(invalid(format!(
                "warp destination ({}, {}) on map {} is blocked",
                warp.to_x, warp.to_y, warp.to_map
            )));
        }
    }
    Ok(())
}
