//! Runtime NPC instances
//!
//! An NPC lives as long as its map. Death does not remove it: the instance
//! switches to the dead state, disappears from occupancy and from clients, and
//! comes back on the same tile once the respawn delay has passed.

use crate::behavior::Behavior;
use crate::combat;
use crate::content::NpcInfo;
use crate::map::MapContext;
use crate::player::Player;
use log::{debug, info};
use shared::{ChatColor, Direction, MovementType, Packet};
use std::sync::Arc;

/// Seconds between two health regeneration steps.
pub const REGEN_INTERVAL: f32 = 5.0;

/// Runtime id of the NPC in spawn slot `slot`. Player ids stay below
/// `0x10000`, so any non-zero slot yields an id no player can have.
pub fn id_for_slot(slot: u32) -> u32 {
    (slot & 0xFFFF) << 16
}

#[derive(Debug, Clone)]
pub struct Npc {
    id: u32,
    info: Arc<NpcInfo>,
    x: i32,
    y: i32,
    direction: Direction,
    health: i32,
    regen_timer: f32,
    behavior: Behavior,
}

impl Npc {
    pub fn new(slot: u32, info: Arc<NpcInfo>, x: i32, y: i32) -> Self {
        let health = info.max_health();
        Self {
            id: id_for_slot(slot),
            info,
            x,
            y,
            direction: Direction::Down,
            health,
            regen_timer: 0.0,
            behavior: Behavior::idle(),
        }
    }

    pub fn id(&self) -> u32 {
        self.id
    }

    pub fn info(&self) -> &NpcInfo {
        &self.info
    }

    pub fn x(&self) -> i32 {
        self.x
    }

    pub fn y(&self) -> i32 {
        self.y
    }

    pub fn position(&self) -> (i32, i32) {
        (self.x, self.y)
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    pub fn health(&self) -> i32 {
        self.health
    }

    pub fn behavior(&self) -> &Behavior {
        &self.behavior
    }

    pub fn is_alive(&self) -> bool {
        !self.behavior.is_dead()
    }

    /// Alive and standing on `(x, y)`.
    pub fn occupies(&self, x: i32, y: i32) -> bool {
        self.is_alive() && self.x == x && self.y == y
    }

    /// Strict four-way adjacency.
    pub fn is_adjacent_to(&self, x: i32, y: i32) -> bool {
        let dx = (self.x - x).abs();
        let dy = (self.y - y).abs();
        dx + dy == 1
    }

    pub fn create_packet(&self) -> Packet {
        Packet::CreateActor {
            id: self.id,
            name: self.info.name.clone(),
            sprite: self.info.sprite,
            player_killer: false,
            access_level: 0,
            x: self.x,
            y: self.y,
            direction: self.direction,
            max_hp: self.info.max_health(),
            hp: self.health,
            max_mp: 0,
            mp: 0,
            max_sp: 0,
            sp: 0,
        }
    }

    pub fn update<P: Player>(&mut self, dt: f32, ctx: &mut MapContext<'_, P>) {
        if self.is_alive() {
            self.regen_timer += dt;
            while self.regen_timer >= REGEN_INTERVAL {
                self.regen_timer -= REGEN_INTERVAL;
                self.health = (self.health + self.info.health_regen()).clamp(0, self.info.max_health());
            }
        }

        let state = std::mem::replace(&mut self.behavior, Behavior::idle());
        self.behavior = state.update(self, ctx, dt);
    }

    /// Takes one step in `direction`.
    pub fn navigate<P: Player>(
        &mut self,
        direction: Direction,
        movement_type: MovementType,
        ctx: &mut MapContext<'_, P>,
    ) -> bool {
        let (x, y) = direction.step(self.x, self.y);
        if !ctx.info.in_bounds(x, y) || (x, y) == (self.x, self.y) {
            return false;
        }
        self.navigate_to(x, y, movement_type, ctx)
    }

    /// Takes the first step of a path towards `(x, y)`. The rest of the path is
    /// discarded; the caller navigates again on its next action.
    pub fn navigate_to<P: Player>(
        &mut self,
        x: i32,
        y: i32,
        movement_type: MovementType,
        ctx: &mut MapContext<'_, P>,
    ) -> bool {
        let path = ctx
            .pathfinder
            .navigate((self.x, self.y), (x, y), |(tx, ty)| !ctx.is_passable(tx, ty));

        let Some(&(next_x, next_y)) = path.as_ref().and_then(|path| path.first()) else {
            return false;
        };

        if let Some(direction) = Direction::from_offset(next_x - self.x, next_y - self.y) {
            self.direction = direction;
        }
        self.x = next_x;
        self.y = next_y;

        ctx.send(&Packet::ActorMove {
            id: self.id,
            direction: self.direction,
            movement_type,
        });
        true
    }

    /// Applies `damage` dealt by the player at `attacker` in `ctx.players`.
    pub fn hurt<P: Player>(&mut self, attacker: usize, damage: i32, ctx: &mut MapContext<'_, P>) {
        debug_assert!(self.is_alive(), "dead NPC {} was hurt", self.id);
        let damage = damage.max(0);

        let name = self.info.name.clone();
        if damage < self.health {
            self.health -= damage;

            let player = &mut ctx.players[attacker];
            player.tell(
                &format!("You hit the {} for {} damage.", name, damage),
                ChatColor::White,
            );
            if self.behavior.is_idle() {
                self.behavior = Behavior::hunt(player.id());
            }
            return;
        }

        let experience = combat::kill_experience(&self.info.stats);
        let player = &mut ctx.players[attacker];
        player.tell(&format!("You have killed the {}.", name), ChatColor::Green);
        player.grant_experience(experience);
        info!("NPC {} ({}) killed by player {}", self.id, name, player.id());

        self.kill(ctx);
    }

    /// Swings at the player at `target` in `ctx.players`. Returns true when the
    /// hit was fatal.
    pub fn attack<P: Player>(&mut self, target: usize, ctx: &mut MapContext<'_, P>) -> bool {
        let name = self.info.name.clone();
        let npc_id = self.id;
        ctx.send(&Packet::ActorAttack { id: npc_id });

        let player = &mut ctx.players[target];
        if let Some(item) = player.block() {
            player.tell(
                &format!("You blocked the {}'s attack.", name),
                ChatColor::Grey,
            );
            debug!("NPC {} attack blocked by player {} with item {}", npc_id, player.id(), item);
            return false;
        }

        let damage = combat::damage(self.info.stats.strength, player.protection());
        if damage <= 0 {
            player.tell(
                &format!("You feel nothing from the {}'s attack.", name),
                ChatColor::Grey,
            );
            return false;
        }

        player.tell(
            &format!("The {} hits you for {} damage.", name, damage),
            ChatColor::Red,
        );

        if damage < player.character().hp {
            player.character_mut().hp -= damage;
            player.sync_vitals();
            return false;
        }

        let victim = player.character().name.clone();
        let penalty = combat::death_penalty(player.character().experience);
        info!("Player {} ({}) killed by NPC {}", player.id(), victim, npc_id);

        ctx.send(&Packet::chat(
            format!("{} has been killed by a {}.", victim, name),
            ChatColor::Red,
        ));

        let player = &mut ctx.players[target];
        player.die(penalty);
        if player.character().player_killer {
            player.character_mut().player_killer = false;
        }
        true
    }

    /// Switches to the dead state, hides this NPC from clients and drops loot.
    pub fn kill<P: Player>(&mut self, ctx: &mut MapContext<'_, P>) {
        self.health = 0;
        self.behavior = Behavior::dead(self.info.spawn_secs);
        ctx.send(&Packet::DestroyActor { id: self.id });

        for drop in combat::roll_loot(&self.info.loot, &mut *ctx.rng) {
            ctx.drop_item(drop.item_id, drop.quantity, self.x, self.y);
        }
    }

    /// Restores full health and reintroduces this NPC to clients where it died.
    pub fn respawn<P: Player>(&mut self, ctx: &mut MapContext<'_, P>) {
        self.health = self.info.max_health();
        self.regen_timer = 0.0;
        info!("NPC {} ({}) respawned at ({}, {})", self.id, self.info.name, self.x, self.y);
        ctx.send(&self.create_packet());
    }
}
