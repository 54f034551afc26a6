//! Player capabilities the simulation relies on
//!
//! Maps and NPCs never touch sockets or storage. Everything they need from a
//! player goes through the [`Player`] trait, which [`ServerPlayer`] implements
//! on top of the transport's outbound queue.

use crate::combat;
use crate::content::{CharacterTemplate, ItemId, Shield, Stats};
use crate::network::GameMessage;
use crate::npc::Npc;
use log::{debug, warn};
use rand::rngs::StdRng;
use shared::{ChatColor, Direction, Packet};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::mpsc;

/// Serialized packet bytes, shared between every recipient of a broadcast.
pub type Frame = Arc<[u8]>;

/// Seconds between two player vital regeneration steps.
const PLAYER_REGEN_INTERVAL: f32 = 5.0;

/// Encodes a packet once. Failures are logged and yield `None`.
pub fn encode_frame(packet: &Packet) -> Option<Frame> {
    match packet.encode() {
        Ok(bytes) => Some(Arc::from(bytes)),
        Err(e) => {
            warn!("Failed to encode {} packet: {}", packet.name(), e);
            None
        }
    }
}

/// What a player currently has selected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Target {
    Player(u32),
    Npc(u32),
}

/// Mutable character snapshot of a player.
#[derive(Debug, Clone, PartialEq)]
pub struct Character {
    pub name: String,
    pub sprite: u32,
    pub x: i32,
    pub y: i32,
    pub direction: Direction,
    pub player_killer: bool,
    pub access_level: u8,
    pub hp: i32,
    pub max_hp: i32,
    pub mp: i32,
    pub max_mp: i32,
    pub sp: i32,
    pub max_sp: i32,
    pub level: u32,
    pub experience: i64,
    pub stats: Stats,
}

impl Character {
    pub fn from_template(name: impl Into<String>, template: &CharacterTemplate) -> Self {
        Self {
            name: name.into(),
            sprite: template.sprite,
            x: template.x,
            y: template.y,
            direction: Direction::Down,
            player_killer: false,
            access_level: 0,
            hp: template.max_hp,
            max_hp: template.max_hp,
            mp: template.max_mp,
            max_mp: template.max_mp,
            sp: template.max_sp,
            max_sp: template.max_sp,
            level: template.level,
            experience: 0,
            stats: template.stats,
        }
    }

    pub fn position(&self) -> (i32, i32) {
        (self.x, self.y)
    }

    pub fn create_packet(&self, id: u32) -> Packet {
        Packet::CreateActor {
            id,
            name: self.name.clone(),
            sprite: self.sprite,
            player_killer: self.player_killer,
            access_level: self.access_level,
            x: self.x,
            y: self.y,
            direction: self.direction,
            max_hp: self.max_hp,
            hp: self.hp,
            max_mp: self.max_mp,
            mp: self.mp,
            max_sp: self.max_sp,
            sp: self.sp,
        }
    }

    pub fn vitals_packet(&self) -> Packet {
        Packet::Vitals {
            hp: self.hp,
            max_hp: self.max_hp,
            mp: self.mp,
            max_mp: self.max_mp,
            sp: self.sp,
            max_sp: self.max_sp,
        }
    }

    /// Puts every vital back to its maximum.
    pub fn restore(&mut self) {
        self.hp = self.max_hp;
        self.mp = self.max_mp;
        self.sp = self.max_sp;
    }
}

/// Everything the simulation core may ask of a player.
pub trait Player {
    fn id(&self) -> u32;

    fn character(&self) -> &Character;

    fn character_mut(&mut self) -> &mut Character;

    /// Queues already serialized bytes for delivery.
    fn send_frame(&mut self, frame: &Frame);

    fn send(&mut self, packet: &Packet) {
        if let Some(frame) = encode_frame(packet) {
            self.send_frame(&frame);
        }
    }

    fn tell(&mut self, text: &str, color: ChatColor) {
        self.send(&Packet::chat(text, color));
    }

    /// Damage absorbed from every incoming hit.
    fn protection(&self) -> i32;

    /// Tries to block an incoming hit, returning the blocking item on success.
    fn block(&mut self) -> Option<ItemId>;

    fn grant_experience(&mut self, amount: i64);

    fn die(&mut self, experience_loss: i64);

    fn sync_vitals(&mut self);

    /// Resolves this player's swing at `npc`. Returns the damage to apply, or
    /// `None` when the attack does not land.
    fn attack(&mut self, npc: &Npc) -> Option<i32>;

    fn set_target(&mut self, target: Target);

    fn update(&mut self, dt: f32);
}

/// A connected player backed by the UDP transport.
#[derive(Debug)]
pub struct ServerPlayer {
    id: u32,
    addr: SocketAddr,
    character: Character,
    armor: i32,
    shield: Option<Shield>,
    target: Option<Target>,
    regen_timer: f32,
    /// Drives shield blocks and critical hits.
    rng: StdRng,
    outbound: mpsc::UnboundedSender<GameMessage>,
}

impl ServerPlayer {
    pub fn new(
        id: u32,
        addr: SocketAddr,
        name: impl Into<String>,
        template: &CharacterTemplate,
        rng: StdRng,
        outbound: mpsc::UnboundedSender<GameMessage>,
    ) -> Self {
        Self {
            id,
            addr,
            character: Character::from_template(name, template),
            armor: template.armor,
            shield: template.shield,
            target: None,
            regen_timer: 0.0,
            rng,
            outbound,
        }
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn target(&self) -> Option<Target> {
        self.target
    }

    fn regenerate(&mut self) -> bool {
        let c = &mut self.character;
        let before = (c.hp, c.mp, c.sp);

        c.hp = (c.hp + (c.max_hp / 20).max(1)).min(c.max_hp);
        c.mp = (c.mp + (c.max_mp / 20).max(1)).min(c.max_mp);
        c.sp = (c.sp + (c.max_sp / 10).max(1)).min(c.max_sp);

        before != (c.hp, c.mp, c.sp)
    }
}

impl Player for ServerPlayer {
    fn id(&self) -> u32 {
        self.id
    }

    fn character(&self) -> &Character {
        &self.character
    }

    fn character_mut(&mut self) -> &mut Character {
        &mut self.character
    }

    fn send_frame(&mut self, frame: &Frame) {
        if let Err(e) = self.outbound.send(GameMessage::SendFrame {
            frame: Arc::clone(frame),
            addr: self.addr,
        }) {
            warn!("Failed to queue frame for player {}: {}", self.id, e);
        }
    }

    fn protection(&self) -> i32 {
        self.armor + self.character.stats.defense / 2
    }

    fn block(&mut self) -> Option<ItemId> {
        let shield = self.shield?;
        if combat::roll_percent(&mut self.rng, shield.block_chance) {
            Some(shield.item_id)
        } else {
            None
        }
    }

    fn grant_experience(&mut self, amount: i64) {
        self.character.experience += amount;
        self.tell(
            &format!("You gained {} experience.", amount),
            ChatColor::Green,
        );
    }

    fn die(&mut self, experience_loss: i64) {
        self.character.experience = (self.character.experience - experience_loss).max(0);
        self.character.restore();
        self.target = None;
        debug!(
            "Player {} died and lost {} experience",
            self.id, experience_loss
        );
        self.tell(
            &format!("You have died and lost {} experience.", experience_loss),
            ChatColor::Red,
        );
        self.sync_vitals();
    }

    fn sync_vitals(&mut self) {
        let packet = self.character.vitals_packet();
        self.send(&packet);
    }

    fn attack(&mut self, npc: &Npc) -> Option<i32> {
        let info = npc.info();
        if !info.behavior.is_attackable() {
            self.tell(&format!("You cannot attack {}.", info.name), ChatColor::Grey);
            return None;
        }

        let mut damage = combat::damage(self.character.stats.strength, info.stats.defense);
        if damage == 0 {
            self.tell(
                &format!("The {} shrugs off your attack.", info.name),
                ChatColor::Grey,
            );
            return None;
        }

        let critical = combat::critical_chance(self.character.stats.intelligence);
        if combat::roll_percent(&mut self.rng, critical) {
            damage *= 2;
            self.tell("Critical hit!", ChatColor::Yellow);
        }
        Some(damage)
    }

    fn set_target(&mut self, target: Target) {
        self.target = Some(target);
    }

    fn update(&mut self, dt: f32) {
        self.regen_timer += dt;
        while self.regen_timer >= PLAYER_REGEN_INTERVAL {
            self.regen_timer -= PLAYER_REGEN_INTERVAL;
            if self.regenerate() {
                self.sync_vitals();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::content::ContentRepository;
    use rand::SeedableRng;

    fn seeded_player(seed: u64) -> (ServerPlayer, mpsc::UnboundedReceiver<GameMessage>) {
        let content = ContentRepository::builtin().unwrap();
        let (tx, rx) = mpsc::unbounded_channel();
        let addr = "127.0.0.1:9000".parse().unwrap();
        let rng = StdRng::seed_from_u64(seed);
        (ServerPlayer::new(7, addr, "Aria", content.new_character(), rng, tx), rx)
    }

    fn player() -> (ServerPlayer, mpsc::UnboundedReceiver<GameMessage>) {
        seeded_player(11)
    }

    fn drain(rx: &mut mpsc::UnboundedReceiver<GameMessage>) -> Vec<Packet> {
        let mut packets = Vec::new();
        while let Ok(GameMessage::SendFrame { frame, .. }) = rx.try_recv() {
            packets.push(Packet::decode(&frame).unwrap());
        }
        packets
    }

    #[test]
    fn test_character_from_template() {
        let (player, _rx) = player();
        let c = player.character();

        assert_eq!(c.name, "Aria");
        assert_eq!(c.hp, c.max_hp);
        assert_eq!(c.experience, 0);
        assert!(!c.player_killer);
    }

    #[test]
    fn test_send_queues_frame_for_own_address() {
        let (mut player, mut rx) = player();
        player.send(&Packet::LoadMap { map_id: 2 });

        match rx.try_recv().unwrap() {
            GameMessage::SendFrame { frame, addr } => {
                assert_eq!(addr, player.addr());
                assert_eq!(Packet::decode(&frame).unwrap(), Packet::LoadMap { map_id: 2 });
            }
        }
    }

    #[test]
    fn test_die_restores_vitals_and_costs_experience() {
        let (mut player, mut rx) = player();
        player.character_mut().experience = 120;
        player.character_mut().hp = 1;

        player.die(12);

        assert_eq!(player.character().experience, 108);
        assert_eq!(player.character().hp, player.character().max_hp);
        let packets = drain(&mut rx);
        assert!(packets.iter().any(|p| matches!(p, Packet::Vitals { .. })));
    }

    #[test]
    fn test_regeneration_syncs_only_when_changed() {
        let (mut player, mut rx) = player();

        player.update(PLAYER_REGEN_INTERVAL);
        assert!(drain(&mut rx).is_empty());

        player.character_mut().hp = 1;
        player.update(PLAYER_REGEN_INTERVAL);
        assert!(player.character().hp > 1);
        assert_eq!(drain(&mut rx).len(), 1);
    }

    #[test]
    fn test_send_after_transport_closed_does_not_panic() {
        let (mut player, rx) = player();
        drop(rx);
        player.tell("anyone there?", ChatColor::White);
    }

    #[test]
    fn test_blocks_follow_the_seed() {
        let (mut first, _rx1) = seeded_player(42);
        let (mut second, _rx2) = seeded_player(42);

        let a: Vec<Option<ItemId>> = (0..256).map(|_| first.block()).collect();
        let b: Vec<Option<ItemId>> = (0..256).map(|_| second.block()).collect();
        assert_eq!(a, b);
        assert!(a.iter().any(Option::is_some));
    }
}
