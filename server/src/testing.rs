//! In-memory player used by unit tests

use crate::content::{ItemId, Stats};
use crate::npc::Npc;
use crate::player::{Character, Frame, Player, Target};
use shared::{Direction, Packet};

/// Player that records everything sent to it and resolves combat from fixed
/// numbers instead of dice.
#[derive(Debug)]
pub struct RecordingPlayer {
    pub id: u32,
    pub character: Character,
    pub attack_damage: Option<i32>,
    pub protection: i32,
    pub block_item: Option<ItemId>,
    pub target: Option<Target>,
    pub received: Vec<Packet>,
    pub vitals_syncs: usize,
    pub deaths: Vec<i64>,
    pub experience_gained: i64,
    pub attacks: usize,
}

impl RecordingPlayer {
    pub fn new(id: u32, x: i32, y: i32) -> Self {
        Self {
            id,
            character: Character {
                name: format!("Player{}", id),
                sprite: 1,
                x,
                y,
                direction: Direction::Down,
                player_killer: false,
                access_level: 0,
                hp: 30,
                max_hp: 30,
                mp: 10,
                max_mp: 10,
                sp: 10,
                max_sp: 10,
                level: 1,
                experience: 0,
                stats: Stats {
                    strength: 5,
                    defense: 2,
                    speed: 3,
                    intelligence: 2,
                },
            },
            attack_damage: None,
            protection: 0,
            block_item: None,
            target: None,
            received: Vec::new(),
            vitals_syncs: 0,
            deaths: Vec::new(),
            experience_gained: 0,
            attacks: 0,
        }
    }

    pub fn with_attack_damage(mut self, damage: i32) -> Self {
        self.attack_damage = Some(damage);
        self
    }

    pub fn with_protection(mut self, protection: i32) -> Self {
        self.protection = protection;
        self
    }

    /// Every incoming hit is blocked with `item`.
    pub fn with_block(mut self, item: ItemId) -> Self {
        self.block_item = Some(item);
        self
    }

    pub fn place(&mut self, x: i32, y: i32) {
        self.character.x = x;
        self.character.y = y;
    }

    pub fn messages(&self) -> Vec<String> {
        self.received
            .iter()
            .filter_map(|packet| match packet {
                Packet::ChatMessage { text, .. } => Some(text.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn created_ids(&self) -> Vec<u32> {
        self.received
            .iter()
            .filter_map(|packet| match packet {
                Packet::CreateActor { id, .. } => Some(*id),
                _ => None,
            })
            .collect()
    }
}

impl Player for RecordingPlayer {
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
        let packet = Packet::decode(frame).expect("frames are valid packets");
        self.received.push(packet);
    }

    fn protection(&self) -> i32 {
        self.protection
    }

    fn block(&mut self) -> Option<ItemId> {
        self.block_item
    }

    fn grant_experience(&mut self, amount: i64) {
        self.experience_gained += amount;
        self.character.experience += amount;
    }

    fn die(&mut self, experience_loss: i64) {
        self.deaths.push(experience_loss);
        self.character.experience = (self.character.experience - experience_loss).max(0);
        self.character.restore();
    }

    fn sync_vitals(&mut self) {
        self.vitals_syncs += 1;
    }

    fn attack(&mut self, _npc: &Npc) -> Option<i32> {
        self.attacks += 1;
        self.attack_damage
    }

    fn set_target(&mut self, target: Target) {
        self.target = Some(target);
    }

    fn update(&mut self, _dt: f32) {}
}
