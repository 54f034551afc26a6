//! Damage, experience and loot formulas shared by players and NPCs.

use crate::content::{ItemId, LootEntry, Stats};
use rand::Rng;
use shared::ChatColor;

/// Hit damage after the defender's protection. Never negative.
pub fn damage(strength: i32, protection: i32) -> i32 {
    (strength - protection).max(0)
}

/// Experience granted for killing an NPC.
///
/// The product is clamped with `min(1)`, so any NPC with positive stats is
/// worth exactly one point.
pub fn kill_experience(stats: &Stats) -> i64 {
    (i64::from(stats.strength) * i64::from(stats.defense)).min(1)
}

/// Experience a player loses on death: a tenth of what they have, never negative.
pub fn death_penalty(experience: i64) -> i64 {
    (experience / 10).max(0)
}

/// Rolls a uniform percentage in `1..=100` and succeeds when it is at most `chance`.
pub fn roll_percent<R: Rng + ?Sized>(rng: &mut R, chance: u8) -> bool {
    rng.gen_range(1..=100u8) <= chance
}

/// Critical hit chance in percent for an attacker with the given intelligence.
pub fn critical_chance(intelligence: i32) -> u8 {
    (intelligence / 2).clamp(0, 50) as u8
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Drop {
    pub item_id: ItemId,
    pub quantity: i32,
}

/// Rolls every loot entry independently.
pub fn roll_loot<R: Rng + ?Sized>(table: &[LootEntry], rng: &mut R) -> Vec<Drop> {
    let mut drops = Vec::new();
    for entry in table {
        if !roll_percent(rng, entry.drop_rate) {
            continue;
        }
        if entry.min_quantity > entry.max_quantity {
            continue;
        }

        let quantity = rng.gen_range(entry.min_quantity..=entry.max_quantity);
        if quantity <= 0 {
            continue;
        }

        drops.push(Drop {
            item_id: entry.item_id,
            quantity,
        });
    }
    drops
}

/// How a fight against another player would go, judged by level difference.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Matchup {
    Hopeless,
    Disadvantage,
    Even,
    Advantage,
    Trivial,
}

impl Matchup {
    pub fn classify(viewer_level: u32, other_level: u32) -> Matchup {
        let difference = i64::from(other_level) - i64::from(viewer_level);
        match difference {
            d if d >= 5 => Matchup::Hopeless,
            1..=4 => Matchup::Disadvantage,
            0 => Matchup::Even,
            -4..=-1 => Matchup::Advantage,
            _ => Matchup::Trivial,
        }
    }

    pub fn describe(self, name: &str) -> String {
        match self {
            Matchup::Hopeless => format!("You would stand no chance against {}.", name),
            Matchup::Disadvantage => format!("{} looks like a tough opponent.", name),
            Matchup::Even => format!("{} seems to be an even match.", name),
            Matchup::Advantage => format!("You should have the upper hand against {}.", name),
            Matchup::Trivial => format!("{} would be no match for you.", name),
        }
    }

    pub fn color(self) -> ChatColor {
        match self {
            Matchup::Hopeless => ChatColor::Red,
            Matchup::Disadvantage => ChatColor::Orange,
            Matchup::Even => ChatColor::Yellow,
            Matchup::Advantage => ChatColor::Blue,
            Matchup::Trivial => ChatColor::Green,
        }
    }
}
