//! NPC behavior states
//!
//! An NPC is always in exactly one [`Behavior`]. Each tick the active state is
//! consumed by [`Behavior::update`], which returns the state for the next tick:
//! either itself (with its timer advanced) or a freshly built successor.
//!
//! Every state acts at most once per interval. Elapsed time accumulates across
//! ticks and the interval is subtracted when the state acts, so leftover time
//! carries into the next interval. Adjacency checks in Hunt and Attack run on
//! every tick regardless of the interval.

use crate::map::MapContext;
use crate::npc::Npc;
use crate::player::Player;
use log::debug;
use rand::Rng;
use shared::{Direction, MovementType};

pub const IDLE_INTERVAL: f32 = 4.0;
pub const HUNT_INTERVAL: f32 = 0.5;
pub const ATTACK_INTERVAL: f32 = 1.0;

/// Accumulated time towards the next action of a state.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Timer {
    elapsed: f32,
}

impl Timer {
    pub fn elapsed(&self) -> f32 {
        self.elapsed
    }

    pub fn advance(&mut self, dt: f32) {
        self.elapsed += dt;
    }

    /// Consumes one interval if enough time has accumulated.
    pub fn fire(&mut self, interval: f32) -> bool {
        if self.elapsed >= interval {
            self.elapsed -= interval;
            true
        } else {
            false
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Behavior {
    /// Wanders one tile in a random direction every few seconds.
    Idle { timer: Timer },
    /// Closes in on a player.
    Hunt { target: u32, timer: Timer },
    /// Swings at an adjacent player.
    Attack { target: u32, timer: Timer },
    /// Waits out the respawn delay.
    Dead { delay: f32, timer: Timer },
}

impl Behavior {
    pub fn idle() -> Self {
        Behavior::Idle {
            timer: Timer::default(),
        }
    }

    pub fn hunt(target: u32) -> Self {
        Behavior::Hunt {
            target,
            timer: Timer::default(),
        }
    }

    pub fn attack(target: u32) -> Self {
        Behavior::Attack {
            target,
            timer: Timer::default(),
        }
    }

    pub fn dead(delay: f32) -> Self {
        Behavior::Dead {
            delay,
            timer: Timer::default(),
        }
    }

    pub fn is_idle(&self) -> bool {
        matches!(self, Behavior::Idle { .. })
    }

    pub fn is_dead(&self) -> bool {
        matches!(self, Behavior::Dead { .. })
    }

    /// The player this state is focused on, if any.
    pub fn target(&self) -> Option<u32> {
        match self {
            Behavior::Hunt { target, .. } | Behavior::Attack { target, .. } => Some(*target),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Behavior::Idle { .. } => "idle",
            Behavior::Hunt { .. } => "hunt",
            Behavior::Attack { .. } => "attack",
            Behavior::Dead { .. } => "dead",
        }
    }

    /// Advances this state by `dt` seconds and returns the next state.
    pub fn update<P: Player>(self, npc: &mut Npc, ctx: &mut MapContext<'_, P>, dt: f32) -> Behavior {
        match self {
            Behavior::Idle { mut timer } => {
                timer.advance(dt);
                if timer.fire(IDLE_INTERVAL) {
                    let direction = Direction::ALL[ctx.rng.gen_range(0..Direction::ALL.len())];
                    npc.navigate(direction, MovementType::Walk, ctx);
                }
                Behavior::Idle { timer }
            }

            Behavior::Hunt { target, mut timer } => {
                let Some(position) = ctx.player(target).map(|p| p.character().position()) else {
                    debug!("NPC {} lost hunt target {}", npc.id(), target);
                    return Behavior::idle();
                };

                if npc.is_adjacent_to(position.0, position.1) {
                    return Behavior::attack(target);
                }

                timer.advance(dt);
                if timer.fire(HUNT_INTERVAL) {
                    for direction in Direction::ALL {
                        let (x, y) = direction.step(position.0, position.1);
                        if npc.navigate_to(x, y, MovementType::Walk, ctx) {
                            break;
                        }
                    }
                }
                Behavior::Hunt { target, timer }
            }

            Behavior::Attack { target, mut timer } => {
                let Some(index) = ctx.player_index(target) else {
                    debug!("NPC {} lost attack target {}", npc.id(), target);
                    return Behavior::idle();
                };

                let (x, y) = ctx.players[index].character().position();
                if !npc.is_adjacent_to(x, y) {
                    return Behavior::hunt(target);
                }

                timer.advance(dt);
                if timer.fire(ATTACK_INTERVAL) && npc.attack(index, ctx) {
                    return Behavior::idle();
                }
                Behavior::Attack { target, timer }
            }

            Behavior::Dead { delay, mut timer } => {
                timer.advance(dt);
                if timer.elapsed() >= delay && !ctx.is_passable(npc.x(), npc.y()) {
                    // Someone is standing on the spawn tile; retry next tick.
                    return Behavior::Dead { delay, timer };
                }
                if timer.fire(delay) {
                    npc.respawn(ctx);
                    return Behavior::idle();
                }
                Behavior::Dead { delay, timer }
            }
        }
    }
}
