use serde::{Deserialize, Serialize};

/// Protocol revision clients must announce in `Packet::Connect`.
pub const PROTOCOL_VERSION: u32 = 1;

/// Largest datagram either side is expected to produce.
pub const MAX_DATAGRAM_SIZE: usize = 2048;

/// Compass direction on the tile grid. The y axis grows downward.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    Up,
    Down,
    Left,
    Right,
}

impl Direction {
    pub const ALL: [Direction; 4] = [
        Direction::Up,
        Direction::Down,
        Direction::Left,
        Direction::Right,
    ];

    /// Tile offset of a single step in this direction.
    pub fn delta(self) -> (i32, i32) {
        match self {
            Direction::Up => (0, -1),
            Direction::Down => (0, 1),
            Direction::Left => (-1, 0),
            Direction::Right => (1, 0),
        }
    }

    /// Returns the tile one step away from `(x, y)`.
    pub fn step(self, x: i32, y: i32) -> (i32, i32) {
        let (dx, dy) = self.delta();
        (x + dx, y + dy)
    }

    /// Direction of a single step, using the dominant axis. Ties go to the
    /// horizontal axis. Returns `None` for a zero offset.
    pub fn from_offset(dx: i32, dy: i32) -> Option<Direction> {
        if dx == 0 && dy == 0 {
            return None;
        }

        if dx.abs() >= dy.abs() {
            Some(if dx > 0 {
                Direction::Right
            } else {
                Direction::Left
            })
        } else {
            Some(if dy > 0 {
                Direction::Down
            } else {
                Direction::Up
            })
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
pub enum MovementType {
    Walk,
    Run,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
pub enum ChatColor {
    White,
    Grey,
    Red,
    Green,
    Yellow,
    Blue,
    Orange,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub enum Packet {
    // Client -> server
    Connect {
        client_version: u32,
        name: String,
    },
    Move {
        direction: Direction,
        movement_type: MovementType,
    },
    Attack,
    LookAt {
        x: i32,
        y: i32,
    },
    Heartbeat,
    Disconnect,

    // Server -> client
    Connected {
        client_id: u32,
    },
    Disconnected {
        reason: String,
    },
    LoadMap {
        map_id: u32,
    },
    CreateActor {
        id: u32,
        name: String,
        sprite: u32,
        player_killer: bool,
        access_level: u8,
        x: i32,
        y: i32,
        direction: Direction,
        max_hp: i32,
        hp: i32,
        max_mp: i32,
        mp: i32,
        max_sp: i32,
        sp: i32,
    },
    DestroyActor {
        id: u32,
    },
    SetActorPosition {
        id: u32,
        direction: Direction,
        x: i32,
        y: i32,
    },
    ActorMove {
        id: u32,
        direction: Direction,
        movement_type: MovementType,
    },
    ActorAttack {
        id: u32,
    },
    ChatMessage {
        text: String,
        color: ChatColor,
    },
    SpawnItem {
        item_id: u32,
        quantity: i32,
        x: i32,
        y: i32,
    },
    Vitals {
        hp: i32,
        max_hp: i32,
        mp: i32,
        max_mp: i32,
        sp: i32,
        max_sp: i32,
    },
}

impl Packet {
    /// Stable identifier of the packet kind, used for logging and routing.
    pub fn name(&self) -> &'static str {
        match self {
            Packet::Connect { .. } => "connect",
            Packet::Move { .. } => "move",
            Packet::Attack => "attack",
            Packet::LookAt { .. } => "look_at",
            Packet::Heartbeat => "heartbeat",
            Packet::Disconnect => "disconnect",
            Packet::Connected { .. } => "connected",
            Packet::Disconnected { .. } => "disconnected",
            Packet::LoadMap { .. } => "load_map",
            Packet::CreateActor { .. } => "create_actor",
            Packet::DestroyActor { .. } => "destroy_actor",
            Packet::SetActorPosition { .. } => "set_actor_position",
            Packet::ActorMove { .. } => "actor_move",
            Packet::ActorAttack { .. } => "actor_attack",
            Packet::ChatMessage { .. } => "chat_message",
            Packet::SpawnItem { .. } => "spawn_item",
            Packet::Vitals { .. } => "vitals",
        }
    }

    pub fn encode(&self) -> bincode::Result<Vec<u8>> {
        bincode::serialize(self)
    }

    pub fn decode(bytes: &[u8]) -> bincode::Result<Packet> {
        bincode::deserialize(bytes)
    }

    /// Shorthand for a server narration line.
    pub fn chat(text: impl Into<String>, color: ChatColor) -> Packet {
        Packet::ChatMessage {
            text: text.into(),
            color,
        }
    }
}
