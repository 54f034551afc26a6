//! Integration tests for the world simulation and its server shell
//!
//! These tests drive maps, NPCs and the UDP server through their public API
//! with a scripted player standing in for a real client.

use rand::rngs::StdRng;
use rand::SeedableRng;
use server::behavior::Behavior;
use server::combat;
use server::content::{
    ContentRepository, ItemId, LootEntry, MapInfo, NpcBehavior, NpcInfo, Stats,
};
use server::map::Map;
use server::npc::Npc;
use server::player::{Character, Frame, Player, Target};
use shared::{Direction, MovementType, Packet};
use std::sync::Arc;
use std::time::Duration;

/// Player with fixed combat numbers that keeps every packet it is sent.
struct FakePlayer {
    id: u32,
    character: Character,
    damage: Option<i32>,
    protection: i32,
    swings: usize,
    inbox: Vec<Packet>,
}

impl FakePlayer {
    fn new(id: u32, x: i32, y: i32) -> Self {
        Self {
            id,
            character: Character {
                name: format!("Tester{}", id),
                sprite: 2,
                x,
                y,
                direction: Direction::Down,
                player_killer: false,
                access_level: 0,
                hp: 40,
                max_hp: 40,
                mp: 0,
                max_mp: 0,
                sp: 0,
                max_sp: 0,
                level: 3,
                experience: 0,
                stats: Stats {
                    strength: 5,
                    defense: 5,
                    speed: 5,
                    intelligence: 0,
                },
            },
            damage: None,
            protection: 0,
            swings: 0,
            inbox: Vec::new(),
        }
    }

    fn hitting_for(mut self, damage: i32) -> Self {
        self.damage = Some(damage);
        self
    }

    fn count<F: Fn(&Packet) -> bool>(&self, pred: F) -> usize {
        self.inbox.iter().filter(|p| pred(p)).count()
    }
}

impl Player for FakePlayer {
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
        self.inbox.push(Packet::decode(frame).unwrap());
    }

    fn protection(&self) -> i32 {
        self.protection
    }

    fn block(&mut self) -> Option<ItemId> {
        None
    }

    fn grant_experience(&mut self, amount: i64) {
        self.character.experience += amount;
    }

    fn die(&mut self, experience_loss: i64) {
        self.character.experience -= experience_loss;
        self.character.restore();
    }

    fn sync_vitals(&mut self) {}

    fn attack(&mut self, _npc: &Npc) -> Option<i32> {
        self.swings += 1;
        self.damage
    }

    fn set_target(&mut self, _target: Target) {}

    fn update(&mut self, _dt: f32) {}
}

fn open_field(width: usize, height: usize) -> MapInfo {
    let rows: Vec<String> = (0..height).map(|_| ".".repeat(width)).collect();
    MapInfo::from_layout(1, "Field", &rows).unwrap()
}

fn rat(loot: Vec<LootEntry>) -> Arc<NpcInfo> {
    Arc::new(NpcInfo {
        id: 1,
        name: "Rat".to_string(),
        sprite: 12,
        behavior: NpcBehavior::Monster,
        aggression_range: 3,
        stats: Stats {
            strength: 4,
            defense: 3,
            speed: 2,
            intelligence: 1,
        },
        spawn_secs: 10.0,
        loot,
    })
}

fn field_with_rat(loot: Vec<LootEntry>) -> Map<FakePlayer> {
    let npc = Npc::new(1, rat(loot), 5, 5);
    Map::new(Arc::new(open_field(12, 12)), vec![npc], StdRng::seed_from_u64(99))
}

/// MAP RULE TESTS
mod map_tests {
    use super::*;

    #[test]
    fn blocked_tiles_stay_impassable() {
        let info = MapInfo::from_layout(1, "Hall", &["....", ".##.", "...."]).unwrap();
        let mut map: Map<FakePlayer> =
            Map::new(Arc::new(info), vec![], StdRng::seed_from_u64(1));

        map.add(FakePlayer::new(1, 0, 0));
        map.add(FakePlayer::new(2, 3, 2));

        for (x, y) in [(1, 1), (2, 1), (-1, 0), (4, 0), (0, 3)] {
            assert!(!map.is_passable(x, y), "({}, {}) should be blocked", x, y);
        }
        assert!(!map.is_passable(0, 0));
        assert!(map.is_passable(3, 0));
    }

    #[test]
    fn move_into_wall_is_corrected() {
        let info = MapInfo::from_layout(
            1,
            "Hall",
            &["........", "........", "........", "........", "........", "......#.", "........"],
        )
        .unwrap();
        let mut map: Map<FakePlayer> =
            Map::new(Arc::new(info), vec![], StdRng::seed_from_u64(1));
        map.add(FakePlayer::new(1, 5, 5));

        map.move_player(1, Direction::Right, MovementType::Walk);

        let player = map.player(1).unwrap();
        assert_eq!(player.character().position(), (5, 5));
        assert_eq!(
            player.inbox.last(),
            Some(&Packet::SetActorPosition {
                id: 1,
                direction: Direction::Right,
                x: 5,
                y: 5
            })
        );
    }

    #[test]
    fn players_cannot_share_a_tile() {
        let mut map = field_with_rat(vec![]);
        map.add(FakePlayer::new(1, 2, 2));
        map.add(FakePlayer::new(2, 3, 2));

        map.move_player(1, Direction::Right, MovementType::Walk);
        map.move_player(2, Direction::Left, MovementType::Walk);

        assert_eq!(map.player(1).unwrap().character().position(), (2, 2));
        assert_eq!(map.player(2).unwrap().character().position(), (3, 2));
    }

    #[test]
    fn leaving_twice_is_harmless() {
        let mut map = field_with_rat(vec![]);
        map.add(FakePlayer::new(1, 2, 2));
        map.add(FakePlayer::new(2, 8, 8));

        assert!(map.remove(1).is_some());
        assert!(map.remove(1).is_none());

        let watcher = map.player(2).unwrap();
        assert_eq!(
            watcher.count(|p| matches!(p, Packet::DestroyActor { id: 1 })),
            1
        );
    }
}

/// NPC BEHAVIOR TESTS
mod npc_behavior_tests {
    use super::*;

    #[test]
    fn hit_npc_hunts_then_attacks_then_gives_chase() {
        let mut map = field_with_rat(vec![]);
        map.add(FakePlayer::new(1, 5, 4).hitting_for(1));

        map.attack(1);
        assert!(matches!(map.npcs()[0].behavior(), Behavior::Hunt { target: 1, .. }));

        map.update(0.05);
        assert!(matches!(map.npcs()[0].behavior(), Behavior::Attack { target: 1, .. }));

        map.player_mut(1).unwrap().character_mut().y = 1;
        map.update(0.05);
        assert!(matches!(map.npcs()[0].behavior(), Behavior::Hunt { target: 1, .. }));
    }

    #[test]
    fn npc_loses_interest_when_target_leaves() {
        let mut map = field_with_rat(vec![]);
        map.add(FakePlayer::new(1, 5, 4).hitting_for(1));
        map.add(FakePlayer::new(2, 0, 0));
        map.attack(1);

        map.remove(1);
        map.update(0.05);

        assert!(map.npcs()[0].behavior().is_idle());
    }

    #[test]
    fn hunting_npc_closes_distance() {
        let mut map = field_with_rat(vec![]);
        map.add(FakePlayer::new(1, 5, 4).hitting_for(1));
        map.attack(1);
        map.player_mut(1).unwrap().character_mut().x = 11;
        map.player_mut(1).unwrap().character_mut().y = 11;

        let distance = |map: &Map<FakePlayer>| {
            let (x, y) = map.npcs()[0].position();
            (x - 11).abs() + (y - 11).abs()
        };
        let before = distance(&map);
        for _ in 0..4 {
            map.update(0.5);
        }

        assert_eq!(distance(&map), before - 4);
    }

    #[test]
    fn kill_broadcasts_destroy_once_and_respawns_after_delay() {
        let mut map = field_with_rat(vec![]);
        map.add(FakePlayer::new(1, 5, 3).hitting_for(5));
        let npc_id = map.npcs()[0].id();

        map.move_player(1, Direction::Down, MovementType::Walk);
        assert_eq!(map.player(1).unwrap().character().position(), (5, 4));

        for _ in 0..6 {
            map.attack(1);
        }

        let player = map.player(1).unwrap();
        assert_eq!(player.swings, 3);
        assert_eq!(
            player.count(|p| *p == Packet::DestroyActor { id: npc_id }),
            1
        );
        assert_eq!(map.npcs()[0].health(), 0);
        assert!(matches!(map.npcs()[0].behavior(), Behavior::Dead { .. }));
        assert!(map.is_passable(5, 5));

        for _ in 0..19 {
            map.update(0.5);
        }
        assert!(!map.npcs()[0].is_alive());

        map.update(0.5);
        let npc = &map.npcs()[0];
        assert!(npc.behavior().is_idle());
        assert_eq!(npc.health(), 12);
        assert_eq!(npc.position(), (5, 5));
        assert_eq!(
            map.player(1)
                .unwrap()
                .count(|p| matches!(p, Packet::CreateActor { id, .. } if *id == npc_id)),
            2
        );
    }

    #[test]
    fn respawn_waits_for_a_free_tile() {
        let mut map = field_with_rat(vec![]);
        map.add(FakePlayer::new(1, 5, 4).hitting_for(50));
        map.attack(1);

        let player = map.player_mut(1).unwrap().character_mut();
        player.x = 5;
        player.y = 5;

        map.update(10.0);
        assert!(!map.npcs()[0].is_alive());

        map.player_mut(1).unwrap().character_mut().y = 9;
        map.update(0.05);
        assert!(map.npcs()[0].is_alive());
    }

    #[test]
    fn npc_kills_player_and_returns_to_idle() {
        let mut map = field_with_rat(vec![]);
        let mut victim = FakePlayer::new(1, 5, 4).hitting_for(1);
        victim.character.hp = 3;
        victim.character.experience = 200;
        map.add(victim);
        map.attack(1);

        map.update(0.05);
        map.update(1.0);

        let player = map.player(1).unwrap();
        assert_eq!(player.character().experience, 180);
        assert_eq!(player.character().hp, player.character().max_hp);
        assert!(map.npcs()[0].behavior().is_idle());
    }
}

/// COMBAT AND LOOT TESTS
mod combat_tests {
    use super::*;

    #[test]
    fn protection_above_strength_deals_nothing() {
        assert_eq!(combat::damage(4, 10), 0);

        let mut map = field_with_rat(vec![]);
        let mut tank = FakePlayer::new(1, 5, 4).hitting_for(1);
        tank.protection = 10;
        map.add(tank);
        map.attack(1);

        map.update(0.05);
        map.update(1.0);
        map.update(1.0);

        let player = map.player(1).unwrap();
        assert_eq!(player.character().hp, player.character().max_hp);
    }

    #[test]
    fn guaranteed_loot_always_drops_once() {
        let loot = vec![LootEntry {
            item_id: 3,
            drop_rate: 100,
            min_quantity: 1,
            max_quantity: 1,
        }];
        let mut map = field_with_rat(loot);
        map.add(FakePlayer::new(1, 5, 4).hitting_for(100));

        map.attack(1);

        assert_eq!(map.items().len(), 1);
        assert_eq!(map.items()[0].item_id, 3);
        assert_eq!(map.items()[0].quantity, 1);
        assert_eq!(map.items()[0].position(), (5, 5));
        assert_eq!(
            map.player(1)
                .unwrap()
                .count(|p| matches!(p, Packet::SpawnItem { item_id: 3, .. })),
            1
        );
    }

    #[test]
    fn impossible_loot_never_drops() {
        let loot = vec![LootEntry {
            item_id: 3,
            drop_rate: 0,
            min_quantity: 1,
            max_quantity: 1,
        }];
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..1000 {
            assert!(combat::roll_loot(&loot, &mut rng).is_empty());
        }

        let mut map = field_with_rat(loot);
        map.add(FakePlayer::new(1, 5, 4).hitting_for(100));
        map.attack(1);
        assert!(map.items().is_empty());
    }

    #[test]
    fn newcomer_sees_existing_loot() {
        let loot = vec![LootEntry {
            item_id: 4,
            drop_rate: 100,
            min_quantity: 2,
            max_quantity: 2,
        }];
        let mut map = field_with_rat(loot);
        map.add(FakePlayer::new(1, 5, 4).hitting_for(100));
        map.attack(1);

        map.add(FakePlayer::new(2, 0, 0));

        let newcomer = map.player(2).unwrap();
        assert!(newcomer.inbox.contains(&Packet::SpawnItem {
            item_id: 4,
            quantity: 2,
            x: 5,
            y: 5
        }));
        assert_eq!(
            newcomer.count(|p| matches!(p, Packet::CreateActor { id, .. } if *id > 0xFFFF)),
            0
        );
    }
}

/// WORLD AND WARP TESTS
mod world_tests {
    use super::*;
    use server::world::World;

    #[test]
    fn builtin_world_warps_between_maps() {
        let content = ContentRepository::builtin().unwrap();
        let mut world: World<FakePlayer> = World::new(&content, Some(1));
        world.join(FakePlayer::new(1, 17, 10), 1).ok().unwrap();

        world.move_player(1, Direction::Right, MovementType::Walk);
        assert_eq!(world.location(1), Some(2));

        world.move_player(1, Direction::Down, MovementType::Walk);
        assert_eq!(world.player(1).unwrap().character().position(), (1, 2));
    }

    #[test]
    fn npc_ids_never_collide_with_player_ids() {
        let content = ContentRepository::builtin().unwrap();
        let world: World<FakePlayer> = World::new(&content, None);

        for map in world.maps() {
            for npc in map.npcs() {
                assert!(npc.id() > 0xFFFF);
                assert_eq!(npc.id() & 0xFFFF, 0);
            }
        }
    }
}

/// NETWORK ROUND TRIP TESTS
mod network_tests {
    use super::*;
    use server::network::Server;
    use shared::{MAX_DATAGRAM_SIZE, PROTOCOL_VERSION};
    use tokio::net::UdpSocket;
    use tokio::sync::oneshot;
    use tokio::time::timeout;

    async fn recv(socket: &UdpSocket) -> Packet {
        let mut buf = [0u8; MAX_DATAGRAM_SIZE];
        let (len, _) = timeout(Duration::from_secs(2), socket.recv_from(&mut buf))
            .await
            .expect("server did not answer")
            .unwrap();
        Packet::decode(&buf[..len]).unwrap()
    }

    #[tokio::test]
    async fn connect_play_and_disconnect() {
        let content = ContentRepository::builtin().unwrap();
        let mut server = Server::new("127.0.0.1:0", Duration::from_millis(10), 4, content, Some(5))
            .await
            .unwrap();
        let server_addr = server.local_addr().unwrap();

        let (stop_tx, stop_rx) = oneshot::channel::<()>();
        let handle = tokio::spawn(async move {
            server
                .run_until(async {
                    let _ = stop_rx.await;
                })
                .await
                .unwrap();
            server
        });

        let client = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let connect = Packet::Connect {
            client_version: PROTOCOL_VERSION,
            name: "Integration".to_string(),
        };
        client.send_to(&connect.encode().unwrap(), server_addr).await.unwrap();

        assert_eq!(recv(&client).await, Packet::Connected { client_id: 1 });
        assert_eq!(recv(&client).await, Packet::LoadMap { map_id: 1 });

        let mut saw_self = false;
        for _ in 0..8 {
            if let Packet::CreateActor { id: 1, name, .. } = recv(&client).await {
                assert_eq!(name, "Integration");
                saw_self = true;
                break;
            }
        }
        assert!(saw_self);

        client
            .send_to(&Packet::Disconnect.encode().unwrap(), server_addr)
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;

        stop_tx.send(()).unwrap();
        let server = timeout(Duration::from_secs(2), handle).await.unwrap().unwrap();
        assert_eq!(server.world().player_count(), 0);
    }

    #[tokio::test]
    async fn wrong_version_is_turned_away() {
        let content = ContentRepository::builtin().unwrap();
        let mut server = Server::new("127.0.0.1:0", Duration::from_millis(10), 4, content, None)
            .await
            .unwrap();
        let server_addr = server.local_addr().unwrap();
        let stop = server.shutdown_handle();
        let handle = tokio::spawn(async move {
            server.run_until(std::future::pending()).await.unwrap();
        });

        let client = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let connect = Packet::Connect {
            client_version: PROTOCOL_VERSION + 7,
            name: "Old".to_string(),
        };
        client.send_to(&connect.encode().unwrap(), server_addr).await.unwrap();

        assert!(matches!(recv(&client).await, Packet::Disconnected { .. }));

        stop.send(server::network::ServerMessage::Shutdown).unwrap();
        timeout(Duration::from_secs(2), handle).await.unwrap().unwrap();
    }
}
