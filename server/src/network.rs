//! Server network layer handling UDP communications and game loop coordination

use crate::client_manager::ClientManager;
use crate::content::ContentRepository;
use crate::player::{encode_frame, Frame, ServerPlayer};
use crate::world::World;
use log::{debug, error, info, warn};
use rand::rngs::StdRng;
use rand::SeedableRng;
use shared::{Packet, MAX_DATAGRAM_SIZE, PROTOCOL_VERSION};
use std::error::Error;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::net::UdpSocket;
use tokio::sync::{mpsc, RwLock};
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};

/// Longest simulated step after a stall.
pub const MAX_TICK_DELTA: Duration = Duration::from_millis(250);

/// Longest character name kept from a connect request.
pub const MAX_NAME_LENGTH: usize = 16;

/// Messages sent from network tasks to main server loop
#[derive(Debug)]
pub enum ServerMessage {
    PacketReceived { packet: Packet, addr: SocketAddr },
    ClientTimeout { client_id: u32 },
    Shutdown,
}

/// Messages sent from game loop to network tasks
#[derive(Debug)]
pub enum GameMessage {
    SendFrame { frame: Frame, addr: SocketAddr },
}

/// Keeps letters, digits and inner spaces of a requested name. Falls back to
/// `Player<id>` when nothing usable is left.
pub fn sanitize_name(requested: &str, client_id: u32) -> String {
    let name: String = requested
        .chars()
        .filter(|c| c.is_alphanumeric() || *c == ' ')
        .take(MAX_NAME_LENGTH)
        .collect();
    let name = name.trim();

    if name.is_empty() {
        format!("Player{}", client_id)
    } else {
        name.to_string()
    }
}

/// Random stream for one player's rolls. Seeded runs keep player streams apart
/// from the per-map streams, which only use the low bits.
fn player_rng(seed: Option<u64>, client_id: u32) -> StdRng {
    match seed {
        Some(seed) => StdRng::seed_from_u64(seed.wrapping_add(u64::from(client_id) << 32)),
        None => StdRng::from_entropy(),
    }
}

/// Main server coordinating networking and the world simulation
pub struct Server {
    socket: Arc<UdpSocket>,
    clients: Arc<RwLock<ClientManager>>,
    content: ContentRepository,
    world: World<ServerPlayer>,
    tick_duration: Duration,
    tick: u64,
    seed: Option<u64>,

    /// Network events waiting for the next tick
    pending: Vec<ServerMessage>,

    // Communication channels
    server_tx: mpsc::UnboundedSender<ServerMessage>,
    server_rx: mpsc::UnboundedReceiver<ServerMessage>,
    game_tx: mpsc::UnboundedSender<GameMessage>,
    game_rx: Option<mpsc::UnboundedReceiver<GameMessage>>,
}

impl Server {
    pub async fn new(
        addr: &str,
        tick_duration: Duration,
        max_clients: usize,
        content: ContentRepository,
        seed: Option<u64>,
    ) -> Result<Self, Box<dyn Error + Send + Sync>> {
        let socket = Arc::new(UdpSocket::bind(addr).await?);
        info!("Server listening on {}", socket.local_addr()?);

        let (server_tx, server_rx) = mpsc::unbounded_channel();
        let (game_tx, game_rx) = mpsc::unbounded_channel();
        let world = World::new(&content, seed);

        Ok(Server {
            socket,
            clients: Arc::new(RwLock::new(ClientManager::new(max_clients))),
            content,
            world,
            tick_duration,
            tick: 0,
            seed,
            pending: Vec::new(),
            server_tx,
            server_rx,
            game_tx,
            game_rx: Some(game_rx),
        })
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.socket.local_addr()
    }

    pub fn world(&self) -> &World<ServerPlayer> {
        &self.world
    }

    /// Handle for asking a running server to stop.
    pub fn shutdown_handle(&self) -> mpsc::UnboundedSender<ServerMessage> {
        self.server_tx.clone()
    }

    /// Spawns task that continuously listens for incoming packets
    fn spawn_network_receiver(&self) -> JoinHandle<()> {
        let socket = Arc::clone(&self.socket);
        let server_tx = self.server_tx.clone();

        tokio::spawn(async move {
            let mut buffer = [0u8; MAX_DATAGRAM_SIZE];

            loop {
                match socket.recv_from(&mut buffer).await {
                    Ok((len, addr)) => match Packet::decode(&buffer[..len]) {
                        Ok(packet) => {
                            if let Err(e) =
                                server_tx.send(ServerMessage::PacketReceived { packet, addr })
                            {
                                error!("Failed to send packet to main loop: {}", e);
                                break;
                            }
                        }
                        Err(e) => warn!("Failed to decode datagram from {}: {}", addr, e),
                    },
                    Err(e) => {
                        error!("Error receiving packet: {}", e);
                        tokio::time::sleep(Duration::from_millis(10)).await;
                    }
                }
            }
        })
    }

    /// Spawns task that writes queued frames to the socket
    fn spawn_network_sender(&mut self) -> Option<JoinHandle<()>> {
        let socket = Arc::clone(&self.socket);
        let mut game_rx = self.game_rx.take()?;

        Some(tokio::spawn(async move {
            while let Some(GameMessage::SendFrame { frame, addr }) = game_rx.recv().await {
                if let Err(e) = socket.send_to(&frame, addr).await {
                    error!("Failed to send frame to {}: {}", addr, e);
                }
            }
        }))
    }

    /// Spawns task that monitors client timeouts
    fn spawn_timeout_checker(&self) -> JoinHandle<()> {
        let clients = Arc::clone(&self.clients);
        let server_tx = self.server_tx.clone();

        tokio::spawn(async move {
            let mut interval = interval(Duration::from_secs(1));

            loop {
                interval.tick().await;

                let timed_out = {
                    let mut clients_guard = clients.write().await;
                    clients_guard.check_timeouts()
                };

                for client_id in timed_out {
                    if let Err(e) = server_tx.send(ServerMessage::ClientTimeout { client_id }) {
                        error!("Failed to send timeout message: {}", e);
                        return;
                    }
                }
            }
        })
    }

    /// Queues a packet for an address that may not have a player yet.
    fn send_packet(&self, packet: &Packet, addr: SocketAddr) {
        let Some(frame) = encode_frame(packet) else {
            return;
        };
        if let Err(e) = self.game_tx.send(GameMessage::SendFrame { frame, addr }) {
            error!("Failed to queue {} packet: {}", packet.name(), e);
        }
    }

    async fn handle_connect(&mut self, client_version: u32, name: String, addr: SocketAddr) {
        info!(
            "Client connecting from {} (version: {}, name: {:?})",
            addr, client_version, name
        );

        if client_version != PROTOCOL_VERSION {
            warn!("Rejecting {}: protocol version {}", addr, client_version);
            self.send_packet(
                &Packet::Disconnected {
                    reason: "Protocol version mismatch".to_string(),
                },
                addr,
            );
            return;
        }

        // Remove existing connection if present
        let existing_client_id = {
            let clients = self.clients.read().await;
            clients.find_client_by_addr(addr)
        };
        if let Some(existing_id) = existing_client_id {
            info!("Removing existing client {} from {}", existing_id, addr);
            self.clients.write().await.remove_client(existing_id);
            self.world.leave(existing_id);
        }

        let client_id = {
            let mut clients = self.clients.write().await;
            clients.add_client(addr)
        };
        let Some(client_id) = client_id else {
            warn!("Rejecting {}: server full", addr);
            self.send_packet(
                &Packet::Disconnected {
                    reason: "Server full".to_string(),
                },
                addr,
            );
            return;
        };

        let template = self.content.new_character();
        let player = ServerPlayer::new(
            client_id,
            addr,
            sanitize_name(&name, client_id),
            template,
            player_rng(self.seed, client_id),
            self.game_tx.clone(),
        );

        self.send_packet(&Packet::Connected { client_id }, addr);
        if self.world.join(player, template.map).is_err() {
            warn!("No room for client {} on map {}", client_id, template.map);
            self.clients.write().await.remove_client(client_id);
            self.send_packet(
                &Packet::Disconnected {
                    reason: "No room on the starting map".to_string(),
                },
                addr,
            );
        }
    }

    /// Applies one client packet to the world
    async fn handle_packet(&mut self, packet: Packet, addr: SocketAddr) {
        if let Packet::Connect {
            client_version,
            name,
        } = packet
        {
            self.handle_connect(client_version, name, addr).await;
            return;
        }

        let client_id = {
            let mut clients = self.clients.write().await;
            clients.touch(addr)
        };
        let Some(client_id) = client_id else {
            debug!("Ignoring {} packet from unknown {}", packet.name(), addr);
            return;
        };

        match packet {
            Packet::Move {
                direction,
                movement_type,
            } => {
                self.world.move_player(client_id, direction, movement_type);
            }
            Packet::Attack => self.world.attack(client_id),
            Packet::LookAt { x, y } => self.world.look_at(client_id, x, y),
            Packet::Heartbeat => {}
            Packet::Disconnect => {
                self.clients.write().await.remove_client(client_id);
                self.world.leave(client_id);
            }
            other => {
                warn!(
                    "Unexpected {} packet from client {} at {}",
                    other.name(),
                    client_id,
                    addr
                );
            }
        }
    }

    async fn handle_message(&mut self, message: ServerMessage) {
        match message {
            ServerMessage::PacketReceived { packet, addr } => {
                self.handle_packet(packet, addr).await;
            }
            ServerMessage::ClientTimeout { client_id } => {
                info!("Client {} timed out", client_id);
                self.world.leave(client_id);
            }
            ServerMessage::Shutdown => {}
        }
    }

    /// Drains buffered events, then advances the world
    async fn run_tick(&mut self, dt: f32) {
        for message in std::mem::take(&mut self.pending) {
            self.handle_message(message).await;
        }

        self.world.update(dt);
        self.tick += 1;

        if self.tick % 300 == 0 {
            let client_count = self.clients.read().await.len();
            if client_count > 0 {
                debug!(
                    "Tick {}: {} clients, {} in world, {:.1}Hz",
                    self.tick,
                    client_count,
                    self.world.player_count(),
                    1.0 / dt
                );
            }
        }
    }

    /// Main server loop. Returns once `shutdown` resolves or a
    /// [`ServerMessage::Shutdown`] arrives, after the tick in progress.
    pub async fn run_until<F>(&mut self, shutdown: F) -> Result<(), Box<dyn Error + Send + Sync>>
    where
        F: Future<Output = ()>,
    {
        let mut tasks = vec![self.spawn_network_receiver(), self.spawn_timeout_checker()];
        tasks.extend(self.spawn_network_sender());

        let mut tick_interval = interval(self.tick_duration);
        tick_interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut last_tick = Instant::now();
        tokio::pin!(shutdown);

        info!("Server started successfully");

        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    info!("Shutdown requested");
                    break;
                }

                message = self.server_rx.recv() => match message {
                    Some(ServerMessage::Shutdown) | None => {
                        info!("Server shutting down");
                        break;
                    }
                    Some(message) => self.pending.push(message),
                },

                _ = tick_interval.tick() => {
                    let now = Instant::now();
                    let mut elapsed = now.duration_since(last_tick);
                    last_tick = now;

                    if elapsed > MAX_TICK_DELTA {
                        warn!(
                            "Large tick delta ({:.3}s), capping to {:.3}s",
                            elapsed.as_secs_f32(),
                            MAX_TICK_DELTA.as_secs_f32()
                        );
                        elapsed = MAX_TICK_DELTA;
                    }

                    self.run_tick(elapsed.as_secs_f32()).await;
                }
            }
        }

        for task in tasks {
            task.abort();
        }
        info!("Server stopped after {} ticks", self.tick);
        Ok(())
    }
}
