//! Client connection tracking for the game server
//!
//! This module handles the server-side bookkeeping of connected clients:
//! - Player id allocation from the range reserved for players
//! - Address to id lookup for incoming datagrams
//! - Liveness tracking and timeout detection
//! - Capacity enforcement
//!
//! Ids handed out here stay in `1..=0xFFFF`. NPC ids are spawn slots shifted
//! into the upper half of the id space, so the two never meet.

use log::info;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::time::{Duration, Instant};

/// Highest id a player can receive.
pub const MAX_PLAYER_ID: u32 = 0xFFFF;

/// Silence after which a client is considered gone.
pub const CLIENT_TIMEOUT: Duration = Duration::from_secs(5);

/// A connected client
#[derive(Debug)]
pub struct Client {
    /// Player id assigned by the server
    pub id: u32,
    /// Network address for sending responses
    pub addr: SocketAddr,
    /// Last time we received any packet from this client
    pub last_seen: Instant,
}

impl Client {
    pub fn new(id: u32, addr: SocketAddr) -> Self {
        Self {
            id,
            addr,
            last_seen: Instant::now(),
        }
    }

    /// Returns true if no packets have been received from this client
    /// within `timeout`.
    pub fn is_timed_out(&self, timeout: Duration) -> bool {
        self.last_seen.elapsed() > timeout
    }
}

/// Manages all connected clients
///
/// Ids are handed out round-robin so a freshly freed id is not immediately
/// reused, and ids still in use are skipped when the counter wraps.
pub struct ClientManager {
    /// Connected clients indexed by their id
    clients: HashMap<u32, Client>,
    /// Next id to try for a new connection
    next_client_id: u32,
    /// Maximum number of concurrent clients allowed
    max_clients: usize,
}

impl ClientManager {
    /// Creates a new client manager. The limit never exceeds the number of
    /// available player ids.
    pub fn new(max_clients: usize) -> Self {
        Self {
            clients: HashMap::new(),
            next_client_id: 1,
            max_clients: max_clients.min(MAX_PLAYER_ID as usize),
        }
    }

    pub fn max_clients(&self) -> usize {
        self.max_clients
    }

    /// Attempts to register a new client connection
    ///
    /// Returns Some(client_id) if successful, None if the server is at capacity.
    pub fn add_client(&mut self, addr: SocketAddr) -> Option<u32> {
        if self.clients.len() >= self.max_clients {
            return None;
        }

        let client_id = self.allocate_id()?;
        info!("Client {} connected from {}", client_id, addr);
        self.clients.insert(client_id, Client::new(client_id, addr));

        Some(client_id)
    }

    fn allocate_id(&mut self) -> Option<u32> {
        for _ in 0..MAX_PLAYER_ID {
            let candidate = self.next_client_id;
            self.next_client_id = if candidate >= MAX_PLAYER_ID {
                1
            } else {
                candidate + 1
            };

            if !self.clients.contains_key(&candidate) {
                return Some(candidate);
            }
        }
        None
    }

    /// Removes a client. Returns false if they were already gone.
    pub fn remove_client(&mut self, client_id: u32) -> bool {
        if let Some(client) = self.clients.remove(&client_id) {
            info!("Client {} disconnected", client.id);
            true
        } else {
            false
        }
    }

    /// Finds a client id by network address
    ///
    /// Used to associate incoming packets with existing connections.
    pub fn find_client_by_addr(&self, addr: SocketAddr) -> Option<u32> {
        self.clients
            .iter()
            .find(|(_, client)| client.addr == addr)
            .map(|(id, _)| *id)
    }

    pub fn addr_of(&self, client_id: u32) -> Option<SocketAddr> {
        self.clients.get(&client_id).map(|client| client.addr)
    }

    /// Marks the client at `addr` as alive. Returns its id if known.
    pub fn touch(&mut self, addr: SocketAddr) -> Option<u32> {
        let client = self.clients.values_mut().find(|client| client.addr == addr)?;
        client.last_seen = Instant::now();
        Some(client.id)
    }

    /// Checks for and removes timed-out clients
    ///
    /// Returns the removed ids so the world can drop their players.
    pub fn check_timeouts(&mut self) -> Vec<u32> {
        let timed_out: Vec<u32> = self
            .clients
            .iter()
            .filter(|(_, client)| client.is_timed_out(CLIENT_TIMEOUT))
            .map(|(id, _)| *id)
            .collect();

        for client_id in &timed_out {
            self.remove_client(*client_id);
        }

        timed_out
    }

    /// Returns the number of currently connected clients
    pub fn len(&self) -> usize {
        self.clients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }
}
