//! Connected client tracking for the arena server
//!
//! This module handles the server-side bookkeeping of UDP clients:
//! - Client connection lifecycle (connect, disconnect, timeout)
//! - Which room, if any, each client currently sits in
//! - Connection health monitoring and automatic cleanup
//! - Client capacity management and address tracking
//!
//! Rooms never see addresses directly; they ask the server to route packets
//! through the addresses recorded here.

use log::info;
use shared::PlayerId;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::time::{Duration, Instant};

/// A connected client and the room it has joined
#[derive(Debug, Clone)]
pub struct Client {
    /// Unique client identifier assigned by the server, doubling as player id
    pub id: PlayerId,
    /// Network address for sending responses
    pub addr: SocketAddr,
    /// Last time we received any packet from this client
    pub last_seen: Instant,
    /// Code of the room the client is seated in
    pub room: Option<String>,
}

impl Client {
    pub fn new(id: PlayerId, addr: SocketAddr) -> Self {
        Self {
            id,
            addr,
            last_seen: Instant::now(),
            room: None,
        }
    }

    /// Checks if the client has exceeded the connection timeout
    ///
    /// Returns true if no packets have been received from this client
    /// within the specified timeout duration, indicating a likely disconnect.
    pub fn is_timed_out(&self, timeout: Duration) -> bool {
        self.last_seen.elapsed() > timeout
    }
}

/// Manages all connected clients
///
/// The ClientManager enforces the server capacity limit, hands out client ids
/// and remembers room membership so a departing client can be removed from
/// the right room.
pub struct ClientManager {
    /// Connected clients indexed by their unique ID
    clients: HashMap<PlayerId, Client>,
    /// Next available client ID for new connections
    next_client_id: PlayerId,
    /// Maximum number of concurrent clients allowed
    max_clients: usize,
}

impl ClientManager {
    /// Creates a new client manager with the specified capacity limit
    ///
    /// Client IDs start from 1 and increment for each new connection.
    pub fn new(max_clients: usize) -> Self {
        Self {
            clients: HashMap::new(),
            next_client_id: 1,
            max_clients,
        }
    }

    /// Attempts to add a new client connection
    ///
    /// Returns Some(client_id) if successful, None if server is at capacity.
    pub fn add_client(&mut self, addr: SocketAddr) -> Option<PlayerId> {
        if self.clients.len() >= self.max_clients {
            return None;
        }

        let client_id = self.next_client_id;
        self.next_client_id += 1;

        info!("Client {} connected from {}", client_id, addr);
        self.clients.insert(client_id, Client::new(client_id, addr));

        Some(client_id)
    }

    /// Removes a client from the server
    ///
    /// Returns the removed client so callers can also take it out of its
    /// room. Handles both explicit disconnections and timeout cleanup.
    pub fn remove_client(&mut self, client_id: PlayerId) -> Option<Client> {
        let removed = self.clients.remove(&client_id);
        if let Some(client) = &removed {
            info!("Client {} disconnected", client.id);
        }
        removed
    }

    /// Finds a client ID by their network address
    ///
    /// Used to associate incoming packets with existing client connections.
    pub fn find_client_by_addr(&self, addr: SocketAddr) -> Option<PlayerId> {
        self.clients
            .iter()
            .find(|(_, client)| client.addr == addr)
            .map(|(id, _)| *id)
    }

    /// Marks a client as active now
    pub fn touch(&mut self, client_id: PlayerId) {
        if let Some(client) = self.clients.get_mut(&client_id) {
            client.last_seen = Instant::now();
        }
    }

    pub fn set_room(&mut self, client_id: PlayerId, room: Option<String>) -> bool {
        match self.clients.get_mut(&client_id) {
            Some(client) => {
                client.room = room;
                true
            }
            None => false,
        }
    }

    pub fn room_of(&self, client_id: PlayerId) -> Option<&str> {
        self.clients.get(&client_id)?.room.as_deref()
    }

    pub fn addr_of(&self, client_id: PlayerId) -> Option<SocketAddr> {
        self.clients.get(&client_id).map(|client| client.addr)
    }

    /// Addresses of every client seated in `room_code`
    ///
    /// Used when broadcasting room snapshots.
    pub fn room_addrs(&self, room_code: &str) -> Vec<(PlayerId, SocketAddr)> {
        self.clients
            .values()
            .filter(|client| client.room.as_deref() == Some(room_code))
            .map(|client| (client.id, client.addr))
            .collect()
    }

    /// Clears the room of every client still pointing at `room_code`
    pub fn clear_room(&mut self, room_code: &str) {
        for client in self.clients.values_mut() {
            if client.room.as_deref() == Some(room_code) {
                client.room = None;
            }
        }
    }

    /// Checks for and removes timed-out clients
    ///
    /// Returns the removed clients, room membership included, so that the
    /// rooms they sat in can drop their players.
    pub fn check_timeouts(&mut self, timeout: Duration) -> Vec<Client> {
        let timed_out: Vec<PlayerId> = self
            .clients
            .iter()
            .filter(|(_, client)| client.is_timed_out(timeout))
            .map(|(id, _)| *id)
            .collect();

        timed_out
            .into_iter()
            .filter_map(|client_id| self.remove_client(client_id))
            .collect()
    }

    /// Returns the number of currently connected clients
    pub fn len(&self) -> usize {
        self.clients.len()
    }

    /// Returns true if no clients are currently connected
    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }
}
