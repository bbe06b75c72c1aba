//! Server network layer handling UDP communications and room routing

use crate::client_manager::ClientManager;
use crate::config::GameConfig;
use crate::game::Room;
use crate::rooms::{spawn_room, RoomCommand, RoomError, RoomEvent, RoomHandle};
use crate::utils::generate_room_code;
use bincode::{deserialize, serialize};
use log::{debug, error, info, warn};
use shared::{Packet, PlayerId, PROTOCOL_VERSION};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::sync::{mpsc, RwLock};

/// Large enough for a full room snapshot on the biggest board.
pub const MAX_DATAGRAM_SIZE: usize = 65_507;

/// Messages sent from network tasks to main server loop
#[derive(Debug)]
pub enum ServerMessage {
    PacketReceived {
        packet: Packet,
        addr: SocketAddr,
    },
    ClientTimeout {
        client_id: PlayerId,
        room_code: Option<String>,
    },
    Shutdown,
}

/// Messages sent from the server loop and room actors to the sender task
#[derive(Debug)]
pub enum GameMessage {
    SendPacket {
        packet: Packet,
        addr: SocketAddr,
    },
    /// Routed through the client manager; players without a live client
    /// are skipped.
    SendToPlayers {
        players: Vec<PlayerId>,
        packet: Packet,
    },
}

/// Upper-cases a client supplied room code for registry lookups
pub fn normalize_room_code(code: &str) -> String {
    code.trim().to_ascii_uppercase()
}

/// Main server coordinating client sessions and room actors
pub struct Server {
    socket: Arc<UdpSocket>,
    clients: Arc<RwLock<ClientManager>>,
    rooms: HashMap<String, RoomHandle>,
    config: GameConfig,

    // Communication channels
    server_tx: mpsc::UnboundedSender<ServerMessage>,
    server_rx: mpsc::UnboundedReceiver<ServerMessage>,
    game_tx: mpsc::UnboundedSender<GameMessage>,
    game_rx: mpsc::UnboundedReceiver<GameMessage>,
    room_events_tx: mpsc::UnboundedSender<RoomEvent>,
    room_events_rx: mpsc::UnboundedReceiver<RoomEvent>,
}

impl Server {
    pub async fn new(addr: &str, config: GameConfig) -> Result<Self, Box<dyn std::error::Error>> {
        let socket = Arc::new(UdpSocket::bind(addr).await?);
        info!("Server listening on {}", socket.local_addr()?);

        let (server_tx, server_rx) = mpsc::unbounded_channel();
        let (game_tx, game_rx) = mpsc::unbounded_channel();
        let (room_events_tx, room_events_rx) = mpsc::unbounded_channel();

        Ok(Server {
            socket,
            clients: Arc::new(RwLock::new(ClientManager::new(config.max_clients))),
            rooms: HashMap::new(),
            config,
            server_tx,
            server_rx,
            game_tx,
            game_rx,
            room_events_tx,
            room_events_rx,
        })
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.socket.local_addr()
    }

    /// Sender that can stop `run` with `ServerMessage::Shutdown`
    pub fn control(&self) -> mpsc::UnboundedSender<ServerMessage> {
        self.server_tx.clone()
    }

    /// Spawns task that continuously listens for incoming packets
    fn spawn_network_receiver(&self) {
        let socket = Arc::clone(&self.socket);
        let server_tx = self.server_tx.clone();

        tokio::spawn(async move {
            let mut buffer = vec![0u8; MAX_DATAGRAM_SIZE];

            loop {
                match socket.recv_from(&mut buffer).await {
                    Ok((len, addr)) => {
                        if let Ok(packet) = deserialize::<Packet>(&buffer[0..len]) {
                            if let Err(e) =
                                server_tx.send(ServerMessage::PacketReceived { packet, addr })
                            {
                                error!("Failed to send packet to main loop: {}", e);
                                break;
                            }
                        } else {
                            warn!("Failed to deserialize packet from {}", addr);
                        }
                    }
                    Err(e) => {
                        error!("Error receiving packet: {}", e);
                        tokio::time::sleep(Duration::from_millis(10)).await;
                    }
                }
            }
        });
    }

    /// Spawns task that processes outgoing packet queue
    fn spawn_network_sender(&mut self) {
        let socket = Arc::clone(&self.socket);
        let clients = Arc::clone(&self.clients);
        let mut game_rx = std::mem::replace(&mut self.game_rx, mpsc::unbounded_channel().1);

        tokio::spawn(async move {
            while let Some(message) = game_rx.recv().await {
                match message {
                    GameMessage::SendPacket { packet, addr } => {
                        if let Err(e) = Self::send_packet_impl(&socket, &packet, addr).await {
                            error!("Failed to send packet to {}: {}", addr, e);
                        }
                    }
                    GameMessage::SendToPlayers { players, packet } => {
                        let addrs: Vec<(PlayerId, SocketAddr)> = {
                            let clients_guard = clients.read().await;
                            players
                                .iter()
                                .filter_map(|id| clients_guard.addr_of(*id).map(|addr| (*id, addr)))
                                .collect()
                        };

                        for (client_id, addr) in addrs {
                            if let Err(e) = Self::send_packet_impl(&socket, &packet, addr).await {
                                error!("Failed to send to client {}: {}", client_id, e);
                            }
                        }
                    }
                }
            }
        });
    }

    /// Spawns task that monitors client timeouts
    fn spawn_timeout_checker(&self) {
        let clients = Arc::clone(&self.clients);
        let server_tx = self.server_tx.clone();
        let timeout = self.config.client_timeout;

        tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs(1));

            loop {
                interval.tick().await;

                let timed_out = {
                    let mut clients_guard = clients.write().await;
                    clients_guard.check_timeouts(timeout)
                };

                for client in timed_out {
                    info!("Client {} timed out", client.id);
                    if let Err(e) = server_tx.send(ServerMessage::ClientTimeout {
                        client_id: client.id,
                        room_code: client.room,
                    }) {
                        error!("Failed to send timeout message: {}", e);
                        return;
                    }
                }
            }
        });
    }

    async fn send_packet_impl(
        socket: &UdpSocket,
        packet: &Packet,
        addr: SocketAddr,
    ) -> Result<(), Box<dyn std::error::Error>> {
        let data = serialize(packet)?;
        socket.send_to(&data, addr).await?;
        Ok(())
    }

    fn send_packet(&self, packet: Packet, addr: SocketAddr) {
        if let Err(e) = self.game_tx.send(GameMessage::SendPacket { packet, addr }) {
            error!("Failed to queue packet for sending: {}", e);
        }
    }

    fn reject(&self, reason: &str, addr: SocketAddr) {
        self.send_packet(
            Packet::Rejected {
                reason: reason.to_string(),
            },
            addr,
        );
    }

    /// A fresh code not used by any live room
    fn unique_room_code(&self) -> String {
        let mut rng = rand::thread_rng();
        loop {
            let code = generate_room_code(&mut rng);
            if !self.rooms.contains_key(&code) {
                return code;
            }
        }
    }

    /// Takes a client out of its room, if it is in one
    async fn leave_room(&mut self, client_id: PlayerId, room_code: Option<String>) {
        let Some(code) = room_code else {
            return;
        };
        self.clients.write().await.set_room(client_id, None);

        let closed = self
            .rooms
            .get(&code)
            .map_or(false, |handle| handle.send(RoomCommand::Leave { client_id }).is_err());
        if closed {
            debug!("Room {} already closed", code);
            self.rooms.remove(&code);
        }
    }

    /// Forwards a command to the room the client sits in
    async fn forward_to_room(&mut self, client_id: PlayerId, addr: SocketAddr, command: RoomCommand) {
        let room_code = self.clients.read().await.room_of(client_id).map(str::to_string);
        let Some(code) = room_code else {
            self.reject("Not in a room", addr);
            return;
        };

        let closed = match self.rooms.get(&code) {
            Some(handle) => handle.send(command).is_err(),
            None => true,
        };
        if closed {
            self.rooms.remove(&code);
            self.clients.write().await.set_room(client_id, None);
            self.reject("Room not found", addr);
        }
    }

    async fn create_room(&mut self, client_id: PlayerId, addr: SocketAddr, packet: Packet) {
        let Packet::CreateRoom {
            name,
            grid_size,
            duration_secs,
            food_policy,
        } = packet
        else {
            return;
        };

        let code = self.unique_room_code();
        let config = self.config.room_config(grid_size, duration_secs, food_policy);
        info!(
            "Client {} creating room {} ({}x{}, {}s, food {})",
            client_id,
            code,
            config.grid_size,
            config.grid_size,
            config.match_duration_ms / 1000,
            config.food_policy
        );

        self.clients
            .write()
            .await
            .set_room(client_id, Some(code.clone()));
        self.send_packet(
            Packet::RoomJoined {
                room_code: code.clone(),
                player_id: client_id,
            },
            addr,
        );

        let room = Room::new(code.clone(), config, client_id, name);
        let handle = spawn_room(room, self.game_tx.clone(), self.room_events_tx.clone());
        self.rooms.insert(code, handle);
    }

    async fn join_room(&mut self, client_id: PlayerId, addr: SocketAddr, room_code: String, name: String) {
        let code = normalize_room_code(&room_code);
        let Some(handle) = self.rooms.get(&code).cloned() else {
            self.reject("Room not found", addr);
            return;
        };

        match handle.join(client_id, name).await {
            Ok(()) => {
                self.clients
                    .write()
                    .await
                    .set_room(client_id, Some(code.clone()));
                self.send_packet(
                    Packet::RoomJoined {
                        room_code: code,
                        player_id: client_id,
                    },
                    addr,
                );
            }
            Err(RoomError::Join(e)) => self.reject(&e.to_string(), addr),
            Err(RoomError::Closed) => {
                self.rooms.remove(&code);
                self.reject("Room not found", addr);
            }
        }
    }

    /// Processes incoming packets and routes them to rooms
    async fn handle_packet(&mut self, packet: Packet, addr: SocketAddr) {
        if let Packet::Connect { client_version } = packet {
            info!(
                "Client connecting from {} (version: {})",
                addr, client_version
            );
            if client_version != PROTOCOL_VERSION {
                self.send_packet(
                    Packet::Disconnected {
                        reason: "Protocol version mismatch".to_string(),
                    },
                    addr,
                );
                return;
            }

            // Remove existing connection if present
            let existing = {
                let mut clients = self.clients.write().await;
                clients
                    .find_client_by_addr(addr)
                    .and_then(|id| clients.remove_client(id))
            };
            if let Some(existing) = existing {
                info!("Removing existing client {} from {}", existing.id, addr);
                self.leave_room(existing.id, existing.room).await;
            }

            let client_id = self.clients.write().await.add_client(addr);
            let response = match client_id {
                Some(client_id) => Packet::Connected { client_id },
                None => Packet::Disconnected {
                    reason: "Server full".to_string(),
                },
            };
            self.send_packet(response, addr);
            return;
        }

        let client = {
            let mut clients = self.clients.write().await;
            let client_id = clients.find_client_by_addr(addr);
            if let Some(id) = client_id {
                clients.touch(id);
            }
            client_id.map(|id| (id, clients.room_of(id).map(str::to_string)))
        };
        let Some((client_id, current_room)) = client else {
            self.reject("Not connected", addr);
            return;
        };

        match packet {
            Packet::CreateRoom { .. } => {
                self.leave_room(client_id, current_room).await;
                self.create_room(client_id, addr, packet).await;
            }

            Packet::JoinRoom { room_code, name } => {
                if current_room.as_deref() == Some(normalize_room_code(&room_code).as_str()) {
                    self.reject("Already in this room", addr);
                    return;
                }
                self.leave_room(client_id, current_room).await;
                self.join_room(client_id, addr, room_code, name).await;
            }

            Packet::StartGame => {
                self.forward_to_room(client_id, addr, RoomCommand::Start { client_id })
                    .await;
            }

            Packet::SetHeading { heading } => {
                if current_room.is_some() {
                    self.forward_to_room(client_id, addr, RoomCommand::SetHeading { client_id, heading })
                        .await;
                }
            }

            Packet::RequestReset => {
                self.forward_to_room(client_id, addr, RoomCommand::Reset { client_id })
                    .await;
            }

            Packet::Disconnect => {
                let removed = self.clients.write().await.remove_client(client_id);
                if let Some(client) = removed {
                    self.leave_room(client.id, client.room).await;
                }
            }

            _ => {
                warn!("Unexpected packet type from client at {}", addr);
            }
        }
    }

    fn handle_room_event(&mut self, event: RoomEvent) {
        match event {
            RoomEvent::Closed { room_code } => {
                let stale = self
                    .rooms
                    .get(&room_code)
                    .map_or(false, |handle| handle.is_closed());
                if stale {
                    self.rooms.remove(&room_code);
                }
                debug!("{} room(s) open", self.rooms.len());
            }
        }
    }

    /// Main server loop routing packets, timeouts and room events
    pub async fn run(&mut self) -> Result<(), Box<dyn std::error::Error>> {
        // Initialize concurrent tasks
        self.spawn_network_receiver();
        self.spawn_network_sender();
        self.spawn_timeout_checker();

        info!("Server started successfully");

        loop {
            tokio::select! {
                // Handle network events
                message = self.server_rx.recv() => {
                    match message {
                        Some(ServerMessage::PacketReceived { packet, addr }) => {
                            self.handle_packet(packet, addr).await;
                        },
                        Some(ServerMessage::ClientTimeout { client_id, room_code }) => {
                            self.leave_room(client_id, room_code).await;
                        },
                        Some(ServerMessage::Shutdown) | None => {
                            info!("Server shutting down");
                            break;
                        }
                    }
                },

                // Rooms reporting back
                Some(event) = self.room_events_rx.recv() => {
                    self.handle_room_event(event);
                },
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::{Direction, Phase};
    use std::net::{IpAddr, Ipv4Addr};
    use tokio::time::timeout;

    #[test]
    fn test_server_message_creation() {
        let packet = Packet::Connect { client_version: 1 };
        let addr = SocketAddr::new(IpAddr::V4(Ipv4Addr::new(127, 0, 0, 1)), 8080);

        let msg = ServerMessage::PacketReceived { packet, addr };

        match msg {
            ServerMessage::PacketReceived { packet: p, addr: a } => {
                assert_eq!(a, addr);
                match p {
                    Packet::Connect { client_version } => {
                        assert_eq!(client_version, 1);
                    }
                    _ => panic!("Unexpected packet type"),
                }
            }
            _ => panic!("Unexpected message type"),
        }
    }

    #[test]
    fn test_client_timeout_message() {
        let msg = ServerMessage::ClientTimeout {
            client_id: 42,
            room_code: Some("ABCD".to_string()),
        };

        match msg {
            ServerMessage::ClientTimeout { client_id, room_code } => {
                assert_eq!(client_id, 42);
                assert_eq!(room_code.as_deref(), Some("ABCD"));
            }
            _ => panic!("Unexpected message type"),
        }
    }

    #[test]
    fn test_normalize_room_code() {
        assert_eq!(normalize_room_code("abcd"), "ABCD");
        assert_eq!(normalize_room_code(" QwEr "), "QWER");
    }

    #[test]
    fn test_channel_communication() {
        let (tx, mut rx) = mpsc::unbounded_channel::<GameMessage>();

        let msg = GameMessage::SendToPlayers {
            players: vec![1, 2],
            packet: Packet::SetHeading {
                heading: Direction::Up,
            },
        };
        assert!(tx.send(msg).is_ok());

        match rx.try_recv().unwrap() {
            GameMessage::SendToPlayers { players, packet } => {
                assert_eq!(players, vec![1, 2]);
                assert!(matches!(
                    packet,
                    Packet::SetHeading {
                        heading: Direction::Up
                    }
                ));
            }
            _ => panic!("Unexpected message type"),
        }
    }

    async fn start_server() -> SocketAddr {
        let mut server = Server::new("127.0.0.1:0", GameConfig::default())
            .await
            .unwrap();
        let addr = server.local_addr().unwrap();
        tokio::spawn(async move {
            let _ = server.run().await;
        });
        addr
    }

    async fn send(socket: &UdpSocket, packet: &Packet, server: SocketAddr) {
        socket
            .send_to(&serialize(packet).unwrap(), server)
            .await
            .unwrap();
    }

    async fn recv(socket: &UdpSocket) -> Packet {
        let mut buf = vec![0u8; MAX_DATAGRAM_SIZE];
        let (len, _) = timeout(Duration::from_secs(5), socket.recv_from(&mut buf))
            .await
            .expect("no reply from server")
            .unwrap();
        deserialize(&buf[..len]).unwrap()
    }

    /// Skips snapshots until a packet matching `pred` shows up.
    async fn recv_until<F: Fn(&Packet) -> bool>(socket: &UdpSocket, pred: F) -> Packet {
        loop {
            let packet = recv(socket).await;
            if pred(&packet) {
                return packet;
            }
        }
    }

    #[tokio::test]
    async fn test_version_mismatch_is_refused() {
        let server = start_server().await;
        let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();

        send(&socket, &Packet::Connect { client_version: 99 }, server).await;

        match recv(&socket).await {
            Packet::Disconnected { reason } => assert_eq!(reason, "Protocol version mismatch"),
            other => panic!("unexpected packet {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_requests_before_connect_are_rejected() {
        let server = start_server().await;
        let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();

        send(&socket, &Packet::StartGame, server).await;

        match recv(&socket).await {
            Packet::Rejected { reason } => assert_eq!(reason, "Not connected"),
            other => panic!("unexpected packet {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_create_room_and_receive_snapshot() {
        let server = start_server().await;
        let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();

        send(&socket, &Packet::Connect { client_version: PROTOCOL_VERSION }, server).await;
        let client_id = match recv(&socket).await {
            Packet::Connected { client_id } => client_id,
            other => panic!("unexpected packet {:?}", other),
        };

        send(
            &socket,
            &Packet::CreateRoom {
                name: "ada".to_string(),
                grid_size: Some(30),
                duration_secs: None,
                food_policy: None,
            },
            server,
        )
        .await;

        let code = match recv_until(&socket, |p| matches!(p, Packet::RoomJoined { .. })).await {
            Packet::RoomJoined { room_code, player_id } => {
                assert_eq!(player_id, client_id);
                room_code
            }
            _ => unreachable!(),
        };
        assert_eq!(code.len(), 4);
        assert!(code.chars().all(|c| c.is_ascii_uppercase()));

        match recv_until(&socket, |p| matches!(p, Packet::GameState { .. })).await {
            Packet::GameState { snapshot, .. } => {
                assert_eq!(snapshot.code, code);
                assert_eq!(snapshot.grid_size, 30);
                assert_eq!(snapshot.phase, Phase::Waiting);
                assert_eq!(snapshot.host, client_id);
            }
            _ => unreachable!(),
        }
    }

    #[tokio::test]
    async fn test_shutdown_stops_run() {
        let mut server = Server::new("127.0.0.1:0", GameConfig::default())
            .await
            .unwrap();
        let control = server.control();
        let running = tokio::spawn(async move { server.run().await.is_ok() });

        control.send(ServerMessage::Shutdown).unwrap();

        let finished = timeout(Duration::from_secs(5), running).await.unwrap();
        assert!(finished.unwrap());
    }

    #[tokio::test]
    async fn test_join_unknown_room() {
        let server = start_server().await;
        let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        send(&socket, &Packet::Connect { client_version: PROTOCOL_VERSION }, server).await;
        recv(&socket).await;

        send(
            &socket,
            &Packet::JoinRoom {
                room_code: "zzzz".to_string(),
                name: "bob".to_string(),
            },
            server,
        )
        .await;

        match recv(&socket).await {
            Packet::Rejected { reason } => assert_eq!(reason, "Room not found"),
            other => panic!("unexpected packet {:?}", other),
        }
    }
}
