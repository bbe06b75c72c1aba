//! Room actors.
//!
//! Every room runs as its own tokio task that exclusively owns the `Room`.
//! Commands arrive over an unbounded queue, the tick timer only exists while
//! the match is playing, and all outgoing packets are handed to the network
//! sender as `GameMessage`s addressed by player id.

use crate::game::{JoinError, ResetError, Room, StartError};
use crate::network::GameMessage;
use crate::tick;
use crate::utils::get_timestamp;
use log::{debug, error, info};
use shared::{Direction, Packet, PlayerId, RoomSnapshot};
use std::fmt::Display;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use tokio::time::{interval_at, Instant, Interval, MissedTickBehavior};

/// How often the tick loop emits a diagnostics line.
const DIAGNOSTIC_TICKS: u32 = 40;

#[derive(Debug)]
pub enum RoomCommand {
    Join {
        client_id: PlayerId,
        name: String,
        reply: oneshot::Sender<Result<(), JoinError>>,
    },
    Leave {
        client_id: PlayerId,
    },
    Start {
        client_id: PlayerId,
    },
    SetHeading {
        client_id: PlayerId,
        heading: Direction,
    },
    Reset {
        client_id: PlayerId,
    },
    Snapshot {
        reply: oneshot::Sender<RoomSnapshot>,
    },
}

/// Notifications from room actors back to the server loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RoomEvent {
    Closed { room_code: String },
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RoomError {
    #[error("Room closed")]
    Closed,
    #[error(transparent)]
    Join(#[from] JoinError),
}

/// Cheap, cloneable address of a running room actor.
#[derive(Debug, Clone)]
pub struct RoomHandle {
    code: String,
    commands: mpsc::UnboundedSender<RoomCommand>,
}

impl RoomHandle {
    pub fn code(&self) -> &str {
        &self.code
    }

    pub fn send(&self, command: RoomCommand) -> Result<(), RoomError> {
        self.commands.send(command).map_err(|_| RoomError::Closed)
    }

    pub async fn join(&self, client_id: PlayerId, name: String) -> Result<(), RoomError> {
        let (reply, response) = oneshot::channel();
        self.send(RoomCommand::Join {
            client_id,
            name,
            reply,
        })?;
        response.await.map_err(|_| RoomError::Closed)??;
        Ok(())
    }

    pub async fn snapshot(&self) -> Result<RoomSnapshot, RoomError> {
        let (reply, response) = oneshot::channel();
        self.send(RoomCommand::Snapshot { reply })?;
        response.await.map_err(|_| RoomError::Closed)
    }

    pub fn is_closed(&self) -> bool {
        self.commands.is_closed()
    }
}

/// Spawns the actor for `room` and returns its handle.
pub fn spawn_room(
    room: Room,
    outbound: mpsc::UnboundedSender<GameMessage>,
    events: mpsc::UnboundedSender<RoomEvent>,
) -> RoomHandle {
    let (commands_tx, commands_rx) = mpsc::unbounded_channel();
    let handle = RoomHandle {
        code: room.code.clone(),
        commands: commands_tx,
    };

    let actor = RoomActor {
        room,
        commands: commands_rx,
        outbound,
        events,
        ticker: None,
    };
    tokio::spawn(actor.run());

    handle
}

struct RoomActor {
    room: Room,
    commands: mpsc::UnboundedReceiver<RoomCommand>,
    outbound: mpsc::UnboundedSender<GameMessage>,
    events: mpsc::UnboundedSender<RoomEvent>,
    ticker: Option<Interval>,
}

/// Resolves on the next tick, or never while the ticker is stopped.
async fn next_tick(ticker: &mut Option<Interval>) {
    match ticker {
        Some(interval) => {
            interval.tick().await;
        }
        None => std::future::pending::<()>().await,
    }
}

impl RoomActor {
    async fn run(mut self) {
        debug!("Room {} actor running", self.room.code);
        self.broadcast_snapshot();

        loop {
            tokio::select! {
                command = self.commands.recv() => {
                    let Some(command) = command else {
                        break;
                    };
                    if !self.handle_command(command) {
                        break;
                    }
                },
                _ = next_tick(&mut self.ticker) => {
                    self.on_tick();
                },
            }
        }

        self.stop_ticker();
        info!("Room {} closed", self.room.code);
        if let Err(e) = self.events.send(RoomEvent::Closed {
            room_code: self.room.code.clone(),
        }) {
            error!("Failed to report closed room: {}", e);
        }
    }

    /// Returns false once the room should shut down.
    fn handle_command(&mut self, command: RoomCommand) -> bool {
        match command {
            RoomCommand::Join {
                client_id,
                name,
                reply,
            } => {
                let result = self.room.add_player(client_id, name).map(|_| ());
                let joined = result.is_ok();
                if reply.send(result).is_err() {
                    debug!("Join reply for client {} dropped", client_id);
                }
                if joined {
                    self.broadcast_snapshot();
                }
            }

            RoomCommand::Leave { client_id } => {
                if self.room.remove_player(client_id).is_none() {
                    return true;
                }
                if self.room.is_empty() {
                    return false;
                }
                if self.room.host == client_id {
                    if let Some(next) = self.room.players.keys().min().copied() {
                        self.room.host = next;
                        info!("Room {}: player {} is now host", self.room.code, next);
                    }
                }
                self.broadcast_snapshot();
            }

            RoomCommand::Start { client_id } => {
                let result = if client_id != self.room.host {
                    Err(StartError::NotHost)
                } else {
                    self.room.start(get_timestamp())
                };
                match result {
                    Ok(()) => {
                        self.start_ticker();
                        self.broadcast_snapshot();
                    }
                    Err(e) => self.reject(client_id, e),
                }
            }

            RoomCommand::SetHeading { client_id, heading } => {
                if !self.room.set_heading(client_id, heading) {
                    debug!(
                        "Room {}: heading {:?} refused for player {}",
                        self.room.code, heading, client_id
                    );
                }
            }

            RoomCommand::Reset { client_id } => {
                let result = if client_id != self.room.host {
                    Err(ResetError::NotHost)
                } else {
                    self.room.reset()
                };
                match result {
                    Ok(()) => self.broadcast_snapshot(),
                    Err(e) => self.reject(client_id, e),
                }
            }

            RoomCommand::Snapshot { reply } => {
                let _ = reply.send(self.room.snapshot());
            }
        }
        true
    }

    fn on_tick(&mut self) {
        let outcome = tick::advance(&mut self.room);
        if !outcome.died.is_empty() {
            debug!(
                "Room {} tick {}: players {:?} died",
                self.room.code, self.room.tick, outcome.died
            );
        }
        if self.room.tick % DIAGNOSTIC_TICKS == 0 {
            debug!(
                "Room {} tick {}: {} alive, {} food, {} powerups",
                self.room.code,
                self.room.tick,
                self.room.living_count(),
                self.room.food.len(),
                self.room.powerups.active.len()
            );
            let now = get_timestamp();
            for player in self.room.players.values() {
                for effect in &player.effects {
                    debug!(
                        "Room {}: player {} has {} for {:.1}s",
                        self.room.code,
                        player.id,
                        effect.kind,
                        effect.remaining_secs(now)
                    );
                }
            }
        }

        self.broadcast_snapshot();

        if outcome.match_ended {
            self.stop_ticker();
            let result = self.room.match_result();
            match &result {
                Some(result) => info!(
                    "Room {} match over: {} wins with {} points after {}s",
                    self.room.code,
                    result.winner_name,
                    result.winner_score,
                    result.duration_secs()
                ),
                None => info!("Room {} match over without a winner", self.room.code),
            }
            self.broadcast(Packet::MatchEnded { result });
        }
    }

    fn start_ticker(&mut self) {
        let period = self.room.config.tick_duration();
        let mut ticker = interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        self.ticker = Some(ticker);
    }

    /// Idempotent; the room state stays readable afterwards.
    fn stop_ticker(&mut self) {
        self.ticker = None;
    }

    fn broadcast_snapshot(&self) {
        self.broadcast(Packet::GameState {
            timestamp: get_timestamp(),
            snapshot: self.room.snapshot(),
        });
    }

    fn broadcast(&self, packet: Packet) {
        let players = self.room.players.keys().copied().collect();
        self.send(players, packet);
    }

    fn reject(&self, client_id: PlayerId, reason: impl Display) {
        debug!(
            "Room {}: rejected request from {}: {}",
            self.room.code, client_id, reason
        );
        self.send(
            vec![client_id],
            Packet::Rejected {
                reason: reason.to_string(),
            },
        );
    }

    fn send(&self, players: Vec<PlayerId>, packet: Packet) {
        if let Err(e) = self
            .outbound
            .send(GameMessage::SendToPlayers { players, packet })
        {
            error!("Room {} failed to queue packet: {}", self.room.code, e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{PowerupConfig, RoomConfig};
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use shared::Phase;
    use std::time::Duration;
    use tokio_test::{assert_err, assert_ok};

    struct Harness {
        handle: RoomHandle,
        outbound: mpsc::UnboundedReceiver<GameMessage>,
        events: mpsc::UnboundedReceiver<RoomEvent>,
    }

    fn spawn_test_room() -> Harness {
        let config = RoomConfig {
            grid_size: 10,
            tick_rate: 50,
            powerups: PowerupConfig {
                spawn_chance: 0.0,
                ..PowerupConfig::default()
            },
            ..RoomConfig::default()
        };
        let room = Room::with_rng(
            "ROOM".to_string(),
            config,
            1,
            "host".to_string(),
            StdRng::seed_from_u64(3),
        );
        let (outbound_tx, outbound) = mpsc::unbounded_channel();
        let (events_tx, events) = mpsc::unbounded_channel();
        Harness {
            handle: spawn_room(room, outbound_tx, events_tx),
            outbound,
            events,
        }
    }

    /// Waits for the first outgoing packet matching `pred`.
    async fn wait_for<F>(rx: &mut mpsc::UnboundedReceiver<GameMessage>, pred: F) -> (Vec<PlayerId>, Packet)
    where
        F: Fn(&Packet) -> bool,
    {
        let search = async {
            while let Some(message) = rx.recv().await {
                if let GameMessage::SendToPlayers { players, packet } = message {
                    if pred(&packet) {
                        return Some((players, packet));
                    }
                }
            }
            None
        };
        tokio::time::timeout(Duration::from_secs(5), search)
            .await
            .expect("timed out waiting for packet")
            .expect("outbound channel closed")
    }

    #[tokio::test]
    async fn test_join_and_snapshot() {
        let harness = spawn_test_room();

        assert_ok!(harness.handle.join(2, "two".to_string()).await);
        let snapshot = assert_ok!(harness.handle.snapshot().await);

        assert_eq!(snapshot.code, "ROOM");
        assert_eq!(snapshot.players.len(), 2);
        assert_eq!(snapshot.host, 1);
        assert_eq!(harness.handle.code(), "ROOM");
    }

    #[tokio::test]
    async fn test_duplicate_join_is_rejected() {
        let harness = spawn_test_room();

        let err = assert_err!(harness.handle.join(1, "again".to_string()).await);
        assert_eq!(err, RoomError::Join(JoinError::AlreadyJoined));
    }

    #[tokio::test]
    async fn test_host_leaving_hands_over_to_lowest_id() {
        let harness = spawn_test_room();
        assert_ok!(harness.handle.join(4, "four".to_string()).await);
        assert_ok!(harness.handle.join(3, "three".to_string()).await);

        assert_ok!(harness.handle.send(RoomCommand::Leave { client_id: 1 }));
        let snapshot = assert_ok!(harness.handle.snapshot().await);

        assert_eq!(snapshot.host, 3);
        assert_eq!(snapshot.players.len(), 2);
    }

    #[tokio::test]
    async fn test_last_leave_closes_room() {
        let mut harness = spawn_test_room();

        assert_ok!(harness.handle.send(RoomCommand::Leave { client_id: 1 }));
        let event = tokio::time::timeout(Duration::from_secs(5), harness.events.recv())
            .await
            .unwrap();

        assert_eq!(
            event,
            Some(RoomEvent::Closed {
                room_code: "ROOM".to_string()
            })
        );
        assert_err!(harness.handle.snapshot().await);
        assert!(harness.handle.is_closed());
    }

    #[tokio::test]
    async fn test_start_by_guest_is_rejected() {
        let mut harness = spawn_test_room();
        assert_ok!(harness.handle.join(2, "two".to_string()).await);

        assert_ok!(harness.handle.send(RoomCommand::Start { client_id: 2 }));
        let (players, packet) =
            wait_for(&mut harness.outbound, |p| matches!(p, Packet::Rejected { .. })).await;

        assert_eq!(players, vec![2]);
        match packet {
            Packet::Rejected { reason } => assert_eq!(reason, "Only the host can start the game"),
            other => panic!("unexpected packet {:?}", other),
        }
        let snapshot = assert_ok!(harness.handle.snapshot().await);
        assert_eq!(snapshot.phase, Phase::Waiting);
    }

    #[tokio::test]
    async fn test_solo_match_ends_on_first_tick() {
        let mut harness = spawn_test_room();

        assert_ok!(harness.handle.send(RoomCommand::Start { client_id: 1 }));
        let (players, packet) =
            wait_for(&mut harness.outbound, |p| matches!(p, Packet::MatchEnded { .. })).await;

        assert_eq!(players, vec![1]);
        match packet {
            Packet::MatchEnded { result: Some(result) } => {
                assert_eq!(result.winner_name, "host");
                assert_eq!(result.player_count, 1);
            }
            other => panic!("unexpected packet {:?}", other),
        }

        let snapshot = assert_ok!(harness.handle.snapshot().await);
        assert_eq!(snapshot.phase, Phase::Ended);
        assert_eq!(snapshot.tick, 1);
    }

    #[tokio::test]
    async fn test_ticks_stop_after_match_end_and_reset_works() {
        let mut harness = spawn_test_room();
        assert_ok!(harness.handle.send(RoomCommand::Start { client_id: 1 }));
        wait_for(&mut harness.outbound, |p| matches!(p, Packet::MatchEnded { .. })).await;

        tokio::time::sleep(Duration::from_millis(100)).await;
        let snapshot = assert_ok!(harness.handle.snapshot().await);
        assert_eq!(snapshot.tick, 1);

        assert_ok!(harness.handle.send(RoomCommand::Reset { client_id: 1 }));
        let snapshot = assert_ok!(harness.handle.snapshot().await);
        assert_eq!(snapshot.phase, Phase::Waiting);
        assert_eq!(snapshot.tick, 0);
    }

    #[tokio::test]
    async fn test_heading_reaches_room() {
        let harness = spawn_test_room();

        assert_ok!(harness.handle.send(RoomCommand::SetHeading {
            client_id: 1,
            heading: Direction::Down,
        }));
        let snapshot = assert_ok!(harness.handle.snapshot().await);

        assert_eq!(snapshot.players[0].heading, Direction::Down);
    }
}
