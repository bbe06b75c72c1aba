use bincode::{deserialize, serialize};
use shared::{Direction, Packet, RoomSnapshot, PROTOCOL_VERSION};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::time::{sleep, timeout};

const TURNS: [Direction; 4] = [Direction::Down, Direction::Left, Direction::Up, Direction::Right];

async fn send(socket: &UdpSocket, packet: &Packet, server: SocketAddr) -> Result<(), Box<dyn std::error::Error>> {
    socket.send_to(&serialize(packet)?, server).await?;
    Ok(())
}

/// Waits up to a second for the next packet
async fn recv(socket: &UdpSocket, buf: &mut [u8]) -> Option<Packet> {
    match timeout(Duration::from_secs(1), socket.recv_from(buf)).await {
        Ok(Ok((len, _))) => match deserialize::<Packet>(&buf[..len]) {
            Ok(packet) => Some(packet),
            Err(e) => {
                println!("Failed to deserialize packet: {}", e);
                None
            }
        },
        Ok(Err(e)) => {
            println!("Error receiving packet: {}", e);
            None
        }
        Err(_) => None,
    }
}

fn print_snapshot(snapshot: &RoomSnapshot) {
    println!(
        "Room {} tick {} ({:?}): {} food, {} powerups",
        snapshot.code,
        snapshot.tick,
        snapshot.phase,
        snapshot.food.len(),
        snapshot.powerups.len()
    );
    for player in &snapshot.players {
        println!(
            "  Player {} {}: score={} alive={} head={} length={}",
            player.id,
            player.name,
            player.score,
            player.alive,
            player.head(),
            player.length()
        );
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let socket = UdpSocket::bind("0.0.0.0:0").await?;
    println!("Client socket bound to {}", socket.local_addr()?);

    let server_addr = "127.0.0.1:8080".parse::<SocketAddr>()?;
    let mut buf = vec![0u8; 65_507];

    println!("Sending connection request to {}", server_addr);
    send(&socket, &Packet::Connect { client_version: PROTOCOL_VERSION }, server_addr).await?;

    let client_id = match recv(&socket, &mut buf).await {
        Some(Packet::Connected { client_id }) => client_id,
        other => {
            println!("Expected Connected but got: {:?}", other);
            return Ok(());
        }
    };
    println!("Connection accepted with client ID: {}", client_id);

    send(
        &socket,
        &Packet::CreateRoom {
            name: format!("bot-{}", client_id),
            grid_size: Some(20),
            duration_secs: Some(15),
            food_policy: None,
        },
        server_addr,
    )
    .await?;
    send(&socket, &Packet::StartGame, server_addr).await?;

    // Drive a square until the match ends or the server goes quiet
    let mut turn = 0;
    loop {
        match recv(&socket, &mut buf).await {
            Some(Packet::RoomJoined { room_code, .. }) => println!("Joined room {}", room_code),
            Some(Packet::GameState { snapshot, .. }) => {
                print_snapshot(&snapshot);
                if snapshot.tick > 0 && snapshot.tick % 5 == 0 {
                    let heading = TURNS[turn % TURNS.len()];
                    turn += 1;
                    send(&socket, &Packet::SetHeading { heading }, server_addr).await?;
                }
            }
            Some(Packet::MatchEnded { result }) => {
                println!("Match ended: {:?}", result);
                break;
            }
            Some(Packet::Rejected { reason }) => println!("Rejected: {}", reason),
            Some(other) => println!("Unexpected packet: {:?}", other),
            None => {
                println!("No packet within a second, giving up");
                break;
            }
        }
    }

    sleep(Duration::from_millis(100)).await;
    println!("Sending disconnect request");
    send(&socket, &Packet::Disconnect, server_addr).await?;

    println!("Test client finished");
    Ok(())
}
