use clap::Parser;
use shared::{Direction, MovementType, Packet, MAX_DATAGRAM_SIZE, PROTOCOL_VERSION};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::time::{sleep, timeout};

/// Scripted client that connects, walks a square, swings and disconnects
#[derive(Parser, Debug)]
#[clap(author, version, about)]
struct Args {
    /// Server address
    #[clap(short, long, default_value = "127.0.0.1:7777")]
    server: SocketAddr,
    /// Character name to request
    #[clap(short, long, default_value = "Probe")]
    name: String,
    /// Steps to walk along each side of the square
    #[clap(long, default_value = "3")]
    steps: u32,
}

/// Prints every packet that arrives within `window`.
async fn drain(socket: &UdpSocket, window: Duration) -> Result<usize, Box<dyn std::error::Error>> {
    let mut buf = [0u8; MAX_DATAGRAM_SIZE];
    let mut count = 0;

    while let Ok(received) = timeout(window, socket.recv_from(&mut buf)).await {
        let (len, _) = received?;
        match Packet::decode(&buf[..len]) {
            Ok(Packet::ChatMessage { text, color }) => println!("  [{:?}] {}", color, text),
            Ok(packet) => println!("  {:?}", packet),
            Err(e) => println!("  undecodable datagram: {}", e),
        }
        count += 1;
    }
    Ok(count)
}

async fn send(socket: &UdpSocket, server: SocketAddr, packet: &Packet) -> Result<(), Box<dyn std::error::Error>> {
    socket.send_to(&packet.encode()?, server).await?;
    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let socket = UdpSocket::bind("0.0.0.0:0").await?;
    println!("Client socket bound to {}", socket.local_addr()?);

    println!("Connecting to {} as {:?}", args.server, args.name);
    send(
        &socket,
        args.server,
        &Packet::Connect {
            client_version: PROTOCOL_VERSION,
            name: args.name.clone(),
        },
    )
    .await?;

    let mut buf = [0u8; MAX_DATAGRAM_SIZE];
    let (len, _) = timeout(Duration::from_secs(3), socket.recv_from(&mut buf)).await??;
    match Packet::decode(&buf[..len])? {
        Packet::Connected { client_id } => println!("Connected with client ID {}", client_id),
        other => {
            println!("Expected Connected but got: {:?}", other);
            return Ok(());
        }
    }
    drain(&socket, Duration::from_millis(200)).await?;

    for direction in [Direction::Right, Direction::Down, Direction::Left, Direction::Up] {
        for _ in 0..args.steps {
            println!("Moving {:?}", direction);
            send(
                &socket,
                args.server,
                &Packet::Move {
                    direction,
                    movement_type: MovementType::Walk,
                },
            )
            .await?;
            drain(&socket, Duration::from_millis(250)).await?;
        }

        send(&socket, args.server, &Packet::Attack).await?;
        send(&socket, args.server, &Packet::Heartbeat).await?;
        drain(&socket, Duration::from_millis(250)).await?;
    }

    send(&socket, args.server, &Packet::LookAt { x: 5, y: 7 }).await?;
    drain(&socket, Duration::from_millis(250)).await?;

    println!("Sending disconnect");
    send(&socket, args.server, &Packet::Disconnect).await?;
    sleep(Duration::from_millis(100)).await;

    println!("Test client finished");
    Ok(())
}
