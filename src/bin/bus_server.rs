use colored::*;
use ecm_unlock::cli::arg_value;
use ecm_unlock::config::DEFAULT_BUS_ADDRESS;
use ecm_unlock::network::NetMessage;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::broadcast;

const BUFFER_SIZE: usize = 1024;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args: Vec<String> = std::env::args().collect();
    let listen = arg_value(&args, "--listen").unwrap_or_else(|| DEFAULT_BUS_ADDRESS.to_string());

    println!(
        "{}",
        "═══════════════════════════════════════════════════════════════"
            .magenta()
            .bold()
    );
    println!(
        "{}",
        "              VIRTUAL DIAGNOSTIC CAN BUS SERVER                "
            .magenta()
            .bold()
    );
    println!(
        "{}",
        "═══════════════════════════════════════════════════════════════"
            .magenta()
            .bold()
    );
    println!();
    println!(
        "{} Starting bus server on {}...",
        "→".green(),
        listen.bright_white()
    );

    // Every frame goes to every node, the sender included
    let (tx, _rx) = broadcast::channel::<NetMessage>(BUFFER_SIZE);
    let tx = Arc::new(tx);

    let listener = TcpListener::bind(&listen).await?;
    println!(
        "{} Bus server ready! Waiting for tester and ECM connections...",
        "✓".green().bold()
    );
    println!();

    let mut client_count = 0u32;

    loop {
        let (socket, addr) = listener.accept().await?;
        client_count += 1;

        println!(
            "{} New connection from {} (Total clients: {})",
            "→".cyan(),
            addr.to_string().bright_white(),
            client_count.to_string().bright_cyan()
        );

        let tx = Arc::clone(&tx);
        tokio::spawn(async move {
            if let Err(e) = handle_client(socket, tx).await {
                eprintln!("{} Client error: {}", "✗".red(), e);
            }
        });
    }
}

async fn handle_client(
    socket: TcpStream,
    tx: Arc<broadcast::Sender<NetMessage>>,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let peer_addr = socket.peer_addr()?;
    let (read_half, mut writer) = socket.into_split();
    let mut reader = BufReader::new(read_half);

    // Wait for client registration
    let mut line = String::new();
    reader.read_line(&mut line).await?;

    let client_name = match serde_json::from_str::<NetMessage>(&line)? {
        NetMessage::Register { client_name } => {
            println!(
                "  {} {} registered from {}",
                "✓".green(),
                client_name.bright_cyan().bold(),
                peer_addr.to_string().bright_black()
            );
            client_name
        }
        _ => return Err("First message must be Register".into()),
    };

    let mut rx = tx.subscribe();

    // Forward bus traffic to this client
    let client_name_clone = client_name.clone();
    let forwarder = tokio::spawn(async move {
        loop {
            let msg = match rx.recv().await {
                Ok(message) => message,
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    eprintln!(
                        "{} Client {} lagged, skipped {} messages (recovering...)",
                        "⚠".yellow(),
                        client_name_clone.bright_cyan(),
                        skipped
                    );
                    continue;
                }
                Err(_) => break,
            };

            let json = match serde_json::to_string(&msg) {
                Ok(j) => j,
                Err(_) => continue,
            };

            if writer.write_all(json.as_bytes()).await.is_err()
                || writer.write_all(b"\n").await.is_err()
                || writer.flush().await.is_err()
            {
                break;
            }
        }
    });

    let mut frame_count = 0u64;
    let mut dropped_count = 0u64;
    loop {
        line.clear();
        let n = reader.read_line(&mut line).await?;
        if n == 0 {
            break;
        }

        match serde_json::from_str::<NetMessage>(&line)? {
            NetMessage::CanFrame(frame) => {
                if !frame.is_valid() {
                    dropped_count += 1;
                    eprintln!(
                        "{} Frame from {} DROPPED ({} data bytes)",
                        "⚠".yellow().bold(),
                        client_name.bright_cyan(),
                        frame.data.len()
                    );
                    continue;
                }

                frame_count += 1;
                println!(
                    "  {} Frame #{:04} from {} - ID: 0x{:03X} [{}]",
                    "→".yellow(),
                    frame_count,
                    client_name.bright_cyan(),
                    frame.id.value(),
                    ecm_unlock::uds::format_hex(&frame.data)
                );

                if let Err(e) = tx.send(NetMessage::CanFrame(frame)) {
                    eprintln!("{} Failed to broadcast frame: {}", "✗".red(), e);
                }
            }
            _ => {
                // Ignore other message types (Register, Ack, Error)
            }
        }
    }

    forwarder.abort();

    println!(
        "{} {} disconnected (sent {} frames, {} dropped)",
        "→".bright_black(),
        client_name.bright_black(),
        frame_count,
        dropped_count
    );

    Ok(())
}
