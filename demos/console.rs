//! Interactive RCON console.
//!
//! Prints server broadcasts as they arrive and sends each line typed on
//! stdin as a command.
//!
//! ```text
//! cargo run --example console -- --address 127.0.0.1 --port 28016 --password secret
//! ```

use std::time::Duration;

use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::{filter::EnvFilter, fmt, prelude::*};

use rustcon::RconConnection;

#[derive(Parser, Debug)]
#[command(about = "Interactive console for a Rust game server")]
struct Args {
    /// Server IP address.
    #[arg(long, default_value = "127.0.0.1")]
    address: String,

    /// RCON port.
    #[arg(long, default_value_t = 28016)]
    port: u16,

    /// RCON password.
    #[arg(long, env = "RCON_PASSWORD")]
    password: String,

    /// Seconds to wait for each reply.
    #[arg(long, default_value_t = 10)]
    timeout: u64,

    /// Log at debug level when RUST_LOG is unset.
    #[arg(long)]
    debug: bool,
}

fn init_tracing(debug: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(if debug { "rustcon=debug" } else { "rustcon=info" })
    });
    tracing_subscriber::registry()
        .with(fmt::layer().compact().with_target(false))
        .with(filter)
        .init();
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    init_tracing(args.debug);

    let rcon = RconConnection::builder(args.address, args.port, args.password)
        .command_timeout(Duration::from_secs(args.timeout))
        .on_connected(|| println!("* connected"))
        .on_message(|frame| println!("[{}] {}", frame.kind, frame.message))
        .on_chat_message(|chat| println!("<{}> {}", chat.username, chat.message))
        .on_disconnected(|| println!("* disconnected"))
        .build()?;

    rcon.connect().await?;

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let command = line.trim();
        if command.is_empty() {
            continue;
        }
        if matches!(command, "quit" | "exit") {
            break;
        }
        if !rcon.is_connected() {
            break;
        }

        match rcon.send_command(command).await {
            Ok(reply) => {
                println!("{}", reply.message);
                if let Some(trace) = reply.stacktrace() {
                    eprintln!("{trace}");
                }
            }
            Err(e) => eprintln!("! {e}"),
        }
    }

    if rcon.is_connected() {
        rcon.disconnect().await?;
    }
    Ok(())
}
