//! Blocking UDP echo client: sends a sequence of numbered datagrams
//! toward the emulator's bound address and reports what, if anything,
//! comes back — useful for eyeballing loss, delay, and duplication
//! while a `netem` instance relays traffic.

use std::net::UdpSocket;
use std::time::{Duration, Instant};

use clap::Parser;

#[derive(Parser, Debug)]
#[command(about = "Blocking UDP echo client")]
struct Cli {
    /// Address to send datagrams to (typically the emulator's bound peer).
    #[arg(long, default_value = "127.0.0.1:9700")]
    target: String,

    /// Local address to bind for receiving replies.
    #[arg(long, default_value = "127.0.0.1:9801")]
    bind: String,

    /// Number of datagrams to send.
    #[arg(long, default_value_t = 20)]
    count: u32,

    /// Delay between sends, in milliseconds.
    #[arg(long, default_value_t = 200)]
    interval_ms: u64,

    /// How long to wait for each reply before declaring it lost.
    #[arg(long, default_value_t = 2_000)]
    reply_timeout_ms: u64,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt().with_target(false).init();

    let cli = Cli::parse();
    let socket = UdpSocket::bind(&cli.bind)?;
    socket.set_read_timeout(Some(Duration::from_millis(cli.reply_timeout_ms)))?;

    let mut received = 0u32;
    let mut buf = [0u8; 65_536];

    for seq in 0..cli.count {
        let payload = format!("seq={seq}");
        let sent_at = Instant::now();
        socket.send_to(payload.as_bytes(), &cli.target)?;

        match socket.recv_from(&mut buf) {
            Ok((n, _src)) => {
                let reply = String::from_utf8_lossy(&buf[..n]);
                let elapsed = sent_at.elapsed();
                tracing::info!(seq, %reply, elapsed_ms = elapsed.as_millis() as u64, "reply");
                received += 1;
            }
            Err(e) => {
                tracing::warn!(seq, error = %e, "no reply within timeout");
            }
        }

        std::thread::sleep(Duration::from_millis(cli.interval_ms));
    }

    tracing::info!(sent = cli.count, received, "echo client finished");
    Ok(())
}
