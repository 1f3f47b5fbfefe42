//! Blocking UDP echo server, for manual exercise of a running `netem`
//! instance: bind one peer address, bounce every received datagram back
//! to whoever sent it.

use std::net::UdpSocket;

use clap::Parser;

#[derive(Parser, Debug)]
#[command(about = "Blocking UDP echo server")]
struct Cli {
    /// Address to bind and listen on.
    #[arg(long, default_value = "127.0.0.1:9800")]
    listen: String,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt().with_target(false).init();

    let cli = Cli::parse();
    let socket = UdpSocket::bind(&cli.listen)?;
    tracing::info!(listen = %cli.listen, "echo server ready");

    let mut buf = [0u8; 65_536];
    loop {
        let (n, src) = socket.recv_from(&mut buf)?;
        tracing::debug!(%src, bytes = n, "echoing datagram");
        socket.send_to(&buf[..n], src)?;
    }
}
