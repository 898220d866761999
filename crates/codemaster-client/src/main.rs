//! Code-Master console client.

mod console;
mod session;

use anyhow::Context;
use clap::Parser;
use tokio::net::TcpStream;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "codemaster-client")]
#[command(about = "Console client for the Code-Master code-guessing game")]
struct Cli {
    /// Server host
    #[arg(long, default_value = "127.0.0.1")]
    host: String,

    /// Server port
    #[arg(long, default_value = "8888")]
    port: u16,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .init();

    let cli = Cli::parse();
    let stream = TcpStream::connect((cli.host.as_str(), cli.port))
        .await
        .with_context(|| format!("connecting to {}:{}", cli.host, cli.port))?;
    println!("connected to {}:{}", cli.host, cli.port);

    console::run(stream).await
}
