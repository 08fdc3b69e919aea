use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use pulsegate::{PulseClient, TcpConnector};
use pulsegate_shared::protocol::DEFAULT_PORT;
use pulsegate_shared::{Clock, CommandMessage, Response, Verb};
use std::path::PathBuf;
use std::time::Duration;
use tracing::debug;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Debug, Parser)]
#[command(name = "pulsegate", version, about = "Send commands to a pulsegate server")]
struct Cli {
    /// Server address as host:port.
    #[arg(long, env = "PULSEGATE_SERVER", default_value_t = format!("127.0.0.1:{DEFAULT_PORT}"))]
    server: String,

    /// Seconds to wait for the TCP connection.
    #[arg(long, default_value_t = 5)]
    connect_timeout_secs: u64,

    #[command(subcommand)]
    command: Cmd,
}

#[derive(Debug, Subcommand)]
enum Cmd {
    /// Claim the session for this machine
    Open,
    /// Release the session
    Close,
    /// Start the loaded program
    Start,
    /// Stop the running program
    Stop,
    /// Clear the session, whoever holds it
    Reset,
    /// Load a pulse program file
    Load {
        /// Program source file
        file: PathBuf,
        /// Clock frequency passed to the board
        #[arg(long)]
        clk: String,
    },
    /// Send an arbitrary `cmd` value
    Raw { cmd: String },
}

impl Cmd {
    async fn into_message(self) -> Result<CommandMessage> {
        Ok(match self {
            Cmd::Open => CommandMessage::new(Verb::Open),
            Cmd::Close => CommandMessage::new(Verb::Close),
            Cmd::Start => CommandMessage::new(Verb::Start),
            Cmd::Stop => CommandMessage::new(Verb::Stop),
            Cmd::Reset => CommandMessage::new(Verb::Reset),
            Cmd::Load { file, clk } => {
                let code = tokio::fs::read_to_string(&file)
                    .await
                    .with_context(|| format!("failed to read {}", file.display()))?;
                CommandMessage::load(code, Clock::Text(clk))
            }
            Cmd::Raw { cmd } => CommandMessage {
                cmd,
                code: None,
                clk: None,
            },
        })
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .init();

    let cli = Cli::parse();
    let connector = TcpConnector::new(cli.server, Duration::from_secs(cli.connect_timeout_secs));
    let client = PulseClient::new(connector);

    let message = cli.command.into_message().await?;
    debug!("Sending {:?}", message.cmd);

    match client.request(&message).await? {
        Response::Success(text) => {
            println!("{text}");
            Ok(())
        }
        Response::Error(text) => bail!("{text}"),
    }
}
