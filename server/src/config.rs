//! Server configuration from command line and environment

use anyhow::{Context, Result};
use clap::Parser;
use pulsegate_shared::protocol::DEFAULT_PORT;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use crate::command::{locate_tool, SCRATCH_FILE};

#[cfg(windows)]
const DEFAULT_TOOL_SEARCH_ROOT: &str = "C:\\SpinCore";
#[cfg(not(windows))]
const DEFAULT_TOOL_SEARCH_ROOT: &str = "/opt/spincore";

#[derive(Debug, Parser)]
#[command(
    name = "pulsegate-server",
    author,
    version,
    about = "Single-client TCP command server for a PulseBlaster pulse generator"
)]
pub struct Cli {
    /// Address to bind the command listener to.
    #[arg(long, env = "PULSEGATE_LISTEN_ADDR", default_value_t = default_listen_addr())]
    pub listen_addr: String,

    /// Directory holding the session owner record and the scratch program file.
    #[arg(long, env = "PULSEGATE_STATE_DIR", default_value = "pulsegate-state")]
    pub state_dir: PathBuf,

    /// Path to the spbicl utility. Searched for under --tool-search-root when omitted.
    #[arg(long, env = "PULSEGATE_TOOL")]
    pub tool: Option<PathBuf>,

    /// Directory searched recursively for spbicl when --tool is not given.
    #[arg(long, env = "PULSEGATE_TOOL_SEARCH_ROOT", default_value = DEFAULT_TOOL_SEARCH_ROOT)]
    pub tool_search_root: PathBuf,

    /// Seconds a client may take to finish sending a frame before it is dropped.
    #[arg(long, env = "PULSEGATE_READ_TIMEOUT_SECS", default_value_t = 60)]
    pub read_timeout_secs: u64,
}

fn default_listen_addr() -> String {
    format!("0.0.0.0:{DEFAULT_PORT}")
}

/// Validated server settings
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub listen_addr: SocketAddr,
    pub state_dir: PathBuf,
    pub tool: PathBuf,
    pub read_timeout: Duration,
}

impl ServerConfig {
    /// Scratch file handed to the tool on `load`
    pub fn scratch_file(&self) -> PathBuf {
        self.state_dir.join(SCRATCH_FILE)
    }
}

impl TryFrom<Cli> for ServerConfig {
    type Error = anyhow::Error;

    fn try_from(cli: Cli) -> Result<Self, Self::Error> {
        let listen_addr: SocketAddr = cli
            .listen_addr
            .parse()
            .with_context(|| format!("invalid listen address: {}", cli.listen_addr))?;

        let tool = match cli.tool {
            Some(tool) => tool,
            None => locate_tool(&cli.tool_search_root).with_context(|| {
                format!(
                    "spbicl not found under {}; pass --tool",
                    cli.tool_search_root.display()
                )
            })?,
        };

        Ok(ServerConfig {
            listen_addr,
            state_dir: cli.state_dir,
            tool,
            read_timeout: Duration::from_secs(cli.read_timeout_secs),
        })
    }
}
