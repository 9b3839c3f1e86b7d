//! tether - attach the local terminal to a remote PTY session
//!
//! Connects to a PTY host over WebSocket, replays the session's screen and
//! forwards keystrokes while this client has write access.

use tether_utils::{init_logging_with_config, LogConfig, Result};

mod app;
mod cli;
mod input;
mod terminal;

use cli::Args;

#[tokio::main]
async fn main() -> Result<()> {
    // Parse command-line arguments first (before terminal setup)
    let args = Args::parse_args();

    // Initialize logging to file (not stderr, since we own the terminal)
    init_logging_with_config(LogConfig::client())?;
    tracing::info!("tether client starting");
    tracing::debug!("CLI args: {:?}", args);

    match app::run(args).await {
        Ok(()) => {
            tracing::info!("tether client exiting normally");
            Ok(())
        }
        Err(e) => {
            tracing::error!("tether client error: {}", e);
            // Print error to stderr after terminal restoration
            eprintln!("Error: {}", e);
            Err(e)
        }
    }
}
