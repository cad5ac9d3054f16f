pub mod call;
pub mod commands;
pub mod config;
pub mod error;
pub mod logger;
pub mod media;
pub mod peer;
pub mod session;
pub mod signaling;
pub mod ui;
pub mod utils;

use clap::Parser;
use commands::{Cli, Command};

pub use call::{CallHandle, CallInput, CallSession};
pub use config::CallConfig;
pub use error::{CallError, Result};

pub fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let runtime = tokio::runtime::Runtime::new()?;
    runtime.block_on(async move {
        match cli.command {
            Command::Join(args) => commands::call_api::join(args).await,
            Command::Relay(args) => commands::relay_api::relay(args).await,
            Command::CheckIce(args) => commands::util_api::check_ice(args).await,
        }
    })
}
