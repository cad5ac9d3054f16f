pub mod call_api;
pub mod relay_api;
pub mod util_api;

use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "roomcall", version, about = "Видеозвонки в комнате, peer-to-peer")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Войти в комнату; звонок идёт до `leave` или Ctrl-C
    Join(call_api::JoinArgs),
    /// Запустить relay сигналинга
    Relay(relay_api::RelayArgs),
    /// Проверить, что STUN/TURN сервер выдаёт кандидатов
    CheckIce(util_api::CheckIceArgs),
}
