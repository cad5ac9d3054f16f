use crate::config::DEFAULT_LOG_FILTER;
use crate::logger;
use crate::peer::ice::check_ice_server_availability;
use crate::peer::types::{IceServerKind, ServerConfig};
use clap::{Args, ValueEnum};

#[derive(ValueEnum, Clone, Copy, Debug)]
pub enum KindArg {
    Stun,
    Turn,
}

impl From<KindArg> for IceServerKind {
    fn from(kind: KindArg) -> Self {
        match kind {
            KindArg::Stun => IceServerKind::Stun,
            KindArg::Turn => IceServerKind::Turn,
        }
    }
}

#[derive(Args, Debug)]
pub struct CheckIceArgs {
    /// Адрес сервера, схему можно не указывать
    #[arg(long)]
    pub url: String,
    #[arg(long, value_enum, default_value = "stun")]
    pub kind: KindArg,
    #[arg(long)]
    pub username: Option<String>,
    #[arg(long)]
    pub credential: Option<String>,
}

/// Проверка доступности ICE сервера
pub async fn check_ice(args: CheckIceArgs) -> anyhow::Result<()> {
    logger::init(DEFAULT_LOG_FILTER);
    let config = ServerConfig {
        id: "cli".into(),
        kind: args.kind.into(),
        url: args.url,
        username: args.username,
        credential: args.credential,
    };
    let available = check_ice_server_availability(&config).await?;
    println!(
        "{} server {}: {}",
        config.kind,
        config.url,
        if available { "available" } else { "unavailable" }
    );
    Ok(())
}
