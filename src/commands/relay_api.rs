use crate::config::DEFAULT_LOG_FILTER;
use crate::logger;
use crate::signaling::{relay, MemoryHub};
use clap::Args;
use std::net::SocketAddr;
use tokio::net::TcpListener;

#[derive(Args, Debug)]
pub struct RelayArgs {
    #[arg(long, env = "ROOMCALL_LISTEN", default_value = "0.0.0.0:8080")]
    pub listen: SocketAddr,
}

pub async fn relay(args: RelayArgs) -> anyhow::Result<()> {
    logger::init(DEFAULT_LOG_FILTER);
    let listener = TcpListener::bind(args.listen).await?;
    relay::serve(listener, MemoryHub::new()).await?;
    Ok(())
}
