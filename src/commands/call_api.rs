use crate::call::{CallHandle, CallSession};
use crate::config::CallConfig;
use crate::logger;
use crate::media::SyntheticDevices;
use crate::session::{bootstrap, Bootstrap, Session};
use crate::signaling::WsSignalingClient;
use crate::ui::HeadlessView;
use clap::Args;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use url::Url;

const DEFAULT_PAGE_URL: &str = "http://localhost/index.html";

#[derive(Args, Debug)]
pub struct JoinArgs {
    /// Полный адрес страницы, например http://localhost/index.html?room=X
    #[arg(long, conflicts_with = "room")]
    pub page_url: Option<String>,
    /// Id комнаты, короткая запись для адреса с ?room=
    #[arg(long)]
    pub room: Option<String>,
    /// Файл конфигурации TOML
    #[arg(long, env = "ROOMCALL_CONFIG")]
    pub config: Option<PathBuf>,
    #[arg(long, env = "ROOMCALL_SIGNALING_URL")]
    pub signaling_url: Option<String>,
    #[arg(long, env = "ROOMCALL_TOKEN")]
    pub token: Option<String>,
}

impl JoinArgs {
    fn page_url(&self) -> anyhow::Result<String> {
        if let Some(url) = &self.page_url {
            return Ok(url.clone());
        }
        let mut url = Url::parse(DEFAULT_PAGE_URL)?;
        if let Some(room) = &self.room {
            url.query_pairs_mut().append_pair("room", room);
        }
        Ok(url.into())
    }
}

/// Всё, что страница делает до сигналинга: конфиг, лог, комната из URL.
/// `None`, если комнаты нет и страница уходит в лобби.
fn prepare(args: &JoinArgs) -> anyhow::Result<Option<(CallConfig, Session)>> {
    let mut config = CallConfig::load(args.config.as_deref())?;
    if let Some(url) = &args.signaling_url {
        config.signaling_url = url.clone();
    }
    if args.token.is_some() {
        config.token = args.token.clone();
    }
    logger::init(&config.log_filter);

    match bootstrap(&args.page_url()?, &config.fallback_page)? {
        Bootstrap::Ready(session) => Ok(Some((config, session))),
        Bootstrap::Redirect(to) => {
            println!("No room in page URL, go to {to}");
            Ok(None)
        }
    }
}

/// Страница звонка в терминале
pub async fn join(args: JoinArgs) -> anyhow::Result<()> {
    let Some((config, session)) = prepare(&args)? else {
        return Ok(());
    };

    let signaling = Arc::new(WsSignalingClient::connect(&config.signaling_url).await?);
    let mut call = CallSession::new(
        session,
        config,
        signaling,
        Arc::new(SyntheticDevices::default()),
        Arc::new(HeadlessView::new()),
    )?;
    call.start().await?;
    println!(
        "In room {} as {}. Commands: camera, mic, leave",
        call.session().room_id,
        call.session().uid
    );

    let handle = call.handle();
    tokio::spawn({
        let handle = handle.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                let _ = handle.leave();
            }
        }
    });
    tokio::spawn(read_controls(handle));

    call.run().await?;
    Ok(())
}

/// Кнопки страницы: строки из stdin
async fn read_controls(handle: CallHandle) {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        let sent = match line.trim() {
            "camera" | "c" => handle.toggle_camera(),
            "mic" | "m" => handle.toggle_mic(),
            "leave" | "q" => handle.leave(),
            "" => continue,
            other => {
                println!("Unknown command: {other}");
                continue;
            }
        };
        if sent.is_err() {
            break;
        }
    }
}
