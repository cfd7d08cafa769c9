mod auth;
mod error;
mod rate_limit;
mod routes;
mod state;

use std::{error::Error, net::SocketAddr, sync::Arc, time::Duration};

use axum_server::{tls_rustls::RustlsConfig, Handle};
use panorama::{
    domain::{availability::SystemClock, IdGeneratorTask},
    infrastructure, PanoramaConfig,
};
use tracing::{error, info, warn, Level};

use crate::state::AppState;

#[tokio::main]
async fn main() {
    match PanoramaConfig::load() {
        Ok(config) => {
            tracing_subscriber::fmt()
                .with_max_level(Level::from(&config.logger.level))
                .init();
            if let Err(error) = serve(&config).await {
                error!("アプリケーションエラー: {}", error);
            }
        }
        Err(error) => {
            tracing_subscriber::fmt::init();
            error!("設定読み込みエラー: {}", error)
        }
    }
}

async fn serve(config: &PanoramaConfig) -> Result<(), Box<dyn Error>> {
    let stores = infrastructure::open(&config.store, IdGeneratorTask::with_node(1, 1)).await?;
    if config.admin.password.is_none() {
        warn!("管理者パスワードが未設定のため、管理者ログインは無効です");
    }
    let state = AppState::from_config(stores, Arc::new(SystemClock), config);
    let app = routes::router(state, config.server.static_dir.as_deref())
        .into_make_service_with_connect_info::<SocketAddr>();

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port).parse()?;
    let handle = Handle::new();
    tokio::spawn(shutdown_on_ctrl_c(handle.clone()));

    match &config.server.tls {
        Some(tls) => {
            let rustls = RustlsConfig::from_pem_file(&tls.cert, &tls.key).await?;
            info!("HTTPSで待ち受けを開始します: {}", addr);
            axum_server::bind_rustls(addr, rustls)
                .handle(handle)
                .serve(app)
                .await?;
        }
        None => {
            info!("HTTPで待ち受けを開始します: {}", addr);
            axum_server::bind(addr).handle(handle).serve(app).await?;
        }
    }
    info!("サーバーを停止しました");
    Ok(())
}

async fn shutdown_on_ctrl_c(handle: Handle) {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("シグナル待機エラー: {}", e);
        return;
    }
    info!("終了シグナルを受信しました");
    handle.graceful_shutdown(Some(Duration::from_secs(10)));
}
