use chat_relay::{config::ServerConfig, server, utils::clean, AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    chat_relay::init_tracing();
    let cfg = ServerConfig::from_env()?;

    tokio::fs::create_dir_all(&cfg.files_dir).await?;
    tokio::spawn(clean::task(cfg.files_dir.clone(), cfg.file_ttl, cfg.sweep_every));  // sweeper

    let app = AppState::new(cfg.files_dir.clone());
    let listener = tokio::net::TcpListener::bind(cfg.addr).await?;
    server::serve(listener, app).await?;
    Ok(())
}
