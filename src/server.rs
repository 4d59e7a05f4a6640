//! Session acceptor: one spawned task per accepted connection.
use tokio::net::TcpListener;
use tracing::{error, info};

use crate::{error::AppResult, session, state::AppState};

pub async fn serve(listener: TcpListener, app: AppState) -> AppResult<()> {
    info!(addr = %listener.local_addr()?, "listening");
    loop {
        match listener.accept().await {
            Ok((stream, addr)) => {
                info!(%addr, "accepted");
                tokio::spawn(session::run(stream, addr, app.clone()));
            }
            Err(e) => {
                let n = app.registry.close_all().await;
                error!(error = %e, closed = n, "accept failed, shutting down");
                return Err(e.into());
            }
        }
    }
}
