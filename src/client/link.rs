//! Peer links: a client serves one local file straight to other clients
//! through a listener that lives for a fixed window.
use std::{
    net::{IpAddr, SocketAddr},
    path::{Path, PathBuf},
    time::Duration,
};
use tokio::{
    fs::File,
    io::{BufReader, BufWriter},
    net::{TcpListener, TcpStream},
    task::JoinHandle,
    time::{self, Instant},
};
use tracing::{debug, info, warn};

use super::create_file;
use crate::{
    error::{bad, AppErr, AppResult},
    protocol::{stored_name, LinkNotice},
    transfer::{receive_stream, send_stream},
};

pub struct PeerLink {
    pub path:       PathBuf,
    pub addr:       SocketAddr,
    pub expires_at: Instant,
}

impl PeerLink {
    /// Binds an OS-assigned port on `host` and starts accepting until `ttl`
    /// has passed. The handle resolves to the number of peers served once the
    /// listener is closed; transfers already running are left to finish.
    pub async fn open(path: impl Into<PathBuf>, host: IpAddr, ttl: Duration) -> AppResult<(Self, JoinHandle<usize>)> {
        let path = path.into();
        let listener = TcpListener::bind((host, 0)).await?;
        let addr = listener.local_addr()?;
        let expires_at = Instant::now() + ttl;
        info!(%addr, path = %path.display(), ttl_secs = ttl.as_secs(), "peer link open");

        let task = tokio::spawn(accept_until(listener, path.clone(), expires_at));
        Ok((Self { path, addr, expires_at }, task))
    }

    pub fn notice(&self) -> LinkNotice {
        LinkNotice {
            file: self.path.display().to_string(),
            host: self.addr.ip().to_string(),
            port: self.addr.port(),
        }
    }

    /// The line sent to the server for relaying to the room.
    pub fn advertisement(&self) -> String {
        format!("--send_by_link {}", self.notice())
    }
}

async fn accept_until(listener: TcpListener, path: PathBuf, deadline: Instant) -> usize {
    let mut served = 0;
    loop {
        tokio::select! {
            _ = time::sleep_until(deadline) => break,
            res = listener.accept() => match res {
                Ok((stream, peer)) => {
                    served += 1;
                    tokio::spawn(seed(stream, peer, path.clone()));
                }
                Err(e) => warn!(error = %e, "peer link accept failed"),
            },
        }
    }
    drop(listener);
    info!(path = %path.display(), served, "peer link expired");
    served
}

async fn seed(mut stream: TcpStream, peer: SocketAddr, path: PathBuf) {
    match stream_file(&mut stream, &path).await {
        Ok(n)  => info!(%peer, path = %path.display(), bytes = n, "sent over peer link"),
        Err(e) => warn!(%peer, error = %e, "peer link transfer failed"),
    }
}

async fn stream_file(stream: &mut TcpStream, path: &Path) -> AppResult<u64> {
    let mut f = File::open(path).await?;
    send_stream(&mut f, stream).await
}

/// Connects to an advertised link and stores the file as `dir/dist-<name>`.
/// A refused connection, or one that closes before the sentinel, means the
/// link is gone: [`AppErr::LinkExpired`].
pub async fn fetch(link: &LinkNotice, dir: &Path) -> AppResult<(PathBuf, u64)> {
    let name = stored_name(&link.file).ok_or_else(|| bad("link has no file name"))?;
    let stream = match TcpStream::connect((link.host.as_str(), link.port)).await {
        Ok(s) => s,
        Err(e) if e.kind() == std::io::ErrorKind::ConnectionRefused => return Err(AppErr::LinkExpired),
        Err(e) => return Err(e.into()),
    };

    let dest = dir.join(format!("dist-{name}"));
    let mut out = BufWriter::new(create_file(&dest).await?);
    let mut rd = BufReader::new(stream);
    match receive_stream(&mut rd, &mut out).await {
        Ok(n) => Ok((dest, n)),
        Err(e) => {
            drop(out);
            let _ = tokio::fs::remove_file(&dest).await;
            debug!(error = %e, "peer link fetch aborted");
            Err(if matches!(e, AppErr::Closed) { AppErr::LinkExpired } else { e })
        }
    }
}
