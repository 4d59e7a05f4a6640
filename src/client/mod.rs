//! Client engine.
//!
//! Three tasks cooperate over one connection:
//! * input: classifies user lines, handles link commands locally
//! * writer: sole owner of the write half; after `--send_file` or
//!   `--get_file` it sends nothing else until that transfer is settled
//! * inbound: sole owner of the read half; prints server text and receives
//!   downloads
//!
//! Transfers are matched to server markers in order through a pending queue.
pub mod link;

use std::{collections::VecDeque, path::{Path, PathBuf}, sync::Arc};
use tokio::{
    fs::{self, File},
    io::{self, AsyncBufRead, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader, BufWriter},
    sync::{mpsc, oneshot, Mutex},
    task::JoinError,
};
use tracing::{debug, info, warn};

use crate::{
    config::ClientConfig,
    error::{bad, AppErr, AppResult},
    protocol::{self as p, read_line, stored_name, Command, LinkNotice},
    transfer::{receive_stream, send_stream},
};
use link::PeerLink;

/// Lines meant for the user's screen.
pub type Console = mpsc::UnboundedSender<String>;

fn say(console: &Console, text: impl Into<String>) {
    let _ = console.send(text.into());
}

enum Outbound {
    Line(String),
    Upload   { command: String, path: PathBuf },
    Download { command: String, name: String },
}

enum Pending {
    /// Resolved with `true` on `--ready_to_receive`, `false` on refusal.
    Upload(oneshot::Sender<bool>),
    /// Resolved once the file is stored or the server said it has none.
    Download(String, oneshot::Sender<()>),
}

type PendingQueue = Arc<Mutex<VecDeque<Pending>>>;

pub(crate) async fn create_file(path: &Path) -> io::Result<File> {
    if let Some(dir) = path.parent() {
        fs::create_dir_all(dir).await?;
    }
    File::create(path).await
}

pub struct Client {
    cfg:     ClientConfig,
    console: Console,
}

impl Client {
    pub fn new(cfg: ClientConfig, console: Console) -> Self {
        Self { cfg, console }
    }

    /// Runs until the user exits (`--exit` or end of input, after queued
    /// lines are flushed) or the server closes the connection, which cancels
    /// the input task.
    pub async fn run<S, I>(self, stream: S, input: I) -> AppResult<()>
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
        I: AsyncBufRead + Unpin + Send + 'static,
    {
        let (rd, wr) = io::split(stream);
        let pending = PendingQueue::default();
        let (out_tx, out_rx) = mpsc::unbounded_channel();

        let mut inbound = tokio::spawn(read_loop(
            BufReader::new(rd), pending.clone(), self.cfg.downloads_dir.clone(), self.console.clone(),
        ));
        let writer    = tokio::spawn(write_loop(wr, out_rx, pending, self.console.clone()));
        let mut input = tokio::spawn(input_loop(input, out_tx, self.cfg.clone(), self.console.clone()));

        tokio::select! {
            res = &mut inbound => {
                input.abort();
                writer.abort();
                say(&self.console, "Connection to the server was closed.");
                joined(res)
            }
            res = &mut input => {
                let flushed = writer.await;
                inbound.abort();
                joined(res)?;
                joined(flushed)
            }
        }
    }
}

fn joined(res: Result<AppResult<()>, JoinError>) -> AppResult<()> {
    res.map_err(bad)?
}

/* ---------------- input ---------------- */
async fn input_loop<I>(mut input: I, tx: mpsc::UnboundedSender<Outbound>, cfg: ClientConfig, console: Console) -> AppResult<()>
where
    I: AsyncBufRead + Unpin,
{
    while let Some(line) = read_line(&mut input).await? {
        if line.is_empty() { continue; }

        let out = match Command::parse(&line) {
            Command::Exit => {
                let _ = tx.send(Outbound::Line(line.clone()));
                return Ok(());
            }
            Command::SendFile(path) => {
                if !is_file(path).await {
                    say(&console, p::NO_SUCH_FILE);
                    continue;
                }
                Outbound::Upload { command: line.clone(), path: path.into() }
            }
            Command::GetFile(name) => Outbound::Download { command: line.clone(), name: name.to_owned() },
            Command::SendByLink(path) => {
                if !is_file(path).await {
                    say(&console, p::NO_SUCH_FILE);
                    continue;
                }
                match PeerLink::open(path, cfg.link_host, cfg.link_ttl).await {
                    Ok((link, _serving)) => {
                        say(&console, format!("Sharing {path} at {} for {}s.", link.addr, cfg.link_ttl.as_secs()));
                        Outbound::Line(link.advertisement())
                    }
                    Err(e) => {
                        say(&console, format!("Cannot open a link: {e}"));
                        continue;
                    }
                }
            }
            Command::GetByLink(raw) => {
                match LinkNotice::parse(raw) {
                    Ok(link) => {
                        tokio::spawn(fetch_and_report(link, cfg.downloads_dir.clone(), console.clone()));
                    }
                    Err(e) => say(&console, format!("Something went wrong...\n{e}")),
                }
                continue;
            }
            _ => Outbound::Line(line.clone()),
        };
        if tx.send(out).is_err() {
            break;  // writer is gone
        }
    }
    Ok(())
}

async fn is_file(path: &str) -> bool {
    fs::metadata(path).await.map(|m| m.is_file()).unwrap_or(false)
}

async fn fetch_and_report(link: LinkNotice, dir: PathBuf, console: Console) {
    match link::fetch(&link, &dir).await {
        Ok((path, n)) => {
            info!(path = %path.display(), bytes = n, "peer link download done");
            say(&console, "File has been successfully downloaded!");
        }
        Err(AppErr::LinkExpired) => say(&console, "Link expired"),
        Err(e) => say(&console, format!("Download failed: {e}")),
    }
}

/* ---------------- writer ---------------- */
async fn write_line<W: AsyncWrite + Unpin>(wr: &mut W, line: &str) -> io::Result<()> {
    wr.write_all(line.as_bytes()).await?;
    wr.write_all(b"\n").await?;
    wr.flush().await
}

async fn write_loop<W>(mut wr: W, mut rx: mpsc::UnboundedReceiver<Outbound>, pending: PendingQueue, console: Console) -> AppResult<()>
where
    W: AsyncWrite + Unpin,
{
    while let Some(out) = rx.recv().await {
        match out {
            Outbound::Line(line) => write_line(&mut wr, &line).await?,
            Outbound::Download { command, name } => {
                let (tx, done) = oneshot::channel();
                pending.lock().await.push_back(Pending::Download(name, tx));
                write_line(&mut wr, &command).await?;
                done.await.map_err(|_| AppErr::Closed)?;
            }
            Outbound::Upload { command, path } => {
                let (tx, ready) = oneshot::channel();
                pending.lock().await.push_back(Pending::Upload(tx));
                write_line(&mut wr, &command).await?;

                match ready.await {
                    Ok(true) => {
                        // the server now reads raw bytes until the sentinel, so one is sent either way
                        let n = match File::open(&path).await {
                            Ok(mut f) => send_stream(&mut f, &mut wr).await?,
                            Err(e) => {
                                warn!(path = %path.display(), error = %e, "file vanished before upload");
                                send_stream(&mut io::empty(), &mut wr).await?
                            }
                        };
                        debug!(path = %path.display(), bytes = n, "upload streamed");
                        say(&console, "File has been successfully sent.");
                    }
                    Ok(false) => {}
                    Err(_) => return Err(AppErr::Closed),
                }
            }
        }
    }
    let _ = wr.shutdown().await;
    Ok(())
}

/* ---------------- inbound ---------------- */
async fn read_loop<R>(mut rd: R, pending: PendingQueue, downloads: PathBuf, console: Console) -> AppResult<()>
where
    R: AsyncBufRead + Unpin,
{
    let res = inbound(&mut rd, &pending, &downloads, &console).await;
    // wakes a writer still waiting for a ready marker
    pending.lock().await.clear();
    res
}

async fn inbound<R>(rd: &mut R, pending: &PendingQueue, downloads: &Path, console: &Console) -> AppResult<()>
where
    R: AsyncBufRead + Unpin,
{
    while let Some(line) = read_line(rd).await? {
        // a marker only counts when it answers the oldest request; anything
        // else (a member named like one, say) is plain text
        let head = match line.as_str() {
            p::READY_TO_RECEIVE => take_pending(pending, |q| matches!(q, Pending::Upload(_))).await,
            p::READY_TO_SEND    => take_pending(pending, |q| matches!(q, Pending::Download(..))).await,
            p::NO_SUCH_FILE     => take_pending(pending, |_| true).await,
            _ => None,
        };
        match head {
            Some(Pending::Upload(tx)) if line == p::READY_TO_RECEIVE => { let _ = tx.send(true); }
            Some(Pending::Download(name, done)) if line == p::READY_TO_SEND => {
                download(rd, downloads, &name, console).await?;
                let _ = done.send(());
            }
            Some(Pending::Upload(tx)) => {
                let _ = tx.send(false);
                say(console, line);
            }
            Some(Pending::Download(_, done)) => {
                let _ = done.send(());
                say(console, line);
            }
            None => {
                if line == p::READY_TO_RECEIVE || line == p::READY_TO_SEND {
                    debug!(%line, "marker with no matching request, shown as text");
                }
                say(console, line);
            }
        }
    }
    Ok(())
}

async fn take_pending(pending: &PendingQueue, fits: impl FnOnce(&Pending) -> bool) -> Option<Pending> {
    let mut q = pending.lock().await;
    if q.front().is_some_and(fits) { q.pop_front() } else { None }
}

async fn download<R>(rd: &mut R, dir: &Path, name: &str, console: &Console) -> AppResult<()>
where
    R: AsyncBufRead + Unpin,
{
    let target = match stored_name(name) {
        Some(file) => create_file(&dir.join(file)).await.ok(),
        None => None,
    };
    match target {
        Some(f) => {
            let mut out = BufWriter::new(f);
            let n = receive_stream(rd, &mut out).await?;
            info!(%name, bytes = n, "downloaded");
            say(console, "File has been successfully downloaded!");
        }
        None => {
            receive_stream(rd, &mut io::sink()).await?;
            say(console, format!("Could not save {name} locally."));
        }
    }
    Ok(())
}
