//! One task per connection: name/room negotiation, then the command loop.
mod files;

use std::{net::SocketAddr, sync::Arc};
use tokio::{
    io::{AsyncBufRead, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader},
    sync::Notify,
};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::{
    error::{AppErr, AppResult},
    protocol::{self as p, read_line, Command, LinkNotice, RoomName},
    state::{send_line, shared_writer, AppState, Member, SessionId, SharedWriter},
};

/* ---------------- entry point ---------------- */
pub async fn run<S>(stream: S, addr: SocketAddr, app: AppState)
where
    S: AsyncRead + AsyncWrite + Send + 'static,
{
    let (rd, wr) = tokio::io::split(stream);
    let mut rd = BufReader::new(rd);
    let writer = shared_writer(wr);

    let outcome = match negotiate(&mut rd, &writer, &app).await {
        Ok(Some((name, room))) => {
            let mut s = Session::enter(rd, writer.clone(), addr, name, room, &app).await;
            let res = s.serve().await;
            app.registry.leave(s.id).await;
            res
        }
        Ok(None) => Ok(()),
        Err(e)   => Err(e),
    };
    match outcome {
        Ok(())                        => debug!(%addr, "session closed"),
        Err(e) if e.is_disconnect()   => debug!(%addr, "peer went away"),
        Err(e)                        => warn!(%addr, error = %e, "session dropped"),
    }
    let _ = writer.lock().await.shutdown().await;
}

/* ---------------- NEGOTIATING_NAME / NEGOTIATING_ROOM ---------------- */
async fn negotiate<R>(rd: &mut R, w: &SharedWriter, app: &AppState) -> AppResult<Option<(String, RoomName)>>
where
    R: AsyncBufRead + Unpin,
{
    send_line(w, p::NAME_PROMPT).await?;
    let name = loop {
        match read_line(rd).await? {
            None                     => return Ok(None),
            Some(n) if n.is_empty()  => send_line(w, p::EMPTY_NAME).await?,
            Some(n) if !p::name_allowed(&n) => send_line(w, p::RESERVED_NAME).await?,
            Some(n)                  => break n,
        }
    };

    let rooms = app.registry.list_rooms(p::TOP_ROOMS).await;
    if rooms.is_empty() {
        send_line(w, p::NO_ROOMS).await?;
    } else {
        send_line(w, p::ROOMS_HEADER).await?;
        send_line(w, &p::rooms_listing(&rooms)).await?;
    }
    send_line(w, p::ROOM_PROMPT).await?;

    let Some(room) = prompt_room(rd, w, None).await? else { return Ok(None) };
    Ok(Some((name, room)))
}

/// Validates `first` (if any) and then keeps asking until a line passes the
/// room-name rule. Touches no shared state.
async fn prompt_room<R>(rd: &mut R, w: &SharedWriter, first: Option<&str>) -> AppResult<Option<RoomName>>
where
    R: AsyncBufRead + Unpin,
{
    if let Some(Ok(room)) = first.map(RoomName::parse) {
        return Ok(Some(room));
    }
    if first.is_some() {
        send_line(w, p::BAD_ROOM).await?;
    }
    loop {
        let Some(raw) = read_line(rd).await? else { return Ok(None) };
        match RoomName::parse(&raw) {
            Ok(room) => return Ok(Some(room)),
            Err(_)   => send_line(w, p::BAD_ROOM).await?,
        }
    }
}

/* ---------------- ACTIVE ---------------- */
enum Flow { Continue, Exit }

struct Session<R> {
    id:         SessionId,
    name:       String,
    addr:       SocketAddr,
    room:       RoomName,
    reader:     R,
    writer:     SharedWriter,
    kick:       Arc<Notify>,
    app:        AppState,
}

impl<R: AsyncBufRead + Unpin> Session<R> {
    async fn enter(reader: R, writer: SharedWriter, addr: SocketAddr, name: String, room: RoomName, app: &AppState) -> Self {
        let id   = Uuid::new_v4();
        let kick = Arc::new(Notify::new());

        // the newcomer is not a member yet, so it doesn't see its own notice
        app.registry.broadcast(room.as_str(), &p::joined_notice(&name)).await;
        app.registry.join(id, Member {
            name:   name.clone(),
            addr,
            room:   room.clone(),
            writer: writer.clone(),
            kick:   kick.clone(),
        }).await;
        info!(%id, %addr, %name, %room, "session active");

        Self { id, name, addr, room, reader, writer, kick, app: app.clone() }
    }

    async fn serve(&mut self) -> AppResult<()> {
        self.reply(&format!("Welcome to chat room '{}', {}!", self.room, self.name)).await?;
        self.reply(p::HELP_HINT).await?;
        loop {
            let line = tokio::select! {
                line = read_line(&mut self.reader) => line?,
                _ = self.kick.notified() => {
                    debug!(id = %self.id, "evicted");
                    return Ok(());
                }
            };
            let Some(line) = line else { return Ok(()) };
            if line.is_empty() { continue; }

            if let Flow::Exit = self.dispatch(&line).await? {
                return Ok(());
            }
        }
    }

    async fn dispatch(&mut self, line: &str) -> AppResult<Flow> {
        match Command::parse(line) {
            Command::Exit => {
                self.app.registry.leave(self.id).await;
                self.app.registry.broadcast(self.room.as_str(), &p::left_notice(&self.name)).await;
                return Ok(Flow::Exit);
            }
            Command::Online => {
                let names = self.app.registry.list_members(self.room.as_str()).await;
                self.reply(&format!("{}\n{}", p::ONLINE_HEADER, names.join("\n"))).await?;
            }
            Command::Help  => self.reply(p::HELP).await?,
            Command::Rooms => {
                let rooms = self.app.registry.list_rooms(p::TOP_ROOMS).await;
                self.reply(&p::rooms_listing(&rooms)).await?;
            }
            Command::ChangeRoom(None) => {
                return Err(AppErr::Bad("--change_room without a room".into()));
            }
            Command::ChangeRoom(Some(raw)) => {
                let Some(room) = prompt_room(&mut self.reader, &self.writer, Some(raw)).await? else {
                    return Ok(Flow::Exit);
                };
                self.change_room(room).await?;
            }
            Command::SendFile(path)    => self.receive_upload(path).await?,
            Command::GetFile(name)     => self.send_download(name).await?,
            Command::SendByLink(raw)   => match LinkNotice::parse(raw) {
                Ok(link) => {
                    info!(id = %self.id, %link, "relaying peer link");
                    self.broadcast(&p::link_notice(&self.name, &link)).await;
                }
                Err(_) => self.reply(p::BAD_LINK).await?,
            },
            Command::Usage(usage) => self.reply(usage).await?,
            // fetching by link happens client to client
            Command::GetByLink(_) | Command::Chat(_) => {
                self.broadcast(&p::chat_line(&self.name, line)).await;
            }
        }
        Ok(Flow::Continue)
    }

    async fn change_room(&mut self, room: RoomName) -> AppResult<()> {
        if room == self.room {
            return self.reply(&format!("You are already in room '{room}'")).await;
        }
        self.app.registry.broadcast(room.as_str(), &p::joined_notice(&self.name)).await;
        let Some(old) = self.app.registry.change_room(self.id, room.clone()).await else {
            // evicted by a failed delivery meanwhile
            return Err(AppErr::Closed);
        };
        self.room = room;
        self.app.registry.broadcast(old.as_str(), &p::left_notice(&self.name)).await;
        self.reply(&format!("Welcome to \"{}\" chat, {}!", self.room, self.name)).await
    }

    async fn broadcast(&self, payload: &str) -> usize {
        self.app.registry.broadcast(self.room.as_str(), payload).await
    }

    async fn reply(&self, text: &str) -> AppResult<()> {
        send_line(&self.writer, text).await.map_err(Into::into)
    }
}
