use std::{
    collections::HashMap,
    net::SocketAddr,
    path::PathBuf,
    sync::Arc,
};
use futures_util::future::join_all;
use tokio::{
    io::{AsyncWrite, AsyncWriteExt},
    sync::{Mutex, Notify, RwLock},
};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::protocol::RoomName;

pub type SessionId = Uuid;

/// Write half of a session's connection. Whoever holds the lock owns the
/// outgoing byte stream, which is how a download keeps broadcasts out of
/// the middle of a file.
pub type SharedWriter = Arc<Mutex<Box<dyn AsyncWrite + Send + Unpin>>>;

pub fn shared_writer<W: AsyncWrite + Send + Unpin + 'static>(w: W) -> SharedWriter {
    Arc::new(Mutex::new(Box::new(w)))
}

/// Writes one `\n`-terminated text message.
pub async fn send_line(w: &SharedWriter, text: &str) -> std::io::Result<()> {
    let mut w = w.lock().await;
    w.write_all(text.as_bytes()).await?;
    w.write_all(b"\n").await?;
    w.flush().await
}

/* ------------ sessions ------------ */
pub struct Member {
    pub name:   String,
    pub addr:   SocketAddr,
    pub room:   RoomName,
    pub writer: SharedWriter,
    /// Fired when the registry drops this session from outside its own task.
    pub kick:   Arc<Notify>,
}

/* ------------ registry ------------ */
#[derive(Default)]
struct Inner {
    sessions: HashMap<SessionId, Member>,
    rooms:    HashMap<RoomName, Vec<SessionId>>,   // join order
}

impl Inner {
    fn unlink(&mut self, id: SessionId, room: &RoomName) {
        if let Some(ids) = self.rooms.get_mut(room) {
            ids.retain(|x| *x != id);
            if ids.is_empty() {
                self.rooms.remove(room);
                debug!(room = %room, "room emptied and removed");
            }
        }
    }
}

/// Room membership and session lookup behind one lock: a room is present
/// iff it has at least one member.
#[derive(Clone, Default)]
pub struct Registry {
    inner: Arc<RwLock<Inner>>,
}

impl Registry {
    /// Registers `member` in `member.room`. A session already known under `id`
    /// is moved out of its previous room first.
    pub async fn join(&self, id: SessionId, member: Member) {
        let mut g = self.inner.write().await;
        if let Some(old) = g.sessions.remove(&id) {
            g.unlink(id, &old.room);
        }
        g.rooms.entry(member.room.clone()).or_default().push(id);
        info!(%id, name = %member.name, room = %member.room, "joined");
        g.sessions.insert(id, member);
    }

    /// Moves a registered session to `room`, returning the room it left.
    pub async fn change_room(&self, id: SessionId, room: RoomName) -> Option<RoomName> {
        let mut g = self.inner.write().await;
        let old = {
            let m = g.sessions.get_mut(&id)?;
            std::mem::replace(&mut m.room, room.clone())
        };
        g.unlink(id, &old);
        g.rooms.entry(room.clone()).or_default().push(id);
        info!(%id, from = %old, to = %room, "changed room");
        Some(old)
    }

    /// Removes the session from its room and from the lookup table.
    pub async fn leave(&self, id: SessionId) -> Option<Member> {
        let mut g = self.inner.write().await;
        let m = g.sessions.remove(&id)?;
        g.unlink(id, &m.room);
        info!(%id, name = %m.name, room = %m.room, "left");
        Some(m)
    }

    /// `leave` plus waking the session's own task so it closes the connection.
    pub async fn evict(&self, id: SessionId) {
        if let Some(m) = self.leave(id).await {
            m.kick.notify_one();
        }
    }

    /// Evicts everybody; used when the acceptor shuts down.
    pub async fn close_all(&self) -> usize {
        let drained: Vec<Member> = {
            let mut g = self.inner.write().await;
            g.rooms.clear();
            g.sessions.drain().map(|(_, m)| m).collect()
        };
        for m in &drained { m.kick.notify_one(); }
        drained.len()
    }

    /// Up to `top_n` rooms, largest first; equal sizes ordered by name.
    pub async fn list_rooms(&self, top_n: usize) -> Vec<(String, usize)> {
        let g = self.inner.read().await;
        let mut rooms: Vec<_> = g.rooms.iter()
            .map(|(r, ids)| (r.to_string(), ids.len()))
            .collect();
        rooms.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        rooms.truncate(top_n);
        rooms
    }

    pub async fn list_members(&self, room: &str) -> Vec<String> {
        let g = self.inner.read().await;
        g.rooms.get(room)
            .map(|ids| ids.iter().filter_map(|id| g.sessions.get(id)).map(|m| m.name.clone()).collect())
            .unwrap_or_default()
    }

    pub async fn room_of(&self, id: SessionId) -> Option<RoomName> {
        self.inner.read().await.sessions.get(&id).map(|m| m.room.clone())
    }

    pub async fn has_room(&self, room: &str) -> bool {
        self.inner.read().await.rooms.contains_key(room)
    }

    /// Delivers `payload` to everyone in `room` as of now. Recipients whose
    /// socket fails are evicted; the rest still get the message. Returns the
    /// number of successful deliveries.
    pub async fn broadcast(&self, room: &str, payload: &str) -> usize {
        // snapshot under the lock, write without it
        let targets: Vec<(SessionId, SharedWriter)> = {
            let g = self.inner.read().await;
            g.rooms.get(room)
                .map(|ids| ids.iter()
                    .filter_map(|id| g.sessions.get(id).map(|m| (*id, m.writer.clone())))
                    .collect())
                .unwrap_or_default()
        };

        let results = join_all(targets.into_iter().map(|(id, w)| async move {
            (id, send_line(&w, payload).await)
        })).await;

        let mut delivered = 0;
        for (id, res) in results {
            match res {
                Ok(()) => delivered += 1,
                Err(e) => {
                    warn!(%id, room, error = %e, "delivery failed, dropping session");
                    self.evict(id).await;
                }
            }
        }
        delivered
    }
}

/* ------------ shared server context ------------ */
#[derive(Clone)]
pub struct AppState {
    pub registry:  Registry,
    /// Where centralized uploads are stored.
    pub files_dir: PathBuf,
}

impl AppState {
    pub fn new(files_dir: impl Into<PathBuf>) -> Self {
        Self { registry: Registry::default(), files_dir: files_dir.into() }
    }
}
