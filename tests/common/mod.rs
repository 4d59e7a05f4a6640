#![allow(dead_code)]

use std::{net::SocketAddr, time::Duration};

use chat_relay::{protocol as p, server, AppState};
use tempfile::TempDir;
use tokio::{
    io::{AsyncBufReadExt, AsyncWriteExt, BufReader},
    net::{
        tcp::{OwnedReadHalf, OwnedWriteHalf},
        TcpListener, TcpStream,
    },
    time::timeout,
};

pub const WAIT: Duration = Duration::from_secs(5);

pub struct TestServer {
    pub addr:  SocketAddr,
    pub app:   AppState,
    pub files: TempDir,
}

pub async fn start_server() -> TestServer {
    let files = tempfile::tempdir().expect("temp dir");
    let app = AppState::new(files.path());
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().unwrap();
    tokio::spawn(server::serve(listener, app.clone()));
    TestServer { addr, app, files }
}

/// A raw protocol client driven line by line.
pub struct Peer {
    pub rd: BufReader<OwnedReadHalf>,
    pub wr: OwnedWriteHalf,
}

impl Peer {
    pub async fn connect(addr: SocketAddr) -> Self {
        let (rd, wr) = TcpStream::connect(addr).await.expect("connect").into_split();
        Self { rd: BufReader::new(rd), wr }
    }

    /// Connects and walks through name and room negotiation.
    pub async fn join(addr: SocketAddr, name: &str, room: &str) -> Self {
        let mut peer = Self::connect(addr).await;
        peer.expect(p::NAME_PROMPT.trim()).await;
        peer.send(name).await;
        peer.expect(p::ROOM_PROMPT).await;
        peer.send(room).await;
        peer.expect(p::HELP_HINT).await;
        peer
    }

    pub async fn send(&mut self, line: &str) {
        self.wr.write_all(format!("{line}\n").as_bytes()).await.expect("send");
        self.wr.flush().await.unwrap();
    }

    /// Next line, `None` at EOF.
    pub async fn next(&mut self) -> Option<String> {
        let mut s = String::new();
        let n = timeout(WAIT, self.rd.read_line(&mut s))
            .await
            .expect("timed out waiting for a line")
            .unwrap_or(0);
        (n > 0).then(|| s.trim_end().to_owned())
    }

    /// Skips lines until one contains `needle`.
    pub async fn expect(&mut self, needle: &str) -> String {
        loop {
            match self.next().await {
                Some(line) if line.contains(needle) => return line,
                Some(_) => continue,
                None => panic!("connection closed while waiting for {needle:?}"),
            }
        }
    }

    /// Like `expect`, returning every line read on the way.
    pub async fn collect_until(&mut self, needle: &str) -> Vec<String> {
        let mut seen = Vec::new();
        loop {
            let line = self.next().await.unwrap_or_else(|| panic!("closed before {needle:?}"));
            let done = line.contains(needle);
            seen.push(line);
            if done { return seen; }
        }
    }

    /// Reads until EOF, ignoring anything still in flight.
    pub async fn expect_closed(&mut self) {
        while self.next().await.is_some() {}
    }
}

/// Polls `check` until it holds or `WAIT` runs out.
pub async fn eventually<F, Fut>(mut check: F)
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    let deadline = tokio::time::Instant::now() + WAIT;
    while !check().await {
        assert!(tokio::time::Instant::now() < deadline, "condition never became true");
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}
