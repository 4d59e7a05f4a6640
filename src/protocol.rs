//! Wire vocabulary shared by server and client: command grammar, markers,
//! room-name rule and the peer-link notice format.
use std::{fmt, path::Path};

use tokio::io::{AsyncBufRead, AsyncBufReadExt};

use crate::error::{bad, AppErr, AppResult};

/* ------------ markers ------------ */
pub const READY_TO_RECEIVE: &str = "--ready_to_receive";
pub const READY_TO_SEND:    &str = "--ready_to_send";
pub const NO_SUCH_FILE:     &str = "There is no such file.";

/* ------------ prompts / fixed replies ------------ */
pub const NAME_PROMPT:     &str = "Enter your name: ";
pub const EMPTY_NAME:      &str = "Name cannot be empty, try again:";
pub const RESERVED_NAME:   &str = "Names cannot start with '--' or repeat a server reply, try again:";
pub const NO_ROOMS:        &str = "There are currently no rooms. Be the first one to create!";
pub const ROOMS_HEADER:    &str = "Available rooms:";
pub const ROOM_PROMPT:     &str = "Which room you want to join? (type new name to create room)";
pub const BAD_ROOM:        &str = "Incorrect room name, try again:";
pub const HELP_HINT:       &str = "Write '--help' to see available commands. If you want to leave - just type '--exit'";
pub const ONLINE_HEADER:   &str = "These users are currently online:";
pub const BAD_LINK:        &str = "Incorrect link format, expected <file>_<host>:<port>";

/// How many rooms `--rooms` and the negotiation banner list.
pub const TOP_ROOMS: usize = 3;

pub const HELP: &str = "\
--exit - leave chat
--online - show clients currently online
--rooms - show available rooms and number of users
--change_room 'new_room' - change to new room
--send_file 'file_path' - send file (centralized)
--get_file 'file_name' - download file from server (centralized)
--send_by_link 'file_path' - share file by link (decentralized)
--get_by_link 'file_link' - download file from client by link (decentralized)";

/// Display names must not be mistakable for a marker when printed on a line
/// of their own (`--online`).
pub fn name_allowed(name: &str) -> bool {
    !name.starts_with("--") && name != NO_SUCH_FILE
}

/// One classified input line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command<'a> {
    Exit,
    Online,
    Help,
    Rooms,
    /// `None` when the room argument is missing.
    ChangeRoom(Option<&'a str>),
    SendFile(&'a str),
    GetFile(&'a str),
    SendByLink(&'a str),
    GetByLink(&'a str),
    /// A file command without its argument; carries the usage line.
    Usage(&'static str),
    Chat(&'a str),
}

impl<'a> Command<'a> {
    pub fn parse(line: &'a str) -> Self {
        let line = line.trim();
        let (head, arg) = match line.split_once(char::is_whitespace) {
            Some((h, rest)) => (h, rest.trim()),
            None            => (line, ""),
        };
        let arg_or = |f: fn(&'a str) -> Command<'a>, usage: &'static str| {
            if arg.is_empty() { Command::Usage(usage) } else { f(arg) }
        };
        match head {
            "--exit"         => Command::Exit,
            "--online"       => Command::Online,
            "--help"         => Command::Help,
            "--rooms"        => Command::Rooms,
            "--change_room"  => Command::ChangeRoom((!arg.is_empty()).then_some(arg)),
            "--send_file"    => arg_or(Command::SendFile, "Usage: --send_file <file_path>"),
            "--get_file"     => arg_or(Command::GetFile, "Usage: --get_file <file_name>"),
            "--send_by_link" => arg_or(Command::SendByLink, "Usage: --send_by_link <file_path>"),
            "--get_by_link"  => arg_or(Command::GetByLink, "Usage: --get_by_link <file>_<host>:<port>"),
            _                => Command::Chat(line),
        }
    }
}

/// Reads one line, lossily decoded and trimmed. `None` means the peer closed.
pub async fn read_line<R: AsyncBufRead + Unpin + ?Sized>(rd: &mut R) -> AppResult<Option<String>> {
    let mut raw = Vec::new();
    if rd.read_until(b'\n', &mut raw).await? == 0 {
        return Ok(None);
    }
    Ok(Some(String::from_utf8_lossy(&raw).trim().to_owned()))
}

/// Final path component of a client-supplied path; what files are stored
/// and looked up under on either side.
pub fn stored_name(raw: &str) -> Option<String> {
    Path::new(raw.trim()).file_name()?.to_str().map(str::to_owned)
}

/* ------------ rooms ------------ */

pub const ROOM_MIN: usize = 3;
pub const ROOM_MAX: usize = 14;

/// A validated room name: 3..=14 characters of latin, cyrillic, digits,
/// whitespace, `-`, `_` or `*`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RoomName(String);

impl RoomName {
    pub fn parse(raw: &str) -> AppResult<Self> {
        let raw = raw.trim();
        let len = raw.chars().count();
        if !(ROOM_MIN..=ROOM_MAX).contains(&len) || !raw.chars().all(room_char) {
            return Err(AppErr::Bad(format!("invalid room name {raw:?}")));
        }
        Ok(Self(raw.to_owned()))
    }

    pub fn as_str(&self) -> &str { &self.0 }
}

fn room_char(c: char) -> bool {
    c.is_ascii_alphanumeric()
        || ('а'..='я').contains(&c)
        || ('А'..='Я').contains(&c)
        || c.is_whitespace()
        || matches!(c, '-' | '_' | '*')
}

impl fmt::Display for RoomName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(&self.0) }
}

impl std::borrow::Borrow<str> for RoomName {
    fn borrow(&self) -> &str { &self.0 }
}

/* ------------ peer links ------------ */

/// `<file>_<host>:<port>`, the text a seeder advertises and a fetcher parses.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkNotice {
    pub file: String,
    pub host: String,
    pub port: u16,
}

impl LinkNotice {
    /// Splits on the last `:` for the port and the last `_` before it for the host,
    /// so file names may contain `_` and hosts may be IPv6 literals.
    pub fn parse(raw: &str) -> AppResult<Self> {
        let raw = raw.trim();
        let (head, port) = raw.rsplit_once(':').ok_or_else(|| bad(BAD_LINK))?;
        let (file, host) = head.rsplit_once('_').ok_or_else(|| bad(BAD_LINK))?;
        if file.is_empty() || host.is_empty() {
            return Err(bad(BAD_LINK));
        }
        let port = port.parse().map_err(|_| bad(BAD_LINK))?;
        Ok(Self { file: file.to_owned(), host: host.to_owned(), port })
    }
}

impl fmt::Display for LinkNotice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_{}:{}", self.file, self.host, self.port)
    }
}

/* ------------ notices ------------ */

pub fn now_stamp() -> String {
    chrono::Local::now().format("%d.%m.%Y at %H:%M").to_string()
}

pub fn joined_notice(name: &str) -> String { format!("{name} joined the room {}", now_stamp()) }
pub fn left_notice(name: &str)   -> String { format!("{name} left the room {}", now_stamp()) }

pub fn chat_line(name: &str, text: &str) -> String { format!("{name}: {text}") }

pub fn uploaded_notice(name: &str, file: &str) -> String {
    format!("{name} uploaded a file. Write '--get_file {file}' to download it.")
}

pub fn link_notice(name: &str, link: &LinkNotice) -> String {
    format!("{name} shared file link. Type '--get_by_link {link}'")
}

pub fn rooms_listing(rooms: &[(String, usize)]) -> String {
    rooms.iter().map(|(r, n)| format!("{r}: {n} users")).collect::<Vec<_>>().join("\n")
}
