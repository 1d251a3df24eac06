//! Peripheral Service core, independent of the Bluetooth stack
//!
//! The GATT binding feeds every write on the command characteristic into
//! [`Peripheral::on_write`] and reports dropped links through
//! [`Peripheral::on_disconnect`]. Results go back out through a
//! [`NotifySink`], one acknowledged chunk at a time.
//!
//! Per connection:
//! - writes are refused unless the link is encrypted
//! - fragments are joined into lines (see [`LineBuffer`])
//! - one command executes at a time; other lines get a `BUSY` reply
//! - chunks of one result are sent contiguously and in order

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use log::{debug, info, warn};
use tokio::task::JoinHandle;
use wlink_proto::{CommandResult, OutputChunk, ParseError, frame, gatt};

use crate::dispatcher::{Dispatcher, ExecutionGuard, Session};

/// Identifies the remote device of one link (its Bluetooth address)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PeerId(pub String);

impl PeerId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkSecurity {
    Encrypted,
    Unencrypted,
}

/// One write on the command characteristic
#[derive(Debug, Clone)]
pub struct WriteEvent {
    pub peer: PeerId,
    /// Negotiated ATT MTU of the link
    pub mtu: u16,
    /// Offset of this part within a long (prepared) write
    pub offset: u16,
    pub security: LinkSecurity,
    pub data: Vec<u8>,
}

impl WriteEvent {
    /// Part of a long write: continues at an offset, or is larger than one
    /// ATT write can carry. Such writes only end a line at `\n`.
    pub fn is_fragment(&self) -> bool {
        self.offset > 0 || self.data.len() > gatt::notify_payload(self.mtu)
    }
}

#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteRejected {
    #[error("link is not encrypted")]
    EncryptionRequired,
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum NotifyError {
    #[error("no client subscribed to notifications")]
    NotSubscribed,
    #[error("peer disconnected")]
    Disconnected,
    #[error("notification failed: {0}")]
    Failed(String),
}

/// Outbound notification channel.
///
/// `send` resolves once the stack accepted the chunk, so callers can pace
/// the next one on it.
#[async_trait::async_trait]
pub trait NotifySink: Send + Sync {
    async fn send(&self, peer: &PeerId, chunk: OutputChunk) -> Result<(), NotifyError>;
}

#[derive(Debug, Clone, Copy)]
pub struct PeripheralConfig {
    /// Upper bound on notification payload, whatever the MTU allows
    pub max_payload: usize,
    /// Longest accepted command line in bytes
    pub max_line_len: usize,
}

impl Default for PeripheralConfig {
    fn default() -> Self {
        Self {
            max_payload: gatt::MAX_ATTRIBUTE_LEN - 3,
            max_line_len: 512,
        }
    }
}

/// What became of one write. Await [`Accepted::finished`] to wait for the
/// replies it triggered.
#[derive(Debug)]
pub struct Accepted {
    tasks: Vec<JoinHandle<()>>,
}

impl Accepted {
    /// The write only added to a partial line
    pub fn is_buffering(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Number of lines this write completed
    pub fn lines(&self) -> usize {
        self.tasks.len()
    }

    pub async fn finished(self) {
        for task in self.tasks {
            if let Err(e) = task.await {
                warn!("command task failed: {e}");
            }
        }
    }
}

/// A completed unit of input
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LineEvent {
    Line(Vec<u8>),
    TooLong,
}

/// Joins write fragments into command lines.
///
/// A line ends at `\n`, or at the end of any write that is not a fragment
/// (clients that send one command per write without a newline). Fragments
/// of a long write keep their trailing bytes until a newline arrives.
#[derive(Debug, Default)]
pub struct LineBuffer {
    buf: Vec<u8>,
    overflowed: bool,
}

impl LineBuffer {
    pub fn push(&mut self, data: &[u8], fragment: bool, max_line_len: usize) -> Vec<LineEvent> {
        let mut events = Vec::new();
        let mut rest = data;

        while let Some(pos) = rest.iter().position(|b| *b == b'\n') {
            self.extend(&rest[..pos], max_line_len);
            events.push(self.take());
            rest = &rest[pos + 1..];
        }

        if !rest.is_empty() {
            self.extend(rest, max_line_len);
            if !fragment {
                events.push(self.take());
            }
        }

        events
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty() && !self.overflowed
    }

    fn extend(&mut self, bytes: &[u8], max_line_len: usize) {
        if self.overflowed {
            return;
        }
        self.buf.extend_from_slice(bytes);
        if self.buf.len() > max_line_len {
            self.buf.clear();
            self.overflowed = true;
        }
    }

    fn take(&mut self) -> LineEvent {
        if std::mem::take(&mut self.overflowed) {
            LineEvent::TooLong
        } else {
            LineEvent::Line(std::mem::take(&mut self.buf))
        }
    }
}

struct Connection {
    peer: PeerId,
    session: Session,
    line: Mutex<LineBuffer>,
    /// Keeps the chunks of one result together
    send_lock: tokio::sync::Mutex<()>,
    closed: AtomicBool,
}

impl Connection {
    fn new(peer: PeerId) -> Self {
        Self {
            peer,
            session: Session::new(),
            line: Mutex::new(LineBuffer::default()),
            send_lock: tokio::sync::Mutex::new(()),
            closed: AtomicBool::new(false),
        }
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}

pub struct Peripheral {
    dispatcher: Arc<Dispatcher>,
    sink: Arc<dyn NotifySink>,
    connections: RwLock<HashMap<PeerId, Arc<Connection>>>,
    config: PeripheralConfig,
}

impl Peripheral {
    pub fn new(
        dispatcher: Arc<Dispatcher>,
        sink: Arc<dyn NotifySink>,
        config: PeripheralConfig,
    ) -> Self {
        Self {
            dispatcher,
            sink,
            connections: RwLock::new(HashMap::new()),
            config,
        }
    }

    /// Notification payload for output on a link with this MTU
    pub fn payload_for(&self, mtu: u16) -> usize {
        gatt::notify_payload(mtu).min(self.config.max_payload).max(1)
    }

    /// Peers with a live connection, in address order
    pub fn peers(&self) -> Vec<PeerId> {
        let connections = self.connections.read().unwrap_or_else(PoisonError::into_inner);
        let mut peers: Vec<_> = connections.keys().cloned().collect();
        peers.sort();
        peers
    }

    fn connection(&self, peer: &PeerId) -> Arc<Connection> {
        if let Some(conn) = self
            .connections
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(peer)
        {
            return conn.clone();
        }

        let mut connections = self.connections.write().unwrap_or_else(PoisonError::into_inner);
        connections
            .entry(peer.clone())
            .or_insert_with(|| {
                info!("new connection from {peer}");
                Arc::new(Connection::new(peer.clone()))
            })
            .clone()
    }

    /// Handle one write on the command characteristic.
    ///
    /// Returns immediately; commands execute on spawned tasks.
    pub fn on_write(&self, event: WriteEvent) -> Result<Accepted, WriteRejected> {
        if event.security != LinkSecurity::Encrypted {
            warn!("rejecting write from {} on unencrypted link", event.peer);
            return Err(WriteRejected::EncryptionRequired);
        }

        let conn = self.connection(&event.peer);
        let payload = self.payload_for(event.mtu);

        let lines = conn
            .line
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(&event.data, event.is_fragment(), self.config.max_line_len);

        let mut tasks = Vec::with_capacity(lines.len());
        for line in lines {
            let task = match line {
                LineEvent::Line(bytes) => match conn.session.try_begin() {
                    Some(guard) => self.spawn_execute(conn.clone(), guard, bytes, payload),
                    None => {
                        debug!("{} is busy, refusing line", conn.peer);
                        self.spawn_reply(conn.clone(), CommandResult::busy(), payload)
                    }
                },
                LineEvent::TooLong => {
                    let err = ParseError::TooLong {
                        limit: self.config.max_line_len,
                    };
                    self.spawn_reply(
                        conn.clone(),
                        CommandResult::bad_request(err.client_message()),
                        payload,
                    )
                }
            };
            tasks.push(task);
        }

        Ok(Accepted { tasks })
    }

    /// The link to `peer` is gone: drop its state and abandon unsent output
    pub fn on_disconnect(&self, peer: &PeerId) {
        let removed = self
            .connections
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(peer);

        if let Some(conn) = removed {
            conn.closed.store(true, Ordering::Release);
            info!("{peer} disconnected");
        }
    }

    fn spawn_execute(
        &self,
        conn: Arc<Connection>,
        guard: ExecutionGuard,
        line: Vec<u8>,
        payload: usize,
    ) -> JoinHandle<()> {
        let dispatcher = self.dispatcher.clone();
        let sink = self.sink.clone();
        tokio::spawn(async move {
            let result = dispatcher.handle_bytes(&line).await;
            send_result(sink.as_ref(), &conn, &result, payload).await;
            drop(guard);
        })
    }

    fn spawn_reply(
        &self,
        conn: Arc<Connection>,
        result: CommandResult,
        payload: usize,
    ) -> JoinHandle<()> {
        let sink = self.sink.clone();
        tokio::spawn(async move {
            send_result(sink.as_ref(), &conn, &result, payload).await;
        })
    }
}

async fn send_result(sink: &dyn NotifySink, conn: &Connection, result: &CommandResult, payload: usize) {
    let _order = conn.send_lock.lock().await;

    for chunk in frame(result, payload) {
        if conn.is_closed() {
            debug!("{} went away, dropping remaining output", conn.peer);
            return;
        }
        let index = chunk.sequence_index;
        if let Err(e) = sink.send(&conn.peer, chunk).await {
            warn!("notify to {} failed at chunk {index}: {e}", conn.peer);
            return;
        }
    }
}
